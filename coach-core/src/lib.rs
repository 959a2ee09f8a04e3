pub mod config;
pub mod counter;
pub mod diet;
pub mod geometry;
pub mod live;
pub mod nutrition;
pub mod pipeline;
pub mod pose;
pub mod rendering;
pub mod runtime;
pub mod video;

// Re-export the error type so callers only need `coach_core::Error`
pub use anyhow::Error;
pub use anyhow::Result;
