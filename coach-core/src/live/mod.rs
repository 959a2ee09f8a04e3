//! live — synchronous webcam session loop
//!
//! One frame per iteration: read → mirror → detect → count → draw → show,
//! followed by a fixed sleep.  The loop stops when the cancel flag is set,
//! when the display reports that the user asked to stop, when the target rep
//! count is reached, or when the source fails to deliver a frame.
//!
//! Capture and display sit behind [`FrameSource`] and [`FrameSink`]; the
//! OpenCV-backed implementations live in [`camera`] (feature `webcam`).

#[cfg(feature = "webcam")]
pub mod camera;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::pipeline::{process_frame, Analyzer, Renderer};
use crate::pose::PoseEstimator;
use crate::rendering::FrameScaler;
use crate::video::{mirror, RgbFrame};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub camera_index: i32,
    /// Pause between iterations, in milliseconds.
    pub frame_delay_ms: u64,
    /// Flip frames horizontally before analysis (selfie view).
    pub mirror: bool,
    /// Width of the displayed frame; 0 shows frames at capture size.
    pub display_width: u32,
    pub window_title: String,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            camera_index: 0,
            frame_delay_ms: 100,
            mirror: true,
            display_width: 640,
            window_title: "Fitness Coach".to_string(),
        }
    }
}

/// Where live frames come from.
pub trait FrameSource {
    fn read(&mut self) -> Result<RgbFrame>;
}

/// What the display wants the loop to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkControl {
    Continue,
    Stop,
}

/// Where annotated live frames go.
pub trait FrameSink {
    fn show(&mut self, frame: &RgbFrame) -> Result<SinkControl>;
}

/// Cancel flag shared with whoever may stop the session from outside the loop.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(pub Arc<Mutex<bool>>);

impl CancelFlag {
    pub fn cancel(&self) {
        if let Ok(mut flag) = self.0.lock() {
            *flag = true;
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.lock().map(|g| *g).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    GoalReached,
    UserStopped,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveReport {
    pub reps: u32,
    pub frames: u64,
    pub stop: StopReason,
}

/// Run a live session until one of the stop conditions holds.
///
/// A failed frame read ends the session with an error; the counted reps are
/// still available through `analyzer.session()`.
pub fn run_live<S, K, E>(
    source: &mut S,
    sink: &mut K,
    analyzer: &mut Analyzer<E>,
    renderer: &mut Renderer,
    settings: &LiveConfig,
    cancel: &CancelFlag,
) -> Result<LiveReport>
where
    S: FrameSource,
    K: FrameSink,
    E: PoseEstimator,
{
    let mut scaler = FrameScaler::new();
    let delay = Duration::from_millis(settings.frame_delay_ms);
    let mut frames = 0u64;

    info!(
        exercise = %analyzer.session().kind(),
        target = ?analyzer.session().target_reps(),
        "live session started"
    );

    let stop = loop {
        if cancel.is_cancelled() {
            break StopReason::Cancelled;
        }
        if analyzer.session().goal_reached() {
            break StopReason::GoalReached;
        }

        let mut frame = source.read().context("failed to read from webcam")?;
        if settings.mirror {
            mirror(&mut frame);
        }

        let analysis = process_frame(analyzer, renderer, &mut frame);
        frames += 1;

        if analysis.completed_rep() {
            info!(
                reps = analyzer.session().reps(),
                target = ?analyzer.session().target_reps(),
                "{}",
                analyzer.session().progress_line()
            );
        }

        let shown = if settings.display_width > 0 && frame.width != settings.display_width {
            scaler.fit_width(&frame, settings.display_width)?
        } else {
            frame
        };
        if sink.show(&shown)? == SinkControl::Stop {
            break StopReason::UserStopped;
        }

        if analyzer.session().goal_reached() {
            info!("target reps reached");
            break StopReason::GoalReached;
        }

        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    };

    debug!(frames, ?stop, "live session ended");
    Ok(LiveReport {
        reps: analyzer.session().reps(),
        frames,
        stop,
    })
}
