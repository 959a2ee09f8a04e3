//! pose — body landmark detection with a BlazePose-style ONNX model
//!
//! The model is treated as a black box that maps a frame to 33 landmarks in
//! the MediaPipe Pose topology.  Only the indices used by the rep counter are
//! named here.
//!
//! Landmarks come back in model-input pixel space and are scaled to the
//! original frame, so downstream thresholds are expressed in frame pixels.

use anyhow::{bail, Context, Result};
use fast_image_resize as fr;
use ort::session::Session;
use ort::value::Tensor;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::geometry::Point;
use crate::video::RgbFrame;

// ── Landmark indices (MediaPipe Pose, 33 total) ─────────────────────────────

pub const LANDMARK_COUNT: usize = 33;

pub const NOSE: usize = 0;
pub const LEFT_SHOULDER: usize = 11;
pub const RIGHT_SHOULDER: usize = 12;
pub const LEFT_ELBOW: usize = 13;
pub const RIGHT_ELBOW: usize = 14;
pub const LEFT_WRIST: usize = 15;
pub const RIGHT_WRIST: usize = 16;
pub const LEFT_HIP: usize = 23;
pub const RIGHT_HIP: usize = 24;
pub const LEFT_KNEE: usize = 25;
pub const RIGHT_KNEE: usize = 26;
pub const LEFT_ANKLE: usize = 27;
pub const RIGHT_ANKLE: usize = 28;

// ── Public types ─────────────────────────────────────────────────────────────

/// One body landmark in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Landmark {
    pub id: usize,
    pub x: f32,
    pub y: f32,
    /// Model visibility score in [0, 1]; 1.0 when the model has none.
    pub visibility: f32,
}

impl Landmark {
    pub fn point(&self) -> Point {
        (self.x, self.y)
    }
}

/// A full set of landmarks for one person in one frame, ordered by id.
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    landmarks: [Landmark; LANDMARK_COUNT],
}

impl Pose {
    /// Build a pose from exactly `LANDMARK_COUNT` points (index = landmark id).
    pub fn from_points(points: &[Point]) -> Result<Self> {
        if points.len() != LANDMARK_COUNT {
            bail!(
                "a pose needs {LANDMARK_COUNT} landmarks, got {}",
                points.len()
            );
        }
        let mut landmarks = [Landmark::default(); LANDMARK_COUNT];
        for (id, (slot, &(x, y))) in landmarks.iter_mut().zip(points).enumerate() {
            *slot = Landmark {
                id,
                x,
                y,
                visibility: 1.0,
            };
        }
        Ok(Self { landmarks })
    }

    /// Pixel position of landmark `id`.
    ///
    /// Panics if `id >= LANDMARK_COUNT`; callers use the constants above.
    pub fn point(&self, id: usize) -> Point {
        self.landmarks[id].point()
    }

    pub fn get(&self, id: usize) -> Option<&Landmark> {
        self.landmarks.get(id)
    }

    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }

    /// Move landmark `id` to `point`.  Out-of-range ids are ignored.
    pub fn set_point(&mut self, id: usize, point: Point) {
        if let Some(lm) = self.landmarks.get_mut(id) {
            lm.x = point.0;
            lm.y = point.1;
        }
    }
}

/// Anything that can turn a frame into a pose.  `Ok(None)` means no person
/// was found in this frame.
pub trait PoseEstimator {
    fn estimate(&mut self, frame: &RgbFrame) -> Result<Option<Pose>>;
}

impl<T: PoseEstimator + ?Sized> PoseEstimator for Box<T> {
    fn estimate(&mut self, frame: &RgbFrame) -> Result<Option<Pose>> {
        (**self).estimate(frame)
    }
}

// ── Model settings ───────────────────────────────────────────────────────────

/// Memory layout of the model input tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// `[1, H, W, 3]` — TFLite-converted BlazePose models.
    Nhwc,
    /// `[1, 3, H, W]`
    Nchw,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseModelConfig {
    pub model_path: PathBuf,
    pub input_name: String,
    /// Square input side in pixels.
    pub input_size: u32,
    pub layout: TensorLayout,
    /// Values emitted per landmark (x, y, z, visibility, presence).
    pub values_per_landmark: usize,
    /// Minimum person-presence probability to accept a frame's landmarks.
    pub presence_threshold: f32,
}

impl Default for PoseModelConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/pose_landmark_full.onnx"),
            input_name: "input_1".to_string(),
            input_size: 256,
            layout: TensorLayout::Nhwc,
            values_per_landmark: 5,
            presence_threshold: 0.5,
        }
    }
}

// ── Detector ─────────────────────────────────────────────────────────────────

/// Wraps the pose landmark ONNX session.
pub struct PoseDetector {
    session: Session,
    settings: PoseModelConfig,
    resizer: fr::Resizer,
    resize_buf: Vec<u8>,
}

impl PoseDetector {
    /// Load the model named by `settings.model_path`.
    pub fn load(settings: &PoseModelConfig) -> Result<Self> {
        let session = build_ort_session(&settings.model_path)?;
        let side = settings.input_size as usize;
        debug!(
            model = %settings.model_path.display(),
            input_size = settings.input_size,
            layout = ?settings.layout,
            "pose model loaded"
        );
        Ok(Self {
            session,
            settings: settings.clone(),
            resizer: fr::Resizer::new(),
            resize_buf: vec![0u8; side * side * 3],
        })
    }

    fn preprocess(&mut self, frame: &RgbFrame) -> Result<ort::value::DynValue> {
        let side = self.settings.input_size;
        let src =
            fr::images::ImageRef::new(frame.width, frame.height, &frame.data, fr::PixelType::U8x3)
                .context("failed to create pose resize source")?;

        let mut dst = fr::images::Image::from_vec_u8(
            side,
            side,
            std::mem::take(&mut self.resize_buf),
            fr::PixelType::U8x3,
        )
        .context("failed to create pose resize destination")?;

        let options = fr::ResizeOptions::new()
            .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear));
        self.resizer
            .resize(&src, &mut dst, Some(&options))
            .context("pose input resize failed")?;

        self.resize_buf = dst.into_vec();
        let raw = &self.resize_buf;
        let plane = (side * side) as usize;
        let side = side as usize;

        let (shape, tensor_data) = match self.settings.layout {
            TensorLayout::Nhwc => {
                let data: Vec<f32> = raw.par_iter().map(|&v| v as f32 / 255.0).collect();
                ([1usize, side, side, 3], data)
            }
            TensorLayout::Nchw => {
                let mut data = vec![0f32; 3 * plane];
                let (r_plane, gb_plane) = data.split_at_mut(plane);
                let (g_plane, b_plane) = gb_plane.split_at_mut(plane);
                rayon::join(
                    || fill_plane(r_plane, raw, 0),
                    || rayon::join(|| fill_plane(g_plane, raw, 1), || fill_plane(b_plane, raw, 2)),
                );
                ([1usize, 3, side, side], data)
            }
        };

        Ok(Tensor::from_array((shape, tensor_data.into_boxed_slice()))
            .context("failed to create pose input tensor")?
            .into_dyn())
    }
}

impl PoseEstimator for PoseDetector {
    fn estimate(&mut self, frame: &RgbFrame) -> Result<Option<Pose>> {
        let input = self.preprocess(frame)?;

        let outputs = self
            .session
            .run(ort::inputs![self.settings.input_name.as_str() => input])
            .context("pose inference failed")?;

        // First output: flattened landmarks.  Second (optional): presence logit.
        let mut values = outputs.iter();
        let (_, landmark_value) = values.next().context("pose model produced no outputs")?;
        let (_shape, landmark_data) = landmark_value
            .try_extract_tensor::<f32>()
            .context("failed to extract landmark tensor")?;

        let presence = match values.next() {
            Some((_, flag_value)) => {
                let (_shape, flag) = flag_value
                    .try_extract_tensor::<f32>()
                    .context("failed to extract presence tensor")?;
                flag.first().map(|&logit| sigmoid(logit))
            }
            None => None,
        };

        decode_landmarks(
            landmark_data,
            presence,
            &self.settings,
            frame.width,
            frame.height,
        )
    }
}

// ── Pre/post-processing helpers ──────────────────────────────────────────────

fn fill_plane(plane: &mut [f32], raw: &[u8], channel: usize) {
    plane
        .par_iter_mut()
        .enumerate()
        .for_each(|(idx, out)| *out = raw[idx * 3 + channel] as f32 / 255.0);
}

fn build_ort_session(model_path: &Path) -> Result<Session> {
    let mut builder = Session::builder().context("failed to create ORT session builder")?;
    builder = builder
        .with_intra_threads(2)
        .context("failed to set ORT intra threads")?;
    builder = builder
        .with_inter_threads(1)
        .context("failed to set ORT inter threads")?;
    builder
        .commit_from_file(model_path)
        .with_context(|| format!("failed to load pose model {}", model_path.display()))
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Convert raw model output into a frame-space pose.
///
/// `values` holds `values_per_landmark` floats per landmark in model-input
/// pixels; extra landmarks past the 33 body points (BlazePose emits 39) are
/// ignored.
fn decode_landmarks(
    values: &[f32],
    presence: Option<f32>,
    settings: &PoseModelConfig,
    frame_width: u32,
    frame_height: u32,
) -> Result<Option<Pose>> {
    if let Some(score) = presence {
        if score < settings.presence_threshold {
            debug!(score, "no person in frame");
            return Ok(None);
        }
    }

    let stride = settings.values_per_landmark;
    if stride < 2 {
        bail!("values_per_landmark must be at least 2, got {stride}");
    }
    if values.len() < LANDMARK_COUNT * stride {
        bail!(
            "pose model returned {} values, expected at least {}",
            values.len(),
            LANDMARK_COUNT * stride
        );
    }

    let scale_x = frame_width as f32 / settings.input_size as f32;
    let scale_y = frame_height as f32 / settings.input_size as f32;

    let mut landmarks = [Landmark::default(); LANDMARK_COUNT];
    for (id, (slot, chunk)) in landmarks
        .iter_mut()
        .zip(values.chunks_exact(stride))
        .enumerate()
    {
        *slot = Landmark {
            id,
            x: chunk[0] * scale_x,
            y: chunk[1] * scale_y,
            visibility: if stride > 3 { sigmoid(chunk[3]) } else { 1.0 },
        };
    }

    Ok(Some(Pose { landmarks }))
}
