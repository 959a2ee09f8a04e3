#![allow(dead_code)]

use std::collections::VecDeque;

use coach_core::pose::{
    Pose, PoseEstimator, LANDMARK_COUNT, RIGHT_ELBOW, RIGHT_SHOULDER, RIGHT_WRIST,
};
use coach_core::video::RgbFrame;
use coach_core::Result;

/// Replays a fixed list of estimation results, then reports no pose.
pub struct ScriptedEstimator {
    script: VecDeque<Result<Option<Pose>>>,
    /// Top-right pixel of every frame handed to `estimate`.
    pub seen_corner: Vec<Option<[u8; 3]>>,
}

impl ScriptedEstimator {
    pub fn new(poses: impl IntoIterator<Item = Option<Pose>>) -> Self {
        Self::from_results(poses.into_iter().map(Ok))
    }

    pub fn empty() -> Self {
        Self::from_results(Vec::new())
    }

    pub fn from_results(results: impl IntoIterator<Item = Result<Option<Pose>>>) -> Self {
        Self {
            script: results.into_iter().collect(),
            seen_corner: Vec::new(),
        }
    }
}

impl PoseEstimator for ScriptedEstimator {
    fn estimate(&mut self, frame: &RgbFrame) -> Result<Option<Pose>> {
        self.seen_corner
            .push(frame.pixel(frame.width.saturating_sub(1), 0));
        self.script.pop_front().unwrap_or(Ok(None))
    }
}

/// A push-up pose whose shoulder-to-wrist distance is `reach` pixels.
pub fn push_up_pose(reach: f32) -> Pose {
    let mut pose = Pose::from_points(&[(0.0, 0.0); LANDMARK_COUNT]).unwrap();
    pose.set_point(RIGHT_SHOULDER, (300.0, 60.0));
    pose.set_point(RIGHT_ELBOW, (300.0, 60.0 + reach / 2.0));
    pose.set_point(RIGHT_WRIST, (300.0, 60.0 + reach));
    pose
}

/// Arms bent (below the down threshold).
pub fn down() -> Option<Pose> {
    Some(push_up_pose(100.0))
}

/// Between the thresholds.
pub fn middle() -> Option<Pose> {
    Some(push_up_pose(190.0))
}

/// Arms extended (above the up threshold).
pub fn up() -> Option<Pose> {
    Some(push_up_pose(300.0))
}
