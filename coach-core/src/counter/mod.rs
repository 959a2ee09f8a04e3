//! counter — per-exercise rep counting state machine
//!
//! Each exercise reduces a pose to one or two measurements (joint angles or a
//! landmark distance) and compares them against a pair of fixed thresholds:
//!
//! ```text
//!   None ──down──▶ Down ──up──▶ Up (+1 rep) ──down──▶ Down ...
//! ```
//!
//! The down check runs before the up check on every frame.  A rep is counted
//! only on the Down → Up edge, so staying in either zone for many frames
//! never counts twice.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::geometry::{distance, joint_angle};
use crate::pose::{
    Pose, LEFT_ANKLE, LEFT_ELBOW, LEFT_HIP, LEFT_KNEE, LEFT_SHOULDER, LEFT_WRIST, RIGHT_ANKLE,
    RIGHT_ELBOW, RIGHT_HIP, RIGHT_KNEE, RIGHT_SHOULDER, RIGHT_WRIST,
};

// ── Exercise catalogue ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExerciseKind {
    PushUp,
    Squat,
    BicepCurl,
    ShoulderPress,
}

impl ExerciseKind {
    pub const ALL: [ExerciseKind; 4] = [
        ExerciseKind::PushUp,
        ExerciseKind::Squat,
        ExerciseKind::BicepCurl,
        ExerciseKind::ShoulderPress,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ExerciseKind::PushUp => "Push-Up",
            ExerciseKind::Squat => "Squat",
            ExerciseKind::BicepCurl => "Bicep Curl",
            ExerciseKind::ShoulderPress => "Shoulder Press",
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            ExerciseKind::PushUp => "push-up",
            ExerciseKind::Squat => "squat",
            ExerciseKind::BicepCurl => "bicep-curl",
            ExerciseKind::ShoulderPress => "shoulder-press",
        }
    }

    /// Default annotated-video file name for this exercise.
    pub fn default_output(&self) -> &'static str {
        match self {
            ExerciseKind::PushUp => "output_pushup.mp4",
            ExerciseKind::Squat => "output_squat.mp4",
            ExerciseKind::BicepCurl => "output_bicep.mp4",
            ExerciseKind::ShoulderPress => "output_shoulder.mp4",
        }
    }

    /// Reference clip showing correct form, looked up next to the binary.
    pub fn form_video(&self) -> &'static str {
        match self {
            ExerciseKind::PushUp => "push_up_form.mp4",
            ExerciseKind::Squat => "squat_form.mp4",
            ExerciseKind::BicepCurl => "curl_form.mp4",
            ExerciseKind::ShoulderPress => "shoulder_press_form.mp4",
        }
    }
}

impl fmt::Display for ExerciseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ExerciseKind {
    type Err = anyhow::Error;

    /// Accepts slugs (`push-up`), labels (`Push-Up`) and squashed forms
    /// (`pushup`, `bicep_curl`).
    fn from_str(s: &str) -> Result<Self> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match key.as_str() {
            "pushup" => Ok(ExerciseKind::PushUp),
            "squat" => Ok(ExerciseKind::Squat),
            "bicepcurl" | "curl" => Ok(ExerciseKind::BicepCurl),
            "shoulderpress" | "press" => Ok(ExerciseKind::ShoulderPress),
            _ => bail!(
                "unknown exercise '{s}' (expected one of: push-up, squat, bicep-curl, shoulder-press)"
            ),
        }
    }
}

// ── Thresholds ───────────────────────────────────────────────────────────────

/// Push-up: right shoulder ↔ right wrist distance in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushUpThresholds {
    pub down_below: f32,
    pub up_above: f32,
}

impl Default for PushUpThresholds {
    fn default() -> Self {
        Self {
            down_below: 130.0,
            up_above: 250.0,
        }
    }
}

/// Squat: right leg (hip-knee-ankle) and left leg angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SquatThresholds {
    pub down_right_above: f32,
    pub down_left_below: f32,
    pub up_right_below: f32,
    pub up_left_above: f32,
}

impl Default for SquatThresholds {
    fn default() -> Self {
        Self {
            down_right_above: 140.0,
            down_left_below: 240.0,
            up_right_below: 80.0,
            up_left_above: 270.0,
        }
    }
}

/// Bicep curl: left arm (shoulder-elbow-wrist) angle in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BicepCurlThresholds {
    pub down_below: f32,
    pub up_above: f32,
}

impl Default for BicepCurlThresholds {
    fn default() -> Self {
        Self {
            down_below: 230.0,
            up_above: 310.0,
        }
    }
}

/// Shoulder press: right and left arm angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShoulderPressThresholds {
    pub down_right_above: f32,
    pub down_left_below: f32,
    pub up_right_below: f32,
    pub up_left_above: f32,
}

impl Default for ShoulderPressThresholds {
    fn default() -> Self {
        Self {
            down_right_above: 315.0,
            down_left_below: 40.0,
            up_right_below: 240.0,
            up_left_above: 130.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub push_up: PushUpThresholds,
    pub squat: SquatThresholds,
    pub bicep_curl: BicepCurlThresholds,
    pub shoulder_press: ShoulderPressThresholds,
}

impl Thresholds {
    /// Reject tables where a single measurement can never leave the down zone
    /// for the up zone.
    pub fn validate(&self) -> Result<()> {
        let all = [
            ("push_up.down_below", self.push_up.down_below),
            ("push_up.up_above", self.push_up.up_above),
            ("squat.down_right_above", self.squat.down_right_above),
            ("squat.down_left_below", self.squat.down_left_below),
            ("squat.up_right_below", self.squat.up_right_below),
            ("squat.up_left_above", self.squat.up_left_above),
            ("bicep_curl.down_below", self.bicep_curl.down_below),
            ("bicep_curl.up_above", self.bicep_curl.up_above),
            ("shoulder_press.down_right_above", self.shoulder_press.down_right_above),
            ("shoulder_press.down_left_below", self.shoulder_press.down_left_below),
            ("shoulder_press.up_right_below", self.shoulder_press.up_right_below),
            ("shoulder_press.up_left_above", self.shoulder_press.up_left_above),
        ];
        for (name, value) in all {
            if !value.is_finite() {
                bail!("{name} = {value} is not a finite number");
            }
        }

        if self.push_up.down_below >= self.push_up.up_above {
            bail!(
                "push_up: down_below ({}) must be smaller than up_above ({})",
                self.push_up.down_below,
                self.push_up.up_above
            );
        }
        if self.bicep_curl.down_below >= self.bicep_curl.up_above {
            bail!(
                "bicep_curl: down_below ({}) must be smaller than up_above ({})",
                self.bicep_curl.down_below,
                self.bicep_curl.up_above
            );
        }
        // everything except the push-up distances is an angle
        for (name, value) in &all[2..] {
            if !(0.0..=360.0).contains(value) {
                bail!("{name} = {value} is not an angle in [0, 360]");
            }
        }
        if self.push_up.down_below < 0.0 {
            bail!("push_up.down_below must not be negative");
        }
        Ok(())
    }

    /// Evaluate the (down, up) zone conditions for one reading.
    fn zones(&self, reading: &Reading) -> (bool, bool) {
        match *reading {
            Reading::PushUp { shoulder_wrist, .. } => {
                let t = &self.push_up;
                (shoulder_wrist < t.down_below, shoulder_wrist > t.up_above)
            }
            Reading::Squat {
                right_leg,
                left_leg,
            } => {
                let t = &self.squat;
                (
                    right_leg > t.down_right_above && left_leg < t.down_left_below,
                    right_leg < t.up_right_below && left_leg > t.up_left_above,
                )
            }
            Reading::BicepCurl { left_arm, .. } => {
                let t = &self.bicep_curl;
                (left_arm < t.down_below, left_arm > t.up_above)
            }
            Reading::ShoulderPress {
                right_arm,
                left_arm,
            } => {
                let t = &self.shoulder_press;
                (
                    right_arm > t.down_right_above && left_arm < t.down_left_below,
                    right_arm < t.up_right_below && left_arm > t.up_left_above,
                )
            }
        }
    }
}

// ── Readings ─────────────────────────────────────────────────────────────────

/// The measurements one exercise takes from a pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    PushUp { shoulder_wrist: f32, right_arm: f32 },
    Squat { right_leg: f32, left_leg: f32 },
    BicepCurl { left_arm: f32, right_arm: f32 },
    ShoulderPress { right_arm: f32, left_arm: f32 },
}

const RIGHT_ARM: [usize; 3] = [RIGHT_SHOULDER, RIGHT_ELBOW, RIGHT_WRIST];
const LEFT_ARM: [usize; 3] = [LEFT_SHOULDER, LEFT_ELBOW, LEFT_WRIST];
const RIGHT_LEG: [usize; 3] = [RIGHT_HIP, RIGHT_KNEE, RIGHT_ANKLE];
const LEFT_LEG: [usize; 3] = [LEFT_HIP, LEFT_KNEE, LEFT_ANKLE];

fn limb_angle(pose: &Pose, limb: [usize; 3]) -> f32 {
    joint_angle(pose.point(limb[0]), pose.point(limb[1]), pose.point(limb[2]))
}

impl Reading {
    pub fn measure(kind: ExerciseKind, pose: &Pose) -> Self {
        match kind {
            ExerciseKind::PushUp => Reading::PushUp {
                shoulder_wrist: distance(pose.point(RIGHT_SHOULDER), pose.point(RIGHT_WRIST)),
                right_arm: limb_angle(pose, RIGHT_ARM),
            },
            ExerciseKind::Squat => Reading::Squat {
                right_leg: limb_angle(pose, RIGHT_LEG),
                left_leg: limb_angle(pose, LEFT_LEG),
            },
            ExerciseKind::BicepCurl => Reading::BicepCurl {
                left_arm: limb_angle(pose, LEFT_ARM),
                right_arm: limb_angle(pose, RIGHT_ARM),
            },
            ExerciseKind::ShoulderPress => Reading::ShoulderPress {
                right_arm: limb_angle(pose, RIGHT_ARM),
                left_arm: limb_angle(pose, LEFT_ARM),
            },
        }
    }

    pub fn kind(&self) -> ExerciseKind {
        match self {
            Reading::PushUp { .. } => ExerciseKind::PushUp,
            Reading::Squat { .. } => ExerciseKind::Squat,
            Reading::BicepCurl { .. } => ExerciseKind::BicepCurl,
            Reading::ShoulderPress { .. } => ExerciseKind::ShoulderPress,
        }
    }

    /// Angle to print on the overlay and the landmark it is drawn next to.
    pub fn display(&self) -> (usize, f32) {
        match *self {
            Reading::PushUp { right_arm, .. }
            | Reading::BicepCurl { right_arm, .. }
            | Reading::ShoulderPress { right_arm, .. } => (RIGHT_ELBOW, right_arm),
            Reading::Squat { right_leg, .. } => (RIGHT_KNEE, right_leg),
        }
    }

    /// Landmark triples (end, vertex, end) that were measured.
    pub fn limbs(&self) -> &'static [[usize; 3]] {
        match self {
            Reading::PushUp { .. } => &[RIGHT_ARM],
            Reading::Squat { .. } => &[RIGHT_LEG, LEFT_LEG],
            Reading::BicepCurl { .. } | Reading::ShoulderPress { .. } => &[RIGHT_ARM, LEFT_ARM],
        }
    }
}

// ── Session ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Down,
    Up,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Down => f.write_str("down"),
            Stage::Up => f.write_str("up"),
        }
    }
}

/// Result of feeding one pose into a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameUpdate {
    pub reading: Reading,
    pub completed_rep: bool,
}

/// Rep-counting state for one exercise run.
#[derive(Debug, Clone)]
pub struct ExerciseSession {
    kind: ExerciseKind,
    thresholds: Thresholds,
    stage: Option<Stage>,
    reps: u32,
    target_reps: Option<u32>,
}

impl ExerciseSession {
    pub fn new(kind: ExerciseKind, thresholds: Thresholds) -> Self {
        Self {
            kind,
            thresholds,
            stage: None,
            reps: 0,
            target_reps: None,
        }
    }

    pub fn with_target(mut self, target_reps: u32) -> Self {
        self.target_reps = Some(target_reps);
        self
    }

    pub fn kind(&self) -> ExerciseKind {
        self.kind
    }

    pub fn stage(&self) -> Option<Stage> {
        self.stage
    }

    pub fn reps(&self) -> u32 {
        self.reps
    }

    pub fn target_reps(&self) -> Option<u32> {
        self.target_reps
    }

    /// True once a target is set and the count has reached it.
    pub fn goal_reached(&self) -> bool {
        self.target_reps.is_some_and(|target| self.reps >= target)
    }

    /// Clear the stage and the count; the target is kept.
    pub fn reset(&mut self) {
        self.stage = None;
        self.reps = 0;
    }

    /// Measure `pose` for this session's exercise and advance the state machine.
    pub fn update(&mut self, pose: &Pose) -> FrameUpdate {
        let reading = Reading::measure(self.kind, pose);
        let completed_rep = self.observe(&reading);
        FrameUpdate {
            reading,
            completed_rep,
        }
    }

    /// Advance the state machine with a precomputed reading.  Returns true
    /// when this reading completed a rep.
    pub fn observe(&mut self, reading: &Reading) -> bool {
        let (down, up) = self.thresholds.zones(reading);
        if down {
            self.stage = Some(Stage::Down);
        }
        if up && self.stage == Some(Stage::Down) {
            self.stage = Some(Stage::Up);
            self.reps += 1;
            return true;
        }
        false
    }

    /// One-line human status, e.g. `Squat: 4/10 reps (in progress)`.
    pub fn progress_line(&self) -> String {
        match self.target_reps {
            Some(target) => {
                let status = if self.goal_reached() {
                    "goal reached"
                } else {
                    "in progress"
                };
                format!("{}: {}/{} reps ({status})", self.kind, self.reps, target)
            }
            None => format!("{}: {} reps", self.kind, self.reps),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::LANDMARK_COUNT;

    /// Place `limb` so the angle at its vertex equals `degrees`.
    fn set_limb(pose: &mut Pose, limb: [usize; 3], center: (f32, f32), degrees: f32) {
        let t = degrees.to_radians();
        pose.set_point(limb[0], (center.0 + 100.0, center.1));
        pose.set_point(limb[1], center);
        pose.set_point(limb[2], (center.0 + 100.0 * t.cos(), center.1 + 100.0 * t.sin()));
    }

    fn blank() -> Pose {
        Pose::from_points(&[(0.0, 0.0); LANDMARK_COUNT]).unwrap()
    }

    fn squat_pose(right: f32, left: f32) -> Pose {
        let mut pose = blank();
        set_limb(&mut pose, RIGHT_LEG, (300.0, 300.0), right);
        set_limb(&mut pose, LEFT_LEG, (100.0, 300.0), left);
        pose
    }

    fn curl_pose(left: f32) -> Pose {
        let mut pose = blank();
        set_limb(&mut pose, RIGHT_ARM, (300.0, 100.0), 180.0);
        set_limb(&mut pose, LEFT_ARM, (100.0, 100.0), left);
        pose
    }

    fn push_up_pose(shoulder_wrist: f32) -> Pose {
        let mut pose = blank();
        pose.set_point(RIGHT_SHOULDER, (200.0, 100.0));
        pose.set_point(RIGHT_ELBOW, (200.0, 100.0 + shoulder_wrist / 2.0));
        pose.set_point(RIGHT_WRIST, (200.0, 100.0 + shoulder_wrist));
        pose
    }

    fn press_pose(right: f32, left: f32) -> Pose {
        let mut pose = blank();
        set_limb(&mut pose, RIGHT_ARM, (300.0, 100.0), right);
        set_limb(&mut pose, LEFT_ARM, (100.0, 100.0), left);
        pose
    }

    fn session(kind: ExerciseKind) -> ExerciseSession {
        ExerciseSession::new(kind, Thresholds::default())
    }

    #[test]
    fn test_limb_helper_produces_requested_angle() {
        let pose = squat_pose(300.0, 45.0);
        match Reading::measure(ExerciseKind::Squat, &pose) {
            Reading::Squat {
                right_leg,
                left_leg,
            } => {
                assert!((right_leg - 300.0).abs() < 0.01);
                assert!((left_leg - 45.0).abs() < 0.01);
            }
            other => panic!("unexpected reading {other:?}"),
        }
    }

    #[test]
    fn test_push_up_counts_once_per_cycle() {
        let mut s = session(ExerciseKind::PushUp);
        for _ in 0..5 {
            assert!(!s.update(&push_up_pose(100.0)).completed_rep);
        }
        assert_eq!(s.stage(), Some(Stage::Down));
        assert!(s.update(&push_up_pose(300.0)).completed_rep);
        for _ in 0..5 {
            assert!(!s.update(&push_up_pose(300.0)).completed_rep);
        }
        assert_eq!(s.reps(), 1);
        assert_eq!(s.stage(), Some(Stage::Up));
    }

    #[test]
    fn test_push_up_without_down_never_counts() {
        let mut s = session(ExerciseKind::PushUp);
        for d in [200.0, 300.0, 260.0, 140.0, 400.0] {
            s.update(&push_up_pose(d));
        }
        assert_eq!(s.reps(), 0);
        assert_eq!(s.stage(), None);
    }

    #[test]
    fn test_squat_full_cycles() {
        let mut s = session(ExerciseKind::Squat);
        for _ in 0..3 {
            s.update(&squat_pose(170.0, 190.0)); // down zone
            s.update(&squat_pose(120.0, 250.0)); // between zones
            s.update(&squat_pose(60.0, 290.0)); // up zone
            s.update(&squat_pose(60.0, 290.0));
        }
        assert_eq!(s.reps(), 3);
    }

    #[test]
    fn test_squat_needs_both_legs() {
        let mut s = session(ExerciseKind::Squat);
        s.update(&squat_pose(170.0, 190.0));
        // right leg in the up zone but left leg not past 270
        s.update(&squat_pose(60.0, 260.0));
        assert_eq!(s.reps(), 0);
        s.update(&squat_pose(60.0, 275.0));
        assert_eq!(s.reps(), 1);
    }

    #[test]
    fn test_bicep_curl_oscillation_without_crossing_does_not_count() {
        let mut s = session(ExerciseKind::BicepCurl);
        s.update(&curl_pose(200.0));
        for _ in 0..10 {
            s.update(&curl_pose(290.0));
            s.update(&curl_pose(240.0));
        }
        assert_eq!(s.reps(), 0);
        s.update(&curl_pose(320.0));
        assert_eq!(s.reps(), 1);
    }

    #[test]
    fn test_shoulder_press_cycle() {
        let mut s = session(ExerciseKind::ShoulderPress);
        s.update(&press_pose(330.0, 20.0));
        assert_eq!(s.stage(), Some(Stage::Down));
        let update = s.update(&press_pose(200.0, 160.0));
        assert!(update.completed_rep);
        assert_eq!(update.reading.display().0, RIGHT_ELBOW);
        assert_eq!(s.reps(), 1);
    }

    #[test]
    fn test_reps_never_decrease() {
        let mut s = session(ExerciseKind::BicepCurl);
        let mut last = 0;
        for angle in [200.0, 320.0, 100.0, 350.0, 250.0, 10.0, 330.0, 300.0] {
            s.update(&curl_pose(angle));
            assert!(s.reps() >= last);
            assert!(s.reps() - last <= 1);
            last = s.reps();
        }
        assert_eq!(s.reps(), 3);
    }

    #[test]
    fn test_goal_and_reset() {
        let mut s = session(ExerciseKind::PushUp).with_target(2);
        assert!(!s.goal_reached());
        for _ in 0..2 {
            s.update(&push_up_pose(100.0));
            s.update(&push_up_pose(300.0));
        }
        assert!(s.goal_reached());
        assert_eq!(s.progress_line(), "Push-Up: 2/2 reps (goal reached)");

        s.reset();
        assert_eq!(s.reps(), 0);
        assert_eq!(s.stage(), None);
        assert_eq!(s.target_reps(), Some(2));
        assert!(!s.goal_reached());
    }

    #[test]
    fn test_custom_thresholds_apply() {
        let mut thresholds = Thresholds::default();
        thresholds.push_up.down_below = 50.0;
        let mut s = ExerciseSession::new(ExerciseKind::PushUp, thresholds);
        s.update(&push_up_pose(100.0));
        assert_eq!(s.stage(), None);
        s.update(&push_up_pose(40.0));
        assert_eq!(s.stage(), Some(Stage::Down));
    }

    #[test]
    fn test_threshold_validation() {
        assert!(Thresholds::default().validate().is_ok());

        let mut bad = Thresholds::default();
        bad.bicep_curl.down_below = 320.0;
        assert!(bad.validate().is_err());

        let mut bad = Thresholds::default();
        bad.squat.up_left_above = 400.0;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_non_finite_thresholds_rejected() {
        let mut bad = Thresholds::default();
        bad.push_up.down_below = f32::NAN;
        let err = bad.validate().unwrap_err();
        assert!(err.to_string().contains("push_up.down_below"));

        let mut bad = Thresholds::default();
        bad.push_up.up_above = f32::INFINITY;
        assert!(bad.validate().is_err());

        let mut bad = Thresholds::default();
        bad.shoulder_press.up_left_above = f32::NAN;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_parse_exercise_names() {
        assert_eq!("push-up".parse::<ExerciseKind>().unwrap(), ExerciseKind::PushUp);
        assert_eq!("Push-Up".parse::<ExerciseKind>().unwrap(), ExerciseKind::PushUp);
        assert_eq!("bicep_curl".parse::<ExerciseKind>().unwrap(), ExerciseKind::BicepCurl);
        assert_eq!(
            "Shoulder Press".parse::<ExerciseKind>().unwrap(),
            ExerciseKind::ShoulderPress
        );
        assert!("lunge".parse::<ExerciseKind>().is_err());
        for kind in ExerciseKind::ALL {
            assert_eq!(kind.slug().parse::<ExerciseKind>().unwrap(), kind);
        }
    }
}
