mod common;

use anyhow::{bail, Result};
use coach_core::counter::{ExerciseKind, ExerciseSession, Thresholds};
use coach_core::live::{
    run_live, CancelFlag, FrameSink, FrameSource, LiveConfig, SinkControl, StopReason,
};
use coach_core::pipeline::{Analyzer, Renderer};
use coach_core::rendering::Overlay;
use coach_core::video::RgbFrame;

use common::{down, up, ScriptedEstimator};

/// Blank frames with a red top-left pixel; fails once `limit` frames were read.
struct ScriptedSource {
    width: u32,
    height: u32,
    limit: Option<u64>,
    reads: u64,
}

impl ScriptedSource {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            limit: None,
            reads: 0,
        }
    }

    fn failing_after(mut self, frames: u64) -> Self {
        self.limit = Some(frames);
        self
    }
}

impl FrameSource for ScriptedSource {
    fn read(&mut self) -> Result<RgbFrame> {
        if self.limit.is_some_and(|limit| self.reads >= limit) {
            bail!("device unplugged");
        }
        let mut frame = RgbFrame::blank(self.width, self.height);
        frame.data[..3].copy_from_slice(&[255, 0, 0]);
        frame.pts = self.reads as i64;
        self.reads += 1;
        Ok(frame)
    }
}

/// Records shown frame sizes; asks to stop after `stop_after` frames.
#[derive(Default)]
struct RecordingSink {
    shown: Vec<(u32, u32)>,
    stop_after: Option<usize>,
}

impl FrameSink for RecordingSink {
    fn show(&mut self, frame: &RgbFrame) -> Result<SinkControl> {
        self.shown.push((frame.width, frame.height));
        if self.stop_after.is_some_and(|n| self.shown.len() >= n) {
            return Ok(SinkControl::Stop);
        }
        Ok(SinkControl::Continue)
    }
}

fn settings() -> LiveConfig {
    LiveConfig {
        frame_delay_ms: 0,
        ..LiveConfig::default()
    }
}

fn analyzer(script: ScriptedEstimator, target: u32) -> Analyzer<ScriptedEstimator> {
    let session =
        ExerciseSession::new(ExerciseKind::PushUp, Thresholds::default()).with_target(target);
    Analyzer::new(script, session)
}

#[test]
fn stops_when_target_is_reached() {
    let mut source = ScriptedSource::new(640, 480);
    let mut sink = RecordingSink::default();
    let mut analyzer = analyzer(
        ScriptedEstimator::new([down(), up(), down(), up(), down(), up()]),
        2,
    );
    let mut renderer = Renderer::new(Overlay::new(None));

    let report = run_live(
        &mut source,
        &mut sink,
        &mut analyzer,
        &mut renderer,
        &settings(),
        &CancelFlag::default(),
    )
    .unwrap();

    assert_eq!(report.stop, StopReason::GoalReached);
    assert_eq!(report.reps, 2);
    assert_eq!(report.frames, 4);
    assert_eq!(sink.shown.len(), 4);
    assert!(analyzer.session().goal_reached());
}

#[test]
fn user_can_stop_from_the_display() {
    let mut source = ScriptedSource::new(640, 480);
    let mut sink = RecordingSink {
        stop_after: Some(3),
        ..RecordingSink::default()
    };
    let mut analyzer = analyzer(ScriptedEstimator::new([down(), up()]), 10);
    let mut renderer = Renderer::new(Overlay::new(None));

    let report = run_live(
        &mut source,
        &mut sink,
        &mut analyzer,
        &mut renderer,
        &settings(),
        &CancelFlag::default(),
    )
    .unwrap();

    assert_eq!(report.stop, StopReason::UserStopped);
    assert_eq!(report.frames, 3);
    assert_eq!(report.reps, 1);
}

#[test]
fn cancelled_session_reads_nothing() {
    let mut source = ScriptedSource::new(640, 480);
    let mut sink = RecordingSink::default();
    let mut analyzer = analyzer(ScriptedEstimator::empty(), 10);
    let mut renderer = Renderer::new(Overlay::new(None));

    let cancel = CancelFlag::default();
    cancel.clone().cancel();
    assert!(cancel.is_cancelled());

    let report = run_live(
        &mut source,
        &mut sink,
        &mut analyzer,
        &mut renderer,
        &settings(),
        &cancel,
    )
    .unwrap();

    assert_eq!(report.stop, StopReason::Cancelled);
    assert_eq!(report.frames, 0);
    assert_eq!(source.reads, 0);
    assert!(sink.shown.is_empty());
}

#[test]
fn read_failure_ends_the_session_with_an_error() {
    let mut source = ScriptedSource::new(640, 480).failing_after(2);
    let mut sink = RecordingSink::default();
    let mut analyzer = analyzer(ScriptedEstimator::new([down(), up()]), 10);
    let mut renderer = Renderer::new(Overlay::new(None));

    let err = run_live(
        &mut source,
        &mut sink,
        &mut analyzer,
        &mut renderer,
        &settings(),
        &CancelFlag::default(),
    )
    .unwrap_err();

    assert!(format!("{err:#}").contains("failed to read from webcam"));
    assert_eq!(sink.shown.len(), 2);
    assert_eq!(analyzer.session().reps(), 1);
}

#[test]
fn frames_are_mirrored_and_scaled_for_display() {
    let mut source = ScriptedSource::new(1280, 720);
    let mut sink = RecordingSink {
        stop_after: Some(1),
        ..RecordingSink::default()
    };
    let mut analyzer = analyzer(ScriptedEstimator::empty(), 10);
    let mut renderer = Renderer::new(Overlay::new(None));

    run_live(
        &mut source,
        &mut sink,
        &mut analyzer,
        &mut renderer,
        &settings(),
        &CancelFlag::default(),
    )
    .unwrap();

    // the red top-left pixel ends up top-right before detection
    assert_eq!(analyzer.estimator().seen_corner, vec![Some([255, 0, 0])]);
    assert_eq!(sink.shown, vec![(640, 360)]);
}

#[test]
fn mirroring_can_be_disabled() {
    let mut source = ScriptedSource::new(640, 480);
    let mut sink = RecordingSink {
        stop_after: Some(1),
        ..RecordingSink::default()
    };
    let mut analyzer = analyzer(ScriptedEstimator::empty(), 10);
    let mut renderer = Renderer::new(Overlay::new(None));
    let settings = LiveConfig {
        mirror: false,
        ..settings()
    };

    run_live(
        &mut source,
        &mut sink,
        &mut analyzer,
        &mut renderer,
        &settings,
        &CancelFlag::default(),
    )
    .unwrap();

    assert_eq!(analyzer.estimator().seen_corner, vec![Some([0, 0, 0])]);
    assert_eq!(sink.shown, vec![(640, 480)]);
}
