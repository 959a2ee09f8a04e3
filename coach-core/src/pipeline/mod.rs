use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::counter::{ExerciseKind, ExerciseSession, FrameUpdate};
use crate::pose::{Pose, PoseEstimator};
use crate::rendering::Overlay;
use crate::video::{transcode_with_progress, RgbFrame};

const PROFILE_EVERY: u64 = 300;

/// What the analyzer learned from one frame.
#[derive(Debug, Clone, Default)]
pub struct FrameAnalysis {
    pub pose: Option<Pose>,
    pub update: Option<FrameUpdate>,
}

impl FrameAnalysis {
    pub fn completed_rep(&self) -> bool {
        self.update.is_some_and(|u| u.completed_rep)
    }
}

/// Pose estimation plus the rep-counting session it drives.
pub struct Analyzer<E> {
    estimator: E,
    session: ExerciseSession,
    frames_with_pose: u64,
    prof_frames: u64,
    prof_estimate: Duration,
}

impl<E: PoseEstimator> Analyzer<E> {
    pub fn new(estimator: E, session: ExerciseSession) -> Self {
        Self {
            estimator,
            session,
            frames_with_pose: 0,
            prof_frames: 0,
            prof_estimate: Duration::ZERO,
        }
    }

    pub fn session(&self) -> &ExerciseSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut ExerciseSession {
        &mut self.session
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    pub fn frames_with_pose(&self) -> u64 {
        self.frames_with_pose
    }

    pub fn into_session(self) -> ExerciseSession {
        self.session
    }

    /// Detect a pose and, when one is found, advance the rep counter.
    /// Frames without landmarks leave the session untouched.
    pub fn analyze(&mut self, frame: &RgbFrame) -> FrameAnalysis {
        let estimate_start = Instant::now();
        let pose = match self.estimator.estimate(frame) {
            Ok(pose) => pose,
            Err(e) => {
                tracing::warn!("pose estimation error: {e:#}");
                None
            }
        };
        self.prof_estimate += estimate_start.elapsed();

        let update = pose.as_ref().map(|p| self.session.update(p));
        match &update {
            Some(u) => {
                self.frames_with_pose += 1;
                if u.completed_rep {
                    debug!(reps = self.session.reps(), "rep completed");
                }
            }
            None => debug!(pts = frame.pts, "no landmarks; counter skipped"),
        }

        self.prof_frames += 1;
        if self.prof_frames % PROFILE_EVERY == 0 {
            info!(
                frames = self.prof_frames,
                estimate_ms_per_frame = format!(
                    "{:.2}",
                    self.prof_estimate.as_secs_f64() * 1000.0 / self.prof_frames as f64
                ),
                "pipeline analyze timings"
            );
        }

        FrameAnalysis { pose, update }
    }
}

/// Draws the overlay for an analysed frame.
pub struct Renderer {
    overlay: Overlay,
    prof_frames: u64,
    prof_render: Duration,
}

impl Renderer {
    pub fn new(overlay: Overlay) -> Self {
        Self {
            overlay,
            prof_frames: 0,
            prof_render: Duration::ZERO,
        }
    }

    pub fn render(&mut self, frame: &mut RgbFrame, analysis: &FrameAnalysis, reps: u32) {
        let render_start = Instant::now();
        let reading = analysis.update.as_ref().map(|u| &u.reading);
        let result = self
            .overlay
            .draw(frame, reps, analysis.pose.as_ref(), reading);
        self.prof_render += render_start.elapsed();
        self.prof_frames += 1;

        if let Err(e) = result {
            tracing::warn!("render error: {e}");
        }

        if self.prof_frames % PROFILE_EVERY == 0 {
            info!(
                frames = self.prof_frames,
                render_ms_per_frame = format!(
                    "{:.2}",
                    self.prof_render.as_secs_f64() * 1000.0 / self.prof_frames as f64
                ),
                "pipeline render timings"
            );
        }
    }
}

/// Analyse, annotate and emit one frame.
pub fn process_frame<E: PoseEstimator>(
    analyzer: &mut Analyzer<E>,
    renderer: &mut Renderer,
    frame: &mut RgbFrame,
) -> FrameAnalysis {
    let analysis = analyzer.analyze(frame);
    renderer.render(frame, &analysis, analyzer.session().reps());
    analysis
}

/// Outcome of an offline video analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoReport {
    pub exercise: ExerciseKind,
    pub reps: u32,
    pub frames: u64,
    pub frames_with_pose: u64,
    pub output: PathBuf,
}

/// Count reps through a whole video file and write the annotated copy to
/// `output`.  `progress(done, total)` is forwarded from the transcoder.
pub fn analyze_video<E, P, Q, G>(
    input: P,
    output: Q,
    total_frames: u64,
    analyzer: &mut Analyzer<E>,
    renderer: &mut Renderer,
    progress: G,
) -> Result<VideoReport>
where
    E: PoseEstimator,
    P: AsRef<Path>,
    Q: AsRef<Path>,
    G: FnMut(u64, u64),
{
    let output = output.as_ref().to_path_buf();
    info!(
        exercise = %analyzer.session().kind(),
        input = %input.as_ref().display(),
        output = %output.display(),
        "analysing video"
    );

    let frames = transcode_with_progress(
        input,
        &output,
        total_frames,
        |frame| {
            process_frame(analyzer, renderer, frame);
        },
        progress,
    )
    .context("video analysis failed")?;

    Ok(VideoReport {
        exercise: analyzer.session().kind(),
        reps: analyzer.session().reps(),
        frames,
        frames_with_pose: analyzer.frames_with_pose(),
        output,
    })
}
