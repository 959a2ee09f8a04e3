use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use coach_core::{
    config::CoachConfig,
    counter::{ExerciseKind, ExerciseSession},
    diet::{generate_plan, ActivityLevel, DietPreference, DietRequest, GeminiClient},
    nutrition::{BmrInput, Gender},
    pipeline::{analyze_video, Analyzer, Renderer},
    pose::PoseDetector,
    rendering::Overlay,
    runtime::configure_ort_dylib,
    video::total_frames,
};

// ── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "fitness-coach",
    version,
    about = "Exercise rep counter, BMR calculator and diet planner",
    long_about = None
)]
struct Cli {
    /// Configuration file (missing file means defaults)
    #[arg(long, global = true, default_value = "coach.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Basal metabolic rate (Mifflin-St Jeor).
    Bmr {
        #[arg(long)]
        gender: Gender,

        /// Age in years (10–100)
        #[arg(long)]
        age: u32,

        /// Weight in kg (30–200)
        #[arg(long)]
        weight: f32,

        /// Height in cm (100–250)
        #[arg(long)]
        height: f32,
    },

    /// Count reps in a recorded video and save an annotated copy.
    Video {
        /// push-up, squat, bicep-curl or shoulder-press
        #[arg(short, long)]
        exercise: ExerciseKind,

        /// Input video path
        #[arg(short, long, default_value = "demo.mp4")]
        input: PathBuf,

        /// Output video path (default: output_<exercise>.mp4)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pose landmark ONNX model (overrides the config)
        #[arg(long)]
        model: Option<PathBuf>,
    },

    /// Count reps live from the webcam until the target is reached.
    Live {
        /// push-up, squat, bicep-curl or shoulder-press
        #[arg(short, long)]
        exercise: ExerciseKind,

        /// Number of reps to reach
        #[arg(short, long, default_value_t = 10,
              value_parser = clap::value_parser!(u32).range(1..=100))]
        target: u32,

        /// Camera index (overrides the config)
        #[arg(long)]
        camera: Option<i32>,

        /// Pose landmark ONNX model (overrides the config)
        #[arg(long)]
        model: Option<PathBuf>,
    },

    /// Ask a generative model for a personalised diet plan.
    Diet {
        #[arg(long)]
        gender: Gender,

        #[arg(long)]
        age: u32,

        /// Weight in kg
        #[arg(long)]
        weight: f32,

        /// Height in cm
        #[arg(long)]
        height: f32,

        /// sedentary, lightly-active, moderately-active or very-active
        #[arg(long)]
        activity: ActivityLevel,

        /// vegetarian, vegan, non-vegetarian, keto, high-protein or diabetic-friendly
        #[arg(long)]
        diet: DietPreference,
    },

    /// Manage the configuration file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write the default configuration.
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration.
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    // Respect RUST_LOG; default to info
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Bmr {
            gender,
            age,
            weight,
            height,
        } => cmd_bmr(gender, age, weight, height),
        Commands::Video {
            exercise,
            input,
            output,
            model,
        } => {
            let config = CoachConfig::load_or_default(&cli.config)?;
            cmd_video(config, exercise, input, output, model)
        }
        Commands::Live {
            exercise,
            target,
            camera,
            model,
        } => {
            let config = CoachConfig::load_or_default(&cli.config)?;
            cmd_live(config, exercise, target, camera, model)
        }
        Commands::Diet {
            gender,
            age,
            weight,
            height,
            activity,
            diet,
        } => {
            let config = CoachConfig::load_or_default(&cli.config)?;
            let request = DietRequest {
                gender,
                age,
                weight_kg: weight,
                height_cm: height,
                activity,
                preference: diet,
            };
            cmd_diet(config, request)
        }
        Commands::Config { action } => match action {
            ConfigAction::Init { force } => cmd_config_init(&cli.config, force),
            ConfigAction::Show => {
                let config = CoachConfig::load_or_default(&cli.config)?;
                cmd_config_show(&config)
            }
        },
    }
}

// ── BMR ───────────────────────────────────────────────────────────────────────

fn cmd_bmr(gender: Gender, age: u32, weight_kg: f32, height_cm: f32) -> Result<()> {
    let input = BmrInput {
        gender,
        age,
        weight_kg,
        height_cm,
    };
    input.validate()?;
    println!("Your BMR is: {:.2} calories/day", input.bmr());
    Ok(())
}

// ── Video analysis ────────────────────────────────────────────────────────────

fn cmd_video(
    mut config: CoachConfig,
    exercise: ExerciseKind,
    input: PathBuf,
    output: Option<PathBuf>,
    model: Option<PathBuf>,
) -> Result<()> {
    if !input.is_file() {
        bail!("input video not found: {}", input.display());
    }
    if let Some(model) = model {
        config.pose.model_path = model;
    }
    let output = output.unwrap_or_else(|| PathBuf::from(exercise.default_output()));

    info!("Video analysis — {exercise}");
    info!("  input  : {}", input.display());
    info!("  output : {}", output.display());

    let (mut analyzer, mut renderer) = build_pipeline(&config, exercise, None)?;

    let total = total_frames(&input);
    let pb = if total > 0 {
        progress_bar(total, "Counting reps…")
    } else {
        spinner("Counting reps…")
    };
    let pb2 = pb.clone();

    let report = analyze_video(
        &input,
        &output,
        total,
        &mut analyzer,
        &mut renderer,
        move |done, _total| pb2.set_position(done),
    )?;

    pb.finish_with_message("Done.");
    println!(
        "{}: {} reps counted in {} frames ({} with a pose)",
        report.exercise, report.reps, report.frames, report.frames_with_pose
    );
    println!("Annotated video saved to {}", report.output.display());
    Ok(())
}

// ── Live webcam session ──────────────────────────────────────────────────────

#[cfg(feature = "webcam")]
fn cmd_live(
    mut config: CoachConfig,
    exercise: ExerciseKind,
    target: u32,
    camera: Option<i32>,
    model: Option<PathBuf>,
) -> Result<()> {
    use coach_core::live::{
        camera::{Camera, Window},
        run_live, CancelFlag, StopReason,
    };

    if let Some(model) = model {
        config.pose.model_path = model;
    }
    if let Some(camera) = camera {
        config.live.camera_index = camera;
    }

    let form_video = exercise.form_video();
    if Path::new(form_video).is_file() {
        println!("Reference form video for {exercise}: {form_video}");
    }

    let (mut analyzer, mut renderer) = build_pipeline(&config, exercise, Some(target))?;
    let mut source = Camera::open(config.live.camera_index)?;
    let mut sink = Window::open(&config.live.window_title)?;

    info!("Live session — {exercise}, target {target} reps (press q or Esc to stop)");
    let report = run_live(
        &mut source,
        &mut sink,
        &mut analyzer,
        &mut renderer,
        &config.live,
        &CancelFlag::default(),
    )?;

    match report.stop {
        StopReason::GoalReached => println!("Goal reached! {} reps of {exercise}.", report.reps),
        StopReason::UserStopped | StopReason::Cancelled => {
            println!("Session stopped at {}/{target} reps of {exercise}.", report.reps)
        }
    }
    Ok(())
}

#[cfg(not(feature = "webcam"))]
fn cmd_live(
    _config: CoachConfig,
    exercise: ExerciseKind,
    _target: u32,
    _camera: Option<i32>,
    _model: Option<PathBuf>,
) -> Result<()> {
    let form_video = exercise.form_video();
    if Path::new(form_video).is_file() {
        println!("Reference form video for {exercise}: {form_video}");
    }
    bail!("live mode needs webcam support; rebuild with `--features webcam`")
}

// ── Diet plan ─────────────────────────────────────────────────────────────────

fn cmd_diet(config: CoachConfig, request: DietRequest) -> Result<()> {
    request.validate()?;
    let client = GeminiClient::from_env(&config.diet)?;

    let pb = spinner("Generating your diet plan…");
    let plan = generate_plan(&client, &request);
    pb.finish_and_clear();

    println!("{}", plan?);
    Ok(())
}

// ── Config file ───────────────────────────────────────────────────────────────

fn cmd_config_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists; pass --force to overwrite it",
            path.display()
        );
    }
    CoachConfig::default().save(path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &CoachConfig) -> Result<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn build_pipeline(
    config: &CoachConfig,
    exercise: ExerciseKind,
    target: Option<u32>,
) -> Result<(Analyzer<PoseDetector>, Renderer)> {
    configure_ort_dylib();
    let detector = PoseDetector::load(&config.pose).with_context(|| {
        format!(
            "failed to load pose model: {}",
            config.pose.model_path.display()
        )
    })?;

    let mut session = ExerciseSession::new(exercise, config.thresholds);
    if let Some(target) = target {
        session = session.with_target(target);
    }
    let overlay = Overlay::from_config(&config.overlay)?;
    Ok((Analyzer::new(detector, session), Renderer::new(overlay)))
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed_precise}]")
            .unwrap()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}

fn progress_bar(total: u64, msg: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {pos}/{len} frames ({eta})")
            .unwrap()
            .progress_chars("=> "),
    );
    pb.set_message(msg.to_string());
    pb
}
