use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facegate::presenter::{self, Level};
use facegate::{
    config, identity, AuthError, CameraSource, EnrollmentStore, FaceEngine, Manager, Outcome,
    Request, Settings, StillCamera,
};
use log::{error, info, warn};

#[derive(Parser)]
#[command(name = "facegate")]
#[command(version, about = "Face recognition login - register and authenticate with a webcam")]
struct Cli {
    /// Config file (defaults to the per-user config location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Read frames from an image file or directory instead of the webcam
    #[arg(long, global = true)]
    frame: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new face from the camera
    Register {
        /// Name to register (defaults to current user)
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Identify the person in front of the camera
    Authenticate,
    /// List registered names
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Open config file in editor
    Config,
}

fn main() -> Result<ExitCode> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();
    let cfg = config::load_config(config_path)?;

    match cli.command {
        Commands::Register { name } => {
            let name = match name {
                Some(name) => name,
                None => identity::current_user_name()?,
            };
            info!("Registering: {}", name);
            run_workflow(&cfg, cli.frame, Request::register(name))
        }
        Commands::Authenticate => {
            info!("Authenticating");
            run_workflow(&cfg, cli.frame, Request::Authenticate)
        }
        Commands::List { json } => list(&cfg, json),
        Commands::Config => open_config(config_path.unwrap_or(config::CONFIG_PATH.as_path())),
    }
}

fn run_workflow(
    cfg: &config::Config,
    frame: Option<PathBuf>,
    request: Request,
) -> Result<ExitCode> {
    let store = EnrollmentStore::load(&cfg.store_path)
        .with_context(|| format!("loading enrollments from {}", cfg.store_path.display()))?;
    // Settle what the store alone can decide before loading models or opening devices
    let request = match request.validate(&store) {
        Ok(request) => request,
        Err(e) => return Ok(report(&Err(e))),
    };

    if let Some(path) = frame {
        return drive(cfg, store, StillCamera::new(path), request);
    }
    webcam_workflow(cfg, store, request)
}

#[cfg(feature = "v4l")]
fn webcam_workflow(
    cfg: &config::Config,
    store: EnrollmentStore,
    request: Request,
) -> Result<ExitCode> {
    info!("Opening camera: {}", cfg.camera);
    drive(cfg, store, facegate_vision::Camera::new(&cfg.camera), request)
}

#[cfg(not(feature = "v4l"))]
fn webcam_workflow(
    cfg: &config::Config,
    store: EnrollmentStore,
    request: Request,
) -> Result<ExitCode> {
    if Path::new(&cfg.camera).starts_with("/dev") {
        anyhow::bail!(
            "webcam support not compiled in (enable the `v4l` feature), \
             pass --frame to use image files"
        );
    }
    drive(cfg, store, StillCamera::new(&cfg.camera), request)
}

fn drive<C: CameraSource>(
    cfg: &config::Config,
    store: EnrollmentStore,
    camera: C,
    request: Request,
) -> Result<ExitCode> {
    let engine = load_engine(cfg)?;
    let mut manager = Manager::new(store, camera, engine, Settings::from(cfg));
    Ok(report(&manager.run(request)))
}

fn report(result: &Result<Outcome, AuthError>) -> ExitCode {
    let message = presenter::render(result);
    match message.level {
        Level::Success => info!("✓ {}", message),
        Level::Retry => warn!("{}", message),
        Level::Error => error!("{}", message),
    }

    if result.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(feature = "onnx")]
fn load_engine(cfg: &config::Config) -> Result<Box<dyn FaceEngine>> {
    let engine = facegate_vision::OnnxEngine::load(&cfg.detector_model, &cfg.recognizer_model)
        .context("Failed to initialize face recognition pipeline")?
        .with_thresholds(cfg.score_threshold, cfg.nms_threshold);
    Ok(Box::new(engine))
}

#[cfg(not(feature = "onnx"))]
fn load_engine(_cfg: &config::Config) -> Result<Box<dyn FaceEngine>> {
    anyhow::bail!("face recognition not compiled in (enable the `onnx` feature)")
}

fn list(cfg: &config::Config, json: bool) -> Result<ExitCode> {
    let store = EnrollmentStore::load(&cfg.store_path)
        .with_context(|| format!("loading enrollments from {}", cfg.store_path.display()))?;

    if json {
        let out = serde_json::json!({
            "store": store.path(),
            "dimension": store.dimension(),
            "names": store.names().collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else if store.is_empty() {
        info!("No faces registered yet");
    } else {
        for name in store.names() {
            println!("{name}");
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn open_config(path: &Path) -> Result<ExitCode> {
    if !path.exists() {
        config::save_config(&config::Config::default(), Some(path))
            .with_context(|| format!("writing default config to {}", path.display()))?;
    }
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {}", path.display());

    let status = std::process::Command::new(editor)
        .arg(path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(ExitCode::SUCCESS)
}
