use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facewatch_core::gallery::{list_unaccepted_files, scan_directory, Enrollment};
use facewatch_core::{
    AnalyzeError, FaceDetector, LbphTrainer, RecognitionService, ScrfdDetector, DECODE_ERROR_MESSAGE,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "facewatch", about = "facewatch gallery and face matching CLI")]
struct Cli {
    /// Directory containing det_10g.onnx
    #[arg(long, global = true, env = "FACEWATCH_MODEL_DIR")]
    model_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report, per reference image, whether it loads and how many faces it holds
    Check {
        /// Reference image directory
        dir: PathBuf,
    },
    /// Build the gallery and print the enrolled identities as JSON
    Gallery {
        /// Reference image directory
        dir: PathBuf,
    },
    /// Detect and identify faces in one image, printing the analysis JSON
    Analyze {
        /// Image to analyze
        image: PathBuf,
        /// Reference image directory
        #[arg(short, long, default_value = "missing_faces_db")]
        gallery: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let model_dir = cli.model_dir.unwrap_or_else(facewatch_core::default_model_dir);

    match cli.command {
        Commands::Check { dir } => check(&dir, &model_dir),
        Commands::Gallery { dir } => gallery(&dir, &model_dir),
        Commands::Analyze { image, gallery } => analyze(&image, &gallery, &model_dir),
    }
}

fn load_detector(model_dir: &Path) -> Result<ScrfdDetector> {
    ScrfdDetector::load_from_dir(model_dir)
        .with_context(|| format!("loading face detector from {}", model_dir.display()))
}

fn check(dir: &Path, model_dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        bail!("directory '{}' not found", dir.display());
    }

    let mut detector = load_detector(model_dir)?;
    println!("Checking faces in '{}'...", dir.display());

    for path in list_unaccepted_files(dir)? {
        let file = path.file_name().map(|f| f.to_string_lossy()).unwrap_or_default();
        println!("  {file}: skipped, not an accepted image type");
    }

    let outcomes = scan_directory(dir, &mut detector)?;
    if outcomes.is_empty() {
        println!("No reference images (.jpg, .jpeg, .png) found.");
        return Ok(());
    }

    let mut usable = 0usize;
    for (path, outcome) in &outcomes {
        let file = path.file_name().map(|f| f.to_string_lossy()).unwrap_or_default();
        match outcome {
            Enrollment::Enrolled { faces_found, .. } => {
                usable += 1;
                if *faces_found > 1 {
                    println!("  {file}: found {faces_found} faces (only the first is enrolled)");
                } else {
                    println!("  {file}: found 1 face");
                }
            }
            Enrollment::Skipped(reason) => println!("  {file}: skipped, {reason}"),
        }
    }

    println!("{usable} of {} reference images usable", outcomes.len());
    Ok(())
}

fn gallery(dir: &Path, model_dir: &Path) -> Result<()> {
    let mut detector = load_detector(model_dir)?;
    let gallery = facewatch_core::build_gallery(dir, &mut detector)?;

    let skipped: Vec<serde_json::Value> = gallery
        .skipped()
        .iter()
        .map(|(path, reason)| {
            serde_json::json!({
                "source_path": path,
                "reason": reason.to_string(),
            })
        })
        .collect();

    let report = serde_json::json!({
        "entries": gallery.entries(),
        "skipped": skipped,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn analyze(image: &Path, gallery_dir: &Path, model_dir: &Path) -> Result<()> {
    let bytes = std::fs::read(image).with_context(|| format!("reading {}", image.display()))?;

    let mut detector = load_detector(model_dir)?;
    let gallery = facewatch_core::build_gallery(gallery_dir, &mut detector)?;
    let detector_name = detector.name().to_string();
    let service = RecognitionService::build(gallery, &LbphTrainer::default(), &detector_name)
        .context("training recognizer")?;

    let output = match facewatch_core::analyze(&bytes, &mut detector, &service) {
        Ok(response) => serde_json::to_value(&response)?,
        Err(AnalyzeError::Decode(e)) => {
            tracing::debug!(error = %e, "decode failed");
            serde_json::json!({ "error": DECODE_ERROR_MESSAGE })
        }
        Err(e) => return Err(e.into()),
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
