//! facewatch-core — gallery enrollment and face matching.
//!
//! Detection runs SCRFD via ONNX Runtime; recognition uses OpenCV's LBPH
//! face recognizer trained once from a directory of reference images.

pub mod crop;
pub mod detector;
pub mod gallery;
pub mod matcher;
pub mod pipeline;
pub mod recognizer;
pub mod service;
pub mod types;

pub use detector::{DetectorError, FaceDetector, ScrfdDetector};
pub use gallery::{build_gallery, Gallery, GalleryEntry, GalleryError, IdentityMap, TrainingSet};
pub use pipeline::{analyze, AnalyzeError, DecodeError, DECODE_ERROR_MESSAGE};
#[cfg(feature = "opencv")]
pub use recognizer::LbphTrainer;
pub use recognizer::{Recognizer, RecognizerError, Trainer, MIN_CROP_SIZE};
pub use service::RecognitionService;
pub use types::{AnalysisResponse, FaceBox, FaceResult, MatchVerdict, Prediction};

use std::path::PathBuf;

/// Default directory holding the ONNX models: `$XDG_DATA_HOME/facewatch/models`,
/// falling back to `~/.local/share/facewatch/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facewatch")
        .join("models")
}
