use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Socket address the HTTP server binds to (default: 0.0.0.0:8000).
    pub bind_addr: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Directory of `<name>.<jpg|jpeg|png>` reference images.
    pub gallery_dir: PathBuf,
    /// Number of engine threads, each with its own detector session.
    pub engine_workers: usize,
    /// Largest accepted `/analyze` request body, in bytes.
    pub max_body_bytes: usize,
}

impl Config {
    /// Load configuration from `FACEWATCH_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("FACEWATCH_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| facewatch_core::default_model_dir());

        Self {
            bind_addr: std::env::var("FACEWATCH_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
            model_dir,
            gallery_dir: std::env::var("FACEWATCH_GALLERY_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("missing_faces_db")),
            engine_workers: env_usize("FACEWATCH_ENGINE_WORKERS", 1).max(1),
            max_body_bytes: env_usize("FACEWATCH_MAX_BODY_BYTES", 16 * 1024 * 1024),
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
