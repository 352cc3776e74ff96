//! HTTP surface: liveness, health and image analysis.

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use facewatch_core::{AnalysisResponse, RecognitionService};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::engine::EngineHandle;
use crate::error::ApiResult;

/// Shared handler state. The recognition service is read-only.
#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
    pub service: Arc<RecognitionService>,
}

#[derive(Serialize)]
pub struct RootResponse {
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
    pub known_faces: usize,
}

/// Build the router with permissive CORS and request tracing.
pub fn create_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/analyze", post(analyze))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness marker.
async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "facewatch ML service is alive".to_string(),
    })
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        model: state.service.model_description(),
        known_faces: state.service.known_faces(),
    })
}

/// Body is the raw encoded image; no multipart wrapping.
async fn analyze(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<AnalysisResponse>> {
    tracing::debug!(bytes = body.len(), "analyze request");
    let response = state.engine.analyze(body.to_vec()).await?;
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::spawn_engine;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use facewatch_core::{
        build_gallery, DetectorError, FaceBox, FaceDetector, Prediction, Recognizer, RecognizerError, Trainer,
        TrainingSet,
    };
    use image::{GrayImage, Luma};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    /// One face per 32×32 tile whose centre pixel is bright; fails on 7-pixel-wide frames.
    struct TileDetector;

    impl FaceDetector for TileDetector {
        fn name(&self) -> &str {
            "tile"
        }

        fn detect(&mut self, gray: &[u8], width: u32, height: u32) -> Result<Vec<FaceBox>, DetectorError> {
            if width == 7 {
                return Err(DetectorError::InferenceFailed("tensor shape mismatch".into()));
            }
            let mut faces = Vec::new();
            for ty in 0..height / 32 {
                for tx in 0..width / 32 {
                    let (cx, cy) = (tx * 32 + 16, ty * 32 + 16);
                    if gray[(cy * width + cx) as usize] > 128 {
                        faces.push(FaceBox::new(tx * 32, ty * 32, 32, 32));
                    }
                }
            }
            Ok(faces)
        }
    }

    /// Labels a probe with the first enrolled crop it equals pixel for pixel
    /// (distance 0); anything else is 200 away from label 1.
    struct ExactTrainer;

    struct ExactModel(Vec<(u32, GrayImage)>);

    impl Trainer for ExactTrainer {
        fn train(&self, set: &TrainingSet) -> Result<Box<dyn Recognizer>, RecognizerError> {
            let samples = set.samples().iter().map(|s| (s.id, s.crop.clone())).collect();
            Ok(Box::new(ExactModel(samples)))
        }
    }

    impl Recognizer for ExactModel {
        fn name(&self) -> &str {
            "exact"
        }

        fn predict(&self, face: &GrayImage) -> Result<Prediction, RecognizerError> {
            let prediction = match self.0.iter().find(|(_, crop)| crop == face) {
                Some((label, _)) => Prediction {
                    label: *label,
                    distance: 0.0,
                },
                None => Prediction {
                    label: 1,
                    distance: 200.0,
                },
            };
            Ok(prediction)
        }
    }

    /// Textured bright tile; `seed` varies the texture.
    fn tile(seed: u32) -> GrayImage {
        GrayImage::from_fn(32, 32, |x, y| Luma([150 + ((x * seed + y * 3 + x * y) % 100) as u8]))
    }

    /// Row of tiles; `None` leaves a dark tile.
    fn scene(tiles: &[Option<u32>]) -> GrayImage {
        let mut img = GrayImage::from_pixel(32 * tiles.len() as u32, 32, Luma([5]));
        for (i, seed) in tiles.iter().enumerate() {
            if let Some(seed) = seed {
                image::imageops::replace(&mut img, &tile(*seed), i as i64 * 32, 0);
            }
        }
        img
    }

    fn png(img: &GrayImage) -> Vec<u8> {
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn router(service: RecognitionService) -> Router {
        let service = Arc::new(service);
        let engine = spawn_engine(vec![Box::new(TileDetector)], Arc::clone(&service)).unwrap();
        create_router(AppState { engine, service }, 1024 * 1024)
    }

    fn gallery_router(files: &[(&str, u32)]) -> Router {
        let tmp = tempfile::tempdir().unwrap();
        for (name, seed) in files {
            tile(*seed).save(tmp.path().join(name)).unwrap();
        }
        let gallery = build_gallery(tmp.path(), &mut TileDetector).unwrap();
        router(RecognitionService::build(gallery, &ExactTrainer, "tile").unwrap())
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn post_image(app: Router, bytes: Vec<u8>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/analyze")
            .header("content-type", "application/octet-stream")
            .body(Body::from(bytes))
            .unwrap();
        send(app, request).await
    }

    #[tokio::test]
    async fn test_root_is_alive() {
        let app = router(RecognitionService::disabled("tile"));
        let (status, body) = send(app, Request::get("/").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["message"].as_str().unwrap().contains("alive"));
    }

    #[tokio::test]
    async fn test_health_reports_known_faces() {
        let app = gallery_router(&[("alice.jpg", 7), ("bob.png", 11)]);
        let (status, body) = send(app, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok", "model": "tile+exact", "known_faces": 2}));
    }

    #[tokio::test]
    async fn test_health_without_gallery() {
        let app = router(RecognitionService::disabled("tile"));
        let (_, body) = send(app, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(body["known_faces"], 0);
        assert_eq!(body["model"], "tile");
    }

    #[tokio::test]
    async fn test_analyze_undecodable_body() {
        let app = router(RecognitionService::disabled("tile"));
        let (status, body) = post_image(app, b"this is not an image".to_vec()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"error": "Could not decode image"}));
        assert!(body.get("faces_detected").is_none());
    }

    #[tokio::test]
    async fn test_analyze_no_faces() {
        let app = gallery_router(&[("alice.png", 7)]);
        let (status, body) = post_image(app, png(&scene(&[None, None]))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"faces_detected": 0, "results": [], "matches_found": 0}));
    }

    #[tokio::test]
    async fn test_analyze_without_gallery_reports_unknown() {
        let app = router(RecognitionService::disabled("tile"));
        let (_, body) = post_image(app, png(&scene(&[Some(7), None, Some(11)]))).await;
        assert_eq!(
            body,
            json!({
                "faces_detected": 2,
                "results": [
                    {"face_box": [0, 0, 32, 32], "recognition": {"match": false, "name": "Unknown", "confidence": 0.0}},
                    {"face_box": [64, 0, 32, 32], "recognition": {"match": false, "name": "Unknown", "confidence": 0.0}}
                ],
                "matches_found": 0
            })
        );
    }

    #[tokio::test]
    async fn test_analyze_matches_enrolled_identity() {
        let app = gallery_router(&[("alice.png", 7), ("bob.png", 11)]);
        let (_, body) = post_image(app, png(&scene(&[None, Some(11)]))).await;
        assert_eq!(body["faces_detected"], 1);
        assert_eq!(body["matches_found"], 1);
        assert_eq!(body["results"][0]["face_box"], json!([32, 0, 32, 32]));
        assert_eq!(
            body["results"][0]["recognition"],
            json!({"match": true, "name": "bob", "confidence": 100.0})
        );
    }

    #[tokio::test]
    async fn test_analyze_is_idempotent() {
        let app = gallery_router(&[("alice.png", 7)]);
        let bytes = png(&scene(&[Some(7), Some(13), Some(29)]));
        let first = post_image(app.clone(), bytes.clone()).await;
        let second = post_image(app, bytes).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_detector_failure_is_server_error() {
        let app = router(RecognitionService::disabled("tile"));
        let img = GrayImage::from_pixel(7, 40, Luma([200]));
        let (status, body) = post_image(app, png(&img)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("face detection failed"));
    }
}
