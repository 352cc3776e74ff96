//! Single-image analysis: decode, detect, match every face.

use crate::crop::crop_face;
use crate::detector::{DetectorError, FaceDetector};
use crate::service::RecognitionService;
use crate::types::{AnalysisResponse, FaceResult, MatchVerdict};
use image::GrayImage;
use thiserror::Error;

/// Message returned to callers for undecodable input.
pub const DECODE_ERROR_MESSAGE: &str = "Could not decode image";

#[derive(Error, Debug)]
#[error("could not decode image: {0}")]
pub struct DecodeError(#[from] image::ImageError);

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
}

/// Decode encoded image bytes (any format the `image` crate recognizes) to grayscale.
pub fn decode_grayscale(bytes: &[u8]) -> Result<GrayImage, DecodeError> {
    Ok(image::load_from_memory(bytes)?.to_luma8())
}

/// Analyze one encoded image end to end.
pub fn analyze(
    bytes: &[u8],
    detector: &mut dyn FaceDetector,
    service: &RecognitionService,
) -> Result<AnalysisResponse, AnalyzeError> {
    let gray = decode_grayscale(bytes)?;
    analyze_image(&gray, detector, service)
}

/// Analyze an already decoded grayscale image.
pub fn analyze_image(
    gray: &GrayImage,
    detector: &mut dyn FaceDetector,
    service: &RecognitionService,
) -> Result<AnalysisResponse, AnalyzeError> {
    let faces = detector.detect(gray.as_raw(), gray.width(), gray.height())?;

    let results: Vec<FaceResult> = faces
        .iter()
        .map(|face| {
            let recognition = match crop_face(gray, face) {
                Some(crop) => service.match_face(&crop),
                None => {
                    tracing::warn!(?face, "face box outside image; reporting as unknown");
                    MatchVerdict::unknown()
                }
            };
            FaceResult {
                face_box: face.to_array(),
                recognition,
            }
        })
        .collect();

    let response = AnalysisResponse::from_results(results);
    tracing::debug!(
        width = gray.width(),
        height = gray.height(),
        faces_detected = response.faces_detected,
        matches_found = response.matches_found,
        "image analyzed"
    );
    Ok(response)
}
