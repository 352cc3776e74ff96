//! Face recognition.
//!
//! [`Trainer`] turns a [`TrainingSet`] into a [`Recognizer`] in one batch call.
//! The shipped backend is OpenCV's Local Binary Patterns Histograms (LBPH)
//! face recognizer, built with the `opencv` feature (on by default).

use crate::gallery::TrainingSet;
use crate::types::Prediction;
use image::GrayImage;
use thiserror::Error;

pub const LBPH_RADIUS: u32 = 1;
pub const LBPH_NEIGHBORS: u32 = 8;
pub const LBPH_GRID: u32 = 8;

/// Smallest crop side LBPH accepts: every grid cell must hold at least one
/// LBP code after the `radius` border is consumed.
pub const MIN_CROP_SIZE: u32 = LBPH_GRID + 2 * LBPH_RADIUS;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("training set is empty")]
    EmptyTrainingSet,
    #[error("invalid face crop: {width}x{height} is smaller than {min_width}x{min_height}")]
    InvalidCrop {
        width: u32,
        height: u32,
        min_width: u32,
        min_height: u32,
    },
    #[error("training failed: {0}")]
    TrainingFailed(String),
    #[error("prediction failed: {0}")]
    PredictionFailed(String),
    #[cfg(feature = "opencv")]
    #[error("opencv error: {0}")]
    OpenCv(#[from] opencv::Error),
}

/// Trained recognition model. Immutable once built.
pub trait Recognizer: Send + Sync {
    /// Short algorithm name, reported on `/health`.
    fn name(&self) -> &str;

    /// Label and distance of the nearest enrolled face.
    fn predict(&self, face: &GrayImage) -> Result<Prediction, RecognizerError>;
}

/// Recognition training capability.
pub trait Trainer {
    /// Train on the full set in one call. Callers handle the empty set.
    fn train(&self, set: &TrainingSet) -> Result<Box<dyn Recognizer>, RecognizerError>;
}

/// Reject crops too small to histogram.
pub fn check_crop(face: &GrayImage) -> Result<(), RecognizerError> {
    let (width, height) = face.dimensions();
    if width < MIN_CROP_SIZE || height < MIN_CROP_SIZE {
        return Err(RecognizerError::InvalidCrop {
            width,
            height,
            min_width: MIN_CROP_SIZE,
            min_height: MIN_CROP_SIZE,
        });
    }
    Ok(())
}

#[cfg(feature = "opencv")]
pub use lbph::{LbphModel, LbphTrainer};

#[cfg(feature = "opencv")]
mod lbph {
    use super::*;
    use opencv::core::{Mat, Ptr, Vector};
    use opencv::face::LBPHFaceRecognizer;
    use opencv::prelude::*;
    use std::sync::Mutex;

    /// LBPH trainer parameters.
    #[derive(Debug, Clone, Copy)]
    pub struct LbphTrainer {
        radius: i32,
        neighbors: i32,
        grid_x: i32,
        grid_y: i32,
    }

    impl Default for LbphTrainer {
        fn default() -> Self {
            Self {
                radius: LBPH_RADIUS as i32,
                neighbors: LBPH_NEIGHBORS as i32,
                grid_x: LBPH_GRID as i32,
                grid_y: LBPH_GRID as i32,
            }
        }
    }

    impl Trainer for LbphTrainer {
        fn train(&self, set: &TrainingSet) -> Result<Box<dyn Recognizer>, RecognizerError> {
            if set.is_empty() {
                return Err(RecognizerError::EmptyTrainingSet);
            }

            let mut images = Vector::<Mat>::with_capacity(set.len());
            let mut labels = Vector::<i32>::with_capacity(set.len());
            for sample in set.samples() {
                check_crop(&sample.crop)?;
                let label = i32::try_from(sample.id).map_err(|_| {
                    RecognizerError::TrainingFailed(format!("label {} out of range", sample.id))
                })?;
                images.push(to_mat(&sample.crop)?);
                labels.push(label);
            }

            // No rejection threshold: the match rule is applied by the caller.
            let mut model = LBPHFaceRecognizer::create(
                self.radius,
                self.neighbors,
                self.grid_x,
                self.grid_y,
                f64::MAX,
            )?;
            model.train(&images, &labels)?;

            tracing::info!(
                samples = set.len(),
                radius = self.radius,
                neighbors = self.neighbors,
                grid_x = self.grid_x,
                grid_y = self.grid_y,
                "LBPH model trained"
            );

            Ok(Box::new(LbphModel {
                model: Mutex::new(model),
            }))
        }
    }

    /// Trained OpenCV LBPH model.
    pub struct LbphModel {
        model: Mutex<Ptr<LBPHFaceRecognizer>>,
    }

    impl Recognizer for LbphModel {
        fn name(&self) -> &str {
            "lbph"
        }

        fn predict(&self, face: &GrayImage) -> Result<Prediction, RecognizerError> {
            check_crop(face)?;
            let probe = to_mat(face)?;

            let model = self
                .model
                .lock()
                .map_err(|_| RecognizerError::PredictionFailed("model lock poisoned".into()))?;
            let mut label = -1;
            let mut distance = f64::MAX;
            model.predict(&probe, &mut label, &mut distance)?;

            let label = u32::try_from(label).map_err(|_| {
                RecognizerError::PredictionFailed(format!("no label for probe (got {label})"))
            })?;
            Ok(Prediction { label, distance })
        }
    }

    /// Copy a grayscale image into an owned single-channel `Mat`.
    fn to_mat(image: &GrayImage) -> Result<Mat, RecognizerError> {
        let rows = image.height() as i32;
        let cols = image.width() as i32;
        let view = Mat::new_rows_cols_with_data(rows, cols, image.as_raw().as_slice())?;
        Ok(view.try_clone()?)
    }
}
