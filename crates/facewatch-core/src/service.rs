//! Immutable recognition state shared by every request.

use crate::gallery::{Gallery, GalleryEntry, IdentityMap};
use crate::matcher;
use crate::recognizer::{Recognizer, RecognizerError, Trainer};
use crate::types::MatchVerdict;
use image::GrayImage;

/// Gallery entries, identity names and the trained model (if any).
///
/// Built once at startup and only read afterwards; share it as
/// `Arc<RecognitionService>`. A rebuilt gallery means a new service value.
pub struct RecognitionService {
    entries: Vec<GalleryEntry>,
    identities: IdentityMap,
    model: Option<Box<dyn Recognizer>>,
    detector_name: String,
}

impl RecognitionService {
    /// Train on `gallery`. An empty gallery yields a service with recognition
    /// disabled; a training failure on a non-empty one is returned as-is.
    pub fn build(
        gallery: Gallery,
        trainer: &dyn Trainer,
        detector_name: &str,
    ) -> Result<Self, RecognizerError> {
        let model = if gallery.training_set().is_empty() {
            tracing::warn!("no enrolled faces; recognition disabled");
            None
        } else {
            Some(trainer.train(gallery.training_set())?)
        };

        let (entries, identities, _) = gallery.into_parts();

        if let Some(model) = &model {
            tracing::info!(
                known_faces = entries.len(),
                model = model.name(),
                "recognition model ready"
            );
        }

        Ok(Self {
            entries,
            identities,
            model,
            detector_name: detector_name.to_string(),
        })
    }

    /// Service with no gallery; every face is reported unknown.
    pub fn disabled(detector_name: &str) -> Self {
        Self {
            entries: Vec::new(),
            identities: IdentityMap::default(),
            model: None,
            detector_name: detector_name.to_string(),
        }
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn known_faces(&self) -> usize {
        self.entries.len()
    }

    pub fn is_enabled(&self) -> bool {
        self.model.is_some()
    }

    /// `"<detector>+<recognizer>"`, or just the detector when recognition is disabled.
    pub fn model_description(&self) -> String {
        match &self.model {
            Some(model) => format!("{}+{}", self.detector_name, model.name()),
            None => self.detector_name.clone(),
        }
    }

    pub fn match_face(&self, face: &GrayImage) -> MatchVerdict {
        matcher::match_face(face, self.model.as_deref(), &self.identities)
    }
}
