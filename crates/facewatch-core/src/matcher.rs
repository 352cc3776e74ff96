//! Distance-threshold matching of a face crop against a trained recognizer.

use crate::gallery::IdentityMap;
use crate::recognizer::Recognizer;
use crate::types::{MatchVerdict, Prediction};
use image::GrayImage;

/// Predictions strictly below this distance count as a match.
pub const DISTANCE_THRESHOLD: f64 = 85.0;

/// Display confidence for a recognizer distance: `clamp(100 - distance, 0, 100)`
/// rounded to two decimals. Not a calibrated probability.
pub fn confidence_from_distance(distance: f64) -> f64 {
    if distance.is_nan() {
        return 0.0;
    }
    let raw = (100.0 - distance).clamp(0.0, 100.0);
    (raw * 100.0).round() / 100.0
}

/// Turn a prediction into a verdict. Names come from `identities`; labels
/// missing from the map are reported as unknown.
pub fn verdict_for(prediction: Prediction, identities: &IdentityMap) -> MatchVerdict {
    let confidence = confidence_from_distance(prediction.distance);
    let matched = prediction.distance < DISTANCE_THRESHOLD;
    let name = if matched {
        identities.get(prediction.label).unwrap_or(MatchVerdict::UNKNOWN)
    } else {
        MatchVerdict::UNKNOWN
    };

    MatchVerdict {
        matched,
        name: name.to_string(),
        confidence,
    }
}

/// Match one face crop. Without a model the verdict is always unknown with
/// zero confidence; a failed prediction is logged and treated the same way.
pub fn match_face(
    face: &GrayImage,
    model: Option<&dyn Recognizer>,
    identities: &IdentityMap,
) -> MatchVerdict {
    let Some(model) = model else {
        return MatchVerdict::unknown();
    };

    match model.predict(face) {
        Ok(prediction) => {
            let verdict = verdict_for(prediction, identities);
            tracing::debug!(
                label = prediction.label,
                distance = prediction.distance,
                matched = verdict.matched,
                "face matched against gallery"
            );
            verdict
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                width = face.width(),
                height = face.height(),
                "prediction failed; reporting face as unknown"
            );
            MatchVerdict::unknown()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::RecognizerError;

    /// Returns a fixed prediction, or fails for crops narrower than 4 pixels.
    struct FixedRecognizer(Prediction);

    impl Recognizer for FixedRecognizer {
        fn name(&self) -> &str {
            "fixed"
        }

        fn predict(&self, face: &GrayImage) -> Result<Prediction, RecognizerError> {
            if face.width() < 4 {
                return Err(RecognizerError::InvalidCrop {
                    width: face.width(),
                    height: face.height(),
                    min_width: 4,
                    min_height: 1,
                });
            }
            Ok(self.0)
        }
    }

    fn identities() -> IdentityMap {
        let mut map = IdentityMap::default();
        map.insert(1, "alice".into());
        map.insert(2, "bob".into());
        map
    }

    fn predict(label: u32, distance: f64) -> MatchVerdict {
        verdict_for(Prediction { label, distance }, &identities())
    }

    #[test]
    fn test_confidence_mapping() {
        assert_eq!(confidence_from_distance(0.0), 100.0);
        assert_eq!(confidence_from_distance(40.0), 60.0);
        assert_eq!(confidence_from_distance(100.0), 0.0);
        assert_eq!(confidence_from_distance(250.0), 0.0);
        assert_eq!(confidence_from_distance(-3.0), 100.0);
        assert_eq!(confidence_from_distance(f64::NAN), 0.0);
        assert_eq!(confidence_from_distance(12.3456), 87.65);
    }

    #[test]
    fn test_confidence_is_monotonic_and_bounded() {
        let mut previous = confidence_from_distance(0.0);
        for step in 1..=3000 {
            let distance = step as f64 * 0.1;
            let c = confidence_from_distance(distance);
            assert!(c <= previous, "confidence rose at distance {distance}");
            assert!((0.0..=100.0).contains(&c));
            previous = c;
        }
    }

    #[test]
    fn test_threshold_boundary_is_exclusive() {
        let just_under = predict(1, 84.999);
        assert!(just_under.matched);
        assert_eq!(just_under.name, "alice");
        assert_eq!(just_under.confidence, 15.0);

        let at = predict(1, 85.0);
        assert!(!at.matched);
        assert_eq!(at.name, "Unknown");
        assert_eq!(at.confidence, 15.0);
    }

    #[test]
    fn test_non_match_still_reports_confidence() {
        let v = predict(2, 92.5);
        assert!(!v.matched);
        assert_eq!(v.name, "Unknown");
        assert_eq!(v.confidence, 7.5);
    }

    #[test]
    fn test_match_with_unmapped_label_is_unknown() {
        let v = predict(7, 10.0);
        assert!(v.matched);
        assert_eq!(v.name, "Unknown");
        assert_eq!(v.confidence, 90.0);
    }

    #[test]
    fn test_no_model_is_deterministic_unknown() {
        let face = GrayImage::new(20, 20);
        assert_eq!(match_face(&face, None, &identities()), MatchVerdict::unknown());
    }

    #[test]
    fn test_prediction_fault_is_unknown() {
        let model = FixedRecognizer(Prediction { label: 1, distance: 5.0 });
        let verdict = match_face(&GrayImage::new(2, 20), Some(&model), &identities());
        assert_eq!(verdict, MatchVerdict::unknown());

        let verdict = match_face(&GrayImage::new(20, 20), Some(&model), &identities());
        assert!(verdict.matched);
        assert_eq!(verdict.name, "alice");
        assert_eq!(verdict.confidence, 95.0);
    }
}
