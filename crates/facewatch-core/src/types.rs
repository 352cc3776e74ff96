use serde::{Deserialize, Serialize};

/// Axis-aligned face box in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Build a box from floating-point detector output, clamped to the image.
    ///
    /// Returns `None` when nothing of the box lies inside the image.
    pub fn from_detection(
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        image_width: u32,
        image_height: u32,
    ) -> Option<Self> {
        if !(x.is_finite() && y.is_finite() && width.is_finite() && height.is_finite()) {
            return None;
        }

        let max_x = image_width as f32;
        let max_y = image_height as f32;
        let x0 = x.clamp(0.0, max_x);
        let y0 = y.clamp(0.0, max_y);
        let x1 = (x + width).clamp(0.0, max_x);
        let y1 = (y + height).clamp(0.0, max_y);

        let left = x0.round() as u32;
        let top = y0.round() as u32;
        let right = x1.round() as u32;
        let bottom = y1.round() as u32;

        if right <= left || bottom <= top {
            return None;
        }

        Some(Self {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        })
    }

    /// `[x, y, width, height]`, the wire layout of `face_box`.
    pub fn to_array(&self) -> [u32; 4] {
        [self.x, self.y, self.width, self.height]
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Raw output of a trained recognizer for one face crop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    /// Identity label of the nearest enrolled face.
    pub label: u32,
    /// Non-negative dissimilarity. Lower is more similar.
    pub distance: f64,
}

/// Match verdict for one face; the caller pairs it with its [`FaceBox`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchVerdict {
    #[serde(rename = "match")]
    pub matched: bool,
    pub name: String,
    pub confidence: f64,
}

impl MatchVerdict {
    /// Name reported for faces that match no enrolled identity.
    pub const UNKNOWN: &'static str = "Unknown";

    /// Deterministic non-match used when recognition is disabled or fails.
    pub fn unknown() -> Self {
        Self {
            matched: false,
            name: Self::UNKNOWN.to_string(),
            confidence: 0.0,
        }
    }
}

/// One entry of [`AnalysisResponse::results`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceResult {
    pub face_box: [u32; 4],
    pub recognition: MatchVerdict,
}

/// Response for one analyzed image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub faces_detected: usize,
    pub results: Vec<FaceResult>,
    pub matches_found: usize,
}

impl AnalysisResponse {
    /// Assemble a response, deriving both counters from `results`.
    pub fn from_results(results: Vec<FaceResult>) -> Self {
        let matches_found = results.iter().filter(|r| r.recognition.matched).count();
        Self {
            faces_detected: results.len(),
            results,
            matches_found,
        }
    }
}
