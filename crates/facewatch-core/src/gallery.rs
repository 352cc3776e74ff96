//! Gallery enrollment from a directory of reference images.
//!
//! Each accepted file contributes at most one face crop, enrolled under the
//! next sequential identity ID with the file stem as its display name.
//! Per-file problems are reported as [`SkipReason`]s and never abort the scan.

use crate::crop::crop_face;
use crate::detector::FaceDetector;
use crate::recognizer::{check_crop, MIN_CROP_SIZE};
use image::GrayImage;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Face crops enrolled per reference file; extra detections are ignored.
pub const MAX_FACES_PER_REFERENCE: usize = 1;

/// Reference file extensions (matched case-insensitively).
pub const ACCEPTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("failed to create gallery directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to list gallery directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One enrolled identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GalleryEntry {
    pub id: u32,
    pub name: String,
    pub source_path: PathBuf,
}

/// Append-only `id -> name` mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityMap {
    names: BTreeMap<u32, String>,
}

impl IdentityMap {
    pub(crate) fn insert(&mut self, id: u32, name: String) {
        let previous = self.names.insert(id, name);
        debug_assert!(previous.is_none(), "identity {id} registered twice");
    }

    pub fn get(&self, id: u32) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.names.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// One `(crop, id)` pair.
#[derive(Debug, Clone)]
pub struct TrainingSample {
    pub crop: GrayImage,
    pub id: u32,
}

/// Ordered training input for a [`Trainer`](crate::recognizer::Trainer).
#[derive(Debug, Clone, Default)]
pub struct TrainingSet {
    samples: Vec<TrainingSample>,
}

impl TrainingSet {
    pub fn push(&mut self, crop: GrayImage, id: u32) {
        self.samples.push(TrainingSample { crop, id });
    }

    pub fn samples(&self) -> &[TrainingSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Why a reference file was not enrolled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Unreadable(String),
    Undecodable(String),
    NoFace,
    DetectorFault(String),
    EmptyCrop,
    CropTooSmall { width: u32, height: u32 },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreadable(e) => write!(f, "unreadable: {e}"),
            Self::Undecodable(e) => write!(f, "not a decodable image: {e}"),
            Self::NoFace => write!(f, "no face detected"),
            Self::DetectorFault(e) => write!(f, "detector failed: {e}"),
            Self::EmptyCrop => write!(f, "detected face box is empty"),
            Self::CropTooSmall { width, height } => write!(
                f,
                "face crop {width}x{height} is below the {MIN_CROP_SIZE}x{MIN_CROP_SIZE} recognizer minimum"
            ),
        }
    }
}

/// Outcome of processing one reference file.
#[derive(Debug, Clone)]
pub enum Enrollment {
    /// Face found; `faces_found` counts every detection, not just the enrolled one.
    Enrolled { crops: Vec<GrayImage>, faces_found: usize },
    Skipped(SkipReason),
}

/// Enrolled identities plus the material to train on.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
    identities: IdentityMap,
    training_set: TrainingSet,
    skipped: Vec<(PathBuf, SkipReason)>,
}

impl Gallery {
    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn identities(&self) -> &IdentityMap {
        &self.identities
    }

    pub fn training_set(&self) -> &TrainingSet {
        &self.training_set
    }

    /// Files that were not enrolled, with the reason.
    pub fn skipped(&self) -> &[(PathBuf, SkipReason)] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register one file's outcome. IDs advance only on enrollment, so they
    /// stay contiguous from 1.
    fn record(&mut self, path: PathBuf, outcome: Enrollment) {
        match outcome {
            Enrollment::Enrolled { crops, .. } => {
                let id = self.entries.len() as u32 + 1;
                let name = identity_name(&path);
                for crop in crops {
                    self.training_set.push(crop, id);
                }
                self.identities.insert(id, name.clone());
                self.entries.push(GalleryEntry {
                    id,
                    name,
                    source_path: path,
                });
            }
            Enrollment::Skipped(reason) => self.skipped.push((path, reason)),
        }
    }

    /// Split into the parts needed after training.
    pub fn into_parts(self) -> (Vec<GalleryEntry>, IdentityMap, TrainingSet) {
        (self.entries, self.identities, self.training_set)
    }
}

/// Build the gallery from `dir`, creating the directory if it is missing.
///
/// Files are processed in lexicographic order of their names.
pub fn build_gallery(dir: &Path, detector: &mut dyn FaceDetector) -> Result<Gallery, GalleryError> {
    let mut gallery = Gallery::default();

    for (path, outcome) in scan_directory(dir, detector)? {
        match &outcome {
            Enrollment::Enrolled { faces_found, .. } => {
                tracing::debug!(path = %path.display(), faces_found, "reference enrolled");
            }
            Enrollment::Skipped(reason) => {
                tracing::warn!(path = %path.display(), %reason, "skipping reference image");
            }
        }
        gallery.record(path, outcome);
    }

    tracing::info!(
        dir = %dir.display(),
        enrolled = gallery.len(),
        skipped = gallery.skipped.len(),
        "gallery built"
    );

    Ok(gallery)
}

/// Process every accepted file in `dir` and return the per-file outcomes in
/// scan order.
pub fn scan_directory(
    dir: &Path,
    detector: &mut dyn FaceDetector,
) -> Result<Vec<(PathBuf, Enrollment)>, GalleryError> {
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|source| GalleryError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
        tracing::warn!(dir = %dir.display(), "gallery directory created empty; recognition disabled");
        return Ok(Vec::new());
    }

    let files = list_reference_files(dir)?;
    Ok(files
        .into_iter()
        .map(|path| {
            let outcome = enroll_file(&path, detector);
            (path, outcome)
        })
        .collect())
}

/// Accepted image files in `dir`, sorted by file name.
fn list_reference_files(dir: &Path) -> Result<Vec<PathBuf>, GalleryError> {
    let mut files = list_files(dir)?;
    files.retain(|path| is_accepted_image(path));
    Ok(files)
}

/// Regular files in `dir` that the gallery ignores because of their
/// extension, sorted by file name.
pub fn list_unaccepted_files(dir: &Path) -> Result<Vec<PathBuf>, GalleryError> {
    let mut files = list_files(dir)?;
    files.retain(|path| !is_accepted_image(path));
    Ok(files)
}

fn list_files(dir: &Path) -> Result<Vec<PathBuf>, GalleryError> {
    let read_dir = std::fs::read_dir(dir).map_err(|source| GalleryError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in read_dir {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "unreadable directory entry");
                continue;
            }
        };
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

pub fn is_accepted_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            ACCEPTED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Display name of the identity in `path`: the file name without extension.
fn identity_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Decode, detect and crop one reference file. Crops the recognizer cannot
/// train on skip the file.
pub fn enroll_file(path: &Path, detector: &mut dyn FaceDetector) -> Enrollment {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => return Enrollment::Skipped(SkipReason::Unreadable(e.to_string())),
    };

    let gray = match image::load_from_memory(&bytes) {
        Ok(img) => img.to_luma8(),
        Err(e) => return Enrollment::Skipped(SkipReason::Undecodable(e.to_string())),
    };

    let faces = match detector.detect(gray.as_raw(), gray.width(), gray.height()) {
        Ok(faces) => faces,
        Err(e) => return Enrollment::Skipped(SkipReason::DetectorFault(e.to_string())),
    };

    if faces.is_empty() {
        return Enrollment::Skipped(SkipReason::NoFace);
    }

    let crops: Vec<GrayImage> = faces
        .iter()
        .take(MAX_FACES_PER_REFERENCE)
        .filter_map(|face| crop_face(&gray, face))
        .collect();

    if crops.is_empty() {
        return Enrollment::Skipped(SkipReason::EmptyCrop);
    }

    if let Some(small) = crops.iter().find(|crop| check_crop(crop).is_err()) {
        let (width, height) = small.dimensions();
        return Enrollment::Skipped(SkipReason::CropTooSmall { width, height });
    }

    Enrollment::Enrolled {
        crops,
        faces_found: faces.len(),
    }
}
