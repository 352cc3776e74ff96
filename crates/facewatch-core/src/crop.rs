//! Face crop extraction.

use crate::types::FaceBox;
use image::{imageops, GrayImage};

/// Copy the grayscale region covered by `face` out of `image`.
///
/// The box is intersected with the image bounds first. Returns `None` if the
/// intersection is empty.
pub fn crop_face(image: &GrayImage, face: &FaceBox) -> Option<GrayImage> {
    let (img_w, img_h) = image.dimensions();
    if face.x >= img_w || face.y >= img_h {
        return None;
    }

    let width = face.width.min(img_w - face.x);
    let height = face.height.min(img_h - face.y);
    if width == 0 || height == 0 {
        return None;
    }

    Some(imageops::crop_imm(image, face.x, face.y, width, height).to_image())
}
