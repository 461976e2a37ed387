//! Alert placement

use serde::Serialize;

use super::ImageAsset;

/// Font used for the username
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FontSpec {
    pub family: String,
    pub size_px: u32,
}

impl FontSpec {
    pub fn new(family: impl Into<String>, size_px: u32) -> Self {
        Self {
            family: family.into(),
            size_px,
        }
    }

    /// CSS shorthand, e.g. "56px Monaco"
    pub fn css(&self) -> String {
        format!("{}px {}", self.size_px, self.family)
    }
}

/// Where an alert's image and text go on the surface
///
/// Computed once when the alert starts and reused for every frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertLayout {
    pub image_id: String,
    pub image_path: String,
    pub image_x: f64,
    pub image_y: f64,
    pub image_width: f64,
    pub image_height: f64,
    pub text_x: f64,
    pub text_y: f64,
    pub text_width: f64,
    pub audio_id: String,
}

impl AlertLayout {
    /// Anchor the image to the bottom-right corner and center the text on it
    pub fn compute(image: &ImageAsset, surface_size: (u32, u32), text_width: f64) -> Self {
        let (surface_width, surface_height) = surface_size;
        let image_width = f64::from(image.width);
        let image_height = f64::from(image.height);
        let image_x = f64::from(surface_width) - image_width;
        let image_y = f64::from(surface_height) - image_height;

        Self {
            image_id: image.id.clone(),
            image_path: image.path.clone(),
            image_x,
            image_y,
            image_width,
            image_height,
            text_x: image_x + f64::from(image.text_x_offset) + (image_width - text_width) / 2.0,
            text_y: image_y + f64::from(image.text_y_offset),
            text_width,
            audio_id: image.audio_id.clone(),
        }
    }
}
