//! Image and audio asset catalog
//!
//! Stands in for the page's `<img>` / `<audio>` elements: each image carries
//! its intrinsic size, the offsets of the username text, and the id of the
//! sound played with it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::AssetSettings;
use crate::error::{Error, Result};

/// An alert image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAsset {
    /// Asset id, referenced by event mappings
    pub id: String,

    /// Image file path
    pub path: String,

    /// Intrinsic width in pixels
    pub width: u32,

    /// Intrinsic height in pixels
    pub height: u32,

    /// Horizontal text offset relative to the centered position
    #[serde(default)]
    pub text_x_offset: i32,

    /// Vertical text baseline offset from the image top
    #[serde(default)]
    pub text_y_offset: i32,

    /// Sound played with this image
    pub audio_id: String,
}

/// An alert sound
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioClip {
    pub id: String,
    pub path: String,
}

/// Lookup table over the configured assets
#[derive(Debug, Clone, Default)]
pub struct AssetCatalog {
    images: HashMap<String, ImageAsset>,
    audio: HashMap<String, AudioClip>,
}

impl AssetCatalog {
    /// Build the catalog from configuration; later duplicates win
    pub fn from_settings(settings: &AssetSettings) -> Self {
        Self {
            images: settings
                .images
                .iter()
                .map(|img| (img.id.clone(), img.clone()))
                .collect(),
            audio: settings
                .audio
                .iter()
                .map(|clip| (clip.id.clone(), clip.clone()))
                .collect(),
        }
    }

    /// Look up an image by id
    pub fn image(&self, id: &str) -> Result<&ImageAsset> {
        self.images.get(id).ok_or_else(|| Error::image_not_found(id))
    }

    /// Look up an audio clip by id
    pub fn audio(&self, id: &str) -> Result<&AudioClip> {
        self.audio.get(id).ok_or_else(|| Error::audio_not_found(id))
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}
