//! Overlay drawing surfaces
//!
//! A surface is the canvas alerts draw on. Each frame is expressed as a
//! short list of [`DrawCommand`]s; surfaces decide what to do with them.
//! The log surface only traces them, the frame-log surface appends them as
//! JSON lines for an external compositor to replay.

use std::fs::{self, OpenOptions};
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::trace;

use crate::config::SurfaceSettings;
use crate::error::{Error, Result};

use super::FontSpec;

/// Average glyph advance relative to font size for monospace fonts
const MONOSPACE_ADVANCE: f64 = 0.6;

/// A single canvas operation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawCommand {
    /// Clear the whole surface
    Clear,

    /// Set global opacity for subsequent draws
    SetAlpha { alpha: f64 },

    /// Draw an image scaled into a rectangle
    DrawImage {
        image_id: String,
        path: String,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },

    /// Draw text with its baseline at (x, y)
    FillText {
        text: String,
        x: f64,
        y: f64,
        color: String,
        font: String,
    },
}

/// Something alerts can be drawn on
pub trait OverlaySurface: Send {
    /// Surface size in pixels (width, height)
    fn size(&self) -> (u32, u32);

    /// Apply one draw command
    fn execute(&mut self, command: &DrawCommand) -> Result<()>;

    /// Width of `text` rendered in `font`
    ///
    /// Defaults to a monospace estimate; surfaces with real font metrics
    /// should override it.
    fn measure_text(&self, text: &str, font: &FontSpec) -> f64 {
        text.chars().count() as f64 * f64::from(font.size_px) * MONOSPACE_ADVANCE
    }
}

/// Surface shared between concurrently running alerts
pub type SharedSurface = Arc<Mutex<Box<dyn OverlaySurface>>>;

/// Wrap a surface for sharing
pub fn shared(surface: impl OverlaySurface + 'static) -> SharedSurface {
    Arc::new(Mutex::new(Box::new(surface)))
}

/// Build the surface described by configuration
pub fn surface_from_settings(settings: &SurfaceSettings) -> Result<SharedSurface> {
    let size = (settings.width, settings.height);
    match settings.frame_log {
        Some(ref path) => Ok(shared(FrameLogSurface::create(path, size)?)),
        None => Ok(shared(LogSurface::new(size))),
    }
}

// ─────────────────────────────────────────────────────────────────
// Log Surface
// ─────────────────────────────────────────────────────────────────

/// Traces every draw command and renders nothing
#[derive(Debug)]
pub struct LogSurface {
    size: (u32, u32),
}

impl LogSurface {
    pub fn new(size: (u32, u32)) -> Self {
        Self { size }
    }
}

impl OverlaySurface for LogSurface {
    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn execute(&mut self, command: &DrawCommand) -> Result<()> {
        trace!(command = ?command, "draw");
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────
// Frame Log Surface
// ─────────────────────────────────────────────────────────────────

/// Appends each draw command to a file as one JSON object per line
pub struct FrameLogSurface {
    path: PathBuf,
    size: (u32, u32),
    writer: LineWriter<fs::File>,
}

impl FrameLogSurface {
    /// Open (or create) the frame log for appending
    pub fn create(path: impl AsRef<Path>, size: (u32, u32)) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::IoWrite {
                path: path.clone(),
                source: e,
            })?;

        Ok(Self {
            path,
            size,
            writer: LineWriter::new(file),
        })
    }
}

impl OverlaySurface for FrameLogSurface {
    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn execute(&mut self, command: &DrawCommand) -> Result<()> {
        let line = serde_json::to_string(command)
            .map_err(|e| Error::Internal(format!("Failed to encode draw command: {}", e)))?;
        writeln!(self.writer, "{}", line).map_err(|e| Error::IoWrite {
            path: self.path.clone(),
            source: e,
        })
    }
}
