//! Alert renderer
//!
//! Each alert runs as its own task: layout is computed up front, the audio
//! cue starts, then a frame loop redraws image and text at the current
//! opacity until the alert duration has elapsed, and finally clears the
//! surface. Alerts are not serialized against each other; when two overlap
//! they both draw on the shared surface and the last draw of a frame wins.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::OverlayConfig;
use crate::error::Result;

use super::{
    audio_player_from_settings, surface_from_settings, AlertLayout, AssetCatalog, AudioPlayer,
    DrawCommand, FadeAnimation, FontSpec, SharedSurface,
};

/// What to show for one notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertRequest {
    /// Name drawn over the image
    pub username: String,

    /// Image asset id
    pub image_id: String,

    /// Text color
    pub text_color: String,

    /// Total time on screen
    pub duration: Duration,
}

/// Draws alerts on a shared surface
#[derive(Clone)]
pub struct AlertRenderer {
    catalog: Arc<AssetCatalog>,
    surface: SharedSurface,
    audio: Arc<dyn AudioPlayer>,
    font: FontSpec,
    fps: u32,
}

impl AlertRenderer {
    pub fn new(
        catalog: AssetCatalog,
        surface: SharedSurface,
        audio: Arc<dyn AudioPlayer>,
        font: FontSpec,
        fps: u32,
    ) -> Self {
        Self {
            catalog: Arc::new(catalog),
            surface,
            audio,
            font,
            fps: fps.max(1),
        }
    }

    /// Build a renderer with the surface and audio player named in config
    pub fn from_config(config: &OverlayConfig) -> Result<Self> {
        let surface = surface_from_settings(&config.surface)?;
        let audio = audio_player_from_settings(&config.audio);
        let catalog = AssetCatalog::from_settings(&config.assets);
        info!(
            images = catalog.image_count(),
            width = config.surface.width,
            height = config.surface.height,
            frame_log = ?config.surface.frame_log,
            audio = audio.name(),
            "Alert renderer ready"
        );

        Ok(Self::new(
            catalog,
            surface,
            audio,
            FontSpec::new(config.alerts.font_family.clone(), config.alerts.font_size_px),
            config.alerts.fps,
        ))
    }

    /// Resolve assets and compute where the alert goes
    pub fn layout(&self, request: &AlertRequest) -> Result<AlertLayout> {
        let image = self.catalog.image(&request.image_id)?;
        let surface = self.surface.lock();
        let text_width = surface.measure_text(&request.username, &self.font);
        Ok(AlertLayout::compute(image, surface.size(), text_width))
    }

    /// Start an alert; the returned task finishes when the alert is gone
    pub fn show(&self, request: AlertRequest) -> Result<JoinHandle<()>> {
        let layout = self.layout(&request)?;
        let alert_id = Uuid::new_v4();

        info!(
            alert_id = %alert_id,
            username = %request.username,
            image_id = %request.image_id,
            color = %request.text_color,
            duration_ms = request.duration.as_millis() as u64,
            "Showing alert"
        );

        let clip = match self.catalog.audio(&layout.audio_id) {
            Ok(clip) => Some(clip.clone()),
            Err(e) => {
                warn!(alert_id = %alert_id, error = %e, "Alert has no audio cue");
                None
            }
        };

        let renderer = self.clone();
        Ok(tokio::spawn(async move {
            if let Some(clip) = clip {
                if let Err(e) = renderer.audio.play(&clip).await {
                    warn!(alert_id = %alert_id, error = %e, "Audio playback failed");
                }
            }
            let frames = renderer.animate(&request, &layout).await;
            debug!(alert_id = %alert_id, frames, "Alert finished");
        }))
    }

    /// Frame loop; returns the number of frames drawn
    async fn animate(&self, request: &AlertRequest, layout: &AlertLayout) -> u64 {
        let mut fade = FadeAnimation::new(request.duration, self.fps);
        let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / f64::from(self.fps)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let started = Instant::now();
        let mut frames = 0u64;

        loop {
            ticker.tick().await;

            let alpha = fade.next_alpha();
            self.draw(&frame_commands(request, layout, &self.font, alpha));
            frames += 1;

            if started.elapsed() >= request.duration {
                self.clear();
                break;
            }
        }

        frames
    }

    /// Blank the surface
    pub fn clear(&self) {
        self.draw(&[DrawCommand::Clear]);
    }

    fn draw(&self, commands: &[DrawCommand]) {
        let mut surface = self.surface.lock();
        for command in commands {
            if let Err(e) = surface.execute(command) {
                warn!(error = %e, "Draw command failed");
            }
        }
    }
}

/// Commands for one frame at opacity `alpha`
pub fn frame_commands(
    request: &AlertRequest,
    layout: &AlertLayout,
    font: &FontSpec,
    alpha: f64,
) -> Vec<DrawCommand> {
    vec![
        DrawCommand::Clear,
        DrawCommand::SetAlpha { alpha },
        DrawCommand::DrawImage {
            image_id: layout.image_id.clone(),
            path: layout.image_path.clone(),
            x: layout.image_x,
            y: layout.image_y,
            width: layout.image_width,
            height: layout.image_height,
        },
        DrawCommand::FillText {
            text: request.username.clone(),
            x: layout.text_x,
            y: layout.text_y,
            color: request.text_color.clone(),
            font: font.css(),
        },
    ]
}
