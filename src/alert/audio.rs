//! Audio cue playback

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::AudioSettings;
use crate::error::{Error, Result};

use super::AudioClip;

/// Plays alert sounds
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    /// Player name for logs
    fn name(&self) -> &'static str;

    /// Start playing `clip`; returns once playback has started
    async fn play(&self, clip: &AudioClip) -> Result<()>;
}

/// Build the player described by configuration
pub fn audio_player_from_settings(settings: &AudioSettings) -> Arc<dyn AudioPlayer> {
    match settings.player_command {
        Some(ref program) if settings.enabled && !program.is_empty() => {
            Arc::new(CommandAudioPlayer::new(program.clone()))
        }
        _ => Arc::new(LogAudioPlayer),
    }
}

/// Logs the clip instead of playing it
#[derive(Debug, Default)]
pub struct LogAudioPlayer;

#[async_trait]
impl AudioPlayer for LogAudioPlayer {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn play(&self, clip: &AudioClip) -> Result<()> {
        info!(clip_id = %clip.id, path = %clip.path, "Audio cue");
        Ok(())
    }
}

/// Spawns an external player (`paplay`, `afplay`, `mpv --no-video`, ...)
/// with the clip path as its last argument
#[derive(Debug)]
pub struct CommandAudioPlayer {
    program: String,
    args: Vec<String>,
}

impl CommandAudioPlayer {
    /// `command` is split on whitespace into program and leading arguments
    pub fn new(command: String) -> Self {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_default();
        Self {
            program,
            args: parts.collect(),
        }
    }
}

#[async_trait]
impl AudioPlayer for CommandAudioPlayer {
    fn name(&self) -> &'static str {
        "command"
    }

    async fn play(&self, clip: &AudioClip) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(&clip.path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::AudioFailed {
                clip_id: clip.id.clone(),
                message: format!("{}: {}", self.program, e),
            })?;

        debug!(clip_id = %clip.id, program = %self.program, "Audio player started");

        let clip_id = clip.id.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => debug!(clip_id = %clip_id, "Audio finished"),
                Ok(status) => warn!(clip_id = %clip_id, status = %status, "Audio player exited with error"),
                Err(e) => warn!(clip_id = %clip_id, error = %e, "Failed to wait for audio player"),
            }
        });

        Ok(())
    }
}
