//! Configuration system for the EventSub overlay
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (OVERLAY_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::alert::{AudioClip, ImageAsset};
use crate::error::{Error, Result};

/// Main overlay configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// EventSub connection settings
    pub eventsub: EventSubSettings,

    /// Subscribe endpoint settings
    pub subscription: SubscriptionSettings,

    /// Alert timing, font and event mapping
    pub alerts: AlertSettings,

    /// Drawing surface settings
    pub surface: SurfaceSettings,

    /// Image and audio assets
    pub assets: AssetSettings,

    /// Audio playback settings
    pub audio: AudioSettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Which EventSub endpoint to talk to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local mock server (twitch-cli)
    Dev,
    /// Twitch production endpoint
    #[default]
    Prod,
}

impl Environment {
    /// Parse an environment flag; accepts the spellings used by launch scripts
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "dev" | "local" | "development" => Some(Environment::Dev),
            "prod" | "production" => Some(Environment::Prod),
            _ => None,
        }
    }
}

/// EventSub connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSubSettings {
    /// Endpoint selector
    pub environment: Environment,

    /// WebSocket URL used in the dev environment
    pub local_url: String,

    /// WebSocket URL used in the prod environment
    pub production_url: String,

    /// Delay before following a server reconnect request, in milliseconds
    pub reconnect_delay_ms: u64,

    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,

    /// Extra seconds allowed past the keepalive timeout before warning
    pub keepalive_grace_secs: u64,
}

/// Subscribe endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionSettings {
    /// Full URL of the subscribe endpoint
    pub endpoint: String,

    /// Twitch account whose events are wanted
    pub username: String,

    /// Event types to subscribe to, in order
    pub event_types: Vec<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// Maps an EventSub event type to the alert it shows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAlertMapping {
    /// Event type, e.g. `channel.follow`
    pub event_type: String,

    /// Image asset drawn for this event
    pub image_id: String,

    /// CSS-style text color
    pub text_color: String,
}

/// Alert settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    /// Total alert duration in milliseconds
    pub duration_ms: u64,

    /// Animation frame rate
    pub fps: u32,

    /// Font family for the username
    pub font_family: String,

    /// Font size in pixels
    pub font_size_px: u32,

    /// Event type to alert mapping
    pub events: Vec<EventAlertMapping>,
}

/// Drawing surface settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceSettings {
    /// Surface width in pixels
    pub width: u32,

    /// Surface height in pixels
    pub height: u32,

    /// Write draw commands as JSON lines to this file (empty = log only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_log: Option<String>,
}

/// Asset catalog settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetSettings {
    /// Alert images
    pub images: Vec<ImageAsset>,

    /// Alert sounds
    pub audio: Vec<AudioClip>,
}

/// Audio playback settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Play sounds at all
    pub enabled: bool,

    /// Player executable, invoked with the clip path (empty = log only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_command: Option<String>,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

// Default implementations

impl Default for EventSubSettings {
    fn default() -> Self {
        Self {
            environment: Environment::Prod,
            local_url: "ws://localhost:8080/eventsub".to_string(),
            production_url: "wss://eventsub-beta.wss.twitch.tv/ws".to_string(),
            reconnect_delay_ms: 1000,
            connect_timeout_ms: 30000,
            keepalive_grace_secs: 5,
        }
    }
}

impl Default for SubscriptionSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000/subscribe".to_string(),
            username: "bpafoshizle".to_string(),
            event_types: vec![
                "channel.follow".to_string(),
                "channel.subscribe".to_string(),
            ],
            timeout_secs: 10,
        }
    }
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            duration_ms: 5000,
            fps: 60,
            font_family: "Monaco".to_string(),
            font_size_px: 56,
            events: vec![
                EventAlertMapping {
                    event_type: "channel.follow".to_string(),
                    image_id: "twitch-new-follower-img".to_string(),
                    text_color: "#6441a4".to_string(),
                },
                EventAlertMapping {
                    event_type: "channel.subscribe".to_string(),
                    image_id: "twitch-new-subscriber-img".to_string(),
                    text_color: "#6441a4".to_string(),
                },
            ],
        }
    }
}

impl Default for SurfaceSettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            frame_log: None,
        }
    }
}

impl Default for AssetSettings {
    fn default() -> Self {
        let image = |id: &str, audio_id: &str| ImageAsset {
            id: id.to_string(),
            path: format!("~/.eventsub-overlay/assets/{}.png", id),
            width: 600,
            height: 338,
            text_x_offset: 0,
            text_y_offset: 300,
            audio_id: audio_id.to_string(),
        };
        let clip = |id: &str| AudioClip {
            id: id.to_string(),
            path: format!("~/.eventsub-overlay/assets/{}.mp3", id),
        };

        Self {
            images: vec![
                image("twitch-new-follower-img", "twitch-new-follower-audio"),
                image("twitch-new-subscriber-img", "twitch-new-subscriber-audio"),
                image("twitch-first-time-chat-img", "twitch-first-time-chat-audio"),
                image("twitch-new-donation-img", "twitch-new-donation-audio"),
            ],
            audio: vec![
                clip("twitch-new-follower-audio"),
                clip("twitch-new-subscriber-audio"),
                clip("twitch-first-time-chat-audio"),
                clip("twitch-new-donation-audio"),
            ],
        }
    }
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            player_command: None,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_files: 5,
            json_format: false,
        }
    }
}

impl EventSubSettings {
    /// URL of the first connection, chosen by environment
    pub fn initial_url(&self) -> &str {
        match self.environment {
            Environment::Dev => &self.local_url,
            Environment::Prod => &self.production_url,
        }
    }
}

impl OverlayConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        // 1. Load from config file if it exists
        if let Some(path) = Self::find_config_file(config_path)? {
            debug!(path = %path.display(), "Loading configuration file");
            let content = fs::read_to_string(&path).map_err(|e| Error::IoRead {
                path: path.clone(),
                source: e,
            })?;
            config = toml::from_str(&content).map_err(|e| Error::ConfigParse {
                message: format!("{}: {}", path.display(), e.message()),
                source: Some(e),
            })?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        // 2. Apply environment variable overrides
        config.apply_env_overrides();

        // 3. Expand paths
        config.expand_paths();

        // 4. Validate
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::ConfigNotFound { path });
        }

        let search_paths = [
            PathBuf::from("overlay.toml"),
            dirs::config_dir()
                .map(|p| p.join("eventsub-overlay").join("overlay.toml"))
                .unwrap_or_default(),
            dirs::home_dir()
                .map(|p| p.join(".eventsub-overlay").join("overlay.toml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/eventsub-overlay/overlay.toml"),
        ];

        for path in &search_paths {
            if path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path.clone()));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // EventSub settings
        if let Ok(val) = std::env::var("OVERLAY_ENV") {
            if let Some(env) = Environment::parse(&val) {
                self.eventsub.environment = env;
            }
        }
        if let Ok(val) = std::env::var("OVERLAY_LOCAL_URL") {
            self.eventsub.local_url = val;
        }
        if let Ok(val) = std::env::var("OVERLAY_PRODUCTION_URL") {
            self.eventsub.production_url = val;
        }
        if let Ok(val) = std::env::var("OVERLAY_RECONNECT_DELAY_MS") {
            if let Ok(n) = val.parse() {
                self.eventsub.reconnect_delay_ms = n;
            }
        }

        // Subscription settings
        if let Ok(val) = std::env::var("OVERLAY_SUBSCRIBE_ENDPOINT") {
            self.subscription.endpoint = val;
        }
        if let Ok(val) = std::env::var("OVERLAY_USERNAME") {
            self.subscription.username = val;
        }

        // Alert settings
        if let Ok(val) = std::env::var("OVERLAY_ALERT_DURATION_MS") {
            if let Ok(n) = val.parse() {
                self.alerts.duration_ms = n;
            }
        }
        if let Ok(val) = std::env::var("OVERLAY_FPS") {
            if let Ok(n) = val.parse() {
                self.alerts.fps = n;
            }
        }

        // Surface and audio
        if let Ok(val) = std::env::var("OVERLAY_FRAME_LOG") {
            self.surface.frame_log = Some(val);
        }
        if let Ok(val) = std::env::var("OVERLAY_AUDIO_PLAYER") {
            self.audio.player_command = Some(val);
        }
        if let Ok(val) = std::env::var("OVERLAY_AUDIO_ENABLED") {
            self.audio.enabled = val.to_lowercase() == "true" || val == "1";
        }

        // Logging settings
        if let Ok(val) = std::env::var("OVERLAY_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("OVERLAY_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("OVERLAY_LOG_JSON") {
            self.logging.json_format = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Expand ~ and other path variables
    fn expand_paths(&mut self) {
        for image in &mut self.assets.images {
            image.path = expand_path(&image.path);
        }
        for clip in &mut self.assets.audio {
            clip.path = expand_path(&clip.path);
        }
        if let Some(ref file) = self.surface.frame_log {
            self.surface.frame_log = Some(expand_path(file));
        }
        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        for (field, url) in [
            ("eventsub.local_url", &self.eventsub.local_url),
            ("eventsub.production_url", &self.eventsub.production_url),
        ] {
            if !url.starts_with("ws://") && !url.starts_with("wss://") {
                return Err(Error::config_field_invalid(
                    field,
                    format!("{} must start with ws:// or wss://", field),
                ));
            }
        }

        let endpoint = &self.subscription.endpoint;
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(Error::config_field_invalid(
                "subscription.endpoint",
                "subscription.endpoint must start with http:// or https://",
            ));
        }
        if self.subscription.username.is_empty() {
            return Err(Error::config_field_invalid(
                "subscription.username",
                "subscription.username cannot be empty",
            ));
        }

        if self.alerts.duration_ms == 0 {
            return Err(Error::config_field_invalid(
                "alerts.duration_ms",
                "alerts.duration_ms must be greater than 0",
            ));
        }
        if !(1..=240).contains(&self.alerts.fps) {
            return Err(Error::config_field_invalid(
                "alerts.fps",
                "alerts.fps must be between 1 and 240",
            ));
        }

        for mapping in &self.alerts.events {
            if !self.assets.images.iter().any(|img| img.id == mapping.image_id) {
                return Err(Error::config_field_invalid(
                    "alerts.events",
                    format!(
                        "event '{}' refers to unknown image '{}'",
                        mapping.event_type, mapping.image_id
                    ),
                ));
            }
        }

        if self.surface.width == 0 || self.surface.height == 0 {
            return Err(Error::config_field_invalid(
                "surface",
                "surface width and height must be non-zero",
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        Ok(())
    }
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or_else(|_| std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Initialize a new configuration file
pub fn init_config(path: Option<&str>, force: bool) -> Result<()> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".eventsub-overlay")
                .join("overlay.toml")
        });

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    fs::write(&config_path, generate_default_config()).map_err(|e| Error::IoWrite {
        path: config_path.clone(),
        source: e,
    })?;

    println!("Configuration file created: {}", config_path.display());
    Ok(())
}

/// Generate default configuration content with comments
fn generate_default_config() -> String {
    r##"# EventSub Overlay Configuration

[eventsub]
# Endpoint selector: "dev" (local twitch-cli mock) or "prod"
environment = "prod"
local_url = "ws://localhost:8080/eventsub"
production_url = "wss://eventsub-beta.wss.twitch.tv/ws"

# Delay before following a server reconnect request (milliseconds)
reconnect_delay_ms = 1000

# Connection timeout (milliseconds)
connect_timeout_ms = 30000

# Extra seconds past the keepalive timeout before warning
keepalive_grace_secs = 5

[subscription]
# Endpoint that creates EventSub subscriptions for a session
endpoint = "http://localhost:8000/subscribe"
username = "bpafoshizle"
event_types = ["channel.follow", "channel.subscribe"]
timeout_secs = 10

[alerts]
duration_ms = 5000
fps = 60
font_family = "Monaco"
font_size_px = 56

[[alerts.events]]
event_type = "channel.follow"
image_id = "twitch-new-follower-img"
text_color = "#6441a4"

[[alerts.events]]
event_type = "channel.subscribe"
image_id = "twitch-new-subscriber-img"
text_color = "#6441a4"

[surface]
width = 1920
height = 1080
# Write draw commands as JSON lines (comment out to only log them)
# frame_log = "~/.eventsub-overlay/frames.jsonl"

[[assets.images]]
id = "twitch-new-follower-img"
path = "~/.eventsub-overlay/assets/twitch-new-follower-img.png"
width = 600
height = 338
text_x_offset = 0
text_y_offset = 300
audio_id = "twitch-new-follower-audio"

[[assets.images]]
id = "twitch-new-subscriber-img"
path = "~/.eventsub-overlay/assets/twitch-new-subscriber-img.png"
width = 600
height = 338
text_x_offset = 0
text_y_offset = 300
audio_id = "twitch-new-subscriber-audio"

[[assets.images]]
id = "twitch-first-time-chat-img"
path = "~/.eventsub-overlay/assets/twitch-first-time-chat-img.png"
width = 600
height = 338
text_x_offset = 0
text_y_offset = 300
audio_id = "twitch-first-time-chat-audio"

[[assets.images]]
id = "twitch-new-donation-img"
path = "~/.eventsub-overlay/assets/twitch-new-donation-img.png"
width = 600
height = 338
text_x_offset = 0
text_y_offset = 300
audio_id = "twitch-new-donation-audio"

[[assets.audio]]
id = "twitch-new-follower-audio"
path = "~/.eventsub-overlay/assets/twitch-new-follower-audio.mp3"

[[assets.audio]]
id = "twitch-new-subscriber-audio"
path = "~/.eventsub-overlay/assets/twitch-new-subscriber-audio.mp3"

[[assets.audio]]
id = "twitch-first-time-chat-audio"
path = "~/.eventsub-overlay/assets/twitch-first-time-chat-audio.mp3"

[[assets.audio]]
id = "twitch-new-donation-audio"
path = "~/.eventsub-overlay/assets/twitch-new-donation-audio.mp3"

[audio]
enabled = true
# Player executable, invoked with the clip path
# player_command = "paplay"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.eventsub-overlay/logs/overlay.log"

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false
"##
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_default_config() {
        let config = OverlayConfig::default();
        assert_eq!(config.eventsub.environment, Environment::Prod);
        assert_eq!(config.eventsub.initial_url(), "wss://eventsub-beta.wss.twitch.tv/ws");
        assert_eq!(config.eventsub.reconnect_delay_ms, 1000);
        assert_eq!(config.alerts.duration_ms, 5000);
        assert_eq!(config.alerts.fps, 60);
        assert_eq!(config.subscription.event_types, vec!["channel.follow", "channel.subscribe"]);
    }

    #[test]
    fn test_dev_environment_selects_local_url() {
        let mut config = OverlayConfig::default();
        config.eventsub.environment = Environment::Dev;
        assert_eq!(config.eventsub.initial_url(), "ws://localhost:8080/eventsub");
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!(Environment::parse("DEV"), Some(Environment::Dev));
        assert_eq!(Environment::parse("local"), Some(Environment::Dev));
        assert_eq!(Environment::parse("production"), Some(Environment::Prod));
        assert_eq!(Environment::parse("staging"), None);
    }

    #[test]
    fn test_env_override() {
        env::set_var("OVERLAY_ENV", "DEV");
        env::set_var("OVERLAY_FPS", "30");
        env::set_var("OVERLAY_USERNAME", "someone_else");

        let mut config = OverlayConfig::default();
        config.apply_env_overrides();

        assert_eq!(config.eventsub.environment, Environment::Dev);
        assert_eq!(config.alerts.fps, 30);
        assert_eq!(config.subscription.username, "someone_else");

        env::remove_var("OVERLAY_ENV");
        env::remove_var("OVERLAY_FPS");
        env::remove_var("OVERLAY_USERNAME");
    }

    #[test]
    fn test_validation_valid_config() {
        assert!(OverlayConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_invalid_ws_url() {
        let mut config = OverlayConfig::default();
        config.eventsub.local_url = "http://localhost:8080/eventsub".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_invalid_endpoint() {
        let mut config = OverlayConfig::default();
        config.subscription.endpoint = "/subscribe".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_fps_bounds() {
        let mut config = OverlayConfig::default();
        config.alerts.fps = 0;
        assert!(config.validate().is_err());
        config.alerts.fps = 241;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_unknown_event_image() {
        let mut config = OverlayConfig::default();
        config.alerts.events.push(EventAlertMapping {
            event_type: "channel.raid".to_string(),
            image_id: "twitch-raid-img".to_string(),
            text_color: "#ffffff".to_string(),
        });

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("twitch-raid-img"));
    }

    #[test]
    fn test_path_expansion() {
        let mut config = OverlayConfig::default();
        config.expand_paths();
        assert!(config.assets.images.iter().all(|img| !img.path.contains('~')));
    }

    #[test]
    fn test_generated_config_parses_and_validates() {
        let config: OverlayConfig = toml::from_str(&generate_default_config()).unwrap();
        assert_eq!(config.alerts.events.len(), 2);
        assert_eq!(config.assets.images.len(), 4);
        assert_eq!(config.assets.audio.len(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_explicit_missing_file() {
        let err = OverlayConfig::load(Some("/definitely/not/here/overlay.toml")).unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound { .. }));
    }

    #[test]
    fn test_parse_config_file() {
        let config_str = r##"
[eventsub]
environment = "dev"
reconnect_delay_ms = 250

[subscription]
username = "HNDR"

[alerts]
duration_ms = 3000
fps = 30
"##;

        let config: OverlayConfig = toml::from_str(config_str).unwrap();

        assert_eq!(config.eventsub.environment, Environment::Dev);
        assert_eq!(config.eventsub.reconnect_delay_ms, 250);
        assert_eq!(config.subscription.username, "HNDR");
        assert_eq!(config.alerts.duration_ms, 3000);
        assert_eq!(config.alerts.fps, 30);
        // Untouched sections keep their defaults
        assert_eq!(config.surface.width, 1920);
        assert_eq!(config.alerts.events.len(), 2);
    }
}
