//! Error types for the EventSub overlay
//!
//! Provides structured error handling with:
//! - Numeric error codes for machine parsing
//! - User-friendly messages with suggestions
//! - Exit codes for CLI

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for overlay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric error codes for machine parsing and documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Configuration errors (1xx)
    ConfigNotFound = 100,
    ConfigParseError = 101,
    ConfigValidation = 102,

    // IO errors (2xx)
    IoRead = 200,
    IoWrite = 201,

    // Connection errors (3xx)
    ConnectionFailed = 300,
    ConnectionTimeout = 301,
    ConnectionLost = 303,
    SubscribeFailed = 310,

    // Protocol errors (4xx)
    ProtocolMalformed = 401,

    // Render errors (5xx)
    AssetNotFound = 500,
    AudioFailed = 510,

    // Internal errors (9xx)
    InternalError = 900,
}

impl ErrorCode {
    /// Get the string code (e.g., "E100")
    pub fn as_str(&self) -> String {
        format!("E{}", *self as u16)
    }

    /// Get the exit code for CLI (maps to 1-125 range)
    pub fn exit_code(&self) -> i32 {
        match *self as u16 {
            100..=199 => 10,
            200..=299 => 20,
            300..=399 => 30,
            400..=499 => 40,
            500..=599 => 50,
            900..=999 => 90,
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for the overlay
#[derive(Error, Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Configuration parse error
    #[error("Failed to parse configuration: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<toml::de::Error>,
    },

    /// Configuration validation error
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String, field: Option<String> },

    /// Generic configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    // ─────────────────────────────────────────────────────────────
    // IO Errors
    // ─────────────────────────────────────────────────────────────

    /// File read error
    #[error("Failed to read file: {path}")]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File write error
    #[error("Failed to write file: {path}")]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // ─────────────────────────────────────────────────────────────
    // Connection Errors
    // ─────────────────────────────────────────────────────────────

    /// Connection failed
    #[error("Failed to connect to {url}: {message}")]
    ConnectionFailed { url: String, message: String },

    /// Connection timeout
    #[error("Connection to {url} timed out after {timeout_secs}s")]
    ConnectionTimeout { url: String, timeout_secs: u64 },

    /// Connection lost
    #[error("Lost connection to EventSub: {message}")]
    ConnectionLost { message: String },

    /// Subscribe endpoint rejected or failed the request
    #[error("Subscribe request to {endpoint} failed: {message}")]
    SubscribeFailed { endpoint: String, message: String },

    /// Generic connection error
    #[error("Connection error: {0}")]
    Connection(String),

    // ─────────────────────────────────────────────────────────────
    // Protocol Errors
    // ─────────────────────────────────────────────────────────────

    /// Malformed frame
    #[error("Malformed EventSub frame: {message}")]
    ProtocolMalformed { message: String },

    // ─────────────────────────────────────────────────────────────
    // Render Errors
    // ─────────────────────────────────────────────────────────────

    /// Image or audio asset missing from the catalog
    #[error("{kind} asset not found: {id}")]
    AssetNotFound { kind: &'static str, id: String },

    /// Audio playback could not be started
    #[error("Failed to play audio clip {clip_id}: {message}")]
    AudioFailed { clip_id: String, message: String },

    // ─────────────────────────────────────────────────────────────
    // Internal Errors
    // ─────────────────────────────────────────────────────────────

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get the numeric error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Error::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Error::ConfigValidation { .. } => ErrorCode::ConfigValidation,
            Error::Config(_) => ErrorCode::ConfigValidation,

            Error::IoRead { .. } => ErrorCode::IoRead,
            Error::IoWrite { .. } => ErrorCode::IoWrite,
            Error::Toml(_) => ErrorCode::ConfigParseError,
            Error::WebSocket(_) => ErrorCode::ConnectionFailed,
            Error::Http(e) if e.is_timeout() => ErrorCode::ConnectionTimeout,
            Error::Http(_) => ErrorCode::SubscribeFailed,

            Error::ConnectionFailed { .. } => ErrorCode::ConnectionFailed,
            Error::ConnectionTimeout { .. } => ErrorCode::ConnectionTimeout,
            Error::ConnectionLost { .. } => ErrorCode::ConnectionLost,
            Error::SubscribeFailed { .. } => ErrorCode::SubscribeFailed,
            Error::Connection(_) => ErrorCode::ConnectionFailed,

            Error::ProtocolMalformed { .. } => ErrorCode::ProtocolMalformed,

            Error::AssetNotFound { .. } => ErrorCode::AssetNotFound,
            Error::AudioFailed { .. } => ErrorCode::AudioFailed,

            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Check if the error is fatal (process should exit)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ConfigNotFound { .. }
                | Error::ConfigParse { .. }
                | Error::ConfigValidation { .. }
                | Error::Config(_)
                | Error::Internal(_)
        )
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }

    // ─────────────────────────────────────────────────────────────
    // User-Friendly Messages
    // ─────────────────────────────────────────────────────────────

    /// Get a user-friendly suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::ConfigNotFound { .. } => Some(
                "Run 'eventsub-overlay config init' to create a default configuration file."
            ),
            Error::ConfigParse { .. } => Some(
                "Check your configuration file syntax. Run 'eventsub-overlay config validate' to see details."
            ),
            Error::ConfigValidation { .. } | Error::Config(_) => Some(
                "Review the configuration file and fix the invalid values."
            ),
            Error::ConnectionFailed { .. } => Some(
                "Check your network connection and the eventsub environment (dev expects a local mock on :8080)."
            ),
            Error::SubscribeFailed { .. } => Some(
                "Make sure the subscribe endpoint is running and reachable."
            ),
            Error::AssetNotFound { .. } => Some(
                "Add the missing id under [[assets.images]] or [[assets.audio]] in the configuration."
            ),
            Error::AudioFailed { .. } => Some(
                "Check [audio].player_command and that the clip path exists."
            ),
            _ => None,
        }
    }

    /// Format the error for terminal display with colors
    pub fn format_for_terminal(&self) -> String {
        let mut output = format!(
            "\x1b[31mError [{}]\x1b[0m: {}\n",
            self.code().as_str(),
            self
        );

        if let Some(hint) = self.suggestion() {
            output.push_str(&format!("\n\x1b[33mHint\x1b[0m: {}\n", hint));
        }

        output
    }

    /// Format the error for logging (no colors)
    pub fn format_for_log(&self) -> String {
        format!("[{}] {}", self.code().as_str(), self)
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    /// Create a config validation error with field name
    pub fn config_field_invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a connection failed error
    pub fn connection_failed(url: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConnectionFailed {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a malformed frame error
    pub fn malformed(message: impl Into<String>) -> Self {
        Error::ProtocolMalformed {
            message: message.into(),
        }
    }

    /// Create a missing image asset error
    pub fn image_not_found(id: impl Into<String>) -> Self {
        Error::AssetNotFound {
            kind: "Image",
            id: id.into(),
        }
    }

    /// Create a missing audio asset error
    pub fn audio_not_found(id: impl Into<String>) -> Self {
        Error::AssetNotFound {
            kind: "Audio",
            id: id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_format() {
        assert_eq!(ErrorCode::ConfigNotFound.as_str(), "E100");
        assert_eq!(ErrorCode::ConnectionFailed.as_str(), "E300");
        assert_eq!(ErrorCode::AssetNotFound.as_str(), "E500");
    }

    #[test]
    fn test_error_exit_codes() {
        assert_eq!(ErrorCode::ConfigValidation.exit_code(), 10);
        assert_eq!(ErrorCode::IoRead.exit_code(), 20);
        assert_eq!(ErrorCode::SubscribeFailed.exit_code(), 30);
        assert_eq!(ErrorCode::ProtocolMalformed.exit_code(), 40);
        assert_eq!(ErrorCode::AudioFailed.exit_code(), 50);
        assert_eq!(ErrorCode::InternalError.exit_code(), 90);
    }

    #[test]
    fn test_asset_not_found_display() {
        let err = Error::image_not_found("twitch-new-follower-img");
        assert_eq!(err.to_string(), "Image asset not found: twitch-new-follower-img");
        assert_eq!(err.code(), ErrorCode::AssetNotFound);
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_config_errors_are_fatal() {
        assert!(Error::config_field_invalid("alerts.fps", "must be positive").is_fatal());
        assert!(Error::Config("bad".into()).is_fatal());
        assert!(!Error::connection_failed("ws://x", "refused").is_fatal());
    }

    #[test]
    fn test_format_for_terminal() {
        let err = Error::ConfigNotFound {
            path: PathBuf::from("/tmp/overlay.toml"),
        };
        let formatted = err.format_for_terminal();

        assert!(formatted.contains("E100"));
        assert!(formatted.contains("\x1b[31m"));
        assert!(formatted.contains("config init"));
    }

    #[test]
    fn test_format_for_log() {
        let err = Error::malformed("missing metadata");
        let formatted = err.format_for_log();

        assert!(formatted.contains("[E401]"));
        assert!(!formatted.contains("\x1b["));
    }

    #[test]
    fn test_write_error_keeps_source() {
        let err = Error::IoWrite {
            path: PathBuf::from("/tmp/frames.jsonl"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };

        assert_eq!(err.code(), ErrorCode::IoWrite);
        assert_eq!(err.exit_code(), 20);
        assert!(std::error::Error::source(&err).is_some());
    }
}
