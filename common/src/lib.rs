//! Common types and utilities for Rota.
//!
//! This crate defines the IPC protocol used for communication between the
//! rotation daemon (`rota`) and its control client (`rotactl`).
//!
//! # IPC Protocol
//!
//! Communication happens over a Unix domain socket using newline-delimited
//! JSON messages. The client sends one [`Command`] per line and receives one
//! [`Response`] per line.
//!
//! # Examples
//!
//! ```no_run
//! use common::Command;
//!
//! // Ask the daemon to step back through its history
//! let cmd = Command::Prev;
//!
//! // Serialize for sending over IPC
//! let json = serde_json::to_string(&cmd).unwrap();
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error types shared between client and daemon.
///
/// All errors are serializable for transmission over IPC.
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum RotaError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("IPC error: {0}")]
    Ipc(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<std::io::Error> for RotaError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for RotaError {
    fn from(e: serde_json::Error) -> Self {
        Self::Ipc(e.to_string())
    }
}

/// Commands sent from client to daemon via IPC.
///
/// # Examples
///
/// ```
/// use common::Command;
///
/// // Simulate one step of the scroll wheel towards newer images
/// let cmd = Command::Scroll { forward: true };
/// ```
#[derive(Debug, Serialize, Deserialize)]
pub enum Command {
    /// Ping the daemon
    Ping,
    /// Query engine status
    Status,
    /// Show a fresh image immediately, regardless of history position
    Change,
    /// Step forward in history, or fetch a fresh image at the newest entry
    Next,
    /// Step back to an older image
    Prev,
    /// Scroll-wheel navigation, debounced by the daemon
    Scroll {
        /// `true` moves towards newer images, `false` towards older ones
        forward: bool,
    },
    /// Stop periodic changes
    Pause,
    /// Resume periodic changes
    Resume,
    /// Flip between paused and running
    TogglePause,
    /// Re-read the configuration file
    Reload,
    /// Move the current image into the favorites folder
    Favorite,
    /// Move the current image to the trash
    Trash,
    /// Shut the daemon down
    Kill,
}

/// Response from daemon to client
#[derive(Debug, Serialize, Deserialize)]
pub enum Response {
    Ok,
    Pong,
    Error(RotaError),
    Status(EngineStatus),
}

/// Snapshot of the rotation engine, as reported by [`Command::Status`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub version: String,
    pub uptime_secs: u64,
    /// Path of the image last applied as wallpaper
    pub current: Option<String>,
    /// Where the current image came from (folder name or sidecar label)
    pub origin_label: Option<String>,
    pub origin_url: Option<String>,
    /// History cursor, 0 is the newest entry
    pub position: usize,
    pub history_len: usize,
    pub can_step_back: bool,
    pub paused: bool,
    /// Images waiting in the prepared buffer
    pub prepared: usize,
    /// Last known total number of eligible images
    pub image_count: usize,
    /// Local time of the last successful change (RFC 3339)
    pub last_change: Option<String>,
}

impl EngineStatus {
    /// Short human label for the pause state
    pub fn state_label(&self) -> &'static str {
        if self.paused { "paused" } else { "running" }
    }
}

/// IPC socket path helper
pub fn get_socket_path() -> std::path::PathBuf {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
        .unwrap_or_else(|_| format!("/run/user/{}", unsafe { libc::getuid() }));

    std::path::PathBuf::from(runtime_dir).join("rota.sock")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_status() -> EngineStatus {
        EngineStatus {
            version: "0.1.0".to_string(),
            uptime_secs: 42,
            current: Some("/tmp/a.jpg".to_string()),
            origin_label: Some("tmp".to_string()),
            origin_url: None,
            position: 1,
            history_len: 3,
            can_step_back: true,
            paused: false,
            prepared: 7,
            image_count: 120,
            last_change: None,
        }
    }

    #[test]
    fn test_status_state_label() {
        let mut status = sample_status();
        assert_eq!(status.state_label(), "running");
        status.paused = true;
        assert_eq!(status.state_label(), "paused");
    }

    #[test]
    fn test_response_serialization() {
        let resp = Response::Status(sample_status());
        let json = serde_json::to_string(&resp).unwrap();
        let deserialized: Response = serde_json::from_str(&json).unwrap();
        match deserialized {
            Response::Status(status) => {
                assert_eq!(status.position, 1);
                assert_eq!(status.history_len, 3);
                assert_eq!(status.current.as_deref(), Some("/tmp/a.jpg"));
            }
            other => panic!("Wrong response type: {:?}", other),
        }

        let resp = Response::Error(RotaError::NotFound("test".to_string()));
        let json = serde_json::to_string(&resp).unwrap();
        let deserialized: Response = serde_json::from_str(&json).unwrap();
        assert!(matches!(deserialized, Response::Error(RotaError::NotFound(_))));
    }

    #[test]
    fn test_rota_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: RotaError = io_err.into();
        assert!(matches!(err, RotaError::Io(_)));

        let json_err = serde_json::from_str::<Command>("invalid json").unwrap_err();
        let err: RotaError = json_err.into();
        assert!(matches!(err, RotaError::Ipc(_)));
    }

    #[test]
    fn test_socket_path() {
        let path = get_socket_path();
        assert!(path.to_str().unwrap().contains("rota.sock"));
    }
}
