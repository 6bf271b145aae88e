//! Common types and utilities for the handover engine.
//!
//! This crate defines the shared data structures and IPC protocol used for
//! communication between the daemon (`handoverd`) and the
//! client (`handoverctl`).
//!
//! # IPC Protocol
//!
//! Communication happens over a Unix domain socket using newline-delimited
//! JSON messages. The client sends [`Command`] variants and receives
//! [`Response`] variants.
//!
//! # Examples
//!
//! ```no_run
//! use common::{Command, ParameterChange};
//!
//! // Queue a new source; the daemon pre-buffers it and swaps when ready
//! let cmd = Command::SetParameter(ParameterChange::Url(
//!     "https://example.com/next.mp4".to_string(),
//! ));
//!
//! let json = serde_json::to_string(&cmd).unwrap();
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error taxonomy shared between client and daemon.
///
/// All errors are serializable for transmission over IPC.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlaybackError {
    /// The media backend rejected a source.
    #[error("Load failure: {0}")]
    LoadFailure(String),

    /// The backend failed mid-stream.
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// The shared frame buffer could not be resized.
    #[error("Frame buffer allocation failed: {0}")]
    BufferAllocation(String),

    #[error("IPC error: {0}")]
    Ipc(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for PlaybackError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for PlaybackError {
    fn from(e: serde_json::Error) -> Self {
        Self::Ipc(e.to_string())
    }
}

/// A single host input change.
///
/// The daemon writes each change into the named input slot the engine reads
/// on its next poll cycle, so these mirror the engine's input table rather
/// than calling playback operations directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterChange {
    /// Desired source URL or path. An empty string stops both streams.
    Url(String),
    Paused(bool),
    Looping(bool),
    /// Output a black frame instead of video while set.
    Blackout(bool),
    /// Seek target as a fraction of the duration (0.0 - 1.0)
    Seek(f32),
    /// Playback rate, clamped by the daemon to its configured bounds
    Speed(f32),
    /// Start trim in seconds
    StartTime(f32),
    /// End trim in seconds, 0 disables
    EndTime(f32),
    /// Hold a ready handover until a cue fires instead of swapping at once
    SwitchOnCue(bool),
    /// Fire the switch cue
    SwitchCue,
}

/// Commands sent from client to daemon via IPC.
#[derive(Debug, Serialize, Deserialize)]
pub enum Command {
    /// Change one engine input
    SetParameter(ParameterChange),
    /// Query the engine's status table
    Query,
    /// Write the current visible frame to a PNG file
    Snapshot { path: String },
    /// Ping the daemon
    Ping,
    /// Kill the daemon
    Kill,
}

/// Response from daemon to client
#[derive(Debug, Serialize, Deserialize)]
pub enum Response {
    Ok,
    Error(PlaybackError),
    Status(NodeStatus),
    Pong,
}

/// Geometry the engine currently reports to the render path
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputFormat {
    pub width: u32,
    pub height: u32,
    pub aspect_x: u32,
    pub aspect_y: u32,
}

impl OutputFormat {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            aspect_x: width,
            aspect_y: height,
        }
    }
}

/// One formatted row of the engine's status table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoRow {
    pub name: String,
    pub value: String,
}

/// Daemon and engine status
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeStatus {
    pub version: String,
    pub uptime_secs: u64,
    pub format: OutputFormat,
    pub rows: Vec<InfoRow>,
    pub warning: Option<String>,
    pub error: Option<String>,
    pub info: Option<String>,
}

impl NodeStatus {
    /// Look up a status row by name
    pub fn row(&self, name: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|row| row.name == name)
            .map(|row| row.value.as_str())
    }
}

/// IPC socket path helper
pub fn get_socket_path() -> std::path::PathBuf {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
        .unwrap_or_else(|_| format!("/run/user/{}", unsafe { libc::getuid() }));

    std::path::PathBuf::from(runtime_dir).join("handover.sock")
}
