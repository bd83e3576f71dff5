//! Common types and utilities for Clipchain.
//!
//! This crate defines the shared data structures and IPC protocol used for
//! communication between the sequencer daemon (`clipchain`) and the control
//! client (`clipctl`).
//!
//! # IPC Protocol
//!
//! Communication happens over a Unix domain socket using JSON-serialized
//! messages, one per line. The client sends [`Command`] variants and receives
//! [`Response`] variants.
//!
//! # Examples
//!
//! ```no_run
//! use common::{Command, Response};
//!
//! // Leave a looping clip and continue with the next one
//! let cmd = Command::Skip;
//!
//! // Serialize for sending over IPC
//! let json = serde_json::to_string(&cmd).unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error taxonomy shared between client and daemon.
///
/// All errors are serializable for transmission over IPC.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequenceError {
    /// A clip could not be fetched or prepared for playback
    #[error("{0}")]
    Resolution(String),

    /// A playable surface reported a decode or play failure
    #[error("{0}")]
    Playback(String),

    /// Invalid configuration (empty clip list, bad stage, missing feature)
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IPC error: {0}")]
    Ipc(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl SequenceError {
    /// Short label used in logs and status output
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::Resolution(_) => "resolution",
            Self::Playback(_) => "playback",
            Self::Configuration(_) => "configuration",
            Self::Ipc(_) => "ipc",
            Self::Io(_) => "io",
        }
    }
}

impl From<std::io::Error> for SequenceError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for SequenceError {
    fn from(e: serde_json::Error) -> Self {
        Self::Ipc(e.to_string())
    }
}

/// Policy deciding which clip becomes active once the current one completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionRule {
    /// Move to the following clip
    Next,
    /// Replay the same clip (loop)
    #[serde(alias = "loop")]
    Current,
    /// Move back to the preceding clip
    #[serde(alias = "prev")]
    Previous,
}

impl TransitionRule {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Next => "next",
            Self::Current => "current",
            Self::Previous => "previous",
        }
    }
}

impl fmt::Display for TransitionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Strategy that turns the active surface's frame into output pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RenderBackendKind {
    /// Copy the frame onto a 2D canvas at a fixed destination rectangle
    #[default]
    DirectDraw,
    /// Texture a plane from the frame and render it through an orthographic camera
    Composited,
}

/// Number of playable surfaces the controller drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BufferingMode {
    /// One surface, sequential load-then-play
    #[default]
    Single,
    /// Two surfaces, the next clip is preloaded into the standby one
    Double,
}

impl BufferingMode {
    pub fn surface_count(&self) -> usize {
        match self {
            Self::Single => 1,
            Self::Double => 2,
        }
    }
}

/// Phases of the sequence controller state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    #[default]
    Inert,
    Init,
    RequestingClips,
    WaitingClipsResponse,
    ClipsReceived,
    LoadNextClip,
    LoadingClip,
    LoadedClip,
    PlayClip,
    PlayingClip,
    AdvanceClip,
    EndedSequence,
    Error,
    Stop,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Inert => "inert",
            Self::Init => "init",
            Self::RequestingClips => "requesting-clips",
            Self::WaitingClipsResponse => "waiting-clips-response",
            Self::ClipsReceived => "clips-received",
            Self::LoadNextClip => "load-next-clip",
            Self::LoadingClip => "loading-clip",
            Self::LoadedClip => "loaded-clip",
            Self::PlayClip => "play-clip",
            Self::PlayingClip => "playing-clip",
            Self::AdvanceClip => "advance-clip",
            Self::EndedSequence => "ended-sequence",
            Self::Error => "error",
            Self::Stop => "stop",
        }
    }

    /// Phases in which a clip is bound to the active surface
    pub fn has_active_clip(&self) -> bool {
        matches!(
            self,
            Self::LoadNextClip
                | Self::LoadingClip
                | Self::LoadedClip
                | Self::PlayClip
                | Self::PlayingClip
                | Self::AdvanceClip
        )
    }

    /// Whether the sequence is somewhere between `init` and `stop`
    pub fn is_running(&self) -> bool {
        !matches!(self, Self::Inert | Self::Stop)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    Success,
    Error,
}

/// One informational or error entry for the status sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub kind: MessageKind,
    pub text: String,
}

impl StatusMessage {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Success,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Error,
            text: text.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == MessageKind::Error
    }
}

/// Commands sent from client to daemon via IPC.
///
/// # Examples
///
/// ```
/// use common::Command;
///
/// let cmd = Command::Start;
/// let json = serde_json::to_string(&cmd).unwrap();
/// assert_eq!(json, "\"Start\"");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Ping the daemon
    Ping,
    /// Query the sequence status
    Status,
    /// Post the init signal to an inert sequence
    Start,
    /// Stop the running sequence and release its resources
    Stop,
    /// Leave the current clip with a `next` transition at its next advance
    Skip,
    /// Return a stopped sequence to `inert` and start it again
    Restart,
    /// Kill the daemon
    Kill,
}

/// Response from daemon to client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    Ok,
    Pong,
    Status(SequenceStatus),
    Error(SequenceError),
}

/// Snapshot of the controller state, as published after each tick
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SequenceStatus {
    pub version: String,
    pub uptime_secs: u64,
    pub phase: Phase,
    pub active_index: usize,
    pub clips: Vec<ClipStatus>,
    pub messages: Vec<StatusMessage>,
    /// Bumped on every in-place mutation of the clip arena
    pub generation: u64,
    pub ticks: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipStatus {
    pub source: String,
    pub rule: TransitionRule,
    pub resolved: bool,
    pub duration_ms: Option<u64>,
}

/// IPC socket path helper
pub fn get_socket_path() -> std::path::PathBuf {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
        .unwrap_or_else(|_| format!("/run/user/{}", unsafe { libc::getuid() }));

    std::path::PathBuf::from(runtime_dir).join("clipchain.sock")
}
