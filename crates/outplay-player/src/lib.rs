//! Per-player protocols and telemetry channels.
//!
//! A `PlayerProtocol` knows how to build a player's command line, read its
//! status snapshots and phrase its native control commands. A `StatusChannel`
//! drives one of the telemetry mechanisms (HTTP polling, status-file watching,
//! or nothing) and yields normalized `StatusReport`s.

pub mod args;
pub mod channel;
pub mod control;
pub mod file_watch;
pub mod http;
pub mod mpc;
pub mod protocol;
pub mod status_file;
pub mod timefmt;
pub mod unmonitored;
pub mod vlc;

use std::time::Duration;

use outplay_core::models::PlayState;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use channel::{ChannelContext, ChannelHandle, StatusChannel, StatusProbe, TelemetryStats};
pub use control::{ControlCommand, ControlError, ControlRequest};
pub use protocol::{protocol_for, PlayerProtocol};

/// One unparsed telemetry sample. Lives for a single tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawSnapshot {
    /// Quoted field list from an HTTP status endpoint.
    Delimited(String),
    /// XML status document.
    Xml(String),
    /// Content of an ini-style status file.
    Ini(String),
}

/// Player status as read from one snapshot, before it is mapped onto a session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusReport {
    pub position: Duration,
    pub duration: Option<Duration>,
    pub play_state: PlayState,
    /// File the player says it is on, as a path or bare file name.
    pub current_file: Option<String>,
}

/// Result of interpreting a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Telemetry {
    Report(StatusReport),
    /// The player is up but has not opened anything yet.
    NothingPlaying,
}

/// A telemetry tick that could not be used. Never fatal to a session.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("empty status response")]
    Empty,

    #[error("expected at least {expected} status fields, got {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("XML error: {0}")]
    Xml(#[from] xmltree::ParseError),

    #[error("snapshot format not handled by {0}")]
    Unsupported(&'static str),
}
