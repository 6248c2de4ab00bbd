//! MPC-HC web interface: `status.html` field list and `command.html` codes.

use std::sync::LazyLock;
use std::time::Duration;

use outplay_core::models::PlayState;
use regex::Regex;
use url::Url;

use crate::control::{ControlCommand, ControlRequest};
use crate::protocol::PlayerProtocol;
use crate::timefmt::{format_clock, parse_clock};
use crate::{RawSnapshot, StatusReport, Telemetry, TelemetryError};

pub const WM_PLAY: i32 = 887;
pub const WM_PAUSE: i32 = 888;
pub const WM_STOP: i32 = 890;
pub const WM_EXIT: i32 = 816;
/// Pseudo-command paired with a `position` parameter.
pub const WM_SEEK: i32 = -1;

/// Minimum fields: title, state, posMs, pos, durMs, dur.
const MIN_FIELDS: usize = 6;

static FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""((?:[^"\\]|\\.)*)"|'((?:[^'\\]|\\.)*)'|(-?\d+(?:\.\d+)?)"#)
        .expect("field pattern is valid")
});

pub struct MpcHcProtocol {
    command_url: Option<Url>,
}

impl MpcHcProtocol {
    pub fn new(command_url: Option<Url>) -> Self {
        Self { command_url }
    }

    fn command(&self, code: i32, position: Option<Duration>) -> Option<ControlRequest> {
        let mut url = self.command_url.clone()?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("wm_command", &code.to_string());
            if let Some(position) = position {
                query.append_pair("position", &format_clock(position));
            }
        }
        Some(ControlRequest::Http {
            url,
            password: None,
        })
    }
}

/// Split a status line into its field values.
///
/// Accepts the bare list or the `OnStatus(...)` wrapper that MPC-HC emits.
pub fn split_fields(body: &str) -> Vec<String> {
    let body = body.trim();
    let inner = body
        .strip_prefix("OnStatus(")
        .and_then(|s| s.trim_end_matches(';').strip_suffix(')'))
        .unwrap_or(body);

    FIELD_RE
        .captures_iter(inner)
        .filter_map(|caps| {
            if let Some(m) = caps.get(1) {
                Some(m.as_str().replace("\\\"", "\""))
            } else if let Some(m) = caps.get(2) {
                Some(m.as_str().replace("\\'", "'"))
            } else {
                caps.get(3).map(|m| m.as_str().to_string())
            }
        })
        .collect()
}

fn millis_field(fields: &[String], ms_index: usize, clock_index: usize) -> Option<Duration> {
    fields
        .get(ms_index)
        .and_then(|f| f.parse::<f64>().ok())
        .filter(|ms| ms.is_finite() && *ms >= 0.0)
        .map(|ms| Duration::from_millis(ms as u64))
        .or_else(|| fields.get(clock_index).and_then(|f| parse_clock(f)))
}

/// Parse an MPC-HC status line.
pub fn parse_status(body: &str) -> Result<Telemetry, TelemetryError> {
    if body.trim().is_empty() {
        return Err(TelemetryError::Empty);
    }
    let fields = split_fields(body);
    if fields.len() < MIN_FIELDS {
        return Err(TelemetryError::FieldCount {
            expected: MIN_FIELDS,
            found: fields.len(),
        });
    }

    let title = fields[0].trim();
    let path = fields.get(8).map(|p| p.trim()).unwrap_or_default();
    let play_state = PlayState::from_keyword(&fields[1]);

    if title.is_empty() && path.is_empty() && !play_state.is_live() {
        return Ok(Telemetry::NothingPlaying);
    }

    let position = millis_field(&fields, 2, 3)
        .ok_or_else(|| TelemetryError::Parse(format!("bad position field {:?}", fields[2])))?;
    let duration = millis_field(&fields, 4, 5).filter(|d| !d.is_zero());
    let current_file = if path.is_empty() { title } else { path };

    Ok(Telemetry::Report(StatusReport {
        position,
        duration,
        play_state,
        current_file: Some(current_file.to_string()),
    }))
}

impl PlayerProtocol for MpcHcProtocol {
    fn name(&self) -> &'static str {
        "mpc-hc"
    }

    fn parse_snapshot(&self, raw: &RawSnapshot) -> Result<Telemetry, TelemetryError> {
        match raw {
            RawSnapshot::Delimited(body) => parse_status(body),
            _ => Err(TelemetryError::Unsupported(self.name())),
        }
    }

    fn control_request(&self, command: ControlCommand) -> Option<ControlRequest> {
        match command {
            ControlCommand::Pause => self.command(WM_PAUSE, None),
            ControlCommand::Resume => self.command(WM_PLAY, None),
            ControlCommand::Stop => self.command(WM_STOP, None),
            ControlCommand::Close => self.command(WM_EXIT, None),
            ControlCommand::Seek(position) => self.command(WM_SEEK, Some(position)),
        }
    }
}
