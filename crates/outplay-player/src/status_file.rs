//! Ini-style status files written by players without a network interface,
//! controlled through a companion executable.

use std::collections::HashMap;
use std::path::PathBuf;

use outplay_core::models::PlayState;

use crate::control::{ControlCommand, ControlRequest};
use crate::protocol::PlayerProtocol;
use crate::timefmt::parse_clock;
use crate::{RawSnapshot, StatusReport, Telemetry, TelemetryError};

const STATE_KEYS: &[&str] = &["state", "playstate"];
const POSITION_KEYS: &[&str] = &["curtime", "currenttime", "position"];
const DURATION_KEYS: &[&str] = &["totaltime", "duration"];
const FILE_KEYS: &[&str] = &["currentfile", "file"];

pub struct StatusFileProtocol {
    companion: Option<PathBuf>,
}

impl StatusFileProtocol {
    pub fn new(companion: Option<PathBuf>) -> Self {
        Self { companion }
    }

    fn companion(&self, args: Vec<String>) -> Option<ControlRequest> {
        Some(ControlRequest::Companion {
            program: self.companion.clone()?,
            args,
        })
    }
}

/// Parse `key=value` lines. Keys are lowercased; section headers and
/// comments are skipped.
pub fn parse_ini(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with(['[', ';', '#']))
        .filter_map(|l| l.split_once('='))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect()
}

fn lookup<'a>(values: &'a HashMap<String, String>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| values.get(*k))
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

/// Interpret a status file.
pub fn parse_status(content: &str) -> Result<Telemetry, TelemetryError> {
    let values = parse_ini(content);
    let state = lookup(&values, STATE_KEYS);
    let position = lookup(&values, POSITION_KEYS);

    if state.is_none() && position.is_none() {
        return Err(TelemetryError::Empty);
    }

    let position = match position {
        Some(p) => parse_clock(p)
            .ok_or_else(|| TelemetryError::Parse(format!("bad current time {p:?}")))?,
        None => Default::default(),
    };
    let duration = lookup(&values, DURATION_KEYS)
        .and_then(parse_clock)
        .filter(|d| !d.is_zero());

    Ok(Telemetry::Report(StatusReport {
        position,
        duration,
        play_state: state.map(PlayState::from_keyword).unwrap_or_default(),
        current_file: lookup(&values, FILE_KEYS).map(str::to_string),
    }))
}

impl PlayerProtocol for StatusFileProtocol {
    fn name(&self) -> &'static str {
        "status-file"
    }

    fn parse_snapshot(&self, raw: &RawSnapshot) -> Result<Telemetry, TelemetryError> {
        match raw {
            RawSnapshot::Ini(content) => parse_status(content),
            _ => Err(TelemetryError::Unsupported(self.name())),
        }
    }

    fn control_request(&self, command: ControlCommand) -> Option<ControlRequest> {
        let args = match command {
            ControlCommand::Pause => vec!["/pause".into()],
            ControlCommand::Resume => vec!["/play".into()],
            ControlCommand::Stop => vec!["/stop".into()],
            ControlCommand::Close => vec!["/close".into()],
            ControlCommand::Seek(position) => {
                vec!["/seek".into(), position.as_secs().to_string()]
            }
        };
        self.companion(args)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_parse_status_file() {
        let content = "[Status]\r\nState=Play\r\nCurTime=00:12:30\r\nTotalTime=01:40:00\r\nCurrentFile=D:\\Movies\\Film.m2ts\r\n";
        let Telemetry::Report(report) = parse_status(content).unwrap() else {
            panic!("Expected a report");
        };
        assert_eq!(report.play_state, PlayState::Playing);
        assert_eq!(report.position, Duration::from_secs(750));
        assert_eq!(report.duration, Some(Duration::from_secs(6000)));
        assert_eq!(report.current_file.as_deref(), Some("D:\\Movies\\Film.m2ts"));
    }

    #[test]
    fn test_keys_case_insensitive() {
        let Telemetry::Report(report) = parse_status("STATE=Stop\ncurrenttime=5").unwrap() else {
            panic!("Expected a report");
        };
        assert_eq!(report.play_state, PlayState::Stopped);
        assert_eq!(report.position, Duration::from_secs(5));
    }

    #[test]
    fn test_half_written_file_is_error() {
        assert!(matches!(parse_status(""), Err(TelemetryError::Empty)));
        assert!(matches!(parse_status("[Status]\nSta"), Err(TelemetryError::Empty)));
        assert!(matches!(
            parse_status("State=Play\nCurTime=00:1"),
            Ok(Telemetry::Report(_))
        ));
        assert!(matches!(
            parse_status("State=Play\nCurTime=0x:1"),
            Err(TelemetryError::Parse(_))
        ));
    }

    #[test]
    fn test_companion_commands() {
        let protocol = StatusFileProtocol::new(Some(PathBuf::from("/opt/tmt/cmd")));
        assert_eq!(
            protocol.control_request(ControlCommand::Seek(Duration::from_secs(61))),
            Some(ControlRequest::Companion {
                program: PathBuf::from("/opt/tmt/cmd"),
                args: vec!["/seek".into(), "61".into()],
            })
        );
        assert!(StatusFileProtocol::new(None)
            .control_request(ControlCommand::Pause)
            .is_none());
    }
}
