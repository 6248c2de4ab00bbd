//! VLC HTTP interface: `requests/status.xml`.

use std::time::Duration;

use outplay_core::models::PlayState;
use url::Url;
use xmltree::{Element, XMLNode};

use crate::control::{ControlCommand, ControlRequest};
use crate::protocol::PlayerProtocol;
use crate::{RawSnapshot, StatusReport, Telemetry, TelemetryError};

pub struct VlcProtocol {
    command_url: Option<Url>,
    password: Option<String>,
}

impl VlcProtocol {
    pub fn new(command_url: Option<Url>, password: Option<String>) -> Self {
        Self {
            command_url,
            password,
        }
    }

    fn command(&self, pairs: &[(&str, String)]) -> Option<ControlRequest> {
        let mut url = self.command_url.clone()?;
        url.query_pairs_mut()
            .extend_pairs(pairs.iter().map(|(k, v)| (*k, v.as_str())));
        Some(ControlRequest::Http {
            url,
            password: self.password.clone(),
        })
    }
}

fn child_text(parent: &Element, name: &str) -> Option<String> {
    parent
        .get_child(name)
        .and_then(|c| c.get_text())
        .map(|t| t.trim().to_string())
}

fn seconds(parent: &Element, name: &str) -> Option<Duration> {
    child_text(parent, name)
        .and_then(|t| t.parse::<f64>().ok())
        .filter(|s| s.is_finite() && *s >= 0.0)
        .map(Duration::from_secs_f64)
}

fn element_children<'a>(parent: &'a Element, name: &'a str) -> impl Iterator<Item = &'a Element> {
    parent.children.iter().filter_map(move |node| match node {
        XMLNode::Element(elem) if elem.name == name => Some(elem),
        _ => None,
    })
}

fn has_name(elem: &Element, name: &str) -> bool {
    elem.attributes.get("name").is_some_and(|n| n == name)
}

/// `information/category[@name='meta']/info[@name='filename']`
fn meta_filename(root: &Element) -> Option<String> {
    let information = root.get_child("information")?;
    element_children(information, "category")
        .filter(|c| has_name(c, "meta"))
        .flat_map(|c| element_children(c, "info"))
        .find(|i| has_name(i, "filename"))
        .and_then(|i| i.get_text())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Parse a VLC status document.
pub fn parse_status(body: &str) -> Result<Telemetry, TelemetryError> {
    if body.trim().is_empty() {
        return Err(TelemetryError::Empty);
    }
    let root = Element::parse(body.as_bytes())?;

    let Some(filename) = meta_filename(&root) else {
        return Ok(Telemetry::NothingPlaying);
    };

    let position = seconds(&root, "time")
        .ok_or_else(|| TelemetryError::Parse("missing <time>".into()))?;
    let duration = seconds(&root, "length").filter(|d| !d.is_zero());
    let play_state = child_text(&root, "state")
        .map(|s| PlayState::from_keyword(&s))
        .unwrap_or_default();

    Ok(Telemetry::Report(StatusReport {
        position,
        duration,
        play_state,
        current_file: Some(filename),
    }))
}

impl PlayerProtocol for VlcProtocol {
    fn name(&self) -> &'static str {
        "vlc"
    }

    fn parse_snapshot(&self, raw: &RawSnapshot) -> Result<Telemetry, TelemetryError> {
        match raw {
            RawSnapshot::Xml(body) => parse_status(body),
            _ => Err(TelemetryError::Unsupported(self.name())),
        }
    }

    fn control_request(&self, command: ControlCommand) -> Option<ControlRequest> {
        match command {
            ControlCommand::Pause => self.command(&[("command", "pl_forcepause".into())]),
            ControlCommand::Resume => self.command(&[("command", "pl_forceresume".into())]),
            ControlCommand::Stop => self.command(&[("command", "pl_stop".into())]),
            ControlCommand::Seek(position) => self.command(&[
                ("command", "seek".into()),
                ("val", position.as_secs().to_string()),
            ]),
            // The HTTP interface cannot quit VLC; --play-and-exit covers it.
            ControlCommand::Close => None,
        }
    }
}
