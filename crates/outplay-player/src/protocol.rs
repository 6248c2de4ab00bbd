use std::path::PathBuf;
use std::sync::Arc;

use outplay_core::models::{HttpFormat, MonitorConfig, PlayState, PlayerConfiguration};

use crate::control::{ControlCommand, ControlRequest};
use crate::mpc::MpcHcProtocol;
use crate::status_file::StatusFileProtocol;
use crate::unmonitored::UnmonitoredProtocol;
use crate::vlc::VlcProtocol;
use crate::{RawSnapshot, StatusReport, Telemetry, TelemetryError};

/// What the supervisor needs to know about a player family.
pub trait PlayerProtocol: Send + Sync {
    /// Short protocol name for logs.
    fn name(&self) -> &'static str;

    /// Build the argv for launching `files` with `template`.
    fn build_args(&self, template: &str, files: &[String]) -> Vec<String> {
        crate::args::build_args(template, files)
    }

    /// Interpret one raw snapshot.
    fn parse_snapshot(&self, raw: &RawSnapshot) -> Result<Telemetry, TelemetryError>;

    /// Whether a report means playback has ended.
    fn detect_terminal(&self, report: &StatusReport) -> bool {
        report.play_state == PlayState::Stopped
    }

    /// Native form of `command`, or `None` when the player has no control path for it.
    fn control_request(&self, command: ControlCommand) -> Option<ControlRequest>;
}

/// Pick the protocol matching a player's monitor descriptor.
pub fn protocol_for(player: &PlayerConfiguration) -> Arc<dyn PlayerProtocol> {
    match &player.monitor {
        MonitorConfig::HttpPolling {
            format: HttpFormat::Delimited,
            command_url,
            ..
        } => Arc::new(MpcHcProtocol::new(parse_url(command_url.as_deref()))),
        MonitorConfig::HttpPolling {
            format: HttpFormat::Xml,
            command_url,
            password,
            ..
        } => Arc::new(VlcProtocol::new(
            parse_url(command_url.as_deref()),
            password.clone(),
        )),
        MonitorConfig::FileWatch { companion, .. } => Arc::new(StatusFileProtocol::new(
            companion
                .as_deref()
                .map(|c| companion_path(player, c)),
        )),
        MonitorConfig::None => Arc::new(UnmonitoredProtocol),
    }
}

fn parse_url(raw: Option<&str>) -> Option<url::Url> {
    let raw = raw?;
    match url::Url::parse(raw) {
        Ok(url) => Some(url),
        Err(e) => {
            tracing::warn!(url = raw, "Ignoring invalid command URL: {e}");
            None
        }
    }
}

/// Resolve a companion executable next to the player binary unless absolute.
fn companion_path(player: &PlayerConfiguration, companion: &str) -> PathBuf {
    let path = PathBuf::from(companion);
    if path.is_absolute() {
        return path;
    }
    match player.install_dir() {
        Some(dir) => dir.join(path),
        None => path,
    }
}
