use crate::control::{ControlCommand, ControlRequest};
use crate::protocol::PlayerProtocol;
use crate::{RawSnapshot, Telemetry, TelemetryError};

/// Players with no telemetry and no control path. Only process exit is observable.
pub struct UnmonitoredProtocol;

impl PlayerProtocol for UnmonitoredProtocol {
    fn name(&self) -> &'static str {
        "unmonitored"
    }

    fn parse_snapshot(&self, _raw: &RawSnapshot) -> Result<Telemetry, TelemetryError> {
        Err(TelemetryError::Unsupported(self.name()))
    }

    fn control_request(&self, _command: ControlCommand) -> Option<ControlRequest> {
        None
    }
}
