//! The window shell hosting the application.
//!
//! Everything here is cosmetic: a failing host call is logged by the caller
//! and never ends a playback session.

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum WindowError {
    #[error("host window unavailable: {0}")]
    Unavailable(String),

    #[error("navigation to {target} failed: {reason}")]
    Navigate { target: String, reason: String },
}

/// Operations the supervisor needs from the host shell.
pub trait HostWindowController: Send + Sync {
    /// Open an internal page or URL in place of spawning a process.
    fn navigate(&self, target: &str) -> Result<(), WindowError>;

    fn minimize_host(&self) -> Result<(), WindowError>;

    fn restore_host(&self) -> Result<(), WindowError>;

    /// Raise the player's window, if it has one the host can find.
    fn bring_to_front(&self, pid: Option<u32>) -> Result<(), WindowError>;

    fn show_splash(&self) -> Result<(), WindowError>;

    fn hide_splash(&self) -> Result<(), WindowError>;

    /// Whether the player has put up its main window yet.
    fn player_window_ready(&self, pid: Option<u32>) -> bool;
}

/// Host for terminal use: there is no window to manage.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessHost;

impl HostWindowController for HeadlessHost {
    fn navigate(&self, target: &str) -> Result<(), WindowError> {
        debug!(target, "Headless host: navigation requested");
        Ok(())
    }

    fn minimize_host(&self) -> Result<(), WindowError> {
        Ok(())
    }

    fn restore_host(&self) -> Result<(), WindowError> {
        Ok(())
    }

    fn bring_to_front(&self, _pid: Option<u32>) -> Result<(), WindowError> {
        Ok(())
    }

    fn show_splash(&self) -> Result<(), WindowError> {
        Ok(())
    }

    fn hide_splash(&self) -> Result<(), WindowError> {
        Ok(())
    }

    fn player_window_ready(&self, _pid: Option<u32>) -> bool {
        true
    }
}
