use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use outplay_core::models::{LaunchMode, PlayableSession, PlayerConfiguration};
use outplay_player::args::{display_command_line, FILES_PLACEHOLDER};
use outplay_player::PlayerProtocol;
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::host::{HostWindowController, WindowError};

/// How often the player window is checked for while the splash is up.
const WINDOW_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("player executable not found: {0}")]
    NotFound(String),

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("host navigation failed: {0}")]
    Navigate(#[from] WindowError),

    #[error("player {0} has no navigate target")]
    MissingNavigateTarget(String),
}

/// A started player. `child` is `None` for host-navigated players.
#[derive(Debug)]
pub struct LaunchedPlayer {
    pub child: Option<Child>,
    pub pid: Option<u32>,
}

/// Starts players and manages the host window around them.
pub struct ProcessLauncher {
    host: Arc<dyn HostWindowController>,
    splash_timeout: Duration,
}

impl ProcessLauncher {
    pub fn new(host: Arc<dyn HostWindowController>, splash_timeout: Duration) -> Self {
        Self {
            host,
            splash_timeout,
        }
    }

    /// Start `player` on `session`. Must be called inside a Tokio runtime.
    pub fn launch(
        &self,
        player: &PlayerConfiguration,
        protocol: &dyn PlayerProtocol,
        session: &PlayableSession,
    ) -> Result<LaunchedPlayer, LaunchError> {
        match player.launch_mode {
            LaunchMode::CommandLine => {
                let program = resolve_executable(&player.command)?;
                let args = protocol.build_args(&player.arguments, &session.files);
                info!(
                    player = %player.name,
                    command = %display_command_line(&program.to_string_lossy(), &args),
                    "Launching player"
                );
                let child = Command::new(&program)
                    .args(&args)
                    .stdin(Stdio::null())
                    .spawn()
                    .map_err(|source| LaunchError::Spawn {
                        program: program.display().to_string(),
                        source,
                    })?;
                let pid = child.id();
                debug!(player = %player.name, ?pid, "Player process started");
                Ok(LaunchedPlayer {
                    child: Some(child),
                    pid,
                })
            }
            LaunchMode::HostNavigate => {
                let target = player
                    .navigate_target
                    .as_deref()
                    .ok_or_else(|| LaunchError::MissingNavigateTarget(player.name.clone()))?;
                let target = navigate_url(target, &session.files);
                info!(player = %player.name, %target, "Navigating host to player");
                self.host.navigate(&target)?;
                Ok(LaunchedPlayer {
                    child: None,
                    pid: None,
                })
            }
        }
    }

    /// Put the player in front of the host: splash until its window shows up
    /// (bounded), minimize the host if asked, then raise the player.
    pub async fn present(&self, player: &PlayerConfiguration, pid: Option<u32>) {
        if player.show_splash_screen {
            if let Err(e) = self.host.show_splash() {
                warn!(player = %player.name, "Failed to show splash: {e}");
            }
            let deadline = Instant::now() + self.splash_timeout;
            let mut ticker = tokio::time::interval(WINDOW_POLL);
            loop {
                ticker.tick().await;
                if self.host.player_window_ready(pid) {
                    debug!(player = %player.name, "Player window ready");
                    break;
                }
                if Instant::now() >= deadline {
                    debug!(player = %player.name, "Player window not seen before splash timeout");
                    break;
                }
            }
        }

        if player.minimize_host {
            if let Err(e) = self.host.minimize_host() {
                warn!(player = %player.name, "Failed to minimize host: {e}");
            }
        }

        if let Err(e) = self.host.bring_to_front(pid) {
            warn!(player = %player.name, "Failed to bring player to front: {e}");
        }
    }

    /// Restore the host window and drop the splash. Safe to call whether or
    /// not either was touched.
    pub fn restore(&self) {
        if let Err(e) = self.host.restore_host() {
            warn!("Failed to restore host window: {e}");
        }
        if let Err(e) = self.host.hide_splash() {
            warn!("Failed to hide splash: {e}");
        }
    }
}

/// Wait for the player process to exit and return its exit code.
pub async fn wait_for_exit(child: &mut Child) -> Option<i32> {
    match child.wait().await {
        Ok(status) => status.code(),
        Err(e) => {
            warn!("Failed waiting for player process: {e}");
            None
        }
    }
}

/// Locate the player executable. Paths must exist; bare names are searched
/// on `PATH`.
pub fn resolve_executable(command: &str) -> Result<PathBuf, LaunchError> {
    let command = command.trim();
    if command.is_empty() {
        return Err(LaunchError::NotFound(String::new()));
    }
    let path = Path::new(command);
    if path.is_absolute() || path.components().count() > 1 {
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(LaunchError::NotFound(command.to_string()))
        };
    }
    which::which(command).map_err(|_| LaunchError::NotFound(command.to_string()))
}

/// Substitute the session files into a navigate target. Files are
/// percent-encoded and joined with `|`.
pub fn navigate_url(target: &str, files: &[String]) -> String {
    if !target.contains(FILES_PLACEHOLDER) {
        return target.to_string();
    }
    let encoded: Vec<String> = files
        .iter()
        .map(|f| url::form_urlencoded::byte_serialize(f.as_bytes()).collect())
        .collect();
    target.replace(FILES_PLACEHOLDER, &encoded.join("|"))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use outplay_player::protocol_for;

    use super::*;
    use crate::host::recording::RecordingHost;

    fn session(files: &[&str]) -> PlayableSession {
        PlayableSession {
            files: files.iter().map(|f| f.to_string()).collect(),
            source_files: files.iter().map(PathBuf::from).collect(),
            file_media_index: vec![0; files.len()],
            media_ids: vec!["m1".into()],
            start_file_index: 0,
            start_offset: Duration::ZERO,
            resume_requested: false,
            playlist: None,
        }
    }

    #[test]
    fn test_resolve_missing_executable() {
        assert!(matches!(
            resolve_executable("outplay-no-such-player-binary"),
            Err(LaunchError::NotFound(_))
        ));
        assert!(matches!(
            resolve_executable("/nonexistent/bin/player"),
            Err(LaunchError::NotFound(_))
        ));
        assert!(matches!(resolve_executable("  "), Err(LaunchError::NotFound(_))));
    }

    #[test]
    fn test_resolve_existing_path() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("player");
        std::fs::write(&exe, b"").unwrap();
        assert_eq!(resolve_executable(exe.to_str().unwrap()).unwrap(), exe);
    }

    #[test]
    fn test_navigate_url_encodes_files() {
        let url = navigate_url(
            "mcplayer://play?files={files}",
            &["/media/a b.mkv".into(), "/media/c.mkv".into()],
        );
        assert_eq!(url, "mcplayer://play?files=%2Fmedia%2Fa+b.mkv|%2Fmedia%2Fc.mkv");
        assert_eq!(navigate_url("mcplayer://home", &["x".into()]), "mcplayer://home");
    }

    #[tokio::test]
    async fn test_host_navigate_launch() {
        let host = Arc::new(RecordingHost::new(0));
        let launcher = ProcessLauncher::new(host.clone(), Duration::from_secs(1));
        let mut player = PlayerConfiguration::new("Media Center", "");
        player.launch_mode = LaunchMode::HostNavigate;
        player.navigate_target = Some("mcplayer://play?files={files}".into());

        let launched = launcher
            .launch(&player, protocol_for(&player).as_ref(), &session(&["movie.mkv"]))
            .unwrap();
        assert!(launched.child.is_none());
        assert_eq!(host.calls(), vec!["navigate mcplayer://play?files=movie.mkv"]);
    }

    #[tokio::test]
    async fn test_host_navigate_without_target() {
        let launcher = ProcessLauncher::new(Arc::new(RecordingHost::new(0)), Duration::from_secs(1));
        let mut player = PlayerConfiguration::new("Media Center", "");
        player.launch_mode = LaunchMode::HostNavigate;

        let err = launcher
            .launch(&player, protocol_for(&player).as_ref(), &session(&["movie.mkv"]))
            .unwrap_err();
        assert!(matches!(err, LaunchError::MissingNavigateTarget(name) if name == "Media Center"));
    }

    #[tokio::test]
    async fn test_host_navigate_failure_is_launch_error() {
        let launcher = ProcessLauncher::new(
            Arc::new(RecordingHost::failing_navigation()),
            Duration::from_secs(1),
        );
        let mut player = PlayerConfiguration::new("Media Center", "");
        player.launch_mode = LaunchMode::HostNavigate;
        player.navigate_target = Some("mcplayer://play".into());

        let err = launcher
            .launch(&player, protocol_for(&player).as_ref(), &session(&["movie.mkv"]))
            .unwrap_err();
        assert!(matches!(err, LaunchError::Navigate(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_present_gives_up_after_splash_timeout() {
        let host = Arc::new(RecordingHost::new(usize::MAX));
        let launcher = ProcessLauncher::new(host.clone(), Duration::from_secs(5));
        let mut player = PlayerConfiguration::new("MPC-HC", "mpc-hc64");
        player.show_splash_screen = true;
        player.minimize_host = true;

        let started = Instant::now();
        launcher.present(&player, Some(42)).await;

        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(6));
        // One check per 250 ms tick, the first one immediate.
        assert_eq!(host.checks(), 21);
        assert_eq!(host.calls(), vec!["show_splash", "minimize", "front"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_present_stops_waiting_once_window_ready() {
        let host = Arc::new(RecordingHost::new(2));
        let launcher = ProcessLauncher::new(host.clone(), Duration::from_secs(5));
        let mut player = PlayerConfiguration::new("MPC-HC", "mpc-hc64");
        player.show_splash_screen = true;

        launcher.present(&player, None).await;
        assert_eq!(host.checks(), 3);
        assert_eq!(host.calls(), vec!["show_splash", "front"]);
    }

    #[tokio::test]
    async fn test_restore_is_unconditional() {
        let host = Arc::new(RecordingHost::new(0));
        let launcher = ProcessLauncher::new(host.clone(), Duration::from_secs(1));
        launcher.restore();
        launcher.restore();
        assert_eq!(
            host.calls(),
            vec!["restore", "hide_splash", "restore", "hide_splash"]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launch_and_wait_for_exit() {
        let launcher = ProcessLauncher::new(Arc::new(RecordingHost::new(0)), Duration::from_secs(1));
        let mut player = PlayerConfiguration::new("sh", "sh");
        player.arguments = "-c \"exit 3\"".into();

        let launched = launcher
            .launch(&player, protocol_for(&player).as_ref(), &session(&["ignored.mkv"]))
            .unwrap();
        assert!(launched.pid.is_some());
        let mut child = launched.child.unwrap();
        assert_eq!(wait_for_exit(&mut child).await, Some(3));
    }
}
