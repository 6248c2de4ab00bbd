//! Status-file watching.
//!
//! Some players only publish their state by rewriting an ini file. The
//! directory is watched recursively and the file re-read on every change.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use directories::BaseDirs;
use notify::{EventKind, RecursiveMode, Watcher};
use outplay_core::models::PlayState;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::channel::{forward, TelemetryStats};
use crate::protocol::PlayerProtocol;
use crate::{RawSnapshot, StatusReport, Telemetry};

/// Expand `~`, `{home}`, `{data}` and `{config}` in a directory template.
pub fn expand_directory(template: &str) -> PathBuf {
    let Some(dirs) = BaseDirs::new() else {
        return PathBuf::from(template);
    };
    let home = dirs.home_dir().to_string_lossy();
    let expanded = match template.strip_prefix('~') {
        Some(rest) => format!("{home}{rest}"),
        None => template.to_string(),
    };
    PathBuf::from(
        expanded
            .replace("{home}", &home)
            .replace("{data}", &dirs.data_dir().to_string_lossy())
            .replace("{config}", &dirs.config_dir().to_string_lossy()),
    )
}

/// Suppresses repeated reports of an unchanged state within the quiet window,
/// once playback has been seen to start.
#[derive(Debug)]
pub struct QuietGate {
    window: Duration,
    started: bool,
    last: Option<(PlayState, Instant)>,
}

impl QuietGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            started: false,
            last: None,
        }
    }

    pub fn admit(&mut self, report: &StatusReport, now: Instant) -> bool {
        if !self.started {
            self.started = report.play_state == PlayState::Playing;
            self.last = Some((report.play_state, now));
            return true;
        }
        match self.last {
            Some((state, at)) if state == report.play_state && now.duration_since(at) < self.window => {
                false
            }
            _ => {
                self.last = Some((report.play_state, now));
                true
            }
        }
    }
}

/// Watches a directory tree for changes to one status file.
pub struct FileWatchChannel {
    directory: PathBuf,
    file_name: String,
    protocol: Arc<dyn PlayerProtocol>,
    quiet_window: Duration,
}

impl FileWatchChannel {
    pub fn new(
        directory: PathBuf,
        file_name: String,
        protocol: Arc<dyn PlayerProtocol>,
        quiet_window: Duration,
    ) -> Self {
        Self {
            directory,
            file_name,
            protocol,
            quiet_window,
        }
    }

    fn is_status_file(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.eq_ignore_ascii_case(&self.file_name))
    }

    /// Register the watch, then spawn the read loop. The watch is in place
    /// when this returns. A watch that cannot be set up drops `tx`, which
    /// closes the report stream.
    pub(crate) fn spawn(
        self,
        tx: mpsc::Sender<StatusReport>,
        cancel: CancellationToken,
        stats: Arc<TelemetryStats>,
    ) -> Option<JoinHandle<()>> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut watcher = match notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let _ = event_tx.send(res);
        }) {
            Ok(w) => w,
            Err(e) => {
                warn!(dir = %self.directory.display(), "Failed to create status watcher: {e}");
                return None;
            }
        };
        if let Err(e) = watcher.watch(&self.directory, RecursiveMode::Recursive) {
            warn!(dir = %self.directory.display(), "Failed to watch status directory: {e}");
            return None;
        }
        debug!(dir = %self.directory.display(), file = %self.file_name, "Watching status file");

        Some(tokio::spawn(async move {
            self.run(watcher, event_rx, tx, cancel, stats).await
        }))
    }

    async fn run(
        self,
        watcher: notify::RecommendedWatcher,
        mut events: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
        tx: mpsc::Sender<StatusReport>,
        cancel: CancellationToken,
        stats: Arc<TelemetryStats>,
    ) {
        let mut gate = QuietGate::new(self.quiet_window);

        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    debug!("Status watcher error: {e}");
                    continue;
                }
            };
            if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                continue;
            }
            let Some(path) = event.paths.iter().find(|p| self.is_status_file(p)) else {
                continue;
            };

            // The player may be mid-write; the next change event will retry.
            let content = match tokio::fs::read_to_string(path).await {
                Ok(content) => content,
                Err(e) => {
                    stats.record_dropped();
                    debug!(path = %path.display(), "Status file not readable yet: {e}");
                    continue;
                }
            };

            match self.protocol.parse_snapshot(&RawSnapshot::Ini(content)) {
                Ok(Telemetry::Report(report)) => {
                    if !gate.admit(&report, Instant::now()) {
                        stats.record_suppressed();
                        trace!("Status update inside quiet window");
                        continue;
                    }
                    stats.record_delivered();
                    if !forward(&tx, report, &cancel).await {
                        break;
                    }
                }
                Ok(Telemetry::NothingPlaying) => stats.record_idle(),
                Err(e) => {
                    stats.record_dropped();
                    debug!(path = %path.display(), "Dropped status file update: {e}");
                }
            }
        }

        drop(watcher);
        debug!(dir = %self.directory.display(), "Status file watch stopped");
    }
}
