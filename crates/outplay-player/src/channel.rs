use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use outplay_core::config::GeneralConfig;
use outplay_core::models::{MonitorConfig, PlayerConfiguration};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::file_watch::FileWatchChannel;
pub use crate::http::{HttpPollingChannel, StatusProbe};
use crate::protocol::PlayerProtocol;
use crate::StatusReport;

/// Reports buffered between a channel task and its consumer.
const REPORT_BUFFER: usize = 32;

/// Timing knobs shared by all channel variants.
#[derive(Debug, Clone, Copy)]
pub struct ChannelContext {
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub quiet_window: Duration,
}

impl Default for ChannelContext {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            request_timeout: Duration::from_millis(800),
            quiet_window: Duration::from_millis(1000),
        }
    }
}

impl From<&GeneralConfig> for ChannelContext {
    fn from(general: &GeneralConfig) -> Self {
        Self {
            poll_interval: general.poll_interval(),
            request_timeout: general.request_timeout(),
            quiet_window: general.quiet_window(),
        }
    }
}

/// Tick counters for one channel.
#[derive(Debug, Default)]
pub struct TelemetryStats {
    delivered: AtomicU64,
    dropped: AtomicU64,
    idle: AtomicU64,
    suppressed: AtomicU64,
}

impl TelemetryStats {
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Ticks lost to failed requests, unreadable files or unparseable snapshots.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Ticks where the player reported nothing loaded.
    pub fn idle(&self) -> u64 {
        self.idle.load(Ordering::Relaxed)
    }

    /// Ticks swallowed by the file-watch quiet window.
    pub fn suppressed(&self) -> u64 {
        self.suppressed.load(Ordering::Relaxed)
    }

    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_idle(&self) {
        self.idle.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_suppressed(&self) {
        self.suppressed.fetch_add(1, Ordering::Relaxed);
    }
}

/// A player's telemetry mechanism, not yet started.
pub enum StatusChannel {
    HttpPolling(HttpPollingChannel),
    FileWatch(FileWatchChannel),
    None,
}

impl StatusChannel {
    /// Build the channel described by `player.monitor`.
    ///
    /// A descriptor that cannot be used (bad URL, client setup failure)
    /// degrades to `None` with a warning.
    pub fn for_player(
        player: &PlayerConfiguration,
        protocol: Arc<dyn PlayerProtocol>,
        ctx: &ChannelContext,
    ) -> Self {
        match &player.monitor {
            MonitorConfig::HttpPolling {
                format,
                status_url,
                password,
                ..
            } => match HttpPollingChannel::new(
                status_url,
                *format,
                password.clone(),
                protocol,
                ctx,
            ) {
                Ok(channel) => Self::HttpPolling(channel),
                Err(e) => {
                    warn!(player = %player.name, url = %status_url, "HTTP monitoring unavailable: {e}");
                    Self::None
                }
            },
            MonitorConfig::FileWatch {
                directory,
                file_name,
                ..
            } => Self::FileWatch(FileWatchChannel::new(
                crate::file_watch::expand_directory(directory),
                file_name.clone(),
                protocol,
                ctx.quiet_window,
            )),
            MonitorConfig::None => Self::None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::HttpPolling(_) => "http-polling",
            Self::FileWatch(_) => "file-watch",
            Self::None => "none",
        }
    }

    /// Start observing. The channel runs until `cancel` fires or the
    /// handle is stopped, and cannot be restarted.
    pub fn start(self, cancel: CancellationToken) -> ChannelHandle {
        let stats = Arc::new(TelemetryStats::default());
        match self {
            Self::HttpPolling(channel) => {
                let (tx, rx) = mpsc::channel(REPORT_BUFFER);
                let probe = channel.probe();
                let task = tokio::spawn(channel.run(tx, cancel.clone(), stats.clone()));
                ChannelHandle {
                    rx: Some(rx),
                    cancel,
                    task: Some(task),
                    stats,
                    probe: Some(probe),
                }
            }
            Self::FileWatch(channel) => {
                let (tx, rx) = mpsc::channel(REPORT_BUFFER);
                let task = channel.spawn(tx, cancel.clone(), stats.clone());
                ChannelHandle {
                    rx: Some(rx),
                    cancel,
                    task,
                    stats,
                    probe: None,
                }
            }
            Self::None => ChannelHandle {
                rx: None,
                cancel,
                task: None,
                stats,
                probe: None,
            },
        }
    }
}

/// A running channel: a stream of reports plus its stop switch.
pub struct ChannelHandle {
    rx: Option<mpsc::Receiver<StatusReport>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    stats: Arc<TelemetryStats>,
    probe: Option<StatusProbe>,
}

impl ChannelHandle {
    /// Next report, or `None` once the channel has stopped (immediately for
    /// channels without telemetry).
    pub async fn next(&mut self) -> Option<StatusReport> {
        match &mut self.rx {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Signal the channel task to stop. Does not wait.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop and wait for the channel task to finish.
    pub async fn join(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Status channel task failed: {e}");
            }
        }
    }

    pub fn stats(&self) -> Arc<TelemetryStats> {
        self.stats.clone()
    }

    /// One-shot status query, for channels that support it.
    pub fn probe(&self) -> Option<StatusProbe> {
        self.probe.clone()
    }
}

/// Hand a report to the consumer unless cancelled first. Returns `false`
/// when the channel should stop.
pub(crate) async fn forward(
    tx: &mpsc::Sender<StatusReport>,
    report: StatusReport,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = tx.send(report) => sent.is_ok(),
    }
}
