//! HTTP status polling.

use std::sync::Arc;
use std::time::Duration;

use outplay_core::models::HttpFormat;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use url::Url;

use crate::channel::{forward, ChannelContext, TelemetryStats};
use crate::protocol::PlayerProtocol;
use crate::{RawSnapshot, StatusReport, Telemetry, TelemetryError};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Fetches and interprets one status snapshot.
#[derive(Clone)]
pub struct StatusProbe {
    client: reqwest::Client,
    url: Url,
    password: Option<String>,
    format: HttpFormat,
    protocol: Arc<dyn PlayerProtocol>,
}

impl StatusProbe {
    /// Fetch the raw snapshot.
    pub async fn fetch(&self) -> Result<RawSnapshot, TelemetryError> {
        let mut req = self.client.get(self.url.clone());
        if let Some(password) = &self.password {
            req = req.basic_auth("", Some(password));
        }
        let body = req.send().await?.error_for_status()?.text().await?;
        if body.trim().is_empty() {
            return Err(TelemetryError::Empty);
        }
        Ok(match self.format {
            HttpFormat::Delimited => RawSnapshot::Delimited(body),
            HttpFormat::Xml => RawSnapshot::Xml(body),
        })
    }

    /// Fetch and parse.
    pub async fn query(&self) -> Result<Telemetry, TelemetryError> {
        let raw = self.fetch().await?;
        self.protocol.parse_snapshot(&raw)
    }
}

/// Polls a loopback status endpoint on a fixed interval.
pub struct HttpPollingChannel {
    probe: StatusProbe,
    interval: Duration,
}

impl HttpPollingChannel {
    pub fn new(
        status_url: &str,
        format: HttpFormat,
        password: Option<String>,
        protocol: Arc<dyn PlayerProtocol>,
        ctx: &ChannelContext,
    ) -> Result<Self, TelemetryError> {
        let url = Url::parse(status_url).map_err(|e| TelemetryError::Parse(e.to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(ctx.request_timeout)
            .build()?;
        Ok(Self {
            probe: StatusProbe {
                client,
                url,
                password,
                format,
                protocol,
            },
            interval: ctx.poll_interval.max(MIN_POLL_INTERVAL),
        })
    }

    pub fn probe(&self) -> StatusProbe {
        self.probe.clone()
    }

    pub(crate) async fn run(
        self,
        tx: mpsc::Sender<StatusReport>,
        cancel: CancellationToken,
        stats: Arc<TelemetryStats>,
    ) {
        let url = self.probe.url.clone();
        debug!(%url, interval_ms = self.interval.as_millis() as u64, "HTTP polling started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.probe.query() => result,
            };

            match result {
                Ok(Telemetry::Report(report)) => {
                    stats.record_delivered();
                    if !forward(&tx, report, &cancel).await {
                        break;
                    }
                }
                Ok(Telemetry::NothingPlaying) => {
                    stats.record_idle();
                    trace!(%url, "Player reports nothing loaded");
                }
                Err(e) => {
                    stats.record_dropped();
                    debug!(%url, dropped = stats.dropped(), "Dropped status poll: {e}");
                }
            }
        }

        debug!(%url, "HTTP polling stopped");
    }
}
