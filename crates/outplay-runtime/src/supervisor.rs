//! Playback session state machine.
//!
//! One session at a time. `launch` starts the player, its status channel, an
//! exit-wait task and a driver task. The driver is the only consumer of
//! telemetry, process exit, transport commands and the stop token, and the
//! only writer of the shared state slot.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use outplay_core::config::GeneralConfig;
use outplay_core::error::OutplayError;
use outplay_core::models::{PlayState, PlayableSession, PlaybackState, PlayerConfiguration};
use outplay_player::control::{self, ControlCommand};
use outplay_player::{
    protocol_for, ChannelContext, ChannelHandle, PlayerProtocol, StatusChannel, StatusProbe,
    StatusReport, Telemetry, TelemetryStats,
};
use serde::Serialize;
use thiserror::Error;
use tokio::process::Child;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::diagnostics::{record, shared_event_log, DiagnosticEvent, EventEntry, SharedEventLog};
use crate::launcher::{wait_for_exit, LaunchError, ProcessLauncher};

/// Events buffered per subscriber before it starts lagging.
const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Launching,
    Active,
    Closing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FinishReason {
    /// The player reported that playback ended.
    Terminal,
    ProcessExited { code: Option<i32> },
    Stopped,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Terminal => "terminal",
            Self::ProcessExited { .. } => "process-exited",
            Self::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SupervisorEvent {
    Progress(PlaybackState),
    Finished {
        state: PlaybackState,
        media_ids: Vec<String>,
        reason: FinishReason,
    },
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("a playback session is already active")]
    AlreadyActive,

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error(transparent)]
    Resolve(#[from] OutplayError),

    #[error("unknown player: {0}")]
    UnknownPlayer(String),
}

#[derive(Debug, Clone, Copy)]
pub struct SupervisorSettings {
    pub channel: ChannelContext,
    pub splash_timeout: Duration,
    /// How long a stopped player gets to exit before its handle is released.
    pub stop_grace: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            channel: ChannelContext::default(),
            splash_timeout: Duration::from_secs(5),
            stop_grace: Duration::from_secs(3),
        }
    }
}

impl From<&GeneralConfig> for SupervisorSettings {
    fn from(general: &GeneralConfig) -> Self {
        Self {
            channel: ChannelContext::from(general),
            splash_timeout: general.splash_timeout(),
            stop_grace: general.stop_grace(),
        }
    }
}

#[derive(Default)]
struct Slot {
    phase: Phase,
    state: PlaybackState,
    /// Set once `Finished` is decided; later reports are ignored.
    finished: bool,
    session: Option<SessionControl>,
}

/// What callers need to reach a running session.
struct SessionControl {
    player: String,
    commands: mpsc::UnboundedSender<ControlCommand>,
    stop: CancellationToken,
    stats: Arc<TelemetryStats>,
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct PlaybackSupervisor {
    launcher: Arc<ProcessLauncher>,
    settings: SupervisorSettings,
    client: reqwest::Client,
    slot: Arc<Mutex<Slot>>,
    events: broadcast::Sender<SupervisorEvent>,
    diagnostics: SharedEventLog,
}

impl PlaybackSupervisor {
    pub fn new(launcher: ProcessLauncher, settings: SupervisorSettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(settings.channel.request_timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build control client, using defaults: {e}");
                reqwest::Client::new()
            });
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            launcher: Arc::new(launcher),
            settings,
            client,
            slot: Arc::new(Mutex::new(Slot::default())),
            events,
            diagnostics: shared_event_log(),
        }
    }

    pub fn phase(&self) -> Phase {
        lock(&self.slot).phase
    }

    /// Latest playback state of the current or most recent session.
    pub fn state(&self) -> PlaybackState {
        lock(&self.slot).state
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.events.subscribe()
    }

    pub fn diagnostics(&self) -> Vec<EventEntry> {
        lock_log(&self.diagnostics).snapshot()
    }

    /// Telemetry counters of the active session.
    pub fn telemetry_stats(&self) -> Option<Arc<TelemetryStats>> {
        lock(&self.slot).session.as_ref().map(|s| s.stats.clone())
    }

    /// Start `player` on `session`. Launch failures are returned here; after
    /// a successful launch the session only ends through `Finished`.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn launch(
        &self,
        player: &PlayerConfiguration,
        session: PlayableSession,
    ) -> Result<(), SupervisorError> {
        {
            let mut slot = lock(&self.slot);
            if slot.phase != Phase::Idle {
                return Err(SupervisorError::AlreadyActive);
            }
            slot.phase = Phase::Launching;
        }

        let protocol = protocol_for(player);
        let launched = match self.launcher.launch(player, protocol.as_ref(), &session) {
            Ok(launched) => launched,
            Err(e) => {
                lock(&self.slot).phase = Phase::Idle;
                warn!(player = %player.name, "Launch failed: {e}");
                record(
                    &self.diagnostics,
                    DiagnosticEvent::LaunchFailed {
                        player: player.name.clone(),
                        message: e.to_string(),
                    },
                );
                return Err(e.into());
            }
        };

        let stop = CancellationToken::new();
        let channel = StatusChannel::for_player(player, protocol.clone(), &self.settings.channel);
        let kind = channel.kind();
        let handle = channel.start(stop.child_token());
        let exit = launched
            .child
            .map(|child| spawn_exit_wait(child, stop.clone(), self.settings.stop_grace));
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let start_index = session.start_file_index;
        {
            let mut slot = lock(&self.slot);
            slot.phase = Phase::Active;
            slot.state = PlaybackState::starting_at(start_index, session.media_index_of(start_index));
            slot.finished = false;
            slot.session = Some(SessionControl {
                player: player.name.clone(),
                commands: commands_tx,
                stop: stop.clone(),
                stats: handle.stats(),
            });
        }

        info!(
            player = %player.name,
            channel = kind,
            files = session.files.len(),
            start_index,
            "Playback session active"
        );
        record(
            &self.diagnostics,
            DiagnosticEvent::Launched {
                player: player.name.clone(),
                files: session.files.len(),
                pid: launched.pid,
            },
        );

        let driver = SessionDriver {
            player: player.clone(),
            protocol,
            launcher: self.launcher.clone(),
            client: self.client.clone(),
            slot: self.slot.clone(),
            events: self.events.clone(),
            diagnostics: self.diagnostics.clone(),
            monitored: player.monitor.is_monitored(),
            session,
            channel: handle,
            exit,
            commands: commands_rx,
            stop,
            pid: launched.pid,
            request_timeout: self.settings.channel.request_timeout,
            started: false,
        };
        tokio::spawn(driver.run());
        Ok(())
    }

    pub fn pause(&self) {
        self.command(ControlCommand::Pause);
    }

    pub fn unpause(&self) {
        self.command(ControlCommand::Resume);
    }

    pub fn seek(&self, position: Duration) {
        self.command(ControlCommand::Seek(position));
    }

    /// End the active session. Returns at once; `Finished` follows on the
    /// event stream. Does nothing when no session is active.
    pub fn stop(&self) {
        let slot = lock(&self.slot);
        if slot.phase != Phase::Active {
            debug!(phase = ?slot.phase, "Stop ignored, no active session");
            return;
        }
        if let Some(session) = &slot.session {
            if !session.stop.is_cancelled() {
                info!(player = %session.player, "Stopping playback");
            }
            session.stop.cancel();
        }
    }

    fn command(&self, command: ControlCommand) {
        let slot = lock(&self.slot);
        match (&slot.phase, &slot.session) {
            (Phase::Active, Some(session)) => {
                let _ = session.commands.send(command);
            }
            _ => debug!(command = command.as_str(), "Command ignored, no active session"),
        }
    }
}

fn lock_log(log: &SharedEventLog) -> MutexGuard<'_, crate::diagnostics::EventLog> {
    log.lock().unwrap_or_else(|e| e.into_inner())
}

/// Map a status report onto the session. An unrecognized file keeps the
/// previous index.
pub fn normalize(
    previous: &PlaybackState,
    report: &StatusReport,
    session: &PlayableSession,
) -> PlaybackState {
    let file_index = report
        .current_file
        .as_deref()
        .and_then(|f| session.file_index_of(f))
        .unwrap_or(previous.current_file_index);
    PlaybackState {
        position: report.position,
        player_reported_duration: report.duration,
        current_file_index: file_index,
        current_media_index: session.media_index_of(file_index),
        play_state: report.play_state,
    }
}

/// Wait for the player to exit. Once `stop` fires, give it `grace` more and
/// then release the handle without killing it.
fn spawn_exit_wait(
    mut child: Child,
    stop: CancellationToken,
    grace: Duration,
) -> oneshot::Receiver<Option<i32>> {
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        tokio::select! {
            code = wait_for_exit(&mut child) => {
                debug!(?code, "Player process exited");
                let _ = tx.send(code);
            }
            _ = stop.cancelled() => {
                match tokio::time::timeout(grace, wait_for_exit(&mut child)).await {
                    Ok(code) => debug!(?code, "Player exited after stop"),
                    Err(_) => info!(
                        grace_ms = grace.as_millis() as u64,
                        "Player still running after stop, releasing process handle"
                    ),
                }
            }
        }
    });
    rx
}

async fn exit_code(exit: &mut Option<oneshot::Receiver<Option<i32>>>) -> Option<i32> {
    match exit {
        Some(rx) => rx.await.ok().flatten(),
        None => std::future::pending().await,
    }
}

/// One-shot status read at stop time. Only a live report is worth keeping;
/// anything else means the player already moved on.
async fn final_probe(probe: &StatusProbe, timeout: Duration) -> Option<StatusReport> {
    match tokio::time::timeout(timeout, probe.query()).await {
        Ok(Ok(Telemetry::Report(report))) if report.play_state.is_live() => Some(report),
        Ok(Ok(_)) => None,
        Ok(Err(e)) => {
            debug!("Final status query failed: {e}");
            None
        }
        Err(_) => {
            debug!("Final status query timed out");
            None
        }
    }
}

enum Step {
    Stop,
    Exited(Option<i32>),
    Command(ControlCommand),
    Report(StatusReport),
    ChannelClosed,
}

struct SessionDriver {
    player: PlayerConfiguration,
    protocol: Arc<dyn PlayerProtocol>,
    launcher: Arc<ProcessLauncher>,
    client: reqwest::Client,
    slot: Arc<Mutex<Slot>>,
    events: broadcast::Sender<SupervisorEvent>,
    diagnostics: SharedEventLog,
    monitored: bool,
    session: PlayableSession,
    channel: ChannelHandle,
    exit: Option<oneshot::Receiver<Option<i32>>>,
    commands: mpsc::UnboundedReceiver<ControlCommand>,
    stop: CancellationToken,
    pid: Option<u32>,
    request_timeout: Duration,
    /// First Playing report seen.
    started: bool,
}

impl SessionDriver {
    async fn run(mut self) {
        let exited = tokio::select! {
            biased;
            _ = self.stop.cancelled() => None,
            code = exit_code(&mut self.exit) => Some(code),
            _ = self.launcher.present(&self.player, self.pid) => None,
        };
        if let Some(code) = exited {
            self.close(FinishReason::ProcessExited { code }).await;
            return;
        }

        let mut channel_open = true;
        let reason = loop {
            let step = tokio::select! {
                biased;
                _ = self.stop.cancelled() => Step::Stop,
                code = exit_code(&mut self.exit) => Step::Exited(code),
                Some(command) = self.commands.recv() => Step::Command(command),
                report = self.channel.next(), if channel_open => match report {
                    Some(report) => Step::Report(report),
                    None => Step::ChannelClosed,
                },
            };

            match step {
                Step::Stop => break FinishReason::Stopped,
                Step::Exited(code) => break FinishReason::ProcessExited { code },
                Step::Command(command) => self.dispatch(&[command]),
                Step::Report(report) => {
                    if self.on_report(report) {
                        break FinishReason::Terminal;
                    }
                }
                Step::ChannelClosed => channel_open = false,
            }
        };

        self.close(reason).await;
    }

    /// Apply a report. Returns `true` when it ends the session.
    fn on_report(&mut self, report: StatusReport) -> bool {
        let terminal = self.started && self.protocol.detect_terminal(&report);
        let state = {
            let mut slot = lock(&self.slot);
            if slot.finished {
                return false;
            }
            if terminal {
                // Keep the last live position; a stopped player reports zero.
                slot.state.play_state = report.play_state;
                return true;
            }
            let state = normalize(&slot.state, &report, &self.session);
            slot.state = state;
            state
        };

        if !self.started && report.play_state == PlayState::Playing {
            self.started = true;
            info!(
                player = %self.player.name,
                file_index = state.current_file_index,
                "Playback started"
            );
            record(
                &self.diagnostics,
                DiagnosticEvent::PlaybackStarted {
                    file_index: state.current_file_index,
                },
            );
            if self.session.wants_resume_seek() {
                let position = self.session.start_offset;
                if state.current_file_index == self.session.start_file_index {
                    info!(position_ms = position.as_millis() as u64, "Resuming playback");
                    record(&self.diagnostics, DiagnosticEvent::ResumeSeek { position });
                    self.dispatch(&[ControlCommand::Seek(position)]);
                } else {
                    info!(
                        file_index = state.current_file_index,
                        resume_index = self.session.start_file_index,
                        "Player opened another file, resume skipped"
                    );
                }
            }
        }

        let _ = self.events.send(SupervisorEvent::Progress(state));
        false
    }

    /// Send native commands in order on a detached task.
    fn dispatch(&self, commands: &[ControlCommand]) {
        let requests: Vec<_> = commands
            .iter()
            .filter_map(|&command| {
                let request = self.protocol.control_request(command);
                record(
                    &self.diagnostics,
                    DiagnosticEvent::Command {
                        command: command.as_str().into(),
                        supported: request.is_some(),
                    },
                );
                if request.is_none() {
                    info!(
                        player = %self.player.name,
                        command = command.as_str(),
                        "Command not supported by player, ignored"
                    );
                }
                request.map(|r| (command, r))
            })
            .collect();
        if requests.is_empty() {
            return;
        }

        let client = self.client.clone();
        let diagnostics = self.diagnostics.clone();
        tokio::spawn(async move {
            for (command, request) in requests {
                if let Err(e) = control::execute(&client, &request).await {
                    warn!(command = command.as_str(), "Control command failed: {e}");
                    record(
                        &diagnostics,
                        DiagnosticEvent::ControlFailed {
                            command: command.as_str().into(),
                            message: e.to_string(),
                        },
                    );
                }
            }
        });
    }

    async fn close(self, reason: FinishReason) {
        lock(&self.slot).phase = Phase::Closing;
        self.stop.cancel();

        let final_report = match (reason, self.channel.probe()) {
            (FinishReason::Stopped, Some(probe)) => final_probe(&probe, self.request_timeout).await,
            _ => None,
        };
        if reason == FinishReason::Stopped {
            self.dispatch(&[ControlCommand::Stop, ControlCommand::Close]);
        }
        self.launcher.restore();

        let SessionDriver {
            player,
            slot,
            events,
            diagnostics,
            monitored,
            session,
            channel,
            ..
        } = self;
        let stats = channel.stats();
        channel.join().await;

        let state = {
            let mut slot = lock(&slot);
            let mut state = if monitored {
                slot.state
            } else {
                PlaybackState::default()
            };
            if let Some(report) = final_report {
                state = normalize(&state, &report, &session);
            }
            slot.state = state;
            slot.finished = true;
            slot.session = None;
            slot.phase = Phase::Idle;
            state
        };

        info!(
            player = %player.name,
            reason = reason.as_str(),
            position_ms = state.position.as_millis() as u64,
            dropped = stats.dropped(),
            "Playback session finished"
        );
        record(
            &diagnostics,
            DiagnosticEvent::Telemetry {
                delivered: stats.delivered(),
                dropped: stats.dropped(),
                idle: stats.idle(),
                suppressed: stats.suppressed(),
            },
        );
        record(
            &diagnostics,
            DiagnosticEvent::Finished {
                reason: reason.as_str().into(),
                position: state.position,
            },
        );

        let _ = events.send(SupervisorEvent::Finished {
            state,
            media_ids: session.media_ids.clone(),
            reason,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::path::PathBuf;

    use outplay_core::models::{HttpFormat, LaunchMode, MonitorConfig};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};
    use tokio::time::Instant;

    use super::*;
    use crate::host::recording::RecordingHost;
    use crate::host::{HeadlessHost, HostWindowController};

    const MPC_PLAYING: &str =
        r"'test.avi','Playing',5292,'00:00:05',1203090,'00:20:03',0,100,'C:\test.avi'";
    const MPC_STOPPED: &str =
        r"'test.avi','Stopped',0,'00:00:00',1203090,'00:20:03',0,100,'C:\test.avi'";

    /// Answers every request with the current body and records request lines.
    struct StubServer {
        addr: SocketAddr,
        body: Arc<Mutex<String>>,
        requests: Arc<Mutex<Vec<String>>>,
    }

    impl StubServer {
        async fn start(body: &str) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let body = Arc::new(Mutex::new(body.to_string()));
            let requests = Arc::new(Mutex::new(Vec::new()));
            let (served, seen) = (body.clone(), requests.clone());
            tokio::spawn(async move {
                while let Ok((mut stream, _)) = listener.accept().await {
                    let (served, seen) = (served.clone(), seen.clone());
                    tokio::spawn(async move {
                        let mut buf = vec![0u8; 4096];
                        let mut read = 0;
                        while let Ok(n) = stream.read(&mut buf[read..]).await {
                            read += n;
                            if n == 0
                                || read == buf.len()
                                || buf[..read].windows(4).any(|w| w == b"\r\n\r\n")
                            {
                                break;
                            }
                        }
                        let request = String::from_utf8_lossy(&buf[..read]).to_string();
                        if let Some(line) = request.lines().next() {
                            seen.lock().unwrap().push(line.to_string());
                        }
                        let body = served.lock().unwrap().clone();
                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        );
                        let _ = stream.write_all(response.as_bytes()).await;
                        let _ = stream.shutdown().await;
                    });
                }
            });
            Self {
                addr,
                body,
                requests,
            }
        }

        fn url(&self, path: &str) -> String {
            format!("http://{}{}", self.addr, path)
        }

        fn set_body(&self, body: &str) {
            *self.body.lock().unwrap() = body.to_string();
        }

        fn count(&self, needle: &str) -> usize {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.contains(needle))
                .count()
        }

        async fn wait_for(&self, needle: &str) {
            let deadline = Instant::now() + Duration::from_secs(5);
            while self.count(needle) == 0 && Instant::now() < deadline {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            assert!(self.count(needle) > 0, "no request containing {needle}");
        }
    }

    fn settings() -> SupervisorSettings {
        SupervisorSettings {
            channel: ChannelContext {
                poll_interval: Duration::from_millis(20),
                request_timeout: Duration::from_millis(500),
                quiet_window: Duration::ZERO,
            },
            splash_timeout: Duration::from_millis(100),
            stop_grace: Duration::from_millis(100),
        }
    }

    fn supervisor_with(host: Arc<dyn HostWindowController>) -> PlaybackSupervisor {
        let settings = settings();
        PlaybackSupervisor::new(ProcessLauncher::new(host, settings.splash_timeout), settings)
    }

    fn supervisor() -> PlaybackSupervisor {
        supervisor_with(Arc::new(HeadlessHost))
    }

    fn session(files: &[&str]) -> PlayableSession {
        PlayableSession {
            files: files.iter().map(|f| f.to_string()).collect(),
            source_files: files.iter().map(PathBuf::from).collect(),
            file_media_index: (0..files.len()).collect(),
            media_ids: (0..files.len()).map(|i| format!("m{i}")).collect(),
            start_file_index: 0,
            start_offset: Duration::ZERO,
            resume_requested: false,
            playlist: None,
        }
    }

    fn process_player(command: &str, arguments: &str) -> PlayerConfiguration {
        let mut player = PlayerConfiguration::new("test", command);
        player.arguments = arguments.into();
        player
    }

    fn mpc_player(server_url: &str, status_url: &str) -> PlayerConfiguration {
        let mut player = process_player("sleep", "5");
        player.monitor = MonitorConfig::HttpPolling {
            format: HttpFormat::Delimited,
            status_url: status_url.into(),
            command_url: Some(format!("{server_url}/command.html")),
            password: None,
        };
        player
    }

    async fn next_finished(
        rx: &mut broadcast::Receiver<SupervisorEvent>,
    ) -> (PlaybackState, Vec<String>, FinishReason) {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let event = tokio::time::timeout_at(deadline, rx.recv())
                .await
                .expect("session should finish");
            match event {
                Ok(SupervisorEvent::Finished {
                    state,
                    media_ids,
                    reason,
                }) => return (state, media_ids, reason),
                Ok(SupervisorEvent::Progress(_)) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("event stream closed"),
            }
        }
    }

    async fn next_progress(rx: &mut broadcast::Receiver<SupervisorEvent>) -> PlaybackState {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let event = tokio::time::timeout_at(deadline, rx.recv())
                .await
                .expect("progress should arrive");
            match event {
                Ok(SupervisorEvent::Progress(state)) => return state,
                Ok(other) => panic!("unexpected event {other:?}"),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("event stream closed"),
            }
        }
    }

    #[test]
    fn test_normalize_maps_reported_file() {
        let session = session(&["/media/intro.avi", "/media/test.avi"]);
        let previous = PlaybackState::starting_at(0, 0);
        let report = StatusReport {
            position: Duration::from_secs(3),
            duration: Some(Duration::from_secs(60)),
            play_state: PlayState::Paused,
            current_file: Some(r"C:\test.avi".into()),
        };
        let state = normalize(&previous, &report, &session);
        assert_eq!(state.current_file_index, 1);
        assert_eq!(state.current_media_index, 1);
        assert_eq!(state.play_state, PlayState::Paused);
        assert_eq!(state.player_reported_duration, Some(Duration::from_secs(60)));

        let unknown = StatusReport {
            current_file: Some("other.avi".into()),
            ..report
        };
        let state = normalize(&state, &unknown, &session);
        assert_eq!(state.current_file_index, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_twice_emits_one_finished() {
        let supervisor = supervisor();
        let mut rx = supervisor.subscribe();
        supervisor
            .launch(&process_player("sleep", "5"), session(&["/media/a.mkv"]))
            .unwrap();
        assert_eq!(supervisor.phase(), Phase::Active);

        supervisor.stop();
        supervisor.stop();

        let (state, media_ids, reason) = next_finished(&mut rx).await;
        assert_eq!(reason, FinishReason::Stopped);
        assert_eq!(state, PlaybackState::default());
        assert_eq!(media_ids, vec!["m0"]);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(supervisor.phase(), Phase::Idle);

        supervisor.stop();
        assert_eq!(supervisor.phase(), Phase::Idle);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_second_launch_rejected_while_active() {
        let supervisor = supervisor();
        let mut rx = supervisor.subscribe();
        supervisor
            .launch(&process_player("sleep", "5"), session(&["/media/a.mkv"]))
            .unwrap();

        let err = supervisor
            .launch(&process_player("sleep", "5"), session(&["/media/b.mkv"]))
            .unwrap_err();
        assert!(matches!(err, SupervisorError::AlreadyActive));

        supervisor.stop();
        next_finished(&mut rx).await;
    }

    #[tokio::test]
    async fn test_missing_executable_fails_launch() {
        let supervisor = supervisor();
        let err = supervisor
            .launch(
                &process_player("/nonexistent/bin/outplay-player", "{files}"),
                session(&["/media/a.mkv"]),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            SupervisorError::Launch(LaunchError::NotFound(_))
        ));
        assert_eq!(supervisor.phase(), Phase::Idle);
        assert!(supervisor
            .diagnostics()
            .iter()
            .any(|(_, e)| matches!(e, DiagnosticEvent::LaunchFailed { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_exit_finishes_unmonitored_session() {
        let supervisor = supervisor();
        let mut rx = supervisor.subscribe();
        let mut session = session(&["/media/a.mkv", "/media/b.mkv"]);
        session.start_file_index = 1;
        supervisor
            .launch(&process_player("sh", "-c \"exit 0\""), session)
            .unwrap();

        let (state, _, reason) = next_finished(&mut rx).await;
        assert_eq!(reason, FinishReason::ProcessExited { code: Some(0) });
        assert_eq!(state, PlaybackState::default());
        assert_eq!(supervisor.phase(), Phase::Idle);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_progress_resume_seek_and_terminal_report() {
        let server = StubServer::start(MPC_PLAYING).await;
        let supervisor = supervisor();
        let mut rx = supervisor.subscribe();

        let mut session = session(&["/media/intro.avi", "/media/test.avi"]);
        session.resume_requested = true;
        session.start_file_index = 1;
        session.start_offset = Duration::from_secs(90);
        let player = mpc_player(&server.url(""), &server.url("/status.html"));
        supervisor.launch(&player, session).unwrap();

        let state = next_progress(&mut rx).await;
        assert_eq!(state.position, Duration::from_millis(5292));
        assert_eq!(state.player_reported_duration, Some(Duration::from_millis(1203090)));
        assert_eq!(state.play_state, PlayState::Playing);
        assert_eq!(state.current_file_index, 1);
        assert_eq!(state.current_media_index, 1);

        server.wait_for("wm_command=-1&position=00%3A01%3A30").await;

        server.set_body(MPC_STOPPED);
        let (state, media_ids, reason) = next_finished(&mut rx).await;
        assert_eq!(reason, FinishReason::Terminal);
        assert_eq!(state.position, Duration::from_millis(5292));
        assert_eq!(state.play_state, PlayState::Stopped);
        assert_eq!(media_ids, vec!["m0", "m1"]);

        assert_eq!(server.count("wm_command=-1"), 1);
        assert_eq!(server.count("wm_command=890"), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_resume_seek_skipped_in_other_file() {
        let server = StubServer::start(
            r"'intro.avi','Playing',1000,'00:00:01',60000,'00:01:00',0,100,'C:\intro.avi'",
        )
        .await;
        let supervisor = supervisor();
        let mut rx = supervisor.subscribe();

        let mut session = session(&["/media/intro.avi", "/media/test.avi"]);
        session.resume_requested = true;
        session.start_file_index = 1;
        session.start_offset = Duration::from_secs(90);
        let player = mpc_player(&server.url(""), &server.url("/status.html"));
        supervisor.launch(&player, session).unwrap();

        assert_eq!(next_progress(&mut rx).await.current_file_index, 0);
        next_progress(&mut rx).await;
        next_progress(&mut rx).await;
        assert_eq!(server.count("wm_command=-1"), 0);
        assert!(!supervisor
            .diagnostics()
            .iter()
            .any(|(_, e)| matches!(e, DiagnosticEvent::ResumeSeek { .. })));

        supervisor.stop();
        next_finished(&mut rx).await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_during_splash_finishes_at_once() {
        let mut settings = settings();
        settings.splash_timeout = Duration::from_secs(30);
        let host = Arc::new(RecordingHost::new(usize::MAX));
        let supervisor =
            PlaybackSupervisor::new(ProcessLauncher::new(host, settings.splash_timeout), settings);
        let mut rx = supervisor.subscribe();

        let mut player = process_player("sh", "-c \"exit 4\"");
        player.show_splash_screen = true;
        supervisor.launch(&player, session(&["/media/a.mkv"])).unwrap();

        let (_, _, reason) = next_finished(&mut rx).await;
        assert_eq!(reason, FinishReason::ProcessExited { code: Some(4) });
        assert_eq!(supervisor.phase(), Phase::Idle);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unwatchable_status_directory_keeps_session_active() {
        let supervisor = supervisor();
        let mut rx = supervisor.subscribe();
        let mut player = process_player("sleep", "5");
        player.monitor = MonitorConfig::FileWatch {
            directory: "/nonexistent/outplay/status".into(),
            file_name: "PlayerStatus.ini".into(),
            companion: None,
        };
        supervisor.launch(&player, session(&["/media/a.avi"])).unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(supervisor.phase(), Phase::Active);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        supervisor.stop();
        let (_, _, reason) = next_finished(&mut rx).await;
        assert_eq!(reason, FinishReason::Stopped);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stopped_before_playback_is_not_terminal() {
        let server = StubServer::start(MPC_STOPPED).await;
        let supervisor = supervisor();
        let mut rx = supervisor.subscribe();
        let player = mpc_player(&server.url(""), &server.url("/status.html"));
        supervisor.launch(&player, session(&["/media/test.avi"])).unwrap();

        let state = next_progress(&mut rx).await;
        assert_eq!(state.play_state, PlayState::Stopped);
        next_progress(&mut rx).await;
        assert_eq!(supervisor.phase(), Phase::Active);

        supervisor.stop();
        let (_, _, reason) = next_finished(&mut rx).await;
        assert_eq!(reason, FinishReason::Stopped);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_telemetry_failures_keep_session_active() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let closed = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let supervisor = supervisor();
        let mut rx = supervisor.subscribe();
        let player = mpc_player(&closed, &format!("{closed}/status.html"));
        supervisor.launch(&player, session(&["/media/a.avi"])).unwrap();

        let stats = supervisor.telemetry_stats().unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while stats.dropped() < 3 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(stats.dropped() >= 3);
        assert_eq!(supervisor.phase(), Phase::Active);

        supervisor.stop();
        let (state, _, reason) = next_finished(&mut rx).await;
        assert_eq!(reason, FinishReason::Stopped);
        assert_eq!(state.position, Duration::ZERO);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_commands_and_stop_use_native_control() {
        let server = StubServer::start(MPC_PLAYING).await;
        let supervisor = supervisor();
        let mut rx = supervisor.subscribe();
        let player = mpc_player(&server.url(""), &server.url("/status.html"));
        supervisor.launch(&player, session(&["/media/test.avi"])).unwrap();
        next_progress(&mut rx).await;

        supervisor.pause();
        server.wait_for("wm_command=888").await;
        supervisor.seek(Duration::from_secs(61));
        server.wait_for("wm_command=-1&position=00%3A01%3A01").await;

        server.set_body(r"'test.avi','Paused',7000,'00:00:07',1203090,'00:20:03',0,100,'C:\test.avi'");
        supervisor.stop();
        let (state, _, reason) = next_finished(&mut rx).await;
        assert_eq!(reason, FinishReason::Stopped);
        assert_eq!(state.position, Duration::from_millis(7000));
        assert_eq!(state.play_state, PlayState::Paused);

        server.wait_for("wm_command=890").await;
        server.wait_for("wm_command=816").await;
        assert!(supervisor
            .diagnostics()
            .iter()
            .any(|(_, e)| matches!(e, DiagnosticEvent::Finished { reason, .. } if reason == "stopped")));
    }

    #[tokio::test]
    async fn test_commands_ignored_without_session() {
        let supervisor = supervisor();
        supervisor.pause();
        supervisor.seek(Duration::from_secs(1));
        supervisor.stop();
        assert_eq!(supervisor.phase(), Phase::Idle);
        assert!(supervisor.telemetry_stats().is_none());
    }

    #[tokio::test]
    async fn test_host_navigate_session() {
        let host = Arc::new(RecordingHost::new(0));
        let supervisor = supervisor_with(host.clone());
        let mut rx = supervisor.subscribe();

        let mut player = PlayerConfiguration::new("Media Center", "");
        player.launch_mode = LaunchMode::HostNavigate;
        player.navigate_target = Some("mcplayer://play?files={files}".into());
        player.minimize_host = true;
        supervisor.launch(&player, session(&["movie.mkv"])).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !host.calls().contains(&"front".to_string()) && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        supervisor.stop();
        let (_, _, reason) = next_finished(&mut rx).await;
        assert_eq!(reason, FinishReason::Stopped);
        assert_eq!(
            host.calls(),
            vec![
                "navigate mcplayer://play?files=movie.mkv",
                "minimize",
                "front",
                "restore",
                "hide_splash"
            ]
        );
    }
}
