//! `outplay` - play media in an external player and follow it until it ends.
//!
//! - `outplay players` - list configured players in priority order
//! - `outplay select <paths>` - show which player would take the media
//! - `outplay play <paths>` - launch and print progress; Ctrl-C stops

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use outplay_core::config::AppConfig;
use outplay_core::error::OutplayError;
use outplay_core::models::{ContainerKind, LaunchMode, PlayableItem, PlaybackState, ResumePosition};
use outplay_player::timefmt::format_clock;
use outplay_runtime::{HeadlessHost, Outplay, SupervisorError, SupervisorEvent};
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "outplay=info";

#[derive(Parser)]
#[command(name = "outplay")]
#[command(about = "Play media in external players and follow their progress")]
#[command(version)]
struct Cli {
    /// Config file to use instead of the user config
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write logs to a daily log file
    #[arg(long, global = true)]
    log_file: bool,

    /// Print output as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured players in priority order
    Players,

    /// Show which player would take the given media
    Select(MediaArgs),

    /// Launch media in an external player and follow it until it finishes
    Play(PlayArgs),
}

#[derive(Args)]
struct MediaArgs {
    /// Files or folders, in play order
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Treat each path as a disc container
    #[arg(long, value_enum)]
    container: Option<ContainerArg>,
}

#[derive(Args)]
struct PlayArgs {
    #[command(flatten)]
    media: MediaArgs,

    /// Use this player instead of automatic selection
    #[arg(long)]
    player: Option<String>,

    /// Resume the first item at this offset (milliseconds)
    #[arg(long)]
    resume_ms: Option<u64>,

    /// File index within the first item to resume in
    #[arg(long, default_value_t = 0, requires = "resume_ms")]
    resume_file: usize,
}

#[derive(Clone, Copy, ValueEnum)]
enum ContainerArg {
    Dvd,
    Bluray,
    Iso,
}

impl From<ContainerArg> for ContainerKind {
    fn from(arg: ContainerArg) -> Self {
        match arg {
            ContainerArg::Dvd => Self::Dvd,
            ContainerArg::Bluray => Self::BluRay,
            ContainerArg::Iso => Self::Iso,
        }
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] OutplayError),

    #[error(transparent)]
    Playback(#[from] SupervisorError),

    #[error("failed to encode output: {0}")]
    Json(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_file);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr, and to a daily-rotated file when asked. The returned guard
/// flushes the file writer on drop.
fn init_tracing(log_file: bool) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let stderr = fmt::layer().with_writer(std::io::stderr);

    if log_file {
        let appender = tracing_appender::rolling::daily(AppConfig::log_dir(), "outplay.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr)
            .with(fmt::layer().with_ansi(false).with_writer(writer))
            .init();
        Some(guard)
    } else {
        tracing_subscriber::registry().with(filter).with(stderr).init();
        None
    }
}

async fn run(cli: Cli) -> Result<ExitCode, CliError> {
    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    let outplay = Outplay::new(config, std::sync::Arc::new(HeadlessHost));

    match cli.command {
        Commands::Players => list_players(&outplay, cli.json),
        Commands::Select(args) => select(&outplay, &args, cli.json),
        Commands::Play(args) => play(&outplay, &args, cli.json).await,
    }
}

fn items_from(args: &MediaArgs) -> Vec<PlayableItem> {
    args.paths
        .iter()
        .map(|path| {
            let id = path.display().to_string();
            match args.container {
                Some(kind) => PlayableItem::container(id, kind.into(), path),
                None if path.is_dir() => PlayableItem::folder(id, path),
                None => PlayableItem::file(id, path),
            }
        })
        .collect()
}

fn list_players(outplay: &Outplay, json: bool) -> Result<ExitCode, CliError> {
    let players = &outplay.registry().players;
    if json {
        println!("{}", serde_json::to_string(players)?);
        return Ok(ExitCode::SUCCESS);
    }
    for (i, p) in players.iter().enumerate() {
        let target = match p.launch_mode {
            LaunchMode::CommandLine => p.command.as_str(),
            LaunchMode::HostNavigate => p.navigate_target.as_deref().unwrap_or("-"),
        };
        println!(
            "{:>2}. {:<20} {:<9} {:<13} {}",
            i + 1,
            p.name,
            if p.enabled { "enabled" } else { "disabled" },
            monitor_kind(p),
            target
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn monitor_kind(player: &outplay_core::models::PlayerConfiguration) -> &'static str {
    use outplay_core::models::MonitorConfig;
    match player.monitor {
        MonitorConfig::HttpPolling { .. } => "http-polling",
        MonitorConfig::FileWatch { .. } => "file-watch",
        MonitorConfig::None => "none",
    }
}

fn select(outplay: &Outplay, args: &MediaArgs, json: bool) -> Result<ExitCode, CliError> {
    let items = items_from(args);
    let chosen = outplay.choose_player(&items, None)?;
    if json {
        println!("{}", serde_json::json!({ "player": chosen.map(|p| &p.name) }));
    } else {
        match chosen {
            Some(p) => println!("{}", p.name),
            None => println!("none (internal playback)"),
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn play(outplay: &Outplay, args: &PlayArgs, json: bool) -> Result<ExitCode, CliError> {
    let mut items = items_from(&args.media);
    if let (Some(ms), Some(first)) = (args.resume_ms, items.first_mut()) {
        first.resume = Some(ResumePosition {
            playlist_position: args.resume_file,
            position: Duration::from_millis(ms),
        });
    }

    let supervisor = outplay.supervisor();
    let mut events = supervisor.subscribe();
    let Some(player) = outplay.play(&items, args.player.as_deref(), args.resume_ms.is_some())?
    else {
        eprintln!("No external player accepts this media");
        return Ok(ExitCode::from(2));
    };
    if !json {
        println!("Playing with {player}");
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping playback");
                supervisor.stop();
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if json {
                        println!("{}", serde_json::to_string(&event)?);
                    } else {
                        print_event(&event);
                    }
                    if matches!(event, SupervisorEvent::Finished { .. }) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "Skipped progress events"),
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn describe(state: &PlaybackState) -> String {
    let duration = state
        .player_reported_duration
        .map(format_clock)
        .unwrap_or_else(|| "--:--:--".into());
    format!(
        "{:<8} {} / {}  file {}  item {}",
        state.play_state.as_str(),
        format_clock(state.position),
        duration,
        state.current_file_index + 1,
        state.current_media_index + 1
    )
}

fn print_event(event: &SupervisorEvent) {
    match event {
        SupervisorEvent::Progress(state) => println!("{}", describe(state)),
        SupervisorEvent::Finished { state, reason, .. } => {
            println!("Finished ({}): {}", reason.as_str(), describe(state))
        }
    }
}
