use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How an external player is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LaunchMode {
    /// Spawn `command` as a child process.
    #[default]
    CommandLine,
    /// Ask the host shell to navigate to `navigate_target`; no process is spawned.
    HostNavigate,
}

/// Wire format spoken by an HTTP status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HttpFormat {
    /// Quoted, comma-separated field list (MPC-HC `status.html`).
    Delimited,
    /// XML status document (VLC `status.xml`).
    Xml,
}

/// Telemetry channel descriptor for a player.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum MonitorConfig {
    HttpPolling {
        format: HttpFormat,
        status_url: String,
        #[serde(default)]
        command_url: Option<String>,
        #[serde(default)]
        password: Option<String>,
    },
    FileWatch {
        /// Directory to watch (subdirectories included). Accepts `~`,
        /// `{home}`, `{data}` and `{config}` placeholders.
        directory: String,
        /// Status file name looked for inside `directory`.
        file_name: String,
        /// Control executable, resolved next to the player binary when relative.
        #[serde(default)]
        companion: Option<String>,
    },
    #[default]
    None,
}

impl MonitorConfig {
    pub fn is_monitored(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Static per-player configuration, in user priority order inside `AppConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfiguration {
    /// Display name (e.g., "MPC-HC", "VLC").
    pub name: String,
    /// Executable path, or a bare name looked up on `PATH`.
    #[serde(default)]
    pub command: String,
    /// Argument template; `{files}` is replaced with the files to play.
    #[serde(default = "default_arguments")]
    pub arguments: String,
    #[serde(default)]
    pub launch_mode: LaunchMode,
    /// Page or URL opened by the host shell in `host-navigate` mode.
    #[serde(default)]
    pub navigate_target: Option<String>,
    /// Accepted file extensions (lowercase, no dot). Empty accepts everything.
    #[serde(default)]
    pub file_types: Vec<String>,
    #[serde(default)]
    pub supports_multi_file_args: bool,
    #[serde(default)]
    pub supports_playlist_file: bool,
    /// Plays DVD/Blu-ray folders and disc images without mounting them first.
    #[serde(default)]
    pub direct_container: bool,
    #[serde(default)]
    pub minimize_host: bool,
    #[serde(default)]
    pub show_splash_screen: bool,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_arguments() -> String {
    "{files}".into()
}

fn default_true() -> bool {
    true
}

impl PlayerConfiguration {
    /// A command-line player with no telemetry and default flags.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            arguments: default_arguments(),
            launch_mode: LaunchMode::CommandLine,
            navigate_target: None,
            file_types: Vec::new(),
            supports_multi_file_args: false,
            supports_playlist_file: false,
            direct_container: false,
            minimize_host: false,
            show_splash_screen: false,
            monitor: MonitorConfig::None,
            enabled: true,
        }
    }

    /// Whether the extension of `path` is on the allow-list.
    pub fn accepts_extension(&self, path: &std::path::Path) -> bool {
        if self.file_types.is_empty() {
            return true;
        }
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        self.file_types.iter().any(|t| t.eq_ignore_ascii_case(ext))
    }

    /// Whether more than one file can be handed to this player in one launch.
    pub fn accepts_multiple_files(&self) -> bool {
        self.supports_multi_file_args || self.supports_playlist_file
    }

    /// Directory containing the player executable, if `command` is a path.
    pub fn install_dir(&self) -> Option<PathBuf> {
        let path = PathBuf::from(&self.command);
        path.parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.to_path_buf())
    }
}
