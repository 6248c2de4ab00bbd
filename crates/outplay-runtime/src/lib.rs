pub mod diagnostics;
pub mod host;
pub mod launcher;
pub mod supervisor;

use std::sync::Arc;

use outplay_core::config::AppConfig;
use outplay_core::models::{PlayableItem, PlayableSession, PlayerConfiguration};
use outplay_core::playlist::PlaylistResolver;
use outplay_core::registry::PlayerCapabilityRegistry;
use tracing::info;

pub use host::{HeadlessHost, HostWindowController, WindowError};
pub use launcher::{LaunchError, LaunchedPlayer, ProcessLauncher};
pub use supervisor::{
    FinishReason, Phase, PlaybackSupervisor, SupervisorError, SupervisorEvent, SupervisorSettings,
};

/// Registry, resolver and supervisor wired from one configuration.
pub struct Outplay {
    registry: PlayerCapabilityRegistry,
    resolver: PlaylistResolver,
    supervisor: PlaybackSupervisor,
}

impl Outplay {
    pub fn new(config: AppConfig, host: Arc<dyn HostWindowController>) -> Self {
        let settings = SupervisorSettings::from(&config.general);
        let launcher = ProcessLauncher::new(host, settings.splash_timeout);
        Self {
            registry: PlayerCapabilityRegistry::from_config(&config),
            resolver: PlaylistResolver::new(config.general.playlist_dir()),
            supervisor: PlaybackSupervisor::new(launcher, settings),
        }
    }

    pub fn registry(&self) -> &PlayerCapabilityRegistry {
        &self.registry
    }

    pub fn supervisor(&self) -> &PlaybackSupervisor {
        &self.supervisor
    }

    /// Pick the player for `items`: the named one, or the first capable one.
    pub fn choose_player(
        &self,
        items: &[PlayableItem],
        name: Option<&str>,
    ) -> Result<Option<&PlayerConfiguration>, SupervisorError> {
        match name {
            Some(name) => self
                .registry
                .find_by_name(name)
                .map(Some)
                .ok_or_else(|| SupervisorError::UnknownPlayer(name.to_string())),
            None => Ok(self.registry.select_player(items)),
        }
    }

    pub fn resolve(
        &self,
        items: &[PlayableItem],
        player: &PlayerConfiguration,
        resume: bool,
    ) -> Result<PlayableSession, SupervisorError> {
        Ok(self.resolver.resolve(items, player, resume)?)
    }

    /// Resolve `items` and launch them. Returns the chosen player's name, or
    /// `None` when no external player accepts the items and the caller should
    /// fall back to its own playback.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn play(
        &self,
        items: &[PlayableItem],
        player: Option<&str>,
        resume: bool,
    ) -> Result<Option<String>, SupervisorError> {
        let Some(player) = self.choose_player(items, player)? else {
            info!(items = items.len(), "No external player accepts the selection");
            return Ok(None);
        };
        let session = self.resolve(items, player, resume)?;
        self.supervisor.launch(player, session)?;
        Ok(Some(player.name.clone()))
    }
}
