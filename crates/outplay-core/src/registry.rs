use tracing::debug;

use crate::config::AppConfig;
use crate::models::{PlayableItem, PlayerConfiguration};
use crate::playlist::expand_item;

/// Configured players in user priority order.
#[derive(Debug, Clone, Default)]
pub struct PlayerCapabilityRegistry {
    pub players: Vec<PlayerConfiguration>,
}

impl PlayerCapabilityRegistry {
    pub fn new(players: Vec<PlayerConfiguration>) -> Self {
        Self { players }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.players.clone())
    }

    /// Merge user players into this registry.
    /// Players with matching names are replaced in place; new players are appended.
    pub fn merge_user(&mut self, user_players: &[PlayerConfiguration]) {
        for user_player in user_players {
            if let Some(existing) = self.players.iter_mut().find(|p| p.name == user_player.name) {
                *existing = user_player.clone();
            } else {
                self.players.push(user_player.clone());
            }
        }
    }

    /// Find an enabled player by name (case-insensitive).
    pub fn find_by_name(&self, name: &str) -> Option<&PlayerConfiguration> {
        self.enabled_players()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Get all enabled players, highest priority first.
    pub fn enabled_players(&self) -> impl Iterator<Item = &PlayerConfiguration> {
        self.players.iter().filter(|p| p.enabled)
    }

    /// Pick the first enabled player able to play `items`.
    ///
    /// `None` means the caller should fall back to its own playback path.
    pub fn select_player(&self, items: &[PlayableItem]) -> Option<&PlayerConfiguration> {
        if items.is_empty() {
            return None;
        }
        let selected = self.enabled_players().find(|p| Self::accepts(p, items));
        match selected {
            Some(p) => debug!(player = %p.name, items = items.len(), "Selected external player"),
            None => debug!(items = items.len(), "No external player accepts request"),
        }
        selected
    }

    /// Whether `player` can take `items` as one launch.
    pub fn accepts(player: &PlayerConfiguration, items: &[PlayableItem]) -> bool {
        let mut file_count = 0;
        for item in items {
            // Disc folders carry no extension; only direct support matters.
            if item.container_kind().is_some() {
                if !player.direct_container {
                    return false;
                }
                file_count += 1;
                continue;
            }
            let files = expand_item(item);
            if files.is_empty() || !files.iter().all(|f| player.accepts_extension(f)) {
                return false;
            }
            file_count += files.len();
        }
        file_count <= 1 || player.accepts_multiple_files()
    }
}
