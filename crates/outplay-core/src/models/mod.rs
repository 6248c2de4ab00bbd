pub mod media;
pub mod player;
pub mod session;
pub mod state;

pub use media::{ContainerKind, MediaLocation, PlayableItem, ResumePosition};
pub use player::{HttpFormat, LaunchMode, MonitorConfig, PlayerConfiguration};
pub use session::{PlayableSession, PlaylistFile};
pub use state::{PlayState, PlaybackState};
