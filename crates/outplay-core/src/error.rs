use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutplayError {
    #[error("no playable files")]
    NoPlayableFiles,

    #[error("media must be mounted before playback: {}", .0.display())]
    UnmountableMedia(PathBuf),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
