use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Physical-media layouts that normally need mounting before a player can open them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    /// A `VIDEO_TS` folder.
    Dvd,
    /// A `BDMV` folder.
    BluRay,
    /// An optical-disc image.
    Iso,
}

impl ContainerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dvd => "DVD",
            Self::BluRay => "Blu-ray",
            Self::Iso => "ISO",
        }
    }
}

/// Where the content of a playable item lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MediaLocation {
    /// Explicit file list, in play order.
    Files { paths: Vec<PathBuf> },
    /// A folder of loose video files, walked recursively.
    Folder { path: PathBuf },
    Container { container: ContainerKind, path: PathBuf },
}

/// Resume point stored by the catalog for an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResumePosition {
    /// Index into the resolved file list.
    pub playlist_position: usize,
    /// Offset into that file.
    pub position: Duration,
}

/// A catalog item handed to the supervisor for playback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayableItem {
    pub id: String,
    pub title: String,
    pub location: MediaLocation,
    #[serde(default)]
    pub resume: Option<ResumePosition>,
}

impl PlayableItem {
    pub fn file(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            id: id.into(),
            title: title_from_path(&path),
            location: MediaLocation::Files { paths: vec![path] },
            resume: None,
        }
    }

    pub fn files(id: impl Into<String>, title: impl Into<String>, paths: Vec<PathBuf>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            location: MediaLocation::Files { paths },
            resume: None,
        }
    }

    pub fn folder(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            id: id.into(),
            title: title_from_path(&path),
            location: MediaLocation::Folder { path },
            resume: None,
        }
    }

    pub fn container(id: impl Into<String>, container: ContainerKind, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            id: id.into(),
            title: title_from_path(&path),
            location: MediaLocation::Container { container, path },
            resume: None,
        }
    }

    pub fn with_resume(mut self, resume: ResumePosition) -> Self {
        self.resume = Some(resume);
        self
    }

    /// The container kind, if this item needs pre-mount.
    pub fn container_kind(&self) -> Option<ContainerKind> {
        match &self.location {
            MediaLocation::Container { container, .. } => Some(*container),
            _ => None,
        }
    }
}

fn title_from_path(path: &std::path::Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}
