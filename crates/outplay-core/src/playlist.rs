//! Playlist resolution.
//!
//! Expands catalog items into the ordered file list handed to a player,
//! picks the start position, and writes a PLS playlist when the player can
//! take a playlist but not several files on its command line.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::OutplayError;
use crate::models::{MediaLocation, PlayableItem, PlayableSession, PlayerConfiguration, PlaylistFile};

/// Video file extensions picked up when walking a folder item.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "ogm", "wmv", "webm", "flv", "m4v", "mpg", "mpeg", "ts", "m2ts", "mov",
];

static PLAYLIST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Expand one item into its files, in stable order.
///
/// Containers expand to their own path; whether that path is playable is
/// decided by the caller against the player's capabilities.
pub fn expand_item(item: &PlayableItem) -> Vec<PathBuf> {
    match &item.location {
        MediaLocation::Files { paths } => paths.clone(),
        MediaLocation::Container { path, .. } => vec![path.clone()],
        MediaLocation::Folder { path } => {
            if !path.is_dir() {
                tracing::warn!(path = %path.display(), "Media folder does not exist");
                return Vec::new();
            }
            let mut files: Vec<PathBuf> = WalkDir::new(path)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|p| is_video(p))
                .collect();
            files.sort();
            files
        }
    }
}

fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| VIDEO_EXTENSIONS.iter().any(|v| v.eq_ignore_ascii_case(ext)))
}

/// Builds `PlayableSession`s for a target player.
#[derive(Debug, Clone)]
pub struct PlaylistResolver {
    playlist_dir: PathBuf,
}

impl PlaylistResolver {
    /// Generated playlists are written into `playlist_dir`.
    pub fn new(playlist_dir: impl Into<PathBuf>) -> Self {
        Self {
            playlist_dir: playlist_dir.into(),
        }
    }

    pub fn resolve(
        &self,
        items: &[PlayableItem],
        player: &PlayerConfiguration,
        resume_requested: bool,
    ) -> Result<PlayableSession, OutplayError> {
        let mut source_files = Vec::new();
        let mut file_media_index = Vec::new();

        for (media_index, item) in items.iter().enumerate() {
            if let MediaLocation::Container { container, path } = &item.location {
                if !player.direct_container {
                    debug!(
                        player = %player.name,
                        kind = container.as_str(),
                        "Player cannot open container directly"
                    );
                    return Err(OutplayError::UnmountableMedia(path.clone()));
                }
            }
            for file in expand_item(item) {
                source_files.push(file);
                file_media_index.push(media_index);
            }
        }

        if source_files.is_empty() {
            return Err(OutplayError::NoPlayableFiles);
        }

        let (start_file_index, start_offset) = match items.first().and_then(|i| i.resume) {
            Some(resume) if resume_requested => (
                resume.playlist_position.min(source_files.len() - 1),
                resume.position,
            ),
            _ => (0, Duration::ZERO),
        };

        // The player opens the resume file first; earlier files are skipped.
        let mut files: Vec<String> = source_files[start_file_index..]
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        let mut playlist = None;

        if files.len() > 1 && !player.supports_multi_file_args && player.supports_playlist_file {
            let file = self.write_playlist(&files)?;
            info!(
                player = %player.name,
                path = %file.path().display(),
                entries = files.len(),
                "Generated playlist"
            );
            files = vec![file.path().to_string_lossy().into_owned()];
            playlist = Some(file);
        }

        Ok(PlayableSession {
            files,
            source_files,
            file_media_index,
            media_ids: items.iter().map(|i| i.id.clone()).collect(),
            start_file_index,
            start_offset,
            resume_requested,
            playlist,
        })
    }

    fn write_playlist(&self, files: &[String]) -> Result<PlaylistFile, OutplayError> {
        std::fs::create_dir_all(&self.playlist_dir)?;
        let name = format!(
            "outplay-{}-{}-{}.pls",
            Utc::now().format("%Y%m%d%H%M%S%3f"),
            std::process::id(),
            PLAYLIST_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        let path = self.playlist_dir.join(name);
        std::fs::write(&path, render_playlist(files))?;
        Ok(PlaylistFile::new(path))
    }
}

/// Render a PLS document for `files`.
pub fn render_playlist(files: &[String]) -> String {
    let mut out = String::from("[playlist]\n");
    for (i, file) in files.iter().enumerate() {
        let n = i + 1;
        out.push_str(&format!("File{n}={file}\nTitle{n}=Part {n}\n"));
    }
    out.push_str("Version=2\n");
    out
}

/// Read the ordered file list back out of a PLS document.
pub fn read_playlist(path: &Path) -> Result<Vec<String>, OutplayError> {
    let content = std::fs::read_to_string(path)?;
    let mut entries: Vec<(usize, String)> = content
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            let n = key.trim().strip_prefix("File")?.parse().ok()?;
            Some((n, value.to_string()))
        })
        .collect();
    entries.sort_by_key(|(n, _)| *n);
    Ok(entries.into_iter().map(|(_, f)| f).collect())
}
