use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

/// A generated playlist file, removed from disk when dropped.
#[derive(Debug)]
pub struct PlaylistFile {
    path: PathBuf,
}

impl PlaylistFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PlaylistFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!(path = %self.path.display(), "Could not remove playlist file: {e}");
        }
    }
}

/// One resolved, ready-to-launch unit of work.
#[derive(Debug)]
pub struct PlayableSession {
    /// What the player is given: the source files from `start_file_index` on,
    /// or a single generated playlist of them.
    pub files: Vec<String>,
    /// Expanded files in play order.
    pub source_files: Vec<PathBuf>,
    /// Media index owning each entry of `source_files`.
    pub file_media_index: Vec<usize>,
    pub media_ids: Vec<String>,
    pub start_file_index: usize,
    pub start_offset: Duration,
    pub resume_requested: bool,
    pub playlist: Option<PlaylistFile>,
}

impl PlayableSession {
    /// Media index for a source file index, clamped to the last item.
    pub fn media_index_of(&self, file_index: usize) -> usize {
        self.file_media_index
            .get(file_index)
            .or_else(|| self.file_media_index.last())
            .copied()
            .unwrap_or(0)
    }

    /// Locate a player-reported file among the source files.
    ///
    /// Players report either the full path or just the file name, so both
    /// are compared, case-insensitively.
    pub fn file_index_of(&self, reported: &str) -> Option<usize> {
        let reported = reported.trim();
        if reported.is_empty() {
            return None;
        }
        let reported_name = file_name_of(reported);
        self.source_files.iter().position(|p| {
            let full = p.to_string_lossy();
            full.eq_ignore_ascii_case(reported)
                || p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.eq_ignore_ascii_case(reported_name))
        })
    }

    /// Whether a resume seek is due once playback starts.
    pub fn wants_resume_seek(&self) -> bool {
        self.resume_requested && !self.start_offset.is_zero()
    }
}

/// Last path component, accepting both separator styles.
fn file_name_of(s: &str) -> &str {
    s.rsplit(['/', '\\']).next().unwrap_or(s)
}
