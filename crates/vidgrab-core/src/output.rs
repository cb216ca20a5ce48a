//! Locating the file a download produced.
//!
//! The downloader resolves the output template itself, so the final file name
//! is only known after it exits. The directory listing is captured before the
//! download and compared with the listing afterwards.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use regex::Regex;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Leftovers of interrupted downloads, never reported as outputs.
const PARTIAL_SUFFIXES: [&str; 2] = [".part", ".ytdl"];

/// Convert an output template into an anchored file-name pattern.
///
/// Downloader placeholders such as `%(ext)s` or `%(title).200s` become
/// wildcards; everything else matches literally.
pub fn template_pattern(template: &str) -> Result<Regex> {
    let placeholder = Regex::new(r"%\([^)]*\)[^a-zA-Z%]*[a-zA-Z]")
        .map_err(|e| Error::Config(format!("Invalid placeholder pattern: {e}")))?;

    let mut pattern = String::from("^");
    let mut last = 0;
    for m in placeholder.find_iter(template) {
        pattern.push_str(&regex::escape(&template[last..m.start()]));
        pattern.push_str(".*");
        last = m.end();
    }
    pattern.push_str(&regex::escape(&template[last..]));
    pattern.push('$');

    Regex::new(&pattern)
        .map_err(|e| Error::Config(format!("Invalid output template '{template}': {e}")))
}

/// Files in the output directory matching a template, captured before a
/// download.
#[derive(Debug)]
pub struct OutputSnapshot {
    directory: PathBuf,
    pattern: Regex,
    existing: HashSet<PathBuf>,
}

impl OutputSnapshot {
    /// Record the files currently matching `template` in `directory`.
    ///
    /// A missing directory yields an empty snapshot.
    pub fn capture(directory: &Path, template: &str) -> Result<Self> {
        let pattern = template_pattern(template)?;
        let existing = matching_files(directory, &pattern)
            .into_iter()
            .map(|(path, _)| path)
            .collect();
        Ok(Self {
            directory: directory.to_path_buf(),
            pattern,
            existing,
        })
    }

    /// Number of matching files seen at capture time.
    #[must_use]
    pub fn len(&self) -> usize {
        self.existing.len()
    }

    /// Whether no matching file existed at capture time.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.existing.is_empty()
    }

    /// Find the file the download produced.
    ///
    /// Prefers the most recently modified file that did not exist at capture
    /// time, and falls back to the most recently modified matching file for
    /// downloaders that overwrite in place.
    #[must_use]
    pub fn locate_output(&self) -> Option<PathBuf> {
        let after = matching_files(&self.directory, &self.pattern);

        let newest_new = after
            .iter()
            .filter(|(path, _)| !self.existing.contains(path))
            .max_by_key(|(_, modified)| *modified)
            .map(|(path, _)| path.clone());

        if newest_new.is_some() {
            return newest_new;
        }

        debug!(
            "No new file matched in {}, falling back to newest match",
            self.directory.display()
        );
        after
            .into_iter()
            .max_by_key(|(_, modified)| *modified)
            .map(|(path, _)| path)
    }
}

/// List regular files directly inside `directory` whose names match `pattern`.
fn matching_files(directory: &Path, pattern: &Regex) -> Vec<(PathBuf, SystemTime)> {
    WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let name = entry.file_name().to_str()?;
            if PARTIAL_SUFFIXES.iter().any(|s| name.ends_with(s)) || !pattern.is_match(name) {
                return None;
            }
            let modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            Some((entry.into_path(), modified))
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::fs;
    use std::time::Duration;

    use filetime::FileTime;
    use tempfile::TempDir;

    use super::*;

    fn touch(dir: &Path, name: &str, age_secs: u64) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"data").unwrap();
        let when = SystemTime::now() - Duration::from_secs(age_secs);
        filetime::set_file_mtime(&path, FileTime::from_system_time(when)).unwrap();
        path
    }

    #[test]
    fn test_template_pattern_wildcards_placeholders() {
        let re = template_pattern("Demo [abc123].%(ext)s").unwrap();
        assert!(re.is_match("Demo [abc123].mp4"));
        assert!(re.is_match("Demo [abc123].webm"));
        assert!(!re.is_match("Demo [abc123] (1).mp4"));
        assert!(!re.is_match("Other [abc123].mp4"));

        let re = template_pattern("%(title).200s [%(id)s].%(ext)s").unwrap();
        assert!(re.is_match("Anything [xyz].mkv"));
        assert!(!re.is_match("no-brackets.mkv"));
    }

    #[test]
    fn test_locate_prefers_new_file() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "Demo [abc].mp4", 0);

        let snapshot = OutputSnapshot::capture(dir.path(), "Demo [abc].%(ext)s").unwrap();
        assert_eq!(snapshot.len(), 1);

        let new_file = touch(dir.path(), "Demo [abc].webm", 60);
        assert_eq!(snapshot.locate_output(), Some(new_file));
    }

    #[test]
    fn test_locate_falls_back_to_newest_match() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "Demo [abc].mp4", 120);
        let newer = touch(dir.path(), "Demo [abc].mkv", 10);

        let snapshot = OutputSnapshot::capture(dir.path(), "Demo [abc].%(ext)s").unwrap();
        assert_eq!(snapshot.locate_output(), Some(newer));
    }

    #[test]
    fn test_locate_ignores_partial_and_unrelated_files() {
        let dir = TempDir::new().unwrap();
        let snapshot = OutputSnapshot::capture(dir.path(), "Demo [abc].%(ext)s").unwrap();
        assert!(snapshot.is_empty());

        touch(dir.path(), "Demo [abc].mp4.part", 0);
        touch(dir.path(), "Unrelated.mp4", 0);
        assert_eq!(snapshot.locate_output(), None);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("not-yet");
        let snapshot = OutputSnapshot::capture(&missing, "x.%(ext)s").unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.locate_output(), None);
    }
}
