//! Persisted user preferences.
//!
//! Settings are read once at startup to seed request defaults and written
//! back at shutdown. A missing or unreadable file never prevents startup.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, FileSystemError, Result};
use crate::proxy::ProxySettings;
use crate::tools::ToolPaths;

const APP_DIR: &str = "vidgrab";
const SETTINGS_FILE: &str = "settings.json";

/// User preferences remembered between runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UserSettings {
    /// Directory downloads are written into.
    pub save_directory: PathBuf,
    /// Route downloads through `proxy`.
    pub use_proxy: bool,
    /// Proxy parameters, kept even while the proxy is disabled.
    pub proxy: ProxySettings,
    /// Last URL entered.
    pub last_url: String,
    /// Downloader executable override.
    pub yt_dlp_path: Option<PathBuf>,
    /// Transcoder executable override.
    pub ffmpeg_path: Option<PathBuf>,
    /// Re-encode downloads for editor compatibility.
    pub compatibility_mode: bool,
    /// Download audio only.
    pub audio_only: bool,
    /// Whether the last session used a batch.
    pub batch_mode: bool,
    /// Queued batch URLs, de-duplicated case-insensitively.
    pub batch_urls: Vec<String>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            save_directory: default_save_directory(),
            use_proxy: false,
            proxy: ProxySettings::default(),
            last_url: String::new(),
            yt_dlp_path: None,
            ffmpeg_path: None,
            compatibility_mode: false,
            audio_only: false,
            batch_mode: false,
            batch_urls: Vec::new(),
        }
    }
}

impl UserSettings {
    /// Load settings from the default location.
    ///
    /// Falls back to defaults when the file is missing, unreadable or
    /// malformed.
    #[must_use]
    pub fn load() -> Self {
        let path = settings_file_path();
        if !path.exists() {
            debug!("Settings file not found, using defaults");
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Ignoring settings file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Load settings from `path`.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::FileSystem(FileSystemError::ReadFailed {
                path: path.to_path_buf(),
                reason: format!("Failed to read settings file: {e}"),
            })
        })?;

        let settings: Self = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse settings file: {e}")))?;

        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Save settings to the default location.
    pub fn save(&self) -> Result<()> {
        self.save_to(&settings_file_path())
    }

    /// Save settings to `path`, creating its parent directory.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| {
                Error::FileSystem(FileSystemError::CreateDirFailed {
                    path: parent.to_path_buf(),
                    reason: format!("Failed to create settings directory: {e}"),
                })
            })?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| {
            Error::FileSystem(FileSystemError::WriteFailed {
                path: path.to_path_buf(),
                reason: format!("Failed to write settings file: {e}"),
            })
        })?;

        info!("Saved settings to {}", path.display());
        Ok(())
    }

    /// Proxy URL to use, or `None` when the proxy is disabled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the proxy is enabled but its host or
    /// port is missing.
    pub fn proxy_url(&self) -> Result<Option<String>> {
        if !self.use_proxy {
            return Ok(None);
        }
        self.proxy.to_url().map(Some)
    }

    /// Queue `url` for the next batch.
    ///
    /// Returns `false` when the URL is blank or already queued (ignoring
    /// case).
    pub fn add_batch_url(&mut self, url: &str) -> bool {
        let url = url.trim();
        if url.is_empty()
            || self
                .batch_urls
                .iter()
                .any(|queued| queued.eq_ignore_ascii_case(url))
        {
            return false;
        }
        self.batch_urls.push(url.to_string());
        true
    }

    /// Tool locations configured in these settings.
    #[must_use]
    pub fn tool_paths(&self) -> ToolPaths {
        ToolPaths::new(self.yt_dlp_path.clone(), self.ffmpeg_path.clone())
    }

    /// Path of the settings file.
    #[must_use]
    pub fn settings_file_path() -> PathBuf {
        settings_file_path()
    }
}

/// Default download directory: `<videos>/vidgrab`.
#[must_use]
pub fn default_save_directory() -> PathBuf {
    dirs::video_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn settings_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join(APP_DIR)
        .join(SETTINGS_FILE)
}
