//! Command-line arguments and their merge with saved settings.

use std::env;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::debug;
use vidgrab_core::{
    BatchOptions, CollisionStrategy, DOWNLOADER_NAME, DownloadMode, Error, Result,
    TRANSCODER_NAME, ToolPaths, UserSettings,
};

/// Download videos through yt-dlp, optionally re-encoded for editing.
#[derive(Debug, Parser)]
#[command(name = "vidgrab")]
#[command(about = "Batch video downloader driving yt-dlp and ffmpeg")]
#[command(version)]
pub struct Cli {
    /// Path to the yt-dlp executable (remembered for later runs)
    #[arg(long = "yt-dlp", global = true, value_name = "PATH")]
    pub yt_dlp: Option<PathBuf>,

    /// Path to the ffmpeg executable (remembered for later runs)
    #[arg(long, global = true, value_name = "PATH")]
    pub ffmpeg: Option<PathBuf>,

    /// Directory for log files
    #[arg(long, global = true, env = "VIDGRAB_LOG_DIR", value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show title, duration and available qualities of a video
    Info {
        /// Video URL
        url: String,
    },

    /// Download one or more videos, in order
    Download(DownloadArgs),
}

/// Options of the `download` command. Omitted options fall back to the
/// saved settings.
#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// Video URLs; when omitted, the last saved batch is run again
    pub urls: Vec<String>,

    /// Directory to write downloads into
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Download audio only
    #[arg(short, long, num_args = 0..=1, require_equals = true, default_missing_value = "true", value_name = "BOOL")]
    pub audio_only: Option<bool>,

    /// Exact format id to download (see `vidgrab info`)
    #[arg(short, long, value_name = "ID", conflicts_with = "max_height")]
    pub format_id: Option<String>,

    /// Best quality no taller than this many pixels
    #[arg(long, value_name = "PIXELS")]
    pub max_height: Option<u32>,

    /// Re-encode downloads with ffmpeg for editor compatibility
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true", value_name = "BOOL")]
    pub compat: Option<bool>,

    /// What to do when an output file already exists
    #[arg(long, value_enum, default_value_t = CollisionChoice::Ask)]
    pub on_collision: CollisionChoice,

    /// Proxy host; enables the proxy for this and later runs
    #[arg(long, value_name = "HOST")]
    pub proxy_host: Option<String>,

    /// Proxy port
    #[arg(long, value_name = "PORT")]
    pub proxy_port: Option<u16>,

    /// Proxy user name
    #[arg(long, value_name = "USER")]
    pub proxy_user: Option<String>,

    /// Proxy password
    #[arg(long, value_name = "PASSWORD")]
    pub proxy_password: Option<String>,

    /// Disable the saved proxy
    #[arg(long, conflicts_with = "proxy_host")]
    pub no_proxy: bool,
}

/// `--on-collision` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CollisionChoice {
    /// Ask once, on the first collision
    Ask,
    /// Keep existing files
    Skip,
    /// Replace existing files
    Overwrite,
    /// Save under a new numbered name
    Rename,
}

impl CollisionChoice {
    /// The preset strategy, or `None` to ask.
    #[must_use]
    pub const fn strategy(self) -> Option<CollisionStrategy> {
        match self {
            Self::Ask => None,
            Self::Skip => Some(CollisionStrategy::Skip),
            Self::Overwrite => Some(CollisionStrategy::Overwrite),
            Self::Rename => Some(CollisionStrategy::AutoRename),
        }
    }
}

impl Cli {
    /// Fold the global tool overrides into `settings`.
    pub fn apply_tool_overrides(&self, settings: &mut UserSettings) {
        if let Some(path) = &self.yt_dlp {
            settings.yt_dlp_path = Some(path.clone());
        }
        if let Some(path) = &self.ffmpeg {
            settings.ffmpeg_path = Some(path.clone());
        }
    }
}

impl DownloadArgs {
    /// Fold these arguments into `settings`, which then describe the run.
    ///
    /// Returns the URLs to process: the given ones, or the saved batch when
    /// none were given.
    pub fn apply_to(&self, settings: &mut UserSettings) -> Vec<String> {
        if let Some(dir) = &self.output_dir {
            settings.save_directory.clone_from(dir);
        }
        if let Some(audio_only) = self.audio_only {
            settings.audio_only = audio_only;
        }
        if let Some(compat) = self.compat {
            settings.compatibility_mode = compat;
        }

        if self.no_proxy {
            settings.use_proxy = false;
        }
        if let Some(host) = &self.proxy_host {
            settings.use_proxy = true;
            settings.proxy.host.clone_from(host);
        }
        if let Some(port) = self.proxy_port {
            settings.proxy.port = port;
        }
        if self.proxy_user.is_some() {
            settings.proxy.user.clone_from(&self.proxy_user);
        }
        if self.proxy_password.is_some() {
            settings.proxy.password.clone_from(&self.proxy_password);
        }

        let urls: Vec<String> = self
            .urls
            .iter()
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .collect();
        if urls.is_empty() {
            return settings.batch_urls.clone();
        }

        if let Some(last) = urls.last() {
            settings.last_url.clone_from(last);
        }
        settings.batch_mode = urls.len() > 1;
        if settings.batch_mode {
            settings.batch_urls.clear();
            for url in &urls {
                settings.add_batch_url(url);
            }
        }
        urls
    }

    /// Batch options for a run described by `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the proxy is enabled but incomplete.
    pub fn batch_options(&self, settings: &UserSettings) -> Result<BatchOptions> {
        let mut options = BatchOptions::new(&settings.save_directory);
        options.mode = if settings.audio_only {
            DownloadMode::AudioOnly
        } else {
            DownloadMode::Video
        };
        options.format_id.clone_from(&self.format_id);
        options.max_height = self.max_height;
        options.compatibility_mode = settings.compatibility_mode;
        options.proxy = settings.proxy_url()?;
        options.collision_strategy = self.on_collision.strategy();
        Ok(options)
    }
}

/// Tool locations: saved or overridden paths first, then `PATH`.
#[must_use]
pub fn resolve_tool_paths(settings: &UserSettings) -> ToolPaths {
    resolve_tool_paths_in(settings, env::var_os("PATH"))
}

fn resolve_tool_paths_in(settings: &UserSettings, search_path: Option<OsString>) -> ToolPaths {
    let configured = settings.tool_paths();
    let locate = |name: &str| locate_executable(name, search_path.as_deref());
    ToolPaths::new(
        configured.yt_dlp.or_else(|| locate(DOWNLOADER_NAME)),
        configured.ffmpeg.or_else(|| locate(TRANSCODER_NAME)),
    )
}

/// First executable called `name` in `search_path`.
fn locate_executable(name: &str, search_path: Option<&OsStr>) -> Option<PathBuf> {
    let cwd = env::current_dir().ok()?;
    match which::which_in(name, search_path, cwd) {
        Ok(path) => {
            debug!("Found {} at {}", name, path.display());
            Some(path)
        }
        Err(e) => {
            debug!("{} not found on PATH: {}", name, e);
            None
        }
    }
}

/// Reject a run with nothing to do.
///
/// # Errors
///
/// Returns [`Error::Config`] when `urls` is empty.
pub fn ensure_urls(urls: &[String]) -> Result<()> {
    if urls.is_empty() {
        return Err(Error::Config(
            "No URLs given and no saved batch to resume".to_string(),
        ));
    }
    Ok(())
}
