//! External tool boundary.
//!
//! [`ToolPaths`] carries the executable locations supplied by the caller; the
//! traits are the seams the batch orchestrator drives, implemented by
//! [`crate::ytdlp::YtDlp`] and [`crate::ffmpeg::Ffmpeg`].

use std::future::Future;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::model::{DownloadRequest, ProgressSink, VideoMetadata};

/// Display name of the downloader.
pub const DOWNLOADER_NAME: &str = "yt-dlp";

/// Display name of the transcoder.
pub const TRANSCODER_NAME: &str = "ffmpeg";

/// Locations of the external executables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPaths {
    /// Path to the downloader executable.
    pub yt_dlp: Option<PathBuf>,
    /// Path to the transcoder executable.
    pub ffmpeg: Option<PathBuf>,
}

impl ToolPaths {
    /// Create tool paths.
    #[must_use]
    pub const fn new(yt_dlp: Option<PathBuf>, ffmpeg: Option<PathBuf>) -> Self {
        Self { yt_dlp, ffmpeg }
    }

    /// Return the downloader path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingDependency`] when no path is configured or the
    /// file does not exist.
    pub fn require_downloader(&self) -> Result<&Path> {
        require(DOWNLOADER_NAME, self.yt_dlp.as_deref())
    }

    /// Return the transcoder path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingDependency`] when no path is configured or the
    /// file does not exist.
    pub fn require_transcoder(&self) -> Result<&Path> {
        require(TRANSCODER_NAME, self.ffmpeg.as_deref())
    }
}

fn require<'a>(tool: &str, path: Option<&'a Path>) -> Result<&'a Path> {
    match path {
        Some(path) if path.is_file() => Ok(path),
        Some(path) => Err(Error::MissingDependency {
            tool: tool.to_string(),
            path: path.to_path_buf(),
        }),
        None => Err(Error::MissingDependency {
            tool: tool.to_string(),
            path: PathBuf::from(tool),
        }),
    }
}

/// Fetches the descriptor of a remote video.
pub trait MetadataSource: Send + Sync {
    /// Fetch metadata for `url`.
    ///
    /// # Errors
    ///
    /// [`Error::ToolInvocation`] if the tool cannot start,
    /// [`Error::MetadataParse`] if it produced no usable output, and
    /// [`Error::Cancelled`] if `cancel` fires first.
    fn fetch_metadata(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<VideoMetadata>> + Send;
}

/// Downloads one resolved request.
pub trait MediaDownloader: Send + Sync {
    /// Run the download, reporting progress in `[2, 70]`.
    ///
    /// # Errors
    ///
    /// [`Error::ToolInvocation`], [`Error::ToolExit`] or [`Error::Cancelled`].
    fn download(
        &self,
        request: &DownloadRequest,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Re-encodes a downloaded file for editor compatibility.
pub trait MediaTranscoder: Send + Sync {
    /// Transcode `input` into `output_directory`, returning the new file,
    /// reporting progress in `[70, 100]`.
    ///
    /// # Errors
    ///
    /// [`Error::ToolInvocation`], [`Error::ToolExit`] or [`Error::Cancelled`].
    fn transcode(
        &self,
        input: &Path,
        output_directory: &Path,
        metadata: &VideoMetadata,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<PathBuf>> + Send;
}
