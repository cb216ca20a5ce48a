//! Domain model shared by the metadata, download, transcode and batch stages.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Sentinel the downloader uses for a missing codec.
const NO_CODEC: &str = "none";

/// Default downloader output template: `<title> [<id>].<ext>`.
pub const DEFAULT_OUTPUT_TEMPLATE: &str = "%(title)s [%(id)s].%(ext)s";

/// One selectable encoding of a remote video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoFormat {
    /// Opaque selector token understood by the downloader.
    pub id: String,
    /// Frame height in pixels; `None` for audio-only streams.
    pub height: Option<u32>,
    /// Container extension, e.g. `mp4` or `webm`.
    pub extension: String,
    /// Video codec, or `"none"`.
    pub video_codec: String,
    /// Audio codec, or `"none"`.
    pub audio_codec: String,
}

impl VideoFormat {
    /// Whether the format carries a video stream.
    #[must_use]
    pub fn has_video(&self) -> bool {
        codec_present(&self.video_codec)
    }

    /// Whether the format carries an audio stream.
    #[must_use]
    pub fn has_audio(&self) -> bool {
        codec_present(&self.audio_codec)
    }

    /// Human-readable label, e.g. `1080p • mp4 • v:avc1 a:-`.
    #[must_use]
    pub fn display_label(&self) -> String {
        let height = self
            .height
            .map_or_else(|| "Audio".to_string(), |h| format!("{h}p"));
        let container = if self.extension.trim().is_empty() {
            "?"
        } else {
            &self.extension
        };
        let video = if self.has_video() { &self.video_codec } else { "-" };
        let audio = if self.has_audio() { &self.audio_codec } else { "-" };
        format!("{height} • {container} • v:{video} a:{audio}")
    }
}

impl std::fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display_label())
    }
}

fn codec_present(codec: &str) -> bool {
    let codec = codec.trim();
    !codec.is_empty() && codec != NO_CODEC
}

/// Descriptor of one remote video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Video ID.
    pub id: String,
    /// Video title.
    pub title: String,
    /// Duration; zero when unknown.
    pub duration: Duration,
    /// Thumbnail URL, empty when unknown.
    pub thumbnail_url: String,
    /// Available formats, tallest first, height-less formats last.
    pub formats: Vec<VideoFormat>,
}

impl VideoMetadata {
    /// Build metadata, ordering the formats by descending height.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        duration: Duration,
        thumbnail_url: impl Into<String>,
        mut formats: Vec<VideoFormat>,
    ) -> Self {
        sort_formats(&mut formats);
        Self {
            id: id.into(),
            title: title.into(),
            duration,
            thumbnail_url: thumbnail_url.into(),
            formats,
        }
    }

    /// Base file name (without extension) for this video: `<title> [<id>]`.
    #[must_use]
    pub fn base_name(&self) -> String {
        format!("{} [{}]", self.title, self.id)
    }

    /// Quality choices offered to the user: "Best" followed by every format
    /// that has both a height and a video stream.
    #[must_use]
    pub fn quality_options(&self) -> Vec<QualityOption> {
        std::iter::once(QualityOption::best())
            .chain(
                self.formats
                    .iter()
                    .filter(|f| f.height.is_some() && f.has_video())
                    .map(|f| QualityOption {
                        label: f.display_label(),
                        format_id: Some(f.id.clone()),
                        max_height: f.height,
                    }),
            )
            .collect()
    }
}

/// Sort formats by descending height; formats without a height go last.
///
/// The sort is stable, so formats of equal height keep their encounter order.
pub fn sort_formats(formats: &mut [VideoFormat]) {
    // `Option` orders `None` below any `Some`, so a reversed comparison puts
    // height-less formats at the end.
    formats.sort_by(|a, b| b.height.cmp(&a.height));
}

/// One entry of the quality picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityOption {
    /// Display label.
    pub label: String,
    /// Explicit format id, `None` for "Best".
    pub format_id: Option<String>,
    /// Height cap carried alongside the format id.
    pub max_height: Option<u32>,
}

impl QualityOption {
    /// The unconstrained "Best" choice.
    #[must_use]
    pub fn best() -> Self {
        Self {
            label: "Best".to_string(),
            format_id: None,
            max_height: None,
        }
    }
}

/// What to download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadMode {
    /// Video with audio.
    #[default]
    Video,
    /// Audio only, extracted to m4a.
    AudioOnly,
}

/// How to handle output files that already exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionStrategy {
    /// Leave the existing file and skip the item.
    Skip,
    /// Delete the existing files and download again.
    Overwrite,
    /// Download under a new ` (n)` suffixed name.
    #[default]
    AutoRename,
}

impl CollisionStrategy {
    /// Downloader flag matching this strategy.
    ///
    /// `AutoRename` has no flag: the file name is already unique by the time
    /// the downloader runs.
    #[must_use]
    pub const fn downloader_flag(self) -> Option<&'static str> {
        match self {
            Self::Skip => Some("--no-overwrites"),
            Self::Overwrite => Some("--force-overwrites"),
            Self::AutoRename => None,
        }
    }
}

impl std::fmt::Display for CollisionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Skip => write!(f, "Skip"),
            Self::Overwrite => write!(f, "Overwrite"),
            Self::AutoRename => write!(f, "Auto-rename"),
        }
    }
}

/// One fully resolved unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Source URL.
    pub url: String,
    /// Directory the downloader writes into.
    pub output_directory: PathBuf,
    /// File name pattern, resolved by the downloader.
    pub output_template: String,
    /// Video or audio-only.
    pub mode: DownloadMode,
    /// Explicit format id chosen from a fetched format list.
    pub format_id: Option<String>,
    /// Height cap, ignored when `format_id` is set.
    pub max_height: Option<u32>,
    /// Re-encode for editor compatibility after downloading.
    pub compatibility_mode: bool,
    /// Proxy URL, when routing through a proxy.
    pub proxy: Option<String>,
    /// Metadata used for naming and transcode progress scaling.
    pub metadata: Option<VideoMetadata>,
    /// Collision handling passed on to the downloader.
    pub collision_strategy: CollisionStrategy,
}

impl DownloadRequest {
    /// Create a request with default options for the given URL and directory.
    #[must_use]
    pub fn new(url: impl Into<String>, output_directory: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            output_directory: output_directory.into(),
            output_template: DEFAULT_OUTPUT_TEMPLATE.to_string(),
            mode: DownloadMode::default(),
            format_id: None,
            max_height: None,
            compatibility_mode: false,
            proxy: None,
            metadata: None,
            collision_strategy: CollisionStrategy::default(),
        }
    }

    /// Full output path pattern handed to the downloader's `-o` flag.
    #[must_use]
    pub fn output_pattern(&self) -> PathBuf {
        self.output_directory.join(&self.output_template)
    }
}

/// Stage of a single request's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadPhase {
    /// Preparing the download.
    PreChecks,
    /// Downloader is transferring data.
    Downloading,
    /// Transcoder is re-encoding.
    Transcoding,
    /// Stage finished.
    Completed,
}

impl std::fmt::Display for DownloadPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PreChecks => write!(f, "Pre-checks"),
            Self::Downloading => write!(f, "Downloading"),
            Self::Transcoding => write!(f, "Transcoding"),
            Self::Completed => write!(f, "Completed"),
        }
    }
}

/// A point-in-time progress report.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadProgress {
    /// Overall percent for the request (0-100).
    pub percent: u8,
    /// Current stage.
    pub phase: DownloadPhase,
    /// Human-readable status message.
    pub status: String,
    /// Transfer rate in bytes per second, when the downloader reports one.
    pub download_rate: Option<f64>,
    /// Remaining time as printed by the downloader.
    pub eta: Option<String>,
    /// Raw diagnostic line.
    pub additional_details: Option<String>,
}

impl DownloadProgress {
    /// Create a report with no rate, ETA or details.
    #[must_use]
    pub fn new(percent: u8, phase: DownloadPhase, status: impl Into<String>) -> Self {
        Self {
            percent: percent.min(100),
            phase,
            status: status.into(),
            download_rate: None,
            eta: None,
            additional_details: None,
        }
    }

    /// Format the download rate as a human-readable string.
    #[must_use]
    pub fn formatted_rate(&self) -> Option<String> {
        self.download_rate.map(format_bytes_per_second)
    }
}

/// Receiver of progress reports.
///
/// Reports are delivered synchronously and in order on the worker; sinks
/// must return quickly.
pub trait ProgressSink: Send + Sync {
    /// Handle one report.
    fn report(&self, progress: DownloadProgress);
}

impl<F> ProgressSink for F
where
    F: Fn(DownloadProgress) + Send + Sync,
{
    fn report(&self, progress: DownloadProgress) {
        self(progress);
    }
}

/// Format bytes per second as a human-readable string.
#[must_use]
pub fn format_bytes_per_second(bps: f64) -> String {
    if bps < 1024.0 {
        format!("{bps:.0} B/s")
    } else if bps < 1024.0 * 1024.0 {
        format!("{:.1} KB/s", bps / 1024.0)
    } else {
        format!("{:.1} MB/s", bps / (1024.0 * 1024.0))
    }
}

/// Format a duration as `m:ss`, or `h:mm:ss` past the hour.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}
