//! yt-dlp adapter: metadata fetching and downloading.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Error, FileSystemError, Result};
use crate::format::build_format_selector;
use crate::model::{
    DownloadMode, DownloadPhase, DownloadProgress, DownloadRequest, ProgressSink, VideoFormat,
    VideoMetadata,
};
use crate::process::{OutputStream, ToolCommand};
use crate::tools::{DOWNLOADER_NAME, MediaDownloader, MetadataSource};

/// Percent reported before the downloader starts.
pub const PRE_CHECK_PERCENT: u8 = 2;
/// Lower bound of the download band.
pub const DOWNLOAD_START_PERCENT: u8 = 5;
/// Upper bound of the download band; transcoding starts here.
pub const DOWNLOAD_END_PERCENT: u8 = 70;

#[allow(clippy::expect_used)]
static DOWNLOAD_PERCENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[download\]\s+(\d{1,3}(?:\.\d+)?)%").expect("valid download percent pattern")
});

#[allow(clippy::expect_used)]
static DOWNLOAD_RATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bat\s+(\d+(?:\.\d+)?)\s*([KMGT]?i?B)/s").expect("valid download rate pattern")
});

#[allow(clippy::expect_used)]
static DOWNLOAD_ETA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bETA\s+(\d+(?::\d{2})+)").expect("valid download eta pattern")
});

/// Handle to a yt-dlp executable.
#[derive(Debug, Clone)]
pub struct YtDlp {
    executable: PathBuf,
}

impl YtDlp {
    /// Create a handle for the executable at `executable`.
    #[must_use]
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    /// Path to the executable.
    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Command that prints the metadata JSON for `url` without downloading.
    #[must_use]
    pub fn metadata_command(&self, url: &str) -> ToolCommand {
        ToolCommand::new(DOWNLOADER_NAME, &self.executable).args(["--dump-json", "-s", url])
    }

    /// Command that downloads `request`.
    #[must_use]
    pub fn download_command(&self, request: &DownloadRequest) -> ToolCommand {
        let mut command = ToolCommand::new(DOWNLOADER_NAME, &self.executable)
            .arg("--newline")
            .arg("-o")
            .arg(request.output_pattern());

        if request.mode == DownloadMode::AudioOnly {
            command = command.args(["-x", "--audio-format", "m4a", "--audio-quality", "0"]);
        }

        command = command.arg("-f").arg(build_format_selector(request));

        if let Some(proxy) = request.proxy.as_deref().filter(|p| !p.trim().is_empty()) {
            command = command
                .arg("--proxy")
                .arg(proxy)
                .env("http_proxy", proxy)
                .env("https_proxy", proxy);
        }

        if let Some(flag) = request.collision_strategy.downloader_flag() {
            command = command.arg(flag);
        }

        command.arg(request.url.as_str())
    }
}

impl MetadataSource for YtDlp {
    async fn fetch_metadata(&self, url: &str, cancel: &CancellationToken) -> Result<VideoMetadata> {
        info!("Fetching metadata for {}", url);
        let output = self.metadata_command(url).run(cancel, |_, _| {}).await?;

        if output.stdout.trim().is_empty() {
            let detail = output.stderr.trim();
            return Err(Error::MetadataParse(if detail.is_empty() {
                "yt-dlp returned no data.".to_string()
            } else {
                detail.to_string()
            }));
        }

        let metadata = parse_metadata_json(&output.stdout)?;
        debug!(
            "Parsed metadata for {}: '{}' with {} formats",
            metadata.id,
            metadata.title,
            metadata.formats.len()
        );
        Ok(metadata)
    }
}

impl MediaDownloader for YtDlp {
    async fn download(
        &self,
        request: &DownloadRequest,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<()> {
        sink.report(DownloadProgress::new(
            PRE_CHECK_PERCENT,
            DownloadPhase::PreChecks,
            "Preparing",
        ));

        tokio::fs::create_dir_all(&request.output_directory)
            .await
            .map_err(|e| FileSystemError::CreateDirFailed {
                path: request.output_directory.clone(),
                reason: e.to_string(),
            })?;

        info!("Downloading {} into {}", request.url, request.output_directory.display());

        let mut reported = PRE_CHECK_PERCENT;
        let output = self
            .download_command(request)
            .run(cancel, |stream, line| {
                if stream != OutputStream::Stdout {
                    return;
                }
                let Some(parsed) = parse_download_line(line) else {
                    return;
                };
                // Separate video and audio streams restart at 0%.
                reported = reported.max(scale_download_percent(parsed.percent));

                let mut progress =
                    DownloadProgress::new(reported, DownloadPhase::Downloading, line.trim());
                progress.download_rate = parsed.rate;
                progress.eta = parsed.eta;
                progress.additional_details = Some(line.to_string());
                sink.report(progress);
            })
            .await?;

        if !output.success() {
            return Err(Error::ToolExit {
                tool: DOWNLOADER_NAME.to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }

        sink.report(DownloadProgress::new(
            DOWNLOAD_END_PERCENT,
            DownloadPhase::Completed,
            "Download complete",
        ));
        Ok(())
    }
}

/// Parse the JSON document printed by `--dump-json`.
///
/// Only the first document is read. Missing fields fall back to defaults:
/// title `"Unknown"`, zero duration, empty id and thumbnail, no formats.
pub fn parse_metadata_json(json: &str) -> Result<VideoMetadata> {
    let root = serde_json::Deserializer::from_str(json)
        .into_iter::<Value>()
        .next()
        .ok_or_else(|| Error::MetadataParse("yt-dlp returned no data.".to_string()))?
        .map_err(|e| Error::MetadataParse(format!("invalid JSON: {e}")))?;

    if !root.is_object() {
        return Err(Error::MetadataParse(
            "expected a JSON object".to_string(),
        ));
    }

    let title = root
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or("Unknown");
    let duration = root
        .get("duration")
        .and_then(Value::as_f64)
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .map_or(Duration::ZERO, Duration::from_secs_f64);

    let formats = root
        .get("formats")
        .and_then(Value::as_array)
        .map(|formats| formats.iter().map(parse_format).collect())
        .unwrap_or_default();

    Ok(VideoMetadata::new(
        string_field(&root, "id"),
        title,
        duration,
        string_field(&root, "thumbnail"),
        formats,
    ))
}

fn parse_format(value: &Value) -> VideoFormat {
    VideoFormat {
        id: string_field(value, "format_id"),
        height: value
            .get("height")
            .and_then(Value::as_u64)
            .and_then(|h| u32::try_from(h).ok()),
        extension: string_field(value, "ext"),
        video_codec: string_field(value, "vcodec"),
        audio_codec: string_field(value, "acodec"),
    }
}

fn string_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Values extracted from one `[download]` progress line.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadLine {
    /// Raw percent printed by the downloader.
    pub percent: f64,
    /// Transfer rate in bytes per second.
    pub rate: Option<f64>,
    /// Remaining time as printed.
    pub eta: Option<String>,
}

/// Parse a downloader progress line; `None` for any other line.
#[must_use]
pub fn parse_download_line(line: &str) -> Option<DownloadLine> {
    let percent = DOWNLOAD_PERCENT
        .captures(line)?
        .get(1)?
        .as_str()
        .parse::<f64>()
        .ok()?;

    let rate = DOWNLOAD_RATE.captures(line).and_then(|caps| {
        let value = caps.get(1)?.as_str().parse::<f64>().ok()?;
        Some(value * unit_multiplier(caps.get(2)?.as_str())?)
    });
    let eta = DOWNLOAD_ETA
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());

    Some(DownloadLine { percent, rate, eta })
}

fn unit_multiplier(unit: &str) -> Option<f64> {
    let multiplier = match unit {
        "B" => 1.0,
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "TiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        "KB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        "TB" => 1e12,
        _ => return None,
    };
    Some(multiplier)
}

/// Map the downloader's own percent into the `[5, 70]` band.
#[must_use]
pub fn scale_download_percent(raw: f64) -> u8 {
    let low = f64::from(DOWNLOAD_START_PERCENT);
    let high = f64::from(DOWNLOAD_END_PERCENT);
    (low + raw * 0.65).clamp(low, high) as u8
}
