//! ffmpeg adapter: re-encoding downloads into an editor-friendly MP4.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{Error, FileSystemError, Result};
use crate::model::{DownloadPhase, DownloadProgress, ProgressSink, VideoMetadata};
use crate::process::{OutputStream, ToolCommand};
use crate::tools::{MediaTranscoder, TRANSCODER_NAME};
use crate::ytdlp::DOWNLOAD_END_PERCENT;

/// Suffix appended to the input stem for transcoded files.
pub const TRANSCODED_SUFFIX: &str = ".premiere.mp4";

/// Width of the transcode band above [`DOWNLOAD_END_PERCENT`].
const TRANSCODE_SPAN: f64 = 30.0;

/// Fixed re-encoding recipe: H.264 at constant 30 fps, yuv420p, AAC stereo
/// 48 kHz, moov atom up front.
const RECIPE: [&str; 22] = [
    "-c:v",
    "libx264",
    "-preset",
    "medium",
    "-crf",
    "20",
    "-pix_fmt",
    "yuv420p",
    "-vsync",
    "cfr",
    "-r",
    "30",
    "-c:a",
    "aac",
    "-b:a",
    "160k",
    "-ar",
    "48000",
    "-ac",
    "2",
    "-movflags",
    "+faststart",
];

#[allow(clippy::expect_used)]
static ELAPSED_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"time=(\d{2}):(\d{2}):(\d{2}(?:\.\d+)?)").expect("valid elapsed time pattern")
});

/// Handle to an ffmpeg executable.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    executable: PathBuf,
}

impl Ffmpeg {
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

    /// Command that re-encodes `input` into `destination`.
    #[must_use]
    pub fn transcode_command(&self, input: &Path, destination: &Path) -> ToolCommand {
        ToolCommand::new(TRANSCODER_NAME, &self.executable)
            .arg("-y")
            .arg("-i")
            .arg(input)
            .args(RECIPE)
            .arg(destination)
    }
}

impl MediaTranscoder for Ffmpeg {
    async fn transcode(
        &self,
        input: &Path,
        output_directory: &Path,
        metadata: &VideoMetadata,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        tokio::fs::create_dir_all(output_directory)
            .await
            .map_err(|e| FileSystemError::CreateDirFailed {
                path: output_directory.to_path_buf(),
                reason: e.to_string(),
            })?;

        let destination = transcoded_path(input, output_directory);
        info!(
            "Transcoding {} to {}",
            input.display(),
            destination.display()
        );

        let duration = metadata.duration;
        let mut reported = DOWNLOAD_END_PERCENT;
        let output = self
            .transcode_command(input, &destination)
            .run(cancel, |stream, line| {
                if stream != OutputStream::Stderr {
                    return;
                }
                let Some(elapsed) = parse_elapsed(line) else {
                    return;
                };
                reported = reported.max(transcode_percent(elapsed, duration));

                let mut progress = DownloadProgress::new(
                    reported,
                    DownloadPhase::Transcoding,
                    transcode_status(elapsed, duration),
                );
                progress.additional_details = Some(line.to_string());
                sink.report(progress);
            })
            .await?;

        sink.report(DownloadProgress::new(
            100,
            DownloadPhase::Completed,
            "Transcoding complete",
        ));

        if !output.success() {
            warn!("ffmpeg failed to transcode {}", input.display());
            return Err(Error::ToolExit {
                tool: TRANSCODER_NAME.to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }

        Ok(destination)
    }
}

/// Destination for a transcode: `<output_directory>/<input stem>.premiere.mp4`.
#[must_use]
pub fn transcoded_path(input: &Path, output_directory: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    output_directory.join(format!("{stem}{TRANSCODED_SUFFIX}"))
}

/// Extract the elapsed `time=HH:MM:SS.ms` marker from an ffmpeg stats line.
#[must_use]
pub fn parse_elapsed(line: &str) -> Option<Duration> {
    let caps = ELAPSED_TIME.captures(line)?;
    let hours: u64 = caps.get(1)?.as_str().parse().ok()?;
    let minutes: u64 = caps.get(2)?.as_str().parse().ok()?;
    let seconds: f64 = caps.get(3)?.as_str().parse().ok()?;
    Some(Duration::from_secs(hours * 3600 + minutes * 60) + Duration::from_secs_f64(seconds))
}

/// Map elapsed transcode time into the `[70, 100]` band; a flat 70 when the
/// total duration is unknown.
#[must_use]
pub fn transcode_percent(elapsed: Duration, duration: Duration) -> u8 {
    if duration.is_zero() {
        return DOWNLOAD_END_PERCENT;
    }
    let share = (elapsed.as_secs_f64() / duration.as_secs_f64() * TRANSCODE_SPAN)
        .clamp(0.0, TRANSCODE_SPAN);
    DOWNLOAD_END_PERCENT + share as u8
}

/// Status line shown while transcoding, e.g.
/// `Transcoding for Premiere (00:01:02 / 00:02:05)`.
#[must_use]
pub fn transcode_status(elapsed: Duration, duration: Duration) -> String {
    format!(
        "Transcoding for Premiere ({} / {})",
        clock(elapsed),
        clock(duration)
    )
}

fn clock(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
