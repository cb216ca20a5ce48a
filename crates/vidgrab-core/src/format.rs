//! Format selector construction for the downloader's `-f` flag.

use crate::model::{DownloadMode, DownloadRequest};

/// Selector for the best available audio stream.
pub const AUDIO_SELECTOR: &str = "bestaudio/bestaudio[ext=m4a]";

/// Selector for the best video merged with the best audio.
pub const BEST_SELECTOR: &str = "bestvideo*+bestaudio/best";

/// Derive the format selector for a request.
///
/// Precedence, highest first: audio-only mode, explicit format id, height
/// cap, unconstrained best.
#[must_use]
pub fn build_format_selector(request: &DownloadRequest) -> String {
    if request.mode == DownloadMode::AudioOnly {
        return AUDIO_SELECTOR.to_string();
    }

    if let Some(format_id) = request.format_id.as_deref().filter(|id| !id.is_empty()) {
        return format_id.to_string();
    }

    match request.max_height {
        Some(height) => format!("bv*[height<={height}]+ba/b[height<={height}]"),
        None => BEST_SELECTOR.to_string(),
    }
}
