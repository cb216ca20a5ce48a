//! `Vidgrab` Core Library
//!
//! This crate drives two external tools to fetch videos:
//! - Metadata fetching and downloading through `yt-dlp`
//! - Optional re-encoding through `ffmpeg` for editor compatibility
//! - Format selection, output collision handling and proxy configuration
//! - Sequential batch orchestration with cooperative cancellation
//! - Persisted user settings
//!
//! # Error Handling
//!
//! Every fallible operation returns [`Result`]. See the [`error`] module for
//! the taxonomy.
//!
//! ```rust,ignore
//! use vidgrab_core::{
//!     BatchOptions, BatchOrchestrator, CollisionStrategy, Ffmpeg, FixedStrategy, YtDlp,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! let orchestrator = BatchOrchestrator::new(
//!     YtDlp::new("/usr/bin/yt-dlp"),
//!     YtDlp::new("/usr/bin/yt-dlp"),
//!     Some(Ffmpeg::new("/usr/bin/ffmpeg")),
//! );
//! let report = orchestrator
//!     .run(
//!         &urls,
//!         &BatchOptions::new("/videos"),
//!         None,
//!         &FixedStrategy(CollisionStrategy::AutoRename),
//!         &|event| println!("{event:?}"),
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//! ```

pub mod batch;
pub mod collision;
pub mod error;
pub mod ffmpeg;
pub mod format;
pub mod model;
pub mod output;
pub mod process;
pub mod proxy;
pub mod settings;
pub mod tools;
pub mod ytdlp;

pub use batch::{
    BatchEvent, BatchOptions, BatchOrchestrator, BatchReport, CachedMetadata, ItemOutcome,
    ItemReport,
};
pub use collision::{
    CollisionPrompt, CollisionResolver, FixedStrategy, Resolution, sanitize_filename,
    unique_base_name,
};
pub use error::{Error, ErrorKind, FileSystemError, Result};
pub use ffmpeg::{Ffmpeg, TRANSCODED_SUFFIX, transcoded_path};
pub use format::{AUDIO_SELECTOR, BEST_SELECTOR, build_format_selector};
pub use model::{
    CollisionStrategy, DEFAULT_OUTPUT_TEMPLATE, DownloadMode, DownloadPhase, DownloadProgress,
    DownloadRequest, ProgressSink, QualityOption, VideoFormat, VideoMetadata,
    format_bytes_per_second, format_duration, sort_formats,
};
pub use output::{OutputSnapshot, template_pattern};
pub use process::{LineSplitter, OutputStream, ToolCommand, ToolOutput};
pub use proxy::{ProxySettings, build_proxy_url};
pub use settings::{UserSettings, default_save_directory};
pub use tools::{
    DOWNLOADER_NAME, MediaDownloader, MediaTranscoder, MetadataSource, TRANSCODER_NAME,
    ToolPaths,
};
pub use ytdlp::{YtDlp, parse_download_line, parse_metadata_json};

/// Cancellation scope accepted by every long-running operation.
pub use tokio_util::sync::CancellationToken;
