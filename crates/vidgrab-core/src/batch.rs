//! Sequential batch orchestration.
//!
//! A [`BatchOrchestrator`] drives an ordered list of URLs through metadata
//! fetching, collision resolution, downloading and optional transcoding, one
//! item at a time. Per-item failures are recorded and the run moves on;
//! cancellation ends the run.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::collision::{CollisionPrompt, CollisionResolver, Resolution};
use crate::error::{Error, Result};
use crate::model::{
    CollisionStrategy, DownloadMode, DownloadPhase, DownloadProgress, DownloadRequest,
    VideoMetadata,
};
use crate::output::OutputSnapshot;
use crate::tools::{MediaDownloader, MediaTranscoder, MetadataSource, TRANSCODER_NAME};

/// Options shared by every item of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOptions {
    /// Directory downloads are written into.
    pub output_directory: PathBuf,
    /// Video or audio-only.
    pub mode: DownloadMode,
    /// Explicit format id.
    pub format_id: Option<String>,
    /// Height cap.
    pub max_height: Option<u32>,
    /// Re-encode after downloading.
    pub compatibility_mode: bool,
    /// Proxy URL.
    pub proxy: Option<String>,
    /// Collision decision made before the run; the prompt is never asked
    /// when set.
    pub collision_strategy: Option<CollisionStrategy>,
}

impl BatchOptions {
    /// Options with defaults for everything but the output directory.
    #[must_use]
    pub fn new(output_directory: impl Into<PathBuf>) -> Self {
        Self {
            output_directory: output_directory.into(),
            mode: DownloadMode::default(),
            format_id: None,
            max_height: None,
            compatibility_mode: false,
            proxy: None,
            collision_strategy: None,
        }
    }

    fn request_for(
        &self,
        url: &str,
        output_template: String,
        strategy: CollisionStrategy,
        metadata: VideoMetadata,
    ) -> DownloadRequest {
        DownloadRequest {
            url: url.to_string(),
            output_directory: self.output_directory.clone(),
            output_template,
            mode: self.mode,
            format_id: self.format_id.clone(),
            max_height: self.max_height,
            compatibility_mode: self.compatibility_mode,
            proxy: self.proxy.clone(),
            metadata: Some(metadata),
            collision_strategy: strategy,
        }
    }
}

/// Metadata the caller already fetched, e.g. to show quality options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedMetadata {
    /// URL the metadata was fetched for.
    pub url: String,
    /// The fetched metadata.
    pub metadata: VideoMetadata,
}

impl CachedMetadata {
    /// Create a cache entry.
    #[must_use]
    pub fn new(url: impl Into<String>, metadata: VideoMetadata) -> Self {
        Self {
            url: url.into(),
            metadata,
        }
    }

    /// Whether this entry was fetched for `url` (trimmed, ignoring case).
    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        self.url.trim().eq_ignore_ascii_case(url.trim())
    }
}

/// Final state of one batch item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemOutcome {
    /// The item produced this file.
    Completed {
        /// Downloaded, or transcoded, file.
        output: PathBuf,
    },
    /// The item was abandoned without failing.
    Skipped {
        /// Why it was skipped.
        reason: String,
    },
    /// The item failed.
    Failed {
        /// Human-readable failure.
        message: String,
    },
    /// The run was cancelled while this item was in flight.
    Cancelled,
}

impl ItemOutcome {
    /// Whether the item completed.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

impl std::fmt::Display for ItemOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed { output } => write!(f, "Completed: {}", output.display()),
            Self::Skipped { reason } => write!(f, "Skipped: {reason}"),
            Self::Failed { message } => write!(f, "Failed: {message}"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Event delivered to the run's observer.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    /// Processing of an item began.
    ItemStarted {
        /// Zero-based position in the batch.
        index: usize,
        /// Number of items in the batch.
        total: usize,
        /// Item URL.
        url: String,
    },
    /// Human-readable status update.
    Status {
        /// Zero-based position in the batch.
        index: usize,
        /// Message.
        message: String,
    },
    /// Progress report from the downloader or transcoder.
    Progress {
        /// Zero-based position in the batch.
        index: usize,
        /// The report.
        progress: DownloadProgress,
    },
    /// An item reached its final state.
    ItemFinished {
        /// Zero-based position in the batch.
        index: usize,
        /// Final state.
        outcome: ItemOutcome,
    },
}

/// Outcome of one item, in batch order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemReport {
    /// Item URL.
    pub url: String,
    /// Final state.
    pub outcome: ItemOutcome,
}

/// Result of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Items that were started, in batch order.
    pub items: Vec<ItemReport>,
    /// Whether the run was cancelled before finishing.
    pub cancelled: bool,
}

impl BatchReport {
    /// Number of completed items.
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.items.iter().filter(|i| i.outcome.is_completed()).count()
    }

    /// Number of skipped items.
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i.outcome, ItemOutcome::Skipped { .. }))
            .count()
    }

    /// Number of failed items.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i.outcome, ItemOutcome::Failed { .. }))
            .count()
    }

    /// Whether the run finished with no failures and was not cancelled.
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.failed_count() == 0
    }

    /// One-line summary, e.g. `2 completed, 0 skipped, 1 failed`.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} completed, {} skipped, {} failed",
            self.completed_count(),
            self.skipped_count(),
            self.failed_count()
        );
        if self.cancelled {
            summary.push_str(" (cancelled)");
        }
        summary
    }
}

/// Drives batches through a metadata source, a downloader and an optional
/// transcoder.
#[derive(Debug)]
pub struct BatchOrchestrator<M, D, T> {
    metadata: M,
    downloader: D,
    transcoder: Option<T>,
}

impl<M, D, T> BatchOrchestrator<M, D, T>
where
    M: MetadataSource,
    D: MediaDownloader,
    T: MediaTranscoder,
{
    /// Create an orchestrator. Without a transcoder, compatibility mode is
    /// rejected.
    #[must_use]
    pub const fn new(metadata: M, downloader: D, transcoder: Option<T>) -> Self {
        Self {
            metadata,
            downloader,
            transcoder,
        }
    }

    /// The metadata source.
    #[must_use]
    pub const fn metadata_source(&self) -> &M {
        &self.metadata
    }

    /// The downloader.
    #[must_use]
    pub const fn downloader(&self) -> &D {
        &self.downloader
    }

    /// The transcoder, if one was configured.
    #[must_use]
    pub const fn transcoder(&self) -> Option<&T> {
        self.transcoder.as_ref()
    }

    /// Run one batch.
    ///
    /// `cached` is reused for the first item only, and only when it was
    /// fetched for that item's URL. `prompt` is asked at most once per run,
    /// on the first collision, unless `options` carries a decision.
    ///
    /// # Errors
    ///
    /// Fails before processing any item when `urls` holds no URL, or when
    /// compatibility mode is requested without a transcoder. Item failures
    /// and cancellation are reported in the returned [`BatchReport`].
    pub async fn run(
        &self,
        urls: &[String],
        options: &BatchOptions,
        cached: Option<&CachedMetadata>,
        prompt: &dyn CollisionPrompt,
        observer: &(dyn Fn(BatchEvent) + Send + Sync),
        cancel: &CancellationToken,
    ) -> Result<BatchReport> {
        let urls: Vec<&str> = urls
            .iter()
            .map(|u| u.trim())
            .filter(|u| !u.is_empty())
            .collect();
        if urls.is_empty() {
            return Err(Error::Config("No URLs to download".to_string()));
        }
        if options.compatibility_mode && self.transcoder.is_none() {
            return Err(Error::MissingDependency {
                tool: TRANSCODER_NAME.to_string(),
                path: PathBuf::from(TRANSCODER_NAME),
            });
        }

        let mut resolver = match options.collision_strategy {
            Some(strategy) => {
                CollisionResolver::with_decision(&options.output_directory, prompt, strategy)
            }
            None => CollisionResolver::new(&options.output_directory, prompt),
        };

        let total = urls.len();
        info!("Starting batch of {} item(s)", total);

        let mut report = BatchReport::default();
        for (index, url) in urls.into_iter().enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            observer(BatchEvent::ItemStarted {
                index,
                total,
                url: url.to_string(),
            });

            let cached = cached.filter(|c| index == 0 && c.matches(url));
            let outcome = match self
                .process_item(index, url, options, cached, &mut resolver, observer, cancel)
                .await
            {
                Ok(outcome) => outcome,
                Err(e) if e.is_cancelled() => {
                    warn!("Batch cancelled during item {}", index + 1);
                    report.cancelled = true;
                    ItemOutcome::Cancelled
                }
                Err(e) => {
                    error!("Item {} ({}) failed: {}", index + 1, url, e);
                    ItemOutcome::Failed {
                        message: e.to_string(),
                    }
                }
            };

            observer(BatchEvent::ItemFinished {
                index,
                outcome: outcome.clone(),
            });
            report.items.push(ItemReport {
                url: url.to_string(),
                outcome,
            });

            if report.cancelled {
                break;
            }
        }

        info!("Batch finished: {}", report.summary());
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_item(
        &self,
        index: usize,
        url: &str,
        options: &BatchOptions,
        cached: Option<&CachedMetadata>,
        resolver: &mut CollisionResolver<'_>,
        observer: &(dyn Fn(BatchEvent) + Send + Sync),
        cancel: &CancellationToken,
    ) -> Result<ItemOutcome> {
        let status = |message: &str| {
            observer(BatchEvent::Status {
                index,
                message: message.to_string(),
            });
        };

        let metadata = if let Some(cached) = cached {
            debug!("Reusing cached metadata for {}", url);
            cached.metadata.clone()
        } else {
            status("Fetching metadata");
            self.metadata.fetch_metadata(url, cancel).await?
        };

        let resolution = resolver.resolve(Some(&metadata));
        // The collision prompt may have been interrupted.
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let (output_template, strategy) = match resolution {
            Resolution::Proceed {
                output_template,
                strategy,
            } => (output_template, strategy),
            Resolution::Skip { existing } => {
                info!("Skipping {}: {} already exists", url, existing.display());
                return Ok(ItemOutcome::Skipped {
                    reason: format!("{} already exists", existing.display()),
                });
            }
        };

        let request = options.request_for(url, output_template, strategy, metadata.clone());
        let snapshot = OutputSnapshot::capture(&request.output_directory, &request.output_template)?;

        let sink = move |progress: DownloadProgress| {
            observer(BatchEvent::Progress { index, progress });
        };

        status(&format!("Downloading '{}'", metadata.title));
        self.downloader.download(&request, &sink, cancel).await?;

        let Some(downloaded) = snapshot.locate_output() else {
            warn!("Download of {} left no matching file", url);
            return Ok(ItemOutcome::Skipped {
                reason: "no output file was produced".to_string(),
            });
        };

        if request.compatibility_mode
            && let Some(transcoder) = &self.transcoder
        {
            status("Transcoding for Premiere");
            let output = transcoder
                .transcode(
                    &downloaded,
                    &request.output_directory,
                    &metadata,
                    &sink,
                    cancel,
                )
                .await?;
            return Ok(ItemOutcome::Completed { output });
        }

        sink(DownloadProgress::new(100, DownloadPhase::Completed, "Done"));
        Ok(ItemOutcome::Completed { output: downloaded })
    }
}
