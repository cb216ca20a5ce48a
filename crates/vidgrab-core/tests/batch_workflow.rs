//! Batch orchestration tests against in-process fakes of the external tools.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tempfile::TempDir;
use vidgrab_core::{
    BatchEvent, BatchOptions, BatchOrchestrator, CachedMetadata, CancellationToken,
    CollisionPrompt, CollisionStrategy, DownloadPhase, DownloadProgress, DownloadRequest, Error,
    ErrorKind, ItemOutcome, MediaDownloader, MediaTranscoder, MetadataSource, ProgressSink,
    Result, VideoMetadata,
};

// ============================================================================
// Fakes
// ============================================================================

#[derive(Default)]
struct FakeMetadata {
    failing: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeMetadata {
    fn failing(urls: &[&str]) -> Self {
        Self {
            failing: urls.iter().map(|u| (*u).to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

fn metadata_for(url: &str) -> VideoMetadata {
    let id = url.rsplit('=').next().unwrap_or(url);
    VideoMetadata::new(
        id,
        format!("Video {id}"),
        Duration::from_secs(100),
        "",
        Vec::new(),
    )
}

impl MetadataSource for FakeMetadata {
    async fn fetch_metadata(&self, url: &str, _cancel: &CancellationToken) -> Result<VideoMetadata> {
        self.calls.lock().unwrap().push(url.to_string());
        if self.failing.contains(url) {
            return Err(Error::MetadataParse("ERROR: Video unavailable".to_string()));
        }
        Ok(metadata_for(url))
    }
}

#[derive(Default)]
struct FakeDownloader {
    requests: Mutex<Vec<DownloadRequest>>,
    cancel_on: Option<(String, CancellationToken)>,
    produce_nothing: bool,
}

impl FakeDownloader {
    fn requests(&self) -> Vec<DownloadRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl MediaDownloader for FakeDownloader {
    async fn download(
        &self,
        request: &DownloadRequest,
        sink: &dyn ProgressSink,
        _cancel: &CancellationToken,
    ) -> Result<()> {
        self.requests.lock().unwrap().push(request.clone());
        sink.report(DownloadProgress::new(2, DownloadPhase::PreChecks, "Preparing"));

        if let Some((url, token)) = &self.cancel_on
            && *url == request.url
        {
            token.cancel();
            return Err(Error::Cancelled);
        }

        if !self.produce_nothing {
            fs::create_dir_all(&request.output_directory).unwrap();
            let name = request.output_template.replace("%(ext)s", "mp4");
            fs::write(request.output_directory.join(name), b"video").unwrap();
        }

        sink.report(DownloadProgress::new(
            40,
            DownloadPhase::Downloading,
            "[download]  54.0%",
        ));
        sink.report(DownloadProgress::new(
            70,
            DownloadPhase::Completed,
            "Download complete",
        ));
        Ok(())
    }
}

#[derive(Default)]
struct FakeTranscoder {
    inputs: Mutex<Vec<PathBuf>>,
}

impl MediaTranscoder for FakeTranscoder {
    async fn transcode(
        &self,
        input: &Path,
        output_directory: &Path,
        _metadata: &VideoMetadata,
        sink: &dyn ProgressSink,
        _cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        self.inputs.lock().unwrap().push(input.to_path_buf());
        let destination = vidgrab_core::transcoded_path(input, output_directory);
        fs::write(&destination, b"transcoded").unwrap();
        sink.report(DownloadProgress::new(
            85,
            DownloadPhase::Transcoding,
            "Transcoding for Premiere (00:00:50 / 00:01:40)",
        ));
        sink.report(DownloadProgress::new(
            100,
            DownloadPhase::Completed,
            "Transcoding complete",
        ));
        Ok(destination)
    }
}

struct CountingPrompt {
    answer: CollisionStrategy,
    calls: AtomicUsize,
}

impl CountingPrompt {
    fn new(answer: CollisionStrategy) -> Self {
        Self {
            answer,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CollisionPrompt for CountingPrompt {
    fn choose(&self, _existing: &Path) -> CollisionStrategy {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer
    }
}

/// Prompt whose question is interrupted by the run being cancelled.
struct InterruptedPrompt(CancellationToken);

impl CollisionPrompt for InterruptedPrompt {
    fn choose(&self, _existing: &Path) -> CollisionStrategy {
        self.0.cancel();
        CollisionStrategy::Skip
    }
}

#[derive(Default)]
struct EventLog {
    events: Mutex<Vec<BatchEvent>>,
}

impl EventLog {
    fn record(&self, event: BatchEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn progress_for(&self, item: usize) -> Vec<DownloadProgress> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                BatchEvent::Progress { index, progress } if *index == item => {
                    Some(progress.clone())
                }
                _ => None,
            })
            .collect()
    }

    fn count(&self, predicate: impl Fn(&BatchEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| predicate(*e)).count()
    }
}

fn urls(items: &[&str]) -> Vec<String> {
    items.iter().map(|u| (*u).to_string()).collect()
}

fn touch(dir: &Path, name: &str) {
    fs::write(dir.join(name), b"existing").unwrap();
}

type Orchestrator = BatchOrchestrator<FakeMetadata, FakeDownloader, FakeTranscoder>;

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_failed_metadata_does_not_stop_batch() {
    let dir = TempDir::new().unwrap();
    let orchestrator: Orchestrator = BatchOrchestrator::new(
        FakeMetadata::failing(&["https://v.example/watch?v=b"]),
        FakeDownloader::default(),
        None,
    );
    let prompt = CountingPrompt::new(CollisionStrategy::AutoRename);
    let log = EventLog::default();

    let report = orchestrator
        .run(
            &urls(&[
                "https://v.example/watch?v=a",
                "https://v.example/watch?v=b",
                "https://v.example/watch?v=c",
            ]),
            &BatchOptions::new(dir.path()),
            None,
            &prompt,
            &|e| log.record(e),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(!report.cancelled);
    assert_eq!(report.items.len(), 3);
    assert_eq!(report.completed_count(), 2);
    assert_eq!(report.failed_count(), 1);
    assert_eq!(report.summary(), "2 completed, 0 skipped, 1 failed");

    let order: Vec<&str> = report.items.iter().map(|i| i.url.as_str()).collect();
    assert_eq!(
        order,
        [
            "https://v.example/watch?v=a",
            "https://v.example/watch?v=b",
            "https://v.example/watch?v=c",
        ]
    );
    assert!(matches!(
        &report.items[1].outcome,
        ItemOutcome::Failed { message } if message.contains("Video unavailable")
    ));
    assert_eq!(
        report.items[0].outcome,
        ItemOutcome::Completed {
            output: dir.path().join("Video a [a].mp4"),
        }
    );
    assert!(dir.path().join("Video c [c].mp4").exists());

    assert_eq!(
        log.count(|e| matches!(e, BatchEvent::ItemStarted { total: 3, .. })),
        3
    );
    assert_eq!(
        log.count(|e| matches!(e, BatchEvent::ItemFinished { .. })),
        3
    );
    assert_eq!(orchestrator.downloader().requests().len(), 2);
    assert_eq!(prompt.calls(), 0);
}

#[tokio::test]
async fn test_skip_decision_is_sticky_for_the_run() {
    let dir = TempDir::new().unwrap();
    touch(dir.path(), "Video a [a].mp4");
    touch(dir.path(), "Video b [b].webm");

    let orchestrator: Orchestrator =
        BatchOrchestrator::new(FakeMetadata::default(), FakeDownloader::default(), None);
    let prompt = CountingPrompt::new(CollisionStrategy::Skip);

    let report = orchestrator
        .run(
            &urls(&[
                "https://v.example/watch?v=a",
                "https://v.example/watch?v=b",
                "https://v.example/watch?v=c",
            ]),
            &BatchOptions::new(dir.path()),
            None,
            &prompt,
            &|_| {},
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(prompt.calls(), 1);
    assert_eq!(report.skipped_count(), 2);
    assert_eq!(report.completed_count(), 1);

    let requests = orchestrator.downloader().requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "https://v.example/watch?v=c");
    // The sticky decision also travels to the downloader for later items.
    assert_eq!(requests[0].collision_strategy, CollisionStrategy::Skip);
}

#[tokio::test]
async fn test_auto_rename_picks_next_free_suffix() {
    let dir = TempDir::new().unwrap();
    touch(dir.path(), "Video a [a].mp4");
    touch(dir.path(), "Video a [a] (1).mp4");

    let orchestrator: Orchestrator =
        BatchOrchestrator::new(FakeMetadata::default(), FakeDownloader::default(), None);
    let prompt = CountingPrompt::new(CollisionStrategy::AutoRename);

    let report = orchestrator
        .run(
            &urls(&["https://v.example/watch?v=a"]),
            &BatchOptions::new(dir.path()),
            None,
            &prompt,
            &|_| {},
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let requests = orchestrator.downloader().requests();
    assert_eq!(requests[0].output_template, "Video a [a] (2).%(ext)s");
    assert_eq!(requests[0].collision_strategy, CollisionStrategy::AutoRename);
    assert_eq!(
        report.items[0].outcome,
        ItemOutcome::Completed {
            output: dir.path().join("Video a [a] (2).mp4"),
        }
    );
}

#[tokio::test]
async fn test_preset_strategy_never_prompts() {
    let dir = TempDir::new().unwrap();
    touch(dir.path(), "Video a [a].mp4");

    let orchestrator: Orchestrator =
        BatchOrchestrator::new(FakeMetadata::default(), FakeDownloader::default(), None);
    let prompt = CountingPrompt::new(CollisionStrategy::Skip);
    let mut options = BatchOptions::new(dir.path());
    options.collision_strategy = Some(CollisionStrategy::Overwrite);

    let report = orchestrator
        .run(
            &urls(&["https://v.example/watch?v=a"]),
            &options,
            None,
            &prompt,
            &|_| {},
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(prompt.calls(), 0);
    assert_eq!(report.completed_count(), 1);
    let requests = orchestrator.downloader().requests();
    assert_eq!(requests[0].output_template, "Video a [a].%(ext)s");
    assert_eq!(requests[0].collision_strategy, CollisionStrategy::Overwrite);
}

#[tokio::test]
async fn test_cached_metadata_reused_only_for_matching_first_item() {
    let dir = TempDir::new().unwrap();
    let orchestrator: Orchestrator =
        BatchOrchestrator::new(FakeMetadata::default(), FakeDownloader::default(), None);
    let prompt = CountingPrompt::new(CollisionStrategy::AutoRename);
    let cached = CachedMetadata::new(
        "HTTPS://V.EXAMPLE/watch?v=a",
        metadata_for("https://v.example/watch?v=a"),
    );

    orchestrator
        .run(
            &urls(&["https://v.example/watch?v=a", "https://v.example/watch?v=a2"]),
            &BatchOptions::new(dir.path()),
            Some(&cached),
            &prompt,
            &|_| {},
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        orchestrator.metadata_source().calls(),
        ["https://v.example/watch?v=a2"]
    );
}

#[tokio::test]
async fn test_cached_metadata_for_other_url_is_ignored() {
    let dir = TempDir::new().unwrap();
    let orchestrator: Orchestrator =
        BatchOrchestrator::new(FakeMetadata::default(), FakeDownloader::default(), None);
    let prompt = CountingPrompt::new(CollisionStrategy::AutoRename);
    let cached = CachedMetadata::new(
        "https://v.example/watch?v=z",
        metadata_for("https://v.example/watch?v=z"),
    );

    orchestrator
        .run(
            &urls(&["https://v.example/watch?v=a"]),
            &BatchOptions::new(dir.path()),
            Some(&cached),
            &prompt,
            &|_| {},
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        orchestrator.metadata_source().calls(),
        ["https://v.example/watch?v=a"]
    );
}

#[tokio::test]
async fn test_cancellation_halts_remaining_items() {
    let dir = TempDir::new().unwrap();
    let token = CancellationToken::new();
    let downloader = FakeDownloader {
        cancel_on: Some(("https://v.example/watch?v=b".to_string(), token.clone())),
        ..Default::default()
    };
    let orchestrator: Orchestrator =
        BatchOrchestrator::new(FakeMetadata::default(), downloader, None);
    let prompt = CountingPrompt::new(CollisionStrategy::AutoRename);

    let report = orchestrator
        .run(
            &urls(&[
                "https://v.example/watch?v=a",
                "https://v.example/watch?v=b",
                "https://v.example/watch?v=c",
            ]),
            &BatchOptions::new(dir.path()),
            None,
            &prompt,
            &|_| {},
            &token,
        )
        .await
        .unwrap();

    assert!(report.cancelled);
    assert!(!report.is_success());
    assert_eq!(report.items.len(), 2);
    assert!(report.items[0].outcome.is_completed());
    assert_eq!(report.items[1].outcome, ItemOutcome::Cancelled);
    assert_eq!(
        orchestrator.metadata_source().calls(),
        ["https://v.example/watch?v=a", "https://v.example/watch?v=b"]
    );
}

#[tokio::test]
async fn test_cancel_during_collision_prompt_stops_item() {
    let dir = TempDir::new().unwrap();
    touch(dir.path(), "Video a [a].mp4");
    let token = CancellationToken::new();
    let orchestrator: Orchestrator =
        BatchOrchestrator::new(FakeMetadata::default(), FakeDownloader::default(), None);

    let report = orchestrator
        .run(
            &urls(&["https://v.example/watch?v=a", "https://v.example/watch?v=b"]),
            &BatchOptions::new(dir.path()),
            None,
            &InterruptedPrompt(token.clone()),
            &|_| {},
            &token,
        )
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.items.len(), 1);
    assert_eq!(report.items[0].outcome, ItemOutcome::Cancelled);
    assert!(orchestrator.downloader().requests().is_empty());
    assert!(dir.path().join("Video a [a].mp4").exists());
}

#[tokio::test]
async fn test_cancelled_before_start_runs_nothing() {
    let dir = TempDir::new().unwrap();
    let token = CancellationToken::new();
    token.cancel();
    let orchestrator: Orchestrator =
        BatchOrchestrator::new(FakeMetadata::default(), FakeDownloader::default(), None);

    let report = orchestrator
        .run(
            &urls(&["https://v.example/watch?v=a"]),
            &BatchOptions::new(dir.path()),
            None,
            &CountingPrompt::new(CollisionStrategy::AutoRename),
            &|_| {},
            &token,
        )
        .await
        .unwrap();

    assert!(report.cancelled);
    assert!(report.items.is_empty());
    assert!(orchestrator.metadata_source().calls().is_empty());
}

#[tokio::test]
async fn test_compatibility_mode_transcodes_download() {
    let dir = TempDir::new().unwrap();
    let orchestrator: Orchestrator = BatchOrchestrator::new(
        FakeMetadata::default(),
        FakeDownloader::default(),
        Some(FakeTranscoder::default()),
    );
    let log = EventLog::default();
    let mut options = BatchOptions::new(dir.path());
    options.compatibility_mode = true;

    let report = orchestrator
        .run(
            &urls(&["https://v.example/watch?v=a"]),
            &options,
            None,
            &CountingPrompt::new(CollisionStrategy::AutoRename),
            &|e| log.record(e),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        report.items[0].outcome,
        ItemOutcome::Completed {
            output: dir.path().join("Video a [a].premiere.mp4"),
        }
    );
    assert_eq!(
        orchestrator.transcoder().unwrap().inputs.lock().unwrap().clone(),
        [dir.path().join("Video a [a].mp4")]
    );

    let progress = log.progress_for(0);
    let percents: Vec<u8> = progress.iter().map(|p| p.percent).collect();
    assert_eq!(percents, [2, 40, 70, 85, 100]);
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(progress.last().unwrap().phase, DownloadPhase::Completed);
}

#[tokio::test]
async fn test_progress_is_monotonic_without_transcode() {
    let dir = TempDir::new().unwrap();
    let orchestrator: Orchestrator =
        BatchOrchestrator::new(FakeMetadata::default(), FakeDownloader::default(), None);
    let log = EventLog::default();

    orchestrator
        .run(
            &urls(&["https://v.example/watch?v=a"]),
            &BatchOptions::new(dir.path()),
            None,
            &CountingPrompt::new(CollisionStrategy::AutoRename),
            &|e| log.record(e),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let percents: Vec<u8> = log.progress_for(0).iter().map(|p| p.percent).collect();
    assert_eq!(percents, [2, 40, 70, 100]);
}

#[tokio::test]
async fn test_compatibility_mode_requires_transcoder() {
    let dir = TempDir::new().unwrap();
    let orchestrator: Orchestrator =
        BatchOrchestrator::new(FakeMetadata::default(), FakeDownloader::default(), None);
    let mut options = BatchOptions::new(dir.path());
    options.compatibility_mode = true;

    let err = orchestrator
        .run(
            &urls(&["https://v.example/watch?v=a"]),
            &options,
            None,
            &CountingPrompt::new(CollisionStrategy::AutoRename),
            &|_| {},
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MissingDependency);
    assert!(orchestrator.metadata_source().calls().is_empty());
}

#[tokio::test]
async fn test_missing_output_is_skipped_not_completed() {
    let dir = TempDir::new().unwrap();
    let downloader = FakeDownloader {
        produce_nothing: true,
        ..Default::default()
    };
    let orchestrator: Orchestrator =
        BatchOrchestrator::new(FakeMetadata::default(), downloader, None);

    let report = orchestrator
        .run(
            &urls(&["https://v.example/watch?v=a"]),
            &BatchOptions::new(dir.path()),
            None,
            &CountingPrompt::new(CollisionStrategy::AutoRename),
            &|_| {},
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        report.items[0].outcome,
        ItemOutcome::Skipped {
            reason: "no output file was produced".to_string(),
        }
    );
}

#[tokio::test]
async fn test_blank_url_list_is_rejected() {
    let dir = TempDir::new().unwrap();
    let orchestrator: Orchestrator =
        BatchOrchestrator::new(FakeMetadata::default(), FakeDownloader::default(), None);

    let err = orchestrator
        .run(
            &urls(&["", "   "]),
            &BatchOptions::new(dir.path()),
            None,
            &CountingPrompt::new(CollisionStrategy::AutoRename),
            &|_| {},
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Config(_)));
}
