/// Integration tests for autotidy
///
/// These tests run a real engine against a temporary folder and observe the
/// outcome stream, covering the complete path from filesystem event to moved
/// file.
///
/// Test categories:
/// 1. Basic organization and duplicate policies
/// 2. Download-style arrivals (partial files, growing files)
/// 3. Lifecycle: stop, catch-up, faults
/// 4. Host configuration to running engine
use autotidy::category_rules::{CategoryRule, CategoryRules};
use autotidy::config::AppConfig;
use autotidy::conflict::DuplicatePolicy;
use autotidy::engine::{EngineStatus, WatcherEngine};
use autotidy::mover::FailureReason;
use autotidy::outcome::{MoveOutcome, OutcomeKind};
use autotidy::watch_config::WatchConfig;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::time::{sleep, timeout};

// ============================================================================
// Test Utilities
// ============================================================================

const OUTCOME_TIMEOUT: Duration = Duration::from_secs(15);

/// A temporary source folder with image and video categories inside it.
struct TestFixture {
    _temp_dir: TempDir,
    root: PathBuf,
}

impl TestFixture {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        // The engine reports canonical paths.
        let root = fs::canonicalize(temp_dir.path()).expect("Failed to canonicalize temp dir");
        TestFixture {
            _temp_dir: temp_dir,
            root,
        }
    }

    fn path(&self) -> &Path {
        &self.root
    }

    fn join(&self, rel_path: &str) -> PathBuf {
        self.root.join(rel_path)
    }

    fn create_text_file(&self, rel_path: &str, content: &str) {
        fs::write(self.join(rel_path), content).expect("Failed to write file content");
    }

    fn read(&self, rel_path: &str) -> String {
        fs::read_to_string(self.join(rel_path)).expect("Failed to read file")
    }

    fn rules(&self) -> CategoryRules {
        CategoryRules::new(vec![
            CategoryRule::new("Images", self.join("img"), ["jpg", "png"]),
            CategoryRule::new("Videos", self.join("videos"), ["mkv", "mp4"]),
        ])
    }

    /// Config with short timings so tests finish quickly.
    fn config(&self) -> WatchConfig {
        WatchConfig::new(self.path(), self.rules())
            .with_timing(Duration::from_millis(200), Duration::from_millis(50))
    }

    fn assert_file_exists(&self, rel_path: &str) {
        let path = self.join(rel_path);
        assert!(path.is_file(), "File should exist: {}", path.display());
    }

    fn assert_file_not_exists(&self, rel_path: &str) {
        let path = self.join(rel_path);
        assert!(!path.exists(), "File should not exist: {}", path.display());
    }
}

async fn start(config: WatchConfig) -> (WatcherEngine, broadcast::Receiver<MoveOutcome>) {
    let engine = WatcherEngine::new();
    let outcomes = engine.subscribe();
    engine.start(config).await.expect("Failed to start engine");
    (engine, outcomes)
}

async fn next_outcome(outcomes: &mut broadcast::Receiver<MoveOutcome>) -> MoveOutcome {
    timeout(OUTCOME_TIMEOUT, outcomes.recv())
        .await
        .expect("Timed out waiting for an outcome")
        .expect("Outcome channel closed")
}

async fn assert_quiet_for(outcomes: &mut broadcast::Receiver<MoveOutcome>, period: Duration) {
    if let Ok(received) = timeout(period, outcomes.recv()).await {
        panic!("Expected no outcome, got {:?}", received);
    }
}

fn digest(bytes: &[u8]) -> Vec<u8> {
    Sha256::digest(bytes).to_vec()
}

// ============================================================================
// 1. Basic organization and duplicate policies
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_new_file_is_moved_then_second_copy_is_renamed() {
    let fixture = TestFixture::new();
    let (engine, mut outcomes) = start(fixture.config()).await;

    fixture.create_text_file("a.jpg", "first");
    let first = next_outcome(&mut outcomes).await;
    assert_eq!(first.result, OutcomeKind::Moved);
    assert_eq!(first.source, fixture.join("a.jpg"));
    assert_eq!(first.destination, Some(fixture.join("img/a.jpg")));
    assert_eq!(first.category.as_deref(), Some("Images"));

    fixture.create_text_file("a.jpg", "second");
    let second = next_outcome(&mut outcomes).await;
    assert_eq!(second.result, OutcomeKind::Moved);
    assert_eq!(second.destination, Some(fixture.join("img/a(1).jpg")));

    engine.stop().await.expect("Failed to stop");
    assert_eq!(fixture.read("img/a.jpg"), "first");
    assert_eq!(fixture.read("img/a(1).jpg"), "second");
    fixture.assert_file_not_exists("a.jpg");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_skip_policy_leaves_source_untouched() {
    let fixture = TestFixture::new();
    fs::create_dir(fixture.join("img")).unwrap();
    fixture.create_text_file("img/a.jpg", "already here");
    let config = fixture.config().with_duplicate_policy(DuplicatePolicy::Skip);
    let (engine, mut outcomes) = start(config).await;

    fixture.create_text_file("a.jpg", "incoming");
    let outcome = next_outcome(&mut outcomes).await;

    assert_eq!(outcome.result, OutcomeKind::SkippedDuplicate);
    assert_eq!(outcome.destination, None);
    assert_eq!(fixture.read("a.jpg"), "incoming");
    assert_eq!(fixture.read("img/a.jpg"), "already here");
    engine.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_overwrite_policy_replaces_existing_file() {
    let fixture = TestFixture::new();
    fs::create_dir(fixture.join("img")).unwrap();
    fixture.create_text_file("img/a.jpg", "old");
    let config = fixture
        .config()
        .with_duplicate_policy(DuplicatePolicy::Overwrite);
    let (engine, mut outcomes) = start(config).await;

    fixture.create_text_file("a.jpg", "new");
    let outcome = next_outcome(&mut outcomes).await;

    assert!(outcome.is_moved());
    assert_eq!(outcome.destination, Some(fixture.join("img/a.jpg")));
    assert_eq!(fixture.read("img/a.jpg"), "new");
    engine.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_repeated_names_land_at_distinct_destinations_with_same_content() {
    let fixture = TestFixture::new();
    let (engine, mut outcomes) = start(fixture.config()).await;

    let mut expected = Vec::new();
    for i in 0..5 {
        let content = format!("photo number {} {}", i, "x".repeat(i * 100));
        fixture.create_text_file("a.jpg", &content);
        let outcome = next_outcome(&mut outcomes).await;
        assert!(outcome.is_moved(), "unexpected outcome {:?}", outcome);
        expected.push((outcome.destination.unwrap(), digest(content.as_bytes())));
    }
    engine.stop().await.unwrap();

    let mut names: Vec<&PathBuf> = expected.iter().map(|(path, _)| path).collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), 5);

    for (path, hash) in &expected {
        let stored = fs::read(path).expect("Destination missing");
        assert_eq!(&digest(&stored), hash, "content changed for {}", path.display());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unmatched_file_is_left_in_place_without_fallback() {
    let fixture = TestFixture::new();
    let (engine, mut outcomes) = start(fixture.config()).await;

    fixture.create_text_file("notes.xyz", "?");
    let outcome = next_outcome(&mut outcomes).await;

    assert_eq!(outcome.result, OutcomeKind::SkippedUnmatched);
    fixture.assert_file_exists("notes.xyz");
    engine.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unmatched_file_goes_to_fallback_folder() {
    let fixture = TestFixture::new();
    let config = fixture.config().with_fallback(fixture.join("other"));
    let (engine, mut outcomes) = start(config).await;

    fixture.create_text_file("Makefile", "all:");
    let outcome = next_outcome(&mut outcomes).await;

    assert!(outcome.is_moved());
    assert_eq!(outcome.category.as_deref(), Some("Others"));
    fixture.assert_file_exists("other/Makefile");
    engine.stop().await.unwrap();
}

// ============================================================================
// 2. Download-style arrivals
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_partial_download_is_organized_after_final_rename() {
    let fixture = TestFixture::new();
    let (engine, mut outcomes) = start(fixture.config()).await;

    fixture.create_text_file("movie.mkv.part", "frames");
    assert_quiet_for(&mut outcomes, Duration::from_millis(600)).await;
    fixture.assert_file_exists("movie.mkv.part");

    fs::rename(fixture.join("movie.mkv.part"), fixture.join("movie.mkv")).unwrap();
    let outcome = next_outcome(&mut outcomes).await;

    assert_eq!(outcome.source, fixture.join("movie.mkv"));
    assert_eq!(outcome.destination, Some(fixture.join("videos/movie.mkv")));
    assert_eq!(fixture.read("videos/movie.mkv"), "frames");
    engine.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_growing_file_is_moved_only_after_writes_stop() {
    let fixture = TestFixture::new();
    let (engine, mut outcomes) = start(fixture.config()).await;

    let path = fixture.join("clip.mp4");
    let writer = thread::spawn(move || {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .expect("Failed to open file");
        for _ in 0..10 {
            file.write_all(b"0123456789").expect("Failed to append");
            file.flush().expect("Failed to flush");
            thread::sleep(Duration::from_millis(60));
        }
    });

    let outcome = next_outcome(&mut outcomes).await;
    writer.join().unwrap();

    assert!(outcome.is_moved());
    assert_eq!(fixture.read("videos/clip.mp4").len(), 100);
    engine.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_file_that_never_settles_fails() {
    let fixture = TestFixture::new();
    let mut config = fixture.config();
    config.max_wait = Duration::from_millis(800);
    let (engine, mut outcomes) = start(config).await;

    let path = fixture.join("stream.mp4");
    let writer = thread::spawn(move || {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .expect("Failed to open file");
        for _ in 0..40 {
            file.write_all(b"more").expect("Failed to append");
            thread::sleep(Duration::from_millis(50));
        }
    });

    let outcome = next_outcome(&mut outcomes).await;
    writer.join().unwrap();

    assert_eq!(outcome.failure(), Some(&FailureReason::NeverStabilized));
    fixture.assert_file_exists("stream.mp4");
    engine.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ignored_files_and_folders_produce_no_outcome() {
    let fixture = TestFixture::new();
    let (engine, mut outcomes) = start(fixture.config()).await;

    fixture.create_text_file("setup.exe.crdownload", "bytes");
    fixture.create_text_file(".hidden.jpg", "bytes");
    fs::create_dir(fixture.join("holiday.jpg")).unwrap();

    assert_quiet_for(&mut outcomes, Duration::from_millis(800)).await;
    fixture.assert_file_exists("setup.exe.crdownload");
    fixture.assert_file_exists(".hidden.jpg");
    engine.stop().await.unwrap();
}

// ============================================================================
// 3. Lifecycle
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_stop_during_stability_wait_emits_nothing() {
    let fixture = TestFixture::new();
    let config = fixture
        .config()
        .with_timing(Duration::from_secs(5), Duration::from_millis(50));
    let (engine, mut outcomes) = start(config).await;

    fixture.create_text_file("a.jpg", "still settling");
    sleep(Duration::from_millis(300)).await;
    engine.stop().await.expect("Failed to stop");

    assert_eq!(engine.status(), EngineStatus::Stopped);
    assert!(matches!(outcomes.try_recv(), Err(TryRecvError::Empty)));
    sleep(Duration::from_millis(300)).await;
    assert!(matches!(outcomes.try_recv(), Err(TryRecvError::Empty)));
    fixture.assert_file_exists("a.jpg");
    fixture.assert_file_not_exists("img/a.jpg");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_catch_up_organizes_existing_files() {
    let fixture = TestFixture::new();
    fixture.create_text_file("before.png", "pixels");
    let (engine, mut outcomes) = start(fixture.config().with_catch_up(true)).await;

    let outcome = next_outcome(&mut outcomes).await;

    assert_eq!(outcome.destination, Some(fixture.join("img/before.png")));
    engine.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_existing_files_are_ignored_without_catch_up() {
    let fixture = TestFixture::new();
    fixture.create_text_file("before.png", "pixels");
    let (engine, mut outcomes) = start(fixture.config()).await;

    assert_quiet_for(&mut outcomes, Duration::from_millis(800)).await;
    fixture.assert_file_exists("before.png");
    engine.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_removing_source_folder_faults_engine() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let source = temp_dir.path().join("inbox");
    fs::create_dir(&source).unwrap();
    let rules = CategoryRules::new(vec![CategoryRule::new(
        "Images",
        temp_dir.path().join("img"),
        ["jpg"],
    )]);
    let config = WatchConfig::new(&source, rules)
        .with_timing(Duration::from_millis(200), Duration::from_millis(50));
    let (engine, _outcomes) = start(config).await;
    let mut status = engine.watch_status();

    fs::remove_dir(&source).unwrap();
    timeout(
        OUTCOME_TIMEOUT,
        status.wait_for(|status| *status == EngineStatus::Faulted),
    )
    .await
    .expect("Engine never faulted")
    .expect("Status channel closed");

    engine.stop().await.expect("Failed to stop faulted engine");
    assert_eq!(engine.status(), EngineStatus::Stopped);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_independent_engines_do_not_interfere() {
    let first = TestFixture::new();
    let second = TestFixture::new();
    let (engine_a, mut outcomes_a) = start(first.config()).await;
    let (engine_b, mut outcomes_b) = start(second.config()).await;

    first.create_text_file("a.jpg", "one");
    second.create_text_file("b.png", "two");

    let a = next_outcome(&mut outcomes_a).await;
    let b = next_outcome(&mut outcomes_b).await;
    assert_eq!(a.destination, Some(first.join("img/a.jpg")));
    assert_eq!(b.destination, Some(second.join("img/b.png")));

    engine_a.stop().await.unwrap();
    engine_b.stop().await.unwrap();
}

// ============================================================================
// 4. Host configuration to running engine
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_config_file_drives_engine() {
    let fixture = TestFixture::new();
    let config_path = fixture.join("settings").join("autotidy.toml");
    fs::create_dir(fixture.join("settings")).unwrap();
    fs::write(
        &config_path,
        format!(
            r#"
source = "{source}"
duplicates = "rename"

[timing]
quiescence_ms = 200
poll_interval_ms = 50

[rename]
template = "{{stem}}_{{n}}{{ext}}"

[[categories]]
name = "Documents"
folder = "{docs}"
extensions = ["pdf", "TXT"]
"#,
            source = fixture.path().display(),
            docs = fixture.join("docs").display(),
        ),
    )
    .unwrap();
    fs::create_dir(fixture.join("docs")).unwrap();
    fixture.create_text_file("docs/report.txt", "older");

    let config = AppConfig::load(Some(&config_path))
        .unwrap()
        .into_watch_config()
        .unwrap();
    let (engine, mut outcomes) = start(config).await;

    fixture.create_text_file("report.txt", "newer");
    let outcome = next_outcome(&mut outcomes).await;

    assert_eq!(outcome.destination, Some(fixture.join("docs/report_1.txt")));
    assert_eq!(outcome.category.as_deref(), Some("Documents"));
    engine.stop().await.unwrap();
}
