//! End-to-end pipeline runs against in-memory store and converter fakes.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tempfile::TempDir;
use tokio_test::assert_ok;

use traj_ledger::{Bucket, LedgerGuard, WorkCache};
use traj_media::{
    fused_output_path, stereo_output_path, ArtifactConverter, ConversionMode, MediaError,
    MediaResult,
};
use traj_models::KeyOutcome;
use traj_storage::{RemoteStore, StorageError, StorageResult};
use traj_worker::{ConversionPipeline, PipelineConfig, PipelineVariant, WorkSelection};

const KEY_1: &str = "lab-uploads-json/IRIS_t1_a.json";
const KEY_2: &str = "lab-uploads-json/IRIS_t2_a.json";
const KEY_3: &str = "lab-uploads-json/IRIS_t3_a.json";

#[derive(Default)]
struct FakeStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    uploaded: Mutex<Vec<String>>,
    downloads: AtomicUsize,
    failing_uploads: HashSet<String>,
    blocking_keys: HashSet<String>,
}

impl FakeStore {
    fn put(&self, key: &str, bytes: &[u8]) {
        self.objects.lock().unwrap().insert(key.to_string(), bytes.to_vec());
    }

    fn remove(&self, key: &str) {
        self.objects.lock().unwrap().remove(key);
    }

    fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    fn uploaded(&self) -> Vec<String> {
        self.uploaded.lock().unwrap().clone()
    }

    fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    /// Metadata plus the raw files of all three views for trajectory `id`.
    fn add_trajectory(&self, key: &str, id: &str, success: bool) {
        let record = format!(
            r#"{{"success": {success}, "lab": "IRIS",
                "left_mp4_path": "success/{id}/recordings/MP4/L.mp4",
                "right_mp4_path": "success/{id}/recordings/MP4/R.mp4",
                "wrist_mp4_path": "success/{id}/recordings/MP4/W.mp4"}}"#
        );
        self.put(key, record.as_bytes());
        for cam in ["L", "R", "W"] {
            self.put(&format!("lab-uploads/IRIS/success/{id}/recordings/MP4/{cam}.mp4"), b"mp4");
            self.put(&format!("lab-uploads/IRIS/success/{id}/recordings/SVO/{cam}.svo"), b"svo");
        }
    }
}

#[async_trait]
impl RemoteStore for FakeStore {
    fn list<'a>(&'a self, prefix: &'a str) -> BoxStream<'a, StorageResult<String>> {
        let keys: Vec<String> = self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        stream::iter(keys).map(Ok).boxed()
    }

    async fn get_object(&self, key: &str) -> StorageResult<Vec<u8>> {
        if self.blocking_keys.contains(key) {
            std::future::pending::<()>().await;
        }
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::not_found(key))
    }

    async fn download(&self, key: &str, local_path: &Path) -> StorageResult<()> {
        let bytes = self.get_object(key).await?;
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local_path, bytes).await?;
        Ok(())
    }

    async fn upload(&self, local_path: &Path, key: &str) -> StorageResult<()> {
        if self.failing_uploads.contains(key) {
            return Err(StorageError::upload_failed(format!("AccessDenied: {}", key)));
        }
        let bytes = tokio::fs::read(local_path).await?;
        self.put(key, &bytes);
        self.uploaded.lock().unwrap().push(key.to_string());
        Ok(())
    }

    async fn copy(&self, src_key: &str, dst_key: &str) -> StorageResult<()> {
        let bytes = self.get_object(src_key).await?;
        self.put(dst_key, &bytes);
        Ok(())
    }
}

/// Writes the expected output files without running any tool.
#[derive(Default)]
struct FakeConverter {
    /// Input file stems whose conversion fails
    failing_stems: HashSet<String>,
    /// 1-based call numbers that fail
    failing_calls: HashSet<usize>,
    /// 1-based call numbers that panic
    panicking_calls: HashSet<usize>,
    /// Write and report these file names instead of the tool's usual output
    output_names: Option<Vec<&'static str>>,
    /// Report success without writing output
    silent: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

#[async_trait]
impl ArtifactConverter for FakeConverter {
    async fn convert(
        &self,
        inputs: &[PathBuf],
        output_dir: &Path,
        mode: ConversionMode,
    ) -> MediaResult<Vec<PathBuf>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.panicking_calls.contains(&call) {
            panic!("decoder crashed on call {call}");
        }
        if self.failing_calls.contains(&call) {
            return Err(MediaError::tool_failed("ffmpeg", "corrupt stream", None, Some(1)));
        }
        for input in inputs {
            let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            if self.failing_stems.contains(stem) {
                return Err(MediaError::tool_failed("svo-export", "bad frame", None, Some(1)));
            }
        }

        let outputs = match &self.output_names {
            Some(names) => names.iter().map(|name| output_dir.join(name)).collect(),
            None => vec![match mode {
                ConversionMode::FusedTwoView => fused_output_path(output_dir),
                ConversionMode::StereoSideBySide => stereo_output_path(&inputs[0], output_dir)?,
            }],
        };
        if !self.silent {
            for output in &outputs {
                tokio::fs::write(output, b"derived").await?;
            }
        }
        Ok(outputs)
    }
}

struct Harness {
    _dir: TempDir,
    ledger_path: PathBuf,
    pipeline: ConversionPipeline<FakeStore, FakeConverter>,
}

impl Harness {
    fn new(variant: PipelineVariant, store: FakeStore, converter: FakeConverter, keys: &[&str]) -> Self {
        Self::with_config(variant, store, converter, keys, |config| config)
    }

    fn with_config(
        variant: PipelineVariant,
        store: FakeStore,
        converter: FakeConverter,
        keys: &[&str],
        configure: impl FnOnce(PipelineConfig) -> PipelineConfig,
    ) -> Self {
        let dir = TempDir::new().unwrap();
        let ledger_path = dir.path().join("ledger.json");

        let mut cache = WorkCache::new();
        cache.rebuild(keys.iter().copied()).unwrap();
        cache.persist(&ledger_path).unwrap();

        let config = PipelineConfig::for_variant(variant)
            .with_scratch_dir(dir.path().join("scratch"))
            .with_timeouts(Duration::from_secs(5), Duration::from_secs(5));

        Self {
            pipeline: ConversionPipeline::new(store, converter, configure(config), variant),
            ledger_path,
            _dir: dir,
        }
    }

    fn store(&self) -> &FakeStore {
        self.pipeline.store()
    }

    fn open_ledger(&self) -> LedgerGuard {
        LedgerGuard::open(&self.ledger_path).unwrap()
    }

    fn ledger_on_disk(&self) -> WorkCache {
        WorkCache::load(&self.ledger_path).unwrap()
    }

    async fn run(&self, selection: WorkSelection) -> traj_worker::RunSummary {
        let mut ledger = self.open_ledger();
        assert_ok!(self.pipeline.run(&mut ledger, selection).await)
    }
}

fn three_trajectories() -> FakeStore {
    let store = FakeStore::default();
    store.add_trajectory(KEY_1, "t1", true);
    store.add_trajectory(KEY_2, "t2", true);
    store.add_trajectory(KEY_3, "t3", true);
    store
}

#[tokio::test]
async fn stitch_exports_fused_video_per_trajectory() {
    let store = FakeStore::default();
    store.add_trajectory(KEY_1, "t1", true);
    let harness = Harness::new(PipelineVariant::Stitch, store, FakeConverter::default(), &[KEY_1]);

    let summary = harness.run(WorkSelection::Pending).await;

    assert_eq!(summary.selected, 1);
    assert_eq!(summary.progress.succeeded, 1);
    assert_eq!(harness.store().uploaded(), vec!["fused-annotation-mp4s/t1.mp4"]);
    assert_eq!(harness.store().downloads(), 2);
    assert_eq!(harness.ledger_on_disk().status_of(KEY_1), Some(Bucket::Exported));
}

#[tokio::test]
async fn second_run_is_a_no_op() {
    let harness = Harness::new(
        PipelineVariant::Stitch,
        three_trajectories(),
        FakeConverter::default(),
        &[KEY_1, KEY_2, KEY_3],
    );

    harness.run(WorkSelection::Pending).await;
    let after_first = harness.ledger_on_disk();
    let uploads_after_first = harness.store().uploaded().len();

    let summary = harness.run(WorkSelection::Pending).await;

    assert_eq!(summary.selected, 0);
    assert_eq!(harness.store().uploaded().len(), uploads_after_first);
    assert_eq!(harness.ledger_on_disk(), after_first);
}

#[tokio::test]
async fn failing_key_does_not_stop_the_run() {
    let store = three_trajectories();
    store.remove("lab-uploads/IRIS/success/t2/recordings/MP4/R.mp4");
    let harness = Harness::new(
        PipelineVariant::Stitch,
        store,
        FakeConverter::default(),
        &[KEY_1, KEY_2, KEY_3],
    );

    let summary = harness.run(WorkSelection::Pending).await;

    assert_eq!(summary.progress.succeeded, 2);
    assert_eq!(summary.progress.errored, 1);
    assert_eq!(summary.progress.to_string(), "(2 Successful / 1 Errored)");

    let ledger = harness.ledger_on_disk();
    assert_eq!(ledger.status_of(KEY_1), Some(Bucket::Exported));
    assert_eq!(ledger.status_of(KEY_3), Some(Bucket::Exported));
    let message = ledger.errored()[KEY_2].message().to_string();
    assert!(message.starts_with("Error: "), "{message}");
    assert!(message.contains("Right view"), "{message}");
    assert_eq!(ledger.len(), 3);
}

#[tokio::test]
async fn conversion_failure_on_second_key_does_not_stop_the_run() {
    let converter = FakeConverter {
        failing_calls: HashSet::from([2]),
        ..Default::default()
    };
    let harness = Harness::new(
        PipelineVariant::Stitch,
        three_trajectories(),
        converter,
        &[KEY_1, KEY_2, KEY_3],
    );

    let summary = harness.run(WorkSelection::Pending).await;

    assert_eq!(summary.progress.to_string(), "(2 Successful / 1 Errored)");
    assert_eq!(harness.pipeline.converter().calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        harness.store().uploaded(),
        vec!["fused-annotation-mp4s/t1.mp4", "fused-annotation-mp4s/t3.mp4"]
    );

    let ledger = harness.ledger_on_disk();
    assert_eq!(ledger.status_of(KEY_1), Some(Bucket::Exported));
    assert_eq!(ledger.status_of(KEY_3), Some(Bucket::Exported));
    let message = ledger.errored()[KEY_2].message().to_string();
    assert!(message.contains("ffmpeg failed: corrupt stream"), "{message}");
}

#[tokio::test]
async fn panicking_key_does_not_stop_the_run() {
    let converter = FakeConverter {
        panicking_calls: HashSet::from([2]),
        ..Default::default()
    };
    let harness = Harness::new(
        PipelineVariant::Stitch,
        three_trajectories(),
        converter,
        &[KEY_1, KEY_2, KEY_3],
    );

    let summary = harness.run(WorkSelection::Pending).await;

    assert_eq!(summary.progress.succeeded, 2);
    assert_eq!(summary.progress.errored, 1);

    let ledger = harness.ledger_on_disk();
    assert_eq!(ledger.status_of(KEY_1), Some(Bucket::Exported));
    assert_eq!(ledger.status_of(KEY_3), Some(Bucket::Exported));
    assert_eq!(
        ledger.errored()[KEY_2].message(),
        "Error: panicked: decoder crashed on call 2"
    );
}

#[tokio::test]
async fn uploads_the_file_the_converter_reports() {
    let store = FakeStore::default();
    store.add_trajectory(KEY_1, "t1", true);
    let converter = FakeConverter {
        output_names: Some(vec!["t1-fused.mp4"]),
        ..Default::default()
    };
    let harness = Harness::new(PipelineVariant::Stitch, store, converter, &[KEY_1]);

    let outcome = harness.pipeline.process_key(KEY_1).await;

    assert_eq!(
        outcome,
        KeyOutcome::Exported {
            artifacts: vec!["fused-annotation-mp4s/t1.mp4".to_string()]
        }
    );
    assert_eq!(
        harness.store().object("fused-annotation-mp4s/t1.mp4").as_deref(),
        Some(&b"derived"[..])
    );
    assert!(!fused_output_path(&harness.pipeline.config().scratch_dir).exists());
}

#[tokio::test]
async fn converter_must_report_exactly_one_file() {
    let store = FakeStore::default();
    store.add_trajectory(KEY_1, "t1", true);
    let converter = FakeConverter {
        output_names: Some(vec!["a.mp4", "b.mp4"]),
        ..Default::default()
    };
    let harness = Harness::new(PipelineVariant::Stitch, store, converter, &[KEY_1]);

    let outcome = harness.pipeline.process_key(KEY_1).await;

    let message = outcome.error_message().unwrap_or_default();
    assert!(message.contains("produced 2 files, expected one"), "{message}");
    assert!(harness.store().uploaded().is_empty());
}

#[tokio::test]
async fn unusable_trajectory_is_skipped_without_downloads() {
    let store = FakeStore::default();
    store.add_trajectory(KEY_1, "t1", false);
    let harness = Harness::new(PipelineVariant::Stereo, store, FakeConverter::default(), &[KEY_1]);

    let summary = harness.run(WorkSelection::Pending).await;

    assert_eq!(summary.progress.non_usable, 1);
    assert_eq!(summary.progress.successful(), 1);
    assert_eq!(harness.store().downloads(), 0);
    assert!(harness.store().uploaded().is_empty());
    assert_eq!(harness.ledger_on_disk().status_of(KEY_1), Some(Bucket::NonUsable));
}

#[tokio::test]
async fn stereo_exports_every_view() {
    let store = FakeStore::default();
    store.add_trajectory(KEY_1, "t1", true);
    let harness = Harness::new(PipelineVariant::Stereo, store, FakeConverter::default(), &[KEY_1]);

    let outcome = harness.pipeline.process_key(KEY_1).await;

    assert_eq!(
        outcome,
        KeyOutcome::Exported {
            artifacts: vec![
                "lab-uploads/IRIS/success/t1/recordings/MP4/L-stereo.mp4".to_string(),
                "lab-uploads/IRIS/success/t1/recordings/MP4/R-stereo.mp4".to_string(),
                "lab-uploads/IRIS/success/t1/recordings/MP4/W-stereo.mp4".to_string(),
            ]
        }
    );
    assert_eq!(harness.store().downloads(), 3);
    assert_eq!(harness.pipeline.converter().calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn stereo_conversion_failure_reports_every_view() {
    let store = FakeStore::default();
    store.add_trajectory(KEY_1, "t1", true);
    let converter = FakeConverter {
        failing_stems: HashSet::from(["right".to_string()]),
        ..Default::default()
    };
    let harness = Harness::new(PipelineVariant::Stereo, store, converter, &[KEY_1]);

    let outcome = harness.pipeline.process_key(KEY_1).await;

    assert_eq!(
        outcome.error_message(),
        Some("Error: Failure to Convert SVO -- (Left: true, Right: false, Wrist: true)!")
    );
    assert!(harness.store().uploaded().is_empty());
}

#[tokio::test]
async fn stereo_upload_failure_reports_every_view() {
    let mut store = FakeStore::default();
    store.add_trajectory(KEY_1, "t1", true);
    store
        .failing_uploads
        .insert("lab-uploads/IRIS/success/t1/recordings/MP4/W-stereo.mp4".to_string());
    let harness = Harness::new(PipelineVariant::Stereo, store, FakeConverter::default(), &[KEY_1]);

    let outcome = harness.pipeline.process_key(KEY_1).await;

    assert_eq!(
        outcome.error_message(),
        Some("Error: Failure to Upload MP4 -- (Left: true, Right: true, Wrist: false)!")
    );
}

#[tokio::test]
async fn missing_converter_output_is_an_error() {
    let store = FakeStore::default();
    store.add_trajectory(KEY_1, "t1", true);
    let converter = FakeConverter {
        silent: true,
        ..Default::default()
    };
    let harness = Harness::new(PipelineVariant::Stitch, store, converter, &[KEY_1]);

    let outcome = harness.pipeline.process_key(KEY_1).await;

    let message = outcome.error_message().unwrap_or_default();
    assert!(message.contains("produced no file"), "{message}");
    assert!(harness.store().uploaded().is_empty());
}

#[tokio::test]
async fn slow_conversion_times_out_as_error() {
    let store = FakeStore::default();
    store.add_trajectory(KEY_1, "t1", true);
    let converter = FakeConverter {
        delay: Some(Duration::from_secs(30)),
        ..Default::default()
    };
    let harness = Harness::with_config(PipelineVariant::Stitch, store, converter, &[KEY_1], |c| {
        c.with_timeouts(Duration::from_secs(5), Duration::from_millis(50))
    });

    harness.run(WorkSelection::Pending).await;

    let ledger = harness.ledger_on_disk();
    assert!(ledger.errored()[KEY_1].message().contains("conversion timed out"));
}

#[tokio::test]
async fn interrupted_run_leaves_completed_keys_on_disk() {
    let mut store = three_trajectories();
    store.blocking_keys.insert(KEY_2.to_string());
    let harness = Harness::new(
        PipelineVariant::Stitch,
        store,
        FakeConverter::default(),
        &[KEY_1, KEY_2, KEY_3],
    );

    let mut ledger = harness.open_ledger();
    let run = tokio::time::timeout(
        Duration::from_millis(300),
        harness.pipeline.run(&mut ledger, WorkSelection::Pending),
    )
    .await;
    assert!(run.is_err(), "run should still be blocked on the second key");

    let on_disk = harness.ledger_on_disk();
    assert_eq!(on_disk.status_of(KEY_1), Some(Bucket::Exported));
    assert_eq!(on_disk.status_of(KEY_2), Some(Bucket::Pending));
    assert_eq!(on_disk.status_of(KEY_3), Some(Bucket::Pending));
}

#[tokio::test]
async fn retry_run_only_touches_errored_keys() {
    let store = three_trajectories();
    store.remove("lab-uploads/IRIS/success/t2/recordings/MP4/L.mp4");
    let harness = Harness::new(
        PipelineVariant::Stitch,
        store,
        FakeConverter::default(),
        &[KEY_1, KEY_2, KEY_3],
    );
    harness.run(WorkSelection::Pending).await;
    assert_eq!(harness.ledger_on_disk().status_of(KEY_2), Some(Bucket::Errored));

    harness
        .store()
        .put("lab-uploads/IRIS/success/t2/recordings/MP4/L.mp4", b"mp4");
    let uploads_before = harness.store().uploaded().len();

    let summary = harness.run(WorkSelection::Errored).await;

    assert_eq!(summary.selected, 1);
    assert_eq!(harness.store().uploaded().len(), uploads_before + 1);
    let ledger = harness.ledger_on_disk();
    assert_eq!(ledger.counts().exported, 3);
    assert!(ledger.errored().is_empty());
}
