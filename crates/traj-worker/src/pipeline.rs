//! Incremental conversion pipeline.
//!
//! `process_key` turns one metadata key into a `KeyOutcome` and never touches
//! the ledger. `run` walks a snapshot of the selected ledger keys, folds each
//! outcome into the ledger and checkpoints it, so a crash loses at most the
//! key that was in flight. A key's failure, including a panic, never stops
//! the loop.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::time::Duration;

use futures::FutureExt;
use tracing::{info, warn, Instrument};

use traj_ledger::{BucketCounts, LedgerGuard};
use traj_media::ArtifactConverter;
use traj_models::keys::{fused_artifact_key, join_key, stereo_relpath};
use traj_models::{KeyOutcome, MetadataRecord, View};
use traj_storage::RemoteStore;

use crate::config::PipelineConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::KeyLogger;
use crate::metrics;
use crate::retry::FailureTracker;
use crate::variant::PipelineVariant;

/// Which ledger bucket a run works through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkSelection {
    #[default]
    Pending,
    /// Explicit retry of previously failed keys
    Errored,
}

/// Running tally of outcomes in one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressCounts {
    pub succeeded: usize,
    pub non_usable: usize,
    pub errored: usize,
}

impl ProgressCounts {
    pub fn record(&mut self, outcome: &KeyOutcome) {
        match outcome {
            KeyOutcome::Exported { .. } => self.succeeded += 1,
            KeyOutcome::NonUsable => self.non_usable += 1,
            KeyOutcome::Errored { .. } => self.errored += 1,
        }
    }

    /// Keys reported as successful: exported plus intentionally skipped.
    pub fn successful(&self) -> usize {
        self.succeeded + self.non_usable
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.non_usable + self.errored
    }
}

impl std::fmt::Display for ProgressCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({} Successful / {} Errored)", self.successful(), self.errored)
    }
}

/// Result of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Keys selected at the start of the run
    pub selected: usize,
    pub progress: ProgressCounts,
    /// Ledger bucket sizes at the end of the run
    pub counts: BucketCounts,
}

/// One view of a trajectory resolved against the bucket and scratch dir.
#[derive(Debug, Clone)]
struct ViewPlan {
    view: View,
    mp4_relpath: String,
    raw_key: String,
    scratch: PathBuf,
}

/// Converts metadata keys into uploaded artifacts.
pub struct ConversionPipeline<S, C> {
    store: S,
    converter: C,
    config: PipelineConfig,
    variant: PipelineVariant,
}

impl<S, C> ConversionPipeline<S, C>
where
    S: RemoteStore,
    C: ArtifactConverter,
{
    pub fn new(store: S, converter: C, config: PipelineConfig, variant: PipelineVariant) -> Self {
        Self {
            store,
            converter,
            config,
            variant,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn converter(&self) -> &C {
        &self.converter
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn variant(&self) -> PipelineVariant {
        self.variant
    }

    /// Process every key of the selected bucket, checkpointing the ledger as it goes.
    pub async fn run(
        &self,
        ledger: &mut LedgerGuard,
        selection: WorkSelection,
    ) -> WorkerResult<RunSummary> {
        tokio::fs::create_dir_all(&self.config.scratch_dir).await?;

        let keys = match selection {
            WorkSelection::Pending => ledger.pending_keys(),
            WorkSelection::Errored => ledger.errored_keys(),
        };
        info!(
            "Starting {} run over {} {:?} keys (ledger {}: {})",
            self.variant,
            keys.len(),
            selection,
            ledger.path().display(),
            ledger.counts()
        );

        let checkpoint_every = self.config.checkpoint_every.max(1);
        let mut checkpoint_failures = FailureTracker::new(3);
        let mut progress = ProgressCounts::default();

        for (i, key) in keys.iter().enumerate() {
            let logger = KeyLogger::new(key, self.variant);
            logger.log_start(&format!("{}/{}", i + 1, keys.len()));

            let outcome = AssertUnwindSafe(self.process_key(key).instrument(logger.create_span()))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| {
                    KeyOutcome::errored(format!("panicked: {}", panic_message(payload.as_ref())))
                });
            logger.log_outcome(&outcome);

            ledger.mark(key, &outcome);
            progress.record(&outcome);
            metrics::record_key_processed(self.variant, &outcome);
            info!("[{}/{}] {}", i + 1, keys.len(), progress);

            if (i + 1) % checkpoint_every == 0 {
                match ledger.checkpoint() {
                    Ok(()) => checkpoint_failures.record_success(),
                    Err(e) => {
                        metrics::record_checkpoint_failure(self.variant);
                        if checkpoint_failures.record_failure() {
                            logger.log_warning(&format!("ledger checkpoint failed: {}", e));
                        }
                    }
                }
            }
        }

        let summary = RunSummary {
            selected: keys.len(),
            progress,
            counts: ledger.counts(),
        };
        info!("Finished {} run {}: {}", self.variant, summary.progress, summary.counts);
        Ok(summary)
    }

    /// Convert and upload the artifacts for one metadata key.
    pub async fn process_key(&self, key: &str) -> KeyOutcome {
        match self.try_process_key(key).await {
            Ok(outcome) => outcome,
            Err(e) => KeyOutcome::errored(e),
        }
    }

    async fn try_process_key(&self, key: &str) -> WorkerResult<KeyOutcome> {
        let bytes = self
            .store_call("fetch metadata", self.store.get_object(key))
            .await?;
        let record = MetadataRecord::from_slice(&bytes)?;

        if !record.success {
            return Ok(KeyOutcome::NonUsable);
        }

        let plans = self.plan_views(&record)?;
        for plan in &plans {
            self.store_call("download", self.store.download(&plan.raw_key, &plan.scratch))
                .await
                .map_err(|e| WorkerError::download_failed(plan.view, e.to_string()))?;
        }

        match self.variant {
            PipelineVariant::Stitch => self.stitch(key, &plans).await,
            PipelineVariant::Stereo => self.stereo(&record, &plans).await,
        }
    }

    fn plan_views(&self, record: &MetadataRecord) -> WorkerResult<Vec<ViewPlan>> {
        let lab_prefix = record.lab_prefix(&self.config.raw_prefix);
        self.variant
            .required_views()
            .iter()
            .map(|&view| -> WorkerResult<ViewPlan> {
                let mp4_relpath = record.media_path(view)?.to_string();
                Ok(ViewPlan {
                    view,
                    raw_key: join_key(&lab_prefix, &self.variant.raw_relpath(&mp4_relpath)),
                    scratch: self.variant.scratch_file(&self.config.scratch_dir, view),
                    mp4_relpath,
                })
            })
            .collect()
    }

    /// Fuse left and right into one video named after the trajectory id.
    async fn stitch(&self, key: &str, plans: &[ViewPlan]) -> WorkerResult<KeyOutcome> {
        let destination = fused_artifact_key(&self.config.destination_prefix, key)?;
        let inputs: Vec<PathBuf> = plans.iter().map(|p| p.scratch.clone()).collect();

        let fused = self.convert(&inputs).await?;

        self.store_call("upload", self.store.upload(&fused, &destination))
            .await
            .map_err(|e| WorkerError::upload_failed(e.to_string()))?;

        Ok(KeyOutcome::Exported {
            artifacts: vec![destination],
        })
    }

    /// Export every view separately; the key succeeds only if all views do.
    async fn stereo(&self, record: &MetadataRecord, plans: &[ViewPlan]) -> WorkerResult<KeyOutcome> {
        let lab_prefix = record.lab_prefix(&self.config.raw_prefix);

        let mut exports = Vec::with_capacity(plans.len());
        for plan in plans {
            let exported = match self.convert(std::slice::from_ref(&plan.scratch)).await {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("{} view conversion failed: {}", plan.view.label(), e);
                    None
                }
            };
            exports.push((plan, exported));
        }

        if exports.iter().any(|(_, exported)| exported.is_none()) {
            let flags = view_flags(exports.iter().map(|(p, e)| (p.view, e.is_some())));
            return Ok(KeyOutcome::errored(format!(
                "Failure to Convert SVO -- ({})!",
                flags
            )));
        }

        let mut uploads = Vec::with_capacity(exports.len());
        let mut artifacts = Vec::with_capacity(exports.len());
        for (plan, exported) in exports {
            let Some(local) = exported else { continue };
            let destination = join_key(&lab_prefix, &stereo_relpath(&plan.mp4_relpath)?);
            let uploaded = match self
                .store_call("upload", self.store.upload(&local, &destination))
                .await
            {
                Ok(()) => {
                    artifacts.push(destination);
                    true
                }
                Err(e) => {
                    warn!("{} view upload failed: {}", plan.view.label(), e);
                    false
                }
            };
            uploads.push((plan.view, uploaded));
        }

        if uploads.iter().all(|(_, ok)| *ok) {
            Ok(KeyOutcome::Exported { artifacts })
        } else {
            Ok(KeyOutcome::errored(format!(
                "Failure to Upload MP4 -- ({})!",
                view_flags(uploads)
            )))
        }
    }

    /// Run the converter and return the single file it reports.
    async fn convert(&self, inputs: &[PathBuf]) -> WorkerResult<PathBuf> {
        let mode = self.variant.mode();
        let mut produced = bounded(
            "conversion",
            self.config.convert_timeout,
            self.converter.convert(inputs, &self.config.scratch_dir, mode),
        )
        .await?;

        let output = match produced.len() {
            1 => produced.remove(0),
            0 => {
                return Err(WorkerError::conversion_failed(format!(
                    "{} produced no file",
                    mode
                )))
            }
            n => {
                return Err(WorkerError::conversion_failed(format!(
                    "{} produced {} files, expected one",
                    mode, n
                )))
            }
        };

        if !output.is_file() {
            return Err(WorkerError::conversion_failed(format!(
                "{} produced no file at {}",
                mode,
                output.display()
            )));
        }
        Ok(output)
    }

    async fn store_call<T, F>(&self, operation: &str, call: F) -> WorkerResult<T>
    where
        F: Future<Output = traj_storage::StorageResult<T>>,
    {
        bounded(operation, self.config.store_timeout, call).await
    }
}

/// Await `call` for at most `limit`.
async fn bounded<T, E, F>(operation: &str, limit: Duration, call: F) -> WorkerResult<T>
where
    F: Future<Output = Result<T, E>>,
    WorkerError: From<E>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(WorkerError::timed_out(operation, limit)),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}

/// `Left: true, Right: false, Wrist: true`
fn view_flags(flags: impl IntoIterator<Item = (View, bool)>) -> String {
    flags
        .into_iter()
        .map(|(view, ok)| format!("{}: {}", view.label(), ok))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_counts_display() {
        let mut progress = ProgressCounts::default();
        progress.record(&KeyOutcome::Exported { artifacts: vec![] });
        progress.record(&KeyOutcome::NonUsable);
        progress.record(&KeyOutcome::errored("x"));

        assert_eq!(progress.successful(), 2);
        assert_eq!(progress.total(), 3);
        assert_eq!(progress.to_string(), "(2 Successful / 1 Errored)");
    }

    #[test]
    fn test_view_flags() {
        let flags = view_flags([(View::Left, true), (View::Right, false), (View::Wrist, true)]);
        assert_eq!(flags, "Left: true, Right: false, Wrist: true");
    }

    #[test]
    fn test_panic_message() {
        let payload = std::panic::catch_unwind(|| panic!("bad frame {}", 7)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "bad frame 7");

        let payload = std::panic::catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static");
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let err = bounded(
            "download",
            Duration::from_millis(10),
            std::future::pending::<Result<(), std::io::Error>>(),
        )
        .await
        .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "download timed out after 10ms");
    }
}
