//! Drives the stage registry end to end, bridging producers, storage, and
//! the checkpoint manager.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use chrono::NaiveDate;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::checkpoint::{CheckpointManager, ResumeSummary, StageStart};
use crate::config::Config;
use crate::producer::{
    DateWindow, DependencyMap, GenerationCounts, Partitioning, ProduceParams, ProducerSet,
    StageProducer,
};
use crate::registry::Stage;
use crate::store::Storage;
use crate::util::time::split_date_range;

/// Marker error for a deliberate, already-persisted pause. The caller maps
/// this to a resumable exit instead of calling `fail_run`.
#[derive(Debug, Error)]
#[error("generation interrupted; state saved for resume")]
pub struct Interrupted;

pub struct GenerationExecutor {
    config: Arc<Config>,
    storage: Arc<dyn Storage>,
    checkpoint: CheckpointManager,
    producers: ProducerSet,
    /// Outputs of stages completed in this process, keyed by stage. Misses
    /// (after a resume) are reloaded from storage, never re-derived.
    cache: DependencyMap,
}

impl GenerationExecutor {
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        storage: Arc<dyn Storage>,
        checkpoint: CheckpointManager,
        producers: ProducerSet,
    ) -> Self {
        Self {
            config,
            storage,
            checkpoint,
            producers,
            cache: DependencyMap::new(),
        }
    }

    pub async fn initialize_run(&mut self, skip_stages: &[String]) -> Result<String> {
        self.checkpoint.initialize_run(skip_stages).await
    }

    pub async fn resume_from_last(&mut self) -> Result<Option<ResumeSummary>> {
        self.checkpoint.resume_from_last().await
    }

    pub async fn fail_run(&mut self, error: &str) {
        self.checkpoint.fail_run(error).await;
    }

    #[must_use]
    pub fn run_id(&self) -> &str {
        self.checkpoint.run_id()
    }

    /// Run every registry stage in order, skipping the completed ones, and
    /// return the per-stage count of rows actually written. Calls
    /// `complete_run` after the last stage.
    pub async fn execute(
        &mut self,
        start_date: NaiveDate,
        end_date: NaiveDate,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, u64>> {
        if start_date > end_date {
            bail!("start date {start_date} is after end date {end_date}");
        }

        tracing::info!(
            run_id = %self.checkpoint.run_id(),
            %start_date,
            %end_date,
            "generation run started"
        );

        let counts = self.config.counts();
        let window = DateWindow {
            start: start_date,
            end: end_date,
        };
        let mut stats = BTreeMap::new();

        for stage in Stage::ALL {
            if self.checkpoint.should_skip_stage(stage) {
                tracing::info!(stage = %stage, "stage already completed, skipping");
                continue;
            }
            if self.checkpoint.start_stage(stage).await? == StageStart::Skipped {
                continue;
            }

            let producer = Arc::clone(
                self.producers
                    .get(stage)
                    .ok_or_else(|| anyhow!("no producer registered for stage {stage}"))?,
            );
            self.ensure_dependencies(producer.as_ref()).await?;

            let written = match producer.partitioning() {
                Partitioning::Whole => {
                    self.run_whole_stage(stage, producer.as_ref(), window, &counts, cancel)
                        .await?
                }
                Partitioning::ByDateRange { days_per_slice } => {
                    self.run_partitioned_stage(
                        stage,
                        producer.as_ref(),
                        window,
                        days_per_slice,
                        &counts,
                        cancel,
                    )
                    .await?
                }
            };

            self.checkpoint.complete_stage(stage).await?;
            tracing::info!(stage = %stage, rows = written, "stage finished");
            stats.insert(stage.name().to_string(), written);
        }

        self.checkpoint.complete_run().await?;
        tracing::info!(run_id = %self.checkpoint.run_id(), "generation run completed");
        Ok(stats)
    }

    /// Reload any dependency missing from the in-process cache. This is the
    /// resume path: the prior process imported these rows but its memory is
    /// gone, so the minimum necessary data comes back by query.
    async fn ensure_dependencies(&mut self, producer: &dyn StageProducer) -> Result<()> {
        for dependency in producer.dependencies() {
            if self.cache.contains_key(dependency) {
                continue;
            }
            tracing::info!(
                stage = %dependency,
                table = dependency.table(),
                "dependency not cached, reloading from storage"
            );
            let batch = self
                .storage
                .query(&format!("SELECT * FROM {}", dependency.table()), &[])
                .await
                .with_context(|| format!("reload {} from storage", dependency.table()))?;
            self.cache.insert(*dependency, batch);
        }
        Ok(())
    }

    async fn run_whole_stage(
        &mut self,
        stage: Stage,
        producer: &dyn StageProducer,
        window: DateWindow,
        counts: &GenerationCounts,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let params = ProduceParams { window, counts };
        let records = producer
            .produce(&self.cache, &params)
            .with_context(|| format!("produce records for stage {stage}"))?;
        self.checkpoint
            .update_progress(
                50.0,
                Some(&format!(
                    "{stage}: generated {} records, importing",
                    records.len()
                )),
            )
            .await?;

        let total = records.len();
        let batch_size = self.config.batch_size();
        let mut written = 0_u64;
        let mut offset = 0_usize;
        while offset < total {
            if cancel.is_cancelled() {
                return self.pause_interrupted().await;
            }
            let upper = (offset + batch_size).min(total);
            written += self
                .storage
                .import_batch(records.slice(offset, upper))
                .await
                .with_context(|| format!("import batch into {}", stage.table()))?;
            offset = upper;

            let progress = (50.0 + 50.0 * offset as f64 / total as f64).min(99.0);
            self.checkpoint
                .update_progress(
                    progress,
                    Some(&format!("{stage}: imported {written} of {total} records")),
                )
                .await?;
        }

        self.cache.insert(stage, records);
        Ok(written)
    }

    /// High-volume stages produce and import one date sub-range at a time,
    /// so an interruption loses at most one sub-range of work.
    async fn run_partitioned_stage(
        &mut self,
        stage: Stage,
        producer: &dyn StageProducer,
        window: DateWindow,
        days_per_slice: u32,
        counts: &GenerationCounts,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let slices = split_date_range(window.start, window.end, days_per_slice)?;
        let total_slices = slices.len();
        let batch_size = self.config.batch_size();
        let mut written = 0_u64;

        for (index, (slice_start, slice_end)) in slices.iter().enumerate() {
            if cancel.is_cancelled() {
                return self.pause_interrupted().await;
            }

            let progress = index as f64 / total_slices as f64 * 100.0;
            self.checkpoint
                .update_progress(
                    progress,
                    Some(&format!(
                        "{stage}: slice {}/{total_slices} ({slice_start} to {slice_end})",
                        index + 1
                    )),
                )
                .await?;

            let params = ProduceParams {
                window: DateWindow {
                    start: *slice_start,
                    end: *slice_end,
                },
                counts,
            };
            let records = producer
                .produce(&self.cache, &params)
                .with_context(|| format!("produce records for stage {stage}"))?;

            let total = records.len();
            let mut offset = 0_usize;
            while offset < total {
                if cancel.is_cancelled() {
                    return self.pause_interrupted().await;
                }
                let upper = (offset + batch_size).min(total);
                written += self
                    .storage
                    .import_batch(records.slice(offset, upper))
                    .await
                    .with_context(|| format!("import batch into {}", stage.table()))?;
                offset = upper;
            }

            let progress = ((index + 1) as f64 / total_slices as f64 * 100.0).min(99.0);
            self.checkpoint
                .update_progress(
                    progress,
                    Some(&format!(
                        "{stage}: slice {}/{total_slices} imported, {written} rows total",
                        index + 1
                    )),
                )
                .await?;
        }
        Ok(written)
    }

    async fn pause_interrupted(&mut self) -> Result<u64> {
        self.checkpoint.pause_run(Some("interrupted by signal")).await;
        Err(Interrupted.into())
    }

    #[cfg(test)]
    pub(crate) fn checkpoint(&self) -> &CheckpointManager {
        &self.checkpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::RunState;
    use crate::registry::StageRegistry;
    use crate::store::mock::{MemoryProgressStore, MemoryStorage};

    fn window() -> (NaiveDate, NaiveDate) {
        (
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 15).unwrap(),
        )
    }

    fn build_executor(
        storage: Arc<MemoryStorage>,
        progress: Arc<MemoryProgressStore>,
    ) -> GenerationExecutor {
        let config = Arc::new(Config::test_default());
        let checkpoint = CheckpointManager::new(progress, StageRegistry::new());
        let producers = ProducerSet::standard(&config);
        GenerationExecutor::new(config, storage, checkpoint, producers)
    }

    #[tokio::test]
    async fn full_run_covers_every_stage() {
        let storage = MemoryStorage::new();
        let progress = MemoryProgressStore::new();
        let mut executor = build_executor(Arc::clone(&storage), progress);
        executor.initialize_run(&[]).await.unwrap();

        let (start, end) = window();
        let stats = executor
            .execute(start, end, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats.len(), Stage::ALL.len());
        assert_eq!(executor.checkpoint().state(), RunState::Completed);
        assert_eq!(
            stats["customer"],
            storage.row_count("customer") as u64
        );
        assert_eq!(
            stats["transaction"],
            storage.row_count("account_transaction") as u64
        );
    }

    #[tokio::test]
    async fn cancelled_token_pauses_without_failing() {
        let storage = MemoryStorage::new();
        let progress = MemoryProgressStore::new();
        let mut executor = build_executor(storage, Arc::clone(&progress));
        executor.initialize_run(&[]).await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let (start, end) = window();
        let err = executor.execute(start, end, &cancel).await.unwrap_err();

        assert!(err.downcast_ref::<Interrupted>().is_some());
        assert_eq!(executor.checkpoint().state(), RunState::Paused);
        let paused_rows: Vec<_> = progress
            .rows()
            .into_iter()
            .filter(|row| row.status == RunState::Paused)
            .collect();
        assert_eq!(paused_rows.len(), 1);
    }

    #[tokio::test]
    async fn resume_after_interrupt_finishes_the_run() {
        let storage = MemoryStorage::new();
        let progress = MemoryProgressStore::new();

        let mut first = build_executor(Arc::clone(&storage), Arc::clone(&progress));
        first.initialize_run(&[]).await.unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (start, end) = window();
        assert!(first.execute(start, end, &cancel).await.is_err());

        let mut second = build_executor(Arc::clone(&storage), progress);
        let summary = second.resume_from_last().await.unwrap().unwrap();
        assert_eq!(summary.run_id, first.run_id());

        let stats = second
            .execute(start, end, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(second.checkpoint().state(), RunState::Completed);
        assert_eq!(second.run_id(), first.run_id());
        // The interrupted attempt imported nothing, so the resumed run
        // produced every row exactly once.
        assert_eq!(stats["bank_manager"], storage.row_count("bank_manager") as u64);
    }

    #[tokio::test]
    async fn skip_set_reloads_dependencies_from_storage() {
        let storage = MemoryStorage::new();

        // A prior run populated everything.
        let mut seeded = build_executor(Arc::clone(&storage), MemoryProgressStore::new());
        seeded.initialize_run(&[]).await.unwrap();
        let (start, end) = window();
        seeded
            .execute(start, end, &CancellationToken::new())
            .await
            .unwrap();
        let customers_before = storage.row_count("customer");

        // A new process skips straight to fund_account; its cache is empty,
        // so customer and deposit_type come back from storage.
        let registry = StageRegistry::new();
        let skip: Vec<String> = registry
            .skip_prefix(Stage::FundAccount)
            .into_iter()
            .map(|stage| stage.name().to_string())
            .collect();
        let mut skipper = build_executor(Arc::clone(&storage), MemoryProgressStore::new());
        skipper.initialize_run(&skip).await.unwrap();
        let stats = skipper
            .execute(start, end, &CancellationToken::new())
            .await
            .unwrap();

        assert!(!stats.contains_key("customer"));
        assert!(stats.contains_key("fund_account"));
        assert_eq!(storage.row_count("customer"), customers_before);
        assert_eq!(skipper.checkpoint().state(), RunState::Completed);
    }

    #[tokio::test]
    async fn inverted_window_fails_fast_without_mutating_state() {
        let storage = MemoryStorage::new();
        let progress = MemoryProgressStore::new();
        let mut executor = build_executor(storage, Arc::clone(&progress));
        executor.initialize_run(&[]).await.unwrap();
        let writes_before = progress.write_count();

        let err = executor
            .execute(
                NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
                NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(err.to_string().contains("after end date"));
        assert_eq!(progress.write_count(), writes_before);
    }
}
