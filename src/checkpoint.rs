//! Run/stage state and its durable persistence.
//!
//! One [`CheckpointManager`] instance owns one [`RunStatus`] record for the
//! lifetime of the process. Every mutation flows through the manager; the
//! progress store only ever sees whole-row inserts and updates keyed by
//! `status_id`.
//!
//! Nothing here guards against two processes resuming the same run
//! concurrently. The store is assumed single-writer per logical run.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::registry::{Stage, StageRegistry};
use crate::store::{ProgressStore, StoreError};

/// Run lifecycle state. `completed` is terminal; `paused` and `failed` are
/// the resumable states besides a fresh `initialized` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Initialized,
    Running,
    Paused,
    Completed,
    Failed,
}

impl RunState {
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "initialized" => Some(RunState::Initialized),
            "running" => Some(RunState::Running),
            "paused" => Some(RunState::Paused),
            "completed" => Some(RunState::Completed),
            "failed" => Some(RunState::Failed),
            _ => None,
        }
    }
}

impl AsRef<str> for RunState {
    fn as_ref(&self) -> &str {
        match self {
            RunState::Initialized => "initialized",
            RunState::Running => "running",
            RunState::Paused => "paused",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// The single mutable record the manager owns; also the persisted row shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    pub status_id: String,
    pub run_id: String,
    pub start_time: DateTime<Utc>,
    pub last_update_time: DateTime<Utc>,
    pub current_stage: Option<String>,
    pub completed_stages: Vec<String>,
    pub stage_progress: f64,
    pub status: RunState,
    pub details: String,
}

/// Outcome of [`CheckpointManager::start_stage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStart {
    Started,
    /// The stage is already in the completed set; nothing was mutated.
    Skipped,
}

/// What a successful resume restored, for operator-facing logs.
#[derive(Debug, Clone)]
pub struct ResumeSummary {
    pub run_id: String,
    pub current_stage: Option<String>,
    pub completed_stages: Vec<String>,
    pub stage_progress: f64,
    pub details: String,
}

fn new_run_id(now: DateTime<Utc>) -> String {
    let uid = Uuid::new_v4().simple().to_string();
    format!("RUN_{}_{}", &uid[..8], now.format("%Y%m%d%H%M%S"))
}

fn new_status_id() -> String {
    format!("STATUS_{}", Uuid::new_v4().simple())
}

pub struct CheckpointManager {
    store: Arc<dyn ProgressStore>,
    registry: StageRegistry,
    status: RunStatus,
    /// Whether our `status_id` row exists in the store yet.
    persisted: bool,
    /// Progress value at the last persisted write, for the decade-crossing
    /// write suppression in `update_progress`.
    last_persisted_progress: f64,
}

impl CheckpointManager {
    #[must_use]
    pub fn new(store: Arc<dyn ProgressStore>, registry: StageRegistry) -> Self {
        let now = Utc::now();
        let status = RunStatus {
            status_id: new_status_id(),
            run_id: new_run_id(now),
            start_time: now,
            last_update_time: now,
            current_stage: None,
            completed_stages: Vec::new(),
            stage_progress: 0.0,
            status: RunState::Initialized,
            details: "initialized".to_string(),
        };
        Self {
            store,
            registry,
            status,
            persisted: false,
            last_persisted_progress: 0.0,
        }
    }

    /// Begin a fresh run, treating `skip_stages` as already completed.
    /// Unknown stage names are an input error and leave the store untouched.
    pub async fn initialize_run(&mut self, skip_stages: &[String]) -> Result<String> {
        let mut completed = Vec::new();
        for name in skip_stages {
            let stage = self.registry.resolve(name)?;
            let name = stage.name().to_string();
            if !completed.contains(&name) {
                completed.push(name);
            }
        }

        self.status.completed_stages = completed;
        self.status.status = RunState::Initialized;
        self.status.details = if self.status.completed_stages.is_empty() {
            "run initialized".to_string()
        } else {
            format!(
                "run initialized, skipping stages: {}",
                self.status.completed_stages.join(", ")
            )
        };
        self.save().await.context("persist initial run status")?;

        tracing::info!(
            run_id = %self.status.run_id,
            status_id = %self.status.status_id,
            skipped = self.status.completed_stages.len(),
            "run initialized"
        );
        Ok(self.status.run_id.clone())
    }

    /// Adopt the most recent resumable row and force it back to `running`.
    /// Returns `None` when no paused, running, or failed row exists; the
    /// caller decides whether to fall back to a fresh run.
    pub async fn resume_from_last(&mut self) -> Result<Option<ResumeSummary>> {
        let Some(last) = self
            .store
            .latest_resumable()
            .await
            .context("query resumable run status")?
        else {
            tracing::info!("no resumable run status found");
            return Ok(None);
        };

        let summary = ResumeSummary {
            run_id: last.run_id.clone(),
            current_stage: last.current_stage.clone(),
            completed_stages: last.completed_stages.clone(),
            stage_progress: last.stage_progress,
            details: last.details.clone(),
        };

        let prior_details = last.details.clone();
        self.status = last;
        self.status.status = RunState::Running;
        self.status.details = format!("resumed from previous state: {prior_details}");
        self.persisted = true;
        self.last_persisted_progress = self.status.stage_progress;
        self.save().await.context("persist resumed run status")?;

        tracing::info!(
            run_id = %self.status.run_id,
            current_stage = ?self.status.current_stage,
            stage_progress = self.status.stage_progress,
            "run resumed"
        );
        Ok(Some(summary))
    }

    /// Enter `stage`. Re-entering a completed stage is a no-op reported as
    /// [`StageStart::Skipped`].
    pub async fn start_stage(&mut self, stage: Stage) -> Result<StageStart> {
        if self.is_completed(stage) {
            tracing::info!(stage = %stage, "stage already completed, skipping");
            return Ok(StageStart::Skipped);
        }

        self.status.current_stage = Some(stage.name().to_string());
        self.status.stage_progress = 0.0;
        self.status.status = RunState::Running;
        self.status.details = format!("stage started: {stage}");
        self.last_persisted_progress = 0.0;
        self.save()
            .await
            .with_context(|| format!("persist start of stage {stage}"))?;

        tracing::info!(run_id = %self.status.run_id, stage = %stage, "stage started");
        Ok(StageStart::Started)
    }

    /// Record progress for the current stage. Always updates in memory;
    /// writes to the store only when the value crosses a 10% decade or
    /// reaches the terminal 99.9%, since bulk-insert loops report many
    /// times per second.
    pub async fn update_progress(&mut self, progress: f64, details: Option<&str>) -> Result<()> {
        if self.status.current_stage.is_none() {
            return Ok(());
        }

        let progress = progress.clamp(0.0, 100.0);
        self.status.stage_progress = progress;
        if let Some(details) = details {
            self.status.details = details.to_string();
        }

        let crossed_decade =
            (progress / 10.0).floor() > (self.last_persisted_progress / 10.0).floor();
        let terminal = progress >= 99.9 && self.last_persisted_progress < 99.9;
        if crossed_decade || terminal {
            self.save().await.context("persist stage progress")?;
            self.last_persisted_progress = progress;
            tracing::info!(
                stage = ?self.status.current_stage,
                progress = format!("{progress:.1}"),
                "stage progress"
            );
        }
        Ok(())
    }

    /// Mark `stage` finished: it joins the completed set (once), progress is
    /// forced to 100, and the stage is no longer active. Always persists.
    pub async fn complete_stage(&mut self, stage: Stage) -> Result<()> {
        if self.status.current_stage.as_deref() != Some(stage.name()) {
            tracing::warn!(
                current = ?self.status.current_stage,
                completing = %stage,
                "completing a stage that is not the current stage"
            );
        }

        if !self.is_completed(stage) {
            self.status.completed_stages.push(stage.name().to_string());
        }
        self.status.stage_progress = 100.0;
        self.status.current_stage = None;
        self.status.details = format!("stage completed: {stage}");
        self.save()
            .await
            .with_context(|| format!("persist completion of stage {stage}"))?;

        tracing::info!(run_id = %self.status.run_id, stage = %stage, "stage completed");
        Ok(())
    }

    /// Deliberate interruption. Keeps `current_stage` and its progress so a
    /// resume restarts the same stage. Persistence failures are logged and
    /// swallowed: this runs on the interrupt path, which must not throw.
    pub async fn pause_run(&mut self, reason: Option<&str>) {
        self.status.status = RunState::Paused;
        self.status.details = match reason {
            Some(reason) => format!("run paused: {reason}"),
            None => "run paused".to_string(),
        };
        if let Err(error) = self.save().await {
            tracing::warn!(error = %error, "failed to persist paused state");
        }
        tracing::info!(run_id = %self.status.run_id, details = %self.status.details, "run paused");
    }

    /// Record a failed run so the next `--resume` explains what happened.
    /// Like [`Self::pause_run`], tolerates its own persistence failing.
    pub async fn fail_run(&mut self, error: &str) {
        self.status.status = RunState::Failed;
        self.status.details = format!("run failed: {error}");
        if let Err(persist_error) = self.save().await {
            tracing::warn!(error = %persist_error, "failed to persist failed state");
        }
        tracing::error!(run_id = %self.status.run_id, error = %error, "run failed");
    }

    /// Terminal success. No further mutation is expected after this.
    pub async fn complete_run(&mut self) -> Result<()> {
        self.status.status = RunState::Completed;
        self.status.details = "all stages completed".to_string();
        self.save().await.context("persist completed run status")?;
        tracing::info!(run_id = %self.status.run_id, "run completed");
        Ok(())
    }

    #[must_use]
    pub fn should_skip_stage(&self, stage: Stage) -> bool {
        self.is_completed(stage)
    }

    /// First registry stage not yet completed, or `None` when everything is.
    #[must_use]
    pub fn get_next_stage(&self) -> Option<Stage> {
        self.registry
            .stages()
            .iter()
            .copied()
            .find(|stage| !self.is_completed(*stage))
    }

    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.status.run_id
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        self.status.status
    }

    #[must_use]
    pub fn current_stage(&self) -> Option<&str> {
        self.status.current_stage.as_deref()
    }

    #[must_use]
    pub fn completed_stages(&self) -> &[String] {
        &self.status.completed_stages
    }

    #[must_use]
    pub fn stage_progress(&self) -> f64 {
        self.status.stage_progress
    }

    #[must_use]
    pub fn details(&self) -> &str {
        &self.status.details
    }

    fn is_completed(&self, stage: Stage) -> bool {
        self.status
            .completed_stages
            .iter()
            .any(|name| name == stage.name())
    }

    /// Upsert the owned row: first write inserts, later writes update. An
    /// insert that races another writer and reports a duplicate key falls
    /// back to an update against the same key instead of surfacing.
    async fn save(&mut self) -> Result<(), StoreError> {
        self.status.last_update_time = Utc::now();
        if self.persisted {
            return self.store.update_status(&self.status).await;
        }
        match self.store.insert_status(&self.status).await {
            Ok(()) => {}
            Err(StoreError::UniqueViolation(key)) => {
                tracing::warn!(
                    status_id = %key,
                    "status row already present on first write, updating in place"
                );
                self.store.update_status(&self.status).await?;
            }
            Err(error) => return Err(error),
        }
        self.persisted = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mock::MemoryProgressStore;
    use chrono::Duration;

    fn manager_with(store: Arc<MemoryProgressStore>) -> CheckpointManager {
        CheckpointManager::new(store, StageRegistry::new())
    }

    fn names(stages: &[&str]) -> Vec<String> {
        stages.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn initialize_rejects_unknown_stage_without_writing() {
        let store = MemoryProgressStore::new();
        let mut manager = manager_with(Arc::clone(&store));

        let err = manager
            .initialize_run(&names(&["bank_manager", "nonsense"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown stage"));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn scenario_fresh_run_start_complete_skip_next() {
        let store = MemoryProgressStore::new();
        let mut manager = manager_with(store);
        manager.initialize_run(&[]).await.unwrap();

        assert_eq!(
            manager.start_stage(Stage::BankManager).await.unwrap(),
            StageStart::Started
        );
        manager.update_progress(100.0, None).await.unwrap();
        manager.complete_stage(Stage::BankManager).await.unwrap();

        assert_eq!(
            manager.start_stage(Stage::BankManager).await.unwrap(),
            StageStart::Skipped
        );
        assert_eq!(manager.get_next_stage(), Some(Stage::DepositType));
    }

    #[tokio::test]
    async fn idempotent_skip_leaves_state_untouched() {
        let store = MemoryProgressStore::new();
        let mut manager = manager_with(store);
        manager.initialize_run(&[]).await.unwrap();

        manager.start_stage(Stage::BankManager).await.unwrap();
        manager.complete_stage(Stage::BankManager).await.unwrap();
        manager.start_stage(Stage::DepositType).await.unwrap();
        manager.update_progress(42.0, None).await.unwrap();

        assert_eq!(
            manager.start_stage(Stage::BankManager).await.unwrap(),
            StageStart::Skipped
        );
        assert_eq!(manager.current_stage(), Some("deposit_type"));
        assert!((manager.stage_progress() - 42.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn monotonic_completion() {
        let store = MemoryProgressStore::new();
        let mut manager = manager_with(store);
        manager.initialize_run(&[]).await.unwrap();

        manager.start_stage(Stage::Product).await.unwrap();
        manager.complete_stage(Stage::Product).await.unwrap();
        // A second completion must not introduce a duplicate.
        manager.complete_stage(Stage::Product).await.unwrap();

        assert!(manager.should_skip_stage(Stage::Product));
        assert_eq!(
            manager
                .completed_stages()
                .iter()
                .filter(|name| *name == "product")
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn progress_guard_without_current_stage() {
        let store = MemoryProgressStore::new();
        let mut manager = manager_with(Arc::clone(&store));
        manager.initialize_run(&[]).await.unwrap();
        let writes_before = store.write_count();

        manager.update_progress(55.0, Some("stray call")).await.unwrap();

        assert_eq!(store.write_count(), writes_before);
        assert!((manager.stage_progress() - 0.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn write_amplification_is_bounded() {
        let store = MemoryProgressStore::new();
        let mut manager = manager_with(Arc::clone(&store));
        manager.initialize_run(&[]).await.unwrap();
        manager.start_stage(Stage::Customer).await.unwrap();

        let writes_before = store.write_count();
        for i in 1..=100 {
            let progress = f64::from(i);
            manager.update_progress(progress, None).await.unwrap();
        }
        let delta = store.write_count() - writes_before;
        assert!(delta <= 11, "expected at most 11 writes, saw {delta}");
    }

    #[tokio::test]
    async fn repeated_values_in_one_decade_write_once() {
        let store = MemoryProgressStore::new();
        let mut manager = manager_with(Arc::clone(&store));
        manager.initialize_run(&[]).await.unwrap();
        manager.start_stage(Stage::Customer).await.unwrap();

        let writes_before = store.write_count();
        for progress in [10.1, 10.4, 11.0, 14.2, 19.9] {
            manager.update_progress(progress, None).await.unwrap();
        }
        assert_eq!(store.write_count() - writes_before, 1);
    }

    #[tokio::test]
    async fn resume_fidelity() {
        let now = Utc::now();
        let row = RunStatus {
            status_id: "STATUS_seed".to_string(),
            run_id: "RUN_seed".to_string(),
            start_time: now - Duration::hours(2),
            last_update_time: now,
            current_stage: Some("customer".to_string()),
            completed_stages: names(&["bank_manager"]),
            stage_progress: 42.0,
            status: RunState::Paused,
            details: "run paused: operator".to_string(),
        };
        let store = MemoryProgressStore::with_rows(vec![row]);
        let mut manager = manager_with(store);

        let summary = manager.resume_from_last().await.unwrap().unwrap();

        assert_eq!(manager.run_id(), "RUN_seed");
        assert_eq!(manager.current_stage(), Some("customer"));
        assert_eq!(manager.completed_stages(), names(&["bank_manager"]));
        assert!((manager.stage_progress() - 42.0).abs() < f64::EPSILON);
        assert_eq!(manager.state(), RunState::Running);
        assert_eq!(summary.details, "run paused: operator");
    }

    #[tokio::test]
    async fn resume_prefers_most_recent_row() {
        let now = Utc::now();
        let older = RunStatus {
            status_id: "STATUS_a".to_string(),
            run_id: "RUN_r1".to_string(),
            start_time: now - Duration::hours(3),
            last_update_time: now - Duration::hours(1),
            current_stage: Some("product".to_string()),
            completed_stages: Vec::new(),
            stage_progress: 10.0,
            status: RunState::Running,
            details: "older".to_string(),
        };
        let newer = RunStatus {
            status_id: "STATUS_b".to_string(),
            run_id: "RUN_r1".to_string(),
            start_time: now - Duration::hours(3),
            last_update_time: now,
            current_stage: Some("customer".to_string()),
            completed_stages: names(&["bank_manager"]),
            stage_progress: 55.0,
            status: RunState::Failed,
            details: "newer".to_string(),
        };
        // Insertion order deliberately puts the newer row first.
        let store = MemoryProgressStore::with_rows(vec![newer, older]);
        let mut manager = manager_with(store);

        let summary = manager.resume_from_last().await.unwrap().unwrap();
        assert_eq!(summary.current_stage.as_deref(), Some("customer"));
        assert!((summary.stage_progress - 55.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn resume_keeps_run_id_and_fresh_runs_differ() {
        let store = MemoryProgressStore::new();
        let mut first = manager_with(Arc::clone(&store));
        let first_id = first.initialize_run(&[]).await.unwrap();
        first.start_stage(Stage::BankManager).await.unwrap();
        first.pause_run(Some("test")).await;

        let mut resumed = manager_with(Arc::clone(&store));
        resumed.resume_from_last().await.unwrap().unwrap();
        assert_eq!(resumed.run_id(), first_id);

        let mut fresh = manager_with(store);
        let fresh_id = fresh.initialize_run(&[]).await.unwrap();
        assert_ne!(fresh_id, first_id);
    }

    #[tokio::test]
    async fn resume_with_empty_store_returns_none() {
        let store = MemoryProgressStore::new();
        let mut manager = manager_with(store);
        assert!(manager.resume_from_last().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn completed_rows_are_not_resumable() {
        let store = MemoryProgressStore::new();
        let mut manager = manager_with(Arc::clone(&store));
        manager.initialize_run(&[]).await.unwrap();
        for stage in Stage::ALL {
            manager.start_stage(stage).await.unwrap();
            manager.complete_stage(stage).await.unwrap();
        }
        manager.complete_run().await.unwrap();

        let mut next = manager_with(store);
        assert!(next.resume_from_last().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn skip_set_drives_next_stage() {
        let store = MemoryProgressStore::new();
        let mut manager = manager_with(store);
        manager
            .initialize_run(&names(&["bank_manager", "deposit_type"]))
            .await
            .unwrap();
        assert_eq!(manager.get_next_stage(), Some(Stage::Product));
        assert!(manager.should_skip_stage(Stage::BankManager));
        assert!(!manager.should_skip_stage(Stage::Product));
    }

    #[tokio::test]
    async fn insert_race_falls_back_to_update() {
        let store = MemoryProgressStore::rejecting_first_insert();
        let mut manager = manager_with(Arc::clone(&store));

        manager.initialize_run(&[]).await.unwrap();

        assert_eq!(store.insert_calls(), 1);
        assert_eq!(store.update_calls(), 1);
        // Later saves go straight to update.
        manager.start_stage(Stage::BankManager).await.unwrap();
        assert_eq!(store.insert_calls(), 1);
        assert_eq!(store.update_calls(), 2);
    }

    #[tokio::test]
    async fn pause_keeps_current_stage_for_resume() {
        let store = MemoryProgressStore::new();
        let mut manager = manager_with(Arc::clone(&store));
        manager.initialize_run(&[]).await.unwrap();
        manager.start_stage(Stage::Customer).await.unwrap();
        manager.update_progress(37.5, None).await.unwrap();
        manager.pause_run(Some("signal")).await;

        assert_eq!(manager.state(), RunState::Paused);
        assert_eq!(manager.current_stage(), Some("customer"));

        let mut resumed = manager_with(store);
        let summary = resumed.resume_from_last().await.unwrap().unwrap();
        assert_eq!(summary.current_stage.as_deref(), Some("customer"));
    }

    #[tokio::test]
    async fn fail_run_records_error_text() {
        let store = MemoryProgressStore::new();
        let mut manager = manager_with(Arc::clone(&store));
        manager.initialize_run(&[]).await.unwrap();
        manager.start_stage(Stage::Product).await.unwrap();
        manager.fail_run("storage exploded").await;

        assert_eq!(manager.state(), RunState::Failed);
        assert!(manager.details().contains("storage exploded"));

        let rows = store.rows();
        let row = rows
            .iter()
            .find(|row| row.run_id == manager.run_id())
            .unwrap();
        assert_eq!(row.status, RunState::Failed);
    }
}
