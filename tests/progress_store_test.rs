//! Progress-store round trip against a real Postgres instance.
//!
//! Skipped silently when DATABASE_URL is not set, so the suite stays green
//! on machines without a database.

use chrono::{Duration, Utc};
use sqlx::Row;
use sqlx::postgres::PgPoolOptions;

use datagen_worker::checkpoint::{RunState, RunStatus};
use datagen_worker::store::{PgStorage, ProgressStore, StoreError};

fn status_row(status_id: &str, run_id: &str, state: RunState, age_minutes: i64) -> RunStatus {
    let now = Utc::now();
    RunStatus {
        status_id: status_id.to_string(),
        run_id: run_id.to_string(),
        start_time: now - Duration::hours(1),
        last_update_time: now - Duration::minutes(age_minutes),
        current_stage: Some("customer".to_string()),
        completed_stages: vec!["bank_manager".to_string(), "deposit_type".to_string()],
        stage_progress: 42.0,
        status: state,
        details: "integration test".to_string(),
    }
}

#[tokio::test]
async fn progress_store_round_trip() -> anyhow::Result<()> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return Ok(());
    };
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await?;
    let store = PgStorage::new(pool.clone());
    store.ensure_schema().await?;
    sqlx::query("DELETE FROM generation_status")
        .execute(&pool)
        .await?;

    // Two resumable rows; the younger last_update_time must win.
    let older = status_row("STATUS_it_a", "RUN_it_1", RunState::Running, 30);
    let newer = status_row("STATUS_it_b", "RUN_it_1", RunState::Failed, 5);
    store.insert_status(&older).await?;
    store.insert_status(&newer).await?;

    let resumable = store.latest_resumable().await?.expect("resumable row");
    assert_eq!(resumable.status_id, "STATUS_it_b");
    assert_eq!(resumable.status, RunState::Failed);
    assert_eq!(resumable.completed_stages, newer.completed_stages);
    assert!((resumable.stage_progress - 42.0).abs() < f64::EPSILON);

    // A second insert against the same key must surface as a unique
    // violation, which the checkpoint manager turns into an update.
    let err = store.insert_status(&older).await.unwrap_err();
    assert!(matches!(err, StoreError::UniqueViolation(_)));

    // Completed rows drop out of the resumable set.
    let mut done = newer.clone();
    done.status = RunState::Completed;
    done.last_update_time = Utc::now();
    store.update_status(&done).await?;
    let mut settled = older.clone();
    settled.status = RunState::Completed;
    settled.last_update_time = Utc::now();
    store.update_status(&settled).await?;
    assert!(store.latest_resumable().await?.is_none());

    // The wire format for completed_stages is a JSON array in a TEXT column.
    let row = sqlx::query("SELECT completed_stages FROM generation_status WHERE id = $1")
        .bind("STATUS_it_b")
        .fetch_one(&pool)
        .await?;
    let raw: String = row.try_get("completed_stages")?;
    assert_eq!(raw, r#"["bank_manager","deposit_type"]"#);

    Ok(())
}
