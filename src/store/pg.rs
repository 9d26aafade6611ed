//! Postgres-backed implementation of both store traits over one pool.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, PgPool, Postgres, Row, TypeInfo};

use crate::checkpoint::{RunState, RunStatus};
use crate::config::Config;
use crate::store::records::{RecordBatch, RecordSlice, Scalar};
use crate::store::{ProgressStore, Storage, StoreError, decode_stage_list, encode_stage_list};

pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &Config) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections())
            .acquire_timeout(config.db_acquire_timeout())
            .connect(config.db_dsn())
            .await
            .map_err(|e| StoreError::Other(anyhow::Error::new(e).context("connect to database")))?;
        Ok(Self::new(pool))
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn bind_scalar<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &Scalar,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        Scalar::Null => query.bind(Option::<String>::None),
        Scalar::Bool(v) => query.bind(*v),
        Scalar::Int(v) => query.bind(*v),
        Scalar::Float(v) => query.bind(*v),
        Scalar::Text(v) => query.bind(v.clone()),
        Scalar::Date(v) => query.bind(*v),
        Scalar::Timestamp(v) => query.bind(*v),
    }
}

fn scalar_from_column(row: &PgRow, idx: usize, type_name: &str) -> Result<Scalar, StoreError> {
    let value = match type_name {
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => row
            .try_get::<Option<String>, _>(idx)
            .map_err(into_store_error)?
            .map(Scalar::Text),
        "INT2" => row
            .try_get::<Option<i16>, _>(idx)
            .map_err(into_store_error)?
            .map(|v| Scalar::Int(v.into())),
        "INT4" => row
            .try_get::<Option<i32>, _>(idx)
            .map_err(into_store_error)?
            .map(|v| Scalar::Int(v.into())),
        "INT8" => row
            .try_get::<Option<i64>, _>(idx)
            .map_err(into_store_error)?
            .map(Scalar::Int),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(idx)
            .map_err(into_store_error)?
            .map(|v| Scalar::Float(v.into())),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(idx)
            .map_err(into_store_error)?
            .map(Scalar::Float),
        "BOOL" => row
            .try_get::<Option<bool>, _>(idx)
            .map_err(into_store_error)?
            .map(Scalar::Bool),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(idx)
            .map_err(into_store_error)?
            .map(Scalar::Date),
        "TIMESTAMPTZ" | "TIMESTAMP" => row
            .try_get::<Option<DateTime<Utc>>, _>(idx)
            .map_err(into_store_error)?
            .map(Scalar::Timestamp),
        other => {
            return Err(StoreError::Other(anyhow!(
                "unsupported column type in result set: {other}"
            )));
        }
    };
    Ok(value.unwrap_or(Scalar::Null))
}

fn into_store_error(error: sqlx::Error) -> StoreError {
    StoreError::Other(anyhow::Error::new(error))
}

fn parse_run_status(row: &PgRow) -> Result<RunStatus, StoreError> {
    let status_text: String = row.try_get("status").map_err(into_store_error)?;
    let status = RunState::from_str(&status_text)
        .ok_or_else(|| StoreError::Other(anyhow!("unknown run status in store: {status_text}")))?;
    let completed_raw: Option<String> = row
        .try_get("completed_stages")
        .map_err(into_store_error)?;

    Ok(RunStatus {
        status_id: row.try_get("id").map_err(into_store_error)?,
        run_id: row.try_get("run_id").map_err(into_store_error)?,
        start_time: row.try_get("start_time").map_err(into_store_error)?,
        last_update_time: row.try_get("last_update_time").map_err(into_store_error)?,
        current_stage: row.try_get("current_stage").map_err(into_store_error)?,
        completed_stages: decode_stage_list(completed_raw.as_deref())?,
        stage_progress: row.try_get("stage_progress").map_err(into_store_error)?,
        status,
        details: row
            .try_get::<Option<String>, _>("details")
            .map_err(into_store_error)?
            .unwrap_or_default(),
    })
}

#[async_trait]
impl ProgressStore for PgStorage {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS generation_status (
                id VARCHAR(50) PRIMARY KEY,
                run_id VARCHAR(50) NOT NULL,
                start_time TIMESTAMPTZ NOT NULL,
                last_update_time TIMESTAMPTZ NOT NULL,
                current_stage VARCHAR(50),
                completed_stages TEXT,
                stage_progress DOUBLE PRECISION DEFAULT 0,
                status VARCHAR(20) NOT NULL,
                details TEXT
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Other(anyhow::Error::new(e).context("create generation_status")))?;
        Ok(())
    }

    async fn insert_status(&self, status: &RunStatus) -> Result<(), StoreError> {
        let completed = encode_stage_list(&status.completed_stages)?;
        sqlx::query(
            r"
            INSERT INTO generation_status
                (id, run_id, start_time, last_update_time, current_stage,
                 completed_stages, stage_progress, status, details)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(&status.status_id)
        .bind(&status.run_id)
        .bind(status.start_time)
        .bind(status.last_update_time)
        .bind(&status.current_stage)
        .bind(&completed)
        .bind(status.stage_progress)
        .bind(status.status.as_ref())
        .bind(&status.details)
        .execute(&self.pool)
        .await
        .map_err(|error| match &error {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::UniqueViolation(status.status_id.clone())
            }
            _ => StoreError::Other(anyhow::Error::new(error).context("insert run status")),
        })?;
        Ok(())
    }

    async fn update_status(&self, status: &RunStatus) -> Result<(), StoreError> {
        let completed = encode_stage_list(&status.completed_stages)?;
        sqlx::query(
            r"
            UPDATE generation_status
            SET run_id = $1, last_update_time = $2, current_stage = $3,
                completed_stages = $4, stage_progress = $5, status = $6, details = $7
            WHERE id = $8
            ",
        )
        .bind(&status.run_id)
        .bind(status.last_update_time)
        .bind(&status.current_stage)
        .bind(&completed)
        .bind(status.stage_progress)
        .bind(status.status.as_ref())
        .bind(&status.details)
        .bind(&status.status_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Other(anyhow::Error::new(e).context("update run status")))?;
        Ok(())
    }

    async fn latest_resumable(&self) -> Result<Option<RunStatus>, StoreError> {
        let row = sqlx::query(
            r"
            SELECT id, run_id, start_time, last_update_time, current_stage,
                   completed_stages, stage_progress, status, details
            FROM generation_status
            WHERE status IN ('paused', 'running', 'failed')
            ORDER BY last_update_time DESC
            LIMIT 1
            ",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Other(anyhow::Error::new(e).context("query resumable status")))?;

        match row {
            Some(row) => Ok(Some(parse_run_status(&row)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn query(&self, sql: &str, params: &[Scalar]) -> Result<RecordBatch, StoreError> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_scalar(query, param);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Other(anyhow::Error::new(e).context("execute query")))?;

        // Result sets are labeled with the table parsed out of the FROM
        // clause; callers that cache batches re-label via `fetch_table`.
        let table = sql
            .split_whitespace()
            .skip_while(|word| !word.eq_ignore_ascii_case("FROM"))
            .nth(1)
            .unwrap_or("");

        let Some(first) = rows.first() else {
            return Ok(RecordBatch::from_rows(table, Vec::new(), Vec::new()));
        };
        let columns: Vec<String> = first
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        let mut out_rows = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut values = Vec::with_capacity(columns.len());
            for (idx, column) in row.columns().iter().enumerate() {
                values.push(scalar_from_column(row, idx, column.type_info().name())?);
            }
            out_rows.push(values);
        }
        Ok(RecordBatch::from_rows(table, columns, out_rows))
    }

    async fn update(&self, sql: &str, params: &[Scalar]) -> Result<u64, StoreError> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_scalar(query, param);
        }
        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Other(anyhow::Error::new(e).context("execute update")))?;
        Ok(result.rows_affected())
    }

    async fn import_batch(&self, slice: RecordSlice<'_>) -> Result<u64, StoreError> {
        if slice.is_empty() {
            return Ok(0);
        }

        // One multi-row INSERT per batch: the whole batch commits or none
        // of it does. NULLs are inlined because a bound NULL carries a
        // parameter type that need not match the column's.
        let columns = slice.columns.join(", ");
        let mut tuples = Vec::with_capacity(slice.rows.len());
        let mut bind_values = Vec::new();
        let mut placeholder = 0_usize;
        for row in slice.rows {
            let mut parts = Vec::with_capacity(row.len());
            for value in row {
                if value.is_null() {
                    parts.push("NULL".to_string());
                } else {
                    placeholder += 1;
                    parts.push(format!("${placeholder}"));
                    bind_values.push(value);
                }
            }
            tuples.push(format!("({})", parts.join(", ")));
        }
        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            slice.table,
            columns,
            tuples.join(", ")
        );

        let mut query = sqlx::query(&sql);
        for value in bind_values {
            query = bind_scalar(query, value);
        }
        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| {
                StoreError::Other(
                    anyhow::Error::new(e)
                        .context(format!("import batch into {}", slice.table)),
                )
            })?;
        Ok(result.rows_affected())
    }

    async fn table_exists(&self, name: &str) -> Result<bool, StoreError> {
        let row = sqlx::query(
            r"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            ) AS present
            ",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Other(anyhow::Error::new(e).context("check table existence")))?;
        row.try_get("present").map_err(into_store_error)
    }
}
