//! In-memory stores for tests. No database required.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;

use crate::checkpoint::RunStatus;
use crate::store::records::{RecordBatch, RecordSlice, Scalar};
use crate::store::{ProgressStore, Storage, StoreError};

/// Progress store backed by a row vector, counting writes so tests can
/// assert the write-amplification bound.
pub struct MemoryProgressStore {
    rows: Mutex<Vec<RunStatus>>,
    inserts: AtomicUsize,
    updates: AtomicUsize,
    reject_next_insert: AtomicBool,
}

impl MemoryProgressStore {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_rows(Vec::new())
    }

    #[must_use]
    pub fn with_rows(rows: Vec<RunStatus>) -> Arc<Self> {
        Arc::new(Self {
            rows: Mutex::new(rows),
            inserts: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            reject_next_insert: AtomicBool::new(false),
        })
    }

    /// A store whose next insert reports a duplicate key, simulating a
    /// raced first write.
    #[must_use]
    pub fn rejecting_first_insert() -> Arc<Self> {
        let store = Self::new();
        store.reject_next_insert.store(true, Ordering::SeqCst);
        store
    }

    #[must_use]
    pub fn insert_calls(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn update_calls(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn write_count(&self) -> usize {
        self.insert_calls() + self.update_calls()
    }

    #[must_use]
    pub fn rows(&self) -> Vec<RunStatus> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert_status(&self, status: &RunStatus) -> Result<(), StoreError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        if self.reject_next_insert.swap(false, Ordering::SeqCst) {
            return Err(StoreError::UniqueViolation(status.status_id.clone()));
        }
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|row| row.status_id == status.status_id) {
            return Err(StoreError::UniqueViolation(status.status_id.clone()));
        }
        rows.push(status.clone());
        Ok(())
    }

    async fn update_status(&self, status: &RunStatus) -> Result<(), StoreError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        let mut rows = self.rows.lock().unwrap();
        match rows.iter_mut().find(|row| row.status_id == status.status_id) {
            Some(row) => *row = status.clone(),
            None => rows.push(status.clone()),
        }
        Ok(())
    }

    async fn latest_resumable(&self) -> Result<Option<RunStatus>, StoreError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|row| {
                matches!(
                    row.status,
                    crate::checkpoint::RunState::Paused
                        | crate::checkpoint::RunState::Running
                        | crate::checkpoint::RunState::Failed
                )
            })
            .max_by_key(|row| row.last_update_time)
            .cloned())
    }
}

/// Business-data storage backed by a table map. `query` understands only the
/// `SELECT * FROM <table>` shape the executor's reload path issues.
pub struct MemoryStorage {
    tables: Mutex<HashMap<String, RecordBatch>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tables: Mutex::new(HashMap::new()),
        })
    }

    #[must_use]
    pub fn row_count(&self, table: &str) -> usize {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .map_or(0, RecordBatch::len)
    }

    #[must_use]
    pub fn table(&self, name: &str) -> Option<RecordBatch> {
        self.tables.lock().unwrap().get(name).cloned()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn query(&self, sql: &str, _params: &[Scalar]) -> Result<RecordBatch, StoreError> {
        let table = sql
            .trim()
            .strip_prefix("SELECT * FROM ")
            .map(|rest| rest.split_whitespace().next().unwrap_or(""))
            .ok_or_else(|| StoreError::Other(anyhow!("unsupported query in mock: {sql}")))?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .get(table)
            .cloned()
            .unwrap_or_else(|| RecordBatch::new(table, &[])))
    }

    async fn update(&self, sql: &str, _params: &[Scalar]) -> Result<u64, StoreError> {
        if let Some(table) = sql.trim().strip_prefix("DELETE FROM ") {
            let mut tables = self.tables.lock().unwrap();
            return Ok(tables
                .remove(table.trim())
                .map_or(0, |batch| batch.len() as u64));
        }
        Ok(0)
    }

    async fn import_batch(&self, slice: RecordSlice<'_>) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        let batch = tables.entry(slice.table.to_string()).or_insert_with(|| {
            let columns: Vec<&str> = slice.columns.iter().map(String::as_str).collect();
            RecordBatch::new(slice.table, &columns)
        });
        for row in slice.rows {
            batch.push_row(row.clone());
        }
        Ok(slice.rows.len() as u64)
    }

    async fn table_exists(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.tables.lock().unwrap().contains_key(name))
    }
}
