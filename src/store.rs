//! Storage seams: the durable progress store and the business-data store.
//!
//! Both are trait objects so the pipeline can run against Postgres in
//! production and against in-memory fakes in tests.

pub mod pg;
pub mod records;
pub mod schema;

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use thiserror::Error;

use crate::checkpoint::RunStatus;
use records::{RecordBatch, RecordSlice, Scalar};

pub use pg::PgStorage;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A write believed to be an insert hit an existing primary key. The
    /// checkpoint manager recovers from this by updating in place.
    #[error("duplicate key: {0}")]
    UniqueViolation(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Durable medium holding the run-status rows a run resumes from.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn ensure_schema(&self) -> Result<(), StoreError>;

    /// Insert a new row keyed by `status_id`. Must report
    /// [`StoreError::UniqueViolation`] when the key already exists.
    async fn insert_status(&self, status: &RunStatus) -> Result<(), StoreError>;

    /// Update the existing row keyed by `status_id`.
    async fn update_status(&self, status: &RunStatus) -> Result<(), StoreError>;

    /// The most recently updated row whose status is paused, running, or
    /// failed. `None` when nothing is resumable.
    async fn latest_resumable(&self) -> Result<Option<RunStatus>, StoreError>;
}

/// Generic query/import surface over the business tables.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn query(&self, sql: &str, params: &[Scalar]) -> Result<RecordBatch, StoreError>;

    async fn update(&self, sql: &str, params: &[Scalar]) -> Result<u64, StoreError>;

    /// Import one batch of rows. All rows in the batch commit or none do;
    /// returns the number of rows actually written.
    async fn import_batch(&self, slice: RecordSlice<'_>) -> Result<u64, StoreError>;

    async fn table_exists(&self, name: &str) -> Result<bool, StoreError>;
}

/// Wire codec for the `completed_stages` TEXT column. The persisted form is
/// a JSON array of stage names; keeping the conversion in one place keeps
/// the stored format stable under refactors.
pub fn encode_stage_list(stages: &[String]) -> Result<String, StoreError> {
    serde_json::to_string(stages)
        .map_err(|e| StoreError::Other(anyhow::Error::new(e).context("encode completed_stages")))
}

/// Inverse of [`encode_stage_list`]. Empty and NULL columns decode to an
/// empty list, matching rows written before any stage completed.
pub fn decode_stage_list(raw: Option<&str>) -> Result<Vec<String>, StoreError> {
    match raw {
        None | Some("") => Ok(Vec::new()),
        Some(text) => serde_json::from_str(text)
            .map_err(|e| StoreError::Other(anyhow::Error::new(e).context("decode completed_stages"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_list_round_trip() {
        let stages = vec!["bank_manager".to_string(), "deposit_type".to_string()];
        let encoded = encode_stage_list(&stages).unwrap();
        assert_eq!(encoded, r#"["bank_manager","deposit_type"]"#);
        assert_eq!(decode_stage_list(Some(&encoded)).unwrap(), stages);
    }

    #[test]
    fn empty_and_null_columns_decode_to_empty() {
        assert!(decode_stage_list(None).unwrap().is_empty());
        assert!(decode_stage_list(Some("")).unwrap().is_empty());
        assert!(decode_stage_list(Some("[]")).unwrap().is_empty());
    }

    #[test]
    fn malformed_payload_is_an_error() {
        assert!(decode_stage_list(Some("bank_manager,deposit_type")).is_err());
    }
}
