//! Stage-producer contract: pure record synthesis, driven by the executor.

pub mod entities;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;

use crate::config::Config;
use crate::registry::Stage;
use crate::store::records::{RecordBatch, Scalar};

/// Inclusive date window a producer generates records for. For
/// range-partitioned stages the executor narrows this per sub-range.
#[derive(Debug, Clone, Copy)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Volume knobs shared by every producer, sourced from configuration.
#[derive(Debug, Clone)]
pub struct GenerationCounts {
    pub bank_managers: usize,
    pub deposit_types: usize,
    pub products: usize,
    pub customers: usize,
    pub max_event_customers: usize,
    pub max_active_accounts: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct ProduceParams<'a> {
    pub window: DateWindow,
    pub counts: &'a GenerationCounts,
}

/// How the executor drives a producer: once for the whole run, or once per
/// date sub-range so interruption loses at most one sub-range of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partitioning {
    Whole,
    ByDateRange { days_per_slice: u32 },
}

/// Outputs of previously completed stages, keyed by stage.
pub type DependencyMap = HashMap<Stage, RecordBatch>;

/// Stateless synthesis of one stage's records from configuration, the
/// outputs of earlier stages, and randomness. No ordering guarantees within
/// the returned batch.
pub trait StageProducer: Send + Sync {
    fn stage(&self) -> Stage;

    /// Stages whose outputs this producer reads. The executor supplies them
    /// from its cache or reloads them from storage after a resume.
    fn dependencies(&self) -> &'static [Stage] {
        &[]
    }

    fn partitioning(&self) -> Partitioning {
        Partitioning::Whole
    }

    fn produce(&self, deps: &DependencyMap, params: &ProduceParams<'_>) -> Result<RecordBatch>;
}

/// One typed entity that knows its destination table and column layout.
pub(crate) trait TableRecord {
    const TABLE: &'static str;
    const COLUMNS: &'static [&'static str];

    fn row(&self) -> Vec<Scalar>;
}

pub(crate) fn batch_from<T: TableRecord>(items: &[T]) -> RecordBatch {
    let mut batch = RecordBatch::new(T::TABLE, T::COLUMNS);
    for item in items {
        batch.push_row(item.row());
    }
    batch
}

/// The full producer complement, one per registry stage.
pub struct ProducerSet {
    producers: HashMap<Stage, Arc<dyn StageProducer>>,
}

impl ProducerSet {
    /// Built-in producers wired from configuration.
    #[must_use]
    pub fn standard(config: &Config) -> Self {
        use entities::{
            AppUserProducer, BankManagerProducer, ChannelProfileProducer, CustomerEventProducer,
            CustomerProducer, DepositTypeProducer, FundAccountProducer, InvestmentRecordProducer,
            LoanRecordProducer, ProductProducer, TransactionProducer, WechatFollowerProducer,
            WorkWechatContactProducer,
        };

        let producers: Vec<Arc<dyn StageProducer>> = vec![
            Arc::new(BankManagerProducer),
            Arc::new(DepositTypeProducer),
            Arc::new(ProductProducer),
            Arc::new(CustomerProducer),
            Arc::new(FundAccountProducer),
            Arc::new(AppUserProducer),
            Arc::new(WechatFollowerProducer),
            Arc::new(WorkWechatContactProducer),
            Arc::new(ChannelProfileProducer),
            Arc::new(LoanRecordProducer),
            Arc::new(InvestmentRecordProducer),
            Arc::new(CustomerEventProducer::new(config.event_days_per_slice())),
            Arc::new(TransactionProducer::new(config.txn_days_per_slice())),
        ];
        Self::from_producers(producers)
    }

    #[must_use]
    pub fn from_producers(producers: Vec<Arc<dyn StageProducer>>) -> Self {
        let producers = producers
            .into_iter()
            .map(|producer| (producer.stage(), producer))
            .collect();
        Self { producers }
    }

    #[must_use]
    pub fn get(&self, stage: Stage) -> Option<&Arc<dyn StageProducer>> {
        self.producers.get(&stage)
    }
}
