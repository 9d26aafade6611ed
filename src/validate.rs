//! Post-hoc cross-entity validation.
//!
//! Runs after a generation pass, entirely outside the pipeline's control
//! flow: tables are loaded back from storage and checked for completeness,
//! key uniqueness, referential integrity, and time ordering.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;

use crate::registry::Stage;
use crate::store::Storage;
use crate::store::records::RecordBatch;

#[derive(Debug, Clone)]
pub struct ValidationCheck {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub checks: Vec<ValidationCheck>,
}

impl ValidationReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|check| check.passed)
    }

    fn record(&mut self, name: &str, passed: bool, detail: String) {
        self.checks.push(ValidationCheck {
            name: name.to_string(),
            passed,
            detail,
        });
    }
}

fn primary_key(stage: Stage) -> &'static str {
    match stage {
        Stage::BankManager => "manager_id",
        Stage::DepositType => "deposit_type_id",
        Stage::Product => "product_id",
        Stage::Customer => "customer_id",
        Stage::FundAccount => "account_id",
        Stage::AppUser => "app_user_id",
        Stage::WechatFollower => "follower_id",
        Stage::WorkWechatContact => "contact_id",
        Stage::ChannelProfile => "profile_id",
        Stage::LoanRecord => "loan_id",
        Stage::InvestmentRecord => "investment_id",
        Stage::CustomerEvent => "event_id",
        Stage::Transaction => "transaction_id",
    }
}

pub struct DataValidator {
    storage: Arc<dyn Storage>,
}

impl DataValidator {
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Validate every stage table. `window` bounds the expected transaction
    /// and event timestamps.
    pub async fn validate(
        &self,
        window: (NaiveDate, NaiveDate),
    ) -> Result<ValidationReport> {
        let mut report = ValidationReport::default();

        let mut tables = Vec::with_capacity(Stage::ALL.len());
        for stage in Stage::ALL {
            let batch = self
                .load(stage)
                .await
                .with_context(|| format!("load {} for validation", stage.table()))?;
            tables.push((stage, batch));
        }

        check_completeness(&tables, &mut report);
        check_uniqueness(&tables, &mut report);
        check_references(&tables, &mut report);
        check_time_ordering(&tables, window, &mut report);

        Ok(report)
    }

    async fn load(&self, stage: Stage) -> Result<RecordBatch> {
        let batch = self
            .storage
            .query(&format!("SELECT * FROM {}", stage.table()), &[])
            .await?;
        Ok(batch)
    }
}

fn check_completeness(tables: &[(Stage, RecordBatch)], report: &mut ValidationReport) {
    // Root entities must exist; downstream tables may legitimately be
    // empty when every probability draw came up short on a tiny run.
    let required = [Stage::BankManager, Stage::Customer, Stage::FundAccount];
    for (stage, batch) in tables {
        let is_required = required.contains(stage);
        let passed = !is_required || !batch.is_empty();
        report.record(
            &format!("completeness:{stage}"),
            passed,
            format!("{} rows", batch.len()),
        );
    }
}

fn check_uniqueness(tables: &[(Stage, RecordBatch)], report: &mut ValidationReport) {
    for (stage, batch) in tables {
        let key = primary_key(*stage);
        let mut seen = HashSet::with_capacity(batch.len());
        let mut duplicates = 0_usize;
        for record in batch.records() {
            let Some(value) = record.text(key) else {
                duplicates += 1;
                continue;
            };
            if !seen.insert(value.to_string()) {
                duplicates += 1;
            }
        }
        report.record(
            &format!("uniqueness:{stage}"),
            duplicates == 0,
            format!("{duplicates} duplicate or missing {key} values"),
        );
    }
}

fn check_references(tables: &[(Stage, RecordBatch)], report: &mut ValidationReport) {
    let ids = |stage: Stage| -> HashSet<String> {
        tables
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, batch)| {
                batch
                    .records()
                    .filter_map(|r| r.text(primary_key(stage)).map(ToString::to_string))
                    .collect()
            })
            .unwrap_or_default()
    };
    let customers = ids(Stage::Customer);
    let accounts = ids(Stage::FundAccount);
    let products = ids(Stage::Product);

    let references: [(Stage, &str, &HashSet<String>); 5] = [
        (Stage::FundAccount, "customer_id", &customers),
        (Stage::LoanRecord, "customer_id", &customers),
        (Stage::Transaction, "account_id", &accounts),
        (Stage::InvestmentRecord, "account_id", &accounts),
        (Stage::InvestmentRecord, "product_id", &products),
    ];

    for (stage, column, parent_ids) in references {
        let Some((_, batch)) = tables.iter().find(|(s, _)| *s == stage) else {
            continue;
        };
        let orphans = batch
            .records()
            .filter(|record| {
                record
                    .text(column)
                    .is_none_or(|value| !parent_ids.contains(value))
            })
            .count();
        report.record(
            &format!("referential:{stage}.{column}"),
            orphans == 0,
            format!("{orphans} orphaned rows"),
        );
    }
}

fn check_time_ordering(
    tables: &[(Stage, RecordBatch)],
    window: (NaiveDate, NaiveDate),
    report: &mut ValidationReport,
) {
    let (start, end) = window;
    let timed: [(Stage, &str); 2] = [
        (Stage::Transaction, "transaction_time"),
        (Stage::CustomerEvent, "event_time"),
    ];
    for (stage, column) in timed {
        let Some((_, batch)) = tables.iter().find(|(s, _)| *s == stage) else {
            continue;
        };
        let out_of_window = batch
            .records()
            .filter(|record| {
                record
                    .date(column)
                    .is_none_or(|day| day < start || day > end)
            })
            .count();
        report.record(
            &format!("time_window:{stage}"),
            out_of_window == 0,
            format!("{out_of_window} rows outside {start}..{end}"),
        );
    }

    // Accounts must not open before their customer registered.
    let registrations: std::collections::HashMap<String, NaiveDate> = tables
        .iter()
        .find(|(s, _)| *s == Stage::Customer)
        .map(|(_, batch)| {
            batch
                .records()
                .filter_map(|r| {
                    Some((
                        r.text("customer_id")?.to_string(),
                        r.date("registration_date")?,
                    ))
                })
                .collect()
        })
        .unwrap_or_default();
    if let Some((_, accounts)) = tables.iter().find(|(s, _)| *s == Stage::FundAccount) {
        let premature = accounts
            .records()
            .filter(|record| {
                let Some(opened) = record.date("opening_date") else {
                    return true;
                };
                record
                    .text("customer_id")
                    .and_then(|id| registrations.get(id))
                    .is_some_and(|registered| opened < *registered)
            })
            .count();
        report.record(
            "time_order:fund_account.opening_date",
            premature == 0,
            format!("{premature} accounts opened before customer registration"),
        );
    }
}
