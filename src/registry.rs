//! Fixed, ordered universe of generation stages.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One named unit of the pipeline, producing one entity type's records.
///
/// The declaration order is a topological order of data dependencies:
/// organizational entities before customers, customers before accounts,
/// accounts before transactions. Changing it is a deployment-time decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    BankManager,
    DepositType,
    Product,
    Customer,
    FundAccount,
    AppUser,
    WechatFollower,
    WorkWechatContact,
    ChannelProfile,
    LoanRecord,
    InvestmentRecord,
    CustomerEvent,
    Transaction,
}

impl Stage {
    pub const ALL: [Stage; 13] = [
        Stage::BankManager,
        Stage::DepositType,
        Stage::Product,
        Stage::Customer,
        Stage::FundAccount,
        Stage::AppUser,
        Stage::WechatFollower,
        Stage::WorkWechatContact,
        Stage::ChannelProfile,
        Stage::LoanRecord,
        Stage::InvestmentRecord,
        Stage::CustomerEvent,
        Stage::Transaction,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Stage::BankManager => "bank_manager",
            Stage::DepositType => "deposit_type",
            Stage::Product => "product",
            Stage::Customer => "customer",
            Stage::FundAccount => "fund_account",
            Stage::AppUser => "app_user",
            Stage::WechatFollower => "wechat_follower",
            Stage::WorkWechatContact => "work_wechat_contact",
            Stage::ChannelProfile => "channel_profile",
            Stage::LoanRecord => "loan_record",
            Stage::InvestmentRecord => "investment_record",
            Stage::CustomerEvent => "customer_event",
            Stage::Transaction => "transaction",
        }
    }

    /// Destination table. Matches the stage name for every entity except
    /// transactions, which land in `account_transaction`.
    #[must_use]
    pub fn table(self) -> &'static str {
        match self {
            Stage::Transaction => "account_transaction",
            other => other.name(),
        }
    }

    #[must_use]
    pub fn from_name(s: &str) -> Option<Self> {
        Stage::ALL.iter().copied().find(|stage| stage.name() == s)
    }

    #[must_use]
    pub fn index(self) -> usize {
        Stage::ALL
            .iter()
            .position(|stage| *stage == self)
            .unwrap_or(usize::MAX)
    }
}

impl AsRef<str> for Stage {
    fn as_ref(&self) -> &str {
        self.name()
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
#[error("unknown stage: {0}")]
pub struct UnknownStage(pub String);

/// Authoritative stage sequence. Immutable at run time.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageRegistry;

impl StageRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    #[must_use]
    pub fn stages(&self) -> &'static [Stage] {
        &Stage::ALL
    }

    pub fn resolve(&self, name: &str) -> Result<Stage, UnknownStage> {
        Stage::from_name(name).ok_or_else(|| UnknownStage(name.to_string()))
    }

    /// All stages strictly before `stage` in registry order. This is the
    /// skip set a `--skip-to` request maps to.
    #[must_use]
    pub fn skip_prefix(&self, stage: Stage) -> Vec<Stage> {
        Stage::ALL
            .iter()
            .copied()
            .take_while(|candidate| *candidate != stage)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn order_is_stable() {
        assert_eq!(Stage::ALL[0], Stage::BankManager);
        assert_eq!(Stage::ALL[12], Stage::Transaction);
        assert_eq!(Stage::Customer.index(), 3);
    }

    #[test]
    fn name_round_trip() {
        for stage in Stage::ALL {
            assert_eq!(Stage::from_name(stage.name()), Some(stage));
        }
        assert_eq!(Stage::from_name("nope"), None);
    }

    #[test]
    fn transaction_table_diverges_from_stage_name() {
        assert_eq!(Stage::Transaction.table(), "account_transaction");
        assert_eq!(Stage::Customer.table(), "customer");
    }

    #[rstest]
    #[case(Stage::BankManager, 0)]
    #[case(Stage::Product, 2)]
    #[case(Stage::Transaction, 12)]
    fn skip_prefix_is_strict(#[case] stage: Stage, #[case] expected_len: usize) {
        let registry = StageRegistry::new();
        let prefix = registry.skip_prefix(stage);
        assert_eq!(prefix.len(), expected_len);
        assert!(!prefix.contains(&stage));
    }

    #[test]
    fn resolve_rejects_unknown_names() {
        let registry = StageRegistry::new();
        assert!(registry.resolve("customer").is_ok());
        let err = registry.resolve("customers").unwrap_err();
        assert_eq!(err.to_string(), "unknown stage: customers");
    }
}
