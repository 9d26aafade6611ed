//! Built-in producers: one per registry stage.
//!
//! Record synthesis here is deliberately plain — uniform draws and weighted
//! choices, no statistical modeling. What matters is internal consistency:
//! every foreign key points at a record produced (or reloadable) by an
//! earlier stage.

use std::collections::{HashMap, HashSet};

use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::registry::Stage;
use crate::store::records::{RecordBatch, Scalar};

use super::{DependencyMap, Partitioning, ProduceParams, StageProducer, TableRecord, batch_from};

const BRANCHES: [&str; 5] = ["B001", "B002", "B003", "B004", "B005"];
const SURNAMES: [&str; 16] = [
    "Wang", "Li", "Zhang", "Liu", "Chen", "Yang", "Huang", "Zhao", "Wu", "Zhou", "Xu", "Sun",
    "Ma", "Zhu", "Hu", "Guo",
];
const GIVEN_NAMES: [&str; 16] = [
    "Wei", "Min", "Jing", "Hao", "Yan", "Lei", "Fang", "Qiang", "Na", "Jun", "Xiu", "Ping",
    "Gang", "Hui", "Tao", "Ling",
];

fn gen_id(prefix: &str) -> String {
    format!("{prefix}{}", Uuid::new_v4().simple())
}

fn pick<'a, T>(rng: &mut impl Rng, items: &'a [T]) -> &'a T {
    &items[rng.random_range(0..items.len())]
}

fn pick_weighted<'a, T>(rng: &mut impl Rng, choices: &'a [(T, f64)]) -> &'a T {
    let total: f64 = choices.iter().map(|(_, weight)| weight).sum();
    let mut roll = rng.random_range(0.0..total);
    for (item, weight) in choices {
        if roll < *weight {
            return item;
        }
        roll -= weight;
    }
    &choices[choices.len() - 1].0
}

fn random_date(rng: &mut impl Rng, start: NaiveDate, end: NaiveDate) -> NaiveDate {
    let span = (end - start).num_days().max(0);
    start + Duration::days(rng.random_range(0..=span))
}

fn random_time_on(rng: &mut impl Rng, date: NaiveDate) -> DateTime<Utc> {
    let seconds = rng.random_range(0..86_400);
    date.and_time(NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0).unwrap_or_default())
        .and_utc()
}

fn person_name(rng: &mut impl Rng) -> String {
    format!("{} {}", pick(rng, &SURNAMES), pick(rng, &GIVEN_NAMES))
}

fn phone_number(rng: &mut impl Rng) -> String {
    format!("13{:09}", rng.random_range(0..1_000_000_000_u64))
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

fn dep<'a>(deps: &'a DependencyMap, stage: Stage) -> Result<&'a RecordBatch> {
    deps.get(&stage)
        .ok_or_else(|| anyhow!("missing dependency batch for stage {stage}"))
}

// ---------------------------------------------------------------------------
// bank_manager

struct BankManager {
    manager_id: String,
    name: String,
    branch_id: String,
    phone: String,
    email: String,
    customer_count: i64,
    position: String,
}

impl TableRecord for BankManager {
    const TABLE: &'static str = "bank_manager";
    const COLUMNS: &'static [&'static str] = &[
        "manager_id",
        "name",
        "branch_id",
        "phone",
        "email",
        "customer_count",
        "position",
    ];

    fn row(&self) -> Vec<Scalar> {
        vec![
            Scalar::from(self.manager_id.clone()),
            Scalar::from(self.name.clone()),
            Scalar::from(self.branch_id.clone()),
            Scalar::from(self.phone.clone()),
            Scalar::from(self.email.clone()),
            Scalar::from(self.customer_count),
            Scalar::from(self.position.clone()),
        ]
    }
}

pub struct BankManagerProducer;

impl StageProducer for BankManagerProducer {
    fn stage(&self) -> Stage {
        Stage::BankManager
    }

    fn produce(&self, _deps: &DependencyMap, params: &ProduceParams<'_>) -> Result<RecordBatch> {
        const POSITIONS: [&str; 5] = [
            "junior_manager",
            "manager",
            "senior_manager",
            "principal_manager",
            "team_lead",
        ];
        let mut rng = rand::rng();
        let managers: Vec<BankManager> = (0..params.counts.bank_managers)
            .map(|_| {
                let name = person_name(&mut rng);
                BankManager {
                    manager_id: gen_id("M"),
                    email: format!(
                        "{}{}@bank.example.com",
                        name.to_lowercase().replace(' ', "."),
                        rng.random_range(10..100)
                    ),
                    name,
                    branch_id: (*pick(&mut rng, &BRANCHES)).to_string(),
                    phone: phone_number(&mut rng),
                    customer_count: rng.random_range(50..=200),
                    position: (*pick(&mut rng, &POSITIONS)).to_string(),
                }
            })
            .collect();
        Ok(batch_from(&managers))
    }
}

// ---------------------------------------------------------------------------
// deposit_type

struct DepositType {
    deposit_type_id: String,
    name: String,
    description: String,
    base_interest_rate: f64,
    min_term: i64,
    max_term: i64,
    min_amount: f64,
}

impl TableRecord for DepositType {
    const TABLE: &'static str = "deposit_type";
    const COLUMNS: &'static [&'static str] = &[
        "deposit_type_id",
        "name",
        "description",
        "base_interest_rate",
        "min_term",
        "max_term",
        "min_amount",
    ];

    fn row(&self) -> Vec<Scalar> {
        vec![
            Scalar::from(self.deposit_type_id.clone()),
            Scalar::from(self.name.clone()),
            Scalar::from(self.description.clone()),
            Scalar::from(self.base_interest_rate),
            Scalar::from(self.min_term),
            Scalar::from(self.max_term),
            Scalar::from(self.min_amount),
        ]
    }
}

pub struct DepositTypeProducer;

impl StageProducer for DepositTypeProducer {
    fn stage(&self) -> Stage {
        Stage::DepositType
    }

    fn produce(&self, _deps: &DependencyMap, params: &ProduceParams<'_>) -> Result<RecordBatch> {
        // Fixed catalog; `deposit_types` truncates it for small test runs.
        let catalog: [(&str, i64, i64, f64, f64); 10] = [
            ("demand_deposit", 0, 0, 0.0, 0.010),
            ("term_3_months", 3, 3, 50.0, 0.015),
            ("term_6_months", 6, 6, 50.0, 0.020),
            ("term_1_year", 12, 12, 50.0, 0.0275),
            ("term_2_years", 24, 24, 50.0, 0.0325),
            ("term_3_years", 36, 36, 50.0, 0.035),
            ("term_5_years", 60, 60, 50.0, 0.035),
            ("large_certificate", 12, 60, 200_000.0, 0.040),
            ("agreement_deposit", 0, 0, 50_000.0, 0.015),
            ("call_deposit", 0, 0, 5_000.0, 0.0125),
        ];

        let types: Vec<DepositType> = catalog
            .iter()
            .take(params.counts.deposit_types)
            .map(|(name, min_term, max_term, min_amount, base_rate)| DepositType {
                deposit_type_id: gen_id("DT"),
                name: (*name).to_string(),
                description: if *max_term == 0 {
                    "no fixed term".to_string()
                } else {
                    format!("{min_term} month term")
                },
                base_interest_rate: *base_rate,
                min_term: *min_term,
                max_term: *max_term,
                min_amount: *min_amount,
            })
            .collect();
        Ok(batch_from(&types))
    }
}

// ---------------------------------------------------------------------------
// product

struct Product {
    product_id: String,
    name: String,
    kind: String,
    interest_rate: Option<f64>,
    term: i64,
    expected_return: Option<f64>,
    risk_level: Option<String>,
}

impl TableRecord for Product {
    const TABLE: &'static str = "product";
    const COLUMNS: &'static [&'static str] = &[
        "product_id",
        "name",
        "type",
        "interest_rate",
        "term",
        "expected_return",
        "risk_level",
    ];

    fn row(&self) -> Vec<Scalar> {
        vec![
            Scalar::from(self.product_id.clone()),
            Scalar::from(self.name.clone()),
            Scalar::from(self.kind.clone()),
            Scalar::from(self.interest_rate),
            Scalar::from(self.term),
            Scalar::from(self.expected_return),
            Scalar::from(self.risk_level.clone()),
        ]
    }
}

pub struct ProductProducer;

impl StageProducer for ProductProducer {
    fn stage(&self) -> Stage {
        Stage::Product
    }

    fn produce(&self, _deps: &DependencyMap, params: &ProduceParams<'_>) -> Result<RecordBatch> {
        const KINDS: [(&str, f64); 3] =
            [("deposit", 0.35), ("loan", 0.30), ("investment", 0.35)];
        const LOAN_NAMES: [&str; 5] = [
            "consumer_loan",
            "mortgage_loan",
            "auto_loan",
            "education_loan",
            "small_business_loan",
        ];
        const RISKS: [(&str, f64); 3] = [("low", 0.45), ("medium", 0.35), ("high", 0.20)];

        let mut rng = rand::rng();
        let products: Vec<Product> = (0..params.counts.products)
            .map(|i| {
                let kind = *pick_weighted(&mut rng, &KINDS);
                match kind {
                    "deposit" => Product {
                        product_id: gen_id("P"),
                        name: format!("deposit_series_{i}"),
                        kind: kind.to_string(),
                        interest_rate: Some(rng.random_range(0.01..0.04)),
                        term: *pick(&mut rng, &[0_i64, 3, 6, 12, 24, 36, 60]),
                        expected_return: None,
                        risk_level: Some("low".to_string()),
                    },
                    "loan" => Product {
                        product_id: gen_id("P"),
                        name: format!("{}_{i}", pick(&mut rng, &LOAN_NAMES)),
                        kind: kind.to_string(),
                        interest_rate: Some(rng.random_range(0.03..0.10)),
                        term: *pick(&mut rng, &[6_i64, 12, 24, 36, 60, 120, 240, 360]),
                        expected_return: None,
                        risk_level: None,
                    },
                    _ => {
                        let risk = *pick_weighted(&mut rng, &RISKS);
                        let expected = match risk {
                            "low" => rng.random_range(0.025..0.045),
                            "medium" => rng.random_range(0.045..0.070),
                            _ => rng.random_range(0.070..0.120),
                        };
                        Product {
                            product_id: gen_id("P"),
                            name: format!("wealth_{risk}_{i}"),
                            kind: kind.to_string(),
                            interest_rate: None,
                            term: *pick(&mut rng, &[30_i64, 60, 90, 180, 270, 365, 730]),
                            expected_return: Some(expected),
                            risk_level: Some(risk.to_string()),
                        }
                    }
                }
            })
            .collect();
        Ok(batch_from(&products))
    }
}

// ---------------------------------------------------------------------------
// customer

struct Customer {
    customer_id: String,
    name: String,
    id_number: String,
    phone: String,
    email: String,
    gender: Option<String>,
    birth_date: Option<NaiveDate>,
    registration_date: NaiveDate,
    customer_type: String,
    credit_score: i64,
    is_vip: bool,
    branch_id: String,
    manager_id: String,
    annual_income: Option<f64>,
}

impl TableRecord for Customer {
    const TABLE: &'static str = "customer";
    const COLUMNS: &'static [&'static str] = &[
        "customer_id",
        "name",
        "id_number",
        "phone",
        "email",
        "gender",
        "birth_date",
        "registration_date",
        "customer_type",
        "credit_score",
        "is_vip",
        "branch_id",
        "manager_id",
        "annual_income",
    ];

    fn row(&self) -> Vec<Scalar> {
        vec![
            Scalar::from(self.customer_id.clone()),
            Scalar::from(self.name.clone()),
            Scalar::from(self.id_number.clone()),
            Scalar::from(self.phone.clone()),
            Scalar::from(self.email.clone()),
            Scalar::from(self.gender.clone()),
            Scalar::from(self.birth_date),
            Scalar::from(self.registration_date),
            Scalar::from(self.customer_type.clone()),
            Scalar::from(self.credit_score),
            Scalar::from(self.is_vip),
            Scalar::from(self.branch_id.clone()),
            Scalar::from(self.manager_id.clone()),
            Scalar::from(self.annual_income),
        ]
    }
}

pub struct CustomerProducer;

impl StageProducer for CustomerProducer {
    fn stage(&self) -> Stage {
        Stage::Customer
    }

    fn dependencies(&self) -> &'static [Stage] {
        &[Stage::BankManager]
    }

    fn produce(&self, deps: &DependencyMap, params: &ProduceParams<'_>) -> Result<RecordBatch> {
        let managers = dep(deps, Stage::BankManager)?;
        if managers.is_empty() {
            return Err(anyhow!("no bank managers available for customer generation"));
        }

        let mut rng = rand::rng();
        let anchor = params.window.end;
        let personal_count = (params.counts.customers * 4) / 5;

        let customers: Vec<Customer> = (0..params.counts.customers)
            .map(|i| {
                let manager = managers.record(rng.random_range(0..managers.len()));
                let manager_id = manager.text("manager_id").unwrap_or_default().to_string();
                let branch_id = manager.text("branch_id").unwrap_or_default().to_string();
                let is_personal = i < personal_count;
                let is_vip = rng.random_bool(if is_personal { 0.15 } else { 0.35 });
                let credit_score = {
                    let base = rng.random_range(350..=820);
                    if is_vip { (base + 30).min(850) } else { base }
                };
                let registration_date = random_date(
                    &mut rng,
                    anchor - Duration::days(3_650),
                    anchor - Duration::days(30),
                );

                if is_personal {
                    let age = rng.random_range(18..=75);
                    let birth = anchor - Duration::days(i64::from(age) * 365);
                    let given = (*pick(&mut rng, &GIVEN_NAMES)).to_lowercase();
                    Customer {
                        customer_id: gen_id("C"),
                        name: person_name(&mut rng),
                        id_number: rng
                            .random_range(
                                100_000_000_000_000_000_u64..1_000_000_000_000_000_000_u64,
                            )
                            .to_string(),
                        phone: phone_number(&mut rng),
                        email: format!("{given}{}@example.com", rng.random_range(100..1000)),
                        gender: Some(
                            if rng.random_bool(0.5) { "male" } else { "female" }.to_string(),
                        ),
                        birth_date: Some(birth),
                        registration_date,
                        customer_type: "personal".to_string(),
                        credit_score,
                        is_vip,
                        branch_id,
                        manager_id,
                        annual_income: Some(round_cents(rng.random_range(30_000.0..400_000.0))),
                    }
                } else {
                    Customer {
                        customer_id: gen_id("C"),
                        name: format!("{} Trading Co. {i}", pick(&mut rng, &SURNAMES)),
                        id_number: format!("91{:016}", rng.random_range(0..10_000_000_000_000_000_u64)),
                        phone: phone_number(&mut rng),
                        email: format!("corp{i}@example.com"),
                        gender: None,
                        birth_date: None,
                        registration_date,
                        customer_type: "corporate".to_string(),
                        credit_score,
                        is_vip,
                        branch_id,
                        manager_id,
                        annual_income: Some(round_cents(
                            rng.random_range(1_000_000.0..50_000_000.0),
                        )),
                    }
                }
            })
            .collect();
        Ok(batch_from(&customers))
    }
}

// ---------------------------------------------------------------------------
// fund_account

struct FundAccount {
    account_id: String,
    customer_id: String,
    account_type: String,
    status: String,
    currency: String,
    opening_date: NaiveDate,
    balance: f64,
    branch_id: String,
    deposit_type_id: Option<String>,
    interest_rate: Option<f64>,
    term: Option<i64>,
    maturity_date: Option<NaiveDate>,
}

impl TableRecord for FundAccount {
    const TABLE: &'static str = "fund_account";
    const COLUMNS: &'static [&'static str] = &[
        "account_id",
        "customer_id",
        "account_type",
        "status",
        "currency",
        "opening_date",
        "balance",
        "branch_id",
        "deposit_type_id",
        "interest_rate",
        "term",
        "maturity_date",
    ];

    fn row(&self) -> Vec<Scalar> {
        vec![
            Scalar::from(self.account_id.clone()),
            Scalar::from(self.customer_id.clone()),
            Scalar::from(self.account_type.clone()),
            Scalar::from(self.status.clone()),
            Scalar::from(self.currency.clone()),
            Scalar::from(self.opening_date),
            Scalar::from(self.balance),
            Scalar::from(self.branch_id.clone()),
            Scalar::from(self.deposit_type_id.clone()),
            Scalar::from(self.interest_rate),
            self.term.map_or(Scalar::Null, Scalar::Int),
            Scalar::from(self.maturity_date),
        ]
    }
}

pub struct FundAccountProducer;

impl StageProducer for FundAccountProducer {
    fn stage(&self) -> Stage {
        Stage::FundAccount
    }

    fn dependencies(&self) -> &'static [Stage] {
        &[Stage::Customer, Stage::DepositType]
    }

    #[allow(clippy::too_many_lines)]
    fn produce(&self, deps: &DependencyMap, params: &ProduceParams<'_>) -> Result<RecordBatch> {
        const STATUSES: [(&str, f64); 3] =
            [("active", 0.85), ("dormant", 0.10), ("closed", 0.05)];
        const CURRENCIES: [(&str, f64); 3] = [("CNY", 0.90), ("USD", 0.07), ("EUR", 0.03)];

        let customers = dep(deps, Stage::Customer)?;
        let deposit_types = dep(deps, Stage::DepositType)?;

        let demand_types: Vec<usize> = (0..deposit_types.len())
            .filter(|idx| {
                deposit_types
                    .record(*idx)
                    .get("max_term")
                    .and_then(Scalar::as_int)
                    == Some(0)
            })
            .collect();
        let term_types: Vec<usize> = (0..deposit_types.len())
            .filter(|idx| {
                deposit_types
                    .record(*idx)
                    .get("max_term")
                    .and_then(Scalar::as_int)
                    .is_some_and(|term| term > 0)
            })
            .collect();

        let mut rng = rand::rng();
        let mut accounts = Vec::new();
        for idx in 0..customers.len() {
            let customer = customers.record(idx);
            let customer_id = customer.text("customer_id").unwrap_or_default().to_string();
            let branch_id = customer.text("branch_id").unwrap_or_default().to_string();
            let is_vip = customer.bool("is_vip").unwrap_or(false);
            let registration = customer
                .date("registration_date")
                .unwrap_or(params.window.start);

            let count = 1 + usize::from(is_vip) + rng.random_range(0..=1);
            for _ in 0..count {
                let is_fixed = rng.random_bool(0.3) && !term_types.is_empty();
                let pool = if is_fixed { &term_types } else { &demand_types };
                let picked = if pool.is_empty() {
                    None
                } else {
                    Some(deposit_types.record(*pick(&mut rng, pool)))
                };

                let opening_date = random_date(&mut rng, registration, params.window.end);
                let (deposit_type_id, interest_rate) = picked.map_or((None, None), |dt| {
                    (
                        dt.text("deposit_type_id").map(ToString::to_string),
                        dt.get("base_interest_rate").and_then(Scalar::as_float),
                    )
                });
                let term = if is_fixed {
                    picked.and_then(|dt| dt.get("max_term").and_then(Scalar::as_int))
                } else {
                    None
                };
                let maturity_date =
                    term.map(|months| opening_date + Duration::days(months * 30));

                accounts.push(FundAccount {
                    account_id: gen_id("A"),
                    customer_id: customer_id.clone(),
                    account_type: if is_fixed { "fixed" } else { "current" }.to_string(),
                    status: (*pick_weighted(&mut rng, &STATUSES)).to_string(),
                    currency: (*pick_weighted(&mut rng, &CURRENCIES)).to_string(),
                    opening_date,
                    balance: round_cents(rng.random_range(1_000.0..500_000.0)),
                    branch_id: branch_id.clone(),
                    deposit_type_id,
                    interest_rate,
                    term,
                    maturity_date,
                });
            }
        }
        Ok(batch_from(&accounts))
    }
}

// ---------------------------------------------------------------------------
// app_user

struct AppUser {
    app_user_id: String,
    customer_id: String,
    device_type: String,
    os_version: String,
    register_time: DateTime<Utc>,
    last_login_time: DateTime<Utc>,
    login_count: i64,
    push_enabled: bool,
}

impl TableRecord for AppUser {
    const TABLE: &'static str = "app_user";
    const COLUMNS: &'static [&'static str] = &[
        "app_user_id",
        "customer_id",
        "device_type",
        "os_version",
        "register_time",
        "last_login_time",
        "login_count",
        "push_enabled",
    ];

    fn row(&self) -> Vec<Scalar> {
        vec![
            Scalar::from(self.app_user_id.clone()),
            Scalar::from(self.customer_id.clone()),
            Scalar::from(self.device_type.clone()),
            Scalar::from(self.os_version.clone()),
            Scalar::from(self.register_time),
            Scalar::from(self.last_login_time),
            Scalar::from(self.login_count),
            Scalar::from(self.push_enabled),
        ]
    }
}

pub struct AppUserProducer;

impl StageProducer for AppUserProducer {
    fn stage(&self) -> Stage {
        Stage::AppUser
    }

    fn dependencies(&self) -> &'static [Stage] {
        &[Stage::Customer]
    }

    fn produce(&self, deps: &DependencyMap, params: &ProduceParams<'_>) -> Result<RecordBatch> {
        let customers = dep(deps, Stage::Customer)?;
        let mut rng = rand::rng();
        let mut users = Vec::new();
        for idx in 0..customers.len() {
            if !rng.random_bool(0.6) {
                continue;
            }
            let customer = customers.record(idx);
            let registration = customer
                .date("registration_date")
                .unwrap_or(params.window.start);
            let register_day = random_date(&mut rng, registration, params.window.end);
            let login_day = random_date(&mut rng, register_day, params.window.end);
            let is_ios = rng.random_bool(0.45);
            users.push(AppUser {
                app_user_id: gen_id("U"),
                customer_id: customer.text("customer_id").unwrap_or_default().to_string(),
                device_type: if is_ios { "ios" } else { "android" }.to_string(),
                os_version: if is_ios {
                    format!("17.{}", rng.random_range(0..6))
                } else {
                    format!("14.{}", rng.random_range(0..3))
                },
                register_time: random_time_on(&mut rng, register_day),
                last_login_time: random_time_on(&mut rng, login_day),
                login_count: rng.random_range(1..=500),
                push_enabled: rng.random_bool(0.7),
            });
        }
        Ok(batch_from(&users))
    }
}

// ---------------------------------------------------------------------------
// wechat_follower

struct WechatFollower {
    follower_id: String,
    customer_id: String,
    nickname: String,
    follow_time: DateTime<Utc>,
    source: String,
    is_active: bool,
}

impl TableRecord for WechatFollower {
    const TABLE: &'static str = "wechat_follower";
    const COLUMNS: &'static [&'static str] = &[
        "follower_id",
        "customer_id",
        "nickname",
        "follow_time",
        "source",
        "is_active",
    ];

    fn row(&self) -> Vec<Scalar> {
        vec![
            Scalar::from(self.follower_id.clone()),
            Scalar::from(self.customer_id.clone()),
            Scalar::from(self.nickname.clone()),
            Scalar::from(self.follow_time),
            Scalar::from(self.source.clone()),
            Scalar::from(self.is_active),
        ]
    }
}

pub struct WechatFollowerProducer;

impl StageProducer for WechatFollowerProducer {
    fn stage(&self) -> Stage {
        Stage::WechatFollower
    }

    fn dependencies(&self) -> &'static [Stage] {
        &[Stage::Customer]
    }

    fn produce(&self, deps: &DependencyMap, params: &ProduceParams<'_>) -> Result<RecordBatch> {
        const SOURCES: [&str; 4] = ["qr_scan", "search", "share", "menu"];
        let customers = dep(deps, Stage::Customer)?;
        let mut rng = rand::rng();
        let mut followers = Vec::new();
        for idx in 0..customers.len() {
            if !rng.random_bool(0.5) {
                continue;
            }
            let customer = customers.record(idx);
            let registration = customer
                .date("registration_date")
                .unwrap_or(params.window.start);
            let follow_day = random_date(&mut rng, registration, params.window.end);
            followers.push(WechatFollower {
                follower_id: gen_id("WF"),
                customer_id: customer.text("customer_id").unwrap_or_default().to_string(),
                nickname: format!(
                    "{}{}",
                    pick(&mut rng, &GIVEN_NAMES),
                    rng.random_range(10..10_000)
                ),
                follow_time: random_time_on(&mut rng, follow_day),
                source: (*pick(&mut rng, &SOURCES)).to_string(),
                is_active: rng.random_bool(0.8),
            });
        }
        Ok(batch_from(&followers))
    }
}

// ---------------------------------------------------------------------------
// work_wechat_contact

struct WorkWechatContact {
    contact_id: String,
    customer_id: String,
    manager_id: String,
    add_time: DateTime<Utc>,
    remark: Option<String>,
    is_active: bool,
}

impl TableRecord for WorkWechatContact {
    const TABLE: &'static str = "work_wechat_contact";
    const COLUMNS: &'static [&'static str] = &[
        "contact_id",
        "customer_id",
        "manager_id",
        "add_time",
        "remark",
        "is_active",
    ];

    fn row(&self) -> Vec<Scalar> {
        vec![
            Scalar::from(self.contact_id.clone()),
            Scalar::from(self.customer_id.clone()),
            Scalar::from(self.manager_id.clone()),
            Scalar::from(self.add_time),
            Scalar::from(self.remark.clone()),
            Scalar::from(self.is_active),
        ]
    }
}

pub struct WorkWechatContactProducer;

impl StageProducer for WorkWechatContactProducer {
    fn stage(&self) -> Stage {
        Stage::WorkWechatContact
    }

    fn dependencies(&self) -> &'static [Stage] {
        &[Stage::Customer]
    }

    fn produce(&self, deps: &DependencyMap, params: &ProduceParams<'_>) -> Result<RecordBatch> {
        let customers = dep(deps, Stage::Customer)?;
        let mut rng = rand::rng();
        let mut contacts = Vec::new();
        for idx in 0..customers.len() {
            if !rng.random_bool(0.3) {
                continue;
            }
            let customer = customers.record(idx);
            let registration = customer
                .date("registration_date")
                .unwrap_or(params.window.start);
            let add_day = random_date(&mut rng, registration, params.window.end);
            contacts.push(WorkWechatContact {
                contact_id: gen_id("WC"),
                customer_id: customer.text("customer_id").unwrap_or_default().to_string(),
                manager_id: customer.text("manager_id").unwrap_or_default().to_string(),
                add_time: random_time_on(&mut rng, add_day),
                remark: if rng.random_bool(0.2) {
                    Some("priority follow-up".to_string())
                } else {
                    None
                },
                is_active: rng.random_bool(0.9),
            });
        }
        Ok(batch_from(&contacts))
    }
}

// ---------------------------------------------------------------------------
// channel_profile

struct ChannelProfile {
    profile_id: String,
    customer_id: String,
    has_app: bool,
    has_wechat: bool,
    has_work_wechat: bool,
    preferred_channel: String,
    last_active_time: Option<DateTime<Utc>>,
}

impl TableRecord for ChannelProfile {
    const TABLE: &'static str = "channel_profile";
    const COLUMNS: &'static [&'static str] = &[
        "profile_id",
        "customer_id",
        "has_app",
        "has_wechat",
        "has_work_wechat",
        "preferred_channel",
        "last_active_time",
    ];

    fn row(&self) -> Vec<Scalar> {
        vec![
            Scalar::from(self.profile_id.clone()),
            Scalar::from(self.customer_id.clone()),
            Scalar::from(self.has_app),
            Scalar::from(self.has_wechat),
            Scalar::from(self.has_work_wechat),
            Scalar::from(self.preferred_channel.clone()),
            self.last_active_time.map_or(Scalar::Null, Scalar::Timestamp),
        ]
    }
}

pub struct ChannelProfileProducer;

fn customer_ids_in(batch: &RecordBatch) -> HashSet<String> {
    batch
        .records()
        .filter_map(|record| record.text("customer_id").map(ToString::to_string))
        .collect()
}

impl StageProducer for ChannelProfileProducer {
    fn stage(&self) -> Stage {
        Stage::ChannelProfile
    }

    fn dependencies(&self) -> &'static [Stage] {
        &[
            Stage::Customer,
            Stage::AppUser,
            Stage::WechatFollower,
            Stage::WorkWechatContact,
        ]
    }

    fn produce(&self, deps: &DependencyMap, params: &ProduceParams<'_>) -> Result<RecordBatch> {
        let customers = dep(deps, Stage::Customer)?;
        let app_users = customer_ids_in(dep(deps, Stage::AppUser)?);
        let wechat = customer_ids_in(dep(deps, Stage::WechatFollower)?);
        let work_wechat = customer_ids_in(dep(deps, Stage::WorkWechatContact)?);

        let mut rng = rand::rng();
        let mut profiles = Vec::new();
        for idx in 0..customers.len() {
            let customer = customers.record(idx);
            let customer_id = customer.text("customer_id").unwrap_or_default().to_string();
            let has_app = app_users.contains(&customer_id);
            let has_wechat = wechat.contains(&customer_id);
            let has_work_wechat = work_wechat.contains(&customer_id);
            let preferred_channel = if has_app {
                "mobile_app"
            } else if has_wechat {
                "wechat"
            } else if has_work_wechat {
                "work_wechat"
            } else {
                "branch"
            };
            let last_active_time = if has_app || has_wechat || has_work_wechat {
                let day = random_date(&mut rng, params.window.start, params.window.end);
                Some(random_time_on(&mut rng, day))
            } else {
                None
            };
            profiles.push(ChannelProfile {
                profile_id: gen_id("CP"),
                customer_id,
                has_app,
                has_wechat,
                has_work_wechat,
                preferred_channel: preferred_channel.to_string(),
                last_active_time,
            });
        }
        Ok(batch_from(&profiles))
    }
}

// ---------------------------------------------------------------------------
// loan_record

struct LoanRecord {
    loan_id: String,
    customer_id: String,
    account_id: String,
    loan_type: String,
    amount: f64,
    interest_rate: f64,
    term: i64,
    start_date: NaiveDate,
    end_date: NaiveDate,
    status: String,
}

impl TableRecord for LoanRecord {
    const TABLE: &'static str = "loan_record";
    const COLUMNS: &'static [&'static str] = &[
        "loan_id",
        "customer_id",
        "account_id",
        "loan_type",
        "amount",
        "interest_rate",
        "term",
        "start_date",
        "end_date",
        "status",
    ];

    fn row(&self) -> Vec<Scalar> {
        vec![
            Scalar::from(self.loan_id.clone()),
            Scalar::from(self.customer_id.clone()),
            Scalar::from(self.account_id.clone()),
            Scalar::from(self.loan_type.clone()),
            Scalar::from(self.amount),
            Scalar::from(self.interest_rate),
            Scalar::from(self.term),
            Scalar::from(self.start_date),
            Scalar::from(self.end_date),
            Scalar::from(self.status.clone()),
        ]
    }
}

fn accounts_by_customer(accounts: &RecordBatch) -> HashMap<String, Vec<String>> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for record in accounts.records() {
        let (Some(customer_id), Some(account_id)) =
            (record.text("customer_id"), record.text("account_id"))
        else {
            continue;
        };
        map.entry(customer_id.to_string())
            .or_default()
            .push(account_id.to_string());
    }
    map
}

pub struct LoanRecordProducer;

impl StageProducer for LoanRecordProducer {
    fn stage(&self) -> Stage {
        Stage::LoanRecord
    }

    fn dependencies(&self) -> &'static [Stage] {
        &[Stage::Customer, Stage::FundAccount]
    }

    fn produce(&self, deps: &DependencyMap, params: &ProduceParams<'_>) -> Result<RecordBatch> {
        const LOAN_TYPES: [&str; 5] = [
            "consumer",
            "mortgage",
            "auto",
            "education",
            "small_business",
        ];
        const STATUSES: [(&str, f64); 3] =
            [("repaying", 0.60), ("settled", 0.30), ("overdue", 0.10)];

        let customers = dep(deps, Stage::Customer)?;
        let by_customer = accounts_by_customer(dep(deps, Stage::FundAccount)?);

        let mut rng = rand::rng();
        let mut loans = Vec::new();
        for idx in 0..customers.len() {
            if !rng.random_bool(0.25) {
                continue;
            }
            let customer = customers.record(idx);
            let customer_id = customer.text("customer_id").unwrap_or_default().to_string();
            let Some(account_ids) = by_customer.get(&customer_id) else {
                continue;
            };
            for _ in 0..rng.random_range(1..=2) {
                let term = *pick(&mut rng, &[6_i64, 12, 24, 36, 60, 120, 240, 360]);
                let start_date =
                    random_date(&mut rng, params.window.start, params.window.end);
                loans.push(LoanRecord {
                    loan_id: gen_id("L"),
                    customer_id: customer_id.clone(),
                    account_id: pick(&mut rng, account_ids).clone(),
                    loan_type: (*pick(&mut rng, &LOAN_TYPES)).to_string(),
                    amount: round_cents(rng.random_range(10_000.0..1_000_000.0)),
                    interest_rate: rng.random_range(0.03..0.10),
                    term,
                    start_date,
                    end_date: start_date + Duration::days(term * 30),
                    status: (*pick_weighted(&mut rng, &STATUSES)).to_string(),
                });
            }
        }
        Ok(batch_from(&loans))
    }
}

// ---------------------------------------------------------------------------
// investment_record

struct InvestmentRecord {
    investment_id: String,
    customer_id: String,
    account_id: String,
    product_id: String,
    amount: f64,
    purchase_date: NaiveDate,
    maturity_date: Option<NaiveDate>,
    expected_return: Option<f64>,
    status: String,
    channel: String,
}

impl TableRecord for InvestmentRecord {
    const TABLE: &'static str = "investment_record";
    const COLUMNS: &'static [&'static str] = &[
        "investment_id",
        "customer_id",
        "account_id",
        "product_id",
        "amount",
        "purchase_date",
        "maturity_date",
        "expected_return",
        "status",
        "channel",
    ];

    fn row(&self) -> Vec<Scalar> {
        vec![
            Scalar::from(self.investment_id.clone()),
            Scalar::from(self.customer_id.clone()),
            Scalar::from(self.account_id.clone()),
            Scalar::from(self.product_id.clone()),
            Scalar::from(self.amount),
            Scalar::from(self.purchase_date),
            Scalar::from(self.maturity_date),
            Scalar::from(self.expected_return),
            Scalar::from(self.status.clone()),
            Scalar::from(self.channel.clone()),
        ]
    }
}

pub struct InvestmentRecordProducer;

impl StageProducer for InvestmentRecordProducer {
    fn stage(&self) -> Stage {
        Stage::InvestmentRecord
    }

    fn dependencies(&self) -> &'static [Stage] {
        &[Stage::Customer, Stage::FundAccount, Stage::Product]
    }

    fn produce(&self, deps: &DependencyMap, params: &ProduceParams<'_>) -> Result<RecordBatch> {
        const CHANNELS: [&str; 3] = ["mobile_app", "online_banking", "counter"];

        let customers = dep(deps, Stage::Customer)?;
        let by_customer = accounts_by_customer(dep(deps, Stage::FundAccount)?);
        let products = dep(deps, Stage::Product)?;
        let wealth_products: Vec<usize> = (0..products.len())
            .filter(|idx| products.record(*idx).text("type") == Some("investment"))
            .collect();
        if wealth_products.is_empty() {
            return Ok(batch_from::<InvestmentRecord>(&[]));
        }

        let mut rng = rand::rng();
        let mut investments = Vec::new();
        for idx in 0..customers.len() {
            if !rng.random_bool(0.3) {
                continue;
            }
            let customer = customers.record(idx);
            let customer_id = customer.text("customer_id").unwrap_or_default().to_string();
            let Some(account_ids) = by_customer.get(&customer_id) else {
                continue;
            };
            for _ in 0..rng.random_range(1..=3) {
                let product = products.record(*pick(&mut rng, &wealth_products));
                let purchase_date =
                    random_date(&mut rng, params.window.start, params.window.end);
                let maturity_date = product
                    .get("term")
                    .and_then(Scalar::as_int)
                    .map(|days| purchase_date + Duration::days(days));
                investments.push(InvestmentRecord {
                    investment_id: gen_id("I"),
                    customer_id: customer_id.clone(),
                    account_id: pick(&mut rng, account_ids).clone(),
                    product_id: product.text("product_id").unwrap_or_default().to_string(),
                    amount: round_cents(rng.random_range(10_000.0..200_000.0)),
                    purchase_date,
                    maturity_date,
                    expected_return: product.get("expected_return").and_then(Scalar::as_float),
                    status: if rng.random_bool(0.75) { "holding" } else { "redeemed" }
                        .to_string(),
                    channel: (*pick(&mut rng, &CHANNELS)).to_string(),
                });
            }
        }
        Ok(batch_from(&investments))
    }
}

// ---------------------------------------------------------------------------
// customer_event

struct CustomerEvent {
    event_id: String,
    customer_id: String,
    product_id: Option<String>,
    event_type: String,
    event_time: DateTime<Utc>,
    channel: String,
    detail: String,
}

impl TableRecord for CustomerEvent {
    const TABLE: &'static str = "customer_event";
    const COLUMNS: &'static [&'static str] = &[
        "event_id",
        "customer_id",
        "product_id",
        "event_type",
        "event_time",
        "channel",
        "detail",
    ];

    fn row(&self) -> Vec<Scalar> {
        vec![
            Scalar::from(self.event_id.clone()),
            Scalar::from(self.customer_id.clone()),
            Scalar::from(self.product_id.clone()),
            Scalar::from(self.event_type.clone()),
            Scalar::from(self.event_time),
            Scalar::from(self.channel.clone()),
            Scalar::from(self.detail.clone()),
        ]
    }
}

pub struct CustomerEventProducer {
    days_per_slice: u32,
}

impl CustomerEventProducer {
    #[must_use]
    pub fn new(days_per_slice: u32) -> Self {
        Self { days_per_slice }
    }
}

impl StageProducer for CustomerEventProducer {
    fn stage(&self) -> Stage {
        Stage::CustomerEvent
    }

    fn dependencies(&self) -> &'static [Stage] {
        &[Stage::Customer, Stage::Product]
    }

    fn partitioning(&self) -> Partitioning {
        Partitioning::ByDateRange {
            days_per_slice: self.days_per_slice,
        }
    }

    fn produce(&self, deps: &DependencyMap, params: &ProduceParams<'_>) -> Result<RecordBatch> {
        const EVENT_TYPES: [&str; 5] = [
            "page_view",
            "product_click",
            "consultation",
            "purchase_intent",
            "share",
        ];
        const CHANNELS: [&str; 4] = ["mobile_app", "wechat", "online_banking", "branch"];

        let customers = dep(deps, Stage::Customer)?;
        let products = dep(deps, Stage::Product)?;
        let selected = customers.len().min(params.counts.max_event_customers);

        let mut rng = rand::rng();
        let mut events = Vec::new();
        for idx in 0..selected {
            let customer = customers.record(idx);
            let customer_id = customer.text("customer_id").unwrap_or_default().to_string();
            for _ in 0..rng.random_range(0..=2) {
                let day = random_date(&mut rng, params.window.start, params.window.end);
                let product_id = if !products.is_empty() && rng.random_bool(0.7) {
                    products
                        .record(rng.random_range(0..products.len()))
                        .text("product_id")
                        .map(ToString::to_string)
                } else {
                    None
                };
                let event_type = *pick(&mut rng, &EVENT_TYPES);
                events.push(CustomerEvent {
                    event_id: gen_id("E"),
                    customer_id: customer_id.clone(),
                    product_id,
                    event_type: event_type.to_string(),
                    event_time: random_time_on(&mut rng, day),
                    channel: (*pick(&mut rng, &CHANNELS)).to_string(),
                    detail: format!("{event_type} event"),
                });
            }
        }
        Ok(batch_from(&events))
    }
}

// ---------------------------------------------------------------------------
// transaction

struct Transaction {
    transaction_id: String,
    account_id: String,
    transaction_type: String,
    amount: f64,
    transaction_time: DateTime<Utc>,
    status: String,
    description: String,
    channel: String,
}

impl TableRecord for Transaction {
    const TABLE: &'static str = "account_transaction";
    const COLUMNS: &'static [&'static str] = &[
        "transaction_id",
        "account_id",
        "transaction_type",
        "amount",
        "transaction_time",
        "status",
        "description",
        "channel",
    ];

    fn row(&self) -> Vec<Scalar> {
        vec![
            Scalar::from(self.transaction_id.clone()),
            Scalar::from(self.account_id.clone()),
            Scalar::from(self.transaction_type.clone()),
            Scalar::from(self.amount),
            Scalar::from(self.transaction_time),
            Scalar::from(self.status.clone()),
            Scalar::from(self.description.clone()),
            Scalar::from(self.channel.clone()),
        ]
    }
}

pub struct TransactionProducer {
    days_per_slice: u32,
}

impl TransactionProducer {
    #[must_use]
    pub fn new(days_per_slice: u32) -> Self {
        Self { days_per_slice }
    }
}

impl StageProducer for TransactionProducer {
    fn stage(&self) -> Stage {
        Stage::Transaction
    }

    fn dependencies(&self) -> &'static [Stage] {
        &[Stage::FundAccount]
    }

    fn partitioning(&self) -> Partitioning {
        Partitioning::ByDateRange {
            days_per_slice: self.days_per_slice,
        }
    }

    fn produce(&self, deps: &DependencyMap, params: &ProduceParams<'_>) -> Result<RecordBatch> {
        const TYPES: [(&str, f64); 5] = [
            ("deposit", 0.30),
            ("withdrawal", 0.25),
            ("transfer_in", 0.15),
            ("transfer_out", 0.15),
            ("payment", 0.15),
        ];
        const CHANNELS: [(&str, f64); 4] = [
            ("mobile_app", 0.40),
            ("online_banking", 0.25),
            ("atm", 0.20),
            ("counter", 0.15),
        ];

        let accounts = dep(deps, Stage::FundAccount)?;
        let active: Vec<usize> = (0..accounts.len())
            .filter(|idx| accounts.record(*idx).text("status") == Some("active"))
            .take(params.counts.max_active_accounts)
            .collect();

        let mut rng = rand::rng();
        let mut transactions = Vec::new();
        for idx in &active {
            let account = accounts.record(*idx);
            let account_id = account.text("account_id").unwrap_or_default().to_string();
            for _ in 0..rng.random_range(0..=3) {
                let day = random_date(&mut rng, params.window.start, params.window.end);
                let transaction_type = *pick_weighted(&mut rng, &TYPES);
                let channel = *pick_weighted(&mut rng, &CHANNELS);
                transactions.push(Transaction {
                    transaction_id: gen_id("T"),
                    account_id: account_id.clone(),
                    transaction_type: transaction_type.to_string(),
                    amount: round_cents(rng.random_range(10.0..50_000.0)),
                    transaction_time: random_time_on(&mut rng, day),
                    status: "success".to_string(),
                    description: format!("{transaction_type} via {channel}"),
                    channel: channel.to_string(),
                });
            }
        }
        Ok(batch_from(&transactions))
    }
}
