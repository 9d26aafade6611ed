//! Business-table DDL. Mirrors the columns the built-in producers emit so a
//! fresh database can be populated end to end.

use crate::store::{Storage, StoreError};

const TABLE_DDL: [&str; 13] = [
    r"
    CREATE TABLE IF NOT EXISTS bank_manager (
        manager_id VARCHAR(50) PRIMARY KEY,
        name TEXT NOT NULL,
        branch_id VARCHAR(20) NOT NULL,
        phone VARCHAR(30),
        email TEXT,
        customer_count BIGINT,
        position TEXT
    )",
    r"
    CREATE TABLE IF NOT EXISTS deposit_type (
        deposit_type_id VARCHAR(50) PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT,
        base_interest_rate DOUBLE PRECISION NOT NULL,
        min_term BIGINT NOT NULL,
        max_term BIGINT NOT NULL,
        min_amount DOUBLE PRECISION NOT NULL
    )",
    r"
    CREATE TABLE IF NOT EXISTS product (
        product_id VARCHAR(50) PRIMARY KEY,
        name TEXT NOT NULL,
        type VARCHAR(20) NOT NULL,
        interest_rate DOUBLE PRECISION,
        term BIGINT NOT NULL,
        expected_return DOUBLE PRECISION,
        risk_level VARCHAR(10)
    )",
    r"
    CREATE TABLE IF NOT EXISTS customer (
        customer_id VARCHAR(50) PRIMARY KEY,
        name TEXT NOT NULL,
        id_number VARCHAR(40),
        phone VARCHAR(30),
        email TEXT,
        gender VARCHAR(10),
        birth_date DATE,
        registration_date DATE NOT NULL,
        customer_type VARCHAR(20) NOT NULL,
        credit_score BIGINT NOT NULL,
        is_vip BOOLEAN NOT NULL,
        branch_id VARCHAR(20) NOT NULL,
        manager_id VARCHAR(50) NOT NULL,
        annual_income DOUBLE PRECISION
    )",
    r"
    CREATE TABLE IF NOT EXISTS fund_account (
        account_id VARCHAR(50) PRIMARY KEY,
        customer_id VARCHAR(50) NOT NULL,
        account_type VARCHAR(20) NOT NULL,
        status VARCHAR(20) NOT NULL,
        currency VARCHAR(10) NOT NULL,
        opening_date DATE NOT NULL,
        balance DOUBLE PRECISION NOT NULL,
        branch_id VARCHAR(20) NOT NULL,
        deposit_type_id VARCHAR(50),
        interest_rate DOUBLE PRECISION,
        term BIGINT,
        maturity_date DATE
    )",
    r"
    CREATE TABLE IF NOT EXISTS app_user (
        app_user_id VARCHAR(50) PRIMARY KEY,
        customer_id VARCHAR(50) NOT NULL,
        device_type VARCHAR(20) NOT NULL,
        os_version VARCHAR(20),
        register_time TIMESTAMPTZ NOT NULL,
        last_login_time TIMESTAMPTZ,
        login_count BIGINT NOT NULL,
        push_enabled BOOLEAN NOT NULL
    )",
    r"
    CREATE TABLE IF NOT EXISTS wechat_follower (
        follower_id VARCHAR(50) PRIMARY KEY,
        customer_id VARCHAR(50) NOT NULL,
        nickname TEXT,
        follow_time TIMESTAMPTZ NOT NULL,
        source VARCHAR(30),
        is_active BOOLEAN NOT NULL
    )",
    r"
    CREATE TABLE IF NOT EXISTS work_wechat_contact (
        contact_id VARCHAR(50) PRIMARY KEY,
        customer_id VARCHAR(50) NOT NULL,
        manager_id VARCHAR(50) NOT NULL,
        add_time TIMESTAMPTZ NOT NULL,
        remark TEXT,
        is_active BOOLEAN NOT NULL
    )",
    r"
    CREATE TABLE IF NOT EXISTS channel_profile (
        profile_id VARCHAR(50) PRIMARY KEY,
        customer_id VARCHAR(50) NOT NULL,
        has_app BOOLEAN NOT NULL,
        has_wechat BOOLEAN NOT NULL,
        has_work_wechat BOOLEAN NOT NULL,
        preferred_channel VARCHAR(30) NOT NULL,
        last_active_time TIMESTAMPTZ
    )",
    r"
    CREATE TABLE IF NOT EXISTS loan_record (
        loan_id VARCHAR(50) PRIMARY KEY,
        customer_id VARCHAR(50) NOT NULL,
        account_id VARCHAR(50) NOT NULL,
        loan_type VARCHAR(40) NOT NULL,
        amount DOUBLE PRECISION NOT NULL,
        interest_rate DOUBLE PRECISION NOT NULL,
        term BIGINT NOT NULL,
        start_date DATE NOT NULL,
        end_date DATE NOT NULL,
        status VARCHAR(20) NOT NULL
    )",
    r"
    CREATE TABLE IF NOT EXISTS investment_record (
        investment_id VARCHAR(50) PRIMARY KEY,
        customer_id VARCHAR(50) NOT NULL,
        account_id VARCHAR(50) NOT NULL,
        product_id VARCHAR(50) NOT NULL,
        amount DOUBLE PRECISION NOT NULL,
        purchase_date DATE NOT NULL,
        maturity_date DATE,
        expected_return DOUBLE PRECISION,
        status VARCHAR(20) NOT NULL,
        channel VARCHAR(30) NOT NULL
    )",
    r"
    CREATE TABLE IF NOT EXISTS customer_event (
        event_id VARCHAR(50) PRIMARY KEY,
        customer_id VARCHAR(50) NOT NULL,
        product_id VARCHAR(50),
        event_type VARCHAR(40) NOT NULL,
        event_time TIMESTAMPTZ NOT NULL,
        channel VARCHAR(30) NOT NULL,
        detail TEXT
    )",
    r"
    CREATE TABLE IF NOT EXISTS account_transaction (
        transaction_id VARCHAR(50) PRIMARY KEY,
        account_id VARCHAR(50) NOT NULL,
        transaction_type VARCHAR(30) NOT NULL,
        amount DOUBLE PRECISION NOT NULL,
        transaction_time TIMESTAMPTZ NOT NULL,
        status VARCHAR(20) NOT NULL,
        description TEXT,
        channel VARCHAR(30) NOT NULL
    )",
];

/// Create every business table that is missing. Idempotent.
pub async fn ensure_business_tables(storage: &dyn Storage) -> Result<(), StoreError> {
    for ddl in TABLE_DDL {
        storage.update(ddl, &[]).await?;
    }
    Ok(())
}
