//! Property-based test generators using proptest.
//!
//! Generated documents are always valid: ids are dense and every foreign
//! key resolves inside the document.

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use std::collections::BTreeMap;
use tally_codec::{
    AccessRecord, AccountRecord, AlertRecord, BudgetRecord, CategoryRecord, OperationRecord,
    SnapshotDocument, DEFAULT_ACCOUNT_ID, DEFAULT_SETTINGS,
};
use tally_store::{AlertFrequency, AlertKind, AlertOrder, CustomField};

/// Strategy for free-text labels, including non-ASCII characters.
pub fn label_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z0-9 éèçà'&-]{1,24}").expect("Invalid regex")
}

/// Strategy for amounts in cents, as floats.
pub fn amount_strategy() -> impl Strategy<Value = f64> {
    (-10_000_000i64..10_000_000).prop_map(|cents| cents as f64 / 100.0)
}

/// Strategy for dates between 1970 and 2060, at second precision.
pub fn date_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..2_840_000_000).prop_map(|secs| Utc.timestamp_opt(secs, 0).unwrap())
}

/// Strategy for exportable settings, without the default account.
pub fn settings_strategy() -> impl Strategy<Value = BTreeMap<String, String>> {
    let keys: Vec<&'static str> = DEFAULT_SETTINGS
        .iter()
        .filter(|def| !def.ghost && def.key != DEFAULT_ACCOUNT_ID)
        .map(|def| def.key)
        .collect();
    let max = keys.len();
    prop::sample::subsequence(keys, 0..=max).prop_flat_map(|keys| {
        prop::collection::vec("[a-z0-9-]{0,12}", keys.len()).prop_map(move |values| {
            keys.iter()
                .map(|k| k.to_string())
                .zip(values)
                .collect::<BTreeMap<_, _>>()
        })
    })
}

fn access_strategy() -> impl Strategy<Value = AccessRecord> {
    (
        prop::sample::select(vec!["demo", "fakebank", "cmb", "boursorama"]),
        "[a-z0-9.@]{3,16}",
        prop::option::of("[!-~]{4,16}"),
        prop::collection::vec(("[a-z]{3,8}", prop::option::of("[a-z0-9]{1,8}")), 0..3),
        prop::option::of(label_strategy()),
    )
        .prop_map(|(vendor, login, password, fields, custom_label)| AccessRecord {
            id: 0,
            vendor_id: vendor.to_string(),
            login,
            password,
            custom_fields: fields
                .into_iter()
                .map(|(name, value)| CustomField { name, value })
                .collect(),
            custom_label,
        })
}

fn account_strategy() -> impl Strategy<Value = AccountRecord> {
    (
        any::<u64>(),
        "[0-9]{6,11}",
        label_strategy(),
        prop::option::of(label_strategy()),
        prop::option::of("FR76[0-9]{10}"),
        prop::option::of(prop::sample::select(vec!["EUR", "USD", "CHF"])),
        amount_strategy(),
        date_strategy(),
        any::<bool>(),
    )
        .prop_map(
            |(access, number, label, custom_label, iban, currency, balance, date, exclude)| {
                AccountRecord {
                    id: 0,
                    access_id: access,
                    vendor_account_id: number,
                    label,
                    custom_label,
                    iban,
                    currency: currency.map(str::to_string),
                    account_type: "account-type.checking".into(),
                    initial_balance: balance,
                    import_date: date,
                    exclude_from_balance: exclude,
                }
            },
        )
}

fn category_strategy() -> impl Strategy<Value = CategoryRecord> {
    (label_strategy(), prop::option::of("#[0-9a-f]{6}")).prop_map(|(label, color)| {
        CategoryRecord {
            id: 0,
            label,
            color,
        }
    })
}

fn operation_strategy() -> impl Strategy<Value = OperationRecord> {
    (
        any::<u64>(),
        prop::option::of(any::<u64>()),
        label_strategy(),
        amount_strategy(),
        date_strategy(),
        prop::option::of(date_strategy()),
        prop::sample::select(vec!["type.card", "type.transfer", "type.order", "type.unknown"]),
        any::<bool>(),
    )
        .prop_map(
            |(account, category, label, amount, date, budget_date, kind, manual)| OperationRecord {
                account_id: account,
                category_id: category,
                raw_label: label.to_uppercase(),
                label,
                custom_label: None,
                amount,
                date,
                debit_date: None,
                budget_date,
                transaction_type: kind.to_string(),
                created_by_user: manual,
            },
        )
}

fn budget_strategy() -> impl Strategy<Value = BudgetRecord> {
    (any::<u64>(), 2000i32..2040, 0u32..12, prop::option::of(amount_strategy())).prop_map(
        |(category, year, month, threshold)| BudgetRecord {
            category_id: category,
            year,
            month,
            threshold,
        },
    )
}

fn alert_strategy() -> impl Strategy<Value = AlertRecord> {
    (
        any::<u64>(),
        prop_oneof![
            Just(AlertKind::Report),
            Just(AlertKind::Balance),
            Just(AlertKind::Transaction)
        ],
        prop::option::of(prop_oneof![
            Just(AlertFrequency::Daily),
            Just(AlertFrequency::Weekly),
            Just(AlertFrequency::Monthly)
        ]),
        prop::option::of(amount_strategy()),
        prop::option::of(prop_oneof![Just(AlertOrder::Lt), Just(AlertOrder::Gt)]),
    )
        .prop_map(|(account, kind, frequency, limit, order)| AlertRecord {
            account_id: account,
            kind,
            frequency,
            limit,
            order,
        })
}

/// Reduces a raw foreign key into `0..len`.
fn pick(raw: u64, len: usize) -> u64 {
    raw % len as u64
}

/// Strategy for valid snapshot documents.
pub fn document_strategy() -> impl Strategy<Value = SnapshotDocument> {
    (
        prop::collection::vec(access_strategy(), 0..4),
        prop::collection::vec(account_strategy(), 0..6),
        prop::collection::vec(category_strategy(), 0..6),
        prop::collection::vec(operation_strategy(), 0..30),
        prop::collection::vec(budget_strategy(), 0..6),
        prop::collection::vec(alert_strategy(), 0..4),
        settings_strategy(),
        any::<Option<u64>>(),
    )
        .prop_map(
            |(
                mut accesses,
                mut accounts,
                mut categories,
                mut operations,
                mut budgets,
                mut alerts,
                mut settings,
                default_account,
            )| {
                for (i, access) in accesses.iter_mut().enumerate() {
                    access.id = i as u64;
                }
                if accesses.is_empty() {
                    accounts.clear();
                }
                for (i, account) in accounts.iter_mut().enumerate() {
                    account.id = i as u64;
                    account.access_id = pick(account.access_id, accesses.len());
                }
                for (i, category) in categories.iter_mut().enumerate() {
                    category.id = i as u64;
                }
                if accounts.is_empty() {
                    operations.clear();
                    alerts.clear();
                }
                for op in &mut operations {
                    op.account_id = pick(op.account_id, accounts.len());
                    op.category_id = op
                        .category_id
                        .filter(|_| !categories.is_empty())
                        .map(|c| pick(c, categories.len()));
                }
                if categories.is_empty() {
                    budgets.clear();
                }
                for budget in &mut budgets {
                    budget.category_id = pick(budget.category_id, categories.len());
                }
                for alert in &mut alerts {
                    alert.account_id = pick(alert.account_id, accounts.len());
                }
                if let Some(raw) = default_account.filter(|_| !accounts.is_empty()) {
                    settings.insert(
                        DEFAULT_ACCOUNT_ID.to_string(),
                        pick(raw, accounts.len()).to_string(),
                    );
                }

                SnapshotDocument {
                    accesses,
                    accounts,
                    categories,
                    operations,
                    budgets,
                    settings,
                    alerts,
                    ..SnapshotDocument::new()
                }
            },
        )
}
