//! Row model for the persisted collections.
//!
//! Entity values carry no id of their own. The store wraps every value in
//! a [`Row`] that records the storage id and the owning user. Foreign keys
//! inside values (`access_id`, `account_id`, `category_id`) are storage
//! ids of rows owned by the same user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Storage-level identifier assigned by the store on insert.
pub type RowId = u64;

/// Identifier of the user (tenant) owning a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The persisted collections, in dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    /// Bank accesses (credentials).
    Accesses,
    /// Bank accounts, each owned by an access.
    Accounts,
    /// Transaction categories.
    Categories,
    /// Transactions (operations).
    Transactions,
    /// Monthly budgets per category.
    Budgets,
    /// Key/value settings.
    Settings,
    /// Alerts attached to accounts.
    Alerts,
}

impl Collection {
    /// All collections in the order they must be written.
    pub const ALL: [Collection; 7] = [
        Collection::Accesses,
        Collection::Accounts,
        Collection::Categories,
        Collection::Transactions,
        Collection::Budgets,
        Collection::Settings,
        Collection::Alerts,
    ];

    /// Returns the collection name as used in documents and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Collection::Accesses => "accesses",
            Collection::Accounts => "accounts",
            Collection::Categories => "categories",
            Collection::Transactions => "operations",
            Collection::Budgets => "budgets",
            Collection::Settings => "settings",
            Collection::Alerts => "alerts",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored entity together with its storage id and owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row<T> {
    /// Storage id, unique within the collection.
    pub id: RowId,
    /// Owning user.
    pub user_id: UserId,
    /// The entity itself.
    pub value: T,
}

/// A vendor-specific login field attached to an access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomField {
    /// Field name as defined by the vendor.
    pub name: String,
    /// Field value, if set.
    pub value: Option<String>,
}

/// Credentials for one bank vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Access {
    /// Vendor (bank module) identifier.
    pub vendor_id: String,
    /// Login name.
    pub login: String,
    /// Secret, absent when the user never stored one.
    pub password: Option<String>,
    /// Additional vendor-specific fields.
    #[serde(default)]
    pub custom_fields: Vec<CustomField>,
    /// User-chosen label.
    #[serde(default)]
    pub custom_label: Option<String>,
}

/// A bank account reachable through an access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Owning access (storage id).
    pub access_id: RowId,
    /// Account number as reported by the vendor.
    pub vendor_account_id: String,
    /// Label as reported by the vendor.
    pub label: String,
    /// User-chosen label.
    #[serde(default)]
    pub custom_label: Option<String>,
    /// IBAN, when known.
    #[serde(default)]
    pub iban: Option<String>,
    /// ISO 4217 currency code.
    #[serde(default)]
    pub currency: Option<String>,
    /// Account type identifier.
    pub account_type: String,
    /// Balance before the first imported transaction.
    pub initial_balance: f64,
    /// When the account was first imported.
    pub import_date: DateTime<Utc>,
    /// Whether the account is left out of the global balance.
    #[serde(default)]
    pub exclude_from_balance: bool,
}

/// A transaction category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Display label.
    pub label: String,
    /// Display color (`#rrggbb`).
    #[serde(default)]
    pub color: Option<String>,
}

impl Category {
    /// Creates a category without a color.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            color: None,
        }
    }
}

/// A binary file attached to a transaction. Never exported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Original file name.
    pub file_name: String,
    /// MIME type.
    pub content_type: String,
    /// File contents.
    pub bytes: Vec<u8>,
}

/// A single bank transaction (operation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Owning account (storage id).
    pub account_id: RowId,
    /// Category (storage id), if categorized.
    #[serde(default)]
    pub category_id: Option<RowId>,
    /// Cleaned-up label.
    pub label: String,
    /// Label exactly as reported by the vendor.
    pub raw_label: String,
    /// User-chosen label.
    #[serde(default)]
    pub custom_label: Option<String>,
    /// Signed amount.
    pub amount: f64,
    /// Operation date.
    pub date: DateTime<Utc>,
    /// Date the amount is debited, for deferred cards.
    #[serde(default)]
    pub debit_date: Option<DateTime<Utc>>,
    /// Date the operation counts against budgets, if overridden.
    #[serde(default)]
    pub budget_date: Option<DateTime<Utc>>,
    /// Transaction type identifier (`type.card`, `type.transfer`, ...).
    pub transaction_type: String,
    /// Whether the user created the transaction by hand.
    #[serde(default)]
    pub created_by_user: bool,
    /// Attached files.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// A monthly spending threshold for a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Budget {
    /// Category (storage id).
    pub category_id: RowId,
    /// Calendar year.
    pub year: i32,
    /// Calendar month, 0-based.
    pub month: u32,
    /// Threshold amount, if set.
    #[serde(default)]
    pub threshold: Option<f64>,
}

/// What an alert watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    /// Periodic account report.
    Report,
    /// Balance crossing a limit.
    Balance,
    /// Single transaction crossing a limit.
    Transaction,
}

/// How often a report alert fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertFrequency {
    /// Every day.
    Daily,
    /// Every week.
    Weekly,
    /// Every month.
    Monthly,
}

/// Comparison used by balance and transaction alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertOrder {
    /// Fires when the value is lower than or equal to the limit.
    Lt,
    /// Fires when the value is greater than or equal to the limit.
    Gt,
}

/// An alert attached to an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// Watched account (storage id).
    pub account_id: RowId,
    /// Alert type.
    pub kind: AlertKind,
    /// Report frequency.
    #[serde(default)]
    pub frequency: Option<AlertFrequency>,
    /// Threshold for balance/transaction alerts.
    #[serde(default)]
    pub limit: Option<f64>,
    /// Comparison for balance/transaction alerts.
    #[serde(default)]
    pub order: Option<AlertOrder>,
}

/// Everything one user owns, read at a single point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserData {
    /// Accesses in storage id order.
    pub accesses: Vec<Row<Access>>,
    /// Accounts in storage id order.
    pub accounts: Vec<Row<Account>>,
    /// Categories in storage id order.
    pub categories: Vec<Row<Category>>,
    /// Transactions in storage id order.
    pub transactions: Vec<Row<Transaction>>,
    /// Budgets in storage id order.
    pub budgets: Vec<Row<Budget>>,
    /// Settings by key.
    pub settings: BTreeMap<String, String>,
    /// Alerts in storage id order.
    pub alerts: Vec<Row<Alert>>,
}

impl UserData {
    /// Returns the number of rows in a collection.
    #[must_use]
    pub fn count(&self, collection: Collection) -> usize {
        match collection {
            Collection::Accesses => self.accesses.len(),
            Collection::Accounts => self.accounts.len(),
            Collection::Categories => self.categories.len(),
            Collection::Transactions => self.transactions.len(),
            Collection::Budgets => self.budgets.len(),
            Collection::Settings => self.settings.len(),
            Collection::Alerts => self.alerts.len(),
        }
    }
}
