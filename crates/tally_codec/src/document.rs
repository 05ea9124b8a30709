//! The snapshot document schema.
//!
//! Ids inside a document are document-local: dense, zero-based and
//! assigned in traversal order at export time. They never correspond to
//! storage ids on either side of an export/import.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tally_store::{AlertFrequency, AlertKind, AlertOrder, Collection, CustomField};

/// Format version written by this build.
pub const CURRENT_FORMAT_VERSION: u32 = 2;

/// Version assumed for documents that predate the `formatVersion` field.
pub const LEGACY_FORMAT_VERSION: u32 = 1;

/// Document-local identifier.
pub type DocId = u64;

/// The portable representation of one user's dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDocument {
    /// Format version of this document.
    pub format_version: u32,
    /// Bank accesses.
    #[serde(default)]
    pub accesses: Vec<AccessRecord>,
    /// Bank accounts.
    #[serde(default)]
    pub accounts: Vec<AccountRecord>,
    /// Categories.
    #[serde(default)]
    pub categories: Vec<CategoryRecord>,
    /// Transactions.
    #[serde(default)]
    pub operations: Vec<OperationRecord>,
    /// Budgets.
    #[serde(default)]
    pub budgets: Vec<BudgetRecord>,
    /// Whitelisted settings.
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
    /// Alerts.
    #[serde(default)]
    pub alerts: Vec<AlertRecord>,
}

impl Default for SnapshotDocument {
    fn default() -> Self {
        Self {
            format_version: CURRENT_FORMAT_VERSION,
            accesses: Vec::new(),
            accounts: Vec::new(),
            categories: Vec::new(),
            operations: Vec::new(),
            budgets: Vec::new(),
            settings: BTreeMap::new(),
            alerts: Vec::new(),
        }
    }
}

impl SnapshotDocument {
    /// Creates an empty document at the current format version.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of records per collection.
    #[must_use]
    pub fn counts(&self) -> DocumentCounts {
        DocumentCounts {
            accesses: self.accesses.len(),
            accounts: self.accounts.len(),
            categories: self.categories.len(),
            operations: self.operations.len(),
            budgets: self.budgets.len(),
            settings: self.settings.len(),
            alerts: self.alerts.len(),
        }
    }
}

/// Record counts of a document, a merge or an export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentCounts {
    /// Number of accesses.
    pub accesses: usize,
    /// Number of accounts.
    pub accounts: usize,
    /// Number of categories.
    pub categories: usize,
    /// Number of transactions.
    pub operations: usize,
    /// Number of budgets.
    pub budgets: usize,
    /// Number of settings.
    pub settings: usize,
    /// Number of alerts.
    pub alerts: usize,
}

impl DocumentCounts {
    /// Returns the count for one collection.
    #[must_use]
    pub fn get(&self, collection: Collection) -> usize {
        match collection {
            Collection::Accesses => self.accesses,
            Collection::Accounts => self.accounts,
            Collection::Categories => self.categories,
            Collection::Transactions => self.operations,
            Collection::Budgets => self.budgets,
            Collection::Settings => self.settings,
            Collection::Alerts => self.alerts,
        }
    }
}

/// An access in a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRecord {
    /// Document-local id.
    pub id: DocId,
    /// Vendor (bank module) identifier.
    pub vendor_id: String,
    /// Login name.
    pub login: String,
    /// Secret. Only present in sealed exports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Vendor-specific fields.
    #[serde(default)]
    pub custom_fields: Vec<CustomField>,
    /// User-chosen label.
    #[serde(default)]
    pub custom_label: Option<String>,
}

/// An account in a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    /// Document-local id.
    pub id: DocId,
    /// Owning access (document-local id).
    pub access_id: DocId,
    /// Account number as reported by the vendor.
    pub vendor_account_id: String,
    /// Vendor label.
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
    #[serde(rename = "type", default = "default_account_type")]
    pub account_type: String,
    /// Balance before the first imported transaction.
    #[serde(default)]
    pub initial_balance: f64,
    /// When the account was first imported.
    pub import_date: DateTime<Utc>,
    /// Whether the account is left out of the global balance.
    #[serde(default)]
    pub exclude_from_balance: bool,
}

fn default_account_type() -> String {
    "account-type.unknown".to_string()
}

/// A category in a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRecord {
    /// Document-local id.
    pub id: DocId,
    /// Display label.
    pub label: String,
    /// Display color.
    #[serde(default)]
    pub color: Option<String>,
}

/// A transaction in a document. Transactions carry no id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRecord {
    /// Owning account (document-local id).
    pub account_id: DocId,
    /// Category (document-local id), if categorized.
    #[serde(default)]
    pub category_id: Option<DocId>,
    /// Cleaned-up label.
    pub label: String,
    /// Label as reported by the vendor.
    #[serde(default)]
    pub raw_label: String,
    /// User-chosen label.
    #[serde(default)]
    pub custom_label: Option<String>,
    /// Signed amount.
    pub amount: f64,
    /// Operation date.
    pub date: DateTime<Utc>,
    /// Debit date for deferred cards.
    #[serde(default)]
    pub debit_date: Option<DateTime<Utc>>,
    /// Budget date override.
    #[serde(default)]
    pub budget_date: Option<DateTime<Utc>>,
    /// Transaction type identifier.
    #[serde(rename = "type")]
    pub transaction_type: String,
    /// Whether the user created the transaction by hand.
    #[serde(default)]
    pub created_by_user: bool,
}

/// A budget in a document. Budgets carry no id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetRecord {
    /// Category (document-local id).
    pub category_id: DocId,
    /// Calendar year.
    pub year: i32,
    /// Calendar month, 0-based.
    pub month: u32,
    /// Threshold amount.
    #[serde(default)]
    pub threshold: Option<f64>,
}

/// An alert in a document. Alerts carry no id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    /// Watched account (document-local id).
    pub account_id: DocId,
    /// Alert type.
    #[serde(rename = "type")]
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_has_current_version() {
        let doc = SnapshotDocument::new();
        assert_eq!(doc.format_version, CURRENT_FORMAT_VERSION);
        assert_eq!(doc.counts(), DocumentCounts::default());
    }

    #[test]
    fn type_fields_use_wire_names() {
        let alert = AlertRecord {
            account_id: 0,
            kind: AlertKind::Balance,
            frequency: None,
            limit: Some(100.0),
            order: Some(AlertOrder::Lt),
        };
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["type"], "balance");
        assert_eq!(json["accountId"], 0);
        assert_eq!(json["order"], "lt");
    }

    #[test]
    fn absent_password_is_not_serialized() {
        let access = AccessRecord {
            id: 0,
            vendor_id: "demo".into(),
            login: "alice".into(),
            password: None,
            custom_fields: vec![],
            custom_label: None,
        };
        let json = serde_json::to_value(&access).unwrap();
        assert!(json.get("password").is_none());
    }
}
