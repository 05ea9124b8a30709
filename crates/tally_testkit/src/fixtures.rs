//! Seeded scenarios and store helpers.
//!
//! Seeding is deterministic: the same scenario always produces the same
//! values, so two stores seeded alike can be compared row by row.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::path::PathBuf;
use tally_codec::DEFAULT_ACCOUNT_ID;
use tally_store::{
    Access, Account, Alert, AlertFrequency, AlertKind, AlertOrder, Attachment, Budget, Category,
    CustomField, EntityStore, FileStore, RowId, Transaction, UserId,
};
use tempfile::TempDir;

/// Shape of a user's dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    /// Number of accesses.
    pub accesses: usize,
    /// Number of accounts, spread round-robin over accesses.
    pub accounts: usize,
    /// Number of categories.
    pub categories: usize,
    /// Number of transactions, spread round-robin over accounts.
    pub operations: usize,
    /// Number of budgets.
    pub budgets: usize,
    /// Number of alerts.
    pub alerts: usize,
    /// Settings to store verbatim.
    pub settings: Vec<(String, String)>,
    /// Whether to point the default-account setting at the last account.
    pub default_account: bool,
}

impl Scenario {
    /// A scenario with the given core collection sizes.
    #[must_use]
    pub fn new(accesses: usize, accounts: usize, categories: usize, operations: usize) -> Self {
        Self {
            accesses,
            accounts,
            categories,
            operations,
            budgets: 0,
            alerts: 0,
            settings: Vec::new(),
            default_account: false,
        }
    }

    /// A small scenario touching every collection.
    #[must_use]
    pub fn full() -> Self {
        Self::new(2, 3, 4, 20)
            .with_budgets(4)
            .with_alerts(2)
            .with_setting("locale", "fr")
            .with_setting("default-currency", "EUR")
            .with_default_account()
    }

    /// Sets the number of budgets.
    #[must_use]
    pub fn with_budgets(mut self, budgets: usize) -> Self {
        self.budgets = budgets;
        self
    }

    /// Sets the number of alerts.
    #[must_use]
    pub fn with_alerts(mut self, alerts: usize) -> Self {
        self.alerts = alerts;
        self
    }

    /// Adds a setting.
    #[must_use]
    pub fn with_setting(mut self, key: &str, value: &str) -> Self {
        self.settings.push((key.to_string(), value.to_string()));
        self
    }

    /// Points the default-account setting at the last account.
    #[must_use]
    pub fn with_default_account(mut self) -> Self {
        self.default_account = true;
        self
    }
}

/// Storage ids assigned while seeding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Seeded {
    /// Access ids.
    pub access_ids: Vec<RowId>,
    /// Account ids.
    pub account_ids: Vec<RowId>,
    /// Category ids.
    pub category_ids: Vec<RowId>,
    /// Transaction ids.
    pub transaction_ids: Vec<RowId>,
    /// Budget ids.
    pub budget_ids: Vec<RowId>,
    /// Alert ids.
    pub alert_ids: Vec<RowId>,
}

fn base_date() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
}

/// Password stored for access `index` of `user`.
#[must_use]
pub fn access_password(user: UserId, index: usize) -> String {
    format!("pw-{user}-{index}")
}

/// Seeds `scenario` for `user` in one transaction.
///
/// # Panics
///
/// Panics if the store rejects the writes, or if the scenario has
/// accounts without accesses, or transactions, budgets or alerts without
/// their parents.
pub fn seed<S: EntityStore + ?Sized>(store: &S, user: UserId, scenario: &Scenario) -> Seeded {
    let mut seeded = Seeded::default();
    store
        .with_transaction(user, &mut |w| {
            let accesses = (0..scenario.accesses)
                .map(|i| Access {
                    vendor_id: if i % 2 == 0 { "demo" } else { "fakebank" }.to_string(),
                    login: format!("login-{user}-{i}"),
                    password: Some(access_password(user, i)),
                    custom_fields: vec![CustomField {
                        name: "website".into(),
                        value: Some(format!("par{i}")),
                    }],
                    custom_label: (i == 0).then(|| "Main bank".to_string()),
                })
                .collect();
            seeded.access_ids = w.insert_accesses(accesses)?;

            let accounts = (0..scenario.accounts)
                .map(|i| Account {
                    access_id: seeded.access_ids[i % seeded.access_ids.len()],
                    vendor_account_id: format!("{:011}", 1000 + i),
                    label: format!("Account {i}"),
                    custom_label: None,
                    iban: Some(format!("FR76 3000 6000 {:04}", i)),
                    currency: Some("EUR".into()),
                    account_type: if i == 0 {
                        "account-type.checking"
                    } else {
                        "account-type.savings"
                    }
                    .into(),
                    initial_balance: 100.0 * i as f64,
                    import_date: base_date(),
                    exclude_from_balance: i == 2,
                })
                .collect();
            seeded.account_ids = w.insert_accounts(accounts)?;

            let categories = (0..scenario.categories)
                .map(|i| Category {
                    label: format!("Category {i}"),
                    color: Some(format!("#{:06x}", i * 0x1f2f3f)),
                })
                .collect();
            seeded.category_ids = w.insert_categories(categories)?;

            let transactions = (0..scenario.operations)
                .map(|i| Transaction {
                    account_id: seeded.account_ids[i % seeded.account_ids.len()],
                    category_id: if i % 4 == 3 || seeded.category_ids.is_empty() {
                        None
                    } else {
                        Some(seeded.category_ids[i % seeded.category_ids.len()])
                    },
                    label: format!("Operation {i}"),
                    raw_label: format!("CB OPERATION {i}"),
                    custom_label: (i % 10 == 0).then(|| format!("Note {i}")),
                    amount: -((i as f64) * 1.25 + 0.1),
                    date: base_date() + Duration::days(i as i64),
                    debit_date: None,
                    budget_date: None,
                    transaction_type: "type.card".into(),
                    created_by_user: i % 7 == 0,
                    attachments: if i == 0 {
                        vec![Attachment {
                            file_name: "receipt.pdf".into(),
                            content_type: "application/pdf".into(),
                            bytes: vec![0x25, 0x50, 0x44, 0x46],
                        }]
                    } else {
                        Vec::new()
                    },
                })
                .collect();
            seeded.transaction_ids = w.insert_transactions(transactions)?;

            let budgets = (0..scenario.budgets)
                .map(|i| Budget {
                    category_id: seeded.category_ids[i % seeded.category_ids.len()],
                    year: 2023,
                    month: (i % 12) as u32,
                    threshold: Some(50.0 + i as f64),
                })
                .collect();
            seeded.budget_ids = w.insert_budgets(budgets)?;

            let alerts = (0..scenario.alerts)
                .map(|i| {
                    let account_id = seeded.account_ids[i % seeded.account_ids.len()];
                    if i % 2 == 0 {
                        Alert {
                            account_id,
                            kind: AlertKind::Balance,
                            frequency: None,
                            limit: Some(-50.0),
                            order: Some(AlertOrder::Lt),
                        }
                    } else {
                        Alert {
                            account_id,
                            kind: AlertKind::Report,
                            frequency: Some(AlertFrequency::Weekly),
                            limit: None,
                            order: None,
                        }
                    }
                })
                .collect();
            seeded.alert_ids = w.insert_alerts(alerts)?;

            for (key, value) in &scenario.settings {
                w.put_setting(key, value)?;
            }
            if scenario.default_account {
                if let Some(last) = seeded.account_ids.last() {
                    w.put_setting(DEFAULT_ACCOUNT_ID, &last.to_string())?;
                }
            }
            Ok(())
        })
        .expect("seeding failed");
    seeded
}

/// A file store in a temporary directory, removed on drop.
#[derive(Debug)]
pub struct TempFileStore {
    store: FileStore,
    dir: TempDir,
}

impl TempFileStore {
    const FILE_NAME: &'static str = "tally.json";

    /// Creates an empty store.
    ///
    /// # Panics
    ///
    /// Panics if the directory or the store cannot be created.
    #[must_use]
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let store =
            FileStore::open(&dir.path().join(Self::FILE_NAME)).expect("Failed to open store");
        Self { store, dir }
    }

    /// Path of the state file.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.dir.path().join(Self::FILE_NAME)
    }

    /// Closes and reopens the store from disk.
    ///
    /// # Panics
    ///
    /// Panics if the store cannot be reopened.
    #[must_use]
    pub fn reopen(self) -> Self {
        let Self { store, dir } = self;
        drop(store);
        let store =
            FileStore::open(&dir.path().join(Self::FILE_NAME)).expect("Failed to reopen store");
        Self { store, dir }
    }
}

impl Default for TempFileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TempFileStore {
    type Target = FileStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}
