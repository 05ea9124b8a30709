//! In-memory entity store.

use crate::error::{StoreError, StoreResult};
use crate::model::{
    Access, Account, Alert, Budget, Category, Collection, Row, RowId, Transaction, UserData,
    UserId,
};
use crate::store::{EntityStore, StoreWriter};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// One collection: rows by storage id plus the id sequence counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Table<T> {
    next_id: RowId,
    rows: BTreeMap<RowId, Row<T>>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            next_id: 1,
            rows: BTreeMap::new(),
        }
    }
}

impl<T: Clone> Table<T> {
    fn for_user(&self, user: UserId) -> Vec<Row<T>> {
        self.rows
            .values()
            .filter(|row| row.user_id == user)
            .cloned()
            .collect()
    }

    fn insert_all(&mut self, user: UserId, values: Vec<T>) -> Vec<RowId> {
        let mut ids = Vec::with_capacity(values.len());
        for value in values {
            let id = self.next_id;
            self.next_id += 1;
            self.rows.insert(
                id,
                Row {
                    id,
                    user_id: user,
                    value,
                },
            );
            ids.push(id);
        }
        ids
    }

    fn delete(&mut self, user: UserId, ids: &[RowId]) -> usize {
        let mut removed = 0;
        for id in ids {
            if self.rows.get(id).is_some_and(|row| row.user_id == user) {
                self.rows.remove(id);
                removed += 1;
            }
        }
        removed
    }
}

impl<T> Table<T> {
    fn check_ref(&self, collection: Collection, id: RowId, user: UserId) -> StoreResult<()> {
        match self.rows.get(&id) {
            None => Err(StoreError::RowNotFound { collection, id }),
            Some(row) if row.user_id != user => Err(StoreError::TenantMismatch {
                collection,
                id,
                owner: row.user_id,
                requested: user,
            }),
            Some(_) => Ok(()),
        }
    }
}

/// Complete contents of a store, shared with [`crate::FileStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct MemoryState {
    accesses: Table<Access>,
    accounts: Table<Account>,
    categories: Table<Category>,
    transactions: Table<Transaction>,
    budgets: Table<Budget>,
    alerts: Table<Alert>,
    settings: BTreeMap<u64, BTreeMap<String, String>>,
}

impl MemoryState {
    fn user_data(&self, user: UserId) -> UserData {
        UserData {
            accesses: self.accesses.for_user(user),
            accounts: self.accounts.for_user(user),
            categories: self.categories.for_user(user),
            transactions: self.transactions.for_user(user),
            budgets: self.budgets.for_user(user),
            settings: self.settings.get(&user.0).cloned().unwrap_or_default(),
            alerts: self.alerts.for_user(user),
        }
    }
}

/// Writer over a staged copy of the state.
struct MemoryWriter<'a> {
    state: &'a mut MemoryState,
    user: UserId,
}

impl StoreWriter for MemoryWriter<'_> {
    fn insert_accesses(&mut self, rows: Vec<Access>) -> StoreResult<Vec<RowId>> {
        Ok(self.state.accesses.insert_all(self.user, rows))
    }

    fn insert_accounts(&mut self, rows: Vec<Account>) -> StoreResult<Vec<RowId>> {
        for row in &rows {
            self.state
                .accesses
                .check_ref(Collection::Accesses, row.access_id, self.user)?;
        }
        Ok(self.state.accounts.insert_all(self.user, rows))
    }

    fn insert_categories(&mut self, rows: Vec<Category>) -> StoreResult<Vec<RowId>> {
        Ok(self.state.categories.insert_all(self.user, rows))
    }

    fn insert_transactions(&mut self, rows: Vec<Transaction>) -> StoreResult<Vec<RowId>> {
        for row in &rows {
            self.state
                .accounts
                .check_ref(Collection::Accounts, row.account_id, self.user)?;
            if let Some(category_id) = row.category_id {
                self.state
                    .categories
                    .check_ref(Collection::Categories, category_id, self.user)?;
            }
        }
        Ok(self.state.transactions.insert_all(self.user, rows))
    }

    fn insert_budgets(&mut self, rows: Vec<Budget>) -> StoreResult<Vec<RowId>> {
        for row in &rows {
            self.state
                .categories
                .check_ref(Collection::Categories, row.category_id, self.user)?;
        }
        Ok(self.state.budgets.insert_all(self.user, rows))
    }

    fn insert_alerts(&mut self, rows: Vec<Alert>) -> StoreResult<Vec<RowId>> {
        for row in &rows {
            self.state
                .accounts
                .check_ref(Collection::Accounts, row.account_id, self.user)?;
        }
        Ok(self.state.alerts.insert_all(self.user, rows))
    }

    fn put_setting(&mut self, key: &str, value: &str) -> StoreResult<()> {
        self.state
            .settings
            .entry(self.user.0)
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete_rows(&mut self, collection: Collection, ids: &[RowId]) -> StoreResult<usize> {
        let user = self.user;
        Ok(match collection {
            Collection::Accesses => self.state.accesses.delete(user, ids),
            Collection::Accounts => self.state.accounts.delete(user, ids),
            Collection::Categories => self.state.categories.delete(user, ids),
            Collection::Transactions => self.state.transactions.delete(user, ids),
            Collection::Budgets => self.state.budgets.delete(user, ids),
            Collection::Alerts => self.state.alerts.delete(user, ids),
            // Settings are addressed by key, not by id.
            Collection::Settings => 0,
        })
    }
}

/// An in-memory entity store.
///
/// This store keeps all rows in memory and is suitable for:
/// - Unit and integration tests
/// - Service instances that load and persist state elsewhere
///
/// # Isolation
///
/// Readers take a short read lock and always see a committed state.
/// Writers are serialized by a dedicated writer lock; a transaction works
/// on a private copy of the state that is swapped in only when the closure
/// and the commit hook both succeed. An in-flight import therefore never
/// blocks exports.
///
/// # Example
///
/// ```rust
/// use tally_store::{Access, EntityStore, InMemoryStore, UserId};
///
/// let store = InMemoryStore::new();
/// let ids = {
///     let mut ids = Vec::new();
///     store
///         .with_transaction(UserId(7), &mut |w| {
///             ids = w.insert_accesses(vec![Access {
///                 vendor_id: "demo".into(),
///                 login: "alice".into(),
///                 password: None,
///                 custom_fields: vec![],
///                 custom_label: None,
///             }])?;
///             Ok(())
///         })
///         .unwrap();
///     ids
/// };
/// assert_eq!(ids, vec![1]);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<MemoryState>,
    writer: Mutex<()>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_state(state: MemoryState) -> Self {
        Self {
            state: RwLock::new(state),
            writer: Mutex::new(()),
        }
    }

    /// Runs a transaction, calling `commit` on the staged state before it
    /// becomes visible. A `commit` error discards the staged state.
    pub(crate) fn transact(
        &self,
        user: UserId,
        work: &mut dyn FnMut(&mut dyn StoreWriter) -> StoreResult<()>,
        commit: impl FnOnce(&MemoryState) -> StoreResult<()>,
    ) -> StoreResult<()> {
        let _writer = self.writer.lock();
        let mut staged = self.state.read().clone();

        {
            let mut writer = MemoryWriter {
                state: &mut staged,
                user,
            };
            if let Err(err) = work(&mut writer) {
                debug!(%user, error = %err, "transaction rolled back");
                return Err(err);
            }
        }

        commit(&staged)?;
        *self.state.write() = staged;
        debug!(%user, "transaction committed");
        Ok(())
    }
}

impl EntityStore for InMemoryStore {
    fn list_accesses(&self, user: UserId) -> StoreResult<Vec<Row<Access>>> {
        Ok(self.state.read().accesses.for_user(user))
    }

    fn list_accounts(&self, user: UserId) -> StoreResult<Vec<Row<Account>>> {
        Ok(self.state.read().accounts.for_user(user))
    }

    fn list_categories(&self, user: UserId) -> StoreResult<Vec<Row<Category>>> {
        Ok(self.state.read().categories.for_user(user))
    }

    fn list_transactions(&self, user: UserId) -> StoreResult<Vec<Row<Transaction>>> {
        Ok(self.state.read().transactions.for_user(user))
    }

    fn list_budgets(&self, user: UserId) -> StoreResult<Vec<Row<Budget>>> {
        Ok(self.state.read().budgets.for_user(user))
    }

    fn list_settings(&self, user: UserId) -> StoreResult<BTreeMap<String, String>> {
        Ok(self
            .state
            .read()
            .settings
            .get(&user.0)
            .cloned()
            .unwrap_or_default())
    }

    fn list_alerts(&self, user: UserId) -> StoreResult<Vec<Row<Alert>>> {
        Ok(self.state.read().alerts.for_user(user))
    }

    fn read_user(&self, user: UserId) -> StoreResult<UserData> {
        Ok(self.state.read().user_data(user))
    }

    fn with_transaction(
        &self,
        user: UserId,
        work: &mut dyn FnMut(&mut dyn StoreWriter) -> StoreResult<()>,
    ) -> StoreResult<()> {
        self.transact(user, work, |_| Ok(()))
    }
}
