//! Entity store trait definition.

use crate::error::StoreResult;
use crate::model::{
    Access, Account, Alert, Budget, Category, Collection, Row, RowId, Transaction, UserData,
    UserId,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Read and transactional write access to the persisted collections.
///
/// # Invariants
///
/// - Every method is scoped to one user; rows of other users are never
///   returned and never referenced by writes
/// - `list_*` return rows in ascending storage id order
/// - `with_transaction` is all-or-nothing: if the closure or the commit
///   fails, none of its writes become visible
/// - Concurrent transactions are serialized; readers never observe a
///   partially applied transaction
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::FileStore`] - For persistent storage
pub trait EntityStore: Send + Sync {
    /// Lists the user's accesses.
    fn list_accesses(&self, user: UserId) -> StoreResult<Vec<Row<Access>>>;

    /// Lists the user's accounts.
    fn list_accounts(&self, user: UserId) -> StoreResult<Vec<Row<Account>>>;

    /// Lists the user's categories.
    fn list_categories(&self, user: UserId) -> StoreResult<Vec<Row<Category>>>;

    /// Lists the user's transactions.
    fn list_transactions(&self, user: UserId) -> StoreResult<Vec<Row<Transaction>>>;

    /// Lists the user's budgets.
    fn list_budgets(&self, user: UserId) -> StoreResult<Vec<Row<Budget>>>;

    /// Lists the user's settings.
    fn list_settings(&self, user: UserId) -> StoreResult<BTreeMap<String, String>>;

    /// Lists the user's alerts.
    fn list_alerts(&self, user: UserId) -> StoreResult<Vec<Row<Alert>>>;

    /// Reads all of the user's collections.
    ///
    /// The default implementation calls each `list_*` in turn and is only
    /// consistent if no transaction commits in between. Stores that can
    /// read every collection at one point in time should override it.
    fn read_user(&self, user: UserId) -> StoreResult<UserData> {
        Ok(UserData {
            accesses: self.list_accesses(user)?,
            accounts: self.list_accounts(user)?,
            categories: self.list_categories(user)?,
            transactions: self.list_transactions(user)?,
            budgets: self.list_budgets(user)?,
            settings: self.list_settings(user)?,
            alerts: self.list_alerts(user)?,
        })
    }

    /// Runs `work` inside a single atomic write transaction for `user`.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or the commit error, after discarding
    /// every write made by the closure.
    fn with_transaction(
        &self,
        user: UserId,
        work: &mut dyn FnMut(&mut dyn StoreWriter) -> StoreResult<()>,
    ) -> StoreResult<()>;
}

/// Write handle handed to [`EntityStore::with_transaction`] closures.
///
/// Bulk inserts return the assigned storage ids in input order. Foreign
/// keys must reference rows owned by the transaction's user, either
/// committed earlier or inserted earlier in the same transaction.
pub trait StoreWriter {
    /// Inserts accesses.
    fn insert_accesses(&mut self, rows: Vec<Access>) -> StoreResult<Vec<RowId>>;

    /// Inserts accounts. Each `access_id` must resolve.
    fn insert_accounts(&mut self, rows: Vec<Account>) -> StoreResult<Vec<RowId>>;

    /// Inserts categories.
    fn insert_categories(&mut self, rows: Vec<Category>) -> StoreResult<Vec<RowId>>;

    /// Inserts transactions. `account_id` and any `category_id` must resolve.
    fn insert_transactions(&mut self, rows: Vec<Transaction>) -> StoreResult<Vec<RowId>>;

    /// Inserts budgets. Each `category_id` must resolve.
    fn insert_budgets(&mut self, rows: Vec<Budget>) -> StoreResult<Vec<RowId>>;

    /// Inserts alerts. Each `account_id` must resolve.
    fn insert_alerts(&mut self, rows: Vec<Alert>) -> StoreResult<Vec<RowId>>;

    /// Sets a setting, replacing any previous value for the key.
    fn put_setting(&mut self, key: &str, value: &str) -> StoreResult<()>;

    /// Deletes rows by id without touching rows that reference them.
    ///
    /// Returns the number of rows removed. Ids that do not exist or belong
    /// to another user are ignored.
    fn delete_rows(&mut self, collection: Collection, ids: &[RowId]) -> StoreResult<usize>;
}

impl<S: EntityStore + ?Sized> EntityStore for Arc<S> {
    fn list_accesses(&self, user: UserId) -> StoreResult<Vec<Row<Access>>> {
        (**self).list_accesses(user)
    }

    fn list_accounts(&self, user: UserId) -> StoreResult<Vec<Row<Account>>> {
        (**self).list_accounts(user)
    }

    fn list_categories(&self, user: UserId) -> StoreResult<Vec<Row<Category>>> {
        (**self).list_categories(user)
    }

    fn list_transactions(&self, user: UserId) -> StoreResult<Vec<Row<Transaction>>> {
        (**self).list_transactions(user)
    }

    fn list_budgets(&self, user: UserId) -> StoreResult<Vec<Row<Budget>>> {
        (**self).list_budgets(user)
    }

    fn list_settings(&self, user: UserId) -> StoreResult<BTreeMap<String, String>> {
        (**self).list_settings(user)
    }

    fn list_alerts(&self, user: UserId) -> StoreResult<Vec<Row<Alert>>> {
        (**self).list_alerts(user)
    }

    fn read_user(&self, user: UserId) -> StoreResult<UserData> {
        (**self).read_user(user)
    }

    fn with_transaction(
        &self,
        user: UserId,
        work: &mut dyn FnMut(&mut dyn StoreWriter) -> StoreResult<()>,
    ) -> StoreResult<()> {
        (**self).with_transaction(user, work)
    }
}
