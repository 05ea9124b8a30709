//! Fault injection around a real store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tally_store::{
    Access, Account, Alert, Budget, Category, Collection, EntityStore, Row, RowId, StoreError,
    StoreResult, StoreWriter, Transaction, UserId,
};

/// What a [`FaultyStore`] should do wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Reject every insert into this collection.
    FailInsert(Collection),
    /// Reject the commit after the closure succeeded.
    FailCommit,
    /// Report every listed row as owned by this user.
    ForeignOwner(UserId),
}

/// Wraps a store and injects one fault.
///
/// Injected write failures happen inside the inner store's transaction,
/// so they exercise its rollback path.
#[derive(Debug)]
pub struct FaultyStore<S> {
    inner: S,
    fault: Fault,
    transactions: AtomicUsize,
}

impl<S: EntityStore> FaultyStore<S> {
    /// Wraps `inner`.
    pub fn new(inner: S, fault: Fault) -> Self {
        Self {
            inner,
            fault,
            transactions: AtomicUsize::new(0),
        }
    }

    /// The wrapped store, for inspecting state after a fault.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of transactions attempted through this wrapper.
    pub fn transactions(&self) -> usize {
        self.transactions.load(Ordering::SeqCst)
    }

    fn relabel<T>(&self, rows: Vec<Row<T>>) -> Vec<Row<T>> {
        match self.fault {
            Fault::ForeignOwner(owner) => rows
                .into_iter()
                .map(|row| Row {
                    user_id: owner,
                    ..row
                })
                .collect(),
            _ => rows,
        }
    }
}

struct FaultyWriter<'a> {
    inner: &'a mut dyn StoreWriter,
    failing: Option<Collection>,
}

impl FaultyWriter<'_> {
    fn check(&self, collection: Collection) -> StoreResult<()> {
        if self.failing == Some(collection) {
            return Err(StoreError::write_failed(format!(
                "injected failure inserting {collection}"
            )));
        }
        Ok(())
    }
}

impl StoreWriter for FaultyWriter<'_> {
    fn insert_accesses(&mut self, rows: Vec<Access>) -> StoreResult<Vec<RowId>> {
        self.check(Collection::Accesses)?;
        self.inner.insert_accesses(rows)
    }

    fn insert_accounts(&mut self, rows: Vec<Account>) -> StoreResult<Vec<RowId>> {
        self.check(Collection::Accounts)?;
        self.inner.insert_accounts(rows)
    }

    fn insert_categories(&mut self, rows: Vec<Category>) -> StoreResult<Vec<RowId>> {
        self.check(Collection::Categories)?;
        self.inner.insert_categories(rows)
    }

    fn insert_transactions(&mut self, rows: Vec<Transaction>) -> StoreResult<Vec<RowId>> {
        self.check(Collection::Transactions)?;
        self.inner.insert_transactions(rows)
    }

    fn insert_budgets(&mut self, rows: Vec<Budget>) -> StoreResult<Vec<RowId>> {
        self.check(Collection::Budgets)?;
        self.inner.insert_budgets(rows)
    }

    fn insert_alerts(&mut self, rows: Vec<Alert>) -> StoreResult<Vec<RowId>> {
        self.check(Collection::Alerts)?;
        self.inner.insert_alerts(rows)
    }

    fn put_setting(&mut self, key: &str, value: &str) -> StoreResult<()> {
        self.check(Collection::Settings)?;
        self.inner.put_setting(key, value)
    }

    fn delete_rows(&mut self, collection: Collection, ids: &[RowId]) -> StoreResult<usize> {
        self.inner.delete_rows(collection, ids)
    }
}

impl<S: EntityStore> EntityStore for FaultyStore<S> {
    fn list_accesses(&self, user: UserId) -> StoreResult<Vec<Row<Access>>> {
        Ok(self.relabel(self.inner.list_accesses(user)?))
    }

    fn list_accounts(&self, user: UserId) -> StoreResult<Vec<Row<Account>>> {
        Ok(self.relabel(self.inner.list_accounts(user)?))
    }

    fn list_categories(&self, user: UserId) -> StoreResult<Vec<Row<Category>>> {
        Ok(self.relabel(self.inner.list_categories(user)?))
    }

    fn list_transactions(&self, user: UserId) -> StoreResult<Vec<Row<Transaction>>> {
        Ok(self.relabel(self.inner.list_transactions(user)?))
    }

    fn list_budgets(&self, user: UserId) -> StoreResult<Vec<Row<Budget>>> {
        Ok(self.relabel(self.inner.list_budgets(user)?))
    }

    fn list_settings(&self, user: UserId) -> StoreResult<BTreeMap<String, String>> {
        self.inner.list_settings(user)
    }

    fn list_alerts(&self, user: UserId) -> StoreResult<Vec<Row<Alert>>> {
        Ok(self.relabel(self.inner.list_alerts(user)?))
    }

    fn with_transaction(
        &self,
        user: UserId,
        work: &mut dyn FnMut(&mut dyn StoreWriter) -> StoreResult<()>,
    ) -> StoreResult<()> {
        self.transactions.fetch_add(1, Ordering::SeqCst);
        let failing = match self.fault {
            Fault::FailInsert(collection) => Some(collection),
            _ => None,
        };
        let fail_commit = self.fault == Fault::FailCommit;
        self.inner.with_transaction(user, &mut |w| {
            let mut faulty = FaultyWriter { inner: w, failing };
            work(&mut faulty)?;
            if fail_commit {
                return Err(StoreError::write_failed("injected commit failure"));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{seed, Scenario};
    use tally_store::InMemoryStore;

    #[test]
    fn failed_insert_rolls_back_whole_transaction() {
        let store = FaultyStore::new(
            InMemoryStore::new(),
            Fault::FailInsert(Collection::Transactions),
        );
        let result = store.with_transaction(UserId(1), &mut |w| {
            w.insert_categories(vec![Category::new("Food")])?;
            w.insert_transactions(Vec::new())?;
            Ok(())
        });
        assert!(matches!(result, Err(StoreError::WriteFailed(_))));
        assert!(store.list_categories(UserId(1)).unwrap().is_empty());
        assert_eq!(store.transactions(), 1);
    }

    #[test]
    fn foreign_owner_relabels_rows() {
        let inner = InMemoryStore::new();
        seed(&inner, UserId(1), &Scenario::new(1, 1, 1, 1));
        let store = FaultyStore::new(inner, Fault::ForeignOwner(UserId(9)));
        let rows = store.list_accounts(UserId(1)).unwrap();
        assert_eq!(rows[0].user_id, UserId(9));
    }
}
