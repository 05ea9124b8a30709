//! Dense identifier remapping.
//!
//! A fresh id space is built every time a document is produced (export)
//! or merged (import). Parents are remapped before children: accesses,
//! then accounts, then categories; transactions, budgets and alerts only
//! hold foreign keys. A record whose required foreign key does not
//! resolve is dropped; an unresolved optional key is cleared. Both leave
//! an [`IntegrityWarning`] behind.

use crate::error::{IntegrityIssue, IntegrityWarning};
use std::collections::{BTreeMap, HashMap};
use tally_codec::{
    AccessRecord, AccountRecord, CategoryRecord, DocId, SnapshotDocument, DEFAULT_ACCOUNT_ID,
};
use tally_store::Collection;
use tracing::warn;

/// Mapping from old ids to dense new ids for one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdMapping {
    ids: HashMap<u64, DocId>,
}

impl IdMapping {
    /// Returns the new id for `old`.
    #[must_use]
    pub fn get(&self, old: u64) -> Option<DocId> {
        self.ids.get(&old).copied()
    }

    /// Number of mapped ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns whether nothing is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// A record that carries its own id.
pub trait Identified {
    /// Returns the record's id.
    fn id(&self) -> u64;
    /// Replaces the record's id.
    fn set_id(&mut self, id: DocId);
}

macro_rules! impl_identified {
    ($($ty:ty),*) => {
        $(impl Identified for $ty {
            fn id(&self) -> u64 {
                self.id
            }

            fn set_id(&mut self, id: DocId) {
                self.id = id;
            }
        })*
    };
}

impl_identified!(AccessRecord, AccountRecord, CategoryRecord);

/// Builds fresh id spaces and rewrites foreign keys, collecting warnings.
#[derive(Debug, Default)]
pub struct Remapper {
    warnings: Vec<IntegrityWarning>,
}

impl Remapper {
    /// Creates a remapper with no warnings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn warn(&mut self, collection: Collection, index: usize, issue: IntegrityIssue) {
        let warning = IntegrityWarning {
            collection,
            index,
            issue,
        };
        warn!(%warning, "referential integrity");
        self.warnings.push(warning);
    }

    /// Assigns ids `0..n` in iteration order.
    ///
    /// A record repeating an id already seen in the collection is dropped.
    pub fn densify<T: Identified>(
        &mut self,
        collection: Collection,
        records: Vec<T>,
    ) -> (Vec<T>, IdMapping) {
        let mut mapping = IdMapping::default();
        let mut kept = Vec::with_capacity(records.len());
        for (index, mut record) in records.into_iter().enumerate() {
            let old = record.id();
            if mapping.ids.contains_key(&old) {
                self.warn(collection, index, IntegrityIssue::DuplicateId { id: old });
                continue;
            }
            let new = kept.len() as DocId;
            mapping.ids.insert(old, new);
            record.set_id(new);
            kept.push(record);
        }
        (kept, mapping)
    }

    /// Rewrites a required foreign key, dropping records it cannot resolve.
    pub fn rewrite_required<T, F>(
        &mut self,
        collection: Collection,
        records: Vec<T>,
        field: &'static str,
        target: (Collection, &IdMapping),
        key: F,
    ) -> Vec<T>
    where
        F: Fn(&mut T) -> &mut u64,
    {
        let (target, mapping) = target;
        let mut kept = Vec::with_capacity(records.len());
        for (index, mut record) in records.into_iter().enumerate() {
            let slot = key(&mut record);
            match mapping.get(*slot) {
                Some(new) => {
                    *slot = new;
                    kept.push(record);
                }
                None => {
                    let id = *slot;
                    self.warn(
                        collection,
                        index,
                        IntegrityIssue::DanglingReference { field, target, id },
                    );
                }
            }
        }
        kept
    }

    /// Rewrites an optional foreign key, clearing it when it cannot be
    /// resolved.
    pub fn rewrite_optional<T, F>(
        &mut self,
        collection: Collection,
        records: &mut [T],
        field: &'static str,
        target: (Collection, &IdMapping),
        key: F,
    ) where
        F: Fn(&mut T) -> &mut Option<u64>,
    {
        let (target, mapping) = target;
        for (index, record) in records.iter_mut().enumerate() {
            let slot = key(record);
            let Some(old) = *slot else { continue };
            *slot = mapping.get(old);
            if slot.is_none() {
                self.warn(
                    collection,
                    index,
                    IntegrityIssue::ClearedReference {
                        field,
                        target,
                        id: old,
                    },
                );
            }
        }
    }

    /// Translates the default-account setting through the account mapping,
    /// dropping it when the account is gone.
    pub fn translate_default_account(
        &mut self,
        settings: &mut BTreeMap<String, String>,
        accounts: &IdMapping,
    ) {
        let Some(value) = settings.get(DEFAULT_ACCOUNT_ID) else {
            return;
        };
        if value.is_empty() {
            return;
        }
        match value.parse::<u64>().ok().and_then(|old| accounts.get(old)) {
            Some(new) => {
                settings.insert(DEFAULT_ACCOUNT_ID.to_string(), new.to_string());
            }
            None => {
                let value = value.clone();
                settings.remove(DEFAULT_ACCOUNT_ID);
                self.warn(
                    Collection::Settings,
                    0,
                    IntegrityIssue::UnresolvedDefaultAccount { value },
                );
            }
        }
    }

    /// Remaps a whole document in dependency order.
    #[must_use]
    pub fn remap_document(
        mut self,
        document: SnapshotDocument,
    ) -> (SnapshotDocument, Vec<IntegrityWarning>) {
        let SnapshotDocument {
            format_version,
            accesses,
            accounts,
            categories,
            operations,
            budgets,
            mut settings,
            alerts,
        } = document;

        let (accesses, access_ids) = self.densify(Collection::Accesses, accesses);

        let accounts = self.rewrite_required(
            Collection::Accounts,
            accounts,
            "accessId",
            (Collection::Accesses, &access_ids),
            |a| &mut a.access_id,
        );
        let (accounts, account_ids) = self.densify(Collection::Accounts, accounts);

        let (categories, category_ids) = self.densify(Collection::Categories, categories);

        let mut operations = self.rewrite_required(
            Collection::Transactions,
            operations,
            "accountId",
            (Collection::Accounts, &account_ids),
            |op| &mut op.account_id,
        );
        self.rewrite_optional(
            Collection::Transactions,
            &mut operations,
            "categoryId",
            (Collection::Categories, &category_ids),
            |op| &mut op.category_id,
        );

        let budgets = self.rewrite_required(
            Collection::Budgets,
            budgets,
            "categoryId",
            (Collection::Categories, &category_ids),
            |b| &mut b.category_id,
        );

        let alerts = self.rewrite_required(
            Collection::Alerts,
            alerts,
            "accountId",
            (Collection::Accounts, &account_ids),
            |a| &mut a.account_id,
        );

        self.translate_default_account(&mut settings, &account_ids);

        let document = SnapshotDocument {
            format_version,
            accesses,
            accounts,
            categories,
            operations,
            budgets,
            settings,
            alerts,
        };
        (document, self.warnings)
    }

    /// Returns the warnings collected so far.
    #[must_use]
    pub fn warnings(&self) -> &[IntegrityWarning] {
        &self.warnings
    }

    /// Consumes the remapper, returning its warnings.
    #[must_use]
    pub fn into_warnings(self) -> Vec<IntegrityWarning> {
        self.warnings
    }
}

/// Remaps a document with a fresh [`Remapper`].
#[must_use]
pub fn remap_document(document: SnapshotDocument) -> (SnapshotDocument, Vec<IntegrityWarning>) {
    Remapper::new().remap_document(document)
}
