//! Referential closure checks.

use std::collections::HashSet;
use tally_codec::DEFAULT_ACCOUNT_ID;
use tally_store::{RowId, UserData};

/// Lists every foreign key in `data` that does not resolve.
#[must_use]
pub fn dangling_references(data: &UserData) -> Vec<String> {
    let accesses: HashSet<RowId> = data.accesses.iter().map(|r| r.id).collect();
    let accounts: HashSet<RowId> = data.accounts.iter().map(|r| r.id).collect();
    let categories: HashSet<RowId> = data.categories.iter().map(|r| r.id).collect();

    let mut dangling = Vec::new();
    for row in &data.accounts {
        if !accesses.contains(&row.value.access_id) {
            dangling.push(format!("account {} -> access {}", row.id, row.value.access_id));
        }
    }
    for row in &data.transactions {
        if !accounts.contains(&row.value.account_id) {
            dangling.push(format!("transaction {} -> account {}", row.id, row.value.account_id));
        }
        if let Some(category) = row.value.category_id {
            if !categories.contains(&category) {
                dangling.push(format!("transaction {} -> category {category}", row.id));
            }
        }
    }
    for row in &data.budgets {
        if !categories.contains(&row.value.category_id) {
            dangling.push(format!("budget {} -> category {}", row.id, row.value.category_id));
        }
    }
    for row in &data.alerts {
        if !accounts.contains(&row.value.account_id) {
            dangling.push(format!("alert {} -> account {}", row.id, row.value.account_id));
        }
    }
    if let Some(value) = data.settings.get(DEFAULT_ACCOUNT_ID) {
        let resolves = value.is_empty()
            || value
                .parse::<RowId>()
                .map_or(false, |id| accounts.contains(&id));
        if !resolves {
            dangling.push(format!("setting {DEFAULT_ACCOUNT_ID} -> account {value}"));
        }
    }
    dangling
}

/// Asserts that every foreign key in `data` resolves.
///
/// # Panics
///
/// Panics listing the dangling references.
pub fn assert_closed(data: &UserData) {
    let dangling = dangling_references(data);
    assert!(dangling.is_empty(), "dangling references: {dangling:?}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{seed, Scenario};
    use tally_store::{Collection, EntityStore, InMemoryStore, UserId};

    #[test]
    fn seeded_data_is_closed() {
        let store = InMemoryStore::new();
        seed(&store, UserId(1), &Scenario::full());
        assert_closed(&store.read_user(UserId(1)).unwrap());
    }

    #[test]
    fn deleted_parent_is_reported() {
        let store = InMemoryStore::new();
        let seeded = seed(&store, UserId(1), &Scenario::new(1, 1, 1, 1));
        store
            .with_transaction(UserId(1), &mut |w| {
                w.delete_rows(Collection::Categories, &seeded.category_ids)?;
                Ok(())
            })
            .unwrap();
        let dangling = dangling_references(&store.read_user(UserId(1)).unwrap());
        assert_eq!(dangling.len(), 1);
        assert!(dangling[0].contains("category"));
    }
}
