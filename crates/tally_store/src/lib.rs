//! # tally store
//!
//! Entity store abstraction for the tally snapshot engine.
//!
//! This crate is the lowest layer of the workspace. It owns the row model
//! for the seven persisted collections (accesses, accounts, categories,
//! transactions, budgets, settings, alerts) and the [`EntityStore`] trait
//! the export and import paths talk to.
//!
//! ## Design Principles
//!
//! - Every read and write is scoped to a single [`UserId`]
//! - Writes only happen inside [`EntityStore::with_transaction`]; a
//!   failing closure leaves the store exactly as it was
//! - The store assigns storage ids on insert; callers never choose them
//! - Stores must be `Send + Sync` so exports and imports for different
//!   users can run concurrently
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral service instances
//! - [`FileStore`] - A checksummed JSON state file with an advisory lock
//!
//! ## Example
//!
//! ```rust
//! use tally_store::{Category, EntityStore, InMemoryStore, UserId};
//!
//! let store = InMemoryStore::new();
//! let user = UserId(1);
//! store
//!     .with_transaction(user, &mut |w| {
//!         w.insert_categories(vec![Category::new("Groceries")])?;
//!         Ok(())
//!     })
//!     .unwrap();
//! assert_eq!(store.list_categories(user).unwrap().len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod model;
mod store;

pub use error::{StoreError, StoreResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
pub use model::{
    Access, Account, Alert, AlertFrequency, AlertKind, AlertOrder, Attachment, Budget, Category,
    Collection, CustomField, Row, RowId, Transaction, UserData, UserId,
};
pub use store::{EntityStore, StoreWriter};
