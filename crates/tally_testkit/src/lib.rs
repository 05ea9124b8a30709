//! # Tally Testkit
//!
//! Test utilities for the tally workspace.
//!
//! This crate provides:
//! - Seeded scenarios and temporary file stores ([`fixtures`])
//! - Proptest strategies for snapshot documents ([`generators`])
//! - A fault-injecting store wrapper ([`faults`])
//! - Referential closure checks over a user's rows ([`integrity`])
//!
//! ## Usage
//!
//! ```rust
//! use tally_store::{EntityStore, InMemoryStore, UserId};
//! use tally_testkit::prelude::*;
//!
//! let store = InMemoryStore::new();
//! seed(&store, UserId(1), &Scenario::new(2, 3, 5, 100));
//! let data = store.read_user(UserId(1)).unwrap();
//! assert_eq!(data.transactions.len(), 100);
//! assert_closed(&data);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faults;
pub mod fixtures;
pub mod generators;
pub mod integrity;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faults::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integrity::*;
}

pub use faults::*;
pub use fixtures::*;
pub use generators::*;
pub use integrity::*;
