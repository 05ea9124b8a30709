//! # Tally Core
//!
//! The instance snapshot engine: export a user's whole financial dataset
//! as one portable document, optionally sealed under a passphrase, and
//! merge such a document back into a store.
//!
//! ## Components
//!
//! - [`remap`] - Dense id assignment and foreign key rewriting
//! - [`crypto`] - Argon2id + AES-256-GCM sealing
//! - [`redact`] - Secret masking for diagnostics
//! - [`Exporter`] - Store to envelope
//! - [`ImportMerger`] - Envelope to store, all-or-nothing
//! - [`SnapshotEngine`] - Facade owning the store, config and import gate
//!
//! ## Guarantees
//!
//! - A failed export produces no output
//! - A failed import leaves the store exactly as it was
//! - Imported ids never collide with existing ids; importing twice adds
//!   two disjoint copies
//! - Dangling references are repaired or dropped with an
//!   [`IntegrityWarning`], never kept stale
//! - A wrong passphrase and a corrupted payload fail identically

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
pub mod crypto;
mod engine;
mod error;
mod export;
mod import;
mod lock;
pub mod redact;
pub mod remap;

pub use config::{EngineConfig, KdfParams};
pub use engine::{inspect, DocumentSummary, Inspection, SnapshotEngine};
pub use error::{CoreError, CoreResult, IntegrityIssue, IntegrityWarning};
pub use export::{ExportOutput, Exporter};
pub use import::{
    decode_request, DecodedImport, ImportMerger, ImportReport, ImportRequest, ImportState,
};
pub use lock::{UserGuard, UserLocks};
pub use redact::{mask_exact, mask_suffix, Redactor};
pub use remap::{remap_document, IdMapping, Remapper};

/// Version of the snapshot engine.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
