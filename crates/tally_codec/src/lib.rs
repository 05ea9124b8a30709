//! # Tally Codec
//!
//! The versioned snapshot document format.
//!
//! A snapshot document is the portable form of one user's dataset. This
//! crate owns its schema, the canonical JSON encoding, the upgrade path
//! for documents written by older releases, and the transport envelope
//! that flags whether a payload is sealed.
//!
//! ## Format rules
//!
//! - Top-level `formatVersion`; absent means the legacy version 1
//! - Ids are document-local, dense and zero-based
//! - Transactions, budgets and alerts carry no id
//! - Only whitelisted, non-ghost settings travel
//! - Encoding is deterministic: equal documents give equal bytes
//!
//! ## Usage
//!
//! ```
//! use tally_codec::{decode, encode, CategoryRecord, SnapshotDocument};
//!
//! let mut doc = SnapshotDocument::new();
//! doc.categories.push(CategoryRecord { id: 0, label: "Food".into(), color: None });
//!
//! let bytes = encode(&doc).unwrap();
//! let report = decode(&bytes).unwrap();
//! assert_eq!(report.document, doc);
//! assert!(report.shims.is_empty());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod document;
mod encoder;
mod envelope;
mod error;
mod legacy;
mod settings;

pub use decoder::{decode, DecodeReport, RejectedRecord, SnapshotDecoder, DEFAULT_MAX_DOCUMENT_SIZE};
pub use document::{
    AccessRecord, AccountRecord, AlertRecord, BudgetRecord, CategoryRecord, DocId,
    DocumentCounts, OperationRecord, SnapshotDocument, CURRENT_FORMAT_VERSION,
    LEGACY_FORMAT_VERSION,
};
pub use encoder::{encode, encode_pretty};
pub use envelope::{parse_request, Envelope, ParsedEnvelope};
pub use error::{CodecError, CodecResult};
pub use legacy::{LegacyShim, UNKNOWN_OPERATION_TYPE, UNRESOLVED_LEGACY_ID};
pub use settings::{
    default_value, lookup, rejection, retain_exportable, DroppedSetting, SettingDef,
    SettingRejection, DEFAULT_ACCOUNT_ID, DEFAULT_SETTINGS,
};
