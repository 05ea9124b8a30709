//! Error types for the snapshot engine.

use serde::Serialize;
use std::fmt;
use std::io;
use tally_codec::{CodecError, RejectedRecord};
use tally_store::{Collection, StoreError};
use thiserror::Error;

/// Result type for engine operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that abort an export or an import.
///
/// None of these leave partial effects behind: a failed export produces no
/// output and a failed import leaves the store as it was.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The input is not a structurally valid document or sealed payload.
    #[error("malformed document: {message}")]
    MalformedDocument {
        /// Description of the problem.
        message: String,
    },

    /// The document was written by a newer release.
    #[error("unsupported format version {found} (newest supported is {supported})")]
    UnsupportedVersion {
        /// Version declared by the document.
        found: u64,
        /// Newest version this build reads.
        supported: u32,
    },

    /// Authentication of a sealed payload failed.
    ///
    /// A wrong passphrase and a corrupted ciphertext are deliberately
    /// reported the same way.
    #[error("invalid password")]
    InvalidPassword,

    /// A sealed payload was supplied without a passphrase.
    #[error("payload is encrypted but no passphrase was given")]
    PassphraseRequired,

    /// The passphrase offered for sealing an export is too short.
    #[error("passphrase must be at least {min_length} characters long")]
    WeakPassphrase {
        /// Minimum accepted length, in characters.
        min_length: usize,
    },

    /// The store rejected a read or write.
    #[error("storage error: {0}")]
    Storage(StoreError),

    /// Data belonging to another user was reached.
    #[error("tenant isolation violation: {message}")]
    TenantIsolationViolation {
        /// Description of the offending access.
        message: String,
    },

    /// Key derivation failed.
    #[error("key derivation failed: {message}")]
    KeyDerivation {
        /// Description of the failure.
        message: String,
    },

    /// Sealing a payload failed.
    #[error("encryption failed: {message}")]
    Encryption {
        /// Description of the failure.
        message: String,
    },

    /// A document could not be encoded.
    #[error("encoding failed: {message}")]
    Encoding {
        /// Description of the failure.
        message: String,
    },

    /// Invalid engine configuration.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CoreError {
    /// Creates a malformed document error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedDocument {
            message: message.into(),
        }
    }

    /// Creates a tenant isolation violation.
    pub fn tenant_violation(message: impl Into<String>) -> Self {
        Self::TenantIsolationViolation {
            message: message.into(),
        }
    }

    /// Creates a key derivation error.
    pub fn key_derivation(message: impl Into<String>) -> Self {
        Self::KeyDerivation {
            message: message.into(),
        }
    }

    /// Creates an encryption error.
    pub fn encryption(message: impl Into<String>) -> Self {
        Self::Encryption {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<CodecError> for CoreError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Malformed { message } => Self::MalformedDocument { message },
            CodecError::TooLarge { .. } => Self::malformed(err.to_string()),
            CodecError::UnsupportedVersion { found, supported } => {
                Self::UnsupportedVersion { found, supported }
            }
            CodecError::EncodingFailed { message } => Self::Encoding { message },
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::TenantMismatch { .. } => Self::tenant_violation(err.to_string()),
            other => Self::Storage(other),
        }
    }
}

/// Why a record was dropped or altered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", rename_all = "kebab-case")]
pub enum IntegrityIssue {
    /// A required foreign key has no target; the record was dropped.
    DanglingReference {
        /// Name of the foreign key field.
        field: &'static str,
        /// Collection the key points into.
        target: Collection,
        /// The unresolved id.
        id: u64,
    },
    /// An optional foreign key has no target; it was cleared.
    ClearedReference {
        /// Name of the foreign key field.
        field: &'static str,
        /// Collection the key points into.
        target: Collection,
        /// The unresolved id.
        id: u64,
    },
    /// An id appeared twice in one collection; the later record was dropped.
    DuplicateId {
        /// The repeated id.
        id: u64,
    },
    /// A field value is out of range; the record was dropped.
    InvalidValue {
        /// Name of the field.
        field: &'static str,
    },
    /// The record does not match the document schema; it was dropped.
    MalformedRecord {
        /// What the decoder rejected.
        reason: String,
    },
    /// The default-account setting names an account that is not exported
    /// or imported; the setting was dropped.
    UnresolvedDefaultAccount {
        /// The setting value.
        value: String,
    },
}

/// A non-fatal referential integrity problem.
///
/// The affected record was dropped or repaired and the operation carried
/// on. Warnings are collected into export and import reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityWarning {
    /// Collection of the affected record.
    pub collection: Collection,
    /// Position of the record in its input sequence.
    pub index: usize,
    /// What was wrong.
    #[serde(flatten)]
    pub issue: IntegrityIssue,
}

impl From<RejectedRecord> for IntegrityWarning {
    fn from(rejected: RejectedRecord) -> Self {
        Self {
            collection: rejected.collection,
            index: rejected.index,
            issue: IntegrityIssue::MalformedRecord {
                reason: rejected.reason,
            },
        }
    }
}

impl fmt::Display for IntegrityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (collection, index) = (self.collection, self.index);
        match &self.issue {
            IntegrityIssue::DanglingReference { field, target, id } => write!(
                f,
                "{collection}[{index}] dropped: {field} {id} has no match in {target}"
            ),
            IntegrityIssue::ClearedReference { field, target, id } => write!(
                f,
                "{collection}[{index}] kept with {field} cleared: {id} has no match in {target}"
            ),
            IntegrityIssue::DuplicateId { id } => {
                write!(f, "{collection}[{index}] dropped: duplicate id {id}")
            }
            IntegrityIssue::InvalidValue { field } => {
                write!(f, "{collection}[{index}] dropped: invalid {field}")
            }
            IntegrityIssue::MalformedRecord { reason } => {
                write!(f, "{collection}[{index}] dropped: {reason}")
            }
            IntegrityIssue::UnresolvedDefaultAccount { value } => {
                write!(f, "default account {value:?} does not resolve, setting dropped")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_store::UserId;

    #[test]
    fn codec_errors_map_onto_taxonomy() {
        let err: CoreError = CodecError::TooLarge { size: 10, limit: 5 }.into();
        assert!(matches!(err, CoreError::MalformedDocument { .. }));

        let err: CoreError = CodecError::UnsupportedVersion {
            found: 9,
            supported: 2,
        }
        .into();
        assert!(matches!(err, CoreError::UnsupportedVersion { found: 9, .. }));
    }

    #[test]
    fn tenant_mismatch_is_isolation_violation() {
        let err: CoreError = StoreError::TenantMismatch {
            collection: Collection::Accounts,
            id: 4,
            owner: UserId(2),
            requested: UserId(1),
        }
        .into();
        assert!(matches!(err, CoreError::TenantIsolationViolation { .. }));

        let err: CoreError = StoreError::write_failed("disk full").into();
        assert!(matches!(err, CoreError::Storage(_)));
    }

    #[test]
    fn warning_display_names_the_record() {
        let warning = IntegrityWarning {
            collection: Collection::Transactions,
            index: 3,
            issue: IntegrityIssue::ClearedReference {
                field: "categoryId",
                target: Collection::Categories,
                id: 7,
            },
        };
        assert_eq!(
            warning.to_string(),
            "operations[3] kept with categoryId cleared: 7 has no match in categories"
        );
    }

    #[test]
    fn rejected_record_becomes_warning() {
        let warning = IntegrityWarning::from(RejectedRecord {
            collection: Collection::Alerts,
            index: 2,
            reason: "unknown variant `weekly-digest`".into(),
        });
        assert_eq!(
            warning.issue,
            IntegrityIssue::MalformedRecord {
                reason: "unknown variant `weekly-digest`".into()
            }
        );
        assert_eq!(
            warning.to_string(),
            "alerts[2] dropped: unknown variant `weekly-digest`"
        );
    }
}
