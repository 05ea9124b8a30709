//! Engine configuration.

use crate::error::{CoreError, CoreResult};
use crate::redact::DEFAULT_PATTERN_SIZE_LIMIT;
use serde::Serialize;
use tally_codec::DEFAULT_MAX_DOCUMENT_SIZE;

/// Argon2id cost parameters.
///
/// The parameters used to seal a payload are stored in its header, so a
/// payload can always be opened regardless of the local configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of passes.
    pub iterations: u32,
    /// Degree of parallelism.
    pub lanes: u32,
}

impl KdfParams {
    /// Largest memory cost accepted when opening a payload (1 GiB).
    pub const MAX_MEMORY_KIB: u32 = 1024 * 1024;
    /// Largest pass count accepted when opening a payload.
    pub const MAX_ITERATIONS: u32 = 64;
    /// Largest parallelism accepted when opening a payload.
    pub const MAX_LANES: u32 = 16;

    /// Creates a parameter set.
    #[must_use]
    pub const fn new(memory_kib: u32, iterations: u32, lanes: u32) -> Self {
        Self {
            memory_kib,
            iterations,
            lanes,
        }
    }

    /// Checks the parameters against the hard ceilings and Argon2's own
    /// lower bounds.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the offending parameter.
    pub fn validate(&self) -> CoreResult<()> {
        if self.lanes == 0 || self.lanes > Self::MAX_LANES {
            return Err(CoreError::config(format!(
                "kdf lanes must be in 1..={}, got {}",
                Self::MAX_LANES,
                self.lanes
            )));
        }
        if self.iterations == 0 || self.iterations > Self::MAX_ITERATIONS {
            return Err(CoreError::config(format!(
                "kdf iterations must be in 1..={}, got {}",
                Self::MAX_ITERATIONS,
                self.iterations
            )));
        }
        let min_memory = 8 * self.lanes;
        if self.memory_kib < min_memory || self.memory_kib > Self::MAX_MEMORY_KIB {
            return Err(CoreError::config(format!(
                "kdf memory must be in {min_memory}..={} KiB, got {}",
                Self::MAX_MEMORY_KIB,
                self.memory_kib
            )));
        }
        Ok(())
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        // OWASP minimum for Argon2id: 19 MiB, 2 passes, 1 lane.
        Self::new(19 * 1024, 2, 1)
    }
}

/// Configuration for a [`SnapshotEngine`](crate::SnapshotEngine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Key derivation cost for sealed exports.
    pub kdf: KdfParams,

    /// Largest accepted import payload in bytes, checked before parsing.
    pub max_document_size: usize,

    /// Whether plaintext exports keep access passwords.
    pub export_secrets_in_plaintext: bool,

    /// Compiled size limit for the patterns masking logins in import logs.
    pub redaction_size_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kdf: KdfParams::default(),
            max_document_size: DEFAULT_MAX_DOCUMENT_SIZE,
            export_secrets_in_plaintext: false,
            redaction_size_limit: DEFAULT_PATTERN_SIZE_LIMIT,
        }
    }
}

impl EngineConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the key derivation cost.
    #[must_use]
    pub const fn kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    /// Sets the largest accepted import payload.
    #[must_use]
    pub const fn max_document_size(mut self, size: usize) -> Self {
        self.max_document_size = size;
        self
    }

    /// Sets whether plaintext exports keep access passwords.
    #[must_use]
    pub const fn export_secrets_in_plaintext(mut self, value: bool) -> Self {
        self.export_secrets_in_plaintext = value;
        self
    }

    /// Sets the compiled size limit for login redaction patterns.
    #[must_use]
    pub const fn redaction_size_limit(mut self, limit: usize) -> Self {
        self.redaction_size_limit = limit;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the KDF parameters are out of range or the size
    /// limit is zero.
    pub fn validate(&self) -> CoreResult<()> {
        self.kdf.validate()?;
        if self.max_document_size == 0 {
            return Err(CoreError::config("max_document_size must be positive"));
        }
        Ok(())
    }
}
