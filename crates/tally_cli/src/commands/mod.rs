//! CLI command implementations.

pub mod export;
pub mod import;
pub mod inspect;
pub mod redact;
pub mod settings;

use std::env;
use zeroize::Zeroizing;

/// Reads the passphrase from the environment variable `var`.
pub fn passphrase(var: &str) -> Result<Zeroizing<String>, Box<dyn std::error::Error>> {
    optional_passphrase(var).ok_or_else(|| format!("Passphrase required: set {var}").into())
}

/// Reads the passphrase from `var` if it is set and non-empty.
pub fn optional_passphrase(var: &str) -> Option<Zeroizing<String>> {
    env::var(var)
        .ok()
        .filter(|value| !value.is_empty())
        .map(Zeroizing::new)
}
