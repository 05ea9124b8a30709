//! The default-settings table.
//!
//! Only keys declared here may travel in a snapshot. Ghost settings are
//! declared too (the live system still needs their defaults) but are
//! computed at runtime and never exported or imported.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

/// Key of the setting holding the user's default account.
///
/// Its value is a storage id and must be translated on export and import.
pub const DEFAULT_ACCOUNT_ID: &str = "default-account-id";

/// Declaration of one setting key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingDef {
    /// Setting key.
    pub key: &'static str,
    /// Value the live system uses when the key is unset.
    pub default: &'static str,
    /// Whether the value is computed at runtime.
    pub ghost: bool,
}

const fn setting(key: &'static str, default: &'static str) -> SettingDef {
    SettingDef {
        key,
        default,
        ghost: false,
    }
}

const fn ghost(key: &'static str, default: &'static str) -> SettingDef {
    SettingDef {
        key,
        default,
        ghost: true,
    }
}

/// Every setting key known to this build.
pub const DEFAULT_SETTINGS: &[SettingDef] = &[
    setting("budget-display-percent", "false"),
    setting("budget-display-no-threshold", "true"),
    setting("connector-auto-merge-accounts", "true"),
    setting("connector-auto-update", "true"),
    setting("connector-enable-debug", "false"),
    setting(DEFAULT_ACCOUNT_ID, ""),
    setting("default-chart-display-type", "all"),
    setting("default-chart-period", "current-month"),
    setting("default-chart-type", "all"),
    setting("default-currency", "EUR"),
    setting("demo-mode", "false"),
    setting("duplicate-ignore-different-custom-fields", "true"),
    setting("duplicate-threshold", "24"),
    setting("email-recipient", ""),
    setting("locale", "en"),
    setting("theme", "default"),
    ghost("app-version", ""),
    ghost("can-encrypt", "false"),
    ghost("connector-installed", "false"),
    ghost("connector-version", "?"),
    ghost("emails-enabled", "false"),
    ghost("force-demo-mode", "false"),
    ghost("notifications-enabled", "false"),
    ghost("url-prefix", "/"),
];

/// Looks up the declaration of a key.
#[must_use]
pub fn lookup(key: &str) -> Option<&'static SettingDef> {
    DEFAULT_SETTINGS.iter().find(|def| def.key == key)
}

/// Returns the default value of a key, if declared.
#[must_use]
pub fn default_value(key: &str) -> Option<&'static str> {
    lookup(key).map(|def| def.default)
}

/// Why a setting was left out of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingRejection {
    /// The key has no declared default.
    Unknown,
    /// The key is computed at runtime.
    Ghost,
}

/// Classifies a key: `None` if it may be exported.
#[must_use]
pub fn rejection(key: &str) -> Option<SettingRejection> {
    match lookup(key) {
        None => Some(SettingRejection::Unknown),
        Some(def) if def.ghost => Some(SettingRejection::Ghost),
        Some(_) => None,
    }
}

/// A setting dropped by [`retain_exportable`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedSetting {
    /// The dropped key.
    pub key: String,
    /// Why it was dropped.
    pub reason: SettingRejection,
}

/// Keeps only exportable keys. Unknown keys are logged; ghost keys are
/// dropped silently since every live instance has them.
pub fn retain_exportable(settings: &mut BTreeMap<String, String>) -> Vec<DroppedSetting> {
    let mut dropped = Vec::new();
    settings.retain(|key, _| match rejection(key) {
        None => true,
        Some(reason) => {
            if reason == SettingRejection::Unknown {
                warn!(key = %key, "dropping setting without a known default");
            }
            dropped.push(DroppedSetting {
                key: key.clone(),
                reason,
            });
            false
        }
    });
    dropped
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn keys_are_unique() {
        let keys: HashSet<_> = DEFAULT_SETTINGS.iter().map(|d| d.key).collect();
        assert_eq!(keys.len(), DEFAULT_SETTINGS.len());
    }

    #[test]
    fn default_account_is_exportable_and_empty_by_default() {
        assert_eq!(rejection(DEFAULT_ACCOUNT_ID), None);
        assert_eq!(default_value(DEFAULT_ACCOUNT_ID), Some(""));
    }

    #[test]
    fn retain_drops_ghost_and_unknown_keys() {
        let mut settings = BTreeMap::new();
        settings.insert("locale".to_string(), "fr".to_string());
        settings.insert("can-encrypt".to_string(), "true".to_string());
        settings.insert("mystery".to_string(), "42".to_string());

        let dropped = retain_exportable(&mut settings);

        assert_eq!(settings.keys().collect::<Vec<_>>(), vec!["locale"]);
        assert_eq!(dropped.len(), 2);
        assert!(dropped
            .iter()
            .any(|d| d.key == "can-encrypt" && d.reason == SettingRejection::Ghost));
        assert!(dropped
            .iter()
            .any(|d| d.key == "mystery" && d.reason == SettingRejection::Unknown));
    }
}
