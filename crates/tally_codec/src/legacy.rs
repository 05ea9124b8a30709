//! Compatibility shims for documents written by older releases.
//!
//! Shims operate on the raw JSON tree before typed deserialization. Each
//! one only fires when its deprecated layout is actually present, so the
//! whole pass is a no-op on current documents.

use crate::settings::DEFAULT_ACCOUNT_ID;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// A compatibility rewrite that was applied while decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "shim", rename_all = "kebab-case")]
pub enum LegacyShim {
    /// The document had no `formatVersion`; assumed the legacy version.
    MissingFormatVersion,
    /// The payload was not wrapped in a transport envelope.
    MissingDataWrapper,
    /// Settings were stored as an array of `{key, value}` objects.
    SettingsAsArray,
    /// A field was renamed since the document was written.
    RenamedField {
        /// Collection holding the field.
        collection: &'static str,
        /// Deprecated name.
        from: &'static str,
        /// Current name.
        to: &'static str,
    },
    /// Ids of a collection were strings; they were renumbered and every
    /// reference to them rewritten.
    StringIds {
        /// The renumbered collection.
        collection: &'static str,
    },
    /// Transactions had no `type`; the unknown type was filled in.
    MissingOperationType,
    /// A field that must not be imported was removed.
    StrippedField {
        /// Collection holding the field.
        collection: &'static str,
        /// Removed field.
        field: &'static str,
    },
}

impl fmt::Display for LegacyShim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LegacyShim::MissingFormatVersion => f.write_str("missing formatVersion"),
            LegacyShim::MissingDataWrapper => f.write_str("missing data wrapper"),
            LegacyShim::SettingsAsArray => f.write_str("settings stored as array"),
            LegacyShim::RenamedField {
                collection,
                from,
                to,
            } => write!(f, "{collection}.{from} renamed to {to}"),
            LegacyShim::StringIds { collection } => {
                write!(f, "{collection} string ids renumbered")
            }
            LegacyShim::MissingOperationType => f.write_str("operations without type"),
            LegacyShim::StrippedField { collection, field } => {
                write!(f, "{collection}.{field} stripped")
            }
        }
    }
}

/// Type assigned to legacy transactions that have none.
pub const UNKNOWN_OPERATION_TYPE: &str = "type.unknown";

const RENAMES: &[(&str, &str, &str)] = &[
    ("accesses", "bank", "vendorId"),
    ("accounts", "title", "label"),
    ("accounts", "accountNumber", "vendorAccountId"),
    ("categories", "title", "label"),
    ("operations", "title", "label"),
    ("operations", "raw", "rawLabel"),
];

/// Id given to a legacy reference whose target does not exist.
///
/// Renumbered ids are dense, so this value never resolves and the
/// reference is reported as dangling further down the pipeline.
pub const UNRESOLVED_LEGACY_ID: u64 = u64::MAX;

/// Referenced collections and the `(collection, field)` pairs pointing
/// into each of them.
const REFERENCES: &[(&str, &[(&str, &str)])] = &[
    ("accesses", &[("accounts", "accessId")]),
    ("accounts", &[("operations", "accountId"), ("alerts", "accountId")]),
    (
        "categories",
        &[("operations", "categoryId"), ("budgets", "categoryId")],
    ),
];

const STRIPPED: &[(&str, &str)] = &[
    ("operations", "id"),
    ("operations", "attachments"),
    ("operations", "binary"),
    ("budgets", "id"),
    ("alerts", "id"),
];

fn record(shims: &mut Vec<LegacyShim>, shim: LegacyShim) {
    if !shims.contains(&shim) {
        shims.push(shim);
    }
}

fn records<'a>(
    root: &'a Map<String, Value>,
    collection: &str,
) -> impl Iterator<Item = &'a Map<String, Value>> {
    root.get(collection)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

fn records_mut<'a>(
    root: &'a mut Map<String, Value>,
    collection: &str,
) -> impl Iterator<Item = &'a mut Map<String, Value>> {
    root.get_mut(collection)
        .and_then(Value::as_array_mut)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object_mut)
}

/// Rewrites deprecated layouts in place, recording each applied shim.
pub(crate) fn upgrade(root: &mut Map<String, Value>, shims: &mut Vec<LegacyShim>) {
    upgrade_settings(root, shims);

    for &(collection, from, to) in RENAMES {
        let mut applied = false;
        for item in records_mut(root, collection) {
            if item.contains_key(to) {
                continue;
            }
            if let Some(value) = item.remove(from) {
                item.insert(to.to_string(), value);
                applied = true;
            }
        }
        if applied {
            record(
                shims,
                LegacyShim::RenamedField {
                    collection,
                    from,
                    to,
                },
            );
        }
    }

    renumber_string_ids(root, shims);

    let mut missing_type = false;
    for op in records_mut(root, "operations") {
        if op.get("type").map_or(true, Value::is_null) {
            op.insert(
                "type".to_string(),
                Value::String(UNKNOWN_OPERATION_TYPE.to_string()),
            );
            missing_type = true;
        }
    }
    if missing_type {
        record(shims, LegacyShim::MissingOperationType);
    }

    for &(collection, field) in STRIPPED {
        let mut applied = false;
        for item in records_mut(root, collection) {
            applied |= item.remove(field).is_some();
        }
        if applied {
            record(shims, LegacyShim::StrippedField { collection, field });
        }
    }
}

fn id_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn has_string(item: &Map<String, Value>, field: &str) -> bool {
    item.get(field).is_some_and(Value::is_string)
}

/// Replaces string ids with numeric ones, collection by collection.
///
/// A collection is renumbered when its own ids or any reference into it
/// are strings. Each record takes its position as id; a repeated id maps
/// to its first occurrence so the duplicate is still detected later.
/// References are rewritten through the same table.
fn renumber_string_ids(root: &mut Map<String, Value>, shims: &mut Vec<LegacyShim>) {
    for &(target, references) in REFERENCES {
        let uses_strings = records(root, target).any(|item| has_string(item, "id"))
            || references.iter().any(|&(collection, field)| {
                records(root, collection).any(|item| has_string(item, field))
            });
        if !uses_strings {
            continue;
        }

        let mut ids: HashMap<String, u64> = HashMap::new();
        for (position, item) in records_mut(root, target).enumerate() {
            let position = position as u64;
            let id = match item.get("id").and_then(id_key) {
                Some(key) => *ids.entry(key).or_insert(position),
                None => position,
            };
            item.insert("id".to_string(), Value::from(id));
        }
        let lookup = |value: &Value| {
            id_key(value)
                .and_then(|key| ids.get(&key).copied())
                .unwrap_or(UNRESOLVED_LEGACY_ID)
        };

        for &(collection, field) in references {
            for item in records_mut(root, collection) {
                if let Some(value) = item.get_mut(field).filter(|v| !v.is_null()) {
                    *value = Value::from(lookup(&*value));
                }
            }
        }
        if target == "accounts" {
            let default_account = root
                .get_mut("settings")
                .and_then(Value::as_object_mut)
                .and_then(|settings| settings.get_mut(DEFAULT_ACCOUNT_ID))
                .filter(|value| value.as_str().is_some_and(|s| !s.is_empty()));
            if let Some(value) = default_account {
                *value = Value::String(lookup(&*value).to_string());
            }
        }

        record(shims, LegacyShim::StringIds { collection: target });
    }
}

/// Converts `[{key, value, id?}, ...]` settings into a key/value map.
///
/// Non-string scalar values are stringified; entries without a string key
/// are skipped.
fn upgrade_settings(root: &mut Map<String, Value>, shims: &mut Vec<LegacyShim>) {
    let Some(Value::Array(entries)) = root.get("settings") else {
        return;
    };

    let mut map = Map::new();
    for entry in entries {
        let Some(key) = entry.get("key").and_then(Value::as_str) else {
            continue;
        };
        let value = match entry.get("value") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => continue,
            Some(other) => other.to_string(),
        };
        map.insert(key.to_string(), Value::String(value));
    }

    root.insert("settings".to_string(), Value::Object(map));
    record(shims, LegacyShim::SettingsAsArray);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn upgraded(value: Value) -> (Map<String, Value>, Vec<LegacyShim>) {
        let mut root = match value {
            Value::Object(map) => map,
            _ => panic!("test input must be an object"),
        };
        let mut shims = Vec::new();
        upgrade(&mut root, &mut shims);
        (root, shims)
    }

    #[test]
    fn current_layout_is_untouched() {
        let input = json!({
            "categories": [{"id": 0, "label": "Food"}],
            "operations": [{"accountId": 0, "label": "x", "type": "type.card"}],
            "settings": {"locale": "fr"}
        });
        let (root, shims) = upgraded(input.clone());
        assert!(shims.is_empty());
        assert_eq!(Value::Object(root), input);
    }

    #[test]
    fn settings_array_becomes_map() {
        let (root, shims) = upgraded(json!({
            "settings": [
                {"id": 4, "key": "locale", "value": "fr"},
                {"key": "duplicate-threshold", "value": 12},
                {"value": "orphan"}
            ]
        }));
        assert_eq!(shims, vec![LegacyShim::SettingsAsArray]);
        assert_eq!(
            root["settings"],
            json!({"locale": "fr", "duplicate-threshold": "12"})
        );
    }

    #[test]
    fn deprecated_names_are_renamed_once() {
        let (root, shims) = upgraded(json!({
            "categories": [{"id": 0, "title": "Food"}, {"id": 1, "title": "Rent"}],
            "accesses": [{"id": 0, "bank": "demo", "login": "a"}]
        }));
        assert_eq!(root["categories"][1]["label"], "Rent");
        assert_eq!(root["accesses"][0]["vendorId"], "demo");
        assert_eq!(shims.len(), 2);
    }

    #[test]
    fn current_name_wins_over_deprecated_name() {
        let (root, shims) = upgraded(json!({
            "categories": [{"id": 0, "title": "Old", "label": "New"}]
        }));
        assert_eq!(root["categories"][0]["label"], "New");
        assert!(shims.is_empty());
    }

    #[test]
    fn operation_ids_and_attachments_are_stripped() {
        let (root, shims) = upgraded(json!({
            "operations": [{"id": 9, "accountId": 0, "type": "t", "binary": {"fileName": "a.pdf"}}]
        }));
        let op = root["operations"][0].as_object().unwrap();
        assert!(!op.contains_key("id"));
        assert!(!op.contains_key("binary"));
        assert!(shims.contains(&LegacyShim::StrippedField {
            collection: "operations",
            field: "id"
        }));
    }

    #[test]
    fn missing_operation_type_is_filled() {
        let (root, shims) = upgraded(json!({
            "operations": [{"accountId": 0, "type": null}, {"accountId": 0}]
        }));
        assert_eq!(root["operations"][0]["type"], UNKNOWN_OPERATION_TYPE);
        assert_eq!(root["operations"][1]["type"], UNKNOWN_OPERATION_TYPE);
        assert_eq!(shims, vec![LegacyShim::MissingOperationType]);
    }

    #[test]
    fn string_ids_are_renumbered_with_references() {
        let (root, shims) = upgraded(json!({
            "accesses": [{"id": "a1"}, {"id": "a2"}],
            "accounts": [
                {"id": "b7", "accessId": "a2"},
                {"id": "b9", "accessId": "a1"}
            ],
            "operations": [{"accountId": "b9", "categoryId": null}],
            "alerts": [{"accountId": "b7"}],
            "settings": {"default-account-id": "b9"}
        }));
        assert_eq!(root["accesses"][1]["id"], 1);
        assert_eq!(root["accounts"][0]["accessId"], 1);
        assert_eq!(root["accounts"][1]["id"], 1);
        assert_eq!(root["operations"][0]["accountId"], 1);
        assert!(root["operations"][0]["categoryId"].is_null());
        assert_eq!(root["alerts"][0]["accountId"], 0);
        assert_eq!(root["settings"]["default-account-id"], "1");
        assert!(shims.contains(&LegacyShim::StringIds {
            collection: "accesses"
        }));
        assert!(shims.contains(&LegacyShim::StringIds {
            collection: "accounts"
        }));
        assert!(!shims.contains(&LegacyShim::StringIds {
            collection: "categories"
        }));
    }

    #[test]
    fn unknown_string_reference_never_resolves() {
        let (root, _) = upgraded(json!({
            "categories": [{"id": "c1"}],
            "budgets": [{"categoryId": "c1"}, {"categoryId": "gone"}]
        }));
        assert_eq!(root["budgets"][0]["categoryId"], 0);
        assert_eq!(root["budgets"][1]["categoryId"], UNRESOLVED_LEGACY_ID);
    }

    #[test]
    fn repeated_string_id_keeps_first_number() {
        let (root, _) = upgraded(json!({
            "categories": [{"id": "c1"}, {"id": "c2"}, {"id": "c1"}]
        }));
        assert_eq!(root["categories"][1]["id"], 1);
        assert_eq!(root["categories"][2]["id"], 0);
    }

    #[test]
    fn numeric_ids_are_not_renumbered() {
        let (root, shims) = upgraded(json!({
            "accounts": [{"id": 5, "accessId": 3}]
        }));
        assert_eq!(root["accounts"][0]["id"], 5);
        assert!(shims.is_empty());
    }
}
