//! Snapshot document decoder.

use crate::document::{SnapshotDocument, CURRENT_FORMAT_VERSION, LEGACY_FORMAT_VERSION};
use crate::error::{CodecError, CodecResult};
use crate::legacy::{self, LegacyShim};
use crate::settings::{self, DroppedSetting};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tally_store::Collection;
use tracing::{debug, warn};

/// Default maximum accepted document size (64 MiB).
pub const DEFAULT_MAX_DOCUMENT_SIZE: usize = 64 * 1024 * 1024;

/// A decoded document plus everything the decoder had to repair.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeReport {
    /// The decoded document, upgraded to the current format version.
    pub document: SnapshotDocument,
    /// Format version declared by (or assumed for) the input.
    pub source_version: u32,
    /// Compatibility shims that were applied.
    pub shims: Vec<LegacyShim>,
    /// Settings that were dropped.
    pub dropped_settings: Vec<DroppedSetting>,
    /// Records left out because they did not match the schema.
    pub rejected: Vec<RejectedRecord>,
}

/// A record the decoder could not read and left out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRecord {
    /// Collection the record belongs to.
    pub collection: Collection,
    /// Position of the record in its input sequence.
    pub index: usize,
    /// Why it could not be read.
    pub reason: String,
}

impl RejectedRecord {
    fn new(collection: Collection, index: usize, reason: impl Into<String>) -> Self {
        let rejected = Self {
            collection,
            index,
            reason: reason.into(),
        };
        warn!(
            collection = %rejected.collection,
            index,
            reason = %rejected.reason,
            "dropping unreadable record"
        );
        rejected
    }
}

/// Reads a collection record by record, leaving out the ones that fail.
fn read_collection<T: DeserializeOwned>(
    root: &mut Map<String, Value>,
    collection: Collection,
    rejected: &mut Vec<RejectedRecord>,
) -> CodecResult<Vec<T>> {
    let items = match root.remove(collection.as_str()) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(CodecError::malformed(format!(
                "{collection} is not an array"
            )))
        }
    };

    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match serde_json::from_value(item) {
            Ok(record) => records.push(record),
            Err(e) => rejected.push(RejectedRecord::new(collection, index, e.to_string())),
        }
    }
    Ok(records)
}

/// Reads the settings map, leaving out values that are not strings.
fn read_settings(
    root: &mut Map<String, Value>,
    rejected: &mut Vec<RejectedRecord>,
) -> CodecResult<BTreeMap<String, String>> {
    let entries = match root.remove("settings") {
        None | Some(Value::Null) => return Ok(BTreeMap::new()),
        Some(Value::Object(entries)) => entries,
        Some(_) => return Err(CodecError::malformed("settings is not an object")),
    };

    let mut settings = BTreeMap::new();
    for (index, (key, value)) in entries.into_iter().enumerate() {
        match value {
            Value::String(value) => {
                settings.insert(key, value);
            }
            other => rejected.push(RejectedRecord::new(
                Collection::Settings,
                index,
                format!("{key}: expected a string, found {other}"),
            )),
        }
    }
    Ok(settings)
}

/// Decode a document from bytes with the default size limit.
///
/// # Errors
///
/// See [`SnapshotDecoder::decode`].
pub fn decode(bytes: &[u8]) -> CodecResult<DecodeReport> {
    SnapshotDecoder::new().decode(bytes)
}

/// A snapshot document decoder.
///
/// Decoding runs in three steps: structural parse, legacy upgrade on the
/// raw JSON tree, typed deserialization record by record. A record that
/// does not match the schema is left out and reported; only a root or a
/// collection of the wrong shape fails the whole document. Settings that
/// are unknown or computed at runtime are dropped after deserialization.
#[derive(Debug, Clone)]
pub struct SnapshotDecoder {
    max_size: usize,
}

impl Default for SnapshotDecoder {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_DOCUMENT_SIZE,
        }
    }
}

impl SnapshotDecoder {
    /// Creates a decoder with the default size limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum accepted input size in bytes.
    #[must_use]
    pub const fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Decodes a document.
    ///
    /// # Errors
    ///
    /// - `TooLarge` if the input exceeds the size limit
    /// - `Malformed` if the input is not a JSON object or a collection is
    ///   not an array
    /// - `UnsupportedVersion` if `formatVersion` is newer than
    ///   [`CURRENT_FORMAT_VERSION`]
    pub fn decode(&self, bytes: &[u8]) -> CodecResult<DecodeReport> {
        if bytes.len() > self.max_size {
            return Err(CodecError::TooLarge {
                size: bytes.len(),
                limit: self.max_size,
            });
        }
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| CodecError::malformed(format!("invalid JSON: {e}")))?;
        self.decode_value(value)
    }

    /// Decodes a document that has already been parsed as JSON.
    ///
    /// # Errors
    ///
    /// Same as [`decode`](Self::decode), minus the size check.
    pub fn decode_value(&self, value: Value) -> CodecResult<DecodeReport> {
        let Value::Object(mut root) = value else {
            return Err(CodecError::malformed("document root is not an object"));
        };

        let mut shims = Vec::new();
        let source_version = match root.get("formatVersion") {
            None | Some(Value::Null) => {
                shims.push(LegacyShim::MissingFormatVersion);
                LEGACY_FORMAT_VERSION
            }
            Some(v) => {
                let found = v
                    .as_u64()
                    .ok_or_else(|| CodecError::malformed("formatVersion is not an integer"))?;
                if found > u64::from(CURRENT_FORMAT_VERSION) {
                    return Err(CodecError::UnsupportedVersion {
                        found,
                        supported: CURRENT_FORMAT_VERSION,
                    });
                }
                if found == 0 {
                    return Err(CodecError::malformed("formatVersion must be at least 1"));
                }
                // Bounded by CURRENT_FORMAT_VERSION above.
                found as u32
            }
        };

        legacy::upgrade(&mut root, &mut shims);

        let mut rejected = Vec::new();
        let mut document = SnapshotDocument {
            format_version: CURRENT_FORMAT_VERSION,
            accesses: read_collection(&mut root, Collection::Accesses, &mut rejected)?,
            accounts: read_collection(&mut root, Collection::Accounts, &mut rejected)?,
            categories: read_collection(&mut root, Collection::Categories, &mut rejected)?,
            operations: read_collection(&mut root, Collection::Transactions, &mut rejected)?,
            budgets: read_collection(&mut root, Collection::Budgets, &mut rejected)?,
            settings: read_settings(&mut root, &mut rejected)?,
            alerts: read_collection(&mut root, Collection::Alerts, &mut rejected)?,
        };
        let dropped_settings = settings::retain_exportable(&mut document.settings);

        for shim in &shims {
            warn!(%shim, source_version, "applied legacy shim");
        }
        debug!(
            source_version,
            shims = shims.len(),
            dropped_settings = dropped_settings.len(),
            rejected = rejected.len(),
            "decoded snapshot document"
        );

        Ok(DecodeReport {
            document,
            source_version,
            shims,
            dropped_settings,
            rejected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::encode;
    use crate::settings::SettingRejection;
    use serde_json::json;

    fn bytes(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[test]
    fn decode_current_document() {
        let report = decode(&bytes(json!({
            "formatVersion": 2,
            "categories": [{"id": 0, "label": "Food", "color": null}],
            "settings": {"locale": "fr"}
        })))
        .unwrap();
        assert_eq!(report.source_version, 2);
        assert!(report.shims.is_empty());
        assert_eq!(report.document.categories[0].label, "Food");
        assert_eq!(report.document.settings["locale"], "fr");
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            decode(b"not json at all"),
            Err(CodecError::Malformed { .. })
        ));
        assert!(matches!(
            decode(b"[1, 2, 3]"),
            Err(CodecError::Malformed { .. })
        ));
    }

    #[test]
    fn collection_of_wrong_shape_is_malformed() {
        let err = decode(&bytes(json!({
            "formatVersion": 2,
            "accounts": {"id": 0}
        })))
        .unwrap_err();
        assert!(matches!(err, CodecError::Malformed { .. }));

        let err = decode(&bytes(json!({
            "formatVersion": 2,
            "settings": "locale=fr"
        })))
        .unwrap_err();
        assert!(matches!(err, CodecError::Malformed { .. }));
    }

    #[test]
    fn unreadable_records_are_left_out() {
        let report = decode(&bytes(json!({
            "formatVersion": 2,
            "accesses": [{"id": 0, "vendorId": "demo", "login": "bob"}],
            "accounts": [
                {"id": 0, "accessId": 0, "vendorAccountId": "1", "label": "Main",
                 "importDate": "2023-01-01T00:00:00Z"},
                {"id": 1, "accessId": 0, "vendorAccountId": "2", "label": "No date"}
            ],
            "operations": [{"accountId": 0, "label": "A", "amount": 1.0,
                            "date": "2023-01-02T00:00:00Z", "type": "type.card"}],
            "budgets": [{"categoryId": 0, "year": 2023, "month": -1}],
            "alerts": [{"accountId": 0, "type": "weekly-digest"}],
            "settings": {"locale": "fr", "duplicate-threshold": 24}
        })))
        .unwrap();

        assert_eq!(report.document.accounts.len(), 1);
        assert_eq!(report.document.operations.len(), 1);
        assert!(report.document.budgets.is_empty());
        assert!(report.document.alerts.is_empty());
        assert_eq!(report.document.settings.len(), 1);

        let rejected: Vec<_> = report
            .rejected
            .iter()
            .filter(|r| r.collection != Collection::Settings)
            .map(|r| (r.collection, r.index))
            .collect();
        assert_eq!(
            rejected,
            vec![
                (Collection::Accounts, 1),
                (Collection::Budgets, 0),
                (Collection::Alerts, 0),
            ]
        );
        assert_eq!(report.rejected.len(), 4);
        assert!(report.rejected[0].reason.contains("importDate"));
        assert!(report
            .rejected
            .iter()
            .any(|r| r.reason.contains("weekly-digest")));
    }

    #[test]
    fn future_version_is_rejected() {
        let err = decode(&bytes(json!({"formatVersion": 3}))).unwrap_err();
        assert_eq!(
            err,
            CodecError::UnsupportedVersion {
                found: 3,
                supported: CURRENT_FORMAT_VERSION
            }
        );
    }

    #[test]
    fn missing_version_is_legacy() {
        let report = decode(&bytes(json!({"categories": []}))).unwrap();
        assert_eq!(report.source_version, LEGACY_FORMAT_VERSION);
        assert_eq!(report.document.format_version, CURRENT_FORMAT_VERSION);
        assert!(report.shims.contains(&LegacyShim::MissingFormatVersion));
    }

    #[test]
    fn missing_collections_default_to_empty() {
        let report = decode(b"{\"formatVersion\": 2}").unwrap();
        assert_eq!(report.document, SnapshotDocument::new());
    }

    #[test]
    fn unknown_and_ghost_settings_are_dropped() {
        let report = decode(&bytes(json!({
            "formatVersion": 2,
            "settings": {"locale": "fr", "url-prefix": "/money", "no-such-key": "1"}
        })))
        .unwrap();
        assert_eq!(report.document.settings.len(), 1);
        assert_eq!(report.dropped_settings.len(), 2);
        assert!(report
            .dropped_settings
            .iter()
            .any(|d| d.key == "no-such-key" && d.reason == SettingRejection::Unknown));
    }

    #[test]
    fn size_limit_is_enforced() {
        let decoder = SnapshotDecoder::new().max_size(8);
        assert!(matches!(
            decoder.decode(b"{\"formatVersion\": 2}"),
            Err(CodecError::TooLarge { limit: 8, .. })
        ));
    }

    #[test]
    fn legacy_document_with_string_ids_is_upgraded() {
        let report = decode(&bytes(json!({
            "accesses": [{"id": "a1", "bank": "demo", "login": "alice"}],
            "accounts": [{"id": "b7", "accessId": "a1", "accountNumber": "42",
                          "title": "Main", "importDate": "2019-01-01T00:00:00.000Z"}],
            "categories": [{"id": "c0", "title": "Rent"}, {"id": "c1", "title": "Food"}],
            "operations": [{
                "id": "o1",
                "accountId": "b7",
                "categoryId": "c1",
                "title": "Groceries",
                "raw": "CB GROCERIES",
                "amount": -12.5,
                "date": "2019-03-01T00:00:00.000Z"
            }],
            "settings": [
                {"key": "locale", "value": "fr"},
                {"key": "default-account-id", "value": "b7"}
            ]
        })))
        .unwrap();

        let doc = &report.document;
        assert!(report.rejected.is_empty());
        assert_eq!(doc.accesses[0].id, 0);
        assert_eq!(doc.accounts[0].access_id, 0);
        assert_eq!(doc.operations[0].account_id, 0);
        assert_eq!(doc.operations[0].category_id, Some(1));
        assert_eq!(doc.categories[1].label, "Food");
        assert_eq!(doc.settings["default-account-id"], "0");
        assert!(report.shims.contains(&LegacyShim::StringIds {
            collection: "categories"
        }));
    }

    #[test]
    fn legacy_document_with_numeric_ids_is_upgraded() {
        let report = decode(&bytes(json!({
            "accesses": [{"id": 0, "bank": "demo", "login": "alice"}],
            "categories": [{"id": 0, "title": "Food"}],
            "operations": [{
                "id": 17,
                "accountId": 0,
                "categoryId": 0,
                "title": "Groceries",
                "raw": "CB GROCERIES",
                "amount": -12.5,
                "date": "2019-03-01T00:00:00.000Z"
            }],
            "settings": [{"key": "locale", "value": "fr"}]
        })))
        .unwrap();

        let doc = &report.document;
        assert_eq!(doc.accesses[0].vendor_id, "demo");
        assert_eq!(doc.categories[0].label, "Food");
        assert_eq!(doc.operations[0].label, "Groceries");
        assert_eq!(doc.operations[0].raw_label, "CB GROCERIES");
        assert_eq!(doc.operations[0].transaction_type, "type.unknown");
        assert_eq!(doc.settings["locale"], "fr");
        assert!(report.shims.contains(&LegacyShim::SettingsAsArray));
    }

    #[test]
    fn encode_then_decode_is_identity() {
        let report = decode(&bytes(json!({
            "formatVersion": 2,
            "accounts": [{
                "id": 0, "accessId": 0, "vendorAccountId": "123", "label": "Main",
                "type": "account-type.checking", "initialBalance": 10.1,
                "importDate": "2020-01-01T00:00:00Z"
            }]
        })))
        .unwrap();
        let again = decode(&encode(&report.document).unwrap()).unwrap();
        assert_eq!(again.document, report.document);
        assert!(again.shims.is_empty());
    }
}
