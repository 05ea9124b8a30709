//! The snapshot engine facade.

use crate::config::{EngineConfig, KdfParams};
use crate::crypto::SealedHeader;
use crate::error::CoreResult;
use crate::export::{ExportOutput, Exporter};
use crate::import::{decode_request, ImportMerger, ImportReport, ImportRequest};
use crate::lock::UserLocks;
use serde::Serialize;
use std::sync::Arc;
use tally_codec::{
    parse_request, DocumentCounts, DroppedSetting, Envelope, LegacyShim, RejectedRecord,
    SnapshotDocument,
};
use tally_store::{EntityStore, UserId};
use tracing::debug;

/// What [`SnapshotEngine::inspect`] learned about a payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Inspection {
    /// Whether the payload is sealed.
    pub encrypted: bool,
    /// KDF parameters of a sealed payload.
    pub kdf: Option<KdfParams>,
    /// Document details, if the payload is plain or could be opened.
    pub document: Option<DocumentSummary>,
}

/// Summary of a decoded document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    /// Format version the document was written with.
    pub source_version: u32,
    /// Records per collection.
    pub counts: DocumentCounts,
    /// Legacy shims the decoder would apply.
    pub shims: Vec<LegacyShim>,
    /// Settings the decoder would drop.
    pub dropped_settings: Vec<DroppedSetting>,
    /// Records that do not match the schema and would be left out.
    pub rejected: Vec<RejectedRecord>,
}

/// Exports and imports user snapshots against one store.
///
/// The engine holds no per-call state: every export and import builds its
/// own document and id mappings. Imports for the same user are serialized;
/// everything else may run concurrently.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tally_core::{EngineConfig, ImportRequest, SnapshotEngine};
/// use tally_store::{Category, EntityStore, InMemoryStore, UserId};
///
/// let source = Arc::new(InMemoryStore::new());
/// source
///     .with_transaction(UserId(1), &mut |w| {
///         w.insert_categories(vec![Category::new("Rent")])?;
///         Ok(())
///     })
///     .unwrap();
///
/// let engine = SnapshotEngine::new(source, EngineConfig::default()).unwrap();
/// let export = engine.export(UserId(1), None).unwrap();
///
/// let target = SnapshotEngine::new(Arc::new(InMemoryStore::new()), EngineConfig::default()).unwrap();
/// let report = target.import(UserId(5), &ImportRequest::new(export.bytes)).unwrap();
/// assert_eq!(report.inserted.categories, 1);
/// ```
#[derive(Debug)]
pub struct SnapshotEngine<S: EntityStore> {
    store: Arc<S>,
    config: EngineConfig,
    locks: UserLocks,
}

impl<S: EntityStore> SnapshotEngine<S> {
    /// Creates an engine over `store`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` does not validate.
    pub fn new(store: Arc<S>, config: EngineConfig) -> CoreResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            locks: UserLocks::new(),
        })
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Exports `user`'s dataset, sealed if a passphrase is given.
    ///
    /// # Errors
    ///
    /// See [`Exporter::export`].
    pub fn export(&self, user: UserId, passphrase: Option<&str>) -> CoreResult<ExportOutput> {
        Exporter::new(&*self.store, &self.config).export(user, passphrase)
    }

    /// Imports a wire request into `user`'s dataset.
    ///
    /// Blocks while another import for the same user is in flight.
    ///
    /// # Errors
    ///
    /// See [`ImportMerger::import`].
    pub fn import(&self, user: UserId, request: &ImportRequest) -> CoreResult<ImportReport> {
        let _guard = self.locks.acquire(user);
        ImportMerger::new(&*self.store, &self.config).import(user, request)
    }

    /// Merges a document produced outside the engine into `user`'s dataset.
    ///
    /// # Errors
    ///
    /// See [`ImportMerger::merge_document`].
    pub fn merge_document(
        &self,
        user: UserId,
        document: SnapshotDocument,
    ) -> CoreResult<ImportReport> {
        let _guard = self.locks.acquire(user);
        ImportMerger::new(&*self.store, &self.config).merge_document(user, document)
    }

    /// Decodes a payload without writing anything.
    ///
    /// A sealed payload without a passphrase is described by its header
    /// only.
    ///
    /// # Errors
    ///
    /// Same input errors as an import.
    pub fn inspect(&self, request: &ImportRequest) -> CoreResult<Inspection> {
        inspect(request, &self.config)
    }
}

/// Decodes a payload without a store.
///
/// # Errors
///
/// Same input errors as an import.
pub fn inspect(request: &ImportRequest, config: &EngineConfig) -> CoreResult<Inspection> {
    let parsed = parse_request(request.payload(), config.max_document_size)?;
    let kdf = match &parsed.envelope {
        Envelope::Sealed(sealed) => Some(SealedHeader::parse(sealed)?.kdf),
        Envelope::Plain(_) => None,
    };
    let encrypted = kdf.is_some();

    if encrypted && !request.has_passphrase() && parsed.passphrase.is_none() {
        debug!("sealed payload inspected without passphrase");
        return Ok(Inspection {
            encrypted,
            kdf,
            document: None,
        });
    }

    let decoded = decode_request(request, config)?;
    Ok(Inspection {
        encrypted,
        kdf,
        document: Some(DocumentSummary {
            source_version: decoded.source_version,
            counts: decoded.document.counts(),
            shims: decoded.shims,
            dropped_settings: decoded.dropped_settings,
            rejected: decoded.rejected,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ImportState;
    use tally_store::{Category, InMemoryStore};

    fn fast_config() -> EngineConfig {
        EngineConfig::new().kdf(KdfParams::new(64, 1, 1))
    }

    fn engine_with_category() -> SnapshotEngine<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store
            .with_transaction(UserId(1), &mut |w| {
                w.insert_categories(vec![Category::new("Rent")])?;
                Ok(())
            })
            .unwrap();
        SnapshotEngine::new(store, fast_config()).unwrap()
    }

    #[test]
    fn rejects_invalid_config() {
        let config = EngineConfig::new().kdf(KdfParams::new(1, 1, 1));
        assert!(SnapshotEngine::new(Arc::new(InMemoryStore::new()), config).is_err());
    }

    #[test]
    fn inspect_sealed_without_passphrase() {
        let engine = engine_with_category();
        let export = engine.export(UserId(1), Some("inspect me")).unwrap();

        let inspection = engine.inspect(&ImportRequest::new(export.bytes.clone())).unwrap();
        assert!(inspection.encrypted);
        assert_eq!(inspection.kdf, Some(KdfParams::new(64, 1, 1)));
        assert!(inspection.document.is_none());

        let inspection = engine
            .inspect(&ImportRequest::new(export.bytes).with_passphrase("inspect me"))
            .unwrap();
        let summary = inspection.document.unwrap();
        assert_eq!(summary.counts.categories, 1);
    }

    #[test]
    fn inspect_writes_nothing() {
        let engine = engine_with_category();
        let export = engine.export(UserId(1), None).unwrap();
        engine.inspect(&ImportRequest::new(export.bytes)).unwrap();
        assert!(engine.store().list_categories(UserId(2)).unwrap().is_empty());
        assert_eq!(engine.store().list_categories(UserId(1)).unwrap().len(), 1);
    }

    #[test]
    fn merge_document_enters_after_decoding() {
        let engine = engine_with_category();
        let mut doc = SnapshotDocument::new();
        doc.settings.insert("theme".into(), "dark".into());
        doc.settings.insert("emails-enabled".into(), "true".into());

        let report = engine.merge_document(UserId(1), doc).unwrap();
        assert_eq!(report.state, ImportState::Committed);
        assert_eq!(report.inserted.settings, 1);
        assert_eq!(report.dropped_settings.len(), 1);
    }
}
