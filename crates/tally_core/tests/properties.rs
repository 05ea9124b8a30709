//! Property tests over generated snapshot documents.

use proptest::prelude::*;
use std::sync::Arc;
use tally_codec::{decode, encode};
use tally_core::{remap_document, EngineConfig, Exporter, ImportRequest, KdfParams, SnapshotEngine};
use tally_store::{EntityStore, InMemoryStore, UserId};
use tally_testkit::prelude::*;

const USER: UserId = UserId(7);

fn config() -> EngineConfig {
    EngineConfig::new()
        .kdf(KdfParams::new(64, 1, 1))
        .export_secrets_in_plaintext(true)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn decode_inverts_encode(doc in document_strategy()) {
        let bytes = encode(&doc).unwrap();
        let report = decode(&bytes).unwrap();
        prop_assert!(report.shims.is_empty());
        prop_assert_eq!(report.document, doc);
    }

    #[test]
    fn remap_is_identity_on_dense_documents(doc in document_strategy()) {
        let (remapped, warnings) = remap_document(doc.clone());
        prop_assert!(warnings.is_empty());
        prop_assert_eq!(remapped, doc);
    }

    #[test]
    fn merge_then_export_reproduces_document(doc in document_strategy()) {
        let store = InMemoryStore::new();
        let config = config();
        let engine = SnapshotEngine::new(Arc::new(store), config.clone()).unwrap();

        let report = engine.merge_document(USER, doc.clone()).unwrap();
        prop_assert!(report.warnings.is_empty());
        prop_assert_eq!(report.inserted, doc.counts());

        let data = engine.store().read_user(USER).unwrap();
        assert_closed(&data);

        let (exported, warnings) = Exporter::new(&**engine.store(), &config)
            .build_document(USER, true)
            .unwrap();
        prop_assert!(warnings.is_empty());
        prop_assert_eq!(exported, doc);
    }

    #[test]
    fn reimport_doubles_every_collection(doc in document_strategy()) {
        let engine = SnapshotEngine::new(Arc::new(InMemoryStore::new()), config()).unwrap();
        let bytes = encode(&doc).unwrap();

        engine.import(USER, &ImportRequest::new(bytes.clone())).unwrap();
        engine.import(USER, &ImportRequest::new(bytes)).unwrap();

        let data = engine.store().read_user(USER).unwrap();
        let counts = doc.counts();
        prop_assert_eq!(data.transactions.len(), 2 * counts.operations);
        prop_assert_eq!(data.accounts.len(), 2 * counts.accounts);
        prop_assert_eq!(data.budgets.len(), 2 * counts.budgets);
        assert_closed(&data);
    }
}
