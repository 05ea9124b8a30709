//! Export orchestration: store, document, envelope.

use crate::config::EngineConfig;
use crate::crypto;
use crate::error::{CoreError, CoreResult, IntegrityWarning};
use crate::remap::remap_document;
use tally_codec::{
    encode, retain_exportable, AccessRecord, AccountRecord, AlertRecord, BudgetRecord,
    CategoryRecord, DocumentCounts, Envelope, OperationRecord, SnapshotDocument,
};
use tally_store::{Collection, EntityStore, Row, UserData, UserId};
use tracing::{debug, info};
use zeroize::Zeroizing;

/// The result of an export.
#[derive(Debug, Clone)]
pub struct ExportOutput {
    /// The serialized transport envelope.
    pub bytes: Vec<u8>,
    /// Whether the payload is sealed.
    pub encrypted: bool,
    /// Records per collection in the exported document.
    pub counts: DocumentCounts,
    /// Records dropped or repaired while building the document.
    pub warnings: Vec<IntegrityWarning>,
}

/// Builds snapshot documents from a store.
#[derive(Debug)]
pub struct Exporter<'a, S: EntityStore + ?Sized> {
    store: &'a S,
    config: &'a EngineConfig,
}

fn check_owner<T>(user: UserId, collection: Collection, rows: &[Row<T>]) -> CoreResult<()> {
    match rows.iter().find(|row| row.user_id != user) {
        Some(row) => Err(CoreError::tenant_violation(format!(
            "{collection} row {} belongs to user {}, export requested by {user}",
            row.id, row.user_id
        ))),
        None => Ok(()),
    }
}

fn check_tenant(user: UserId, data: &UserData) -> CoreResult<()> {
    check_owner(user, Collection::Accesses, &data.accesses)?;
    check_owner(user, Collection::Accounts, &data.accounts)?;
    check_owner(user, Collection::Categories, &data.categories)?;
    check_owner(user, Collection::Transactions, &data.transactions)?;
    check_owner(user, Collection::Budgets, &data.budgets)?;
    check_owner(user, Collection::Alerts, &data.alerts)
}

/// Converts rows into a document keyed by storage ids.
fn document_from_rows(data: UserData, include_secrets: bool) -> SnapshotDocument {
    let mut stripped_attachments = 0usize;
    let mut settings = data.settings;
    retain_exportable(&mut settings);

    let document = SnapshotDocument {
        accesses: data
            .accesses
            .into_iter()
            .map(|row| AccessRecord {
                id: row.id,
                vendor_id: row.value.vendor_id,
                login: row.value.login,
                password: row.value.password.filter(|_| include_secrets),
                custom_fields: row.value.custom_fields,
                custom_label: row.value.custom_label,
            })
            .collect(),
        accounts: data
            .accounts
            .into_iter()
            .map(|row| AccountRecord {
                id: row.id,
                access_id: row.value.access_id,
                vendor_account_id: row.value.vendor_account_id,
                label: row.value.label,
                custom_label: row.value.custom_label,
                iban: row.value.iban,
                currency: row.value.currency,
                account_type: row.value.account_type,
                initial_balance: row.value.initial_balance,
                import_date: row.value.import_date,
                exclude_from_balance: row.value.exclude_from_balance,
            })
            .collect(),
        categories: data
            .categories
            .into_iter()
            .map(|row| CategoryRecord {
                id: row.id,
                label: row.value.label,
                color: row.value.color,
            })
            .collect(),
        operations: data
            .transactions
            .into_iter()
            .map(|row| {
                let tx = row.value;
                stripped_attachments += tx.attachments.len();
                OperationRecord {
                    account_id: tx.account_id,
                    category_id: tx.category_id,
                    label: tx.label,
                    raw_label: tx.raw_label,
                    custom_label: tx.custom_label,
                    amount: tx.amount,
                    date: tx.date,
                    debit_date: tx.debit_date,
                    budget_date: tx.budget_date,
                    transaction_type: tx.transaction_type,
                    created_by_user: tx.created_by_user,
                }
            })
            .collect(),
        budgets: data
            .budgets
            .into_iter()
            .map(|row| BudgetRecord {
                category_id: row.value.category_id,
                year: row.value.year,
                month: row.value.month,
                threshold: row.value.threshold,
            })
            .collect(),
        settings,
        alerts: data
            .alerts
            .into_iter()
            .map(|row| AlertRecord {
                account_id: row.value.account_id,
                kind: row.value.kind,
                frequency: row.value.frequency,
                limit: row.value.limit,
                order: row.value.order,
            })
            .collect(),
        ..SnapshotDocument::new()
    };

    if stripped_attachments > 0 {
        debug!(stripped_attachments, "attachments left out of export");
    }
    document
}

impl<'a, S: EntityStore + ?Sized> Exporter<'a, S> {
    /// Creates an exporter over `store`.
    pub fn new(store: &'a S, config: &'a EngineConfig) -> Self {
        Self { store, config }
    }

    /// Builds the document for `user` from one consistent read.
    ///
    /// Access passwords are kept only if `include_secrets` is set.
    ///
    /// # Errors
    ///
    /// Returns `TenantIsolationViolation` if the store hands back a row of
    /// another user, or `Storage` if the read fails.
    pub fn build_document(
        &self,
        user: UserId,
        include_secrets: bool,
    ) -> CoreResult<(SnapshotDocument, Vec<IntegrityWarning>)> {
        let data = self.store.read_user(user)?;
        check_tenant(user, &data)?;
        Ok(remap_document(document_from_rows(data, include_secrets)))
    }

    /// Exports `user`'s dataset, sealing it if a passphrase is given.
    ///
    /// # Errors
    ///
    /// Returns `WeakPassphrase` before reading anything if the passphrase
    /// is shorter than [`crypto::MIN_PASSPHRASE_LEN`]. Otherwise fails
    /// without producing output if the read, the encoding or the sealing
    /// fails.
    pub fn export(&self, user: UserId, passphrase: Option<&str>) -> CoreResult<ExportOutput> {
        if let Some(passphrase) = passphrase {
            crypto::check_passphrase(passphrase)?;
        }
        let include_secrets = passphrase.is_some() || self.config.export_secrets_in_plaintext;
        let (document, warnings) = self.build_document(user, include_secrets)?;
        let counts = document.counts();
        let plaintext = Zeroizing::new(encode(&document)?);

        let envelope = match passphrase {
            Some(passphrase) => {
                Envelope::Sealed(crypto::seal(&plaintext, passphrase, &self.config.kdf)?)
            }
            None => Envelope::Plain(plaintext.to_vec()),
        };
        let encrypted = envelope.is_encrypted();
        let bytes = envelope.to_bytes()?;

        info!(
            %user,
            encrypted,
            accesses = counts.accesses,
            accounts = counts.accounts,
            categories = counts.categories,
            operations = counts.operations,
            budgets = counts.budgets,
            settings = counts.settings,
            alerts = counts.alerts,
            warnings = warnings.len(),
            "export complete"
        );
        Ok(ExportOutput {
            bytes,
            encrypted,
            counts,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tally_codec::{parse_request, DEFAULT_ACCOUNT_ID};
    use tally_store::{
        Access, Account, Attachment, Category, InMemoryStore, StoreWriter, Transaction,
    };

    fn seed(store: &InMemoryStore, user: UserId) -> (u64, u64) {
        let mut ids = (0, 0);
        store
            .with_transaction(user, &mut |w: &mut dyn StoreWriter| {
                let access = w.insert_accesses(vec![Access {
                    vendor_id: "demo".into(),
                    login: "alice".into(),
                    password: Some("hunter2".into()),
                    custom_fields: vec![],
                    custom_label: None,
                }])?;
                let account = w.insert_accounts(vec![Account {
                    access_id: access[0],
                    vendor_account_id: "0001".into(),
                    label: "Checking".into(),
                    custom_label: None,
                    iban: None,
                    currency: Some("EUR".into()),
                    account_type: "account-type.checking".into(),
                    initial_balance: 10.0,
                    import_date: Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap(),
                    exclude_from_balance: false,
                }])?;
                let category = w.insert_categories(vec![Category::new("Food")])?;
                w.insert_transactions(vec![Transaction {
                    account_id: account[0],
                    category_id: Some(category[0]),
                    label: "Bakery".into(),
                    raw_label: "CB BAKERY".into(),
                    custom_label: None,
                    amount: -3.2,
                    date: Utc.with_ymd_and_hms(2022, 1, 3, 0, 0, 0).unwrap(),
                    debit_date: None,
                    budget_date: None,
                    transaction_type: "type.card".into(),
                    created_by_user: false,
                    attachments: vec![Attachment {
                        file_name: "receipt.pdf".into(),
                        content_type: "application/pdf".into(),
                        bytes: vec![1, 2, 3],
                    }],
                }])?;
                w.put_setting("locale", "fr")?;
                w.put_setting("url-prefix", "/money")?;
                w.put_setting(DEFAULT_ACCOUNT_ID, &account[0].to_string())?;
                ids = (account[0], category[0]);
                Ok(())
            })
            .unwrap();
        ids
    }

    #[test]
    fn document_is_dense_and_stripped() {
        let store = InMemoryStore::new();
        // Shift storage ids away from zero.
        seed(&store, UserId(2));
        seed(&store, UserId(1));

        let config = EngineConfig::default();
        let (doc, warnings) = Exporter::new(&store, &config)
            .build_document(UserId(1), false)
            .unwrap();
        assert!(warnings.is_empty());
        assert_eq!(doc.accesses.len(), 1);
        assert_eq!(doc.accesses[0].id, 0);
        assert_eq!(doc.accesses[0].password, None);
        assert_eq!(doc.accounts[0].id, 0);
        assert_eq!(doc.operations[0].account_id, 0);
        assert_eq!(doc.operations[0].category_id, Some(0));
        assert_eq!(doc.settings.get("locale").map(String::as_str), Some("fr"));
        assert!(!doc.settings.contains_key("url-prefix"));
        assert_eq!(doc.settings[DEFAULT_ACCOUNT_ID], "0");
    }

    #[test]
    fn secrets_only_when_sealed_or_configured() {
        let store = InMemoryStore::new();
        seed(&store, UserId(1));

        let config = EngineConfig::default().export_secrets_in_plaintext(true);
        let (doc, _) = Exporter::new(&store, &config)
            .build_document(UserId(1), true)
            .unwrap();
        assert_eq!(doc.accesses[0].password.as_deref(), Some("hunter2"));

        let config = EngineConfig::default();
        let out = Exporter::new(&store, &config).export(UserId(1), None).unwrap();
        assert!(!out.encrypted);
        let text = String::from_utf8(out.bytes).unwrap();
        assert!(!text.contains("hunter2"));
        assert!(!text.contains("receipt.pdf"));
    }

    #[test]
    fn deleted_category_is_exported_as_null() {
        let store = InMemoryStore::new();
        let (_, category) = seed(&store, UserId(1));
        store
            .with_transaction(UserId(1), &mut |w| {
                w.delete_rows(Collection::Categories, &[category])?;
                Ok(())
            })
            .unwrap();

        let config = EngineConfig::default();
        let out = Exporter::new(&store, &config).export(UserId(1), None).unwrap();
        assert_eq!(out.counts.operations, 1);
        assert_eq!(out.warnings.len(), 1);

        let parsed = parse_request(&out.bytes, usize::MAX).unwrap();
        let doc = tally_codec::decode(parsed.envelope.payload()).unwrap().document;
        assert_eq!(doc.operations[0].category_id, None);
    }

    #[test]
    fn sealed_export_hides_everything() {
        let store = InMemoryStore::new();
        seed(&store, UserId(1));
        let config = EngineConfig::default().kdf(crate::KdfParams::new(64, 1, 1));
        let out = Exporter::new(&store, &config)
            .export(UserId(1), Some("bakery receipts"))
            .unwrap();
        assert!(out.encrypted);
        let text = String::from_utf8(out.bytes).unwrap();
        assert!(text.starts_with("{\"encrypted\":true,"));
        assert!(!text.contains("Bakery"));
    }

    #[test]
    fn one_character_passphrase_is_refused() {
        let store = InMemoryStore::new();
        seed(&store, UserId(1));
        let config = EngineConfig::default().kdf(crate::KdfParams::new(64, 1, 1));
        let err = Exporter::new(&store, &config)
            .export(UserId(1), Some("x"))
            .unwrap_err();
        assert!(matches!(err, CoreError::WeakPassphrase { min_length: 8 }));
    }

    #[test]
    fn empty_user_exports_empty_document() {
        let store = InMemoryStore::new();
        let config = EngineConfig::default();
        let out = Exporter::new(&store, &config).export(UserId(9), None).unwrap();
        assert_eq!(out.counts, DocumentCounts::default());
    }
}
