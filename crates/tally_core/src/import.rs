//! Import orchestration.
//!
//! An import walks a fixed sequence of states:
//!
//! ```text
//! Received -> Decoded -> Validated -> Remapped -> Persisted -> Committed
//!     \__________\___________\___________\___________\______-> Failed
//! ```
//!
//! Everything up to `Remapped` happens in memory. All writes happen in one
//! store transaction, so a failure at any point leaves the store exactly
//! as it was and nothing becomes visible before `Committed`.

use crate::config::EngineConfig;
use crate::crypto;
use crate::error::{CoreError, CoreResult, IntegrityIssue, IntegrityWarning};
use crate::redact::Redactor;
use crate::remap::Remapper;
use serde::Serialize;
use tally_codec::{
    parse_request, retain_exportable, AccessRecord, AccountRecord, DocumentCounts, DroppedSetting,
    Envelope, LegacyShim, RejectedRecord, SnapshotDecoder, SnapshotDocument,
    CURRENT_FORMAT_VERSION, DEFAULT_ACCOUNT_ID,
};
use tally_store::{
    Access, Account, Alert, Budget, Category, Collection, EntityStore, RowId, StoreError,
    StoreResult, StoreWriter, Transaction, UserId,
};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Where an import is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportState {
    /// Raw request bytes accepted.
    Received,
    /// Envelope opened and document decoded.
    Decoded,
    /// Field values checked.
    Validated,
    /// Fresh dense ids assigned and foreign keys rewritten.
    Remapped,
    /// Every collection written inside the open transaction.
    Persisted,
    /// Transaction committed; the data is visible.
    Committed,
    /// Aborted with no effect on the store.
    Failed,
}

impl ImportState {
    /// Returns whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, ImportState::Committed | ImportState::Failed)
    }
}

#[derive(Debug)]
struct Progress {
    user: UserId,
    state: ImportState,
    trail: Vec<ImportState>,
}

impl Progress {
    fn new(user: UserId, state: ImportState) -> Self {
        debug!(%user, ?state, "import started");
        Self {
            user,
            state,
            trail: vec![state],
        }
    }

    fn advance(&mut self, next: ImportState) {
        debug!(user = %self.user, from = ?self.state, to = ?next, "import transition");
        self.state = next;
        self.trail.push(next);
    }

    fn fail(&mut self, err: CoreError) -> CoreError {
        warn!(user = %self.user, from = ?self.state, error = %err, "import failed");
        self.state = ImportState::Failed;
        self.trail.push(ImportState::Failed);
        err
    }
}

/// Raw import input.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    payload: Vec<u8>,
    passphrase: Option<Zeroizing<String>>,
}

impl ImportRequest {
    /// Wraps the bytes of a transport envelope (or a bare document).
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            passphrase: None,
        }
    }

    /// Supplies the passphrase, taking precedence over one embedded in
    /// the envelope.
    #[must_use]
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(Zeroizing::new(passphrase.into()));
        self
    }

    /// The raw payload.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Returns whether a passphrase was supplied with the request.
    #[must_use]
    pub fn has_passphrase(&self) -> bool {
        self.passphrase.is_some()
    }
}

/// A decoded, not yet validated, import.
#[derive(Debug, Clone)]
pub struct DecodedImport {
    /// The decoded document.
    pub document: SnapshotDocument,
    /// Format version the document was written with.
    pub source_version: u32,
    /// Whether the payload was sealed.
    pub encrypted: bool,
    /// Legacy shims applied to the envelope and the document.
    pub shims: Vec<LegacyShim>,
    /// Settings the decoder dropped.
    pub dropped_settings: Vec<DroppedSetting>,
    /// Records the decoder could not read.
    pub rejected: Vec<RejectedRecord>,
}

/// Opens and decodes an import request without touching any store.
///
/// # Errors
///
/// - `MalformedDocument` for unparseable input or an oversized payload
/// - `UnsupportedVersion` for documents from a newer release
/// - `PassphraseRequired` if the payload is sealed and no passphrase was
///   given, `InvalidPassword` if it does not open
pub fn decode_request(request: &ImportRequest, config: &EngineConfig) -> CoreResult<DecodedImport> {
    let parsed = parse_request(request.payload(), config.max_document_size)?;
    let encrypted = parsed.envelope.is_encrypted();

    let plaintext = match parsed.envelope {
        Envelope::Plain(bytes) => Zeroizing::new(bytes),
        Envelope::Sealed(sealed) => {
            let passphrase = request
                .passphrase
                .as_ref()
                .or(parsed.passphrase.as_ref())
                .ok_or(CoreError::PassphraseRequired)?;
            Zeroizing::new(crypto::open(&sealed, passphrase)?)
        }
    };

    let report = SnapshotDecoder::new()
        .max_size(config.max_document_size)
        .decode(&plaintext)?;

    let mut shims = parsed.shims;
    shims.extend(report.shims);
    Ok(DecodedImport {
        document: report.document,
        source_version: report.source_version,
        encrypted,
        shims,
        dropped_settings: report.dropped_settings,
        rejected: report.rejected,
    })
}

/// The outcome of a committed import.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    /// Final state; always `Committed` for a returned report.
    pub state: ImportState,
    /// Format version the document was written with.
    pub source_version: u32,
    /// Whether the payload was sealed.
    pub encrypted: bool,
    /// Rows written per collection.
    pub inserted: DocumentCounts,
    /// Records dropped or repaired on the way in.
    pub warnings: Vec<IntegrityWarning>,
    /// Legacy shims that were applied.
    pub shims: Vec<LegacyShim>,
    /// Settings that were not imported.
    pub dropped_settings: Vec<DroppedSetting>,
}

fn retain_valid<T>(
    collection: Collection,
    records: &mut Vec<T>,
    field: &'static str,
    is_valid: impl Fn(&T) -> bool,
    warnings: &mut Vec<IntegrityWarning>,
) {
    let mut index = 0;
    records.retain(|record| {
        let keep = is_valid(record);
        if !keep {
            let warning = IntegrityWarning {
                collection,
                index,
                issue: IntegrityIssue::InvalidValue { field },
            };
            warn!(%warning, "referential integrity");
            warnings.push(warning);
        }
        index += 1;
        keep
    });
}

/// Drops records whose values the store must never hold.
fn validate(document: &mut SnapshotDocument, warnings: &mut Vec<IntegrityWarning>) {
    document.format_version = CURRENT_FORMAT_VERSION;
    retain_valid(
        Collection::Accounts,
        &mut document.accounts,
        "initialBalance",
        |a| a.initial_balance.is_finite(),
        warnings,
    );
    retain_valid(
        Collection::Transactions,
        &mut document.operations,
        "amount",
        |op| op.amount.is_finite(),
        warnings,
    );
    retain_valid(
        Collection::Budgets,
        &mut document.budgets,
        "month",
        |b| b.month < 12,
        warnings,
    );
    retain_valid(
        Collection::Budgets,
        &mut document.budgets,
        "threshold",
        |b| b.threshold.map_or(true, f64::is_finite),
        warnings,
    );
    retain_valid(
        Collection::Alerts,
        &mut document.alerts,
        "limit",
        |a| a.limit.map_or(true, f64::is_finite),
        warnings,
    );
}

fn resolve(ids: &[RowId], collection: Collection, doc_id: u64) -> StoreResult<RowId> {
    usize::try_from(doc_id)
        .ok()
        .and_then(|i| ids.get(i).copied())
        .ok_or_else(|| {
            StoreError::write_failed(format!("{collection} id {doc_id} was not remapped"))
        })
}

fn access_value(record: &AccessRecord) -> Access {
    Access {
        vendor_id: record.vendor_id.clone(),
        login: record.login.clone(),
        password: record.password.clone(),
        custom_fields: record.custom_fields.clone(),
        custom_label: record.custom_label.clone(),
    }
}

fn account_value(record: &AccountRecord, access_ids: &[RowId]) -> StoreResult<Account> {
    Ok(Account {
        access_id: resolve(access_ids, Collection::Accesses, record.access_id)?,
        vendor_account_id: record.vendor_account_id.clone(),
        label: record.label.clone(),
        custom_label: record.custom_label.clone(),
        iban: record.iban.clone(),
        currency: record.currency.clone(),
        account_type: record.account_type.clone(),
        initial_balance: record.initial_balance,
        import_date: record.import_date,
        exclude_from_balance: record.exclude_from_balance,
    })
}

/// Compiles the redactor for import logs.
///
/// Returns `None` when the patterns do not compile; the import then goes on
/// without logging logins at all.
fn login_redactor(document: &SnapshotDocument, size_limit: usize) -> Option<Redactor> {
    let secrets: Vec<&str> = document
        .accesses
        .iter()
        .filter_map(|a| a.password.as_deref())
        .collect();
    let logins: Vec<&str> = document.accesses.iter().map(|a| a.login.as_str()).collect();
    match Redactor::with_size_limit(&secrets, &logins, size_limit) {
        Ok(redactor) => Some(redactor),
        Err(e) => {
            warn!(error = %e, "login redaction unavailable, logins will not be logged");
            None
        }
    }
}

/// Writes a remapped document in dependency order.
fn write_document(
    w: &mut dyn StoreWriter,
    document: &SnapshotDocument,
    redactor: Option<&Redactor>,
) -> StoreResult<DocumentCounts> {
    for access in &document.accesses {
        match redactor {
            Some(redactor) => debug!(
                vendor = %access.vendor_id,
                login = %redactor.mask_suffix(&access.login),
                "importing access"
            ),
            None => debug!(vendor = %access.vendor_id, "importing access"),
        }
    }
    let access_ids = w.insert_accesses(document.accesses.iter().map(access_value).collect())?;

    let accounts = document
        .accounts
        .iter()
        .map(|a| account_value(a, &access_ids))
        .collect::<StoreResult<Vec<_>>>()?;
    let account_ids = w.insert_accounts(accounts)?;

    let category_ids = w.insert_categories(
        document
            .categories
            .iter()
            .map(|c| Category {
                label: c.label.clone(),
                color: c.color.clone(),
            })
            .collect(),
    )?;

    let transactions = document
        .operations
        .iter()
        .map(|op| {
            Ok(Transaction {
                account_id: resolve(&account_ids, Collection::Accounts, op.account_id)?,
                category_id: op
                    .category_id
                    .map(|c| resolve(&category_ids, Collection::Categories, c))
                    .transpose()?,
                label: op.label.clone(),
                raw_label: op.raw_label.clone(),
                custom_label: op.custom_label.clone(),
                amount: op.amount,
                date: op.date,
                debit_date: op.debit_date,
                budget_date: op.budget_date,
                transaction_type: op.transaction_type.clone(),
                created_by_user: op.created_by_user,
                attachments: Vec::new(),
            })
        })
        .collect::<StoreResult<Vec<_>>>()?;
    let transaction_ids = w.insert_transactions(transactions)?;

    let budgets = document
        .budgets
        .iter()
        .map(|b| {
            Ok(Budget {
                category_id: resolve(&category_ids, Collection::Categories, b.category_id)?,
                year: b.year,
                month: b.month,
                threshold: b.threshold,
            })
        })
        .collect::<StoreResult<Vec<_>>>()?;
    let budget_ids = w.insert_budgets(budgets)?;

    for (key, value) in &document.settings {
        if key == DEFAULT_ACCOUNT_ID && !value.is_empty() {
            let doc_id = value
                .parse::<u64>()
                .map_err(|_| StoreError::write_failed("default account was not remapped"))?;
            let storage_id = resolve(&account_ids, Collection::Accounts, doc_id)?;
            w.put_setting(key, &storage_id.to_string())?;
        } else {
            w.put_setting(key, value)?;
        }
    }

    let alerts = document
        .alerts
        .iter()
        .map(|a| {
            Ok(Alert {
                account_id: resolve(&account_ids, Collection::Accounts, a.account_id)?,
                kind: a.kind,
                frequency: a.frequency,
                limit: a.limit,
                order: a.order,
            })
        })
        .collect::<StoreResult<Vec<_>>>()?;
    let alert_ids = w.insert_alerts(alerts)?;

    Ok(DocumentCounts {
        accesses: access_ids.len(),
        accounts: account_ids.len(),
        categories: category_ids.len(),
        operations: transaction_ids.len(),
        budgets: budget_ids.len(),
        settings: document.settings.len(),
        alerts: alert_ids.len(),
    })
}

/// Merges snapshot documents into a store.
///
/// The merger does not serialize concurrent imports for the same user;
/// [`SnapshotEngine`](crate::SnapshotEngine) does that with
/// [`UserLocks`](crate::UserLocks).
#[derive(Debug)]
pub struct ImportMerger<'a, S: EntityStore + ?Sized> {
    store: &'a S,
    config: &'a EngineConfig,
}

impl<'a, S: EntityStore + ?Sized> ImportMerger<'a, S> {
    /// Creates a merger over `store`.
    pub fn new(store: &'a S, config: &'a EngineConfig) -> Self {
        Self { store, config }
    }

    /// Imports a wire request for `user`.
    ///
    /// Importing the same payload twice adds two disjoint copies: records
    /// are never matched against existing content.
    ///
    /// # Errors
    ///
    /// Any error leaves the store untouched. See [`decode_request`] for
    /// input errors; write failures are `Storage` errors.
    pub fn import(&self, user: UserId, request: &ImportRequest) -> CoreResult<ImportReport> {
        let mut progress = Progress::new(user, ImportState::Received);
        let decoded = decode_request(request, self.config).map_err(|e| progress.fail(e))?;
        progress.advance(ImportState::Decoded);
        self.merge(user, decoded, &mut progress)
    }

    /// Merges an already decoded document, entering at `Decoded`.
    ///
    /// This is the entry point for alternate input formats converted to a
    /// [`SnapshotDocument`] outside the engine.
    ///
    /// # Errors
    ///
    /// Write failures are `Storage` errors and leave the store untouched.
    pub fn merge_document(
        &self,
        user: UserId,
        document: SnapshotDocument,
    ) -> CoreResult<ImportReport> {
        let mut progress = Progress::new(user, ImportState::Decoded);
        let decoded = DecodedImport {
            source_version: document.format_version,
            document,
            encrypted: false,
            shims: Vec::new(),
            dropped_settings: Vec::new(),
            rejected: Vec::new(),
        };
        self.merge(user, decoded, &mut progress)
    }

    fn merge(
        &self,
        user: UserId,
        decoded: DecodedImport,
        progress: &mut Progress,
    ) -> CoreResult<ImportReport> {
        let DecodedImport {
            mut document,
            source_version,
            encrypted,
            shims,
            mut dropped_settings,
            rejected,
        } = decoded;

        let mut warnings: Vec<IntegrityWarning> =
            rejected.into_iter().map(IntegrityWarning::from).collect();
        dropped_settings.extend(retain_exportable(&mut document.settings));
        validate(&mut document, &mut warnings);
        progress.advance(ImportState::Validated);

        let (document, remap_warnings) = Remapper::new().remap_document(document);
        warnings.extend(remap_warnings);
        progress.advance(ImportState::Remapped);

        let redactor = login_redactor(&document, self.config.redaction_size_limit);

        let mut inserted = DocumentCounts::default();
        let result = self.store.with_transaction(user, &mut |w| {
            inserted = write_document(w, &document, redactor.as_ref())?;
            progress.advance(ImportState::Persisted);
            Ok(())
        });
        if let Err(e) = result {
            return Err(progress.fail(e.into()));
        }
        progress.advance(ImportState::Committed);

        info!(
            %user,
            encrypted,
            source_version,
            accesses = inserted.accesses,
            accounts = inserted.accounts,
            categories = inserted.categories,
            operations = inserted.operations,
            budgets = inserted.budgets,
            settings = inserted.settings,
            alerts = inserted.alerts,
            warnings = warnings.len(),
            "import committed"
        );
        Ok(ImportReport {
            state: progress.state,
            source_version,
            encrypted,
            inserted,
            warnings,
            shims,
            dropped_settings,
        })
    }
}
