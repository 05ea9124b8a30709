//! Import command implementation.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use tally_core::{EngineConfig, ImportReport, ImportRequest, SnapshotEngine};
use tally_store::{FileStore, UserId};

/// Runs the import command.
///
/// The store is left untouched if the import fails.
pub fn run(
    store: &Path,
    user: u64,
    input: &Path,
    passphrase: Option<&str>,
    config: &EngineConfig,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let payload = fs::read(input)?;
    let mut request = ImportRequest::new(payload);
    if let Some(passphrase) = passphrase {
        request = request.with_passphrase(passphrase);
    }

    let store = FileStore::open(store)?;
    let engine = SnapshotEngine::new(Arc::new(store), config.clone())?;
    let report = engine.import(UserId(user), &request)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            print_text_output(&report);
        }
    }

    Ok(())
}

fn print_text_output(report: &ImportReport) {
    println!("Import {:?}", report.state);
    println!(
        "  Source:     format v{}{}",
        report.source_version,
        if report.encrypted { ", encrypted" } else { "" }
    );
    println!("  Accesses:   {}", report.inserted.accesses);
    println!("  Accounts:   {}", report.inserted.accounts);
    println!("  Categories: {}", report.inserted.categories);
    println!("  Operations: {}", report.inserted.operations);
    println!("  Budgets:    {}", report.inserted.budgets);
    println!("  Alerts:     {}", report.inserted.alerts);
    println!("  Settings:   {}", report.inserted.settings);

    if !report.shims.is_empty() {
        println!();
        println!("Legacy shims:");
        for shim in &report.shims {
            println!("  {shim}");
        }
    }
    if !report.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for warning in &report.warnings {
            println!("  {warning}");
        }
    }
    for dropped in &report.dropped_settings {
        println!("  setting {} dropped ({:?})", dropped.key, dropped.reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::KdfParams;
    use tally_store::EntityStore;
    use tally_testkit::{assert_closed, seed, Scenario};
    use tempfile::TempDir;

    fn config() -> EngineConfig {
        EngineConfig::new().kdf(KdfParams::new(64, 1, 1))
    }

    #[test]
    fn exported_file_imports_into_other_store() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.json");
        let target = dir.path().join("target.json");
        let snapshot = dir.path().join("snapshot.json");
        {
            let store = FileStore::open(&source).unwrap();
            seed(&store, UserId(1), &Scenario::full());
        }

        crate::commands::export::run(&source, 1, Some(&snapshot), Some("import passphrase"), &config())
            .unwrap();
        run(&target, 2, &snapshot, Some("import passphrase"), &config(), "json").unwrap();

        let store = FileStore::open(&target).unwrap();
        let data = store.read_user(UserId(2)).unwrap();
        assert_eq!(data.transactions.len(), 20);
        assert_closed(&data);
    }

    #[test]
    fn missing_passphrase_leaves_store_empty() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.json");
        let target = dir.path().join("target.json");
        let snapshot = dir.path().join("snapshot.json");
        {
            let store = FileStore::open(&source).unwrap();
            seed(&store, UserId(1), &Scenario::new(1, 1, 1, 3));
        }
        crate::commands::export::run(&source, 1, Some(&snapshot), Some("import passphrase"), &config())
            .unwrap();

        assert!(run(&target, 2, &snapshot, None, &config(), "text").is_err());
        let store = FileStore::open(&target).unwrap();
        assert!(store.list_accounts(UserId(2)).unwrap().is_empty());
    }
}
