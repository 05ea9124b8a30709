//! Inspect command implementation.

use std::fs;
use std::path::Path;
use tally_core::{inspect, EngineConfig, ImportRequest, Inspection};

/// Runs the inspect command.
pub fn run(
    input: &Path,
    passphrase: Option<&str>,
    config: &EngineConfig,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let inspection = inspect_file(input, passphrase, config)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&inspection)?);
        }
        _ => {
            print_text_output(input, &inspection);
        }
    }

    Ok(())
}

fn inspect_file(
    input: &Path,
    passphrase: Option<&str>,
    config: &EngineConfig,
) -> Result<Inspection, Box<dyn std::error::Error>> {
    let mut request = ImportRequest::new(fs::read(input)?);
    if let Some(passphrase) = passphrase {
        request = request.with_passphrase(passphrase);
    }
    Ok(inspect(&request, config)?)
}

fn print_text_output(input: &Path, inspection: &Inspection) {
    println!("Snapshot: {}", input.display());
    println!("  Encrypted: {}", inspection.encrypted);
    if let Some(kdf) = &inspection.kdf {
        println!(
            "  KDF:       argon2id m={} KiB, t={}, p={}",
            kdf.memory_kib, kdf.iterations, kdf.lanes
        );
    }

    let Some(document) = &inspection.document else {
        println!();
        println!("Contents are sealed; pass --decrypt to read them.");
        return;
    };

    println!("  Format:    v{}", document.source_version);
    println!();
    println!("Collections:");
    let counts = &document.counts;
    println!("  Accesses:   {}", counts.accesses);
    println!("  Accounts:   {}", counts.accounts);
    println!("  Categories: {}", counts.categories);
    println!("  Operations: {}", counts.operations);
    println!("  Budgets:    {}", counts.budgets);
    println!("  Alerts:     {}", counts.alerts);
    println!("  Settings:   {}", counts.settings);

    if !document.shims.is_empty() {
        println!();
        println!("Legacy shims:");
        for shim in &document.shims {
            println!("  {shim}");
        }
    }
    if !document.dropped_settings.is_empty() {
        println!();
        println!("Dropped settings:");
        for dropped in &document.dropped_settings {
            println!("  {} ({:?})", dropped.key, dropped.reason);
        }
    }
    if !document.rejected.is_empty() {
        println!();
        println!("Unreadable records:");
        for rejected in &document.rejected {
            println!(
                "  {}[{}]: {}",
                rejected.collection, rejected.index, rejected.reason
            );
        }
    }
}
