//! Export command implementation.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tally_core::{EngineConfig, SnapshotEngine};
use tally_store::{FileStore, UserId};
use tracing::warn;

/// Runs the export command.
///
/// Writes to `out`, or to stdout if no path is given. Nothing is written
/// if the export fails.
pub fn run(
    store: &Path,
    user: u64,
    out: Option<&Path>,
    passphrase: Option<&str>,
    config: &EngineConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = FileStore::open(store)?;
    let engine = SnapshotEngine::new(Arc::new(store), config.clone())?;
    let output = engine.export(UserId(user), passphrase)?;

    for warning in &output.warnings {
        warn!(%warning, "integrity warning");
    }

    match out {
        Some(path) => {
            fs::write(path, &output.bytes)?;
            eprintln!(
                "Exported {} accounts and {} operations to {}{}",
                output.counts.accounts,
                output.counts.operations,
                path.display(),
                if output.encrypted { " (encrypted)" } else { "" }
            );
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&output.bytes)?;
            stdout.flush()?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::KdfParams;
    use tally_testkit::{seed, Scenario};
    use tempfile::TempDir;

    #[test]
    fn export_writes_envelope() {
        let dir = TempDir::new().unwrap();
        let store_path = dir.path().join("tally.json");
        {
            let store = FileStore::open(&store_path).unwrap();
            seed(&store, UserId(1), &Scenario::full());
        }

        let out = dir.path().join("snapshot.json");
        let config = EngineConfig::new().kdf(KdfParams::new(64, 1, 1));
        run(&store_path, 1, Some(&out), Some("secret passphrase"), &config).unwrap();

        let envelope: serde_json::Value =
            serde_json::from_slice(&fs::read(&out).unwrap()).unwrap();
        assert_eq!(envelope["encrypted"], true);
        assert!(envelope["data"].is_string());
    }

    #[test]
    fn failed_export_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("snapshot.json");
        let config = EngineConfig::new().kdf(KdfParams::new(64, 1, 1));
        let store_path = dir.path().join("tally.json");
        fs::write(&store_path, b"not a store").unwrap();

        assert!(run(&store_path, 1, Some(&out), None, &config).is_err());
        assert!(!out.exists());
    }

    #[test]
    fn short_passphrase_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let store_path = dir.path().join("tally.json");
        {
            let store = FileStore::open(&store_path).unwrap();
            seed(&store, UserId(1), &Scenario::new(1, 1, 1, 1));
        }

        let out = dir.path().join("snapshot.json");
        let config = EngineConfig::new().kdf(KdfParams::new(64, 1, 1));
        let err = run(&store_path, 1, Some(&out), Some("x"), &config).unwrap_err();
        assert!(err.to_string().contains("at least 8 characters"));
        assert!(!out.exists());
    }
}
