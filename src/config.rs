use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{LedgerError, LedgerResult};

/// Policy knobs for the ledger engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Create a missing recipient account (balance 0, sequence 1) when a
    /// funded sender pays it. Turning this off requires recipients to exist
    /// before they can be paid.
    #[serde(default = "default_create_missing_recipients")]
    pub create_missing_recipients: bool,
    /// Dirty map nodes written per batch while persisting an accepted ledger.
    #[serde(default = "default_flush_batch")]
    pub flush_batch: usize,
}

fn default_create_missing_recipients() -> bool {
    true
}

fn default_flush_batch() -> usize {
    64
}

impl EngineConfig {
    pub fn load(path: &Path) -> LedgerResult<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|err| LedgerError::Config(format!("unable to parse config: {err}")))
    }

    pub fn save(&self, path: &Path) -> LedgerResult<()> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;
        let encoded = toml::to_string_pretty(self)
            .map_err(|err| LedgerError::Config(format!("unable to encode config: {err}")))?;
        fs::write(path, encoded)?;
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            create_missing_recipients: default_create_missing_recipients(),
            flush_batch: default_flush_batch(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert!(config.create_missing_recipients);
        assert_eq!(config.flush_batch, 64);
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        let config = EngineConfig {
            create_missing_recipients: false,
            flush_batch: 16,
        };
        config.save(&path).unwrap();
        let loaded = EngineConfig::load(&path).unwrap();
        assert!(!loaded.create_missing_recipients);
        assert_eq!(loaded.flush_batch, 16);
    }
}
