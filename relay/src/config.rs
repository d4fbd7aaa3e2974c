//! Relay configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use ballot_types::AccountAddress;

use crate::RelayError;

/// Configuration for a relay instance.
///
/// Loaded from a TOML file via [`RelayConfig::from_toml_file`] or built
/// programmatically. The relay signing key itself is never part of the
/// config; only the path to the file holding it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayConfig {
    /// JSON-RPC endpoint of the ledger node.
    #[serde(default = "default_ledger_url")]
    pub ledger_url: String,

    /// File containing the relay account's hex-encoded Ed25519 seed.
    #[serde(default = "default_relay_key_file")]
    pub relay_key_file: PathBuf,

    /// Address of the deployed poll contract.
    #[serde(default)]
    pub contract: String,

    /// Gas limit attached to every sponsored transaction.
    #[serde(default = "default_gas_ceiling")]
    pub gas_ceiling: u64,

    /// How long to wait for inclusion before reporting a timeout.
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,

    /// Delay between receipt lookups while waiting for inclusion.
    #[serde(default = "default_receipt_poll_interval_ms")]
    pub receipt_poll_interval_ms: u64,

    /// How long a caller may queue for the submission lane.
    #[serde(default = "default_lane_timeout_secs")]
    pub lane_timeout_secs: u64,

    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,

    /// Reconciler passes after which an unresolved repair ticket raises an
    /// alarm on every pass.
    #[serde(default = "default_repair_max_attempts")]
    pub repair_max_attempts: u32,

    /// Directory for the LMDB mirror.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_lmdb_map_size_mb")]
    pub lmdb_map_size_mb: usize,

    /// "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub enable_metrics: bool,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_ledger_url() -> String {
    "http://127.0.0.1:8545".to_string()
}

fn default_relay_key_file() -> PathBuf {
    PathBuf::from("./relay.key")
}

fn default_gas_ceiling() -> u64 {
    500_000
}

fn default_confirmation_timeout_secs() -> u64 {
    60
}

fn default_receipt_poll_interval_ms() -> u64 {
    500
}

fn default_lane_timeout_secs() -> u64 {
    120
}

fn default_reconcile_interval_secs() -> u64 {
    30
}

fn default_repair_max_attempts() -> u32 {
    20
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./ballot_data")
}

fn default_lmdb_map_size_mb() -> usize {
    1024
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl RelayConfig {
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, RelayError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| RelayError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, RelayError> {
        toml::from_str(s).map_err(|e| RelayError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String, RelayError> {
        toml::to_string_pretty(self).map_err(|e| RelayError::Config(e.to_string()))
    }

    /// Reject values the relay cannot run with.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.ledger_url.trim().is_empty() {
            return Err(RelayError::Config("ledger_url must be set".into()));
        }
        self.contract_address()?;
        if self.gas_ceiling == 0 {
            return Err(RelayError::Config("gas_ceiling must be positive".into()));
        }
        if self.confirmation_timeout_secs == 0 {
            return Err(RelayError::Config(
                "confirmation_timeout_secs must be positive".into(),
            ));
        }
        if self.receipt_poll_interval_ms == 0
            || self.receipt_poll_interval_ms >= self.confirmation_timeout_secs * 1000
        {
            return Err(RelayError::Config(
                "receipt_poll_interval_ms must be positive and below the confirmation timeout"
                    .into(),
            ));
        }
        if self.lane_timeout_secs == 0 || self.reconcile_interval_secs == 0 {
            return Err(RelayError::Config(
                "lane_timeout_secs and reconcile_interval_secs must be positive".into(),
            ));
        }
        if self.lmdb_map_size_mb == 0 {
            return Err(RelayError::Config("lmdb_map_size_mb must be positive".into()));
        }
        self.log_format.parse::<crate::LogFormat>()?;
        Ok(())
    }

    pub fn contract_address(&self) -> Result<AccountAddress, RelayError> {
        if !ballot_crypto::validate_address(self.contract.trim()) {
            return Err(RelayError::Config(format!(
                "contract '{}' is not a valid address",
                self.contract
            )));
        }
        AccountAddress::parse(&self.contract).map_err(|e| RelayError::Config(e.to_string()))
    }

    /// The runtime knobs the relay components read.
    pub fn settings(&self) -> Result<RelaySettings, RelayError> {
        Ok(RelaySettings {
            contract: self.contract_address()?,
            gas_ceiling: self.gas_ceiling,
            confirmation_timeout: Duration::from_secs(self.confirmation_timeout_secs),
            receipt_poll_interval: Duration::from_millis(self.receipt_poll_interval_ms),
            lane_timeout: Duration::from_secs(self.lane_timeout_secs),
            repair_max_attempts: self.repair_max_attempts,
        })
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            ledger_url: default_ledger_url(),
            relay_key_file: default_relay_key_file(),
            contract: String::new(),
            gas_ceiling: default_gas_ceiling(),
            confirmation_timeout_secs: default_confirmation_timeout_secs(),
            receipt_poll_interval_ms: default_receipt_poll_interval_ms(),
            lane_timeout_secs: default_lane_timeout_secs(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
            repair_max_attempts: default_repair_max_attempts(),
            data_dir: default_data_dir(),
            lmdb_map_size_mb: default_lmdb_map_size_mb(),
            log_format: default_log_format(),
            log_level: default_log_level(),
            enable_metrics: false,
        }
    }
}

/// Resolved settings shared by the relay components.
#[derive(Clone, Debug)]
pub struct RelaySettings {
    pub contract: AccountAddress,
    pub gas_ceiling: u64,
    pub confirmation_timeout: Duration,
    pub receipt_poll_interval: Duration,
    pub lane_timeout: Duration,
    pub repair_max_attempts: u32,
}

impl RelaySettings {
    /// Defaults for the given contract.
    pub fn for_contract(contract: AccountAddress) -> Self {
        Self {
            contract,
            gas_ceiling: default_gas_ceiling(),
            confirmation_timeout: Duration::from_secs(default_confirmation_timeout_secs()),
            receipt_poll_interval: Duration::from_millis(default_receipt_poll_interval_ms()),
            lane_timeout: Duration::from_secs(default_lane_timeout_secs()),
            repair_max_attempts: default_repair_max_attempts(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballot_crypto::{derive_address, keypair_from_seed};

    fn contract() -> String {
        derive_address(&keypair_from_seed(&[1; 32]).public).to_string()
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = RelayConfig::from_toml_str("").unwrap();
        assert_eq!(config.gas_ceiling, 500_000);
        assert_eq!(config.confirmation_timeout_secs, 60);
        assert_eq!(config.reconcile_interval_secs, 30);
        assert_eq!(config.log_format, "human");
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = RelayConfig {
            contract: contract(),
            ..RelayConfig::default()
        };
        let parsed = RelayConfig::from_toml_str(&config.to_toml_string().unwrap()).unwrap();
        assert_eq!(parsed.contract, config.contract);
        assert_eq!(parsed.gas_ceiling, config.gas_ceiling);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn missing_contract_fails_validation() {
        assert!(matches!(
            RelayConfig::default().validate(),
            Err(RelayError::Config(_))
        ));
    }

    #[test]
    fn poll_interval_must_be_below_timeout() {
        let config = RelayConfig {
            contract: contract(),
            confirmation_timeout_secs: 1,
            receipt_poll_interval_ms: 1_000,
            ..RelayConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn settings_carry_durations() {
        let config = RelayConfig {
            contract: contract(),
            confirmation_timeout_secs: 5,
            ..RelayConfig::default()
        };
        let settings = config.settings().unwrap();
        assert_eq!(settings.confirmation_timeout, Duration::from_secs(5));
        assert_eq!(settings.gas_ceiling, 500_000);
    }

    #[test]
    fn missing_file_returns_config_error() {
        assert!(matches!(
            RelayConfig::from_toml_file("/nonexistent/ballot.toml"),
            Err(RelayError::Config(_))
        ));
    }
}
