//! Ballot relay daemon: runs the gasless vote relay against a ledger node.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use ballot_crypto::{derive_address, generate_keypair, keypair_from_private};
use ballot_ledger::{HttpLedgerClient, LedgerClient};
use ballot_relay::{
    init_logging, EventBus, LogFormat, MirrorEvent, RelayAccount, RelayConfig, RelayMetrics,
    ShutdownController, VoteRelay,
};
use ballot_store_lmdb::{check_data_dir, check_integrity, LmdbEnvironment};
use ballot_types::{AccountAddress, PrivateKey, SystemClock};
use clap::Parser;

#[derive(Parser)]
#[command(name = "ballot-relayd", about = "Gasless vote relay daemon")]
struct Cli {
    /// Ledger JSON-RPC endpoint.
    #[arg(long, env = "BALLOT_LEDGER_URL")]
    ledger_url: Option<String>,

    /// Address of the deployed poll contract.
    #[arg(long, env = "BALLOT_CONTRACT")]
    contract: Option<String>,

    /// File holding the relay account's hex-encoded private key.
    #[arg(long, env = "BALLOT_RELAY_KEY_FILE")]
    relay_key_file: Option<PathBuf>,

    /// Data directory for the LMDB mirror.
    #[arg(long, env = "BALLOT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Gas ceiling for every sponsored transaction.
    #[arg(long, env = "BALLOT_GAS_CEILING")]
    gas_ceiling: Option<u64>,

    /// Seconds to wait for inclusion before answering "pending".
    #[arg(long, env = "BALLOT_CONFIRMATION_TIMEOUT")]
    confirmation_timeout_secs: Option<u64>,

    /// Seconds between reconciler passes.
    #[arg(long, env = "BALLOT_RECONCILE_INTERVAL")]
    reconcile_interval_secs: Option<u64>,

    /// Write Prometheus metrics to `<data_dir>/metrics.prom` after each pass.
    #[arg(long, env = "BALLOT_ENABLE_METRICS")]
    metrics: bool,

    /// Log output: "human" or "json".
    #[arg(long, env = "BALLOT_LOG_FORMAT")]
    log_format: Option<String>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "BALLOT_LOG_LEVEL")]
    log_level: Option<String>,

    /// Path to a TOML configuration file. File settings are the base;
    /// CLI flags and env vars override them.
    #[arg(long, env = "BALLOT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Run the relay and its reconciler until SIGINT/SIGTERM.
    Run,
    /// Run a single reconciler pass and print the report.
    Reconcile,
    /// Generate a relay key file and print its address.
    Keygen {
        /// Overwrite an existing key file.
        #[arg(long)]
        force: bool,
    },
    /// Print a voter's current nonce as the ledger reports it.
    Nonce { address: String },
    /// Check the mirror database and print an integrity report.
    CheckStore,
}

impl Cli {
    /// Layer CLI flags and env vars over the config file (or defaults).
    fn resolve_config(&self) -> anyhow::Result<RelayConfig> {
        let mut config = match &self.config {
            Some(path) => RelayConfig::from_toml_file(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => RelayConfig::default(),
        };
        if let Some(url) = &self.ledger_url {
            config.ledger_url = url.clone();
        }
        if let Some(contract) = &self.contract {
            config.contract = contract.clone();
        }
        if let Some(path) = &self.relay_key_file {
            config.relay_key_file = path.clone();
        }
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(gas) = self.gas_ceiling {
            config.gas_ceiling = gas;
        }
        if let Some(secs) = self.confirmation_timeout_secs {
            config.confirmation_timeout_secs = secs;
        }
        if let Some(secs) = self.reconcile_interval_secs {
            config.reconcile_interval_secs = secs;
        }
        if let Some(format) = &self.log_format {
            config.log_format = format.clone();
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        config.enable_metrics |= self.metrics;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;
    let format: LogFormat = config.log_format.parse()?;
    init_logging(format, &config.log_level)?;

    match cli.command {
        Command::Run => run(config).await,
        Command::Reconcile => reconcile(config).await,
        Command::Keygen { force } => keygen(&config.relay_key_file, force),
        Command::Nonce { address } => nonce(config, &address).await,
        Command::CheckStore => check_store(&config),
    }
}

type Relay = VoteRelay<HttpLedgerClient, LmdbEnvironment>;

fn open_store(config: &RelayConfig) -> anyhow::Result<LmdbEnvironment> {
    check_data_dir(&config.data_dir).map_err(anyhow::Error::msg)?;
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating {}", config.data_dir.display()))?;
    let env = LmdbEnvironment::open(&config.data_dir, config.lmdb_map_size_mb * 1024 * 1024)?;
    let report = check_integrity(&env)?;
    if !report.is_healthy() {
        bail!(
            "mirror integrity check failed ({} errors); run `ballot-relayd check-store`",
            report.errors.len()
        );
    }
    tracing::info!(
        polls = report.polls_checked,
        entries = report.total_entries,
        "mirror opened"
    );
    Ok(env)
}

fn ledger_client(config: &RelayConfig) -> anyhow::Result<HttpLedgerClient> {
    let request_timeout = Duration::from_secs(config.confirmation_timeout_secs.clamp(1, 30));
    Ok(HttpLedgerClient::new(
        config.ledger_url.clone(),
        config.contract_address()?,
        request_timeout,
    )?)
}

fn load_key(path: &Path) -> anyhow::Result<PrivateKey> {
    let hex = std::fs::read_to_string(path)
        .with_context(|| format!("reading relay key from {}", path.display()))?;
    Ok(PrivateKey::from_hex(hex.trim())?)
}

fn build_relay(config: &RelayConfig) -> anyhow::Result<(Arc<Relay>, Arc<RelayMetrics>)> {
    config.validate()?;
    let settings = config.settings()?;
    let store = open_store(config)?;
    let ledger = ledger_client(config)?;
    let key = load_key(&config.relay_key_file)?;
    let metrics = Arc::new(RelayMetrics::new()?);

    let mut events = EventBus::new();
    events.subscribe(Box::new(|event| match event {
        MirrorEvent::ConsistencyAlarm { poll, detail } => {
            tracing::error!(poll = %poll, %detail, "consistency alarm");
        }
        other => tracing::debug!(event = ?other, "mirror event"),
    }));

    let relay = VoteRelay::new(
        Arc::new(ledger),
        Arc::new(store),
        Arc::new(SystemClock),
        RelayAccount::from_key(key),
        settings,
        events,
        Arc::clone(&metrics),
    );
    Ok((Arc::new(relay), metrics))
}

async fn run(config: RelayConfig) -> anyhow::Result<()> {
    let (relay, metrics) = build_relay(&config)?;
    tracing::info!(
        ledger = %config.ledger_url,
        relay = %relay.relay_address(),
        contract = %relay.contract(),
        "starting ballot relay"
    );

    let mut shutdown = ShutdownController::new();
    let interval = Duration::from_secs(config.reconcile_interval_secs);

    shutdown.spawn("reconciler", {
        let relay = Arc::clone(&relay);
        move |rx| async move { relay.reconciler().run(interval, rx).await }
    });

    if config.enable_metrics {
        let path = config.data_dir.join("metrics.prom");
        shutdown.spawn("metrics-writer", move |mut rx| async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = rx.recv() => break,
                    _ = ticker.tick() => {
                        match metrics.encode() {
                            Ok(text) => {
                                if let Err(e) = std::fs::write(&path, text) {
                                    tracing::warn!(error = %e, path = %path.display(), "failed to write metrics");
                                }
                            }
                            Err(e) => tracing::warn!(error = %e, "failed to encode metrics"),
                        }
                    }
                }
            }
        });
    }

    shutdown.wait_for_signal().await;
    let failed = shutdown.drain().await;
    if !failed.is_empty() {
        bail!("background tasks failed during shutdown: {failed:?}");
    }
    tracing::info!("ballot relay exited cleanly");
    Ok(())
}

async fn reconcile(config: RelayConfig) -> anyhow::Result<()> {
    let (relay, _) = build_relay(&config)?;
    let report = relay.reconciler().run_once().await?;
    println!("{report:#?}");
    if !report.is_clean() {
        bail!("mirror is not consistent with the ledger");
    }
    Ok(())
}

fn keygen(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists; pass --force to replace it", path.display());
    }
    let kp = generate_keypair();
    let address = derive_address(&kp.public);
    write_key_file(path, &kp.private.to_hex())?;
    // Reload to make sure the file round-trips.
    let reloaded = keypair_from_private(load_key(path)?);
    if derive_address(&reloaded.public) != address {
        bail!("key file {} did not round-trip", path.display());
    }
    println!("{address}");
    Ok(())
}

#[cfg(unix)]
fn write_key_file(path: &Path, contents: &str) -> anyhow::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .with_context(|| format!("creating {}", path.display()))?;
    file.write_all(contents.as_bytes())?;
    Ok(())
}

#[cfg(not(unix))]
fn write_key_file(path: &Path, contents: &str) -> anyhow::Result<()> {
    std::fs::write(path, contents).with_context(|| format!("creating {}", path.display()))
}

async fn nonce(config: RelayConfig, address: &str) -> anyhow::Result<()> {
    let voter = AccountAddress::parse(address)?;
    let ledger = ledger_client(&config)?;
    let nonce = ledger.read_voter_nonce(&voter).await?;
    println!("{nonce}");
    Ok(())
}

fn check_store(config: &RelayConfig) -> anyhow::Result<()> {
    check_data_dir(&config.data_dir).map_err(anyhow::Error::msg)?;
    let env = LmdbEnvironment::open(&config.data_dir, config.lmdb_map_size_mb * 1024 * 1024)?;
    let report = check_integrity(&env)?;
    println!(
        "databases: {}  entries: {}  polls: {}",
        report.databases_checked, report.total_entries, report.polls_checked
    );
    for err in &report.errors {
        println!("error: {err}");
    }
    if !report.is_healthy() {
        bail!("{} integrity errors", report.errors.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        std::fs::write(&path, "gas_ceiling = 1000\nlog_level = \"debug\"\n").unwrap();
        let cli = Cli::parse_from([
            "ballot-relayd",
            "--config",
            path.to_str().unwrap(),
            "--gas-ceiling",
            "2000",
            "run",
        ]);
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.gas_ceiling, 2000);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn keygen_writes_loadable_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.key");
        keygen(&path, false).unwrap();
        assert!(load_key(&path).is_ok());
        assert!(keygen(&path, false).is_err());
        keygen(&path, true).unwrap();
    }

    #[test]
    fn check_store_on_fresh_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = RelayConfig {
            data_dir: dir.path().join("mirror"),
            ..RelayConfig::default()
        };
        let env = open_store(&config).unwrap();
        drop(env);
        check_store(&config).unwrap();
    }
}
