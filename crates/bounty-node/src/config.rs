use anyhow::{bail, Context, Result};
use bounty_core::MachineConfig;
use bounty_ledger::LedgerConfig;
use bounty_security::GateConfig;
use bounty_types::{BountyId, EscrowReference, WalletAddress, BPS_DENOMINATOR};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub node: NodeSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub engine: MachineConfig,
    #[serde(default)]
    pub security: GateConfig,
    #[serde(default)]
    pub ledger: LedgerSettings,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSettings {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Escrow authority key; defaults to `<data_dir>/escrow.key`
    #[serde(default)]
    pub authority_key_path: Option<PathBuf>,
    /// Environment variable holding the webhook HMAC secret
    #[serde(default = "default_webhook_secret_env")]
    pub webhook_secret_env: String,
}

fn default_name() -> String {
    "bountyd".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_webhook_secret_env() -> String {
    "BOUNTY_WEBHOOK_SECRET".to_string()
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            name: default_name(),
            data_dir: default_data_dir(),
            authority_key_path: None,
            webhook_secret_env: default_webhook_secret_env(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// `pretty`, `compact` or `json`
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default)]
    pub file_output: Option<PathBuf>,
    #[serde(default)]
    pub module_filters: HashMap<String, String>,
    #[serde(default = "default_true")]
    pub show_boot_banner: bool,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "pretty".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
            file_output: None,
            module_filters: HashMap::new(),
            show_boot_banner: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `memory` or `rocksdb`
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Audit log file, relative paths resolve under `data_dir`
    #[serde(default = "default_audit_log")]
    pub audit_log: PathBuf,
}

fn default_backend() -> String {
    "memory".to_string()
}

fn default_audit_log() -> PathBuf {
    PathBuf::from("audit.jsonl")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            audit_log: default_audit_log(),
        }
    }
}

/// Ledger section as written in TOML; addresses stay strings until
/// [`NodeConfig::validate`] checks them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSettings {
    /// `simulated` is the only chain backend built in
    #[serde(default = "default_chain")]
    pub chain: String,
    #[serde(default = "default_mint")]
    pub mint: String,
    #[serde(default)]
    pub treasury_wallet: String,
    #[serde(default = "default_treasury_bps")]
    pub treasury_bps: u64,
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
    #[serde(default = "default_confirmation_timeout_ms")]
    pub confirmation_timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_blockhash_validity_secs")]
    pub blockhash_validity_secs: u64,
}

fn default_chain() -> String {
    "simulated".to_string()
}

fn default_mint() -> String {
    // Wrapped SOL
    "So11111111111111111111111111111111111111112".to_string()
}

fn default_treasury_bps() -> u64 {
    500
}

fn default_rpc_timeout_ms() -> u64 {
    10_000
}

fn default_confirmation_timeout_ms() -> u64 {
    30_000
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_blockhash_validity_secs() -> u64 {
    120
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            chain: default_chain(),
            mint: default_mint(),
            treasury_wallet: String::new(),
            treasury_bps: default_treasury_bps(),
            rpc_timeout_ms: default_rpc_timeout_ms(),
            confirmation_timeout_ms: default_confirmation_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            blockhash_validity_secs: default_blockhash_validity_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_expiry_interval_secs")]
    pub expiry_interval_secs: u64,
    #[serde(default = "default_payout_interval_secs")]
    pub payout_interval_secs: u64,
}

fn default_expiry_interval_secs() -> u64 {
    300
}

fn default_payout_interval_secs() -> u64 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            expiry_interval_secs: default_expiry_interval_secs(),
            payout_interval_secs: default_payout_interval_secs(),
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let value = env::var(name).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl NodeConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("Failed to parse config {:?}", path))?;
        // Env overrides are applied by the caller so precedence stays in one place
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Some(paused) = env_flag("BOUNTY_PAUSE_PAYOUTS") {
            self.security.pause.payouts = paused;
        }
        if let Some(paused) = env_flag("BOUNTY_PAUSE_REVIEWS") {
            self.security.pause.reviews = paused;
        }
        if let Some(required) = env_flag("BOUNTY_REQUIRE_DOUBLE_APPROVAL") {
            self.engine.require_double_approval = required;
        }
        if let Some(required) = env_flag("BOUNTY_REQUIRE_STAKE") {
            self.engine.require_stake = required;
        }
        if let Ok(data_dir) = env::var("BOUNTY_DATA_DIR") {
            if !data_dir.is_empty() {
                self.node.data_dir = PathBuf::from(data_dir);
            }
        }
        if let Ok(level) = env::var("BOUNTY_LOG_LEVEL") {
            if !level.is_empty() {
                self.logging.level = level;
            }
        }
    }

    /// Reject settings the pipeline cannot run safely with.
    pub fn validate(&self) -> Result<()> {
        if self.ledger.treasury_bps > BPS_DENOMINATOR {
            bail!(
                "ledger.treasury_bps must be at most {}, got {}",
                BPS_DENOMINATOR,
                self.ledger.treasury_bps
            );
        }
        if self.engine.stake_bps > BPS_DENOMINATOR {
            bail!(
                "engine.stake_bps must be at most {}, got {}",
                BPS_DENOMINATOR,
                self.engine.stake_bps
            );
        }
        if self.engine.approval_threshold > bounty_core::MAX_SCORE {
            bail!(
                "engine.approval_threshold must be 0..={}, got {}",
                bounty_core::MAX_SCORE,
                self.engine.approval_threshold
            );
        }
        if self.security.rate_limit.window_secs == 0 {
            bail!("security.rate_limit.window_secs must be positive");
        }
        if self.scheduler.expiry_interval_secs == 0 || self.scheduler.payout_interval_secs == 0 {
            bail!("scheduler intervals must be positive");
        }
        if self.ledger.chain != "simulated" {
            bail!("unknown chain backend '{}'", self.ledger.chain);
        }
        EscrowReference::settlement(&self.engine.settlement_namespace, &BountyId::from(1))
            .context("engine.settlement_namespace")?;
        self.ledger_config()?;
        Ok(())
    }

    /// Typed ledger configuration with parsed addresses.
    pub fn ledger_config(&self) -> Result<LedgerConfig> {
        let mint = WalletAddress::parse(&self.ledger.mint).context("ledger.mint")?;
        let treasury =
            WalletAddress::parse(&self.ledger.treasury_wallet).context("ledger.treasury_wallet")?;
        let mut config = LedgerConfig::new(mint, treasury);
        config.treasury_bps = self.ledger.treasury_bps;
        config.rpc_timeout_ms = self.ledger.rpc_timeout_ms;
        config.confirmation_timeout_ms = self.ledger.confirmation_timeout_ms;
        config.poll_interval_ms = self.ledger.poll_interval_ms;
        config.blockhash_validity_secs = self.ledger.blockhash_validity_secs;
        Ok(config)
    }

    pub fn authority_key_path(&self) -> PathBuf {
        self.node
            .authority_key_path
            .clone()
            .unwrap_or_else(|| self.node.data_dir.join("escrow.key"))
    }

    pub fn audit_log_path(&self) -> PathBuf {
        if self.storage.audit_log.is_absolute() {
            self.storage.audit_log.clone()
        } else {
            self.node.data_dir.join(&self.storage.audit_log)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> NodeConfig {
        let mut config = NodeConfig::default();
        config.ledger.treasury_wallet = WalletAddress::from_bytes([2u8; 32]).to_string();
        config
    }

    #[test]
    fn test_env_overrides() {
        env::set_var("BOUNTY_PAUSE_PAYOUTS", "true");
        env::set_var("BOUNTY_REQUIRE_STAKE", "0");
        env::set_var("BOUNTY_DATA_DIR", "/test/bounty");
        env::set_var("BOUNTY_LOG_LEVEL", "debug");

        let mut config = NodeConfig::default();
        config.apply_env_overrides();

        assert!(config.security.pause.payouts);
        assert!(!config.security.pause.reviews);
        assert!(!config.engine.require_stake);
        assert_eq!(config.node.data_dir, PathBuf::from("/test/bounty"));
        assert_eq!(config.logging.level, "debug");

        env::remove_var("BOUNTY_PAUSE_PAYOUTS");
        env::remove_var("BOUNTY_REQUIRE_STAKE");
        env::remove_var("BOUNTY_DATA_DIR");
        env::remove_var("BOUNTY_LOG_LEVEL");
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        assert!(valid().validate().is_ok());

        // Treasury wallet must be set
        assert!(NodeConfig::default().validate().is_err());

        let mut config = valid();
        config.ledger.treasury_bps = 10_001;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.engine.approval_threshold = 11;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.security.rate_limit.window_secs = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.engine.settlement_namespace = "claim".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_paths_resolve_under_data_dir() {
        let mut config = valid();
        config.node.data_dir = PathBuf::from("/var/lib/bounty");
        assert_eq!(config.audit_log_path(), PathBuf::from("/var/lib/bounty/audit.jsonl"));
        assert_eq!(config.authority_key_path(), PathBuf::from("/var/lib/bounty/escrow.key"));
    }
}
