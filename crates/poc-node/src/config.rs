//! Node configuration types
//!
//! Loaded from an optional TOML file, then scalar settings are overridden
//! from `POC__`-prefixed environment variables
//! (`POC__SERVER__ADDRESS=0.0.0.0:8080`). Course and network tables only
//! come from the file.

use poc_core::{serde_amount, Address, Balance, ChainId, Wei};
use poc_economics::constants::{DEFAULT_COURSE_STAKE, DEFAULT_TOTAL_MODULES, MODULE_REWARD};
use poc_services::courses::{CourseModule, NewCourse};
use poc_services::{ContractAddresses, NetworkLabel, NetworkRpc, ProgressSettings, ServiceOptions, StaticNetworks};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "POC";

/// Complete node configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// HTTP API settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Ledger accounts and reward settings
    #[serde(default)]
    pub economics: EconomicsConfig,

    /// Storage settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// RPC and contract address registry
    #[serde(default)]
    pub networks: NetworksConfig,

    /// Courses registered at startup if missing
    #[serde(default = "default_courses")]
    pub courses: Vec<NewCourse>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            economics: EconomicsConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
            networks: NetworksConfig::default(),
            courses: default_courses(),
        }
    }
}

impl NodeConfig {
    /// Load `path` (defaults if absent) and apply the environment overrides
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(path)?;
                toml::from_str(&content)?
            }
            Some(path) => {
                tracing::info!(path = %path.display(), "Config not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };

        let env = config::Config::builder()
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;
        let overrides: Overrides = env.try_deserialize()?;
        overrides.apply(&mut config);

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the node cannot start with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.economics.owner.is_zero() {
            anyhow::bail!("economics.owner must not be the zero address");
        }
        if self.economics.escrow.is_zero() || self.economics.escrow == self.economics.owner {
            anyhow::bail!("economics.escrow must be a dedicated non-zero address");
        }
        if self.economics.default_total_modules == 0 {
            anyhow::bail!("economics.default_total_modules must be at least 1");
        }
        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!("logging.format must be \"text\" or \"json\", got {:?}", self.logging.format);
        }
        Ok(())
    }

    /// Serialize as TOML, the format written by `init-config`
    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Wiring options for the service layer
    pub fn service_options(&self) -> ServiceOptions {
        let economics = &self.economics;
        let mut options = ServiceOptions::new(economics.reward_minter.unwrap_or(economics.owner));
        options.progress = ProgressSettings {
            module_reward: economics.module_reward,
            sequential: economics.sequential_modules,
            default_total_modules: economics.default_total_modules,
        };
        options.network = NetworkLabel {
            name: self.networks.stake_network.clone(),
            chain_id: self.networks.stake_chain_id,
        };
        options.certificate_gateway = self.networks.certificate_gateway.clone();
        if !self.networks.use_store {
            options.static_networks = Some(StaticNetworks {
                networks: self.networks.networks.clone(),
                contracts: self.networks.contracts.clone(),
            });
        }
        options
    }
}

fn default_true() -> bool {
    true
}

/// HTTP API settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_server_address")]
    pub address: String,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// CORS origins, `*` allows any
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

fn default_server_address() -> String {
    "127.0.0.1:3001".to_string()
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_server_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
        }
    }
}

/// Native balance credited at first start
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisBalance {
    pub address: Address,
    #[serde(with = "serde_amount")]
    pub amount: Wei,
}

/// Ledger accounts and reward settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EconomicsConfig {
    /// Owner of both ledgers, also the first verifier
    #[serde(default = "default_owner")]
    pub owner: Address,

    /// Account holding staked value
    #[serde(default = "default_escrow")]
    pub escrow: Address,

    /// Account the reward issuer mints from; defaults to the owner
    #[serde(default)]
    pub reward_minter: Option<Address>,

    /// DATA minted per completed module
    #[serde(default = "default_module_reward", with = "serde_amount")]
    pub module_reward: Balance,

    /// Require modules to be completed in order
    #[serde(default = "default_true")]
    pub sequential_modules: bool,

    /// Module count for courses missing from the catalog
    #[serde(default = "default_total_modules")]
    pub default_total_modules: u32,

    /// Native balances credited when no ledger snapshot exists
    #[serde(default)]
    pub genesis_balances: Vec<GenesisBalance>,
}

fn default_owner() -> Address {
    Address::derive(b"poc:owner")
}

fn default_escrow() -> Address {
    Address::derive(b"poc:staking-manager")
}

fn default_module_reward() -> Balance {
    MODULE_REWARD
}

fn default_total_modules() -> u32 {
    DEFAULT_TOTAL_MODULES
}

impl Default for EconomicsConfig {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            escrow: default_escrow(),
            reward_minter: None,
            module_reward: default_module_reward(),
            sequential_modules: true,
            default_total_modules: default_total_modules(),
            genesis_balances: Vec::new(),
        }
    }
}

/// Storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory for snapshots
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Write snapshots at all; off keeps everything in memory
    #[serde(default = "default_true")]
    pub persist: bool,

    /// Seconds between periodic snapshots
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval_secs: u64,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_snapshot_interval() -> u64 {
    60
}

impl StorageConfig {
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("store.json")
    }

    pub fn ledgers_path(&self) -> PathBuf {
        self.data_dir.join("ledgers.json")
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs.max(1))
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            persist: true,
            snapshot_interval_secs: default_snapshot_interval(),
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: `text` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Metrics configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Serve `/metrics`
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Network registry configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworksConfig {
    /// Read and write the registry in the store; off serves the static tables
    #[serde(default = "default_true")]
    pub use_store: bool,

    /// Network name stamped on stake records
    #[serde(default = "default_stake_network")]
    pub stake_network: String,

    #[serde(default = "default_stake_chain_id")]
    pub stake_chain_id: ChainId,

    /// Gateway prefix for certificate metadata URLs
    #[serde(default = "default_gateway")]
    pub certificate_gateway: String,

    /// Static RPC table
    #[serde(default)]
    pub networks: Vec<NetworkRpc>,

    /// Static contract address table
    #[serde(default)]
    pub contracts: Vec<ContractAddresses>,
}

fn default_stake_network() -> String {
    NetworkLabel::default().name
}

fn default_stake_chain_id() -> ChainId {
    NetworkLabel::default().chain_id
}

fn default_gateway() -> String {
    poc_services::certificates::DEFAULT_GATEWAY.to_string()
}

impl Default for NetworksConfig {
    fn default() -> Self {
        Self {
            use_store: true,
            stake_network: default_stake_network(),
            stake_chain_id: default_stake_chain_id(),
            certificate_gateway: default_gateway(),
            networks: Vec::new(),
            contracts: Vec::new(),
        }
    }
}

/// Scalar settings that can come from the environment
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Overrides {
    server: ServerOverrides,
    economics: EconomicsOverrides,
    storage: StorageOverrides,
    logging: LoggingOverrides,
    metrics: MetricsOverrides,
    networks: NetworksOverrides,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ServerOverrides {
    address: Option<String>,
    cors_enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EconomicsOverrides {
    owner: Option<Address>,
    escrow: Option<Address>,
    reward_minter: Option<Address>,
    #[serde(with = "serde_amount::option")]
    module_reward: Option<Balance>,
    sequential_modules: Option<bool>,
    default_total_modules: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StorageOverrides {
    data_dir: Option<PathBuf>,
    persist: Option<bool>,
    snapshot_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LoggingOverrides {
    level: Option<String>,
    format: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MetricsOverrides {
    enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NetworksOverrides {
    use_store: Option<bool>,
    stake_network: Option<String>,
    stake_chain_id: Option<ChainId>,
    certificate_gateway: Option<String>,
}

fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

impl Overrides {
    fn apply(self, config: &mut NodeConfig) {
        set(&mut config.server.address, self.server.address);
        set(&mut config.server.cors_enabled, self.server.cors_enabled);

        let economics = &mut config.economics;
        set(&mut economics.owner, self.economics.owner);
        set(&mut economics.escrow, self.economics.escrow);
        if self.economics.reward_minter.is_some() {
            economics.reward_minter = self.economics.reward_minter;
        }
        set(&mut economics.module_reward, self.economics.module_reward);
        set(&mut economics.sequential_modules, self.economics.sequential_modules);
        set(&mut economics.default_total_modules, self.economics.default_total_modules);

        set(&mut config.storage.data_dir, self.storage.data_dir);
        set(&mut config.storage.persist, self.storage.persist);
        set(&mut config.storage.snapshot_interval_secs, self.storage.snapshot_interval_secs);

        set(&mut config.logging.level, self.logging.level);
        set(&mut config.logging.format, self.logging.format);
        set(&mut config.metrics.enabled, self.metrics.enabled);

        set(&mut config.networks.use_store, self.networks.use_store);
        set(&mut config.networks.stake_network, self.networks.stake_network);
        set(&mut config.networks.stake_chain_id, self.networks.stake_chain_id);
        set(&mut config.networks.certificate_gateway, self.networks.certificate_gateway);
    }
}

fn module(id: u32, title: &str, lessons: u32, duration: &str) -> CourseModule {
    CourseModule {
        id,
        title: title.to_string(),
        description: String::new(),
        lessons,
        duration: duration.to_string(),
    }
}

fn default_courses() -> Vec<NewCourse> {
    let mut fundamentals = NewCourse::new(1, "Blockchain Fundamentals");
    fundamentals.description = "Ledgers, wallets and transactions from first principles".to_string();
    fundamentals.stake_amount = Some(DEFAULT_COURSE_STAKE);
    fundamentals.modules = vec![
        module(1, "What is a blockchain", 4, "45 min"),
        module(2, "Keys and wallets", 5, "1 h"),
        module(3, "Transactions and gas", 4, "1 h"),
        module(4, "Consensus", 6, "1 h 30 min"),
    ];

    let mut contracts = NewCourse::new(2, "Smart Contract Development");
    contracts.description = "Writing, testing and deploying Solidity contracts".to_string();
    contracts.stake_amount = Some(DEFAULT_COURSE_STAKE);
    contracts.allow_repo_submission = true;
    contracts.modules = vec![
        module(1, "Solidity basics", 6, "1 h 30 min"),
        module(2, "Tokens and standards", 5, "1 h"),
        module(3, "Testing contracts", 5, "1 h"),
        module(4, "Deployment", 3, "45 min"),
    ];

    vec![fundamentals, contracts]
}

#[cfg(test)]
mod tests {
    use super::*;
    use poc_economics::constants::ONE_DATA;

    #[test]
    fn test_defaults_are_valid() {
        let config = NodeConfig::default();
        config.validate().unwrap();
        assert_eq!(config.server.address, "127.0.0.1:3001");
        assert_eq!(config.economics.module_reward, MODULE_REWARD);
        assert_eq!(config.courses.len(), 2);
    }

    #[test]
    fn test_toml_roundtrip_keeps_amounts() {
        let mut config = NodeConfig::default();
        config.economics.genesis_balances.push(GenesisBalance {
            address: Address::repeat_byte(7),
            amount: 5 * DEFAULT_COURSE_STAKE,
        });

        let text = config.to_toml().unwrap();
        let parsed: NodeConfig = toml::from_str(&text).unwrap();

        assert_eq!(parsed.economics.genesis_balances, config.economics.genesis_balances);
        assert_eq!(parsed.courses.len(), 2);
        assert_eq!(parsed.courses[0].stake_amount, Some(DEFAULT_COURSE_STAKE));
        assert_eq!(parsed.courses[1].modules.len(), 4);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let parsed: NodeConfig = toml::from_str("[server]\naddress = \"0.0.0.0:9000\"\n").unwrap();
        assert_eq!(parsed.server.address, "0.0.0.0:9000");
        assert!(parsed.server.cors_enabled);
        assert_eq!(parsed.courses.len(), 2);
        assert!(parsed.networks.use_store);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("poc.toml");
        std::fs::write(
            &path,
            "[economics]\nmodule_reward = \"5000000000000000000\"\nsequential_modules = false\n\n[logging]\nformat = \"json\"\n",
        )
        .unwrap();

        let config = NodeConfig::load(Some(&path)).unwrap();
        assert_eq!(config.economics.module_reward, 5 * ONE_DATA);
        assert!(!config.economics.sequential_modules);
        assert_eq!(config.logging.format, "json");

        let options = config.service_options();
        assert!(!options.progress.sequential);
        assert!(options.static_networks.is_none());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = NodeConfig::load(Some(&dir.path().join("none.toml"))).unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("./data"));
    }

    #[test]
    fn test_overrides_replace_scalars_only() {
        let overrides: Overrides = toml::from_str(
            "[economics]\nreward_minter = \"0x0707070707070707070707070707070707070707\"\nmodule_reward = \"1\"\n\n[storage]\npersist = false\n",
        )
        .unwrap();
        let mut config = NodeConfig::default();
        overrides.apply(&mut config);

        assert_eq!(config.economics.reward_minter, Some(Address::repeat_byte(7)));
        assert_eq!(config.economics.module_reward, 1);
        assert!(!config.storage.persist);
        assert_eq!(config.server.address, "127.0.0.1:3001");
        assert_eq!(config.courses.len(), 2);
    }

    #[test]
    fn test_validate_rejects_shared_escrow() {
        let mut config = NodeConfig::default();
        config.economics.escrow = config.economics.owner;
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_static_networks_when_store_disabled() {
        let mut config = NodeConfig::default();
        config.networks.use_store = false;
        config.networks.networks = poc_services::networks::default_networks();

        let options = config.service_options();
        let tables = options.static_networks.unwrap();
        assert_eq!(tables.networks.len(), config.networks.networks.len());
    }
}
