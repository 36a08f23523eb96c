//! Network registry
//!
//! RPC endpoints and deployed contract addresses per chain. Entries come
//! either from the document store (editable at runtime) or from static
//! configuration, selected once at construction. Reads go through a
//! short-lived cache.

use crate::error::{Result, ServiceError};
use parking_lot::RwLock;
use poc_core::{Address, ChainId, SharedClock};
use poc_storage::{collections, Collection, DocumentStore, StorageError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// How long a cached read stays valid (seconds)
pub const CACHE_TTL_SECS: i64 = 300;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl NativeCurrency {
    pub fn new(name: &str, symbol: &str) -> Self {
        Self {
            name: name.to_string(),
            symbol: symbol.to_string(),
            decimals: 18,
        }
    }
}

impl Default for NativeCurrency {
    fn default() -> Self {
        Self::new("ETH", "ETH")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRpc {
    pub id: String,
    pub chain_id: ChainId,
    pub chain_name: String,
    pub rpc_url: String,
    #[serde(default)]
    pub backup_rpc_urls: Vec<String>,
    #[serde(default)]
    pub block_explorer: String,
    #[serde(default)]
    pub native_currency: NativeCurrency,
    #[serde(default)]
    pub is_testnet: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub last_updated: i64,
    #[serde(default = "default_creator")]
    pub created_by: String,
}

fn default_true() -> bool {
    true
}

fn default_creator() -> String {
    "system".to_string()
}

/// Network create/update input
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInput {
    pub chain_id: ChainId,
    pub chain_name: String,
    pub rpc_url: String,
    #[serde(default)]
    pub backup_rpc_urls: Vec<String>,
    #[serde(default)]
    pub block_explorer: String,
    #[serde(default)]
    pub native_currency: Option<NativeCurrency>,
    #[serde(default)]
    pub is_testnet: bool,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub priority: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractAddresses {
    pub id: String,
    pub chain_id: ChainId,
    pub chain_name: String,
    pub staking_manager: Address,
    pub soulbound: Address,
    pub reputation: Address,
    #[serde(default)]
    pub data_coin: Option<Address>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub last_updated: i64,
    #[serde(default = "default_creator")]
    pub created_by: String,
}

/// Contract addresses update input
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractsInput {
    pub chain_name: String,
    pub staking_manager: Address,
    pub soulbound: Address,
    pub reputation: Address,
    #[serde(default)]
    pub data_coin: Option<Address>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl NetworkRpc {
    fn builtin(chain_id: ChainId, chain_name: &str, rpc_url: &str, block_explorer: &str, priority: u32) -> Self {
        Self {
            id: chain_id.to_string(),
            chain_id,
            chain_name: chain_name.to_string(),
            rpc_url: rpc_url.to_string(),
            backup_rpc_urls: Vec::new(),
            block_explorer: block_explorer.to_string(),
            native_currency: NativeCurrency::default(),
            is_testnet: false,
            is_active: true,
            priority,
            last_updated: 0,
            created_by: default_creator(),
        }
    }

    fn backups(mut self, urls: &[&str]) -> Self {
        self.backup_rpc_urls = urls.iter().map(|u| u.to_string()).collect();
        self
    }

    fn currency(mut self, symbol: &str) -> Self {
        self.native_currency = NativeCurrency::new(symbol, symbol);
        self
    }

    fn testnet(mut self) -> Self {
        self.is_testnet = true;
        self
    }
}

/// Built-in network table
pub fn default_networks() -> Vec<NetworkRpc> {
    vec![
        NetworkRpc::builtin(1, "Ethereum", "https://eth-mainnet.g.alchemy.com/v2/", "https://etherscan.io", 1)
            .backups(&["https://mainnet.infura.io/v3/", "https://ethereum.publicnode.com"]),
        NetworkRpc::builtin(11_155_111, "Ethereum Sepolia", "https://eth-sepolia.g.alchemy.com/v2/", "https://sepolia.etherscan.io", 2)
            .backups(&["https://sepolia.infura.io/v3/", "https://rpc.sepolia.org"])
            .testnet(),
        NetworkRpc::builtin(8453, "Base", "https://mainnet.base.org", "https://basescan.org", 3)
            .backups(&["https://base-mainnet.g.alchemy.com/v2/", "https://base.publicnode.com"]),
        NetworkRpc::builtin(84_532, "Base Sepolia", "https://sepolia.base.org", "https://sepolia.basescan.org", 4)
            .backups(&["https://base-sepolia.g.alchemy.com/v2/"])
            .testnet(),
        NetworkRpc::builtin(42_161, "Arbitrum One", "https://arb1.arbitrum.io/rpc", "https://arbiscan.io", 5)
            .backups(&["https://arbitrum-mainnet.g.alchemy.com/v2/", "https://arbitrum.publicnode.com"]),
        NetworkRpc::builtin(421_614, "Arbitrum Sepolia", "https://sepolia-rollup.arbitrum.io/rpc", "https://sepolia.arbiscan.io", 6)
            .backups(&["https://arbitrum-sepolia.g.alchemy.com/v2/"])
            .testnet(),
        NetworkRpc::builtin(56, "BNB Smart Chain", "https://bsc-dataseed1.binance.org", "https://bscscan.com", 7)
            .backups(&["https://bsc-dataseed2.binance.org", "https://bsc-dataseed3.binance.org"])
            .currency("BNB"),
        NetworkRpc::builtin(97, "BNB Smart Chain Testnet", "https://data-seed-prebsc-1-s1.binance.org:8545", "https://testnet.bscscan.com", 8)
            .backups(&["https://data-seed-prebsc-2-s1.binance.org:8545"])
            .currency("tBNB")
            .testnet(),
        NetworkRpc::builtin(43_114, "Avalanche C-Chain", "https://api.avax.network/ext/bc/C/rpc", "https://snowtrace.io", 9)
            .backups(&["https://avalanche-mainnet.g.alchemy.com/v2/", "https://avalanche.publicnode.com"])
            .currency("AVAX"),
        NetworkRpc::builtin(43_113, "Avalanche Fuji", "https://api.avax-test.network/ext/bc/C/rpc", "https://testnet.snowtrace.io", 10)
            .currency("AVAX")
            .testnet(),
    ]
}

struct Cached<T> {
    value: T,
    expires_at: i64,
}

type Cache<T> = Arc<RwLock<HashMap<ChainId, Cached<T>>>>;

/// Network registry service
#[derive(Clone)]
pub struct NetworkRegistry {
    rpcs: Collection<NetworkRpc>,
    contracts: Collection<ContractAddresses>,
    use_store: bool,
    static_networks: Vec<NetworkRpc>,
    static_contracts: Vec<ContractAddresses>,
    rpc_cache: Cache<NetworkRpc>,
    contract_cache: Cache<ContractAddresses>,
    clock: SharedClock,
}

impl NetworkRegistry {
    /// Store-backed registry
    pub fn new(store: Arc<dyn DocumentStore>, clock: SharedClock) -> Self {
        Self {
            rpcs: Collection::new(store.clone(), collections::NETWORK_RPCS),
            contracts: Collection::new(store, collections::CONTRACT_ADDRESSES),
            use_store: true,
            static_networks: default_networks(),
            static_contracts: Vec::new(),
            rpc_cache: Arc::default(),
            contract_cache: Arc::default(),
            clock,
        }
    }

    /// Serve reads from the given tables instead of the store
    pub fn with_static(mut self, networks: Vec<NetworkRpc>, contracts: Vec<ContractAddresses>) -> Self {
        self.use_store = false;
        self.static_networks = networks;
        self.static_contracts = contracts;
        self
    }

    pub fn uses_store(&self) -> bool {
        self.use_store
    }

    fn writable(&self) -> Result<()> {
        if !self.use_store {
            return Err(ServiceError::conflict("Network registry is read-only (static configuration)"));
        }
        Ok(())
    }

    fn cached<T: Clone>(&self, cache: &Cache<T>, chain_id: ChainId) -> Option<T> {
        let now = self.clock.now();
        cache
            .read()
            .get(&chain_id)
            .filter(|c| c.expires_at > now)
            .map(|c| c.value.clone())
    }

    fn remember<T>(&self, cache: &Cache<T>, chain_id: ChainId, value: T) {
        cache.write().insert(
            chain_id,
            Cached {
                value,
                expires_at: self.clock.now() + CACHE_TTL_SECS,
            },
        );
    }

    /// Drop every cached entry
    pub fn clear_cache(&self) {
        self.rpc_cache.write().clear();
        self.contract_cache.write().clear();
    }

    pub async fn get_network(&self, chain_id: ChainId) -> Result<Option<NetworkRpc>> {
        if let Some(hit) = self.cached(&self.rpc_cache, chain_id) {
            return Ok(Some(hit));
        }

        let found = if self.use_store {
            self.rpcs.get(&chain_id.to_string()).await?.map(|v| v.value)
        } else {
            self.static_networks.iter().find(|n| n.chain_id == chain_id).cloned()
        };

        if let Some(network) = &found {
            self.remember(&self.rpc_cache, chain_id, network.clone());
        }
        Ok(found)
    }

    /// Active networks by priority
    pub async fn list_networks(&self) -> Result<Vec<NetworkRpc>> {
        let mut networks = if self.use_store {
            self.rpcs.find(|n: &NetworkRpc| n.is_active).await?
        } else {
            self.static_networks.iter().filter(|n| n.is_active).cloned().collect()
        };
        networks.sort_by_key(|n| (n.priority, n.chain_id));
        Ok(networks)
    }

    pub async fn upsert_network(&self, input: NetworkInput, created_by: &str) -> Result<NetworkRpc> {
        self.writable()?;
        if input.chain_name.trim().is_empty() {
            return Err(ServiceError::validation("Chain name is required"));
        }
        let is_http = |url: &str| url.starts_with("https://") || url.starts_with("http://");
        if !is_http(&input.rpc_url) || !input.backup_rpc_urls.iter().all(|u| is_http(u)) {
            return Err(ServiceError::validation("RPC URLs must be http(s) URLs"));
        }

        let network = NetworkRpc {
            id: input.chain_id.to_string(),
            chain_id: input.chain_id,
            chain_name: input.chain_name,
            rpc_url: input.rpc_url,
            backup_rpc_urls: input.backup_rpc_urls,
            block_explorer: input.block_explorer,
            native_currency: input.native_currency.unwrap_or_default(),
            is_testnet: input.is_testnet,
            is_active: input.is_active.unwrap_or(true),
            priority: input.priority.unwrap_or(0),
            last_updated: self.clock.now(),
            created_by: if created_by.is_empty() {
                default_creator()
            } else {
                created_by.to_string()
            },
        };

        self.rpcs.put(&network.id, &network).await?;
        self.remember(&self.rpc_cache, network.chain_id, network.clone());
        tracing::info!(chain_id = network.chain_id, name = %network.chain_name, "Network RPC updated");
        Ok(network)
    }

    /// Primary URL, else the first backup
    pub async fn best_rpc_url(&self, chain_id: ChainId) -> Result<Option<String>> {
        Ok(self.get_network(chain_id).await?.and_then(|n| {
            if !n.rpc_url.is_empty() {
                Some(n.rpc_url)
            } else {
                n.backup_rpc_urls.into_iter().find(|u| !u.is_empty())
            }
        }))
    }

    /// Write the built-in networks that are not stored yet
    pub async fn initialize_defaults(&self, created_by: &str) -> Result<usize> {
        self.writable()?;
        let now = self.clock.now();
        let mut written = 0;

        for mut network in default_networks() {
            network.last_updated = now;
            network.created_by = created_by.to_string();
            match self.rpcs.create(&network.id, &network).await {
                Ok(_) => written += 1,
                Err(StorageError::AlreadyExists { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }

        self.rpc_cache.write().clear();
        tracing::info!(written, "Default networks initialised");
        Ok(written)
    }

    pub async fn get_contracts(&self, chain_id: ChainId) -> Result<Option<ContractAddresses>> {
        if let Some(hit) = self.cached(&self.contract_cache, chain_id) {
            return Ok(Some(hit));
        }

        let found = if self.use_store {
            self.contracts.get(&chain_id.to_string()).await?.map(|v| v.value)
        } else {
            self.static_contracts.iter().find(|c| c.chain_id == chain_id).cloned()
        };

        if let Some(contracts) = &found {
            self.remember(&self.contract_cache, chain_id, contracts.clone());
        }
        Ok(found)
    }

    /// Active deployments by chain id
    pub async fn list_contracts(&self) -> Result<Vec<ContractAddresses>> {
        let mut contracts = if self.use_store {
            self.contracts.find(|c: &ContractAddresses| c.is_active).await?
        } else {
            self.static_contracts.iter().filter(|c| c.is_active).cloned().collect()
        };
        contracts.sort_by_key(|c| c.chain_id);
        Ok(contracts)
    }

    pub async fn upsert_contracts(
        &self,
        chain_id: ChainId,
        input: ContractsInput,
        created_by: &str,
    ) -> Result<ContractAddresses> {
        self.writable()?;
        if input.staking_manager.is_zero() {
            return Err(ServiceError::validation("Staking manager address is required"));
        }

        let contracts = ContractAddresses {
            id: chain_id.to_string(),
            chain_id,
            chain_name: input.chain_name,
            staking_manager: input.staking_manager,
            soulbound: input.soulbound,
            reputation: input.reputation,
            data_coin: input.data_coin,
            is_active: input.is_active.unwrap_or(true),
            last_updated: self.clock.now(),
            created_by: created_by.to_string(),
        };

        self.contracts.put(&contracts.id, &contracts).await?;
        self.remember(&self.contract_cache, chain_id, contracts.clone());
        tracing::info!(chain_id, "Contract addresses updated");
        Ok(contracts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poc_core::ManualClock;
    use poc_storage::{MemoryStore, Precondition};

    fn registry() -> (NetworkRegistry, Arc<MemoryStore>, Arc<ManualClock>) {
        let clock = ManualClock::shared(0);
        let store = Arc::new(MemoryStore::new(clock.clone()));
        (NetworkRegistry::new(store.clone(), clock.clone()), store, clock)
    }

    fn input(chain_id: ChainId, priority: u32) -> NetworkInput {
        NetworkInput {
            chain_id,
            chain_name: format!("Chain {chain_id}"),
            rpc_url: format!("https://rpc.{chain_id}.example"),
            backup_rpc_urls: vec![],
            block_explorer: String::new(),
            native_currency: None,
            is_testnet: false,
            is_active: None,
            priority: Some(priority),
        }
    }

    #[test]
    fn test_default_table() {
        let networks = default_networks();
        assert_eq!(networks.len(), 10);
        assert!(networks.iter().all(|n| n.rpc_url.starts_with("https://")));
        let bsc_test = networks.iter().find(|n| n.chain_id == 97).unwrap();
        assert_eq!(bsc_test.native_currency.symbol, "tBNB");
        assert!(bsc_test.is_testnet);
    }

    #[tokio::test]
    async fn test_initialize_defaults_is_idempotent() {
        let (registry, _, _) = registry();
        assert_eq!(registry.initialize_defaults("admin").await.unwrap(), 10);
        assert_eq!(registry.initialize_defaults("admin").await.unwrap(), 0);

        let listed = registry.list_networks().await.unwrap();
        assert_eq!(listed.len(), 10);
        assert_eq!(listed[0].chain_id, 1);
        assert_eq!(listed[9].chain_id, 43_113);
    }

    #[tokio::test]
    async fn test_upsert_defaults_and_listing() {
        let (registry, _, _) = registry();
        registry.upsert_network(input(10, 2), "").await.unwrap();
        let mut inactive = input(20, 1);
        inactive.is_active = Some(false);
        registry.upsert_network(inactive, "ops").await.unwrap();
        registry.upsert_network(input(30, 1), "ops").await.unwrap();

        let stored = registry.get_network(10).await.unwrap().unwrap();
        assert_eq!(stored.native_currency, NativeCurrency::default());
        assert_eq!(stored.created_by, "system");

        let ids: Vec<_> = registry.list_networks().await.unwrap().iter().map(|n| n.chain_id).collect();
        assert_eq!(ids, vec![30, 10]);

        let mut bad = input(40, 0);
        bad.rpc_url = "ws://nope".into();
        assert_eq!(registry.upsert_network(bad, "ops").await.unwrap_err().status(), 400);
    }

    #[tokio::test]
    async fn test_cache_expires() {
        let (registry, store, clock) = registry();
        registry.upsert_network(input(5, 0), "ops").await.unwrap();

        // change behind the registry's back
        let mut changed = registry.get_network(5).await.unwrap().unwrap();
        changed.rpc_url = "https://changed.example".into();
        store
            .put(collections::NETWORK_RPCS, "5", serde_json::to_value(&changed).unwrap(), Precondition::Any)
            .await
            .unwrap();

        assert_eq!(registry.best_rpc_url(5).await.unwrap().unwrap(), "https://rpc.5.example");
        clock.advance(CACHE_TTL_SECS + 1);
        assert_eq!(registry.best_rpc_url(5).await.unwrap().unwrap(), "https://changed.example");
    }

    #[tokio::test]
    async fn test_best_rpc_falls_back_to_backup() {
        let (registry, store, _) = registry();
        let mut network = default_networks().remove(0);
        network.rpc_url = String::new();
        store
            .put(collections::NETWORK_RPCS, "1", serde_json::to_value(&network).unwrap(), Precondition::Any)
            .await
            .unwrap();

        assert_eq!(
            registry.best_rpc_url(1).await.unwrap().as_deref(),
            Some("https://mainnet.infura.io/v3/")
        );
        assert_eq!(registry.best_rpc_url(999).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_static_registry_is_read_only() {
        let (registry, _, _) = registry();
        let contracts = ContractAddresses {
            id: "11155111".into(),
            chain_id: 11_155_111,
            chain_name: "Ethereum Sepolia".into(),
            staking_manager: Address::repeat_byte(0xaa),
            soulbound: Address::repeat_byte(0xbb),
            reputation: Address::repeat_byte(0xcc),
            data_coin: None,
            is_active: true,
            last_updated: 0,
            created_by: "env".into(),
        };
        let registry = registry.with_static(default_networks(), vec![contracts.clone()]);

        assert_eq!(registry.get_contracts(11_155_111).await.unwrap(), Some(contracts));
        assert_eq!(registry.list_networks().await.unwrap().len(), 10);
        assert!(registry.upsert_network(input(7, 0), "ops").await.is_err());
        assert!(registry.initialize_defaults("ops").await.is_err());
    }

    #[tokio::test]
    async fn test_contract_upsert() {
        let (registry, _, _) = registry();
        let saved = registry
            .upsert_contracts(
                84_532,
                ContractsInput {
                    chain_name: "Base Sepolia".into(),
                    staking_manager: Address::repeat_byte(1),
                    soulbound: Address::repeat_byte(2),
                    reputation: Address::repeat_byte(3),
                    data_coin: Some(Address::repeat_byte(4)),
                    is_active: None,
                },
                "admin",
            )
            .await
            .unwrap();
        assert!(saved.is_active);
        assert_eq!(registry.list_contracts().await.unwrap(), vec![saved]);
    }
}
