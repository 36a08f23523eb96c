//! Proof of Contribution node
//!
//! Wires the ledgers, the document store and the services together, serves
//! the HTTP API and persists everything to the data directory.

use crate::api::{self, AppState};
use crate::config::NodeConfig;
use crate::metrics::Metrics;

use anyhow::Context;
use parking_lot::RwLock;
use poc_core::{Address, SharedClock, SystemClock, Wei};
use poc_economics::{DataCoin, NativeBank, Reputation, ReputationState, StakingManager, StakingState, TokenState};
use poc_services::{ClaimsVerifier, Ledgers, Services};
use poc_storage::MemoryStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;

/// Node state
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeState {
    /// Node is starting up
    Starting,
    /// Node is serving requests
    Running,
    /// Node is shutting down
    Stopping,
    /// Node has stopped
    Stopped,
}

/// Ledger snapshot file layout
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LedgerSnapshot {
    bank: HashMap<Address, Wei>,
    staking: StakingState,
    token: TokenState,
    /// Absent in snapshots written before the reputation ledger existed
    #[serde(default)]
    reputation: Option<ReputationState>,
}

/// Proof of Contribution node
pub struct PocNode {
    config: Arc<NodeConfig>,
    store: Arc<MemoryStore>,
    services: Services,
    metrics: Arc<Metrics>,
    state: Arc<RwLock<NodeState>>,
}

impl PocNode {
    /// Build the node, restoring persisted state when enabled
    pub async fn new(config: NodeConfig) -> anyhow::Result<Self> {
        Self::with_clock(config, SystemClock::shared()).await
    }

    pub async fn with_clock(config: NodeConfig, clock: SharedClock) -> anyhow::Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let storage = &config.storage;

        let ledgers = if storage.persist {
            load_ledgers(&config, &storage.ledgers_path(), clock.clone())?
        } else {
            genesis_ledgers(&config, clock.clone())?
        };

        let store = if storage.persist {
            MemoryStore::open(&storage.store_path(), clock.clone())
                .with_context(|| format!("Failed to open store at {}", storage.store_path().display()))?
        } else {
            MemoryStore::new(clock.clone())
        };
        let store = Arc::new(store);

        let services = Services::new(
            ledgers,
            store.clone(),
            clock,
            Arc::new(ClaimsVerifier),
            config.service_options(),
        );

        let seeded = services
            .courses
            .seed(config.economics.owner, config.courses.clone())
            .await?;
        if seeded > 0 {
            tracing::info!(courses = seeded, "Seeded course catalog");
        }

        let metrics = Arc::new(Metrics::new()?);
        metrics.set_escrow_balance(services.ledgers.staking.contract_balance());

        Ok(Self {
            config,
            store,
            services,
            metrics,
            state: Arc::new(RwLock::new(NodeState::Starting)),
        })
    }

    pub fn state(&self) -> NodeState {
        self.state.read().clone()
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// HTTP router over this node's services
    pub fn router(&self) -> axum::Router {
        api::router(AppState::new(
            self.services.clone(),
            self.metrics.clone(),
            self.config.clone(),
        ))
    }

    /// Persist the store and the ledgers; a no-op when persistence is off
    pub fn save_snapshot(&self) -> anyhow::Result<()> {
        if !self.config.storage.persist {
            return Ok(());
        }
        self.snapshot_writer().write()?;
        tracing::debug!(dir = %self.config.storage.data_dir.display(), "Snapshot saved");
        Ok(())
    }

    fn snapshot_writer(&self) -> SnapshotWriter {
        SnapshotWriter {
            config: self.config.clone(),
            store: self.store.clone(),
            ledgers: self.services.ledgers.clone(),
        }
    }

    /// Serve until Ctrl+C or SIGTERM
    pub async fn run(&self) -> anyhow::Result<()> {
        let address = self.config.server.address.clone();
        let listener = tokio::net::TcpListener::bind(&address)
            .await
            .with_context(|| format!("Failed to bind {address}"))?;

        tracing::info!("Proof of Contribution node listening on {}", address);
        tracing::info!(
            owner = %self.config.economics.owner,
            escrow = %self.services.ledgers.staking.address(),
            network = %self.config.networks.stake_network,
            "Ledgers ready"
        );

        let snapshots = self.spawn_snapshot_task();
        *self.state.write() = NodeState::Running;

        axum::serve(listener, self.router())
            .with_graceful_shutdown(wait_for_shutdown())
            .await?;

        *self.state.write() = NodeState::Stopping;
        tracing::info!("Shutting down");
        if let Some(handle) = snapshots {
            handle.abort();
        }
        self.save_snapshot()?;
        *self.state.write() = NodeState::Stopped;
        Ok(())
    }

    fn spawn_snapshot_task(&self) -> Option<tokio::task::JoinHandle<()>> {
        let storage = &self.config.storage;
        if !storage.persist || storage.snapshot_interval_secs == 0 {
            return None;
        }

        let writer = self.snapshot_writer();
        let period = storage.snapshot_interval();
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // first tick fires immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = writer.write() {
                    tracing::warn!("Periodic snapshot failed: {}", e);
                }
            }
        }))
    }
}

/// Owned handles for the periodic snapshot task
struct SnapshotWriter {
    config: Arc<NodeConfig>,
    store: Arc<MemoryStore>,
    ledgers: Ledgers,
}

impl SnapshotWriter {
    fn write(&self) -> anyhow::Result<()> {
        let storage = &self.config.storage;
        self.store.save_snapshot(&storage.store_path())?;
        let snapshot = LedgerSnapshot {
            bank: self.ledgers.bank.snapshot(),
            staking: self.ledgers.staking.snapshot(),
            token: self.ledgers.token.snapshot(),
            reputation: Some(self.ledgers.reputation.snapshot()),
        };
        write_atomic(&storage.ledgers_path(), &serde_json::to_vec_pretty(&snapshot)?)?;
        Ok(())
    }
}

/// Fresh ledgers with the configured genesis credits
fn genesis_ledgers(config: &NodeConfig, clock: SharedClock) -> anyhow::Result<Ledgers> {
    let economics = &config.economics;
    let bank = Arc::new(NativeBank::new());
    for entry in &economics.genesis_balances {
        bank.credit(entry.address, entry.amount)?;
    }

    let staking = Arc::new(StakingManager::new(economics.escrow, economics.owner, bank.clone(), clock));
    let token = Arc::new(DataCoin::new(economics.owner));
    let reputation = Arc::new(genesis_reputation(config)?);
    if let Some(minter) = economics.reward_minter {
        if minter != economics.owner {
            token.add_minter(economics.owner, minter)?;
        }
    }

    tracing::info!(
        accounts = economics.genesis_balances.len(),
        owner = %economics.owner,
        "Ledgers initialized from genesis"
    );
    Ok(Ledgers {
        bank,
        staking,
        token,
        reputation,
    })
}

/// Empty reputation ledger; the reward minter records scores
fn genesis_reputation(config: &NodeConfig) -> anyhow::Result<Reputation> {
    let economics = &config.economics;
    let reputation = Reputation::new(economics.owner);
    if let Some(minter) = economics.reward_minter.filter(|m| *m != economics.owner) {
        reputation.set_minter(economics.owner, minter)?;
    }
    Ok(reputation)
}

/// Restore ledgers from `path`, or start from genesis if it does not exist
fn load_ledgers(config: &NodeConfig, path: &Path, clock: SharedClock) -> anyhow::Result<Ledgers> {
    if !path.exists() {
        return genesis_ledgers(config, clock);
    }

    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let snapshot: LedgerSnapshot =
        serde_json::from_slice(&bytes).with_context(|| format!("Corrupt ledger snapshot {}", path.display()))?;

    if snapshot.staking.owner != config.economics.owner {
        tracing::warn!(
            snapshot_owner = %snapshot.staking.owner,
            configured_owner = %config.economics.owner,
            "Ledger snapshot owner differs from configuration; keeping snapshot"
        );
    }

    let bank = Arc::new(NativeBank::from_snapshot(snapshot.bank));
    let staking = Arc::new(StakingManager::from_snapshot(
        config.economics.escrow,
        bank.clone(),
        clock,
        snapshot.staking,
    ));
    let token = Arc::new(DataCoin::from_snapshot(snapshot.token));
    let reputation = match snapshot.reputation {
        Some(state) => Reputation::from_snapshot(state),
        None => genesis_reputation(config)?,
    };
    tracing::info!(path = %path.display(), "Ledgers restored from snapshot");
    Ok(Ledgers {
        bank,
        staking,
        token,
        reputation: Arc::new(reputation),
    })
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
