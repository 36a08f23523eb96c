//! # Proof of Contribution Services
//!
//! Off-chain workflows on top of the ledgers in `poc-economics` and the
//! document store in `poc-storage`.
//!
//! ```text
//!            ┌────────────── EnrollmentService ──────────────┐
//!   stake ──►│ StakingManager.stake ─► progress ─► record    │
//!            └───────────────────────────────────────────────┘
//!   module ──► ProgressService ─► RewardIssuer (DataCoin.mint)
//!   verify ──► CompletionService ─► refund ─► certificate (SBT)
//!   repo   ──► RepositoryService ─► review ─► rewards + reputation
//!   proof  ──► ConsumerDataService ─► ProofVerifier ─► rewards
//! ```
//!
//! Every service is cheap to clone and shares the same store, clock and
//! ledgers. `Services::new` wires the full set.

pub mod certificates;
pub mod completion;
pub mod consumer_data;
pub mod courses;
pub mod error;
pub mod issuer;
pub mod networks;
pub mod progress;
pub mod repository;
pub mod stakes;
pub mod transactions;

pub use certificates::{Certificate, CertificateRegistry};
pub use completion::{BatchCompletionReport, CompletionReceipt, CompletionService, CompletionTarget};
pub use consumer_data::{ClaimsVerifier, ConsumerDataService, ProofVerifier};
pub use courses::{CourseInfo, CourseService, CourseUpdate, NewCourse};
pub use error::{Result, ServiceError};
pub use issuer::{LedgerIssuer, RewardIssuer, RewardReceipt};
pub use networks::{ContractAddresses, NetworkRegistry, NetworkRpc};
pub use progress::{CourseProgress, ProgressService, ProgressSettings};
pub use repository::RepositoryService;
pub use stakes::{EnrollmentService, NetworkLabel, StakeRequest, StakingRecords};
pub use transactions::{TransactionKind, TransactionLog, TransactionRecord};

use poc_core::{Address, SharedClock};
use poc_economics::{DataCoin, NativeBank, Reputation, StakingManager};
use poc_storage::DocumentStore;
use std::sync::Arc;

/// Ledgers shared by the services
#[derive(Clone)]
pub struct Ledgers {
    pub bank: Arc<NativeBank>,
    pub staking: Arc<StakingManager>,
    pub token: Arc<DataCoin>,
    pub reputation: Arc<Reputation>,
}

/// Static network tables, used instead of the store when present
#[derive(Clone, Debug, Default)]
pub struct StaticNetworks {
    pub networks: Vec<NetworkRpc>,
    pub contracts: Vec<ContractAddresses>,
}

/// Wiring options for `Services::new`
#[derive(Clone, Debug)]
pub struct ServiceOptions {
    /// Account the reward issuer mints from
    pub reward_minter: Address,
    pub progress: ProgressSettings,
    pub network: NetworkLabel,
    pub certificate_gateway: String,
    pub static_networks: Option<StaticNetworks>,
}

impl ServiceOptions {
    pub fn new(reward_minter: Address) -> Self {
        Self {
            reward_minter,
            progress: ProgressSettings::default(),
            network: NetworkLabel::default(),
            certificate_gateway: certificates::DEFAULT_GATEWAY.to_string(),
            static_networks: None,
        }
    }
}

/// The full service set
#[derive(Clone)]
pub struct Services {
    pub ledgers: Ledgers,
    pub courses: CourseService,
    pub progress: ProgressService,
    pub enrollment: EnrollmentService,
    pub completion: CompletionService,
    pub repositories: RepositoryService,
    pub consumer_data: ConsumerDataService,
    pub networks: NetworkRegistry,
    pub transactions: TransactionLog,
    pub certificates: CertificateRegistry,
}

impl Services {
    pub fn new(
        ledgers: Ledgers,
        store: Arc<dyn DocumentStore>,
        clock: SharedClock,
        verifier: Arc<dyn ProofVerifier>,
        options: ServiceOptions,
    ) -> Self {
        let issuer: Arc<dyn RewardIssuer> = Arc::new(LedgerIssuer::new(
            ledgers.token.clone(),
            options.reward_minter,
            clock.clone(),
        ));
        let transactions = TransactionLog::new(store.clone(), clock.clone())
            .with_ledgers(ledgers.staking.clone(), ledgers.token.clone());
        let courses = CourseService::new(store.clone(), ledgers.staking.clone(), clock.clone());
        let progress = ProgressService::new(
            store.clone(),
            courses.clone(),
            issuer.clone(),
            transactions.clone(),
            clock.clone(),
        )
        .with_settings(options.progress);
        let enrollment = EnrollmentService::new(
            store.clone(),
            courses.clone(),
            progress.clone(),
            transactions.clone(),
            clock.clone(),
        )
        .with_network(options.network);
        let certificates =
            CertificateRegistry::new(store.clone(), clock.clone()).with_gateway(options.certificate_gateway);
        let completion = CompletionService::new(
            courses.clone(),
            progress.clone(),
            certificates.clone(),
            enrollment.records().clone(),
            transactions.clone(),
            clock.clone(),
        );
        let repositories = RepositoryService::new(
            store.clone(),
            ledgers.staking.clone(),
            issuer.clone(),
            transactions.clone(),
            clock.clone(),
        )
        .with_reputation(ledgers.reputation.clone(), options.reward_minter);
        let consumer_data =
            ConsumerDataService::new(store.clone(), verifier, issuer, transactions.clone(), clock.clone());

        let networks = NetworkRegistry::new(store, clock);
        let networks = match options.static_networks {
            Some(tables) => networks.with_static(tables.networks, tables.contracts),
            None => networks,
        };

        Self {
            ledgers,
            courses,
            progress,
            enrollment,
            completion,
            repositories,
            consumer_data,
            networks,
            transactions,
            certificates,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fully wired services over an in-memory store and a manual clock

    use super::*;
    use poc_core::ManualClock;
    use poc_storage::MemoryStore;

    pub const OWNER: Address = Address::repeat_byte(0x01);
    pub const ESCROW: Address = Address::repeat_byte(0xee);
    pub const LEARNER: Address = Address::repeat_byte(0x02);
    pub const STAKE: u128 = 100_000_000_000_000;

    pub struct Harness {
        pub services: Services,
        pub clock: Arc<ManualClock>,
    }

    impl Harness {
        pub fn new() -> Self {
            Self::with_options(ServiceOptions::new(OWNER))
        }

        pub fn with_options(options: ServiceOptions) -> Self {
            Self::with_store(options, |store| store)
        }

        /// Services over `wrap(memory store)`, for injecting store failures
        pub fn with_store(
            options: ServiceOptions,
            wrap: impl FnOnce(Arc<dyn DocumentStore>) -> Arc<dyn DocumentStore>,
        ) -> Self {
            let clock = ManualClock::shared(1_700_000_000);
            let bank = Arc::new(NativeBank::new());
            bank.credit(LEARNER, 10 * STAKE).unwrap();
            let ledgers = Ledgers {
                staking: Arc::new(StakingManager::new(ESCROW, OWNER, bank.clone(), clock.clone())),
                token: Arc::new(DataCoin::new(OWNER)),
                reputation: Arc::new(Reputation::new(OWNER)),
                bank,
            };
            let store = wrap(Arc::new(MemoryStore::new(clock.clone())));
            let services = Services::new(ledgers, store, clock.clone(), Arc::new(ClaimsVerifier), options);
            Self { services, clock }
        }

        /// Course `id` with `modules` modules at the default stake
        pub async fn course(&self, id: u64, modules: u32) {
            let mut course = NewCourse::new(id, format!("Course {id}"));
            course.total_modules = Some(modules);
            course.stake_amount = Some(STAKE);
            self.services.courses.register(OWNER, course).await.unwrap();
        }

        pub async fn stake(&self, user: Address, course_id: u64) {
            self.services
                .enrollment
                .stake(StakeRequest {
                    user_address: user,
                    course_id,
                    amount: STAKE,
                    user_name: Some("Ada".into()),
                    user_email: None,
                })
                .await
                .unwrap();
        }

        pub async fn finish_modules(&self, user: Address, course_id: u64, modules: u32) {
            for module_id in 1..=modules {
                self.services
                    .progress
                    .complete_module(user, course_id, module_id, None)
                    .await
                    .unwrap();
            }
        }
    }
}
