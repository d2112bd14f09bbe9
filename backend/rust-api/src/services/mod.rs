use std::sync::Arc;

use mongodb::Client as MongoClient;
use redis::aio::ConnectionManager;

use crate::config::Config;
use crate::storage::mongo::{
    MongoAssignmentStore, MongoCertificateQueue, MongoGroupStore, MongoLedgerStore,
    MongoQuestionPool, MongoSessionStore,
};
use crate::storage::{
    AssignmentStore, CertificateIssuer, GroupMembershipStore, LedgerStore, MemoryStore,
    QuestionPoolProvider, SessionStore,
};

pub mod credit_ledger;
pub mod evaluator;
pub mod question_selector;
pub mod session_engine;
pub mod visibility;

pub use credit_ledger::CreditLedgerService;
pub use session_engine::SessionEngine;

pub struct AppState {
    pub config: Config,
    pub questions: Arc<dyn QuestionPoolProvider>,
    pub assignments: Arc<dyn AssignmentStore>,
    pub groups: Arc<dyn GroupMembershipStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub ledger: Arc<dyn LedgerStore>,
    pub certificates: Arc<dyn CertificateIssuer>,
    /// Shared so every request sees the same per-user debit locks.
    pub credits: Arc<CreditLedgerService>,
}

impl AppState {
    /// Production wiring: MongoDB-backed stores with a Redis session cache.
    pub async fn connect(
        config: Config,
        mongo_client: MongoClient,
        redis_client: redis::Client,
    ) -> anyhow::Result<Self> {
        let mongo = mongo_client.database(&config.mongo_database);

        tracing::info!("Attempting to connect to Redis...");

        // Create ConnectionManager with longer timeout
        let redis = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            ConnectionManager::new(redis_client),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

        tracing::info!("Redis ConnectionManager created, testing with PING...");

        // Test connection
        let mut conn = redis.clone();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

        tracing::info!("Redis connection established successfully");

        let ledger: Arc<dyn LedgerStore> = Arc::new(MongoLedgerStore::new(mongo.clone()));
        Ok(Self {
            config,
            questions: Arc::new(MongoQuestionPool::new(mongo.clone())),
            assignments: Arc::new(MongoAssignmentStore::new(mongo.clone())),
            groups: Arc::new(MongoGroupStore::new(mongo.clone())),
            sessions: Arc::new(MongoSessionStore::new(mongo.clone(), redis)),
            certificates: Arc::new(MongoCertificateQueue::new(mongo)),
            credits: Arc::new(CreditLedgerService::new(ledger.clone())),
            ledger,
        })
    }

    /// In-memory wiring for tests and database-free tooling. The returned
    /// handle seeds and inspects the shared backend.
    pub fn in_memory(config: Config) -> (Self, MemoryStore) {
        let store = MemoryStore::new();
        let ledger: Arc<dyn LedgerStore> = Arc::new(store.clone());
        let state = Self {
            config,
            questions: Arc::new(store.clone()),
            assignments: Arc::new(store.clone()),
            groups: Arc::new(store.clone()),
            sessions: Arc::new(store.clone()),
            certificates: Arc::new(store.clone()),
            credits: Arc::new(CreditLedgerService::new(ledger.clone())),
            ledger,
        };
        (state, store)
    }
}
