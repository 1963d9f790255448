//! Persistence boundary
//!
//! Services talk to storage through [`Store`] for plain reads and inserts, and
//! through a [`UnitOfWork`] for every read-modify-write. A unit of work holds
//! its rows locked until it is committed; dropping it without committing
//! discards every write made through it.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::bins::SmartBin;
use crate::collection::{CollectionTask, TaskStatus};
use crate::ledger::{Transaction, Wallet};
use crate::models::{Municipality, User};
use crate::pricing::{PriceConfiguration, Scope, WasteType};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Storage errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Record changed concurrently: {0}")]
    Conflict(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StoreError::Duplicate(db.message().to_string())
            }
            _ => StoreError::Database(err.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Task listing filter. Unset fields do not constrain the result.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub customer_id: Option<Uuid>,
    pub agent_id: Option<Uuid>,
    pub scope: Option<Scope>,
    pub status: Option<TaskStatus>,
    pub limit: i64,
    pub offset: i64,
}

/// Read access and simple inserts
#[async_trait]
pub trait Store: Send + Sync {
    /// Open a unit of work
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>>;

    /// Cheap connectivity probe for health checks
    async fn ping(&self) -> StoreResult<()>;

    async fn user(&self, id: Uuid) -> StoreResult<Option<User>>;

    async fn municipality(&self, id: Uuid) -> StoreResult<Option<Municipality>>;

    /// Create the owner's wallet unless it already exists; returns the wallet either way
    async fn open_wallet(&self, owner_id: Uuid) -> StoreResult<Wallet>;

    async fn wallet_by_owner(&self, owner_id: Uuid) -> StoreResult<Option<Wallet>>;

    /// Wallet history, newest first
    async fn transactions(&self, wallet_id: Uuid) -> StoreResult<Vec<Transaction>>;

    async fn bin(&self, bin_id: &str) -> StoreResult<Option<SmartBin>>;

    /// Fails with [`StoreError::Duplicate`] when the bin ID is taken
    async fn insert_bin(&self, bin: &SmartBin) -> StoreResult<()>;

    async fn task(&self, id: Uuid) -> StoreResult<Option<CollectionTask>>;

    async fn insert_task(&self, task: &CollectionTask) -> StoreResult<()>;

    /// Tasks ordered by scheduled date, latest first
    async fn list_tasks(&self, filter: &TaskFilter) -> StoreResult<Vec<CollectionTask>>;

    async fn price(
        &self,
        scope: Scope,
        waste_type: WasteType,
    ) -> StoreResult<Option<PriceConfiguration>>;

    async fn prices(&self, scope: Scope) -> StoreResult<Vec<PriceConfiguration>>;

    /// Insert or replace the price for `(scope, waste_type)`
    async fn upsert_price(&self, config: &PriceConfiguration) -> StoreResult<PriceConfiguration>;
}

/// Atomic, serializable read-modify-write scope
#[async_trait]
pub trait UnitOfWork: Send {
    /// Load and lock the owner's wallet
    async fn wallet_for_update(&mut self, owner_id: Uuid) -> StoreResult<Option<Wallet>>;

    async fn update_wallet(&mut self, wallet: &Wallet) -> StoreResult<()>;

    /// Fails with [`StoreError::Duplicate`] when the transaction ID is taken,
    /// leaving the unit of work usable.
    async fn insert_transaction(&mut self, transaction: &Transaction) -> StoreResult<()>;

    async fn bin_for_update(&mut self, bin_id: &str) -> StoreResult<Option<SmartBin>>;

    async fn update_bin(&mut self, bin: &SmartBin) -> StoreResult<()>;

    async fn task_for_update(&mut self, id: Uuid) -> StoreResult<Option<CollectionTask>>;

    /// Persist `task` only if the stored row is still at `expected_version`.
    /// Fails with [`StoreError::Conflict`] otherwise.
    async fn update_task(&mut self, task: &CollectionTask, expected_version: i64)
        -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
