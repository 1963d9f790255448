//! In-process store used by tests and local development.
//!
//! A unit of work takes the single state lock and edits a staged copy, which
//! replaces the shared state on commit. Store reads made while a unit of work
//! is open wait for it to finish.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{Store, StoreError, StoreResult, TaskFilter, UnitOfWork};
use crate::bins::SmartBin;
use crate::collection::CollectionTask;
use crate::ledger::{Transaction, Wallet};
use crate::models::{Municipality, User};
use crate::pricing::{PriceConfiguration, Scope, WasteType};

#[derive(Debug, Clone, Default)]
struct State {
    users: HashMap<Uuid, User>,
    municipalities: HashMap<Uuid, Municipality>,
    /// Keyed by owner
    wallets: HashMap<Uuid, Wallet>,
    transactions: Vec<Transaction>,
    bins: HashMap<String, SmartBin>,
    tasks: HashMap<Uuid, CollectionTask>,
    prices: HashMap<(Scope, WasteType), PriceConfiguration>,
}

impl State {
    fn insert_transaction(&mut self, transaction: &Transaction) -> StoreResult<()> {
        if self
            .transactions
            .iter()
            .any(|t| t.transaction_id == transaction.transaction_id)
        {
            return Err(StoreError::Duplicate(transaction.transaction_id.clone()));
        }
        self.transactions.push(transaction.clone());
        Ok(())
    }

    fn update_task(&mut self, task: &CollectionTask, expected_version: i64) -> StoreResult<()> {
        match self.tasks.get_mut(&task.id) {
            Some(stored) if stored.version == expected_version => {
                *stored = task.clone();
                Ok(())
            }
            Some(_) => Err(StoreError::Conflict(format!("task {}", task.id))),
            None => Err(StoreError::Database(format!("task {} does not exist", task.id))),
        }
    }
}

/// Store backed by process memory
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a directory user
    pub async fn insert_user(&self, user: User) {
        self.state.lock().await.users.insert(user.id, user);
    }

    /// Seed a municipality
    pub async fn insert_municipality(&self, municipality: Municipality) {
        self.state
            .lock()
            .await
            .municipalities
            .insert(municipality.id, municipality);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryUnitOfWork { guard, staged }))
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn municipality(&self, id: Uuid) -> StoreResult<Option<Municipality>> {
        Ok(self.state.lock().await.municipalities.get(&id).cloned())
    }

    async fn open_wallet(&self, owner_id: Uuid) -> StoreResult<Wallet> {
        let mut state = self.state.lock().await;
        let wallet = state
            .wallets
            .entry(owner_id)
            .or_insert_with(|| Wallet::new(owner_id));
        Ok(wallet.clone())
    }

    async fn wallet_by_owner(&self, owner_id: Uuid) -> StoreResult<Option<Wallet>> {
        Ok(self.state.lock().await.wallets.get(&owner_id).cloned())
    }

    async fn transactions(&self, wallet_id: Uuid) -> StoreResult<Vec<Transaction>> {
        let state = self.state.lock().await;
        // Appended in posting order
        Ok(state
            .transactions
            .iter()
            .rev()
            .filter(|t| t.wallet_id == wallet_id)
            .cloned()
            .collect())
    }

    async fn bin(&self, bin_id: &str) -> StoreResult<Option<SmartBin>> {
        Ok(self.state.lock().await.bins.get(bin_id).cloned())
    }

    async fn insert_bin(&self, bin: &SmartBin) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if state.bins.contains_key(&bin.bin_id) {
            return Err(StoreError::Duplicate(bin.bin_id.clone()));
        }
        state.bins.insert(bin.bin_id.clone(), bin.clone());
        Ok(())
    }

    async fn task(&self, id: Uuid) -> StoreResult<Option<CollectionTask>> {
        Ok(self.state.lock().await.tasks.get(&id).cloned())
    }

    async fn insert_task(&self, task: &CollectionTask) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if state.tasks.contains_key(&task.id) {
            return Err(StoreError::Duplicate(task.id.to_string()));
        }
        state.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> StoreResult<Vec<CollectionTask>> {
        let state = self.state.lock().await;
        let mut tasks: Vec<CollectionTask> = state
            .tasks
            .values()
            .filter(|t| filter.customer_id.map_or(true, |id| t.customer_id == id))
            .filter(|t| filter.agent_id.map_or(true, |id| t.agent_id == Some(id)))
            .filter(|t| filter.scope.map_or(true, |scope| t.scope == scope))
            .filter(|t| filter.status.map_or(true, |status| t.status == status))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| {
            b.scheduled_date
                .cmp(&a.scheduled_date)
                .then(b.created_at.cmp(&a.created_at))
        });

        let offset = usize::try_from(filter.offset).unwrap_or(0);
        let limit = match usize::try_from(filter.limit) {
            Ok(limit) if limit > 0 => limit,
            _ => usize::MAX,
        };
        Ok(tasks.into_iter().skip(offset).take(limit).collect())
    }

    async fn price(
        &self,
        scope: Scope,
        waste_type: WasteType,
    ) -> StoreResult<Option<PriceConfiguration>> {
        Ok(self
            .state
            .lock()
            .await
            .prices
            .get(&(scope, waste_type))
            .cloned())
    }

    async fn prices(&self, scope: Scope) -> StoreResult<Vec<PriceConfiguration>> {
        let state = self.state.lock().await;
        let mut prices: Vec<PriceConfiguration> = state
            .prices
            .values()
            .filter(|p| p.scope == scope)
            .cloned()
            .collect();
        prices.sort_by_key(|p| p.waste_type.as_str());
        Ok(prices)
    }

    async fn upsert_price(&self, config: &PriceConfiguration) -> StoreResult<PriceConfiguration> {
        let mut state = self.state.lock().await;
        let saved = match state.prices.get_mut(&(config.scope, config.waste_type)) {
            Some(existing) => {
                existing.price = config.price;
                existing.unit = config.unit.clone();
                existing.updated_at = Utc::now();
                existing.clone()
            }
            None => {
                state
                    .prices
                    .insert((config.scope, config.waste_type), config.clone());
                config.clone()
            }
        };
        Ok(saved)
    }
}

struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<State>,
    staged: State,
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn wallet_for_update(&mut self, owner_id: Uuid) -> StoreResult<Option<Wallet>> {
        Ok(self.staged.wallets.get(&owner_id).cloned())
    }

    async fn update_wallet(&mut self, wallet: &Wallet) -> StoreResult<()> {
        self.staged.wallets.insert(wallet.owner_id, wallet.clone());
        Ok(())
    }

    async fn insert_transaction(&mut self, transaction: &Transaction) -> StoreResult<()> {
        self.staged.insert_transaction(transaction)
    }

    async fn bin_for_update(&mut self, bin_id: &str) -> StoreResult<Option<SmartBin>> {
        Ok(self.staged.bins.get(bin_id).cloned())
    }

    async fn update_bin(&mut self, bin: &SmartBin) -> StoreResult<()> {
        self.staged.bins.insert(bin.bin_id.clone(), bin.clone());
        Ok(())
    }

    async fn task_for_update(&mut self, id: Uuid) -> StoreResult<Option<CollectionTask>> {
        Ok(self.staged.tasks.get(&id).cloned())
    }

    async fn update_task(
        &mut self,
        task: &CollectionTask,
        expected_version: i64,
    ) -> StoreResult<()> {
        self.staged.update_task(task, expected_version)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryUnitOfWork { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::EntryType;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_dropped_unit_of_work_discards_writes() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        store.open_wallet(owner).await.unwrap();

        {
            let mut uow = store.begin().await.unwrap();
            let mut wallet = uow.wallet_for_update(owner).await.unwrap().unwrap();
            wallet.balance = dec!(10.00);
            uow.update_wallet(&wallet).await.unwrap();
        }

        let wallet = store.wallet_by_owner(owner).await.unwrap().unwrap();
        assert_eq!(wallet.balance, dec!(0));
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let wallet = store.open_wallet(owner).await.unwrap();

        let mut uow = store.begin().await.unwrap();
        let transaction = Transaction::new(wallet.id, EntryType::Credit, dec!(5.00), "test");
        uow.insert_transaction(&transaction).await.unwrap();
        assert!(matches!(
            uow.insert_transaction(&transaction).await,
            Err(StoreError::Duplicate(_))
        ));
        uow.commit().await.unwrap();

        assert_eq!(store.transactions(wallet.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_open_wallet_is_idempotent() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let first = store.open_wallet(owner).await.unwrap();
        let second = store.open_wallet(owner).await.unwrap();
        assert_eq!(first.id, second.id);
    }
}
