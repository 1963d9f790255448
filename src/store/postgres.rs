//! PostgreSQL store
//!
//! Units of work are database transactions; rows read "for update" stay
//! locked with `SELECT ... FOR UPDATE` until commit or rollback.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPool;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::{Store, StoreError, StoreResult, TaskFilter, UnitOfWork};
use crate::bins::SmartBin;
use crate::collection::{CollectionTask, PaymentStatus, TaskKind, TaskStatus};
use crate::ledger::{Transaction, Wallet};
use crate::models::{Municipality, User};
use crate::pricing::{PriceConfiguration, Scope, WasteType};

const TASK_COLUMNS: &str = "id, kind, bin_id, waste_type, quantity_kg, price_per_kg, \
     customer_id, agent_id, municipality_id, recycler_id, scheduled_date, collection_date, \
     status, amount, payment_status, notes, version, created_at, updated_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "task_kind", rename_all = "lowercase")]
enum TaskKindTag {
    Collection,
    Recycling,
}

/// `collection_tasks` row; the kind and scope are spread over nullable columns
#[derive(sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    kind: TaskKindTag,
    bin_id: Option<String>,
    waste_type: WasteType,
    quantity_kg: Option<Decimal>,
    price_per_kg: Option<Decimal>,
    customer_id: Uuid,
    agent_id: Option<Uuid>,
    municipality_id: Option<Uuid>,
    recycler_id: Option<Uuid>,
    scheduled_date: DateTime<Utc>,
    collection_date: Option<DateTime<Utc>>,
    status: TaskStatus,
    amount: Decimal,
    payment_status: PaymentStatus,
    notes: Option<String>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TaskRow> for CollectionTask {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let corrupt = |what: &str| StoreError::Corrupt(format!("task {}: {}", row.id, what));

        let kind = match row.kind {
            TaskKindTag::Collection => TaskKind::Collection {
                bin_id: row.bin_id.clone().ok_or_else(|| corrupt("missing bin_id"))?,
            },
            TaskKindTag::Recycling => TaskKind::Recycling {
                waste_type: row.waste_type,
                quantity_kg: row.quantity_kg.ok_or_else(|| corrupt("missing quantity"))?,
                price_per_kg: row.price_per_kg.ok_or_else(|| corrupt("missing rate"))?,
            },
        };
        let scope = Scope::from_columns(row.municipality_id, row.recycler_id)
            .ok_or_else(|| corrupt("needs exactly one scope column"))?;

        Ok(CollectionTask {
            id: row.id,
            kind,
            customer_id: row.customer_id,
            agent_id: row.agent_id,
            scope,
            scheduled_date: row.scheduled_date,
            collection_date: row.collection_date,
            status: row.status,
            amount: row.amount,
            payment_status: row.payment_status,
            notes: row.notes,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Column values for a task's kind: (tag, bin_id, waste_type, quantity, rate)
fn kind_columns(
    task: &CollectionTask,
) -> (TaskKindTag, Option<&str>, WasteType, Option<Decimal>, Option<Decimal>) {
    match &task.kind {
        TaskKind::Collection { bin_id } => (
            TaskKindTag::Collection,
            Some(bin_id.as_str()),
            WasteType::General,
            None,
            None,
        ),
        TaskKind::Recycling {
            waste_type,
            quantity_kg,
            price_per_kg,
        } => (
            TaskKindTag::Recycling,
            None,
            *waste_type,
            Some(*quantity_kg),
            Some(*price_per_kg),
        ),
    }
}

#[derive(sqlx::FromRow)]
struct PriceRow {
    id: Uuid,
    municipality_id: Option<Uuid>,
    recycler_id: Option<Uuid>,
    waste_type: WasteType,
    price: Decimal,
    unit: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PriceRow> for PriceConfiguration {
    type Error = StoreError;

    fn try_from(row: PriceRow) -> Result<Self, Self::Error> {
        let scope = Scope::from_columns(row.municipality_id, row.recycler_id).ok_or_else(|| {
            StoreError::Corrupt(format!("price {}: needs exactly one scope column", row.id))
        })?;
        Ok(PriceConfiguration {
            id: row.id,
            scope,
            waste_type: row.waste_type,
            price: row.price,
            unit: row.unit,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn municipality(&self, id: Uuid) -> StoreResult<Option<Municipality>> {
        let municipality =
            sqlx::query_as::<_, Municipality>("SELECT * FROM municipalities WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(municipality)
    }

    async fn open_wallet(&self, owner_id: Uuid) -> StoreResult<Wallet> {
        let fresh = Wallet::new(owner_id);
        sqlx::query(
            r#"
            INSERT INTO wallets (id, owner_id, balance, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (owner_id) DO NOTHING
            "#,
        )
        .bind(fresh.id)
        .bind(fresh.owner_id)
        .bind(fresh.balance)
        .bind(fresh.created_at)
        .bind(fresh.updated_at)
        .execute(&self.pool)
        .await?;

        let wallet = sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(wallet)
    }

    async fn wallet_by_owner(&self, owner_id: Uuid) -> StoreResult<Option<Wallet>> {
        let wallet = sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(wallet)
    }

    async fn transactions(&self, wallet_id: Uuid) -> StoreResult<Vec<Transaction>> {
        let transactions = sqlx::query_as::<_, Transaction>(
            "SELECT * FROM wallet_transactions WHERE wallet_id = $1 ORDER BY created_at DESC, seq DESC",
        )
        .bind(wallet_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(transactions)
    }

    async fn bin(&self, bin_id: &str) -> StoreResult<Option<SmartBin>> {
        let bin = sqlx::query_as::<_, SmartBin>("SELECT * FROM smart_bins WHERE bin_id = $1")
            .bind(bin_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(bin)
    }

    async fn insert_bin(&self, bin: &SmartBin) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO smart_bins (
                id, bin_id, customer_id, municipality_id, location, latitude, longitude,
                status, fill_percentage, last_collection_date, next_collection_date,
                is_linked, is_active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(bin.id)
        .bind(&bin.bin_id)
        .bind(bin.customer_id)
        .bind(bin.municipality_id)
        .bind(&bin.location)
        .bind(bin.latitude)
        .bind(bin.longitude)
        .bind(bin.status)
        .bind(bin.fill_percentage)
        .bind(bin.last_collection_date)
        .bind(bin.next_collection_date)
        .bind(bin.is_linked)
        .bind(bin.is_active)
        .bind(bin.created_at)
        .bind(bin.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn task(&self, id: Uuid) -> StoreResult<Option<CollectionTask>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {} FROM collection_tasks WHERE id = $1",
            TASK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(CollectionTask::try_from).transpose()
    }

    async fn insert_task(&self, task: &CollectionTask) -> StoreResult<()> {
        let (kind, bin_id, waste_type, quantity_kg, price_per_kg) = kind_columns(task);
        sqlx::query(&format!(
            "INSERT INTO collection_tasks ({}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)",
            TASK_COLUMNS
        ))
        .bind(task.id)
        .bind(kind)
        .bind(bin_id)
        .bind(waste_type)
        .bind(quantity_kg)
        .bind(price_per_kg)
        .bind(task.customer_id)
        .bind(task.agent_id)
        .bind(task.scope.municipality_id())
        .bind(task.scope.recycler_id())
        .bind(task.scheduled_date)
        .bind(task.collection_date)
        .bind(task.status)
        .bind(task.amount)
        .bind(task.payment_status)
        .bind(&task.notes)
        .bind(task.version)
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> StoreResult<Vec<CollectionTask>> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM collection_tasks WHERE TRUE",
            TASK_COLUMNS
        ));
        if let Some(customer_id) = filter.customer_id {
            query.push(" AND customer_id = ").push_bind(customer_id);
        }
        if let Some(agent_id) = filter.agent_id {
            query.push(" AND agent_id = ").push_bind(agent_id);
        }
        match filter.scope {
            Some(Scope::Municipality(id)) => {
                query.push(" AND municipality_id = ").push_bind(id);
            }
            Some(Scope::Recycler(id)) => {
                query.push(" AND recycler_id = ").push_bind(id);
            }
            None => {}
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status);
        }
        query.push(" ORDER BY scheduled_date DESC, created_at DESC");
        if filter.limit > 0 {
            query.push(" LIMIT ").push_bind(filter.limit);
        }
        query.push(" OFFSET ").push_bind(filter.offset.max(0));

        let rows = query
            .build_query_as::<TaskRow>()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(CollectionTask::try_from).collect()
    }

    async fn price(
        &self,
        scope: Scope,
        waste_type: WasteType,
    ) -> StoreResult<Option<PriceConfiguration>> {
        let row = sqlx::query_as::<_, PriceRow>(
            r#"
            SELECT * FROM price_configurations
            WHERE municipality_id IS NOT DISTINCT FROM $1
              AND recycler_id IS NOT DISTINCT FROM $2
              AND waste_type = $3
            "#,
        )
        .bind(scope.municipality_id())
        .bind(scope.recycler_id())
        .bind(waste_type)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PriceConfiguration::try_from).transpose()
    }

    async fn prices(&self, scope: Scope) -> StoreResult<Vec<PriceConfiguration>> {
        let rows = sqlx::query_as::<_, PriceRow>(
            r#"
            SELECT * FROM price_configurations
            WHERE municipality_id IS NOT DISTINCT FROM $1
              AND recycler_id IS NOT DISTINCT FROM $2
            ORDER BY waste_type::text
            "#,
        )
        .bind(scope.municipality_id())
        .bind(scope.recycler_id())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PriceConfiguration::try_from).collect()
    }

    async fn upsert_price(&self, config: &PriceConfiguration) -> StoreResult<PriceConfiguration> {
        // Each scope column has its own partial unique index
        let conflict_target = match config.scope {
            Scope::Municipality(_) => {
                "(municipality_id, waste_type) WHERE municipality_id IS NOT NULL"
            }
            Scope::Recycler(_) => "(recycler_id, waste_type) WHERE recycler_id IS NOT NULL",
        };
        let row = sqlx::query_as::<_, PriceRow>(&format!(
            r#"
            INSERT INTO price_configurations (
                id, municipality_id, recycler_id, waste_type, price, unit, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT {}
            DO UPDATE SET price = EXCLUDED.price, unit = EXCLUDED.unit, updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
            conflict_target
        ))
        .bind(config.id)
        .bind(config.scope.municipality_id())
        .bind(config.scope.recycler_id())
        .bind(config.waste_type)
        .bind(config.price)
        .bind(&config.unit)
        .bind(config.created_at)
        .bind(config.updated_at)
        .fetch_one(&self.pool)
        .await?;
        PriceConfiguration::try_from(row)
    }
}

struct PgUnitOfWork {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn wallet_for_update(&mut self, owner_id: Uuid) -> StoreResult<Option<Wallet>> {
        let wallet =
            sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE owner_id = $1 FOR UPDATE")
                .bind(owner_id)
                .fetch_optional(&mut *self.tx)
                .await?;
        Ok(wallet)
    }

    async fn update_wallet(&mut self, wallet: &Wallet) -> StoreResult<()> {
        sqlx::query("UPDATE wallets SET balance = $1, updated_at = $2 WHERE id = $3")
            .bind(wallet.balance)
            .bind(wallet.updated_at)
            .bind(wallet.id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_transaction(&mut self, transaction: &Transaction) -> StoreResult<()> {
        // DO NOTHING keeps the transaction usable after a collision
        let result = sqlx::query(
            r#"
            INSERT INTO wallet_transactions (
                id, transaction_id, wallet_id, entry_type, amount, description, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (transaction_id) DO NOTHING
            "#,
        )
        .bind(transaction.id)
        .bind(&transaction.transaction_id)
        .bind(transaction.wallet_id)
        .bind(transaction.entry_type)
        .bind(transaction.amount)
        .bind(&transaction.description)
        .bind(transaction.created_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Duplicate(transaction.transaction_id.clone()));
        }
        Ok(())
    }

    async fn bin_for_update(&mut self, bin_id: &str) -> StoreResult<Option<SmartBin>> {
        let bin =
            sqlx::query_as::<_, SmartBin>("SELECT * FROM smart_bins WHERE bin_id = $1 FOR UPDATE")
                .bind(bin_id)
                .fetch_optional(&mut *self.tx)
                .await?;
        Ok(bin)
    }

    async fn update_bin(&mut self, bin: &SmartBin) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE smart_bins
            SET customer_id = $1, status = $2, fill_percentage = $3,
                last_collection_date = $4, next_collection_date = $5,
                is_linked = $6, is_active = $7, updated_at = $8
            WHERE id = $9
            "#,
        )
        .bind(bin.customer_id)
        .bind(bin.status)
        .bind(bin.fill_percentage)
        .bind(bin.last_collection_date)
        .bind(bin.next_collection_date)
        .bind(bin.is_linked)
        .bind(bin.is_active)
        .bind(bin.updated_at)
        .bind(bin.id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn task_for_update(&mut self, id: Uuid) -> StoreResult<Option<CollectionTask>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {} FROM collection_tasks WHERE id = $1 FOR UPDATE",
            TASK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(CollectionTask::try_from).transpose()
    }

    async fn update_task(
        &mut self,
        task: &CollectionTask,
        expected_version: i64,
    ) -> StoreResult<()> {
        let (_, _, _, quantity_kg, price_per_kg) = kind_columns(task);
        let result = sqlx::query(
            r#"
            UPDATE collection_tasks
            SET agent_id = $1, collection_date = $2, status = $3, amount = $4,
                payment_status = $5, quantity_kg = $6, price_per_kg = $7, notes = $8,
                version = $9, updated_at = $10
            WHERE id = $11 AND version = $12
            "#,
        )
        .bind(task.agent_id)
        .bind(task.collection_date)
        .bind(task.status)
        .bind(task.amount)
        .bind(task.payment_status)
        .bind(quantity_kg)
        .bind(price_per_kg)
        .bind(&task.notes)
        .bind(task.version)
        .bind(task.updated_at)
        .bind(task.id)
        .bind(expected_version)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "task {} is no longer at version {}",
                task.id, expected_version
            )));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
