//! Workflow service layer - task creation, transitions and settlement

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use super::{
    CollectionTask, CreateCollectionRequest, CreateRecyclingRequest, ListTasksQuery, Settlement,
    TaskKind, TaskStatus, WorkflowError,
};
use crate::ledger::{post_transfer, MAX_AMOUNT};
use crate::models::{Principal, UserRole};
use crate::pricing::{PricingResolver, Scope, WasteType};
use crate::store::{Store, TaskFilter, UnitOfWork};

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

/// Largest weighable quantity per pickup, in kg
const MAX_QUANTITY_KG: i64 = 100_000;

/// Drives collection tasks through their lifecycle
#[derive(Clone)]
pub struct WorkflowService {
    store: Arc<dyn Store>,
    pricing: Arc<PricingResolver>,
}

impl WorkflowService {
    pub fn new(store: Arc<dyn Store>, pricing: Arc<PricingResolver>) -> Self {
        Self { store, pricing }
    }

    /// Book a pickup from a linked bin, priced at the municipality's fee
    pub async fn create_collection(
        &self,
        principal: &Principal,
        request: CreateCollectionRequest,
    ) -> Result<CollectionTask, WorkflowError> {
        let bin_id = request.bin_id.trim();
        let bin = self
            .store
            .bin(bin_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("bin {}", bin_id)))?;

        let customer_id = match bin.customer_id {
            Some(customer_id) if bin.is_linked && bin.is_active => customer_id,
            _ => {
                return Err(WorkflowError::InvalidInput(format!(
                    "bin {} is not linked to an active customer account",
                    bin.bin_id
                )))
            }
        };
        let is_owner = principal.user_id == customer_id;
        let is_municipality = principal.administered_municipality() == Some(bin.municipality_id);
        if !is_owner && !is_municipality && !principal.is_admin() {
            return Err(WorkflowError::Unauthorized(
                "only the bin's customer or municipality can book a collection".to_string(),
            ));
        }

        let quote = self
            .pricing
            .resolve(Scope::Municipality(bin.municipality_id), WasteType::General)
            .await?;
        let task = CollectionTask::collection(
            bin.bin_id,
            customer_id,
            bin.municipality_id,
            request.scheduled_date,
            quote.price,
            clean_notes(request.notes),
        );
        self.store.insert_task(&task).await?;

        tracing::info!(
            task_id = %task.id,
            bin_id = ?task.bin_id(),
            amount = %task.amount,
            price_source = ?quote.source,
            "Collection task created"
        );
        Ok(task)
    }

    /// Book a recycling pickup with an approved recycler at its current rate
    pub async fn create_recycling(
        &self,
        principal: &Principal,
        request: CreateRecyclingRequest,
    ) -> Result<CollectionTask, WorkflowError> {
        if principal.role != UserRole::Customer {
            return Err(WorkflowError::Unauthorized(
                "only customers request recycling pickups".to_string(),
            ));
        }
        let quantity_kg = check_quantity(request.quantity_kg)?;

        let recycler = self
            .store
            .user(request.recycler_id)
            .await?
            .filter(|user| user.role == UserRole::Recycler)
            .ok_or_else(|| WorkflowError::NotFound(format!("recycler {}", request.recycler_id)))?;
        if !recycler.is_approved {
            return Err(WorkflowError::InvalidInput(format!(
                "recycler {} is not approved",
                recycler.id
            )));
        }

        let quote = self
            .pricing
            .resolve(Scope::Recycler(recycler.id), request.waste_type)
            .await?;
        let task = CollectionTask::recycling(
            recycler.id,
            principal.user_id,
            request.waste_type,
            quantity_kg,
            quote.price,
            request.scheduled_date,
            clean_notes(request.notes),
        );
        check_priced(&task)?;
        self.store.insert_task(&task).await?;

        tracing::info!(
            task_id = %task.id,
            recycler_id = %recycler.id,
            waste_type = %request.waste_type,
            amount = %task.amount,
            price_source = ?quote.source,
            "Recycling task created"
        );
        Ok(task)
    }

    /// Bind an approved agent of the scope's municipality to a pending task
    pub async fn assign(
        &self,
        principal: &Principal,
        task_id: Uuid,
        agent_id: Uuid,
    ) -> Result<CollectionTask, WorkflowError> {
        let scope = self
            .store
            .task(task_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("task {}", task_id)))?
            .scope;
        if !owns_scope(principal, scope) {
            return Err(WorkflowError::Unauthorized(
                "only the task's municipality or recycler can assign agents".to_string(),
            ));
        }
        let agent = self
            .store
            .user(agent_id)
            .await?
            .ok_or_else(|| WorkflowError::InvalidAgent(format!("unknown user {}", agent_id)))?;

        let municipality_id = self.agent_municipality(scope).await?;
        if !agent.is_agent_of(municipality_id) {
            return Err(WorkflowError::InvalidAgent(format!(
                "user {} is not an approved agent of municipality {}",
                agent.id, municipality_id
            )));
        }

        // Lookups above stay outside the unit of work; the scope never changes.
        let mut uow = self.store.begin().await?;
        let mut task = lock_task(uow.as_mut(), task_id).await?;
        let expected_version = task.version;
        task.assign(agent.id)?;
        uow.update_task(&task, expected_version).await?;

        if let Some(bin_id) = task.bin_id() {
            if let Some(mut bin) = uow.bin_for_update(bin_id).await? {
                bin.next_collection_date = Some(task.scheduled_date);
                bin.updated_at = Utc::now();
                uow.update_bin(&bin).await?;
            }
        }
        uow.commit().await?;

        tracing::info!(task_id = %task.id, agent_id = %agent.id, "Task assigned");
        Ok(task)
    }

    /// Assigned agent confirms the pickup
    pub async fn mark_collected(
        &self,
        principal: &Principal,
        task_id: Uuid,
        presented_bin_id: Option<&str>,
    ) -> Result<CollectionTask, WorkflowError> {
        let mut uow = self.store.begin().await?;
        let mut task = lock_task(uow.as_mut(), task_id).await?;
        if task.agent_id.is_some_and(|agent| agent != principal.user_id) {
            return Err(WorkflowError::Unauthorized(
                "only the assigned agent can mark a task collected".to_string(),
            ));
        }

        let expected_version = task.version;
        if let Err(e) = task.mark_collected(presented_bin_id) {
            if matches!(e, WorkflowError::IdentityMismatch { .. }) {
                tracing::warn!(task_id = %task.id, error = %e, "Collection rejected");
            }
            return Err(e);
        }
        uow.update_task(&task, expected_version).await?;

        if let Some(bin_id) = task.bin_id() {
            if let Some(mut bin) = uow.bin_for_update(bin_id).await? {
                bin.last_collection_date = task.collection_date;
                bin.next_collection_date = None;
                bin.updated_at = Utc::now();
                uow.update_bin(&bin).await?;
            }
        }
        uow.commit().await?;

        tracing::info!(task_id = %task.id, agent_id = %principal.user_id, "Task collected");
        Ok(task)
    }

    /// Customer confirms the pickup and pays for it.
    ///
    /// The ledger transfer and the status change commit together; a failed
    /// payment leaves the task collected so verification can be retried.
    pub async fn verify(
        &self,
        principal: &Principal,
        task_id: Uuid,
    ) -> Result<Settlement, WorkflowError> {
        let snapshot = self
            .store
            .task(task_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("task {}", task_id)))?;
        if snapshot.customer_id != principal.user_id {
            return Err(WorkflowError::Unauthorized(
                "only the task's customer can verify it".to_string(),
            ));
        }
        let payee_id = self.payee(snapshot.scope).await?;
        self.store.open_wallet(snapshot.customer_id).await?;
        self.store.open_wallet(payee_id).await?;

        let mut uow = self.store.begin().await?;
        let mut task = lock_task(uow.as_mut(), task_id).await?;
        let expected_version = task.version;
        task.settle()?;

        let description = payment_description(&task);
        let transfer = match post_transfer(
            uow.as_mut(),
            task.customer_id,
            payee_id,
            task.amount,
            &description,
        )
        .await
        {
            Ok(transfer) => transfer,
            Err(e) => {
                tracing::warn!(task_id = %task.id, amount = %task.amount, error = %e, "Settlement failed");
                return Err(e.into());
            }
        };
        uow.update_task(&task, expected_version).await?;
        uow.commit().await?;

        tracing::info!(
            task_id = %task.id,
            amount = %task.amount,
            debit_id = %transfer.debit.transaction_id,
            credit_id = %transfer.credit.transaction_id,
            "Task verified and settled"
        );
        Ok(Settlement { task, transfer })
    }

    /// Withdraw a task before pickup. Nothing is charged.
    pub async fn cancel(
        &self,
        principal: &Principal,
        task_id: Uuid,
    ) -> Result<CollectionTask, WorkflowError> {
        let mut uow = self.store.begin().await?;
        let mut task = lock_task(uow.as_mut(), task_id).await?;
        if task.customer_id != principal.user_id && !owns_scope(principal, task.scope) {
            return Err(WorkflowError::Unauthorized(
                "only the task's customer or owner can cancel it".to_string(),
            ));
        }

        let was_assigned = task.status == TaskStatus::Assigned;
        let expected_version = task.version;
        task.cancel()?;
        uow.update_task(&task, expected_version).await?;

        if let (true, Some(bin_id)) = (was_assigned, task.bin_id()) {
            if let Some(mut bin) = uow.bin_for_update(bin_id).await? {
                if bin.next_collection_date == Some(task.scheduled_date) {
                    bin.next_collection_date = None;
                    bin.updated_at = Utc::now();
                    uow.update_bin(&bin).await?;
                }
            }
        }
        uow.commit().await?;

        tracing::info!(task_id = %task.id, "Task cancelled");
        Ok(task)
    }

    pub async fn get(
        &self,
        principal: &Principal,
        task_id: Uuid,
    ) -> Result<CollectionTask, WorkflowError> {
        let task = self
            .store
            .task(task_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("task {}", task_id)))?;
        if !is_party(principal, &task) {
            return Err(WorkflowError::Unauthorized(
                "task belongs to another account".to_string(),
            ));
        }
        Ok(task)
    }

    /// Tasks visible to the caller, latest scheduled first
    pub async fn list(
        &self,
        principal: &Principal,
        query: ListTasksQuery,
    ) -> Result<Vec<CollectionTask>, WorkflowError> {
        let mut filter = TaskFilter {
            status: query.status,
            ..TaskFilter::default()
        };
        match principal.role {
            UserRole::Customer => filter.customer_id = Some(principal.user_id),
            UserRole::Agent => filter.agent_id = Some(principal.user_id),
            UserRole::Recycler => filter.scope = Some(Scope::Recycler(principal.user_id)),
            UserRole::Municipality => {
                let municipality_id = principal.municipality_id.ok_or_else(|| {
                    WorkflowError::Unauthorized(
                        "account is not attached to a municipality".to_string(),
                    )
                })?;
                filter.scope = Some(Scope::Municipality(municipality_id));
            }
            UserRole::Admin => {}
        }

        let limit = query
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let page = query.page.unwrap_or(1).max(1);
        filter.limit = limit;
        filter.offset = (page - 1) * limit;

        Ok(self.store.list_tasks(&filter).await?)
    }

    /// Record the weighed quantity of a recycling pickup at its quoted rate.
    ///
    /// Only the scope owner or the assigned agent may weigh, and only before
    /// the pickup is marked collected.
    pub async fn update_quantity(
        &self,
        principal: &Principal,
        task_id: Uuid,
        quantity_kg: Decimal,
    ) -> Result<CollectionTask, WorkflowError> {
        let quantity_kg = check_quantity(quantity_kg)?;

        let mut uow = self.store.begin().await?;
        let mut task = lock_task(uow.as_mut(), task_id).await?;
        let is_weigher = task.agent_id == Some(principal.user_id);
        if !is_weigher && !owns_scope(principal, task.scope) {
            return Err(WorkflowError::Unauthorized(
                "only the task's recycler or assigned agent can record its quantity".to_string(),
            ));
        }
        let expected_version = task.version;
        task.update_quantity(quantity_kg)?;
        check_priced(&task)?;
        uow.update_task(&task, expected_version).await?;
        uow.commit().await?;

        tracing::info!(
            task_id = %task.id,
            quantity_kg = %quantity_kg,
            amount = %task.amount,
            "Task quantity updated"
        );
        Ok(task)
    }

    /// Re-price an unsettled task at the scope's current rate
    pub async fn requote(
        &self,
        principal: &Principal,
        task_id: Uuid,
    ) -> Result<CollectionTask, WorkflowError> {
        let current = self
            .store
            .task(task_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("task {}", task_id)))?;
        if !owns_scope(principal, current.scope) {
            return Err(WorkflowError::Unauthorized(
                "only the task's municipality or recycler can re-quote it".to_string(),
            ));
        }
        let quote = self
            .pricing
            .resolve(current.scope, current.waste_type())
            .await?;

        let mut uow = self.store.begin().await?;
        let mut task = lock_task(uow.as_mut(), task_id).await?;
        let previous = task.amount;
        let expected_version = task.version;
        task.requote(quote.price)?;
        check_priced(&task)?;
        uow.update_task(&task, expected_version).await?;
        uow.commit().await?;

        tracing::info!(
            task_id = %task.id,
            previous = %previous,
            amount = %task.amount,
            price_source = ?quote.source,
            "Task re-quoted"
        );
        Ok(task)
    }

    /// Municipality whose agents may serve the scope
    async fn agent_municipality(&self, scope: Scope) -> Result<Uuid, WorkflowError> {
        match scope {
            Scope::Municipality(id) => Ok(id),
            Scope::Recycler(recycler_id) => self
                .store
                .user(recycler_id)
                .await?
                .and_then(|recycler| recycler.municipality_id)
                .ok_or_else(|| {
                    WorkflowError::InvalidAgent(format!(
                        "recycler {} is not attached to a municipality",
                        recycler_id
                    ))
                }),
        }
    }

    /// Owner of the wallet that receives the task's payment
    async fn payee(&self, scope: Scope) -> Result<Uuid, WorkflowError> {
        match scope {
            Scope::Municipality(id) => self
                .store
                .municipality(id)
                .await?
                .map(|municipality| municipality.admin_user_id)
                .ok_or_else(|| WorkflowError::NotFound(format!("municipality {}", id))),
            Scope::Recycler(id) => Ok(id),
        }
    }
}

async fn lock_task(uow: &mut dyn UnitOfWork, task_id: Uuid) -> Result<CollectionTask, WorkflowError> {
    uow.task_for_update(task_id)
        .await?
        .ok_or_else(|| WorkflowError::NotFound(format!("task {}", task_id)))
}

/// Scope owner, or an admin acting for it
fn owns_scope(principal: &Principal, scope: Scope) -> bool {
    if principal.is_admin() {
        return true;
    }
    match scope {
        Scope::Municipality(id) => principal.administered_municipality() == Some(id),
        Scope::Recycler(id) => principal.role == UserRole::Recycler && principal.user_id == id,
    }
}

fn is_party(principal: &Principal, task: &CollectionTask) -> bool {
    task.customer_id == principal.user_id
        || task.agent_id == Some(principal.user_id)
        || owns_scope(principal, task.scope)
}

fn check_quantity(quantity_kg: Decimal) -> Result<Decimal, WorkflowError> {
    if quantity_kg <= Decimal::ZERO || quantity_kg > Decimal::from(MAX_QUANTITY_KG) {
        return Err(WorkflowError::InvalidInput(format!(
            "quantity must be between 0 and {} kg",
            MAX_QUANTITY_KG
        )));
    }
    Ok(quantity_kg.normalize())
}

/// Settlement needs a positive amount that fits a ledger posting
fn check_priced(task: &CollectionTask) -> Result<(), WorkflowError> {
    if task.amount <= Decimal::ZERO {
        return Err(WorkflowError::InvalidInput(
            "quantity is too small to be charged".to_string(),
        ));
    }
    if task.amount > MAX_AMOUNT {
        return Err(WorkflowError::InvalidInput(format!(
            "amount {} exceeds the maximum of {}",
            task.amount, MAX_AMOUNT
        )));
    }
    Ok(())
}

fn clean_notes(notes: Option<String>) -> Option<String> {
    notes
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
}

fn payment_description(task: &CollectionTask) -> String {
    match &task.kind {
        TaskKind::Collection { bin_id } => format!("Payment for waste collection - Bin {}", bin_id),
        TaskKind::Recycling {
            waste_type,
            quantity_kg,
            ..
        } => format!("Payment for recycling - {} {} kg", waste_type, quantity_kg),
    }
}
