//! Collection task models and lifecycle transitions

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use super::WorkflowError;
use crate::ledger::Transfer;
use crate::pricing::{recycling_total, Scope, WasteType};

/// Task lifecycle status
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "task_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,   // Created, waiting for an agent
    Assigned,  // Agent bound
    Collected, // Agent confirmed pickup
    Verified,  // Customer confirmed and paid
    Cancelled, // Withdrawn before pickup
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Assigned => "assigned",
            TaskStatus::Collected => "collected",
            TaskStatus::Verified => "verified",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

/// Settlement status of a task's charge
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    /// Task cancelled; nothing will be charged
    Void,
}

/// What is being picked up
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TaskKind {
    /// Municipal pickup from a smart bin
    Collection { bin_id: String },
    /// Recycler pickup priced by weight at the rate quoted at booking
    Recycling {
        waste_type: WasteType,
        quantity_kg: Decimal,
        price_per_kg: Decimal,
    },
}

/// Collection or recycling task
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CollectionTask {
    pub id: Uuid,
    #[serde(flatten)]
    pub kind: TaskKind,
    pub customer_id: Uuid,
    pub agent_id: Option<Uuid>,
    pub scope: Scope,
    pub scheduled_date: DateTime<Utc>,
    pub collection_date: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub amount: Decimal,
    pub payment_status: PaymentStatus,
    pub notes: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CollectionTask {
    fn new(
        kind: TaskKind,
        customer_id: Uuid,
        scope: Scope,
        scheduled_date: DateTime<Utc>,
        amount: Decimal,
        notes: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            customer_id,
            agent_id: None,
            scope,
            scheduled_date,
            collection_date: None,
            status: TaskStatus::Pending,
            amount,
            payment_status: PaymentStatus::Pending,
            notes,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Bin pickup priced at the municipality's collection fee
    pub fn collection(
        bin_id: String,
        customer_id: Uuid,
        municipality_id: Uuid,
        scheduled_date: DateTime<Utc>,
        fee: Decimal,
        notes: Option<String>,
    ) -> Self {
        Self::new(
            TaskKind::Collection { bin_id },
            customer_id,
            Scope::Municipality(municipality_id),
            scheduled_date,
            fee,
            notes,
        )
    }

    /// Recycling pickup; the amount is fixed from the quoted rate
    pub fn recycling(
        recycler_id: Uuid,
        customer_id: Uuid,
        waste_type: WasteType,
        quantity_kg: Decimal,
        price_per_kg: Decimal,
        scheduled_date: DateTime<Utc>,
        notes: Option<String>,
    ) -> Self {
        Self::new(
            TaskKind::Recycling {
                waste_type,
                quantity_kg,
                price_per_kg,
            },
            customer_id,
            Scope::Recycler(recycler_id),
            scheduled_date,
            recycling_total(quantity_kg, price_per_kg),
            notes,
        )
    }

    pub fn bin_id(&self) -> Option<&str> {
        match &self.kind {
            TaskKind::Collection { bin_id } => Some(bin_id),
            TaskKind::Recycling { .. } => None,
        }
    }

    pub fn waste_type(&self) -> WasteType {
        match &self.kind {
            TaskKind::Collection { .. } => WasteType::General,
            TaskKind::Recycling { waste_type, .. } => *waste_type,
        }
    }

    /// Charge has not been settled and can still change
    pub fn is_unsettled(&self) -> bool {
        matches!(
            self.status,
            TaskStatus::Pending | TaskStatus::Assigned | TaskStatus::Collected
        )
    }

    fn expect_status(&self, expected: TaskStatus, action: &'static str) -> Result<(), WorkflowError> {
        if self.status != expected {
            return Err(self.invalid_state(action));
        }
        Ok(())
    }

    fn invalid_state(&self, action: &'static str) -> WorkflowError {
        WorkflowError::InvalidState {
            task_id: self.id,
            status: self.status,
            action,
        }
    }

    fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }

    /// pending → assigned
    pub fn assign(&mut self, agent_id: Uuid) -> Result<(), WorkflowError> {
        self.expect_status(TaskStatus::Pending, "assign")?;
        self.agent_id = Some(agent_id);
        self.status = TaskStatus::Assigned;
        self.touch();
        Ok(())
    }

    /// assigned → collected. Bin pickups must present the task's bin ID.
    pub fn mark_collected(&mut self, presented_bin_id: Option<&str>) -> Result<(), WorkflowError> {
        self.expect_status(TaskStatus::Assigned, "mark collected")?;
        if let TaskKind::Collection { bin_id } = &self.kind {
            let presented = presented_bin_id.map(str::trim).unwrap_or_default();
            if presented != bin_id {
                return Err(WorkflowError::IdentityMismatch {
                    expected: bin_id.clone(),
                    presented: presented.to_string(),
                });
            }
        }
        self.status = TaskStatus::Collected;
        self.collection_date = Some(Utc::now());
        self.touch();
        Ok(())
    }

    /// collected → verified, once the charge has been transferred
    pub fn settle(&mut self) -> Result<(), WorkflowError> {
        self.expect_status(TaskStatus::Collected, "verify")?;
        self.status = TaskStatus::Verified;
        self.payment_status = PaymentStatus::Paid;
        self.touch();
        Ok(())
    }

    /// pending|assigned → cancelled
    pub fn cancel(&mut self) -> Result<(), WorkflowError> {
        if !matches!(self.status, TaskStatus::Pending | TaskStatus::Assigned) {
            return Err(self.invalid_state("cancel"));
        }
        self.status = TaskStatus::Cancelled;
        self.payment_status = PaymentStatus::Void;
        self.touch();
        Ok(())
    }

    /// Change the weighed quantity of a recycling pickup before it is collected,
    /// keeping the quoted rate
    pub fn update_quantity(&mut self, quantity_kg: Decimal) -> Result<(), WorkflowError> {
        if !matches!(self.status, TaskStatus::Pending | TaskStatus::Assigned) {
            return Err(self.invalid_state("update quantity"));
        }
        match &mut self.kind {
            TaskKind::Recycling {
                quantity_kg: current,
                price_per_kg,
                ..
            } => {
                *current = quantity_kg;
                self.amount = recycling_total(quantity_kg, *price_per_kg);
            }
            TaskKind::Collection { .. } => {
                return Err(WorkflowError::InvalidInput(
                    "bin collections have no quantity".to_string(),
                ))
            }
        }
        self.touch();
        Ok(())
    }

    /// Re-price at a freshly resolved rate
    pub fn requote(&mut self, price: Decimal) -> Result<(), WorkflowError> {
        if !self.is_unsettled() {
            return Err(self.invalid_state("requote"));
        }
        match &mut self.kind {
            TaskKind::Recycling {
                quantity_kg,
                price_per_kg,
                ..
            } => {
                *price_per_kg = price;
                self.amount = recycling_total(*quantity_kg, price);
            }
            TaskKind::Collection { .. } => self.amount = price,
        }
        self.touch();
        Ok(())
    }
}

/// Verified task together with the ledger transfer that paid for it
#[derive(Debug, Serialize, Clone)]
pub struct Settlement {
    pub task: CollectionTask,
    pub transfer: Transfer,
}

/// Notice that an agent has been bound to a task
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct TaskAssigned {
    pub task_id: Uuid,
    pub customer_id: Uuid,
    pub agent_id: Uuid,
    pub bin_id: Option<String>,
    pub scheduled_date: DateTime<Utc>,
}

impl TaskAssigned {
    pub fn from_task(task: &CollectionTask) -> Option<Self> {
        task.agent_id.map(|agent_id| Self {
            task_id: task.id,
            customer_id: task.customer_id,
            agent_id,
            bin_id: task.bin_id().map(str::to_string),
            scheduled_date: task.scheduled_date,
        })
    }
}

// ============================================================================
// Request DTOs
// ============================================================================

/// Request DTO for booking a bin collection
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCollectionRequest {
    #[validate(length(min = 1, max = 50))]
    pub bin_id: String,
    pub scheduled_date: DateTime<Utc>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

/// Request DTO for booking a recycling pickup
#[derive(Debug, Deserialize, Validate)]
pub struct CreateRecyclingRequest {
    pub recycler_id: Uuid,
    pub waste_type: WasteType,
    pub quantity_kg: Decimal,
    pub scheduled_date: DateTime<Utc>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignTaskRequest {
    pub agent_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct CollectTaskRequest {
    pub bin_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity_kg: Decimal,
}

/// Query parameters for listing tasks
#[derive(Debug, Deserialize)]
pub struct ListTasksQuery {
    pub status: Option<TaskStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}
