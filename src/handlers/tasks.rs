//! Collection task HTTP handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::app_state::AppState;
use crate::collection::{
    AssignTaskRequest, CollectTaskRequest, CollectionTask, CreateCollectionRequest,
    CreateRecyclingRequest, ListTasksQuery, Settlement, TaskAssigned, UpdateQuantityRequest,
};
use crate::error::ApiError;
use crate::handlers::AuthenticatedUser;

/// POST /api/tasks/collections - Book a bin collection
pub async fn create_collection(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Json(req): Json<CreateCollectionRequest>,
) -> Result<(StatusCode, Json<CollectionTask>), ApiError> {
    req.validate()?;
    let task = state.workflow.create_collection(&principal, req).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// POST /api/tasks/recycling - Book a recycling pickup
pub async fn create_recycling(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Json(req): Json<CreateRecyclingRequest>,
) -> Result<(StatusCode, Json<CollectionTask>), ApiError> {
    req.validate()?;
    let task = state.workflow.create_recycling(&principal, req).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// GET /api/tasks - Tasks visible to the caller
pub async fn list_tasks(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<Vec<CollectionTask>>, ApiError> {
    Ok(Json(state.workflow.list(&principal, query).await?))
}

/// GET /api/tasks/:id
pub async fn get_task(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<CollectionTask>, ApiError> {
    Ok(Json(state.workflow.get(&principal, id).await?))
}

/// POST /api/tasks/:id/assign - Bind an agent and notify both parties
pub async fn assign_task(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<AssignTaskRequest>,
) -> Result<Json<CollectionTask>, ApiError> {
    let task = state.workflow.assign(&principal, id, req.agent_id).await?;
    if let Some(notice) = TaskAssigned::from_task(&task) {
        state.notifications.on_task_assigned(notice);
    }
    Ok(Json(task))
}

/// POST /api/tasks/:id/collect - Agent confirms the pickup
///
/// The body is optional; when present its `bin_id` must match the task's bin.
pub async fn collect_task(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(id): Path<Uuid>,
    body: Option<Json<CollectTaskRequest>>,
) -> Result<Json<CollectionTask>, ApiError> {
    let presented = body.and_then(|Json(req)| req.bin_id);
    let task = state
        .workflow
        .mark_collected(&principal, id, presented.as_deref())
        .await?;
    Ok(Json(task))
}

/// POST /api/tasks/:id/verify - Customer confirms and pays
pub async fn verify_task(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Settlement>, ApiError> {
    Ok(Json(state.workflow.verify(&principal, id).await?))
}

/// POST /api/tasks/:id/cancel
pub async fn cancel_task(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<CollectionTask>, ApiError> {
    Ok(Json(state.workflow.cancel(&principal, id).await?))
}

/// PUT /api/tasks/:id/quantity - Record the weighed quantity
pub async fn update_quantity(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateQuantityRequest>,
) -> Result<Json<CollectionTask>, ApiError> {
    let task = state
        .workflow
        .update_quantity(&principal, id, req.quantity_kg)
        .await?;
    Ok(Json(task))
}

/// POST /api/tasks/:id/requote - Re-price at the current rate
pub async fn requote_task(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<CollectionTask>, ApiError> {
    Ok(Json(state.workflow.requote(&principal, id).await?))
}
