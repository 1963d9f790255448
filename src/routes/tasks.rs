//! Collection task routes

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::app_state::AppState;
use crate::handlers::tasks;

pub fn task_routes() -> Router<AppState> {
    Router::new()
        .route("/api/tasks", get(tasks::list_tasks))
        .route("/api/tasks/collections", post(tasks::create_collection))
        .route("/api/tasks/recycling", post(tasks::create_recycling))
        .route("/api/tasks/:id", get(tasks::get_task))
        .route("/api/tasks/:id/assign", post(tasks::assign_task))
        .route("/api/tasks/:id/collect", post(tasks::collect_task))
        .route("/api/tasks/:id/verify", post(tasks::verify_task))
        .route("/api/tasks/:id/cancel", post(tasks::cancel_task))
        .route("/api/tasks/:id/quantity", put(tasks::update_quantity))
        .route("/api/tasks/:id/requote", post(tasks::requote_task))
}
