//! Application state shared across handlers

use axum::extract::FromRef;
use std::sync::Arc;

use crate::auth::AuthService;
use crate::bins::BinService;
use crate::collection::WorkflowService;
use crate::ledger::LedgerService;
use crate::notifications::NotificationDispatcher;
use crate::pricing::{PricingDefaults, PricingResolver};
use crate::store::Store;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub auth_service: Arc<AuthService>,
    pub ledger: Arc<LedgerService>,
    pub bins: Arc<BinService>,
    pub pricing: Arc<PricingResolver>,
    pub workflow: Arc<WorkflowService>,
    pub notifications: NotificationDispatcher,
    /// Shared key required from bin sensors, when configured
    pub ingest_key: Option<Arc<str>>,
}

impl AppState {
    /// Wire every service onto one store
    pub fn new(
        store: Arc<dyn Store>,
        auth_service: Arc<AuthService>,
        pricing_defaults: PricingDefaults,
        notifications: NotificationDispatcher,
        ingest_key: Option<String>,
    ) -> Self {
        let pricing = Arc::new(PricingResolver::new(store.clone(), pricing_defaults));
        Self {
            ledger: Arc::new(LedgerService::new(store.clone())),
            bins: Arc::new(BinService::new(store.clone())),
            workflow: Arc::new(WorkflowService::new(store.clone(), pricing.clone())),
            pricing,
            store,
            auth_service,
            notifications,
            ingest_key: ingest_key.map(Arc::from),
        }
    }
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.auth_service.clone()
    }
}
