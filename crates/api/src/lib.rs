//! HTTP API server for the group-buying engine.
//!
//! Exposes group, order, commission and audit endpoints, with structured
//! logging (tracing) and Prometheus metrics.

pub mod actor;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use audit_log::{AuditLogStore, AuditOutbox};
use axum::Router;
use axum::routing::{get, patch, post, put};
use domain::InMemoryMarketStore;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<A: AuditLogStore + 'static>(
    state: Arc<AppState<A>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    use routes::{audit, groups, orders, settings};

    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/groups", post(groups::create::<A>).get(groups::list::<A>))
        .route(
            "/groups/{id}",
            get(groups::get::<A>)
                .patch(groups::update_details::<A>)
                .delete(groups::delete::<A>),
        )
        .route("/groups/{id}/dates", patch(groups::update_dates::<A>))
        .route("/groups/{id}/confirm", post(groups::confirm::<A>))
        .route("/groups/{id}/cancel-confirm", post(groups::cancel_confirm::<A>))
        .route("/groups/{id}/shipping", post(groups::shipping::<A>))
        .route("/groups/{id}/complete", post(groups::complete::<A>))
        .route("/groups/{id}/delivery-stage", put(groups::delivery_stage::<A>))
        .route("/groups/{id}/orders", get(groups::orders::<A>))
        .route("/groups/{id}/my-orders", get(groups::my_orders::<A>))
        .route("/groups/{id}/settlement", get(groups::settlement::<A>))
        .route("/groups/{id}/visits", post(groups::record_visit::<A>))
        .route("/orders", post(orders::create::<A>))
        .route(
            "/orders/{id}",
            patch(orders::update::<A>).delete(orders::cancel::<A>),
        )
        .route("/orders/cancel-transaction", post(orders::cancel_transaction::<A>))
        .route(
            "/commissions/{organizer_id}",
            get(settings::get_organizer_rate::<A>)
                .put(settings::set_organizer_rate::<A>)
                .delete(settings::delete_organizer_rate::<A>),
        )
        .route(
            "/settings/commission",
            get(settings::get_default_rate::<A>).put(settings::set_default_rate::<A>),
        )
        .route(
            "/settings/recruitment",
            get(settings::get_recruitment::<A>).put(settings::set_recruitment::<A>),
        )
        .route("/audit-logs", get(audit::list::<A>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates application state over a fresh in-memory market store.
///
/// Audit entries are emitted into `audit`; `audit_log` serves the read side.
pub fn create_default_state<A: AuditLogStore + 'static>(
    audit: AuditOutbox,
    audit_log: A,
) -> Arc<AppState<A>> {
    Arc::new(AppState::new(InMemoryMarketStore::new(), audit, audit_log))
}
