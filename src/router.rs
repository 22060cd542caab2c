use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    routing::{delete, get, post, put},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;
use crate::handlers;

/// Build the application router with all routes
pub fn build(state: Arc<AppState>) -> Router {
    Router::new()
        // Device-facing protocol (OpenWrt agents)
        .route("/controller/register/", post(handlers::agent::register))
        .route("/controller/checksum/:uuid/", get(handlers::agent::checksum))
        .route("/controller/download-config/:uuid/", get(handlers::agent::download_config))
        .route("/controller/report-status/:uuid/", post(handlers::agent::report_status))
        .route("/controller/debug-config/:uuid/", get(handlers::agent::debug_config))
        // Device routes
        .route("/api/devices", get(handlers::devices::list_devices))
        .route("/api/devices/:uuid", get(handlers::devices::get_device))
        .route("/api/devices/:uuid", delete(handlers::devices::delete_device))
        .route("/api/devices/:uuid/status-history", get(handlers::devices::status_history))
        .route("/api/devices/:uuid/resolved-variables", get(handlers::devices::resolved_variables))
        .route("/api/devices/:uuid/resolved-templates", get(handlers::devices::resolved_templates))
        // Device template assignments and blocks
        .route("/api/devices/:uuid/templates", get(handlers::devices::list_assignments))
        .route("/api/devices/:uuid/templates", post(handlers::devices::assign_template))
        .route("/api/devices/:uuid/templates/reorder", put(handlers::devices::reorder_templates))
        .route("/api/devices/:uuid/templates/:id", delete(handlers::devices::unassign_template))
        .route("/api/devices/:uuid/blocks", get(handlers::devices::list_blocks))
        .route("/api/devices/:uuid/blocks/:id", put(handlers::devices::block_template))
        .route("/api/devices/:uuid/blocks/:id", delete(handlers::devices::unblock_template))
        // Device variables
        .route("/api/devices/:uuid/variables", get(handlers::variables::list_device_variables))
        .route("/api/devices/:uuid/variables", post(handlers::variables::set_device_variable))
        .route("/api/devices/:uuid/variables/:key", delete(handlers::variables::delete_device_variable))
        .route("/api/devices/:uuid/addresses", get(handlers::ipam::device_addresses))
        // Template routes
        .route("/api/templates", get(handlers::templates::list_templates))
        .route("/api/templates", post(handlers::templates::create_template))
        .route("/api/templates/:id", get(handlers::templates::get_template))
        .route("/api/templates/:id", put(handlers::templates::update_template))
        .route("/api/templates/:id", delete(handlers::templates::delete_template))
        // Group routes
        .route("/api/groups", get(handlers::groups::list_groups))
        .route("/api/groups", post(handlers::groups::create_group))
        .route("/api/groups/:id", get(handlers::groups::get_group))
        .route("/api/groups/:id", put(handlers::groups::update_group))
        .route("/api/groups/:id", delete(handlers::groups::delete_group))
        .route("/api/groups/:id/members", get(handlers::groups::list_members))
        .route("/api/groups/:id/members/:uuid", put(handlers::groups::add_member))
        .route("/api/groups/:id/members/:uuid", delete(handlers::groups::remove_member))
        .route("/api/groups/:id/variables", get(handlers::groups::list_variables))
        .route("/api/groups/:id/variables", post(handlers::groups::set_variable))
        .route("/api/groups/:id/variables/:key", delete(handlers::groups::delete_variable))
        .route("/api/groups/:id/templates", get(handlers::groups::list_assignments))
        .route("/api/groups/:id/templates", post(handlers::groups::assign_template))
        .route("/api/groups/:id/templates/:tid", delete(handlers::groups::unassign_template))
        .route("/api/groups/:id/prefix", get(handlers::ipam::group_prefix))
        // Global variables
        .route("/api/variables", get(handlers::variables::list_global_variables))
        .route("/api/variables", post(handlers::variables::set_global_variable))
        .route("/api/variables/:key", delete(handlers::variables::delete_global_variable))
        // IPAM routes
        .route("/api/ipam/prefixes", get(handlers::ipam::list_prefixes))
        .route("/api/ipam/prefixes", post(handlers::ipam::create_prefix))
        .route("/api/ipam/prefixes/:id", get(handlers::ipam::get_prefix))
        .route("/api/ipam/prefixes/:id", delete(handlers::ipam::delete_prefix))
        .route("/api/ipam/prefixes/:id/children", get(handlers::ipam::list_children))
        .route("/api/ipam/prefixes/:id/allocate", post(handlers::ipam::allocate_child))
        .route("/api/ipam/prefixes/:id/assign-group", post(handlers::ipam::assign_prefix_to_group))
        .route("/api/ipam/prefixes/:id/addresses", get(handlers::ipam::prefix_addresses))
        .route("/api/ipam/addresses", post(handlers::ipam::assign_address))
        .route("/api/ipam/addresses/:id", delete(handlers::ipam::release_address))
        // Health
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let db_ok = state.store.list_groups().await.is_ok();
    Json(serde_json::json!({"status": if db_ok { "ok" } else { "degraded" }}))
}
