//! Admin API for the mapping table.
//!
//! # Responsibilities
//! - Expose the ordered table as JSON (list, add, update, move, delete)
//! - Report gateway status for the management CLI
//! - Gate every endpoint behind the API key or an admin session
//!
//! # Design Decisions
//! - Every mutation goes through `MappingStore::edit`, so writes serialize
//!   and the next proxied request sees the result
//! - Rules are addressed by position; position is what routing depends on

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

/// Where the admin router is mounted.
pub const API_PREFIX: &str = "/_authgate/api";

pub fn admin_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/status", get(get_status))
        .route("/mappings", get(list_mappings).post(add_mapping))
        .route("/mappings/{index}", put(update_mapping).delete(delete_mapping))
        .route("/mappings/{index}/move", post(move_mapping))
        .route_layer(middleware::from_fn_with_state(state, admin_auth_middleware))
}
