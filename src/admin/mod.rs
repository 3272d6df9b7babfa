pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/attempts", get(get_attempts))
        .route("/admin/circuits/sweep", post(post_sweep))
        .layer(middleware::from_fn_with_state(state, admin_auth_middleware))
}
