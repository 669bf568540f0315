pub mod activities;
pub mod auth;
pub mod error;
pub mod lists;
pub mod middleware;
pub mod participation;

use axum::{
    Json, Router,
    routing::{delete, get, post},
};
use serde_json::{Value, json};

use crate::auth::AppState;
use crate::middleware::require_auth;

/// All HTTP routes. Everything except health and the auth endpoints
/// requires a bearer session token.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/lists", post(lists::create_list).get(lists::get_lists))
        .route("/lists/{list_id}", get(lists::get_list))
        .route("/lists/{list_id}/members", post(lists::add_member))
        .route("/lists/{list_id}/members/{member_id}", delete(lists::remove_member))
        .route(
            "/checkins",
            post(activities::create_activity).get(activities::open_activities),
        )
        .route("/checkins/created", get(activities::created_activities))
        .route("/checkins/history", get(activities::history))
        .route(
            "/checkins/{activity_id}",
            get(activities::get_activity).delete(activities::delete_activity),
        )
        .route("/checkins/{activity_id}/roster", get(activities::roster))
        .route("/checkins/{activity_id}/qrcode", get(activities::qrcode))
        .route("/checkins/{activity_id}/statistics", get(activities::statistics))
        .route("/checkins/{activity_id}/participate", post(participation::participate))
        .layer(axum::middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
