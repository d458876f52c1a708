//! API routes. Fixed paths are matched before the `/:entity` catch-all.

use crate::handlers::{admins, auth, dashboard, entity};
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .route("/dashboard", get(dashboard::get))
        .route("/admins", get(admins::get).post(admins::post))
        .route("/:entity", get(entity::get).post(entity::post))
        .with_state(state)
}
