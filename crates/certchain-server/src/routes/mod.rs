//! API routes for the certchain server.

pub mod auth;
pub mod certificates;
pub mod directory;
pub mod ledger;
pub mod upload;

use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Creates the main API router with all routes mounted.
pub fn create_router(state: AppState) -> Router {
    Router::new().nest("/api/v1", api_v1_routes(state))
}

/// Creates the v1 API routes.
fn api_v1_routes(state: AppState) -> Router {
    Router::new()
        .nest("/auth", auth::router(state.clone()))
        .nest("/certificates", certificates::router(state.clone()))
        .nest("/companies", directory::companies_router(state.clone()))
        .nest("/regulators", directory::regulators_router(state.clone()))
        .nest("/ledger", ledger::router(state))
}

/// Success body: `{"success": true, ...fields of T}`.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(flatten)]
    pub body: T,
}

#[derive(Debug, Serialize)]
pub struct Data<T> {
    pub data: T,
}

pub fn envelope<T: Serialize>(body: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        body,
    })
}

/// `{"success": true, "data": ...}`
pub fn data<T: Serialize>(data: T) -> Json<Envelope<Data<T>>> {
    envelope(Data { data })
}
