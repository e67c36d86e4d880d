//! Company and regulator endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use uuid::Uuid;

use super::{data, Data, Envelope};
use crate::auth::AuthUser;
use crate::directory::{CreateCompany, CreateRegulator, DirectoryListQuery};
use crate::error::AppError;
use crate::models::{Company, Regulator};
use crate::state::AppState;

/// Creates the companies router.
pub fn companies_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(list_companies).post(create_company))
        .route("/{id}", get(get_company))
        .with_state(state)
}

/// Creates the regulators router.
pub fn regulators_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(list_regulators).post(create_regulator))
        .route("/{id}", get(get_regulator))
        .with_state(state)
}

/// POST /api/v1/companies
async fn create_company(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(req): Json<CreateCompany>,
) -> Result<(StatusCode, Json<Envelope<Data<Company>>>), AppError> {
    let company = state.directory.create_company(&principal, req).await?;
    Ok((StatusCode::CREATED, data(company)))
}

/// GET /api/v1/companies
async fn list_companies(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Query(query): Query<DirectoryListQuery>,
) -> Result<Json<Envelope<Data<Vec<Company>>>>, AppError> {
    Ok(data(state.directory.list_companies(&principal, query).await?))
}

/// GET /api/v1/companies/{id}
async fn get_company(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<Data<Company>>>, AppError> {
    Ok(data(state.directory.get_company(&principal, id).await?))
}

/// POST /api/v1/regulators
async fn create_regulator(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(req): Json<CreateRegulator>,
) -> Result<(StatusCode, Json<Envelope<Data<Regulator>>>), AppError> {
    let regulator = state.directory.create_regulator(&principal, req).await?;
    Ok((StatusCode::CREATED, data(regulator)))
}

/// GET /api/v1/regulators
async fn list_regulators(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Query(query): Query<DirectoryListQuery>,
) -> Result<Json<Envelope<Data<Vec<Regulator>>>>, AppError> {
    Ok(data(state.directory.list_regulators(&principal, query).await?))
}

/// GET /api/v1/regulators/{id}
async fn get_regulator(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<Data<Regulator>>>, AppError> {
    Ok(data(state.directory.get_regulator(&principal, id).await?))
}
