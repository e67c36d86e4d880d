//! Account registration and login endpoints.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::Serialize;
use uuid::Uuid;

use super::{data, Data, Envelope};
use crate::auth::{LoginRequest, LoginResponse, RegisterRequest};
use crate::error::AppError;
use crate::models::UserRole;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredUser {
    pub user_id: Uuid,
    pub role: UserRole,
    pub company_id: Option<Uuid>,
    pub regulator_id: Option<Uuid>,
}

/// Creates the auth router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .with_state(state)
}

/// POST /api/v1/auth/register
async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Envelope<Data<RegisteredUser>>>), AppError> {
    let user = state.accounts.register(req).await?;
    Ok((
        StatusCode::CREATED,
        data(RegisteredUser {
            user_id: user.id,
            role: user.role,
            company_id: user.company_id,
            regulator_id: user.regulator_id,
        }),
    ))
}

/// POST /api/v1/auth/login
async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<Envelope<Data<LoginResponse>>>, AppError> {
    let tokens = state.accounts.login(req).await?;
    Ok(data(tokens))
}
