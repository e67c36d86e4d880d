//! Accounts, bearer tokens and request extractors.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::access::Principal;
use crate::error::AppError;
use crate::models::{NewCompany, NewRegulator, NewUser, User, UserRole};
use crate::state::AppState;
use crate::store::Store;

/// Access token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    /// User id
    pub sub: Uuid,
    pub role: UserRole,
    pub company_id: Option<Uuid>,
    pub regulator_id: Option<Uuid>,
    pub iat: i64,
    pub exp: i64,
}

impl From<Claims> for Principal {
    fn from(claims: Claims) -> Self {
        Principal {
            user_id: claims.sub,
            role: claims.role,
            company_id: claims.company_id,
            regulator_id: claims.regulator_id,
        }
    }
}

/// Issues and validates HS256 access tokens.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, ttl_minutes: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::minutes(ttl_minutes),
        }
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.ttl.num_seconds()
    }

    pub fn issue(&self, user: &User) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id,
            role: user.role,
            company_id: user.company_id,
            regulator_id: user.regulator_id,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))
    }

    pub fn validate(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedRef {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
    pub role: UserRole,
    #[serde(default)]
    pub company_id: Option<Uuid>,
    #[serde(default)]
    pub company: Option<NamedRef>,
    #[serde(default)]
    pub regulator_id: Option<Uuid>,
    #[serde(default)]
    pub regulator: Option<NamedRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: User,
}

pub struct AccountService {
    store: Arc<dyn Store>,
    tokens: Arc<TokenService>,
    bcrypt_cost: u32,
}

impl AccountService {
    pub fn new(store: Arc<dyn Store>, tokens: Arc<TokenService>) -> Self {
        Self::with_cost(store, tokens, DEFAULT_COST)
    }

    pub fn with_cost(store: Arc<dyn Store>, tokens: Arc<TokenService>, bcrypt_cost: u32) -> Self {
        Self {
            store,
            tokens,
            bcrypt_cost,
        }
    }

    async fn hash_password(&self, password: String) -> Result<String, AppError> {
        let cost = self.bcrypt_cost;
        tokio::task::spawn_blocking(move || hash(password, cost))
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
    }

    /// Creates an account. Company and regulator admins either reference an
    /// existing organisation or create one by name.
    pub async fn register(&self, req: RegisterRequest) -> Result<User, AppError> {
        let email = req.email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(AppError::BadRequest("A valid email is required".into()));
        }
        if req.password.len() < 8 {
            return Err(AppError::BadRequest(
                "Password must be at least 8 characters".into(),
            ));
        }
        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict("Email already registered".into()));
        }

        let (company_id, regulator_id) = match req.role {
            UserRole::SuperAdmin => {
                if self.store.count_users_with_role(UserRole::SuperAdmin).await? > 0 {
                    return Err(AppError::Conflict("Only one super_admin allowed".into()));
                }
                (None, None)
            }
            UserRole::CompanyAdmin => {
                let id = match (req.company_id, &req.company) {
                    (Some(id), _) => {
                        if self.store.get_companies(&[id]).await?.is_empty() {
                            return Err(AppError::NotFound("Provided companyId not found".into()));
                        }
                        id
                    }
                    (None, Some(company)) if !company.name.trim().is_empty() => {
                        self.store
                            .insert_company(NewCompany {
                                name: company.name.trim().to_string(),
                                ..Default::default()
                            })
                            .await?
                            .id
                    }
                    _ => {
                        return Err(AppError::BadRequest(
                            "company name required when companyId not provided".into(),
                        ))
                    }
                };
                (Some(id), None)
            }
            UserRole::RegulatorAdmin => {
                let id = match (req.regulator_id, &req.regulator) {
                    (Some(id), _) => {
                        if self.store.get_regulator(id).await?.is_none() {
                            return Err(AppError::NotFound(
                                "Provided regulatorId not found".into(),
                            ));
                        }
                        id
                    }
                    (None, Some(regulator)) if !regulator.name.trim().is_empty() => {
                        self.store
                            .insert_regulator(NewRegulator {
                                name: regulator.name.trim().to_string(),
                                ..Default::default()
                            })
                            .await?
                            .id
                    }
                    _ => {
                        return Err(AppError::BadRequest(
                            "regulator name required when regulatorId not provided".into(),
                        ))
                    }
                };
                (None, Some(id))
            }
        };

        let password_hash = self.hash_password(req.password).await?;
        let user = self
            .store
            .insert_user(NewUser {
                name: req.name.unwrap_or_else(|| email.clone()),
                email,
                password_hash,
                role: req.role,
                company_id,
                regulator_id,
            })
            .await?;

        info!(user_id = %user.id, role = user.role.as_str(), "User registered");
        Ok(user)
    }

    pub async fn login(&self, req: LoginRequest) -> Result<LoginResponse, AppError> {
        let email = req.email.trim().to_lowercase();
        let user = self
            .store
            .find_user_by_email(&email)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid credentials".into()))?;

        let password_hash = user.password_hash.clone();
        let valid = tokio::task::spawn_blocking(move || verify(req.password, &password_hash))
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?
            .unwrap_or(false);
        if !valid {
            warn!(user_id = %user.id, "Login rejected");
            return Err(AppError::Unauthorized("Invalid credentials".into()));
        }

        let access_token = self.tokens.issue(&user)?;
        info!(user_id = %user.id, "User logged in");
        Ok(LoginResponse {
            access_token,
            token_type: "Bearer",
            expires_in: self.tokens.ttl_seconds(),
            user,
        })
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Requires a valid bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Principal);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| AppError::Unauthorized("Missing bearer token".into()))?;
        let claims = state.tokens.validate(token)?;
        Ok(AuthUser(claims.into()))
    }
}

/// Accepts anonymous requests; an invalid token is treated as anonymous.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<Principal>);

impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let principal = bearer_token(parts)
            .and_then(|token| state.tokens.validate(token).ok())
            .map(Principal::from);
        Ok(MaybeAuthUser(principal))
    }
}
