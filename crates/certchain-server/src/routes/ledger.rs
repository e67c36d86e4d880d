//! Ledger proxy endpoints: thin pass-throughs to the contract with audit
//! logging for every state-changing call.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::upload::parse_signer;
use super::{data, Data, Envelope};
use crate::auth::MaybeAuthUser;
use crate::error::AppError;
use crate::ledger::Receipt;
use crate::ledger_admin::{Wallet, WhitelistStatus};
use crate::state::AppState;

/// Creates the ledger proxy router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/store_document", post(store_document))
        .route("/verify/{hash}", get(verify_document))
        .route("/read/{hash}", get(read_document))
        .route("/is_whitelisted/{address}", get(is_whitelisted))
        .route("/whitelist", post(whitelist))
        .route("/remove_whitelist", post(remove_whitelist))
        .route("/owner", get(owner))
        .route("/transfer_ownership", post(transfer_ownership))
        .route("/init", post(init_contract))
        .route("/helpers/create_wallet", post(create_wallet))
        .route("/helpers/fund_wallet", post(fund_wallet))
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct TxBody {
    pub tx: Receipt,
}

#[derive(Debug, Serialize)]
pub struct DocumentBody {
    pub document: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreDocumentRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub hash: String,
    pub signer_secret: Option<String>,
}

/// POST /api/v1/ledger/store_document
async fn store_document(
    State(state): State<AppState>,
    MaybeAuthUser(principal): MaybeAuthUser,
    Json(req): Json<StoreDocumentRequest>,
) -> Result<Json<Envelope<Data<TxBody>>>, AppError> {
    let signer = parse_signer(req.signer_secret.as_deref())?;
    let tx = state
        .ledger_admin
        .store_document(principal.as_ref(), &req.name, &req.hash, signer)
        .await?;
    Ok(data(TxBody { tx }))
}

/// GET /api/v1/ledger/verify/{hash}
async fn verify_document(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<Envelope<Data<DocumentBody>>>, AppError> {
    let document = state.ledger_admin.verify_document(&hash, None).await?;
    Ok(data(DocumentBody { document }))
}

/// GET /api/v1/ledger/read/{hash}
async fn read_document(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<Envelope<Data<DocumentBody>>>, AppError> {
    let document = state.ledger_admin.read_document(&hash).await?;
    Ok(data(DocumentBody { document }))
}

/// GET /api/v1/ledger/is_whitelisted/{address}
async fn is_whitelisted(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<Envelope<Data<WhitelistStatus>>>, AppError> {
    let status = state.ledger_admin.is_whitelisted(&address).await?;
    Ok(data(status))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressRequest {
    #[serde(default)]
    pub address: String,
    pub signer_secret: Option<String>,
}

fn required_address(address: &str, field: &str) -> Result<(), AppError> {
    if address.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{} required", field)));
    }
    Ok(())
}

/// POST /api/v1/ledger/whitelist
async fn whitelist(
    State(state): State<AppState>,
    MaybeAuthUser(principal): MaybeAuthUser,
    Json(req): Json<AddressRequest>,
) -> Result<Json<Envelope<Data<TxBody>>>, AppError> {
    let signer = parse_signer(req.signer_secret.as_deref())?;
    required_address(&req.address, "address")?;
    let tx = state
        .ledger_admin
        .whitelist(principal.as_ref(), req.address.trim(), signer)
        .await?;
    Ok(data(TxBody { tx }))
}

/// POST /api/v1/ledger/remove_whitelist
async fn remove_whitelist(
    State(state): State<AppState>,
    MaybeAuthUser(principal): MaybeAuthUser,
    Json(req): Json<AddressRequest>,
) -> Result<Json<Envelope<Data<TxBody>>>, AppError> {
    let signer = parse_signer(req.signer_secret.as_deref())?;
    required_address(&req.address, "address")?;
    let tx = state
        .ledger_admin
        .remove_whitelist(principal.as_ref(), req.address.trim(), signer)
        .await?;
    Ok(data(TxBody { tx }))
}

#[derive(Debug, Serialize)]
pub struct OwnerBody {
    pub owner: Option<String>,
}

/// GET /api/v1/ledger/owner
async fn owner(State(state): State<AppState>) -> Result<Json<Envelope<Data<OwnerBody>>>, AppError> {
    let owner = state.ledger_admin.owner().await?;
    Ok(data(OwnerBody { owner }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    #[serde(default)]
    pub new_owner: String,
    pub signer_secret: Option<String>,
}

/// POST /api/v1/ledger/transfer_ownership
async fn transfer_ownership(
    State(state): State<AppState>,
    MaybeAuthUser(principal): MaybeAuthUser,
    Json(req): Json<TransferRequest>,
) -> Result<Json<Envelope<Data<TxBody>>>, AppError> {
    let signer = parse_signer(req.signer_secret.as_deref())?;
    required_address(&req.new_owner, "newOwner")?;
    let tx = state
        .ledger_admin
        .transfer_ownership(principal.as_ref(), req.new_owner.trim(), signer)
        .await?;
    Ok(data(TxBody { tx }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitRequest {
    pub owner: Option<String>,
    pub signer_secret: Option<String>,
}

/// POST /api/v1/ledger/init
async fn init_contract(
    State(state): State<AppState>,
    MaybeAuthUser(principal): MaybeAuthUser,
    body: Option<Json<InitRequest>>,
) -> Result<Json<Envelope<Data<TxBody>>>, AppError> {
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let signer = parse_signer(req.signer_secret.as_deref())?;
    let tx = state
        .ledger_admin
        .init(principal.as_ref(), req.owner, signer)
        .await?;
    Ok(data(TxBody { tx }))
}

#[derive(Debug, Serialize)]
pub struct WalletBody {
    pub wallet: Wallet,
}

/// POST /api/v1/ledger/helpers/create_wallet
async fn create_wallet(State(state): State<AppState>) -> Json<Envelope<Data<WalletBody>>> {
    let wallet = state.ledger_admin.create_wallet();
    data(WalletBody { wallet })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundRequest {
    #[serde(default, alias = "address")]
    pub public_key: String,
}

#[derive(Debug, Serialize)]
pub struct FundBody {
    pub result: Value,
}

/// POST /api/v1/ledger/helpers/fund_wallet
async fn fund_wallet(
    State(state): State<AppState>,
    Json(req): Json<FundRequest>,
) -> Result<Json<Envelope<Data<FundBody>>>, AppError> {
    required_address(&req.public_key, "publicKey")?;
    let result = state.ledger_admin.fund_wallet(req.public_key.trim()).await?;
    Ok(data(FundBody { result }))
}
