//! Companies and regulators.
//!
//! Super admins register organisations; admins browse them to find the ids
//! used when registering accounts and filtering certificate listings.
//! Company admins only ever see their own company.

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::access::{authorize, scoped_company, Action, Principal, Resource};
use crate::error::AppError;
use crate::models::{Company, NewCompany, NewRegulator, Regulator};
use crate::store::{clamp_paging, DirectoryQuery, Store};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCompany {
    pub name: String,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub contact_phone: Option<String>,
    #[serde(default)]
    pub wallet_address: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRegulator {
    pub name: String,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub wallet_address: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectoryListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    #[serde(alias = "search")]
    pub q: Option<String>,
}

impl DirectoryListQuery {
    fn resolve(self) -> DirectoryQuery {
        let (page, limit) = clamp_paging(self.page, self.limit, 50);
        DirectoryQuery {
            search: self.q,
            page,
            limit,
        }
    }
}

fn required_name(name: &str, what: &str) -> Result<String, AppError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(format!("{} name is required", what)));
    }
    Ok(trimmed.to_string())
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Normalizes an optional ledger address, rejecting anything that does not
/// decode to a public key.
fn wallet_address(value: Option<String>) -> Result<Option<String>, AppError> {
    match optional_text(value) {
        Some(address) => {
            certchain_crypto::address_to_verifying_key(&address)
                .map_err(|e| AppError::BadRequest(format!("Invalid walletAddress: {}", e)))?;
            Ok(Some(address))
        }
        None => Ok(None),
    }
}

pub struct DirectoryService {
    store: Arc<dyn Store>,
}

impl DirectoryService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create_company(
        &self,
        actor: &Principal,
        input: CreateCompany,
    ) -> Result<Company, AppError> {
        authorize(Some(actor), Action::ManageCompanies, Resource::Global)?;
        let company = self
            .store
            .insert_company(NewCompany {
                name: required_name(&input.name, "Company")?,
                contact_email: optional_text(input.contact_email),
                contact_phone: optional_text(input.contact_phone),
                wallet_address: wallet_address(input.wallet_address)?,
            })
            .await?;

        info!(company_id = %company.id, user_id = %actor.user_id, "Company created");
        Ok(company)
    }

    pub async fn list_companies(
        &self,
        actor: &Principal,
        query: DirectoryListQuery,
    ) -> Result<Vec<Company>, AppError> {
        let own = scoped_company(actor, None);
        authorize(Some(actor), Action::ViewCompanies, Resource::Company(own))?;

        match own {
            Some(id) => Ok(self.store.get_companies(&[id]).await?),
            None => Ok(self.store.list_companies(&query.resolve()).await?),
        }
    }

    pub async fn get_company(&self, actor: &Principal, id: Uuid) -> Result<Company, AppError> {
        authorize(Some(actor), Action::ViewCompanies, Resource::Company(Some(id)))?;
        self.store
            .get_companies(&[id])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound("Company not found".into()))
    }

    pub async fn create_regulator(
        &self,
        actor: &Principal,
        input: CreateRegulator,
    ) -> Result<Regulator, AppError> {
        authorize(Some(actor), Action::ManageRegulators, Resource::Global)?;
        let regulator = self
            .store
            .insert_regulator(NewRegulator {
                name: required_name(&input.name, "Regulator")?,
                contact_email: optional_text(input.contact_email),
                wallet_address: wallet_address(input.wallet_address)?,
            })
            .await?;

        info!(regulator_id = %regulator.id, user_id = %actor.user_id, "Regulator created");
        Ok(regulator)
    }

    pub async fn list_regulators(
        &self,
        actor: &Principal,
        query: DirectoryListQuery,
    ) -> Result<Vec<Regulator>, AppError> {
        authorize(Some(actor), Action::ViewRegulators, Resource::Global)?;
        Ok(self.store.list_regulators(&query.resolve()).await?)
    }

    pub async fn get_regulator(&self, actor: &Principal, id: Uuid) -> Result<Regulator, AppError> {
        authorize(Some(actor), Action::ViewRegulators, Resource::Global)?;
        self.store
            .get_regulator(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Regulator not found".into()))
    }
}
