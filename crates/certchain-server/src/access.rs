//! Capability checks, independent of transport.
//!
//! Every mutating or scoped operation asks [`authorize`] whether a subject may
//! perform an action on a resource. Roles gate the action; company admins are
//! additionally confined to their own company's certificates.

use std::fmt;

use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Certificate, UserRole};

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: UserRole,
    pub company_id: Option<Uuid>,
    pub regulator_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreateCertificate,
    CheckCertificate,
    IssueCertificate,
    ValidateCertificate,
    UpdateCertificate,
    DeleteCertificate,
    ListCertificates,
    ViewCertificateHistory,
    ManageWhitelist,
    ManageContract,
    ManageCompanies,
    ViewCompanies,
    ManageRegulators,
    ViewRegulators,
}

impl Action {
    fn allowed_roles(&self) -> &'static [UserRole] {
        use UserRole::*;
        match self {
            Action::CreateCertificate => &[SuperAdmin, CompanyAdmin],
            Action::CheckCertificate => &[SuperAdmin, CompanyAdmin, RegulatorAdmin],
            Action::IssueCertificate | Action::ValidateCertificate => &[SuperAdmin, RegulatorAdmin],
            Action::UpdateCertificate | Action::DeleteCertificate => &[SuperAdmin],
            Action::ListCertificates => &[SuperAdmin, CompanyAdmin],
            Action::ViewCertificateHistory => &[SuperAdmin, CompanyAdmin, RegulatorAdmin],
            Action::ManageWhitelist => &[SuperAdmin, RegulatorAdmin],
            Action::ManageContract | Action::ManageCompanies | Action::ManageRegulators => {
                &[SuperAdmin]
            }
            Action::ViewCompanies => &[SuperAdmin, CompanyAdmin, RegulatorAdmin],
            Action::ViewRegulators => &[SuperAdmin, RegulatorAdmin],
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::CreateCertificate => "create certificates",
            Action::CheckCertificate => "check certificates",
            Action::IssueCertificate => "issue certificates",
            Action::ValidateCertificate => "validate certificates",
            Action::UpdateCertificate => "update certificates",
            Action::DeleteCertificate => "delete certificates",
            Action::ListCertificates => "list certificates",
            Action::ViewCertificateHistory => "view certificate history",
            Action::ManageWhitelist => "manage the whitelist",
            Action::ManageContract => "manage the contract",
            Action::ManageCompanies => "manage companies",
            Action::ViewCompanies => "view companies",
            Action::ManageRegulators => "manage regulators",
            Action::ViewRegulators => "view regulators",
        };
        f.write_str(name)
    }
}

/// What the action targets.
#[derive(Debug, Clone, Copy)]
pub enum Resource<'a> {
    /// Not tied to a tenant (ledger administration, hash checks).
    Global,
    /// A company, or its certificate collection.
    Company(Option<Uuid>),
    Certificate(&'a Certificate),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Role {role} may not {action}")]
    RoleDenied { role: &'static str, action: String },

    #[error("Resource belongs to another company")]
    OutOfScope,
}

impl From<AccessError> for AppError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::Unauthenticated => AppError::Unauthorized(err.to_string()),
            _ => AppError::Forbidden(err.to_string()),
        }
    }
}

/// Decides whether `subject` may perform `action` on `resource`.
pub fn authorize(
    subject: Option<&Principal>,
    action: Action,
    resource: Resource<'_>,
) -> Result<(), AccessError> {
    let principal = subject.ok_or(AccessError::Unauthenticated)?;

    if !action.allowed_roles().contains(&principal.role) {
        return Err(AccessError::RoleDenied {
            role: principal.role.as_str(),
            action: action.to_string(),
        });
    }

    if principal.role != UserRole::CompanyAdmin {
        return Ok(());
    }
    let target = match resource {
        Resource::Global => return Ok(()),
        Resource::Company(company_id) => company_id,
        Resource::Certificate(cert) => cert.company_id,
    };
    match (principal.company_id, target) {
        (Some(own), Some(target)) if own == target => Ok(()),
        _ => Err(AccessError::OutOfScope),
    }
}

/// Company filter a listing must use: company admins only ever see their own.
pub fn scoped_company(principal: &Principal, requested: Option<Uuid>) -> Option<Uuid> {
    match principal.role {
        UserRole::CompanyAdmin => principal.company_id,
        _ => requested,
    }
}
