use api::ApiError;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::RouterState;

pub const TENANT_HEADER: &str = "x-tenant-id";

const MAX_TENANT_LEN: usize = 64;

/// Tenant a request acts on: the `x-tenant-id` header, or the configured
/// default tenant when the header is absent or blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant(pub String);

impl Tenant {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

fn is_valid(tenant: &str) -> bool {
    tenant.len() <= MAX_TENANT_LEN
        && tenant
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[axum::async_trait]
impl<S: RouterState> FromRequestParts<S> for Tenant {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = match parts.headers.get(TENANT_HEADER) {
            Some(value) => value
                .to_str()
                .map_err(|_| ApiError::bad_request("Invalid x-tenant-id header"))?
                .trim(),
            None => "",
        };

        if header.is_empty() {
            return Ok(Tenant(state.config().tenants.default_tenant.clone()));
        }
        if !is_valid(header) {
            return Err(ApiError::bad_request("Invalid x-tenant-id header"));
        }
        Ok(Tenant(header.to_string()))
    }
}
