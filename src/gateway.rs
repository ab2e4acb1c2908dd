//! Identity service calls.
//!
//! Each `IdentityGateway` operation is a single round trip through the
//! pipeline. Renewal is the one exception: it lives on `RefreshEndpoint`,
//! which the renewal protocol drives below the pipeline. Nothing here
//! retries or touches session state; callers decide what to store. Backend
//! failures surface as `ApiError::Status` with the backend's own message.

#[cfg(test)]
#[path = "gateway_test.rs"]
mod tests;

use std::sync::Arc;

use serde_json::json;

use crate::error::ApiError;
use crate::pipeline::Pipeline;
use crate::renewal::CredentialSource;
use crate::transport::{ApiRequest, ApiResponse, Transport};
use crate::types::{Credential, Identity, LoginRequest, PasswordChange, ProfileUpdate, Registration, TokenResponse};

pub const REGISTER_PATH: &str = "/v1/identity/auth/register";
pub const LOGIN_PATH: &str = "/v1/identity/auth/login";
pub const REFRESH_PATH: &str = "/v1/identity/auth/refresh";
pub const LOGOUT_PATH: &str = "/v1/identity/auth/logout";
pub const ME_PATH: &str = "/v1/identity/me/";

/// Calls that must never trigger a renewal.
pub const BOOTSTRAP_PATHS: [&str; 3] = [LOGIN_PATH, REGISTER_PATH, REFRESH_PATH];

fn user_path(user_id: &str) -> String {
    format!("{ME_PATH}{user_id}")
}

fn refresh_request() -> ApiRequest {
    ApiRequest::post(REFRESH_PATH).json(json!({}))
}

fn decode_token(response: &ApiResponse) -> Result<Credential, ApiError> {
    response.json::<TokenResponse>().map(|t| t.access_token)
}

#[derive(Clone)]
pub struct IdentityGateway {
    pipeline: Pipeline,
}

impl IdentityGateway {
    #[must_use]
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }

    /// Create an account via `POST /auth/register`.
    ///
    /// # Errors
    ///
    /// Returns the backend's rejection (e.g. duplicate email) verbatim.
    pub async fn register(&self, registration: &Registration) -> Result<(), ApiError> {
        self.pipeline.execute(ApiRequest::post(REGISTER_PATH).json_from(registration)?).await
    }

    /// Exchange email and password for a credential.
    ///
    /// # Errors
    ///
    /// Returns the backend's rejection or `Parse` if no token is returned.
    pub async fn login(&self, email: &str, password: &str) -> Result<Credential, ApiError> {
        let request = ApiRequest::post(LOGIN_PATH).json_from(&LoginRequest { email, password })?;
        decode_token(&self.pipeline.send(request).await?)
    }

    /// Invalidate the refresh cookie server-side.
    ///
    /// # Errors
    ///
    /// Returns the backend's rejection verbatim.
    pub async fn logout(&self) -> Result<(), ApiError> {
        self.pipeline.execute(ApiRequest::post(LOGOUT_PATH).json(json!({}))).await
    }

    /// Fetch the authenticated principal.
    ///
    /// # Errors
    ///
    /// Returns the backend's rejection or `Parse` on an unexpected body.
    pub async fn fetch_self(&self) -> Result<Identity, ApiError> {
        self.pipeline.fetch(ApiRequest::get(ME_PATH)).await
    }

    /// Fetch another user's public record.
    ///
    /// # Errors
    ///
    /// Returns the backend's rejection (typically 404) verbatim.
    pub async fn fetch_user(&self, user_id: &str) -> Result<Identity, ApiError> {
        self.pipeline.fetch(ApiRequest::get(user_path(user_id))).await
    }

    /// # Errors
    ///
    /// Returns the backend's rejection verbatim.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<(), ApiError> {
        self.pipeline.execute(ApiRequest::patch(ME_PATH).json_from(update)?).await
    }

    /// # Errors
    ///
    /// Returns the backend's rejection (e.g. wrong current password) verbatim.
    pub async fn change_password(&self, change: &PasswordChange) -> Result<(), ApiError> {
        self.pipeline.execute(ApiRequest::post(user_path("password")).json_from(change)?).await
    }

    /// # Errors
    ///
    /// Returns the backend's rejection verbatim.
    pub async fn deactivate(&self) -> Result<(), ApiError> {
        self.pipeline.execute(ApiRequest::post(user_path("deactivate")).json(json!({}))).await
    }

    /// # Errors
    ///
    /// Returns the backend's rejection verbatim.
    pub async fn reactivate(&self) -> Result<(), ApiError> {
        self.pipeline.execute(ApiRequest::post(user_path("reactivate")).json(json!({}))).await
    }

    /// # Errors
    ///
    /// Returns the backend's rejection verbatim.
    pub async fn delete_account(&self) -> Result<(), ApiError> {
        self.pipeline.execute(ApiRequest::delete(user_path("delete"))).await
    }
}

// =============================================================================
// REFRESH ENDPOINT
// =============================================================================

/// The identity service's renew operation: `POST /auth/refresh`.
///
/// Exchanges the refresh cookie held by the transport for a new credential.
/// It is the `CredentialSource` the renewal protocol runs, and it talks to
/// the transport directly so a rejected refresh never re-enters the pipeline.
pub struct RefreshEndpoint {
    transport: Arc<dyn Transport>,
}

impl RefreshEndpoint {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait::async_trait]
impl CredentialSource for RefreshEndpoint {
    async fn renew(&self) -> Result<Credential, ApiError> {
        let response = self.transport.send(&refresh_request()).await?.error_for_status()?;
        decode_token(&response)
    }
}
