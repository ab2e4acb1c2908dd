//! Authenticated request pipeline.
//!
//! ARCHITECTURE
//! ============
//! Every backend call goes through `Pipeline::send`, which runs a small
//! per-call state machine:
//!
//! ```text
//! Initial ──send──▶ auth failure? ──no──▶ Done
//!    ▲                   │ yes, retries left
//!    │                   ▼
//! Replaying ◀──ok── AwaitingRenewal ──err──▶ reset session, Done
//! ```
//!
//! The outbound stage attaches the session's current credential. The inbound
//! stage decides between delivering the result and renewing. Login, register
//! and refresh are delivered untouched so a rejected refresh can never loop
//! back into another refresh.
//!
//! A call belongs to the session epoch it started in. If the session is
//! reset while the call is out, the call neither renews nor replays and
//! never resets the newer session: it settles with the rejection it got.
//!
//! ERROR HANDLING
//! ==============
//! Non-2xx responses become `ApiError::Status` with the backend's message.
//! Once renewal has been attempted and rejected, the renewal error is what
//! the caller sees, not the original rejection.

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod tests;

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::config::AuthPolicy;
use crate::error::ApiError;
use crate::renewal::Renewal;
use crate::session::Session;
use crate::transport::{ApiRequest, ApiResponse, Transport};

/// Where a call is in its retry sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Initial,
    AwaitingRenewal,
    Replaying,
    Done,
}

/// Per-call bookkeeping. Lives only as long as the call.
#[derive(Debug)]
struct Call {
    request: ApiRequest,
    retry_count: u32,
    phase: CallPhase,
    /// Session epoch when the call started.
    epoch: u64,
}

impl Call {
    fn settle<T>(&mut self, result: Result<T, ApiError>) -> Result<T, ApiError> {
        self.phase = CallPhase::Done;
        tracing::trace!(
            path = %self.request.path,
            phase = ?self.phase,
            attempts = self.retry_count,
            ok = result.is_ok(),
            "call settled"
        );
        result
    }
}

enum Inbound {
    Deliver(Result<ApiResponse, ApiError>),
    /// Carries the rejection, delivered if the renewal turns out to be stale.
    Renew(ApiError),
}

#[derive(Clone)]
pub struct Pipeline {
    transport: Arc<dyn Transport>,
    session: Session,
    renewal: Renewal,
    policy: Arc<AuthPolicy>,
}

impl Pipeline {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, session: Session, renewal: Renewal, policy: AuthPolicy) -> Self {
        Self { transport, session, renewal, policy: Arc::new(policy) }
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn renewal(&self) -> &Renewal {
        &self.renewal
    }

    #[must_use]
    pub fn policy(&self) -> &AuthPolicy {
        &self.policy
    }

    /// Send `request`, renewing the credential and replaying as needed.
    ///
    /// # Errors
    ///
    /// Returns the backend's rejection, a transport failure, or the renewal
    /// error if renewal was attempted and rejected. A call whose session was
    /// reset while it was out settles with the backend's rejection.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let mut call = Call { request, retry_count: 0, phase: CallPhase::Initial, epoch: self.session.epoch() };
        loop {
            let outbound = self.outbound(&call.request);
            let response = match self.transport.send(&outbound).await {
                Ok(response) => response,
                Err(e) => return call.settle(Err(e)),
            };

            match self.inbound(&call, response) {
                Inbound::Deliver(result) => return call.settle(result),
                Inbound::Renew(rejection) => {
                    call.retry_count += 1;
                    call.phase = CallPhase::AwaitingRenewal;
                    tracing::debug!(path = %call.request.path, attempt = call.retry_count, "auth failure, renewing");

                    match self.renewal.renew().await {
                        Ok(_) if self.session.epoch() != call.epoch => {
                            tracing::debug!(path = %call.request.path, "session reset during renewal, not replaying");
                            return call.settle(Err(rejection));
                        }
                        Ok(credential) => {
                            call.request.bearer = Some(credential);
                            call.phase = CallPhase::Replaying;
                        }
                        Err(e) => {
                            self.session.reset_since(call.epoch);
                            return call.settle(Err(e));
                        }
                    }
                }
            }
        }
    }

    /// Send and decode a JSON body.
    ///
    /// # Errors
    ///
    /// As [`Pipeline::send`], plus `Parse` if the body does not decode.
    pub async fn fetch<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        self.send(request).await?.json()
    }

    /// Send and discard the body.
    ///
    /// # Errors
    ///
    /// As [`Pipeline::send`].
    pub async fn execute(&self, request: ApiRequest) -> Result<(), ApiError> {
        self.send(request).await.map(|_| ())
    }

    fn outbound(&self, request: &ApiRequest) -> ApiRequest {
        let mut outbound = request.clone();
        if let Some(credential) = self.session.credential() {
            outbound.bearer = Some(credential);
        }
        outbound
    }

    fn inbound(&self, call: &Call, response: ApiResponse) -> Inbound {
        if response.is_success() || self.policy.is_bootstrap(&call.request.path) {
            return Inbound::Deliver(response.error_for_status());
        }
        if !self.policy.is_auth_failure(response.status) {
            return Inbound::Deliver(response.error_for_status());
        }
        let rejection = ApiError::from_body(response.status, &response.body);
        if self.session.epoch() != call.epoch {
            tracing::debug!(path = %call.request.path, "session reset since call started, not renewing");
            return Inbound::Deliver(Err(rejection));
        }
        if call.retry_count >= self.policy.max_attempts {
            tracing::warn!(
                path = %call.request.path,
                status = response.status,
                attempts = call.retry_count,
                "renewal attempts exhausted"
            );
            return Inbound::Deliver(Err(rejection));
        }
        Inbound::Renew(rejection)
    }
}
