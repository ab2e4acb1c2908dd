//! Client facade: one wired-up instance of every layer.
//!
//! ARCHITECTURE
//! ============
//! ```text
//! HttpTransport ──► Pipeline ──► IdentityGateway ──► AuthStore ──► RouteGuard
//!       │              │    └──► AcademicGateway
//!       └─► RefreshEndpoint ─► Renewal ◄─┘
//!                              │
//!                           Session
//! ```
//! Every component shares one `Session`, so the credential written by a
//! renewal is the one the next request carries.

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;

use std::sync::Arc;

use crate::academic::AcademicGateway;
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::gateway::{IdentityGateway, RefreshEndpoint};
use crate::guard::{GuardRoutes, RouteGuard};
use crate::pipeline::Pipeline;
use crate::renewal::Renewal;
use crate::session::Session;
use crate::store::AuthStore;
use crate::transport::{HttpTransport, Transport};

#[derive(Clone)]
pub struct ClassmateClient {
    session: Session,
    pipeline: Pipeline,
    identity: IdentityGateway,
    academic: AcademicGateway,
    store: AuthStore,
}

impl ClassmateClient {
    /// Build a client talking HTTP to `config.base_url`.
    ///
    /// # Errors
    ///
    /// Returns `HttpClientBuild` if the HTTP client cannot be constructed.
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let transport = HttpTransport::new(&config)?;
        tracing::info!(base_url = %config.base_url, "classmate client ready");
        Ok(Self::with_transport(Arc::new(transport), config))
    }

    /// Build a client over any transport.
    #[must_use]
    pub fn with_transport(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        let session = Session::new();
        let renewal = Renewal::new(Arc::new(RefreshEndpoint::new(transport.clone())), session.clone());
        let pipeline = Pipeline::new(transport, session.clone(), renewal.clone(), config.policy);
        let identity = IdentityGateway::new(pipeline.clone());
        let academic = AcademicGateway::new(pipeline.clone());
        let store = AuthStore::new(identity.clone(), renewal, session.clone());
        Self { session, pipeline, identity, academic, store }
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    #[must_use]
    pub fn identity(&self) -> &IdentityGateway {
        &self.identity
    }

    #[must_use]
    pub fn academic(&self) -> &AcademicGateway {
        &self.academic
    }

    #[must_use]
    pub fn store(&self) -> &AuthStore {
        &self.store
    }

    /// A fresh guard over this client's store; call `mount()` on it once.
    #[must_use]
    pub fn route_guard(&self, routes: GuardRoutes) -> RouteGuard {
        RouteGuard::new(self.store.clone(), routes)
    }
}
