//! Credential renewal with single-flight semantics.
//!
//! DESIGN
//! ======
//! The first caller that needs a fresh credential starts one renewal and
//! parks a shared handle in `pending`; every caller arriving while it is in
//! flight awaits the same handle instead of hitting the refresh endpoint
//! again. The handle clears itself the moment it settles, so the next real
//! expiry starts a new renewal.
//!
//! On success the new credential is written to the session, unless the
//! session was reset while the renewal was in flight. On failure the session
//! is left untouched; resetting it is the pipeline's job. No retries happen
//! here; the pipeline's per-call counter is the only bound.

#[cfg(test)]
#[path = "renewal_test.rs"]
mod tests;

use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

use crate::error::ApiError;
use crate::session::Session;
use crate::types::Credential;

/// Exchanges the out-of-band refresh capability for a new credential.
#[async_trait::async_trait]
pub trait CredentialSource: Send + Sync {
    async fn renew(&self) -> Result<Credential, ApiError>;
}

type PendingRenewal = Shared<BoxFuture<'static, Result<Credential, ApiError>>>;

#[derive(Clone)]
pub struct Renewal {
    inner: Arc<RenewalInner>,
}

struct RenewalInner {
    source: Arc<dyn CredentialSource>,
    session: Session,
    pending: Mutex<Option<PendingRenewal>>,
}

impl Renewal {
    #[must_use]
    pub fn new(source: Arc<dyn CredentialSource>, session: Session) -> Self {
        Self { inner: Arc::new(RenewalInner { source, session, pending: Mutex::new(None) }) }
    }

    /// Obtain a new credential, joining an in-flight renewal if one exists.
    ///
    /// # Errors
    ///
    /// Returns the refresh endpoint's rejection unchanged.
    pub async fn renew(&self) -> Result<Credential, ApiError> {
        self.pending_or_start().await
    }

    /// Whether a renewal is currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> bool {
        self.inner.pending.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    fn pending_or_start(&self) -> PendingRenewal {
        let mut slot = self.inner.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pending) = slot.as_ref() {
            tracing::debug!("joining in-flight renewal");
            return pending.clone();
        }

        let inner = Arc::clone(&self.inner);
        let epoch = inner.session.epoch();
        let pending = async move {
            let result = inner.source.renew().await;
            match &result {
                Ok(credential) => {
                    if inner.session.set_credential_since(epoch, credential.clone()) {
                        tracing::info!("credential renewed");
                    } else {
                        tracing::info!("renewed credential discarded: session was reset");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "credential renewal rejected"),
            }
            inner.pending.lock().unwrap_or_else(PoisonError::into_inner).take();
            result
        }
        .boxed()
        .shared();

        *slot = Some(pending.clone());
        tracing::debug!("renewal started");
        pending
    }
}
