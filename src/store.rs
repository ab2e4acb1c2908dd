//! Auth store: session-aware orchestration over the identity gateway.
//!
//! SYSTEM CONTEXT
//! ==============
//! UI code calls the store, never the gateway directly. The store raises the
//! right busy flag, writes results into the session, and publishes a
//! user-facing `Notice` for every outcome worth telling the user about.
//!
//! ERROR HANDLING
//! ==============
//! Operations report success as `bool` (or `Option`) and surface failure
//! details through notices, so screens degrade instead of propagating
//! errors. `fetch_me` failures clear identity and credential; the route
//! guard then sends the user back to login.

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;

use std::future::Future;

use tokio::sync::broadcast;

use crate::error::ApiError;
use crate::gateway::IdentityGateway;
use crate::renewal::Renewal;
use crate::session::Session;
use crate::types::{Identity, PasswordChange, ProfileUpdate, Registration};

const NOTICE_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// User-visible message, the equivalent of a toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

#[derive(Clone)]
pub struct AuthStore {
    gateway: IdentityGateway,
    renewal: Renewal,
    session: Session,
    notices: broadcast::Sender<Notice>,
}

impl AuthStore {
    #[must_use]
    pub fn new(gateway: IdentityGateway, renewal: Renewal, session: Session) -> Self {
        let (notices, _rx) = broadcast::channel(NOTICE_CAPACITY);
        Self { gateway, renewal, session, notices }
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn gateway(&self) -> &IdentityGateway {
        &self.gateway
    }

    #[must_use]
    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    pub(crate) fn notify(&self, level: NoticeLevel, message: impl Into<String>) {
        // No subscribers is fine: nobody is showing toasts.
        let _ = self.notices.send(Notice { level, message: message.into() });
    }

    fn fail(&self, context: &str, err: &ApiError) {
        tracing::warn!(error = %err, "{context}");
        self.notify(NoticeLevel::Error, format!("{context}: {}", message_of(err)));
    }

    // =========================================================================
    // SESSION LIFECYCLE
    // =========================================================================

    pub async fn sign_up(&self, registration: &Registration) -> bool {
        let _busy = self.session.begin_auth();
        match self.gateway.register(registration).await {
            Ok(()) => {
                self.notify(NoticeLevel::Success, "Account created. Continue to the login page.");
                true
            }
            Err(e) => {
                self.fail("Error when creating account", &e);
                false
            }
        }
    }

    /// Log in, store the credential, then resolve the identity.
    pub async fn log_in(&self, email: &str, password: &str) -> bool {
        let _busy = self.session.begin_auth();
        let epoch = self.session.epoch();
        match self.gateway.login(email, password).await {
            Ok(credential) => {
                if !self.session.set_credential_since(epoch, credential) {
                    return false;
                }
                tracing::info!("logged in");
                self.fetch_me().await;
                self.notify(NoticeLevel::Success, "Welcome to ClassMate!");
                true
            }
            Err(e) => {
                self.fail("Error when logging in", &e);
                false
            }
        }
    }

    /// Clear local state first, then tell the backend.
    pub async fn log_out(&self) {
        self.session.reset();
        match self.gateway.logout().await {
            Ok(()) => self.notify(NoticeLevel::Success, "Logged out."),
            Err(e) => self.fail("Error during logout, try again in a few minutes", &e),
        }
    }

    /// Renew the credential from the refresh cookie and resolve the identity.
    pub async fn refresh(&self) {
        let _busy = self.session.begin_auth();
        let epoch = self.session.epoch();
        match self.renewal.renew().await {
            Ok(_) if self.session.epoch() != epoch => {
                tracing::info!("session reset during refresh, renewed credential dropped");
            }
            Ok(_) => {
                if self.session.identity().is_none() {
                    self.fetch_me().await;
                }
                self.notify(NoticeLevel::Success, "Welcome back to ClassMate.");
            }
            Err(e) => {
                tracing::info!(error = %e, "no renewable session");
                self.notify(NoticeLevel::Error, "Your login session has expired. Please log in again.");
            }
        }
    }

    /// Replace the identity with the backend's view of it.
    ///
    /// Failure clears identity and credential.
    pub async fn fetch_me(&self) -> Option<Identity> {
        let _busy = self.session.begin_auth();
        let epoch = self.session.epoch();
        match self.gateway.fetch_self().await {
            Ok(identity) => {
                self.session.replace_identity_since(epoch, Some(identity.clone()));
                Some(identity)
            }
            Err(e) => {
                self.session.revoke_since(epoch);
                self.fail("Cannot fetch your information", &e);
                None
            }
        }
    }

    // =========================================================================
    // IDENTITY MUTATIONS
    // =========================================================================

    pub async fn update_profile(&self, update: &ProfileUpdate) -> bool {
        let _busy = self.session.begin_auth();
        if let Err(e) = self.gateway.update_profile(update).await {
            self.fail("Cannot update your information", &e);
            return false;
        }
        self.fetch_me().await;
        self.notify(NoticeLevel::Success, "Profile updated.");
        true
    }

    pub async fn change_password(&self, change: &PasswordChange) -> bool {
        let _busy = self.session.begin_auth();
        if let Err(e) = self.gateway.change_password(change).await {
            self.fail("Failed to change password", &e);
            return false;
        }
        self.notify(NoticeLevel::Success, "Password changed.");
        true
    }

    pub async fn deactivate_account(&self) -> bool {
        let _busy = self.session.begin_auth();
        if let Err(e) = self.gateway.deactivate().await {
            self.fail("Failed to deactivate account", &e);
            return false;
        }
        self.fetch_me().await;
        self.notify(NoticeLevel::Success, "Account deactivated.");
        true
    }

    pub async fn reactivate_account(&self) -> bool {
        let _busy = self.session.begin_auth();
        if let Err(e) = self.gateway.reactivate().await {
            self.fail("Failed to reactivate account", &e);
            return false;
        }
        self.fetch_me().await;
        self.notify(NoticeLevel::Success, "Account reactivated.");
        true
    }

    pub async fn delete_account(&self) -> bool {
        let _busy = self.session.begin_auth();
        if let Err(e) = self.gateway.delete_account().await {
            self.fail("Failed to delete account", &e);
            return false;
        }
        self.session.reset();
        self.notify(NoticeLevel::Success, "Account deleted.");
        true
    }

    // =========================================================================
    // PAGE DATA
    // =========================================================================

    pub async fn fetch_user_by_id(&self, user_id: &str) -> Option<Identity> {
        self.load_page("User not found", self.gateway.fetch_user(user_id)).await
    }

    /// Run a page-data call with `page_busy` raised.
    ///
    /// Failures become an error notice prefixed with `context`.
    pub async fn load_page<T, F>(&self, context: &str, call: F) -> Option<T>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        let _busy = self.session.begin_page();
        match call.await {
            Ok(value) => Some(value),
            Err(e) => {
                self.fail(context, &e);
                None
            }
        }
    }
}

fn message_of(err: &ApiError) -> String {
    match err {
        ApiError::Status { message, .. } if !message.is_empty() => message.clone(),
        other => other.to_string(),
    }
}
