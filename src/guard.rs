//! Route guard: the gate in front of every protected view.
//!
//! SYSTEM CONTEXT
//! ==============
//! Mounted once around the protected views. `mount()` bootstraps the session
//! through the auth store, after which `render()` is called for every
//! navigation and every session change and decides what the user sees.
//!
//! DESIGN
//! ======
//! The decision itself is the pure function `evaluate()` over a session
//! snapshot, the `starting` flag and the current location. `RouteGuard` only
//! owns the `starting` flag and the side effects: bootstrap calls and the
//! notice shown when a deactivated identity is sent to its profile.
//!
//! A deactivated identity is checked before anything else, so it is
//! redirected even while a bootstrap or page load is still running. A
//! credential never unlocks content on its own: until its identity is
//! resolved the guard renders `Loading`, and `render` starts the fetch.

#[cfg(test)]
#[path = "guard_test.rs"]
mod tests;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::session::SessionSnapshot;
use crate::store::{AuthStore, NoticeLevel};

pub const DEFAULT_LOGIN_ROUTE: &str = "/login";
pub const DEFAULT_PROFILE_ROUTE: &str = "/profile";

/// Where the guard sends users it turns away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardRoutes {
    pub login: String,
    /// The only view a deactivated identity may use, including sub-paths.
    pub profile: String,
}

impl Default for GuardRoutes {
    fn default() -> Self {
        Self { login: DEFAULT_LOGIN_ROUTE.to_owned(), profile: DEFAULT_PROFILE_ROUTE.to_owned() }
    }
}

impl GuardRoutes {
    /// `location` is the profile view or one of its sub-paths.
    fn is_profile(&self, location: &str) -> bool {
        let path = location.split(['?', '#']).next().unwrap_or_default();
        let profile = self.profile.trim_end_matches('/');
        path.strip_prefix(profile).is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Starting,
    Unauthenticated,
    Authenticating,
    AuthenticatedRestricted,
    Authenticated,
}

/// What the guard renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardView {
    Loading,
    /// Replace the current location with this path.
    Redirect(String),
    /// Protected content, with a placeholder while page data is loading.
    Content { page_loading: bool },
}

/// Decide state and view for one render.
#[must_use]
pub fn evaluate(
    snapshot: &SessionSnapshot,
    starting: bool,
    location: &str,
    routes: &GuardRoutes,
) -> (GuardState, GuardView) {
    if snapshot.credential.is_some() {
        if let Some(identity) = &snapshot.identity {
            if !identity.is_active && !routes.is_profile(location) {
                return (GuardState::AuthenticatedRestricted, GuardView::Redirect(routes.profile.clone()));
            }
        }
    }

    if starting {
        return (GuardState::Starting, GuardView::Loading);
    }
    if snapshot.auth_busy() {
        return (GuardState::Authenticating, GuardView::Loading);
    }
    if snapshot.credential.is_none() {
        return (GuardState::Unauthenticated, GuardView::Redirect(routes.login.clone()));
    }

    let state = match &snapshot.identity {
        // Credential without a resolved identity: hold until it is fetched.
        None => return (GuardState::Authenticating, GuardView::Loading),
        Some(identity) if !identity.is_active => GuardState::AuthenticatedRestricted,
        Some(_) => GuardState::Authenticated,
    };
    (state, GuardView::Content { page_loading: snapshot.page_busy() })
}

// =============================================================================
// RouteGuard
// =============================================================================

#[derive(Clone)]
pub struct RouteGuard {
    store: AuthStore,
    routes: GuardRoutes,
    starting: Arc<AtomicBool>,
    resolving: Arc<AtomicBool>,
}

impl RouteGuard {
    #[must_use]
    pub fn new(store: AuthStore, routes: GuardRoutes) -> Self {
        Self {
            store,
            routes,
            starting: Arc::new(AtomicBool::new(true)),
            resolving: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn routes(&self) -> &GuardRoutes {
        &self.routes
    }

    #[must_use]
    pub fn is_starting(&self) -> bool {
        self.starting.load(Ordering::SeqCst)
    }

    /// Bootstrap the session: renew when there is no credential, then resolve
    /// a missing identity. Leaves `starting` whatever the outcome.
    pub async fn mount(&self) {
        let session = self.store.session();
        if session.credential().is_none() {
            self.store.refresh().await;
        }
        if session.credential().is_some() && session.identity().is_none() {
            self.store.fetch_me().await;
        }
        self.starting.store(false, Ordering::SeqCst);
        tracing::debug!(authenticated = session.credential().is_some(), "route guard mounted");
    }

    #[must_use]
    pub fn state(&self, location: &str) -> GuardState {
        evaluate(&self.store.session().snapshot(), self.is_starting(), location, &self.routes).0
    }

    /// Render for `location` against the current session.
    ///
    /// A credential without an identity starts one background `fetch_me`.
    pub fn render(&self, location: &str) -> GuardView {
        let snapshot = self.store.session().snapshot();
        let starting = self.is_starting();
        let (state, view) = evaluate(&snapshot, starting, location, &self.routes);
        if state == GuardState::AuthenticatedRestricted && matches!(view, GuardView::Redirect(_)) {
            tracing::info!(location, "deactivated account redirected to profile");
            self.store.notify(NoticeLevel::Error, "Reactivate your account to use this feature");
        }
        if !starting && !snapshot.auth_busy() && snapshot.credential.is_some() && snapshot.identity.is_none() {
            self.resolve_identity();
        }
        view
    }

    fn resolve_identity(&self) {
        if self.resolving.swap(true, Ordering::SeqCst) {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no runtime to resolve identity on");
            self.resolving.store(false, Ordering::SeqCst);
            return;
        };
        tracing::debug!("credential without identity, fetching identity");
        let store = self.store.clone();
        let resolving = Arc::clone(&self.resolving);
        runtime.spawn(async move {
            store.fetch_me().await;
            resolving.store(false, Ordering::SeqCst);
        });
    }
}
