//! # classmate-client
//!
//! Authenticated client for the ClassMate learning platform backend.
//!
//! The core is the request pipeline: it attaches the session credential to
//! every call, answers an authentication failure with a single shared
//! credential renewal, replays the call, and resets the session when renewal
//! is refused. Around it sit the session state, the identity and academic
//! gateways, the auth store that UI code drives, and the route guard that
//! gates protected views.

pub mod academic;
pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod guard;
pub mod pipeline;
pub mod renewal;
pub mod session;
pub mod store;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use client::ClassmateClient;
pub use config::{AuthPolicy, ClientConfig};
pub use error::ApiError;
pub use guard::{GuardRoutes, GuardState, GuardView, RouteGuard};
pub use session::{Session, SessionSnapshot};
pub use store::{AuthStore, Notice, NoticeLevel};
pub use types::{Credential, Identity, Role};
