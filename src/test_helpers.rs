//! Shared fixtures and mocks for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use crate::config::AuthPolicy;
use crate::error::ApiError;
use crate::gateway::{IdentityGateway, LOGIN_PATH, ME_PATH};
use crate::pipeline::Pipeline;
use crate::renewal::{CredentialSource, Renewal};
use crate::session::Session;
use crate::store::AuthStore;
use crate::transport::{ApiRequest, ApiResponse, Transport};
use crate::types::{Credential, Identity};

pub fn identity_json(active: bool) -> serde_json::Value {
    json!({
        "id": "6650f0c2a1",
        "email": "ada@example.com",
        "firstname": "Ada",
        "lastname": "Lovelace",
        "role": "TEACHER",
        "isActive": active,
        "createdAt": "2025-01-01T00:00:00Z",
        "updatedAt": "2025-01-02T00:00:00Z"
    })
}

pub fn identity(active: bool) -> Identity {
    serde_json::from_value(identity_json(active)).unwrap()
}

pub fn json_response(status: u16, body: &serde_json::Value) -> ApiResponse {
    ApiResponse::new(status, body.to_string())
}

pub fn forbidden() -> ApiResponse {
    json_response(403, &json!({ "message": "token expired" }))
}

// =============================================================================
// MockTransport
// =============================================================================

type Handler = Box<dyn Fn(&ApiRequest) -> ApiResponse + Send + Sync>;

/// Transport answering from a closure and recording every request it sees.
pub struct MockTransport {
    handler: Handler,
    seen: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
    pub fn new(handler: impl Fn(&ApiRequest) -> ApiResponse + Send + Sync + 'static) -> Self {
        Self { handler: Box::new(handler), seen: Mutex::new(Vec::new()) }
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.seen.lock().unwrap().clone()
    }

    pub fn count(&self, path: &str) -> usize {
        self.seen.lock().unwrap().iter().filter(|r| r.path == path).count()
    }

    pub fn bearers(&self, path: &str) -> Vec<Option<String>> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .map(|r| r.bearer.as_ref().map(|c| c.as_str().to_owned()))
            .collect()
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        self.seen.lock().unwrap().push(request.clone());
        tokio::task::yield_now().await;
        Ok((self.handler)(request))
    }
}

// =============================================================================
// MockSource
// =============================================================================

/// Credential source with scripted outcomes and an optional delay.
pub struct MockSource {
    outcomes: Vec<Result<Credential, ApiError>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl MockSource {
    pub fn ok(token: &str) -> Self {
        Self::sequence([token])
    }

    pub fn rejected(status: u16) -> Self {
        Self {
            outcomes: vec![Err(ApiError::Status { status, message: "refresh token expired".into() })],
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Return each token in turn, then keep returning the last one.
    pub fn sequence<const N: usize>(tokens: [&str; N]) -> Self {
        Self {
            outcomes: tokens.iter().map(|t| Ok(Credential::new(*t))).collect(),
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl CredentialSource for MockSource {
    async fn renew(&self) -> Result<Credential, ApiError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcomes[n.min(self.outcomes.len() - 1)].clone()
    }
}

// =============================================================================
// Wiring
// =============================================================================

pub fn pipeline_with(transport: Arc<MockTransport>, source: Arc<MockSource>, policy: AuthPolicy) -> Pipeline {
    pipeline_on(Session::new(), transport, source, policy)
}

pub fn pipeline_on(
    session: Session,
    transport: Arc<MockTransport>,
    source: Arc<MockSource>,
    policy: AuthPolicy,
) -> Pipeline {
    let renewal = Renewal::new(source, session.clone());
    Pipeline::new(transport, session, renewal, policy)
}

pub fn store_on(session: Session, transport: Arc<MockTransport>, source: Arc<MockSource>) -> AuthStore {
    let pipeline = pipeline_on(session.clone(), transport, source, AuthPolicy::default());
    let renewal = pipeline.renewal().clone();
    AuthStore::new(IdentityGateway::new(pipeline), renewal, session)
}

/// Identity backend: `pw` is the only valid password, `/me/` needs any bearer.
pub fn identity_backend(active: bool) -> MockTransport {
    MockTransport::new(move |req| match req.path.as_str() {
        LOGIN_PATH => match req.body.as_ref().and_then(|b| b["password"].as_str()) {
            Some("pw") => json_response(200, &json!({ "access_token": "t1" })),
            _ => json_response(403, &json!({ "message": "Invalid email or password" })),
        },
        ME_PATH if req.bearer.is_some() => json_response(200, &identity_json(active)),
        ME_PATH => forbidden(),
        _ => json_response(200, &json!({})),
    })
}
