use super::*;
use crate::config::AuthPolicy;
use crate::test_helpers::{MockSource, MockTransport, forbidden, identity, json_response, pipeline_on, pipeline_with};
use crate::types::Credential;
use serde_json::json;
use std::time::Duration;

const COURSES: &str = "/v1/academic/courses/";

/// Backend that accepts only the `fresh` credential on non-auth paths.
fn accepts_fresh() -> Arc<MockTransport> {
    Arc::new(MockTransport::new(|req| match req.bearer.as_ref().map(Credential::as_str) {
        Some("fresh") => json_response(200, &json!([{ "id": "c1", "name": "Algebra" }])),
        _ => forbidden(),
    }))
}

// =============================================================================
// Outbound stage
// =============================================================================

#[tokio::test]
async fn outbound_attaches_current_credential() {
    let transport = Arc::new(MockTransport::new(|_| json_response(200, &json!({}))));
    let pipeline = pipeline_with(transport.clone(), Arc::new(MockSource::ok("fresh")), AuthPolicy::default());

    pipeline.execute(ApiRequest::get(COURSES)).await.unwrap();
    pipeline.session().set_credential(Credential::new("t1"));
    pipeline.execute(ApiRequest::get(COURSES)).await.unwrap();

    assert_eq!(transport.bearers(COURSES), vec![None, Some("t1".to_owned())]);
}

// =============================================================================
// Renewal and replay
// =============================================================================

#[tokio::test]
async fn auth_failure_renews_and_returns_replayed_result() {
    let transport = accepts_fresh();
    let source = Arc::new(MockSource::ok("fresh"));
    let pipeline = pipeline_with(transport.clone(), source.clone(), AuthPolicy::default());
    pipeline.session().set_credential(Credential::new("stale"));

    let courses: serde_json::Value = pipeline.fetch(ApiRequest::get(COURSES)).await.unwrap();

    assert_eq!(courses[0]["name"], "Algebra");
    assert_eq!(source.calls(), 1);
    assert_eq!(transport.bearers(COURSES), vec![Some("stale".to_owned()), Some("fresh".to_owned())]);
    assert_eq!(pipeline.session().credential(), Some(Credential::new("fresh")));
}

#[tokio::test]
async fn replay_carries_renewed_credential_when_none_was_present() {
    let transport = accepts_fresh();
    let pipeline = pipeline_with(transport.clone(), Arc::new(MockSource::ok("fresh")), AuthPolicy::default());

    pipeline.execute(ApiRequest::get(COURSES)).await.unwrap();

    assert_eq!(transport.bearers(COURSES), vec![None, Some("fresh".to_owned())]);
}

#[tokio::test]
async fn exhausted_retry_counter_rejects_with_last_failure() {
    let transport = Arc::new(MockTransport::new(|_| forbidden()));
    let source = Arc::new(MockSource::ok("still-rejected"));
    let pipeline = pipeline_with(transport.clone(), source.clone(), AuthPolicy::default());

    let err = pipeline.execute(ApiRequest::get(COURSES)).await.unwrap_err();

    assert_eq!(err, ApiError::Status { status: 403, message: "token expired".into() });
    assert_eq!(source.calls(), 4);
    assert_eq!(transport.count(COURSES), 5);
}

#[tokio::test]
async fn retry_bound_follows_policy() {
    let transport = Arc::new(MockTransport::new(|_| forbidden()));
    let source = Arc::new(MockSource::ok("still-rejected"));
    let policy = AuthPolicy { max_attempts: 1, ..AuthPolicy::default() };
    let pipeline = pipeline_with(transport.clone(), source.clone(), policy);

    assert!(pipeline.execute(ApiRequest::get(COURSES)).await.is_err());
    assert_eq!(source.calls(), 1);
    assert_eq!(transport.count(COURSES), 2);
}

#[tokio::test]
async fn bootstrap_endpoints_never_trigger_renewal() {
    let transport = Arc::new(MockTransport::new(|_| forbidden()));
    let source = Arc::new(MockSource::ok("fresh"));
    let pipeline = pipeline_with(transport.clone(), source.clone(), AuthPolicy::default());

    for path in ["/v1/identity/auth/login", "/v1/identity/auth/register", "/v1/identity/auth/refresh"] {
        let err = pipeline.execute(ApiRequest::post(path).json(json!({}))).await.unwrap_err();
        assert_eq!(err.status(), Some(403));
        assert_eq!(transport.count(path), 1);
    }
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn rejected_renewal_resets_session_and_surfaces_renewal_error() {
    let transport = Arc::new(MockTransport::new(|_| forbidden()));
    let source = Arc::new(MockSource::rejected(401));
    let pipeline = pipeline_with(transport.clone(), source.clone(), AuthPolicy::default());
    let session = pipeline.session().clone();
    session.set_credential(Credential::new("stale"));
    session.replace_identity(Some(identity(true)));
    let _auth = session.begin_auth();
    let _page = session.begin_page();

    let err = pipeline.execute(ApiRequest::get(COURSES)).await.unwrap_err();

    assert_eq!(err.status(), Some(401));
    assert_eq!(transport.count(COURSES), 1);
    let snap = session.snapshot();
    assert!(snap.credential.is_none());
    assert!(snap.identity.is_none());
    assert!(!snap.auth_busy());
    assert!(!snap.page_busy());
}

// =============================================================================
// Reset while a call is out
// =============================================================================

fn spawn_execute(pipeline: &Pipeline) -> tokio::task::JoinHandle<Result<(), ApiError>> {
    let pipeline = pipeline.clone();
    tokio::spawn(async move { pipeline.execute(ApiRequest::get(COURSES)).await })
}

#[tokio::test]
async fn rejected_renewal_after_reset_leaves_new_session_alone() {
    let transport = Arc::new(MockTransport::new(|_| forbidden()));
    let source = Arc::new(MockSource::rejected(401).with_delay(Duration::from_millis(50)));
    let pipeline = pipeline_with(transport, source.clone(), AuthPolicy::default());
    let session = pipeline.session().clone();
    session.set_credential(Credential::new("stale"));

    let call = spawn_execute(&pipeline);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(pipeline.renewal().in_flight());
    session.reset();
    session.set_credential(Credential::new("new-login"));
    session.replace_identity(Some(identity(true)));

    let err = call.await.unwrap().unwrap_err();

    assert_eq!(err.status(), Some(401));
    assert_eq!(source.calls(), 1);
    assert_eq!(session.credential(), Some(Credential::new("new-login")));
    assert!(session.identity().is_some());
}

#[tokio::test]
async fn renewal_settling_after_reset_is_not_replayed() {
    let transport = accepts_fresh();
    let source = Arc::new(MockSource::ok("fresh").with_delay(Duration::from_millis(50)));
    let pipeline = pipeline_with(transport.clone(), source, AuthPolicy::default());
    let session = pipeline.session().clone();
    session.set_credential(Credential::new("stale"));

    let call = spawn_execute(&pipeline);
    tokio::time::sleep(Duration::from_millis(10)).await;
    session.reset();

    let err = call.await.unwrap().unwrap_err();

    assert_eq!(err, ApiError::Status { status: 403, message: "token expired".into() });
    assert_eq!(transport.bearers(COURSES), vec![Some("stale".to_owned())]);
    assert!(session.credential().is_none());
}

#[tokio::test]
async fn rejection_arriving_after_reset_does_not_renew() {
    let session = Session::new();
    let transport = {
        let session = session.clone();
        Arc::new(MockTransport::new(move |_| {
            session.reset();
            forbidden()
        }))
    };
    let source = Arc::new(MockSource::ok("fresh"));
    let pipeline = pipeline_on(session.clone(), transport.clone(), source.clone(), AuthPolicy::default());
    session.set_credential(Credential::new("stale"));

    let err = pipeline.execute(ApiRequest::get(COURSES)).await.unwrap_err();

    assert_eq!(err.status(), Some(403));
    assert_eq!(source.calls(), 0);
    assert_eq!(transport.count(COURSES), 1);
    assert!(session.credential().is_none());
}

// =============================================================================
// Pass-through
// =============================================================================

#[tokio::test]
async fn business_failures_pass_through_untouched() {
    let transport = Arc::new(MockTransport::new(|_| json_response(404, &json!({ "message": "course not found" }))));
    let source = Arc::new(MockSource::ok("fresh"));
    let pipeline = pipeline_with(transport, source.clone(), AuthPolicy::default());

    let err = pipeline.execute(ApiRequest::get("/v1/academic/courses/missing")).await.unwrap_err();

    assert_eq!(err, ApiError::Status { status: 404, message: "course not found".into() });
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn unauthorized_is_not_renewed_under_default_policy() {
    let transport = Arc::new(MockTransport::new(|_| json_response(401, &json!({ "message": "no" }))));
    let source = Arc::new(MockSource::ok("fresh"));
    let pipeline = pipeline_with(transport, source.clone(), AuthPolicy::default());

    assert_eq!(pipeline.execute(ApiRequest::get(COURSES)).await.unwrap_err().status(), Some(401));
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn unauthorized_is_renewed_when_policy_includes_401() {
    let transport = Arc::new(MockTransport::new(|req| match req.bearer.as_ref().map(Credential::as_str) {
        Some("fresh") => json_response(200, &json!({ "ok": true })),
        _ => json_response(401, &json!({ "message": "jwt expired" })),
    }));
    let source = Arc::new(MockSource::ok("fresh"));
    let policy = AuthPolicy { failure_statuses: vec![401, 403], ..AuthPolicy::default() };
    let pipeline = pipeline_with(transport, source.clone(), policy);

    assert!(pipeline.execute(ApiRequest::get(COURSES)).await.is_ok());
    assert_eq!(source.calls(), 1);
}

struct DownTransport;

#[async_trait::async_trait]
impl Transport for DownTransport {
    async fn send(&self, _request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        Err(ApiError::Request("connection refused".into()))
    }
}

#[tokio::test]
async fn transport_failure_propagates_unchanged() {
    let session = Session::new();
    let source = Arc::new(MockSource::ok("fresh"));
    let renewal = Renewal::new(source.clone(), session.clone());
    let pipeline = Pipeline::new(Arc::new(DownTransport), session, renewal, AuthPolicy::default());

    let err = pipeline.execute(ApiRequest::get(COURSES)).await.unwrap_err();

    assert_eq!(err, ApiError::Request("connection refused".into()));
    assert_eq!(source.calls(), 0);
}

// =============================================================================
// Single-flight
// =============================================================================

#[tokio::test]
async fn concurrent_auth_failures_share_one_renewal() {
    let transport = accepts_fresh();
    let source = Arc::new(MockSource::ok("fresh").with_delay(Duration::from_millis(50)));
    let pipeline = pipeline_with(transport.clone(), source.clone(), AuthPolicy::default());
    pipeline.session().set_credential(Credential::new("stale"));

    let results = futures::future::join_all((0..5).map(|_| pipeline.execute(ApiRequest::get(COURSES)))).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(source.calls(), 1);
    let bearers = transport.bearers(COURSES);
    assert_eq!(bearers.len(), 10);
    assert_eq!(bearers.iter().filter(|b| b.as_deref() == Some("fresh")).count(), 5);
}

#[tokio::test]
async fn concurrent_auth_failures_share_one_rejection() {
    let transport = Arc::new(MockTransport::new(|_| forbidden()));
    let source = Arc::new(MockSource::rejected(401).with_delay(Duration::from_millis(50)));
    let pipeline = pipeline_with(transport.clone(), source.clone(), AuthPolicy::default());
    pipeline.session().set_credential(Credential::new("stale"));

    let results = futures::future::join_all((0..4).map(|_| pipeline.execute(ApiRequest::get(COURSES)))).await;

    assert_eq!(source.calls(), 1);
    assert!(results.iter().all(|r| r.as_ref().err().and_then(ApiError::status) == Some(401)));
    assert!(pipeline.session().credential().is_none());
    assert_eq!(transport.count(COURSES), 4);
}

#[tokio::test]
async fn spawned_calls_share_one_renewal_across_tasks() {
    let transport = accepts_fresh();
    let source = Arc::new(MockSource::ok("fresh").with_delay(Duration::from_millis(50)));
    let pipeline = pipeline_with(transport, source.clone(), AuthPolicy::default());

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.execute(ApiRequest::get(COURSES)).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(source.calls(), 1);
}
