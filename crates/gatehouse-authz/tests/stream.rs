//! Stream gate: authorize on first message, session cache afterwards

mod common;

use std::sync::Arc;

use futures::stream;
use gatehouse_authz::{ResourceInfo, StreamInterceptor, SubjectType};
use tonic::{Code, Status};

use common::*;

fn messages(paths: &[&str]) -> Vec<Result<FileRequest, Status>> {
    paths.iter().map(|p| Ok(FileRequest::new(p))).collect()
}

#[tokio::test]
async fn test_first_message_authorizes_the_whole_stream() {
    let rbac = Arc::new(
        FakeRbac::default()
            .map(WRITE_FILE, vec![ResourceInfo::new(1, "write")])
            .grant(SubjectType::Account, "alice"),
    );
    let (audit, sink) = capture_logger();
    let validator = FakeValidator::default().with("alice-token", "alice", "node-a");
    let engine = build_engine(validator, true, rbac.clone());
    let gate = StreamInterceptor::new(engine.clone(), audit);

    let inbound = stream::iter(messages(&["/a", "/b", "/c"]));
    let mut authorized = gate.intercept(WRITE_FILE, request_with_token(inbound, Some("alice-token")));
    assert!(authorized.auth_context().is_none());

    let mut seen = Vec::new();
    while let Some(message) = authorized.message().await.unwrap() {
        seen.push(message.path);
    }
    assert_eq!(seen, ["/a", "/b", "/c"]);
    assert_eq!(authorized.auth_context().map(|a| a.subject.as_str()), Some("alice"));

    // One RBAC round trip and one audit record for the whole stream
    assert_eq!(rbac.validate_calls(), 1);
    assert_eq!(sink.records().len(), 1);
    assert!(engine.sessions().is_granted(&authorized.session_id()));
}

#[tokio::test]
async fn test_session_is_removed_when_stream_ends() {
    let rbac = Arc::new(
        FakeRbac::default()
            .map(WRITE_FILE, vec![ResourceInfo::new(1, "write")])
            .grant(SubjectType::Account, "alice"),
    );
    let (audit, _sink) = capture_logger();
    let validator = FakeValidator::default().with("alice-token", "alice", "node-a");
    let engine = build_engine(validator, true, rbac);
    let gate = StreamInterceptor::new(engine.clone(), audit);

    let mut authorized = gate.intercept(
        WRITE_FILE,
        request_with_token(stream::iter(messages(&["/a"])), Some("alice-token")),
    );
    authorized.message().await.unwrap();
    let session = authorized.session_id();
    assert!(engine.sessions().is_granted(&session));

    drop(authorized);
    assert!(!engine.sessions().is_granted(&session));
    assert!(engine.sessions().is_empty());
}

#[tokio::test]
async fn test_sessions_are_never_shared_between_streams() {
    let rbac = Arc::new(
        FakeRbac::default()
            .map(WRITE_FILE, vec![ResourceInfo::new(1, "write")])
            .grant(SubjectType::Account, "alice"),
    );
    let (audit, _sink) = capture_logger();
    let validator = FakeValidator::default().with("alice-token", "alice", "node-a");
    let engine = build_engine(validator, true, rbac);
    let gate = StreamInterceptor::new(engine, audit);

    let first = gate.intercept(
        WRITE_FILE,
        request_with_token(stream::iter(messages(&["/a"])), Some("alice-token")),
    );
    let second = gate.intercept(
        WRITE_FILE,
        request_with_token(stream::iter(messages(&["/a"])), Some("alice-token")),
    );
    assert_ne!(first.session_id(), second.session_id());
}

#[tokio::test]
async fn test_denied_stream_keeps_failing() {
    let rbac = Arc::new(FakeRbac::default().map(WRITE_FILE, vec![ResourceInfo::new(1, "write")]));
    let (audit, sink) = capture_logger();
    let validator = FakeValidator::default().with("bob-token", "bob", "node-a");
    let engine = build_engine(validator, true, rbac.clone());
    let gate = StreamInterceptor::new(engine.clone(), audit);

    let mut authorized = gate.intercept(
        WRITE_FILE,
        request_with_token(stream::iter(messages(&["/a", "/b"])), Some("bob-token")),
    );

    let first = authorized.message().await.unwrap_err();
    assert_eq!(first.code(), Code::PermissionDenied);
    let again = authorized.message().await.unwrap_err();
    assert_eq!(again.code(), Code::PermissionDenied);

    assert_eq!(sink.records().len(), 1);
    assert!(authorized.auth_context().is_none());
    assert!(engine.sessions().is_empty());
    // account, application, then peer
    assert_eq!(rbac.validate_calls(), 3);
}

#[tokio::test]
async fn test_empty_stream_ends_without_a_decision() {
    let rbac = Arc::new(FakeRbac::default());
    let (audit, sink) = capture_logger();
    let gate = StreamInterceptor::new(build_engine(FakeValidator::default(), true, rbac), audit);

    let mut authorized = gate.intercept(
        WRITE_FILE,
        request_with_token(stream::iter(messages(&[])), None),
    );
    assert!(authorized.message().await.unwrap().is_none());
    assert!(sink.records().is_empty());
}

#[tokio::test]
async fn test_transport_errors_are_passed_through() {
    let rbac = Arc::new(FakeRbac::default());
    let (audit, sink) = capture_logger();
    let gate = StreamInterceptor::new(build_engine(FakeValidator::default(), true, rbac), audit);

    let inbound = stream::iter(vec![Err::<FileRequest, _>(Status::cancelled("client went away"))]);
    let mut authorized = gate.intercept(WRITE_FILE, request_with_token(inbound, None));

    let status = authorized.message().await.unwrap_err();
    assert_eq!(status.code(), Code::Cancelled);
    assert!(sink.records().is_empty());
}
