mod common;

use std::{path::PathBuf, time::Duration};

use common::{FakeAdapter, FakeBehavior};
use dap_bridge_core::{
    session::SessionOptions, wait_until_stopped, DapError, RunState, Session, SessionRegistry,
    Transport,
};
use serde_json::json;
use tokio::net::TcpListener;

async fn connected_session(registry: &SessionRegistry) -> (std::sync::Arc<Session>, FakeAdapter) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let adapter = FakeAdapter::new(FakeBehavior::default());
    tokio::spawn(adapter.clone().serve(listener));

    let (transport, inbound) = Transport::connect(address).await.unwrap();
    let session = Session::new(
        registry.allocate_id(),
        transport,
        inbound,
        SessionOptions {
            adapter: "fake-adapter".to_string(),
            program: "app".to_string(),
            working_directory: PathBuf::from("/srv/app"),
            ..Default::default()
        },
    );
    registry.add(session.clone()).await;
    (session, adapter)
}

#[tokio::test]
async fn concurrent_requests_are_correlated_over_tcp() {
    let registry = SessionRegistry::new();
    let (session, _adapter) = connected_session(&registry).await;
    session.request("initialize", Some(json!({}))).await.unwrap();

    let (a, b, threads) = tokio::join!(
        session.request("evaluate", Some(json!({"expression": "1 + 1"}))),
        session.request("evaluate", Some(json!({"expression": "name"}))),
        session.request("threads", None),
    );
    assert_eq!(a.unwrap()["result"], "1 + 1");
    assert_eq!(b.unwrap()["result"], "name");
    assert_eq!(threads.unwrap()["threads"][0]["id"], 1);

    session.close().await;
}

#[tokio::test]
async fn adapter_failure_rejects_only_that_request() {
    let registry = SessionRegistry::new();
    let (session, _adapter) = connected_session(&registry).await;

    let err = session.request("stepBack", None).await.unwrap_err();
    match err {
        DapError::Adapter { command, message } => {
            assert_eq!(command, "stepBack");
            assert_eq!(message, "unsupported request");
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert!(session.request("threads", None).await.is_ok());

    session.close().await;
}

#[tokio::test]
async fn full_run_reaches_terminated_with_exit_code() {
    let registry = SessionRegistry::new();
    let (session, _adapter) = connected_session(&registry).await;
    let poll = Duration::from_millis(20);

    session.request("initialize", Some(json!({}))).await.unwrap();
    session.begin_execution().await.unwrap();
    let stopped = wait_until_stopped(&session, Duration::from_secs(5), poll).await;
    assert_eq!(stopped.status.state, RunState::Stopped);
    assert_eq!(stopped.status.thread_id, Some(1));

    session.request("continue", Some(json!({"threadId": 1}))).await.unwrap();
    let finished = wait_until_stopped(&session, Duration::from_secs(5), poll).await;
    assert_eq!(finished.status.state, RunState::Terminated);
    assert_eq!(finished.status.exit_code, Some(0));

    let page = session.read_events(0, 100).await;
    let names: Vec<_> = page.events.iter().map(|e| e.event.as_str()).collect();
    assert_eq!(
        names,
        vec!["initialized", "stopped", "continued", "output", "exited", "terminated"]
    );

    session.close().await;
}

#[tokio::test]
async fn adapter_hangup_is_observed_as_disconnected() {
    let registry = SessionRegistry::new();
    let (session, adapter) = connected_session(&registry).await;

    session.request("disconnect", None).await.unwrap();
    let outcome =
        wait_until_stopped(&session, Duration::from_secs(5), Duration::from_millis(20)).await;
    assert_eq!(outcome.status.state, RunState::Disconnected);
    assert!(!outcome.timed_out);
    assert_eq!(adapter.commands(), vec!["disconnect"]);

    assert!(matches!(
        session.request("threads", None).await,
        Err(DapError::SessionClosed { .. })
    ));
}

#[tokio::test]
async fn registry_lookup_after_removal() {
    let registry = SessionRegistry::new();
    let (first, _a1) = connected_session(&registry).await;
    let (second, _a2) = connected_session(&registry).await;

    assert_eq!(registry.resolve(None).await.unwrap().id(), second.id());
    registry.remove(second.id()).await;
    assert_eq!(registry.resolve(None).await.unwrap().id(), first.id());
    assert!(matches!(
        registry.resolve(Some(second.id())).await,
        Err(DapError::NoSuchSession(_))
    ));

    registry.close_all().await;
    second.close().await;
    assert!(first.is_closed());
}
