use agent_pulse::hooks::{validate, HookReceiver};
use agent_pulse::models::hook::{HookEvent, HookKind};

fn event(session_id: &str, pid: Option<u32>) -> HookEvent {
    HookEvent {
        kind: HookKind::RequestStart,
        session_id: session_id.to_owned(),
        pid,
        transcript_path: None,
        timestamp: None,
    }
}

#[test]
fn blank_session_id_is_rejected() {
    assert!(validate(&event("  ", Some(1))).is_err());
}

#[test]
fn zero_pid_is_rejected() {
    let err = validate(&event("abc", Some(0))).expect_err("invalid");
    assert!(err.to_string().starts_with("hook:"));
}

#[test]
fn missing_pid_is_accepted() {
    assert!(validate(&event("abc", None)).is_ok());
}

#[tokio::test]
async fn receive_forwards_valid_event() {
    let (receiver, mut rx) = HookReceiver::channel(4);

    receiver.receive(event("abc", Some(10))).await.expect("accepted");

    let forwarded = rx.recv().await.expect("forwarded");
    assert_eq!(forwarded.session_id, "abc");
    assert_eq!(forwarded.pid, Some(10));
}

#[tokio::test]
async fn receive_drops_invalid_event() {
    let (receiver, mut rx) = HookReceiver::channel(4);

    assert!(receiver.receive(event("", None)).await.is_err());
    drop(receiver);

    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn receive_json_rejects_malformed_payload() {
    let (receiver, _rx) = HookReceiver::channel(4);

    let err = receiver
        .receive_json(serde_json::json!({ "type": "request_start" }))
        .await
        .expect_err("missing session id");

    assert!(err.to_string().contains("malformed hook event"));
}

#[tokio::test]
async fn receive_fails_when_coordinator_stopped() {
    let (receiver, rx) = HookReceiver::channel(4);
    drop(rx);

    assert!(receiver.receive(event("abc", None)).await.is_err());
}
