//! Tests for `src/bridge.rs` — one reply per authorized, well-formed command.

use std::time::Duration;

use serde_json::json;

use editor_bridge::command::{Command, FileContent, Reply};
use editor_bridge::editor::{EditorClient, RequestError};
use editor_bridge::kernel::KernelError;
use editor_bridge::transport::{reply_channel, InboundMessage};

use super::support::{harness, settle, EDITOR_ORIGIN, TIMEOUT};

#[tokio::test]
async fn write_from_authorized_origin_is_acked() {
    let h = harness();
    let (port, rx) = reply_channel();
    h.transport
        .sender()
        .post(InboundMessage::new(
            EDITOR_ORIGIN,
            json!({ "type": "file:write", "data": { "path": "app.py", "content": "print(1)" } }),
            port,
        ))
        .await
        .expect("post");

    let reply = tokio::time::timeout(TIMEOUT, rx.recv())
        .await
        .expect("reply in time");
    assert_eq!(reply, Some(Reply::Ack));
    assert_eq!(
        serde_json::to_value(Reply::Ack).expect("serialize"),
        json!({ "type": "reply" })
    );
    assert_eq!(h.kernel.calls(), vec!["write app.py"]);
}

#[tokio::test]
async fn install_failure_carries_original_error() {
    let h = harness();
    let error = KernelError::Install {
        requirements: vec!["numpy".to_owned()],
        message: "no matching distribution".to_owned(),
    };
    h.kernel.fail("install", error.clone());

    let (port, rx) = reply_channel();
    h.transport
        .sender()
        .post(InboundMessage::new(
            EDITOR_ORIGIN,
            json!({ "type": "install", "data": { "requirements": ["numpy"] } }),
            port,
        ))
        .await
        .expect("post");

    let reply = rx.recv().await.expect("reply");
    assert_eq!(reply, Reply::Failure { error: error.clone() });

    let wire = serde_json::to_value(&reply).expect("serialize");
    assert_eq!(wire["type"], "reply");
    assert_eq!(
        wire["error"],
        serde_json::to_value(&error).expect("serialize error")
    );
}

#[tokio::test]
async fn every_command_kind_surfaces_its_failure() {
    let h = harness();
    let cases = [
        (
            "write",
            Command::WriteFile {
                path: "a.py".to_owned(),
                content: FileContent::from("x"),
            },
            KernelError::Io {
                path: "a.py".to_owned(),
                message: "read-only filesystem".to_owned(),
            },
        ),
        (
            "rename",
            Command::RenameFile {
                old_path: "a.py".to_owned(),
                new_path: "b.py".to_owned(),
            },
            KernelError::NotFound {
                path: "a.py".to_owned(),
            },
        ),
        (
            "unlink",
            Command::Unlink {
                path: "b.py".to_owned(),
            },
            KernelError::Other {
                message: "busy".to_owned(),
            },
        ),
        (
            "install",
            Command::Install {
                requirements: vec!["altair".to_owned()],
            },
            KernelError::Unsupported {
                message: "offline".to_owned(),
            },
        ),
    ];

    for (op, command, error) in cases {
        h.kernel.fail(op, error.clone());
        let result = h.editor.request(&command, TIMEOUT).await;
        assert_eq!(result, Err(RequestError::Failed(error)), "operation {op}");
    }
    assert_eq!(h.kernel.calls().len(), 4);
}

#[tokio::test]
async fn unauthorized_origin_gets_no_reply_and_no_operation() {
    let h = harness();
    let intruder = EditorClient::new("https://evil.example.com", h.transport.sender());
    let command = Command::WriteFile {
        path: "app.py".to_owned(),
        content: FileContent::from("print(1)"),
    };

    let result = intruder
        .request(&command, Duration::from_millis(200))
        .await;
    assert!(
        matches!(result, Err(RequestError::Dropped | RequestError::Timeout(_))),
        "unexpected result: {result:?}"
    );
    assert!(h.kernel.calls().is_empty());
}

#[tokio::test]
async fn message_without_reply_port_is_not_executed() {
    let h = harness();
    h.transport
        .sender()
        .post(InboundMessage {
            origin: EDITOR_ORIGIN.to_owned(),
            data: json!({ "type": "file:unlink", "data": { "path": "a.py" } }),
            ports: Vec::new(),
        })
        .await
        .expect("post");

    // A later request still goes through, so the first one was fully handled.
    let ok = h
        .editor
        .request(
            &Command::Unlink {
                path: "b.py".to_owned(),
            },
            TIMEOUT,
        )
        .await;
    assert_eq!(ok, Ok(()));
    assert_eq!(h.kernel.calls(), vec!["unlink b.py"]);
}

#[tokio::test]
async fn unknown_command_is_dropped_and_bridge_keeps_listening() {
    let h = harness();
    let result = h
        .editor
        .request_raw(
            json!({ "type": "kernel:restart", "data": {} }),
            Duration::from_millis(200),
        )
        .await;
    assert!(matches!(
        result,
        Err(RequestError::Dropped | RequestError::Timeout(_))
    ));

    let result = h
        .editor
        .request(
            &Command::Install {
                requirements: Vec::new(),
            },
            TIMEOUT,
        )
        .await;
    assert_eq!(result, Ok(()));
    assert_eq!(h.kernel.calls(), vec!["install "]);
}

#[tokio::test]
async fn replies_follow_completion_order() {
    let h = harness();
    let install_gate = h.kernel.gate("install");
    let sender = h.transport.sender();

    let (install_port, mut install_rx) = reply_channel();
    sender
        .post(InboundMessage::new(
            EDITOR_ORIGIN,
            json!({ "type": "install", "data": { "requirements": ["pandas", "numpy"] } }),
            install_port,
        ))
        .await
        .expect("post install");

    let (unlink_port, unlink_rx) = reply_channel();
    sender
        .post(InboundMessage::new(
            EDITOR_ORIGIN,
            json!({ "type": "file:unlink", "data": { "path": "old.py" } }),
            unlink_port,
        ))
        .await
        .expect("post unlink");

    let unlink_reply = tokio::time::timeout(TIMEOUT, unlink_rx.recv())
        .await
        .expect("unlink reply in time");
    assert_eq!(unlink_reply, Some(Reply::Ack));
    assert_eq!(install_rx.try_recv(), Ok(None), "install is still running");

    install_gate.notify_one();
    let install_reply = tokio::time::timeout(TIMEOUT, install_rx.recv())
        .await
        .expect("install reply in time");
    assert_eq!(install_reply, Some(Reply::Ack));
    assert_eq!(
        h.kernel.calls(),
        vec!["install pandas,numpy", "unlink old.py"]
    );
}

#[tokio::test]
async fn each_request_gets_exactly_its_own_reply() {
    let h = harness();
    h.kernel.fail(
        "rename",
        KernelError::NotFound {
            path: "missing.py".to_owned(),
        },
    );
    let sender = h.transport.sender();

    let mut receivers = Vec::new();
    for i in 0..8 {
        let (port, rx) = reply_channel();
        let data = if i % 2 == 0 {
            json!({ "type": "file:write", "data": { "path": format!("f{i}.py"), "content": "" } })
        } else {
            json!({ "type": "file:rename", "data": { "oldPath": "missing.py", "newPath": format!("f{i}.py") } })
        };
        sender
            .post(InboundMessage::new(EDITOR_ORIGIN, data, port))
            .await
            .expect("post");
        receivers.push((i, rx));
    }

    for (i, rx) in receivers {
        let reply = tokio::time::timeout(TIMEOUT, rx.recv())
            .await
            .expect("reply in time")
            .expect("reply sent");
        if i % 2 == 0 {
            assert!(reply.is_ack(), "write {i} should ack");
        } else {
            assert!(!reply.is_ack(), "rename {i} should fail");
        }
    }
    settle().await;
    assert_eq!(h.kernel.calls().len(), 8);
}

#[tokio::test]
async fn panicking_operation_still_replies() {
    let h = harness();
    h.kernel.panic_on("write");

    let result = h
        .editor
        .request(
            &Command::WriteFile {
                path: "boom.py".to_owned(),
                content: FileContent::from(""),
            },
            TIMEOUT,
        )
        .await;
    assert!(matches!(
        result,
        Err(RequestError::Failed(KernelError::Aborted { .. }))
    ));

    let after = h
        .editor
        .request(
            &Command::Unlink {
                path: "boom.py".to_owned(),
            },
            TIMEOUT,
        )
        .await;
    assert_eq!(after, Ok(()));
}
