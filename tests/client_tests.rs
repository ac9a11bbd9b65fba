#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Integration tests for `CollabClient`.
//!
//! Drives the client against in-memory transports from `tests/common`:
//! the test plays the server, pushing frames and reading what the client sent.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use collab_client::event::{self, ErrorKind, Event, PresenceChange};
use collab_client::protocol::{Id, ServerMessage, UserProfile};
use collab_client::{
    CollabClient, CollabConfig, CollabError, FileUpload, HistoryQuery, ImageUpload, Lifecycle,
};
use serde_json::json;

use common::{
    chat_message_json, connection_established_json, file_list_json, message_history_json, names,
    record, room_joined_json, settle, BrokenTransport, LoopbackServer, MockConnector,
    MockTransport,
};

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

const URL: &str = "ws://collab.test/ws";

/// A client that has completed the handshake on a loopback connection.
async fn connected(config: CollabConfig) -> (CollabClient, LoopbackServer, MockConnector) {
    let connector = MockConnector::new();
    let server = connector.push_loopback();
    let client = CollabClient::new(config, connector.clone());
    server.push_json(connection_established_json("c1", "al"));
    client.connect(Some("tok")).await.expect("connect");
    (client, server, connector)
}

fn errors(client: &CollabClient) -> Arc<Mutex<Vec<ErrorKind>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let l = Arc::clone(&log);
    client.on(event::ERROR, move |ev| {
        if let Event::Error(err) = ev {
            l.lock().unwrap().push(err.kind);
        }
    });
    log
}

// ════════════════════════════════════════════════════════════════════
// Connect
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn connect_resolves_on_handshake_not_on_open() {
    let connector = MockConnector::new();
    let server = connector.push_loopback();
    let client = Arc::new(CollabClient::new(CollabConfig::new(URL), connector.clone()));
    let log = record(client.events(), &[event::CONNECTED, "connection_established"]);

    let c = Arc::clone(&client);
    let handle = tokio::spawn(async move { c.connect(Some("s3cret")).await });
    settle().await;

    assert_eq!(client.lifecycle(), Lifecycle::Open);
    assert!(client.is_connected());
    assert!(!handle.is_finished(), "connect must wait for the handshake");
    assert_eq!(names(&log), vec![event::CONNECTED]);

    server.push_json(connection_established_json("c1", "al"));
    let me = handle.await.unwrap().unwrap();

    assert_eq!(me.client_id, Id::from("c1"));
    assert_eq!(client.client_id(), Some(Id::from("c1")));
    assert_eq!(
        client.user().and_then(|u| u.username),
        Some("al".to_owned())
    );
    assert_eq!(connector.endpoints(), vec![format!("{URL}?token=s3cret")]);
    assert_eq!(
        names(&log),
        vec![event::CONNECTED, "connection_established"]
    );
}

#[tokio::test]
async fn concurrent_connects_share_one_transport() {
    let connector = MockConnector::new();
    let server = connector.push_loopback();
    let client = CollabClient::new(CollabConfig::new(URL), connector.clone());

    let (a, b, ()) = tokio::join!(client.connect(None), client.connect(None), async {
        settle().await;
        server.push_json(connection_established_json("c1", "al"));
    });

    assert_eq!(a.unwrap().client_id, Id::from("c1"));
    assert_eq!(b.unwrap().client_id, Id::from("c1"));
    assert_eq!(connector.attempts(), 1);

    // Already established: resolves with the current identity at once.
    let again = client.connect(None).await.unwrap();
    assert_eq!(again.client_id, Id::from("c1"));
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test]
async fn connect_fails_when_refused_and_reconnect_disabled() {
    let connector = MockConnector::new();
    connector.push_refusal();
    let client = CollabClient::new(
        CollabConfig::new(URL).with_auto_reconnect(false),
        connector.clone(),
    );
    let errs = errors(&client);

    let err = client.connect(None).await.unwrap_err();
    assert!(matches!(err, CollabError::Disconnected));
    assert_eq!(client.lifecycle(), Lifecycle::Closed);
    assert_eq!(*errs.lock().unwrap(), vec![ErrorKind::Connect]);
}

#[tokio::test(start_paused = true)]
async fn connect_keeps_waiting_across_a_failed_attempt() {
    let connector = MockConnector::new();
    connector.push_refusal();
    let server = connector.push_loopback();
    server.push_json(connection_established_json("c2", "al"));
    let client = CollabClient::new(CollabConfig::new(URL), connector.clone());

    let started = tokio::time::Instant::now();
    let me = client.connect(Some("t")).await.unwrap();

    assert_eq!(me.client_id, Id::from("c2"));
    assert_eq!(connector.attempts(), 2);
    assert!(started.elapsed() >= Duration::from_secs(3));
}

#[tokio::test]
async fn connect_times_out_without_handshake() {
    let connector = MockConnector::new();
    let _server = connector.push_loopback();
    let client = CollabClient::new(
        CollabConfig::new(URL).with_request_timeout(Duration::from_millis(50)),
        connector,
    );
    let err = client.connect(None).await.unwrap_err();
    assert!(matches!(err, CollabError::Timeout));
    // The transport itself stays open.
    assert_eq!(client.lifecycle(), Lifecycle::Open);
}

// ════════════════════════════════════════════════════════════════════
// Correlated requests
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn join_room_sends_request_and_resolves_with_payload() {
    let (client, mut server, _connector) = connected(CollabConfig::new(URL)).await;

    let (joined, sent) = tokio::join!(client.join_room("r1"), async {
        let sent = server.next_sent().await;
        server.push_json(room_joined_json("r1"));
        sent
    });

    assert_eq!(sent, json!({"type": "join_room", "roomId": "r1"}));
    let joined = joined.unwrap();
    assert_eq!(joined.room_id, "r1");
    assert_eq!(joined.current_users.len(), 1);
    assert_eq!(client.current_room_id().as_deref(), Some("r1"));
}

#[tokio::test]
async fn concurrent_joins_resolve_in_call_order() {
    let (client, mut server, _connector) = connected(CollabConfig::new(URL)).await;

    let (a, b, ()) = tokio::join!(client.join_room("r1"), client.join_room("r2"), async {
        assert_eq!(server.next_sent().await["roomId"], "r1");
        assert_eq!(server.next_sent().await["roomId"], "r2");
        server.push_json(room_joined_json("r1"));
        server.push_json(room_joined_json("r2"));
    });

    assert_eq!(a.unwrap().room_id, "r1");
    assert_eq!(b.unwrap().room_id, "r2");
    assert_eq!(client.current_room_id().as_deref(), Some("r2"));
}

#[tokio::test]
async fn get_messages_resolves_with_history() {
    let (client, mut server, _connector) = connected(CollabConfig::new(URL)).await;

    let (history, sent) = tokio::join!(
        client.get_messages(HistoryQuery::new().with_limit(20)),
        async {
            let sent = server.next_sent().await;
            server.push_json(message_history_json(&[1, 2, 3]));
            sent
        }
    );

    assert_eq!(sent, json!({"type": "get_messages", "limit": 20}));
    let ids: Vec<Id> = history.unwrap().into_iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![Id::Number(1), Id::Number(2), Id::Number(3)]);
}

#[tokio::test]
async fn get_files_resolves_with_listing() {
    let (client, mut server, _connector) = connected(CollabConfig::new(URL)).await;

    let (files, sent) = tokio::join!(client.get_files(Some("/docs")), async {
        let sent = server.next_sent().await;
        server.push_json(file_list_json(&["a.txt", "b.png"]));
        sent
    });

    assert_eq!(sent, json!({"type": "get_files", "path": "/docs"}));
    assert_eq!(
        files.unwrap(),
        vec![json!({"name": "a.txt"}), json!({"name": "b.png"})]
    );
}

#[tokio::test]
async fn request_times_out_and_late_response_is_still_routed() {
    let (client, server, _connector) =
        connected(CollabConfig::new(URL).with_request_timeout(Duration::from_millis(50))).await;
    let log = record(client.events(), &[event::ROOM_JOINED]);

    let err = client.join_room("slow").await.unwrap_err();
    assert!(matches!(err, CollabError::Timeout));

    server.push_json(room_joined_json("slow"));
    settle().await;
    assert_eq!(names(&log), vec![event::ROOM_JOINED]);
    assert_eq!(client.current_room_id().as_deref(), Some("slow"));
}

#[tokio::test]
async fn pending_request_is_rejected_on_disconnect() {
    let (client, mut server, _connector) = connected(CollabConfig::new(URL)).await;

    let (joined, ()) = tokio::join!(client.join_room("r1"), async {
        server.next_sent().await;
        server.hang_up();
    });

    assert!(matches!(joined, Err(CollabError::Disconnected)));
    assert_eq!(client.lifecycle(), Lifecycle::Closed);
}

#[tokio::test]
async fn requests_fail_fast_when_not_connected() {
    let client = CollabClient::new(CollabConfig::new(URL), MockConnector::new());

    assert!(matches!(
        client.join_room("r1").await,
        Err(CollabError::NotConnected)
    ));
    assert!(matches!(
        client.get_messages(HistoryQuery::default()).await,
        Err(CollabError::NotConnected)
    ));
    assert!(matches!(
        client.send_message("hi").await,
        Err(CollabError::NotConnected)
    ));
    assert_eq!(client.lifecycle(), Lifecycle::Idle);
}

// ════════════════════════════════════════════════════════════════════
// Fire-and-forget
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn fire_and_forget_messages_match_the_wire_format() {
    let (client, mut server, _connector) = connected(CollabConfig::new(URL)).await;

    client.send_message("hello").await.unwrap();
    assert_eq!(
        server.next_sent().await,
        json!({"type": "text_message", "content": "hello"})
    );

    client
        .send_image(ImageUpload::new("cat.png", "data:image/png;base64,AA").with_caption("cat"))
        .await
        .unwrap();
    assert_eq!(
        server.next_sent().await,
        json!({
            "type": "image_message",
            "filename": "cat.png",
            "data": "data:image/png;base64,AA",
            "caption": "cat",
        })
    );

    client
        .upload_file(FileUpload::new("notes.txt", "aGk=").with_path("/docs"))
        .await
        .unwrap();
    assert_eq!(
        server.next_sent().await,
        json!({
            "type": "file_upload_complete",
            "filename": "notes.txt",
            "data": "aGk=",
            "path": "/docs",
        })
    );

    client
        .broadcast_state("whiteboard", json!({"strokes": 3}))
        .await
        .unwrap();
    let sent = server.next_sent().await;
    assert_eq!(sent["type"], "app_state_broadcast");
    assert_eq!(sent["appName"], "whiteboard");
    assert_eq!(sent["state"], json!({"strokes": 3}));
    assert!(sent["timestamp"].as_i64().unwrap() > 0);
    assert!(sent.get("userId").is_none());
}

#[tokio::test]
async fn send_after_server_close_is_rejected() {
    let (client, mut server, _connector) =
        connected(CollabConfig::new(URL).with_auto_reconnect(false)).await;
    server.hang_up();
    settle().await;

    assert_eq!(client.lifecycle(), Lifecycle::Closed);
    assert!(matches!(
        client.send_message("late").await,
        Err(CollabError::NotConnected)
    ));
    assert_eq!(client.lifecycle(), Lifecycle::Closed);
    assert!(server.drain_sent().is_empty());
}

#[tokio::test]
async fn send_accepted_while_open_reports_the_failed_write() {
    let (client, server, _connector) =
        connected(CollabConfig::new(URL).with_auto_reconnect(false)).await;
    let errs = errors(&client);

    // The loop has not seen the close yet, so the message is accepted and
    // its write hits the dead connection.
    drop(server);
    assert_eq!(client.lifecycle(), Lifecycle::Open);
    assert!(matches!(
        client.send_message("late").await,
        Err(CollabError::TransportClosed)
    ));
    assert_eq!(*errs.lock().unwrap(), vec![ErrorKind::Transport]);

    settle().await;
    assert_eq!(client.lifecycle(), Lifecycle::Closed);
}

#[tokio::test]
async fn failed_write_is_returned_to_the_sender() {
    let connector = MockConnector::new();
    connector.push(BrokenTransport::new(vec![connection_established_json(
        "c1", "al",
    )]));
    let client = CollabClient::new(CollabConfig::new(URL), connector);
    let errs = errors(&client);
    client.connect(None).await.unwrap();

    assert!(matches!(
        client.send_message("lost").await,
        Err(CollabError::TransportSend(_))
    ));
    assert!(matches!(
        client.join_room("r1").await,
        Err(CollabError::TransportSend(_))
    ));
    assert_eq!(
        *errs.lock().unwrap(),
        vec![ErrorKind::Transport, ErrorKind::Transport]
    );
    // A failed write does not close the connection by itself.
    assert_eq!(client.lifecycle(), Lifecycle::Open);
}

// ════════════════════════════════════════════════════════════════════
// Inbound routing
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn user_joined_emits_raw_catch_all_and_presence() {
    let (client, server, _connector) = connected(CollabConfig::new(URL)).await;
    let log = record(
        client.events(),
        &["user_joined", event::MESSAGE, event::USER_PRESENCE],
    );

    server.push_json(json!({"type": "user_joined", "userId": 7, "user": {"username": "bo"}}));
    settle().await;

    assert_eq!(
        names(&log),
        vec!["user_joined", event::MESSAGE, event::USER_PRESENCE]
    );
    let log = log.lock().unwrap();
    let presence = log[2].1.presence().unwrap();
    assert_eq!(presence.change, PresenceChange::Joined);
    assert_eq!(presence.user_id, Id::Number(7));
    assert_eq!(presence.user, Some(UserProfile::named("bo")));
}

#[tokio::test]
async fn chat_entries_reach_chat_message_handlers() {
    let (client, server, _connector) = connected(CollabConfig::new(URL)).await;
    let log = record(client.events(), &[event::CHAT_MESSAGE]);

    server.push_json(chat_message_json(10, "hi"));
    settle().await;

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1);
    match log[0].1.server_message() {
        Some(ServerMessage::TextMessage(msg)) => assert_eq!(msg.content, "hi"),
        other => panic!("expected text message, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_tags_are_forwarded_verbatim() {
    let (client, server, _connector) = connected(CollabConfig::new(URL)).await;
    let log = record(client.events(), &["cursor_moved", event::MESSAGE]);

    let raw = json!({"type": "cursor_moved", "x": 4, "y": 2});
    server.push_json(raw.clone());
    settle().await;

    assert_eq!(names(&log), vec!["cursor_moved", event::MESSAGE]);
    let log = log.lock().unwrap();
    assert_eq!(serde_json::to_value(log[0].1.inbound().unwrap()).unwrap(), raw);
}

#[tokio::test]
async fn undecodable_frame_reports_error_and_processing_continues() {
    let (client, server, _connector) = connected(CollabConfig::new(URL)).await;
    let errs = errors(&client);
    let log = record(client.events(), &[event::CHAT_MESSAGE]);

    server.push("{not json");
    server.push_json(json!({"no": "type"}));
    server.push_json(chat_message_json(1, "still here"));
    settle().await;

    assert_eq!(
        *errs.lock().unwrap(),
        vec![ErrorKind::Decode, ErrorKind::Decode]
    );
    assert_eq!(log.lock().unwrap().len(), 1);
    assert_eq!(client.lifecycle(), Lifecycle::Open);
}

#[tokio::test]
async fn scripted_transport_error_does_not_change_state() {
    let hello = connection_established_json("c1", "al").to_string();
    let (transport, _sent, _closed) = MockTransport::new(vec![
        Some(Ok(hello)),
        Some(Err(CollabError::TransportReceive("boom".into()))),
        Some(Ok(chat_message_json(1, "after").to_string())),
    ]);
    let connector = MockConnector::new();
    connector.push(transport);
    let client = CollabClient::new(CollabConfig::new(URL), connector);
    let errs = errors(&client);
    let log = record(client.events(), &[event::CHAT_MESSAGE]);

    client.connect(None).await.unwrap();
    settle().await;

    assert_eq!(*errs.lock().unwrap(), vec![ErrorKind::Transport]);
    assert_eq!(log.lock().unwrap().len(), 1);
    assert_eq!(client.lifecycle(), Lifecycle::Open);
}

#[tokio::test]
async fn scripted_server_close_is_reported() {
    let (transport, _sent, closed) = MockTransport::new(vec![
        Some(Ok(connection_established_json("c1", "al").to_string())),
        None,
    ]);
    let connector = MockConnector::new();
    connector.push(transport);
    let client = CollabClient::new(
        CollabConfig::new(URL).with_auto_reconnect(false),
        connector,
    );
    let log = record(client.events(), &[event::DISCONNECTED]);

    client.connect(None).await.unwrap();
    settle().await;

    assert_eq!(client.lifecycle(), Lifecycle::Closed);
    // The server closed it; the client never called close.
    assert!(!closed.load(std::sync::atomic::Ordering::Relaxed));
    let log = log.lock().unwrap();
    match &log[0].1 {
        Event::Disconnected(info) => {
            assert!(!info.by_caller);
            assert!(!info.will_reconnect);
            assert!(info.reason.is_some());
        }
        other => panic!("expected Disconnected, got {other:?}"),
    }
}

// ════════════════════════════════════════════════════════════════════
// Reconnect and disconnect
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn reconnects_after_delay_with_same_token() {
    let connector = MockConnector::new();
    let mut first = connector.push_loopback();
    let second = connector.push_loopback();
    let client = CollabClient::new(CollabConfig::new(URL), connector.clone());
    let log = record(client.events(), &[event::CONNECTED, event::DISCONNECTED]);

    first.push_json(connection_established_json("c1", "al"));
    client.connect(Some("s3cret")).await.unwrap();

    first.hang_up();
    settle().await;
    assert_eq!(client.lifecycle(), Lifecycle::Closed);
    assert_eq!(connector.attempts(), 1);

    tokio::time::sleep(Duration::from_millis(2_999)).await;
    settle().await;
    assert_eq!(connector.attempts(), 1);

    tokio::time::sleep(Duration::from_millis(1)).await;
    settle().await;
    assert_eq!(connector.attempts(), 2);
    assert_eq!(client.lifecycle(), Lifecycle::Open);
    let expected = format!("{URL}?token=s3cret");
    assert_eq!(connector.endpoints(), vec![expected.clone(), expected]);

    second.push_json(connection_established_json("c2", "al"));
    settle().await;
    assert_eq!(client.client_id(), Some(Id::from("c2")));
    assert_eq!(
        names(&log),
        vec![event::CONNECTED, event::DISCONNECTED, event::CONNECTED]
    );
}

#[tokio::test(start_paused = true)]
async fn explicit_disconnect_suppresses_reconnect() {
    let (client, server, connector) = connected(CollabConfig::new(URL)).await;
    let log = record(client.events(), &[event::DISCONNECTED]);

    client.disconnect().await;

    assert!(server.client_closed());
    assert_eq!(client.lifecycle(), Lifecycle::Closed);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(connector.attempts(), 1);

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1);
    match &log[0].1 {
        Event::Disconnected(info) => {
            assert!(info.by_caller);
            assert!(!info.will_reconnect);
        }
        other => panic!("expected Disconnected, got {other:?}"),
    }
}

#[tokio::test]
async fn disconnect_during_first_dial_rejects_connect() {
    let connector = MockConnector::new();
    connector.push_hang();
    let client = CollabClient::new(CollabConfig::new(URL), connector.clone());
    let log = record(client.events(), &[event::DISCONNECTED]);

    let (outcome, ()) = tokio::join!(client.connect(None), async {
        settle().await;
        assert_eq!(client.lifecycle(), Lifecycle::Connecting);
        assert_eq!(connector.attempts(), 1);
        client.disconnect().await;
    });

    assert!(matches!(outcome, Err(CollabError::Disconnected)));
    assert_eq!(client.lifecycle(), Lifecycle::Closed);
    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1);
    match &log[0].1 {
        Event::Disconnected(info) => {
            assert!(info.by_caller);
            assert!(!info.will_reconnect);
        }
        other => panic!("expected Disconnected, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn disconnect_during_reconnect_dial_stops_for_good() {
    let connector = MockConnector::new();
    let mut first = connector.push_loopback();
    connector.push_hang();
    let client = CollabClient::new(CollabConfig::new(URL), connector.clone());
    first.push_json(connection_established_json("c1", "al"));
    client.connect(None).await.unwrap();
    let log = record(client.events(), &[event::DISCONNECTED]);

    first.hang_up();
    settle().await;
    tokio::time::sleep(Duration::from_secs(3)).await;
    settle().await;
    assert_eq!(connector.attempts(), 2);
    assert_eq!(client.lifecycle(), Lifecycle::Connecting);

    // A second connect joins the dial in flight and is rejected with it.
    let (rejoined, ()) = tokio::join!(client.connect(None), async {
        settle().await;
        client.disconnect().await;
    });
    assert!(matches!(rejoined, Err(CollabError::Disconnected)));
    assert_eq!(client.lifecycle(), Lifecycle::Closed);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(connector.attempts(), 2);

    let log = log.lock().unwrap();
    let infos: Vec<_> = log
        .iter()
        .map(|(_, ev)| match ev {
            Event::Disconnected(info) => (info.by_caller, info.will_reconnect),
            other => panic!("expected Disconnected, got {other:?}"),
        })
        .collect();
    assert_eq!(infos, vec![(false, true), (true, false)]);
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_pending_reconnect() {
    let (client, mut server, connector) = connected(CollabConfig::new(URL)).await;
    let log = record(client.events(), &[event::DISCONNECTED]);

    server.hang_up();
    settle().await;
    client.disconnect().await;
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(connector.attempts(), 1);
    assert_eq!(client.lifecycle(), Lifecycle::Closed);
    // Only the server close was reported.
    assert_eq!(log.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn connect_after_disconnect_starts_a_new_connection() {
    let (client, _server, connector) = connected(CollabConfig::new(URL)).await;
    client.disconnect().await;

    let server = connector.push_loopback();
    server.push_json(connection_established_json("c9", "al"));
    let me = client.connect(None).await.unwrap();

    assert_eq!(me.client_id, Id::from("c9"));
    assert_eq!(connector.attempts(), 2);
    assert_eq!(client.lifecycle(), Lifecycle::Open);
}

// ════════════════════════════════════════════════════════════════════
// Subscriptions and isolation
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn once_and_off_through_the_client() {
    let (client, server, _connector) = connected(CollabConfig::new(URL)).await;
    let once_hits = Arc::new(Mutex::new(0));
    let on_hits = Arc::new(Mutex::new(0));

    let o = Arc::clone(&once_hits);
    client.once(event::CHAT_MESSAGE, move |_| *o.lock().unwrap() += 1);
    let h = Arc::clone(&on_hits);
    let sub = client.on(event::CHAT_MESSAGE, move |_| *h.lock().unwrap() += 1);

    server.push_json(chat_message_json(1, "a"));
    settle().await;
    assert!(client.off(sub.event(), sub.id()));
    server.push_json(chat_message_json(2, "b"));
    settle().await;

    assert_eq!(*once_hits.lock().unwrap(), 1);
    assert_eq!(*on_hits.lock().unwrap(), 1);
}

#[tokio::test]
async fn client_instances_are_independent() {
    let (a, server_a, _ca) = connected(CollabConfig::new(URL)).await;
    let (b, _server_b, _cb) = connected(CollabConfig::new(URL)).await;
    let log_b = record(b.events(), &[event::ROOM_JOINED, event::MESSAGE]);

    server_a.push_json(room_joined_json("only-a"));
    settle().await;

    assert_eq!(a.current_room_id().as_deref(), Some("only-a"));
    assert!(b.current_room_id().is_none());
    assert!(log_b.lock().unwrap().is_empty());
}
