use futures::{SinkExt, StreamExt};
use scribe_common::protocol::{BridgeRequest, CommandReply, Response};
use scribe_engine::backend::{Backend, BackendError};
use scribe_engine::config::RecorderConfig;
use scribe_engine::delivery::Delivery;
use scribe_engine::protocol::{ObserverSignal, Surface};
use scribe_engine::recovery::{MemoryStateStore, PersistedState};
use scribe_engine::session::Recorder;
use scribe_r::backend::RemoteBackend;
use scribe_r::server::{RemoteServer, ServerHandle, resync_on_connect, serve_commands};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect_simulated_client(handle: &ServerHandle) -> Client {
    let url = format!("ws://{}", handle.local_addr);
    let (ws_stream, _) = connect_async(&url).await.expect("Failed to connect");

    tokio::time::timeout(Duration::from_secs(2), async {
        while !handle.is_connected() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Server never registered the connection");
    ws_stream
}

async fn next_json(client: &mut Client) -> Value {
    let msg = tokio::time::timeout(Duration::from_secs(2), client.next())
        .await
        .expect("Timeout waiting for message")
        .expect("Client stream ended unexpectedly")
        .expect("WS error");
    serde_json::from_str(&msg.to_string()).expect("Failed to deserialize")
}

async fn send_json(client: &mut Client, value: Value) {
    client
        .send(Message::Text(value.to_string()))
        .await
        .expect("Failed to send");
}

async fn start_server() -> ServerHandle {
    let (handle, _commands) = RemoteServer::new(0).start().await.expect("Failed to start server");
    handle
}

#[tokio::test]
async fn test_capture_round_trip() {
    let handle = start_server().await;
    let mut client = connect_simulated_client(&handle).await;
    let backend = Arc::new(RemoteBackend::new(handle, Duration::from_secs(2)));

    let b = backend.clone();
    let capture = tokio::spawn(async move { b.capture_visible().await });

    let request: BridgeRequest = serde_json::from_value(next_json(&mut client).await).unwrap();
    assert_eq!(request.call.name(), "capture_visible");
    send_json(
        &mut client,
        json!({"replyTo": request.id, "ok": true, "data": "data:image/png;base64,QUJD"}),
    )
    .await;

    let shot = capture.await.unwrap().unwrap();
    assert_eq!(shot.as_deref(), Some("data:image/png;base64,QUJD"));
}

#[tokio::test]
async fn test_surface_listing_and_signal_error() {
    let handle = start_server().await;
    let mut client = connect_simulated_client(&handle).await;
    let backend = Arc::new(RemoteBackend::new(handle, Duration::from_secs(2)));

    let b = backend.clone();
    let listing = tokio::spawn(async move { b.surfaces().await });
    let request = next_json(&mut client).await;
    assert_eq!(request["call"], "list_surfaces");
    send_json(
        &mut client,
        json!({"replyTo": request["id"], "ok": true, "data": [
            {"id": 4, "url": "https://a.test"},
            {"id": 9, "url": "chrome://newtab"}
        ]}),
    )
    .await;
    let surfaces = listing.await.unwrap().unwrap();
    assert_eq!(surfaces, vec![Surface::new(4, "https://a.test"), Surface::new(9, "chrome://newtab")]);

    let b = backend.clone();
    let signal = tokio::spawn(async move {
        b.signal(&Surface::new(4, "https://a.test"), ObserverSignal::BeginObserving)
            .await
    });
    let request = next_json(&mut client).await;
    assert_eq!(request["call"], "signal");
    assert_eq!(request["surfaceId"], 4);
    assert_eq!(request["message"]["type"], "START_RECORDING");
    send_json(
        &mut client,
        json!({"replyTo": request["id"], "ok": false, "error": "Receiving end does not exist"}),
    )
    .await;

    match signal.await.unwrap() {
        Err(BackendError::Remote(msg)) => assert_eq!(msg, "Receiving end does not exist"),
        other => panic!("expected a remote error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_call_without_extension_fails_fast() {
    let handle = start_server().await;
    let backend = RemoteBackend::new(handle, Duration::from_secs(30));

    assert!(matches!(
        backend.keep_alive().await,
        Err(BackendError::NotConnected)
    ));
}

#[tokio::test]
async fn test_unanswered_call_times_out() {
    let handle = start_server().await;
    let _client = connect_simulated_client(&handle).await;
    let backend = RemoteBackend::new(handle.clone(), Duration::from_millis(50));

    match backend.keep_alive().await {
        Err(BackendError::Timeout { operation }) => assert_eq!(operation, "keep_alive"),
        other => panic!("expected a timeout, got {:?}", other),
    }
    assert!(handle.pending.lock().await.is_empty());
}

#[tokio::test]
async fn test_disconnect_fails_outstanding_calls() {
    let handle = start_server().await;
    let mut client = connect_simulated_client(&handle).await;
    let backend = Arc::new(RemoteBackend::new(handle, Duration::from_secs(5)));

    let b = backend.clone();
    let pending = tokio::spawn(async move { b.capture_visible().await });
    next_json(&mut client).await;
    client.close(None).await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(3), pending)
        .await
        .expect("call was never failed")
        .unwrap();
    assert!(matches!(result, Err(BackendError::ConnectionLost)));
}

#[tokio::test]
async fn test_latest_connection_receives_calls() {
    let handle = start_server().await;
    let mut first = connect_simulated_client(&handle).await;
    let url = format!("ws://{}", handle.local_addr);
    let (mut second, _) = connect_async(&url).await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), async {
        while handle.connections_accepted() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let backend = Arc::new(RemoteBackend::new(handle, Duration::from_secs(2)));
    let b = backend.clone();
    let call = tokio::spawn(async move { b.active_surface().await });

    let request = next_json(&mut second).await;
    assert_eq!(request["call"], "active_surface");
    send_json(&mut second, json!({"replyTo": request["id"], "ok": true, "data": null})).await;
    assert_eq!(call.await.unwrap().unwrap(), None);

    let stray = tokio::time::timeout(Duration::from_millis(100), first.next()).await;
    assert!(stray.is_err(), "retired connection should not receive calls");
}

#[tokio::test]
async fn test_calls_racing_a_disconnect_fail_promptly() {
    let handle = start_server().await;
    for _ in 0..20 {
        let mut client = connect_simulated_client(&handle).await;
        let backend = Arc::new(RemoteBackend::new(handle.clone(), Duration::from_secs(30)));

        let b = backend.clone();
        let call = tokio::spawn(async move { b.keep_alive().await });
        client.close(None).await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(3), call)
            .await
            .expect("call waited for the full timeout")
            .unwrap();
        assert!(matches!(
            result,
            Err(BackendError::NotConnected) | Err(BackendError::ConnectionLost)
        ));

        tokio::time::timeout(Duration::from_secs(2), async {
            while handle.is_connected() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }
    assert!(handle.pending.lock().await.is_empty());
}

/// Plays the extension: answers bridge calls and forwards command replies.
async fn fake_extension(
    mut client: Client,
    mut outgoing: mpsc::Receiver<Value>,
    replies: mpsc::Sender<CommandReply>,
) {
    loop {
        tokio::select! {
            Some(command) = outgoing.recv() => send_json(&mut client, command).await,
            msg = client.next() => {
                let Some(Ok(Message::Text(text))) = msg else { break };
                let value: Value = serde_json::from_str(&text).unwrap();
                if value.get("rid").is_some() {
                    replies.send(serde_json::from_value(value).unwrap()).await.unwrap();
                    continue;
                }
                let data = match value["call"].as_str().unwrap() {
                    "capture_visible" => json!("data:image/png;base64,UEFHRQ=="),
                    "list_surfaces" => json!([{"id": 1, "url": "https://app.test"}]),
                    "active_surface" => json!({"id": 1, "url": "https://app.test"}),
                    _ => Value::Null,
                };
                send_json(&mut client, json!({"replyTo": value["id"], "ok": true, "data": data})).await;
            }
        }
    }
}

#[tokio::test]
async fn test_extension_commands_drive_recorder() -> anyhow::Result<()> {
    let (handle, commands) = RemoteServer::new(0).start().await?;
    let client = connect_simulated_client(&handle).await;

    let backend = Arc::new(RemoteBackend::new(handle, Duration::from_secs(2)));
    let recorder = Recorder::new(
        RecorderConfig {
            settle_delay_ms: 0,
            observer_init_delay_ms: 0,
            ..Default::default()
        },
        backend,
        Arc::new(MemoryStateStore::new()),
        Delivery::new("http://127.0.0.1:9/unused"),
    );
    tokio::spawn(serve_commands(recorder.clone(), commands));

    let (out_tx, out_rx) = mpsc::channel(10);
    let (reply_tx, mut reply_rx) = mpsc::channel(10);
    tokio::spawn(fake_extension(client, out_rx, reply_tx));

    out_tx.send(json!({"rid": 1, "type": "START_RECORDING"})).await?;
    let reply = reply_rx.recv().await.unwrap();
    assert_eq!(reply.rid, 1);
    let session_id = match reply.response {
        Response::Started { success, session_id } => {
            assert!(success);
            session_id
        }
        other => panic!("expected a start acknowledgement, got {:?}", other),
    };

    out_tx
        .send(json!({"rid": 2, "type": "NEW_STEP", "payload": {"action": "click", "label": "Login"}}))
        .await?;
    assert_eq!(reply_rx.recv().await.unwrap().response, Response::ack());

    out_tx.send(json!({"rid": 3, "type": "GET_STATUS"})).await?;
    let status = serde_json::to_value(reply_rx.recv().await.unwrap().response)?;
    assert_eq!(
        status,
        json!({"isRecording": true, "sessionId": session_id, "stepCount": 1})
    );

    out_tx.send(json!({"rid": 4, "type": "REWIND"})).await?;
    assert_eq!(reply_rx.recv().await.unwrap().response, Response::rejected());

    let steps = recorder.steps().await;
    assert_eq!(steps[0].screenshot.as_deref(), Some("data:image/png;base64,UEFHRQ=="));
    Ok(())
}

#[tokio::test]
async fn test_restored_session_reaches_late_extension() {
    let (handle, _commands) = RemoteServer::new(0).start().await.unwrap();
    let connections = handle.subscribe_connections();
    let backend = Arc::new(RemoteBackend::new(handle.clone(), Duration::from_secs(2)));

    let recorder = Recorder::restore(
        RecorderConfig::default(),
        backend,
        Arc::new(MemoryStateStore::with_state(PersistedState::recording("s-before"))),
        Delivery::new("http://127.0.0.1:9/unused"),
    )
    .await;
    assert!(recorder.is_recording().await);
    tokio::spawn(resync_on_connect(recorder.clone(), connections));

    let mut client = connect_simulated_client(&handle).await;

    let request = next_json(&mut client).await;
    assert_eq!(request["call"], "list_surfaces");
    send_json(
        &mut client,
        json!({"replyTo": request["id"], "ok": true, "data": [
            {"id": 3, "url": "https://app.test"},
            {"id": 8, "url": "chrome://newtab"}
        ]}),
    )
    .await;

    let request = next_json(&mut client).await;
    assert_eq!(request["call"], "signal");
    assert_eq!(request["surfaceId"], 3);
    assert_eq!(request["message"]["type"], "START_RECORDING");
    send_json(&mut client, json!({"replyTo": request["id"], "ok": true})).await;

    assert_eq!(recorder.status().await.session_id.as_deref(), Some("s-before"));
}
