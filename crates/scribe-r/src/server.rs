//! WebSocket endpoint the browser extension connects to.
//!
//! One socket carries two flows. Outbound, the recorder's [`BridgeRequest`]s
//! go to the most recently connected extension and come back as
//! [`BridgeReply`]s matched on `replyTo`. Inbound, the extension sends commands (`{"type": ...}`)
//! which are handed to whoever holds the command receiver, and the answer is
//! written back as a [`CommandReply`].

use futures::{Sink, SinkExt, StreamExt};
use scribe_common::protocol::{BridgeReply, BridgeRequest, CommandReply, Response};
use scribe_engine::dispatch::dispatch_value;
use scribe_engine::session::Recorder;
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, broadcast, mpsc, oneshot};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

pub type PendingReplies = Arc<Mutex<HashMap<u64, oneshot::Sender<BridgeReply>>>>;

/// A command received from the extension, waiting for its response.
#[derive(Debug)]
pub struct InboundCommand {
    pub request: Value,
    pub reply: oneshot::Sender<Response>,
}

pub struct RemoteServer {
    port: u16,
}

#[derive(Clone)]
pub struct ServerHandle {
    pub local_addr: SocketAddr,
    pub request_tx: broadcast::Sender<BridgeRequest>,
    pub pending: PendingReplies,
    /// Generation of the connection bridge calls go to; 0 when none.
    active: Arc<AtomicU64>,
    generations: Arc<AtomicU64>,
    connected_tx: broadcast::Sender<u64>,
}

impl ServerHandle {
    pub fn is_connected(&self) -> bool {
        self.active.load(Ordering::SeqCst) != 0
    }

    /// Total extension connections accepted so far.
    pub fn connections_accepted(&self) -> u64 {
        self.generations.load(Ordering::SeqCst)
    }

    /// Notified with the generation of every extension connection that
    /// becomes active. Subscribe before anything can connect.
    pub fn subscribe_connections(&self) -> broadcast::Receiver<u64> {
        self.connected_tx.subscribe()
    }

    fn is_active(&self, generation: u64) -> bool {
        self.active.load(Ordering::SeqCst) == generation
    }
}

impl RemoteServer {
    /// Port 0 binds an ephemeral port; see [`ServerHandle::local_addr`].
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn start(&self) -> std::io::Result<(ServerHandle, mpsc::Receiver<InboundCommand>)> {
        let addr = SocketAddr::from(([127, 0, 0, 1], self.port));
        let listener = TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Remote server listening on: {}", local_addr);

        let (request_tx, _) = broadcast::channel(100);
        let (command_tx, command_rx) = mpsc::channel(100);
        let handle = ServerHandle {
            local_addr,
            request_tx,
            pending: Arc::new(Mutex::new(HashMap::new())),
            active: Arc::new(AtomicU64::new(0)),
            generations: Arc::new(AtomicU64::new(0)),
            connected_tx: broadcast::channel(16).0,
        };

        let accept_handle = handle.clone();
        tokio::spawn(async move {
            debug!("Server accept loop started");
            while let Ok((stream, peer)) = listener.accept().await {
                info!("Accepted TCP connection from: {}", peer);
                tokio::spawn(accept_connection(
                    stream,
                    accept_handle.clone(),
                    command_tx.clone(),
                ));
            }
        });

        Ok((handle, command_rx))
    }
}

async fn accept_connection(
    stream: TcpStream,
    handle: ServerHandle,
    command_tx: mpsc::Sender<InboundCommand>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("Error during the websocket handshake occurred: {}", e);
            return;
        }
    };

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let mut request_rx = handle.request_tx.subscribe();
    let generation = handle.generations.fetch_add(1, Ordering::SeqCst) + 1;
    if handle.active.swap(generation, Ordering::SeqCst) != 0 {
        info!("Extension reconnected, previous connection retired");
    } else {
        info!("Extension connected");
    }
    let _ = handle.connected_tx.send(generation);
    let (reply_tx, mut reply_rx) = mpsc::channel::<CommandReply>(100);

    loop {
        tokio::select! {
            // Recorder -> extension
            request = request_rx.recv() => {
                let request = match request {
                    Ok(request) => request,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Connection lagged, {} bridge requests dropped", n);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if !handle.is_active(generation) {
                    continue;
                }
                if !send_json(&mut ws_sender, &request).await {
                    break;
                }
            }

            // Command answers -> extension
            Some(reply) = reply_rx.recv() => {
                if !send_json(&mut ws_sender, &reply).await {
                    break;
                }
            }

            // Extension -> recorder
            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        route_inbound(&text, &handle, &command_tx, &reply_tx).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("WebSocket closed");
                        break;
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    drop(request_rx);
    let was_active = handle
        .active
        .compare_exchange(generation, 0, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok();
    if was_active {
        // Dropping the senders fails every outstanding call with ConnectionLost.
        let abandoned = {
            let mut pending = handle.pending.lock().await;
            let n = pending.len();
            pending.clear();
            n
        };
        if abandoned > 0 {
            warn!("Extension disconnected with {} calls outstanding", abandoned);
        }
    }
}

async fn send_json<S, T>(sink: &mut S, value: &T) -> bool
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
    T: serde::Serialize,
{
    let json = match serde_json::to_string(value) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize outbound message: {}", e);
            return true;
        }
    };
    match sink.send(Message::Text(json)).await {
        Ok(()) => true,
        Err(e) => {
            error!("Failed to send message to WS: {}", e);
            false
        }
    }
}

async fn route_inbound(
    text: &str,
    handle: &ServerHandle,
    command_tx: &mpsc::Sender<InboundCommand>,
    reply_tx: &mpsc::Sender<CommandReply>,
) {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            error!("Failed to parse message from extension: {} | Text: {}", e, text);
            return;
        }
    };

    if value.get("replyTo").is_some() {
        match serde_json::from_value::<BridgeReply>(value) {
            Ok(reply) => {
                let waiting = handle.pending.lock().await.remove(&reply.reply_to);
                match waiting {
                    Some(tx) => {
                        let _ = tx.send(reply);
                    }
                    None => debug!("Reply to unknown or expired call {}", reply.reply_to),
                }
            }
            Err(e) => error!("Malformed bridge reply: {}", e),
        }
        return;
    }

    let rid = value.get("rid").and_then(Value::as_u64);
    let (tx, rx) = oneshot::channel();
    if command_tx
        .send(InboundCommand {
            request: value,
            reply: tx,
        })
        .await
        .is_err()
    {
        warn!("No command handler running, dropping command");
        return;
    }

    // Answered off the read loop: a stop can take a while and steps must keep
    // flowing meanwhile.
    let reply_tx = reply_tx.clone();
    tokio::spawn(async move {
        let Ok(response) = rx.await else {
            return;
        };
        if let Some(rid) = rid {
            let _ = reply_tx.send(CommandReply { rid, response }).await;
        }
    });
}

/// Feed extension commands into the recorder until the server goes away.
/// Each command runs on its own task so a draining stop does not hold up
/// the steps behind it.
pub async fn serve_commands(recorder: Recorder, mut commands: mpsc::Receiver<InboundCommand>) {
    while let Some(command) = commands.recv().await {
        let recorder = recorder.clone();
        tokio::spawn(async move {
            let response = dispatch_value(&recorder, command.request).await;
            let _ = command.reply.send(response);
        });
    }
    debug!("Command channel closed");
}

/// Re-signal observers every time an extension connects, so a session
/// restored (or started) before any extension was attached still reaches it.
pub async fn resync_on_connect(recorder: Recorder, mut connections: broadcast::Receiver<u64>) {
    loop {
        match connections.recv().await {
            Ok(generation) => debug!(generation, "Extension connection active, resyncing"),
            Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => break,
        }
        recorder.resync().await;
    }
}
