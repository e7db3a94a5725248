use crate::server::ServerHandle;
use async_trait::async_trait;
use scribe_common::protocol::{BridgeCall, BridgeRequest, ObserverSignal, Surface};
use scribe_engine::backend::{Backend, BackendError};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

/// [`Backend`] served by the browser extension over the remote server.
pub struct RemoteBackend {
    handle: ServerHandle,
    call_timeout: Duration,
    next_id: AtomicU64,
}

impl RemoteBackend {
    pub fn new(handle: ServerHandle, call_timeout: Duration) -> Self {
        Self {
            handle,
            call_timeout,
            next_id: AtomicU64::new(1),
        }
    }

    async fn call(&self, call: BridgeCall) -> Result<Value, BackendError> {
        if !self.handle.is_connected() {
            return Err(BackendError::NotConnected);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let operation = call.name();
        let (tx, rx) = oneshot::channel();
        self.handle.pending.lock().await.insert(id, tx);
        // A disconnect between the first check and the insert would have
        // cleared `pending` without this entry.
        if !self.handle.is_connected() {
            self.handle.pending.lock().await.remove(&id);
            return Err(BackendError::NotConnected);
        }

        debug!(id, "Bridge call: {}", operation);
        if self.handle.request_tx.send(BridgeRequest { id, call }).is_err() {
            self.handle.pending.lock().await.remove(&id);
            return Err(BackendError::NotConnected);
        }

        let reply = match tokio::time::timeout(self.call_timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(BackendError::ConnectionLost),
            Err(_) => {
                self.handle.pending.lock().await.remove(&id);
                return Err(BackendError::Timeout {
                    operation: operation.to_string(),
                });
            }
        };

        if reply.ok {
            Ok(reply.data)
        } else {
            Err(BackendError::Remote(
                reply
                    .error
                    .unwrap_or_else(|| format!("{} failed", operation)),
            ))
        }
    }
}

#[async_trait]
impl Backend for RemoteBackend {
    async fn capture_visible(&self) -> Result<Option<String>, BackendError> {
        match self.call(BridgeCall::CaptureVisible).await? {
            Value::Null => Ok(None),
            Value::String(data_url) => Ok(Some(data_url)),
            other => Err(BackendError::InvalidResponse(format!(
                "expected a data URL, got {}",
                other
            ))),
        }
    }

    async fn surfaces(&self) -> Result<Vec<Surface>, BackendError> {
        let data = self.call(BridgeCall::ListSurfaces).await?;
        Ok(serde_json::from_value(data)?)
    }

    async fn active_surface(&self) -> Result<Option<Surface>, BackendError> {
        let data = self.call(BridgeCall::ActiveSurface).await?;
        Ok(serde_json::from_value(data)?)
    }

    async fn signal(&self, surface: &Surface, signal: ObserverSignal) -> Result<(), BackendError> {
        self.call(BridgeCall::Signal {
            surface_id: surface.id,
            message: signal,
        })
        .await?;
        Ok(())
    }

    async fn install_observer(&self, surface: &Surface) -> Result<(), BackendError> {
        self.call(BridgeCall::InstallObserver {
            surface_id: surface.id,
        })
        .await?;
        Ok(())
    }

    async fn keep_alive(&self) -> Result<(), BackendError> {
        self.call(BridgeCall::KeepAlive).await?;
        Ok(())
    }
}
