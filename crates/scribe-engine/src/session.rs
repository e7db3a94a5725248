//! The recording session state machine.
//!
//! `Idle` is "no [`ActiveSession`]"; `Recording` is "one [`ActiveSession`]".
//! A session is built on start and discarded on stop, never reused. Start
//! and stop are serialized against each other; step submissions are not, so
//! steps keep arriving while a stop drains in-flight enrichment.
//!
//! Step numbers are assigned when enrichment completes. Two steps submitted
//! as A, B are numbered B=1, A=2 if B's snapshot resolves first.

use crate::backend::Backend;
use crate::config::RecorderConfig;
use crate::delivery::Delivery;
use crate::liveness::Heartbeat;
use crate::recovery::{self, PersistedState, StateStore};
use crate::snapshot::{self, SnapshotDeduplicator};
use crate::tracker::InFlight;
use scribe_common::label::resolve_label;
use scribe_common::protocol::{ObserverSignal, RecordingStatus};
use scribe_common::step::{DeliveryPayload, RawStep, Step};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

struct ActiveSession {
    id: String,
    steps: Vec<Step>,
    dedup: SnapshotDeduplicator,
    in_flight: InFlight,
}

impl ActiveSession {
    fn new(id: String, fingerprint_prefix: usize) -> Self {
        Self {
            id,
            steps: Vec::new(),
            dedup: SnapshotDeduplicator::new(fingerprint_prefix),
            in_flight: InFlight::new(),
        }
    }
}

struct Inner {
    config: RecorderConfig,
    backend: Arc<dyn Backend>,
    store: Arc<dyn StateStore>,
    delivery: Delivery,
    session: Mutex<Option<ActiveSession>>,
    heartbeat: Mutex<Heartbeat>,
    /// Held for the whole of a start, stop or resume transition.
    lifecycle: Mutex<()>,
}

/// Handle to the recorder. Cheap to clone; all clones share one state.
#[derive(Clone)]
pub struct Recorder {
    inner: Arc<Inner>,
}

impl Recorder {
    pub fn new(
        config: RecorderConfig,
        backend: Arc<dyn Backend>,
        store: Arc<dyn StateStore>,
        delivery: Delivery,
    ) -> Self {
        let heartbeat = Heartbeat::new(config.keepalive_interval());
        Self {
            inner: Arc::new(Inner {
                config,
                backend,
                store,
                delivery,
                session: Mutex::new(None),
                heartbeat: Mutex::new(heartbeat),
                lifecycle: Mutex::new(()),
            }),
        }
    }

    /// Build a recorder from whatever the state store says about the last
    /// process. If a session was recording, it resumes under the same id
    /// with an empty step log.
    pub async fn restore(
        config: RecorderConfig,
        backend: Arc<dyn Backend>,
        store: Arc<dyn StateStore>,
        delivery: Delivery,
    ) -> Self {
        let recorder = Self::new(config, backend, store.clone(), delivery);
        if let Some(session_id) = recovery::pending_session(store.as_ref()).await {
            recorder.resume(session_id).await;
        }
        recorder
    }

    async fn resume(&self, session_id: String) {
        let _transition = self.inner.lifecycle.lock().await;
        {
            let mut session = self.inner.session.lock().await;
            if session.is_some() {
                return;
            }
            *session = Some(ActiveSession::new(
                session_id.clone(),
                self.inner.config.fingerprint_prefix,
            ));
        }
        self.inner
            .heartbeat
            .lock()
            .await
            .start(self.inner.backend.clone());
        info!(session_id = %session_id, "Restored recording state");
        broadcast(self.inner.backend.as_ref(), ObserverSignal::BeginObserving).await;
    }

    /// Tell every observer to (re)start observing if a session is active.
    /// Returns how many surfaces were reached; 0 while idle.
    pub async fn resync(&self) -> usize {
        let _transition = self.inner.lifecycle.lock().await;
        let Some(session_id) = self.inner.session.lock().await.as_ref().map(|a| a.id.clone())
        else {
            return 0;
        };
        info!(session_id = %session_id, "Resyncing observers");
        broadcast(self.inner.backend.as_ref(), ObserverSignal::BeginObserving).await
    }

    /// Begin a new session and return its id. While already recording this
    /// is a no-op that returns the current id.
    pub async fn start(&self) -> String {
        let _transition = self.inner.lifecycle.lock().await;
        let session_id = {
            let mut session = self.inner.session.lock().await;
            if let Some(active) = session.as_ref() {
                info!(session_id = %active.id, "Already recording, keeping current session");
                return active.id.clone();
            }
            let id = Uuid::new_v4().to_string();
            *session = Some(ActiveSession::new(
                id.clone(),
                self.inner.config.fingerprint_prefix,
            ));
            id
        };

        if let Err(e) = self
            .inner
            .store
            .save(&PersistedState::recording(&session_id))
            .await
        {
            warn!("Failed to persist session state: {}", e);
        }
        self.inner
            .heartbeat
            .lock()
            .await
            .start(self.inner.backend.clone());
        info!(session_id = %session_id, "Recording started");

        self.ensure_observer().await;
        broadcast(self.inner.backend.as_ref(), ObserverSignal::BeginObserving).await;
        session_id
    }

    /// Finish the current session: let pending events land, drain enrichment,
    /// deliver once, clear persisted state. Never fails; a lost delivery is
    /// logged. No-op while idle.
    pub async fn stop(&self, destination: Option<&str>) {
        let _transition = self.inner.lifecycle.lock().await;
        let in_flight = match self.inner.session.lock().await.as_ref() {
            Some(active) => active.in_flight.clone(),
            None => {
                debug!("Stop requested while idle");
                return;
            }
        };

        info!("Stopping recording...");
        tokio::time::sleep(self.inner.config.settle_delay()).await;

        if !in_flight.is_empty() {
            info!("Waiting for {} pending operations...", in_flight.len());
        }
        in_flight.drain_all().await;

        let finished = self.inner.session.lock().await.take();
        self.inner.heartbeat.lock().await.stop();
        let Some(finished) = finished else {
            return;
        };

        let payload = DeliveryPayload::new(
            finished.id,
            finished.steps,
            chrono::Utc::now().timestamp_millis(),
        );
        info!(
            session_id = %payload.session_id,
            total_steps = payload.metadata.total_steps,
            steps_with_screenshots = payload.metadata.steps_with_screenshots,
            "Final session summary"
        );

        match self.inner.delivery.deliver(&payload, destination).await {
            Ok(()) => info!("Session sent to destination successfully"),
            Err(e) => error!(session_id = %payload.session_id, "Delivery failed: {}", e),
        }

        if let Err(e) = self.inner.store.clear().await {
            warn!("Failed to clear persisted session state: {}", e);
        }
        broadcast(self.inner.backend.as_ref(), ObserverSignal::EndObserving).await;
    }

    /// Record one interaction. Returns whether a step was appended.
    ///
    /// Waits for the step's enrichment to finish. Steps submitted while idle
    /// are logged and dropped.
    pub async fn submit_step(&self, mut raw: RawStep) -> bool {
        let (session_id, in_flight) = match self.inner.session.lock().await.as_ref() {
            Some(active) => (active.id.clone(), active.in_flight.clone()),
            None => {
                warn!(action = %raw.action, "Received step but not recording");
                return false;
            }
        };

        if raw.timestamp.is_none() {
            raw.timestamp = Some(chrono::Utc::now().timestamp_millis());
        }

        let inner = self.inner.clone();
        let task = in_flight.track(async move { inner.enrich(session_id, raw).await });
        match task.await {
            Ok(appended) => appended,
            Err(e) => {
                error!("Step enrichment task failed: {}", e);
                false
            }
        }
    }

    pub async fn status(&self) -> RecordingStatus {
        match self.inner.session.lock().await.as_ref() {
            Some(active) => RecordingStatus {
                is_recording: true,
                session_id: Some(active.id.clone()),
                step_count: active.steps.len(),
            },
            None => RecordingStatus {
                is_recording: false,
                session_id: None,
                step_count: 0,
            },
        }
    }

    pub async fn is_recording(&self) -> bool {
        self.inner.session.lock().await.is_some()
    }

    pub async fn steps(&self) -> Vec<Step> {
        self.inner
            .session
            .lock()
            .await
            .as_ref()
            .map(|active| active.steps.clone())
            .unwrap_or_default()
    }

    pub async fn is_keepalive_running(&self) -> bool {
        self.inner.heartbeat.lock().await.is_running()
    }

    /// Make sure the active surface has a responsive observer, installing
    /// one if the probe goes unanswered.
    async fn ensure_observer(&self) {
        let backend = self.inner.backend.as_ref();
        let surface = match backend.active_surface().await {
            Ok(Some(surface)) if surface.is_instrumentable() => surface,
            Ok(_) => {
                debug!("No instrumentable active surface, skipping observer probe");
                return;
            }
            Err(e) => {
                warn!("Failed to query active surface: {}", e);
                return;
            }
        };

        if backend.ping(&surface).await.is_ok() {
            debug!(surface_id = surface.id, "Observer already active");
            return;
        }

        info!(surface_id = surface.id, "Observer not found, installing...");
        if let Err(e) = backend.install_observer(&surface).await {
            warn!(surface_id = surface.id, "Failed to install observer: {}", e);
            return;
        }
        tokio::time::sleep(self.inner.config.observer_init_delay()).await;
    }
}

impl Inner {
    async fn enrich(&self, session_id: String, raw: RawStep) -> bool {
        let captured = snapshot::capture_raw(self.backend.as_ref()).await;

        let mut session = self.session.lock().await;
        let active = match session.as_mut() {
            Some(active) if active.id == session_id => active,
            _ => {
                warn!(
                    session_id = %session_id,
                    action = %raw.action,
                    "Session ended before step enrichment completed, dropping step"
                );
                return false;
            }
        };

        let screenshot = captured.and_then(|raw| active.dedup.admit(raw));
        let step = Step {
            event_id: raw
                .event_id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            action: raw.action,
            label: resolve_label(raw.label.as_deref(), raw.element.as_ref()),
            timestamp: raw
                .timestamp
                .unwrap_or_else(|| chrono::Utc::now().timestamp_millis()),
            url: raw.url,
            element_type: raw.element_type,
            screenshot,
            step_number: active.steps.len() + 1,
        };

        let short_label: String = step.label.chars().take(40).collect();
        info!(
            step = step.step_number,
            action = %step.action,
            label = %short_label,
            has_screenshot = step.has_screenshot(),
            "Step added"
        );
        active.steps.push(step);
        true
    }
}

/// Send `signal` to every instrumentable surface. Per-surface failures are
/// logged and skipped. Returns how many surfaces were reached.
pub async fn broadcast(backend: &dyn Backend, signal: ObserverSignal) -> usize {
    let surfaces = match backend.surfaces().await {
        Ok(surfaces) => surfaces,
        Err(e) => {
            warn!("Failed to list surfaces for broadcast: {}", e);
            return 0;
        }
    };

    let mut reached = 0;
    for surface in surfaces.iter().filter(|s| s.is_instrumentable()) {
        match backend.signal(surface, signal).await {
            Ok(()) => {
                reached += 1;
                debug!(surface_id = surface.id, "Sent {:?}", signal);
            }
            Err(e) => debug!(surface_id = surface.id, "Failed to send {:?}: {}", signal, e),
        }
    }
    info!(
        "Broadcast {:?} complete: {}/{} surfaces reached",
        signal,
        reached,
        surfaces.len()
    );
    reached
}
