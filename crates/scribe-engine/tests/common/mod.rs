#![allow(dead_code)]

use async_trait::async_trait;
use scribe_engine::backend::{Backend, BackendError};
use scribe_engine::config::RecorderConfig;
use scribe_engine::delivery::Delivery;
use scribe_engine::protocol::{ObserverSignal, Surface};
use scribe_engine::recovery::MemoryStateStore;
use scribe_engine::session::Recorder;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

pub const DEFAULT_SHOT: &str = "data:image/png;base64,DEFAULT";

/// What the next `capture_visible` call produces.
pub enum Capture {
    Image(String),
    Delayed(Duration, String),
    Gate(oneshot::Receiver<Option<String>>),
    NoSurface,
    Fail,
}

pub struct MockBackend {
    queue: Mutex<VecDeque<Capture>>,
    pub captures: AtomicUsize,
    pub installs: AtomicUsize,
    pub keepalives: AtomicUsize,
    observer_installed: AtomicBool,
    surfaces: Vec<Surface>,
    active: Option<Surface>,
    unreachable: Vec<i64>,
    signals: Mutex<Vec<(i64, ObserverSignal)>>,
}

impl MockBackend {
    pub fn new() -> Self {
        let page = Surface::new(1, "https://app.test/login");
        Self {
            queue: Mutex::new(VecDeque::new()),
            captures: AtomicUsize::new(0),
            installs: AtomicUsize::new(0),
            keepalives: AtomicUsize::new(0),
            observer_installed: AtomicBool::new(true),
            surfaces: vec![page.clone(), Surface::new(2, "chrome://extensions")],
            active: Some(page),
            unreachable: vec![],
            signals: Mutex::new(vec![]),
        }
    }

    pub fn without_observer(mut self) -> Self {
        self.observer_installed = AtomicBool::new(false);
        self
    }

    pub fn with_surfaces(mut self, surfaces: Vec<Surface>, active: Option<Surface>) -> Self {
        self.surfaces = surfaces;
        self.active = active;
        self
    }

    pub fn with_unreachable(mut self, ids: Vec<i64>) -> Self {
        self.unreachable = ids;
        self
    }

    pub fn push(&self, capture: Capture) {
        self.queue.lock().unwrap().push_back(capture);
    }

    pub fn push_image(&self, image: &str) {
        self.push(Capture::Image(image.to_string()));
    }

    pub fn signals(&self) -> Vec<(i64, ObserverSignal)> {
        self.signals.lock().unwrap().clone()
    }

    pub fn signals_of(&self, kind: ObserverSignal) -> Vec<i64> {
        self.signals()
            .into_iter()
            .filter(|(_, s)| *s == kind)
            .map(|(id, _)| id)
            .collect()
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn capture_visible(&self) -> Result<Option<String>, BackendError> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        let next = self.queue.lock().unwrap().pop_front();
        match next {
            None => Ok(Some(DEFAULT_SHOT.to_string())),
            Some(Capture::Image(image)) => Ok(Some(image)),
            Some(Capture::Delayed(delay, image)) => {
                tokio::time::sleep(delay).await;
                Ok(Some(image))
            }
            Some(Capture::Gate(rx)) => Ok(rx.await.unwrap_or(None)),
            Some(Capture::NoSurface) => Ok(None),
            Some(Capture::Fail) => Err(BackendError::Remote("capture failed".into())),
        }
    }

    async fn surfaces(&self) -> Result<Vec<Surface>, BackendError> {
        Ok(self.surfaces.clone())
    }

    async fn active_surface(&self) -> Result<Option<Surface>, BackendError> {
        Ok(self.active.clone())
    }

    async fn signal(&self, surface: &Surface, signal: ObserverSignal) -> Result<(), BackendError> {
        if self.unreachable.contains(&surface.id) {
            return Err(BackendError::Remote("Receiving end does not exist".into()));
        }
        if signal == ObserverSignal::Ping && !self.observer_installed.load(Ordering::SeqCst) {
            return Err(BackendError::Remote("Receiving end does not exist".into()));
        }
        self.signals.lock().unwrap().push((surface.id, signal));
        Ok(())
    }

    async fn install_observer(&self, _surface: &Surface) -> Result<(), BackendError> {
        self.installs.fetch_add(1, Ordering::SeqCst);
        self.observer_installed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn keep_alive(&self) -> Result<(), BackendError> {
        self.keepalives.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init()
        .ok();
}

pub fn test_config() -> RecorderConfig {
    RecorderConfig {
        settle_delay_ms: 0,
        observer_init_delay_ms: 0,
        ..Default::default()
    }
}

pub fn recorder(
    backend: Arc<MockBackend>,
    store: Arc<MemoryStateStore>,
    destination: &str,
) -> Recorder {
    Recorder::new(test_config(), backend, store, Delivery::new(destination))
}

/// Yield until `n` captures have started (or panic after a second).
pub async fn wait_for_captures(backend: &MockBackend, n: usize) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while backend.captures.load(Ordering::SeqCst) < n {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("captures did not start in time");
}
