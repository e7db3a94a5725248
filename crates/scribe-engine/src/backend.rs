use async_trait::async_trait;
pub use scribe_common::error::BackendError;
use scribe_common::protocol::{ObserverSignal, Surface};

/// The collaborators a recording session depends on: the snapshot provider,
/// the interaction observers living in each surface, and the hosting
/// platform. Implemented by the extension bridge and by test doubles.
///
/// All methods take `&self`: enrichment tasks call `capture_visible`
/// concurrently through a shared `Arc<dyn Backend>`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Rasterize the active surface. `Ok(None)` when no surface is eligible.
    async fn capture_visible(&self) -> Result<Option<String>, BackendError>;

    /// Every surface the platform can currently reach.
    async fn surfaces(&self) -> Result<Vec<Surface>, BackendError>;

    /// The surface the user is looking at, if any.
    async fn active_surface(&self) -> Result<Option<Surface>, BackendError>;

    /// Deliver a signal to the observer in `surface`.
    async fn signal(&self, surface: &Surface, signal: ObserverSignal) -> Result<(), BackendError>;

    /// Probe whether an observer is installed and responsive in `surface`.
    async fn ping(&self, surface: &Surface) -> Result<(), BackendError> {
        self.signal(surface, ObserverSignal::Ping).await
    }

    /// (Re-)install the interaction observer into `surface`.
    async fn install_observer(&self, surface: &Surface) -> Result<(), BackendError>;

    /// Trivial platform call issued periodically while recording.
    async fn keep_alive(&self) -> Result<(), BackendError> {
        Ok(())
    }
}
