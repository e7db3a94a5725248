pub mod backend;
pub mod config;
pub mod delivery;
pub mod dispatch;
pub mod liveness;
pub mod recovery;
pub mod session;
pub mod snapshot;
pub mod tracker;

pub use scribe_common::error;
pub use scribe_common::label;
pub use scribe_common::protocol;
pub use scribe_common::step;
