pub mod error;
pub mod label;
pub mod protocol;
pub mod step;
