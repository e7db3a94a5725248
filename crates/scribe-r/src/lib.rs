pub mod backend;
pub mod server;
