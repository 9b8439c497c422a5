//! Core Module
//!
//! - [`Config`] - environment-driven configuration
//! - [`ServerState`] - shared application state
//! - [`Server`] - HTTP server lifecycle

mod config;
mod server;
mod state;

pub use config::Config;
pub use server::Server;
pub use state::ServerState;
