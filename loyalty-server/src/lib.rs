//! Loyalty Server - stamp cards and points rules over SQLite
//!
//! # Overview
//!
//! Server-side loyalty engine: stamp-card templates and per-user
//! instances, one-time redemption codes for stamp confirmation and
//! reward claims, and a rule-driven points ledger.
//!
//! # Module structure
//!
//! ```text
//! loyalty-server/src/
//! ├── core/      # config, state, server
//! ├── api/       # HTTP routes and handlers
//! ├── loyalty/   # card engine, code issuer
//! ├── points/    # rule evaluator, event engine
//! ├── db/        # pool setup, repositories, migrations
//! └── utils/     # errors, logging
//! ```

pub mod api;
pub mod core;
pub mod db;
pub mod loyalty;
pub mod points;
pub mod utils;

// Re-export common types
pub use core::{Config, Server, ServerState};
pub use loyalty::{CardEngine, CodeIssuer, LoyaltyError};
pub use points::PointsEngine;
pub use utils::{AppError, AppResult};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};
