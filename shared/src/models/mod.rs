//! Data models
//!
//! Shared between loyalty-server and frontend (via API).
//! DB row types use `#[cfg_attr(feature = "db", derive(sqlx::FromRow))]`.
//! All IDs are `i64` (SQLite INTEGER PRIMARY KEY).

pub mod card;
pub mod code;
pub mod event;
pub mod points;
pub mod rule;
pub mod template;

// Re-exports
pub use card::*;
pub use code::*;
pub use event::*;
pub use points::*;
pub use rule::*;
pub use template::*;
