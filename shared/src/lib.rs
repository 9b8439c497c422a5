//! Shared types for the loyalty engine
//!
//! Data models exchanged between the loyalty server and its API
//! clients. DB row types use `#[cfg_attr(feature = "db", derive(sqlx::FromRow))]`.
//! All IDs are `i64` (SQLite INTEGER PRIMARY KEY, snowflake-generated).
//! All timestamps are Unix millis.

pub mod models;
pub mod util;
