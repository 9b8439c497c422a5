//! Utility module - common helpers and types
//!
//! - [`AppError`] / [`AppResponse`] - application error type and envelope
//! - [`AppResult`] - handler result alias
//! - logging setup

pub mod error;
pub mod logger;
pub mod result;

pub use error::{AppError, AppResponse, ok, ok_with_message};
pub use result::AppResult;
