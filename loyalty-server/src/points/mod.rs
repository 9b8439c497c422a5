//! Points Engine
//!
//! Rule-driven points accrual over an append-only ledger:
//! - [`evaluator`] - pure per-rule award logic
//! - [`PointsEngine`] - event processing, eligibility state, ledger

pub mod evaluator;

mod engine;

pub use engine::PointsEngine;
