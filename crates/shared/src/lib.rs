//! Quanta Shared Types and Utilities
//!
//! This crate contains types, the static feature/pricing catalog, and database
//! utilities shared across the Quanta platform.

pub mod catalog;
pub mod db;
pub mod types;

pub use catalog::*;
pub use db::*;
pub use types::*;
