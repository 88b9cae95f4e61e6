//! Shared types, errors and utilities

pub mod errors;
pub mod math;
pub mod timing;
pub mod types;
