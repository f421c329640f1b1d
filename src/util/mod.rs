//! Shared utilities

pub mod rate_limit;
pub mod sanitize;
pub mod time;
