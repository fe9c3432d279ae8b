//! Shared helpers: time stepping, math, slot pools, rate limiting

pub mod math;
pub mod pool;
pub mod rate_limit;
pub mod time;
