//! Database layer
//!
//! - `pool`: PostgreSQL connection pool with health checks
//! - `migrations`: embedded migration runner
//!
//! Models live in the `models` module at crate root.

pub mod migrations;
pub mod pool;
