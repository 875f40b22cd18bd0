//! rendermedic library crate
//!
//! The scan-and-repair engine behind the CLI. Exposed as a library so the
//! integration tests and benchmarks can drive sessions and hot paths
//! directly.

pub mod backup;
pub mod cache;
pub mod config;
pub mod detect;
pub mod engine;
pub mod error;
pub mod finding;
pub mod fix;
pub mod index;
pub mod lexer;
pub mod nuclear;
pub mod retry;
pub mod strategy;
pub mod util;
