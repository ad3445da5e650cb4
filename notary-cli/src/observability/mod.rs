//! Logging setup for the notary binary.
//!
//! The log format is chosen with `NOTARY_LOG_FORMAT`:
//! - `json` - Structured JSON output (for ELK/Loki)
//! - `pretty` - Human-readable multi-line output
//! - `compact` - Compact single-line format
//!
//! The filter comes from `NOTARY_LOG_LEVEL`, then `RUST_LOG`, then the
//! `-v` flags.

mod config;
mod tracing_setup;

pub use config::{LogFormat, TracingConfig, TracingConfigBuilder};
pub use tracing_setup::init_tracing;
