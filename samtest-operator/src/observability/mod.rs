//! Logging setup for the operator binary.
//!
//! Output format is controlled via `SAMTEST_LOG_FORMAT`:
//! - `json` - Structured JSON output (default when stdout is not a terminal)
//! - `pretty` - Human-readable colored output (default on a terminal)
//! - `compact` - Compact single-line format
//!
//! The filter comes from `SAMTEST_LOG_LEVEL`, falling back to `RUST_LOG`.

mod config;
mod tracing_setup;

pub use config::{LogFormat, TracingConfig};
pub use tracing_setup::init_tracing;
