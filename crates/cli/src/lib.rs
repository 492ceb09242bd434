//! `testrig` library crate.
//!
//! Startup helpers for the binary, exposed for integration testing. The
//! entrypoint lives in `main.rs`.

pub mod logging;
pub mod root;
pub mod signal;
