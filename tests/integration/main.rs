//! Integration tests for Comic-Updater
//!
//! Discovery runs are driven against an in-memory site for deterministic
//! scenarios; the HTTP path is exercised with wiremock servers.

mod discovery_tests;
mod http_tests;
mod support;
