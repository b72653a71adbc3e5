//! Console integration tests
//!
//! UI assets and console settings served from a composed gateway.

mod routes;
