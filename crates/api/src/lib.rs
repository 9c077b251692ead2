//! m-asset API server library.
//!
//! Exposes state, error handling, and route construction so integration
//! tests and the binary entrypoint can both build the same application.

pub mod error;
pub mod routes;
pub mod state;
