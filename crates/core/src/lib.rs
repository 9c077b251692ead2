//! Core domain types for the m-asset text-to-SQL service.
//!
//! Holds everything the other crates share: configuration loaded from the
//! environment, the error taxonomy, the collaborator traits injected into the
//! pipeline, the admission controller bounding concurrent requests, SQL
//! extraction from free-form model output, and the fallback schema used when
//! the vector store is unavailable.
//!
//! This crate has no dependency on any other workspace crate.

pub mod config;
pub mod error;
pub mod limiter;
pub mod schema;
pub mod services;
pub mod sql;
