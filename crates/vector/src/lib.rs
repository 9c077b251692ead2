//! Vector-search integration.
//!
//! [`ResourcePool`] manages health-checked, lifetime-bounded connections to
//! the vector-search service; [`VectorSearchClient`] is one such connection;
//! [`Retriever`] runs hybrid searches through the pool to fetch schema and
//! sample-query context for SQL generation.

pub mod client;
pub mod pool;
pub mod retriever;

pub use client::{VectorConnectionFactory, VectorSearchClient};
pub use pool::{ConnectionFactory, PoolConfig, PoolHandle, PoolStats, ResourcePool};
pub use retriever::{DisabledRetriever, Retriever};
