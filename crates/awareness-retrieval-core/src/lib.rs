//! # Awareness Retrieval Core
//!
//! Runtime-agnostic logic for the awareness retrieval store: collection and
//! metadata models, the embedding provider trait, the vector backend trait
//! with an in-memory implementation, metadata filters, and the similarity
//! scoring used to shape search hits.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. The application
//! crate supplies the durable backend, network embedding providers, and
//! timeouts.

pub mod embedding;
pub mod error;
pub mod filter;
pub mod models;
pub mod search;
pub mod store;
