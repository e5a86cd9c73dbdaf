//! # Awareness Retrieval
//!
//! Multi-collection vector retrieval for security-awareness training
//! material.
//!
//! Documents live in three fixed collections (`papers`, `templates`,
//! `threats`) inside a local SQLite store. Each document is embedded on
//! insert; queries are embedded the same way and answered by nearest
//! neighbour search with optional metadata filters. A federated search
//! queries all three collections concurrently, and the context layer
//! assembles retrieval results for script generation.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Knowledge    │──▶│ VectorStore  │──▶│   SQLite     │
//! │ base / CLI   │   │ embed + lock │   │ records+vecs │
//! └──────────────┘   └──────┬───────┘   └──────────────┘
//!                           │
//!                ┌──────────┴──────────┐
//!                ▼                     ▼
//!          ┌──────────┐        ┌───────────────┐
//!          │  search  │        │ RetrievalCtx  │
//!          │ (3 coll.)│        │ enrich+gather │
//!          └──────────┘        └───────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! awr init                          # create database and collections
//! awr ingest all                    # load ./data/documents/<collection>/
//! awr search threats "phishing"     # one collection
//! awr search-all "social engineering"
//! awr context "Passwortsicherheit" --facility Krankenhaus --threat phishing
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | SQLite connection pool |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_store`] | SQLite vector backend |
//! | [`embedding`] | Embedding providers |
//! | [`vector_store`] | Collection store and similarity search |
//! | [`context`] | Federated retrieval context for script generation |
//! | [`ingest`] | Knowledge-base loading |
//! | [`search`] | `search` / `search-all` commands |
//! | [`get`] | `get` command |
//! | [`stats`] | `stats` command |
//! | [`logging`] | Tracing setup |

pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod get;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod search;
pub mod sqlite_store;
pub mod stats;
pub mod vector_store;

pub use awareness_retrieval_core::error::{EmbeddingError, RetrievalError};
pub use awareness_retrieval_core::models::{CollectionName, DocumentRecord, NewDocument};
pub use awareness_retrieval_core::search::SearchHit;
