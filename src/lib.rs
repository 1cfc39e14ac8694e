//! # Expertise Graph
//!
//! Semantic search over team documents combined with an expertise graph:
//! every query returns the closest document snippets, the topics they
//! cover, and the people who know those topics best.
//!
//! The retrieval logic lives in `expertise-graph-core`. This crate adds
//! the SQLite store, the network embedding and text-generation providers,
//! ingestion, the `xg` CLI, and the HTTP server.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────────┐   ┌───────────────┐
//! │ Ingest       │──▶│ Chunk + Embed   │──▶│ SQLite        │
//! │ text / URL   │   │ (fallback+guard)│   │ chunks+scores │
//! └──────────────┘   └─────────────────┘   └──────┬────────┘
//!                                                 │
//!                      ┌──────────────────────────┤
//!                      ▼                          ▼
//!                 ┌──────────┐              ┌──────────┐
//!                 │   CLI    │              │   HTTP   │
//!                 │  (xg)    │              │  (axum)  │
//!                 └──────────┘              └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite implementation of the core `Store` trait |
//! | [`embedding`] | OpenAI and Ollama providers, provider selection |
//! | [`llm`] | Anthropic text generation for topic extraction |
//! | [`audit`] | Persistent audit log |
//! | [`app`] | Application context shared by CLI and server |
//! | [`ingest`] | Document ingestion |
//! | [`expertise`] | Interviews, listings, aging, people, topic graph |
//! | [`privacy`] | Data-subject export and erasure |
//! | [`server`] | HTTP API |

pub mod app;
pub mod audit;
pub mod config;
pub mod db;
pub mod embedding;
pub mod expertise;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod privacy;
pub mod server;
pub mod sqlite_store;
