//! # Expertise Graph Core
//!
//! Shared retrieval logic for Expertise Graph: data models, chunking,
//! the embedding and store traits, topic extraction, expertise scoring,
//! the topic graph, audit records, and the search orchestrator.
//!
//! This crate contains no tokio, sqlx, HTTP clients, or filesystem I/O.
//! Network-backed providers and the SQLite store live in the
//! `expertise-graph` app crate and plug in through the traits defined here.

pub mod audit;
pub mod chunk;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod models;
pub mod scoring;
pub mod search;
pub mod store;
pub mod topics;
pub mod vector;

pub use error::{Error, Result};
