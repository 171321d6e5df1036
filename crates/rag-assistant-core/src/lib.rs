//! # RAG Assistant Core
//!
//! Shared logic for RAG Assistant: data models, sentence chunking, vector
//! math and mock embeddings, upload validation, prompt templates, chat
//! session state, and the storage abstraction.
//!
//! This crate contains no tokio, sqlx, HTTP clients, or filesystem I/O.
//! Everything that talks to a remote service lives in the `rag-assistant`
//! app crate.

pub mod chunk;
pub mod embedding;
pub mod greeter;
pub mod models;
pub mod prompt;
pub mod session;
pub mod store;
pub mod validate;
