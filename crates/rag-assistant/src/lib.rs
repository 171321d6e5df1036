//! # RAG Assistant
//!
//! Retrieval-augmented chat over uploaded documents.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────────┐   ┌──────────────────┐
//! │ Upload       │──▶│ Extract + Chunk   │──▶│ Store            │
//! │ CLI / HTTP   │   │ Embed (Jina/OAI)  │   │ SQLite/Supabase  │
//! └──────────────┘   └───────────────────┘   └────────┬─────────┘
//!                                                     │ cosine search
//!                    ┌───────────────────┐            ▼
//!                    │ Answer (Gemini)   │◀──── retrieved chunks
//!                    └───────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment secrets |
//! | [`db`], [`migrate`] | SQLite pool and schema |
//! | [`sqlite_store`], [`supabase_store`] | [`Store`](rag_assistant_core::store::Store) backends |
//! | [`embedding`] | Embedding providers with mock fallback |
//! | [`llm`] | Answer generation with template fallback |
//! | [`extract`] | Text extraction from txt, md, pdf, docx |
//! | [`rag`] | Upload, search, answer, and chat orchestration |
//! | [`commands`] | `rag` CLI commands |
//! | [`server`] | JSON HTTP API |
//!
//! Pure logic (chunking, similarity, validation, prompts, chat sessions)
//! lives in the `rag-assistant-core` crate.

pub mod commands;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod llm;
pub mod migrate;
pub mod rag;
pub mod server;
pub mod sqlite_store;
pub mod supabase_store;
