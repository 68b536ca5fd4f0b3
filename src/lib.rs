//! finq — financial document Q&A with live market context.
//!
//! Ingests PDF and text documents, indexes them for semantic retrieval,
//! and answers natural-language questions by routing each query to
//! document retrieval, live market data, or both:
//!
//! ```text
//! ingest:  file → extract → chunk → embed → store + index
//! answer:  query → classify → cache? → retrieve + fetch → synthesize → cache
//! ```
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`engine`] | Pipeline wiring; the `Engine` entry points |
//! | [`extract`] | PDF/TXT text extraction and normalization |
//! | [`chunk`] | Sliding-window chunking with boundary snapping |
//! | [`embedding`] | Embedding providers (hash, OpenAI, Ollama) |
//! | [`index`] | HNSW vector index with tombstoned deletes |
//! | [`store`] | Document store and corpus bookkeeping |
//! | [`router`] | Query classification and ticker extraction |
//! | [`market`] | Market-data providers and summary statistics |
//! | [`context`] | Context assembly for a routed query |
//! | [`synthesize`] | LLM synthesis with a deterministic fallback |
//! | [`cache`] | TTL cache for synthesized answers |
//! | [`config`] | TOML configuration and validation |

pub mod cache;
pub mod chunk;
pub mod config;
pub mod context;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod extract;
pub mod index;
pub mod market;
pub mod models;
pub mod router;
pub mod store;
pub mod synthesize;

pub use config::{load_config, Config};
pub use engine::Engine;
pub use models::AnswerResult;
