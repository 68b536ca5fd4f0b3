//! The engine: one object owning the whole pipeline.
//!
//! [`Engine`] wires together the store, index, embedder, router, market
//! boundary, synthesizer, and cache behind two entry points: `ingest_*`
//! and [`Engine::answer`]. All shared state is explicit — the corpus sits
//! behind a single-writer `RwLock`, the answer cache behind its own lock —
//! so any number of engines can coexist in one process.
//!
//! Lock discipline: embedding and provider calls happen outside the corpus
//! lock; the write lock is taken only for the final insert or remove, the
//! read lock only for the search itself.

use std::path::Path;
use std::sync::RwLock;

use anyhow::{Context, Result};
use tracing::{info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::cache::ResponseCache;
use crate::chunk::chunk_text;
use crate::config::Config;
use crate::context::assemble;
use crate::embedding::{create_provider, Embedder, EmbeddingProvider};
use crate::extract::{extract_file, title_from_path};
use crate::market::{self, MarketDataProvider};
use crate::models::{AnswerResult, Document};
use crate::router::classify;
use crate::store::Corpus;
use crate::synthesize::{self, LlmProvider};

pub struct Engine {
    config: Config,
    corpus: RwLock<Corpus>,
    cache: ResponseCache,
    embedder: Embedder,
    market: Box<dyn MarketDataProvider>,
    llm: Box<dyn LlmProvider>,
}

/// Result of ingesting one file.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub document_id: Uuid,
    pub title: String,
    pub chunk_count: usize,
    /// Documents evicted to stay under the cap.
    pub evicted: Vec<Uuid>,
}

/// Result of ingesting a directory.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub ingested: usize,
    pub skipped: usize,
    pub chunks: usize,
    pub evicted: usize,
}

/// Point-in-time counters for the `stats` command.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EngineStats {
    pub documents: usize,
    pub chunks: usize,
    pub cache_entries: usize,
    pub embedding_model: String,
    pub dims: usize,
}

impl Engine {
    /// Build an engine from configuration, creating the configured
    /// providers and probing the embedding backend once so a
    /// dimensionality mismatch fails at startup, not mid-query.
    pub async fn from_config(config: Config) -> Result<Self> {
        let embedding = create_provider(&config.embedding)?;
        let market = market::create_provider(&config.market)?;
        let llm = synthesize::create_provider(&config.llm)?;
        Self::with_providers(config, embedding, market, llm).await
    }

    /// Build an engine with explicit providers; tests inject doubles here.
    pub async fn with_providers(
        config: Config,
        embedding: Box<dyn EmbeddingProvider>,
        market: Box<dyn MarketDataProvider>,
        llm: Box<dyn LlmProvider>,
    ) -> Result<Self> {
        crate::config::validate(&config)?;
        let embedder = Embedder::new(embedding, &config.embedding);
        embedder
            .embed_query("dimensionality probe")
            .await
            .context("embedding provider failed startup probe")?;

        let corpus = RwLock::new(Corpus::new(
            config.embedding.dims,
            config.documents.max_documents,
        ));
        let cache = ResponseCache::new(&config.cache);

        Ok(Self {
            config,
            corpus,
            cache,
            embedder,
            market,
            llm,
        })
    }

    /// Ingest a single file: extract, chunk, embed, insert.
    ///
    /// Embedding happens before the write lock is taken; the insert and
    /// any cap evictions are one atomic step under the lock. Corpus
    /// mutations clear the answer cache.
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestOutcome> {
        let (format, text) = extract_file(path)?;
        let title = title_from_path(path);

        let document = Document {
            id: Uuid::new_v4(),
            source_path: path.to_path_buf(),
            format,
            raw_text: text.clone(),
            title: title.clone(),
            ingested_at: chrono::Utc::now(),
            seq: 0,
        };

        let mut chunks = chunk_text(
            document.id,
            &text,
            self.config.chunking.chunk_size,
            self.config.chunking.overlap,
        );
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_texts(&texts).await?;
        for (chunk, vector) in chunks.iter_mut().zip(vectors) {
            chunk.embedding = vector;
        }

        let chunk_count = chunks.len();
        let document_id = document.id;
        let evicted = {
            let mut corpus = self.write_corpus();
            corpus.insert_document(document, chunks)?
        };
        self.cache.clear();

        info!(
            document = %document_id,
            title = %title,
            chunks = chunk_count,
            evicted = evicted.len(),
            "ingested file"
        );
        Ok(IngestOutcome {
            document_id,
            title,
            chunk_count,
            evicted,
        })
    }

    /// Ingest every supported file under a directory. Per-file failures
    /// are logged and counted, never fatal for the walk.
    pub async fn ingest_dir(&self, dir: &Path) -> Result<IngestReport> {
        let mut report = IngestReport::default();
        let walker = WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file());

        for entry in walker {
            match self.ingest_file(entry.path()).await {
                Ok(outcome) => {
                    report.ingested += 1;
                    report.chunks += outcome.chunk_count;
                    report.evicted += outcome.evicted.len();
                }
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "skipping file");
                    report.skipped += 1;
                }
            }
        }

        info!(
            ingested = report.ingested,
            skipped = report.skipped,
            chunks = report.chunks,
            "directory ingest complete"
        );
        Ok(report)
    }

    /// Remove a document and its chunks. Idempotent.
    pub fn remove_document(&self, document_id: &Uuid) -> bool {
        let removed = self.write_corpus().remove_document(document_id);
        if removed {
            self.cache.clear();
            info!(document = %document_id, "removed document");
        }
        removed
    }

    /// Answer a natural-language question.
    ///
    /// Classifies the query, consults the cache, assembles context, and
    /// synthesizes. Always returns an answer; provider failures surface
    /// as a fallback answer, which is never cached.
    pub async fn answer(&self, query: &str) -> AnswerResult {
        let routed = classify(query);
        info!(route = routed.route.as_str(), symbols = ?routed.symbols, "query classified");

        if let Some(cached) = self.cache.get(query, routed.route) {
            return cached;
        }

        let bundle = assemble(
            &routed,
            &self.embedder,
            &self.corpus,
            self.market.as_ref(),
            &self.config.retrieval,
            &self.config.market,
        )
        .await;

        let answer =
            synthesize::synthesize(&routed, &bundle, self.llm.as_ref(), &self.config.retrieval)
                .await;

        // A fallback answer reflects a transient provider failure; caching
        // it would pin the degraded answer for the whole TTL.
        if !answer.used_fallback {
            self.cache.put(query, routed.route, answer.clone());
        }
        answer
    }

    pub fn stats(&self) -> EngineStats {
        let corpus = self.read_corpus();
        EngineStats {
            documents: corpus.document_count(),
            chunks: corpus.chunk_count(),
            cache_entries: self.cache.len(),
            embedding_model: self.embedder.model_name().to_string(),
            dims: self.embedder.dims(),
        }
    }

    /// True when the index and store agree on the live chunk set.
    pub fn verify_integrity(&self) -> bool {
        self.read_corpus().verify_integrity()
    }

    /// Rebuild the index from stored embeddings.
    pub fn repair(&self) -> Result<()> {
        self.write_corpus().repair()?;
        self.cache.clear();
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn read_corpus(&self) -> std::sync::RwLockReadGuard<'_, Corpus> {
        match self.corpus.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_corpus(&self) -> std::sync::RwLockWriteGuard<'_, Corpus> {
        match self.corpus.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
