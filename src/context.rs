//! Context assembly: retrieval hits plus market summaries in one bundle.
//!
//! [`assemble`] is the fan-in point of a query: depending on the route it
//! embeds the query, searches the corpus, and fetches market series, then
//! packs everything into a [`ContextBundle`] for the synthesizer. Partial
//! failure degrades rather than aborts: a failed embed or a symbol that
//! returns no data is logged and skipped, and the bundle carries whatever
//! was gathered. The corpus read lock is held only for the search itself,
//! never across an await.

use std::sync::RwLock;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{MarketConfig, RetrievalConfig};
use crate::embedding::Embedder;
use crate::market::{summarize, MarketDataProvider};
use crate::models::{PriceBar, SourceOrigin, SourceRef, StockSummary};
use crate::router::{QueryRoute, RoutedQuery};
use crate::store::Corpus;

/// One retrieved chunk with its provenance and score.
#[derive(Debug, Clone)]
pub struct DocumentHit {
    pub chunk_id: Uuid,
    pub document_title: String,
    pub text: String,
    pub score: f32,
}

/// Everything gathered for one query, ready for prompt building.
#[derive(Debug, Clone, Default)]
pub struct ContextBundle {
    /// Retrieval hits above the score threshold, best first.
    pub document_hits: Vec<DocumentHit>,
    /// One summary per symbol that returned data.
    pub summaries: Vec<StockSummary>,
    /// Series of the first summarized symbol, for charting.
    pub chart_data: Option<Vec<PriceBar>>,
}

impl ContextBundle {
    pub fn is_empty(&self) -> bool {
        self.document_hits.is_empty() && self.summaries.is_empty()
    }

    /// Provenance entries for the answer: each distinct document title,
    /// then each summarized symbol.
    pub fn sources(&self) -> Vec<SourceRef> {
        let mut sources: Vec<SourceRef> = Vec::new();
        for hit in &self.document_hits {
            if !sources.iter().any(|s| s.label == hit.document_title) {
                sources.push(SourceRef {
                    label: hit.document_title.clone(),
                    origin: SourceOrigin::Document,
                });
            }
        }
        for summary in &self.summaries {
            sources.push(SourceRef {
                label: format!("Yahoo Finance: {}", summary.symbol),
                origin: SourceOrigin::Market,
            });
        }
        sources
    }

    /// Format the retrieval hits under a character budget. Whole chunks
    /// are added while they fit; only the first chunk is ever truncated,
    /// so a tight budget still yields some context.
    pub fn document_section(&self, max_chars: usize) -> String {
        let mut out = String::new();
        for hit in &self.document_hits {
            let entry = format!("[{}]\n{}\n\n", hit.document_title, hit.text);
            if out.len() + entry.len() > max_chars {
                if out.is_empty() {
                    out.extend(entry.chars().take(max_chars));
                }
                break;
            }
            out.push_str(&entry);
        }
        out.trim_end().to_string()
    }

    /// Format the market summaries, one line per symbol.
    pub fn market_section(&self) -> String {
        self.summaries
            .iter()
            .map(|s| {
                format!(
                    "{} ({}): latest close {:.2}, change {:+.2} ({:+.2}%), \
                     low {:.2}, high {:.2}, avg volume {}, volatility {:.2}%, \
                     {} over {} trading days",
                    s.symbol,
                    s.period,
                    s.latest_close,
                    s.change,
                    s.change_pct,
                    s.low,
                    s.high,
                    s.avg_volume,
                    s.volatility_pct,
                    s.trend.as_str(),
                    s.trading_days,
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Gather context for a routed query.
pub async fn assemble(
    routed: &RoutedQuery,
    embedder: &Embedder,
    corpus: &RwLock<Corpus>,
    market: &dyn MarketDataProvider,
    retrieval: &RetrievalConfig,
    market_cfg: &MarketConfig,
) -> ContextBundle {
    let mut bundle = ContextBundle::default();

    if matches!(routed.route, QueryRoute::Document | QueryRoute::Mixed) {
        bundle.document_hits = retrieve(routed, embedder, corpus, retrieval).await;
    }

    if matches!(routed.route, QueryRoute::Stock | QueryRoute::Mixed) {
        let symbols: &[String] = if routed.symbols.is_empty() {
            &market_cfg.default_symbols
        } else {
            &routed.symbols
        };
        for symbol in symbols {
            match market.fetch(symbol, &market_cfg.default_period).await {
                Ok(bars) => {
                    if let Some(summary) =
                        summarize(symbol, &market_cfg.default_period, &bars)
                    {
                        if bundle.chart_data.is_none() {
                            bundle.chart_data = Some(bars);
                        }
                        bundle.summaries.push(summary);
                    }
                }
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "market fetch failed, skipping symbol");
                }
            }
        }
    }

    debug!(
        route = routed.route.as_str(),
        hits = bundle.document_hits.len(),
        summaries = bundle.summaries.len(),
        "context assembled"
    );
    bundle
}

async fn retrieve(
    routed: &RoutedQuery,
    embedder: &Embedder,
    corpus: &RwLock<Corpus>,
    retrieval: &RetrievalConfig,
) -> Vec<DocumentHit> {
    // Embed before taking the lock; the await must not block writers.
    let query_vec = match embedder.embed_query(&routed.text).await {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "query embedding failed, answering without documents");
            return Vec::new();
        }
    };

    let guard = match corpus.read() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    };
    guard
        .search(&query_vec, retrieval.top_k)
        .into_iter()
        .filter(|(_, _, score)| *score >= retrieval.min_score)
        .map(|(chunk, document, score)| DocumentHit {
            chunk_id: chunk.id,
            document_title: document.title,
            text: chunk.text,
            score,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, EmbeddingConfig};
    use crate::embedding::HashProvider;
    use crate::market::{synthetic_series, StaticProvider};
    use crate::models::{Chunk, Document, DocumentFormat};
    use crate::router::classify;
    use chrono::Utc;
    use std::path::PathBuf;

    fn embedder(dims: usize) -> Embedder {
        let config = EmbeddingConfig {
            dims,
            ..EmbeddingConfig::default()
        };
        Embedder::new(Box::new(HashProvider::new(dims)), &config)
    }

    async fn seeded_corpus(e: &Embedder, texts: &[&str]) -> RwLock<Corpus> {
        let mut corpus = Corpus::new(e.dims(), 10);
        let document = Document {
            id: Uuid::new_v4(),
            source_path: PathBuf::from("report.txt"),
            format: DocumentFormat::Txt,
            raw_text: texts.join(" "),
            title: "report".to_string(),
            ingested_at: Utc::now(),
            seq: 0,
        };
        let owned: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
        let vectors = e.embed_texts(&owned).await.unwrap();
        let chunks: Vec<Chunk> = owned
            .iter()
            .zip(vectors)
            .map(|(text, embedding)| Chunk {
                id: Uuid::new_v4(),
                document_id: document.id,
                text: text.clone(),
                start_offset: 0,
                end_offset: text.len(),
                embedding,
            })
            .collect();
        corpus.insert_document(document, chunks).unwrap();
        RwLock::new(corpus)
    }

    #[tokio::test]
    async fn document_route_gathers_hits_only() {
        let e = embedder(128);
        let corpus = seeded_corpus(
            &e,
            &[
                "quarterly revenue grew twelve percent year over year",
                "the gardening chapter covers tomato varieties",
            ],
        )
        .await;
        let cfg = Config::minimal();
        let market = StaticProvider::new();

        let routed = classify("Summarize quarterly revenue year over year");
        let bundle = assemble(&routed, &e, &corpus, &market, &cfg.retrieval, &cfg.market).await;

        assert!(!bundle.document_hits.is_empty());
        assert!(bundle.summaries.is_empty());
        assert!(bundle.chart_data.is_none());
        assert_eq!(
            bundle.document_hits[0].text,
            "quarterly revenue grew twelve percent year over year"
        );
    }

    #[tokio::test]
    async fn stock_route_gathers_summaries_and_chart() {
        let e = embedder(64);
        let corpus = RwLock::new(Corpus::new(64, 10));
        let cfg = Config::minimal();
        let market =
            StaticProvider::new().with_series("AAPL", synthetic_series(180.0, 0.5, 21));

        let routed = classify("What is AAPL price today");
        let bundle = assemble(&routed, &e, &corpus, &market, &cfg.retrieval, &cfg.market).await;

        assert!(bundle.document_hits.is_empty());
        assert_eq!(bundle.summaries.len(), 1);
        assert_eq!(bundle.summaries[0].symbol, "AAPL");
        assert_eq!(bundle.chart_data.as_ref().unwrap().len(), 21);
    }

    #[tokio::test]
    async fn failed_symbol_degrades_to_partial_bundle() {
        let e = embedder(64);
        let corpus = RwLock::new(Corpus::new(64, 10));
        let cfg = Config::minimal();
        // Only MSFT has data; GOOGL fetch fails.
        let market =
            StaticProvider::new().with_series("MSFT", synthetic_series(300.0, 1.0, 15));

        let routed = classify("Compare MSFT and GOOGL stock trend");
        let bundle = assemble(&routed, &e, &corpus, &market, &cfg.retrieval, &cfg.market).await;

        assert_eq!(bundle.summaries.len(), 1);
        assert_eq!(bundle.summaries[0].symbol, "MSFT");
    }

    #[tokio::test]
    async fn stock_route_without_symbols_uses_defaults() {
        let e = embedder(64);
        let corpus = RwLock::new(Corpus::new(64, 10));
        let cfg = Config::minimal();
        let market =
            StaticProvider::new().with_series("AAPL", synthetic_series(100.0, 0.1, 10));

        let routed = classify("How is the market trading today");
        assert_eq!(routed.route, QueryRoute::Stock);
        assert!(routed.symbols.is_empty());

        let bundle = assemble(&routed, &e, &corpus, &market, &cfg.retrieval, &cfg.market).await;
        assert_eq!(bundle.summaries.len(), 1);
        assert_eq!(bundle.summaries[0].symbol, "AAPL");
    }

    #[test]
    fn document_section_respects_budget_at_chunk_boundaries() {
        let bundle = ContextBundle {
            document_hits: vec![
                DocumentHit {
                    chunk_id: Uuid::new_v4(),
                    document_title: "a".to_string(),
                    text: "x".repeat(50),
                    score: 0.9,
                },
                DocumentHit {
                    chunk_id: Uuid::new_v4(),
                    document_title: "b".to_string(),
                    text: "y".repeat(50),
                    score: 0.8,
                },
            ],
            ..Default::default()
        };

        let section = bundle.document_section(70);
        assert!(section.contains("[a]"));
        assert!(!section.contains("[b]"));

        // Budget below one entry still yields a truncated first chunk.
        let tight = bundle.document_section(20);
        assert_eq!(tight.len(), 20);
    }

    #[test]
    fn sources_deduplicate_documents_and_name_market_feeds() {
        let hit = |title: &str| DocumentHit {
            chunk_id: Uuid::new_v4(),
            document_title: title.to_string(),
            text: "t".to_string(),
            score: 0.5,
        };
        let bundle = ContextBundle {
            document_hits: vec![hit("report"), hit("report"), hit("notes")],
            summaries: vec![
                summarize("AAPL", "1mo", &synthetic_series(100.0, 1.0, 12)).unwrap()
            ],
            chart_data: None,
        };

        let sources = bundle.sources();
        let labels: Vec<&str> = sources.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["report", "notes", "Yahoo Finance: AAPL"]);
        assert_eq!(sources[2].origin, SourceOrigin::Market);
    }
}
