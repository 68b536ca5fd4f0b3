//! Answer synthesis over an assembled context bundle.
//!
//! [`synthesize`] builds a prompt from the bundle and asks the configured
//! [`LlmProvider`] to answer. The function itself never fails: when the
//! provider errors or is disabled, a deterministic templated answer is
//! rendered from the same bundle and marked with `used_fallback`, so the
//! caller always gets something useful and knows which path produced it.

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::config::{LlmConfig, RetrievalConfig};
use crate::context::ContextBundle;
use crate::error::LlmError;
use crate::models::AnswerResult;
use crate::router::{QueryRoute, RoutedQuery};

const SYSTEM_PROMPT: &str = "You are a financial research assistant. Answer the \
question using only the context below. Cite document titles when you use them. \
If the context does not contain the answer, say so plainly instead of guessing. \
Keep the answer concise and factual; this is not investment advice.";

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;
    /// Generate an answer for a fully built prompt.
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Create the configured provider; `disabled` always falls back.
pub fn create_provider(config: &LlmConfig) -> anyhow::Result<Box<dyn LlmProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledLlm)),
        "gemini" => Ok(Box::new(GeminiProvider::new(config)?)),
        other => anyhow::bail!("Unknown LLM provider: {}", other),
    }
}

/// Build the final prompt: system instructions, context sections, question.
pub fn build_prompt(
    routed: &RoutedQuery,
    bundle: &ContextBundle,
    retrieval: &RetrievalConfig,
) -> String {
    let mut prompt = String::from(SYSTEM_PROMPT);
    prompt.push_str("\n\n");

    if !bundle.document_hits.is_empty() {
        prompt.push_str("Document excerpts:\n");
        prompt.push_str(&bundle.document_section(retrieval.max_context_chars));
        prompt.push_str("\n\n");
    }
    if !bundle.summaries.is_empty() {
        prompt.push_str("Market data:\n");
        prompt.push_str(&bundle.market_section());
        prompt.push_str("\n\n");
    }
    if bundle.is_empty() {
        prompt.push_str("No relevant context was found.\n\n");
    }

    prompt.push_str("Question: ");
    prompt.push_str(&routed.text);
    prompt
}

/// Answer a query from its bundle. Provider failure is not an error:
/// the templated fallback is returned instead.
pub async fn synthesize(
    routed: &RoutedQuery,
    bundle: &ContextBundle,
    llm: &dyn LlmProvider,
    retrieval: &RetrievalConfig,
) -> AnswerResult {
    let prompt = build_prompt(routed, bundle, retrieval);

    let (text, used_fallback) = match llm.generate(&prompt).await {
        Ok(text) => (text, false),
        Err(LlmError::Disabled) => (fallback_answer(routed, bundle), true),
        Err(e) => {
            warn!(provider = llm.name(), error = %e, "LLM call failed, using fallback");
            (fallback_answer(routed, bundle), true)
        }
    };

    AnswerResult {
        text,
        sources: bundle.sources(),
        chart_data: bundle.chart_data.clone(),
        used_fallback,
    }
}

/// Deterministic answer rendered straight from the bundle.
fn fallback_answer(routed: &RoutedQuery, bundle: &ContextBundle) -> String {
    if bundle.is_empty() {
        return format!(
            "No relevant information was found for \"{}\". \
             Try ingesting related documents or naming a known ticker symbol.",
            routed.text
        );
    }

    let mut parts = Vec::new();
    if !bundle.summaries.is_empty() {
        parts.push(format!("Market data:\n{}", bundle.market_section()));
    }
    if !bundle.document_hits.is_empty() {
        let excerpts = bundle
            .document_hits
            .iter()
            .take(3)
            .map(|h| format!("- {} (from \"{}\")", excerpt(&h.text, 240), h.document_title))
            .collect::<Vec<_>>()
            .join("\n");
        parts.push(format!("Most relevant document excerpts:\n{}", excerpts));
    }
    parts.join("\n\n")
}

/// First `max` characters of a chunk, cut at a char boundary.
fn excerpt(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut.trim_end())
    }
}

// ============ Disabled Provider ============

/// Provider that always defers to the fallback template.
pub struct DisabledLlm;

#[async_trait]
impl LlmProvider for DisabledLlm {
    fn name(&self) -> &str {
        "disabled"
    }
    async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
        Err(LlmError::Disabled)
    }
}

// ============ Gemini Provider ============

/// Provider calling the Gemini `generateContent` endpoint. Requires the
/// `GOOGLE_API_KEY` environment variable.
pub struct GeminiProvider {
    model: String,
    api_key: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl GeminiProvider {
    pub fn new(config: &LlmConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| "gemini-1.5-flash".to_string());
        let api_key = std::env::var("GOOGLE_API_KEY")
            .map_err(|_| anyhow::anyhow!("GOOGLE_API_KEY environment variable not set"))?;
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            model,
            api_key,
            client,
            timeout,
        })
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.timeout)
                } else {
                    LlmError::Http(e.to_string())
                }
            })?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(LlmError::RateLimited);
        }
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(LlmError::Http(format!(
                "Gemini API error {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value =
            resp.json().await.map_err(|e| LlmError::Http(e.to_string()))?;
        json.pointer("/candidates/0/content/parts/0/text")
            .and_then(|t| t.as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| LlmError::Http("Gemini response missing candidate text".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DocumentHit;
    use crate::market::{summarize, synthetic_series};
    use crate::models::SourceOrigin;
    use crate::router::classify;
    use uuid::Uuid;

    struct ScriptedLlm {
        reply: Result<String, ()>,
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        fn name(&self) -> &str {
            "scripted"
        }
        async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
            self.reply
                .clone()
                .map_err(|_| LlmError::Http("scripted failure".to_string()))
        }
    }

    fn hit(title: &str, text: &str) -> DocumentHit {
        DocumentHit {
            chunk_id: Uuid::new_v4(),
            document_title: title.to_string(),
            text: text.to_string(),
            score: 0.8,
        }
    }

    fn stock_bundle() -> ContextBundle {
        let bars = synthetic_series(150.0, 1.0, 15);
        ContextBundle {
            document_hits: Vec::new(),
            summaries: vec![summarize("AAPL", "1mo", &bars).unwrap()],
            chart_data: Some(bars),
        }
    }

    #[tokio::test]
    async fn successful_llm_answer_passes_through() {
        let routed = classify("What is AAPL price today");
        let bundle = stock_bundle();
        let llm = ScriptedLlm {
            reply: Ok("AAPL closed higher.".to_string()),
        };
        let cfg = RetrievalConfig::default();

        let answer = synthesize(&routed, &bundle, &llm, &cfg).await;
        assert_eq!(answer.text, "AAPL closed higher.");
        assert!(!answer.used_fallback);
        assert_eq!(answer.sources.len(), 1);
        assert!(answer.chart_data.is_some());
    }

    #[tokio::test]
    async fn llm_failure_yields_fallback_not_error() {
        let routed = classify("What is AAPL price today");
        let bundle = stock_bundle();
        let llm = ScriptedLlm { reply: Err(()) };
        let cfg = RetrievalConfig::default();

        let answer = synthesize(&routed, &bundle, &llm, &cfg).await;
        assert!(answer.used_fallback);
        assert!(answer.text.contains("AAPL"));
        assert!(answer.text.contains("Market data"));
        // Provenance survives the fallback path.
        assert_eq!(answer.sources[0].origin, SourceOrigin::Market);
    }

    #[tokio::test]
    async fn disabled_provider_always_falls_back() {
        let routed = classify("Summarize the report");
        let bundle = ContextBundle {
            document_hits: vec![hit("report", "revenue grew twelve percent")],
            ..Default::default()
        };
        let cfg = RetrievalConfig::default();

        let answer = synthesize(&routed, &bundle, &DisabledLlm, &cfg).await;
        assert!(answer.used_fallback);
        assert!(answer.text.contains("revenue grew twelve percent"));
        assert!(answer.text.contains("report"));
    }

    #[tokio::test]
    async fn empty_bundle_gets_explicit_no_information_answer() {
        let routed = classify("Summarize the missing report");
        let bundle = ContextBundle::default();
        let cfg = RetrievalConfig::default();

        let answer = synthesize(&routed, &bundle, &DisabledLlm, &cfg).await;
        assert!(answer.used_fallback);
        assert!(answer.text.contains("No relevant information"));
        assert!(answer.sources.is_empty());
    }

    #[test]
    fn prompt_contains_sections_and_question() {
        let routed = classify("How did Apple perform given its earnings");
        let mut bundle = stock_bundle();
        bundle.document_hits = vec![hit("q3-report", "earnings beat expectations")];
        let cfg = RetrievalConfig::default();

        let prompt = build_prompt(&routed, &bundle, &cfg);
        assert!(prompt.contains("Document excerpts:"));
        assert!(prompt.contains("earnings beat expectations"));
        assert!(prompt.contains("Market data:"));
        assert!(prompt.contains("Question: How did Apple perform given its earnings"));
    }

    #[test]
    fn long_excerpts_are_shortened() {
        let short = excerpt("short text", 240);
        assert_eq!(short, "short text");
        let long = excerpt(&"word ".repeat(100), 40);
        assert!(long.ends_with("..."));
        assert!(long.len() <= 44);
    }
}
