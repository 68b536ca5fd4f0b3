//! TTL cache for synthesized answers.
//!
//! Keyed by the normalized query text plus the route tag, so a question
//! that later classifies differently never hits a stale entry from the
//! other route. Expiry is lazy: entries are dropped when a lookup finds
//! them past their deadline, and `put` sweeps expired entries as it goes.
//! A disabled cache misses on every `get` and ignores every `put`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::CacheConfig;
use crate::models::AnswerResult;
use crate::router::QueryRoute;

struct CacheEntry {
    answer: AnswerResult,
    expires_at: Instant,
}

pub struct ResponseCache {
    enabled: bool,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            enabled: config.enabled,
            ttl: Duration::from_secs(config.ttl_secs),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Look up a fresh entry; expired entries are removed on the way.
    pub fn get(&self, query: &str, route: QueryRoute) -> Option<AnswerResult> {
        if !self.enabled {
            return None;
        }
        let key = cache_key(query, route);
        let mut entries = self.lock();
        match entries.get(&key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                debug!(key = %key, "cache hit");
                Some(entry.answer.clone())
            }
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, query: &str, route: QueryRoute, answer: AnswerResult) {
        if !self.enabled {
            return;
        }
        let mut entries = self.lock();
        let now = Instant::now();
        entries.retain(|_, e| e.expires_at > now);
        entries.insert(
            cache_key(query, route),
            CacheEntry {
                answer,
                expires_at: now + self.ttl,
            },
        );
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        match self.entries.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Lowercased, whitespace-folded query text joined with the route tag.
fn cache_key(query: &str, route: QueryRoute) -> String {
    let normalized = query
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    format!("{}\u{1f}{}", normalized, route.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(text: &str) -> AnswerResult {
        AnswerResult {
            text: text.to_string(),
            sources: Vec::new(),
            chart_data: None,
            used_fallback: false,
        }
    }

    fn cache(enabled: bool, ttl_secs: u64) -> ResponseCache {
        ResponseCache::new(&CacheConfig { enabled, ttl_secs })
    }

    #[test]
    fn hit_within_ttl() {
        let c = cache(true, 300);
        c.put("What is AAPL price", QueryRoute::Stock, answer("up"));
        let hit = c.get("What is AAPL price", QueryRoute::Stock).unwrap();
        assert_eq!(hit.text, "up");
    }

    #[test]
    fn key_normalizes_case_and_whitespace() {
        let c = cache(true, 300);
        c.put("What is  AAPL price", QueryRoute::Stock, answer("up"));
        assert!(c.get("what is aapl PRICE", QueryRoute::Stock).is_some());
    }

    #[test]
    fn route_is_part_of_the_key() {
        let c = cache(true, 300);
        c.put("apple outlook", QueryRoute::Stock, answer("stock answer"));
        assert!(c.get("apple outlook", QueryRoute::Document).is_none());
        assert!(c.get("apple outlook", QueryRoute::Stock).is_some());
    }

    #[test]
    fn disabled_cache_never_stores() {
        let c = cache(false, 300);
        c.put("q", QueryRoute::Document, answer("a"));
        assert!(c.get("q", QueryRoute::Document).is_none());
        assert!(c.is_empty());
    }

    #[test]
    fn clear_empties_the_cache() {
        let c = cache(true, 300);
        c.put("q1", QueryRoute::Document, answer("a"));
        c.put("q2", QueryRoute::Stock, answer("b"));
        assert_eq!(c.len(), 2);
        c.clear();
        assert!(c.is_empty());
    }

    #[test]
    fn expired_entries_miss_and_are_purged() {
        // Zero TTL expires entries immediately.
        let c = cache(true, 0);
        c.put("q", QueryRoute::Document, answer("a"));
        assert!(c.get("q", QueryRoute::Document).is_none());
        assert!(c.is_empty());
    }
}
