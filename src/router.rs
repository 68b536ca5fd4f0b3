//! Query classification and ticker extraction.
//!
//! Pure and deterministic: the router scores a question against a market
//! lexicon and a document lexicon and never makes an external call, so it
//! is unit-testable in isolation. Downstream consumers match exhaustively
//! on the closed [`QueryRoute`] enum.

/// How a query should be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryRoute {
    /// Live market data only.
    Stock,
    /// Document retrieval only.
    Document,
    /// Both, merged into one context bundle.
    Mixed,
}

impl QueryRoute {
    /// Stable tag used in cache keys and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryRoute::Stock => "stock",
            QueryRoute::Document => "document",
            QueryRoute::Mixed => "mixed",
        }
    }
}

/// A classified query, transient per request.
#[derive(Debug, Clone)]
pub struct RoutedQuery {
    pub text: String,
    pub route: QueryRoute,
    /// Ticker symbols mentioned in the query, in order of appearance.
    pub symbols: Vec<String>,
}

const MARKET_TERMS: &[&str] = &[
    "stock", "stocks", "share", "shares", "price", "prices", "ticker", "market", "trading",
    "volume", "chart", "trend", "perform", "performs", "performed", "performance", "bull",
    "bear", "nasdaq", "nyse", "dow", "equity", "securities",
];

const DOCUMENT_TERMS: &[&str] = &[
    "report", "reports", "summarize", "summary", "earnings", "filing", "filings", "document",
    "documents", "revenue", "profit", "quarterly", "annual", "statement", "balance", "income",
];

const ANALYTICAL_VERBS: &[&str] = &[
    "analyze", "analyse", "compare", "perform", "performed", "given", "impact", "affect",
    "outlook", "review", "explain",
];

/// Stock symbols recognized without a company-name lookup.
const KNOWN_SYMBOLS: &[&str] = &[
    "AAPL", "MSFT", "GOOGL", "GOOG", "AMZN", "TSLA", "META", "NFLX", "NVDA", "AMD", "INTC",
    "ORCL", "CRM", "ADBE", "IBM", "PYPL", "UBER", "SHOP", "JPM", "BAC", "GS", "MS", "V", "MA",
    "JNJ", "PFE", "MRK", "UNH", "KO", "PEP", "MCD", "SBUX", "NKE", "DIS", "HD", "WMT", "SPY",
    "QQQ", "VTI", "VOO",
];

/// Company names mapped to their primary ticker.
const COMPANY_SYMBOLS: &[(&str, &str)] = &[
    ("apple", "AAPL"),
    ("microsoft", "MSFT"),
    ("google", "GOOGL"),
    ("alphabet", "GOOGL"),
    ("amazon", "AMZN"),
    ("tesla", "TSLA"),
    ("facebook", "META"),
    ("meta", "META"),
    ("netflix", "NFLX"),
    ("nvidia", "NVDA"),
    ("intel", "INTC"),
    ("oracle", "ORCL"),
    ("adobe", "ADBE"),
    ("paypal", "PYPL"),
    ("uber", "UBER"),
    ("shopify", "SHOP"),
    ("jpmorgan", "JPM"),
    ("goldman", "GS"),
    ("visa", "V"),
    ("mastercard", "MA"),
    ("pfizer", "PFE"),
    ("walmart", "WMT"),
    ("disney", "DIS"),
    ("nike", "NKE"),
    ("starbucks", "SBUX"),
];

/// Classify a question as stock-, document-, or mixed-oriented.
///
/// Policy: positive market score alone → Stock; positive document score
/// alone → Document; both positive → Mixed; both zero → Mixed when a
/// known company or ticker appears alongside an analytical verb,
/// otherwise Document (retrieval is the safest default).
pub fn classify(text: &str) -> RoutedQuery {
    let tokens = tokenize(text);
    let lowered: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();

    let market_score = lowered
        .iter()
        .filter(|t| MARKET_TERMS.contains(&t.as_str()))
        .count();
    let document_score = lowered
        .iter()
        .filter(|t| DOCUMENT_TERMS.contains(&t.as_str()))
        .count();

    let symbols = extract_symbols(&tokens, &lowered);

    let route = match (market_score > 0, document_score > 0) {
        (true, true) => QueryRoute::Mixed,
        (true, false) => QueryRoute::Stock,
        (false, true) => QueryRoute::Document,
        (false, false) => {
            let analytical = lowered
                .iter()
                .any(|t| ANALYTICAL_VERBS.contains(&t.as_str()));
            if !symbols.is_empty() && analytical {
                QueryRoute::Mixed
            } else {
                QueryRoute::Document
            }
        }
    };

    RoutedQuery {
        text: text.to_string(),
        route,
        symbols,
    }
}

fn tokenize(text: &str) -> Vec<&str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Pull ticker symbols out of a query: uppercase 1-5 letter tokens that
/// match the known-symbol table, plus company-name mentions.
fn extract_symbols(tokens: &[&str], lowered: &[String]) -> Vec<String> {
    let mut symbols: Vec<String> = Vec::new();

    for token in tokens {
        let is_upper = token.len() <= 5 && token.chars().all(|c| c.is_ascii_uppercase());
        if is_upper && KNOWN_SYMBOLS.contains(token) && !symbols.iter().any(|s| s == token) {
            symbols.push(token.to_string());
        }
    }

    for t in lowered {
        if let Some((_, symbol)) = COMPANY_SYMBOLS.iter().find(|(name, _)| name == t) {
            if !symbols.iter().any(|s| s == symbol) {
                symbols.push(symbol.to_string());
            }
        }
    }

    symbols
}
