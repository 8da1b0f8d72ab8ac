//! Closed-vocabulary domain gate, ticker extraction and intent tagging.
//!
//! All matching is plain lower-cased substring search over fixed tables, so
//! the same input always yields the same classification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lower-cased terms that mark a query as being about equities or markets.
const DOMAIN_KEYWORDS: &[&str] = &[
    "stock",
    "share",
    "equity",
    "equities",
    "nse",
    "bse",
    "nifty",
    "sensex",
    "portfolio",
    "dividend",
    "market",
    "invest",
    "trading",
    "trader",
    "buy",
    "sell",
    "ipo",
    "mutual fund",
    "sector",
    "ticker",
    "valuation",
    "earnings",
    "p/e",
    "pe ratio",
    "bull",
    "bear",
    "rally",
    "target price",
    "stop loss",
    "intraday",
    "technical analysis",
    "fundamental",
    "quarterly results",
    "demat",
];

/// NSE symbols the assistant recognises, in catalog order.
pub const KNOWN_SYMBOLS: &[&str] = &[
    "RELIANCE",
    "TCS",
    "HDFCBANK",
    "INFY",
    "ICICIBANK",
    "HINDUNILVR",
    "SBIN",
    "BHARTIARTL",
    "KOTAKBANK",
    "BAJFINANCE",
    "AXISBANK",
    "ASIANPAINT",
    "MARUTI",
    "TITAN",
    "SUNPHARMA",
    "ULTRACEMCO",
    "WIPRO",
    "NESTLEIND",
    "TATAMOTORS",
    "TATASTEEL",
    "POWERGRID",
    "NTPC",
    "ONGC",
    "ADANIENT",
    "HCLTECH",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Recommendation,
    TechnicalAnalysis,
    FundamentalAnalysis,
    NewsAnalysis,
    SectorAnalysis,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Recommendation => "recommendation",
            QueryType::TechnicalAnalysis => "technical_analysis",
            QueryType::FundamentalAnalysis => "fundamental_analysis",
            QueryType::NewsAnalysis => "news_analysis",
            QueryType::SectorAnalysis => "sector_analysis",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checked top to bottom; the first rule with a matching term wins.
const INTENT_RULES: &[(QueryType, &[&str])] = &[
    (
        QueryType::Recommendation,
        &["buy", "sell", "hold", "recommend", "should i", "invest in", "good time to"],
    ),
    (
        QueryType::TechnicalAnalysis,
        &[
            "technical",
            "chart",
            "rsi",
            "macd",
            "moving average",
            "support",
            "resistance",
            "breakout",
        ],
    ),
    (
        QueryType::FundamentalAnalysis,
        &[
            "fundamental",
            "p/e",
            "pe ratio",
            "earnings",
            "balance sheet",
            "revenue",
            "profit",
            "valuation",
            "debt",
        ],
    ),
    (
        QueryType::NewsAnalysis,
        &["news", "announcement", "headline", "results", "latest", "update"],
    ),
    (
        QueryType::SectorAnalysis,
        &["sector", "industry", "banking stocks", "it stocks", "pharma stocks"],
    ),
];

pub fn is_in_domain(text: &str) -> bool {
    let lower = text.to_lowercase();
    DOMAIN_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Known tickers mentioned anywhere in `text`. Unknown tickers are never returned.
pub fn extract_symbols(text: &str) -> Vec<String> {
    let upper = text.to_uppercase();
    KNOWN_SYMBOLS
        .iter()
        .filter(|symbol| upper.contains(*symbol))
        .map(|symbol| symbol.to_string())
        .collect()
}

pub fn classify_intent(text: &str) -> Option<QueryType> {
    let lower = text.to_lowercase();
    INTENT_RULES
        .iter()
        .find(|(_, terms)| terms.iter().any(|term| lower.contains(term)))
        .map(|(query_type, _)| *query_type)
}

/// Everything the augmentor needs from one utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub in_domain: bool,
    pub symbols: Vec<String>,
    pub intent: Option<QueryType>,
}

pub fn classify(text: &str) -> Classification {
    Classification {
        in_domain: is_in_domain(text),
        symbols: extract_symbols(text),
        intent: classify_intent(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_domain_keywords() {
        assert!(is_in_domain("Should I buy RELIANCE now?"));
        assert!(is_in_domain("How is the NIFTY doing"));
        assert!(is_in_domain("best DIVIDEND payers"));
        assert!(is_in_domain("review my portfolio"));
    }

    #[test]
    fn test_out_of_domain() {
        assert!(!is_in_domain("What's the weather today?"));
        assert!(!is_in_domain("Tell me a joke"));
        assert!(!is_in_domain(""));
    }

    #[test]
    fn test_extract_symbols_catalog_order_and_dedup() {
        assert_eq!(extract_symbols("Should I buy RELIANCE now?"), vec!["RELIANCE"]);
        assert_eq!(
            extract_symbols("compare infy with tcs and INFY again"),
            vec!["TCS", "INFY"]
        );
    }

    #[test]
    fn test_unknown_tickers_ignored() {
        assert!(extract_symbols("what about ZOMATO and PAYTM?").is_empty());
    }

    #[test]
    fn test_intent_first_rule_wins() {
        assert_eq!(
            classify_intent("Should I buy RELIANCE now?"),
            Some(QueryType::Recommendation)
        );
        // "sell" also appears alongside technical terms; recommendation is checked first.
        assert_eq!(
            classify_intent("sell TCS on RSI divergence?"),
            Some(QueryType::Recommendation)
        );
        assert_eq!(
            classify_intent("TCS RSI and MACD levels"),
            Some(QueryType::TechnicalAnalysis)
        );
        assert_eq!(
            classify_intent("HDFCBANK balance sheet"),
            Some(QueryType::FundamentalAnalysis)
        );
        assert_eq!(classify_intent("latest news on SBIN"), Some(QueryType::NewsAnalysis));
        assert_eq!(
            classify_intent("outlook for the auto sector"),
            Some(QueryType::SectorAnalysis)
        );
        assert_eq!(classify_intent("what's the weather today?"), None);
    }

    #[test]
    fn test_classify_scenario() {
        let c = classify("Should I buy RELIANCE now?");
        assert!(c.in_domain);
        assert_eq!(c.symbols, vec!["RELIANCE"]);
        assert_eq!(c.intent, Some(QueryType::Recommendation));
    }
}
