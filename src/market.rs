use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum MarketDataError {
    #[error("invalid symbol '{0}'")]
    InvalidSymbol(String),
    #[error("market data unavailable")]
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockQuote {
    pub symbol: String,
    pub price: f64,
    #[serde(default)]
    pub change: f64,
    #[serde(default, alias = "changePercent")]
    pub change_percent: f64,
    #[serde(default)]
    pub volume: Option<u64>,
    #[serde(default)]
    pub currency: Option<String>,
}

/// Quote lookups against a stock-data service. Off the conversation path:
/// any failure collapses to [`MarketDataError::Unavailable`].
pub struct StockDataClient {
    base_url: String,
    client: Client,
}

impl StockDataClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, MarketDataError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            warn!(error = %e, "failed to build market data client");
            MarketDataError::Unavailable
        })?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub async fn quote(&self, symbol: &str) -> Result<StockQuote, MarketDataError> {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() || !symbol.chars().all(|c| c.is_ascii_alphanumeric() || c == '&' || c == '-') {
            return Err(MarketDataError::InvalidSymbol(symbol));
        }

        let resp = self
            .client
            .get(format!("{}/quote/{}", self.base_url, symbol))
            .send()
            .await
            .map_err(|e| {
                warn!(symbol = %symbol, error = %e, "quote request failed");
                MarketDataError::Unavailable
            })?;

        if !resp.status().is_success() {
            warn!(symbol = %symbol, status = resp.status().as_u16(), "quote service returned an error");
            return Err(MarketDataError::Unavailable);
        }

        let quote: StockQuote = resp.json().await.map_err(|e| {
            warn!(symbol = %symbol, error = %e, "malformed quote response");
            MarketDataError::Unavailable
        })?;
        debug!(symbol = %quote.symbol, price = quote.price, "quote received");
        Ok(quote)
    }
}
