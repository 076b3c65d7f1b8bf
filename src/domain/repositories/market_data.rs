//! Market data port
//!
//! Callers of the ledger use this capability to price a close when the
//! client does not supply an exit price. The ledger itself never depends on
//! it.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MarketDataError {
    #[error("No quote available for {0}")]
    NoQuote(String),

    #[error("Market data request failed: {0}")]
    RequestFailed(String),

    #[error("Market data request timed out")]
    Timeout,

    #[error("Invalid market data URL: {0}")]
    InvalidUrl(String),
}

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Last traded price for `symbol`.
    async fn last_price(&self, symbol: &str) -> Result<f64, MarketDataError>;
}

/// Fixed quotes, for tests and offline runs.
#[derive(Debug, Clone, Default)]
pub struct StaticQuotes {
    prices: HashMap<String, f64>,
}

impl StaticQuotes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(mut self, symbol: &str, price: f64) -> Self {
        self.prices.insert(symbol.to_ascii_uppercase(), price);
        self
    }
}

#[async_trait]
impl MarketDataProvider for StaticQuotes {
    async fn last_price(&self, symbol: &str) -> Result<f64, MarketDataError> {
        self.prices
            .get(&symbol.to_ascii_uppercase())
            .copied()
            .ok_or_else(|| MarketDataError::NoQuote(symbol.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    price: f64,
}

/// HTTP quote service returning `{"price": <f64>}` from `GET {base_url}/quote/{symbol}`.
///
/// The symbol is sent as a single percent-encoded path segment, so
/// `EUR/USD` is requested as `/quote/EUR%2FUSD`.
pub struct HttpMarketData {
    client: reqwest::Client,
    base_url: reqwest::Url,
}

impl HttpMarketData {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, MarketDataError> {
        let base_url = reqwest::Url::parse(base_url)
            .map_err(|e| MarketDataError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(MarketDataError::InvalidUrl(base_url.to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MarketDataError::RequestFailed(e.to_string()))?;
        Ok(Self { client, base_url })
    }

    fn quote_url(&self, symbol: &str) -> Result<reqwest::Url, MarketDataError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| MarketDataError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push("quote")
            .push(symbol);
        Ok(url)
    }
}

#[async_trait]
impl MarketDataProvider for HttpMarketData {
    async fn last_price(&self, symbol: &str) -> Result<f64, MarketDataError> {
        let url = self.quote_url(symbol)?;
        debug!("Fetching quote: {}", url);

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                MarketDataError::Timeout
            } else {
                MarketDataError::RequestFailed(e.to_string())
            }
        })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(MarketDataError::NoQuote(symbol.to_string()));
        }
        if !response.status().is_success() {
            warn!("Quote request for {} returned {}", symbol, response.status());
            return Err(MarketDataError::RequestFailed(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let quote: QuoteResponse = response
            .json()
            .await
            .map_err(|e| MarketDataError::RequestFailed(e.to_string()))?;
        Ok(quote.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_quotes_lookup_is_case_insensitive() {
        let quotes = StaticQuotes::new().with_price("btc-usd", 64000.0);
        assert_eq!(quotes.last_price("BTC-USD").await.unwrap(), 64000.0);
    }

    #[tokio::test]
    async fn test_static_quotes_missing_symbol() {
        let quotes = StaticQuotes::new();
        assert_eq!(
            quotes.last_price("ETH-USD").await.unwrap_err(),
            MarketDataError::NoQuote("ETH-USD".to_string())
        );
    }

    #[test]
    fn test_quote_url_ignores_trailing_slash() {
        let client = HttpMarketData::new("http://quotes.local/", Duration::from_secs(2)).unwrap();
        assert_eq!(
            client.quote_url("BTC-USD").unwrap().as_str(),
            "http://quotes.local/quote/BTC-USD"
        );

        let client = HttpMarketData::new("http://quotes.local/api/", Duration::from_secs(2)).unwrap();
        assert_eq!(
            client.quote_url("BTC-USD").unwrap().as_str(),
            "http://quotes.local/api/quote/BTC-USD"
        );
    }

    #[test]
    fn test_quote_url_encodes_slash_in_symbol() {
        let client = HttpMarketData::new("http://quotes.local", Duration::from_secs(2)).unwrap();
        let url = client.quote_url("EUR/USD").unwrap();
        assert_eq!(url.as_str(), "http://quotes.local/quote/EUR%2FUSD");
        assert_eq!(url.path_segments().map(|s| s.count()), Some(2));
    }

    #[test]
    fn test_http_market_data_rejects_bad_base_url() {
        assert!(matches!(
            HttpMarketData::new("not a url", Duration::from_secs(2)),
            Err(MarketDataError::InvalidUrl(_))
        ));
        assert!(matches!(
            HttpMarketData::new("mailto:quotes@example.com", Duration::from_secs(2)),
            Err(MarketDataError::InvalidUrl(_))
        ));
    }
}
