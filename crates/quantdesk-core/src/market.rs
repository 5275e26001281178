use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::ServiceResult;
use crate::http::{build_client, decode, trim_base_url};
use crate::series::SeriesPoint;
use crate::session::SignalContext;
use crate::signal::Signal;

/// Search hits of these kinds can be added to the watchlist.
const TRADABLE_KINDS: [&str; 2] = ["EQUITY", "ETF"];
const MAX_SEARCH_HITS: usize = 6;

/// Latest quote for one watchlist symbol.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub symbol: String,
    pub name: String,
    pub price: f64,
    /// Absolute change since the previous close.
    pub change: f64,
    /// Percent change since the previous close.
    pub pct: f64,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub mkt_cap: Option<String>,
}

impl Quote {
    pub fn is_up(&self) -> bool {
        self.pct >= 0.0
    }
}

/// One result of a ticker search.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearchHit {
    pub symbol: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl SearchHit {
    pub fn is_tradable(&self) -> bool {
        TRADABLE_KINDS.contains(&self.kind.as_str())
    }
}

/// Quotes, history and ticker search from the market-data service.
#[derive(Clone)]
pub struct MarketClient {
    client: Client,
    base_url: String,
}

impl MarketClient {
    pub fn new(base_url: &str, timeout: Duration) -> ServiceResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: trim_base_url(base_url),
        })
    }

    /// Quotes in watchlist order. Symbols the service could not price are
    /// left out.
    pub async fn quotes(&self, symbols: &[String]) -> ServiceResult<Vec<Quote>> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/stocks", self.base_url);
        let joined = symbols
            .iter()
            .map(|s| s.to_uppercase())
            .collect::<Vec<_>>()
            .join(",");
        let response = self
            .client
            .get(&url)
            .query(&[("symbols", joined.as_str())])
            .send()
            .await?;

        let quotes: Vec<Quote> = decode(response).await?;
        debug!(requested = symbols.len(), returned = quotes.len(), "loaded quotes");
        Ok(quotes)
    }

    /// Tradable matches for `query`, best first. A blank query never hits the
    /// network.
    pub async fn search(&self, query: &str) -> ServiceResult<Vec<SearchHit>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/search", self.base_url);
        let response = self.client.get(&url).query(&[("q", query)]).send().await?;
        let hits: Vec<SearchHit> = decode(response).await?;
        Ok(hits
            .into_iter()
            .filter(SearchHit::is_tradable)
            .take(MAX_SEARCH_HITS)
            .collect())
    }

    /// Closing prices for the last `days` days, oldest first.
    pub async fn history(&self, symbol: &str, days: u32) -> ServiceResult<Vec<SeriesPoint>> {
        let url = format!("{}/api/history/{}", self.base_url, symbol.to_uppercase());
        let response = self
            .client
            .get(&url)
            .query(&[("days", days)])
            .send()
            .await?;

        let points: Vec<SeriesPoint> = decode(response).await?;
        debug!(symbol, days, points = points.len(), "loaded price history");
        // The service only reports prices; strip anything else so the series
        // is a clean historical side for the compositor.
        Ok(points
            .into_iter()
            .map(|point| SeriesPoint {
                predicted: None,
                ..point
            })
            .collect())
    }
}

/// Output of the forecasting model for one symbol.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub symbol: String,
    pub current_price: f64,
    pub target_price: f64,
    pub delta_pct: f64,
    pub signal: Signal,
    pub forecast: Vec<SeriesPoint>,
    #[serde(default)]
    pub pred_days: Option<u32>,
}

impl Prediction {
    pub fn signal_context(&self) -> SignalContext {
        SignalContext {
            signal: self.signal,
            confidence: None,
            target_price: Some(self.target_price),
        }
    }
}

/// Client for the forecasting model service.
#[derive(Clone)]
pub struct ForecastClient {
    client: Client,
    base_url: String,
}

impl ForecastClient {
    pub fn new(base_url: &str, timeout: Duration) -> ServiceResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: trim_base_url(base_url),
        })
    }

    /// Runs the model for `symbol`. This can take a while on the server side
    /// since it trains before forecasting.
    pub async fn predict(&self, symbol: &str) -> ServiceResult<Prediction> {
        let url = format!("{}/api/predict/{}", self.base_url, symbol.to_uppercase());
        let response = self.client.get(&url).send().await?;
        let prediction: Prediction = decode(response).await?;
        debug!(
            symbol = %prediction.symbol,
            signal = %prediction.signal,
            points = prediction.forecast.len(),
            "forecast ready"
        );
        Ok(prediction)
    }
}
