use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument};

use crate::market::errors::FetchError;
use crate::market::types::{Candle, ExchangeInfo, RawKline, tradable_symbols};

/// Seam between the fetch pipeline and the exchange REST API.
///
/// The production implementation is `BinanceClient`; tests drive the fetcher
/// and scheduler through mock sources instead.
#[async_trait]
pub trait KlineSource: Send + Sync {
    /// Returns up to `limit` 1-minute candles for `symbol` ending at
    /// `end_time_ms` (inclusive), oldest first.
    async fn fetch_klines(
        &self,
        symbol: &str,
        limit: usize,
        end_time_ms: i64,
    ) -> Result<Vec<Candle>, FetchError>;

    /// Returns the currently tradable perpetual-contract symbols.
    async fn trading_symbols(&self) -> Result<Vec<String>, FetchError>;
}

#[derive(Clone)]
pub struct BinanceClient {
    http: Client,
    base_url: String,
    stable_marker: String,
}

impl BinanceClient {
    pub fn new(
        base_url: String,
        request_timeout: Duration,
        stable_marker: String,
    ) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(request_timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url,
            stable_marker,
        })
    }
}

#[async_trait]
impl KlineSource for BinanceClient {
    #[instrument(skip(self), fields(symbol = %symbol), level = "debug")]
    async fn fetch_klines(
        &self,
        symbol: &str,
        limit: usize,
        end_time_ms: i64,
    ) -> Result<Vec<Candle>, FetchError> {
        let url = format!("{}/fapi/v1/klines", self.base_url);

        let resp = self
            .http
            .get(&url)
            .query(&[
                ("symbol", symbol.to_string()),
                ("interval", "1m".to_string()),
                ("limit", limit.to_string()),
                ("endTime", end_time_ms.to_string()),
            ])
            .send()
            .await?;

        match resp.status() {
            StatusCode::OK => {}
            StatusCode::TOO_MANY_REQUESTS => return Err(FetchError::RateLimited),
            status => return Err(FetchError::Status(status)),
        }

        let rows: Vec<RawKline> = resp.json().await?;

        debug!(rows = rows.len(), "klines fetched");

        rows.into_iter()
            .map(|row| row.into_candle(symbol))
            .collect()
    }

    async fn trading_symbols(&self) -> Result<Vec<String>, FetchError> {
        let url = format!("{}/fapi/v1/exchangeInfo", self.base_url);

        let resp = self.http.get(&url).send().await?;

        match resp.status() {
            StatusCode::OK => {}
            StatusCode::TOO_MANY_REQUESTS => return Err(FetchError::RateLimited),
            status => return Err(FetchError::Status(status)),
        }

        let info: ExchangeInfo = resp.json().await?;
        Ok(tradable_symbols(info, &self.stable_marker))
    }
}
