use serde::{Deserialize, Serialize};

use crate::market::errors::FetchError;

/// One closed 1-minute OHLCV candle for a single symbol.
///
/// Immutable once created; owned by the `CandleStore` after insertion.
/// `open_time` is always an exact multiple of 60_000 ms.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Candle {
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Base-asset volume.
    pub volume: f64,
    /// Quote-asset volume.
    pub quote_volume: f64,
    pub taker_buy_base_volume: f64,
    pub taker_buy_quote_volume: f64,
    pub trades: u64,
    pub open_time: i64,
    pub close_time: i64,
}

impl Candle {
    /// Per-minute volatility, `(high - low) / open`.
    pub fn volatility(&self) -> f64 {
        (self.high - self.low) / self.open
    }
}

/// Raw kline row as returned by the futures REST API: a positional array
/// `[openTime, open, high, low, close, volume, closeTime, quoteVolume,
///   trades, takerBuyBase, takerBuyQuote, ignore]`
/// with all prices and volumes encoded as strings.
#[derive(Debug, Deserialize)]
pub struct RawKline(
    pub i64,
    pub String,
    pub String,
    pub String,
    pub String,
    pub String,
    pub i64,
    pub String,
    pub u64,
    pub String,
    pub String,
    #[serde(default)] pub serde_json::Value,
);

impl RawKline {
    pub fn into_candle(self, symbol: &str) -> Result<Candle, FetchError> {
        Ok(Candle {
            symbol: symbol.to_string(),
            open_time: self.0,
            open: self.1.parse()?,
            high: self.2.parse()?,
            low: self.3.parse()?,
            close: self.4.parse()?,
            volume: self.5.parse()?,
            close_time: self.6,
            quote_volume: self.7.parse()?,
            trades: self.8,
            taker_buy_base_volume: self.9.parse()?,
            taker_buy_quote_volume: self.10.parse()?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ExchangeInfo {
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    pub symbol: String,
    pub status: String,
    #[serde(default)]
    pub contract_type: String,
}

/// Extracts the tradable perpetual universe, dropping stable-coin symbols
/// (anything starting or ending with `stable_marker`).
pub fn tradable_symbols(info: ExchangeInfo, stable_marker: &str) -> Vec<String> {
    info.symbols
        .into_iter()
        .filter(|s| s.status == "TRADING" && s.contract_type == "PERPETUAL")
        .map(|s| s.symbol)
        .filter(|name| !name.starts_with(stable_marker) && !name.ends_with(stable_marker))
        .collect()
}
