//! Exchange-agnostic market-data shapes (spec §3 `NormalizedRecord`,
//! `SubscriptionDescriptor`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of market-data event a [`NormalizedRecord`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Trade,
    Ticker,
    Kline,
    Depth,
}

impl DataType {
    /// The lowercase token used in stream names (`<symbol>@<dataType>`).
    pub fn as_stream_token(&self) -> &'static str {
        match self {
            Self::Trade => "trade",
            Self::Ticker => "ticker",
            Self::Kline => "kline",
            Self::Depth => "depth",
        }
    }

    /// Parse a stream-name data-type token. Unknown tokens are rejected —
    /// adapters decide whether an unrecognized type is a hard parse error
    /// or a silently-dropped frame.
    pub fn from_stream_token(token: &str) -> Option<Self> {
        match token {
            "trade" => Some(Self::Trade),
            "ticker" => Some(Self::Ticker),
            "kline" => Some(Self::Kline),
            "depth" => Some(Self::Depth),
            _ => None,
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_stream_token())
    }
}

/// An exchange-agnostic market-data event (spec §3 `NormalizedRecord`).
///
/// Immutable once produced: every field is set at construction and never
/// mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub exchange: String,
    pub symbol: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    /// Event timestamp in epoch milliseconds, taken from the exchange
    /// payload when present, else the receive time.
    pub timestamp: i64,
    /// Exchange-specific payload, carried opaquely.
    pub data: serde_json::Value,
    /// When this record was received locally, epoch milliseconds.
    pub received_at: i64,
}

impl NormalizedRecord {
    /// Topic this record publishes to: `<prefix>.<exchange>.<dataType>`
    /// (spec §6 "Topic naming").
    pub fn topic(&self, prefix: &str) -> String {
        format!("{prefix}.{}.{}", self.exchange, self.data_type)
    }
}

/// A symbol/data-type subscription request tracked by an Adapter (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionDescriptor {
    /// Unique within the owning adapter.
    pub id: String,
    pub symbol: String,
    pub data_type: DataType,
    pub subscribed_at: DateTime<Utc>,
    pub active: bool,
}

impl SubscriptionDescriptor {
    pub fn new(id: impl Into<String>, symbol: impl Into<String>, data_type: DataType) -> Self {
        Self {
            id: id.into(),
            symbol: symbol.into(),
            data_type,
            subscribed_at: Utc::now(),
            active: true,
        }
    }

    /// The stream name this descriptor maps to: `lower(symbol)@dataType`
    /// (spec §4.2 "Stream name formation").
    pub fn stream_name(&self) -> String {
        format!("{}@{}", self.symbol.to_lowercase(), self.data_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_name_lowercases_symbol() {
        let desc = SubscriptionDescriptor::new("1", "BTCUSDT", DataType::Ticker);
        assert_eq!(desc.stream_name(), "btcusdt@ticker");
    }

    #[test]
    fn topic_composes_prefix_exchange_type() {
        let record = NormalizedRecord {
            exchange: "binance".into(),
            symbol: "BTCUSDT".into(),
            data_type: DataType::Trade,
            timestamp: 0,
            data: serde_json::json!({}),
            received_at: 0,
        };
        assert_eq!(record.topic("market-data"), "market-data.binance.trade");
    }

    #[test]
    fn data_type_round_trips_through_stream_token() {
        for dt in [DataType::Trade, DataType::Ticker, DataType::Kline, DataType::Depth] {
            assert_eq!(DataType::from_stream_token(dt.as_stream_token()), Some(dt));
        }
    }
}
