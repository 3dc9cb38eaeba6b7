//! The illustrative exchange wire format (spec §4.2 `parseMessage`, §6
//! "Stream-name grammar", §8 scenario 5).

use chrono::Utc;
use serde::Deserialize;

use super::MessageParser;
use crate::record::{DataType, NormalizedRecord};

#[derive(Debug, Deserialize)]
struct RawFrame {
    stream: String,
    data: serde_json::Value,
}

/// Parses `{"stream": "<symbol>@<type>", "data": {...}}` frames, the
/// combined-stream envelope used by the exchange this spec names as its one
/// illustrative wire format.
pub struct BinanceParser;

impl MessageParser for BinanceParser {
    fn exchange_name(&self) -> &str {
        "binance"
    }

    fn parse_message(&self, frame: &str) -> Option<NormalizedRecord> {
        let raw: RawFrame = serde_json::from_str(frame).ok()?;
        let (symbol, type_token) = raw.stream.split_once('@')?;
        let data_type = DataType::from_stream_token(type_token)?;

        let timestamp = raw
            .data
            .get("E")
            .and_then(|v| v.as_i64())
            .unwrap_or_else(|| Utc::now().timestamp_millis());

        Some(NormalizedRecord {
            exchange: self.exchange_name().to_owned(),
            symbol: symbol.to_uppercase(),
            data_type,
            timestamp,
            data: raw.data,
            received_at: Utc::now().timestamp_millis(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ticker_frame() {
        let frame = r#"{"stream":"btcusdt@ticker","data":{"E":1700000000000,"s":"BTCUSDT","c":"50000"}}"#;
        let record = BinanceParser.parse_message(frame).unwrap();
        assert_eq!(record.exchange, "binance");
        assert_eq!(record.symbol, "BTCUSDT");
        assert_eq!(record.data_type, DataType::Ticker);
        assert_eq!(record.timestamp, 1700000000000);
    }

    #[test]
    fn missing_event_time_falls_back_to_now() {
        let frame = r#"{"stream":"ethusdt@trade","data":{"s":"ETHUSDT"}}"#;
        let record = BinanceParser.parse_message(frame).unwrap();
        assert_eq!(record.data_type, DataType::Trade);
        assert!(record.timestamp > 0);
    }

    #[test]
    fn malformed_json_yields_none_not_a_panic() {
        assert!(BinanceParser.parse_message("not json").is_none());
    }

    #[test]
    fn unrecognized_data_type_yields_none() {
        let frame = r#"{"stream":"btcusdt@unknownkind","data":{}}"#;
        assert!(BinanceParser.parse_message(frame).is_none());
    }

    #[test]
    fn missing_stream_field_yields_none() {
        let frame = r#"{"data":{}}"#;
        assert!(BinanceParser.parse_message(frame).is_none());
    }
}
