//! Subscription bookkeeping and message parsing (spec §4.2, §8 invariants #5, #6).

use marketfeed_collector::adapter::binance::BinanceParser;
use marketfeed_collector::adapter::{Adapter, AdapterConfig, MessageParser};
use marketfeed_collector::record::DataType;

fn adapter() -> Adapter<BinanceParser> {
    let cfg = AdapterConfig {
        exchange: "binance".into(),
        endpoint: "wss://stream.binance.com:9443".into(),
        ..AdapterConfig::default()
    };
    Adapter::initialize(BinanceParser, cfg)
}

#[tokio::test]
async fn subscribe_creates_one_descriptor_per_symbol_times_type() {
    let adapter = adapter();
    let created = adapter
        .subscribe(
            &["BTCUSDT".to_owned(), "ETHUSDT".to_owned()],
            &[DataType::Trade, DataType::Ticker],
        )
        .await
        .unwrap();

    assert_eq!(created.len(), 4);
    assert_eq!(adapter.subscriptions().len(), 4);
    assert_eq!(adapter.connection_manager().active_streams().await.len(), 4);
}

#[tokio::test]
async fn unsubscribe_all_empties_descriptors_and_stream_set() {
    let adapter = adapter();
    adapter
        .subscribe(&["BTCUSDT".to_owned()], &[DataType::Trade, DataType::Ticker])
        .await
        .unwrap();

    adapter.unsubscribe_all().await.unwrap();

    assert!(adapter.subscriptions().is_empty());
    assert!(adapter.connection_manager().active_streams().await.is_empty());
}

#[tokio::test]
async fn shared_stream_survives_until_last_subscriber_unsubscribes() {
    let adapter = adapter();
    let first = adapter
        .subscribe(&["BTCUSDT".to_owned()], &[DataType::Trade])
        .await
        .unwrap();
    let second = adapter
        .subscribe(&["BTCUSDT".to_owned()], &[DataType::Trade])
        .await
        .unwrap();

    // Same (symbol, dataType) twice still produces two distinct descriptors
    // mapping to the same stream name — the stream set is a set.
    assert_eq!(adapter.connection_manager().active_streams().await.len(), 1);

    adapter.unsubscribe(&[first[0].id.clone()]).await.unwrap();
    assert_eq!(adapter.connection_manager().active_streams().await.len(), 1);

    adapter.unsubscribe(&[second[0].id.clone()]).await.unwrap();
    assert!(adapter.connection_manager().active_streams().await.is_empty());
}

#[test]
fn parse_message_is_a_pure_function() {
    let frame = r#"{"stream":"btcusdt@ticker","data":{"E":1700000000000,"s":"BTCUSDT","c":"50000"}}"#;
    let record = BinanceParser.parse_message(frame).unwrap();
    assert_eq!(record.exchange, "binance");
    assert_eq!(record.symbol, "BTCUSDT");
    assert_eq!(record.timestamp, 1700000000000);
}
