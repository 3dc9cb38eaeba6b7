//! Boundary behavior: `maxStreams` (spec §8 "Boundary behaviors").

use marketfeed_collector::connection::{CombinedStreamConfig, ConnectionConfig, ConnectionManager};
use marketfeed_collector::error::CollectorError;

fn config_with_limit(k: usize) -> ConnectionConfig {
    ConnectionConfig {
        combined_stream: CombinedStreamConfig {
            max_streams: k,
            ..CombinedStreamConfig::default()
        },
        ..ConnectionConfig::new("wss://example.invalid")
    }
}

#[tokio::test]
async fn kth_plus_one_distinct_stream_hits_limit() {
    let manager = ConnectionManager::new(config_with_limit(2));

    manager.add_stream("a@trade").await.unwrap();
    manager.add_stream("b@trade").await.unwrap();

    let err = manager.add_stream("c@trade").await.unwrap_err();
    assert!(matches!(err, CollectorError::StreamLimitReached { max: 2 }));

    assert_eq!(manager.active_streams().await.len(), 2);
}

#[tokio::test]
async fn re_adding_existing_member_is_a_noop_even_at_the_limit() {
    let manager = ConnectionManager::new(config_with_limit(1));
    manager.add_stream("a@trade").await.unwrap();
    manager.add_stream("a@trade").await.unwrap();
    assert_eq!(manager.active_streams().await.len(), 1);
}
