//! Combined-stream URL construction (spec §4.1 "URL construction").

use super::stream_set::StreamSet;

/// Build the WebSocket URL for `base` given the active `streams`.
///
/// - `|streams| = 0` → `base + "/ws"`
/// - `|streams| = 1` → `base + "/ws/" + s0`
/// - `|streams| >= 2` → `base + "/stream?streams=" + join(streams, "/")`
///
/// Any pre-existing path on `base` is discarded; only scheme, host, and port
/// survive. Stream ordering in the URL preserves `StreamSet` order, so this
/// function is deterministic: identical inputs produce a byte-identical URL
/// (spec §8 "Round-trip laws").
pub fn build_stream_url(base: &str, streams: &StreamSet) -> crate::error::Result<String> {
    let parsed = url::Url::parse(base)?;
    let origin = format!(
        "{}://{}",
        parsed.scheme(),
        parsed
            .host_str()
            .map(|h| match parsed.port() {
                Some(p) => format!("{h}:{p}"),
                None => h.to_owned(),
            })
            .unwrap_or_default()
    );

    let items = streams.as_slice();
    let url = match items.len() {
        0 => format!("{origin}/ws"),
        1 => format!("{origin}/ws/{}", items[0]),
        _ => format!("{origin}/stream?streams={}", items.join("/")),
    };
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(streams: &[&str]) -> StreamSet {
        StreamSet::from_iter(streams.iter().map(|s| s.to_string()))
    }

    #[test]
    fn empty_stream_list() {
        let url = build_stream_url("wss://stream.binance.com:9443", &set(&[])).unwrap();
        assert_eq!(url, "wss://stream.binance.com:9443/ws");
    }

    #[test]
    fn single_stream() {
        let url =
            build_stream_url("wss://stream.binance.com:9443", &set(&["btcusdt@ticker"])).unwrap();
        assert_eq!(url, "wss://stream.binance.com:9443/ws/btcusdt@ticker");
    }

    #[test]
    fn combined_stream() {
        let url = build_stream_url(
            "wss://stream.binance.com:9443",
            &set(&["btcusdt@ticker", "ethusdt@ticker", "adausdt@depth"]),
        )
        .unwrap();
        assert_eq!(
            url,
            "wss://stream.binance.com:9443/stream?streams=btcusdt@ticker/ethusdt@ticker/adausdt@depth"
        );
    }

    #[test]
    fn pre_existing_path_is_discarded() {
        let url = build_stream_url(
            "wss://stream.binance.com:9443/ws/existing",
            &set(&["btcusdt@ticker", "ethusdt@ticker"]),
        )
        .unwrap();
        assert_eq!(
            url,
            "wss://stream.binance.com:9443/stream?streams=btcusdt@ticker/ethusdt@ticker"
        );
    }

    #[test]
    fn deterministic_for_identical_inputs() {
        let streams = set(&["a@trade", "b@trade"]);
        let u1 = build_stream_url("wss://host", &streams).unwrap();
        let u2 = build_stream_url("wss://host", &streams).unwrap();
        assert_eq!(u1, u2);
    }
}
