//! # marketfeed-collector
//!
//! An exchange market-data collector: per-exchange WebSocket connection
//! management (state machine, heartbeat, reconnect, combined-stream
//! multiplexing), adapter-level message normalization, and a registry that
//! binds adapters to a publish bus and drives lifecycle from an HTTP control
//! plane.
//!
//! ## Quick Start
//!
//! ```no_run
//! use marketfeed_collector::adapter::binance::BinanceParser;
//! use marketfeed_collector::adapter::{Adapter, AdapterConfig};
//! use marketfeed_collector::record::DataType;
//!
//! #[tokio::main]
//! async fn main() -> marketfeed_collector::error::Result<()> {
//!     let cfg = AdapterConfig {
//!         exchange: "binance".into(),
//!         endpoint: "wss://stream.binance.com:9443".into(),
//!         ..Default::default()
//!     };
//!     let adapter = Adapter::initialize(BinanceParser, cfg);
//!     adapter.connect().await?;
//!     adapter
//!         .subscribe(&["btcusdt".into()], &[DataType::Trade])
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod connection;
pub mod error;
pub mod http;
pub mod integration;
pub mod publisher;
pub mod record;
pub mod registry;

/// Re-export the error type and Result alias.
pub use error::{CollectorError, Result};
