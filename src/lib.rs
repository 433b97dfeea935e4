//! bitock - Bithumb Market Data Streaming Client
//!
//! This crate connects to the Bithumb public WebSocket feed, decodes channel
//! frames into typed records, and fans them out to registered subscribers in
//! registration order. A bounded per-symbol ledger, an order book snapshot
//! fetcher, and the volume-power strategy workers build on top of the stream.

pub mod codec;
pub mod config;
pub mod error;
pub mod feed;
pub mod journal;
pub mod ledger;
pub mod snapshot;
pub mod strategy;
pub mod subscription;

pub use codec::{
    AckFrame, OrderBookDepthRecord, StreamRecord, TickerRecord, TransactionRecord,
};
pub use config::Config;
pub use error::{DecodeError, FeedError, FetchError, Result};
pub use feed::{ConnectionState, FeedClient, FeedStats, Subscriber, SubscriptionId};
pub use journal::{DecisionJournal, DecisionSink};
pub use ledger::{LedgerSubscriber, SymbolLedger};
pub use snapshot::{BithumbSnapshotFetcher, OrderBookSnapshot, SnapshotFetcher};
pub use strategy::{Decision, Side, VolumePowerWorker, WorkerManager};
pub use subscription::{ChannelKind, SubscriptionDescriptor, TickInterval};
