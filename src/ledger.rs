//! Bounded per-symbol history of stream records

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::codec::StreamRecord;
use crate::feed::Subscriber;

/// Keeps the most recent records per symbol, up to a fixed capacity. When a
/// buffer is full the oldest record is evicted first.
///
/// All methods take `&self` and lock briefly, so the ledger can be shared
/// between the receive loop and readers without coordination.
pub struct SymbolLedger {
    capacity: usize,
    buffers: Mutex<HashMap<String, VecDeque<StreamRecord>>>,
}

impl SymbolLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buffers: Mutex::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a record to the symbol's buffer, evicting the oldest entry if
    /// the buffer is at capacity.
    pub fn put(&self, symbol: &str, record: StreamRecord) {
        if self.capacity == 0 {
            return;
        }
        let mut buffers = self.buffers.lock();
        let buffer = buffers
            .entry(symbol.to_string())
            .or_insert_with(|| VecDeque::with_capacity(self.capacity));
        if buffer.len() == self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(record);
    }

    /// Copy of the symbol's buffer, oldest first. Unknown symbols yield an
    /// empty vec.
    pub fn snapshot(&self, symbol: &str) -> Vec<StreamRecord> {
        self.buffers
            .lock()
            .get(symbol)
            .map(|buffer| buffer.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, symbol: &str) -> usize {
        self.buffers
            .lock()
            .get(symbol)
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    /// Symbols that have at least one record.
    pub fn symbols(&self) -> Vec<String> {
        self.buffers.lock().keys().cloned().collect()
    }
}

/// Subscriber that files every record into a shared ledger under each symbol
/// the record touches.
pub struct LedgerSubscriber {
    ledger: Arc<SymbolLedger>,
}

impl LedgerSubscriber {
    pub fn new(ledger: Arc<SymbolLedger>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl Subscriber for LedgerSubscriber {
    async fn on_record(&self, record: &StreamRecord) -> anyhow::Result<()> {
        for symbol in record.symbols() {
            self.ledger.put(symbol, record.clone());
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "ledger"
    }
}
