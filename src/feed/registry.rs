//! Subscriber registry
//!
//! Registration-order bookkeeping for stream consumers. The receive loop
//! works from a snapshot, so the lock is never held across a dispatch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::codec::StreamRecord;

/// Handle returned by subscribe; passing it back removes the subscriber
pub type SubscriptionId = u64;

/// A consumer of decoded stream records.
///
/// Called once per record, in registration order, from the client's receive
/// loop. A returned error is logged as a delivery fault and affects neither
/// the stream nor the other subscribers.
#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn on_record(&self, record: &StreamRecord) -> anyhow::Result<()>;

    /// Name used in delivery-fault logs
    fn name(&self) -> &str {
        "subscriber"
    }
}

pub(crate) struct SubscriberRegistry {
    entries: Mutex<Vec<(SubscriptionId, Arc<dyn Subscriber>)>>,
    next_id: AtomicU64,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn add(&self, subscriber: Arc<dyn Subscriber>) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().push((id, subscriber));
        id
    }

    /// Remove a subscriber. Returns false for an unknown id.
    pub fn remove(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Current subscribers in registration order
    pub fn snapshot(&self) -> Vec<(SubscriptionId, Arc<dyn Subscriber>)> {
        self.entries.lock().clone()
    }
}
