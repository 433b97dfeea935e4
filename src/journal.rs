//! CSV journal of trading decisions
//!
//! Rows are handed off on a channel and written by a background task, so the
//! dispatch path never blocks on file I/O.

use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::strategy::Decision;

/// Accepts decisions for persistence. Implementations must not block the
/// caller.
pub trait DecisionSink: Send + Sync {
    fn log(&self, decision: Decision);
}

// Keep in step with the field order of `Decision`
const HEADER: [&str; 7] = [
    "timestamp",
    "symbol",
    "side",
    "price",
    "buy_price",
    "return_rate",
    "details",
];

/// Appends decisions to a timestamped CSV file, one file per process run.
/// The header row is written as soon as the file is opened.
pub struct DecisionJournal {
    path: PathBuf,
    tx: Mutex<Option<mpsc::UnboundedSender<Decision>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DecisionJournal {
    /// Open `dir/{name}-{timestamp}.csv`, write the header, and start the
    /// writer task. Creates the directory if needed.
    pub fn new(dir: impl AsRef<Path>, name: &str) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("{name}-{stamp}.csv"));
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&path)?;
        writer.write_record(HEADER)?;
        writer.flush()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(write_loop(writer, rx));

        info!(path = %path.display(), "Decision journal opened");
        Ok(Self {
            path,
            tx: Mutex::new(Some(tx)),
            task: Mutex::new(Some(task)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop accepting decisions and wait for pending rows to reach disk.
    /// Further `log` calls are dropped with a warning.
    pub async fn close(&self) {
        drop(self.tx.lock().take());
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl DecisionSink for DecisionJournal {
    fn log(&self, decision: Decision) {
        info!(
            symbol = %decision.symbol,
            side = ?decision.side,
            price = %decision.price,
            return_rate = %decision.return_rate,
            "Decision"
        );

        let sent = match self.tx.lock().as_ref() {
            Some(tx) => tx.send(decision).is_ok(),
            None => false,
        };
        if !sent {
            warn!("Decision journal closed, dropping row");
        }
    }
}

async fn write_loop(
    mut writer: csv::Writer<File>,
    mut rx: mpsc::UnboundedReceiver<Decision>,
) {
    while let Some(decision) = rx.recv().await {
        if let Err(e) = writer.serialize(&decision) {
            warn!(error = %e, "Failed to write decision row");
            continue;
        }
        if let Err(e) = writer.flush() {
            warn!(error = %e, "Failed to flush decision journal");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::Side;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn decision(side: Side, price: &str) -> Decision {
        Decision {
            timestamp: Utc::now(),
            symbol: "BTC_KRW".to_string(),
            side,
            price: price.parse().unwrap(),
            buy_price: dec!(0),
            return_rate: dec!(0),
            details: "volume power 115".to_string(),
        }
    }

    #[tokio::test]
    async fn test_journal_writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let journal = DecisionJournal::new(dir.path(), "test").unwrap();

        journal.log(decision(Side::Buy, "51000000"));
        journal.log(decision(Side::Sell, "51500000"));
        journal.close().await;

        let contents = std::fs::read_to_string(journal.path()).unwrap();
        let mut lines = contents.lines();
        assert_eq!(
            lines.next().unwrap(),
            "timestamp,symbol,side,price,buy_price,return_rate,details"
        );

        let first = lines.next().unwrap();
        assert!(first.contains("BTC_KRW"));
        assert!(first.contains("BUY"));
        assert!(first.contains("51000000"));

        let second = lines.next().unwrap();
        assert!(second.contains("SELL"));
        assert_eq!(lines.next(), None);
    }

    #[tokio::test]
    async fn test_journal_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let journal = DecisionJournal::new(dir.path(), "decisions").unwrap();

        let file_name = journal.path().file_name().unwrap().to_str().unwrap();
        assert!(file_name.starts_with("decisions-"));
        assert!(file_name.ends_with(".csv"));
        journal.close().await;
    }

    #[tokio::test]
    async fn test_log_after_close_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let journal = DecisionJournal::new(dir.path(), "test").unwrap();

        journal.close().await;
        journal.log(decision(Side::Buy, "100"));
        journal.close().await;

        // header only, the dropped row never reaches the file
        let contents = std::fs::read_to_string(journal.path()).unwrap();
        assert_eq!(contents.lines().count(), 1);
    }
}
