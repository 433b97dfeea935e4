//! Volume-power strategy over the ticker stream
//!
//! One worker per symbol: strong buy pressure opens a position at the best
//! ask, fading pressure exits at the best bid. Decisions are only recorded,
//! never sent anywhere.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use crate::codec::{StreamRecord, TickerRecord};
use crate::feed::Subscriber;
use crate::journal::DecisionSink;
use crate::snapshot::SnapshotFetcher;

/// Trade direction of a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

/// One buy or sell call produced by a worker.
///
/// Buy rows carry zero `buy_price` and `return_rate`; sell rows carry the
/// entry price and the realized return in percent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub side: Side,
    pub price: Decimal,
    pub buy_price: Decimal,
    pub return_rate: Decimal,
    pub details: String,
}

#[derive(Default)]
struct Position {
    holding: bool,
    buy_price: Decimal,
}

/// Per-symbol decision maker driven by the ticker volume power.
///
/// Values inside the neutral band do nothing. Above the buy threshold the
/// worker fetches the book and buys at the lowest ask, at most once until it
/// sells again; below the sell threshold it sells at the highest bid, only
/// while holding.
pub struct VolumePowerWorker {
    symbol: String,
    buy_threshold: Decimal,
    sell_threshold: Decimal,
    fetcher: Arc<dyn SnapshotFetcher>,
    sink: Arc<dyn DecisionSink>,
    position: Mutex<Position>,
}

impl VolumePowerWorker {
    pub fn new(
        symbol: impl Into<String>,
        fetcher: Arc<dyn SnapshotFetcher>,
        sink: Arc<dyn DecisionSink>,
        buy_threshold: Decimal,
        sell_threshold: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            buy_threshold,
            sell_threshold,
            fetcher,
            sink,
            position: Mutex::new(Position::default()),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub async fn on_ticker(&self, ticker: &TickerRecord) -> anyhow::Result<()> {
        let power = ticker.volume_power;

        if power > self.buy_threshold {
            let book = self.fetcher.fetch(&self.symbol).await?;
            let Some(ask) = book.best_ask() else {
                debug!(symbol = %self.symbol, "No asks in snapshot");
                return Ok(());
            };
            if let Some(decision) = self.enter(ask, power) {
                self.sink.log(decision);
            }
        } else if power < self.sell_threshold {
            let book = self.fetcher.fetch(&self.symbol).await?;
            let Some(bid) = book.best_bid() else {
                debug!(symbol = %self.symbol, "No bids in snapshot");
                return Ok(());
            };
            if let Some(decision) = self.exit(bid, power) {
                self.sink.log(decision);
            }
        }

        Ok(())
    }

    /// Open a position unless one is already held
    fn enter(&self, price: Decimal, power: Decimal) -> Option<Decision> {
        let mut position = self.position.lock();
        if position.holding {
            debug!(symbol = %self.symbol, "Already holding, skipping buy");
            return None;
        }
        position.holding = true;
        position.buy_price = price;

        Some(Decision {
            timestamp: Utc::now(),
            symbol: self.symbol.clone(),
            side: Side::Buy,
            price,
            buy_price: Decimal::ZERO,
            return_rate: Decimal::ZERO,
            details: format!("volume power {power}"),
        })
    }

    /// Close the held position, if any
    fn exit(&self, price: Decimal, power: Decimal) -> Option<Decision> {
        let mut position = self.position.lock();
        if !position.holding {
            return None;
        }
        position.holding = false;
        let buy_price = position.buy_price;
        position.buy_price = Decimal::ZERO;

        let return_rate = if buy_price.is_zero() {
            Decimal::ZERO
        } else {
            (price / buy_price - Decimal::ONE) * Decimal::ONE_HUNDRED
        };

        Some(Decision {
            timestamp: Utc::now(),
            symbol: self.symbol.clone(),
            side: Side::Sell,
            price,
            buy_price,
            return_rate,
            details: format!("volume power {power}"),
        })
    }
}

/// Routes ticker records to the workers registered for their symbol
#[derive(Default)]
pub struct WorkerManager {
    workers: Vec<VolumePowerWorker>,
}

impl WorkerManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_worker(&mut self, worker: VolumePowerWorker) {
        self.workers.push(worker);
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

#[async_trait]
impl Subscriber for WorkerManager {
    async fn on_record(&self, record: &StreamRecord) -> anyhow::Result<()> {
        let Some(ticker) = record.as_ticker() else {
            return Ok(());
        };
        for worker in &self.workers {
            if worker.symbol() == ticker.symbol {
                worker.on_ticker(ticker).await?;
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "volume-power-workers"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{MockSnapshotFetcher, OrderBookSnapshot, PriceQuantity};
    use rust_decimal_macros::dec;

    #[derive(Default)]
    struct RecordingSink {
        decisions: Mutex<Vec<Decision>>,
    }

    impl DecisionSink for RecordingSink {
        fn log(&self, decision: Decision) {
            self.decisions.lock().push(decision);
        }
    }

    fn book(bid: Decimal, ask: Decimal) -> OrderBookSnapshot {
        OrderBookSnapshot {
            timestamp: 1704465125123,
            order_currency: "BTC".to_string(),
            payment_currency: "KRW".to_string(),
            bids: vec![
                PriceQuantity { quantity: dec!(0.5), price: bid },
                PriceQuantity { quantity: dec!(1.0), price: bid - dec!(1000) },
            ],
            asks: vec![
                PriceQuantity { quantity: dec!(0.2), price: ask + dec!(1000) },
                PriceQuantity { quantity: dec!(0.7), price: ask },
            ],
        }
    }

    fn ticker(symbol: &str, power: Decimal) -> TickerRecord {
        let raw = format!(
            r#"{{
                "tickType": "1H",
                "date": "20240105",
                "time": "143205",
                "openPrice": "500",
                "closePrice": "520",
                "lowPrice": "495",
                "highPrice": "525",
                "value": "120000000",
                "volume": "3500",
                "sellVolume": "1500",
                "buyVolume": "2000",
                "prevClosePrice": "498",
                "chgRate": "4.4",
                "chgAmt": "22",
                "volumePower": "{power}",
                "symbol": "{symbol}"
            }}"#
        );
        serde_json::from_str(&raw).unwrap()
    }

    fn worker(
        fetcher: MockSnapshotFetcher,
        sink: Arc<RecordingSink>,
    ) -> VolumePowerWorker {
        VolumePowerWorker::new(
            "BTC_KRW",
            Arc::new(fetcher),
            sink,
            dec!(110),
            dec!(90),
        )
    }

    #[tokio::test]
    async fn test_neutral_band_does_nothing() {
        let mut fetcher = MockSnapshotFetcher::new();
        fetcher.expect_fetch().times(0);
        let sink = Arc::new(RecordingSink::default());
        let worker = worker(fetcher, sink.clone());

        for power in [dec!(91), dec!(100), dec!(109.99)] {
            worker.on_ticker(&ticker("BTC_KRW", power)).await.unwrap();
        }
        assert!(sink.decisions.lock().is_empty());
    }

    #[tokio::test]
    async fn test_strong_power_buys_best_ask_once() {
        let mut fetcher = MockSnapshotFetcher::new();
        fetcher
            .expect_fetch()
            .times(2)
            .withf(|symbol| symbol == "BTC_KRW")
            .returning(|_| Ok(book(dec!(50990000), dec!(51000000))));
        let sink = Arc::new(RecordingSink::default());
        let worker = worker(fetcher, sink.clone());

        worker.on_ticker(&ticker("BTC_KRW", dec!(115))).await.unwrap();
        // still holding, a second strong tick must not buy again
        worker.on_ticker(&ticker("BTC_KRW", dec!(130))).await.unwrap();

        let decisions = sink.decisions.lock();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].side, Side::Buy);
        assert_eq!(decisions[0].price, dec!(51000000));
        assert_eq!(decisions[0].buy_price, Decimal::ZERO);
        assert_eq!(decisions[0].return_rate, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_sell_realizes_return() {
        let mut fetcher = MockSnapshotFetcher::new();
        fetcher
            .expect_fetch()
            .times(2)
            .returning(|_| Ok(book(dec!(110), dec!(100))));
        let sink = Arc::new(RecordingSink::default());
        let worker = worker(fetcher, sink.clone());

        worker.on_ticker(&ticker("BTC_KRW", dec!(120))).await.unwrap();
        worker.on_ticker(&ticker("BTC_KRW", dec!(80))).await.unwrap();

        let decisions = sink.decisions.lock();
        assert_eq!(decisions.len(), 2);
        assert_eq!(decisions[1].side, Side::Sell);
        assert_eq!(decisions[1].price, dec!(110));
        assert_eq!(decisions[1].buy_price, dec!(100));
        assert_eq!(decisions[1].return_rate, dec!(10));
    }

    #[tokio::test]
    async fn test_weak_power_without_position_sells_nothing() {
        let mut fetcher = MockSnapshotFetcher::new();
        fetcher
            .expect_fetch()
            .times(1)
            .returning(|_| Ok(book(dec!(110), dec!(100))));
        let sink = Arc::new(RecordingSink::default());
        let worker = worker(fetcher, sink.clone());

        worker.on_ticker(&ticker("BTC_KRW", dec!(70))).await.unwrap();
        assert!(sink.decisions.lock().is_empty());
    }

    #[tokio::test]
    async fn test_manager_routes_by_symbol() {
        let mut btc_fetcher = MockSnapshotFetcher::new();
        btc_fetcher
            .expect_fetch()
            .times(1)
            .returning(|_| Ok(book(dec!(50990000), dec!(51000000))));
        let mut eth_fetcher = MockSnapshotFetcher::new();
        eth_fetcher.expect_fetch().times(0);

        let sink = Arc::new(RecordingSink::default());
        let mut manager = WorkerManager::new();
        manager.add_worker(VolumePowerWorker::new(
            "BTC_KRW",
            Arc::new(btc_fetcher),
            sink.clone(),
            dec!(110),
            dec!(90),
        ));
        manager.add_worker(VolumePowerWorker::new(
            "ETH_KRW",
            Arc::new(eth_fetcher),
            sink.clone(),
            dec!(110),
            dec!(90),
        ));

        let record = StreamRecord::Ticker(ticker("BTC_KRW", dec!(115)));
        manager.on_record(&record).await.unwrap();

        let decisions = sink.decisions.lock();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].symbol, "BTC_KRW");
    }
}
