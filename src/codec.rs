//! Wire codec for the Bithumb public WebSocket feed
//!
//! Decodes `{"type": ..., "content": ...}` envelopes into typed records and
//! encodes subscribe frames. Numeric fields arrive as strings on the wire.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

use crate::error::DecodeError;
use crate::subscription::{ChannelKind, SubscriptionDescriptor, TickInterval};

/// Status code the API uses for success, in both WebSocket acknowledgements
/// and REST response envelopes.
pub const STATUS_OK: &str = "0000";

/// Handshake acknowledgement frame
#[derive(Debug, Clone, Deserialize)]
pub struct AckFrame {
    /// Status code, `"0000"` on success
    pub status: String,

    /// Human-readable result message
    #[serde(default)]
    pub resmsg: String,
}

impl AckFrame {
    pub fn is_success(&self) -> bool {
        self.status == STATUS_OK
    }
}

/// Candle update from the ticker channel
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TickerRecord {
    /// Candle interval this update belongs to
    #[serde(rename = "tickType")]
    pub tick_type: TickInterval,

    /// Date (YYYYMMDD)
    pub date: String,

    /// Time of day (HHMMSS)
    pub time: String,

    /// Opening price
    #[serde(rename = "openPrice", deserialize_with = "deserialize_decimal")]
    pub open_price: Decimal,

    /// Closing price
    #[serde(rename = "closePrice", deserialize_with = "deserialize_decimal")]
    pub close_price: Decimal,

    /// Low price
    #[serde(rename = "lowPrice", deserialize_with = "deserialize_decimal")]
    pub low_price: Decimal,

    /// High price
    #[serde(rename = "highPrice", deserialize_with = "deserialize_decimal")]
    pub high_price: Decimal,

    /// Traded value
    #[serde(deserialize_with = "deserialize_decimal")]
    pub value: Decimal,

    /// Traded volume
    #[serde(deserialize_with = "deserialize_decimal")]
    pub volume: Decimal,

    /// Sell-side volume
    #[serde(rename = "sellVolume", deserialize_with = "deserialize_decimal")]
    pub sell_volume: Decimal,

    /// Buy-side volume
    #[serde(rename = "buyVolume", deserialize_with = "deserialize_decimal")]
    pub buy_volume: Decimal,

    /// Previous closing price
    #[serde(rename = "prevClosePrice", deserialize_with = "deserialize_decimal")]
    pub prev_close_price: Decimal,

    /// Change rate
    #[serde(rename = "chgRate", deserialize_with = "deserialize_decimal")]
    pub chg_rate: Decimal,

    /// Change amount
    #[serde(rename = "chgAmt", deserialize_with = "deserialize_decimal")]
    pub chg_amt: Decimal,

    /// Buy volume over sell volume, as a percentage
    #[serde(rename = "volumePower", deserialize_with = "deserialize_decimal")]
    pub volume_power: Decimal,

    /// Symbol
    pub symbol: String,
}

/// Taker side of an executed trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum TransactionSide {
    #[serde(rename = "1")]
    Sell,
    #[serde(rename = "2")]
    Buy,
}

/// Price direction relative to the previous trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum PriceTrend {
    #[serde(rename = "up")]
    Up,
    #[serde(rename = "dn")]
    Down,
}

/// One executed trade from the transaction channel
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TransactionItem {
    /// Symbol
    pub symbol: String,

    /// Taker side
    #[serde(rename = "buySellGb")]
    pub side: TransactionSide,

    /// Execution price
    #[serde(rename = "contPrice", deserialize_with = "deserialize_decimal")]
    pub price: Decimal,

    /// Executed quantity
    #[serde(rename = "contQty", deserialize_with = "deserialize_decimal")]
    pub quantity: Decimal,

    /// Executed amount (price times quantity)
    #[serde(rename = "contAmt", deserialize_with = "deserialize_decimal")]
    pub amount: Decimal,

    /// Execution timestamp
    #[serde(rename = "contDtm")]
    pub executed_at: String,

    /// Price direction
    #[serde(rename = "updn")]
    pub direction: PriceTrend,
}

/// Batch of executed trades from the transaction channel
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TransactionRecord {
    /// Trades in execution order
    #[serde(rename = "list")]
    pub items: Vec<TransactionItem>,
}

/// Book side of a depth entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Bid,
    Ask,
}

/// One price level change from the order-book depth channel
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DepthEntry {
    /// Symbol
    pub symbol: String,

    /// Book side
    #[serde(rename = "orderType")]
    pub side: OrderSide,

    /// Price level
    #[serde(deserialize_with = "deserialize_decimal")]
    pub price: Decimal,

    /// Remaining quantity at this level, zero when the level is gone
    #[serde(deserialize_with = "deserialize_decimal")]
    pub quantity: Decimal,

    /// Number of resting orders at this level
    #[serde(deserialize_with = "deserialize_decimal")]
    pub total: Decimal,
}

/// Order-book depth update
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OrderBookDepthRecord {
    /// Exchange timestamp in microseconds
    #[serde(rename = "datetime", deserialize_with = "deserialize_timestamp")]
    pub timestamp: i64,

    /// Changed price levels
    #[serde(rename = "list")]
    pub entries: Vec<DepthEntry>,
}

/// A decoded data frame, one variant per channel
#[derive(Debug, Clone, PartialEq)]
pub enum StreamRecord {
    Ticker(TickerRecord),
    Transaction(TransactionRecord),
    OrderBookDepth(OrderBookDepthRecord),
}

impl StreamRecord {
    pub fn channel(&self) -> ChannelKind {
        match self {
            StreamRecord::Ticker(_) => ChannelKind::Ticker,
            StreamRecord::Transaction(_) => ChannelKind::Transaction,
            StreamRecord::OrderBookDepth(_) => ChannelKind::OrderBookDepth,
        }
    }

    /// Distinct symbols this record touches, in order of appearance.
    pub fn symbols(&self) -> Vec<&str> {
        match self {
            StreamRecord::Ticker(ticker) => vec![ticker.symbol.as_str()],
            StreamRecord::Transaction(tx) => {
                let mut symbols = Vec::new();
                for item in &tx.items {
                    if !symbols.contains(&item.symbol.as_str()) {
                        symbols.push(item.symbol.as_str());
                    }
                }
                symbols
            }
            StreamRecord::OrderBookDepth(depth) => {
                let mut symbols = Vec::new();
                for entry in &depth.entries {
                    if !symbols.contains(&entry.symbol.as_str()) {
                        symbols.push(entry.symbol.as_str());
                    }
                }
                symbols
            }
        }
    }

    pub fn as_ticker(&self) -> Option<&TickerRecord> {
        match self {
            StreamRecord::Ticker(ticker) => Some(ticker),
            _ => None,
        }
    }
}

/// Data frame envelope
#[derive(Debug, Deserialize)]
struct Envelope {
    /// Channel tag
    #[serde(rename = "type")]
    kind: String,

    /// Channel-specific payload
    content: serde_json::Value,
}

/// Wire form of the subscribe request
#[derive(Debug, Serialize)]
struct SubscribeFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    symbols: &'a [String],
    #[serde(rename = "tickTypes")]
    tick_types: Vec<&'static str>,
}

/// Decode a raw data frame into a typed record.
///
/// Dispatch is on the envelope `type` tag. An unrecognized tag yields
/// [`DecodeError::UnknownType`]; a recognized tag with a bad payload yields
/// [`DecodeError::MalformedPayload`] naming the offending field.
pub fn decode(raw: &str) -> Result<StreamRecord, DecodeError> {
    let envelope: Envelope = serde_json::from_str(raw)
        .map_err(|e| DecodeError::MalformedPayload(format!("envelope: {e}")))?;

    let channel = envelope
        .kind
        .parse::<ChannelKind>()
        .map_err(|_| DecodeError::UnknownType(envelope.kind.clone()))?;

    match channel {
        ChannelKind::Ticker => serde_json::from_value(envelope.content)
            .map(StreamRecord::Ticker)
            .map_err(|e| DecodeError::MalformedPayload(format!("ticker content: {e}"))),
        ChannelKind::Transaction => serde_json::from_value(envelope.content)
            .map(StreamRecord::Transaction)
            .map_err(|e| {
                DecodeError::MalformedPayload(format!("transaction content: {e}"))
            }),
        ChannelKind::OrderBookDepth => serde_json::from_value(envelope.content)
            .map(StreamRecord::OrderBookDepth)
            .map_err(|e| {
                DecodeError::MalformedPayload(format!("orderbookdepth content: {e}"))
            }),
    }
}

/// Decode a handshake acknowledgement frame.
pub fn decode_ack(raw: &str) -> Result<AckFrame, DecodeError> {
    serde_json::from_str(raw)
        .map_err(|e| DecodeError::MalformedPayload(format!("acknowledgement: {e}")))
}

/// Serialize the subscribe frame for a descriptor.
///
/// Field order is fixed by the struct, so equal descriptors always produce
/// byte-identical payloads.
pub fn encode_subscribe(
    descriptor: &SubscriptionDescriptor,
) -> Result<String, serde_json::Error> {
    let frame = SubscribeFrame {
        kind: descriptor.channel().as_wire(),
        symbols: descriptor.symbols(),
        tick_types: descriptor
            .intervals()
            .iter()
            .map(TickInterval::as_wire)
            .collect(),
    };
    serde_json::to_string(&frame)
}

/// Custom deserializer for Decimal from string
pub(crate) fn deserialize_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Decimal::from_str(s.trim()).map_err(serde::de::Error::custom)
}

/// Custom deserializer for timestamps sent as either string or number
pub(crate) fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_decode_ticker() {
        let raw = r#"{
            "type": "ticker",
            "content": {
                "tickType": "30M",
                "date": "20240105",
                "time": "143205",
                "openPrice": "500.1",
                "closePrice": "520.5",
                "lowPrice": "495",
                "highPrice": "525",
                "value": "120000000",
                "volume": "3500.25",
                "sellVolume": "1500",
                "buyVolume": "2000.25",
                "prevClosePrice": "498",
                "chgRate": "4.48",
                "chgAmt": "22.4",
                "volumePower": "133.35",
                "symbol": "BTC_KRW"
            }
        }"#;

        let record = decode(raw).unwrap();
        assert_eq!(record.channel(), ChannelKind::Ticker);
        assert_eq!(record.symbols(), vec!["BTC_KRW"]);

        let ticker = record.as_ticker().unwrap();
        assert_eq!(ticker.tick_type, TickInterval::ThirtyMinute);
        assert_eq!(ticker.close_price, dec!(520.5));
        assert_eq!(ticker.volume_power, dec!(133.35));
        assert_eq!(ticker.symbol, "BTC_KRW");
    }

    #[test]
    fn test_decode_transaction() {
        let raw = r#"{
            "type": "transaction",
            "content": {
                "list": [
                    {
                        "symbol": "BTC_KRW",
                        "buySellGb": "2",
                        "contPrice": "51000000",
                        "contQty": "0.05",
                        "contAmt": "2550000",
                        "contDtm": "2024-01-05 14:32:05.123456",
                        "updn": "up"
                    },
                    {
                        "symbol": "ETH_KRW",
                        "buySellGb": "1",
                        "contPrice": "2900000",
                        "contQty": "1.2",
                        "contAmt": "3480000",
                        "contDtm": "2024-01-05 14:32:05.123501",
                        "updn": "dn"
                    },
                    {
                        "symbol": "BTC_KRW",
                        "buySellGb": "1",
                        "contPrice": "50990000",
                        "contQty": "0.01",
                        "contAmt": "509900",
                        "contDtm": "2024-01-05 14:32:05.124001",
                        "updn": "dn"
                    }
                ]
            }
        }"#;

        let record = decode(raw).unwrap();
        assert_eq!(record.symbols(), vec!["BTC_KRW", "ETH_KRW"]);

        let StreamRecord::Transaction(tx) = record else {
            panic!("expected Transaction");
        };
        assert_eq!(tx.items.len(), 3);
        assert_eq!(tx.items[0].side, TransactionSide::Buy);
        assert_eq!(tx.items[0].price, dec!(51000000));
        assert_eq!(tx.items[1].direction, PriceTrend::Down);
    }

    #[test]
    fn test_decode_order_book_depth() {
        let raw = r#"{
            "type": "orderbookdepth",
            "content": {
                "datetime": "1704465125123456",
                "list": [
                    {
                        "symbol": "BTC_KRW",
                        "orderType": "ask",
                        "price": "51010000",
                        "quantity": "0.35",
                        "total": "2"
                    },
                    {
                        "symbol": "BTC_KRW",
                        "orderType": "bid",
                        "price": "50990000",
                        "quantity": "0",
                        "total": "0"
                    }
                ]
            }
        }"#;

        let record = decode(raw).unwrap();
        let StreamRecord::OrderBookDepth(depth) = record else {
            panic!("expected OrderBookDepth");
        };
        assert_eq!(depth.timestamp, 1704465125123456);
        assert_eq!(depth.entries[0].side, OrderSide::Ask);
        assert_eq!(depth.entries[1].quantity, Decimal::ZERO);
    }

    #[test]
    fn test_decode_unknown_type() {
        let raw = r#"{"type": "candlestick", "content": {}}"#;
        match decode(raw) {
            Err(DecodeError::UnknownType(kind)) => assert_eq!(kind, "candlestick"),
            other => panic!("expected UnknownType, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_missing_field() {
        // volumePower dropped from an otherwise valid ticker payload
        let raw = r#"{
            "type": "ticker",
            "content": {
                "tickType": "30M",
                "date": "20240105",
                "time": "143205",
                "openPrice": "500.1",
                "closePrice": "520.5",
                "lowPrice": "495",
                "highPrice": "525",
                "value": "120000000",
                "volume": "3500.25",
                "sellVolume": "1500",
                "buyVolume": "2000.25",
                "prevClosePrice": "498",
                "chgRate": "4.48",
                "chgAmt": "22.4",
                "symbol": "BTC_KRW"
            }
        }"#;

        match decode(raw) {
            Err(DecodeError::MalformedPayload(detail)) => {
                assert!(detail.contains("volumePower"), "detail was: {detail}");
            }
            other => panic!("expected MalformedPayload, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_not_json() {
        assert!(matches!(
            decode("not a frame"),
            Err(DecodeError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_decode_ack() {
        let ack =
            decode_ack(r#"{"status":"0000","resmsg":"Filter Registered Successfully"}"#)
                .unwrap();
        assert!(ack.is_success());
        assert_eq!(ack.resmsg, "Filter Registered Successfully");

        let rejected =
            decode_ack(r#"{"status":"5100","resmsg":"Invalid Filter Syntax"}"#).unwrap();
        assert!(!rejected.is_success());
    }

    #[test]
    fn test_encode_subscribe() {
        let descriptor = SubscriptionDescriptor::ticker(
            vec!["BTC_KRW".to_string(), "ETH_KRW".to_string()],
            vec![TickInterval::ThirtyMinute, TickInterval::OneHour],
        )
        .unwrap();

        let payload = encode_subscribe(&descriptor).unwrap();
        assert_eq!(
            payload,
            r#"{"type":"ticker","symbols":["BTC_KRW","ETH_KRW"],"tickTypes":["30M","1H"]}"#
        );

        // equal descriptors serialize identically
        assert_eq!(payload, encode_subscribe(&descriptor.clone()).unwrap());
    }
}
