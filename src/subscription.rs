//! Subscription descriptors for the public feed channels

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FeedError;

/// Feed channel selector. The wire tag doubles as the `type` field of both
/// the subscribe frame and every inbound data frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Ticker,
    Transaction,
    OrderBookDepth,
}

impl ChannelKind {
    pub fn as_wire(&self) -> &'static str {
        match self {
            ChannelKind::Ticker => "ticker",
            ChannelKind::Transaction => "transaction",
            ChannelKind::OrderBookDepth => "orderbookdepth",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl FromStr for ChannelKind {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ticker" => Ok(ChannelKind::Ticker),
            "transaction" => Ok(ChannelKind::Transaction),
            "orderbookdepth" => Ok(ChannelKind::OrderBookDepth),
            other => Err(FeedError::InvalidSubscription(format!(
                "unknown channel: {other}"
            ))),
        }
    }
}

/// Candle interval tags accepted by the ticker channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TickInterval {
    #[serde(rename = "30M")]
    ThirtyMinute,
    #[serde(rename = "1H")]
    OneHour,
    #[serde(rename = "12H")]
    TwelveHour,
    #[serde(rename = "24H")]
    TwentyFourHour,
    #[serde(rename = "MID")]
    Mid,
}

impl TickInterval {
    pub fn as_wire(&self) -> &'static str {
        match self {
            TickInterval::ThirtyMinute => "30M",
            TickInterval::OneHour => "1H",
            TickInterval::TwelveHour => "12H",
            TickInterval::TwentyFourHour => "24H",
            TickInterval::Mid => "MID",
        }
    }
}

impl fmt::Display for TickInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl FromStr for TickInterval {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "30M" => Ok(TickInterval::ThirtyMinute),
            "1H" => Ok(TickInterval::OneHour),
            "12H" => Ok(TickInterval::TwelveHour),
            "24H" => Ok(TickInterval::TwentyFourHour),
            "MID" => Ok(TickInterval::Mid),
            other => Err(FeedError::InvalidSubscription(format!(
                "unknown tick interval: {other}"
            ))),
        }
    }
}

/// Immutable description of one channel subscription: which channel, which
/// symbols, which candle intervals. Built once and handed to the client;
/// validation happens at construction so a connected client never carries a
/// descriptor the remote cannot accept.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionDescriptor {
    channel: ChannelKind,
    symbols: Vec<String>,
    intervals: Vec<TickInterval>,
}

impl SubscriptionDescriptor {
    /// Ticker channel subscription. Requires at least one interval.
    pub fn ticker(
        symbols: Vec<String>,
        intervals: Vec<TickInterval>,
    ) -> Result<Self, FeedError> {
        if intervals.is_empty() {
            return Err(FeedError::InvalidSubscription(
                "ticker subscription requires at least one tick interval".into(),
            ));
        }
        Self::new(ChannelKind::Ticker, symbols, intervals)
    }

    /// Transaction channel subscription. Intervals are passed through when
    /// given but carry no meaning for this channel.
    pub fn transaction(
        symbols: Vec<String>,
        intervals: Vec<TickInterval>,
    ) -> Result<Self, FeedError> {
        Self::new(ChannelKind::Transaction, symbols, intervals)
    }

    /// Order-book depth channel subscription.
    pub fn order_book_depth(
        symbols: Vec<String>,
        intervals: Vec<TickInterval>,
    ) -> Result<Self, FeedError> {
        Self::new(ChannelKind::OrderBookDepth, symbols, intervals)
    }

    fn new(
        channel: ChannelKind,
        symbols: Vec<String>,
        intervals: Vec<TickInterval>,
    ) -> Result<Self, FeedError> {
        if symbols.is_empty() {
            return Err(FeedError::InvalidSubscription(
                "subscription requires at least one symbol".into(),
            ));
        }
        for symbol in &symbols {
            if !is_valid_symbol(symbol) {
                return Err(FeedError::InvalidSubscription(format!(
                    "symbol {symbol} is not in BASE_QUOTE form"
                )));
            }
        }
        let mut deduped = Vec::with_capacity(intervals.len());
        for interval in intervals {
            if !deduped.contains(&interval) {
                deduped.push(interval);
            }
        }
        Ok(Self {
            channel,
            symbols,
            intervals: deduped,
        })
    }

    pub fn channel(&self) -> ChannelKind {
        self.channel
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn intervals(&self) -> &[TickInterval] {
        &self.intervals
    }
}

/// Symbols are order currency and payment currency joined by an underscore,
/// e.g. `BTC_KRW`.
fn is_valid_symbol(symbol: &str) -> bool {
    match symbol.split_once('_') {
        Some((base, quote)) => !base.is_empty() && !quote.is_empty(),
        None => false,
    }
}
