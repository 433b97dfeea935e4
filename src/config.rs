//! Configuration module for the streaming client

use rust_decimal::Decimal;
use std::env;

use crate::subscription::TickInterval;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Symbols to subscribe to (e.g., ["BTC_KRW", "ETH_KRW"])
    pub symbols: Vec<String>,

    /// WebSocket endpoint for the Bithumb public feed
    pub ws_endpoint: String,

    /// REST API endpoint for order book snapshots
    pub rest_endpoint: String,

    /// Candle intervals for the ticker subscription
    pub tick_intervals: Vec<TickInterval>,

    /// Connect and handshake timeouts
    pub connect_timeout_ms: u64,
    pub handshake_timeout_ms: u64,

    /// Order book levels requested per snapshot
    pub snapshot_depth: u32,

    /// Records kept per symbol in the ledger
    pub ledger_capacity: usize,

    /// Directory for decision journal files
    pub records_dir: String,

    /// Volume power thresholds for the strategy workers
    pub buy_power_threshold: Decimal,
    pub sell_power_threshold: Decimal,

    /// Reconnection settings
    pub reconnect_delay_ms: u64,
    pub max_reconnect_attempts: u32,

    /// Port for the health and metrics endpoint
    pub health_port: u16,
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let symbols: Vec<String> = env::var("SYMBOLS")
            .unwrap_or_else(|_| "BTC_KRW,ETH_KRW".to_string())
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .collect();

        let tick_intervals: Vec<TickInterval> = env::var("TICK_INTERVALS")
            .unwrap_or_else(|_| "1H".to_string())
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        let tick_intervals = if tick_intervals.is_empty() {
            vec![TickInterval::OneHour]
        } else {
            tick_intervals
        };

        Ok(Self {
            symbols,
            ws_endpoint: env::var("WS_ENDPOINT")
                .unwrap_or_else(|_| "wss://pubwss.bithumb.com/pub/ws".to_string()),
            rest_endpoint: env::var("REST_ENDPOINT")
                .unwrap_or_else(|_| "https://api.bithumb.com".to_string()),
            tick_intervals,
            connect_timeout_ms: env::var("CONNECT_TIMEOUT_MS")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()
                .unwrap_or(10000),
            handshake_timeout_ms: env::var("HANDSHAKE_TIMEOUT_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .unwrap_or(5000),
            snapshot_depth: env::var("SNAPSHOT_DEPTH")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            ledger_capacity: env::var("LEDGER_CAPACITY")
                .unwrap_or_else(|_| "256".to_string())
                .parse()
                .unwrap_or(256),
            records_dir: env::var("RECORDS_DIR")
                .unwrap_or_else(|_| "records".to_string()),
            buy_power_threshold: env::var("BUY_POWER_THRESHOLD")
                .unwrap_or_else(|_| "110".to_string())
                .parse()
                .unwrap_or_else(|_| Decimal::from(110)),
            sell_power_threshold: env::var("SELL_POWER_THRESHOLD")
                .unwrap_or_else(|_| "90".to_string())
                .parse()
                .unwrap_or_else(|_| Decimal::from(90)),
            reconnect_delay_ms: env::var("RECONNECT_DELAY_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),
            max_reconnect_attempts: env::var("MAX_RECONNECT_ATTEMPTS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            health_port: env::var("HEALTH_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            symbols: vec!["BTC_KRW".to_string()],
            ws_endpoint: "wss://pubwss.bithumb.com/pub/ws".to_string(),
            rest_endpoint: "https://api.bithumb.com".to_string(),
            tick_intervals: vec![TickInterval::OneHour],
            connect_timeout_ms: 10000,
            handshake_timeout_ms: 5000,
            snapshot_depth: 30,
            ledger_capacity: 256,
            records_dir: "records".to_string(),
            buy_power_threshold: Decimal::from(110),
            sell_power_threshold: Decimal::from(90),
            reconnect_delay_ms: 1000,
            max_reconnect_attempts: 10,
            health_port: 8080,
        }
    }
}
