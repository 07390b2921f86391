//! Broker collaborators
//!
//! The engine never talks to a trading terminal directly; it goes through
//! the `MarketData` and `OrderService` traits. The production implementation
//! is `BridgeClient`, an HTTP client for a local terminal bridge that
//! exposes quotes, candles, positions, deal history, and order endpoints.
//! Authentication failure at connect time is the one fatal error class;
//! everything afterwards degrades to per-cycle unavailability.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::{
    Candle, Deal, DealEntry, InstrumentInfo, Money, OrderRequest, OrderResult, Position, Side,
    Symbol, Tick, Ticket,
};

/// Errors from broker collaborators.
///
/// A rejected order is not an error: it comes back as
/// `OrderResult::Rejected` so call sites log the code and move on.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("{0} unavailable")]
    Unavailable(String),

    #[error("bridge request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed bridge response: {0}")]
    Malformed(String),
}

/// Candle timeframes the engine consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timeframe {
    M2,
    M5,
    H4,
}

impl Timeframe {
    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::M2 => "M2",
            Timeframe::M5 => "M5",
            Timeframe::H4 => "H4",
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Market data service contract
#[allow(async_fn_in_trait)]
pub trait MarketData {
    /// Most recent `count` closed bars, oldest first
    async fn recent_bars(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Candle>, BrokerError>;

    async fn tick(&self, symbol: &Symbol) -> Result<Tick, BrokerError>;

    async fn instrument_info(&self, symbol: &Symbol) -> Result<InstrumentInfo, BrokerError>;
}

/// Order and position service contract
#[allow(async_fn_in_trait)]
pub trait OrderService {
    async fn place_market_order(&self, request: &OrderRequest)
        -> Result<OrderResult, BrokerError>;

    async fn modify_stop_loss(
        &self,
        ticket: Ticket,
        stop_loss: f64,
    ) -> Result<OrderResult, BrokerError>;

    async fn open_positions(&self) -> Result<Vec<Position>, BrokerError>;

    async fn closed_deals_since(&self, since: DateTime<Utc>) -> Result<Vec<Deal>, BrokerError>;
}

/// Connection settings for the terminal bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8085".to_string(),
            login: None,
            password: None,
            server: None,
        }
    }
}

/// HTTP client for the terminal bridge
#[derive(Debug, Clone)]
pub struct BridgeClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ConnectRequest<'a> {
    login: &'a str,
    password: &'a str,
    server: &'a str,
}

#[derive(Debug, Deserialize)]
struct ConnectResponse {
    connected: bool,
    #[serde(default)]
    account_name: String,
}

#[derive(Debug, Deserialize)]
struct BarDto {
    time: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
}

#[derive(Debug, Deserialize)]
struct PositionDto {
    ticket: Ticket,
    symbol: String,
    #[serde(rename = "type")]
    side: SideDto,
    volume: f64,
    price_open: f64,
    price_current: f64,
    #[serde(default)]
    sl: f64,
    #[serde(default)]
    tp: f64,
}

#[derive(Debug, Deserialize)]
struct DealDto {
    ticket: Ticket,
    position_id: Ticket,
    symbol: String,
    #[serde(rename = "type")]
    side: SideDto,
    entry: EntryDto,
    volume: f64,
    price: f64,
    profit: f64,
    time: i64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum SideDto {
    Buy,
    Sell,
}

impl From<SideDto> for Side {
    fn from(dto: SideDto) -> Self {
        match dto {
            SideDto::Buy => Side::Buy,
            SideDto::Sell => Side::Sell,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum EntryDto {
    In,
    Out,
}

#[derive(Debug, Deserialize)]
struct OrderResponseDto {
    retcode: i64,
    #[serde(default)]
    ticket: Ticket,
    #[serde(default)]
    comment: String,
}

/// Bridge retcode for a completed request
const RETCODE_DONE: i64 = 10009;

impl BridgeClient {
    /// Connect and authenticate against the bridge. Failure here is fatal
    /// at process start.
    pub async fn connect(cfg: &BridgeConfig) -> Result<Self, BrokerError> {
        let client = reqwest::Client::new();

        let (login, password, server) = match (&cfg.login, &cfg.password, &cfg.server) {
            (Some(l), Some(p), Some(s)) => (l, p, s),
            _ => {
                return Err(BrokerError::Auth(
                    "bridge credentials not configured".to_string(),
                ))
            }
        };

        let response: ConnectResponse = client
            .post(format!("{}/connect", cfg.base_url))
            .json(&ConnectRequest {
                login,
                password,
                server,
            })
            .send()
            .await?
            .error_for_status()
            .map_err(|e| BrokerError::Auth(e.to_string()))?
            .json()
            .await?;

        if !response.connected {
            return Err(BrokerError::Auth("bridge refused credentials".to_string()));
        }

        info!("Connected to account: {}", response.account_name);
        Ok(Self {
            base_url: cfg.base_url.clone(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        what: &str,
    ) -> Result<T, BrokerError> {
        let response = self.client.get(self.url(path)).send().await?;
        if !response.status().is_success() {
            return Err(BrokerError::Unavailable(format!(
                "{what} (status {})",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| BrokerError::Malformed(e.to_string()))
    }
}

fn bar_to_candle(dto: BarDto) -> Result<Candle, BrokerError> {
    let time = Utc
        .timestamp_opt(dto.time, 0)
        .single()
        .ok_or_else(|| BrokerError::Malformed(format!("bar timestamp {}", dto.time)))?;
    Ok(Candle {
        time,
        open: dto.open,
        high: dto.high,
        low: dto.low,
        close: dto.close,
    })
}

impl MarketData for BridgeClient {
    async fn recent_bars(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Candle>, BrokerError> {
        let path = format!(
            "/bars?symbol={symbol}&timeframe={}&count={count}",
            timeframe.as_str()
        );
        let bars: Vec<BarDto> = self
            .get_json(&path, &format!("bars for {symbol}"))
            .await?;
        bars.into_iter().map(bar_to_candle).collect()
    }

    async fn tick(&self, symbol: &Symbol) -> Result<Tick, BrokerError> {
        self.get_json(&format!("/tick/{symbol}"), &format!("tick for {symbol}"))
            .await
    }

    async fn instrument_info(&self, symbol: &Symbol) -> Result<InstrumentInfo, BrokerError> {
        self.get_json(
            &format!("/symbols/{symbol}"),
            &format!("instrument info for {symbol}"),
        )
        .await
    }
}

impl OrderService for BridgeClient {
    async fn place_market_order(
        &self,
        request: &OrderRequest,
    ) -> Result<OrderResult, BrokerError> {
        let response: OrderResponseDto = self
            .client
            .post(self.url("/orders"))
            .json(request)
            .send()
            .await?
            .json()
            .await
            .map_err(|e| BrokerError::Malformed(e.to_string()))?;

        if response.retcode == RETCODE_DONE {
            Ok(OrderResult::Accepted {
                ticket: response.ticket,
            })
        } else {
            Ok(OrderResult::Rejected {
                code: response.retcode,
                message: response.comment,
            })
        }
    }

    async fn modify_stop_loss(
        &self,
        ticket: Ticket,
        stop_loss: f64,
    ) -> Result<OrderResult, BrokerError> {
        let response: OrderResponseDto = self
            .client
            .post(self.url(&format!("/positions/{ticket}/stop_loss")))
            .json(&serde_json::json!({ "sl": stop_loss }))
            .send()
            .await?
            .json()
            .await
            .map_err(|e| BrokerError::Malformed(e.to_string()))?;

        if response.retcode == RETCODE_DONE {
            Ok(OrderResult::Accepted { ticket })
        } else {
            Ok(OrderResult::Rejected {
                code: response.retcode,
                message: response.comment,
            })
        }
    }

    async fn open_positions(&self) -> Result<Vec<Position>, BrokerError> {
        let positions: Vec<PositionDto> = self.get_json("/positions", "open positions").await?;
        Ok(positions
            .into_iter()
            .map(|dto| Position {
                ticket: dto.ticket,
                symbol: Symbol::new(dto.symbol),
                side: dto.side.into(),
                volume: dto.volume,
                price_open: dto.price_open,
                price_current: dto.price_current,
                sl: dto.sl,
                tp: dto.tp,
            })
            .collect())
    }

    async fn closed_deals_since(&self, since: DateTime<Utc>) -> Result<Vec<Deal>, BrokerError> {
        let path = format!("/deals?since={}", since.timestamp());
        let deals: Vec<DealDto> = self.get_json(&path, "deal history").await?;
        deals
            .into_iter()
            .map(|dto| {
                let time = Utc
                    .timestamp_opt(dto.time, 0)
                    .single()
                    .ok_or_else(|| BrokerError::Malformed(format!("deal timestamp {}", dto.time)))?;
                Ok(Deal {
                    ticket: dto.ticket,
                    position_id: dto.position_id,
                    symbol: Symbol::new(dto.symbol),
                    side: dto.side.into(),
                    entry: match dto.entry {
                        EntryDto::In => DealEntry::In,
                        EntryDto::Out => DealEntry::Out,
                    },
                    volume: dto.volume,
                    price: dto.price,
                    profit: Money::from_f64(dto.profit),
                    time,
                })
            })
            .collect()
    }
}
