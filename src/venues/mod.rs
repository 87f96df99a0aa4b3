//! Venue Clients (C3): one implementation per external venue, behind a
//! single trait so Scanners/Executor/Simulator never branch on venue type.
//!
//! Grounded on the teacher's `scrapers/polymarket_api.rs` for the
//! rate-limited-retry HTTP client shape, generalized from one hardcoded
//! venue into a trait with per-venue implementations.

pub mod crypto;
pub mod kalshi;
pub mod polymarket;
pub mod stocks;

use crate::error::VenueError;
use crate::models::{Market, OrderBookSnapshot, Side, Venue};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Balance {
    pub asset: String,
    pub free: f64,
    pub locked: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub market_id: String,
    pub side: Side,
    pub size: f64,
    pub avg_entry_price: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Ticker {
    pub last_price: f64,
    pub bid: f64,
    pub ask: f64,
    pub volume_24h: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Ohlcv {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub market_id: String,
    pub side: Side,
    pub price: f64,
    pub size: f64,
    /// Immediate-or-cancel; venues without IOC support reject or emulate
    /// with a cancel-after-timeout.
    pub ioc: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    pub venue_order_id: String,
    pub status: OrderStatus,
    pub filled_size: f64,
    pub fill_price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Open,
    Filled,
    PartiallyFilled,
    Cancelled,
    Rejected,
}

/// Uniform surface over every external venue. Futures-only methods default
/// to `Unsupported` so spot-only implementations need not stub them out.
#[async_trait]
pub trait VenueClient: Send + Sync {
    fn venue(&self) -> Venue;

    async fn get_ticker(&self, market_id: &str) -> Result<Ticker, VenueError>;
    async fn get_order_book(&self, market_id: &str) -> Result<OrderBookSnapshot, VenueError>;
    async fn get_ohlcv(&self, market_id: &str, interval_secs: u32, limit: u32) -> Result<Vec<Ohlcv>, VenueError>;
    async fn get_balance(&self, asset: &str) -> Result<Balance, VenueError>;
    async fn get_positions(&self) -> Result<Vec<Position>, VenueError>;
    async fn create_order(&self, req: OrderRequest) -> Result<OrderAck, VenueError>;
    async fn cancel_order(&self, venue_order_id: &str) -> Result<(), VenueError>;
    async fn get_order(&self, venue_order_id: &str) -> Result<OrderAck, VenueError>;
    async fn get_open_orders(&self, market_id: &str) -> Result<Vec<OrderAck>, VenueError>;

    async fn list_markets(&self) -> Result<Vec<Market>, VenueError> {
        Err(VenueError::Unsupported { venue: self.venue_name() })
    }

    /// Futures-only: current funding rate for `market_id`. Default
    /// `Unsupported` covers spot-only and prediction-market venues.
    async fn get_funding_rate(&self, _market_id: &str) -> Result<f64, VenueError> {
        Err(VenueError::Unsupported { venue: self.venue_name() })
    }

    async fn get_open_interest(&self, _market_id: &str) -> Result<f64, VenueError> {
        Err(VenueError::Unsupported { venue: self.venue_name() })
    }

    fn venue_name(&self) -> &'static str {
        self.venue().as_str()
    }
}
