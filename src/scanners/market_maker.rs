//! Market-maker scanner: posts two-sided quotes around mid on high-volume
//! binary markets, skewed by current inventory.
//!
//! Grounded on `original_source`'s market-making module for the
//! inventory-skew formula: `bid = mid - half_spread - inventory*skew`,
//! `ask = mid + half_spread - inventory*skew` (positive inventory lowers
//! both quotes to encourage selling down the position).

use super::{buy_leg, new_opportunity, sell_leg, ScanContext, Scanner};
use crate::error::ScannerError;
use crate::models::{Opportunity, OpportunityStatus, Venue};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

pub struct MarketMakerScanner {
    pub id: String,
    pub venue: Venue,
    pub market_ids: Vec<String>,
    /// Inventory in contracts, keyed by market id; positive = net long.
    inventory: RwLock<HashMap<String, f64>>,
}

impl MarketMakerScanner {
    pub fn new(venue: Venue, market_ids: Vec<String>) -> Self {
        Self { id: "market_maker".to_string(), venue, market_ids, inventory: RwLock::new(HashMap::new()) }
    }
}

#[async_trait]
impl Scanner for MarketMakerScanner {
    fn id(&self) -> &str {
        &self.id
    }

    fn scan_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(5)
    }

    async fn scan_once(&self, ctx: &ScanContext) -> Result<Vec<Opportunity>, ScannerError> {
        let cfg = ctx.config.read().market_maker.clone();
        if !cfg.enabled {
            return Ok(Vec::new());
        }
        let client = match ctx.venue(self.venue) {
            Some(c) => c,
            None => return Ok(Vec::new()),
        };

        let mut out = Vec::new();
        for market_id in self.market_ids.iter().take(cfg.max_markets.max(0) as usize) {
            let book = match client.get_order_book(market_id).await {
                Ok(b) => b,
                Err(_) => continue,
            };
            let ticker = match client.get_ticker(market_id).await {
                Ok(t) => t,
                Err(_) => continue,
            };

            if ticker.volume_24h < cfg.min_volume_24h {
                continue;
            }
            let Some(mid) = book.best_bid().zip(book.best_ask()).map(|(b, a)| (a + b) / 2.0) else {
                continue;
            };

            let inventory_usd = *self.inventory.read().get(market_id).unwrap_or(&0.0) * mid;
            if inventory_usd.abs() > cfg.max_inventory_usd {
                continue;
            }

            let half_spread = (cfg.target_spread_bps as f64) / 2.0 / 10_000.0;
            let skew = inventory_usd / cfg.max_inventory_usd.max(1.0) * cfg.inventory_skew_factor;
            let bid_price = (mid - half_spread - skew).clamp(0.01, 0.99);
            let ask_price = (mid + half_spread - skew).clamp(0.01, 0.99);
            let size = cfg.order_size_usd / mid.max(0.01);

            out.push(new_opportunity(
                "market_maker",
                &self.id,
                vec![buy_leg(self.venue, market_id, bid_price, size)],
                half_spread,
                half_spread * 100.0,
                size,
                0.7,
                OpportunityStatus::Detected,
                None,
            ));
            out.push(new_opportunity(
                "market_maker",
                &self.id,
                vec![sell_leg(self.venue, market_id, ask_price, size)],
                half_spread,
                half_spread * 100.0,
                size,
                0.7,
                OpportunityStatus::Detected,
                None,
            ));
        }

        Ok(out)
    }
}
