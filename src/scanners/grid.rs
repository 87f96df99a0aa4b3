//! Grid trading: alternating buy/sell limits across a fixed price range,
//! re-placing the opposite-side order one level away on every fill.
//!
//! Grounded on `original_source`'s grid module for level spacing and the
//! stop-loss/take-profit breakout rule.

use super::{buy_leg, new_opportunity, sell_leg, ScanContext, Scanner};
use crate::error::ScannerError;
use crate::models::{GridLevel, Opportunity, OpportunityStatus, Side, Venue};
use async_trait::async_trait;
use parking_lot::RwLock;

pub struct ActiveGrid {
    pub market_id: String,
    pub center_price: f64,
    pub levels: Vec<GridLevel>,
    pub entry_investment_usd: f64,
}

pub struct GridScanner {
    pub id: String,
    pub venue: Venue,
    grids: RwLock<Vec<ActiveGrid>>,
}

impl GridScanner {
    pub fn new(venue: Venue) -> Self {
        Self { id: "grid_trading".to_string(), venue, grids: RwLock::new(Vec::new()) }
    }

    pub fn open_grid(&self, market_id: String, center_price: f64, range_pct: f64, levels: i64, investment_usd: f64) {
        let half_range = center_price * range_pct / 100.0 / 2.0;
        let step = (half_range * 2.0) / levels.max(1) as f64;
        let mut rungs = Vec::with_capacity(levels as usize);
        for i in 0..levels {
            let price = center_price - half_range + step * i as f64;
            let side = if price < center_price { Side::Buy } else { Side::Sell };
            rungs.push(GridLevel { price, side, filled: false, paired_order_id: None });
        }
        self.grids.write().push(ActiveGrid { market_id, center_price, levels: rungs, entry_investment_usd: investment_usd });
    }
}

#[async_trait]
impl Scanner for GridScanner {
    fn id(&self) -> &str {
        &self.id
    }

    fn scan_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(30)
    }

    async fn scan_once(&self, ctx: &ScanContext) -> Result<Vec<Opportunity>, ScannerError> {
        let cfg = ctx.config.read().grid.clone();
        if !cfg.enabled {
            return Ok(Vec::new());
        }
        let client = match ctx.venue(self.venue) {
            Some(c) => c,
            None => return Ok(Vec::new()),
        };

        let mut out = Vec::new();
        let mut grids = self.grids.write();
        let mut closed_indices = Vec::new();

        for (idx, grid) in grids.iter_mut().enumerate() {
            let ticker = match client.get_ticker(&grid.market_id).await {
                Ok(t) => t,
                Err(_) => continue,
            };
            let pct_move = (ticker.last_price - grid.center_price) / grid.center_price * 100.0;
            if pct_move.abs() >= cfg.stop_loss_pct || pct_move >= cfg.take_profit_pct {
                closed_indices.push(idx);
                continue;
            }

            for level in grid.levels.iter_mut().filter(|l| !l.filled) {
                let within_tick = (ticker.last_price - level.price).abs() / level.price < 0.002;
                if !within_tick {
                    continue;
                }
                level.filled = true;
                let size = grid.entry_investment_usd / (grid.levels.len() as f64) / level.price.max(0.01);
                let leg = match level.side {
                    Side::Buy => buy_leg(self.venue, &grid.market_id, level.price, size),
                    Side::Sell => sell_leg(self.venue, &grid.market_id, level.price, size),
                };
                out.push(new_opportunity(
                    "grid_trading",
                    &self.id,
                    vec![leg],
                    0.0,
                    0.0,
                    size,
                    0.65,
                    OpportunityStatus::Detected,
                    None,
                ));
            }
        }

        for idx in closed_indices.into_iter().rev() {
            grids.remove(idx);
        }

        Ok(out)
    }
}
