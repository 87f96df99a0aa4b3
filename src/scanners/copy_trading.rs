//! Copy-trading: mirrors tracked whale wallets' recent buys, scaled and
//! capped by tenant risk limits.
//!
//! Grounded on `original_source`'s whale-tracking module: whales are
//! classified into tiers by 30-day volume and win rate (`WhaleTier` in
//! `models.rs`); new buy activity becomes a copy signal scaled by
//! `copy_multiplier`, capped by `max_copy_size` and `max_balance_pct`, and
//! aborted if price moved beyond `max_slippage_pct` since the whale's entry.

use super::{buy_leg, new_opportunity, ScanContext, Scanner};
use crate::error::ScannerError;
use crate::models::{Opportunity, OpportunityStatus, TrackedWhale, WhaleTrade};
use async_trait::async_trait;

pub struct CopyTradingConfig {
    pub copy_multiplier: f64,
    pub max_copy_size: f64,
    pub max_balance_pct: f64,
    pub max_slippage_pct: f64,
}

pub struct CopyTradingScanner {
    pub id: String,
    pub whales: Vec<TrackedWhale>,
    pub cfg: CopyTradingConfig,
    /// Supplied by whatever feed discovers whale activity; kept external to
    /// this scanner so it can be swapped between a REST poll and a
    /// websocket subscription without touching scoring logic.
    pub recent_trades: Vec<WhaleTrade>,
    pub current_balance_usd: f64,
}

#[async_trait]
impl Scanner for CopyTradingScanner {
    fn id(&self) -> &str {
        &self.id
    }

    fn scan_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(15)
    }

    async fn scan_once(&self, ctx: &ScanContext) -> Result<Vec<Opportunity>, ScannerError> {
        let mut out = Vec::new();

        for trade in &self.recent_trades {
            if !matches!(trade.side, crate::models::Side::Buy) {
                continue;
            }
            let Some(whale) = self.whales.iter().find(|w| w.address == trade.whale_address) else { continue };
            let Some(client) = ctx.venue(trade.venue) else { continue };

            let ticker = match client.get_ticker(&trade.market_id).await {
                Ok(t) => t,
                Err(_) => continue,
            };
            let slippage_pct = (ticker.last_price - trade.price).abs() / trade.price.max(0.01) * 100.0;
            if slippage_pct > self.cfg.max_slippage_pct {
                out.push(new_opportunity(
                    "copy_trading",
                    &self.id,
                    vec![],
                    0.0,
                    0.0,
                    0.0,
                    0.0,
                    OpportunityStatus::Skipped,
                    Some("price_moved_past_max_slippage_since_whale_entry".to_string()),
                ));
                continue;
            }

            let mut size = trade.size * self.cfg.copy_multiplier;
            size = size.min(self.cfg.max_copy_size);
            let max_size_by_balance = self.current_balance_usd * self.cfg.max_balance_pct / 100.0 / ticker.last_price.max(0.01);
            size = size.min(max_size_by_balance);
            if size <= 0.0 {
                continue;
            }

            out.push(new_opportunity(
                "copy_trading",
                &self.id,
                vec![buy_leg(trade.venue, &trade.market_id, ticker.last_price, size)],
                0.0,
                0.0,
                size,
                whale.tier.confidence(),
                OpportunityStatus::Detected,
                None,
            ));
        }

        Ok(out)
    }
}
