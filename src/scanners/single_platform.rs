//! Single-platform (YES/NO) arb and its multi-outcome-event generalization.
//!
//! Grounded on `original_source`'s single-platform scanner: for a binary
//! market, total = ask_YES + ask_NO; profit% = |1 - total| * 100; buy every
//! outcome on the cheap side. A multi-outcome event (N related markets that
//! jointly must sum to 1) is the same rule summed across N legs instead of
//! 2, with bonus multipliers for outcome count and liquidity extremes.

use super::{buy_leg, new_opportunity, ScanContext, Scanner};
use crate::config::SinglePlatformConfig;
use crate::error::ScannerError;
use crate::models::{Market, Opportunity, OpportunityStatus, Venue};
use crate::venues::VenueClient;
use async_trait::async_trait;
use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;

const COOLDOWN: Duration = Duration::hours(1);

pub struct SinglePlatformScanner {
    pub venue: Venue,
    pub id: String,
}

impl SinglePlatformScanner {
    pub fn new(venue: Venue) -> Self {
        Self { id: format!("single_platform::{}", venue.as_str()), venue }
    }

    fn config<'a>(&self, cfg: &'a crate::config::Config) -> &'a SinglePlatformConfig {
        match self.venue {
            Venue::Polymarket => &cfg.poly_single,
            Venue::Kalshi => &cfg.kalshi_single,
            _ => unreachable!("single-platform scanner only constructed for prediction-market venues"),
        }
    }

    /// Bonus multiplier for an event with `outcome_count` related markets
    /// and total two-sided liquidity `liquidity_usd`.
    fn bonus_multiplier(outcome_count: usize, liquidity_usd: f64) -> f64 {
        let mut mult = 1.0;
        if outcome_count >= 5 {
            mult *= 1.50;
        } else if outcome_count >= 3 {
            mult *= 1.30;
        }
        if liquidity_usd < 5_000.0 {
            mult *= 1.20; // thin books hold their edge longer
        } else if liquidity_usd > 200_000.0 {
            mult *= 0.80;
        }
        mult
    }

    /// Multi-outcome event arb: for an event whose `N` sibling markets each
    /// resolve YES/NO and jointly must sum to 1, sum the YES asks across all
    /// `N` legs instead of 2. `total < 1` => buy every YES leg (underpriced
    /// set); `total > 1` => buy every NO leg (overpriced set, NO ask
    /// approximated per leg as `1 - best_bid` the same way the binary path
    /// does). Skips the whole event if any leg's book can't be fetched.
    async fn evaluate_event(
        &self,
        client: &Arc<dyn VenueClient>,
        cfg: &SinglePlatformConfig,
        event_id: &str,
        group: &[Market],
    ) -> Option<Opportunity> {
        let mut asks = Vec::with_capacity(group.len());
        let mut bids = Vec::with_capacity(group.len());
        let mut liquidity = 0.0;

        for market in group {
            let book = client.get_order_book(&market.market_id).await.ok()?;
            let ask_yes = book.best_ask()?;
            let bid_yes = book.best_bid().unwrap_or(1.0);
            liquidity += book.bids.iter().map(|l| l.size).sum::<f64>() + book.asks.iter().map(|l| l.size).sum::<f64>();
            asks.push(ask_yes);
            bids.push(bid_yes);
        }

        let total: f64 = asks.iter().sum();
        let spread = (1.0 - total).abs();
        let profit_pct = spread * 100.0;

        if profit_pct < cfg.min_profit_pct || spread > cfg.max_spread_pct / 100.0 {
            return Some(new_opportunity(
                "single_platform",
                &self.id,
                vec![],
                0.0,
                profit_pct,
                0.0,
                0.0,
                OpportunityStatus::Skipped,
                Some(format!("below_min_profit_or_over_max_spread:event={event_id}")),
            ));
        }

        let bonus = Self::bonus_multiplier(group.len(), liquidity);
        let confidence = (0.6 * bonus).min(1.0);
        let max_size = cfg.max_position_usd / total.max(0.01);

        let legs = if total < 1.0 {
            group.iter().zip(&asks).map(|(m, &ask)| buy_leg(self.venue, &m.market_id, ask, max_size)).collect()
        } else {
            group
                .iter()
                .zip(&bids)
                .map(|(m, &bid)| buy_leg(self.venue, &m.market_id, 1.0 - bid, max_size))
                .collect()
        };

        Some(new_opportunity(
            "single_platform",
            &self.id,
            legs,
            spread,
            profit_pct,
            max_size,
            confidence,
            OpportunityStatus::Detected,
            None,
        ))
    }
}

#[async_trait]
impl Scanner for SinglePlatformScanner {
    fn id(&self) -> &str {
        &self.id
    }

    fn scan_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(5)
    }

    async fn scan_once(&self, ctx: &ScanContext) -> Result<Vec<Opportunity>, ScannerError> {
        let cfg_snapshot = ctx.config.read().clone();
        let cfg = self.config(&cfg_snapshot);
        if !cfg.enabled {
            return Ok(Vec::new());
        }
        let client = match ctx.venue(self.venue) {
            Some(c) => c,
            None => return Ok(Vec::new()),
        };

        let markets = client.list_markets().await?;
        let mut out = Vec::new();
        let now = chrono::Utc::now();

        // Events with >=3 sibling outcome markets get the N-leg multi-outcome
        // evaluation below; everything else (including 2-leg events, already
        // covered by the binary rule) falls through to the per-market loop.
        let mut by_event: HashMap<String, Vec<Market>> = HashMap::new();
        let mut standalone: Vec<Market> = Vec::new();
        for market in markets.into_iter().filter(|m| m.is_active) {
            match &market.event_id {
                Some(event_id) => by_event.entry(event_id.clone()).or_default().push(market),
                None => standalone.push(market),
            }
        }

        for (event_id, group) in by_event {
            if group.len() < 3 {
                standalone.extend(group);
                continue;
            }
            if ctx.cooldowns.read().is_cooling_down(self.venue, &event_id, now, COOLDOWN) {
                continue;
            }
            if let Some(opp) = self.evaluate_event(client, cfg, &event_id, &group).await {
                if opp.status == OpportunityStatus::Detected {
                    ctx.cooldowns.write().record(self.venue, &event_id, now, COOLDOWN);
                }
                out.push(opp);
            }
        }

        for market in standalone {
            if ctx.cooldowns.read().is_cooling_down(self.venue, &market.market_id, now, COOLDOWN) {
                continue;
            }

            let book = match client.get_order_book(&market.market_id).await {
                Ok(b) => b,
                Err(_) => continue,
            };
            let ask_yes = match book.best_ask() {
                Some(p) => p,
                None => continue,
            };
            // Binary markets quote only a YES book here; the NO ask is
            // 1 - YES bid under no-arbitrage pricing used for screening.
            let ask_no = 1.0 - book.best_bid().unwrap_or(1.0);
            let total = ask_yes + ask_no;
            let spread = (1.0 - total).abs();
            let profit_pct = spread * 100.0;

            if profit_pct < cfg.min_profit_pct || spread > cfg.max_spread_pct / 100.0 {
                out.push(new_opportunity(
                    "single_platform",
                    &self.id,
                    vec![],
                    0.0,
                    profit_pct,
                    0.0,
                    0.0,
                    OpportunityStatus::Skipped,
                    Some("below_min_profit_or_over_max_spread".to_string()),
                ));
                continue;
            }

            let liquidity = book.bids.iter().map(|l| l.size).sum::<f64>() + book.asks.iter().map(|l| l.size).sum::<f64>();
            let bonus = Self::bonus_multiplier(market.outcomes.len(), liquidity);
            let confidence = (0.6 * bonus).min(1.0);
            let max_size = cfg.max_position_usd / total.max(0.01);

            let legs = if total < 1.0 {
                vec![buy_leg(self.venue, &market.market_id, ask_yes, max_size)]
            } else {
                vec![buy_leg(self.venue, &market.market_id, ask_no, max_size)]
            };

            out.push(new_opportunity(
                "single_platform",
                &self.id,
                legs,
                spread,
                profit_pct,
                max_size,
                confidence,
                OpportunityStatus::Detected,
                None,
            ));
            ctx.cooldowns.write().record(self.venue, &market.market_id, now, COOLDOWN);
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bonus_multiplier_rewards_many_outcomes_and_thin_books() {
        let base = SinglePlatformScanner::bonus_multiplier(2, 50_000.0);
        let many_outcomes = SinglePlatformScanner::bonus_multiplier(5, 50_000.0);
        let thin = SinglePlatformScanner::bonus_multiplier(2, 1_000.0);
        assert!(many_outcomes > base);
        assert!(thin > base);
    }

    #[test]
    fn multi_outcome_sums_yes_asks_across_all_legs() {
        let asks = [0.40, 0.35, 0.30];
        let total: f64 = asks.iter().sum();
        let spread = (1.0 - total).abs();
        let profit_pct = spread * 100.0;
        assert!((total - 1.05).abs() < 1e-9);
        assert!((profit_pct - 5.0).abs() < 1e-9);

        let bonus = SinglePlatformScanner::bonus_multiplier(asks.len(), 50_000.0);
        assert!((bonus - 1.30).abs() < 1e-9);
        assert!((profit_pct * bonus - 6.5).abs() < 1e-9);
    }
}
