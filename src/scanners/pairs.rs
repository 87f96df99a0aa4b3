//! Pairs trading: rolling-spread z-score mean reversion between two
//! correlated instruments.
//!
//! Grounded on `original_source`'s pairs module and on the teacher's
//! hand-rolled stats helpers used elsewhere in the crate, reused here for
//! mean/stddev rather than hand-rolling them.

use super::{buy_leg, new_opportunity, sell_leg, ScanContext, Scanner};
use crate::error::ScannerError;
use crate::models::{Opportunity, OpportunityStatus, Side, Venue};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::VecDeque;

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64], mean: f64) -> f64 {
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

const ROLLING_WINDOW: usize = 60;

pub struct PairSpec {
    pub venue: Venue,
    pub symbol_a: String,
    pub symbol_b: String,
    pub beta: f64,
}

struct PairState {
    spread_history: VecDeque<f64>,
    position: Option<Side>,
}

pub struct PairsScanner {
    pub id: String,
    pairs: Vec<PairSpec>,
    state: RwLock<Vec<PairState>>,
}

impl PairsScanner {
    pub fn new(pairs: Vec<PairSpec>) -> Self {
        let state = pairs.iter().map(|_| PairState { spread_history: VecDeque::new(), position: None }).collect();
        Self { id: "pairs_trading".to_string(), pairs, state: RwLock::new(state) }
    }
}

#[async_trait]
impl Scanner for PairsScanner {
    fn id(&self) -> &str {
        &self.id
    }

    fn scan_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(60)
    }

    async fn scan_once(&self, ctx: &ScanContext) -> Result<Vec<Opportunity>, ScannerError> {
        let cfg = ctx.config.read().pairs.clone();
        if !cfg.enabled {
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        let mut state = self.state.write();

        for (idx, pair) in self.pairs.iter().enumerate() {
            let Some(client) = ctx.venue(pair.venue) else { continue };
            let (Ok(ticker_a), Ok(ticker_b)) =
                (client.get_ticker(&pair.symbol_a).await, client.get_ticker(&pair.symbol_b).await)
            else {
                continue;
            };

            let spread = ticker_a.last_price - pair.beta * ticker_b.last_price;
            let s = &mut state[idx];
            s.spread_history.push_back(spread);
            if s.spread_history.len() > ROLLING_WINDOW {
                s.spread_history.pop_front();
            }
            if s.spread_history.len() < ROLLING_WINDOW / 2 {
                continue;
            }

            let values: Vec<f64> = s.spread_history.iter().copied().collect();
            let avg = mean(&values);
            let stddev = std_dev(&values, avg);
            if stddev <= f64::EPSILON {
                continue;
            }
            let z = (spread - avg) / stddev;

            if s.position.is_none() && z.abs() >= cfg.entry_zscore && z.abs() < cfg.stop_loss_zscore {
                let size = cfg.position_size_usd / ticker_a.last_price.max(0.01);
                let (leg_a, side) = if z >= 0.0 {
                    (sell_leg(pair.venue, &pair.symbol_a, ticker_a.last_price, size), Side::Sell)
                } else {
                    (buy_leg(pair.venue, &pair.symbol_a, ticker_a.last_price, size), Side::Buy)
                };
                s.position = Some(side);
                out.push(new_opportunity(
                    "pairs_trading",
                    &self.id,
                    vec![leg_a],
                    z,
                    z.abs() * 10.0,
                    size,
                    0.6,
                    OpportunityStatus::Detected,
                    None,
                ));
            } else if s.position.is_some() && (z.abs() <= cfg.exit_zscore || z.abs() > cfg.stop_loss_zscore) {
                s.position = None;
                out.push(new_opportunity(
                    "pairs_trading",
                    &self.id,
                    vec![],
                    0.0,
                    0.0,
                    0.0,
                    0.0,
                    OpportunityStatus::Skipped,
                    Some("exit_signal_handled_by_position_manager".to_string()),
                ));
            }
        }

        Ok(out)
    }
}
