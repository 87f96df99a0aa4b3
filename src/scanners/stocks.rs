//! Stock mean-reversion and momentum scanners.
//!
//! Grounded on `original_source`'s equities strategies: mean-reversion
//! trades 20-day SMA z-score extremes; momentum scores a weighted
//! composite of multi-horizon returns, RSI, and volume surge.

use super::{buy_leg, new_opportunity, sell_leg, ScanContext, Scanner};
use crate::error::ScannerError;
use crate::models::{Opportunity, OpportunityStatus, Venue};
use crate::venues::Ohlcv;
use async_trait::async_trait;

const SMA_WINDOW: usize = 20;

pub struct StockMeanReversionScanner {
    pub id: String,
}

impl StockMeanReversionScanner {
    pub fn new() -> Self {
        Self { id: "stock_mean_reversion".to_string() }
    }
}

#[async_trait]
impl Scanner for StockMeanReversionScanner {
    fn id(&self) -> &str {
        &self.id
    }

    fn scan_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(300)
    }

    async fn scan_once(&self, ctx: &ScanContext) -> Result<Vec<Opportunity>, ScannerError> {
        let cfg = ctx.config.read().stock_mean_reversion.clone();
        if !cfg.enabled {
            return Ok(Vec::new());
        }
        let client = match ctx.venue(Venue::Alpaca) {
            Some(c) => c,
            None => return Ok(Vec::new()),
        };

        let mut out = Vec::new();
        for symbol in &cfg.watchlist {
            let bars = match client.get_ohlcv(symbol, 86400, SMA_WINDOW as u32).await {
                Ok(b) if b.len() >= SMA_WINDOW => b,
                _ => continue,
            };
            let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
            let sma = closes.iter().sum::<f64>() / closes.len() as f64;
            let variance = closes.iter().map(|c| (c - sma).powi(2)).sum::<f64>() / closes.len() as f64;
            let stddev = variance.sqrt();
            if stddev <= f64::EPSILON {
                continue;
            }
            let last = *closes.last().unwrap();
            let z = (last - sma) / stddev;

            if z <= -cfg.entry_zscore {
                let size = cfg.position_size_usd / last.max(0.01);
                out.push(new_opportunity(
                    "stock_mean_reversion",
                    &self.id,
                    vec![buy_leg(Venue::Alpaca, symbol, last, size)],
                    (sma - last).abs(),
                    z.abs() * 10.0,
                    size,
                    0.55,
                    OpportunityStatus::Detected,
                    None,
                ));
            } else if z >= cfg.entry_zscore {
                let size = cfg.position_size_usd / last.max(0.01);
                out.push(new_opportunity(
                    "stock_mean_reversion",
                    &self.id,
                    vec![sell_leg(Venue::Alpaca, symbol, last, size)],
                    (sma - last).abs(),
                    z.abs() * 10.0,
                    size,
                    0.55,
                    OpportunityStatus::Detected,
                    None,
                ));
            }
        }

        Ok(out)
    }
}

pub struct StockMomentumScanner {
    pub id: String,
}

impl StockMomentumScanner {
    pub fn new() -> Self {
        Self { id: "stock_momentum".to_string() }
    }

    /// Composite 0-100 score: weights 20/30/20/15/15 on 1d/5d/20d returns,
    /// RSI-14, and volume surge, each normalized to a 0-100 sub-score.
    fn composite_score(bars: &[Ohlcv]) -> Option<f64> {
        if bars.len() < 21 {
            return None;
        }
        let n = bars.len();
        let ret = |lookback: usize| -> f64 {
            let past = bars[n - 1 - lookback].close;
            let now = bars[n - 1].close;
            if past <= 0.0 { 0.0 } else { (now - past) / past * 100.0 }
        };
        let norm = |pct: f64| -> f64 { (50.0 + pct * 5.0).clamp(0.0, 100.0) };

        let r1 = norm(ret(1));
        let r5 = norm(ret(5));
        let r20 = norm(ret(20));
        let rsi = rsi_14(bars);
        let vol_avg = bars[n - 15..n - 1].iter().map(|b| b.volume).sum::<f64>() / 14.0;
        let vol_surge = if vol_avg > 0.0 { (bars[n - 1].volume / vol_avg * 50.0).min(100.0) } else { 50.0 };

        Some(r1 * 0.20 + r5 * 0.30 + r20 * 0.20 + rsi * 0.15 + vol_surge * 0.15)
    }
}

fn rsi_14(bars: &[Ohlcv]) -> f64 {
    let n = bars.len();
    let window = &bars[n.saturating_sub(15)..n];
    let mut gains = 0.0;
    let mut losses = 0.0;
    for pair in window.windows(2) {
        let delta = pair[1].close - pair[0].close;
        if delta >= 0.0 {
            gains += delta;
        } else {
            losses -= delta;
        }
    }
    if losses <= f64::EPSILON {
        return 100.0;
    }
    let rs = (gains / 14.0) / (losses / 14.0);
    100.0 - 100.0 / (1.0 + rs)
}

#[async_trait]
impl Scanner for StockMomentumScanner {
    fn id(&self) -> &str {
        &self.id
    }

    fn scan_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(300)
    }

    async fn scan_once(&self, ctx: &ScanContext) -> Result<Vec<Opportunity>, ScannerError> {
        let cfg = ctx.config.read().stock_momentum.clone();
        if !cfg.enabled {
            return Ok(Vec::new());
        }
        let client = match ctx.venue(Venue::Alpaca) {
            Some(c) => c,
            None => return Ok(Vec::new()),
        };

        let mut out = Vec::new();
        for symbol in &cfg.watchlist {
            let bars = match client.get_ohlcv(symbol, 86400, 30).await {
                Ok(b) if b.len() >= 21 => b,
                _ => continue,
            };
            let Some(score) = Self::composite_score(&bars) else { continue };
            let rsi = rsi_14(&bars);
            let last = bars.last().map(|b| b.close).unwrap_or(0.0);

            let qualifies = (score >= 80.0 && rsi < 70.0) || score >= 65.0;
            if !qualifies {
                continue;
            }
            let size = cfg.position_size_usd / last.max(0.01);
            out.push(new_opportunity(
                "stock_momentum",
                &self.id,
                vec![buy_leg(Venue::Alpaca, symbol, last, size)],
                0.0,
                score,
                size,
                if score >= 80.0 { 0.75 } else { 0.6 },
                OpportunityStatus::Detected,
                None,
            ));
        }

        Ok(out)
    }
}
