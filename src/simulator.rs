//! Simulator (C6): the paper-mode execution backend. The most
//! algorithmically dense component in the system.
//!
//! Grounded on `original_source/src/paper_trader_realistic.py`: a pre-flight
//! filter chain (cooldown -> daily-limit -> overlap-policy -> false-positive
//! spread -> funds), then latency/drift applied before sizing, then
//! position sizing with partial-fill probability, then a per-arb-type
//! execution-outcome table (failure rate / loss rate / loss severity), then
//! the venue fee model, then a balance update, then persistence.

use crate::config::Config;
use crate::models::{PaperOutcome, PaperTrade, RiskState, Venue};
use crate::store::Store;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub struct SimulationInput {
    pub arbitrage_type: String,
    pub market_a_venue: Venue,
    pub market_a_id: String,
    pub market_b_venue: Venue,
    pub market_b_id: String,
    pub quoted_spread_pct: f64,
}

pub struct SimulatorConfig {
    pub cooldown_secs: i64,
    pub max_trades_per_market_per_day: u32,
    pub max_daily_trades: u32,
    pub skip_same_platform_overlap: bool,
    pub max_realistic_spread_pct: f64,
    pub min_position_usd: f64,
    pub exec_delay_min_secs: f64,
    pub exec_delay_max_secs: f64,
    pub drift_volatility_per_sec: f64,
    pub max_position_pct: f64,
    pub max_position_usd: f64,
    pub partial_fill_chance: f64,
    pub partial_fill_min_pct: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 600,
            max_trades_per_market_per_day: 8,
            max_daily_trades: 50,
            skip_same_platform_overlap: true,
            max_realistic_spread_pct: 35.0,
            min_position_usd: 10.0,
            exec_delay_min_secs: 0.5,
            exec_delay_max_secs: 2.0,
            drift_volatility_per_sec: 0.1,
            max_position_pct: 10.0,
            max_position_usd: 500.0,
            partial_fill_chance: 0.1,
            partial_fill_min_pct: 0.5,
        }
    }
}

struct MarketDayCounter {
    day: NaiveDate,
    per_market: HashMap<(Venue, String), u32>,
    daily_total: u32,
    last_trade_at: HashMap<(Venue, String), DateTime<Utc>>,
}

pub struct Simulator {
    store: Store,
    config: Arc<RwLock<Config>>,
    sim_config: SimulatorConfig,
    risk: Arc<RwLock<RiskState>>,
    balance_usd: RwLock<f64>,
    counters: RwLock<MarketDayCounter>,
}

impl Simulator {
    pub fn new(store: Store, config: Arc<RwLock<Config>>, risk: Arc<RwLock<RiskState>>, sim_config: SimulatorConfig) -> Self {
        let starting_balance = config.read().simulation_starting_balance;
        Self {
            store,
            config,
            sim_config,
            risk,
            balance_usd: RwLock::new(starting_balance),
            counters: RwLock::new(MarketDayCounter {
                day: Utc::now().date_naive(),
                per_market: HashMap::new(),
                daily_total: 0,
                last_trade_at: HashMap::new(),
            }),
        }
    }

    /// Startup self-check (§4.6): compares the persisted stats snapshot's
    /// trade-count against the actual row count; logs (does not fail) on
    /// >50% divergence.
    pub async fn check_integrity(&self, snapshot_trade_count: u64) {
        match self.store.check_stats_integrity(snapshot_trade_count).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(snapshot_trade_count, "stats snapshot diverges from trade table by >50%"),
            Err(e) => tracing::warn!(error = %e, "integrity check failed to run"),
        }
    }

    fn roll_day_if_needed(&self) {
        let today = Utc::now().date_naive();
        let mut counters = self.counters.write();
        if counters.day != today {
            counters.day = today;
            counters.per_market.clear();
            counters.daily_total = 0;
        }
    }

    fn pre_flight_skip_reason(&self, input: &SimulationInput) -> Option<&'static str> {
        self.roll_day_if_needed();
        let counters = self.counters.read();

        let key_a = (input.market_a_venue, input.market_a_id.clone());
        let key_b = (input.market_b_venue, input.market_b_id.clone());

        let now = Utc::now();
        let cooldown = chrono::Duration::seconds(self.sim_config.cooldown_secs);
        let within_cooldown = |key: &(Venue, String)| {
            counters.last_trade_at.get(key).map(|last| now - *last < cooldown).unwrap_or(false)
        };
        if within_cooldown(&key_a) || within_cooldown(&key_b) {
            return Some("Cooldown: market traded within the cooldown window");
        }

        if counters.per_market.get(&key_a).copied().unwrap_or(0) >= self.sim_config.max_trades_per_market_per_day
            || counters.per_market.get(&key_b).copied().unwrap_or(0) >= self.sim_config.max_trades_per_market_per_day
        {
            return Some("daily_cap_per_market");
        }
        if counters.daily_total >= self.sim_config.max_daily_trades {
            return Some("daily_trade_limit");
        }
        if input.market_a_venue == input.market_b_venue
            && input.arbitrage_type != "single_platform"
            && self.sim_config.skip_same_platform_overlap
        {
            return Some("same_platform_overlap_policy");
        }
        if input.quoted_spread_pct > self.sim_config.max_realistic_spread_pct {
            return Some("unrealistic_spread_likely_bad_data");
        }
        if *self.balance_usd.read() < self.sim_config.min_position_usd {
            return Some("insufficient_funds");
        }
        None
    }

    async fn apply_latency_and_drift(&self, quoted_spread_pct: f64) -> Option<f64> {
        let mut rng = rand::thread_rng();
        let delay = rng.gen_range(self.sim_config.exec_delay_min_secs..=self.sim_config.exec_delay_max_secs);
        tokio::time::sleep(std::time::Duration::from_secs_f64(delay)).await;

        let adverse = rng.gen_bool(0.70);
        let decay = if adverse {
            rng.gen_range(0.05..=(delay * self.sim_config.drift_volatility_per_sec).max(0.051))
        } else {
            rng.gen_range(-0.05..=0.05)
        };
        let post_drift = quoted_spread_pct - decay;
        if post_drift <= 0.0 {
            None
        } else {
            Some(post_drift)
        }
    }

    fn size_position(&self) -> f64 {
        let mut rng = rand::thread_rng();
        let balance = *self.balance_usd.read();
        let mut size = (balance * self.sim_config.max_position_pct / 100.0).min(self.sim_config.max_position_usd);
        if rng.gen_bool(self.sim_config.partial_fill_chance) {
            size *= rng.gen_range(self.sim_config.partial_fill_min_pct..=1.0);
        }
        size
    }

    fn execution_outcome(&self, arb_type: &str, spread_pct: f64) -> (PaperOutcome, f64, &'static str) {
        let mut rng = rand::thread_rng();
        let (fail_rate, loss_rate, loss_min, loss_max) = match arb_type {
            "single_platform" => (0.08, 0.04, 2.0, 12.0),
            "cross_platform" => (0.15, 0.12, 3.0, (spread_pct + 8.0).min(20.0)),
            _ => (0.30, 0.50, 30.0, 85.0),
        };

        if rng.gen_bool(fail_rate) {
            return (PaperOutcome::FailedExecution, 0.0, "execution_failure");
        }
        if rng.gen_bool(loss_rate) {
            let severity = rng.gen_range(loss_min..=loss_max.max(loss_min + 0.01));
            return (PaperOutcome::Lost, -severity, "adverse_outcome");
        }
        let avg_fee_pct = match arb_type {
            "single_platform" => 0.0,
            "cross_platform" => 3.5,
            _ => 7.0,
        };
        let avg_slippage = rng.gen_range(0.1..=0.5);
        let spread_cost = rng.gen_range(0.05..=0.3);
        let gross = (spread_pct - avg_slippage - spread_cost).max(0.0);
        let net = gross * (1.0 - avg_fee_pct / 100.0);
        (PaperOutcome::Won, net, "won")
    }

    fn fee_for_venue(venue: Venue, gross_profit_usd: f64) -> f64 {
        match venue {
            Venue::Polymarket => 0.0,
            Venue::Kalshi => (gross_profit_usd * 0.07).max(0.0),
            Venue::Binance => gross_profit_usd.abs() * 0.0010,
            Venue::CoinbaseAdvanced => gross_profit_usd.abs() * 0.0120,
            Venue::Kraken => gross_profit_usd.abs() * 0.0026,
            Venue::Bybit => gross_profit_usd.abs() * 0.0010,
            Venue::Okx => gross_profit_usd.abs() * 0.0010,
            Venue::Kucoin => gross_profit_usd.abs() * 0.0010,
            Venue::Alpaca => 0.000008,
            Venue::Ibkr => 0.0,
        }
    }

    /// Runs one full simulated attempt end to end, persisting a PaperTrade
    /// row regardless of outcome (including skips).
    pub async fn simulate(&self, tenant_id: Uuid, input: SimulationInput) -> PaperTrade {
        if let Some(reason) = self.pre_flight_skip_reason(&input) {
            let pt = skipped_trade(tenant_id, &input, reason);
            let _ = self.store.log_paper_trade(&pt).await;
            return pt;
        }

        let Some(post_drift_spread) = self.apply_latency_and_drift(input.quoted_spread_pct).await else {
            let pt = PaperTrade {
                paper_trade_id: Uuid::new_v4(),
                tenant_id,
                arbitrage_type: input.arbitrage_type.clone(),
                market_a_venue: input.market_a_venue,
                market_a_id: input.market_a_id.clone(),
                market_b_venue: input.market_b_venue,
                market_b_id: input.market_b_id.clone(),
                original_spread_pct: input.quoted_spread_pct,
                executed_spread_pct: 0.0,
                simulated_slippage_pct: 0.0,
                simulated_fees_usd: 0.0,
                position_size_usd: 0.0,
                net_profit_usd: 0.0,
                outcome: PaperOutcome::FailedExecution,
                outcome_reason: "adverse_drift_closed_spread".to_string(),
                created_at: Utc::now(),
            };
            let _ = self.store.log_paper_trade(&pt).await;
            self.record_attempt(&input);
            return pt;
        };

        let position_usd = self.size_position();
        let (outcome, net_pct, reason) = self.execution_outcome(&input.arbitrage_type, post_drift_spread);

        let gross_usd = position_usd * net_pct / 100.0;
        let fees = Self::fee_for_venue(input.market_a_venue, gross_usd.max(0.0)) + Self::fee_for_venue(input.market_b_venue, gross_usd.max(0.0));
        let net_profit_usd = gross_usd - fees;

        {
            let mut balance = self.balance_usd.write();
            match outcome {
                PaperOutcome::Won => *balance += net_profit_usd,
                PaperOutcome::Lost => *balance -= net_profit_usd.abs(),
                _ => {}
            }
        }

        let pt = PaperTrade {
            paper_trade_id: Uuid::new_v4(),
            tenant_id,
            arbitrage_type: input.arbitrage_type.clone(),
            market_a_venue: input.market_a_venue,
            market_a_id: input.market_a_id.clone(),
            market_b_venue: input.market_b_venue,
            market_b_id: input.market_b_id.clone(),
            original_spread_pct: input.quoted_spread_pct,
            executed_spread_pct: post_drift_spread,
            simulated_slippage_pct: input.quoted_spread_pct - post_drift_spread,
            simulated_fees_usd: fees,
            position_size_usd: position_usd,
            net_profit_usd,
            outcome,
            outcome_reason: reason.to_string(),
            created_at: Utc::now(),
        };
        let _ = self.store.log_paper_trade(&pt).await;
        self.record_attempt(&input);

        if matches!(outcome, PaperOutcome::Lost | PaperOutcome::FailedExecution) {
            self.risk.write().consecutive_failures += 1;
        } else {
            self.risk.write().consecutive_failures = 0;
        }
        self.risk.write().daily_pnl += net_profit_usd;

        pt
    }

    fn record_attempt(&self, input: &SimulationInput) {
        let now = Utc::now();
        let mut counters = self.counters.write();
        counters.daily_total += 1;
        let key_a = (input.market_a_venue, input.market_a_id.clone());
        let key_b = (input.market_b_venue, input.market_b_id.clone());
        *counters.per_market.entry(key_a.clone()).or_insert(0) += 1;
        *counters.per_market.entry(key_b.clone()).or_insert(0) += 1;
        counters.last_trade_at.insert(key_a, now);
        counters.last_trade_at.insert(key_b, now);
    }

    pub fn balance(&self) -> f64 {
        *self.balance_usd.read()
    }
}

fn skipped_trade(tenant_id: Uuid, input: &SimulationInput, reason: &'static str) -> PaperTrade {
    PaperTrade {
        paper_trade_id: Uuid::new_v4(),
        tenant_id,
        arbitrage_type: input.arbitrage_type.clone(),
        market_a_venue: input.market_a_venue,
        market_a_id: input.market_a_id.clone(),
        market_b_venue: input.market_b_venue,
        market_b_id: input.market_b_id.clone(),
        original_spread_pct: input.quoted_spread_pct,
        executed_spread_pct: 0.0,
        simulated_slippage_pct: 0.0,
        simulated_fees_usd: 0.0,
        position_size_usd: 0.0,
        net_profit_usd: 0.0,
        outcome: PaperOutcome::RejectedFalsePositive,
        outcome_reason: reason.to_string(),
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_model_matches_spec_table() {
        assert_eq!(Simulator::fee_for_venue(Venue::Polymarket, 100.0), 0.0);
        assert_eq!(Simulator::fee_for_venue(Venue::Kalshi, 100.0), 7.0);
        assert_eq!(Simulator::fee_for_venue(Venue::Kalshi, -100.0), 0.0);
    }
}
