//! Core domain entities shared across every component.
//!
//! These types are the nouns the rest of the crate operates on: a scanner
//! produces `Opportunity` rows, the executor/simulator turn them into `Trade`
//! or `PaperTrade` rows, and the `Store` persists all of them tenant-scoped.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Unit of isolation. One row per enrolled user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub tenant_id: Uuid,
    pub enabled: bool,
    pub mode: TradingMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradingMode {
    Paper,
    Live,
}

impl TradingMode {
    pub fn is_live(self) -> bool {
        matches!(self, TradingMode::Live)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Venue {
    Polymarket,
    Kalshi,
    Binance,
    CoinbaseAdvanced,
    Kraken,
    Bybit,
    Okx,
    Kucoin,
    Alpaca,
    Ibkr,
}

impl Venue {
    pub fn as_str(self) -> &'static str {
        match self {
            Venue::Polymarket => "polymarket",
            Venue::Kalshi => "kalshi",
            Venue::Binance => "binance",
            Venue::CoinbaseAdvanced => "coinbase_advanced",
            Venue::Kraken => "kraken",
            Venue::Bybit => "bybit",
            Venue::Okx => "okx",
            Venue::Kucoin => "kucoin",
            Venue::Alpaca => "alpaca",
            Venue::Ibkr => "ibkr",
        }
    }

    /// Zero-fee prediction-market venue (used by the asymmetric cross-platform threshold).
    pub fn is_zero_fee_prediction_market(self) -> bool {
        matches!(self, Venue::Polymarket)
    }
}

/// Side ∈ {buy, sell}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

/// Identified by (venue, market-id); carries display title, outcome set,
/// resolution timestamp, is-active flag. `event_id` groups sibling binary
/// markets that jointly resolve one multi-outcome event (e.g. "who wins the
/// election" split into one YES/NO market per candidate) — `None` when the
/// venue has no such grouping or the venue client couldn't determine it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub venue: Venue,
    pub market_id: String,
    pub title: String,
    pub outcomes: Vec<String>,
    pub event_id: Option<String>,
    pub resolves_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// One price level: price and size available at that price.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub size: f64,
}

/// Per (venue, market-id): sorted bids (price desc) and asks (price asc).
/// Bids and asks must never cross within one snapshot; `last_update` is
/// monotonic per stream. Owned exclusively by its Venue Client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub venue: Venue,
    pub market_id: String,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    pub last_update: DateTime<Utc>,
}

impl OrderBookSnapshot {
    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|l| l.price)
    }

    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid >= ask,
            _ => false,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.last_update
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityStatus {
    Detected,
    Skipped,
    Executed,
    Missed,
    Failed,
}

/// One leg of a (possibly multi-leg) opportunity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpportunityLeg {
    pub side: Side,
    pub venue: Venue,
    pub market_id: String,
    pub target_price: f64,
    pub max_size: f64,
}

/// A detected tradable edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub opportunity_id: Uuid,
    pub detected_at: DateTime<Utc>,
    pub strategy_tag: String,
    pub legs: Vec<OpportunityLeg>,
    pub profit_per_contract: f64,
    pub profit_percent: f64,
    pub max_size: f64,
    pub total_profit_usd: f64,
    pub confidence: f64,
    pub status: OpportunityStatus,
    pub skip_reason: Option<String>,
    pub scanner_id: String,
}

impl Opportunity {
    /// profit_percent is only meaningful alongside the snapshot it was
    /// priced from; confidence=0 implies the scanner should have marked
    /// this skipped rather than detected.
    pub fn assert_invariants(&self) {
        debug_assert!(
            self.confidence > 0.0 || self.status == OpportunityStatus::Skipped,
            "zero-confidence opportunity must be skipped"
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Pending,
    Submitted,
    Filled,
    PartiallyFilled,
    Cancelled,
    Failed,
    DryRun,
}

impl TradeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TradeStatus::Filled
                | TradeStatus::PartiallyFilled
                | TradeStatus::Cancelled
                | TradeStatus::Failed
                | TradeStatus::DryRun
        )
    }
}

/// One order submitted (live) or dry-run recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: Uuid,
    pub opportunity_id: Uuid,
    pub venue: Venue,
    pub market_id: String,
    pub side: Side,
    pub target_price: f64,
    pub requested_size: f64,
    pub status: TradeStatus,
    pub filled_size: f64,
    pub fill_price: f64,
    pub venue_order_id: Option<String>,
    pub tx_hash: Option<String>,
    pub fees: f64,
    pub error_message: Option<String>,
    pub executed_at: DateTime<Utc>,
}

impl Trade {
    pub fn invariant_ok(&self) -> bool {
        self.filled_size <= self.requested_size + f64::EPSILON
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaperOutcome {
    Pending,
    Won,
    Lost,
    FailedExecution,
    PartialFill,
    Expired,
    RejectedFalsePositive,
}

/// Simulator counterpart to `Trade`; one row per simulated attempt,
/// including skipped ones (recorded with only the inputs + skip reason).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperTrade {
    pub paper_trade_id: Uuid,
    pub tenant_id: Uuid,
    pub arbitrage_type: String,
    pub market_a_venue: Venue,
    pub market_a_id: String,
    pub market_b_venue: Venue,
    pub market_b_id: String,
    pub original_spread_pct: f64,
    pub executed_spread_pct: f64,
    pub simulated_slippage_pct: f64,
    pub simulated_fees_usd: f64,
    pub position_size_usd: f64,
    pub net_profit_usd: f64,
    pub outcome: PaperOutcome,
    pub outcome_reason: String,
    pub created_at: DateTime<Utc>,
}

/// Per-tenant, in-memory risk state. Owned exclusively by the tenant's
/// Executor or Simulator — no other task mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskState {
    pub daily_pnl: f64,
    pub daily_trade_count: u32,
    pub consecutive_failures: u32,
    pub paused: bool,
    pub pause_reason: Option<String>,
    pub approvals_remaining: u32,
    pub trades_requiring_approval_seen: u32,
    #[serde(skip)]
    pub cooldowns: HashMap<(Venue, String), Vec<DateTime<Utc>>>,
    pub last_daily_reset: NaiveDate,
}

impl RiskState {
    pub fn new(approval_threshold: u32) -> Self {
        Self {
            daily_pnl: 0.0,
            daily_trade_count: 0,
            consecutive_failures: 0,
            paused: false,
            pause_reason: None,
            approvals_remaining: approval_threshold,
            trades_requiring_approval_seen: 0,
            cooldowns: HashMap::new(),
            last_daily_reset: Utc::now().date_naive(),
        }
    }

    /// Resets daily counters across a UTC day boundary. Idempotent within a day.
    pub fn roll_daily_reset_if_needed(&mut self, today: NaiveDate) {
        if today != self.last_daily_reset {
            self.daily_pnl = 0.0;
            self.daily_trade_count = 0;
            self.last_daily_reset = today;
        }
    }

    pub fn record_cooldown(&mut self, venue: Venue, market_id: &str, at: DateTime<Utc>, evict_after: chrono::Duration) {
        let key = (venue, market_id.to_string());
        let entry = self.cooldowns.entry(key).or_default();
        entry.push(at);
        entry.retain(|ts| at - *ts < evict_after);
    }

    pub fn cooldown_hits(&self, venue: Venue, market_id: &str, since: DateTime<Utc>) -> usize {
        self.cooldowns
            .get(&(venue, market_id.to_string()))
            .map(|ts| ts.iter().filter(|t| **t >= since).count())
            .unwrap_or(0)
    }
}

/// Current run state of a tenant's bot loop, as persisted in `bot_status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotStatus {
    pub tenant_id: Uuid,
    pub is_running: bool,
    pub mode: TradingMode,
    pub last_heartbeat: DateTime<Utc>,
}

/// Periodic row capturing current balance, total P&L, trade count, win
/// rate, session-scoped counters (paper-mode).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub tenant_id: Uuid,
    pub balance_usd: f64,
    pub total_pnl_usd: f64,
    pub trade_count: u64,
    pub win_count: u64,
    pub loss_count: u64,
    pub total_fees_usd: f64,
    pub best_trade_usd: f64,
    pub worst_trade_usd: f64,
    pub updated_at: DateTime<Utc>,
}

impl StatsSnapshot {
    pub fn win_rate(&self) -> f64 {
        if self.trade_count == 0 {
            0.0
        } else {
            self.win_count as f64 / self.trade_count as f64
        }
    }
}

/// Append-only `(tenant-id, action, JSON details, timestamp)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub tenant_id: Option<Uuid>,
    pub action: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhaleTier {
    Retail,
    SmartMoney,
    Whale,
    MegaWhale,
}

impl WhaleTier {
    /// Confidence used to scale copy-trade sizing and scanner confidence.
    pub fn confidence(self) -> f64 {
        match self {
            WhaleTier::MegaWhale => 0.95,
            WhaleTier::Whale => 0.85,
            WhaleTier::SmartMoney => 0.75,
            WhaleTier::Retail => 0.50,
        }
    }

    /// Derived from rolling win-rate and 30-day volume, grounded on the
    /// original classifier's thresholds.
    pub fn classify(win_rate: f64, volume_usd_30d: f64) -> Self {
        if volume_usd_30d >= 1_000_000.0 && win_rate >= 0.65 {
            WhaleTier::MegaWhale
        } else if volume_usd_30d >= 250_000.0 && win_rate >= 0.6 {
            WhaleTier::Whale
        } else if volume_usd_30d >= 50_000.0 && win_rate >= 0.55 {
            WhaleTier::SmartMoney
        } else {
            WhaleTier::Retail
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedWhale {
    pub address: String,
    pub tier: WhaleTier,
    pub win_rate: f64,
    pub volume_usd_30d: f64,
    pub trade_count: u64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhaleTrade {
    pub whale_address: String,
    pub venue: Venue,
    pub market_id: String,
    pub side: Side,
    pub price: f64,
    pub size: f64,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyTrade {
    pub trade: Trade,
    pub whale_address: String,
    pub sizing_scale: f64,
    pub slippage_check_passed: bool,
}

/// In-memory record preventing a tenant from re-entering the same resolved
/// outcome position across two different scanners in the same tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionClaim {
    pub venue: Venue,
    pub market_id: String,
    pub side: Side,
    pub size: f64,
    pub entry_price: f64,
    pub claimed_at: DateTime<Utc>,
}

/// One rung of an active grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridLevel {
    pub price: f64,
    pub side: Side,
    pub filled: bool,
    pub paired_order_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_book_best_levels() {
        let book = OrderBookSnapshot {
            venue: Venue::Polymarket,
            market_id: "m1".into(),
            bids: vec![PriceLevel { price: 0.40, size: 100.0 }],
            asks: vec![PriceLevel { price: 0.45, size: 50.0 }],
            last_update: Utc::now(),
        };
        assert_eq!(book.best_bid(), Some(0.40));
        assert_eq!(book.best_ask(), Some(0.45));
        assert!(!book.is_crossed());
    }

    #[test]
    fn risk_state_daily_reset_is_idempotent() {
        let mut rs = RiskState::new(3);
        rs.daily_pnl = -50.0;
        rs.daily_trade_count = 4;
        let today = rs.last_daily_reset;
        rs.roll_daily_reset_if_needed(today);
        assert_eq!(rs.daily_trade_count, 4);
        let tomorrow = today.succ_opt().unwrap();
        rs.roll_daily_reset_if_needed(tomorrow);
        assert_eq!(rs.daily_trade_count, 0);
        assert_eq!(rs.daily_pnl, 0.0);
    }

    #[test]
    fn whale_tier_confidence_matches_spec() {
        assert_eq!(WhaleTier::MegaWhale.confidence(), 0.95);
        assert_eq!(WhaleTier::Retail.confidence(), 0.50);
    }
}
