//! Scanners (C4): one cooperative task per strategy, sharing a common
//! trait so the Tenant Runtime can drive all of them identically.
//!
//! Grounded on the teacher's `arbitrage/engine.rs` polling loop —
//! generalized from one hardcoded engine into a trait (`scan_once` on a
//! `tokio::time::interval`) implemented once per strategy below.

pub mod copy_trading;
pub mod cross_platform;
pub mod funding_rate;
pub mod grid;
pub mod market_maker;
pub mod pairs;
pub mod single_platform;
pub mod stocks;

use crate::config::Config;
use crate::error::ScannerError;
use crate::models::{Opportunity, OpportunityLeg, OpportunityStatus, RiskState, Side, Venue};
use crate::store::Store;
use crate::venues::VenueClient;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Shared read access each scanner needs per tick: live config snapshot,
/// the tenant's Store handle, and the venue clients enabled for this tenant.
pub struct ScanContext {
    pub config: Arc<RwLock<Config>>,
    pub store: Store,
    pub venues: HashMap<Venue, Arc<dyn VenueClient>>,
    pub risk: Arc<RwLock<RiskState>>,
    pub cooldowns: Arc<RwLock<CooldownMap>>,
}

impl ScanContext {
    pub fn venue(&self, v: Venue) -> Option<&Arc<dyn VenueClient>> {
        self.venues.get(&v)
    }
}

/// Per-market cooldown tracker, shared across scanners that touch the same
/// (venue, market) pair — e.g. single-platform and cross-platform scanners
/// racing the same Polymarket market. Eviction rule per §4.4: on every
/// write, drop entries older than 2x the cooldown window.
#[derive(Default)]
pub struct CooldownMap {
    hits: HashMap<(Venue, String), Vec<DateTime<Utc>>>,
}

impl CooldownMap {
    pub fn record(&mut self, venue: Venue, market_id: &str, at: DateTime<Utc>, window: Duration) {
        let entry = self.hits.entry((venue, market_id.to_string())).or_default();
        entry.push(at);
        entry.retain(|ts| at - *ts < window * 2);
    }

    pub fn is_cooling_down(&self, venue: Venue, market_id: &str, now: DateTime<Utc>, window: Duration) -> bool {
        self.hits
            .get(&(venue, market_id.to_string()))
            .map(|ts| ts.iter().any(|t| now - *t < window))
            .unwrap_or(false)
    }
}

#[async_trait]
pub trait Scanner: Send + Sync {
    fn id(&self) -> &str;
    fn scan_interval(&self) -> std::time::Duration;
    async fn scan_once(&self, ctx: &ScanContext) -> Result<Vec<Opportunity>, ScannerError>;
}

pub(crate) fn new_opportunity(
    strategy_tag: &str,
    scanner_id: &str,
    legs: Vec<OpportunityLeg>,
    profit_per_contract: f64,
    profit_percent: f64,
    max_size: f64,
    confidence: f64,
    status: OpportunityStatus,
    skip_reason: Option<String>,
) -> Opportunity {
    let opp = Opportunity {
        opportunity_id: Uuid::new_v4(),
        detected_at: Utc::now(),
        strategy_tag: strategy_tag.to_string(),
        legs,
        profit_per_contract,
        profit_percent,
        max_size,
        total_profit_usd: profit_per_contract * max_size,
        confidence,
        status,
        skip_reason,
        scanner_id: scanner_id.to_string(),
    };
    opp.assert_invariants();
    opp
}

pub(crate) fn buy_leg(venue: Venue, market_id: &str, price: f64, size: f64) -> OpportunityLeg {
    OpportunityLeg { side: Side::Buy, venue, market_id: market_id.to_string(), target_price: price, max_size: size }
}

pub(crate) fn sell_leg(venue: Venue, market_id: &str, price: f64, size: f64) -> OpportunityLeg {
    OpportunityLeg { side: Side::Sell, venue, market_id: market_id.to_string(), target_price: price, max_size: size }
}
