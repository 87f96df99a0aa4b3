//! Executor (C5): turns approved Opportunities into Trades against live
//! Venue Clients.
//!
//! Grounded on `original_source/src/arbitrage/executor.py`'s gate order
//! (paused/circuit-breaker -> approval -> price-verification -> sizing)
//! and two-leg execution pattern (buy leg, await terminal status, then
//! sell leg sized to the actual fill; a filled-buy/failed-sell leaves an
//! open position and is logged CRITICAL rather than retried automatically).

use crate::config::Config;
use crate::error::ExecutorError;
use crate::models::{Opportunity, OpportunityLeg, RiskState, Side, Trade, TradeStatus};
use crate::store::Store;
use crate::venues::{OrderRequest, OrderStatus, VenueClient};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use uuid::Uuid;

pub struct Executor {
    store: Store,
    venues: HashMap<crate::models::Venue, Arc<dyn VenueClient>>,
    risk: Arc<RwLock<RiskState>>,
    config: Arc<RwLock<Config>>,
    pending_approval: RwLock<VecDeque<Opportunity>>,
}

impl Executor {
    pub fn new(
        store: Store,
        venues: HashMap<crate::models::Venue, Arc<dyn VenueClient>>,
        risk: Arc<RwLock<RiskState>>,
        config: Arc<RwLock<Config>>,
    ) -> Self {
        Self { store, venues, risk, config, pending_approval: RwLock::new(VecDeque::new()) }
    }

    /// Entry point: runs every gate, then either short-circuits to dry-run
    /// recording or performs the live two-leg execution.
    pub async fn execute(&self, opp: Opportunity) -> Result<(), ExecutorError> {
        self.check_circuit_breakers()?;

        if !self.check_approval(&opp) {
            self.pending_approval.write().push_back(opp);
            return Err(ExecutorError::NotApproved);
        }

        let verified = self.verify_price_and_size(&opp).await?;

        if self.config.read().dry_run {
            return self.execute_dry_run(&opp, verified).await;
        }

        self.execute_live(&opp, verified).await
    }

    fn check_circuit_breakers(&self) -> Result<(), ExecutorError> {
        let cfg = self.config.read();
        let risk = self.risk.read();
        if risk.paused {
            return Err(ExecutorError::CircuitBreakerTripped(
                risk.pause_reason.clone().unwrap_or_else(|| "paused".to_string()),
            ));
        }
        if risk.daily_pnl <= -cfg.max_daily_loss {
            return Err(ExecutorError::CircuitBreakerTripped("daily_loss_limit".to_string()));
        }
        if risk.consecutive_failures >= cfg.max_consecutive_failures {
            return Err(ExecutorError::CircuitBreakerTripped("consecutive_failures_limit".to_string()));
        }
        Ok(())
    }

    fn check_approval(&self, _opp: &Opportunity) -> bool {
        let mut risk = self.risk.write();
        if risk.trades_requiring_approval_seen < self.config.read().manual_approval_trades {
            risk.trades_requiring_approval_seen += 1;
            return false;
        }
        true
    }

    /// Re-checks current best prices against the recorded opportunity price
    /// within slippage tolerance, and re-sizes to current constraints.
    async fn verify_price_and_size(&self, opp: &Opportunity) -> Result<Vec<(OpportunityLeg, f64)>, ExecutorError> {
        let cfg = self.config.read().clone();
        let mut sized_legs = Vec::with_capacity(opp.legs.len());

        for leg in &opp.legs {
            let client = self.venues.get(&leg.venue).ok_or(ExecutorError::Venue(
                crate::error::VenueError::Unsupported { venue: leg.venue.as_str() },
            ))?;
            let ticker = client.get_ticker(&leg.market_id).await?;
            let current_price = match leg.side {
                Side::Buy => ticker.ask,
                Side::Sell => ticker.bid,
            };
            let drift_pct = (current_price - leg.target_price).abs() / leg.target_price.max(0.0001) * 100.0;
            if drift_pct > cfg.slippage_tolerance_pct {
                return Err(ExecutorError::SlippageExceeded);
            }

            let balance = client.get_balance("USD").await.map(|b| b.free).unwrap_or(0.0);
            let size = leg
                .max_size
                .min(cfg.max_trade_size / current_price.max(0.0001))
                .min(balance / current_price.max(0.0001));
            if size < 1.0 {
                return Err(ExecutorError::SizeTooSmall);
            }
            sized_legs.push((leg.clone(), size));
        }
        Ok(sized_legs)
    }

    async fn execute_dry_run(&self, opp: &Opportunity, sized_legs: Vec<(OpportunityLeg, f64)>) -> Result<(), ExecutorError> {
        let mut simulated_pnl = 0.0;
        for (leg, size) in &sized_legs {
            let trade = Trade {
                trade_id: Uuid::new_v4(),
                opportunity_id: opp.opportunity_id,
                venue: leg.venue,
                market_id: leg.market_id.clone(),
                side: leg.side,
                target_price: leg.target_price,
                requested_size: *size,
                status: TradeStatus::DryRun,
                filled_size: *size,
                fill_price: leg.target_price,
                venue_order_id: None,
                tx_hash: None,
                fees: 0.0,
                error_message: None,
                executed_at: Utc::now(),
            };
            simulated_pnl += match leg.side {
                Side::Sell => leg.target_price * size,
                Side::Buy => -leg.target_price * size,
            };
            let _ = self.store.log_trade(&trade).await;
        }
        self.risk.write().daily_pnl += simulated_pnl;
        Ok(())
    }

    async fn execute_live(&self, opp: &Opportunity, sized_legs: Vec<(OpportunityLeg, f64)>) -> Result<(), ExecutorError> {
        let Some((buy_leg, buy_size)) = sized_legs.iter().find(|(l, _)| l.side == Side::Buy) else {
            return Ok(());
        };

        let buy_client = self.venues.get(&buy_leg.venue).ok_or(ExecutorError::Venue(
            crate::error::VenueError::Unsupported { venue: buy_leg.venue.as_str() },
        ))?;
        let buy_ack = buy_client
            .create_order(OrderRequest { market_id: buy_leg.market_id.clone(), side: Side::Buy, price: buy_leg.target_price, size: *buy_size, ioc: true })
            .await?;

        let buy_trade = trade_from_ack(opp.opportunity_id, buy_leg, *buy_size, &buy_ack);
        let _ = self.store.log_live_trade(&buy_trade).await;

        if buy_ack.status != OrderStatus::Filled {
            self.risk.write().consecutive_failures += 1;
            return Err(ExecutorError::Venue(crate::error::VenueError::BadData {
                venue: buy_leg.venue.as_str(),
                reason: "buy leg did not fill".to_string(),
            }));
        }

        let Some((sell_leg, _)) = sized_legs.iter().find(|(l, _)| l.side == Side::Sell) else {
            // single-leg strategy (market-maker, grid, directional stock trades)
            self.risk.write().consecutive_failures = 0;
            return Ok(());
        };

        let sell_client = self.venues.get(&sell_leg.venue).ok_or(ExecutorError::Venue(
            crate::error::VenueError::Unsupported { venue: sell_leg.venue.as_str() },
        ))?;
        let sell_result = sell_client
            .create_order(OrderRequest {
                market_id: sell_leg.market_id.clone(),
                side: Side::Sell,
                price: sell_leg.target_price,
                size: buy_ack.filled_size,
                ioc: true,
            })
            .await;

        match sell_result {
            Ok(sell_ack) if sell_ack.status == OrderStatus::Filled => {
                let sell_trade = trade_from_ack(opp.opportunity_id, sell_leg, buy_ack.filled_size, &sell_ack);
                let _ = self.store.log_live_trade(&sell_trade).await;

                let buy_value = buy_ack.fill_price * buy_ack.filled_size;
                let sell_value = sell_ack.fill_price * sell_ack.filled_size;
                let realized_pnl = sell_value - buy_value;
                self.risk.write().daily_pnl += realized_pnl;
                self.risk.write().consecutive_failures = 0;
                Ok(())
            }
            other => {
                tracing::error!(
                    opportunity_id = %opp.opportunity_id,
                    buy_filled_size = buy_ack.filled_size,
                    error = ?other.as_ref().err(),
                    "sell leg failed after buy leg filled; position is open and requires manual unwind"
                );
                self.store
                    .append_audit(
                        "one_legged_fill",
                        serde_json::json!({
                            "opportunity_id": opp.opportunity_id,
                            "venue": sell_leg.venue.as_str(),
                            "market_id": sell_leg.market_id,
                            "open_size": buy_ack.filled_size,
                        }),
                    )
                    .await;
                Err(ExecutorError::OneLeggedFill(format!(
                    "{} {} open at size {}",
                    sell_leg.venue.as_str(),
                    sell_leg.market_id,
                    buy_ack.filled_size
                )))
            }
        }
    }

    pub fn approve(&self, opportunity_id: Uuid) -> Option<Opportunity> {
        let mut q = self.pending_approval.write();
        let idx = q.iter().position(|o| o.opportunity_id == opportunity_id)?;
        q.remove(idx)
    }

    pub fn reject(&self, opportunity_id: Uuid) -> bool {
        let mut q = self.pending_approval.write();
        let before = q.len();
        q.retain(|o| o.opportunity_id != opportunity_id);
        q.len() != before
    }

    /// Resuming after a pause clears consecutive-failures and the paused flag.
    pub fn resume(&self) {
        let mut risk = self.risk.write();
        risk.paused = false;
        risk.pause_reason = None;
        risk.consecutive_failures = 0;
    }
}

fn trade_from_ack(opportunity_id: Uuid, leg: &OpportunityLeg, requested_size: f64, ack: &crate::venues::OrderAck) -> Trade {
    Trade {
        trade_id: Uuid::new_v4(),
        opportunity_id,
        venue: leg.venue,
        market_id: leg.market_id.clone(),
        side: leg.side,
        target_price: leg.target_price,
        requested_size,
        status: match ack.status {
            OrderStatus::Filled => TradeStatus::Filled,
            OrderStatus::PartiallyFilled => TradeStatus::PartiallyFilled,
            OrderStatus::Cancelled => TradeStatus::Cancelled,
            OrderStatus::Rejected => TradeStatus::Failed,
            OrderStatus::Open => TradeStatus::Submitted,
        },
        filled_size: ack.filled_size,
        fill_price: ack.fill_price,
        venue_order_id: Some(ack.venue_order_id.clone()),
        tx_hash: None,
        fees: 0.0,
        error_message: None,
        executed_at: Utc::now(),
    }
}
