//! Store (C2): a typed wrapper over the shared managed Postgres.
//!
//! Grounded on `src/database/client.py`'s `Database` class for the public
//! operation surface (table names, method names) and on the teacher's
//! `vault/vault_db.rs` for the "one struct wraps one pooled connection,
//! exposes typed async methods per table" shape — the connection type
//! changes (rusqlite -> sqlx::PgPool) because the spec requires a managed
//! Postgres backend with row-level security, which SQLite cannot provide.
//!
//! Every tenant-scoped method sets `app.current_tenant_id` with `SET LOCAL`
//! inside the same transaction as the query, so Postgres RLS policies (not
//! application code) are the actual enforcement boundary. This is a
//! deliberate divergence from the Python original, which used a
//! `SUPABASE_SERVICE_ROLE_KEY` that bypasses RLS entirely — recorded in
//! DESIGN.md as an Open Question resolution.

pub mod log_sink;

use crate::error::StoreError;
use crate::models::*;
use crate::vault::Vault;
use chrono::Utc;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// A tenant-scoped or system-scoped handle onto the shared pool. Cheap to
/// clone — cloning shares the underlying `PgPool`.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
    vault: Arc<Vault>,
    tenant_id: Option<Uuid>,
}

impl Store {
    pub async fn connect(database_url: &str, vault: Arc<Vault>) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool, vault, tenant_id: None })
    }

    /// Returns a handle scoped to `tenant_id`; used by the Tenant Runtime so
    /// every subsequent query carries RLS scoping automatically.
    pub fn for_tenant(&self, tenant_id: Uuid) -> Self {
        Self { pool: self.pool.clone(), vault: self.vault.clone(), tenant_id: Some(tenant_id) }
    }

    pub fn tenant_id(&self) -> Option<Uuid> {
        self.tenant_id
    }

    /// Exposes the underlying pool for callers that need to wire it into
    /// something outside the Store's own method surface (the audit log sink).
    pub fn raw_pool(&self) -> PgPool {
        self.pool.clone()
    }

    async fn begin_scoped(&self) -> Result<Transaction<'_, Postgres>, StoreError> {
        let mut tx = self.pool.begin().await?;
        if let Some(tid) = self.tenant_id {
            sqlx::query("SELECT set_config('app.current_tenant_id', $1, true)")
                .bind(tid.to_string())
                .execute(&mut *tx)
                .await?;
        }
        Ok(tx)
    }

    // ---- Registry ----------------------------------------------------

    /// `ActiveTenants() -> [tenant-id]`. Used only by the Supervisor; not
    /// tenant-scoped — reads the whole registry.
    pub async fn active_tenants(&self) -> Result<Vec<Uuid>, StoreError> {
        let rows: Vec<(Uuid,)> =
            sqlx::query_as("SELECT tenant_id FROM bot_status WHERE is_running = true")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    // ---- Opportunities -------------------------------------------------

    pub async fn log_opportunity(&self, opp: &Opportunity) -> Result<(), StoreError> {
        let mut tx = self.begin_scoped().await?;
        sqlx::query(
            "INSERT INTO opportunities
             (opportunity_id, tenant_id, detected_at, strategy_tag, legs, profit_per_contract,
              profit_percent, max_size, total_profit_usd, confidence, status, skip_reason, scanner_id)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)",
        )
        .bind(opp.opportunity_id)
        .bind(self.tenant_id)
        .bind(opp.detected_at)
        .bind(&opp.strategy_tag)
        .bind(serde_json::to_value(&opp.legs)?)
        .bind(opp.profit_per_contract)
        .bind(opp.profit_percent)
        .bind(opp.max_size)
        .bind(opp.total_profit_usd)
        .bind(opp.confidence)
        .bind(status_str(opp.status))
        .bind(&opp.skip_reason)
        .bind(&opp.scanner_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn update_opportunity_status(
        &self,
        id: Uuid,
        status: OpportunityStatus,
        reason: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut tx = self.begin_scoped().await?;
        sqlx::query(
            "UPDATE opportunities SET status=$1, skip_reason=$2, executed_at=$3 WHERE opportunity_id=$4",
        )
        .bind(status_str(status))
        .bind(reason)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn recent_opportunities(&self, limit: i64) -> Result<Vec<Opportunity>, StoreError> {
        let mut tx = self.begin_scoped().await?;
        let rows: Vec<(Uuid, chrono::DateTime<Utc>, String, Value, f64, f64, f64, f64, f64, String, Option<String>, String)> =
            sqlx::query_as(
                "SELECT opportunity_id, detected_at, strategy_tag, legs, profit_per_contract,
                        profit_percent, max_size, total_profit_usd, confidence, status, skip_reason, scanner_id
                 FROM opportunities
                 WHERE tenant_id = current_setting('app.current_tenant_id', true)::uuid
                 ORDER BY detected_at DESC
                 LIMIT $1",
            )
            .bind(limit)
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;

        rows.into_iter()
            .map(
                |(
                    opportunity_id,
                    detected_at,
                    strategy_tag,
                    legs,
                    profit_per_contract,
                    profit_percent,
                    max_size,
                    total_profit_usd,
                    confidence,
                    status,
                    skip_reason,
                    scanner_id,
                )| {
                    Ok(Opportunity {
                        opportunity_id,
                        detected_at,
                        strategy_tag,
                        legs: serde_json::from_value(legs)?,
                        profit_per_contract,
                        profit_percent,
                        max_size,
                        total_profit_usd,
                        confidence,
                        status: status_from_str(&status)?,
                        skip_reason,
                        scanner_id,
                    })
                },
            )
            .collect()
    }

    // ---- Trades --------------------------------------------------------

    pub async fn log_trade(&self, trade: &Trade) -> Result<(), StoreError> {
        let mut tx = self.begin_scoped().await?;
        sqlx::query(
            "INSERT INTO trades
             (trade_id, tenant_id, opportunity_id, venue, market_id, side, target_price,
              requested_size, status, filled_size, fill_price, venue_order_id, tx_hash, fees,
              error_message, executed_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16)",
        )
        .bind(trade.trade_id)
        .bind(self.tenant_id)
        .bind(trade.opportunity_id)
        .bind(trade.venue.as_str())
        .bind(&trade.market_id)
        .bind(side_str(trade.side))
        .bind(trade.target_price)
        .bind(trade.requested_size)
        .bind(trade_status_str(trade.status))
        .bind(trade.filled_size)
        .bind(trade.fill_price)
        .bind(&trade.venue_order_id)
        .bind(&trade.tx_hash)
        .bind(trade.fees)
        .bind(&trade.error_message)
        .bind(trade.executed_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// `LogLiveTrade`: same row shape as `log_trade`, named distinctly so
    /// callers can tell a submitted live order apart from a dry-run record
    /// at the call site (both land in the same `trades` table).
    pub async fn log_live_trade(&self, trade: &Trade) -> Result<(), StoreError> {
        self.log_trade(trade).await
    }

    /// Sum across today's filled trades: sell adds, buy subtracts, fees subtract.
    pub async fn daily_pnl(&self) -> Result<f64, StoreError> {
        let mut tx = self.begin_scoped().await?;
        let row: (Option<f64>,) = sqlx::query_as(
            "SELECT SUM(CASE WHEN side='sell' THEN fill_price*filled_size
                              WHEN side='buy' THEN -(fill_price*filled_size)
                              ELSE 0 END - fees)
             FROM trades
             WHERE tenant_id = current_setting('app.current_tenant_id', true)::uuid
               AND status = 'filled'
               AND executed_at >= date_trunc('day', now())",
        )
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(row.0.unwrap_or(0.0))
    }

    pub async fn recent_trades(&self, limit: i64) -> Result<Vec<Trade>, StoreError> {
        let mut tx = self.begin_scoped().await?;
        #[allow(clippy::type_complexity)]
        let rows: Vec<(
            Uuid,
            Uuid,
            String,
            String,
            String,
            f64,
            f64,
            String,
            f64,
            f64,
            Option<String>,
            Option<String>,
            f64,
            Option<String>,
            chrono::DateTime<Utc>,
        )> = sqlx::query_as(
            "SELECT trade_id, opportunity_id, venue, market_id, side, target_price, requested_size,
                    status, filled_size, fill_price, venue_order_id, tx_hash, fees, error_message, executed_at
             FROM trades
             WHERE tenant_id = current_setting('app.current_tenant_id', true)::uuid
             ORDER BY executed_at DESC
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        rows.into_iter()
            .map(
                |(
                    trade_id,
                    opportunity_id,
                    venue,
                    market_id,
                    side,
                    target_price,
                    requested_size,
                    status,
                    filled_size,
                    fill_price,
                    venue_order_id,
                    tx_hash,
                    fees,
                    error_message,
                    executed_at,
                )| {
                    Ok(Trade {
                        trade_id,
                        opportunity_id,
                        venue: venue_from_str(&venue)?,
                        market_id,
                        side: side_from_str(&side)?,
                        target_price,
                        requested_size,
                        status: trade_status_from_str(&status)?,
                        filled_size,
                        fill_price,
                        venue_order_id,
                        tx_hash,
                        fees,
                        error_message,
                        executed_at,
                    })
                },
            )
            .collect()
    }

    // ---- Paper -----------------------------------------------------------

    pub async fn log_paper_trade(&self, pt: &PaperTrade) -> Result<(), StoreError> {
        let mut tx = self.begin_scoped().await?;
        sqlx::query(
            "INSERT INTO simulated_trades
             (paper_trade_id, tenant_id, arbitrage_type, market_a_venue, market_a_id,
              market_b_venue, market_b_id, original_spread_pct, executed_spread_pct,
              simulated_slippage_pct, simulated_fees_usd, position_size_usd, net_profit_usd,
              outcome, outcome_reason, created_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16)",
        )
        .bind(pt.paper_trade_id)
        .bind(pt.tenant_id)
        .bind(&pt.arbitrage_type)
        .bind(pt.market_a_venue.as_str())
        .bind(&pt.market_a_id)
        .bind(pt.market_b_venue.as_str())
        .bind(&pt.market_b_id)
        .bind(pt.original_spread_pct)
        .bind(pt.executed_spread_pct)
        .bind(pt.simulated_slippage_pct)
        .bind(pt.simulated_fees_usd)
        .bind(pt.position_size_usd)
        .bind(pt.net_profit_usd)
        .bind(outcome_str(pt.outcome))
        .bind(&pt.outcome_reason)
        .bind(pt.created_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Upserts the tenant's single stats-snapshot anchor row. Must never
    /// create a second row for the same tenant (§9 Design Notes).
    pub async fn upsert_stats_snapshot(&self, snap: &StatsSnapshot) -> Result<(), StoreError> {
        let mut tx = self.begin_scoped().await?;
        sqlx::query(
            "INSERT INTO simulation_stats
             (tenant_id, balance_usd, total_pnl_usd, trade_count, win_count, loss_count,
              total_fees_usd, best_trade_usd, worst_trade_usd, updated_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
             ON CONFLICT (tenant_id) DO UPDATE SET
               balance_usd = EXCLUDED.balance_usd,
               total_pnl_usd = EXCLUDED.total_pnl_usd,
               trade_count = EXCLUDED.trade_count,
               win_count = EXCLUDED.win_count,
               loss_count = EXCLUDED.loss_count,
               total_fees_usd = EXCLUDED.total_fees_usd,
               best_trade_usd = EXCLUDED.best_trade_usd,
               worst_trade_usd = EXCLUDED.worst_trade_usd,
               updated_at = EXCLUDED.updated_at",
        )
        .bind(snap.tenant_id)
        .bind(snap.balance_usd)
        .bind(snap.total_pnl_usd)
        .bind(snap.trade_count as i64)
        .bind(snap.win_count as i64)
        .bind(snap.loss_count as i64)
        .bind(snap.total_fees_usd)
        .bind(snap.best_trade_usd)
        .bind(snap.worst_trade_usd)
        .bind(snap.updated_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Data-integrity self-check: compares the stats-snapshot trade-count
    /// against the actual row count in `simulated_trades`.
    pub async fn check_stats_integrity(&self, snap_trade_count: u64) -> Result<bool, StoreError> {
        let mut tx = self.begin_scoped().await?;
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM simulated_trades
             WHERE tenant_id = current_setting('app.current_tenant_id', true)::uuid
               AND outcome != 'rejected_false_positive'",
        )
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        let actual = row.0 as u64;
        if snap_trade_count == 0 && actual == 0 {
            return Ok(true);
        }
        let diff = (actual as f64 - snap_trade_count as f64).abs();
        let base = actual.max(snap_trade_count).max(1) as f64;
        Ok(diff / base <= 0.5)
    }

    // ---- Secrets ---------------------------------------------------------

    /// Joins rows from the secrets table and decrypts via Vault.
    pub async fn load_secrets(
        &self,
        force_refresh: bool,
    ) -> Result<HashMap<String, String>, StoreError> {
        let _ = force_refresh; // caching is the Tenant Runtime's concern, not the Store's
        let mut tx = self.begin_scoped().await?;
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT key_name, ciphertext FROM secrets
             WHERE tenant_id = current_setting('app.current_tenant_id', true)::uuid",
        )
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let mut out = HashMap::with_capacity(rows.len());
        for (key_name, ciphertext) in rows {
            let plaintext = self.vault.decrypt(&ciphertext)?;
            out.insert(key_name, plaintext);
        }
        Ok(out)
    }

    // ---- Config ------------------------------------------------------

    pub async fn load_config(&self) -> Result<HashMap<String, Value>, StoreError> {
        let mut tx = self.begin_scoped().await?;
        let row: Option<(Value,)> = sqlx::query_as(
            "SELECT data FROM config
             WHERE tenant_id = current_setting('app.current_tenant_id', true)::uuid",
        )
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(match row {
            Some((Value::Object(map),)) => map.into_iter().collect(),
            _ => HashMap::new(),
        })
    }

    pub async fn set_config(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut tx = self.begin_scoped().await?;
        sqlx::query(
            "INSERT INTO config (tenant_id, data, updated_at)
             VALUES (current_setting('app.current_tenant_id', true)::uuid, jsonb_build_object($1::text, $2::jsonb), now())
             ON CONFLICT (tenant_id) DO UPDATE SET
               data = config.data || jsonb_build_object($1::text, $2::jsonb),
               updated_at = now()",
        )
        .bind(key)
        .bind(value)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    // ---- Status ------------------------------------------------------

    pub async fn update_bot_status(&self, running: bool, mode: TradingMode) -> Result<(), StoreError> {
        let mut tx = self.begin_scoped().await?;
        sqlx::query(
            "INSERT INTO bot_status (tenant_id, is_running, mode, last_heartbeat)
             VALUES (current_setting('app.current_tenant_id', true)::uuid, $1, $2, now())
             ON CONFLICT (tenant_id) DO UPDATE SET
               is_running = EXCLUDED.is_running, mode = EXCLUDED.mode, last_heartbeat = now()",
        )
        .bind(running)
        .bind(mode_str(mode))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn heartbeat(&self) -> Result<(), StoreError> {
        let mut tx = self.begin_scoped().await?;
        sqlx::query(
            "UPDATE bot_status SET last_heartbeat = now()
             WHERE tenant_id = current_setting('app.current_tenant_id', true)::uuid",
        )
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_bot_status(&self) -> Result<Option<BotStatus>, StoreError> {
        let mut tx = self.begin_scoped().await?;
        let row: Option<(Uuid, bool, String, chrono::DateTime<Utc>)> = sqlx::query_as(
            "SELECT tenant_id, is_running, mode, last_heartbeat FROM bot_status
             WHERE tenant_id = current_setting('app.current_tenant_id', true)::uuid",
        )
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;

        row.map(|(tenant_id, is_running, mode, last_heartbeat)| {
            Ok(BotStatus { tenant_id, is_running, mode: mode_from_str(&mode)?, last_heartbeat })
        })
        .transpose()
    }

    // ---- Audit -----------------------------------------------------------

    /// `Append(tenant-id, action, details)`. Failure is logged, never raised —
    /// audit-write failures must never fail the primary action.
    pub async fn append_audit(&self, action: &str, details: Value) {
        let result = async {
            let mut tx = self.begin_scoped().await?;
            sqlx::query(
                "INSERT INTO audit_logs (tenant_id, action, details, created_at) VALUES ($1,$2,$3,$4)",
            )
            .bind(self.tenant_id)
            .bind(action)
            .bind(details)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            Ok::<(), StoreError>(())
        }
        .await;

        if let Err(e) = result {
            tracing::error!(error = %e, action, "audit write failed; degrading silently");
        }
    }

    // ---- Whale registry (supplement) -------------------------------------

    pub async fn upsert_tracked_whale(&self, whale: &TrackedWhale) -> Result<(), StoreError> {
        let mut tx = self.begin_scoped().await?;
        sqlx::query(
            "INSERT INTO tracked_whales (tenant_id, address, tier, win_rate, volume_usd_30d, trade_count, updated_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7)
             ON CONFLICT (tenant_id, address) DO UPDATE SET
               tier = EXCLUDED.tier, win_rate = EXCLUDED.win_rate,
               volume_usd_30d = EXCLUDED.volume_usd_30d, trade_count = EXCLUDED.trade_count,
               updated_at = EXCLUDED.updated_at",
        )
        .bind(self.tenant_id)
        .bind(&whale.address)
        .bind(tier_str(whale.tier))
        .bind(whale.win_rate)
        .bind(whale.volume_usd_30d)
        .bind(whale.trade_count as i64)
        .bind(whale.updated_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }
}

fn status_str(s: OpportunityStatus) -> &'static str {
    match s {
        OpportunityStatus::Detected => "detected",
        OpportunityStatus::Skipped => "skipped",
        OpportunityStatus::Executed => "executed",
        OpportunityStatus::Missed => "missed",
        OpportunityStatus::Failed => "failed",
    }
}

fn status_from_str(s: &str) -> Result<OpportunityStatus, StoreError> {
    match s {
        "detected" => Ok(OpportunityStatus::Detected),
        "skipped" => Ok(OpportunityStatus::Skipped),
        "executed" => Ok(OpportunityStatus::Executed),
        "missed" => Ok(OpportunityStatus::Missed),
        "failed" => Ok(OpportunityStatus::Failed),
        other => Err(StoreError::Decode { field: "status", value: other.to_string() }),
    }
}

fn venue_from_str(s: &str) -> Result<Venue, StoreError> {
    match s {
        "polymarket" => Ok(Venue::Polymarket),
        "kalshi" => Ok(Venue::Kalshi),
        "binance" => Ok(Venue::Binance),
        "coinbase_advanced" => Ok(Venue::CoinbaseAdvanced),
        "kraken" => Ok(Venue::Kraken),
        "bybit" => Ok(Venue::Bybit),
        "okx" => Ok(Venue::Okx),
        "kucoin" => Ok(Venue::Kucoin),
        "alpaca" => Ok(Venue::Alpaca),
        "ibkr" => Ok(Venue::Ibkr),
        other => Err(StoreError::Decode { field: "venue", value: other.to_string() }),
    }
}

fn side_str(s: Side) -> &'static str {
    match s {
        Side::Buy => "buy",
        Side::Sell => "sell",
    }
}

fn side_from_str(s: &str) -> Result<Side, StoreError> {
    match s {
        "buy" => Ok(Side::Buy),
        "sell" => Ok(Side::Sell),
        other => Err(StoreError::Decode { field: "side", value: other.to_string() }),
    }
}

fn trade_status_str(s: TradeStatus) -> &'static str {
    match s {
        TradeStatus::Pending => "pending",
        TradeStatus::Submitted => "submitted",
        TradeStatus::Filled => "filled",
        TradeStatus::PartiallyFilled => "partially_filled",
        TradeStatus::Cancelled => "cancelled",
        TradeStatus::Failed => "failed",
        TradeStatus::DryRun => "dry_run",
    }
}

fn trade_status_from_str(s: &str) -> Result<TradeStatus, StoreError> {
    match s {
        "pending" => Ok(TradeStatus::Pending),
        "submitted" => Ok(TradeStatus::Submitted),
        "filled" => Ok(TradeStatus::Filled),
        "partially_filled" => Ok(TradeStatus::PartiallyFilled),
        "cancelled" => Ok(TradeStatus::Cancelled),
        "failed" => Ok(TradeStatus::Failed),
        "dry_run" => Ok(TradeStatus::DryRun),
        other => Err(StoreError::Decode { field: "trade_status", value: other.to_string() }),
    }
}

fn outcome_str(o: PaperOutcome) -> &'static str {
    match o {
        PaperOutcome::Pending => "pending",
        PaperOutcome::Won => "won",
        PaperOutcome::Lost => "lost",
        PaperOutcome::FailedExecution => "failed_execution",
        PaperOutcome::PartialFill => "partial_fill",
        PaperOutcome::Expired => "expired",
        PaperOutcome::RejectedFalsePositive => "rejected_false_positive",
    }
}

fn tier_str(t: WhaleTier) -> &'static str {
    match t {
        WhaleTier::Retail => "retail",
        WhaleTier::SmartMoney => "smart_money",
        WhaleTier::Whale => "whale",
        WhaleTier::MegaWhale => "mega_whale",
    }
}

fn mode_str(m: TradingMode) -> &'static str {
    match m {
        TradingMode::Paper => "paper",
        TradingMode::Live => "live",
    }
}

fn mode_from_str(s: &str) -> Result<TradingMode, StoreError> {
    match s {
        "paper" => Ok(TradingMode::Paper),
        "live" => Ok(TradingMode::Live),
        other => Err(StoreError::Decode { field: "mode", value: other.to_string() }),
    }
}
