//! Config Resolver (C9).
//!
//! For each recognized key, resolution priority is: tenant row (DB) → env
//! var → compile-time default, matching `src/config.py`'s
//! `_get_bool`/`_get_float`/`_get_int`/`_get_str` helpers in the source this
//! was ported from. `Config` is a typed aggregate, not a dict — the merged
//! precedence is the contract, the struct is just its representation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::env;

/// A tenant-row config snapshot as loaded from the `config` table (one JSON
/// blob per tenant, keyed by the same names as the env vars below).
pub type TenantConfigRow = HashMap<String, Value>;

fn resolve_bool(row: &TenantConfigRow, key: &str, env_key: &str, default: bool) -> bool {
    if let Some(v) = row.get(key) {
        if let Some(b) = v.as_bool() {
            return b;
        }
        if let Some(s) = v.as_str() {
            return coerce_bool(s, default);
        }
    }
    if let Ok(s) = env::var(env_key) {
        return coerce_bool(&s, default);
    }
    default
}

fn coerce_bool(s: &str, default: bool) -> bool {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn resolve_f64(row: &TenantConfigRow, key: &str, env_key: &str, default: f64) -> f64 {
    if let Some(v) = row.get(key) {
        if let Some(n) = v.as_f64() {
            return n;
        }
        if let Some(s) = v.as_str() {
            if let Ok(n) = s.parse() {
                return n;
            }
        }
    }
    if let Ok(s) = env::var(env_key) {
        if let Ok(n) = s.parse() {
            return n;
        }
    }
    default
}

fn resolve_i64(row: &TenantConfigRow, key: &str, env_key: &str, default: i64) -> i64 {
    if let Some(v) = row.get(key) {
        if let Some(n) = v.as_i64() {
            return n;
        }
        if let Some(s) = v.as_str() {
            if let Ok(n) = s.parse() {
                return n;
            }
        }
    }
    if let Ok(s) = env::var(env_key) {
        if let Ok(n) = s.parse() {
            return n;
        }
    }
    default
}

fn resolve_string(row: &TenantConfigRow, key: &str, env_key: &str, default: &str) -> String {
    if let Some(v) = row.get(key) {
        if let Some(s) = v.as_str() {
            return s.to_string();
        }
    }
    if let Ok(s) = env::var(env_key) {
        return s;
    }
    default.to_string()
}

fn resolve_csv(row: &TenantConfigRow, key: &str, env_key: &str, default: &str) -> Vec<String> {
    resolve_string(row, key, env_key, default)
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Per-strategy toggles and thresholds, grouped the way the original
/// `TradingConfig` dataclass groups them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinglePlatformConfig {
    pub enabled: bool,
    pub min_profit_pct: f64,
    pub max_spread_pct: f64,
    pub max_position_usd: f64,
    pub scan_interval_sec: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossPlatformConfig {
    pub enabled: bool,
    pub min_profit_buy_zero_fee_pct: f64,
    pub min_profit_buy_high_fee_pct: f64,
    pub max_position_usd: f64,
    pub scan_interval_sec: u64,
    pub min_confidence: f64,
    pub max_data_age_sec: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketMakerConfig {
    pub enabled: bool,
    pub target_spread_bps: i64,
    pub order_size_usd: f64,
    pub max_inventory_usd: f64,
    pub inventory_skew_factor: f64,
    pub quote_refresh_sec: u64,
    pub min_volume_24h: f64,
    pub max_markets: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingRateConfig {
    pub enabled: bool,
    pub min_apy: f64,
    pub exit_threshold_pct: f64,
    pub max_position_usd: f64,
    pub min_position_usd: f64,
    pub max_positions: i64,
    pub max_basis_pct: f64,
    pub max_leverage: i64,
    pub scan_interval_sec: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    pub enabled: bool,
    pub default_range_pct: f64,
    pub default_levels: i64,
    pub default_investment_usd: f64,
    pub max_grids: i64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub check_interval_sec: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairsConfig {
    pub enabled: bool,
    pub entry_zscore: f64,
    pub exit_zscore: f64,
    pub stop_loss_zscore: f64,
    pub position_size_usd: f64,
    pub max_positions: i64,
    pub max_hold_hours: f64,
    pub scan_interval_sec: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockStrategyConfig {
    pub enabled: bool,
    pub entry_zscore: f64,
    pub exit_zscore: f64,
    pub stop_loss_pct: f64,
    pub position_size_usd: f64,
    pub max_positions: i64,
    pub scan_interval_sec: u64,
    pub watchlist: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueEnablement {
    pub polymarket: bool,
    pub kalshi: bool,
    pub binance: bool,
    pub bybit: bool,
    pub okx: bool,
    pub kraken: bool,
    pub coinbase: bool,
    pub kucoin: bool,
    pub alpaca: bool,
    pub ibkr: bool,
}

/// Total function of keys to values, resolved at startup and on reload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Global trading guards
    pub dry_run: bool,
    pub simulation_starting_balance: f64,
    pub max_trade_size: f64,
    pub max_daily_loss: f64,
    pub max_consecutive_failures: u32,
    pub slippage_tolerance_pct: f64,
    pub scan_interval_sec: f64,
    pub manual_approval_trades: u32,
    pub allow_plaintext_secrets: bool,
    pub skip_same_platform_overlap: bool,

    pub poly_single: SinglePlatformConfig,
    pub kalshi_single: SinglePlatformConfig,
    pub cross_platform: CrossPlatformConfig,
    pub market_maker: MarketMakerConfig,
    pub funding_rate: FundingRateConfig,
    pub grid: GridConfig,
    pub pairs: PairsConfig,
    pub stock_mean_reversion: StockStrategyConfig,
    pub stock_momentum: StockStrategyConfig,

    pub venues: VenueEnablement,
}

impl Config {
    /// Resolve a full snapshot from a tenant config row, falling back to
    /// environment variables, falling back to the defaults embedded below.
    pub fn resolve(row: &TenantConfigRow) -> Self {
        Self {
            dry_run: resolve_bool(row, "dry_run", "DRY_RUN", true),
            simulation_starting_balance: resolve_f64(
                row,
                "simulation_starting_balance",
                "SIMULATION_STARTING_BALANCE",
                5000.0,
            ),
            max_trade_size: resolve_f64(row, "max_trade_size", "MAX_TRADE_SIZE", 100.0),
            max_daily_loss: resolve_f64(row, "max_daily_loss", "MAX_DAILY_LOSS", 50.0),
            max_consecutive_failures: resolve_i64(
                row,
                "max_consecutive_failures",
                "MAX_CONSECUTIVE_FAILURES",
                3,
            ) as u32,
            slippage_tolerance_pct: resolve_f64(
                row,
                "slippage_tolerance",
                "SLIPPAGE_TOLERANCE",
                0.5,
            ),
            scan_interval_sec: resolve_f64(row, "scan_interval", "SCAN_INTERVAL", 2.0),
            manual_approval_trades: resolve_i64(
                row,
                "manual_approval_trades",
                "MANUAL_APPROVAL_TRADES",
                10,
            ) as u32,
            allow_plaintext_secrets: resolve_bool(
                row,
                "allow_plaintext_secrets",
                "ALLOW_PLAINTEXT_SECRETS",
                false,
            ),
            skip_same_platform_overlap: resolve_bool(
                row,
                "skip_same_platform_overlap",
                "SKIP_SAME_PLATFORM_OVERLAP",
                true,
            ),
            poly_single: SinglePlatformConfig {
                enabled: resolve_bool(row, "enable_polymarket_single_arb", "ENABLE_POLYMARKET_SINGLE_ARB", true),
                min_profit_pct: resolve_f64(row, "poly_single_min_profit_pct", "POLY_SINGLE_MIN_PROFIT_PCT", 0.3),
                max_spread_pct: resolve_f64(row, "poly_single_max_spread_pct", "POLY_SINGLE_MAX_SPREAD_PCT", 12.0),
                max_position_usd: resolve_f64(row, "poly_single_max_position_usd", "POLY_SINGLE_MAX_POSITION_USD", 100.0),
                scan_interval_sec: resolve_i64(row, "poly_single_scan_interval_sec", "POLY_SINGLE_SCAN_INTERVAL_SEC", 5) as u64,
            },
            kalshi_single: SinglePlatformConfig {
                enabled: resolve_bool(row, "enable_kalshi_single_arb", "ENABLE_KALSHI_SINGLE_ARB", true),
                min_profit_pct: resolve_f64(row, "kalshi_single_min_profit_pct", "KALSHI_SINGLE_MIN_PROFIT_PCT", 8.0),
                max_spread_pct: resolve_f64(row, "kalshi_single_max_spread_pct", "KALSHI_SINGLE_MAX_SPREAD_PCT", 15.0),
                max_position_usd: resolve_f64(row, "kalshi_single_max_position_usd", "KALSHI_SINGLE_MAX_POSITION_USD", 30.0),
                scan_interval_sec: resolve_i64(row, "kalshi_single_scan_interval_sec", "KALSHI_SINGLE_SCAN_INTERVAL_SEC", 5) as u64,
            },
            cross_platform: CrossPlatformConfig {
                enabled: resolve_bool(row, "enable_cross_platform_arb", "ENABLE_CROSS_PLATFORM_ARB", true),
                min_profit_buy_zero_fee_pct: resolve_f64(row, "cross_plat_min_profit_buy_poly_pct", "CROSS_PLAT_MIN_PROFIT_BUY_POLY_PCT", 3.0),
                min_profit_buy_high_fee_pct: resolve_f64(row, "cross_plat_min_profit_buy_kalshi_pct", "CROSS_PLAT_MIN_PROFIT_BUY_KALSHI_PCT", 5.0),
                max_position_usd: resolve_f64(row, "cross_plat_max_position_usd", "CROSS_PLAT_MAX_POSITION_USD", 75.0),
                scan_interval_sec: resolve_i64(row, "cross_plat_scan_interval_sec", "CROSS_PLAT_SCAN_INTERVAL_SEC", 10) as u64,
                min_confidence: resolve_f64(row, "cross_plat_min_confidence", "CROSS_PLAT_MIN_CONFIDENCE", 0.5),
                max_data_age_sec: resolve_f64(row, "cross_plat_max_data_age_sec", "CROSS_PLAT_MAX_DATA_AGE_SEC", 10.0),
            },
            market_maker: MarketMakerConfig {
                enabled: resolve_bool(row, "enable_market_making", "ENABLE_MARKET_MAKING", false),
                target_spread_bps: resolve_i64(row, "mm_target_spread_bps", "MM_TARGET_SPREAD_BPS", 200),
                order_size_usd: resolve_f64(row, "mm_order_size_usd", "MM_ORDER_SIZE_USD", 50.0),
                max_inventory_usd: resolve_f64(row, "mm_max_inventory_usd", "MM_MAX_INVENTORY_USD", 500.0),
                inventory_skew_factor: resolve_f64(row, "mm_inventory_skew_factor", "MM_INVENTORY_SKEW_FACTOR", 0.1),
                quote_refresh_sec: resolve_i64(row, "mm_quote_refresh_sec", "MM_QUOTE_REFRESH_SEC", 5) as u64,
                min_volume_24h: resolve_f64(row, "mm_min_volume_24h", "MM_MIN_VOLUME_24H", 10000.0),
                max_markets: resolve_i64(row, "mm_max_markets", "MM_MAX_MARKETS", 5),
            },
            funding_rate: FundingRateConfig {
                enabled: resolve_bool(row, "enable_funding_rate_arb", "ENABLE_FUNDING_RATE_ARB", false),
                min_apy: resolve_f64(row, "funding_min_apy", "FUNDING_MIN_APY", 30.0),
                exit_threshold_pct: resolve_f64(row, "funding_exit_threshold", "FUNDING_EXIT_THRESHOLD", 0.01),
                max_position_usd: resolve_f64(row, "funding_max_position_usd", "FUNDING_MAX_POSITION_USD", 1000.0),
                min_position_usd: resolve_f64(row, "funding_min_position_usd", "FUNDING_MIN_POSITION_USD", 100.0),
                max_positions: resolve_i64(row, "funding_max_positions", "FUNDING_MAX_POSITIONS", 3),
                max_basis_pct: resolve_f64(row, "funding_max_basis_pct", "FUNDING_MAX_BASIS_PCT", 1.0),
                max_leverage: resolve_i64(row, "funding_max_leverage", "FUNDING_MAX_LEVERAGE", 3),
                scan_interval_sec: resolve_i64(row, "funding_scan_interval_sec", "FUNDING_SCAN_INTERVAL_SEC", 300) as u64,
            },
            grid: GridConfig {
                enabled: resolve_bool(row, "enable_grid_trading", "ENABLE_GRID_TRADING", false),
                default_range_pct: resolve_f64(row, "grid_default_range_pct", "GRID_DEFAULT_RANGE_PCT", 10.0),
                default_levels: resolve_i64(row, "grid_default_levels", "GRID_DEFAULT_LEVELS", 20),
                default_investment_usd: resolve_f64(row, "grid_default_investment_usd", "GRID_DEFAULT_INVESTMENT_USD", 500.0),
                max_grids: resolve_i64(row, "grid_max_grids", "GRID_MAX_GRIDS", 3),
                stop_loss_pct: resolve_f64(row, "grid_stop_loss_pct", "GRID_STOP_LOSS_PCT", 15.0),
                take_profit_pct: resolve_f64(row, "grid_take_profit_pct", "GRID_TAKE_PROFIT_PCT", 50.0),
                check_interval_sec: resolve_i64(row, "grid_check_interval_sec", "GRID_CHECK_INTERVAL_SEC", 30) as u64,
            },
            pairs: PairsConfig {
                enabled: resolve_bool(row, "enable_pairs_trading", "ENABLE_PAIRS_TRADING", false),
                entry_zscore: resolve_f64(row, "pairs_entry_zscore", "PAIRS_ENTRY_ZSCORE", 2.0),
                exit_zscore: resolve_f64(row, "pairs_exit_zscore", "PAIRS_EXIT_ZSCORE", 0.5),
                stop_loss_zscore: resolve_f64(row, "pairs_stop_loss_zscore", "PAIRS_STOP_LOSS_ZSCORE", 4.0),
                position_size_usd: resolve_f64(row, "pairs_position_size_usd", "PAIRS_POSITION_SIZE_USD", 500.0),
                max_positions: resolve_i64(row, "pairs_max_positions", "PAIRS_MAX_POSITIONS", 2),
                max_hold_hours: resolve_f64(row, "pairs_max_hold_hours", "PAIRS_MAX_HOLD_HOURS", 72.0),
                scan_interval_sec: resolve_i64(row, "pairs_scan_interval_sec", "PAIRS_SCAN_INTERVAL_SEC", 60) as u64,
            },
            stock_mean_reversion: StockStrategyConfig {
                enabled: resolve_bool(row, "enable_stock_mean_reversion", "ENABLE_STOCK_MEAN_REVERSION", false),
                entry_zscore: resolve_f64(row, "stock_mr_entry_zscore", "STOCK_MR_ENTRY_ZSCORE", 2.0),
                exit_zscore: resolve_f64(row, "stock_mr_exit_zscore", "STOCK_MR_EXIT_ZSCORE", 0.5),
                stop_loss_pct: resolve_f64(row, "stock_mr_stop_loss_pct", "STOCK_MR_STOP_LOSS_PCT", 5.0),
                position_size_usd: resolve_f64(row, "stock_mr_position_size_usd", "STOCK_MR_POSITION_SIZE_USD", 500.0),
                max_positions: resolve_i64(row, "stock_mr_max_positions", "STOCK_MR_MAX_POSITIONS", 5),
                scan_interval_sec: resolve_i64(row, "stock_mr_scan_interval_sec", "STOCK_MR_SCAN_INTERVAL_SEC", 300) as u64,
                watchlist: resolve_csv(row, "stock_mr_watchlist", "STOCK_MR_WATCHLIST", "AAPL,MSFT,GOOGL,AMZN,META,NVDA,TSLA,JPM,V,MA"),
            },
            stock_momentum: StockStrategyConfig {
                enabled: resolve_bool(row, "enable_stock_momentum", "ENABLE_STOCK_MOMENTUM", false),
                entry_zscore: resolve_f64(row, "stock_mom_entry_threshold", "STOCK_MOM_ENTRY_THRESHOLD", 3.0),
                exit_zscore: resolve_f64(row, "stock_mom_exit_threshold", "STOCK_MOM_EXIT_THRESHOLD", -1.0),
                stop_loss_pct: resolve_f64(row, "stock_mom_stop_loss_pct", "STOCK_MOM_STOP_LOSS_PCT", 7.0),
                position_size_usd: resolve_f64(row, "stock_mom_position_size_usd", "STOCK_MOM_POSITION_SIZE_USD", 500.0),
                max_positions: resolve_i64(row, "stock_mom_max_positions", "STOCK_MOM_MAX_POSITIONS", 5),
                scan_interval_sec: resolve_i64(row, "stock_mom_scan_interval_sec", "STOCK_MOM_SCAN_INTERVAL_SEC", 300) as u64,
                watchlist: resolve_csv(row, "stock_mom_watchlist", "STOCK_MOM_WATCHLIST", "AAPL,MSFT,GOOGL,AMZN,META,NVDA,TSLA,AMD,CRM,NFLX"),
            },
            venues: VenueEnablement {
                polymarket: resolve_bool(row, "enable_polymarket", "ENABLE_POLYMARKET", true),
                kalshi: resolve_bool(row, "enable_kalshi", "ENABLE_KALSHI", true),
                binance: resolve_bool(row, "enable_binance", "ENABLE_BINANCE", false),
                bybit: resolve_bool(row, "enable_bybit", "ENABLE_BYBIT", false),
                okx: resolve_bool(row, "enable_okx", "ENABLE_OKX", false),
                kraken: resolve_bool(row, "enable_kraken", "ENABLE_KRAKEN", false),
                coinbase: resolve_bool(row, "enable_coinbase", "ENABLE_COINBASE", false),
                kucoin: resolve_bool(row, "enable_kucoin", "ENABLE_KUCOIN", false),
                alpaca: resolve_bool(row, "enable_alpaca", "ENABLE_ALPACA", false),
                ibkr: resolve_bool(row, "enable_ibkr", "ENABLE_IBKR", false),
            },
        }
    }

    /// `ReloadFromSupabase()`: re-reads the tenant row and overwrites this
    /// snapshot in place so scan ticks pick up changes without a restart.
    pub fn reload_from(&mut self, row: &TenantConfigRow) {
        *self = Config::resolve(row);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_prefers_tenant_row_over_env() {
        std::env::set_var("MAX_TRADE_SIZE", "250");
        let mut row = TenantConfigRow::new();
        row.insert("max_trade_size".into(), Value::from(999.0));
        let cfg = Config::resolve(&row);
        assert_eq!(cfg.max_trade_size, 999.0);
        std::env::remove_var("MAX_TRADE_SIZE");
    }

    #[test]
    fn precedence_falls_back_to_env_then_default() {
        std::env::remove_var("MAX_DAILY_LOSS");
        let row = TenantConfigRow::new();
        let cfg = Config::resolve(&row);
        assert_eq!(cfg.max_daily_loss, 50.0);

        std::env::set_var("MAX_DAILY_LOSS", "123.5");
        let cfg = Config::resolve(&row);
        assert_eq!(cfg.max_daily_loss, 123.5);
        std::env::remove_var("MAX_DAILY_LOSS");
    }

    #[test]
    fn redesign_flags_resolved_as_recommended() {
        let row = TenantConfigRow::new();
        let cfg = Config::resolve(&row);
        assert!(!cfg.allow_plaintext_secrets, "plaintext fallback must default off");
        assert!(cfg.skip_same_platform_overlap, "overlap trades must be opt-in");
    }
}
