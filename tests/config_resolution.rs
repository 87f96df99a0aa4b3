//! Integration coverage for Config Resolver precedence and the cooldown
//! gate, exercised the way a tenant runtime would use them without needing
//! a live Postgres connection.

use chrono::Utc;
use polybot_backend::config::Config;
use polybot_backend::models::Venue;
use polybot_backend::scanners::CooldownMap;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

#[test]
fn row_value_beats_env_and_default() {
    std::env::remove_var("MAX_TRADE_SIZE");
    std::env::set_var("MAX_TRADE_SIZE", "250");

    let mut row: HashMap<String, serde_json::Value> = HashMap::new();
    row.insert("max_trade_size".to_string(), json!(900.0));

    let config = Config::resolve(&row);
    assert_eq!(config.max_trade_size, 900.0);

    std::env::remove_var("MAX_TRADE_SIZE");
}

#[test]
fn env_var_beats_default_when_row_is_silent() {
    std::env::set_var("MAX_DAILY_LOSS", "77.5");
    let row: HashMap<String, serde_json::Value> = HashMap::new();

    let config = Config::resolve(&row);
    assert_eq!(config.max_daily_loss, 77.5);

    std::env::remove_var("MAX_DAILY_LOSS");
}

#[test]
fn default_applies_when_row_and_env_are_both_silent() {
    std::env::remove_var("SLIPPAGE_TOLERANCE");
    let row: HashMap<String, serde_json::Value> = HashMap::new();

    let config = Config::resolve(&row);
    assert_eq!(config.slippage_tolerance_pct, 0.5);
}

#[test]
fn cooldown_map_blocks_until_window_elapses() {
    let mut cooldowns = CooldownMap::default();
    let now = Utc::now();
    let window = Duration::from_secs(60);

    cooldowns.record(Venue::Polymarket, "market-1", now, window);
    assert!(cooldowns.is_cooling_down(Venue::Polymarket, "market-1", now, window));

    let later = now + chrono::Duration::seconds(61);
    assert!(!cooldowns.is_cooling_down(Venue::Polymarket, "market-1", later, window));
}

#[test]
fn cooldown_map_is_scoped_per_market_and_venue() {
    let mut cooldowns = CooldownMap::default();
    let now = Utc::now();
    let window = Duration::from_secs(60);

    cooldowns.record(Venue::Polymarket, "market-1", now, window);
    assert!(!cooldowns.is_cooling_down(Venue::Kalshi, "market-1", now, window));
    assert!(!cooldowns.is_cooling_down(Venue::Polymarket, "market-2", now, window));
}
