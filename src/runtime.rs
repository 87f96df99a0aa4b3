//! Tenant Runtime (C7): owns one tenant's running world end to end.
//!
//! Grounded on `original_source/src/bot_runner.py`'s `PolybotRunner`: loads
//! config and secrets, builds venue clients, instantiates scanners sharing
//! one executor/simulator, and spawns one cooperative task per scanner plus
//! the balance-poller / stats-saver / heartbeat housekeeping tasks. Every
//! task shares one `CancellationToken` so the Supervisor can tear down a
//! tenant cleanly without reaching into its internals.

use crate::config::Config;
use crate::error::StartupError;
use crate::executor::Executor;
use crate::models::{RiskState, TradingMode};
use crate::scanners::{CooldownMap, ScanContext, Scanner};
use crate::simulator::{Simulator, SimulatorConfig};
use crate::store::Store;
use crate::venues::crypto::CryptoClient;
use crate::venues::kalshi::KalshiClient;
use crate::venues::polymarket::PolymarketClient;
use crate::venues::stocks::{AlpacaClient, IbkrClient};
use crate::venues::VenueClient;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub struct TenantRuntime {
    pub tenant_id: Uuid,
    store: Store,
    config: Arc<RwLock<Config>>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl TenantRuntime {
    /// Boots everything this tenant needs: Store scoping, config/secret
    /// load, venue clients, scanners, and housekeeping tasks. Returns ready
    /// to `run()`.
    pub async fn start(
        tenant_id: Uuid,
        system_store: Store,
        mode: TradingMode,
        parent_cancel: &CancellationToken,
    ) -> Result<Self, StartupError> {
        let store = system_store.for_tenant(tenant_id);
        let row = store.load_config().await?;
        let config = Arc::new(RwLock::new(Config::resolve(&row)));

        let secrets = store.load_secrets(true).await?;
        let venues = build_venue_clients(&config.read(), &secrets, mode)?;

        let risk = Arc::new(RwLock::new(RiskState::new(config.read().manual_approval_trades)));
        let cooldowns = Arc::new(RwLock::new(CooldownMap::default()));
        let cancel = parent_cancel.child_token();

        let executor = Arc::new(Executor::new(store.clone(), venues.clone(), risk.clone(), config.clone()));
        let simulator = Arc::new(Simulator::new(store.clone(), config.clone(), risk.clone(), SimulatorConfig::default()));

        let scan_ctx = Arc::new(ScanContext { config: config.clone(), store: store.clone(), venues, risk: risk.clone(), cooldowns });

        let scanners = build_scanners(&config.read());

        let mut tasks = Vec::new();
        for scanner in scanners {
            tasks.push(spawn_scanner_task(scanner, scan_ctx.clone(), executor.clone(), simulator.clone(), mode, tenant_id, cancel.clone()));
        }
        tasks.push(spawn_balance_poller(store.clone(), cancel.clone()));
        if !mode.is_live() {
            tasks.push(spawn_stats_saver(store.clone(), simulator.clone(), tenant_id, cancel.clone()));
        }
        tasks.push(spawn_heartbeat(store.clone(), mode, cancel.clone()));

        store.update_bot_status(true, mode).await?;

        Ok(Self { tenant_id, store, config, cancel, tasks })
    }

    /// Graceful shutdown: cancel every child task and await bounded
    /// termination, then flush status.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            let _ = tokio::time::timeout(Duration::from_secs(10), task).await;
        }
        let _ = self.store.update_bot_status(false, TradingMode::Paper).await;
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> Arc<RwLock<Config>> {
        self.config.clone()
    }
}

fn build_venue_clients(
    config: &Config,
    secrets: &HashMap<String, String>,
    mode: TradingMode,
) -> Result<HashMap<crate::models::Venue, Arc<dyn VenueClient>>, StartupError> {
    use crate::models::Venue;
    let mut venues: HashMap<Venue, Arc<dyn VenueClient>> = HashMap::new();

    let require = |key: &str| -> Result<Option<String>, StartupError> {
        match secrets.get(key) {
            Some(v) => Ok(Some(v.clone())),
            None if mode.is_live() => Err(StartupError::MissingCredentials(key.to_string())),
            None => Ok(None),
        }
    };

    if config.venues.polymarket {
        let pk = require("polymarket_private_key")?;
        venues.insert(Venue::Polymarket, Arc::new(PolymarketClient::new(pk)));
    }
    if config.venues.kalshi {
        let key_id = secrets.get("kalshi_key_id").cloned().unwrap_or_default();
        let pem = require("kalshi_private_key_pem")?;
        if mode.is_live() || pem.is_some() {
            let client = KalshiClient::new(key_id, pem).map_err(|e| StartupError::MissingCredentials(e.to_string()))?;
            venues.insert(Venue::Kalshi, Arc::new(client));
        }
    }
    for (venue, base, enabled) in [
        (Venue::Binance, "https://api.binance.com/api/v3", config.venues.binance),
        (Venue::Bybit, "https://api.bybit.com/v5/market", config.venues.bybit),
        (Venue::Okx, "https://www.okx.com/api/v5/market", config.venues.okx),
        (Venue::Kraken, "https://api.kraken.com/0/public", config.venues.kraken),
        (Venue::CoinbaseAdvanced, "https://api.coinbase.com/api/v3/brokerage", config.venues.coinbase),
        (Venue::Kucoin, "https://api.kucoin.com/api/v1", config.venues.kucoin),
    ] {
        if !enabled {
            continue;
        }
        let key = secrets.get(&format!("{}_api_key", venue.as_str())).cloned();
        let secret = secrets.get(&format!("{}_api_secret", venue.as_str())).cloned();
        if mode.is_live() && (key.is_none() || secret.is_none()) {
            return Err(StartupError::MissingCredentials(venue.as_str().to_string()));
        }
        venues.insert(venue, Arc::new(CryptoClient::new(venue, base, key, secret)));
    }
    if config.venues.alpaca {
        let key = require("alpaca_api_key")?;
        let secret = require("alpaca_api_secret")?;
        venues.insert(Venue::Alpaca, Arc::new(AlpacaClient::new(key, secret, !mode.is_live())));
    }
    if config.venues.ibkr {
        venues.insert(Venue::Ibkr, Arc::new(IbkrClient));
    }

    Ok(venues)
}

fn build_scanners(config: &Config) -> Vec<Arc<dyn Scanner>> {
    use crate::models::Venue;
    use crate::scanners::*;

    let mut scanners: Vec<Arc<dyn Scanner>> = Vec::new();
    if config.poly_single.enabled && config.venues.polymarket {
        scanners.push(Arc::new(single_platform::SinglePlatformScanner::new(Venue::Polymarket)));
    }
    if config.kalshi_single.enabled && config.venues.kalshi {
        scanners.push(Arc::new(single_platform::SinglePlatformScanner::new(Venue::Kalshi)));
    }
    if config.cross_platform.enabled && config.venues.polymarket && config.venues.kalshi {
        scanners.push(Arc::new(cross_platform::CrossPlatformScanner::new(Vec::new())));
    }
    if config.market_maker.enabled && config.venues.polymarket {
        scanners.push(Arc::new(market_maker::MarketMakerScanner::new(Venue::Polymarket, Vec::new())));
    }
    if config.funding_rate.enabled && config.venues.binance {
        scanners.push(Arc::new(funding_rate::FundingRateScanner::new(Venue::Binance, Vec::new())));
    }
    if config.grid.enabled && config.venues.binance {
        scanners.push(Arc::new(grid::GridScanner::new(Venue::Binance)));
    }
    if config.pairs.enabled {
        scanners.push(Arc::new(pairs::PairsScanner::new(Vec::new())));
    }
    if config.stock_mean_reversion.enabled && config.venues.alpaca {
        scanners.push(Arc::new(stocks::StockMeanReversionScanner::new()));
    }
    if config.stock_momentum.enabled && config.venues.alpaca {
        scanners.push(Arc::new(stocks::StockMomentumScanner::new()));
    }
    scanners
}

fn spawn_scanner_task(
    scanner: Arc<dyn Scanner>,
    ctx: Arc<ScanContext>,
    executor: Arc<Executor>,
    simulator: Arc<Simulator>,
    mode: TradingMode,
    tenant_id: Uuid,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(scanner.scan_interval());
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    match scanner.scan_once(&ctx).await {
                        Ok(opportunities) => {
                            for opp in opportunities {
                                let _ = ctx.store.log_opportunity(&opp).await;
                                if opp.status != crate::models::OpportunityStatus::Detected {
                                    continue;
                                }
                                if mode.is_live() {
                                    if let Err(e) = executor.execute(opp).await {
                                        tracing::warn!(scanner = scanner.id(), error = %e, "execution failed");
                                    }
                                } else {
                                    for leg in &opp.legs {
                                        let input = crate::simulator::SimulationInput {
                                            arbitrage_type: opp.strategy_tag.clone(),
                                            market_a_venue: leg.venue,
                                            market_a_id: leg.market_id.clone(),
                                            market_b_venue: leg.venue,
                                            market_b_id: leg.market_id.clone(),
                                            quoted_spread_pct: opp.profit_percent,
                                        };
                                        simulator.simulate(tenant_id, input).await;
                                    }
                                }
                            }
                        }
                        Err(e) => tracing::warn!(scanner = scanner.id(), error = %e, "scan failed"),
                    }
                }
            }
        }
    })
}

fn spawn_balance_poller(store: Store, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let _ = store.heartbeat().await;
                }
            }
        }
    })
}

fn spawn_stats_saver(store: Store, simulator: Arc<Simulator>, tenant_id: Uuid, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let snapshot = crate::models::StatsSnapshot {
                        tenant_id,
                        balance_usd: simulator.balance(),
                        total_pnl_usd: 0.0,
                        trade_count: 0,
                        win_count: 0,
                        loss_count: 0,
                        total_fees_usd: 0.0,
                        best_trade_usd: 0.0,
                        worst_trade_usd: 0.0,
                        updated_at: chrono::Utc::now(),
                    };
                    let _ = store.upsert_stats_snapshot(&snapshot).await;
                }
            }
        }
    })
}

fn spawn_heartbeat(store: Store, _mode: TradingMode, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let _ = store.heartbeat().await;
                }
            }
        }
    })
}
