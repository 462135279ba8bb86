mod api;
mod cache;
mod career;
mod config;
mod db;
mod error;
mod resolve;
mod season;
mod sources;
mod types;

use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::health::Metrics;
use crate::api::routes::router;
use crate::api::ApiState;
use crate::cache::{Clock, SystemClock};
use crate::config::Config;
use crate::db::LocalStore;
use crate::error::Result;
use crate::resolve::games::GameResolver;
use crate::resolve::live::{LivePoller, LiveScores, StatusTracker};
use crate::resolve::players::PlayerResolver;
use crate::resolve::stats::StatsResolver;
use crate::resolve::teams::TeamResolver;
use crate::sources::league::{LeagueStats, LeagueUpstream, NbaStatsHttp};
use crate::sources::odds::OddsClient;
use crate::sources::primary::{PrimaryClient, PrimarySource};
use crate::sources::scoreboard::{ScoreboardClient, ScoreboardFeed};

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Local store ---
    let pool = db::connect(&cfg.db_path).await?;
    let store = LocalStore::new(pool);
    info!("Database ready at {}", cfg.db_path);

    // --- Upstream adapters ---
    let metrics = Arc::new(Metrics::default());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let primary: Arc<dyn PrimarySource> = Arc::new(PrimaryClient::new(&cfg, metrics.clone())?);
    let league_http: Arc<dyn LeagueUpstream> = Arc::new(NbaStatsHttp::new(&cfg, metrics.clone())?);
    let league = Arc::new(LeagueStats::new(league_http, clock.clone()));
    let feed: Arc<dyn ScoreboardFeed> = Arc::new(ScoreboardClient::new(&cfg, clock.clone(), metrics.clone())?);
    let odds = Arc::new(OddsClient::new(&cfg, clock, metrics.clone())?);
    info!(
        primary = %cfg.primary_api_url,
        primary_key = cfg.primary_api_key.is_some(),
        odds_key = cfg.odds_api_key.is_some(),
        "Upstream adapters ready"
    );

    // --- Live poller (background, cadence from the slate) ---
    let tracker = Arc::new(StatusTracker::new());
    let poller = LivePoller::new(feed.clone(), tracker.clone());
    tokio::spawn(async move { poller.run().await });

    // --- HTTP API server ---
    let api_state = ApiState {
        players: Arc::new(PlayerResolver::new(store.clone(), primary.clone())),
        stats: Arc::new(StatsResolver::new(store.clone(), primary.clone(), league.clone())),
        games: Arc::new(GameResolver::new(store.clone(), primary.clone())),
        teams: Arc::new(TeamResolver::new(store.clone(), primary.clone(), league)),
        live: Arc::new(LiveScores::new(feed, store, primary, tracker)),
        odds,
        metrics,
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
