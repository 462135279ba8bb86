pub mod health;
pub mod latency;
pub mod routes;

use std::sync::Arc;

use crate::api::health::Metrics;
use crate::resolve::games::GameResolver;
use crate::resolve::live::LiveScores;
use crate::resolve::players::PlayerResolver;
use crate::resolve::stats::StatsResolver;
use crate::resolve::teams::TeamResolver;
use crate::sources::odds::OddsClient;

/// Everything a handler can reach. Cloned per request, so every field is
/// behind an `Arc`.
#[derive(Clone)]
pub struct ApiState {
    pub players: Arc<PlayerResolver>,
    pub stats: Arc<StatsResolver>,
    pub games: Arc<GameResolver>,
    pub teams: Arc<TeamResolver>,
    pub live: Arc<LiveScores>,
    pub odds: Arc<OddsClient>,
    pub metrics: Arc<Metrics>,
}
