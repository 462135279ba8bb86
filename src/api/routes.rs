use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::api::health::SourceHealth;
use crate::api::latency::LatencySummary;
use crate::api::ApiState;
use crate::config::{SEARCH_ALL_LIMIT, SEARCH_DEFAULT_LIMIT};
use crate::db::GameFilter;
use crate::error::{AppError, Result};
use crate::resolve::live::next_poll;
use crate::resolve::stats::Subject;
use crate::season::{current_season, parse_season_string, today_utc};
use crate::types::{
    AwardPrediction, Career, Game, GameOdds, GamePlayerStats, GameStatus, Meta, PlayerDetail, PlayerKey,
    RosterPlayer, SearchHit, SeasonAverages, Source, Sourced, StandingsRow, Team, TeamDetail,
};

const LIVE_SCORES_CACHE: &str = "public, max-age=10, s-maxage=15";
const ODDS_CACHE: &str = "public, max-age=600, s-maxage=600";
const AWARDS_CACHE: &str = "public, max-age=604800, s-maxage=604800";

const SEARCH_MAX_LIMIT: usize = 100;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/stats/latency", get(get_stats_latency))
        .route("/api/players/search", get(search_players))
        .route("/api/players/:key", get(get_player))
        .route("/api/players/:key/season-averages", get(get_season_averages))
        .route("/api/players/:key/games", get(get_player_games))
        .route("/api/players/:key/career", get(get_career))
        .route("/api/teams", get(get_teams))
        .route("/api/teams/standings", get(get_standings))
        .route("/api/teams/:id", get(get_team))
        .route("/api/teams/:id/roster-stats", get(get_roster_stats))
        .route("/api/games", get(get_games))
        .route("/api/games/today", get(get_games_today))
        .route("/api/live/scores", get(get_live_scores))
        .route("/api/live/odds", get(get_live_odds))
        .route("/api/predictions/awards", get(get_award_predictions))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub limit: Option<usize>,
}

/// `season` is a start year (`2024`) or the league spelling (`2024-25`).
#[derive(Deserialize)]
pub struct SeasonQuery {
    pub season: Option<String>,
}

#[derive(Deserialize)]
pub struct GamesQuery {
    pub date: Option<String>,
    pub season: Option<i32>,
    pub team_id: Option<i64>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub postseason: Option<bool>,
    pub limit: Option<u32>,
}

#[derive(Deserialize)]
pub struct DateQuery {
    pub date: Option<String>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// A single record that may legitimately be missing from every source.
/// Exhaustion renders as `{ "data": null, "source": null }`, not an error.
#[derive(Debug, Serialize)]
pub struct Resolved<T> {
    pub data: Option<T>,
    pub source: Option<Source>,
}

impl<T> From<Option<Sourced<T>>> for Resolved<T> {
    fn from(hit: Option<Sourced<T>>) -> Self {
        match hit {
            Some(Sourced { source, data }) => Self { data: Some(data), source: Some(source) },
            None => Self { data: None, source: None },
        }
    }
}

/// List envelope: the provider-style `{ data, meta }` plus the source that
/// answered, when one did.
#[derive(Debug, Serialize)]
pub struct Listing<T> {
    pub data: Vec<T>,
    pub meta: Meta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
}

impl<T> Listing<T> {
    fn single_page(data: Vec<T>, source: Option<Source>) -> Self {
        let n = data.len();
        Self { data, meta: Meta::single_page(n, n), source }
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub sources: Vec<SourceHealth>,
}

#[derive(Serialize)]
pub struct AwardsMeta {
    pub total_categories: usize,
    pub categories_with_data: usize,
    pub fetched_at: String,
}

#[derive(Serialize)]
pub struct AwardsResponse {
    pub data: Vec<AwardPrediction>,
    pub meta: AwardsMeta,
}

// ---------------------------------------------------------------------------
// Param parsing
// ---------------------------------------------------------------------------

fn season_param(raw: Option<&str>, today: NaiveDate) -> Result<i32> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(current_season(today)),
        Some(s) => parse_season_string(s).ok_or_else(|| AppError::BadRequest(format!("invalid season: {s}"))),
    }
}

fn date_param(raw: Option<&str>, today: NaiveDate) -> Result<NaiveDate> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(today),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|_| AppError::BadRequest(format!("invalid date (expected YYYY-MM-DD): {s}"))),
    }
}

/// Resolves the route key to the player the stats chains should look for.
async fn subject(state: &ApiState, raw_key: &str) -> Result<Subject> {
    let key: PlayerKey = raw_key.parse()?;
    let player = state.players.resolve(key).await?.data.player;
    Ok(Subject::new(key, &player))
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        sources: state.metrics.health.snapshot(),
    })
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<Vec<LatencySummary>> {
    Json(state.metrics.latency.summary())
}

// ---------------------------------------------------------------------------
// Players
// ---------------------------------------------------------------------------

async fn search_players(
    State(state): State<ApiState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<Listing<SearchHit>>> {
    let query = params.q.as_deref().unwrap_or("").trim();
    // A blank query is a roster listing and may ask for the whole store.
    let (default, max) = if query.is_empty() {
        (SEARCH_ALL_LIMIT, SEARCH_ALL_LIMIT)
    } else {
        (SEARCH_DEFAULT_LIMIT, SEARCH_MAX_LIMIT)
    };
    let limit = params.limit.unwrap_or(default).clamp(1, max);
    let hits = state.players.search(query, limit).await?;
    let n = hits.len();
    Ok(Json(Listing { data: hits, meta: Meta::single_page(n, limit), source: None }))
}

async fn get_player(
    State(state): State<ApiState>,
    Path(key): Path<String>,
) -> Result<Json<Sourced<PlayerDetail>>> {
    let key: PlayerKey = key.parse()?;
    Ok(Json(state.players.resolve(key).await?))
}

async fn get_season_averages(
    State(state): State<ApiState>,
    Path(key): Path<String>,
    Query(params): Query<SeasonQuery>,
) -> Result<Json<Resolved<SeasonAverages>>> {
    let season = season_param(params.season.as_deref(), today_utc())?;
    let who = subject(&state, &key).await?;
    Ok(Json(state.stats.season_averages(&who, season).await.into()))
}

async fn get_player_games(
    State(state): State<ApiState>,
    Path(key): Path<String>,
    Query(params): Query<SeasonQuery>,
) -> Result<Json<Listing<GamePlayerStats>>> {
    let season = season_param(params.season.as_deref(), today_utc())?;
    let who = subject(&state, &key).await?;
    Ok(Json(match state.stats.game_log(&who, season).await {
        Some(hit) => Listing::single_page(hit.data, Some(hit.source)),
        None => Listing::single_page(Vec::new(), None),
    }))
}

async fn get_career(
    State(state): State<ApiState>,
    Path(key): Path<String>,
) -> Result<Json<Resolved<Career>>> {
    let who = subject(&state, &key).await?;
    Ok(Json(state.stats.career(&who, current_season(today_utc())).await.into()))
}

// ---------------------------------------------------------------------------
// Teams
// ---------------------------------------------------------------------------

async fn get_teams(State(state): State<ApiState>) -> Json<Listing<Team>> {
    let hit = state.teams.teams().await;
    Json(Listing::single_page(hit.data, Some(hit.source)))
}

async fn get_team(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Result<Json<Sourced<TeamDetail>>> {
    Ok(Json(state.teams.team(id).await?))
}

async fn get_standings(
    State(state): State<ApiState>,
    Query(params): Query<SeasonQuery>,
) -> Result<Json<Listing<StandingsRow>>> {
    let today = today_utc();
    let season = season_param(params.season.as_deref(), today)?;
    let table = state.teams.standings(season, today).await?;
    Ok(Json(Listing::single_page(table, Some(Source::Primary))))
}

async fn get_roster_stats(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Query(params): Query<SeasonQuery>,
) -> Result<Json<Listing<RosterPlayer>>> {
    let season = season_param(params.season.as_deref(), today_utc())?;
    let roster = state.teams.roster_stats(id, season).await?;
    Ok(Json(Listing::single_page(roster, Some(Source::League))))
}

// ---------------------------------------------------------------------------
// Games & live
// ---------------------------------------------------------------------------

async fn get_games(
    State(state): State<ApiState>,
    Query(params): Query<GamesQuery>,
) -> Json<Listing<Game>> {
    let filter = GameFilter {
        date: params.date,
        season: params.season,
        team_id: params.team_id,
        start_date: params.start_date,
        end_date: params.end_date,
        postseason: params.postseason,
        limit: params.limit,
    };
    let hit = state.games.games(&filter, current_season(today_utc())).await;
    let page = hit.data;
    let n = page.data.len();
    Json(Listing {
        data: page.data,
        meta: page.meta.unwrap_or_else(|| Meta::single_page(n, n)),
        source: Some(hit.source),
    })
}

async fn get_games_today(State(state): State<ApiState>) -> Json<Listing<Game>> {
    let hit = state.games.today(today_utc()).await;
    Json(Listing::single_page(hit.data, Some(hit.source)))
}

async fn get_live_scores(
    State(state): State<ApiState>,
    Query(params): Query<DateQuery>,
) -> Result<impl IntoResponse> {
    let today = today_utc();
    let date = date_param(params.date.as_deref(), today)?;
    let board = state.live.for_date(date, today).await;

    let n = board.data.len();
    let meta = Meta {
        has_live_games: Some(board.data.iter().any(|g| g.status == GameStatus::InProgress)),
        next_poll_ms: next_poll(&board.data).as_millis(),
        ..Meta::single_page(n, n)
    };
    let body = Listing { data: board.data, meta, source: Some(board.source) };
    Ok(([(header::CACHE_CONTROL, LIVE_SCORES_CACHE)], Json(body)))
}

async fn get_live_odds(State(state): State<ApiState>) -> Result<impl IntoResponse> {
    let odds: Vec<GameOdds> = state.odds.game_odds().await?.as_ref().clone();
    Ok(([(header::CACHE_CONTROL, ODDS_CACHE)], Json(odds)))
}

async fn get_award_predictions(State(state): State<ApiState>) -> impl IntoResponse {
    let awards = state.odds.all_award_futures().await;
    let meta = AwardsMeta {
        total_categories: awards.len(),
        categories_with_data: awards.iter().filter(|a| !a.candidates.is_empty()).count(),
        fetched_at: Utc::now().to_rfc3339(),
    };
    ([(header::CACHE_CONTROL, AWARDS_CACHE)], Json(AwardsResponse { data: awards, meta }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::http::StatusCode;

    use crate::api::health::Metrics;
    use crate::cache::FakeClock;
    use crate::config::Config;
    use crate::db::reader::tests::seeded_store;
    use crate::resolve::fakes::{player, FakePrimary};
    use crate::resolve::games::GameResolver;
    use crate::resolve::live::{LiveScores, StatusTracker};
    use crate::resolve::players::PlayerResolver;
    use crate::resolve::stats::StatsResolver;
    use crate::resolve::teams::TeamResolver;
    use crate::sources::league::tests::FakeLeague;
    use crate::sources::league::{LeagueStats, LeagueUpstream};
    use crate::sources::odds::OddsClient;
    use crate::sources::scoreboard::ScoreboardFeed;

    struct DownFeed;

    #[async_trait]
    impl ScoreboardFeed for DownFeed {
        async fn scoreboard(&self, _: NaiveDate, _: bool) -> Result<Arc<Vec<Game>>> {
            Err(AppError::Timeout(Source::Live))
        }
    }

    async fn state(primary: FakePrimary) -> ApiState {
        let store = seeded_store().await;
        let clock = FakeClock::new();
        let metrics = Arc::new(Metrics::default());
        let primary = Arc::new(primary);
        let league = Arc::new(LeagueStats::new(
            Arc::new(FakeLeague::default()) as Arc<dyn LeagueUpstream>,
            clock.clone(),
        ));
        let odds = OddsClient::new(&Config::default(), clock, metrics.clone()).unwrap();

        ApiState {
            players: Arc::new(PlayerResolver::new(store.clone(), primary.clone())),
            stats: Arc::new(StatsResolver::new(store.clone(), primary.clone(), league.clone())),
            games: Arc::new(GameResolver::new(store.clone(), primary.clone())),
            teams: Arc::new(TeamResolver::new(store.clone(), primary.clone(), league)),
            live: Arc::new(LiveScores::new(Arc::new(DownFeed), store, primary, Arc::new(StatusTracker::new()))),
            odds: Arc::new(odds),
            metrics,
        }
    }

    fn cache_control(resp: &axum::response::Response) -> &str {
        resp.headers().get(header::CACHE_CONTROL).unwrap().to_str().unwrap()
    }

    #[test]
    fn season_param_accepts_both_spellings() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        assert_eq!(season_param(None, today).unwrap(), 2024);
        assert_eq!(season_param(Some("2023"), today).unwrap(), 2023);
        assert_eq!(season_param(Some("2022-23"), today).unwrap(), 2022);
        assert!(matches!(season_param(Some("last"), today), Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn malformed_player_key_is_a_bad_request() {
        let err = get_player(State(state(FakePrimary::default()).await), Path("bdl-x".into()))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_player_is_not_found() {
        let err = get_player(State(state(FakePrimary::default()).await), Path("999".into()))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn search_reports_its_page() {
        let st = state(FakePrimary { players: vec![player(9, "Jayson", "Tatum")], ..Default::default() }).await;
        let Json(body) = search_players(
            State(st),
            Query(SearchQuery { q: Some("tatum".into()), limit: None }),
        )
        .await
        .unwrap();

        assert_eq!(body.data.len(), 1);
        assert_eq!(body.data[0].key, "1628369");
        assert_eq!(body.meta.per_page, Some(10));
        assert_eq!(body.meta.total_count, Some(1));
    }

    #[tokio::test]
    async fn blank_search_lists_the_store_unless_limited() {
        let st = state(FakePrimary::default()).await;
        let Json(all) = search_players(State(st.clone()), Query(SearchQuery { q: None, limit: None }))
            .await
            .unwrap();
        assert_eq!(all.data.len(), 5);
        assert_eq!(all.meta.per_page, Some(SEARCH_ALL_LIMIT as u32));

        let Json(some) = search_players(State(st), Query(SearchQuery { q: Some(" ".into()), limit: Some(2) }))
            .await
            .unwrap();
        assert_eq!(some.data.len(), 2);
    }

    #[tokio::test]
    async fn exhausted_season_averages_render_as_null() {
        let st = state(FakePrimary::default()).await;
        let Json(body) = get_season_averages(
            State(st),
            Path("1627759".into()),
            Query(SeasonQuery { season: Some("2024".into()) }),
        )
        .await
        .unwrap();

        assert!(body.data.is_none());
        assert!(body.source.is_none());
    }

    #[tokio::test]
    async fn season_averages_come_from_the_store() {
        let st = state(FakePrimary::default()).await;
        let Json(body) = get_season_averages(
            State(st),
            Path("1628369".into()),
            Query(SeasonQuery { season: Some("2024-25".into()) }),
        )
        .await
        .unwrap();

        assert_eq!(body.source, Some(Source::Db));
        assert_eq!(body.data.unwrap().games_played, 72);
    }

    #[tokio::test]
    async fn live_scores_carry_poll_hints_and_cache_headers() {
        let st = state(FakePrimary::default()).await;
        let resp = get_live_scores(State(st), Query(DateQuery { date: Some("2025-01-07".into()) }))
            .await
            .unwrap()
            .into_response();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(cache_control(&resp), LIVE_SCORES_CACHE);
    }

    #[tokio::test]
    async fn live_scores_reject_bad_dates() {
        let st = state(FakePrimary::default()).await;
        let err = get_live_scores(State(st), Query(DateQuery { date: Some("01/07/2025".into()) }))
            .await
            .err()
            .unwrap();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn awards_without_a_key_list_every_category_empty() {
        let st = state(FakePrimary::default()).await;
        let resp = get_award_predictions(State(st)).await.into_response();
        assert_eq!(cache_control(&resp), AWARDS_CACHE);
    }

    #[tokio::test]
    async fn odds_without_a_key_are_an_empty_list() {
        let st = state(FakePrimary::default()).await;
        let resp = get_live_odds(State(st)).await.unwrap().into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(cache_control(&resp), ODDS_CACHE);
    }

    #[tokio::test]
    async fn standings_come_back_empty_without_games() {
        let st = state(FakePrimary::default()).await;
        let Json(body) = get_standings(State(st), Query(SeasonQuery { season: Some("2024".into()) }))
            .await
            .unwrap();
        assert!(body.data.is_empty());
        assert_eq!(body.source, Some(Source::Primary));
    }
}
