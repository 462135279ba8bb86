use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::future::join_all;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::api::health::Metrics;
use crate::config::{
    Config, CAREER_CHUNK_SIZE, PRIMARY_BACKOFF_MAX_SECS, PRIMARY_EARLIEST_SEASON, PRIMARY_MAX_RETRIES_CAP,
    PRIMARY_REQUEST_TIMEOUT_SECS,
};
use crate::error::{AppError, Result};
use crate::types::{
    Envelope, Game, GamePlayerStats, GameSummary, Player, SeasonAverages, Source, StatLine, Team,
};

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

type Params = Vec<(&'static str, String)>;

fn push_all<T: ToString>(params: &mut Params, key: &'static str, values: &[T]) {
    params.extend(values.iter().map(|v| (key, v.to_string())));
}

#[derive(Debug, Clone, Default)]
pub struct PlayerQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub search: Option<String>,
    pub team_ids: Vec<i64>,
}

impl PlayerQuery {
    pub fn search(term: &str, per_page: u32) -> Self {
        Self {
            search: Some(term.to_string()),
            per_page: Some(per_page),
            ..Default::default()
        }
    }

    fn params(&self) -> Params {
        let mut p = Params::new();
        if let Some(page) = self.page {
            p.push(("page", page.to_string()));
        }
        if let Some(per_page) = self.per_page {
            p.push(("per_page", per_page.to_string()));
        }
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            p.push(("search", search.to_string()));
        }
        push_all(&mut p, "team_ids[]", &self.team_ids);
        p
    }
}

#[derive(Debug, Clone, Default)]
pub struct GameQuery {
    pub page: Option<u32>,
    pub cursor: Option<i64>,
    pub per_page: Option<u32>,
    pub dates: Vec<String>,
    pub seasons: Vec<i32>,
    pub team_ids: Vec<i64>,
    pub postseason: Option<bool>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl GameQuery {
    fn params(&self) -> Params {
        let mut p = Params::new();
        if let Some(page) = self.page {
            p.push(("page", page.to_string()));
        }
        if let Some(cursor) = self.cursor {
            p.push(("cursor", cursor.to_string()));
        }
        if let Some(per_page) = self.per_page {
            p.push(("per_page", per_page.to_string()));
        }
        push_all(&mut p, "dates[]", &self.dates);
        push_all(&mut p, "seasons[]", &self.seasons);
        push_all(&mut p, "team_ids[]", &self.team_ids);
        if let Some(postseason) = self.postseason {
            p.push(("postseason", postseason.to_string()));
        }
        if let Some(start) = &self.start_date {
            p.push(("start_date", start.clone()));
        }
        if let Some(end) = &self.end_date {
            p.push(("end_date", end.clone()));
        }
        p
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatsQuery {
    pub cursor: Option<i64>,
    pub per_page: Option<u32>,
    pub player_ids: Vec<i64>,
    pub game_ids: Vec<i64>,
    pub seasons: Vec<i32>,
    pub dates: Vec<String>,
    pub postseason: Option<bool>,
}

impl StatsQuery {
    fn params(&self) -> Params {
        let mut p = Params::new();
        if let Some(cursor) = self.cursor {
            p.push(("cursor", cursor.to_string()));
        }
        if let Some(per_page) = self.per_page {
            p.push(("per_page", per_page.to_string()));
        }
        push_all(&mut p, "player_ids[]", &self.player_ids);
        push_all(&mut p, "game_ids[]", &self.game_ids);
        push_all(&mut p, "seasons[]", &self.seasons);
        push_all(&mut p, "dates[]", &self.dates);
        if let Some(postseason) = self.postseason {
            p.push(("postseason", postseason.to_string()));
        }
        p
    }
}

// ---------------------------------------------------------------------------
// PrimarySource
// ---------------------------------------------------------------------------

/// Read operations of the primary stats provider.
#[async_trait]
pub trait PrimarySource: Send + Sync {
    async fn players(&self, query: &PlayerQuery) -> Result<Envelope<Vec<Player>>>;
    async fn player(&self, id: i64) -> Result<Player>;
    async fn teams(&self) -> Result<Vec<Team>>;
    async fn team(&self, id: i64) -> Result<Team>;
    async fn games(&self, query: &GameQuery) -> Result<Envelope<Vec<Game>>>;
    async fn game(&self, id: i64) -> Result<Game>;
    async fn stats(&self, query: &StatsQuery) -> Result<Envelope<Vec<GamePlayerStats>>>;
    async fn season_averages(&self, season: i32, player_ids: &[i64]) -> Result<Vec<SeasonAverages>>;

    /// Every season from the draft year (or the earliest season the provider
    /// carries) through `current_season`, requested in parallel chunks.
    /// Failed and empty seasons are skipped. Sorted oldest first.
    async fn career_stats(
        &self,
        player_id: i64,
        draft_year: Option<i32>,
        current_season: i32,
    ) -> Result<Vec<SeasonAverages>> {
        let start = draft_year.unwrap_or(PRIMARY_EARLIEST_SEASON);
        let seasons: Vec<i32> = (start..=current_season).collect();
        let ids = [player_id];
        let mut all = Vec::new();

        for chunk in seasons.chunks(CAREER_CHUNK_SIZE) {
            let results = join_all(chunk.iter().map(|&season| self.season_averages(season, &ids))).await;
            for (season, result) in chunk.iter().zip(results) {
                match result {
                    Ok(rows) => all.extend(rows),
                    Err(e) => debug!(player_id, season, "Skipping career season: {e}"),
                }
            }
        }

        all.sort_by_key(|s| s.season);
        Ok(all)
    }
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct Single<T> {
    data: T,
}

#[derive(Deserialize)]
struct IdOnly {
    id: i64,
}

#[derive(Deserialize)]
struct WireStat {
    id: i64,
    player: IdOnly,
    game: GameSummary,
    #[serde(flatten)]
    line: StatLine,
}

impl From<WireStat> for GamePlayerStats {
    fn from(w: WireStat) -> Self {
        GamePlayerStats {
            id: w.id,
            player_id: w.player.id,
            game: w.game,
            line: w.line,
        }
    }
}

// ---------------------------------------------------------------------------
// PrimaryClient
// ---------------------------------------------------------------------------

pub struct PrimaryClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    max_retries: u32,
    backoff_base: Duration,
    metrics: Arc<Metrics>,
}

/// `base * 2^attempt`, saturating, and never longer than
/// `PRIMARY_BACKOFF_MAX_SECS`.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
        .min(Duration::from_secs(PRIMARY_BACKOFF_MAX_SECS))
}

impl PrimaryClient {
    pub fn new(cfg: &Config, metrics: Arc<Metrics>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(PRIMARY_REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.primary_api_url.trim_end_matches('/').to_string(),
            api_key: cfg.primary_api_key.clone(),
            max_retries: cfg.primary_max_retries.min(PRIMARY_MAX_RETRIES_CAP),
            backoff_base: Duration::from_millis(cfg.primary_backoff_base_ms),
            metrics,
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, params: &[(&'static str, String)]) -> Result<T> {
        let started = Instant::now();
        let result = self.get_with_retry(path, params).await;
        self.metrics.observe(Source::Primary, started.elapsed(), result.is_ok());
        result
    }

    /// HTTP 429 sleeps `base * 2^attempt` and retries, up to `max_retries`
    /// times. Any other non-2xx status fails on the spot.
    async fn get_with_retry<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&'static str, String)],
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0u32;
        loop {
            let mut req = self.client.get(&url).query(params);
            if let Some(key) = &self.api_key {
                req = req.header(AUTHORIZATION, key);
            }
            let resp = req.send().await.map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(Source::Primary)
                } else {
                    AppError::Http(e)
                }
            })?;

            let status = resp.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempt >= self.max_retries {
                    warn!(path, attempts = attempt + 1, "Primary provider still rate limited, giving up");
                    return Err(AppError::RateLimited(Source::Primary));
                }
                let delay = backoff_delay(self.backoff_base, attempt);
                warn!(path, attempt, delay_ms = delay.as_millis() as u64, "Primary provider rate limited, backing off");
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }
            if status == StatusCode::NOT_FOUND {
                return Err(AppError::NotFound(format!("primary provider {path}")));
            }
            if !status.is_success() {
                return Err(AppError::Upstream {
                    origin: Source::Primary,
                    status: status.as_u16(),
                });
            }

            let body = resp.bytes().await?;
            return serde_json::from_slice(&body).map_err(|e| AppError::Payload {
                origin: Source::Primary,
                detail: format!("{path}: {e}"),
            });
        }
    }
}

#[async_trait]
impl PrimarySource for PrimaryClient {
    async fn players(&self, query: &PlayerQuery) -> Result<Envelope<Vec<Player>>> {
        self.get("/players", &query.params()).await
    }

    async fn player(&self, id: i64) -> Result<Player> {
        let one: Single<Player> = self.get(&format!("/players/{id}"), &[]).await?;
        Ok(one.data)
    }

    async fn teams(&self) -> Result<Vec<Team>> {
        let all: Envelope<Vec<Team>> = self.get("/teams", &[]).await?;
        Ok(all.data)
    }

    async fn team(&self, id: i64) -> Result<Team> {
        let one: Single<Team> = self.get(&format!("/teams/{id}"), &[]).await?;
        Ok(one.data)
    }

    async fn games(&self, query: &GameQuery) -> Result<Envelope<Vec<Game>>> {
        self.get("/games", &query.params()).await
    }

    async fn game(&self, id: i64) -> Result<Game> {
        let one: Single<Game> = self.get(&format!("/games/{id}"), &[]).await?;
        Ok(one.data)
    }

    async fn stats(&self, query: &StatsQuery) -> Result<Envelope<Vec<GamePlayerStats>>> {
        let page: Envelope<Vec<WireStat>> = self.get("/stats", &query.params()).await?;
        Ok(Envelope {
            data: page.data.into_iter().map(GamePlayerStats::from).collect(),
            meta: page.meta,
        })
    }

    async fn season_averages(&self, season: i32, player_ids: &[i64]) -> Result<Vec<SeasonAverages>> {
        let mut params: Params = vec![("season", season.to_string())];
        push_all(&mut params, "player_ids[]", player_ids);
        let all: Envelope<Vec<SeasonAverages>> = self.get("/season_averages", &params).await?;
        Ok(all.data)
    }
}
