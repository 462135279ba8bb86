use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ORIGIN, REFERER, USER_AGENT};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::api::health::Metrics;
use crate::cache::{Clock, TtlCache};
use crate::config::{Config, SCOREBOARD_TIMEOUT_SECS, SCOREBOARD_TTL_SECS};
use crate::error::{AppError, Result};
use crate::season::current_season;
use crate::types::{Game, GameStatus, Source, Team};

/// Live scoreboard for one calendar date.
#[async_trait]
pub trait ScoreboardFeed: Send + Sync {
    async fn scoreboard(&self, date: NaiveDate, is_today: bool) -> Result<Arc<Vec<Game>>>;
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ScoreboardDoc {
    #[serde(default)]
    scoreboard: Option<Scoreboard>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Scoreboard {
    #[serde(default)]
    game_date: String,
    #[serde(default)]
    games: Vec<LiveGame>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LiveGame {
    game_id: String,
    game_status: i32,
    #[serde(default)]
    game_status_text: String,
    #[serde(default)]
    period: i32,
    #[serde(default)]
    game_clock: String,
    home_team: LiveTeam,
    away_team: LiveTeam,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LiveTeam {
    team_id: i64,
    #[serde(default)]
    team_tricode: String,
    #[serde(default)]
    team_city: String,
    #[serde(default)]
    team_name: String,
    #[serde(default)]
    score: i64,
}

impl From<LiveTeam> for Team {
    fn from(t: LiveTeam) -> Self {
        Team {
            id: t.team_id,
            full_name: format!("{} {}", t.team_city, t.team_name).trim().to_string(),
            name: t.team_name,
            city: t.team_city,
            abbreviation: t.team_tricode,
            conference: String::new(),
            division: String::new(),
        }
    }
}

/// Feed status codes: 1 scheduled, 2 live, 3 final.
fn status_from_code(code: i32) -> GameStatus {
    match code {
        2 => GameStatus::InProgress,
        3 => GameStatus::Final,
        _ => GameStatus::Scheduled,
    }
}

/// ISO-8601 clock `"PT05M42.00S"` → `"5:42"`. Anything else passes through.
pub fn parse_game_clock(clock: &str) -> String {
    let parsed = clock.strip_prefix("PT").and_then(|rest| {
        let (min, sec) = rest.split_once('M')?;
        let min: u32 = min.parse().ok()?;
        let sec: f64 = sec.strip_suffix('S')?.parse().ok()?;
        Some(format!("{}:{:02}", min, sec.floor() as u32))
    });
    parsed.unwrap_or_else(|| clock.to_string())
}

fn map_games(board: Scoreboard, fallback_date: NaiveDate) -> Vec<Game> {
    let date = NaiveDate::parse_from_str(&board.game_date, "%Y-%m-%d").unwrap_or(fallback_date);
    let season = current_season(date);
    board
        .games
        .into_iter()
        .map(|g| {
            let status = status_from_code(g.game_status);
            let time = if status == GameStatus::InProgress {
                parse_game_clock(&g.game_clock)
            } else {
                g.game_status_text
            };
            Game {
                id: g.game_id.parse().unwrap_or(0),
                date: date.format("%Y-%m-%d").to_string(),
                season,
                status,
                period: g.period,
                time,
                postseason: false,
                home_team_score: g.home_team.score,
                home_team: g.home_team.into(),
                visitor_team_score: g.away_team.score,
                visitor_team: g.away_team.into(),
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// ScoreboardClient
// ---------------------------------------------------------------------------

/// CDN "today" document first, the stats scoreboard endpoint second. Results
/// are cached per date and served stale when both sources fail.
pub struct ScoreboardClient {
    cdn: reqwest::Client,
    stats: reqwest::Client,
    cdn_url: String,
    stats_url: String,
    cache: TtlCache<NaiveDate, Vec<Game>>,
    metrics: Arc<Metrics>,
}

impl ScoreboardClient {
    pub fn new(cfg: &Config, clock: Arc<dyn Clock>, metrics: Arc<Metrics>) -> Result<Self> {
        let timeout = Duration::from_secs(SCOREBOARD_TIMEOUT_SECS);
        let cdn = reqwest::Client::builder().timeout(timeout).build()?;

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            ),
        );
        headers.insert(REFERER, HeaderValue::from_static("https://www.nba.com/"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
        headers.insert(ORIGIN, HeaderValue::from_static("https://www.nba.com"));
        let stats = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            cdn,
            stats,
            cdn_url: cfg.scoreboard_cdn_url.clone(),
            stats_url: format!("{}/scoreboardv3", cfg.league_stats_url.trim_end_matches('/')),
            cache: TtlCache::new(Duration::from_secs(SCOREBOARD_TTL_SECS), clock),
            metrics,
        })
    }

    async fn fetch_doc(&self, req: reqwest::RequestBuilder) -> Result<Option<Scoreboard>> {
        let started = Instant::now();
        let result = async {
            let resp = req
                .send()
                .await
                .map_err(|e| if e.is_timeout() { AppError::Timeout(Source::Live) } else { AppError::Http(e) })?;
            let status = resp.status();
            if !status.is_success() {
                return Err(AppError::Upstream { origin: Source::Live, status: status.as_u16() });
            }
            Ok(resp.json::<ScoreboardDoc>().await?.scoreboard)
        }
        .await;
        self.metrics.observe(Source::Live, started.elapsed(), result.is_ok());
        result
    }

    async fn fetch_fresh(&self, date: NaiveDate, is_today: bool) -> Result<Vec<Game>> {
        if is_today {
            match self.fetch_doc(self.cdn.get(&self.cdn_url)).await {
                Ok(Some(board)) => return Ok(map_games(board, date)),
                Ok(None) => debug!("CDN scoreboard had no games block, trying stats endpoint"),
                Err(e) => warn!("CDN scoreboard failed, trying stats endpoint: {e}"),
            }
        }

        let req = self
            .stats
            .get(&self.stats_url)
            .query(&[("GameDate", date.format("%Y-%m-%d").to_string()), ("LeagueID", "00".to_string())]);
        Ok(self
            .fetch_doc(req)
            .await?
            .map(|board| map_games(board, date))
            .unwrap_or_default())
    }
}

#[async_trait]
impl ScoreboardFeed for ScoreboardClient {
    async fn scoreboard(&self, date: NaiveDate, is_today: bool) -> Result<Arc<Vec<Game>>> {
        self.cache
            .fetch_through(date, true, || self.fetch_fresh(date, is_today))
            .await
    }
}
