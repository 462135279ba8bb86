//! League stats proxy.
//!
//! The upstream rejects scripted clients without browser-like headers and
//! throttles hard, so every call is bounded twice: the HTTP client gives up
//! after `LEAGUE_SERVER_TIMEOUT_SECS`, and the caller after the shorter
//! `LEAGUE_CLIENT_TIMEOUT_SECS` so a slow proxy falls through to the next
//! source quickly. Leaders (the only fast endpoint) are cached per season and
//! served stale when a refresh fails; every other read degrades to empty.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ORIGIN, REFERER, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::api::health::Metrics;
use crate::cache::{Clock, TtlCache};
use crate::config::{
    Config, LEAGUE_CLIENT_TIMEOUT_SECS, LEAGUE_LEADERS_TTL_SECS, LEAGUE_SERVER_TIMEOUT_SECS,
    TEAM_DASH_TTL_SECS,
};
use crate::error::{AppError, Result};
use crate::resolve::identity::resolve_identity;
use crate::sources::{num, text};
use crate::types::{GamePlayerStats, GameSummary, Named, RosterPlayer, SeasonAverages, Source, StatLine};

// ---------------------------------------------------------------------------
// Endpoints & transport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeagueEndpoint {
    Leaders { season: String },
    TeamPlayerStats { team_id: i64, season: String },
    GameLog { player_id: i64, season: String },
}

impl LeagueEndpoint {
    pub fn path(&self) -> &'static str {
        match self {
            LeagueEndpoint::Leaders { .. } => "/leagueleaders",
            LeagueEndpoint::TeamPlayerStats { .. } => "/leaguedashplayerstats",
            LeagueEndpoint::GameLog { .. } => "/playergamelog",
        }
    }

    pub fn params(&self) -> Vec<(&'static str, String)> {
        let regular = || ("SeasonType", "Regular Season".to_string());
        match self {
            LeagueEndpoint::Leaders { season } => vec![
                ("LeagueID", "00".into()),
                ("PerMode", "PerGame".into()),
                ("Scope", "S".into()),
                ("Season", season.clone()),
                regular(),
                ("StatCategory", "PTS".into()),
            ],
            LeagueEndpoint::TeamPlayerStats { team_id, season } => {
                let mut p = vec![
                    ("MeasureType", "Base".to_string()),
                    ("PerMode", "PerGame".into()),
                    ("Season", season.clone()),
                    regular(),
                    ("TeamID", team_id.to_string()),
                    ("LeagueID", "00".into()),
                ];
                for key in ["PlusMinus", "PaceAdjust", "Rank"] {
                    p.push((key, "N".into()));
                }
                for key in ["Month", "OpponentTeamID", "Period", "LastNGames"] {
                    p.push((key, "0".into()));
                }
                for key in [
                    "Outcome",
                    "Location",
                    "SeasonSegment",
                    "DateFrom",
                    "DateTo",
                    "VsConference",
                    "VsDivision",
                    "GameSegment",
                    "ShotClockRange",
                ] {
                    p.push((key, String::new()));
                }
                p
            }
            LeagueEndpoint::GameLog { player_id, season } => vec![
                ("PlayerID", player_id.to_string()),
                ("Season", season.clone()),
                regular(),
                ("LeagueID", "00".into()),
            ],
        }
    }
}

/// Raw access to the league stats upstream.
#[async_trait]
pub trait LeagueUpstream: Send + Sync {
    async fn fetch(&self, endpoint: &LeagueEndpoint) -> Result<Value>;
}

#[async_trait]
impl<T: LeagueUpstream + ?Sized> LeagueUpstream for Arc<T> {
    async fn fetch(&self, endpoint: &LeagueEndpoint) -> Result<Value> {
        (**self).fetch(endpoint).await
    }
}

/// League client over a type-erased transport, as held by the resolvers.
pub type SharedLeague = LeagueStats<Arc<dyn LeagueUpstream>>;

/// Production transport with the spoofed header set.
pub struct NbaStatsHttp {
    client: reqwest::Client,
    base_url: String,
    metrics: Arc<Metrics>,
}

impl NbaStatsHttp {
    pub fn new(cfg: &Config, metrics: Arc<Metrics>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            ),
        );
        headers.insert(REFERER, HeaderValue::from_static("https://stats.nba.com/"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
        headers.insert(ORIGIN, HeaderValue::from_static("https://stats.nba.com"));
        headers.insert("x-nba-stats-token", HeaderValue::from_static("true"));
        headers.insert("x-nba-stats-origin", HeaderValue::from_static("stats"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(LEAGUE_SERVER_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.league_stats_url.trim_end_matches('/').to_string(),
            metrics,
        })
    }

    async fn send(&self, endpoint: &LeagueEndpoint) -> Result<Value> {
        let url = format!("{}{}", self.base_url, endpoint.path());
        let resp = self
            .client
            .get(&url)
            .query(&endpoint.params())
            .send()
            .await
            .map_err(|e| if e.is_timeout() { AppError::Timeout(Source::League) } else { AppError::Http(e) })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::Upstream { origin: Source::League, status: status.as_u16() });
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl LeagueUpstream for NbaStatsHttp {
    async fn fetch(&self, endpoint: &LeagueEndpoint) -> Result<Value> {
        let started = Instant::now();
        let result = self.send(endpoint).await;
        self.metrics.observe(Source::League, started.elapsed(), result.is_ok());
        result
    }
}

// ---------------------------------------------------------------------------
// Tabular payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ResultSet {
    #[serde(default)]
    name: String,
    headers: Vec<String>,
    #[serde(rename = "rowSet", default)]
    row_set: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct Tabular {
    #[serde(rename = "resultSet")]
    result_set: Option<ResultSet>,
    #[serde(rename = "resultSets", default)]
    result_sets: Vec<ResultSet>,
}

/// One row of a result set, addressed by column header.
#[derive(Debug, Clone)]
pub struct Row(HashMap<String, Value>);

impl Row {
    fn get(&self, col: &str) -> Option<&Value> {
        self.0.get(col)
    }

    fn f64(&self, col: &str) -> f64 {
        num(self.get(col))
    }

    fn i64(&self, col: &str) -> i64 {
        self.f64(col) as i64
    }

    fn str(&self, col: &str) -> String {
        text(self.get(col))
    }

    /// First present column among `cols`. The game log spells its ID
    /// column differently between seasons.
    fn str_any(&self, cols: &[&str]) -> String {
        cols.iter()
            .map(|c| self.str(c))
            .find(|s| !s.is_empty())
            .unwrap_or_default()
    }
}

/// Decode `resultSet` / `resultSets` into rows. With `name`, picks the set
/// of that name; otherwise the single `resultSet` or the first of `resultSets`.
pub fn decode_rows(payload: Value, name: Option<&str>) -> Result<Vec<Row>> {
    let tab: Tabular = serde_json::from_value(payload).map_err(|e| AppError::Payload {
        origin: Source::League,
        detail: e.to_string(),
    })?;
    let Tabular { result_set, result_sets } = tab;

    let set = match name {
        Some(n) => result_sets.into_iter().chain(result_set).find(|s| s.name == n),
        None => result_set.or_else(|| result_sets.into_iter().next()),
    }
    .ok_or_else(|| AppError::Payload {
        origin: Source::League,
        detail: "no result set in response".to_string(),
    })?;

    Ok(set
        .row_set
        .into_iter()
        .map(|values| Row(set.headers.iter().cloned().zip(values).collect()))
        .collect())
}

// ---------------------------------------------------------------------------
// Decoded records
// ---------------------------------------------------------------------------

/// One qualified player from the leaders table, keyed by league ID.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderLine {
    pub player_id: i64,
    pub player_name: String,
    pub team_id: i64,
    pub team_abbreviation: String,
    pub games_played: i64,
    pub line: StatLine,
}

impl Named for LeaderLine {
    fn display_name(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.player_name)
    }
}

impl LeaderLine {
    fn from_row(row: &Row, name_col: &str, team_col: &str) -> Self {
        Self {
            player_id: row.i64("PLAYER_ID"),
            player_name: row.str(name_col),
            team_id: row.i64("TEAM_ID"),
            team_abbreviation: row.str(team_col),
            games_played: row.i64("GP"),
            line: stat_line(row),
        }
    }

    /// Re-key under the caller's player ID so the record is interchangeable
    /// with store and primary-provider season averages.
    pub fn into_season_averages(self, player_id: i64, season: i32) -> SeasonAverages {
        SeasonAverages {
            id: 0,
            player_id,
            season,
            games_played: self.games_played,
            line: self.line,
        }
    }

    fn into_roster_player(self) -> RosterPlayer {
        RosterPlayer {
            player_id: self.player_id,
            player_name: self.player_name,
            gp: self.games_played,
            min: self.line.min.parse().unwrap_or(0.0),
            pts: self.line.pts,
            reb: self.line.reb,
            ast: self.line.ast,
            stl: self.line.stl,
            blk: self.line.blk,
            tov: self.line.turnover,
            fg_pct: self.line.fg_pct,
            fg3_pct: self.line.fg3_pct,
            ft_pct: self.line.ft_pct,
        }
    }
}

fn stat_line(row: &Row) -> StatLine {
    let min = row.f64("MIN");
    StatLine {
        min: if min.fract() == 0.0 { format!("{min:.0}") } else { format!("{min:.1}") },
        pts: row.f64("PTS"),
        reb: row.f64("REB"),
        ast: row.f64("AST"),
        stl: row.f64("STL"),
        blk: row.f64("BLK"),
        turnover: row.f64("TOV"),
        fg_pct: row.f64("FG_PCT"),
        fg3_pct: row.f64("FG3_PCT"),
        ft_pct: row.f64("FT_PCT"),
        fgm: row.f64("FGM"),
        fga: row.f64("FGA"),
        fg3m: row.f64("FG3M"),
        fg3a: row.f64("FG3A"),
        ftm: row.f64("FTM"),
        fta: row.f64("FTA"),
        oreb: row.f64("OREB"),
        dreb: row.f64("DREB"),
        pf: row.f64("PF"),
    }
}

/// `"OCT 22, 2024"` → `"2024-10-22"`. Unparseable dates pass through.
fn league_date(raw: &str) -> String {
    NaiveDate::parse_from_str(raw.trim(), "%b %d, %Y")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

fn game_log_entry(row: &Row, season: i32) -> GamePlayerStats {
    let game_id = row.str_any(&["Game_ID", "GAME_ID"]);
    GamePlayerStats {
        id: 0,
        player_id: row.i64("Player_ID").max(row.i64("PLAYER_ID")),
        game: GameSummary {
            id: game_id.trim_start_matches('0').parse().unwrap_or(0),
            date: league_date(&row.str("GAME_DATE")),
            season,
            home_team_id: 0,
            home_team_score: 0,
            visitor_team_id: 0,
            visitor_team_score: 0,
        },
        line: stat_line(row),
    }
}

// ---------------------------------------------------------------------------
// LeagueStats
// ---------------------------------------------------------------------------

pub struct LeagueStats<U> {
    upstream: U,
    leaders: TtlCache<String, Vec<LeaderLine>>,
    team_dash: TtlCache<(i64, String), Vec<RosterPlayer>>,
    client_timeout: Duration,
}

impl<U: LeagueUpstream> LeagueStats<U> {
    pub fn new(upstream: U, clock: Arc<dyn Clock>) -> Self {
        Self {
            upstream,
            leaders: TtlCache::new(Duration::from_secs(LEAGUE_LEADERS_TTL_SECS), clock.clone()),
            team_dash: TtlCache::new(Duration::from_secs(TEAM_DASH_TTL_SECS), clock),
            client_timeout: Duration::from_secs(LEAGUE_CLIENT_TIMEOUT_SECS),
        }
    }

    async fn fetch_bounded(&self, endpoint: &LeagueEndpoint) -> Result<Value> {
        tokio::time::timeout(self.client_timeout, self.upstream.fetch(endpoint))
            .await
            .map_err(|_| AppError::Timeout(Source::League))?
    }

    /// Every qualified player for `season` (`"2024-25"`). Served stale for
    /// the same season when a refresh fails.
    pub async fn league_leaders(&self, season: &str) -> Result<Arc<Vec<LeaderLine>>> {
        self.leaders
            .fetch_through(season.to_string(), true, || async {
                let payload = self
                    .fetch_bounded(&LeagueEndpoint::Leaders { season: season.to_string() })
                    .await?;
                let rows = decode_rows(payload, None)?;
                let leaders: Vec<LeaderLine> = rows
                    .iter()
                    .map(|r| LeaderLine::from_row(r, "PLAYER", "TEAM"))
                    .collect();
                debug!(season, players = leaders.len(), "League leaders refreshed");
                Ok(leaders)
            })
            .await
    }

    async fn find_leader(&self, first: &str, last: &str, season: &str) -> Result<Option<LeaderLine>> {
        let leaders = self.league_leaders(season).await?;
        Ok(resolve_identity(&leaders, first, last).cloned())
    }

    pub async fn find_player_id(&self, first: &str, last: &str, season: &str) -> Option<i64> {
        match self.find_leader(first, last, season).await {
            Ok(hit) => hit.map(|l| l.player_id),
            Err(e) => {
                warn!(first, last, season, "League player ID lookup failed: {e}");
                None
            }
        }
    }

    pub async fn player_season_averages(&self, first: &str, last: &str, season: &str) -> Option<LeaderLine> {
        match self.find_leader(first, last, season).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(first, last, season, "League season averages failed: {e}");
                None
            }
        }
    }

    /// Per-game lines for one league player ID. Not cached; any failure
    /// yields an empty log.
    pub async fn player_game_log(&self, league_player_id: i64, season: &str) -> Vec<GamePlayerStats> {
        let endpoint = LeagueEndpoint::GameLog { player_id: league_player_id, season: season.to_string() };
        let season_year = crate::season::parse_season_string(season).unwrap_or_default();
        let rows = match self.fetch_bounded(&endpoint).await {
            Ok(payload) => decode_rows(payload, Some("PlayerGameLog")),
            Err(e) => Err(e),
        };
        match rows {
            Ok(rows) => rows.iter().map(|r| game_log_entry(r, season_year)).collect(),
            Err(e) => {
                warn!(league_player_id, season, "League game log unavailable: {e}");
                Vec::new()
            }
        }
    }

    /// Qualified players only, filtered out of the leaders table.
    pub async fn team_roster_stats(&self, abbreviation: &str, season: &str) -> Vec<RosterPlayer> {
        match self.league_leaders(season).await {
            Ok(leaders) => leaders
                .iter()
                .filter(|l| l.team_abbreviation.eq_ignore_ascii_case(abbreviation))
                .cloned()
                .map(LeaderLine::into_roster_player)
                .collect(),
            Err(e) => {
                warn!(abbreviation, season, "League roster stats failed: {e}");
                Vec::new()
            }
        }
    }

    /// Every player with a game for the team, from the per-team dash table.
    /// Falls back to the leaders-filtered roster when that fails.
    pub async fn full_team_roster_stats(&self, abbreviation: &str, team_id: i64, season: &str) -> Vec<RosterPlayer> {
        let dash = self
            .team_dash
            .fetch_through((team_id, season.to_string()), false, || async {
                let endpoint = LeagueEndpoint::TeamPlayerStats { team_id, season: season.to_string() };
                let rows = decode_rows(self.fetch_bounded(&endpoint).await?, None)?;
                Ok(rows
                    .iter()
                    .map(|r| LeaderLine::from_row(r, "PLAYER_NAME", "TEAM_ABBREVIATION").into_roster_player())
                    .collect())
            })
            .await;

        match dash {
            Ok(players) => players.as_ref().clone(),
            Err(e) => {
                warn!(team_id, season, "Team dash stats failed, using leaders: {e}");
                self.team_roster_stats(abbreviation, season).await
            }
        }
    }
}
