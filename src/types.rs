use serde::{Deserialize, Deserializer, Serialize};
use std::borrow::Cow;

use crate::error::AppError;

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Where a resolved record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Local relational store, populated by the scheduled sync.
    Db,
    /// Primary stats provider.
    Primary,
    /// League stats proxy.
    League,
    /// Live scoreboard feed.
    Live,
    /// Betting-odds provider.
    Odds,
}

impl Source {
    pub const ALL: [Source; 5] = [
        Source::Db,
        Source::Primary,
        Source::League,
        Source::Live,
        Source::Odds,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Source::Db => "db",
            Source::Primary => "primary",
            Source::League => "league",
            Source::Live => "live",
            Source::Odds => "odds",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A value tagged with the source that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct Sourced<T> {
    pub source: Source,
    pub data: T,
}

// ---------------------------------------------------------------------------
// Player identifiers
// ---------------------------------------------------------------------------

/// Route-level player identifier. Plain numbers are local-store IDs; the
/// `bdl-` prefix marks an ID taken from primary-provider search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerKey {
    Local(i64),
    Foreign(i64),
}

pub const FOREIGN_ID_PREFIX: &str = "bdl-";

impl PlayerKey {
    pub fn id(self) -> i64 {
        match self {
            PlayerKey::Local(id) | PlayerKey::Foreign(id) => id,
        }
    }
}

impl std::str::FromStr for PlayerKey {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (raw, foreign) = match s.strip_prefix(FOREIGN_ID_PREFIX) {
            Some(rest) => (rest, true),
            None => (s, false),
        };
        let id = raw
            .parse::<i64>()
            .ok()
            .filter(|id| *id > 0)
            .ok_or_else(|| AppError::BadRequest(format!("invalid player id: {s}")))?;
        Ok(if foreign {
            PlayerKey::Foreign(id)
        } else {
            PlayerKey::Local(id)
        })
    }
}

impl std::fmt::Display for PlayerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerKey::Local(id) => write!(f, "{id}"),
            PlayerKey::Foreign(id) => write!(f, "{FOREIGN_ID_PREFIX}{id}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Teams & players
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub city: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub full_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub abbreviation: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub conference: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub division: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub first_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub last_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub position: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub height: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub weight: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub jersey_number: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub college: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub country: String,
    #[serde(default)]
    pub draft_year: Option<i32>,
    #[serde(default)]
    pub draft_round: Option<i32>,
    #[serde(default)]
    pub draft_number: Option<i32>,
    #[serde(default)]
    pub team: Option<Team>,
}

impl Player {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
    }
}

/// Anything carrying a human name that identity matching can compare.
pub trait Named {
    fn display_name(&self) -> Cow<'_, str>;
}

impl Named for Player {
    fn display_name(&self) -> Cow<'_, str> {
        Cow::Owned(self.full_name())
    }
}

/// A player as returned by a single-player endpoint, with the latest season
/// line attached when the local store has one.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerDetail {
    #[serde(flatten)]
    pub player: Player,
    pub season_averages: Option<SeasonAverages>,
}

/// One merged search result. `key` is the route-level identifier
/// (`"123"` or `"bdl-123"`) to use for follow-up lookups.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub key: String,
    pub source: Source,
    #[serde(flatten)]
    pub player: Player,
}

/// A team with its current roster, each player carrying their latest season.
#[derive(Debug, Clone, Serialize)]
pub struct TeamDetail {
    #[serde(flatten)]
    pub team: Team,
    pub players: Vec<PlayerDetail>,
}

// ---------------------------------------------------------------------------
// Stat lines
// ---------------------------------------------------------------------------

/// Per-game box-score numbers shared by season averages, game logs and
/// career totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatLine {
    #[serde(default, deserialize_with = "null_as_default")]
    pub min: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub pts: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reb: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ast: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub stl: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub blk: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub turnover: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fg_pct: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fg3_pct: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ft_pct: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fgm: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fga: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fg3m: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fg3a: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ftm: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fta: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub oreb: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub dreb: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub pf: f64,
}

/// One record per (player_id, season).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonAverages {
    #[serde(default)]
    pub id: i64,
    pub player_id: i64,
    pub season: i32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub games_played: i64,
    #[serde(flatten)]
    pub line: StatLine,
}

/// Minimal game reference embedded in a per-player game line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSummary {
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub date: String,
    #[serde(default)]
    pub season: i32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub home_team_id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub home_team_score: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub visitor_team_id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub visitor_team_score: i64,
}

/// One record per (game_id, player_id).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GamePlayerStats {
    pub id: i64,
    pub player_id: i64,
    pub game: GameSummary,
    #[serde(flatten)]
    pub line: StatLine,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CareerTotals {
    pub games_played: i64,
    #[serde(flatten)]
    pub line: StatLine,
}

#[derive(Debug, Clone, Serialize)]
pub struct Career {
    pub seasons: Vec<SeasonAverages>,
    pub totals: CareerTotals,
}

/// League-proxy roster line for one player on one team.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RosterPlayer {
    pub player_id: i64,
    pub player_name: String,
    pub gp: i64,
    pub min: f64,
    pub pts: f64,
    pub reb: f64,
    pub ast: f64,
    pub stl: f64,
    pub blk: f64,
    pub tov: f64,
    pub fg_pct: f64,
    pub fg3_pct: f64,
    pub ft_pct: f64,
}

// ---------------------------------------------------------------------------
// Games
// ---------------------------------------------------------------------------

/// Three-state game lifecycle. Ordered so that `max` never moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum GameStatus {
    Scheduled,
    InProgress,
    Final,
}

impl GameStatus {
    /// Lenient parse of the status strings seen across sources: our own
    /// snake_case values, the store's `IN_PROGRESS`, and the primary
    /// provider's free text ("Final", "3rd Qtr", "Halftime", a tip-off time).
    pub fn parse_lenient(raw: &str) -> Self {
        let s = raw.trim().to_ascii_lowercase().replace(' ', "_");
        if s.starts_with("final") {
            GameStatus::Final
        } else if s == "in_progress"
            || s.contains("qtr")
            || s.contains("quarter")
            || s.contains("half")
            || s.ends_with("ot")
            || s == "live"
        {
            GameStatus::InProgress
        } else {
            GameStatus::Scheduled
        }
    }

    /// Never regresses: the later of the known and observed states wins.
    pub fn advance(self, observed: GameStatus) -> GameStatus {
        self.max(observed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GameStatus::Scheduled => "scheduled",
            GameStatus::InProgress => "in_progress",
            GameStatus::Final => "final",
        }
    }
}

impl From<String> for GameStatus {
    fn from(s: String) -> Self {
        GameStatus::parse_lenient(&s)
    }
}

impl std::fmt::Display for GameStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub id: i64,
    #[serde(deserialize_with = "date_only")]
    pub date: String,
    pub season: i32,
    pub status: GameStatus,
    #[serde(default, deserialize_with = "null_as_default")]
    pub period: i32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub time: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub postseason: bool,
    pub home_team: Team,
    #[serde(default, deserialize_with = "null_as_default")]
    pub home_team_score: i64,
    pub visitor_team: Team,
    #[serde(default, deserialize_with = "null_as_default")]
    pub visitor_team_score: i64,
}

impl Game {
    /// Final with both scores reported. Missing scores deserialize to 0
    /// (`null_as_default` above), and no NBA team finishes a game on 0, so
    /// a 0 here means the provider never filled the score in.
    pub fn has_final_score(&self) -> bool {
        self.status == GameStatus::Final && self.home_team_score > 0 && self.visitor_team_score > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StandingsRow {
    pub team_id: i64,
    pub wins: u32,
    pub losses: u32,
}

// ---------------------------------------------------------------------------
// Response envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub total_count: Option<u64>,
    #[serde(default)]
    pub current_page: Option<u32>,
    #[serde(default)]
    pub total_pages: Option<u32>,
    #[serde(default)]
    pub per_page: Option<u32>,
    #[serde(default)]
    pub next_page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_live_games: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_poll_ms: Option<u64>,
}

impl Meta {
    /// Meta for a result set delivered in one page.
    pub fn single_page(count: usize, per_page: usize) -> Self {
        Self {
            total_count: Some(count as u64),
            current_page: Some(1),
            total_pages: Some(1),
            per_page: Some(per_page as u32),
            next_page: None,
            ..Default::default()
        }
    }
}

/// `{ data, meta? }`, the shape the primary provider uses, so local and
/// provider results are interchangeable for consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl<T> Envelope<T> {
    pub fn with_meta(data: T, meta: Meta) -> Self {
        Self { data, meta: Some(meta) }
    }
}

impl<T> Envelope<Vec<T>> {
    pub fn single_page(data: Vec<T>) -> Self {
        let n = data.len();
        Self::with_meta(data, Meta::single_page(n, n))
    }
}

// ---------------------------------------------------------------------------
// Odds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Moneyline {
    pub home: f64,
    pub away: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpreadLine {
    pub home: f64,
    pub away: f64,
    pub home_point: f64,
    pub away_point: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TotalLine {
    pub over: f64,
    pub under: f64,
    pub point: f64,
}

/// Per-request odds snapshot for one game. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameOdds {
    pub event_id: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: String,
    pub moneyline: Option<Moneyline>,
    pub spread: Option<SpreadLine>,
    pub total: Option<TotalLine>,
    pub home_win_prob: f64,
    pub away_win_prob: f64,
    pub bookmaker: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AwardCategory {
    Mvp,
    Champion,
    Roty,
    Dpoy,
    SixthMan,
    Mip,
}

impl AwardCategory {
    pub const ALL: [AwardCategory; 6] = [
        AwardCategory::Mvp,
        AwardCategory::Champion,
        AwardCategory::Roty,
        AwardCategory::Dpoy,
        AwardCategory::SixthMan,
        AwardCategory::Mip,
    ];

    /// Outright market key on the odds provider.
    pub fn sport_key(self) -> &'static str {
        match self {
            AwardCategory::Mvp => "basketball_nba_mvp",
            AwardCategory::Champion => "basketball_nba_championship_winner",
            AwardCategory::Roty => "basketball_nba_rookie_of_the_year",
            AwardCategory::Dpoy => "basketball_nba_defensive_player_of_the_year",
            AwardCategory::SixthMan => "basketball_nba_sixth_man_of_the_year",
            AwardCategory::Mip => "basketball_nba_most_improved_player",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AwardCategory::Mvp => "Most Valuable Player",
            AwardCategory::Champion => "NBA Champion",
            AwardCategory::Roty => "Rookie of the Year",
            AwardCategory::Dpoy => "Defensive Player of the Year",
            AwardCategory::SixthMan => "Sixth Man of the Year",
            AwardCategory::Mip => "Most Improved Player",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AwardCandidate {
    pub rank: usize,
    pub name: String,
    /// American odds as quoted.
    pub odds: f64,
    /// Vig-normalized implied probability, 0..=100.
    pub probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AwardPrediction {
    pub category: AwardCategory,
    pub label: &'static str,
    pub bookmaker: Option<String>,
    pub candidates: Vec<AwardCandidate>,
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

/// Treats an explicit JSON `null` like a missing field.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Keeps only the `YYYY-MM-DD` prefix of an ISO timestamp.
fn date_only<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: String = null_as_default(deserializer)?;
    Ok(raw.get(..10).unwrap_or(&raw).to_string())
}
