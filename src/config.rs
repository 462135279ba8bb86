use crate::error::{AppError, Result};

pub const PRIMARY_API_URL: &str = "https://api.balldontlie.io/v1";
pub const LEAGUE_STATS_URL: &str = "https://stats.nba.com/stats";
pub const SCOREBOARD_CDN_URL: &str =
    "https://cdn.nba.com/static/json/liveData/scoreboard/todaysScoreboard_00.json";
pub const ODDS_API_URL: &str = "https://api.the-odds-api.com/v4";

/// Sport key used for every odds-provider request.
pub const ODDS_SPORT: &str = "basketball_nba";

/// Primary provider: retries on HTTP 429 only, sleeping `base * 2^attempt` between tries.
pub const PRIMARY_MAX_RETRIES: u32 = 3;
pub const PRIMARY_BACKOFF_BASE_MS: u64 = 1_000;
/// Upper bounds on the env-tunable retry policy.
pub const PRIMARY_MAX_RETRIES_CAP: u32 = 10;
pub const PRIMARY_BACKOFF_MAX_SECS: u64 = 60;
pub const PRIMARY_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Earliest season the primary provider carries reliable season averages for.
pub const PRIMARY_EARLIEST_SEASON: i32 = 2015;

/// Season averages are requested this many seasons at a time when building a career.
pub const CAREER_CHUNK_SIZE: usize = 8;

/// League stats proxy timeouts. The caller gives up before the upstream request
/// does, so a hung request falls through to the next source quickly.
pub const LEAGUE_SERVER_TIMEOUT_SECS: u64 = 12;
pub const LEAGUE_CLIENT_TIMEOUT_SECS: u64 = 5;

/// League leaders cache TTL, keyed by season.
pub const LEAGUE_LEADERS_TTL_SECS: u64 = 10 * 60;

/// Per-team roster stats cache TTL, keyed by (team, season).
pub const TEAM_DASH_TTL_SECS: u64 = 30 * 60;

/// Live scoreboard cache TTL, keyed by date.
pub const SCOREBOARD_TTL_SECS: u64 = 15;
pub const SCOREBOARD_TIMEOUT_SECS: u64 = 10;

/// Odds caches: game markets move slowly, award futures barely at all.
pub const GAME_ODDS_TTL_SECS: u64 = 10 * 60;
pub const AWARD_FUTURES_TTL_SECS: u64 = 7 * 24 * 3600;
pub const ODDS_TIMEOUT_SECS: u64 = 15;

/// Live polling cadence.
pub const LIVE_POLL_SECS: u64 = 30;
pub const SCHEDULED_POLL_SECS: u64 = 5 * 60;
/// How long the poller idles after every game of the day is final.
pub const POLL_IDLE_RECHECK_SECS: u64 = 60 * 60;

/// Standings walk: pages of 100 games, capped.
pub const STANDINGS_PAGE_SIZE: u32 = 100;
pub const STANDINGS_MAX_PAGES: u32 = 20;

/// Search limits.
pub const SEARCH_DEFAULT_LIMIT: usize = 10;
pub const SEARCH_ALL_LIMIT: usize = 1000;
/// Rows asked of the primary provider per search, before deduplication.
pub const SEARCH_REMOTE_ROWS: usize = 50;

/// Award futures: candidates returned per category.
pub const AWARD_TOP_N: usize = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub primary_api_url: String,
    /// Sent as the Authorization header when set (PRIMARY_API_KEY)
    pub primary_api_key: Option<String>,
    pub primary_max_retries: u32,
    pub primary_backoff_base_ms: u64,
    pub league_stats_url: String,
    pub scoreboard_cdn_url: String,
    pub odds_api_url: String,
    /// Odds endpoints are skipped entirely without a key (ODDS_API_KEY)
    pub odds_api_key: Option<String>,
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            primary_api_url: PRIMARY_API_URL.to_string(),
            primary_api_key: None,
            primary_max_retries: PRIMARY_MAX_RETRIES,
            primary_backoff_base_ms: PRIMARY_BACKOFF_BASE_MS,
            league_stats_url: LEAGUE_STATS_URL.to_string(),
            scoreboard_cdn_url: SCOREBOARD_CDN_URL.to_string(),
            odds_api_url: ODDS_API_URL.to_string(),
            odds_api_key: None,
            log_level: "info".to_string(),
            db_path: "statline.db".to_string(),
            api_port: 3000,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            primary_api_url: std::env::var("PRIMARY_API_URL")
                .unwrap_or_else(|_| PRIMARY_API_URL.to_string()),
            primary_api_key: non_empty_var("PRIMARY_API_KEY"),
            primary_max_retries: std::env::var("PRIMARY_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(PRIMARY_MAX_RETRIES)
                .min(PRIMARY_MAX_RETRIES_CAP),
            primary_backoff_base_ms: std::env::var("PRIMARY_BACKOFF_BASE_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(PRIMARY_BACKOFF_BASE_MS),
            league_stats_url: std::env::var("LEAGUE_STATS_URL")
                .unwrap_or_else(|_| LEAGUE_STATS_URL.to_string()),
            scoreboard_cdn_url: std::env::var("SCOREBOARD_CDN_URL")
                .unwrap_or_else(|_| SCOREBOARD_CDN_URL.to_string()),
            odds_api_url: std::env::var("ODDS_API_URL")
                .unwrap_or_else(|_| ODDS_API_URL.to_string()),
            odds_api_key: non_empty_var("ODDS_API_KEY"),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "statline.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
