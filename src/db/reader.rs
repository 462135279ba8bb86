use chrono::NaiveDate;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::db::models::{GamePlayerStatsRow, GameRow, PlayerRow, PlayerStatsRow, TeamRow};
use crate::error::Result;
use crate::resolve::identity::resolve_identity;
use crate::season::season_string;
use crate::types::{Game, GamePlayerStats, Player, PlayerDetail, SeasonAverages, Team, TeamDetail};

const PLAYER_SELECT: &str = "
    SELECT p.id, p.first_name, p.last_name, p.position, p.height, p.weight,
           p.jersey_number, p.college, p.country,
           p.draft_year, p.draft_round, p.draft_number,
           t.id AS t_id, t.name AS t_name, t.city AS t_city,
           t.abbreviation AS t_abbreviation, t.conference AS t_conference,
           t.division AS t_division
    FROM players p
    LEFT JOIN teams t ON t.id = p.team_id";

const GAME_SELECT: &str = "
    SELECT g.id, g.date, g.season, g.status, g.period, g.time_remaining, g.postseason,
           g.home_score, g.away_score,
           h.id AS h_id, h.name AS h_name, h.city AS h_city, h.abbreviation AS h_abbreviation,
           h.conference AS h_conference, h.division AS h_division,
           a.id AS a_id, a.name AS a_name, a.city AS a_city, a.abbreviation AS a_abbreviation,
           a.conference AS a_conference, a.division AS a_division
    FROM games g
    JOIN teams h ON h.id = g.home_team_id
    JOIN teams a ON a.id = g.away_team_id";

const STATS_COLUMNS: &str = "
    id, player_id, season, games_played, mpg, ppg, rpg, apg, spg, bpg, topg,
    fg_pct, three_pct, ft_pct, fgm, fga, fg3m, fg3a, ftm, fta, oreb, dreb, pf";

/// Filters for the store's game listing. Unset fields do not constrain.
#[derive(Debug, Clone, Default)]
pub struct GameFilter {
    pub date: Option<String>,
    pub season: Option<i32>,
    pub team_id: Option<i64>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub postseason: Option<bool>,
    pub limit: Option<u32>,
}

pub const DEFAULT_GAME_LIMIT: u32 = 100;
pub const DEFAULT_GAME_LOG_LIMIT: u32 = 82;

/// Read-only access to the synced local store.
#[derive(Clone)]
pub struct LocalStore {
    pool: SqlitePool,
}

impl LocalStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // -- players -------------------------------------------------------------

    /// Player with their most recent season line.
    pub async fn player_by_id(&self, id: i64) -> Result<Option<PlayerDetail>> {
        let row = sqlx::query_as::<_, PlayerRow>(&format!("{PLAYER_SELECT} WHERE p.id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else { return Ok(None) };
        let season_averages = self.latest_season(id).await?;
        Ok(Some(PlayerDetail {
            player: row.into(),
            season_averages,
        }))
    }

    async fn latest_season(&self, player_id: i64) -> Result<Option<SeasonAverages>> {
        let row = sqlx::query_as::<_, PlayerStatsRow>(&format!(
            "SELECT {STATS_COLUMNS} FROM player_stats WHERE player_id = ? ORDER BY season DESC LIMIT 1"
        ))
        .bind(player_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(SeasonAverages::from))
    }

    /// Case-insensitive substring search on first or last name. A query
    /// with a space also matches "first-part AND rest" across both columns.
    /// An empty query lists everyone up to `limit`.
    pub async fn search_players(&self, query: &str, limit: usize) -> Result<Vec<Player>> {
        let query = query.trim();
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(PLAYER_SELECT);
        qb.push(" WHERE p.first_name LIKE ")
            .push_bind(format!("%{query}%"))
            .push(" OR p.last_name LIKE ")
            .push_bind(format!("%{query}%"));
        if let Some((first, rest)) = query.split_once(' ') {
            qb.push(" OR (p.first_name LIKE ")
                .push_bind(format!("%{first}%"))
                .push(" AND p.last_name LIKE ")
                .push_bind(format!("%{}%", rest.trim()))
                .push(")");
        }
        qb.push(" ORDER BY p.last_name, p.first_name, p.id LIMIT ")
            .push_bind(limit as i64);

        let rows = qb.build_query_as::<PlayerRow>().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Player::from).collect())
    }

    /// Same person under a local ID, located by name.
    pub async fn find_player_by_name(&self, first: &str, last: &str) -> Result<Option<Player>> {
        let rows = sqlx::query_as::<_, PlayerRow>(&format!(
            "{PLAYER_SELECT} WHERE p.last_name LIKE ? OR p.first_name LIKE ? ORDER BY p.id"
        ))
        .bind(format!("%{}%", last.trim()))
        .bind(format!("%{}%", first.trim()))
        .fetch_all(&self.pool)
        .await?;
        let candidates: Vec<Player> = rows.into_iter().map(Player::from).collect();
        Ok(resolve_identity(&candidates, first, last).cloned())
    }

    // -- stats ---------------------------------------------------------------

    pub async fn season_averages(&self, player_id: i64, season: i32) -> Result<Option<SeasonAverages>> {
        let row = sqlx::query_as::<_, PlayerStatsRow>(&format!(
            "SELECT {STATS_COLUMNS} FROM player_stats WHERE player_id = ? AND season = ?"
        ))
        .bind(player_id)
        .bind(season_string(season))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(SeasonAverages::from))
    }

    /// Every season on record, oldest first.
    pub async fn career_stats(&self, player_id: i64) -> Result<Vec<SeasonAverages>> {
        let rows = sqlx::query_as::<_, PlayerStatsRow>(&format!(
            "SELECT {STATS_COLUMNS} FROM player_stats WHERE player_id = ? ORDER BY season ASC"
        ))
        .bind(player_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SeasonAverages::from).collect())
    }

    /// Box-score lines, most recent game first.
    pub async fn player_game_stats(
        &self,
        player_id: i64,
        season: Option<i32>,
        limit: u32,
    ) -> Result<Vec<GamePlayerStats>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT s.id, s.player_id, s.minutes, s.points, s.rebounds, s.assists, s.steals,
                    s.blocks, s.turnovers, s.fg_made, s.fg_attempts, s.three_made,
                    s.three_attempts, s.ft_made, s.ft_attempts, s.oreb, s.dreb, s.personal_fouls,
                    g.id AS g_id, g.date AS g_date, g.season AS g_season,
                    g.home_team_id AS g_home_team_id, g.away_team_id AS g_away_team_id,
                    g.home_score AS g_home_score, g.away_score AS g_away_score
             FROM game_player_stats s
             JOIN games g ON g.id = s.game_id
             WHERE s.player_id = ",
        );
        qb.push_bind(player_id);
        if let Some(season) = season {
            qb.push(" AND g.season = ").push_bind(season);
        }
        qb.push(" ORDER BY g.date DESC LIMIT ").push_bind(i64::from(limit));

        let rows = qb.build_query_as::<GamePlayerStatsRow>().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(GamePlayerStats::from).collect())
    }

    // -- games ---------------------------------------------------------------

    /// Games matching `filter`, newest first.
    pub async fn games(&self, filter: &GameFilter) -> Result<Vec<Game>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(GAME_SELECT);
        qb.push(" WHERE 1 = 1");
        if let Some(season) = filter.season {
            qb.push(" AND g.season = ").push_bind(season);
        }
        if let Some(date) = &filter.date {
            qb.push(" AND substr(g.date, 1, 10) = ").push_bind(date.clone());
        }
        if let Some(start) = &filter.start_date {
            qb.push(" AND substr(g.date, 1, 10) >= ").push_bind(start.clone());
        }
        if let Some(end) = &filter.end_date {
            qb.push(" AND substr(g.date, 1, 10) <= ").push_bind(end.clone());
        }
        if let Some(team_id) = filter.team_id {
            qb.push(" AND (g.home_team_id = ")
                .push_bind(team_id)
                .push(" OR g.away_team_id = ")
                .push_bind(team_id)
                .push(")");
        }
        if let Some(postseason) = filter.postseason {
            qb.push(" AND g.postseason = ").push_bind(i64::from(postseason));
        }
        qb.push(" ORDER BY g.date DESC, g.id LIMIT ")
            .push_bind(i64::from(filter.limit.unwrap_or(DEFAULT_GAME_LIMIT)));

        let rows = qb.build_query_as::<GameRow>().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Game::from).collect())
    }

    /// The store's snapshot of one day's slate, in tip-off order.
    pub async fn games_on(&self, date: NaiveDate) -> Result<Vec<Game>> {
        let rows = sqlx::query_as::<_, GameRow>(&format!(
            "{GAME_SELECT} WHERE substr(g.date, 1, 10) = ? ORDER BY g.date ASC, g.id"
        ))
        .bind(date.format("%Y-%m-%d").to_string())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Game::from).collect())
    }

    // -- teams ---------------------------------------------------------------

    pub async fn teams(&self) -> Result<Vec<Team>> {
        let rows = sqlx::query_as::<_, TeamRow>(
            "SELECT id, name, city, abbreviation, conference, division FROM teams ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Team::from).collect())
    }

    /// Team with its roster; each player carries their latest season line.
    pub async fn team_by_id(&self, id: i64) -> Result<Option<TeamDetail>> {
        let team = sqlx::query_as::<_, TeamRow>(
            "SELECT id, name, city, abbreviation, conference, division FROM teams WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(team) = team else { return Ok(None) };

        let rows = sqlx::query_as::<_, PlayerRow>(&format!(
            "{PLAYER_SELECT} WHERE p.team_id = ? ORDER BY p.last_name, p.first_name"
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let mut players = Vec::with_capacity(rows.len());
        for row in rows {
            let season_averages = self.latest_season(row.id).await?;
            players.push(PlayerDetail {
                player: row.into(),
                season_averages,
            });
        }

        Ok(Some(TeamDetail {
            team: team.into(),
            players,
        }))
    }
}
