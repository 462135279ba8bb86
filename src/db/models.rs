//! Row types for the local store schema (`migrations/0001_init.sql`) and
//! their mapping into the provider-compatible domain shapes.

use crate::season::parse_season_string;
use crate::types::{
    Game, GamePlayerStats, GameStatus, GameSummary, Player, SeasonAverages, StatLine, Team,
};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TeamRow {
    pub id: i64,
    pub name: String,
    pub city: String,
    pub abbreviation: String,
    pub conference: String,
    pub division: String,
}

impl From<TeamRow> for Team {
    fn from(r: TeamRow) -> Self {
        Team {
            id: r.id,
            full_name: format!("{} {}", r.city, r.name),
            name: r.name,
            city: r.city,
            abbreviation: r.abbreviation,
            conference: r.conference,
            division: r.division,
        }
    }
}

/// Player joined with their (optional) team, team columns prefixed `t_`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PlayerRow {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub position: Option<String>,
    pub height: Option<String>,
    pub weight: Option<String>,
    pub jersey_number: Option<String>,
    pub college: Option<String>,
    pub country: Option<String>,
    pub draft_year: Option<i64>,
    pub draft_round: Option<i64>,
    pub draft_number: Option<i64>,
    pub t_id: Option<i64>,
    pub t_name: Option<String>,
    pub t_city: Option<String>,
    pub t_abbreviation: Option<String>,
    pub t_conference: Option<String>,
    pub t_division: Option<String>,
}

impl From<PlayerRow> for Player {
    fn from(r: PlayerRow) -> Self {
        let team = r.t_id.map(|id| {
            Team::from(TeamRow {
                id,
                name: r.t_name.unwrap_or_default(),
                city: r.t_city.unwrap_or_default(),
                abbreviation: r.t_abbreviation.unwrap_or_default(),
                conference: r.t_conference.unwrap_or_default(),
                division: r.t_division.unwrap_or_default(),
            })
        });
        Player {
            id: r.id,
            first_name: r.first_name,
            last_name: r.last_name,
            position: r.position.unwrap_or_default(),
            height: r.height.unwrap_or_default(),
            weight: r.weight.unwrap_or_default(),
            jersey_number: r.jersey_number.unwrap_or_default(),
            college: r.college.unwrap_or_default(),
            country: r.country.unwrap_or_default(),
            draft_year: r.draft_year.map(|v| v as i32),
            draft_round: r.draft_round.map(|v| v as i32),
            draft_number: r.draft_number.map(|v| v as i32),
            team,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PlayerStatsRow {
    pub id: i64,
    pub player_id: i64,
    pub season: String,
    pub games_played: i64,
    pub mpg: f64,
    pub ppg: f64,
    pub rpg: f64,
    pub apg: f64,
    pub spg: f64,
    pub bpg: f64,
    pub topg: f64,
    pub fg_pct: f64,
    pub three_pct: f64,
    pub ft_pct: f64,
    pub fgm: f64,
    pub fga: f64,
    pub fg3m: f64,
    pub fg3a: f64,
    pub ftm: f64,
    pub fta: f64,
    pub oreb: f64,
    pub dreb: f64,
    pub pf: f64,
}

impl From<PlayerStatsRow> for SeasonAverages {
    fn from(r: PlayerStatsRow) -> Self {
        SeasonAverages {
            id: r.id,
            player_id: r.player_id,
            season: parse_season_string(&r.season).unwrap_or(0),
            games_played: r.games_played,
            line: StatLine {
                min: r.mpg.to_string(),
                pts: r.ppg,
                reb: r.rpg,
                ast: r.apg,
                stl: r.spg,
                blk: r.bpg,
                turnover: r.topg,
                fg_pct: r.fg_pct,
                fg3_pct: r.three_pct,
                ft_pct: r.ft_pct,
                fgm: r.fgm,
                fga: r.fga,
                fg3m: r.fg3m,
                fg3a: r.fg3a,
                ftm: r.ftm,
                fta: r.fta,
                oreb: r.oreb,
                dreb: r.dreb,
                pf: r.pf,
            },
        }
    }
}

/// Game joined with both teams: `h_` home, `a_` away.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GameRow {
    pub id: i64,
    pub date: String,
    pub season: i64,
    pub status: String,
    pub period: i64,
    pub time_remaining: Option<String>,
    pub postseason: i64,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    pub h_id: i64,
    pub h_name: String,
    pub h_city: String,
    pub h_abbreviation: String,
    pub h_conference: String,
    pub h_division: String,
    pub a_id: i64,
    pub a_name: String,
    pub a_city: String,
    pub a_abbreviation: String,
    pub a_conference: String,
    pub a_division: String,
}

impl From<GameRow> for Game {
    fn from(r: GameRow) -> Self {
        Game {
            id: r.id,
            date: r.date.get(..10).unwrap_or(&r.date).to_string(),
            season: r.season as i32,
            status: GameStatus::parse_lenient(&r.status),
            period: r.period as i32,
            time: r.time_remaining.unwrap_or_default(),
            postseason: r.postseason != 0,
            home_team: TeamRow {
                id: r.h_id,
                name: r.h_name,
                city: r.h_city,
                abbreviation: r.h_abbreviation,
                conference: r.h_conference,
                division: r.h_division,
            }
            .into(),
            home_team_score: r.home_score.unwrap_or(0),
            visitor_team: TeamRow {
                id: r.a_id,
                name: r.a_name,
                city: r.a_city,
                abbreviation: r.a_abbreviation,
                conference: r.a_conference,
                division: r.a_division,
            }
            .into(),
            visitor_team_score: r.away_score.unwrap_or(0),
        }
    }
}

/// Box-score line joined with its game (`g_` columns).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GamePlayerStatsRow {
    pub id: i64,
    pub player_id: i64,
    pub minutes: f64,
    pub points: i64,
    pub rebounds: i64,
    pub assists: i64,
    pub steals: i64,
    pub blocks: i64,
    pub turnovers: i64,
    pub fg_made: i64,
    pub fg_attempts: i64,
    pub three_made: i64,
    pub three_attempts: i64,
    pub ft_made: i64,
    pub ft_attempts: i64,
    pub oreb: i64,
    pub dreb: i64,
    pub personal_fouls: i64,
    pub g_id: i64,
    pub g_date: String,
    pub g_season: i64,
    pub g_home_team_id: i64,
    pub g_away_team_id: i64,
    pub g_home_score: Option<i64>,
    pub g_away_score: Option<i64>,
}

fn pct(made: i64, attempts: i64) -> f64 {
    if attempts > 0 {
        made as f64 / attempts as f64
    } else {
        0.0
    }
}

impl From<GamePlayerStatsRow> for GamePlayerStats {
    fn from(r: GamePlayerStatsRow) -> Self {
        GamePlayerStats {
            id: r.id,
            player_id: r.player_id,
            game: GameSummary {
                id: r.g_id,
                date: r.g_date.get(..10).unwrap_or(&r.g_date).to_string(),
                season: r.g_season as i32,
                home_team_id: r.g_home_team_id,
                home_team_score: r.g_home_score.unwrap_or(0),
                visitor_team_id: r.g_away_team_id,
                visitor_team_score: r.g_away_score.unwrap_or(0),
            },
            line: StatLine {
                min: r.minutes.to_string(),
                pts: r.points as f64,
                reb: r.rebounds as f64,
                ast: r.assists as f64,
                stl: r.steals as f64,
                blk: r.blocks as f64,
                turnover: r.turnovers as f64,
                fg_pct: pct(r.fg_made, r.fg_attempts),
                fg3_pct: pct(r.three_made, r.three_attempts),
                ft_pct: pct(r.ft_made, r.ft_attempts),
                fgm: r.fg_made as f64,
                fga: r.fg_attempts as f64,
                fg3m: r.three_made as f64,
                fg3a: r.three_attempts as f64,
                ftm: r.ft_made as f64,
                fta: r.ft_attempts as f64,
                oreb: r.oreb as f64,
                dreb: r.dreb as f64,
                pf: r.personal_fouls as f64,
            },
        }
    }
}
