//! Resolution policies: which source to ask, in what order, and how to
//! reconcile what comes back.

pub mod cascade;
pub mod games;
pub mod identity;
pub mod live;
pub mod players;
pub mod stats;
pub mod teams;

#[cfg(test)]
pub(crate) mod fakes {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::error::{AppError, Result};
    use crate::sources::primary::{GameQuery, PlayerQuery, PrimarySource, StatsQuery};
    use crate::types::{
        Envelope, Game, GamePlayerStats, GameStatus, Meta, Player, SeasonAverages, Source, Team,
    };

    /// In-memory primary provider with a call counter and a failure switch.
    #[derive(Default)]
    pub(crate) struct FakePrimary {
        pub calls: AtomicUsize,
        pub failing: AtomicBool,
        pub players: Vec<Player>,
        pub teams: Vec<Team>,
        pub games: Vec<Game>,
        pub stats: Vec<GamePlayerStats>,
        pub averages: Vec<SeasonAverages>,
    }

    impl FakePrimary {
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn hit(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(AppError::Upstream { origin: Source::Primary, status: 503 });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl PrimarySource for FakePrimary {
        async fn players(&self, query: &PlayerQuery) -> Result<Envelope<Vec<Player>>> {
            self.hit()?;
            let term = query.search.clone().unwrap_or_default().to_lowercase();
            let hits: Vec<Player> = self
                .players
                .iter()
                .filter(|p| p.full_name().to_lowercase().contains(&term))
                .cloned()
                .collect();
            Ok(Envelope::single_page(hits))
        }

        async fn player(&self, id: i64) -> Result<Player> {
            self.hit()?;
            self.players
                .iter()
                .find(|p| p.id == id)
                .cloned()
                .ok_or_else(|| AppError::NotFound(format!("player {id}")))
        }

        async fn teams(&self) -> Result<Vec<Team>> {
            self.hit()?;
            Ok(self.teams.clone())
        }

        async fn team(&self, id: i64) -> Result<Team> {
            self.hit()?;
            self.teams
                .iter()
                .find(|t| t.id == id)
                .cloned()
                .ok_or_else(|| AppError::NotFound(format!("team {id}")))
        }

        /// Cursor pages ordered by game ID; the cursor is the last ID served.
        async fn games(&self, query: &GameQuery) -> Result<Envelope<Vec<Game>>> {
            self.hit()?;
            let per_page = query.per_page.unwrap_or(25) as usize;
            let mut matching: Vec<&Game> = self
                .games
                .iter()
                .filter(|g| query.dates.is_empty() || query.dates.contains(&g.date))
                .filter(|g| query.seasons.is_empty() || query.seasons.contains(&g.season))
                .filter(|g| {
                    query.team_ids.is_empty()
                        || query.team_ids.contains(&g.home_team.id)
                        || query.team_ids.contains(&g.visitor_team.id)
                })
                .filter(|g| query.cursor.map_or(true, |c| g.id > c))
                .collect();
            matching.sort_by_key(|g| g.id);

            let more = matching.len() > per_page;
            let page: Vec<Game> = matching.into_iter().take(per_page).cloned().collect();
            let meta = Meta {
                per_page: Some(per_page as u32),
                next_cursor: if more { page.last().map(|g| g.id) } else { None },
                ..Default::default()
            };
            Ok(Envelope::with_meta(page, meta))
        }

        async fn game(&self, id: i64) -> Result<Game> {
            self.hit()?;
            self.games
                .iter()
                .find(|g| g.id == id)
                .cloned()
                .ok_or_else(|| AppError::NotFound(format!("game {id}")))
        }

        async fn stats(&self, query: &StatsQuery) -> Result<Envelope<Vec<GamePlayerStats>>> {
            self.hit()?;
            let rows: Vec<GamePlayerStats> = self
                .stats
                .iter()
                .filter(|s| query.player_ids.is_empty() || query.player_ids.contains(&s.player_id))
                .filter(|s| query.seasons.is_empty() || query.seasons.contains(&s.game.season))
                .cloned()
                .collect();
            Ok(Envelope::single_page(rows))
        }

        async fn season_averages(&self, season: i32, player_ids: &[i64]) -> Result<Vec<SeasonAverages>> {
            self.hit()?;
            Ok(self
                .averages
                .iter()
                .filter(|a| a.season == season && player_ids.contains(&a.player_id))
                .cloned()
                .collect())
        }
    }

    pub(crate) fn player(id: i64, first: &str, last: &str) -> Player {
        Player {
            id,
            first_name: first.into(),
            last_name: last.into(),
            position: String::new(),
            height: String::new(),
            weight: String::new(),
            jersey_number: String::new(),
            college: String::new(),
            country: String::new(),
            draft_year: None,
            draft_round: None,
            draft_number: None,
            team: None,
        }
    }

    pub(crate) fn team(id: i64, abbreviation: &str, city: &str, name: &str) -> Team {
        Team {
            id,
            name: name.into(),
            city: city.into(),
            full_name: format!("{city} {name}"),
            abbreviation: abbreviation.into(),
            conference: String::new(),
            division: String::new(),
        }
    }

    pub(crate) fn game(id: i64, date: &str, status: GameStatus, home: &Team, visitor: &Team, scores: (i64, i64)) -> Game {
        Game {
            id,
            date: date.into(),
            season: 2024,
            status,
            period: 0,
            time: String::new(),
            postseason: false,
            home_team: home.clone(),
            home_team_score: scores.0,
            visitor_team: visitor.clone(),
            visitor_team_score: scores.1,
        }
    }
}
