use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::config::{STANDINGS_MAX_PAGES, STANDINGS_PAGE_SIZE};
use crate::db::LocalStore;
use crate::error::{AppError, Result};
use crate::resolve::cascade::{non_empty, Cascade};
use crate::season::season_string;
use crate::sources::league::SharedLeague;
use crate::sources::primary::{GameQuery, PrimarySource};
use crate::types::{Game, RosterPlayer, Source, Sourced, StandingsRow, Team, TeamDetail};

pub struct TeamResolver {
    store: LocalStore,
    primary: Arc<dyn PrimarySource>,
    league: Arc<SharedLeague>,
}

impl TeamResolver {
    pub fn new(store: LocalStore, primary: Arc<dyn PrimarySource>, league: Arc<SharedLeague>) -> Self {
        Self { store, primary, league }
    }

    pub async fn teams(&self) -> Sourced<Vec<Team>> {
        let store = &self.store;
        let primary = self.primary.as_ref();
        Cascade::new("teams")
            .stage(Source::Db, "store", move || async move { Ok(non_empty(store.teams().await?)) })
            .stage(Source::Primary, "primary", move || async move { Ok(non_empty(primary.teams().await?)) })
            .run()
            .await
            .unwrap_or(Sourced { source: Source::Db, data: Vec::new() })
    }

    /// Store team with roster, else the bare primary team.
    pub async fn team(&self, id: i64) -> Result<Sourced<TeamDetail>> {
        let store = &self.store;
        let primary = self.primary.as_ref();
        Cascade::new("team")
            .stage(Source::Db, "store", move || async move { store.team_by_id(id).await })
            .stage(Source::Primary, "primary", move || async move {
                match primary.team(id).await {
                    Ok(team) => Ok(Some(TeamDetail { team, players: Vec::new() })),
                    Err(AppError::NotFound(_)) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .run()
            .await
            .ok_or_else(|| AppError::NotFound(format!("team {id}")))
    }

    /// W/L per team from the primary provider's final games this season.
    pub async fn standings(&self, season: i32, today: NaiveDate) -> Result<Vec<StandingsRow>> {
        let mut records: BTreeMap<i64, StandingsRow> = BTreeMap::new();
        let mut cursor = None;

        for page in 1..=STANDINGS_MAX_PAGES {
            let query = GameQuery {
                seasons: vec![season],
                start_date: Some(format!("{season}-10-01")),
                end_date: Some(today.format("%Y-%m-%d").to_string()),
                per_page: Some(STANDINGS_PAGE_SIZE),
                cursor,
                ..Default::default()
            };
            let resp = self.primary.games(&query).await?;
            for game in &resp.data {
                tally(&mut records, game);
            }
            cursor = resp.meta.and_then(|m| m.next_cursor);
            if cursor.is_none() {
                debug!(season, pages = page, teams = records.len(), "Standings computed");
                break;
            }
            if page == STANDINGS_MAX_PAGES {
                warn!(season, "Standings stopped at the page limit");
            }
        }

        Ok(records.into_values().collect())
    }

    /// League roster stats for a team. Needs the team's abbreviation, taken
    /// from whichever source knows the team.
    pub async fn roster_stats(&self, id: i64, season: i32) -> Result<Vec<RosterPlayer>> {
        let team = self.team(id).await?.data.team;
        Ok(self
            .league
            .full_team_roster_stats(&team.abbreviation, team.id, &season_string(season))
            .await)
    }
}

fn tally(records: &mut BTreeMap<i64, StandingsRow>, game: &Game) {
    if !game.has_final_score() {
        return;
    }
    let home_won = game.home_team_score > game.visitor_team_score;
    for (team_id, won) in [(game.home_team.id, home_won), (game.visitor_team.id, !home_won)] {
        let row = records
            .entry(team_id)
            .or_insert(StandingsRow { team_id, wins: 0, losses: 0 });
        if won {
            row.wins += 1;
        } else {
            row.losses += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FakeClock;
    use crate::db::reader::tests::seeded_store;
    use crate::resolve::fakes::{game, team, FakePrimary};
    use crate::sources::league::tests::{leaders_payload, FakeLeague};
    use crate::sources::league::{LeagueStats, LeagueUpstream};
    use crate::types::GameStatus;

    async fn resolver(primary: FakePrimary, league: FakeLeague) -> (TeamResolver, Arc<FakePrimary>) {
        let primary = Arc::new(primary);
        let league = LeagueStats::new(Arc::new(league) as Arc<dyn LeagueUpstream>, FakeClock::new());
        (TeamResolver::new(seeded_store().await, primary.clone(), Arc::new(league)), primary)
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 10).unwrap()
    }

    #[tokio::test]
    async fn teams_come_from_the_store_first() {
        let (r, primary) = resolver(FakePrimary::default(), FakeLeague::default()).await;
        let hit = r.teams().await;
        assert_eq!(hit.source, Source::Db);
        assert_eq!(hit.data.len(), 3);
        assert_eq!(primary.calls(), 0);
    }

    #[tokio::test]
    async fn unknown_team_falls_back_then_not_found() {
        let (r, _) = resolver(
            FakePrimary { teams: vec![team(1610612760, "OKC", "Oklahoma City", "Thunder")], ..Default::default() },
            FakeLeague::default(),
        )
        .await;

        let hit = r.team(1610612760).await.unwrap();
        assert_eq!(hit.source, Source::Primary);
        assert!(hit.data.players.is_empty());

        assert!(matches!(r.team(1).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn standings_walk_every_cursor_page() {
        let (bos, mia, mem) = (
            team(1, "BOS", "Boston", "Celtics"),
            team(2, "MIA", "Miami", "Heat"),
            team(3, "MEM", "Memphis", "Grizzlies"),
        );
        // 250 final games between BOS and MIA, BOS winning the even ones,
        // plus one unplayed and one score-less final.
        let mut games: Vec<Game> = (1..=250)
            .map(|i| {
                let scores = if i % 2 == 0 { (110, 100) } else { (95, 105) };
                game(i, "2024-11-01", GameStatus::Final, &bos, &mia, scores)
            })
            .collect();
        games.push(game(251, "2024-11-02", GameStatus::Scheduled, &bos, &mem, (0, 0)));
        games.push(game(252, "2024-11-02", GameStatus::Final, &mia, &mem, (0, 0)));

        let (r, primary) = resolver(FakePrimary { games, ..Default::default() }, FakeLeague::default()).await;
        let table = r.standings(2024, today()).await.unwrap();

        assert_eq!(primary.calls(), 3);
        assert_eq!(table.len(), 2);
        assert_eq!(table[0], StandingsRow { team_id: 1, wins: 125, losses: 125 });
        assert_eq!(table[1], StandingsRow { team_id: 2, wins: 125, losses: 125 });
    }

    #[tokio::test]
    async fn roster_stats_use_the_store_abbreviation() {
        let (r, _) = resolver(
            FakePrimary::default(),
            FakeLeague { leaders: Some(leaders_payload()), ..Default::default() },
        )
        .await;

        let roster = r.roster_stats(1610612763, 2024).await.unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].player_name, "Jaren Jackson Jr.");
    }
}
