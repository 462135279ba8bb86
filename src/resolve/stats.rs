//! Season averages, game logs and careers through the source cascade:
//! store by ID, store by name, primary provider, league proxy.

use std::sync::Arc;

use crate::career::compute_career_totals;
use crate::db::reader::DEFAULT_GAME_LOG_LIMIT;
use crate::db::LocalStore;
use crate::resolve::cascade::{non_empty, Cascade};
use crate::season::season_string;
use crate::sources::league::SharedLeague;
use crate::sources::primary::{PrimarySource, StatsQuery};
use crate::types::{Career, GamePlayerStats, Player, PlayerKey, SeasonAverages, Source, Sourced};

/// The player a stats request is about: the caller's key plus the name and
/// draft year used when another source must be matched by name.
#[derive(Debug, Clone)]
pub struct Subject {
    pub key: PlayerKey,
    pub first_name: String,
    pub last_name: String,
    pub draft_year: Option<i32>,
}

impl Subject {
    pub fn new(key: PlayerKey, player: &Player) -> Self {
        Self {
            key,
            first_name: player.first_name.clone(),
            last_name: player.last_name.clone(),
            draft_year: player.draft_year,
        }
    }

    fn has_name(&self) -> bool {
        !self.first_name.trim().is_empty() && !self.last_name.trim().is_empty()
    }

    fn is_local(&self) -> bool {
        matches!(self.key, PlayerKey::Local(_))
    }
}

pub struct StatsResolver {
    store: LocalStore,
    primary: Arc<dyn PrimarySource>,
    league: Arc<SharedLeague>,
}

impl StatsResolver {
    pub fn new(store: LocalStore, primary: Arc<dyn PrimarySource>, league: Arc<SharedLeague>) -> Self {
        Self { store, primary, league }
    }

    /// League records come back under the requested ID, not the league's.
    pub async fn season_averages(&self, who: &Subject, season: i32) -> Option<Sourced<SeasonAverages>> {
        let id = who.key.id();
        let (first, last) = (who.first_name.as_str(), who.last_name.as_str());
        let store = &self.store;
        let primary = self.primary.as_ref();
        let league = self.league.as_ref();
        let season_str = season_string(season);

        Cascade::new("season averages")
            .stage_if(who.is_local(), Source::Db, "store by id", move || async move {
                store.season_averages(id, season).await
            })
            .stage_if(who.has_name(), Source::Db, "store by name", move || async move {
                match store.find_player_by_name(first, last).await? {
                    Some(local) => store.season_averages(local.id, season).await,
                    None => Ok(None),
                }
            })
            .stage(Source::Primary, "primary", move || async move {
                Ok(primary.season_averages(season, &[id]).await?.into_iter().next())
            })
            .stage_if(who.has_name(), Source::League, "league leaders", move || async move {
                Ok(league
                    .player_season_averages(first, last, &season_str)
                    .await
                    .map(|line| line.into_season_averages(id, season)))
            })
            .run()
            .await
    }

    /// Most recent games first. `None` when no source has a line.
    pub async fn game_log(&self, who: &Subject, season: i32) -> Option<Sourced<Vec<GamePlayerStats>>> {
        let id = who.key.id();
        let (first, last) = (who.first_name.as_str(), who.last_name.as_str());
        let store = &self.store;
        let primary = self.primary.as_ref();
        let league = self.league.as_ref();
        let season_str = season_string(season);

        Cascade::new("game log")
            .stage_if(who.is_local(), Source::Db, "store by id", move || async move {
                Ok(non_empty(store.player_game_stats(id, Some(season), DEFAULT_GAME_LOG_LIMIT).await?))
            })
            .stage_if(who.has_name(), Source::Db, "store by name", move || async move {
                match store.find_player_by_name(first, last).await? {
                    Some(local) => Ok(non_empty(
                        store.player_game_stats(local.id, Some(season), DEFAULT_GAME_LOG_LIMIT).await?,
                    )),
                    None => Ok(None),
                }
            })
            .stage(Source::Primary, "primary", move || async move {
                let query = StatsQuery {
                    player_ids: vec![id],
                    seasons: vec![season],
                    per_page: Some(100),
                    ..Default::default()
                };
                Ok(non_empty(primary.stats(&query).await?.data))
            })
            .stage_if(who.has_name(), Source::League, "league game log", move || async move {
                let Some(league_id) = league.find_player_id(first, last, &season_str).await else {
                    return Ok(None);
                };
                let mut log = league.player_game_log(league_id, &season_str).await;
                for (i, line) in log.iter_mut().enumerate() {
                    line.id = i as i64;
                    line.player_id = id;
                }
                Ok(non_empty(log))
            })
            .run()
            .await
    }

    /// Store seasons, else the primary provider's season walk from the
    /// draft year. Totals are recomputed from whichever set wins.
    pub async fn career(&self, who: &Subject, current_season: i32) -> Option<Sourced<Career>> {
        let id = who.key.id();
        let (first, last) = (who.first_name.as_str(), who.last_name.as_str());
        let store = &self.store;
        let primary = self.primary.as_ref();
        let draft_year = who.draft_year;

        let seasons = Cascade::new("career")
            .stage_if(who.is_local(), Source::Db, "store by id", move || async move {
                Ok(non_empty(store.career_stats(id).await?))
            })
            .stage_if(who.has_name(), Source::Db, "store by name", move || async move {
                match store.find_player_by_name(first, last).await? {
                    Some(local) => Ok(non_empty(store.career_stats(local.id).await?)),
                    None => Ok(None),
                }
            })
            .stage(Source::Primary, "primary season walk", move || async move {
                Ok(non_empty(primary.career_stats(id, draft_year, current_season).await?))
            })
            .run()
            .await?;

        let totals = compute_career_totals(&seasons.data);
        Some(Sourced {
            source: seasons.source,
            data: Career { seasons: seasons.data, totals },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FakeClock;
    use crate::db::reader::tests::seeded_store;
    use crate::resolve::fakes::{player, FakePrimary};
    use crate::sources::league::tests::{leaders_payload, FakeLeague};
    use crate::sources::league::{LeagueStats, LeagueUpstream};
    use crate::types::{GameSummary, StatLine};
    use serde_json::json;
    use std::sync::atomic::Ordering;

    struct Harness {
        stats: StatsResolver,
        primary: Arc<FakePrimary>,
        league: Arc<FakeLeague>,
    }

    async fn harness(primary: FakePrimary, league: FakeLeague) -> Harness {
        let primary = Arc::new(primary);
        let league = Arc::new(league);
        let shared = LeagueStats::new(league.clone() as Arc<dyn LeagueUpstream>, FakeClock::new());
        Harness {
            stats: StatsResolver::new(seeded_store().await, primary.clone(), Arc::new(shared)),
            primary,
            league,
        }
    }

    fn subject(key: PlayerKey, first: &str, last: &str) -> Subject {
        Subject::new(key, &player(key.id(), first, last))
    }

    fn averages(player_id: i64, season: i32, pts: f64) -> SeasonAverages {
        SeasonAverages {
            id: 0,
            player_id,
            season,
            games_played: 50,
            line: StatLine { pts, ..Default::default() },
        }
    }

    #[tokio::test]
    async fn store_row_wins_without_outbound_calls() {
        let h = harness(FakePrimary::default(), FakeLeague::default()).await;
        let who = subject(PlayerKey::Local(1628369), "Jayson", "Tatum");

        let hit = h.stats.season_averages(&who, 2024).await.unwrap();
        assert_eq!(hit.source, Source::Db);
        assert_eq!(hit.data.line.pts, 26.8);
        assert_eq!(h.primary.calls(), 0);
        assert_eq!(h.league.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn foreign_id_is_bridged_to_the_store_by_name() {
        let h = harness(FakePrimary::default(), FakeLeague::default()).await;
        let who = subject(PlayerKey::Foreign(434), "Jayson", "Tatum");

        let hit = h.stats.season_averages(&who, 2023).await.unwrap();
        assert_eq!(hit.source, Source::Db);
        assert_eq!(hit.data.player_id, 1628369);
        assert_eq!(hit.data.line.pts, 26.9);
    }

    #[tokio::test]
    async fn primary_answers_when_store_has_nothing() {
        let h = harness(
            FakePrimary { averages: vec![averages(77, 2024, 19.5)], ..Default::default() },
            FakeLeague::default(),
        )
        .await;
        let who = subject(PlayerKey::Foreign(77), "Cooper", "Flagg");

        let hit = h.stats.season_averages(&who, 2024).await.unwrap();
        assert_eq!(hit.source, Source::Primary);
        assert_eq!(hit.data.line.pts, 19.5);
    }

    #[tokio::test]
    async fn league_is_last_and_keeps_the_requested_id() {
        let h = harness(
            FakePrimary::default(),
            FakeLeague { leaders: Some(leaders_payload()), ..Default::default() },
        )
        .await;
        h.primary.failing.store(true, Ordering::SeqCst);
        let who = subject(PlayerKey::Foreign(42), "Victor", "Wembanyama");

        let hit = h.stats.season_averages(&who, 2024).await.unwrap();
        assert_eq!(hit.source, Source::League);
        assert_eq!(hit.data.player_id, 42);
        assert_eq!(hit.data.games_played, 46);
    }

    #[tokio::test]
    async fn exhausted_chain_is_none() {
        let h = harness(FakePrimary::default(), FakeLeague::default()).await;
        h.primary.failing.store(true, Ordering::SeqCst);
        h.league.failing.store(true, Ordering::SeqCst);
        let who = subject(PlayerKey::Foreign(42), "Nobody", "Known");

        assert!(h.stats.season_averages(&who, 2024).await.is_none());
        assert!(h.stats.game_log(&who, 2024).await.is_none());
        assert!(h.stats.career(&who, 2024).await.is_none());
    }

    #[tokio::test]
    async fn game_log_prefers_store_lines() {
        let h = harness(FakePrimary::default(), FakeLeague::default()).await;
        let who = subject(PlayerKey::Local(1628369), "Jayson", "Tatum");

        let hit = h.stats.game_log(&who, 2024).await.unwrap();
        assert_eq!(hit.source, Source::Db);
        assert_eq!(hit.data.len(), 2);
    }

    #[tokio::test]
    async fn game_log_from_primary_stats() {
        let line = GamePlayerStats {
            id: 1,
            player_id: 77,
            game: GameSummary {
                id: 9,
                date: "2025-01-05".into(),
                season: 2024,
                home_team_id: 1,
                home_team_score: 100,
                visitor_team_id: 2,
                visitor_team_score: 90,
            },
            line: StatLine { pts: 12.0, ..Default::default() },
        };
        let h = harness(FakePrimary { stats: vec![line], ..Default::default() }, FakeLeague::default()).await;
        let who = subject(PlayerKey::Foreign(77), "Cooper", "Flagg");

        let hit = h.stats.game_log(&who, 2024).await.unwrap();
        assert_eq!(hit.source, Source::Primary);
        assert_eq!(hit.data[0].game.id, 9);
        assert!(h.stats.game_log(&who, 2023).await.is_none());
    }

    #[tokio::test]
    async fn league_game_log_is_rekeyed() {
        let log = json!({
            "resultSets": [{
                "name": "PlayerGameLog",
                "headers": ["Player_ID", "Game_ID", "GAME_DATE", "PTS"],
                "rowSet": [
                    [1628983, "0022400061", "OCT 24, 2024", 28],
                    [1628983, "0022400050", "OCT 22, 2024", 33]
                ]
            }]
        });
        let h = harness(
            FakePrimary::default(),
            FakeLeague { leaders: Some(leaders_payload()), game_log: Some(log), ..Default::default() },
        )
        .await;
        let who = subject(PlayerKey::Foreign(9), "Shai", "Gilgeous-Alexander");

        let hit = h.stats.game_log(&who, 2024).await.unwrap();
        assert_eq!(hit.source, Source::League);
        assert_eq!(hit.data.len(), 2);
        assert!(hit.data.iter().all(|l| l.player_id == 9));
        assert_eq!(hit.data[1].id, 1);
        assert_eq!(hit.data[1].game.date, "2024-10-22");
    }

    #[tokio::test]
    async fn career_from_store_carries_totals() {
        let h = harness(FakePrimary::default(), FakeLeague::default()).await;
        let who = subject(PlayerKey::Local(1628369), "Jayson", "Tatum");

        let hit = h.stats.career(&who, 2024).await.unwrap();
        assert_eq!(hit.source, Source::Db);
        assert_eq!(hit.data.seasons.len(), 2);
        assert_eq!(hit.data.totals.games_played, 146);
    }

    #[tokio::test]
    async fn career_walks_primary_seasons_from_draft_year() {
        let h = harness(
            FakePrimary {
                averages: vec![averages(77, 2023, 10.0), averages(77, 2024, 20.0)],
                ..Default::default()
            },
            FakeLeague::default(),
        )
        .await;
        let mut who = subject(PlayerKey::Foreign(77), "Cooper", "Flagg");
        who.draft_year = Some(2022);

        let hit = h.stats.career(&who, 2024).await.unwrap();
        assert_eq!(hit.source, Source::Primary);
        assert_eq!(hit.data.seasons.len(), 2);
        assert_eq!(hit.data.totals.games_played, 100);
        assert_eq!(hit.data.totals.line.pts, 15.0);
        assert_eq!(h.primary.calls(), 3);
    }
}
