use std::sync::Arc;

use chrono::NaiveDate;

use crate::db::reader::DEFAULT_GAME_LIMIT;
use crate::db::{GameFilter, LocalStore};
use crate::resolve::cascade::{non_empty, Cascade};
use crate::sources::primary::{GameQuery, PrimarySource};
use crate::types::{Envelope, Game, Meta, Source, Sourced};

/// Games listings. The store only holds a rolling window of recent days, so
/// team-over-a-season queries bypass it.
pub struct GameResolver {
    store: LocalStore,
    primary: Arc<dyn PrimarySource>,
}

fn is_team_season_query(filter: &GameFilter) -> bool {
    filter.team_id.is_some() && filter.date.is_none() && filter.start_date.is_none() && filter.end_date.is_none()
}

impl GameResolver {
    pub fn new(store: LocalStore, primary: Arc<dyn PrimarySource>) -> Self {
        Self { store, primary }
    }

    /// Store first unless the query spans a team's season. `current_season`
    /// fills in an unset season for the store query.
    pub async fn games(&self, filter: &GameFilter, current_season: i32) -> Sourced<Envelope<Vec<Game>>> {
        let limit = filter.limit.unwrap_or(DEFAULT_GAME_LIMIT);
        let store = &self.store;
        let primary = self.primary.as_ref();

        let local_filter = GameFilter {
            season: filter.season.or(Some(current_season)),
            limit: Some(limit),
            ..filter.clone()
        };
        let query = GameQuery {
            per_page: Some(limit.min(100)),
            dates: filter.date.iter().cloned().collect(),
            seasons: filter.season.into_iter().collect(),
            team_ids: filter.team_id.into_iter().collect(),
            postseason: filter.postseason,
            start_date: filter.start_date.clone(),
            end_date: filter.end_date.clone(),
            ..Default::default()
        };

        let found = Cascade::new("games")
            .stage_if(!is_team_season_query(filter), Source::Db, "store", move || async move {
                let games = store.games(&local_filter).await?;
                let n = games.len();
                Ok(non_empty(games).map(|g| Envelope::with_meta(g, Meta::single_page(n, limit as usize))))
            })
            .stage(Source::Primary, "primary", move || async move {
                let page = primary.games(&query).await?;
                Ok(if page.data.is_empty() { None } else { Some(page) })
            })
            .run()
            .await;

        found.unwrap_or_else(|| Sourced {
            source: Source::Primary,
            data: Envelope::with_meta(Vec::new(), Meta::single_page(0, limit as usize)),
        })
    }

    /// The store's slate for `today`, else the primary provider's.
    pub async fn today(&self, today: NaiveDate) -> Sourced<Vec<Game>> {
        let store = &self.store;
        let primary = self.primary.as_ref();
        let day = today.format("%Y-%m-%d").to_string();

        Cascade::new("today's games")
            .stage(Source::Db, "store", move || async move {
                Ok(non_empty(store.games_on(today).await?))
            })
            .stage(Source::Primary, "primary by date", move || async move {
                let query = GameQuery { dates: vec![day], per_page: Some(100), ..Default::default() };
                Ok(non_empty(primary.games(&query).await?.data))
            })
            .run()
            .await
            .unwrap_or(Sourced { source: Source::Db, data: Vec::new() })
    }
}
