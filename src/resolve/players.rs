//! Single-player lookup and merged player search.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{SEARCH_ALL_LIMIT, SEARCH_REMOTE_ROWS};
use crate::db::LocalStore;
use crate::error::{AppError, Result};
use crate::resolve::identity::normalize;
use crate::sources::primary::{PlayerQuery, PrimarySource};
use crate::types::{Player, PlayerDetail, PlayerKey, SearchHit, Source, Sourced};

/// How duplicate names inside one source's result set are collapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupPolicy {
    /// Keep the numerically larger ID. Assumes larger IDs are the more
    /// recently synced records. Unverified against real data: it picks the
    /// wrong row whenever a stale record happens to carry the higher ID.
    PreferHigherId,
    /// Keep whichever record the source listed first.
    FirstSeen,
}

/// Merge rules for search across the local store and the primary provider.
#[derive(Debug, Clone, Copy)]
pub struct SearchPolicy {
    pub dedup: DedupPolicy,
    /// Source whose record wins outright when both have the same name.
    pub authority: Source,
    /// Query the primary provider even when the store has results.
    pub always_merge: bool,
}

impl Default for SearchPolicy {
    fn default() -> Self {
        Self {
            dedup: DedupPolicy::PreferHigherId,
            authority: Source::Db,
            always_merge: false,
        }
    }
}

fn name_key(p: &Player) -> String {
    normalize(&p.full_name())
}

/// Collapses same-name records within one source. Each name keeps the
/// position of its first appearance.
pub fn dedup_by_name(players: Vec<Player>, policy: DedupPolicy) -> Vec<Player> {
    let mut order: Vec<String> = Vec::new();
    let mut best: HashMap<String, Player> = HashMap::new();
    for p in players {
        match best.entry(name_key(&p)) {
            Entry::Vacant(slot) => {
                order.push(slot.key().clone());
                slot.insert(p);
            }
            Entry::Occupied(mut slot) => {
                if policy == DedupPolicy::PreferHigherId && p.id > slot.get().id {
                    slot.insert(p);
                }
            }
        }
    }
    order.into_iter().filter_map(|k| best.remove(&k)).collect()
}

/// Merges per-source results into one list with one entry per name.
/// Local results are listed before primary ones; a name keeps its first
/// position but takes the authoritative source's record when both have it.
pub fn merge_results(local: Vec<Player>, remote: Vec<Player>, policy: &SearchPolicy) -> Vec<SearchHit> {
    let tagged = dedup_by_name(local, policy.dedup)
        .into_iter()
        .map(|p| (Source::Db, p))
        .chain(dedup_by_name(remote, policy.dedup).into_iter().map(|p| (Source::Primary, p)));

    let mut order: Vec<String> = Vec::new();
    let mut chosen: HashMap<String, (Source, Player)> = HashMap::new();
    for (source, p) in tagged {
        match chosen.entry(name_key(&p)) {
            Entry::Vacant(slot) => {
                order.push(slot.key().clone());
                slot.insert((source, p));
            }
            Entry::Occupied(mut slot) => {
                if source == policy.authority && slot.get().0 != policy.authority {
                    slot.insert((source, p));
                }
            }
        }
    }

    order
        .into_iter()
        .filter_map(|k| chosen.remove(&k))
        .map(|(source, player)| {
            let key = match source {
                Source::Db => PlayerKey::Local(player.id),
                _ => PlayerKey::Foreign(player.id),
            };
            SearchHit { key: key.to_string(), source, player }
        })
        .collect()
}

pub struct PlayerResolver {
    store: LocalStore,
    primary: Arc<dyn PrimarySource>,
    policy: SearchPolicy,
}

impl PlayerResolver {
    pub fn new(store: LocalStore, primary: Arc<dyn PrimarySource>) -> Self {
        Self { store, primary, policy: SearchPolicy::default() }
    }

    pub fn with_policy(mut self, policy: SearchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Foreign keys go to the primary provider only. Local keys try the
    /// store, then the primary provider under the same number. A primary hit
    /// is checked against the store by name in case the number collided
    /// with some other player's local ID.
    pub async fn resolve(&self, key: PlayerKey) -> Result<Sourced<PlayerDetail>> {
        let id = match key {
            PlayerKey::Foreign(id) => {
                let player = self.primary.player(id).await?;
                return Ok(Sourced {
                    source: Source::Primary,
                    data: PlayerDetail { player, season_averages: None },
                });
            }
            PlayerKey::Local(id) => id,
        };

        match self.store.player_by_id(id).await {
            Ok(Some(detail)) if !detail.player.first_name.trim().is_empty() => {
                return Ok(Sourced { source: Source::Db, data: detail });
            }
            Ok(_) => debug!(player_id = id, "Player not in local store"),
            Err(e) => warn!(player_id = id, "Local player lookup failed: {e}"),
        }

        match self.primary.player(id).await {
            Ok(player) => {
                if let Some(local) = self.local_twin(&player).await {
                    info!(player_id = id, local_id = local.player.id, "Primary player matched a local record by name");
                    return Ok(Sourced { source: Source::Db, data: local });
                }
                Ok(Sourced {
                    source: Source::Primary,
                    data: PlayerDetail { player, season_averages: None },
                })
            }
            Err(AppError::NotFound(_)) => Err(AppError::NotFound(format!("player {key}"))),
            Err(e) => {
                warn!(player_id = id, "Primary player lookup failed: {e}");
                Err(AppError::NotFound(format!("player {key}")))
            }
        }
    }

    async fn local_twin(&self, player: &Player) -> Option<PlayerDetail> {
        let found = self
            .store
            .find_player_by_name(&player.first_name, &player.last_name)
            .await;
        match found {
            Ok(Some(local)) => match self.store.player_by_id(local.id).await {
                Ok(Some(detail)) if !detail.player.first_name.trim().is_empty() => Some(detail),
                Ok(_) => None,
                Err(e) => {
                    warn!(local_id = local.id, "Local re-resolution failed: {e}");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(player_id = player.id, "Local name search failed: {e}");
                None
            }
        }
    }

    /// Merged, name-deduplicated search, truncated to `limit` only after
    /// deduplication so a duplicate name always resolves the same way. An
    /// empty query lists local players only.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let query = query.trim();
        let window = limit.max(SEARCH_ALL_LIMIT);
        if query.is_empty() {
            let all = self.store.search_players("", window).await?;
            let mut hits = merge_results(all, Vec::new(), &self.policy);
            hits.truncate(limit);
            return Ok(hits);
        }

        let local = match self.store.search_players(query, window).await {
            Ok(rows) => Some(rows),
            Err(e) => {
                warn!(query, "Local player search failed: {e}");
                None
            }
        };

        let needs_remote = self.policy.always_merge || local.as_ref().map_or(true, Vec::is_empty);
        let remote = if needs_remote {
            let per_page = u32::try_from(limit.max(SEARCH_REMOTE_ROWS).min(100)).unwrap_or(100);
            match self.primary.players(&PlayerQuery::search(query, per_page)).await {
                Ok(page) => page.data,
                Err(e) => {
                    warn!(query, "Primary player search failed: {e}");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let mut hits = merge_results(local.unwrap_or_default(), remote, &self.policy);
        hits.truncate(limit);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::reader::tests::{seeded_store, seeded_store_with};
    use crate::resolve::fakes::{player, FakePrimary};

    async fn resolver(primary: FakePrimary) -> (PlayerResolver, Arc<FakePrimary>) {
        let primary = Arc::new(primary);
        (PlayerResolver::new(seeded_store().await, primary.clone()), primary)
    }

    #[tokio::test]
    async fn local_players_never_touch_the_primary_provider() {
        let (r, primary) = resolver(FakePrimary::default()).await;
        for id in [1628369, 1627759, 1628991, 1628389] {
            let hit = r.resolve(PlayerKey::Local(id)).await.unwrap();
            assert_eq!(hit.source, Source::Db);
            assert_eq!(hit.data.player.id, id);
        }
        assert_eq!(primary.calls(), 0);
    }

    #[tokio::test]
    async fn missing_local_player_falls_back_to_primary() {
        let (r, primary) = resolver(FakePrimary {
            players: vec![player(77, "Cooper", "Flagg")],
            ..Default::default()
        })
        .await;

        let hit = r.resolve(PlayerKey::Local(77)).await.unwrap();
        assert_eq!(hit.source, Source::Primary);
        assert_eq!(hit.data.player.full_name(), "Cooper Flagg");
        assert_eq!(primary.calls(), 1);
    }

    #[tokio::test]
    async fn nameless_local_row_is_not_a_hit() {
        let (r, _) = resolver(FakePrimary {
            players: vec![player(1629000, "Real", "Person")],
            ..Default::default()
        })
        .await;

        let hit = r.resolve(PlayerKey::Local(1629000)).await.unwrap();
        assert_eq!(hit.source, Source::Primary);
        assert_eq!(hit.data.player.first_name, "Real");
    }

    #[tokio::test]
    async fn colliding_primary_id_is_re_resolved_to_the_local_record() {
        // The primary provider's 55 is Jayson Tatum; locally he is 1628369.
        let (r, _) = resolver(FakePrimary {
            players: vec![player(55, "Jayson", "Tatum")],
            ..Default::default()
        })
        .await;

        let hit = r.resolve(PlayerKey::Local(55)).await.unwrap();
        assert_eq!(hit.source, Source::Db);
        assert_eq!(hit.data.player.id, 1628369);
        assert!(hit.data.season_averages.is_some());
    }

    #[tokio::test]
    async fn foreign_keys_skip_the_store() {
        let (r, _) = resolver(FakePrimary {
            players: vec![player(1628369, "Someone", "Else")],
            ..Default::default()
        })
        .await;

        let hit = r.resolve(PlayerKey::Foreign(1628369)).await.unwrap();
        assert_eq!(hit.source, Source::Primary);
        assert_eq!(hit.data.player.first_name, "Someone");
    }

    #[tokio::test]
    async fn unknown_everywhere_is_not_found() {
        let (r, _) = resolver(FakePrimary::default()).await;
        let err = r.resolve(PlayerKey::Local(5)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let (r, primary) = resolver(FakePrimary::default()).await;
        primary.failing.store(true, std::sync::atomic::Ordering::SeqCst);
        let err = r.resolve(PlayerKey::Local(5)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn duplicate_names_keep_the_higher_id_in_first_position() {
        let merged = dedup_by_name(
            vec![
                player(10, "Jalen", "Williams"),
                player(3, "Jaylen", "Brown"),
                player(99, "Jalen", "Williams"),
            ],
            DedupPolicy::PreferHigherId,
        );
        let ids: Vec<i64> = merged.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![99, 3]);

        let first = dedup_by_name(
            vec![player(10, "Jalen", "Williams"), player(99, "jalen", "williams")],
            DedupPolicy::FirstSeen,
        );
        assert_eq!(first[0].id, 10);
    }

    #[test]
    fn authoritative_source_wins_on_shared_names() {
        let local = vec![player(1628369, "Jayson", "Tatum")];
        let remote = vec![player(434, "Jayson", "Tatum"), player(9, "Jaylen", "Brown")];

        let hits = merge_results(local.clone(), remote.clone(), &SearchPolicy::default());
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].key, "1628369");
        assert_eq!(hits[1].key, "bdl-9");

        let remote_first = SearchPolicy { authority: Source::Primary, ..Default::default() };
        let hits = merge_results(local, remote, &remote_first);
        assert_eq!(hits[0].key, "bdl-434");
        assert_eq!(hits[0].source, Source::Primary);
    }

    #[tokio::test]
    async fn search_uses_primary_only_when_store_has_nothing() {
        let (r, primary) = resolver(FakePrimary {
            players: vec![player(434, "Jayson", "Tatum"), player(88, "Zion", "Williamson")],
            ..Default::default()
        })
        .await;

        let hits = r.search("tatum", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, Source::Db);
        assert_eq!(primary.calls(), 0);

        let hits = r.search("zion", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key, "bdl-88");
        assert_eq!(primary.calls(), 1);
    }

    #[tokio::test]
    async fn same_player_under_two_ids_appears_once() {
        let (r, _) = resolver(FakePrimary {
            players: vec![player(434, "Jayson", "Tatum")],
            ..Default::default()
        })
        .await;
        let r = r.with_policy(SearchPolicy { always_merge: true, ..Default::default() });

        let hits = r.search("Jayson Tatum", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].player.id, 1628369);
    }

    #[tokio::test]
    async fn empty_query_lists_local_players_up_to_the_limit() {
        let (r, primary) = resolver(FakePrimary::default()).await;
        assert_eq!(r.search("  ", 3).await.unwrap().len(), 3);
        assert_eq!(r.search("", SEARCH_ALL_LIMIT).await.unwrap().len(), 5);
        assert_eq!(primary.calls(), 0);
    }

    #[tokio::test]
    async fn duplicate_at_the_limit_still_keeps_the_higher_id() {
        let store = seeded_store_with(&[
            "INSERT INTO players (id, first_name, last_name, position, team_id, draft_year)
             VALUES (1999999, 'Jayson', 'Tatum', 'F', 1610612738, 2017)",
        ])
        .await;
        let r = PlayerResolver::new(store, Arc::new(FakePrimary::default()));

        for limit in [2, 10] {
            let ids: Vec<i64> = r.search("jay", limit).await.unwrap().iter().map(|h| h.player.id).collect();
            assert_eq!(ids, vec![1627759, 1999999], "limit {limit}");
        }
    }
}
