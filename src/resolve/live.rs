//! Live scores and the adaptive scoreboard poll.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::config::{LIVE_POLL_SECS, POLL_IDLE_RECHECK_SECS, SCHEDULED_POLL_SECS};
use crate::db::LocalStore;
use crate::resolve::cascade::{non_empty, Cascade};
use crate::season::today_utc;
use crate::sources::primary::{GameQuery, PrimarySource};
use crate::sources::scoreboard::ScoreboardFeed;
use crate::types::{Game, GameStatus, Source, Sourced};

// ---------------------------------------------------------------------------
// Poll cadence
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollDecision {
    Every(Duration),
    Stop,
}

impl PollDecision {
    pub fn as_millis(self) -> Option<u64> {
        match self {
            PollDecision::Every(d) => Some(d.as_millis() as u64),
            PollDecision::Stop => None,
        }
    }
}

/// 30 s while anything is live, 5 min while games are only scheduled, stop
/// once every game is final. An empty slate keeps the fast cadence until
/// the feed has data.
pub fn next_poll(games: &[Game]) -> PollDecision {
    if games.is_empty() || games.iter().any(|g| g.status == GameStatus::InProgress) {
        PollDecision::Every(Duration::from_secs(LIVE_POLL_SECS))
    } else if games.iter().any(|g| g.status == GameStatus::Scheduled) {
        PollDecision::Every(Duration::from_secs(SCHEDULED_POLL_SECS))
    } else {
        PollDecision::Stop
    }
}

// ---------------------------------------------------------------------------
// Status tracking
// ---------------------------------------------------------------------------

struct Seen {
    status: GameStatus,
    /// `YYYY-MM-DD` the game is played on.
    day: String,
}

/// Highest status seen per game. Observations are clamped so a game never
/// moves backwards, whatever the source says. Game IDs are only unique
/// within one source, so entries are keyed by `(source, id)`.
#[derive(Default)]
pub struct StatusTracker {
    seen: DashMap<(Source, i64), Seen>,
}

fn game_day(game: &Game) -> String {
    game.date.get(..10).unwrap_or(&game.date).to_string()
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, source: Source, game: &mut Game) {
        let mut known = self
            .seen
            .entry((source, game.id))
            .or_insert_with(|| Seen { status: game.status, day: game_day(game) });
        let status = known.status.advance(game.status);
        if status != game.status {
            debug!(%source, game_id = game.id, reported = %game.status, kept = %status, "Ignoring status regression");
        }
        known.status = status;
        game.status = status;
    }

    pub fn observe_all(&self, source: Source, games: &mut [Game]) {
        for game in games {
            self.observe(source, game);
        }
    }

    /// Forgets final games played before `today`. Returns how many went.
    pub fn evict_finished(&self, today: NaiveDate) -> usize {
        let cutoff = today.format("%Y-%m-%d").to_string();
        let before = self.seen.len();
        self.seen
            .retain(|_, seen| !(seen.status == GameStatus::Final && seen.day < cutoff));
        before - self.seen.len()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.seen.len()
    }
}

// ---------------------------------------------------------------------------
// LiveScores
// ---------------------------------------------------------------------------

pub struct LiveScores {
    feed: Arc<dyn ScoreboardFeed>,
    store: LocalStore,
    primary: Arc<dyn PrimarySource>,
    tracker: Arc<StatusTracker>,
}

impl LiveScores {
    pub fn new(
        feed: Arc<dyn ScoreboardFeed>,
        store: LocalStore,
        primary: Arc<dyn PrimarySource>,
        tracker: Arc<StatusTracker>,
    ) -> Self {
        Self { feed, store, primary, tracker }
    }

    /// Today reads the live feed and degrades to the store's snapshot, then
    /// the primary provider. Other dates skip the feed.
    pub async fn for_date(&self, date: NaiveDate, today: NaiveDate) -> Sourced<Vec<Game>> {
        let is_today = date == today;
        let day = date.format("%Y-%m-%d").to_string();
        let feed = self.feed.as_ref();
        let store = &self.store;
        let primary = self.primary.as_ref();

        let found = Cascade::new("scores")
            .stage_if(is_today, Source::Live, "scoreboard", move || async move {
                Ok(non_empty(feed.scoreboard(date, true).await?.as_ref().clone()))
            })
            .stage(Source::Db, "store snapshot", move || async move {
                Ok(non_empty(store.games_on(date).await?))
            })
            .stage(Source::Primary, "primary by date", move || async move {
                let query = GameQuery { dates: vec![day], per_page: Some(100), ..Default::default() };
                Ok(non_empty(primary.games(&query).await?.data))
            })
            .run()
            .await;

        let mut board = found.unwrap_or(Sourced {
            source: if is_today { Source::Live } else { Source::Db },
            data: Vec::new(),
        });
        self.tracker.observe_all(board.source, &mut board.data);
        board
    }
}

// ---------------------------------------------------------------------------
// LivePoller
// ---------------------------------------------------------------------------

/// Background task that keeps today's scoreboard cache warm on the
/// `next_poll` cadence. Once every game is final it stops polling until the
/// date changes, checking back every `POLL_IDLE_RECHECK_SECS`.
pub struct LivePoller {
    feed: Arc<dyn ScoreboardFeed>,
    tracker: Arc<StatusTracker>,
    done_for: Option<NaiveDate>,
}

impl LivePoller {
    pub fn new(feed: Arc<dyn ScoreboardFeed>, tracker: Arc<StatusTracker>) -> Self {
        Self { feed, tracker, done_for: None }
    }

    pub async fn run(mut self) {
        info!("Live poller started");
        loop {
            let wait = self.tick(today_utc()).await;
            tokio::time::sleep(wait).await;
        }
    }

    /// One poll for `today`; returns how long to wait before the next.
    async fn tick(&mut self, today: NaiveDate) -> Duration {
        let idle = Duration::from_secs(POLL_IDLE_RECHECK_SECS);
        let evicted = self.tracker.evict_finished(today);
        if evicted > 0 {
            debug!(evicted, "Dropped finished games from the status tracker");
        }
        if self.done_for == Some(today) {
            return idle;
        }

        match self.feed.scoreboard(today, true).await {
            Ok(board) => {
                let mut games = board.as_ref().clone();
                self.tracker.observe_all(Source::Live, &mut games);
                match next_poll(&games) {
                    PollDecision::Every(d) => {
                        debug!(games = games.len(), next_secs = d.as_secs(), "Scoreboard polled");
                        d
                    }
                    PollDecision::Stop => {
                        info!(games = games.len(), %today, "All games final, live polling paused for the day");
                        self.done_for = Some(today);
                        idle
                    }
                }
            }
            Err(e) => {
                warn!("Scoreboard poll failed: {e}");
                Duration::from_secs(LIVE_POLL_SECS)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::reader::tests::seeded_store;
    use crate::error::{AppError, Result};
    use crate::resolve::fakes::{game, team, FakePrimary};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeFeed {
        calls: AtomicUsize,
        failing: AtomicBool,
        games: Mutex<Vec<Game>>,
    }

    impl FakeFeed {
        fn set(&self, games: Vec<Game>) {
            *self.games.lock().unwrap() = games;
        }
    }

    #[async_trait]
    impl ScoreboardFeed for FakeFeed {
        async fn scoreboard(&self, _: NaiveDate, _: bool) -> Result<Arc<Vec<Game>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(AppError::Timeout(Source::Live));
            }
            Ok(Arc::new(self.games.lock().unwrap().clone()))
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn slate(statuses: &[GameStatus]) -> Vec<Game> {
        let (bos, mia) = (team(1, "BOS", "Boston", "Celtics"), team(2, "MIA", "Miami", "Heat"));
        statuses
            .iter()
            .enumerate()
            .map(|(i, s)| game(i as i64 + 1, "2025-01-07", *s, &bos, &mia, (0, 0)))
            .collect()
    }

    #[test]
    fn cadence_follows_the_slate() {
        use GameStatus::*;
        assert_eq!(next_poll(&slate(&[Final, InProgress, Scheduled])), PollDecision::Every(Duration::from_secs(30)));
        assert_eq!(next_poll(&slate(&[Final, Scheduled])), PollDecision::Every(Duration::from_secs(300)));
        assert_eq!(next_poll(&slate(&[Final, Final])), PollDecision::Stop);
        assert_eq!(next_poll(&[]), PollDecision::Every(Duration::from_secs(30)));
        assert_eq!(PollDecision::Stop.as_millis(), None);
    }

    #[test]
    fn tracker_never_lets_a_game_regress() {
        let tracker = StatusTracker::new();
        let mut seen = Vec::new();
        for reported in [GameStatus::Scheduled, GameStatus::InProgress, GameStatus::Final, GameStatus::InProgress] {
            let mut g = slate(&[reported]).remove(0);
            tracker.observe(Source::Live, &mut g);
            seen.push(g.status);
        }
        assert_eq!(
            seen,
            vec![GameStatus::Scheduled, GameStatus::InProgress, GameStatus::Final, GameStatus::Final]
        );
    }

    #[test]
    fn same_id_from_another_source_is_tracked_separately() {
        let tracker = StatusTracker::new();
        let mut live = slate(&[GameStatus::Final]).remove(0);
        tracker.observe(Source::Live, &mut live);

        let mut other = slate(&[GameStatus::Scheduled]).remove(0);
        tracker.observe(Source::Primary, &mut other);
        assert_eq!(other.status, GameStatus::Scheduled);
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn finished_games_from_past_days_are_evicted() {
        let tracker = StatusTracker::new();
        let mut games = slate(&[GameStatus::Final, GameStatus::InProgress]);
        tracker.observe_all(Source::Live, &mut games);

        assert_eq!(tracker.evict_finished(date("2025-01-07")), 0);
        assert_eq!(tracker.evict_finished(date("2025-01-08")), 1);
        assert_eq!(tracker.len(), 1);

        // Once forgotten, the ID may be reused by a new game.
        let mut reused = slate(&[GameStatus::Scheduled]).remove(0);
        tracker.observe(Source::Live, &mut reused);
        assert_eq!(reused.status, GameStatus::Scheduled);
    }

    async fn scores(feed: Arc<FakeFeed>, primary: FakePrimary) -> LiveScores {
        LiveScores::new(feed, seeded_store().await, Arc::new(primary), Arc::new(StatusTracker::new()))
    }

    #[tokio::test]
    async fn today_reads_the_live_feed() {
        let feed = Arc::new(FakeFeed::default());
        feed.set(slate(&[GameStatus::InProgress]));
        let live = scores(feed.clone(), FakePrimary::default()).await;

        let board = live.for_date(date("2025-01-07"), date("2025-01-07")).await;
        assert_eq!(board.source, Source::Live);
        assert_eq!(board.data.len(), 1);
    }

    #[tokio::test]
    async fn feed_failure_shows_the_store_snapshot() {
        let feed = Arc::new(FakeFeed::default());
        feed.failing.store(true, Ordering::SeqCst);
        let live = scores(feed.clone(), FakePrimary::default()).await;

        let board = live.for_date(date("2025-01-07"), date("2025-01-07")).await;
        assert_eq!(board.source, Source::Db);
        assert_eq!(board.data.len(), 2);
    }

    #[tokio::test]
    async fn other_dates_skip_the_feed() {
        let feed = Arc::new(FakeFeed::default());
        let (bos, mia) = (team(1, "BOS", "Boston", "Celtics"), team(2, "MIA", "Miami", "Heat"));
        let primary = FakePrimary {
            games: vec![game(7, "2025-01-01", GameStatus::Final, &bos, &mia, (99, 98))],
            ..Default::default()
        };
        let live = scores(feed.clone(), primary).await;

        let board = live.for_date(date("2025-01-05"), date("2025-01-07")).await;
        assert_eq!(board.source, Source::Db);
        assert_eq!(board.data[0].id, 100);

        let board = live.for_date(date("2025-01-01"), date("2025-01-07")).await;
        assert_eq!(board.source, Source::Primary);
        assert_eq!(board.data[0].home_team_score, 99);

        let board = live.for_date(date("2024-12-25"), date("2025-01-07")).await;
        assert!(board.data.is_empty());
        assert_eq!(feed.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn poller_stops_once_everything_is_final() {
        let feed = Arc::new(FakeFeed::default());
        let mut poller = LivePoller::new(feed.clone(), Arc::new(StatusTracker::new()));
        let day = date("2025-01-07");

        feed.set(slate(&[GameStatus::InProgress, GameStatus::Final]));
        assert_eq!(poller.tick(day).await, Duration::from_secs(LIVE_POLL_SECS));

        feed.set(slate(&[GameStatus::Final, GameStatus::Final]));
        assert_eq!(poller.tick(day).await, Duration::from_secs(POLL_IDLE_RECHECK_SECS));
        assert_eq!(feed.calls.load(Ordering::SeqCst), 2);

        // No further polls that day.
        assert_eq!(poller.tick(day).await, Duration::from_secs(POLL_IDLE_RECHECK_SECS));
        assert_eq!(feed.calls.load(Ordering::SeqCst), 2);

        feed.set(slate(&[GameStatus::Scheduled]));
        poller.tick(date("2025-01-08")).await;
        assert_eq!(feed.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn poller_retries_fast_after_a_failure() {
        let feed = Arc::new(FakeFeed::default());
        feed.failing.store(true, Ordering::SeqCst);
        let mut poller = LivePoller::new(feed, Arc::new(StatusTracker::new()));
        assert_eq!(poller.tick(date("2025-01-07")).await, Duration::from_secs(LIVE_POLL_SECS));
    }
}
