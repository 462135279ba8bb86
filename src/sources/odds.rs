use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::api::health::Metrics;
use crate::cache::{Clock, TtlCache};
use crate::config::{Config, AWARD_FUTURES_TTL_SECS, AWARD_TOP_N, GAME_ODDS_TTL_SECS, ODDS_SPORT, ODDS_TIMEOUT_SECS};
use crate::error::{AppError, Result};
use crate::types::{
    AwardCandidate, AwardCategory, AwardPrediction, GameOdds, Moneyline, Source, SpreadLine, TotalLine,
};

// ---------------------------------------------------------------------------
// Probability math
// ---------------------------------------------------------------------------

/// Implied probability (0..1) of an American price.
pub fn american_to_prob(odds: f64) -> f64 {
    if odds < 0.0 {
        odds.abs() / (odds.abs() + 100.0)
    } else {
        100.0 / (odds + 100.0)
    }
}

fn round1(pct: f64) -> f64 {
    (pct * 10.0).round() / 10.0
}

/// Scale raw implied probabilities so they sum to 100, removing the
/// bookmaker overround. Each share is rounded to one decimal.
pub fn normalize(raw: &[f64]) -> Vec<f64> {
    let total: f64 = raw.iter().sum();
    if total <= 0.0 {
        return vec![0.0; raw.len()];
    }
    raw.iter().map(|p| round1(p / total * 100.0)).collect()
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct OddsEvent {
    pub id: String,
    #[serde(default)]
    pub commence_time: String,
    #[serde(default)]
    pub home_team: Option<String>,
    #[serde(default)]
    pub away_team: Option<String>,
    #[serde(default)]
    pub bookmakers: Vec<Bookmaker>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Bookmaker {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub markets: Vec<Market>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Market {
    pub key: String,
    #[serde(default)]
    pub outcomes: Vec<Outcome>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Outcome {
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub point: Option<f64>,
}

impl Market {
    fn outcome(&self, name: &str) -> Option<&Outcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }
}

/// Fold one event's bookmakers into a single snapshot. Each market is taken
/// from the first bookmaker that quotes it completely.
pub fn parse_game_odds(event: &OddsEvent) -> GameOdds {
    let home = event.home_team.clone().unwrap_or_default();
    let away = event.away_team.clone().unwrap_or_default();

    let mut moneyline = None;
    let mut spread = None;
    let mut total = None;
    let mut bookmaker = String::new();

    for bm in &event.bookmakers {
        if bookmaker.is_empty() && !bm.markets.is_empty() {
            bookmaker = bm.title.clone();
        }
        for market in &bm.markets {
            match market.key.as_str() {
                "h2h" if moneyline.is_none() => {
                    if let (Some(h), Some(a)) = (market.outcome(&home), market.outcome(&away)) {
                        moneyline = Some(Moneyline { home: h.price, away: a.price });
                    }
                }
                "spreads" if spread.is_none() => {
                    if let (Some(h), Some(a)) = (market.outcome(&home), market.outcome(&away)) {
                        if let (Some(hp), Some(ap)) = (h.point, a.point) {
                            spread = Some(SpreadLine { home: h.price, away: a.price, home_point: hp, away_point: ap });
                        }
                    }
                }
                "totals" if total.is_none() => {
                    if let (Some(o), Some(u)) = (market.outcome("Over"), market.outcome("Under")) {
                        if let Some(point) = o.point {
                            total = Some(TotalLine { over: o.price, under: u.price, point });
                        }
                    }
                }
                _ => {}
            }
        }
        if moneyline.is_some() && spread.is_some() && total.is_some() {
            break;
        }
    }

    let (home_win_prob, away_win_prob) = match moneyline {
        Some(ml) => {
            let p = normalize(&[american_to_prob(ml.home), american_to_prob(ml.away)]);
            (p[0], p[1])
        }
        None => (50.0, 50.0),
    };

    GameOdds {
        event_id: event.id.clone(),
        home_team: home,
        away_team: away,
        commence_time: event.commence_time.clone(),
        moneyline,
        spread,
        total,
        home_win_prob,
        away_win_prob,
        bookmaker,
    }
}

/// Top candidates of an outright market, vig-normalized across every
/// outcome the first quoting bookmaker lists.
pub fn parse_award_futures(category: AwardCategory, events: &[OddsEvent], top_n: usize) -> AwardPrediction {
    let quoted = events.iter().flat_map(|e| &e.bookmakers).find_map(|bm| {
        bm.markets
            .iter()
            .find(|m| m.key == "outrights" && !m.outcomes.is_empty())
            .map(|m| (bm.title.clone(), m))
    });

    let Some((bookmaker, market)) = quoted else {
        return AwardPrediction {
            category,
            label: category.label(),
            bookmaker: None,
            candidates: Vec::new(),
        };
    };

    let raw: Vec<f64> = market.outcomes.iter().map(|o| american_to_prob(o.price)).collect();
    let shares = normalize(&raw);

    let mut ranked: Vec<(&Outcome, f64)> = market.outcomes.iter().zip(shares).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    let candidates = ranked
        .into_iter()
        .take(top_n)
        .enumerate()
        .map(|(i, (o, probability))| AwardCandidate {
            rank: i + 1,
            name: o.name.clone(),
            odds: o.price,
            probability,
        })
        .collect();

    AwardPrediction {
        category,
        label: category.label(),
        bookmaker: Some(bookmaker),
        candidates,
    }
}

// ---------------------------------------------------------------------------
// OddsClient
// ---------------------------------------------------------------------------

/// Betting-odds provider. Single attempt per call, no retry.
pub struct OddsClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    games: TtlCache<(), Vec<GameOdds>>,
    futures: TtlCache<AwardCategory, AwardPrediction>,
    metrics: Arc<Metrics>,
}

impl OddsClient {
    pub fn new(cfg: &Config, clock: Arc<dyn Clock>, metrics: Arc<Metrics>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(ODDS_TIMEOUT_SECS))
            .build()?;
        if cfg.odds_api_key.is_none() {
            info!("ODDS_API_KEY not set, odds endpoints will return empty results");
        }
        Ok(Self {
            client,
            base_url: cfg.odds_api_url.trim_end_matches('/').to_string(),
            api_key: cfg.odds_api_key.clone(),
            games: TtlCache::new(Duration::from_secs(GAME_ODDS_TTL_SECS), clock.clone()),
            futures: TtlCache::new(Duration::from_secs(AWARD_FUTURES_TTL_SECS), clock),
            metrics,
        })
    }

    async fn get<T: DeserializeOwned>(&self, sport: &str, markets: &str, key: &str) -> Result<T> {
        let url = format!("{}/sports/{}/odds", self.base_url, sport);
        let started = Instant::now();
        let result = async {
            let resp = self
                .client
                .get(&url)
                .query(&[("apiKey", key), ("regions", "us"), ("markets", markets), ("oddsFormat", "american")])
                .send()
                .await
                .map_err(|e| if e.is_timeout() { AppError::Timeout(Source::Odds) } else { AppError::Http(e) })?;
            let status = resp.status();
            if !status.is_success() {
                return Err(AppError::Upstream { origin: Source::Odds, status: status.as_u16() });
            }
            Ok(resp.json::<T>().await?)
        }
        .await;
        self.metrics.observe(Source::Odds, started.elapsed(), result.is_ok());
        result
    }

    /// Moneyline, spread and total for every upcoming game.
    pub async fn game_odds(&self) -> Result<Arc<Vec<GameOdds>>> {
        let Some(key) = self.api_key.as_deref() else {
            return Ok(Arc::new(Vec::new()));
        };
        self.games
            .fetch_through((), false, || async {
                let events: Vec<OddsEvent> = self.get(ODDS_SPORT, "h2h,spreads,totals", key).await?;
                debug!(events = events.len(), "Game odds refreshed");
                Ok(events.iter().map(parse_game_odds).collect())
            })
            .await
    }

    /// Top candidates for one award. Failures yield an empty candidate list.
    pub async fn award_futures(&self, category: AwardCategory) -> AwardPrediction {
        let empty = || AwardPrediction {
            category,
            label: category.label(),
            bookmaker: None,
            candidates: Vec::new(),
        };
        let Some(key) = self.api_key.as_deref() else {
            return empty();
        };

        let fetched = self
            .futures
            .fetch_through(category, false, || async {
                let events: Vec<OddsEvent> = self.get(category.sport_key(), "outrights", key).await?;
                Ok(parse_award_futures(category, &events, AWARD_TOP_N))
            })
            .await;

        match fetched {
            Ok(prediction) => prediction.as_ref().clone(),
            Err(e) => {
                warn!(category = category.sport_key(), "Award futures unavailable: {e}");
                empty()
            }
        }
    }

    /// Every award category, fetched concurrently.
    pub async fn all_award_futures(&self) -> Vec<AwardPrediction> {
        futures_util::future::join_all(AwardCategory::ALL.iter().map(|&c| self.award_futures(c))).await
    }
}
