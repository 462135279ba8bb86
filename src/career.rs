//! Career aggregation over per-season averages.
//!
//! Games played are summed. Counting stats are weighted by games played.
//! Shooting percentages are never averaged: makes and attempts are rebuilt
//! from `per_game * games`, summed, and divided.

use crate::types::{CareerTotals, SeasonAverages, StatLine};

/// Accepts `"32:15"` (minutes:seconds) and `"32.5"`. Anything else is zero.
pub fn parse_minutes(raw: &str) -> f64 {
    let raw = raw.trim();
    match raw.split_once(':') {
        Some((mins, secs)) => {
            let mins: f64 = mins.trim().parse().unwrap_or(0.0);
            let secs: f64 = secs.trim().parse().unwrap_or(0.0);
            mins + secs / 60.0
        }
        None => raw.parse().unwrap_or(0.0),
    }
}

pub fn compute_career_totals(seasons: &[SeasonAverages]) -> CareerTotals {
    let games: i64 = seasons.iter().map(|s| s.games_played).sum();
    if games <= 0 {
        return CareerTotals {
            games_played: 0,
            line: StatLine { min: "0.0".into(), ..Default::default() },
        };
    }
    let g = games as f64;

    // sum(per_game * games) across seasons
    let total = |stat: fn(&StatLine) -> f64| -> f64 {
        seasons.iter().map(|s| stat(&s.line) * s.games_played as f64).sum()
    };
    let ratio = |made: f64, attempts: f64| if attempts > 0.0 { made / attempts } else { 0.0 };

    let minutes: f64 = seasons
        .iter()
        .map(|s| parse_minutes(&s.line.min) * s.games_played as f64)
        .sum();

    let (fgm, fga) = (total(|l| l.fgm), total(|l| l.fga));
    let (fg3m, fg3a) = (total(|l| l.fg3m), total(|l| l.fg3a));
    let (ftm, fta) = (total(|l| l.ftm), total(|l| l.fta));

    CareerTotals {
        games_played: games,
        line: StatLine {
            min: format!("{:.1}", minutes / g),
            pts: total(|l| l.pts) / g,
            reb: total(|l| l.reb) / g,
            ast: total(|l| l.ast) / g,
            stl: total(|l| l.stl) / g,
            blk: total(|l| l.blk) / g,
            turnover: total(|l| l.turnover) / g,
            fg_pct: ratio(fgm, fga),
            fg3_pct: ratio(fg3m, fg3a),
            ft_pct: ratio(ftm, fta),
            fgm: fgm / g,
            fga: fga / g,
            fg3m: fg3m / g,
            fg3a: fg3a / g,
            ftm: ftm / g,
            fta: fta / g,
            oreb: total(|l| l.oreb) / g,
            dreb: total(|l| l.dreb) / g,
            pf: total(|l| l.pf) / g,
        },
    }
}
