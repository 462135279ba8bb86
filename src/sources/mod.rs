//! Outbound adapters, one per upstream. Each owns its own timeout, retry and
//! cache policy; the resolvers in `crate::resolve` only see the traits.

pub mod league;
pub mod odds;
pub mod primary;
pub mod scoreboard;

use serde_json::Value;

/// Lenient numeric read: JSON numbers, numeric strings, `null` → 0.
pub(crate) fn num(v: Option<&Value>) -> f64 {
    match v {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

pub(crate) fn text(v: Option<&Value>) -> String {
    match v {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}
