//! Ordered fallback over data sources.
//!
//! A [`Cascade`] is a list of stages, each tagged with the [`Source`] it
//! reads. Stages run one at a time in declaration order and are only started
//! when every earlier stage came up empty. A stage that errors is logged and
//! skipped. The first `Ok(Some(_))` wins and is returned with its source.

use std::future::Future;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tracing::{debug, warn};

use crate::error::Result;
use crate::types::{Source, Sourced};

type StageFn<'a, T> = Box<dyn FnOnce() -> BoxFuture<'a, Result<Option<T>>> + Send + 'a>;

struct Stage<'a, T> {
    source: Source,
    label: &'static str,
    run: StageFn<'a, T>,
}

pub struct Cascade<'a, T> {
    what: &'static str,
    stages: Vec<Stage<'a, T>>,
}

impl<'a, T: Send + 'a> Cascade<'a, T> {
    /// `what` names the entity in log lines.
    pub fn new(what: &'static str) -> Self {
        Self { what, stages: Vec::new() }
    }

    pub fn stage<F, Fut>(mut self, source: Source, label: &'static str, f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Result<Option<T>>> + Send + 'a,
    {
        self.stages.push(Stage {
            source,
            label,
            run: Box::new(move || f().boxed()),
        });
        self
    }

    /// Adds `f` only when `enabled`.
    pub fn stage_if<F, Fut>(self, enabled: bool, source: Source, label: &'static str, f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Result<Option<T>>> + Send + 'a,
    {
        if enabled {
            self.stage(source, label, f)
        } else {
            self
        }
    }

    /// First non-empty stage result, or `None` once every stage is exhausted.
    pub async fn run(self) -> Option<Sourced<T>> {
        let what = self.what;
        for stage in self.stages {
            match (stage.run)().await {
                Ok(Some(data)) => {
                    debug!(what, source = %stage.source, stage = stage.label, "Resolved");
                    return Some(Sourced { source: stage.source, data });
                }
                Ok(None) => debug!(what, source = %stage.source, stage = stage.label, "Stage empty"),
                Err(e) => warn!(what, source = %stage.source, stage = stage.label, "Stage failed: {e}"),
            }
        }
        debug!(what, "All stages exhausted");
        None
    }
}

/// `None` for an empty vec, so list-valued stages fall through on no rows.
pub fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn failing_and_empty_stages_are_skipped() {
        let hit = Cascade::new("test")
            .stage(Source::Db, "broken", || async {
                Err(AppError::Upstream { origin: Source::Db, status: 500 })
            })
            .stage(Source::Primary, "empty", || async { Ok(None) })
            .stage(Source::League, "answer", || async { Ok(Some(42)) })
            .run()
            .await
            .unwrap();

        assert_eq!(hit.source, Source::League);
        assert_eq!(hit.data, 42);
    }

    #[tokio::test]
    async fn later_stages_never_start_after_a_hit() {
        let counter = AtomicUsize::new(0);
        let started = &counter;
        let hit = Cascade::new("test")
            .stage(Source::Db, "first", move || async move {
                started.fetch_add(1, Ordering::SeqCst);
                Ok(Some("local"))
            })
            .stage(Source::Primary, "second", move || async move {
                started.fetch_add(1, Ordering::SeqCst);
                Ok(Some("remote"))
            })
            .run()
            .await
            .unwrap();

        assert_eq!(hit.data, "local");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_is_none_not_an_error() {
        let miss: Option<Sourced<u8>> = Cascade::new("test")
            .stage(Source::Db, "broken", || async { Err(AppError::NotFound("x".into())) })
            .stage_if(false, Source::Primary, "skipped", || async { Ok(Some(1)) })
            .run()
            .await;
        assert!(miss.is_none());
    }

    #[test]
    fn empty_lists_fall_through() {
        assert_eq!(non_empty(Vec::<u8>::new()), None);
        assert_eq!(non_empty(vec![1]), Some(vec![1]));
    }
}
