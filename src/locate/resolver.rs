// src/locate/resolver.rs

//! Bounded polling of the screen element provider.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::device::{ScreenElementProvider, UiElement};
use crate::engine::StopHandle;
use crate::errors::StepResult;
use crate::locate::Selector;

/// Polls a [`ScreenElementProvider`] until a selector matches or its
/// wall-clock budget runs out.
#[derive(Clone)]
pub struct SelectorResolver {
    screen: Arc<dyn ScreenElementProvider>,
    poll_interval: Duration,
}

impl SelectorResolver {
    pub fn new(screen: Arc<dyn ScreenElementProvider>, poll_interval: Duration) -> Self {
        Self {
            screen,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Re-query every poll interval until a match or `timeout` elapses.
    ///
    /// `Ok(None)` means not found. The only error is `StoppedByUser`, seen
    /// at the start of a poll, during a query or during the wait between
    /// polls. Always returns within `timeout` plus one poll interval.
    pub async fn resolve(
        &self,
        selector: &Selector,
        timeout: Duration,
        stop: &StopHandle,
    ) -> StepResult<Option<UiElement>> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut polls = 0u32;

        loop {
            stop.check()?;
            polls += 1;

            // Every query gets at least one poll interval, even past the deadline.
            let query_deadline = deadline.max(Instant::now() + self.poll_interval);
            if let Some(el) = self.query_until(selector, query_deadline, stop).await? {
                debug!(%selector, polls, elapsed_ms = started.elapsed().as_millis() as u64, "selector resolved");
                return Ok(Some(el));
            }

            let now = Instant::now();
            if now >= deadline {
                debug!(%selector, polls, timeout_ms = timeout.as_millis() as u64, "selector not found before timeout");
                return Ok(None);
            }

            stop.sleep(self.poll_interval.min(deadline - now)).await?;
        }
    }

    /// Exactly one query against the provider, bounded by `timeout`.
    pub async fn find_once(
        &self,
        selector: &Selector,
        timeout: Duration,
        stop: &StopHandle,
    ) -> StepResult<Option<UiElement>> {
        stop.check()?;
        let deadline = Instant::now() + timeout.max(self.poll_interval);
        self.query_until(selector, deadline, stop).await
    }

    async fn query_until(
        &self,
        selector: &Selector,
        deadline: Instant,
        stop: &StopHandle,
    ) -> StepResult<Option<UiElement>> {
        match tokio::time::timeout_at(deadline, stop.race(self.find_first(selector))).await {
            Ok(found) => found,
            Err(_) => {
                trace!(%selector, "provider query exceeded its budget");
                Ok(None)
            }
        }
    }

    /// First element matching the selector on the current screen.
    ///
    /// A compound selector intersects the candidate sets of its parts in the
    /// order given, then applies the clickable filter. Provider errors count
    /// as "not found on this poll".
    async fn find_first(&self, selector: &Selector) -> Option<UiElement> {
        match selector {
            Selector::CompoundAnd { parts, clickable } => {
                let mut candidates: Option<Vec<UiElement>> = None;

                for part in parts {
                    let found = self.candidates(part).await;
                    let next = match candidates {
                        None => found,
                        Some(prev) => prev.into_iter().filter(|el| found.contains(el)).collect(),
                    };
                    if next.is_empty() {
                        return None;
                    }
                    candidates = Some(next);
                }

                candidates?
                    .into_iter()
                    .find(|el| clickable.is_none_or(|c| el.clickable == c))
            }
            atom => self.candidates(atom).await.into_iter().next(),
        }
    }

    async fn candidates(&self, atom: &Selector) -> Vec<UiElement> {
        match self.screen.find_all(atom).await {
            Ok(found) => found,
            Err(err) => {
                debug!(selector = %atom, error = %err, "element query failed; treating as not found");
                Vec::new()
            }
        }
    }
}

impl std::fmt::Debug for SelectorResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectorResolver")
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}
