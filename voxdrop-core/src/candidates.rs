//! Candidate bookkeeping: which wave paths are waiting to be delivered and
//! how patient we still are with each of them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Delivery attempts that raised after rule evaluation before giving up.
pub const MAX_RETRY: u32 = 10;
/// Flush cycles a pair may spend "not ready yet" before giving up.
pub const MAX_STAY: u32 = 20;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CandidateState {
    pub retry: u32,
    pub stay: u32,
}

/// A path that survived abandonment in [`CandidateTracker::evaluate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub state: CandidateState,
}

/// Why a candidate was dropped by the ceilings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Abandoned {
    NeverReady,
    TooManyFailures,
}

/// Owned map from normalized `.wav` path to its counters.
///
/// Only the reconciliation loop mutates it.
#[derive(Debug)]
pub struct CandidateTracker {
    entries: HashMap<PathBuf, CandidateState>,
    max_retry: u32,
    max_stay: u32,
}

impl Default for CandidateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CandidateTracker {
    pub fn new() -> Self {
        Self::with_limits(MAX_RETRY, MAX_STAY)
    }

    pub fn with_limits(max_retry: u32, max_stay: u32) -> Self {
        Self {
            entries: HashMap::new(),
            max_retry,
            max_stay,
        }
    }

    pub fn max_retry(&self) -> u32 {
        self.max_retry
    }

    /// Insert every unknown path with zero counters. Known paths keep their
    /// counters. Returns how many paths were new.
    pub fn merge<I>(&mut self, batch: I) -> usize
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut added = 0;
        for path in batch {
            self.entries.entry(path).or_insert_with(|| {
                added += 1;
                CandidateState::default()
            });
        }
        added
    }

    /// Drop candidates that hit a ceiling, logging each one, and return the
    /// rest ordered by path.
    pub fn evaluate(&mut self) -> Vec<Candidate> {
        let (max_retry, max_stay) = (self.max_retry, self.max_stay);
        self.entries.retain(|path, state| match abandonment(state, max_retry, max_stay) {
            Some(Abandoned::NeverReady) => {
                warn!(
                    path = %path.display(),
                    stays = state.stay,
                    "giving up: file pair never became ready"
                );
                false
            }
            Some(Abandoned::TooManyFailures) => {
                warn!(
                    path = %path.display(),
                    retries = state.retry,
                    "giving up: delivery failed too many times"
                );
                false
            }
            None => true,
        });

        let mut eligible: Vec<Candidate> = self
            .entries
            .iter()
            .map(|(path, state)| Candidate {
                path: path.clone(),
                state: *state,
            })
            .collect();
        eligible.sort_by(|a, b| a.path.cmp(&b.path));
        eligible
    }

    /// Count a "pair not ready yet" cycle.
    pub fn record_stay(&mut self, path: &Path) {
        if let Some(state) = self.entries.get_mut(path) {
            state.stay += 1;
            debug!(path = %path.display(), stay = state.stay, "candidate stays");
        }
    }

    /// Count a processing failure after rule evaluation.
    pub fn record_retry(&mut self, path: &Path) {
        if let Some(state) = self.entries.get_mut(path) {
            state.retry += 1;
            debug!(path = %path.display(), retry = state.retry, "candidate will be retried");
        }
    }

    pub fn remove(&mut self, path: &Path) -> bool {
        self.entries.remove(path).is_some()
    }

    pub fn get(&self, path: &Path) -> Option<CandidateState> {
        self.entries.get(path).copied()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

fn abandonment(state: &CandidateState, max_retry: u32, max_stay: u32) -> Option<Abandoned> {
    if state.stay >= max_stay {
        Some(Abandoned::NeverReady)
    } else if state.retry >= max_retry {
        Some(Abandoned::TooManyFailures)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(name: &str) -> PathBuf {
        PathBuf::from(format!("/out/{name}.wav"))
    }

    #[test]
    fn merge_is_idempotent_and_keeps_counters() {
        let mut tracker = CandidateTracker::new();
        assert_eq!(tracker.merge([p("a"), p("b")]), 2);
        tracker.record_stay(&p("a"));
        assert_eq!(tracker.merge([p("a"), p("c")]), 1);
        assert_eq!(tracker.len(), 3);
        assert_eq!(tracker.get(&p("a")).unwrap().stay, 1);
    }

    #[test]
    fn evaluate_returns_sorted_candidates() {
        let mut tracker = CandidateTracker::new();
        tracker.merge([p("c"), p("a"), p("b")]);
        let paths: Vec<_> = tracker.evaluate().into_iter().map(|c| c.path).collect();
        assert_eq!(paths, vec![p("a"), p("b"), p("c")]);
    }

    #[test]
    fn stay_ceiling_abandons() {
        let mut tracker = CandidateTracker::with_limits(10, 3);
        tracker.merge([p("a")]);
        let mut cycles = 0;
        while !tracker.evaluate().is_empty() {
            cycles += 1;
            tracker.record_stay(&p("a"));
        }
        assert_eq!(cycles, 3);
        assert!(!tracker.contains(&p("a")));
    }

    #[test]
    fn retry_ceiling_abandons_independently() {
        let mut tracker = CandidateTracker::with_limits(2, 20);
        tracker.merge([p("a"), p("b")]);
        for _ in 0..2 {
            tracker.evaluate();
            tracker.record_retry(&p("a"));
            tracker.record_stay(&p("b"));
        }
        let left: Vec<_> = tracker.evaluate().into_iter().map(|c| c.path).collect();
        assert_eq!(left, vec![p("b")]);
    }

    #[test]
    fn counters_ignore_unknown_paths() {
        let mut tracker = CandidateTracker::new();
        tracker.record_retry(&p("ghost"));
        tracker.record_stay(&p("ghost"));
        assert!(tracker.is_empty());
        assert!(!tracker.remove(&p("ghost")));
    }
}
