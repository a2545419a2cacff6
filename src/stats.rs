use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use crate::models::{RuleCount, RuleId, StatsSummary};

#[derive(Debug, Default)]
struct Counters {
    total_modified: u64,
    per_rule: BTreeMap<String, u64>,
}

/// Modification counters shared by concurrent purification calls.
///
/// Each `record` is applied under one lock so a reader never sees the total
/// and the per-rule counts out of step.
#[derive(Debug, Default)]
pub struct Stats {
    counters: Mutex<Counters>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores counters from a previously persisted summary.
    pub fn from_summary(summary: &StatsSummary) -> Self {
        let counters = Counters {
            total_modified: summary.total_modified,
            per_rule: summary
                .rule_effectiveness
                .iter()
                .map(|r| (r.key.clone(), r.count))
                .collect(),
        };
        Self {
            counters: Mutex::new(counters),
        }
    }

    /// Counts one modified URL and credits each distinct rule once.
    pub fn record(&self, fired_rules: &[RuleId]) {
        self.record_then(fired_rules, |_| ());
    }

    /// Records like [`Stats::record`] and hands the resulting snapshot to
    /// `persist` before the lock is released, so snapshots reach storage in
    /// the order they were counted.
    pub fn record_then<T>(&self, fired_rules: &[RuleId], persist: impl FnOnce(StatsSummary) -> T) -> T {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        counters.total_modified = counters.total_modified.saturating_add(1);

        let mut seen: Vec<&RuleId> = Vec::with_capacity(fired_rules.len());
        for id in fired_rules {
            if seen.contains(&id) {
                continue;
            }
            seen.push(id);
            let count = counters.per_rule.entry(id.to_string()).or_insert(0);
            *count = count.saturating_add(1);
        }
        persist(counters.summary())
    }

    pub fn reset(&self) {
        self.reset_then(|_| ());
    }

    /// Clears the counters and hands the empty snapshot to `persist` under the lock.
    pub fn reset_then<T>(&self, persist: impl FnOnce(StatsSummary) -> T) -> T {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        *counters = Counters::default();
        persist(counters.summary())
    }

    /// Snapshot with rules ordered by count, most effective first.
    pub fn read(&self) -> StatsSummary {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .summary()
    }
}

impl Counters {
    fn summary(&self) -> StatsSummary {
        let mut rule_effectiveness: Vec<RuleCount> = self
            .per_rule
            .iter()
            .map(|(key, count)| RuleCount {
                key: key.clone(),
                count: *count,
            })
            .collect();
        rule_effectiveness.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));

        StatsSummary {
            total_modified: self.total_modified,
            rule_effectiveness,
        }
    }
}
