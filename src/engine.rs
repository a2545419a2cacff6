use std::sync::Arc;

use tracing::{debug, warn};
use url::Url;

use crate::models::{normalize_host, RuleId, StatsSummary};
use crate::overlay::UserOverlay;
use crate::purifier::{purify, PurifyOutcome};
use crate::redirect::unwrap_redirect;
use crate::rules::RuleDatabase;
use crate::settings::SettingsRepository;
use crate::stats::Stats;

/// Nested redirector layers unwrapped before purifying.
pub const MAX_UNWRAP_DEPTH: usize = 3;

/// Caller-side pipeline: enabled gate, redirect unwrapping, purification and
/// best-effort accounting against a settings repository.
#[derive(Clone)]
pub struct Engine {
    db: Arc<RuleDatabase>,
    settings: Arc<dyn SettingsRepository>,
    stats: Arc<Stats>,
    unwrap_redirects: bool,
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(normalize_host)
}

fn push_unique(target: &mut Vec<RuleId>, id: RuleId) {
    if !target.contains(&id) {
        target.push(id);
    }
}

impl Engine {
    pub fn new(db: Arc<RuleDatabase>, settings: Arc<dyn SettingsRepository>) -> Self {
        let stats = Stats::from_summary(&settings.get().stats_summary);
        Self {
            db,
            settings,
            stats: Arc::new(stats),
            unwrap_redirects: true,
        }
    }

    pub fn with_redirect_unwrapping(mut self, enabled: bool) -> Self {
        self.unwrap_redirects = enabled;
        self
    }

    pub fn db(&self) -> &RuleDatabase {
        &self.db
    }

    pub fn settings(&self) -> &Arc<dyn SettingsRepository> {
        &self.settings
    }

    /// Cleans one candidate URL. Reads a fresh settings snapshot, so overlay
    /// edits made before the call are always honoured.
    pub fn process(&self, url: &str) -> PurifyOutcome {
        let snapshot = self.settings.get();
        if !snapshot.enabled {
            return PurifyOutcome::unchanged(url);
        }

        let outcome = self.clean(url, &snapshot.overlay);
        if outcome.changed {
            self.account(&outcome.fired_rules);
        }
        outcome
    }

    /// Unwraps known redirectors then purifies, without touching stats.
    pub fn clean(&self, url: &str, overlay: &UserOverlay) -> PurifyOutcome {
        let mut current = url.to_string();
        let mut fired = Vec::new();

        if self.unwrap_redirects {
            for _ in 0..MAX_UNWRAP_DEPTH {
                let Some(host) = host_of(&current) else {
                    break;
                };
                if overlay.whitelist.contains(&host) {
                    break;
                }
                let redirectors = self
                    .db
                    .redirectors()
                    .iter()
                    .filter(|r| !overlay.exceptions.is_excepted(&host, &r.id));
                match unwrap_redirect(&current, redirectors) {
                    Some((target, id)) => {
                        push_unique(&mut fired, id);
                        current = target;
                    }
                    None => break,
                }
            }
        }

        let purified = purify(&current, &self.db, overlay);
        for id in purified.fired_rules {
            push_unique(&mut fired, id);
        }

        let changed = purified.cleaned_url != url;
        if changed {
            debug!(rules = fired.len(), "URL cleaned");
        }
        PurifyOutcome {
            cleaned_url: purified.cleaned_url,
            changed,
            fired_rules: fired,
        }
    }

    fn account(&self, fired_rules: &[RuleId]) {
        let saved = self
            .stats
            .record_then(fired_rules, |summary| self.settings.save_stats(summary));
        if let Err(e) = saved {
            warn!(error = %e, "Failed to persist stats");
        }
    }

    pub fn stats(&self) -> StatsSummary {
        self.stats.read()
    }

    pub fn reset_stats(&self) {
        let saved = self.stats.reset_then(|summary| self.settings.save_stats(summary));
        if let Err(e) = saved {
            warn!(error = %e, "Failed to persist stats reset");
        }
    }
}
