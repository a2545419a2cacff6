use std::sync::{Arc, RwLock, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SettingsError;
use crate::models::StatsSummary;
use crate::overlay::UserOverlay;

fn default_true() -> bool {
    true
}

/// Everything the user owns: the kill switch, the rule overlay and the
/// persisted stats.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub overlay: UserOverlay,
    #[serde(default)]
    pub stats_summary: StatsSummary,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            overlay: UserOverlay::default(),
            stats_summary: StatsSummary::default(),
        }
    }
}

pub type ChangeCallback = Box<dyn Fn(&Settings) + Send + Sync>;

/// Storage the purification pipeline reads its user state from.
///
/// `get` returns an immutable snapshot; a purification call holds one snapshot
/// for its whole duration so a concurrent `set` is never observed half-applied.
pub trait SettingsRepository: Send + Sync {
    fn get(&self) -> Arc<Settings>;

    /// Stores the user-owned fields. The stored `stats_summary` is left as it
    /// is; counters only move through [`SettingsRepository::save_stats`].
    fn set(&self, settings: Settings) -> Result<(), SettingsError>;

    fn subscribe(&self, on_change: ChangeCallback);

    /// Persists accounting counters without touching the rest of the settings.
    fn save_stats(&self, summary: StatsSummary) -> Result<(), SettingsError>;
}

/// In-process repository with change notification.
#[derive(Default)]
pub struct MemorySettings {
    current: RwLock<Arc<Settings>>,
    subscribers: RwLock<Vec<ChangeCallback>>,
}

impl MemorySettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            current: RwLock::new(Arc::new(settings)),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Applies `f` to a copy of the current settings and stores the result.
    pub fn update<F>(&self, f: F) -> Result<(), SettingsError>
    where
        F: FnOnce(&mut Settings) -> Result<(), SettingsError>,
    {
        let mut next = (*self.get()).clone();
        f(&mut next)?;
        self.set(next)
    }

    fn notify(&self, settings: &Settings) {
        let subscribers = self.subscribers.read().unwrap_or_else(PoisonError::into_inner);
        for callback in subscribers.iter() {
            callback(settings);
        }
    }
}

impl SettingsRepository for MemorySettings {
    fn get(&self) -> Arc<Settings> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn set(&self, mut settings: Settings) -> Result<(), SettingsError> {
        let snapshot = {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            settings.stats_summary = current.stats_summary.clone();
            *current = Arc::new(settings);
            Arc::clone(&current)
        };
        debug!("Settings updated");
        self.notify(&snapshot);
        Ok(())
    }

    fn subscribe(&self, on_change: ChangeCallback) {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(on_change);
    }

    fn save_stats(&self, summary: StatsSummary) -> Result<(), SettingsError> {
        let snapshot = {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            let mut next = (**current).clone();
            next.stats_summary = summary;
            *current = Arc::new(next);
            Arc::clone(&current)
        };
        self.notify(&snapshot);
        Ok(())
    }
}
