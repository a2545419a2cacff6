pub mod bulk;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod models;
pub mod overlay;
pub mod purifier;
pub mod redirect;
pub mod rules;
pub mod settings;
pub mod stats;

#[cfg(feature = "cli")]
pub mod config;
#[cfg(feature = "cli")]
pub mod loader;
#[cfg(feature = "cli")]
pub mod logging;

pub use engine::Engine;
pub use error::{OverlayError, RuleLoadError, SettingsError};
pub use matcher::{resolve_rules, AppliedRule};
pub use models::{
    CustomRule, DomainKey, ExceptionSet, ParamMatcher, RuleCount, RuleEntry, RuleId, RuleScope,
    StatsSummary, WhitelistSet,
};
pub use overlay::UserOverlay;
pub use purifier::{purify, PurifyOutcome};
pub use redirect::{resolve_redirect, unwrap_redirect, Redirector};
pub use rules::{RuleDatabase, RuleTable};
pub use stats::Stats;
