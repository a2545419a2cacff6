use crate::models::{normalize_host, CustomRule, RuleEntry, RuleId, RuleScope};
use crate::overlay::UserOverlay;
use crate::rules::RuleDatabase;

/// One rule that applies to a URL, either shipped or user-authored.
#[derive(Debug, Clone, Copy)]
pub enum AppliedRule<'a> {
    Builtin(&'a RuleEntry),
    Custom(&'a CustomRule),
}

impl AppliedRule<'_> {
    pub fn id(&self) -> RuleId {
        match self {
            Self::Builtin(entry) => entry.id.clone(),
            Self::Custom(rule) => rule.id(),
        }
    }

    pub fn matches_param(&self, key: &str) -> bool {
        match self {
            Self::Builtin(entry) => entry.matches_param(key),
            Self::Custom(rule) => rule.matches_param(key),
        }
    }
}

/// Resolves the rules applicable to `host`, where `url` is the full URL the
/// host was taken from (pattern rules test against it).
///
/// Order is generic, domain entries by key, pattern entries in table order,
/// then custom rules by key. Whitelisted hosts get an empty set and rules the
/// user excepted for the host are removed.
pub fn resolve_rules<'a>(
    host: &str,
    url: &str,
    db: &'a RuleDatabase,
    overlay: &'a UserOverlay,
) -> Vec<AppliedRule<'a>> {
    let host = normalize_host(host);
    if overlay.whitelist.contains(&host) {
        return Vec::new();
    }

    let mut rules = vec![AppliedRule::Builtin(db.generic())];

    rules.extend(
        db.domains()
            .iter()
            .filter(|entry| matches!(&entry.scope, RuleScope::Domain(key) if key.matches_host(&host)))
            .map(AppliedRule::Builtin),
    );

    rules.extend(
        db.patterns()
            .iter()
            .filter(|entry| matches!(&entry.scope, RuleScope::Pattern(re) if re.is_match(url)))
            .map(AppliedRule::Builtin),
    );

    let mut custom: Vec<&CustomRule> = overlay
        .custom_rules
        .iter()
        .filter(|rule| rule.matches_host(&host))
        .collect();
    custom.sort_by(|a, b| (&a.domain, a.exact).cmp(&(&b.domain, b.exact)));
    rules.extend(custom.into_iter().map(AppliedRule::Custom));

    if !overlay.exceptions.is_empty() {
        rules.retain(|rule| !overlay.exceptions.is_excepted(&host, &rule.id()));
    }
    rules
}
