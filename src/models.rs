use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::RuleLoadError;

/// Upper bound on the compiled size of any rule regex.
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Stable identity of a rule, used for exceptions and stats attribution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(String);

impl RuleId {
    pub fn generic() -> Self {
        Self("*".to_string())
    }

    pub fn domain(key: &DomainKey) -> Self {
        Self(key.to_string())
    }

    pub fn pattern(source: &str) -> Self {
        Self(format!("pattern:{}", source))
    }

    pub fn custom(key: &DomainKey) -> Self {
        Self(format!("custom:{}", key))
    }

    pub fn redirect(name: &str) -> Self {
        Self(format!("redirect:{}", name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RuleId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercases a hostname and drops a trailing root dot.
pub fn normalize_host(host: &str) -> String {
    host.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Registrable-domain suffix match: `host` equals `domain` or is a subdomain of it.
pub fn host_matches(host: &str, domain: &str) -> bool {
    if host == domain {
        return true;
    }
    host.len() > domain.len()
        && host.ends_with(domain)
        && host.as_bytes()[host.len() - domain.len() - 1] == b'.'
}

/// A domain rule key. The `^` suffix of the table format becomes `exact`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DomainKey {
    pub domain: String,
    #[serde(default)]
    pub exact: bool,
}

impl DomainKey {
    pub fn parse(raw: &str) -> Result<Self, RuleLoadError> {
        let mut key = raw.trim().to_ascii_lowercase();
        if let Some(rest) = key.strip_prefix("||") {
            key = rest.to_string();
        }
        let exact = key.ends_with('^');
        if exact {
            key.pop();
        }
        let key = key.trim_end_matches('.');

        let malformed = key.is_empty()
            || key.contains(char::is_whitespace)
            || key.contains(['^', '/', '?', '#', '*', '|']);
        if malformed {
            return Err(RuleLoadError::MalformedDomain(raw.to_string()));
        }

        Ok(Self {
            domain: key.to_string(),
            exact,
        })
    }

    pub fn matches_host(&self, host: &str) -> bool {
        if self.exact {
            host == self.domain
        } else {
            host_matches(host, &self.domain)
        }
    }
}

impl fmt::Display for DomainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.exact {
            write!(f, "{}^", self.domain)
        } else {
            f.write_str(&self.domain)
        }
    }
}

pub(crate) fn compile_regex(pattern: &str, case_insensitive: bool) -> Result<Regex, RuleLoadError> {
    RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
        .map_err(|source| RuleLoadError::InvalidRegex {
            pattern: pattern.to_string(),
            source,
        })
}

#[derive(Debug, Clone)]
pub enum RuleScope {
    Generic,
    Domain(DomainKey),
    /// Tested against the full URL, not just the hostname.
    Pattern(Regex),
}

#[derive(Debug, Clone)]
pub enum ParamMatcher {
    Literal(String),
    RegexName(Regex),
}

impl ParamMatcher {
    /// Values wrapped in `/…/` (or `/…/i`) are regexes; anything else is a literal name.
    pub fn parse(raw: &str) -> Result<Self, RuleLoadError> {
        if let Some(body) = regex_body(raw, "/i") {
            return compile_regex(body, true).map(Self::RegexName);
        }
        if let Some(body) = regex_body(raw, "/") {
            return compile_regex(body, false).map(Self::RegexName);
        }
        Ok(Self::Literal(raw.to_string()))
    }

    pub fn matches(&self, key: &str) -> bool {
        match self {
            Self::Literal(name) => name == key,
            Self::RegexName(re) => re.is_match(key),
        }
    }
}

fn regex_body<'a>(raw: &'a str, suffix: &str) -> Option<&'a str> {
    raw.strip_prefix('/')
        .and_then(|rest| rest.strip_suffix(suffix))
        .filter(|body| !body.is_empty())
}

#[derive(Debug, Clone)]
pub struct RuleEntry {
    pub id: RuleId,
    pub scope: RuleScope,
    pub remove_params: Vec<ParamMatcher>,
}

impl RuleEntry {
    pub fn matches_param(&self, key: &str) -> bool {
        self.remove_params.iter().any(|m| m.matches(key))
    }
}

/// A user-authored literal parameter list for one domain.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CustomRule {
    pub domain: String,
    #[serde(default)]
    pub exact: bool,
    pub params: Vec<String>,
}

impl CustomRule {
    pub fn key(&self) -> DomainKey {
        DomainKey {
            domain: self.domain.clone(),
            exact: self.exact,
        }
    }

    pub fn id(&self) -> RuleId {
        RuleId::custom(&self.key())
    }

    pub fn matches_host(&self, host: &str) -> bool {
        if self.exact {
            host == self.domain
        } else {
            host_matches(host, &self.domain)
        }
    }

    pub fn matches_param(&self, key: &str) -> bool {
        self.params.iter().any(|p| p == key)
    }
}

/// Per-hostname set of rules the user has disabled.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct ExceptionSet {
    entries: BTreeMap<String, BTreeSet<RuleId>>,
}

impl ExceptionSet {
    pub fn insert(&mut self, host: &str, rule: RuleId) -> bool {
        self.entries.entry(normalize_host(host)).or_default().insert(rule)
    }

    pub fn remove(&mut self, host: &str, rule: &RuleId) -> bool {
        let host = normalize_host(host);
        let Some(rules) = self.entries.get_mut(&host) else {
            return false;
        };
        let removed = rules.remove(rule);
        if rules.is_empty() {
            self.entries.remove(&host);
        }
        removed
    }

    pub fn remove_host(&mut self, host: &str) -> bool {
        self.entries.remove(&normalize_host(host)).is_some()
    }

    /// True if `rule` is disabled for `host` or for any parent domain of it.
    pub fn is_excepted(&self, host: &str, rule: &RuleId) -> bool {
        self.entries
            .iter()
            .any(|(h, rules)| host_matches(host, h) && rules.contains(rule))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<RuleId>)> {
        self.entries.iter()
    }
}

/// Hostnames (and their subdomains) exempt from purification.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct WhitelistSet {
    hosts: BTreeSet<String>,
}

impl WhitelistSet {
    pub fn insert(&mut self, host: &str) -> bool {
        let host = normalize_host(host);
        !host.is_empty() && self.hosts.insert(host)
    }

    pub fn remove(&mut self, host: &str) -> bool {
        self.hosts.remove(&normalize_host(host))
    }

    pub fn contains(&self, host: &str) -> bool {
        self.hosts.iter().any(|h| host_matches(host, h))
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.hosts.iter()
    }
}

impl<S: AsRef<str>> FromIterator<S> for WhitelistSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::default();
        for host in iter {
            set.insert(host.as_ref());
        }
        set
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RuleCount {
    pub key: String,
    pub count: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub total_modified: u64,
    pub rule_effectiveness: Vec<RuleCount>,
}

impl StatsSummary {
    pub fn count_for(&self, key: &str) -> u64 {
        self.rule_effectiveness
            .iter()
            .find(|r| r.key == key)
            .map(|r| r.count)
            .unwrap_or(0)
    }
}
