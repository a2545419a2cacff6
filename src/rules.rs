use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::RuleLoadError;
use crate::models::{compile_regex, DomainKey, ParamMatcher, RuleEntry, RuleId, RuleScope};
use crate::redirect::Redirector;

const BUILTIN_RULES: &str = include_str!("../data/rules.json");

/// Domain key that selects the Generic scope in the table format.
pub const GENERIC_DOMAIN: &str = "*";

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RawDomainRule {
    pub domain: String,
    #[serde(default)]
    pub remove_params: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawPatternRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex_pattern: Option<String>,
    /// Legacy spelling of `regexPattern`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex_filter: Option<String>,
    #[serde(default)]
    pub remove_params: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawRedirector {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex_filter: Option<String>,
    #[serde(default)]
    pub params: Vec<String>,
}

fn pattern_source(pattern: &Option<String>, filter: &Option<String>) -> Result<String, RuleLoadError> {
    pattern
        .as_deref()
        .or(filter.as_deref())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or(RuleLoadError::EmptyPattern)
}

/// The external rule-table document.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct RuleTable {
    #[serde(default)]
    pub rules: Vec<RawDomainRule>,
    #[serde(default)]
    pub pattern_rules: Vec<RawPatternRule>,
    #[serde(default)]
    pub redirectors: Vec<RawRedirector>,
}

impl RuleTable {
    pub fn from_json(json: &str) -> Result<Self, RuleLoadError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn builtin() -> Result<Self, RuleLoadError> {
        Self::from_json(BUILTIN_RULES)
    }
}

/// Immutable, compiled rule set shared by every purification call.
#[derive(Debug, Clone)]
pub struct RuleDatabase {
    generic: RuleEntry,
    domains: Vec<RuleEntry>,
    patterns: Vec<RuleEntry>,
    redirectors: Vec<Redirector>,
}

fn push_unique(target: &mut Vec<String>, params: Vec<String>) {
    for p in params {
        if !target.contains(&p) {
            target.push(p);
        }
    }
}

fn compile_matchers(owner: &RuleId, params: &[String]) -> Vec<ParamMatcher> {
    params
        .iter()
        .filter_map(|raw| match ParamMatcher::parse(raw) {
            Ok(m) => Some(m),
            Err(e) => {
                warn!(rule = %owner, param = %raw, error = %e, "Skipping parameter matcher");
                None
            }
        })
        .collect()
}

impl RuleDatabase {
    pub fn empty() -> Self {
        Self::from_table(RuleTable::default())
    }

    pub fn builtin() -> Result<Self, RuleLoadError> {
        Ok(Self::from_table(RuleTable::builtin()?))
    }

    pub fn from_json(json: &str) -> Result<Self, RuleLoadError> {
        Ok(Self::from_table(RuleTable::from_json(json)?))
    }

    /// Classifies and compiles a raw table. Entries that cannot be compiled are
    /// skipped with a warning; duplicate scopes are merged.
    pub fn from_table(table: RuleTable) -> Self {
        let mut generic_params = Vec::new();
        let mut domain_params: BTreeMap<DomainKey, Vec<String>> = BTreeMap::new();

        for raw in table.rules {
            if raw.domain.trim() == GENERIC_DOMAIN {
                push_unique(&mut generic_params, raw.remove_params);
                continue;
            }
            match DomainKey::parse(&raw.domain) {
                Ok(key) => push_unique(domain_params.entry(key).or_default(), raw.remove_params),
                Err(e) => warn!(error = %e, "Skipping domain rule"),
            }
        }

        let generic_id = RuleId::generic();
        let generic = RuleEntry {
            remove_params: compile_matchers(&generic_id, &generic_params),
            id: generic_id,
            scope: RuleScope::Generic,
        };

        let domains: Vec<RuleEntry> = domain_params
            .into_iter()
            .map(|(key, params)| {
                let id = RuleId::domain(&key);
                RuleEntry {
                    remove_params: compile_matchers(&id, &params),
                    id,
                    scope: RuleScope::Domain(key),
                }
            })
            .collect();

        let mut pattern_params: Vec<(String, Vec<String>)> = Vec::new();
        for raw in table.pattern_rules {
            let source = match pattern_source(&raw.regex_pattern, &raw.regex_filter) {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, "Skipping pattern rule");
                    continue;
                }
            };
            match pattern_params.iter_mut().find(|(s, _)| *s == source) {
                Some((_, params)) => push_unique(params, raw.remove_params),
                None => {
                    let mut params = Vec::new();
                    push_unique(&mut params, raw.remove_params);
                    pattern_params.push((source, params));
                }
            }
        }

        let patterns: Vec<RuleEntry> = pattern_params
            .into_iter()
            .filter_map(|(source, params)| match compile_regex(&source, false) {
                Ok(re) => {
                    let id = RuleId::pattern(&source);
                    Some(RuleEntry {
                        remove_params: compile_matchers(&id, &params),
                        id,
                        scope: RuleScope::Pattern(re),
                    })
                }
                Err(e) => {
                    warn!(error = %e, "Skipping pattern rule");
                    None
                }
            })
            .collect();

        let redirectors: Vec<Redirector> = table
            .redirectors
            .into_iter()
            .filter_map(|raw| {
                let compiled = pattern_source(&raw.regex_pattern, &raw.regex_filter)
                    .and_then(|source| compile_regex(&source, false));
                match compiled {
                    Ok(pattern) if !raw.params.is_empty() => {
                        Some(Redirector::new(&raw.name, pattern, raw.params))
                    }
                    Ok(_) => {
                        warn!(redirector = %raw.name, "Skipping redirector without params");
                        None
                    }
                    Err(e) => {
                        warn!(redirector = %raw.name, error = %e, "Skipping redirector");
                        None
                    }
                }
            })
            .collect();

        info!(
            generic_params = generic.remove_params.len(),
            domains = domains.len(),
            patterns = patterns.len(),
            redirectors = redirectors.len(),
            "Loaded rule database"
        );

        Self {
            generic,
            domains,
            patterns,
            redirectors,
        }
    }

    pub fn generic(&self) -> &RuleEntry {
        &self.generic
    }

    /// Domain entries, ordered by key.
    pub fn domains(&self) -> &[RuleEntry] {
        &self.domains
    }

    pub fn patterns(&self) -> &[RuleEntry] {
        &self.patterns
    }

    pub fn redirectors(&self) -> &[Redirector] {
        &self.redirectors
    }

    pub fn find(&self, id: &RuleId) -> Option<&RuleEntry> {
        std::iter::once(&self.generic)
            .chain(&self.domains)
            .chain(&self.patterns)
            .find(|e| &e.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params_of(entry: &RuleEntry) -> Vec<String> {
        entry
            .remove_params
            .iter()
            .map(|m| match m {
                ParamMatcher::Literal(s) => s.clone(),
                ParamMatcher::RegexName(re) => format!("/{}/", re.as_str()),
            })
            .collect()
    }

    #[test]
    fn test_duplicate_domains_are_merged() {
        let db = RuleDatabase::from_json(
            r#"{"rules": [
                {"domain": "foo.com", "removeParams": ["a", "b"]},
                {"domain": "FOO.com", "removeParams": ["b", "c"]},
                {"domain": "*", "removeParams": ["utm_source"]},
                {"domain": "*", "removeParams": ["fbclid"]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(db.domains().len(), 1);
        assert_eq!(params_of(&db.domains()[0]), vec!["a", "b", "c"]);
        assert_eq!(params_of(db.generic()), vec!["utm_source", "fbclid"]);
    }

    #[test]
    fn test_exact_and_subtree_keys_stay_distinct() {
        let db = RuleDatabase::from_json(
            r#"{"rules": [
                {"domain": "x.com^", "removeParams": ["s"]},
                {"domain": "x.com", "removeParams": ["t"]}
            ]}"#,
        )
        .unwrap();
        let ids: Vec<&str> = db.domains().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["x.com", "x.com^"]);
    }

    #[test]
    fn test_regex_filter_alias() {
        let db = RuleDatabase::from_json(
            r#"{"patternRules": [
                {"regexFilter": "^https?://(?:[a-z0-9-]+\\.)*?amazon(?:\\.[a-z]{2,}){1,}", "removeParams": ["tag"]},
                {"regexPattern": "^https?://(?:[a-z0-9-]+\\.)*?amazon(?:\\.[a-z]{2,}){1,}", "removeParams": ["ref_"]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(db.patterns().len(), 1);
        assert_eq!(params_of(&db.patterns()[0]), vec!["tag", "ref_"]);
    }

    #[test]
    fn test_invalid_entries_are_skipped() {
        let db = RuleDatabase::from_json(
            r#"{
                "rules": [
                    {"domain": "bad domain.com", "removeParams": ["x"]},
                    {"domain": "ok.com", "removeParams": ["/([/", "keep_me"]}
                ],
                "patternRules": [
                    {"regexPattern": "(unclosed", "removeParams": ["x"]},
                    {"removeParams": ["y"]}
                ],
                "redirectors": [
                    {"name": "broken", "regexPattern": "[", "params": ["u"]},
                    {"name": "paramless", "regexPattern": "^https://r\\.example/"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(db.domains().len(), 1);
        assert_eq!(params_of(&db.domains()[0]), vec!["keep_me"]);
        assert!(db.patterns().is_empty());
        assert!(db.redirectors().is_empty());
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(matches!(
            RuleDatabase::from_json("{not json"),
            Err(RuleLoadError::Json(_))
        ));
    }

    #[test]
    fn test_builtin_table_loads() {
        let db = RuleDatabase::builtin().unwrap();
        assert!(db.generic().matches_param("fbclid"));
        assert!(db.generic().matches_param("utm_source"));
        let ebay = db.find(&RuleId::from("ebay.com")).unwrap();
        assert!(ebay.matches_param("mkcid"));
        assert!(ebay.matches_param("mkevt"));
        assert!(!db.patterns().is_empty());
        assert!(!db.redirectors().is_empty());
    }
}
