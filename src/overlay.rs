use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::OverlayError;
use crate::models::{CustomRule, DomainKey, ExceptionSet, RuleId, WhitelistSet};

/// User-owned rule overlay: custom rules, per-host exceptions and the whitelist.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserOverlay {
    #[serde(default)]
    pub custom_rules: Vec<CustomRule>,
    #[serde(default)]
    pub exceptions: ExceptionSet,
    #[serde(default)]
    pub whitelist: WhitelistSet,
}

fn parse_domain(domain: &str) -> Result<DomainKey, OverlayError> {
    DomainKey::parse(domain).map_err(|_| OverlayError::InvalidDomain(domain.to_string()))
}

fn clean_param(param: &str) -> Option<String> {
    let param = param.trim();
    (!param.is_empty()).then(|| param.to_string())
}

impl UserOverlay {
    pub fn custom_rule(&self, domain: &str) -> Option<&CustomRule> {
        let key = DomainKey::parse(domain).ok()?;
        self.custom_rules.iter().find(|r| r.key() == key)
    }

    fn custom_rule_mut(&mut self, domain: &str) -> Result<&mut CustomRule, OverlayError> {
        let key = parse_domain(domain)?;
        self.custom_rules
            .iter_mut()
            .find(|r| r.key() == key)
            .ok_or_else(|| OverlayError::UnknownDomain(domain.to_string()))
    }

    /// Adds a custom rule for `domain`. A domain that already has one gets the
    /// new params merged in, deduplicated.
    pub fn add_custom_rule<I, S>(&mut self, domain: &str, params: I) -> Result<(), OverlayError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let key = parse_domain(domain)?;
        let existing = self.custom_rules.iter().position(|r| r.key() == key);
        let idx = match existing {
            Some(idx) => {
                debug!(domain = %key, "Merging into existing custom rule");
                idx
            }
            None => {
                self.custom_rules.push(CustomRule {
                    domain: key.domain,
                    exact: key.exact,
                    params: Vec::new(),
                });
                self.custom_rules.len() - 1
            }
        };

        let rule = &mut self.custom_rules[idx];
        for param in params.into_iter().filter_map(|p| clean_param(p.as_ref())) {
            if !rule.params.contains(&param) {
                rule.params.push(param);
            }
        }
        Ok(())
    }

    pub fn add_custom_param(&mut self, domain: &str, param: &str) -> Result<(), OverlayError> {
        self.add_custom_rule(domain, [param])
    }

    pub fn remove_custom_param(&mut self, domain: &str, param: &str) -> Result<(), OverlayError> {
        let rule = self.custom_rule_mut(domain)?;
        let before = rule.params.len();
        rule.params.retain(|p| p != param);
        if rule.params.len() == before {
            return Err(OverlayError::UnknownParam {
                domain: domain.to_string(),
                param: param.to_string(),
            });
        }
        Ok(())
    }

    /// Renames one parameter in place. Renaming onto a name the rule already
    /// holds collapses the two.
    pub fn edit_custom_param(&mut self, domain: &str, old: &str, new: &str) -> Result<(), OverlayError> {
        let rule = self.custom_rule_mut(domain)?;
        let idx = rule
            .params
            .iter()
            .position(|p| p == old)
            .ok_or_else(|| OverlayError::UnknownParam {
                domain: domain.to_string(),
                param: old.to_string(),
            })?;

        match clean_param(new) {
            Some(new) if rule.params.contains(&new) => {
                rule.params.remove(idx);
            }
            Some(new) => rule.params[idx] = new,
            None => {
                rule.params.remove(idx);
            }
        }
        Ok(())
    }

    pub fn remove_custom_rule(&mut self, domain: &str) -> Result<CustomRule, OverlayError> {
        let key = parse_domain(domain)?;
        let idx = self
            .custom_rules
            .iter()
            .position(|r| r.key() == key)
            .ok_or_else(|| OverlayError::UnknownDomain(domain.to_string()))?;
        Ok(self.custom_rules.remove(idx))
    }

    pub fn add_exception(&mut self, host: &str, rule: RuleId) -> bool {
        self.exceptions.insert(host, rule)
    }

    pub fn remove_exception(&mut self, host: &str, rule: &RuleId) -> bool {
        self.exceptions.remove(host, rule)
    }

    pub fn whitelist_host(&mut self, host: &str) -> bool {
        self.whitelist.insert(host)
    }

    pub fn unwhitelist_host(&mut self, host: &str) -> bool {
        self.whitelist.remove(host)
    }
}
