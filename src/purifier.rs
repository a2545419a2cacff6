use percent_encoding::percent_decode_str;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::matcher::resolve_rules;
use crate::models::RuleId;
use crate::overlay::UserOverlay;
use crate::rules::RuleDatabase;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurifyOutcome {
    pub cleaned_url: String,
    pub changed: bool,
    pub fired_rules: Vec<RuleId>,
}

impl PurifyOutcome {
    pub fn unchanged(url: &str) -> Self {
        Self {
            cleaned_url: url.to_string(),
            changed: false,
            fired_rules: Vec::new(),
        }
    }
}

/// Raw slices of a URL string around its query and fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct UrlParts<'a> {
    pub base: &'a str,
    pub query: Option<&'a str>,
    pub fragment: Option<&'a str>,
}

impl<'a> UrlParts<'a> {
    pub fn split(url: &'a str) -> Self {
        let (rest, fragment) = match url.split_once('#') {
            Some((rest, frag)) => (rest, Some(frag)),
            None => (url, None),
        };
        let (base, query) = match rest.split_once('?') {
            Some((base, query)) => (base, Some(query)),
            None => (rest, None),
        };
        Self { base, query, fragment }
    }

    /// Non-empty `key[=value]` segments of the query, verbatim.
    pub fn segments(&self) -> impl Iterator<Item = &'a str> {
        self.query
            .unwrap_or("")
            .split('&')
            .filter(|segment| !segment.is_empty())
    }
}

/// Splits a raw query segment into its raw key and raw value.
pub(crate) fn split_segment(segment: &str) -> (&str, &str) {
    segment.split_once('=').unwrap_or((segment, ""))
}

/// Form-decodes a query component for comparison against rule names.
pub(crate) fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

/// Removes tracking parameters from `url`.
///
/// Surviving parameters keep their original encoding and relative order and the
/// fragment is passed through untouched. Input that does not parse as an
/// absolute URL with a host comes back unchanged.
pub fn purify(url: &str, db: &RuleDatabase, overlay: &UserOverlay) -> PurifyOutcome {
    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!(error = %e, "Leaving unparseable URL untouched");
            return PurifyOutcome::unchanged(url);
        }
    };
    let Some(host) = parsed.host_str() else {
        return PurifyOutcome::unchanged(url);
    };

    let parts = UrlParts::split(url);
    if parts.query.is_none() {
        return PurifyOutcome::unchanged(url);
    }

    // Pattern scopes see the normalized form so scheme and host case cannot dodge them.
    let rules = resolve_rules(host, parsed.as_str(), db, overlay);
    if rules.is_empty() {
        return PurifyOutcome::unchanged(url);
    }

    let mut kept: Vec<&str> = Vec::new();
    let mut fired: Vec<RuleId> = Vec::new();
    let mut removed = 0usize;

    for segment in parts.segments() {
        let key = decode_component(split_segment(segment).0);
        let mut dropped = false;
        for rule in rules.iter().filter(|r| r.matches_param(&key)) {
            dropped = true;
            let id = rule.id();
            if !fired.contains(&id) {
                fired.push(id);
            }
        }
        if dropped {
            removed += 1;
        } else {
            kept.push(segment);
        }
    }

    if removed == 0 {
        return PurifyOutcome::unchanged(url);
    }

    let mut cleaned = String::with_capacity(url.len());
    cleaned.push_str(parts.base);
    if !kept.is_empty() {
        cleaned.push('?');
        cleaned.push_str(&kept.join("&"));
    }
    if let Some(fragment) = parts.fragment {
        cleaned.push('#');
        cleaned.push_str(fragment);
    }

    debug!(host = %host, removed, rules = fired.len(), "Purified URL");

    PurifyOutcome {
        changed: cleaned != url,
        cleaned_url: cleaned,
        fired_rules: fired,
    }
}
