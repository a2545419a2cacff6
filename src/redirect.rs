//! Unwrapping of click-redirector URLs.
//!
//! A wrapper URL carries its real destination inside a query parameter,
//! often percent-encoded several times or base64-encoded. Everything here is
//! conservative: a destination is only ever unwrapped or truncated from what
//! the input already contains, never invented.

use std::borrow::Cow;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use percent_encoding::percent_decode_str;
use regex::Regex;
use tracing::debug;
use url::Url;

use crate::models::RuleId;
use crate::purifier::{decode_component, split_segment, UrlParts};

/// Bound on percent-decoding passes over adversarial input.
pub const MAX_DECODE_PASSES: usize = 3;

/// Base64 forms of `http:` and `https:`.
const BASE64_HTTP_PREFIXES: [&str; 2] = ["aHR0cDo", "aHR0cHM"];

/// Query keys that commonly carry a destination in wrappers without a table entry.
const DESTINATION_KEYS: [&str; 12] = [
    "url", "u", "q", "target", "dest", "destination", "redirect", "redirect_url", "to", "link",
    "uddg", "goto",
];

/// A known redirector shape: a full-URL pattern plus the query parameters
/// that carry the destination, in priority order.
#[derive(Debug, Clone)]
pub struct Redirector {
    pub name: String,
    pub id: RuleId,
    pattern: Regex,
    params: Vec<String>,
}

impl Redirector {
    pub fn new(name: &str, pattern: Regex, params: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            id: RuleId::redirect(name),
            pattern,
            params,
        }
    }

    pub fn matches(&self, url: &str) -> bool {
        self.pattern.is_match(url)
    }

    /// The still-encoded value of the first destination parameter present in `url`.
    pub fn raw_destination<'a>(&self, url: &'a str) -> Option<&'a str> {
        let parts = UrlParts::split(url);
        self.params.iter().find_map(|param| {
            parts.segments().find_map(|segment| {
                let (key, value) = split_segment(segment);
                (!value.is_empty() && decode_component(key) == *param).then_some(value)
            })
        })
    }
}

/// Unwraps `url` with the first matching redirector whose destination resolves.
/// Redirector patterns are tested against the normalized URL. Returns the destination and the id of the redirector that produced it.
pub fn unwrap_redirect<'a, I>(url: &str, redirectors: I) -> Option<(String, RuleId)>
where
    I: IntoIterator<Item = &'a Redirector>,
{
    let normalized = Url::parse(url).map(String::from).ok()?;
    redirectors
        .into_iter()
        .filter(|r| r.matches(&normalized))
        .find_map(|r| {
            let raw = r.raw_destination(url)?;
            let target = resolve_target(raw)?;
            (target != url).then(|| {
                debug!(redirector = %r.name, "Unwrapped redirect");
                (target, r.id.clone())
            })
        })
}

/// Extracts and validates the real destination of a wrapper URL, or validates
/// an already extracted (possibly encoded) destination.
///
/// Returns `None` only when no stage yields a valid http(s) URL.
pub fn resolve_redirect(candidate: &str) -> Option<String> {
    let candidate = candidate.trim();
    embedded_destination(candidate).or_else(|| resolve_target(candidate))
}

fn embedded_destination(candidate: &str) -> Option<String> {
    if Url::parse(candidate).is_err() {
        return None;
    }
    let parts = UrlParts::split(candidate);
    let mut values: Vec<(usize, &str)> = parts
        .segments()
        .filter_map(|segment| {
            let (key, value) = split_segment(segment);
            let key = decode_component(key).to_ascii_lowercase();
            let rank = DESTINATION_KEYS.iter().position(|k| *k == key)?;
            (!value.is_empty()).then_some((rank, value))
        })
        .collect();
    values.sort_by_key(|(rank, _)| *rank);

    values.into_iter().find_map(|(_, value)| {
        let decoded = percent_decode_passes(value);
        let looks_like_destination = has_http_scheme(&decoded)
            || BASE64_HTTP_PREFIXES.iter().any(|p| decoded.starts_with(*p));
        if looks_like_destination {
            resolve_target(value)
        } else {
            None
        }
    })
}

/// Decode, validate and fall back over a single embedded destination value.
pub fn resolve_target(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let decoded = percent_decode_passes(raw);

    if looks_like_base64(&decoded) {
        if let Some(text) = decode_base64(&decoded) {
            if let Some(valid) = validate_destination(&text) {
                return Some(valid);
            }
        }
    }

    validate_destination(&decoded)
        .or_else(|| validate_destination(raw))
        .or_else(|| {
            [decoded.as_str(), raw]
                .into_iter()
                .filter_map(|s| s.split_once('&').map(|(head, _)| head))
                .find_map(validate_destination)
        })
}

fn has_http_scheme(s: &str) -> bool {
    let head = s.trim_start().as_bytes();
    ["http://", "https://"]
        .iter()
        .any(|scheme| head.len() >= scheme.len() && head[..scheme.len()].eq_ignore_ascii_case(scheme.as_bytes()))
}

/// Percent-decodes repeatedly while the input still contains `%` and decoding
/// changes it, up to [`MAX_DECODE_PASSES`]. Decoding stops as soon as the value
/// reads as an http(s) URL, so the destination's own query encoding survives.
/// A pass that does not yield UTF-8 stops the loop and the last good value is kept.
pub fn percent_decode_passes(input: &str) -> String {
    let mut current = input.to_string();
    for _ in 0..MAX_DECODE_PASSES {
        if !current.contains('%') || has_http_scheme(&current) {
            break;
        }
        let next = match percent_decode_str(&current).decode_utf8() {
            Ok(Cow::Borrowed(_)) => break,
            Ok(Cow::Owned(next)) => next,
            Err(_) => {
                debug!("Stopping percent-decoding on invalid UTF-8");
                break;
            }
        };
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn looks_like_base64(s: &str) -> bool {
    if s.is_empty() || s.len() % 4 != 0 {
        return false;
    }
    let body = s.trim_end_matches('=');
    s.len() - body.len() <= 2
        && body
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/')
}

fn decode_base64(s: &str) -> Option<String> {
    let bytes = STANDARD.decode(s).ok()?;
    String::from_utf8(bytes).ok()
}

fn is_plausible_host(host: &str) -> bool {
    !host.is_empty()
        && host
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'[' | b']' | b':'))
}

fn is_http_url(s: &str) -> bool {
    match Url::parse(s) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https") && url.host_str().is_some_and(is_plausible_host)
        }
        Err(_) => false,
    }
}

/// A destination is valid if it parses as an http(s) URL with a plausible host.
/// Scheme-less values with a dot and no whitespace are retried with `https://`
/// in front.
pub fn validate_destination(candidate: &str) -> Option<String> {
    let candidate = candidate.trim();
    if candidate.is_empty() || candidate.chars().any(char::is_control) {
        return None;
    }

    if has_http_scheme(candidate) {
        return is_http_url(candidate).then(|| candidate.to_string());
    }
    if candidate.contains(char::is_whitespace) || candidate.contains("://") || !candidate.contains('.') {
        return None;
    }

    let prefixed = format!("https://{}", candidate);
    is_http_url(&prefixed).then_some(prefixed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn google() -> Redirector {
        Redirector::new(
            "google",
            Regex::new(r"^https?://(?:www\.)?google\.[a-z.]+/url\?").unwrap(),
            vec!["q".to_string(), "url".to_string()],
        )
    }

    #[test]
    fn test_google_wrapper() {
        assert_eq!(
            resolve_redirect("https://www.google.com/url?q=https%3A%2F%2Fexample.com%2Fpage&sa=D").as_deref(),
            Some("https://example.com/page")
        );
    }

    #[test]
    fn test_base64_blob() {
        assert_eq!(
            resolve_redirect("aHR0cHM6Ly9leGFtcGxlLmNvbQ==").as_deref(),
            Some("https://example.com")
        );
    }

    #[test]
    fn test_garbage_is_none() {
        for garbage in ["%%%garbage%%%", "not a url at all", "", "%E0%A4%A", "javascript:alert(1)", "aGVsbG8="] {
            assert_eq!(resolve_redirect(garbage), None, "{garbage:?}");
        }
    }

    #[test]
    fn test_multiply_encoded() {
        let triple = "https%25253A%25252F%25252Fexample.com%25252Fa";
        assert_eq!(resolve_target(triple).as_deref(), Some("https://example.com/a"));
    }

    #[test]
    fn test_decode_passes_are_capped() {
        let quadruple = "%2525252F";
        assert_eq!(percent_decode_passes(quadruple), "%2F");
    }

    #[test]
    fn test_decoding_stops_at_destination() {
        let once = "https%3A%2F%2Fexample.com%2F%3Fq%3Da%2526b";
        assert_eq!(percent_decode_passes(once), "https://example.com/?q=a%26b");
    }

    #[test]
    fn test_invalid_utf8_keeps_last_good_value() {
        assert_eq!(percent_decode_passes("%25C3%2528"), "%C3%28");
    }

    #[test]
    fn test_base64_in_wrapper_param() {
        let url = "https://click.example.net/r?u=aHR0cHM6Ly9leGFtcGxlLmNvbS94&x=1";
        assert_eq!(resolve_redirect(url).as_deref(), Some("https://example.com/x"));
    }

    #[test]
    fn test_schemeless_destination() {
        assert_eq!(resolve_target("example.com/path").as_deref(), Some("https://example.com/path"));
        assert_eq!(resolve_target("no-dot-here"), None);
    }

    #[test]
    fn test_falls_back_to_undecoded_candidate() {
        assert_eq!(
            resolve_target("example.com/%2520x").as_deref(),
            Some("https://example.com/%2520x")
        );
    }

    #[test]
    fn test_space_inside_http_destination() {
        assert_eq!(
            validate_destination("https://example.com/a b").as_deref(),
            Some("https://example.com/a b")
        );
        assert_eq!(
            resolve_target("https%3A%2F%2Fexample.com%2Fa%20b").as_deref(),
            Some("https://example.com/a b")
        );
        assert_eq!(validate_destination("example.com/a b"), None);
    }

    #[test]
    fn test_truncates_trailing_tracking() {
        assert_eq!(
            resolve_target("https%3A%2F%2Fexample.com&utm_source=x").as_deref(),
            Some("https://example.com")
        );
    }

    #[test]
    fn test_plain_url_resolves_to_itself() {
        assert_eq!(
            resolve_redirect("https://example.com/a?b=1").as_deref(),
            Some("https://example.com/a?b=1")
        );
    }

    #[test]
    fn test_unwrap_with_redirector() {
        let redirectors = vec![google()];
        let (target, id) = unwrap_redirect(
            "https://www.google.com/url?sa=t&url=https%3A%2F%2Fexample.com%2F&ved=0",
            &redirectors,
        )
        .unwrap();
        assert_eq!(target, "https://example.com/");
        assert_eq!(id, RuleId::redirect("google"));

        assert!(unwrap_redirect("https://www.google.com/search?q=rust", &redirectors).is_none());
        assert!(unwrap_redirect("https://www.google.com/url?q=hello%20world", &redirectors).is_none());
    }

    #[test]
    fn test_unwrap_uppercase_wrapper() {
        let redirectors = vec![google()];
        let (target, _) = unwrap_redirect(
            "HTTPS://WWW.GOOGLE.COM/url?q=https%3A%2F%2Fexample.com%2F",
            &redirectors,
        )
        .unwrap();
        assert_eq!(target, "https://example.com/");
    }

    #[test]
    fn test_param_priority_follows_redirector() {
        let r = google();
        let url = "https://google.com/url?url=https%3A%2F%2Fb.example&q=https%3A%2F%2Fa.example";
        assert_eq!(r.raw_destination(url), Some("https%3A%2F%2Fa.example"));
    }
}
