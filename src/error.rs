use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleLoadError {
    #[error("invalid regex `{pattern}`: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("malformed domain key `{0}`")]
    MalformedDomain(String),

    #[error("pattern rule has neither regexPattern nor regexFilter")]
    EmptyPattern,

    #[error("rule table is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OverlayError {
    #[error("no custom rule for domain `{0}`")]
    UnknownDomain(String),

    #[error("custom rule for `{domain}` has no parameter `{param}`")]
    UnknownParam { domain: String, param: String },

    #[error("invalid domain `{0}`")]
    InvalidDomain(String),
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings storage unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Overlay(#[from] OverlayError),
}
