use std::env;
use dotenvy::dotenv;

#[derive(Clone, Debug)]
pub struct Config {
    pub app_env: String,
    pub rules_source: Option<String>,
    pub whitelist: Vec<String>,
    pub enabled: bool,
    pub unwrap_redirects: bool,
}

fn flag(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(v) => !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "off" | "no"),
        Err(_) => default,
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let rules_source = env::var("PURIFIER_RULES_SOURCE")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let whitelist = env::var("PURIFIER_WHITELIST")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            app_env,
            rules_source,
            whitelist,
            enabled: flag("PURIFIER_ENABLED", true),
            unwrap_redirects: flag("PURIFIER_UNWRAP_REDIRECTS", true),
        }
    }

    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }
}
