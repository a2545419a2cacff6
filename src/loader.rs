use anyhow::{Context, Result};
use tracing::info;

use crate::rules::{RuleDatabase, RuleTable};

/// Loads a rule table from an http(s) URL or a local file path.
pub async fn load_rule_table(source: &str) -> Result<RuleTable> {
    let body = if source.starts_with("http://") || source.starts_with("https://") {
        info!("Fetching rules from {}", source);
        let client = reqwest::Client::new();
        client
            .get(source)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?
    } else {
        info!("Reading rules from {}", source);
        tokio::fs::read_to_string(source)
            .await
            .with_context(|| format!("Failed to read rule table {}", source))?
    };

    RuleTable::from_json(&body).context("Failed to parse rule table JSON")
}

/// The configured rule database, or the builtin one when no source is set.
pub async fn load_database(source: Option<&str>) -> Result<RuleDatabase> {
    let table = match source {
        Some(source) => load_rule_table(source).await?,
        None => RuleTable::builtin().context("Builtin rule table is invalid")?,
    };
    Ok(RuleDatabase::from_table(table))
}
