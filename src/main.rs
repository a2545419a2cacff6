use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use url_purifier::{
    config::Config,
    engine::Engine,
    loader,
    logging::{self, Timer},
    settings::{MemorySettings, Settings},
    WhitelistSet,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();
    logging::init_logging(&config);

    let db = loader::load_database(config.rules_source.as_deref()).await?;

    let mut settings = Settings {
        enabled: config.enabled,
        ..Settings::default()
    };
    settings.overlay.whitelist = config.whitelist.iter().collect::<WhitelistSet>();

    let engine = Engine::new(Arc::new(db), Arc::new(MemorySettings::new(settings)))
        .with_redirect_unwrapping(config.unwrap_redirects);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut stdout = tokio::io::stdout();

    {
        let _timer = Timer::new("purify");
        if args.is_empty() {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Some(line) = lines.next_line().await? {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let outcome = engine.process(line);
                stdout.write_all(outcome.cleaned_url.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
            }
        } else {
            for arg in &args {
                let outcome = engine.process(arg);
                stdout.write_all(outcome.cleaned_url.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
            }
        }
        stdout.flush().await?;
    }

    let summary = engine.stats();
    tracing::info!(
        total_modified = summary.total_modified,
        rules = summary.rule_effectiveness.len(),
        "Done"
    );
    for rule in summary.rule_effectiveness.iter().take(10) {
        tracing::debug!(rule = %rule.key, count = rule.count, "Rule effectiveness");
    }

    Ok(())
}
