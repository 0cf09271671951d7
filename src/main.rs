use std::path::PathBuf;

use chrono::{DateTime, TimeZone, Utc};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use submission_limiter::client::ClientId;
use submission_limiter::config::{AppConfig, LoggingConfig};
use submission_limiter::ratelimit::RateLimiter;
use submission_limiter::store::MemoryStore;

/// Evaluate form submissions read from stdin against the rate limiter.
///
/// Each input line is `<client-address|-> [unix-seconds]`. One JSON decision
/// is written to stdout per line.
#[derive(Debug, Parser)]
#[command(name = "submission-limiter", version, about)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level or filter directive, overrides the configuration
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())?;

    let mut logging = config.logging.clone();
    if let Some(level) = cli.log_level.clone() {
        logging.level = level;
    }
    logging.json |= cli.json_logs;
    init_tracing(&logging);

    info!("Starting submission limiter");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        burst_limit = config.limiter.burst_limit,
        window_secs = config.limiter.window_secs,
        max_total = config.limiter.max_total,
        "Configuration loaded"
    );

    let limiter = RateLimiter::new(config.limiter, MemoryStore::new())?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((client, now)) = parse_event(line) else {
            warn!(line = %line, "Skipping malformed event");
            continue;
        };

        let decision = limiter.evaluate(client.as_ref().map(ClientId::as_str), now).await?;
        debug!(client = ?client, admitted = decision.admitted, "Evaluated submission");

        let output = serde_json::json!({
            "client": client.as_ref().map(ClientId::as_str),
            "time": now.timestamp(),
            "decision": decision,
        });
        stdout.write_all(format!("{}\n", output).as_bytes()).await?;
    }

    stdout.flush().await?;
    info!("Input exhausted, shutting down");
    Ok(())
}

/// Parse `<client> [unix-seconds]` into an optional client and a time.
///
/// Addresses that fail validation are treated as an unknown client.
fn parse_event(line: &str) -> Option<(Option<ClientId>, DateTime<Utc>)> {
    let mut parts = line.split_whitespace();
    let client = parts.next()?;

    let now = match parts.next() {
        Some(secs) => Utc.timestamp_opt(secs.parse().ok()?, 0).single()?,
        None => Utc::now(),
    };

    if parts.next().is_some() {
        return None;
    }

    let client = if client == "-" {
        None
    } else {
        ClientId::parse(client)
    };

    Some((client, now))
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event_with_time() {
        let (client, now) = parse_event("10.0.0.1 70").unwrap();
        assert_eq!(client.unwrap().as_str(), "10.0.0.1");
        assert_eq!(now.timestamp(), 70);
    }

    #[test]
    fn test_parse_event_unknown_client() {
        let (client, _) = parse_event("- 5").unwrap();
        assert!(client.is_none());

        let (client, _) = parse_event("not-an-address 5").unwrap();
        assert!(client.is_none());
    }

    #[test]
    fn test_parse_event_rejects_bad_lines() {
        assert!(parse_event("10.0.0.1 soon").is_none());
        assert!(parse_event("10.0.0.1 5 extra").is_none());
    }
}
