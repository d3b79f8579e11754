use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use mailpulse_core::{AttributeValue, NotificationKind, TelemetryConfig};
use tracing_subscriber::EnvFilter;

mod commands;

/// CLI wrapper for NotificationKind (needed for clap ValueEnum)
#[derive(Clone, Copy, Default, ValueEnum)]
enum CliKind {
    Success,
    Error,
    Warning,
    #[default]
    Info,
}

impl From<CliKind> for NotificationKind {
    fn from(cli: CliKind) -> Self {
        match cli {
            CliKind::Success => NotificationKind::Success,
            CliKind::Error => NotificationKind::Error,
            CliKind::Warning => NotificationKind::Warning,
            CliKind::Info => NotificationKind::Info,
        }
    }
}

#[derive(Parser)]
#[command(name = "mailpulse")]
#[command(about = "Emit dashboard telemetry, retry stranded batches and try out notifications")]
struct Cli {
    /// Ingestion endpoint (overrides MAILPULSE_INGEST_URL)
    #[arg(long, global = true)]
    ingest_url: Option<String>,

    /// Directory holding persisted state (overrides MAILPULSE_STORAGE_DIR)
    #[arg(long, global = true)]
    storage_dir: Option<PathBuf>,

    /// Events per batch before an immediate flush
    #[arg(long, global = true)]
    flush_threshold: Option<usize>,

    /// Delay between the first queued event and the timed flush
    #[arg(long, global = true)]
    flush_delay_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record events and flush them before exiting
    Emit {
        /// Event name, e.g. "page_view"
        name: String,

        /// Attribute as key=value; repeatable
        #[arg(short = 'a', long = "attr", value_parser = parse_attribute)]
        attrs: Vec<(String, AttributeValue)>,

        /// How many copies of the event to record
        #[arg(short, long, default_value_t = 1)]
        count: usize,
    },

    /// Re-send events stranded by earlier failed deliveries
    Retry,

    /// List events waiting in the failure store
    Pending,

    /// Show a notification and follow it until it goes away
    Toast {
        message: String,

        #[arg(short, long, default_value = "info")]
        kind: CliKind,

        /// Auto-dismiss delay; 0 shows it once and dismisses it right away
        #[arg(short, long, default_value_t = 3000)]
        duration_ms: u64,
    },
}

fn parse_attribute(raw: &str) -> Result<(String, AttributeValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {raw:?}"))?;
    if key.trim().is_empty() {
        return Err(format!("empty attribute key in {raw:?}"));
    }
    let value = match value.parse() {
        Ok(value) => value,
        Err(never) => match never {},
    };
    Ok((key.trim().to_string(), value))
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("mailpulse=info,mailpulse_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<TelemetryConfig> {
    let mut cfg = TelemetryConfig::from_env()?;
    if let Some(url) = &cli.ingest_url {
        cfg.ingest_url = url.clone();
    }
    if let Some(dir) = &cli.storage_dir {
        cfg.storage_dir = dir.clone();
    }
    if let Some(threshold) = cli.flush_threshold {
        cfg.flush_threshold = threshold;
    }
    if let Some(delay) = cli.flush_delay_ms {
        cfg.flush_delay = Duration::from_millis(delay);
    }
    cfg.validate()?;
    Ok(cfg)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let cfg = load_config(&cli)?;

    match cli.command {
        Command::Emit { name, attrs, count } => commands::emit(cfg, &name, attrs, count).await,
        Command::Retry => commands::retry(cfg).await,
        Command::Pending => commands::pending(cfg).await,
        Command::Toast {
            message,
            kind,
            duration_ms,
        } => commands::toast(&message, kind.into(), Duration::from_millis(duration_ms)).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_flags_are_typed() {
        assert_eq!(
            parse_attribute("count=3"),
            Ok(("count".to_string(), AttributeValue::Integer(3)))
        );
        assert_eq!(
            parse_attribute("path=/campaigns?tab=sent"),
            Ok((
                "path".to_string(),
                AttributeValue::Text("/campaigns?tab=sent".to_string())
            ))
        );
        assert!(parse_attribute("no-equals").is_err());
        assert!(parse_attribute("=value").is_err());
    }

    #[test]
    fn flags_override_config() {
        let cli = Cli::parse_from([
            "mailpulse",
            "--flush-threshold",
            "3",
            "--ingest-url",
            "http://127.0.0.1:8080/events",
            "retry",
        ]);
        let cfg = load_config(&cli).unwrap();
        assert_eq!(cfg.flush_threshold, 3);
        assert_eq!(cfg.ingest_url, "http://127.0.0.1:8080/events");
    }
}
