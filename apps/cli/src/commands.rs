use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::Result;
use console::style;
use mailpulse_core::{
    AttributeValue, Attributes, EventBatcherBuilder, FailureStore, FileStore, FlushOutcome,
    NotificationCenter, NotificationChange, NotificationKind, RetryOutcome, TelemetryConfig,
};

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.0}m {:.0}s", secs / 60.0, secs % 60.0)
    }
}

fn print_retry(outcome: RetryOutcome) {
    match outcome {
        RetryOutcome::NothingToRetry => {}
        RetryOutcome::Delivered(n) => println!(
            "{} Delivered {} stranded event(s)",
            style("✓").green().bold(),
            n
        ),
        RetryOutcome::Restored(n) => println!(
            "{} Retry failed, {} event(s) kept for next time",
            style("!").yellow().bold(),
            n
        ),
        RetryOutcome::Lost(n) => println!(
            "{} Retry failed and {} event(s) could not be stored",
            style("✗").red().bold(),
            n
        ),
        RetryOutcome::Unreadable => println!(
            "{} Failure store is unreadable, left untouched",
            style("✗").red().bold()
        ),
    }
}

pub async fn emit(
    cfg: TelemetryConfig,
    name: &str,
    attrs: Vec<(String, AttributeValue)>,
    count: usize,
) -> Result<()> {
    let started = Instant::now();
    let batcher = EventBatcherBuilder::new(cfg).build()?;

    print_retry(batcher.retry_failed_events().await);

    let attributes: Attributes = attrs.into_iter().collect();
    for _ in 0..count {
        batcher.record(name, attributes.clone());
    }

    let outcome = batcher.shutdown().await;
    let metrics = batcher.metrics();
    let elapsed = style(format!("[{}]", format_duration(started.elapsed()))).dim();

    match outcome {
        Some(FlushOutcome::Lost(n)) => println!(
            "{} {} event(s) could not be delivered or stored {}",
            style("✗").red().bold(),
            n,
            elapsed
        ),
        _ if metrics.batches_failed > 0 => println!(
            "{} Recorded {}, delivered {}, stored {} for retry {}",
            style("!").yellow().bold(),
            metrics.events_recorded,
            metrics.events_delivered,
            metrics.events_persisted,
            elapsed
        ),
        _ => println!(
            "{} Delivered {} event(s) in {} batch(es) {}",
            style("✓").green().bold(),
            metrics.events_delivered,
            metrics.batches_sent,
            elapsed
        ),
    }

    println!(
        "{} {}",
        style("Session:").dim(),
        style(batcher.session_id()).cyan()
    );
    Ok(())
}

pub async fn retry(cfg: TelemetryConfig) -> Result<()> {
    let batcher = EventBatcherBuilder::new(cfg).build()?;
    let outcome = batcher.retry_failed_events().await;
    if outcome == RetryOutcome::NothingToRetry {
        println!("{} Nothing to retry", style("✓").green().bold());
    }
    print_retry(outcome);
    Ok(())
}

pub async fn pending(cfg: TelemetryConfig) -> Result<()> {
    let store = FailureStore::new(
        Arc::new(FileStore::new(cfg.storage_dir.clone())),
        cfg.failure_store_key,
    );
    let events = store.blocking(|store| store.load()).await?;

    if events.is_empty() {
        println!("{} No events waiting", style("✓").green().bold());
        return Ok(());
    }

    println!(
        "\n{} {}\n",
        style(events.len()).cyan().bold(),
        style("event(s) waiting for retry").dim()
    );
    for event in &events {
        println!(
            "{} {} {} {}",
            style(event.timestamp().format("%Y-%m-%d %H:%M:%S")).dim(),
            style(event.name()).bold(),
            style(event.user_id()).yellow(),
            serde_json::to_string(event.attributes())?
        );
    }
    println!("{}", style("─".repeat(60)).dim());
    Ok(())
}

fn kind_label(kind: NotificationKind) -> console::StyledObject<&'static str> {
    match kind {
        NotificationKind::Success => style("success").green().bold(),
        NotificationKind::Error => style("error").red().bold(),
        NotificationKind::Warning => style("warning").yellow().bold(),
        NotificationKind::Info => style("info").cyan().bold(),
    }
}

pub async fn toast(message: &str, kind: NotificationKind, duration: Duration) -> Result<()> {
    let center = NotificationCenter::new()?;
    let mut changes = center.subscribe();
    let started = Instant::now();
    let id = center.show(message, kind, duration);
    if duration.is_zero() {
        // Nothing would ever expire it; show it once and take it down.
        center.dismiss(id);
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                center.dismiss_all();
            }
            change = changes.recv() => {
                let Ok(change) = change else {
                    return Ok(());
                };
                let at = style(format!("[{}]", format_duration(started.elapsed()))).dim();
                match change {
                    NotificationChange::Shown(n) => {
                        println!("{} {} {}", kind_label(n.kind), n.message, at);
                    }
                    NotificationChange::Expired(expired) if expired == id => {
                        println!("{} expired {}", style("✓").green().bold(), at);
                        return Ok(());
                    }
                    NotificationChange::Dismissed(dismissed) if dismissed == id => {
                        println!("{} dismissed {}", style("✓").green().bold(), at);
                        return Ok(());
                    }
                    NotificationChange::Cleared => {
                        println!("{} dismissed {}", style("✓").green().bold(), at);
                        return Ok(());
                    }
                    _ => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_switch_to_minutes_after_a_minute() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
    }

    #[tokio::test]
    async fn zero_duration_toast_returns_without_waiting() {
        let finished = tokio::time::timeout(
            Duration::from_secs(1),
            toast("saved", NotificationKind::Success, Duration::ZERO),
        )
        .await;

        assert!(matches!(finished, Ok(Ok(()))));
    }
}
