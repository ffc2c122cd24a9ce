use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{EnvFilter, fmt};

use portfolio_mirror::{ApplyOutcome, Config, Session};

const REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Split a capture into batches. Each batch starts at a line beginning with
/// `/*`; text before the first marker is a batch of its own.
fn split_batches(text: &str) -> Vec<String> {
    let mut batches = Vec::new();
    let mut cur = String::new();
    for line in text.lines() {
        if line.starts_with("/*") && !cur.trim().is_empty() {
            batches.push(std::mem::take(&mut cur));
        }
        cur.push_str(line);
        cur.push('\n');
    }
    if !cur.trim().is_empty() {
        batches.push(cur);
    }
    batches
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,portfolio_mirror=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    let mut args = std::env::args().skip(1);
    let Some(input) = args.next().map(PathBuf::from) else {
        anyhow::bail!("usage: portfolio-mirror <batch-file> [pace-ms]");
    };
    let pace = args
        .next()
        .map(|s| s.parse::<u64>())
        .transpose()
        .context("pace-ms must be an integer")?
        .map(Duration::from_millis);

    let config = Config::load_default();
    tracing::info!(
        "Portfolio mirror starting: session [{}, {}], input {}",
        config.session.init,
        config.session.end,
        input.display()
    );

    let text = std::fs::read_to_string(&input)
        .with_context(|| format!("reading {}", input.display()))?;
    let batches = split_batches(&text);
    tracing::info!("Loaded {} batches", batches.len());

    let session = Arc::new(Session::new(&config));

    // Reporter: reads between batches only, time lock-free
    let reporter = {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(REPORT_INTERVAL);
            loop {
                interval.tick().await;
                let v = session.valuation();
                tracing::info!(
                    "t={} total={} cash={} holdings={} r={:+.2}% s={:+.2}%",
                    session.time(),
                    v.total,
                    v.free_cash,
                    v.holdings_value,
                    v.return_vs_reference,
                    v.return_vs_session_start
                );
            }
        })
    };

    let mut applied = 0usize;
    for batch in &batches {
        match session.apply(batch) {
            Ok(ApplyOutcome::Continue) => applied += 1,
            Ok(ApplyOutcome::SessionEnd) => {
                applied += 1;
                break;
            }
            Err(e) => {
                tracing::error!("Fatal error after {} batches: {}", applied, e);
                reporter.abort();
                return Err(e.into());
            }
        }
        if let Some(pace) = pace {
            tokio::time::sleep(pace).await;
        } else {
            tokio::task::yield_now().await;
        }
    }
    reporter.abort();

    let v = session.valuation();
    tracing::info!(
        "Done: {} batches, t={}, {} securities, total={}",
        applied,
        session.time(),
        session.read().registry.len(),
        v.total
    );
    tracing::debug!(
        "Final state: {}",
        serde_json::to_string(&session.state_vec()).context("serialising state vector")?
    );
    Ok(())
}
