use anyhow::{Context, Result};
use musix_core::{RequestControls, RequestOptions};
use musix_governor::Config;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Issue `url` through a fresh governor `repeat` times, reporting each
/// outcome.
pub async fn run_fetch(
    config: &Config,
    url: &str,
    controls: &RequestControls,
    repeat: u32,
) -> Result<()> {
    let governor = config.governor()?;

    let signal = CancellationToken::new();
    let on_interrupt = signal.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });
    let options = RequestOptions::new().with_signal(signal.clone());

    let mut failures = 0;
    for attempt in 1..=repeat.max(1) {
        let started = Instant::now();
        match governor.request(url, &options, controls).await {
            Ok(value) => {
                println!("[{attempt}] ok in {:?}", started.elapsed());
                let body =
                    serde_json::to_string_pretty(&value).context("Failed to format response")?;
                println!("{body}");
            }
            Err(e) if e.is_rate_limited() => {
                failures += 1;
                println!(
                    "[{attempt}] rate limited: retry in {}s",
                    e.retry_after().unwrap_or_default()
                );
            }
            Err(e) => {
                failures += 1;
                println!("[{attempt}] error: {e}");
            }
        }

        if signal.is_cancelled() {
            println!("Interrupted");
            break;
        }
    }

    if failures == repeat.max(1) {
        anyhow::bail!("All requests to {url} failed");
    }

    Ok(())
}
