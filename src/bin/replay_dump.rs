use std::path::PathBuf;

use anyhow::Context;

use portfolio_mirror::core::{Config, level_label, txt_to_time};
use portfolio_mirror::replay::{ReferenceBookDecoder, TimeGatedReader, TradeDecoder};

fn usage() -> anyhow::Error {
    anyhow::anyhow!("usage: replay_dump <trade|book> <file> <until-HHMMSS> [step-secs]")
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let kind = args.next().ok_or_else(usage)?;
    let path = args.next().map(PathBuf::from).ok_or_else(usage)?;
    let until: i32 = args
        .next()
        .ok_or_else(usage)?
        .parse()
        .context("until must be HHMMSS")?;
    let step: i32 = match args.next() {
        Some(s) => s.parse().context("step must be seconds")?,
        None => 60,
    };
    anyhow::ensure!(step > 0, "step must be positive");

    let until = txt_to_time(until);
    let config = Config::load_default();
    let delay = config.replay.delay;
    println!(
        "Replaying {} up to t={} in {}s steps (delay {}s)",
        path.display(),
        until,
        step,
        delay
    );

    match kind.as_str() {
        "trade" => {
            let mut reader = TimeGatedReader::open(&path, TradeDecoder::new(true))?;
            reader.set_delay(delay);
            let mut t = config.session.init.min(until);
            loop {
                let n = reader.advance_time(t)?;
                if n > 0 {
                    let d = reader.decoder();
                    let last = d.last();
                    println!(
                        "t={:6} +{:4} rec | last {}@{} ask {} bid {} | sumQ {} vwap {}",
                        t,
                        n,
                        last.price,
                        last.quantity,
                        last.best_ask,
                        last.best_bid,
                        d.sum_q(),
                        d.vwap().map_or("-".to_string(), |v| format!("{:.2}", v))
                    );
                    reader.decoder_mut().clear_trades();
                }
                if t >= until || reader.is_exhausted() {
                    break;
                }
                t = (t + step).min(until);
            }
        }
        "book" => {
            let mut reader = TimeGatedReader::open(&path, ReferenceBookDecoder::new())?;
            reader.set_delay(delay);
            reader.advance_time(until)?;
            println!("Book at t={:?}:", reader.time());
            for (idx, level) in reader.decoder().book().iter().enumerate() {
                println!("[{}] {:10} {:10}", level_label(idx), level.price, level.quantity);
            }
        }
        _ => return Err(usage()),
    }
    Ok(())
}
