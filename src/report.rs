//! State snapshot files.
//!
//! After every batch the session hands the portfolio to a [`SnapshotSink`].
//! The file sink rewrites one of three files depending on session time:
//! `client_ini.log` before the session starts, `client_fin.log` in the last
//! minute and `client_cur.log` otherwise.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::core::config::SessionConfig;
use crate::core::TICK_BUCKETS;
use crate::portfolio::Portfolio;
use crate::valuation::ValuationEngine;

const TOP_HOLDINGS: usize = 10;
const HELD_PER_LINE: usize = 4;
/// Printed for orders that sit on no reference book level; others print
/// the 1-based level as in the field dump
const NO_TICK: usize = 99;

/// Consumer of post-batch portfolio snapshots.
pub trait SnapshotSink: Send {
    fn write_snapshot(&mut self, pf: &Portfolio) -> std::io::Result<()>;
}

/// Discards snapshots.
pub struct NoopSink;

impl SnapshotSink for NoopSink {
    fn write_snapshot(&mut self, _pf: &Portfolio) -> std::io::Result<()> {
        Ok(())
    }
}

pub struct StateFileSink {
    dir: PathBuf,
    session: SessionConfig,
}

impl StateFileSink {
    pub fn new(dir: impl Into<PathBuf>, session: SessionConfig) -> Self {
        Self {
            dir: dir.into(),
            session,
        }
    }

    /// File the snapshot at `time` goes to.
    pub fn path_for(&self, time: i32) -> PathBuf {
        self.dir.join(state_file_name(time, &self.session))
    }
}

impl SnapshotSink for StateFileSink {
    fn write_snapshot(&mut self, pf: &Portfolio) -> std::io::Result<()> {
        let path = self.path_for(pf.time());
        write_atomic(&path, &render_state(pf, &self.session))
    }
}

pub fn state_file_name(time: i32, session: &SessionConfig) -> &'static str {
    if time <= session.init {
        "client_ini.log"
    } else if time >= session.end - 60 {
        "client_fin.log"
    } else {
        "client_cur.log"
    }
}

fn write_atomic(path: &Path, text: &str) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, text)?;
    std::fs::rename(&tmp, path)
}

/// Human-readable state: valuation, tick-origin sums, holdings and orders.
pub fn render_state(pf: &Portfolio, session: &SessionConfig) -> String {
    let v = ValuationEngine::evaluate(pf);
    let mut out = String::new();

    let time = pf.time();
    let _ = writeln!(
        out,
        "t = {} sec ({} sec to stop)",
        time,
        session.stop.saturating_sub(time).max(0)
    );
    let _ = writeln!(
        out,
        "written {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "  cash free     {:14}", v.free_cash);
    let _ = writeln!(out, "  cash on buy   {:14}", v.buy_reserve);
    let _ = writeln!(out, "  holdings      {:14}", v.holdings_value);
    let _ = writeln!(out, "  held on sell  {:14}", v.sell_reserve);
    let _ = writeln!(
        out,
        "  total         {:14} (r{:+.2}%) (s{:+.2}%)",
        v.total, v.return_vs_reference, v.return_vs_session_start
    );

    let _ = writeln!(out);
    let _ = writeln!(out, "tick origin        bal     quantity       events");
    for (label, bucket) in [("s 0", pf.sums.s0()), ("b 0", pf.sums.b0())] {
        let _ = writeln!(
            out,
            "  [{}] {:12} {:12} {:12}",
            label, bucket.bal, bucket.quantity, bucket.events
        );
    }
    let _ = writeln!(
        out,
        "  [f+t] {:12} (buy {} / sell {}, {} buckets)",
        pf.sums.fee_tax, pf.sums.buy, pf.sums.sell, TICK_BUCKETS
    );

    let _ = writeln!(out);
    let _ = writeln!(out, "top holdings");
    for h in ValuationEngine::top_holdings(pf, TOP_HOLDINGS) {
        let _ = writeln!(out, "  {:8} {:6.2}%", h.code, h.share);
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "held");
    let held: Vec<_> = pf.registry.iter().filter(|(_, r)| r.held > 0).collect();
    for chunk in held.chunks(HELD_PER_LINE) {
        let line: Vec<String> = chunk
            .iter()
            .map(|(code, r)| format!("{:8} {:10.1} ({:6})", code, r.common.ref_price, r.held))
            .collect();
        let _ = writeln!(out, "  {}", line.join("  "));
    }

    let n_orders: usize = pf.registry.iter().map(|(_, r)| r.orders.len()).sum();
    let _ = writeln!(out);
    let _ = writeln!(out, "orders ({})", n_orders);
    for (code, rec) in pf.registry.iter() {
        for order in rec.orders.orders() {
            let tick = rec
                .tick_index_of(order.price, order.side)
                .map_or(NO_TICK, |idx| idx + 1);
            let _ = writeln!(
                out,
                "  [{}{:2}] {:8} {:10} ({:6})",
                order.side.tag(),
                tick,
                code,
                order.price,
                order.quantity
            );
        }
    }
    out
}
