//! Portfolio snapshot: registry, sums, shared market context and baselines.

use serde::Serialize;

use crate::core::config::SessionConfig;
use crate::core::{GlobalTime, ReferenceBook, THRESHOLD_LEVELS};
use crate::registry::{FundTerms, MarketContext, SecurityRegistry};
use crate::sums::AggregateSums;

/// Valuation baselines that returns are measured against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Baselines {
    /// Periodically refreshed reference total
    pub reference: i64,
    /// Total at session start
    pub session_start: i64,
    reference_at: Option<i32>,
    session_start_set: bool,
}

impl Baselines {
    /// Fold the latest total in. The session-start baseline follows the total
    /// until the session starts; the reference baseline is refreshed every
    /// `reference_refresh_secs`.
    pub fn update(&mut self, total: i64, time: i32, session: &SessionConfig) {
        if !self.session_start_set || time <= session.init {
            self.session_start = total;
            self.session_start_set = true;
        }
        let stale = match self.reference_at {
            None => true,
            Some(at) => time.saturating_sub(at) >= session.reference_refresh_secs,
        };
        if stale {
            self.reference = total;
            self.reference_at = Some(time);
        }
    }
}

/// Everything the server mirrors to us, as of the last applied batch.
#[derive(Debug, Clone)]
pub struct Portfolio {
    pub registry: SecurityRegistry,
    pub sums: AggregateSums,
    pub market: MarketContext,
    pub baselines: Baselines,
    clock: GlobalTime,
}

/// Per-security view handed to downstream consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityState {
    pub code: String,
    pub time: i32,
    pub ref_price: f32,
    pub ref_qty: i64,
    pub ref_book: ReferenceBook,
    pub option: Option<OptionState>,
    pub fund: Option<FundTerms>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionState {
    /// `+1` call, `-1` put, `0` unknown
    pub call_put: i32,
    pub expiry: i32,
    pub index_level: Option<f32>,
    pub thresholds: [f32; THRESHOLD_LEVELS],
}

impl Portfolio {
    pub fn new(clock: GlobalTime) -> Self {
        Self {
            registry: SecurityRegistry::new(),
            sums: AggregateSums::new(),
            market: MarketContext::default(),
            baselines: Baselines::default(),
            clock,
        }
    }

    pub fn clock(&self) -> &GlobalTime {
        &self.clock
    }

    pub fn time(&self) -> i32 {
        self.clock.load()
    }

    /// Snapshot of every security in code order.
    pub fn state_vec(&self) -> Vec<SecurityState> {
        let time = self.time();
        self.registry
            .iter()
            .map(|(code, rec)| SecurityState {
                code: code.to_string(),
                time,
                ref_price: rec.common.ref_price,
                ref_qty: rec.common.ref_qty,
                ref_book: rec.common.ref_book,
                option: rec.option_terms().map(|t| OptionState {
                    call_put: t.call_put_sign(),
                    expiry: t.expiry,
                    index_level: rec.index_level(&self.market),
                    thresholds: t.thresholds,
                }),
                fund: rec.fund_terms().cloned(),
            })
            .collect()
    }
}
