//! Valuation - read-only account metrics over a portfolio snapshot.

use serde::Serialize;

use crate::core::Side;
use crate::portfolio::Portfolio;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Valuation {
    /// Cash not reserved by buy orders
    pub free_cash: i64,
    pub buy_reserve: i64,
    pub holdings_value: i64,
    pub sell_reserve: i64,
    pub total: i64,
    /// Percent return of `total` against the reference baseline
    pub return_vs_reference: f64,
    /// Percent return of `total` against the session-start baseline
    pub return_vs_session_start: f64,
}

/// One line of the top-holdings table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Holding {
    pub code: String,
    pub held: i32,
    pub value: i64,
    /// Share of the valuation total in percent
    pub share: f64,
}

pub struct ValuationEngine;

impl ValuationEngine {
    /// Value the snapshot. Pure and deterministic.
    pub fn evaluate(pf: &Portfolio) -> Valuation {
        let mut v = Valuation::default();
        for (_, rec) in pf.registry.iter() {
            v.buy_reserve += rec.orders.notional(Side::Buy);
            v.sell_reserve += rec.orders.notional(Side::Sell);
            v.holdings_value += rec.holding_value();
        }
        v.free_cash = pf.sums.balance - v.buy_reserve;
        v.total = v.free_cash + v.buy_reserve + v.holdings_value + v.sell_reserve;
        v.return_vs_reference = pct_change(v.total, pf.baselines.reference);
        v.return_vs_session_start = pct_change(v.total, pf.baselines.session_start);
        v
    }

    /// Up to `n` largest holdings by value.
    pub fn top_holdings(pf: &Portfolio, n: usize) -> Vec<Holding> {
        let total = Self::evaluate(pf).total;
        let mut holdings: Vec<Holding> = pf
            .registry
            .iter()
            .filter(|(_, rec)| rec.held > 0)
            .map(|(code, rec)| {
                let value = rec.holding_value();
                Holding {
                    code: code.to_string(),
                    held: rec.held,
                    value,
                    share: if total != 0 {
                        100.0 * value as f64 / total as f64
                    } else {
                        0.0
                    },
                }
            })
            .collect();
        // stable sort keeps code order among equal values
        holdings.sort_by(|a, b| b.value.cmp(&a.value));
        holdings.truncate(n);
        holdings
    }
}

fn pct_change(total: i64, baseline: i64) -> f64 {
    if baseline == 0 {
        return 0.0;
    }
    (total as f64 / baseline as f64 - 1.0) * 100.0
}
