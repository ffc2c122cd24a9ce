//! Account-level running totals as reported by the server.

use serde::Serialize;

use crate::core::{TICK_BUCKETS, TICK_ORIGIN_B0, TICK_ORIGIN_S0};

/// Fills attributed to the tick they originated from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TickOriginBucket {
    /// Balance change
    pub bal: i64,
    pub quantity: i64,
    /// Fill events
    pub events: i64,
}

/// Cash balance, running buy/sell/fee totals and tick-origin statistics.
/// Fixed-size, no heap.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AggregateSums {
    pub balance: i64,
    pub buy: i64,
    pub sell: i64,
    pub fee_tax: i64,
    pub tick_origin: [TickOriginBucket; TICK_BUCKETS],
}

impl AggregateSums {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutable access to the field at a flattened `(bal, quantity, events)`
    /// position, as laid out on the wire. `None` past the last bucket.
    pub fn tick_origin_field_mut(&mut self, pos: usize) -> Option<&mut i64> {
        let bucket = self.tick_origin.get_mut(pos / 3)?;
        Some(match pos % 3 {
            0 => &mut bucket.bal,
            1 => &mut bucket.quantity,
            _ => &mut bucket.events,
        })
    }

    /// Bucket for fills at the best sell level.
    pub fn s0(&self) -> &TickOriginBucket {
        &self.tick_origin[TICK_ORIGIN_S0]
    }

    /// Bucket for fills at the best buy level.
    pub fn b0(&self) -> &TickOriginBucket {
        &self.tick_origin[TICK_ORIGIN_B0]
    }
}
