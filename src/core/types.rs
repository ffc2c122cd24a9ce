//! Core types - Strong typing for book levels, sides and time

use serde::{Deserialize, Serialize};

/// Levels in a reference book (sell half then buy half).
pub const BOOK_LEVELS: usize = 20;

/// Levels per side.
pub const HALF_LEVELS: usize = BOOK_LEVELS / 2;

/// Tick-origin statistic buckets.
pub const TICK_BUCKETS: usize = 20;

/// Threshold levels carried by option-like securities.
pub const THRESHOLD_LEVELS: usize = 8;

/// Bucket holding fills that originated at the best sell level.
pub const TICK_ORIGIN_S0: usize = HALF_LEVELS - 1;

/// Bucket holding fills that originated at the best buy level.
pub const TICK_ORIGIN_B0: usize = HALF_LEVELS;

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Short label used in dumps and reports.
    pub fn tag(self) -> &'static str {
        match self {
            Side::Buy => "b",
            Side::Sell => "s",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// One price level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQty {
    pub price: i32,
    pub quantity: i32,
}

impl PriceQty {
    pub fn new(price: i32, quantity: i32) -> Self {
        Self { price, quantity }
    }
}

/// 20-level reference book: `[0, 10)` sell side, `[10, 20)` buy side, each best first.
pub type ReferenceBook = [PriceQty; BOOK_LEVELS];

/// Half of the reference book a side lives in.
pub fn side_range(side: Side) -> std::ops::Range<usize> {
    match side {
        Side::Sell => 0..HALF_LEVELS,
        Side::Buy => HALF_LEVELS..BOOK_LEVELS,
    }
}

/// Label of a reference book level, e.g. `s1` for the best sell level.
pub fn level_label(idx: usize) -> String {
    if idx < HALF_LEVELS {
        format!("s{:2}", idx + 1)
    } else {
        format!("b{:2}", idx - HALF_LEVELS + 1)
    }
}

/// Market open as `HHMMSS`. Internal time is seconds relative to it.
pub const MARKET_OPEN_HHMMSS: i32 = 90_000;

/// Convert an `HHMMSS` time token into seconds relative to market open.
///
/// Tokens before the open map to negative times.
pub fn txt_to_time(txt: i32) -> i32 {
    let secs = |t: i32| (t / 10_000) * 3600 + (t / 100 % 100) * 60 + t % 100;
    secs(txt) - secs(MARKET_OPEN_HHMMSS)
}
