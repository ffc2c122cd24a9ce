//! Security registry - every security the server has told us about.
//!
//! Records start out [`Variant::Generic`] and may be promoted exactly once to
//! an option-like or fund-like variant. The common fields live outside the
//! variant, so promotion cannot touch them.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::{
    BOOK_LEVELS, PriceQty, ProtocolViolation, ReferenceBook, Side, THRESHOLD_LEVELS,
};
use crate::orderbook::{self, OrderBook};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    Call,
    Put,
}

/// Option-like (ELW) terms.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionTerms {
    /// `None` when the server sent neither call nor put
    pub kind: Option<OptionKind>,
    pub expiry: i32,
    pub thresholds: [f32; THRESHOLD_LEVELS],
}

impl OptionTerms {
    /// `+1` call, `-1` put, `0` unknown; the wire encoding.
    pub fn call_put_sign(&self) -> i32 {
        match self.kind {
            Some(OptionKind::Call) => 1,
            Some(OptionKind::Put) => -1,
            None => 0,
        }
    }

    pub fn set_call_put_sign(&mut self, sign: i32) {
        self.kind = match sign {
            1 => Some(OptionKind::Call),
            -1 => Some(OptionKind::Put),
            _ => None,
        };
    }
}

impl Default for OptionTerms {
    fn default() -> Self {
        Self {
            kind: None,
            expiry: -1,
            thresholds: [0.0; THRESHOLD_LEVELS],
        }
    }
}

/// Fund-like (ETF) terms.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FundTerms {
    /// Deviation of the price from net asset value
    pub nav_deviation: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Variant {
    #[default]
    Generic,
    OptionLike(OptionTerms),
    FundLike(FundTerms),
}

impl Variant {
    pub fn name(&self) -> &'static str {
        match self {
            Variant::Generic => "generic",
            Variant::OptionLike(_) => "option-like",
            Variant::FundLike(_) => "fund-like",
        }
    }
}

/// Process-wide market state shared by all records, passed explicitly.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MarketContext {
    /// Underlying index level; `None` until the first index update
    pub index_level: Option<f32>,
}

/// Fields every variant carries.
#[derive(Debug, Clone, PartialEq)]
pub struct CommonData {
    pub ref_price: f32,
    pub ref_qty: i64,
    pub ref_book: ReferenceBook,
}

impl Default for CommonData {
    fn default() -> Self {
        Self {
            ref_price: 0.0,
            ref_qty: 0,
            ref_book: [PriceQty::default(); BOOK_LEVELS],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SecurityRecord {
    pub common: CommonData,
    variant: Variant,
    /// Units held
    pub held: i32,
    pub orders: OrderBook,
}

impl SecurityRecord {
    pub fn variant(&self) -> &Variant {
        &self.variant
    }

    pub fn option_terms(&self) -> Option<&OptionTerms> {
        match &self.variant {
            Variant::OptionLike(t) => Some(t),
            _ => None,
        }
    }

    pub fn fund_terms(&self) -> Option<&FundTerms> {
        match &self.variant {
            Variant::FundLike(t) => Some(t),
            _ => None,
        }
    }

    /// Index level as seen by this record; only option-like records see it.
    pub fn index_level(&self, ctx: &MarketContext) -> Option<f32> {
        match self.variant {
            Variant::OptionLike(_) => ctx.index_level,
            _ => None,
        }
    }

    /// One-time transition out of `Generic`.
    pub fn promote(&mut self, code: &str, to: Variant) -> Result<(), ProtocolViolation> {
        if !matches!(self.variant, Variant::Generic) || matches!(to, Variant::Generic) {
            return Err(ProtocolViolation::Repromotion {
                code: code.to_string(),
                current: self.variant.name(),
                requested: to.name(),
            });
        }
        tracing::debug!("{}: promoted to {}", code, to.name());
        self.variant = to;
        Ok(())
    }

    /// Set option terms wholesale, promoting a generic record first.
    /// Returns whether a promotion happened.
    pub fn set_option_terms(
        &mut self,
        code: &str,
        terms: OptionTerms,
    ) -> Result<bool, ProtocolViolation> {
        match &mut self.variant {
            Variant::OptionLike(t) => {
                *t = terms;
                Ok(false)
            }
            _ => self.promote(code, Variant::OptionLike(terms)).map(|_| true),
        }
    }

    /// Set fund terms wholesale, promoting a generic record first.
    pub fn set_fund_terms(
        &mut self,
        code: &str,
        terms: FundTerms,
    ) -> Result<bool, ProtocolViolation> {
        match &mut self.variant {
            Variant::FundLike(t) => {
                *t = terms;
                Ok(false)
            }
            _ => self.promote(code, Variant::FundLike(terms)).map(|_| true),
        }
    }

    /// Reference book level of one of our orders, see [`orderbook::tick_index_of`].
    pub fn tick_index_of(&self, price: i32, side: Side) -> Option<usize> {
        orderbook::tick_index_of(&self.common.ref_book, price, side)
    }

    /// Mark-to-market value of the held units.
    pub fn holding_value(&self) -> i64 {
        (f64::from(self.common.ref_price) * f64::from(self.held)).round() as i64
    }
}

/// Code-keyed store of security records, iterated in code order.
#[derive(Debug, Clone, Default)]
pub struct SecurityRegistry {
    items: BTreeMap<String, SecurityRecord>,
}

impl SecurityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a record, creating it as `Generic` on first sighting.
    pub fn get_or_create(&mut self, code: &str) -> &mut SecurityRecord {
        if !self.items.contains_key(code) {
            tracing::debug!("New security {}", code);
        }
        self.items.entry(code.to_string()).or_default()
    }

    pub fn get(&self, code: &str) -> Option<&SecurityRecord> {
        self.items.get(code)
    }

    pub fn get_mut(&mut self, code: &str) -> Option<&mut SecurityRecord> {
        self.items.get_mut(code)
    }

    pub fn promote_to_option_like(
        &mut self,
        code: &str,
        terms: OptionTerms,
    ) -> Result<(), ProtocolViolation> {
        self.get_or_create(code)
            .promote(code, Variant::OptionLike(terms))
    }

    pub fn promote_to_fund_like(
        &mut self,
        code: &str,
        terms: FundTerms,
    ) -> Result<(), ProtocolViolation> {
        self.get_or_create(code).promote(code, Variant::FundLike(terms))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SecurityRecord)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
