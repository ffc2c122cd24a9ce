use std::collections::BTreeMap;
use std::num::NonZeroU32;

use crate::core::{ProtocolViolation, ReferenceBook, Side, side_range};

/// One outstanding order. Quantity is never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    pub price: i32,
    pub quantity: NonZeroU32,
    pub side: Side,
}

impl Order {
    pub fn notional(&self) -> i64 {
        i64::from(self.price) * i64::from(self.quantity.get())
    }
}

/// Outstanding orders of one security, keyed by price within each side.
/// Replaced wholesale on every order-list record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderBook {
    bids: BTreeMap<i32, NonZeroU32>, // price → qty
    asks: BTreeMap<i32, NonZeroU32>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole book from `(price, signed quantity)` pairs: positive
    /// quantities are buys, negative ones sells. A zero quantity is fatal and
    /// leaves the previous book in place.
    pub fn replace_orders(
        &mut self,
        code: &str,
        entries: &[(i32, i64)],
    ) -> Result<(), ProtocolViolation> {
        let mut bids = BTreeMap::new();
        let mut asks = BTreeMap::new();
        for &(price, signed) in entries {
            let side = match signed {
                0 => {
                    return Err(ProtocolViolation::ZeroQuantity {
                        code: code.to_string(),
                        price,
                    });
                }
                q if q > 0 => Side::Buy,
                _ => Side::Sell,
            };
            let quantity = u32::try_from(signed.unsigned_abs())
                .ok()
                .and_then(NonZeroU32::new)
                .ok_or_else(|| ProtocolViolation::QuantityOutOfRange {
                    code: code.to_string(),
                    quantity: signed,
                })?;
            let book = match side {
                Side::Buy => &mut bids,
                Side::Sell => &mut asks,
            };
            if book.contains_key(&price) {
                tracing::warn!(
                    "{}: duplicate {} order at {}, keeping the first",
                    code,
                    side,
                    price
                );
                continue;
            }
            book.insert(price, quantity);
        }
        self.bids = bids;
        self.asks = asks;
        Ok(())
    }

    /// Buys (ascending price) then sells (ascending price).
    pub fn orders(&self) -> impl Iterator<Item = Order> + '_ {
        self.bids
            .iter()
            .map(to_order(Side::Buy))
            .chain(self.asks.iter().map(to_order(Side::Sell)))
    }

    pub fn side(&self, side: Side) -> impl Iterator<Item = Order> + '_ {
        self.orders().filter(move |o| o.side == side)
    }

    pub fn get(&self, side: Side, price: i32) -> Option<NonZeroU32> {
        match side {
            Side::Buy => self.bids.get(&price).copied(),
            Side::Sell => self.asks.get(&price).copied(),
        }
    }

    /// Sum of price × quantity over one side.
    pub fn notional(&self, side: Side) -> i64 {
        self.side(side).map(|o| o.notional()).sum()
    }

    pub fn len(&self) -> usize {
        self.bids.len() + self.asks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

fn to_order(side: Side) -> impl Fn((&i32, &NonZeroU32)) -> Order {
    move |(&price, &quantity): (&i32, &NonZeroU32)| Order {
        price,
        quantity,
        side,
    }
}

/// 0-based level (0 = best) of `price` within the `side` half of `book`.
/// `None` when no level on that side carries the price.
pub fn tick_index_of(book: &ReferenceBook, price: i32, side: Side) -> Option<usize> {
    book[side_range(side)].iter().position(|l| l.price == price)
}
