//! Book snapshots: `time \t p_0 .. p_{N-1} \t q_0 .. q_{N-1}`.
//!
//! A new book supersedes the old one entirely; nothing is folded.

use super::{RecordDecoder, expect_fields, parse_field};
use crate::core::{BOOK_LEVELS, PriceQty};

#[derive(Debug, Clone)]
pub struct BookDecoder<const N: usize> {
    cur: [PriceQty; N],
    last: [PriceQty; N],
}

/// Book decoder matching the server's reference book depth.
pub type ReferenceBookDecoder = BookDecoder<BOOK_LEVELS>;

impl<const N: usize> BookDecoder<N> {
    pub fn new() -> Self {
        Self {
            cur: [PriceQty::default(); N],
            last: [PriceQty::default(); N],
        }
    }

    /// Last committed book.
    pub fn book(&self) -> &[PriceQty; N] {
        &self.last
    }
}

impl<const N: usize> Default for BookDecoder<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RecordDecoder for BookDecoder<N> {
    fn decode(&mut self, fields: &[&str], _first_of_tick: bool) -> Result<(), String> {
        expect_fields(fields, 2 * N)?;
        let mut book = [PriceQty::default(); N];
        for (i, level) in book.iter_mut().enumerate() {
            level.price = parse_field(fields, i, "price")?;
            level.quantity = parse_field(fields, N + i, "quantity")?;
        }
        self.cur = book;
        Ok(())
    }

    fn commit(&mut self) {
        self.last = self.cur;
    }
}
