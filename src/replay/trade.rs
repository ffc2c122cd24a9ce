//! Trade accumulator: `time \t price \t quantity \t best_ask \t best_bid`.

use super::{RecordDecoder, expect_fields, parse_field};
use crate::core::PriceQty;

const TRADE_FIELDS: usize = 4;

/// Trades of one tick, folded together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TradeTick {
    /// Last traded price in the tick
    pub price: i32,
    /// Total traded quantity in the tick
    pub quantity: i64,
    /// Sum of price × quantity in the tick
    pub notional: i64,
    pub best_ask: i32,
    pub best_bid: i32,
}

/// Builds per-tick trade aggregates. With folding enabled every commit also
/// adds the tick's notional and quantity to the running sums.
#[derive(Debug, Default)]
pub struct TradeDecoder {
    fold: bool,
    cur: TradeTick,
    last: TradeTick,
    sum_q: i64,
    sum_pq: i64,
    trades: Vec<PriceQty>,
}

impl TradeDecoder {
    pub fn new(fold: bool) -> Self {
        Self {
            fold,
            ..Self::default()
        }
    }

    pub fn set_fold(&mut self, fold: bool) {
        self.fold = fold;
    }

    /// Clear the running sums, typically at every aggregation interval.
    pub fn reset_sums(&mut self) {
        self.sum_q = 0;
        self.sum_pq = 0;
    }

    /// Clear the per-tick trade list.
    pub fn clear_trades(&mut self) {
        self.trades.clear();
    }

    /// Last committed tick.
    pub fn last(&self) -> &TradeTick {
        &self.last
    }

    pub fn sum_q(&self) -> i64 {
        self.sum_q
    }

    pub fn sum_pq(&self) -> i64 {
        self.sum_pq
    }

    /// Volume-weighted price over the running sums.
    pub fn vwap(&self) -> Option<f64> {
        (self.sum_q != 0).then(|| self.sum_pq as f64 / self.sum_q as f64)
    }

    /// Folded ticks since the last `clear_trades`, as (last price, tick quantity).
    pub fn trades(&self) -> &[PriceQty] {
        &self.trades
    }

    pub fn best_ask(&self) -> i32 {
        self.last.best_ask
    }

    pub fn best_bid(&self) -> i32 {
        self.last.best_bid
    }
}

impl RecordDecoder for TradeDecoder {
    fn decode(&mut self, fields: &[&str], first_of_tick: bool) -> Result<(), String> {
        expect_fields(fields, TRADE_FIELDS)?;
        let price: i32 = parse_field(fields, 0, "price")?;
        let quantity: i32 = parse_field(fields, 1, "quantity")?;
        let best_ask: i32 = parse_field(fields, 2, "best ask")?;
        let best_bid: i32 = parse_field(fields, 3, "best bid")?;

        if first_of_tick {
            self.cur = TradeTick::default();
        }
        self.cur.price = price;
        self.cur.quantity += i64::from(quantity);
        self.cur.notional += i64::from(price) * i64::from(quantity);
        self.cur.best_ask = best_ask;
        self.cur.best_bid = best_bid;
        Ok(())
    }

    fn commit(&mut self) {
        if self.fold {
            self.sum_pq += self.cur.notional;
            self.sum_q += self.cur.quantity;
            self.trades.push(PriceQty::new(
                self.cur.price,
                i32::try_from(self.cur.quantity).unwrap_or(i32::MAX),
            ));
        }
        self.last = self.cur;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::TimeGatedReader;
    use std::io::Cursor;

    fn reader(text: &str, fold: bool) -> TimeGatedReader<TradeDecoder> {
        TimeGatedReader::from_reader(Cursor::new(text.to_string()), TradeDecoder::new(fold))
    }

    const TICKS: &str = "090010\t100\t3\t101\t99\n\
                         090010\t101\t4\t102\t100\n\
                         090011\t102\t5\t103\t101\n";

    #[test]
    fn test_fold_sums_whole_tick() {
        let mut r = reader(TICKS, true);
        r.advance_time(10).unwrap();

        let d = r.decoder();
        assert_eq!(d.sum_q(), 7);
        assert_eq!(d.sum_pq(), 100 * 3 + 101 * 4);
        assert_eq!(d.last().price, 101);
        assert_eq!(d.last().quantity, 7);
        assert_eq!(d.best_ask(), 102);
        assert_eq!(d.best_bid(), 100);
        assert_eq!(d.trades(), &[PriceQty::new(101, 7)]);

        r.advance_time(11).unwrap();
        assert_eq!(r.decoder().sum_q(), 12);
        assert_eq!(r.decoder().trades().len(), 2);
    }

    #[test]
    fn test_without_fold_only_replaces() {
        let mut r = reader(TICKS, false);
        r.advance_time(11).unwrap();

        let d = r.decoder();
        assert_eq!(d.sum_q(), 0);
        assert_eq!(d.sum_pq(), 0);
        assert!(d.trades().is_empty());
        assert_eq!(d.last().price, 102);
        assert_eq!(d.last().quantity, 5);
    }

    #[test]
    fn test_resets() {
        let mut r = reader(TICKS, true);
        r.advance_time(10).unwrap();
        r.decoder_mut().reset_sums();
        r.decoder_mut().clear_trades();
        assert_eq!(r.decoder().vwap(), None);

        r.advance_time(11).unwrap();
        assert_eq!(r.decoder().sum_q(), 5);
        assert_eq!(r.decoder().vwap(), Some(102.0));
    }

    #[test]
    fn test_wrong_field_count_is_fatal() {
        let mut r = reader("090010\t100\t3\t101\n", true);
        assert!(r.advance_time(10).is_err());
    }
}
