//! Protocol message applier - folds one server batch into the portfolio.
//!
//! A batch is newline-delimited records, each a one-character tag followed by
//! space-delimited fields:
//!
//! | tag | fields |
//! |-----|--------|
//! | `b` | time, balance, buy total, sell total, fee+tax total |
//! | `s` | 20 × (balance, quantity, events) tick-origin buckets |
//! | `k` | index level |
//! | `d` | code, reference price, reference quantity, 20 prices, 20 quantities |
//! | `e` | [code], call/put (+1/-1), expiry, 8 thresholds |
//! | `n` | [code], NAV deviation |
//! | `o` | [code], held count, (price, signed quantity)* |
//!
//! `e`/`n`/`o` act on the security of the last `d` record in the same batch.
//! The server also repeats that code as their first field; it is recognised by
//! the field count and otherwise ignored.
//!
//! Numeric fields are decoded with [`parse_or_retain`]: a garbled field keeps
//! the previous value. Protocol violations are fatal.

use crate::core::config::SessionConfig;
use crate::core::{BOOK_LEVELS, ProtocolViolation, Result, THRESHOLD_LEVELS};
use crate::lenient::{FieldParse, parse_or_retain};
use crate::portfolio::Portfolio;
use crate::registry::SecurityRecord;
use crate::valuation::ValuationEngine;

/// What the caller should do after a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Continue,
    /// Session time reached the end bound
    SessionEnd,
}

/// Per-batch parse state.
#[derive(Debug, Default)]
pub struct BatchContext {
    cursor: Option<String>,
    records: usize,
    retained: usize,
}

impl BatchContext {
    /// Security that extension and order records refer to.
    pub fn cursor(&self, tag: char) -> std::result::Result<&str, ProtocolViolation> {
        self.cursor
            .as_deref()
            .ok_or(ProtocolViolation::MissingCursor { tag })
    }

    fn field<T: std::str::FromStr>(&mut self, dst: &mut T, token: &str) {
        if parse_or_retain(dst, token) == FieldParse::Retained {
            self.retained += 1;
        }
    }
}

pub struct ProtocolMessageApplier {
    session: SessionConfig,
}

const OPTION_FIELDS: usize = 2 + THRESHOLD_LEVELS;

impl ProtocolMessageApplier {
    pub fn new(session: SessionConfig) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SessionConfig {
        &self.session
    }

    /// Apply every record of `batch` in order.
    ///
    /// On error the portfolio may be partially updated and must not be used
    /// for further trading decisions.
    pub fn apply(&self, pf: &mut Portfolio, batch: &str) -> Result<ApplyOutcome> {
        let mut ctx = BatchContext::default();

        for line in batch.lines() {
            let mut tokens = line.split_whitespace();
            let Some(tag) = tokens.next() else { continue };
            let fields: Vec<&str> = tokens.collect();
            let mut chars = tag.chars();
            let (Some(tag), None) = (chars.next(), chars.next()) else {
                tracing::trace!("Skipping line '{}'", line);
                continue;
            };

            match tag {
                'b' => apply_header(pf, &mut ctx, &fields),
                's' => {
                    for (pos, token) in fields.iter().enumerate() {
                        match pf.sums.tick_origin_field_mut(pos) {
                            Some(dst) => ctx.field(dst, token),
                            None => break,
                        }
                    }
                }
                'k' => {
                    if let Some(token) = fields.first() {
                        let mut level = pf.market.index_level.unwrap_or(f32::NAN);
                        ctx.field(&mut level, token);
                        if !level.is_nan() {
                            pf.market.index_level = Some(level);
                        }
                    }
                }
                'd' => {
                    let (&code, rest) = fields.split_first().ok_or(ProtocolViolation::MissingCode)?;
                    ctx.cursor = Some(code.to_string());
                    apply_common(pf.registry.get_or_create(code), &mut ctx, rest);
                }
                'e' => {
                    let code = ctx.cursor('e')?.to_string();
                    let has_code = code_present('e', &fields, OPTION_FIELDS);
                    let rest = strip_code(&code, &fields, has_code);
                    let rec = pf.registry.get_or_create(&code);
                    let mut terms = rec.option_terms().cloned().unwrap_or_default();
                    let mut sign = terms.call_put_sign();
                    if let Some(t) = rest.first() {
                        ctx.field(&mut sign, t);
                    }
                    if let Some(t) = rest.get(1) {
                        ctx.field(&mut terms.expiry, t);
                    }
                    for (dst, t) in terms.thresholds.iter_mut().zip(rest.iter().skip(2)) {
                        ctx.field(dst, t);
                    }
                    terms.set_call_put_sign(sign);
                    rec.set_option_terms(&code, terms)?;
                }
                'n' => {
                    let code = ctx.cursor('n')?.to_string();
                    let has_code = code_present('n', &fields, 1);
                    let rest = strip_code(&code, &fields, has_code);
                    let rec = pf.registry.get_or_create(&code);
                    let mut terms = rec.fund_terms().cloned().unwrap_or_default();
                    if let Some(t) = rest.first() {
                        ctx.field(&mut terms.nav_deviation, t);
                    }
                    rec.set_fund_terms(&code, terms)?;
                }
                'o' => {
                    let code = ctx.cursor('o')?.to_string();
                    // held count plus pairs is odd; an even count carries the code
                    let has_code = !fields.is_empty() && fields.len() % 2 == 0;
                    let rest = strip_code(&code, &fields, has_code);
                    let rec = pf.registry.get_or_create(&code);
                    apply_orders(rec, &code, &mut ctx, rest)?;
                }
                other => {
                    tracing::trace!("Ignoring record with unknown tag '{}'", other);
                    continue;
                }
            }
            ctx.records += 1;
        }

        let time = pf.time();
        let total = ValuationEngine::evaluate(pf).total;
        pf.baselines.update(total, time, &self.session);

        tracing::debug!(
            "Applied batch at t={}: {} records, {} fields retained",
            time,
            ctx.records,
            ctx.retained
        );

        if time >= self.session.end {
            tracing::info!("Session end reached at t={}", time);
            return Ok(ApplyOutcome::SessionEnd);
        }
        Ok(ApplyOutcome::Continue)
    }
}

fn apply_header(pf: &mut Portfolio, ctx: &mut BatchContext, fields: &[&str]) {
    let mut time = pf.time();
    if let Some(t) = fields.first() {
        ctx.field(&mut time, t);
    }
    if !pf.clock().advance_to(time) {
        tracing::warn!(
            "Header time {} is behind session time {}, keeping the latter",
            time,
            pf.time()
        );
    }
    let sums = &mut pf.sums;
    for (dst, t) in [&mut sums.balance, &mut sums.buy, &mut sums.sell, &mut sums.fee_tax]
        .into_iter()
        .zip(fields.iter().skip(1))
    {
        ctx.field(dst, t);
    }
}

/// Whether a fixed-width record carries the leading code, judged by its field
/// count against the `bare` count without it. Any other count is applied
/// positionally as if the code were absent.
fn code_present(tag: char, fields: &[&str], bare: usize) -> bool {
    match fields.len() {
        n if n == bare + 1 => true,
        n if n == bare => false,
        n => {
            tracing::warn!(
                "'{}' record has {} fields, expected {} or {} with code; applying positionally",
                tag,
                n,
                bare,
                bare + 1
            );
            false
        }
    }
}

/// Drop a leading code field, warning if it names another security.
fn strip_code<'a>(cursor: &str, fields: &'a [&'a str], has_code: bool) -> &'a [&'a str] {
    if !has_code {
        return fields;
    }
    if fields[0] != cursor {
        tracing::warn!("Record names {} but follows 'd' for {}", fields[0], cursor);
    }
    &fields[1..]
}

fn apply_common(rec: &mut SecurityRecord, ctx: &mut BatchContext, fields: &[&str]) {
    let common = &mut rec.common;
    if let Some(t) = fields.first() {
        ctx.field(&mut common.ref_price, t);
    }
    if let Some(t) = fields.get(1) {
        ctx.field(&mut common.ref_qty, t);
    }
    let book = fields.get(2..).unwrap_or_default();
    for (level, t) in common.ref_book.iter_mut().zip(book.iter()) {
        ctx.field(&mut level.price, t);
    }
    for (level, t) in common.ref_book.iter_mut().zip(book.iter().skip(BOOK_LEVELS)) {
        ctx.field(&mut level.quantity, t);
    }
}

fn apply_orders(
    rec: &mut SecurityRecord,
    code: &str,
    ctx: &mut BatchContext,
    fields: &[&str],
) -> Result<()> {
    let Some((held, pairs)) = fields.split_first() else {
        rec.orders.replace_orders(code, &[])?;
        return Ok(());
    };
    ctx.field(&mut rec.held, held);

    // a garbled field inherits from the previous pair
    let (mut price, mut quantity) = (0i32, 0i64);
    let mut entries = Vec::with_capacity(pairs.len() / 2);
    for pair in pairs.chunks(2) {
        let [p, q] = pair else {
            tracing::warn!("{}: dangling order price {}", code, pair[0]);
            break;
        };
        ctx.field(&mut price, p);
        ctx.field(&mut quantity, q);
        entries.push((price, quantity));
    }
    rec.orders.replace_orders(code, &entries)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Error, GlobalTime, PriceQty, Side};
    use crate::registry::{OptionKind, Variant};
    use std::num::NonZeroU32;

    fn book_fields() -> String {
        let prices = (0..10)
            .map(|i| 71_300 + 100 * i)
            .chain((0..10).map(|i| 71_200 - 100 * i))
            .map(|p| p.to_string());
        let quantities = (1..=20).map(|q| q.to_string());
        prices.chain(quantities).collect::<Vec<_>>().join(" ")
    }

    fn setup() -> (ProtocolMessageApplier, Portfolio) {
        (
            ProtocolMessageApplier::new(SessionConfig::default()),
            Portfolio::new(GlobalTime::new(-3600)),
        )
    }

    fn qty(n: u32) -> Option<NonZeroU32> {
        NonZeroU32::new(n)
    }

    #[test]
    fn test_common_data_then_orders() {
        let (applier, mut pf) = setup();
        let batch = format!("d 005930 71300 1200 {}\no 3 71300 10 71200 -5\n", book_fields());
        assert_eq!(applier.apply(&mut pf, &batch).unwrap(), ApplyOutcome::Continue);

        let rec = pf.registry.get("005930").unwrap();
        assert_eq!(rec.variant(), &Variant::Generic);
        assert_eq!(rec.held, 3);
        assert_eq!(rec.common.ref_price, 71_300.0);
        assert_eq!(rec.common.ref_qty, 1200);
        assert_eq!(rec.common.ref_book[0], PriceQty::new(71_300, 1));
        assert_eq!(rec.common.ref_book[19], PriceQty::new(70_300, 20));
        assert_eq!(rec.orders.len(), 2);
        assert_eq!(rec.orders.get(Side::Buy, 71_300), qty(10));
        assert_eq!(rec.orders.get(Side::Sell, 71_200), qty(5));
        assert_eq!(rec.tick_index_of(71_300, Side::Sell), Some(0));
        assert_eq!(rec.tick_index_of(71_200, Side::Buy), Some(0));
    }

    #[test]
    fn test_order_record_with_leading_code() {
        let (applier, mut pf) = setup();
        let batch = format!(
            "d 005930 71300 1200 {}\no 005930 3 71300 10 71200 -5\n",
            book_fields()
        );
        applier.apply(&mut pf, &batch).unwrap();

        let rec = pf.registry.get("005930").unwrap();
        assert_eq!(rec.held, 3);
        assert_eq!(rec.orders.len(), 2);
    }

    #[test]
    fn test_repeated_common_data_updates_one_entry() {
        let (applier, mut pf) = setup();
        let batch = "d 000660 100 1\nd 000660 101 2\n";
        applier.apply(&mut pf, batch).unwrap();

        assert_eq!(pf.registry.len(), 1);
        assert_eq!(pf.registry.get("000660").unwrap().common.ref_price, 101.0);
    }

    #[test]
    fn test_header_and_sums() {
        let (applier, mut pf) = setup();
        let sums: Vec<String> = (0..60).map(|i| i.to_string()).collect();
        let batch = format!("b 120 5000000 300 200 7\ns {}\nk 251.75\n", sums.join(" "));
        applier.apply(&mut pf, &batch).unwrap();

        assert_eq!(pf.time(), 120);
        assert_eq!(pf.sums.balance, 5_000_000);
        assert_eq!((pf.sums.buy, pf.sums.sell, pf.sums.fee_tax), (300, 200, 7));
        assert_eq!(pf.sums.tick_origin[1].bal, 3);
        assert_eq!(pf.sums.tick_origin[19].events, 59);
        assert_eq!(pf.market.index_level, Some(251.75));
    }

    #[test]
    fn test_garbled_fields_keep_previous_values() {
        let (applier, mut pf) = setup();
        applier.apply(&mut pf, "b 10 1000 1 2 3\nk 250\nd A 5.5 10\n").unwrap();
        applier.apply(&mut pf, "b 2x0 1O00 4 5 6\nk ??\nd A 5,6 11\n").unwrap();

        assert_eq!(pf.time(), 10);
        assert_eq!(pf.sums.balance, 1000);
        assert_eq!(pf.sums.buy, 4);
        assert_eq!(pf.market.index_level, Some(250.0));
        let rec = pf.registry.get("A").unwrap();
        assert_eq!(rec.common.ref_price, 5.5);
        assert_eq!(rec.common.ref_qty, 11);
    }

    #[test]
    fn test_time_never_decreases() {
        let (applier, mut pf) = setup();
        applier.apply(&mut pf, "b 100 0 0 0 0\n").unwrap();
        applier.apply(&mut pf, "b 50 0 0 0 0\n").unwrap();
        assert_eq!(pf.time(), 100);
    }

    #[test]
    fn test_option_extension_promotes() {
        let (applier, mut pf) = setup();
        let batch = format!(
            "k 250.5\nd 58J123 125 4000 {}\ne 58J123 -1 45 1 2 3 4 5 6 7 8\n",
            book_fields()
        );
        applier.apply(&mut pf, &batch).unwrap();

        let rec = pf.registry.get("58J123").unwrap();
        let terms = rec.option_terms().unwrap();
        assert_eq!(terms.kind, Some(OptionKind::Put));
        assert_eq!(terms.expiry, 45);
        assert_eq!(terms.thresholds, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        assert_eq!(rec.index_level(&pf.market), Some(250.5));
        assert_eq!(rec.common.ref_price, 125.0);
        assert_eq!(rec.common.ref_book[10], PriceQty::new(71_200, 11));

        // without the leading code, same record again: payload replaced, no re-promotion
        applier.apply(&mut pf, "d 58J123 126 4000\ne 1 46 8 7 6 5 4 3 2 1\n").unwrap();
        let terms = pf.registry.get("58J123").unwrap().option_terms().unwrap();
        assert_eq!(terms.kind, Some(OptionKind::Call));
        assert_eq!(terms.thresholds[0], 8.0);
    }

    #[test]
    fn test_short_option_record_applies_positionally() {
        let (applier, mut pf) = setup();
        applier
            .apply(&mut pf, "d 58J123 125 4000\ne 58J123 -1 45 1 2 3 4 5 6 7 8\n")
            .unwrap();
        // one threshold short: neither shape, fields taken from the start
        applier.apply(&mut pf, "d 58J123 125 4000\ne 1 46 9 9\n").unwrap();

        let terms = pf.registry.get("58J123").unwrap().option_terms().unwrap();
        assert_eq!(terms.kind, Some(OptionKind::Call));
        assert_eq!(terms.expiry, 46);
        assert_eq!(terms.thresholds, [9.0, 9.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn test_fund_extension_promotes() {
        let (applier, mut pf) = setup();
        applier.apply(&mut pf, "d 069500 35000 10\nn 069500 -0.12\n").unwrap();
        let rec = pf.registry.get("069500").unwrap();
        assert_eq!(rec.fund_terms().unwrap().nav_deviation, -0.12);

        let err = applier
            .apply(&mut pf, "d 069500 35000 10\ne 1 10 0 0 0 0 0 0 0 0\n")
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolViolation::Repromotion { .. })));
    }

    #[test]
    fn test_extension_without_cursor() {
        for (batch, tag) in [
            ("e 1 10 0 0 0 0 0 0 0 0\n", 'e'),
            ("n 0.1\n", 'n'),
            ("o 1 100 1\n", 'o'),
        ] {
            let (applier, mut pf) = setup();
            let err = applier.apply(&mut pf, batch).unwrap_err();
            assert!(matches!(
                err,
                Error::Protocol(ProtocolViolation::MissingCursor { tag: t }) if t == tag
            ));
        }
    }

    #[test]
    fn test_cursor_does_not_survive_batch() {
        let (applier, mut pf) = setup();
        applier.apply(&mut pf, "d A 1 1\n").unwrap();
        let err = applier.apply(&mut pf, "o 1 100 1\n").unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolViolation::MissingCursor { tag: 'o' })));
    }

    #[test]
    fn test_zero_quantity_is_fatal() {
        let (applier, mut pf) = setup();
        let err = applier.apply(&mut pf, "d A 1 1\no 1 100 0\n").unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolViolation::ZeroQuantity { price: 100, .. })));
    }

    #[test]
    fn test_garbled_quantity_cannot_sneak_in_zero() {
        let (applier, mut pf) = setup();
        let err = applier.apply(&mut pf, "d A 1 1\no 1 100 x\n").unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolViolation::ZeroQuantity { .. })));
    }

    #[test]
    fn test_missing_code() {
        let (applier, mut pf) = setup();
        let err = applier.apply(&mut pf, "d\n").unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolViolation::MissingCode)));
    }

    #[test]
    fn test_session_end() {
        let (applier, mut pf) = setup();
        assert_eq!(applier.apply(&mut pf, "b 23399 0 0 0 0\n").unwrap(), ApplyOutcome::Continue);
        assert_eq!(applier.apply(&mut pf, "b 23400 0 0 0 0\n").unwrap(), ApplyOutcome::SessionEnd);
    }

    #[test]
    fn test_noise_lines_and_whitespace() {
        let (applier, mut pf) = setup();
        let batch = "/*\r\n  b   5  100 0 0 0 \r\n\n?? junk\nz 1 2\n*/\n";
        applier.apply(&mut pf, batch).unwrap();
        assert_eq!(pf.time(), 5);
        assert_eq!(pf.sums.balance, 100);
    }

    #[test]
    fn test_baselines_follow_valuation() {
        let (applier, mut pf) = setup();
        applier.apply(&mut pf, "b -700 1000 0 0 0\n").unwrap();
        assert_eq!(pf.baselines.session_start, 1000);
        assert_eq!(pf.baselines.reference, 1000);

        applier.apply(&mut pf, "b 100 1500 0 0 0\n").unwrap();
        assert_eq!(pf.baselines.session_start, 1000);
        let v = ValuationEngine::evaluate(&pf);
        assert!((v.return_vs_session_start - 50.0).abs() < 1e-9);
    }
}
