//! Time-gated replay of archived, tab-separated market data.
//!
//! A [`TimeGatedReader`] owns a line source and a [`RecordDecoder`]. Each call
//! to [`TimeGatedReader::advance_time`] consumes every record stamped at or
//! before the target and leaves the first later record buffered. Records that
//! share a tick accumulate in the decoder's current buffer; the buffer is
//! committed once a later tick (or end of input) is observed, so the committed
//! snapshots depend only on the source and the final target, never on how the
//! advances were chunked.

pub mod book;
pub mod trade;
pub mod vector;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::core::{Error, GlobalTime, Result, txt_to_time};

pub use book::{BookDecoder, ReferenceBookDecoder};
pub use trade::{TradeDecoder, TradeTick};
pub use vector::VectorDecoder;

/// Variant-specific half of a replay reader.
pub trait RecordDecoder {
    /// Decode the fields after the time token into the current buffer.
    /// `first_of_tick` is set for the first record of a new tick.
    ///
    /// An `Err` carries the reason and is fatal for the reader.
    fn decode(&mut self, fields: &[&str], first_of_tick: bool) -> std::result::Result<(), String>;

    /// Move the current buffer into the committed snapshot.
    fn commit(&mut self);
}

struct Pending {
    time: i32,
    line: String,
    line_no: usize,
}

pub struct TimeGatedReader<D> {
    source: Box<dyn BufRead + Send>,
    decoder: D,
    pending: Option<Pending>,
    /// Tick of the current buffer
    tick: Option<i32>,
    /// Current buffer holds records not yet committed
    dirty: bool,
    line_no: usize,
    delay: i32,
    exhausted: bool,
    halted: bool,
    /// Look-ahead failure, raised on the next advance
    deferred: Option<Error>,
    clock: Option<GlobalTime>,
}

impl<D: RecordDecoder> TimeGatedReader<D> {
    /// Open a replay file.
    pub fn open(path: impl AsRef<Path>, decoder: D) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        tracing::debug!("Opened replay source {}", path.display());
        Ok(Self::from_reader(BufReader::new(file), decoder))
    }

    /// Replay from any buffered source.
    pub fn from_reader(source: impl BufRead + Send + 'static, decoder: D) -> Self {
        Self {
            source: Box::new(source),
            decoder,
            pending: None,
            tick: None,
            dirty: false,
            line_no: 0,
            delay: 0,
            exhausted: false,
            halted: false,
            deferred: None,
            clock: None,
        }
    }

    /// Withhold each record for `delay` seconds after its timestamp.
    pub fn set_delay(&mut self, delay: i32) {
        self.delay = delay;
    }

    /// Publish every committed tick to `clock`.
    pub fn attach_clock(&mut self, clock: GlobalTime) {
        self.clock = Some(clock);
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    pub fn decoder_mut(&mut self) -> &mut D {
        &mut self.decoder
    }

    /// Tick of the most recently decoded record.
    pub fn time(&self) -> Option<i32> {
        self.tick
    }

    /// End of input reached and everything committed.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted && self.pending.is_none()
    }

    /// Consume records up to and including `target` (minus the delay).
    /// Returns the number of records decoded.
    ///
    /// A malformed record halts the reader for good. A bad line read ahead of
    /// a completed tick does not cost that tick: it is committed and the
    /// failure is returned by the next call.
    pub fn advance_time(&mut self, target: i32) -> Result<usize> {
        if self.halted {
            return Err(Error::ReaderHalted);
        }
        if let Some(e) = self.deferred.take() {
            self.halted = true;
            return Err(e);
        }
        let result = self.advance_inner(target.saturating_sub(self.delay));
        if result.is_err() {
            self.halted = true;
        }
        result
    }

    fn advance_inner(&mut self, gate: i32) -> Result<usize> {
        let mut decoded = 0;
        if self.pending.is_none() && !self.exhausted {
            self.pending = self.read_next()?;
        }

        while let Some(next) = self.pending.take_if(|p| p.time <= gate) {
            if let Some(t) = self.tick
                && next.time < t
            {
                return Err(Error::format(
                    next.line_no,
                    format!("time {} precedes {}", next.time, t),
                ));
            }
            let first_of_tick = self.tick != Some(next.time);
            let fields: Vec<&str> = next
                .line
                .split('\t')
                .skip(1)
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .collect();
            self.decoder
                .decode(&fields, first_of_tick)
                .map_err(|reason| Error::format(next.line_no, reason))?;
            self.tick = Some(next.time);
            self.dirty = true;
            decoded += 1;

            // the tick just decoded is complete whatever the next line holds
            match self.read_next() {
                Ok(pending) => self.pending = pending,
                Err(e) => {
                    self.commit();
                    self.deferred = Some(e);
                    break;
                }
            }
            let same_tick = matches!(&self.pending, Some(p) if p.time == next.time);
            if !same_tick {
                self.commit();
            }
        }
        Ok(decoded)
    }

    fn commit(&mut self) {
        if !self.dirty {
            return;
        }
        self.decoder.commit();
        self.dirty = false;
        if let (Some(clock), Some(t)) = (&self.clock, self.tick) {
            clock.advance_to(t);
        }
    }

    /// Read the next non-blank line and its time token.
    fn read_next(&mut self) -> Result<Option<Pending>> {
        if self.exhausted {
            return Ok(None);
        }
        let mut line = String::new();
        loop {
            line.clear();
            if self.source.read_line(&mut line)? == 0 {
                self.exhausted = true;
                return Ok(None);
            }
            self.line_no += 1;
            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed.trim().is_empty() {
                continue;
            }
            let token = trimmed.split('\t').next().unwrap_or_default().trim();
            let txt: i32 = token.parse().map_err(|_| {
                Error::format(self.line_no, format!("invalid time token '{}'", token))
            })?;
            return Ok(Some(Pending {
                time: txt_to_time(txt),
                line: trimmed.to_string(),
                line_no: self.line_no,
            }));
        }
    }
}

/// Parse one numeric field, naming it in the failure reason.
pub(crate) fn parse_field<T: std::str::FromStr>(
    fields: &[&str],
    idx: usize,
    name: &str,
) -> std::result::Result<T, String> {
    let raw = fields.get(idx).ok_or_else(|| format!("missing field {}", name))?;
    raw.parse()
        .map_err(|_| format!("invalid {} '{}'", name, raw))
}

/// Require an exact field count.
pub(crate) fn expect_fields(fields: &[&str], n: usize) -> std::result::Result<(), String> {
    if fields.len() != n {
        return Err(format!("expected {} fields, got {}", n, fields.len()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Keeps every committed tick's values for inspection.
    #[derive(Default)]
    struct Recording {
        cur: Vec<i64>,
        commits: Vec<Vec<i64>>,
    }

    impl RecordDecoder for Recording {
        fn decode(
            &mut self,
            fields: &[&str],
            first_of_tick: bool,
        ) -> std::result::Result<(), String> {
            if first_of_tick {
                self.cur.clear();
            }
            self.cur.push(parse_field(fields, 0, "value")?);
            Ok(())
        }

        fn commit(&mut self) {
            self.commits.push(self.cur.clone());
        }
    }

    fn reader(text: &str) -> TimeGatedReader<Recording> {
        TimeGatedReader::from_reader(Cursor::new(text.to_string()), Recording::default())
    }

    const SOURCE: &str = "090010\t1\n090010\t2\n090011\t3\n\n090015\t4\n";

    #[test]
    fn test_leaves_later_record_buffered() {
        let mut r = reader(SOURCE);
        assert_eq!(r.advance_time(10).unwrap(), 2);
        assert_eq!(r.decoder().commits, vec![vec![1, 2]]);
        assert_eq!(r.time(), Some(10));

        assert_eq!(r.advance_time(14).unwrap(), 1);
        assert_eq!(r.decoder().commits, vec![vec![1, 2], vec![3]]);
        assert!(!r.is_exhausted());

        assert_eq!(r.advance_time(100).unwrap(), 1);
        assert_eq!(r.decoder().commits.last(), Some(&vec![4]));
        assert!(r.is_exhausted());
        assert_eq!(r.advance_time(200).unwrap(), 0);
        assert_eq!(r.decoder().commits.len(), 3);
    }

    #[test]
    fn test_target_before_first_record() {
        let mut r = reader(SOURCE);
        assert_eq!(r.advance_time(5).unwrap(), 0);
        assert!(r.decoder().commits.is_empty());
        assert_eq!(r.time(), None);
    }

    #[test]
    fn test_delay_withholds_records() {
        let mut r = reader(SOURCE);
        r.set_delay(3);
        assert_eq!(r.advance_time(12).unwrap(), 0);
        assert_eq!(r.advance_time(13).unwrap(), 2);
    }

    #[test]
    fn test_malformed_record_halts() {
        let mut r = reader("090010\t1\n090011\tx\n090012\t3\n");
        let err = r.advance_time(100).unwrap_err();
        assert!(matches!(err, Error::Format { line: 2, .. }));
        assert_eq!(r.decoder().commits, vec![vec![1]]);
        assert!(matches!(r.advance_time(100), Err(Error::ReaderHalted)));
    }

    #[test]
    fn test_bad_time_token_after_tick_commits_first() {
        let mut r = reader("090010\t1\nBAD\t2\n");
        assert_eq!(r.advance_time(10).unwrap(), 1);
        assert_eq!(r.decoder().commits, vec![vec![1]]);
        assert_eq!(r.time(), Some(10));

        assert!(matches!(r.advance_time(20), Err(Error::Format { line: 2, .. })));
        assert!(matches!(r.advance_time(20), Err(Error::ReaderHalted)));
        assert_eq!(r.decoder().commits, vec![vec![1]]);
    }

    #[test]
    fn test_bad_time_token_is_fatal() {
        let mut r = reader("9h00\t1\n");
        assert!(matches!(r.advance_time(100), Err(Error::Format { line: 1, .. })));
    }

    #[test]
    fn test_time_going_backwards_is_fatal() {
        let mut r = reader("090010\t1\n090005\t2\n");
        assert!(matches!(r.advance_time(100), Err(Error::Format { line: 2, .. })));
    }

    #[test]
    fn test_commits_publish_to_clock() {
        let clock = GlobalTime::new(-600);
        let mut r = reader(SOURCE);
        r.attach_clock(clock.clone());
        r.advance_time(11).unwrap();
        assert_eq!(clock.load(), 11);
    }

    mod chunking {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn split_advance_matches_single_advance(
                ticks in proptest::collection::vec((0i32..30, 0i64..1000), 0..40),
                split in 0i32..40,
                end in 0i32..40,
            ) {
                let mut ticks = ticks;
                ticks.sort_by_key(|(t, _)| *t);
                let text: String = ticks
                    .iter()
                    .map(|(t, v)| format!("{}\t{}\n", 90_000 + t, v))
                    .collect();

                let mut once = reader(&text);
                once.advance_time(end).unwrap();

                let mut twice = reader(&text);
                twice.advance_time(split.min(end)).unwrap();
                twice.advance_time(end).unwrap();

                prop_assert_eq!(&once.decoder().commits, &twice.decoder().commits);
                prop_assert_eq!(once.time(), twice.time());
            }
        }
    }
}
