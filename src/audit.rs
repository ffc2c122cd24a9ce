//! Best-effort audit artefacts: the raw batches as received (`msg_in.log`)
//! and a per-security field dump after each batch (`vec_out.log`).
//!
//! Neither may stop a session. A sink that cannot be opened or written is
//! reported once and switched off.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::core::{BOOK_LEVELS, level_label};
use crate::portfolio::Portfolio;

pub const RAW_LOG: &str = "msg_in.log";
pub const FIELD_LOG: &str = "vec_out.log";

#[derive(Default)]
pub struct AuditLog {
    raw: Option<BufWriter<File>>,
    fields: Option<BufWriter<File>>,
}

impl AuditLog {
    /// Truncate and open both logs under `dir`.
    pub fn open(dir: &Path) -> Self {
        let open = |name: &str| match File::create(dir.join(name)) {
            Ok(f) => Some(BufWriter::new(f)),
            Err(e) => {
                tracing::warn!("Audit log {} not accessible under {}: {}", name, dir.display(), e);
                None
            }
        };
        Self {
            raw: open(RAW_LOG),
            fields: open(FIELD_LOG),
        }
    }

    /// No logging at all.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.raw.is_some() || self.fields.is_some()
    }

    /// Append a raw batch, headed by the time of its `b` record.
    pub fn log_raw(&mut self, batch: &str) {
        let header = match batch_time(batch) {
            Some(t) => format!("[t={}]\n", t),
            None => "[t=?]\n".to_string(),
        };
        write_or_disable(&mut self.raw, RAW_LOG, |w| {
            w.write_all(header.as_bytes())?;
            w.write_all(batch.as_bytes())?;
            if !batch.ends_with('\n') {
                w.write_all(b"\n")?;
            }
            w.flush()
        });
    }

    /// Dump time, reference price/quantity and reference book of every security.
    pub fn dump_fields(&mut self, pf: &Portfolio) {
        if self.fields.is_none() {
            return;
        }
        let text = render_fields(pf);
        write_or_disable(&mut self.fields, FIELD_LOG, |w| {
            w.write_all(text.as_bytes())?;
            w.flush()
        });
    }
}

fn write_or_disable(
    sink: &mut Option<BufWriter<File>>,
    name: &str,
    write: impl FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
) {
    let Some(w) = sink.as_mut() else { return };
    if let Err(e) = write(w) {
        tracing::warn!("Audit log {} write failed, disabling it: {}", name, e);
        *sink = None;
    }
}

/// Time field of the first `b` record, if any.
pub fn batch_time(batch: &str) -> Option<i32> {
    batch.lines().find_map(|line| {
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("b") => tokens.next()?.parse().ok(),
            _ => None,
        }
    })
}

fn render_fields(pf: &Portfolio) -> String {
    let time = pf.time();
    let mut out = String::new();
    let _ = writeln!(out, "[t={}]", time);
    for (code, rec) in pf.registry.iter() {
        let c = &rec.common;
        let _ = writeln!(out, "{{{}}}", code);
        let _ = writeln!(out, "t\t{:10}", time);
        let _ = writeln!(out, "pr\t{:.4e}", c.ref_price);
        let _ = writeln!(out, "qr\t{:10}", c.ref_qty);
        let _ = writeln!(out, "     \ttbpr\t\ttbqr");
        for idx in 0..BOOK_LEVELS {
            let level = c.ref_book[idx];
            let _ = writeln!(
                out,
                "[{}]\t{:10}\t{:10}",
                level_label(idx),
                level.price,
                level.quantity
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::GlobalTime;

    #[test]
    fn test_batch_time() {
        assert_eq!(batch_time("/*\nb 1234 5 6 7 8\nd A 1 1\n"), Some(1234));
        assert_eq!(batch_time("d A 1 1\n"), None);
        assert_eq!(batch_time("b x\n"), None);
    }

    #[test]
    fn test_logs_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut audit = AuditLog::open(dir.path());
        assert!(audit.is_active());

        let mut pf = Portfolio::new(GlobalTime::new(77));
        pf.registry.get_or_create("005930").common.ref_price = 71_300.0;

        audit.log_raw("b 77 0 0 0 0\nd 005930 71300 1");
        audit.dump_fields(&pf);

        let raw = std::fs::read_to_string(dir.path().join(RAW_LOG)).unwrap();
        assert_eq!(raw, "[t=77]\nb 77 0 0 0 0\nd 005930 71300 1\n");

        let fields = std::fs::read_to_string(dir.path().join(FIELD_LOG)).unwrap();
        assert!(fields.starts_with("[t=77]\n{005930}\n"));
        assert!(fields.contains("pr\t7.1300e4"));
        assert!(fields.contains("[s 1]"));
        assert!(fields.contains("[b10]"));
    }

    #[test]
    fn test_unwritable_dir_is_not_fatal() {
        let mut audit = AuditLog::open(Path::new("/nonexistent/audit/dir"));
        assert!(!audit.is_active());
        audit.log_raw("b 1 0 0 0 0\n");
        audit.dump_fields(&Portfolio::new(GlobalTime::new(0)));
    }
}
