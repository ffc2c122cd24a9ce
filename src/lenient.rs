//! Soft-fail decoding of live protocol fields.
//!
//! The live wire occasionally carries garbled numeric fields. Such a field
//! leaves its destination untouched and processing continues; this is
//! distinct from a replay [`Error::Format`](crate::core::Error::Format), which
//! is always fatal.

use std::str::FromStr;

/// Outcome of decoding one field under the lenient policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldParse {
    Applied,
    /// Token did not convert; destination keeps its previous value
    Retained,
}

/// Convert `token` into `dst`, or leave `dst` as it was.
pub fn parse_or_retain<T: FromStr>(dst: &mut T, token: &str) -> FieldParse {
    match token.parse() {
        Ok(v) => {
            *dst = v;
            FieldParse::Applied
        }
        Err(_) => {
            tracing::trace!("Retaining previous value for unparsable field '{}'", token);
            FieldParse::Retained
        }
    }
}
