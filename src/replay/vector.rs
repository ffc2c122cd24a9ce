//! Generic fixed-width numeric records.

use std::str::FromStr;

use super::{RecordDecoder, expect_fields, parse_field};
use crate::core::{Error, Result};

/// Decodes exactly `n_fields` values of `T` per record; the latest record wins.
#[derive(Debug, Clone)]
pub struct VectorDecoder<T> {
    n_fields: usize,
    cur: Vec<T>,
    last: Vec<T>,
}

impl<T: Clone + Default> VectorDecoder<T> {
    /// A decoder for records of exactly `n_fields` values. Zero is rejected.
    pub fn new(n_fields: usize) -> Result<Self> {
        if n_fields == 0 {
            return Err(Error::Config(
                "vector decoder needs at least one field".into(),
            ));
        }
        Ok(Self {
            n_fields,
            cur: vec![T::default(); n_fields],
            last: vec![T::default(); n_fields],
        })
    }

    pub fn get(&self, pos: usize) -> Option<&T> {
        self.last.get(pos)
    }

    pub fn values(&self) -> &[T] {
        &self.last
    }
}

impl<T: FromStr + Clone + Default> RecordDecoder for VectorDecoder<T> {
    fn decode(
        &mut self,
        fields: &[&str],
        _first_of_tick: bool,
    ) -> std::result::Result<(), String> {
        expect_fields(fields, self.n_fields)?;
        for (i, slot) in self.cur.iter_mut().enumerate() {
            *slot = parse_field(fields, i, "value")?;
        }
        Ok(())
    }

    fn commit(&mut self) {
        self.last.clone_from(&self.cur);
    }
}
