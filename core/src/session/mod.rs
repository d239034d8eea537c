//! Execution capability consumed by compiled queries.

#[cfg(feature = "rusqlite")]
mod rusqlite;

use crate::error::Result;
use crate::prelude::*;
use crate::value::Value;

/// Result rows of one statement, every cell decoded to JSON
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<JsonValue>>,
}

impl Rows {
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Something that runs SQL text with positional parameters.
///
/// Implemented for `rusqlite::Connection` behind the `rusqlite` feature.
pub trait Session {
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Rows>;
}

impl<S: Session + ?Sized> Session for &mut S {
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Rows> {
        (**self).query(sql, params)
    }
}
