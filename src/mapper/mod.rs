//! Result mapping from raw rows to typed records.
//!
//! Two modes are offered:
//! - [`map_rows`]: one record per row, columns assigned to same-named fields
//! - [`map_rows_accumulating`]: rows sharing their plain column values fold
//!   into one record, with designated columns collected into list, set, map
//!   or JSON fields
//!
//! Neither mode aborts on a bad row. Failures are collected as [`RowError`]s
//! next to the records that did map, and callers choose whether a partial
//! result is acceptable via [`MappedRows::into_result`].

mod accumulate;
mod coerce;
mod single;

pub use accumulate::{Accumulation, AccumulationRules, map_rows_accumulating};
pub use coerce::{coerce, parse_timestamp};
pub use single::{map_row, map_rows};

use crate::error::{DaoError, DaoResult, RowError};

/// Canonical textual timestamp form handed to records.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Records that mapped plus the errors of rows that did not.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedRows<T> {
    records: Vec<T>,
    errors: Vec<RowError>,
}

impl<T> MappedRows<T> {
    pub fn new(records: Vec<T>, errors: Vec<RowError>) -> Self {
        Self { records, errors }
    }

    pub fn records(&self) -> &[T] {
        &self.records
    }

    pub fn errors(&self) -> &[RowError] {
        &self.errors
    }

    /// True when every row mapped.
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Take the records, discarding any row errors.
    pub fn into_records(self) -> Vec<T> {
        self.records
    }

    pub fn into_parts(self) -> (Vec<T>, Vec<RowError>) {
        (self.records, self.errors)
    }

    /// The records if every row mapped, otherwise a [`DaoError::Mapping`].
    pub fn into_result(self) -> DaoResult<Vec<T>> {
        if self.errors.is_empty() {
            Ok(self.records)
        } else {
            Err(DaoError::mapping(self.errors))
        }
    }
}

impl<T> Default for MappedRows<T> {
    fn default() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

impl<T> IntoIterator for MappedRows<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}
