//! Value accessors: row cursors over in-memory batches.

use crate::catalog::AttributeId;
use crate::{Result, SinkError, Tuple, TypedValue};

/// A row cursor over a column-oriented in-memory batch.
///
/// Destinations drain accessors across block boundaries, so a tuple must
/// only be consumed when the caller has a slot for it; `next_tuple`
/// advances the cursor, `is_exhausted` peeks.
pub trait ValueAccessor: Send {
    /// Number of columns each produced tuple carries.
    fn column_count(&self) -> usize;

    /// Produces the next tuple and advances, or `None` at the end.
    fn next_tuple(&mut self) -> Option<Tuple>;

    /// True once every tuple has been produced.
    fn is_exhausted(&self) -> bool;

    /// Resets the cursor to the first row.
    fn rewind(&mut self);
}

/// A column-oriented batch of values with a row cursor.
pub struct BatchValueAccessor {
    columns: Vec<Vec<TypedValue>>,
    rows: usize,
    position: usize,
}

impl BatchValueAccessor {
    /// Creates an accessor over columns of equal length.
    pub fn from_columns(columns: Vec<Vec<TypedValue>>) -> Result<Self> {
        let rows = columns.first().map_or(0, Vec::len);
        if columns.iter().any(|c| c.len() != rows) {
            return Err(SinkError::InvalidConfiguration(
                "batch columns must all have the same length".to_string(),
            ));
        }
        Ok(Self {
            columns,
            rows,
            position: 0,
        })
    }

    /// Creates an accessor from row-major tuples, transposing into
    /// columns. Every tuple must have the same arity.
    pub fn from_tuples(tuples: Vec<Tuple>) -> Result<Self> {
        let Some(first) = tuples.first() else {
            return Ok(Self {
                columns: Vec::new(),
                rows: 0,
                position: 0,
            });
        };
        let arity = first.arity();
        if tuples.iter().any(|t| t.arity() != arity) {
            return Err(SinkError::InvalidConfiguration(
                "batch tuples must all have the same arity".to_string(),
            ));
        }
        let mut columns = vec![Vec::with_capacity(tuples.len()); arity];
        for tuple in &tuples {
            for (column, value) in columns.iter_mut().zip(tuple.values()) {
                column.push(value.clone());
            }
        }
        Ok(Self {
            columns,
            rows: tuples.len(),
            position: 0,
        })
    }

    /// Total number of rows in the batch.
    pub fn row_count(&self) -> usize {
        self.rows
    }
}

impl ValueAccessor for BatchValueAccessor {
    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn next_tuple(&mut self) -> Option<Tuple> {
        if self.position >= self.rows {
            return None;
        }
        let row = self.position;
        self.position += 1;
        Some(Tuple::new(
            self.columns.iter().map(|c| c[row].clone()).collect(),
        ))
    }

    fn is_exhausted(&self) -> bool {
        self.position >= self.rows
    }

    fn rewind(&mut self) {
        self.position = 0;
    }
}

/// Adapter that reorders and selects the columns of another accessor.
///
/// `map[i]` names the source column feeding destination column `i`;
/// `None` yields null. This is how bulk loads line up an arbitrary
/// producer batch with the target relation's schema.
pub struct RemappedAccessor<'a> {
    inner: &'a mut dyn ValueAccessor,
    map: Vec<Option<AttributeId>>,
}

impl<'a> RemappedAccessor<'a> {
    /// Wraps an accessor. The map must have one entry per destination
    /// column and every named source column must exist.
    pub fn new(
        map: &[Option<AttributeId>],
        inner: &'a mut dyn ValueAccessor,
        destination_arity: usize,
    ) -> Result<Self> {
        if map.len() != destination_arity {
            return Err(SinkError::InvalidConfiguration(format!(
                "attribute map has {} entries for {} destination columns",
                map.len(),
                destination_arity
            )));
        }
        let columns = inner.column_count();
        if let Some(bad) = map.iter().flatten().find(|&&src| src >= columns) {
            return Err(SinkError::InvalidConfiguration(format!(
                "attribute map names source column {} but the accessor has {}",
                bad, columns
            )));
        }
        Ok(Self {
            inner,
            map: map.to_vec(),
        })
    }
}

impl ValueAccessor for RemappedAccessor<'_> {
    fn column_count(&self) -> usize {
        self.map.len()
    }

    fn next_tuple(&mut self) -> Option<Tuple> {
        let source = self.inner.next_tuple()?;
        Some(Tuple::new(
            self.map
                .iter()
                .map(|entry| match entry {
                    Some(src) => source.values()[*src].clone(),
                    None => TypedValue::Null,
                })
                .collect(),
        ))
    }

    fn is_exhausted(&self) -> bool {
        self.inner.is_exhausted()
    }

    fn rewind(&mut self) {
        self.inner.rewind();
    }
}
