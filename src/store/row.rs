//! # Loosely-typed result rows.
//!
//! A [`Row`] is a record of column name → [`Value`]. Columns are shared between all
//! rows of one statement execution. Typed access goes through SQLite's own
//! conversion rules via [`FromSql`].

use std::sync::Arc;

use rusqlite::types::{FromSql, Value, ValueRef};

use crate::error::ResourceError;

/// One result row.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub(crate) fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Reads every column of a native row.
    pub(crate) fn read(columns: &Arc<[String]>, row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let mut values = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            values.push(row.get::<_, Value>(i)?);
        }
        Ok(Self::new(Arc::clone(columns), values))
    }

    /// Column names in statement order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Raw values in statement order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True for a row without columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw value of a named column.
    pub fn value(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    /// Converts a named column to `T`.
    ///
    /// # Errors
    /// [`ResourceError`] if the column does not exist or does not convert.
    pub fn get<T: FromSql>(&self, column: &str) -> Result<T, ResourceError> {
        let value = self
            .value(column)
            .ok_or_else(|| ResourceError::msg(format!("no such column: {column}")))?;
        Ok(T::column_result(ValueRef::from(value))?)
    }

    /// Converts the column at `index` to `T`.
    ///
    /// # Errors
    /// [`ResourceError`] if the index is out of range or does not convert.
    pub fn get_index<T: FromSql>(&self, index: usize) -> Result<T, ResourceError> {
        let value = self
            .values
            .get(index)
            .ok_or_else(|| ResourceError::msg(format!("column index out of range: {index}")))?;
        Ok(T::column_result(ValueRef::from(value))?)
    }
}
