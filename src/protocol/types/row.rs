//! Row type for query results.

use std::sync::Arc;

use super::column::{Column, ColumnInfo};
use super::value::OracleValue;

/// A row of query results.
#[derive(Debug, Clone)]
pub struct Row {
    values: Vec<OracleValue>,
    /// Shared column information.
    column_info: Arc<ColumnInfo>,
}

impl Row {
    /// Create a new row with values and shared column info.
    pub fn new(values: Vec<OracleValue>, column_info: Arc<ColumnInfo>) -> Self {
        Self {
            values,
            column_info,
        }
    }

    /// Value by column index (0-based).
    pub fn get(&self, index: usize) -> Option<&OracleValue> {
        self.values.get(index)
    }

    /// Value by column name (case-insensitive).
    pub fn get_by_name(&self, name: &str) -> Option<&OracleValue> {
        self.column_info
            .find_by_name(name)
            .and_then(|idx| self.values.get(idx))
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// All values.
    pub fn values(&self) -> &[OracleValue] {
        &self.values
    }

    /// Take ownership of all values.
    pub fn into_values(self) -> Vec<OracleValue> {
        self.values
    }

    /// Column information.
    pub fn columns(&self) -> &[Column] {
        &self.column_info.columns
    }

    /// Shared column info handle, for rebuilding rows with mapped values.
    pub fn shared_columns(&self) -> Arc<ColumnInfo> {
        self.column_info.clone()
    }

    /// Column names.
    pub fn column_names(&self) -> Vec<&str> {
        self.column_info.column_names()
    }

    /// Iterate over values.
    pub fn iter(&self) -> impl Iterator<Item = &OracleValue> {
        self.values.iter()
    }
}

impl IntoIterator for Row {
    type Item = OracleValue;
    type IntoIter = std::vec::IntoIter<OracleValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl<'a> IntoIterator for &'a Row {
    type Item = &'a OracleValue;
    type IntoIter = std::slice::Iter<'a, OracleValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::metadata::ColumnMetadata;

    fn make_test_column_info() -> Arc<ColumnInfo> {
        let mut name = ColumnMetadata::new("NAME".to_string(), 1);
        name.max_size = 100;
        let id = ColumnMetadata::new("VALUE".to_string(), 2);
        Arc::new(ColumnInfo::from_metadata(&[name, id]).unwrap())
    }

    #[test]
    fn test_row_access() {
        let row = Row::new(
            vec![
                OracleValue::String("test".to_string()),
                OracleValue::Integer(42),
            ],
            make_test_column_info(),
        );

        assert_eq!(row.len(), 2);
        assert_eq!(row.get(0), Some(&OracleValue::String("test".to_string())));
        assert_eq!(row.get_by_name("value"), Some(&OracleValue::Integer(42)));
        assert_eq!(row.get_by_name("VALUE"), row.get_by_name("value"));
        assert_eq!(row.get_by_name("missing"), None);
    }

    #[test]
    fn test_row_columns() {
        let row = Row::new(
            vec![OracleValue::Null, OracleValue::Null],
            make_test_column_info(),
        );
        assert_eq!(row.columns().len(), 2);
        assert_eq!(row.column_names(), vec!["NAME", "VALUE"]);
    }
}
