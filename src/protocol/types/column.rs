//! User-facing column description types.

use crate::error::Result;

use super::metadata::ColumnMetadata;
use super::oracle_type::OracleType;

/// A column in a result set.
#[derive(Debug, Clone)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Whether NULL values are allowed.
    pub nullable: bool,
    /// Column data type.
    pub data_type: OracleType,
    /// Raw Oracle type number.
    pub oracle_type_num: u8,
    /// Numeric precision.
    pub precision: i8,
    /// Numeric scale.
    pub scale: i8,
    /// Declared maximum size.
    pub max_size: u32,
}

impl Column {
    /// Create a column from wire metadata.
    pub fn from_metadata(meta: &ColumnMetadata) -> Result<Self> {
        Ok(Self {
            name: meta.name.clone(),
            nullable: meta.nullable,
            data_type: OracleType::from_raw(
                meta.oracle_type,
                meta.csfrm,
                meta.precision,
                meta.scale,
                meta.max_size,
            )?,
            oracle_type_num: meta.oracle_type,
            precision: meta.precision,
            scale: meta.scale,
            max_size: meta.max_size,
        })
    }
}

/// Shared column information for all rows in a result set.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    /// Column definitions.
    pub columns: Vec<Column>,
}

impl ColumnInfo {
    /// Create new column info from columns.
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// Create column info from wire metadata.
    pub fn from_metadata(metadata: &[ColumnMetadata]) -> Result<Self> {
        let columns: Result<Vec<Column>> = metadata.iter().map(Column::from_metadata).collect();
        Ok(Self { columns: columns? })
    }

    /// Column names.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check if there are no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column by index.
    pub fn get(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    /// Find a column index by name (case-insensitive).
    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }
}
