//! Internal column metadata in wire form.
//!
//! This struct preserves the raw values from the DESCRIBE_INFO message. The
//! user-facing representation is `Column`.

/// Column metadata as described by the server.
#[derive(Debug, Clone)]
pub struct ColumnMetadata {
    /// Column name.
    pub name: String,
    /// Oracle data type number (raw wire value).
    pub oracle_type: u8,
    /// Charset form (1 implicit, 2 NCHAR).
    pub csfrm: u8,
    /// Numeric precision.
    pub precision: i8,
    /// Numeric scale.
    pub scale: i8,
    /// Declared maximum size.
    pub max_size: u32,
    /// Server-suggested buffer size.
    pub buffer_size: u32,
    /// Whether NULL values are allowed.
    pub nullable: bool,
    /// Object type OID, for named types.
    pub type_oid: Option<Vec<u8>>,
    /// Vector dimension count (23.4 and up).
    pub vector_dimensions: u32,
    /// Vector element format (23.4 and up).
    pub vector_format: u8,
}

impl ColumnMetadata {
    /// Create metadata with minimal information.
    pub fn new(name: String, oracle_type: u8) -> Self {
        Self {
            name,
            oracle_type,
            csfrm: 0,
            precision: 0,
            scale: 0,
            max_size: 0,
            buffer_size: 0,
            nullable: true,
            type_oid: None,
            vector_dimensions: 0,
            vector_format: 0,
        }
    }
}
