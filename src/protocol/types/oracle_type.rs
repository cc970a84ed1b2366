//! Oracle data type enum with type-specific attributes.

use crate::error::{Error, Result};
use crate::protocol::constants::*;

/// Oracle data type with type-specific metadata.
///
/// Nullability is a column property, not a type property.
#[derive(Debug, Clone, PartialEq)]
pub enum OracleType {
    /// VARCHAR2(max_size).
    Varchar2 { max_size: u32 },
    /// NVARCHAR2(max_size).
    NVarchar2 { max_size: u32 },
    /// CHAR(max_size).
    Char { max_size: u32 },
    /// NUMBER(precision, scale).
    Number { precision: i8, scale: i8 },
    /// BINARY_INTEGER.
    BinaryInteger,
    /// BINARY_FLOAT.
    BinaryFloat,
    /// BINARY_DOUBLE.
    BinaryDouble,
    /// BOOLEAN.
    Boolean,
    /// LONG.
    Long,
    /// LONG RAW.
    LongRaw,
    /// RAW(max_size).
    Raw { max_size: u32 },
    /// DATE.
    Date,
    /// TIMESTAMP(fsprecision).
    Timestamp,
    /// TIMESTAMP WITH TIME ZONE.
    TimestampTz,
    /// TIMESTAMP WITH LOCAL TIME ZONE.
    TimestampLtz,
    /// INTERVAL DAY TO SECOND.
    IntervalDS,
    /// INTERVAL YEAR TO MONTH.
    IntervalYM,
    /// ROWID.
    Rowid,
    /// UROWID.
    URowid,
    /// CLOB / NCLOB (distinguished by charset form).
    Clob,
    /// NCLOB.
    Nclob,
    /// BLOB.
    Blob,
    /// BFILE.
    BFile,
    /// JSON.
    Json,
    /// VECTOR(dimensions, format).
    Vector { dimensions: u32, format: u8 },
    /// REF CURSOR.
    Cursor,
    /// Named object type.
    Object,
}

impl OracleType {
    /// Create from the raw type number and column metadata.
    pub fn from_raw(
        oracle_type: u8,
        csfrm: u8,
        precision: i8,
        scale: i8,
        max_size: u32,
    ) -> Result<Self> {
        match oracle_type as u16 {
            ORA_TYPE_NUM_VARCHAR if csfrm == TNS_CS_NCHAR => {
                Ok(OracleType::NVarchar2 { max_size })
            }
            ORA_TYPE_NUM_VARCHAR => Ok(OracleType::Varchar2 { max_size }),
            ORA_TYPE_NUM_NUMBER => Ok(OracleType::Number { precision, scale }),
            ORA_TYPE_NUM_BINARY_INTEGER => Ok(OracleType::BinaryInteger),
            ORA_TYPE_NUM_BINARY_FLOAT => Ok(OracleType::BinaryFloat),
            ORA_TYPE_NUM_BINARY_DOUBLE => Ok(OracleType::BinaryDouble),
            ORA_TYPE_NUM_BOOLEAN => Ok(OracleType::Boolean),
            ORA_TYPE_NUM_LONG => Ok(OracleType::Long),
            ORA_TYPE_NUM_LONG_RAW => Ok(OracleType::LongRaw),
            ORA_TYPE_NUM_RAW => Ok(OracleType::Raw { max_size }),
            ORA_TYPE_NUM_CHAR => Ok(OracleType::Char { max_size }),
            ORA_TYPE_NUM_DATE => Ok(OracleType::Date),
            ORA_TYPE_NUM_TIMESTAMP => Ok(OracleType::Timestamp),
            ORA_TYPE_NUM_TIMESTAMP_TZ => Ok(OracleType::TimestampTz),
            ORA_TYPE_NUM_TIMESTAMP_LTZ => Ok(OracleType::TimestampLtz),
            ORA_TYPE_NUM_INTERVAL_DS => Ok(OracleType::IntervalDS),
            ORA_TYPE_NUM_INTERVAL_YM => Ok(OracleType::IntervalYM),
            ORA_TYPE_NUM_ROWID => Ok(OracleType::Rowid),
            ORA_TYPE_NUM_UROWID => Ok(OracleType::URowid),
            ORA_TYPE_NUM_CLOB if csfrm == TNS_CS_NCHAR => Ok(OracleType::Nclob),
            ORA_TYPE_NUM_CLOB => Ok(OracleType::Clob),
            ORA_TYPE_NUM_BLOB => Ok(OracleType::Blob),
            ORA_TYPE_NUM_BFILE => Ok(OracleType::BFile),
            ORA_TYPE_NUM_JSON => Ok(OracleType::Json),
            ORA_TYPE_NUM_VECTOR => Ok(OracleType::Vector {
                dimensions: 0,
                format: 0,
            }),
            ORA_TYPE_NUM_CURSOR => Ok(OracleType::Cursor),
            ORA_TYPE_NUM_OBJECT => Ok(OracleType::Object),
            _ => Err(Error::UnsupportedType {
                type_num: oracle_type,
            }),
        }
    }

    /// The wire type number.
    pub fn type_num(&self) -> u8 {
        let num = match self {
            OracleType::Varchar2 { .. } | OracleType::NVarchar2 { .. } => ORA_TYPE_NUM_VARCHAR,
            OracleType::Number { .. } => ORA_TYPE_NUM_NUMBER,
            OracleType::BinaryInteger => ORA_TYPE_NUM_BINARY_INTEGER,
            OracleType::BinaryFloat => ORA_TYPE_NUM_BINARY_FLOAT,
            OracleType::BinaryDouble => ORA_TYPE_NUM_BINARY_DOUBLE,
            OracleType::Boolean => ORA_TYPE_NUM_BOOLEAN,
            OracleType::Long => ORA_TYPE_NUM_LONG,
            OracleType::LongRaw => ORA_TYPE_NUM_LONG_RAW,
            OracleType::Raw { .. } => ORA_TYPE_NUM_RAW,
            OracleType::Char { .. } => ORA_TYPE_NUM_CHAR,
            OracleType::Date => ORA_TYPE_NUM_DATE,
            OracleType::Timestamp => ORA_TYPE_NUM_TIMESTAMP,
            OracleType::TimestampTz => ORA_TYPE_NUM_TIMESTAMP_TZ,
            OracleType::TimestampLtz => ORA_TYPE_NUM_TIMESTAMP_LTZ,
            OracleType::IntervalDS => ORA_TYPE_NUM_INTERVAL_DS,
            OracleType::IntervalYM => ORA_TYPE_NUM_INTERVAL_YM,
            OracleType::Rowid => ORA_TYPE_NUM_ROWID,
            OracleType::URowid => ORA_TYPE_NUM_UROWID,
            OracleType::Clob | OracleType::Nclob => ORA_TYPE_NUM_CLOB,
            OracleType::Blob => ORA_TYPE_NUM_BLOB,
            OracleType::BFile => ORA_TYPE_NUM_BFILE,
            OracleType::Json => ORA_TYPE_NUM_JSON,
            OracleType::Vector { .. } => ORA_TYPE_NUM_VECTOR,
            OracleType::Cursor => ORA_TYPE_NUM_CURSOR,
            OracleType::Object => ORA_TYPE_NUM_OBJECT,
        };
        num as u8
    }

    /// Charset form for string-carrying types.
    pub fn csfrm(&self) -> u8 {
        match self {
            OracleType::NVarchar2 { .. } | OracleType::Nclob => TNS_CS_NCHAR,
            OracleType::Varchar2 { .. }
            | OracleType::Char { .. }
            | OracleType::Long
            | OracleType::Clob => TNS_CS_IMPLICIT,
            _ => 0,
        }
    }

    /// Whether values of this type arrive as LOB locators.
    pub fn is_lob(&self) -> bool {
        matches!(
            self,
            OracleType::Clob | OracleType::Nclob | OracleType::Blob | OracleType::BFile
        )
    }

    /// Precision, for NUMBER.
    pub fn precision(&self) -> i8 {
        match self {
            OracleType::Number { precision, .. } => *precision,
            _ => 0,
        }
    }

    /// Scale, for NUMBER.
    pub fn scale(&self) -> i8 {
        match self {
            OracleType::Number { scale, .. } => *scale,
            _ => 0,
        }
    }

    /// Declared maximum size, for sized types.
    pub fn max_size(&self) -> u32 {
        match self {
            OracleType::Varchar2 { max_size }
            | OracleType::NVarchar2 { max_size }
            | OracleType::Char { max_size }
            | OracleType::Raw { max_size } => *max_size,
            _ => 0,
        }
    }
}

impl std::fmt::Display for OracleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OracleType::Varchar2 { max_size } => write!(f, "VARCHAR2({})", max_size),
            OracleType::NVarchar2 { max_size } => write!(f, "NVARCHAR2({})", max_size),
            OracleType::Char { max_size } => write!(f, "CHAR({})", max_size),
            OracleType::Number { precision, scale } => {
                if *precision == 0 && *scale == 0 {
                    write!(f, "NUMBER")
                } else if *scale == 0 {
                    write!(f, "NUMBER({})", precision)
                } else {
                    write!(f, "NUMBER({},{})", precision, scale)
                }
            }
            OracleType::BinaryInteger => write!(f, "BINARY_INTEGER"),
            OracleType::BinaryFloat => write!(f, "BINARY_FLOAT"),
            OracleType::BinaryDouble => write!(f, "BINARY_DOUBLE"),
            OracleType::Boolean => write!(f, "BOOLEAN"),
            OracleType::Long => write!(f, "LONG"),
            OracleType::LongRaw => write!(f, "LONG RAW"),
            OracleType::Raw { max_size } => write!(f, "RAW({})", max_size),
            OracleType::Date => write!(f, "DATE"),
            OracleType::Timestamp => write!(f, "TIMESTAMP"),
            OracleType::TimestampTz => write!(f, "TIMESTAMP WITH TIME ZONE"),
            OracleType::TimestampLtz => write!(f, "TIMESTAMP WITH LOCAL TIME ZONE"),
            OracleType::IntervalDS => write!(f, "INTERVAL DAY TO SECOND"),
            OracleType::IntervalYM => write!(f, "INTERVAL YEAR TO MONTH"),
            OracleType::Rowid => write!(f, "ROWID"),
            OracleType::URowid => write!(f, "UROWID"),
            OracleType::Clob => write!(f, "CLOB"),
            OracleType::Nclob => write!(f, "NCLOB"),
            OracleType::Blob => write!(f, "BLOB"),
            OracleType::BFile => write!(f, "BFILE"),
            OracleType::Json => write!(f, "JSON"),
            OracleType::Vector { .. } => write!(f, "VECTOR"),
            OracleType::Cursor => write!(f, "REF CURSOR"),
            OracleType::Object => write!(f, "OBJECT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_basic_types() {
        let t = OracleType::from_raw(ORA_TYPE_NUM_VARCHAR as u8, TNS_CS_IMPLICIT, 0, 0, 100);
        assert_eq!(t.unwrap(), OracleType::Varchar2 { max_size: 100 });

        let t = OracleType::from_raw(ORA_TYPE_NUM_NUMBER as u8, 0, 10, 2, 0);
        assert_eq!(
            t.unwrap(),
            OracleType::Number {
                precision: 10,
                scale: 2
            }
        );

        let t = OracleType::from_raw(ORA_TYPE_NUM_VECTOR as u8, 0, 0, 0, 0);
        assert!(matches!(t.unwrap(), OracleType::Vector { .. }));
    }

    #[test]
    fn test_nchar_forms() {
        let t = OracleType::from_raw(ORA_TYPE_NUM_VARCHAR as u8, TNS_CS_NCHAR, 0, 0, 50).unwrap();
        assert_eq!(t, OracleType::NVarchar2 { max_size: 50 });
        assert_eq!(t.csfrm(), TNS_CS_NCHAR);

        let t = OracleType::from_raw(ORA_TYPE_NUM_CLOB as u8, TNS_CS_NCHAR, 0, 0, 0).unwrap();
        assert_eq!(t, OracleType::Nclob);
        assert!(t.is_lob());
    }

    #[test]
    fn test_from_raw_unsupported() {
        match OracleType::from_raw(255, 0, 0, 0, 0) {
            Err(Error::UnsupportedType { type_num }) => assert_eq!(type_num, 255),
            other => panic!("expected UnsupportedType, got {:?}", other),
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(
            format!("{}", OracleType::Number { precision: 10, scale: 2 }),
            "NUMBER(10,2)"
        );
        assert_eq!(
            format!("{}", OracleType::Number { precision: 0, scale: 0 }),
            "NUMBER"
        );
        assert_eq!(format!("{}", OracleType::Clob), "CLOB");
    }
}
