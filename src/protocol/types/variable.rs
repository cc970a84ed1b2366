//! Bind and define variables.
//!
//! A `Variable` holds inbound bind values or outbound column buffers. Bind
//! metadata is inferred from the first non-null value and widened in place as
//! larger values are observed; `Cursor::setinputsizes` pins it explicitly.

use crate::error::{Error, Result};
use crate::protocol::constants::*;
use crate::protocol::types::metadata::ColumnMetadata;
use crate::protocol::types::oracle_type::OracleType;
use crate::protocol::types::value::OracleValue;
use std::sync::Arc;

/// Per-value conversion applied after decoding.
pub type Converter = Arc<dyn Fn(OracleValue) -> Result<OracleValue> + Send + Sync>;

/// How a column should be fetched, overriding the default mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchType {
    /// Use the default per-type mapping.
    #[default]
    Default,
    /// Force NUMBER columns to i64 (errors on fractional values).
    Int64,
    /// Force NUMBER columns to f64.
    Double,
    /// Keep NUMBER columns as decimal strings, preserving precision.
    DecimalString,
    /// Fetch the column as a string.
    String,
    /// Fetch the column as raw bytes.
    Bytes,
}

/// Configuration returned by an output type handler for one column.
#[derive(Clone, Default)]
pub struct VarConfig {
    /// Fetch type override.
    pub fetch_type: FetchType,
    /// Optional per-value converter, applied after decoding.
    pub converter: Option<Converter>,
}

impl std::fmt::Debug for VarConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VarConfig")
            .field("fetch_type", &self.fetch_type)
            .field("converter", &self.converter.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Context handed to an output type handler for each described column.
pub struct DescribeContext<'a> {
    /// The described column.
    pub metadata: &'a ColumnMetadata,
    /// Default fetch type the driver would use.
    pub default_type: FetchType,
}

/// Output type handler: called once per column during describe. Returning
/// `None` keeps the defaults.
pub type OutputTypeHandler =
    Arc<dyn for<'a> Fn(&DescribeContext<'a>) -> Option<VarConfig> + Send + Sync>;

/// Row factory: maps each fetched row's values before they are surfaced.
pub type RowFactory =
    Arc<dyn Fn(Vec<OracleValue>) -> Result<Vec<OracleValue>> + Send + Sync>;

/// Bind direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindDirection {
    Input,
    Output,
    InputOutput,
}

impl BindDirection {
    pub(crate) fn wire_value(self) -> u8 {
        match self {
            BindDirection::Input => TNS_BIND_DIR_INPUT,
            BindDirection::Output => TNS_BIND_DIR_OUTPUT,
            BindDirection::InputOutput => TNS_BIND_DIR_INPUT_OUTPUT,
        }
    }
}

/// A bind variable: holds in-values for execution and accumulates out-values
/// for PL/SQL OUT binds and DML RETURNING.
#[derive(Debug, Clone)]
pub struct Variable {
    /// Declared type.
    pub db_type: OracleType,
    /// Buffer size in bytes; widened as larger values are observed.
    pub size: u32,
    /// Maximum number of elements for PL/SQL index-by table binds.
    pub array_size: u32,
    /// Values, one per iteration for array DML.
    pub values: Vec<OracleValue>,
    /// Out values collected from the server, one entry per iteration.
    pub out_values: Vec<Vec<OracleValue>>,
    /// Whether this is a PL/SQL array bind.
    pub is_array: bool,
    /// Bind direction.
    pub direction: BindDirection,
}

impl Variable {
    /// Create a new variable of the given type and size.
    pub fn new(db_type: OracleType, size: u32, array_size: u32) -> Self {
        Self {
            db_type,
            size,
            array_size,
            values: Vec::new(),
            out_values: Vec::new(),
            is_array: false,
            direction: BindDirection::Input,
        }
    }

    /// Create an output variable with room for `array_size` values, as used
    /// by DML RETURNING.
    pub fn for_output(db_type: OracleType, size: u32, array_size: u32) -> Self {
        Self {
            db_type,
            size,
            array_size,
            values: Vec::new(),
            out_values: Vec::new(),
            is_array: false,
            direction: BindDirection::Output,
        }
    }

    /// Infer a variable from the first non-null value of a bind position.
    pub fn infer(values: &[OracleValue]) -> Result<Self> {
        let first = values.iter().find(|v| !v.is_null());
        let (db_type, size) = match first {
            None => (OracleType::Varchar2 { max_size: 1 }, 1),
            Some(OracleValue::String(s)) => {
                let len = s.len().max(1) as u32;
                (OracleType::Varchar2 { max_size: len }, len)
            }
            Some(OracleValue::Bytes(b)) => {
                let len = b.len().max(1) as u32;
                (OracleType::Raw { max_size: len }, len)
            }
            Some(OracleValue::Number(_)) | Some(OracleValue::Integer(_)) => {
                (OracleType::Number { precision: 0, scale: 0 }, 22)
            }
            Some(OracleValue::Float(_)) => (OracleType::BinaryFloat, 4),
            Some(OracleValue::Double(_)) => (OracleType::BinaryDouble, 8),
            Some(OracleValue::Bool(_)) => (OracleType::Boolean, 4),
            Some(OracleValue::Date(_)) => (OracleType::Date, 7),
            Some(OracleValue::Timestamp(_)) => (OracleType::Timestamp, 11),
            Some(OracleValue::TimestampTz(_)) => (OracleType::TimestampTz, 13),
            Some(OracleValue::IntervalDS(_)) => (OracleType::IntervalDS, 11),
            Some(OracleValue::IntervalYM(_)) => (OracleType::IntervalYM, 5),
            Some(OracleValue::Rowid(_)) => (OracleType::Rowid, 18),
            Some(OracleValue::Lob(lob)) => {
                let t = if lob.locator.is_blob() {
                    OracleType::Blob
                } else {
                    OracleType::Clob
                };
                (t, 40)
            }
            Some(OracleValue::Json(_)) => (OracleType::Json, 0),
            Some(OracleValue::Vector(_)) => {
                (OracleType::Vector { dimensions: 0, format: 0 }, 0)
            }
            Some(OracleValue::Object(_)) => {
                return Err(Error::NotSupported {
                    feature: "binding object values",
                })
            }
            Some(OracleValue::Null) => unreachable!(),
        };

        let mut var = Self::new(db_type, size, values.len() as u32);
        var.values = values.to_vec();
        var.widen_for_values()?;
        Ok(var)
    }

    /// Widen the buffer size to cover every held value.
    pub fn widen_for_values(&mut self) -> Result<()> {
        for value in &self.values {
            let needed = match value {
                OracleValue::String(s) => s.len() as u32,
                OracleValue::Bytes(b) => b.len() as u32,
                _ => 0,
            };
            if needed > self.size {
                self.size = needed;
                match &mut self.db_type {
                    OracleType::Varchar2 { max_size }
                    | OracleType::NVarchar2 { max_size }
                    | OracleType::Char { max_size }
                    | OracleType::Raw { max_size } => *max_size = needed,
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// Check that a value is compatible with the declared type.
    pub fn check_value(&self, value: &OracleValue) -> Result<()> {
        let ok = match (&self.db_type, value) {
            (_, OracleValue::Null) => true,
            (OracleType::Varchar2 { .. }, OracleValue::String(_))
            | (OracleType::NVarchar2 { .. }, OracleValue::String(_))
            | (OracleType::Char { .. }, OracleValue::String(_))
            | (OracleType::Long, OracleValue::String(_)) => true,
            (OracleType::Raw { .. }, OracleValue::Bytes(_))
            | (OracleType::LongRaw, OracleValue::Bytes(_)) => true,
            (OracleType::Number { .. }, OracleValue::Number(_))
            | (OracleType::Number { .. }, OracleValue::Integer(_))
            | (OracleType::Number { .. }, OracleValue::Double(_))
            | (OracleType::BinaryInteger, OracleValue::Integer(_)) => true,
            (OracleType::BinaryFloat, OracleValue::Float(_))
            | (OracleType::BinaryDouble, OracleValue::Double(_)) => true,
            (OracleType::Boolean, OracleValue::Bool(_)) => true,
            (OracleType::Date, OracleValue::Date(_))
            | (OracleType::Date, OracleValue::Timestamp(_))
            | (OracleType::Timestamp, OracleValue::Timestamp(_))
            | (OracleType::Timestamp, OracleValue::Date(_))
            | (OracleType::TimestampLtz, OracleValue::Timestamp(_))
            | (OracleType::TimestampTz, OracleValue::TimestampTz(_)) => true,
            (OracleType::IntervalDS, OracleValue::IntervalDS(_))
            | (OracleType::IntervalYM, OracleValue::IntervalYM(_)) => true,
            (OracleType::Rowid, OracleValue::Rowid(_))
            | (OracleType::URowid, OracleValue::Rowid(_)) => true,
            (OracleType::Clob, OracleValue::Lob(_))
            | (OracleType::Nclob, OracleValue::Lob(_))
            | (OracleType::Blob, OracleValue::Lob(_)) => true,
            (OracleType::Clob, OracleValue::String(_))
            | (OracleType::Blob, OracleValue::Bytes(_)) => true,
            (OracleType::Json, OracleValue::Json(_)) => true,
            (OracleType::Vector { .. }, OracleValue::Vector(_)) => true,
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::type_conversion(format!(
                "value {:?} is not compatible with {}",
                value, self.db_type
            )))
        }
    }
}

/// Metadata for a column define sent with DEFINE execute options.
#[derive(Debug, Clone)]
pub struct DefineVar {
    /// Oracle data type number.
    pub ora_type_num: u8,
    /// Bind flags.
    pub flags: u8,
    /// Buffer size for this column.
    pub buffer_size: u32,
    /// Max array elements (0 when not an array).
    pub max_num_elements: u32,
    /// Continuation flags; carries the LOB prefetch flag for LOB columns.
    pub cont_flag: u64,
    /// Charset id (UTF-8 for textual columns, 0 for binary).
    pub charset_id: u16,
    /// Charset form.
    pub charset_form: u8,
    /// LOB prefetch length in bytes.
    pub lob_prefetch_length: u32,
}

impl DefineVar {
    /// Define for a regular column.
    pub fn new(ora_type_num: u8, buffer_size: u32, charset_form: u8) -> Self {
        Self {
            ora_type_num,
            flags: TNS_BIND_USE_INDICATORS as u8,
            buffer_size,
            max_num_elements: 0,
            cont_flag: 0,
            charset_id: if charset_form != 0 { TNS_CHARSET_UTF8 } else { 0 },
            charset_form,
            lob_prefetch_length: 0,
        }
    }

    /// Define for a LOB column with prefetch enabled.
    pub fn new_lob(ora_type_num: u8, buffer_size: u32, prefetch_length: u32) -> Self {
        let is_clob = ora_type_num == ORA_TYPE_NUM_CLOB as u8;
        Self {
            ora_type_num,
            flags: TNS_BIND_USE_INDICATORS as u8,
            buffer_size,
            max_num_elements: 0,
            cont_flag: TNS_LOB_PREFETCH_FLAG,
            charset_id: if is_clob { TNS_CHARSET_UTF8 } else { 0 },
            charset_form: if is_clob { TNS_CS_IMPLICIT } else { 0 },
            lob_prefetch_length: prefetch_length,
        }
    }

    /// Whether this define requests LOB prefetch.
    pub fn is_lob_prefetch(&self) -> bool {
        self.cont_flag & TNS_LOB_PREFETCH_FLAG != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_from_first_non_null() {
        let values = vec![
            OracleValue::Null,
            OracleValue::String("hello".to_string()),
            OracleValue::String("a longer string".to_string()),
        ];
        let var = Variable::infer(&values).unwrap();
        assert_eq!(var.db_type, OracleType::Varchar2 { max_size: 15 });
        assert_eq!(var.size, 15);
        assert_eq!(var.values.len(), 3);
    }

    #[test]
    fn test_infer_all_null() {
        let var = Variable::infer(&[OracleValue::Null, OracleValue::Null]).unwrap();
        assert_eq!(var.db_type, OracleType::Varchar2 { max_size: 1 });
    }

    #[test]
    fn test_infer_numeric() {
        let var = Variable::infer(&[OracleValue::Integer(25000)]).unwrap();
        assert_eq!(var.db_type, OracleType::Number { precision: 0, scale: 0 });
        assert_eq!(var.size, 22);
    }

    #[test]
    fn test_widening_adjusts_type() {
        let mut var = Variable::new(OracleType::Varchar2 { max_size: 2 }, 2, 1);
        var.values = vec![OracleValue::String("widened".to_string())];
        var.widen_for_values().unwrap();
        assert_eq!(var.size, 7);
        assert_eq!(var.db_type.max_size(), 7);
    }

    #[test]
    fn test_check_value() {
        let var = Variable::new(OracleType::Number { precision: 5, scale: 3 }, 22, 1);
        assert!(var.check_value(&OracleValue::Number("7.1".to_string())).is_ok());
        assert!(var.check_value(&OracleValue::Null).is_ok());
        assert!(var.check_value(&OracleValue::String("x".to_string())).is_err());
    }

    #[test]
    fn test_define_var_lob() {
        let var = DefineVar::new_lob(
            ORA_TYPE_NUM_CLOB as u8,
            4000,
            TNS_DEFAULT_LOB_PREFETCH_SIZE,
        );
        assert!(var.is_lob_prefetch());
        assert_eq!(var.charset_id, TNS_CHARSET_UTF8);

        let plain = DefineVar::new(ORA_TYPE_NUM_VARCHAR as u8, 100, TNS_CS_IMPLICIT);
        assert!(!plain.is_lob_prefetch());
    }
}
