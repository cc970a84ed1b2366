//! Wire-facing data types.

pub mod column;
pub mod lob;
pub mod metadata;
pub mod oracle_type;
pub mod row;
pub mod value;
pub mod variable;

pub use column::{Column, ColumnInfo};
pub use lob::{LobLocator, LobValue};
pub use metadata::ColumnMetadata;
pub use oracle_type::OracleType;
pub use row::Row;
pub use value::{ObjectValue, OracleValue};
pub use variable::{
    BindDirection, Converter, DefineVar, DescribeContext, FetchType, OutputTypeHandler,
    RowFactory, VarConfig, Variable,
};
