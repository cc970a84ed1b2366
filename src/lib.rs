//! Pure Rust Oracle database driver speaking the TTC/TNS wire protocol.
//!
//! `orathin` connects directly to the database over TCP (optionally TLS)
//! without the vendor client libraries: packet framing, the connect and
//! logon handshake, the message codecs and the cursor/fetch pipeline are
//! all implemented in Rust on tokio. A blocking presentation of the same
//! core lives in [`blocking`].
//!
//! # Example
//!
//! ```no_run
//! use orathin::{Connection, OracleValue, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let conn = Connection::connect("localhost:1521/FREEPDB1", "scott", "tiger").await?;
//!
//!     let mut cursor = conn.cursor();
//!     cursor
//!         .execute("SELECT ename, sal FROM emp WHERE deptno = :1",
//!                  &[OracleValue::Integer(10)])
//!         .await?;
//!     while let Some(row) = cursor.fetchone().await? {
//!         println!("{} earns {}", row.get(0).unwrap(), row.get(1).unwrap());
//!     }
//!
//!     conn.close().await?;
//!     Ok(())
//! }
//! ```

pub mod blocking;
pub mod connection;
pub mod cursor;
pub mod dbobject;
pub mod error;
pub mod lob;
pub mod pool;
pub mod protocol;
pub mod statement;

pub use connection::{ConnectParams, Connection, Purity};
pub use cursor::{Cursor, ExecuteManyOptions, ScrollMode};
pub use dbobject::{DbObjectAttr, DbObjectType};
pub use error::{BatchError, Error, Result};
pub use lob::Lob;
pub use pool::{GetMode, Pool, PoolParams, PooledConnection};
pub use protocol::auth::AuthMode;
pub use protocol::connect::{Address, AddressList, Description};
pub use protocol::decode::{IntervalDS, IntervalYM, JsonValue, VectorValue};
pub use protocol::transport::TlsParams;
pub use protocol::types::{
    Column, ColumnInfo, ColumnMetadata, DescribeContext, FetchType, LobLocator, LobValue,
    OracleType, OracleValue, OutputTypeHandler, Row, RowFactory, VarConfig, Variable,
};
