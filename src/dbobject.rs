//! Object type descriptors and the per-connection type cache.
//!
//! Type metadata is fetched with dictionary queries through the ordinary
//! cursor pipeline and cached by `(schema, package, name)`. Attribute order
//! is stable once a type is cached; applications bind and fetch by that
//! order. Nested object references resolve lazily on access.

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::protocol::types::{OracleType, OracleValue};
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

/// Cache key for a described type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeKey {
    pub schema: String,
    pub package: Option<String>,
    pub name: String,
}

/// One attribute of an object type.
#[derive(Debug, Clone)]
pub struct DbObjectAttr {
    pub name: String,
    pub db_type: OracleType,
    /// Referenced object type, for attributes of object types. Resolved
    /// lazily via `Connection::gettype`.
    pub type_ref: Option<TypeKey>,
}

/// A described object type.
#[derive(Debug, Clone)]
pub struct DbObjectType {
    pub schema: String,
    pub package: Option<String>,
    pub name: String,
    /// 16-byte type OID.
    pub oid: Vec<u8>,
    pub is_collection: bool,
    /// Element type for collections.
    pub element_type: Option<OracleType>,
    /// Attributes in server order.
    pub attributes: Vec<DbObjectAttr>,
}

impl DbObjectType {
    /// Fully qualified name.
    pub fn full_name(&self) -> String {
        match &self.package {
            Some(pkg) => format!("{}.{}.{}", self.schema, pkg, self.name),
            None => format!("{}.{}", self.schema, self.name),
        }
    }
}

/// Per-connection cache of described types.
#[derive(Default)]
pub struct TypeCache {
    entries: HashMap<TypeKey, Arc<DbObjectType>>,
}

impl TypeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &TypeKey) -> Option<Arc<DbObjectType>> {
        self.entries.get(key).cloned()
    }

    pub fn put(&mut self, key: TypeKey, value: Arc<DbObjectType>) {
        self.entries.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse `NAME`, `SCHEMA.NAME` or `SCHEMA.PACKAGE.NAME` into a cache key.
/// The schema defaults to the session user.
pub(crate) fn parse_type_name(name: &str, default_schema: &str) -> Result<TypeKey> {
    let parts: Vec<&str> = name.split('.').collect();
    let key = match parts.as_slice() {
        [name] => TypeKey {
            schema: default_schema.to_uppercase(),
            package: None,
            name: name.to_uppercase(),
        },
        [schema, name] => TypeKey {
            schema: schema.to_uppercase(),
            package: None,
            name: name.to_uppercase(),
        },
        [schema, package, name] => TypeKey {
            schema: schema.to_uppercase(),
            package: Some(package.to_uppercase()),
            name: name.to_uppercase(),
        },
        _ => {
            return Err(Error::interface(format!(
                "invalid type name '{}'",
                name
            )))
        }
    };
    if key.name.is_empty() || key.schema.is_empty() {
        return Err(Error::interface(format!("invalid type name '{}'", name)));
    }
    Ok(key)
}

/// Map a dictionary type name to the driver type.
fn attr_db_type(
    type_owner: Option<&str>,
    type_name: &str,
    length: u32,
    precision: i8,
    scale: i8,
) -> (OracleType, Option<TypeKey>) {
    if let Some(owner) = type_owner {
        // Owned types are object references.
        return (
            OracleType::Object,
            Some(TypeKey {
                schema: owner.to_string(),
                package: None,
                name: type_name.to_string(),
            }),
        );
    }
    let db_type = match type_name {
        "VARCHAR2" => OracleType::Varchar2 { max_size: length },
        "NVARCHAR2" => OracleType::NVarchar2 { max_size: length },
        "CHAR" | "NCHAR" => OracleType::Char { max_size: length },
        "NUMBER" | "INTEGER" | "FLOAT" | "DECIMAL" => OracleType::Number { precision, scale },
        "BINARY_FLOAT" => OracleType::BinaryFloat,
        "BINARY_DOUBLE" => OracleType::BinaryDouble,
        "DATE" => OracleType::Date,
        "RAW" => OracleType::Raw { max_size: length },
        "CLOB" => OracleType::Clob,
        "NCLOB" => OracleType::Nclob,
        "BLOB" => OracleType::Blob,
        "BFILE" => OracleType::BFile,
        "JSON" => OracleType::Json,
        "BOOLEAN" => OracleType::Boolean,
        "ROWID" => OracleType::Rowid,
        name if name.starts_with("TIMESTAMP") && name.contains("LOCAL") => {
            OracleType::TimestampLtz
        }
        name if name.starts_with("TIMESTAMP") && name.contains("TIME ZONE") => {
            OracleType::TimestampTz
        }
        name if name.starts_with("TIMESTAMP") => OracleType::Timestamp,
        name if name.starts_with("INTERVAL DAY") => OracleType::IntervalDS,
        name if name.starts_with("INTERVAL YEAR") => OracleType::IntervalYM,
        _ => OracleType::Varchar2 { max_size: length },
    };
    (db_type, None)
}

/// Fetch a type descriptor, consulting the connection's cache first.
pub(crate) async fn get_type(conn: &Connection, name: &str) -> Result<Arc<DbObjectType>> {
    let default_schema = conn
        .session_param("AUTH_SC_USER")
        .unwrap_or_else(|| "SYS".to_string());
    let key = parse_type_name(name, &default_schema)?;

    if let Ok(cache) = conn.inner().type_cache.lock() {
        if let Some(cached) = cache.get(&key) {
            return Ok(cached);
        }
    }

    debug!("describing type {}.{}", key.schema, key.name);
    let described = describe_type(conn, &key).await?;
    let described = Arc::new(described);
    if let Ok(mut cache) = conn.inner().type_cache.lock() {
        cache.put(key, described.clone());
    }
    Ok(described)
}

async fn describe_type(conn: &Connection, key: &TypeKey) -> Result<DbObjectType> {
    let mut cursor = conn.cursor();

    // Header: OID and collection flag.
    cursor
        .execute(
            "select rawtohex(type_oid), typecode from all_types \
             where owner = :1 and type_name = :2",
            &[
                OracleValue::String(key.schema.clone()),
                OracleValue::String(key.name.clone()),
            ],
        )
        .await?;
    let header = cursor.fetchone().await?.ok_or_else(|| {
        Error::interface(format!("type {}.{} does not exist", key.schema, key.name))
    })?;

    let oid = header
        .get(0)
        .and_then(|v| v.as_str())
        .and_then(crate::protocol::crypto::hex_to_bytes)
        .unwrap_or_default();
    let typecode = header
        .get(1)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let is_collection = typecode.contains("COLLECTION");

    let mut object_type = DbObjectType {
        schema: key.schema.clone(),
        package: key.package.clone(),
        name: key.name.clone(),
        oid,
        is_collection,
        element_type: None,
        attributes: Vec::new(),
    };

    if is_collection {
        cursor
            .execute(
                "select elem_type_owner, elem_type_name, length, precision, scale \
                 from all_coll_types where owner = :1 and type_name = :2",
                &[
                    OracleValue::String(key.schema.clone()),
                    OracleValue::String(key.name.clone()),
                ],
            )
            .await?;
        if let Some(row) = cursor.fetchone().await? {
            let owner = row.get(0).and_then(|v| v.as_str()).map(str::to_string);
            let type_name = row
                .get(1)
                .and_then(|v| v.as_str())
                .unwrap_or("VARCHAR2")
                .to_string();
            let length = row.get(2).and_then(|v| v.to_i64()).unwrap_or(0) as u32;
            let precision = row.get(3).and_then(|v| v.to_i64()).unwrap_or(0) as i8;
            let scale = row.get(4).and_then(|v| v.to_i64()).unwrap_or(0) as i8;
            let (db_type, _) =
                attr_db_type(owner.as_deref(), &type_name, length, precision, scale);
            object_type.element_type = Some(db_type);
        }
    } else {
        cursor
            .execute(
                "select attr_name, attr_type_owner, attr_type_name, length, precision, scale \
                 from all_type_attrs where owner = :1 and type_name = :2 order by attr_no",
                &[
                    OracleValue::String(key.schema.clone()),
                    OracleValue::String(key.name.clone()),
                ],
            )
            .await?;
        for row in cursor.fetchall().await? {
            let attr_name = row
                .get(0)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let owner = row.get(1).and_then(|v| v.as_str()).map(str::to_string);
            let type_name = row
                .get(2)
                .and_then(|v| v.as_str())
                .unwrap_or("VARCHAR2")
                .to_string();
            let length = row.get(3).and_then(|v| v.to_i64()).unwrap_or(0) as u32;
            let precision = row.get(4).and_then(|v| v.to_i64()).unwrap_or(0) as i8;
            let scale = row.get(5).and_then(|v| v.to_i64()).unwrap_or(0) as i8;
            let (db_type, type_ref) =
                attr_db_type(owner.as_deref(), &type_name, length, precision, scale);
            object_type.attributes.push(DbObjectAttr {
                name: attr_name,
                db_type,
                type_ref,
            });
        }
    }

    Ok(object_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_type_name_forms() {
        let key = parse_type_name("udt_point", "SCOTT").unwrap();
        assert_eq!(key.schema, "SCOTT");
        assert_eq!(key.name, "UDT_POINT");
        assert!(key.package.is_none());

        let key = parse_type_name("hr.udt_address", "SCOTT").unwrap();
        assert_eq!(key.schema, "HR");
        assert_eq!(key.name, "UDT_ADDRESS");

        let key = parse_type_name("hr.pkg_geo.udt_point", "SCOTT").unwrap();
        assert_eq!(key.package.as_deref(), Some("PKG_GEO"));

        assert!(parse_type_name("a.b.c.d", "SCOTT").is_err());
    }

    #[test]
    fn test_attr_db_type_mapping() {
        let (t, r) = attr_db_type(None, "VARCHAR2", 30, 0, 0);
        assert_eq!(t, OracleType::Varchar2 { max_size: 30 });
        assert!(r.is_none());

        let (t, _) = attr_db_type(None, "NUMBER", 0, 9, 2);
        assert_eq!(t, OracleType::Number { precision: 9, scale: 2 });

        let (t, _) = attr_db_type(None, "TIMESTAMP(6) WITH TIME ZONE", 0, 0, 0);
        assert_eq!(t, OracleType::TimestampTz);

        let (t, r) = attr_db_type(Some("HR"), "UDT_ADDRESS", 0, 0, 0);
        assert_eq!(t, OracleType::Object);
        assert_eq!(r.unwrap().name, "UDT_ADDRESS");
    }

    #[test]
    fn test_type_cache() {
        let mut cache = TypeCache::new();
        let key = parse_type_name("scott.udt_point", "SCOTT").unwrap();
        assert!(cache.get(&key).is_none());
        cache.put(
            key.clone(),
            Arc::new(DbObjectType {
                schema: "SCOTT".to_string(),
                package: None,
                name: "UDT_POINT".to_string(),
                oid: vec![0; 16],
                is_collection: false,
                element_type: None,
                attributes: Vec::new(),
            }),
        );
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key).unwrap().full_name(), "SCOTT.UDT_POINT");
    }
}
