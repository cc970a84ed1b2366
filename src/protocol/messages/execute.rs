//! Execute message: parse, bind, execute, describe and fetch in one call.
//!
//! The function-code bitmap chooses the phases a single round trip performs.
//! Queries send parse+execute+fetch; DML adds binds and iteration counts;
//! cache hits reuse the server cursor id and drop the parse phase.

use crate::error::{Error, Result};
use crate::protocol::constants::*;
use crate::protocol::decode::{
    encode_binary_double, encode_binary_float, encode_date, encode_interval_ds,
    encode_interval_ym, encode_number, encode_oson, encode_timestamp, encode_timestamp_tz,
    encode_vector,
};
use crate::protocol::message::{
    bytes_with_length_wire_size, ub2_wire_size, ub4_wire_size, ub8_wire_size, DataMessage,
    Message, WriteExt,
};
use crate::protocol::types::{BindDirection, DefineVar, OracleType, OracleValue, Variable};

/// Bind metadata sent ahead of the bind value rows.
#[derive(Debug, Clone)]
struct BindMeta {
    ora_type_num: u8,
    flags: u8,
    buffer_size: u32,
    max_num_elements: u32,
    cont_flag: u64,
    charset_id: u16,
    charset_form: u8,
    is_out: bool,
}

/// Execute message for a SQL statement.
pub struct ExecuteMessage<'a> {
    /// SQL text (UTF-8). Empty when reusing a server cursor.
    pub sql_bytes: &'a [u8],
    /// Server cursor id; 0 requests a parse.
    pub cursor_id: u32,
    sequence_number: u8,
    /// Whether the statement is a query.
    pub is_query: bool,
    /// Whether the statement is a PL/SQL block.
    pub is_plsql: bool,
    /// Parse/describe without executing.
    pub parse_only: bool,
    /// Rows delivered with the execute response.
    pub prefetch_rows: u32,
    /// Negotiated TTC field version.
    pub ttc_field_version: u8,
    /// Column defines, for define-and-fetch round trips.
    pub defines: Option<&'a [DefineVar]>,
    /// Iteration count; above 1 for array DML.
    pub num_iters: u32,
    /// Collect per-iteration errors instead of aborting.
    pub batch_errors: bool,
    /// Request per-iteration DML row counts.
    pub dml_rowcounts: bool,
    /// Commit in the same round trip.
    pub autocommit: bool,
    binds: Vec<BindMeta>,
    /// Encoded bind values, one buffer per iteration.
    bind_rows: Vec<Vec<u8>>,
}

impl<'a> ExecuteMessage<'a> {
    /// Execute message for a SELECT with no binds.
    pub fn new_query(sql: &'a str, prefetch_rows: u32, ttc_field_version: u8) -> Self {
        Self::new(sql.as_bytes(), 0, true, false, prefetch_rows, ttc_field_version)
    }

    /// General execute message.
    pub fn new(
        sql_bytes: &'a [u8],
        cursor_id: u32,
        is_query: bool,
        is_plsql: bool,
        prefetch_rows: u32,
        ttc_field_version: u8,
    ) -> Self {
        Self {
            sql_bytes,
            cursor_id,
            sequence_number: 1,
            is_query,
            is_plsql,
            parse_only: false,
            prefetch_rows,
            ttc_field_version,
            defines: None,
            num_iters: 1,
            batch_errors: false,
            dml_rowcounts: false,
            autocommit: false,
            binds: Vec::new(),
            bind_rows: Vec::new(),
        }
    }

    /// Define-and-fetch round trip on an existing cursor.
    pub fn new_define(
        cursor_id: u32,
        defines: &'a [DefineVar],
        prefetch_rows: u32,
        ttc_field_version: u8,
    ) -> Self {
        let mut msg = Self::new(&[], cursor_id, true, false, prefetch_rows, ttc_field_version);
        msg.sequence_number = 2;
        msg.defines = Some(defines);
        msg
    }

    /// Attach bind variables, encoding one value row per iteration.
    pub fn set_binds(
        &mut self,
        variables: &[Variable],
        num_iters: u32,
        batch_errors: bool,
        dml_rowcounts: bool,
    ) -> Result<()> {
        self.num_iters = num_iters.max(1);
        self.batch_errors = batch_errors;
        self.dml_rowcounts = dml_rowcounts;
        self.binds.clear();
        self.bind_rows.clear();

        for var in variables {
            let is_out = !matches!(var.direction, BindDirection::Input);
            let mut flags = TNS_BIND_USE_INDICATORS as u8;
            if var.is_array {
                flags |= TNS_BIND_ARRAY as u8;
            }
            self.binds.push(BindMeta {
                ora_type_num: var.db_type.type_num(),
                flags,
                buffer_size: var.size.max(1),
                max_num_elements: if var.is_array { var.array_size } else { 0 },
                cont_flag: if var.db_type.is_lob() { TNS_LOB_PREFETCH_FLAG } else { 0 },
                charset_id: if var.db_type.csfrm() != 0 { TNS_CHARSET_UTF8 } else { 0 },
                charset_form: var.db_type.csfrm(),
                is_out,
            });
        }

        for iter_num in 0..self.num_iters as usize {
            let mut row = Vec::new();
            row.write_u8(TNS_MSG_TYPE_ROW_DATA);
            for var in variables {
                if matches!(var.direction, BindDirection::Output) {
                    continue;
                }
                let value = var.values.get(iter_num).unwrap_or(&OracleValue::Null);
                encode_bind_value(&var.db_type, value, &mut row)?;
            }
            self.bind_rows.push(row);
        }
        Ok(())
    }

    /// Whether any bind metadata is attached.
    pub fn has_binds(&self) -> bool {
        !self.binds.is_empty()
    }

    fn calc_options(&self) -> u32 {
        let mut options: u32 = 0;
        if self.defines.is_some() {
            options |= TNS_EXEC_OPTION_DEFINE;
        } else if !self.parse_only {
            options |= TNS_EXEC_OPTION_EXECUTE;
        }
        if self.cursor_id == 0 {
            options |= TNS_EXEC_OPTION_PARSE;
        }
        if self.parse_only {
            options |= TNS_EXEC_OPTION_DESCRIBE;
        }
        if self.is_query && self.prefetch_rows > 0 && self.defines.is_none() {
            options |= TNS_EXEC_OPTION_FETCH;
        }
        if !self.binds.is_empty() {
            options |= TNS_EXEC_OPTION_BIND;
        }
        if self.is_plsql {
            if !self.binds.is_empty() {
                options |= TNS_EXEC_OPTION_PLSQL_BIND;
            }
        } else if !self.parse_only {
            options |= TNS_EXEC_OPTION_NOT_PLSQL;
        }
        if self.batch_errors {
            options |= TNS_EXEC_OPTION_BATCH_ERRORS;
        }
        if self.autocommit && !self.is_query {
            options |= TNS_EXEC_OPTION_COMMIT;
        }
        options
    }

    fn calc_exec_flags(&self) -> u32 {
        let mut exec_flags: u32 = 0;
        if self.is_query && !self.sql_bytes.is_empty() && !self.parse_only {
            exec_flags |= TNS_EXEC_FLAGS_IMPLICIT_RESULTSET;
        }
        if self.dml_rowcounts {
            exec_flags |= TNS_EXEC_FLAGS_DML_ROWCOUNTS;
        }
        exec_flags
    }

    /// Iteration count for al8i4[1].
    fn execution_count(&self) -> u32 {
        if self.is_query {
            if self.cursor_id == 0 { 0 } else { self.prefetch_rows }
        } else {
            self.num_iters
        }
    }

    fn metadata_entry_wire_size(
        &self,
        buffer_size: u32,
        max_num_elements: u32,
        cont_flag: u64,
        charset_id: u16,
        lob_prefetch_length: u32,
    ) -> usize {
        let mut size = 0;
        size += 4; // type, flags, precision, scale
        size += ub4_wire_size(buffer_size);
        size += ub4_wire_size(max_num_elements);
        size += ub8_wire_size(cont_flag);
        size += ub4_wire_size(0); // OID
        size += ub2_wire_size(0); // version
        size += ub2_wire_size(charset_id);
        size += 1; // charset form
        size += ub4_wire_size(lob_prefetch_length);
        if self.ttc_field_version >= TNS_CCAP_FIELD_VERSION_12_2 {
            size += ub4_wire_size(0); // oaccolid
        }
        size
    }

    fn write_metadata_entry(
        &self,
        buf: &mut Vec<u8>,
        ora_type_num: u8,
        flags: u8,
        buffer_size: u32,
        max_num_elements: u32,
        cont_flag: u64,
        charset_id: u16,
        charset_form: u8,
        lob_prefetch_length: u32,
    ) {
        buf.write_u8(ora_type_num);
        buf.write_u8(flags);
        buf.write_u8(0); // precision
        buf.write_u8(0); // scale
        buf.write_ub4(buffer_size);
        buf.write_ub4(max_num_elements);
        buf.write_ub8(cont_flag);
        buf.write_ub4(0); // OID
        buf.write_ub2(0); // version
        buf.write_ub2(charset_id);
        buf.write_u8(charset_form);
        buf.write_ub4(lob_prefetch_length);
        if self.ttc_field_version >= TNS_CCAP_FIELD_VERSION_12_2 {
            buf.write_ub4(0); // oaccolid
        }
    }

    fn defines_wire_size(&self) -> usize {
        match self.defines {
            Some(vars) => vars
                .iter()
                .map(|v| {
                    self.metadata_entry_wire_size(
                        v.buffer_size,
                        v.max_num_elements,
                        v.cont_flag,
                        v.charset_id,
                        v.lob_prefetch_length,
                    )
                })
                .sum(),
            None => 0,
        }
    }

    fn binds_wire_size(&self) -> usize {
        let meta: usize = self
            .binds
            .iter()
            .map(|b| {
                self.metadata_entry_wire_size(
                    b.buffer_size,
                    b.max_num_elements,
                    b.cont_flag,
                    b.charset_id,
                    0,
                )
            })
            .sum();
        let rows: usize = self.bind_rows.iter().map(Vec::len).sum();
        meta + rows
    }
}

impl Message for ExecuteMessage<'_> {
    fn wire_size(&self) -> usize {
        let sql_len = self.sql_bytes.len();
        let is_new_cursor = self.cursor_id == 0;

        let mut size = 0;
        size += 3; // message type, function code, sequence number
        if self.ttc_field_version >= TNS_CCAP_FIELD_VERSION_23_1_EXT_1 {
            size += 1; // token counter
        }

        size += ub4_wire_size(self.calc_options());
        size += ub4_wire_size(self.cursor_id);

        size += 1; // SQL pointer
        size += ub4_wire_size(if is_new_cursor { sql_len as u32 } else { 0 });

        size += 1; // al8i4 pointer
        size += ub4_wire_size(13); // al8i4 array length

        size += 1; // al8o4 pointer
        size += 1; // al8o4l pointer

        size += ub4_wire_size(0); // prefetch buffer size
        size += ub4_wire_size(self.prefetch_rows);
        size += ub4_wire_size(TNS_MAX_LONG_LENGTH);

        size += 1; // binds pointer
        size += ub4_wire_size(self.binds.len() as u32);

        size += 5; // al8app, al8txn, al8txl, al8kv, al8kvl pointers

        size += 1; // al8doac pointer
        let num_defines = self.defines.map_or(0, |v| v.len() as u32);
        size += ub4_wire_size(num_defines);

        size += ub4_wire_size(0); // registration id
        size += 1; // al8objlist pointer
        size += 1; // al8objlen pointer
        size += 1; // al8blv pointer
        size += ub4_wire_size(0); // al8blvl
        size += 1; // al8dnam pointer
        size += ub4_wire_size(0); // al8dnaml
        size += ub4_wire_size(0); // al8regid_msb

        size += 1; // al8pidmlrc pointer
        size += ub4_wire_size(if self.dml_rowcounts { self.num_iters } else { 0 });
        size += 1; // al8pidmlrcl pointer

        if self.ttc_field_version >= TNS_CCAP_FIELD_VERSION_12_2 {
            size += 1; // al8sqlsig pointer
            size += ub4_wire_size(0); // SQL signature length
            size += 1; // SQL ID pointer
            size += ub4_wire_size(0); // SQL ID size
            size += 1; // SQL ID length pointer
            if self.ttc_field_version >= TNS_CCAP_FIELD_VERSION_12_2_EXT1 {
                size += 1; // chunk ids pointer
                size += ub4_wire_size(0); // num chunk ids
            }
        }

        if is_new_cursor {
            size += bytes_with_length_wire_size(sql_len);
        }

        // al8i4 array
        size += ub4_wire_size(if is_new_cursor { 1 } else { 0 });
        size += ub4_wire_size(self.execution_count());
        size += ub4_wire_size(0) * 3;
        size += ub4_wire_size(0) * 2; // SCN
        size += ub4_wire_size(if self.is_query { 1 } else { 0 });
        size += ub4_wire_size(0);
        size += ub4_wire_size(self.calc_exec_flags());
        size += ub4_wire_size(0) * 3;

        size += self.defines_wire_size();
        size += self.binds_wire_size();

        size
    }

    fn write_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        let sql_len = self.sql_bytes.len();
        let is_new_cursor = self.cursor_id == 0;

        buf.write_u8(TNS_MSG_TYPE_FUNCTION);
        buf.write_u8(TNS_FUNC_EXECUTE);
        buf.write_u8(self.sequence_number);
        if self.ttc_field_version >= TNS_CCAP_FIELD_VERSION_23_1_EXT_1 {
            buf.write_u8(0); // token counter
        }

        buf.write_ub4(self.calc_options());
        buf.write_ub4(self.cursor_id);

        if is_new_cursor {
            buf.write_u8(1); // has SQL
            buf.write_ub4(sql_len as u32);
        } else {
            buf.write_u8(0);
            buf.write_ub4(0);
        }

        buf.write_u8(1); // al8i4 pointer
        buf.write_ub4(13); // al8i4 array length

        buf.write_u8(0); // al8o4 pointer
        buf.write_u8(0); // al8o4l pointer

        buf.write_ub4(0); // prefetch buffer size
        buf.write_ub4(self.prefetch_rows);
        buf.write_ub4(TNS_MAX_LONG_LENGTH);

        if self.binds.is_empty() {
            buf.write_u8(0);
            buf.write_ub4(0);
        } else {
            buf.write_u8(1);
            buf.write_ub4(self.binds.len() as u32);
        }

        buf.write_u8(0); // al8app
        buf.write_u8(0); // al8txn
        buf.write_u8(0); // al8txl
        buf.write_u8(0); // al8kv
        buf.write_u8(0); // al8kvl

        if let Some(defines) = self.defines {
            buf.write_u8(1);
            buf.write_ub4(defines.len() as u32);
        } else {
            buf.write_u8(0);
            buf.write_ub4(0);
        }

        buf.write_ub4(0); // registration id
        buf.write_u8(0); // al8objlist pointer
        buf.write_u8(1); // al8objlen pointer
        buf.write_u8(0); // al8blv pointer
        buf.write_ub4(0); // al8blvl
        buf.write_u8(0); // al8dnam pointer
        buf.write_ub4(0); // al8dnaml
        buf.write_ub4(0); // al8regid_msb

        if self.dml_rowcounts {
            buf.write_u8(1);
            buf.write_ub4(self.num_iters);
            buf.write_u8(1);
        } else {
            buf.write_u8(0);
            buf.write_ub4(0);
            buf.write_u8(0);
        }

        if self.ttc_field_version >= TNS_CCAP_FIELD_VERSION_12_2 {
            buf.write_u8(0); // al8sqlsig pointer
            buf.write_ub4(0); // SQL signature length
            buf.write_u8(0); // SQL ID pointer
            buf.write_ub4(0); // SQL ID size
            buf.write_u8(0); // SQL ID length pointer
            if self.ttc_field_version >= TNS_CCAP_FIELD_VERSION_12_2_EXT1 {
                buf.write_u8(0); // chunk ids pointer
                buf.write_ub4(0); // num chunk ids
            }
        }

        if is_new_cursor {
            buf.write_bytes_with_length(self.sql_bytes);
        }

        // al8i4 array
        buf.write_ub4(if is_new_cursor { 1 } else { 0 });
        buf.write_ub4(self.execution_count());
        buf.write_ub4(0);
        buf.write_ub4(0);
        buf.write_ub4(0);
        buf.write_ub4(0); // SCN
        buf.write_ub4(0);
        buf.write_ub4(if self.is_query { 1 } else { 0 });
        buf.write_ub4(0);
        buf.write_ub4(self.calc_exec_flags());
        buf.write_ub4(0); // fetch orientation
        buf.write_ub4(0); // fetch pos
        buf.write_ub4(0);

        if let Some(defines) = self.defines {
            for var in defines {
                self.write_metadata_entry(
                    buf,
                    var.ora_type_num,
                    var.flags,
                    var.buffer_size,
                    var.max_num_elements,
                    var.cont_flag,
                    var.charset_id,
                    var.charset_form,
                    var.lob_prefetch_length,
                );
            }
        }

        for bind in &self.binds {
            let mut flags = bind.flags;
            if bind.is_out {
                flags |= TNS_BIND_DIR_OUTPUT;
            }
            self.write_metadata_entry(
                buf,
                bind.ora_type_num,
                flags,
                bind.buffer_size,
                bind.max_num_elements,
                bind.cont_flag,
                bind.charset_id,
                bind.charset_form,
                0,
            );
        }
        for row in &self.bind_rows {
            buf.write_bytes(row);
        }

        Ok(())
    }
}

impl DataMessage for ExecuteMessage<'_> {}

/// Encode a single bind value in the wire form its declared type uses.
pub fn encode_bind_value(
    db_type: &OracleType,
    value: &OracleValue,
    buf: &mut Vec<u8>,
) -> Result<()> {
    match value {
        OracleValue::Null => buf.write_u8(0),
        OracleValue::String(s) => buf.write_bytes_with_length(s.as_bytes()),
        OracleValue::Bytes(b) => buf.write_bytes_with_length(b),
        OracleValue::Integer(v) => match db_type {
            OracleType::BinaryDouble => {
                buf.write_bytes_with_length(&encode_binary_double(*v as f64))
            }
            _ => buf.write_bytes_with_length(&encode_number(&v.to_string())?),
        },
        OracleValue::Number(s) => buf.write_bytes_with_length(&encode_number(s)?),
        OracleValue::Float(v) => buf.write_bytes_with_length(&encode_binary_float(*v)),
        OracleValue::Double(v) => match db_type {
            OracleType::Number { .. } => {
                buf.write_bytes_with_length(&encode_number(&format!("{}", v))?)
            }
            _ => buf.write_bytes_with_length(&encode_binary_double(*v)),
        },
        OracleValue::Bool(v) => buf.write_bytes_with_length(&[u8::from(*v)]),
        OracleValue::Date(dt) => buf.write_bytes_with_length(&encode_date(dt)),
        OracleValue::Timestamp(dt) => buf.write_bytes_with_length(&encode_timestamp(dt)),
        OracleValue::TimestampTz(dt) => buf.write_bytes_with_length(&encode_timestamp_tz(dt)),
        OracleValue::IntervalDS(iv) => buf.write_bytes_with_length(&encode_interval_ds(iv)),
        OracleValue::IntervalYM(iv) => buf.write_bytes_with_length(&encode_interval_ym(iv)),
        OracleValue::Rowid(s) => buf.write_bytes_with_length(s.as_bytes()),
        OracleValue::Lob(lob) => {
            buf.write_ub4(lob.locator.locator.len() as u32);
            buf.write_bytes_with_length(&lob.locator.locator);
        }
        OracleValue::Json(json) => {
            let image = encode_oson(json)?;
            buf.write_ub4(image.len() as u32);
            buf.write_bytes_with_length(&image);
        }
        OracleValue::Vector(vector) => {
            let image = encode_vector(vector, false)?;
            buf.write_ub4(image.len() as u32);
            buf.write_bytes_with_length(&image);
        }
        OracleValue::Object(_) => {
            return Err(Error::NotSupported {
                feature: "binding object values",
            })
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_wire_size() {
        let msg = ExecuteMessage::new_query("SELECT 1 FROM DUAL", 100, 12);
        let mut buf = Vec::with_capacity(msg.wire_size());
        msg.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), msg.wire_size());
    }

    #[test]
    fn test_query_options() {
        let msg = ExecuteMessage::new_query("SELECT 1 FROM DUAL", 100, 12);
        let options = msg.calc_options();
        assert!(options & TNS_EXEC_OPTION_PARSE != 0);
        assert!(options & TNS_EXEC_OPTION_EXECUTE != 0);
        assert!(options & TNS_EXEC_OPTION_FETCH != 0);
        assert!(options & TNS_EXEC_OPTION_NOT_PLSQL != 0);
        assert!(options & TNS_EXEC_OPTION_BIND == 0);
    }

    #[test]
    fn test_reexecute_drops_parse() {
        let msg = ExecuteMessage::new(&[], 7, true, false, 50, 12);
        let options = msg.calc_options();
        assert!(options & TNS_EXEC_OPTION_PARSE == 0);
        assert!(options & TNS_EXEC_OPTION_EXECUTE != 0);
        assert_eq!(msg.execution_count(), 50);
    }

    #[test]
    fn test_defines_wire_size() {
        let defines = vec![
            DefineVar::new(ORA_TYPE_NUM_VARCHAR as u8, 100, 1),
            DefineVar::new_lob(ORA_TYPE_NUM_CLOB as u8, 4000, TNS_DEFAULT_LOB_PREFETCH_SIZE),
        ];
        let msg = ExecuteMessage::new_define(1, &defines, 100, 12);

        let options = msg.calc_options();
        assert!(options & TNS_EXEC_OPTION_DEFINE != 0);
        assert!(options & TNS_EXEC_OPTION_PARSE == 0);
        assert!(options & TNS_EXEC_OPTION_FETCH == 0);

        let mut buf = Vec::with_capacity(msg.wire_size());
        msg.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), msg.wire_size());
    }

    #[test]
    fn test_binds_wire_size() {
        let mut var = Variable::infer(&[OracleValue::Integer(25000)]).unwrap();
        var.values = vec![OracleValue::Integer(25000)];
        let mut svar =
            Variable::infer(&[OracleValue::String("Sales".to_string())]).unwrap();
        svar.values = vec![OracleValue::String("Sales".to_string())];

        let mut msg = ExecuteMessage::new(
            b"INSERT INTO dept VALUES (:1, :2)",
            0,
            false,
            false,
            0,
            12,
        );
        msg.set_binds(&[var, svar], 1, false, false).unwrap();

        let options = msg.calc_options();
        assert!(options & TNS_EXEC_OPTION_BIND != 0);

        let mut buf = Vec::with_capacity(msg.wire_size());
        msg.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), msg.wire_size());
    }

    #[test]
    fn test_array_dml_with_batch_errors() {
        let mut var = Variable::infer(&[
            OracleValue::Integer(70),
            OracleValue::Integer(70),
            OracleValue::Integer(80),
        ])
        .unwrap();
        var.array_size = 3;

        let mut msg =
            ExecuteMessage::new(b"INSERT INTO t VALUES (:1)", 0, false, false, 0, 12);
        msg.set_binds(&[var], 3, true, true).unwrap();

        assert!(msg.calc_options() & TNS_EXEC_OPTION_BATCH_ERRORS != 0);
        assert!(msg.calc_exec_flags() & TNS_EXEC_FLAGS_DML_ROWCOUNTS != 0);
        assert_eq!(msg.execution_count(), 3);
        assert_eq!(msg.bind_rows.len(), 3);

        let mut buf = Vec::with_capacity(msg.wire_size());
        msg.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), msg.wire_size());
    }

    #[test]
    fn test_plsql_options() {
        let mut var = Variable::infer(&[OracleValue::Integer(1)]).unwrap();
        var.direction = BindDirection::InputOutput;
        let mut msg = ExecuteMessage::new(
            b"BEGIN :1 := :1 + 1; END;",
            0,
            false,
            true,
            0,
            12,
        );
        msg.set_binds(&[var], 1, false, false).unwrap();

        let options = msg.calc_options();
        assert!(options & TNS_EXEC_OPTION_PLSQL_BIND != 0);
        assert!(options & TNS_EXEC_OPTION_NOT_PLSQL == 0);

        let mut buf = Vec::with_capacity(msg.wire_size());
        msg.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), msg.wire_size());
    }

    #[test]
    fn test_out_bind_values_not_written() {
        let out_var = Variable::for_output(OracleType::Number { precision: 0, scale: 0 }, 22, 3);
        let mut msg = ExecuteMessage::new(
            b"DELETE FROM c WHERE p = :1 RETURNING id INTO :2",
            0,
            false,
            false,
            0,
            12,
        );
        let mut in_var = Variable::infer(&[OracleValue::Integer(20)]).unwrap();
        in_var.values = vec![OracleValue::Integer(20)];
        msg.set_binds(&[in_var.clone(), out_var], 1, false, false).unwrap();

        let mut with_out = Vec::new();
        msg.write_to(&mut with_out).unwrap();
        assert_eq!(with_out.len(), msg.wire_size());

        // A pure OUT bind adds metadata but no value bytes.
        let mut msg_in_only =
            ExecuteMessage::new(b"DELETE FROM c WHERE p = :1", 0, false, false, 0, 12);
        msg_in_only.set_binds(&[in_var], 1, false, false).unwrap();
        assert_eq!(
            msg.bind_rows.iter().map(Vec::len).sum::<usize>(),
            msg_in_only.bind_rows.iter().map(Vec::len).sum::<usize>()
        );
    }

    #[test]
    fn test_token_counter_above_23_1() {
        let msg = ExecuteMessage::new_query("SELECT 1 FROM DUAL", 10, TNS_CCAP_FIELD_VERSION_23_4);
        let mut buf = Vec::with_capacity(msg.wire_size());
        msg.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), msg.wire_size());
    }
}
