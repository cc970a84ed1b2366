//! Response stream parsing.
//!
//! A response is a sequence of TTC messages inside DATA packets. The parser
//! consumes exactly one message per `parse_next` call and commits its effects
//! only once that message parsed completely, so the engine can rewind to a
//! restore point on `OutOfPackets` and replay after more packets arrive.

use std::sync::Arc;

use crate::error::{BatchError, Error, Result};
use crate::protocol::buffer::ReadBuffer;
use crate::protocol::constants::*;
use crate::protocol::decode::{
    decode_binary_double, decode_binary_float, decode_date, decode_interval_ds,
    decode_interval_ym, decode_number, decode_oson, decode_timestamp, decode_timestamp_tz,
    decode_vector,
};
use crate::protocol::types::{
    ColumnInfo, ColumnMetadata, FetchType, LobLocator, LobValue, ObjectValue, OracleValue, Row,
};
use log::{debug, warn};

const ROWID_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Information extracted from the error/end-of-call message.
#[derive(Debug, Default, Clone)]
pub struct ErrorInfo {
    /// Error number (0 means success).
    pub error_num: u32,
    /// Cursor id assigned by the server.
    pub cursor_id: u16,
    /// Position in the SQL text where the error was detected.
    pub error_pos: u16,
    /// Row count for queries and DML.
    pub row_count: u64,
    /// Rowid of the affected row, for single-row DML.
    pub rowid: Option<String>,
    /// Error message, when the server sent one.
    pub message: Option<String>,
    /// Per-iteration errors collected in batch-errors mode.
    pub batch_errors: Vec<BatchError>,
    /// End-of-call status bits; `TXN_IN_PROGRESS` is the interesting one.
    pub call_status: u32,
}

impl ErrorInfo {
    /// Whether the server reported a real error (1403 "no data found" only
    /// terminates a fetch).
    pub fn is_error(&self) -> bool {
        self.error_num != 0 && self.error_num != TNS_ERR_NO_DATA_FOUND
    }

    /// Convert into a classified error.
    pub fn to_error(&self) -> Error {
        match Error::from_server(self.error_num, self.message.clone().unwrap_or_default()) {
            Error::Database { code, message, is_warning, .. } => Error::Database {
                code,
                message,
                offset: self.error_pos,
                is_warning,
            },
            other => other,
        }
    }
}

/// Bind slot description the parser needs to decode OUT bind data.
#[derive(Debug, Clone)]
pub struct OutBindSlot {
    /// Raw type number of the bind.
    pub ora_type_num: u8,
    /// Charset form.
    pub csfrm: u8,
    /// Whether the bind has an out direction.
    pub is_out: bool,
}

/// Accumulated state of one response.
#[derive(Default)]
pub struct ResponseState {
    /// Column metadata from DESCRIBE_INFO.
    pub columns: Vec<ColumnMetadata>,
    /// Shared column info for constructed rows.
    pub column_info: Option<Arc<ColumnInfo>>,
    /// Fetched rows.
    pub rows: Vec<Row>,
    /// OUT bind values: indexed by out-bind slot, then iteration.
    pub out_bind_values: Vec<Vec<Vec<OracleValue>>>,
    /// Error/end-of-call info, when seen.
    pub error_info: Option<ErrorInfo>,
    /// Warning raised by the server without failing the call.
    pub warning: Option<(u16, String)>,
    /// Server asked the client to flush withheld OUT binds.
    pub flush_out_binds: bool,
    /// Explicit end-of-response marker seen.
    pub end_of_response: bool,
    /// The codec judged the statement needs a re-parse and re-send.
    pub retry: bool,
    /// Whether more rows remain on the server.
    pub more_rows: bool,
    /// The server released the DRCP session.
    pub session_released: bool,
    /// Data returned by a LOB read operation.
    pub lob_data: Option<Vec<u8>>,
    /// Per-iteration row counts from an array DML with row counts enabled.
    pub dml_row_counts: Vec<u64>,
}

/// Hook invoked once per describe to choose per-column fetch overrides.
pub type DescribeHook = Box<dyn Fn(&[ColumnMetadata]) -> Vec<FetchType> + Send>;

/// Parser over the TTC messages of a single response.
pub struct ResponseParser {
    ttc_field_version: u8,
    server_ttc_field_version: u8,
    /// Per-column fetch overrides, parallel to `state.columns`.
    fetch_types: Vec<FetchType>,
    /// Bind slots of the request, for OUT bind decoding.
    bind_slots: Vec<OutBindSlot>,
    /// Whether following ROW_DATA messages carry OUT bind data.
    reading_out_binds: bool,
    describe_hook: Option<DescribeHook>,
    pub state: ResponseState,
}

impl ResponseParser {
    /// Create a parser for a response.
    pub fn new(ttc_field_version: u8, server_ttc_field_version: u8) -> Self {
        Self {
            ttc_field_version,
            server_ttc_field_version,
            fetch_types: Vec::new(),
            bind_slots: Vec::new(),
            reading_out_binds: false,
            describe_hook: None,
            state: ResponseState::default(),
        }
    }

    /// Install a hook that picks fetch overrides once columns are described.
    pub fn with_describe_hook(mut self, hook: DescribeHook) -> Self {
        self.describe_hook = Some(hook);
        self
    }

    /// Provide already-known column metadata (fetch on an open cursor).
    pub fn with_columns(mut self, columns: Vec<ColumnMetadata>) -> Result<Self> {
        self.state.column_info = Some(Arc::new(ColumnInfo::from_metadata(&columns)?));
        self.state.columns = columns;
        Ok(self)
    }

    /// Provide per-column fetch overrides, parallel to the described columns.
    pub fn with_fetch_types(mut self, fetch_types: Vec<FetchType>) -> Self {
        self.fetch_types = fetch_types;
        self
    }

    /// Provide the request's bind slots so OUT data can be decoded.
    pub fn with_bind_slots(mut self, bind_slots: Vec<OutBindSlot>) -> Self {
        self.bind_slots = bind_slots;
        self
    }

    /// Fetch overrides chosen for the described columns.
    pub fn fetch_types(&self) -> &[FetchType] {
        &self.fetch_types
    }

    /// Parse one message from the buffer. Returns `true` when the response
    /// is explicitly complete.
    ///
    /// On `Err(OutOfPackets)` no state has been committed; the caller rewinds
    /// the buffer and replays once another packet arrives.
    pub fn parse_next(&mut self, buf: &mut ReadBuffer) -> Result<bool> {
        let msg_type = buf.read_u8()?;
        match msg_type {
            TNS_MSG_TYPE_DESCRIBE_INFO => {
                buf.skip_raw_bytes_chunked()?;
                let columns = self.parse_describe_info(buf)?;
                self.state.column_info =
                    Some(Arc::new(ColumnInfo::from_metadata(&columns)?));
                self.state.columns = columns;
                self.fetch_types = match &self.describe_hook {
                    Some(hook) => hook(&self.state.columns),
                    None => vec![FetchType::Default; self.state.columns.len()],
                };
                Ok(false)
            }
            TNS_MSG_TYPE_ROW_HEADER => {
                self.parse_row_header(buf)?;
                self.reading_out_binds = false;
                Ok(false)
            }
            TNS_MSG_TYPE_ROW_DATA => {
                if self.reading_out_binds {
                    let values = self.parse_out_bind_row(buf)?;
                    self.state.out_bind_values.push(values);
                } else {
                    let row = self.parse_row_data(buf)?;
                    self.state.rows.push(row);
                }
                Ok(false)
            }
            TNS_MSG_TYPE_IO_VECTOR => {
                self.parse_io_vector(buf)?;
                self.reading_out_binds = true;
                Ok(false)
            }
            TNS_MSG_TYPE_ERROR => {
                let info = self.parse_error_info(buf)?;
                self.state.more_rows = info.error_num == 0;
                self.state.retry = matches!(
                    info.error_num,
                    TNS_ERR_INCONSISTENT_DATA_TYPES | TNS_ERR_VAR_NOT_IN_SELECT_LIST
                );
                self.state.error_info = Some(info);
                Ok(false)
            }
            TNS_MSG_TYPE_WARNING => {
                let warning = self.parse_warning(buf)?;
                self.state.warning = warning;
                Ok(false)
            }
            TNS_MSG_TYPE_STATUS => {
                let call_status = buf.read_ub4()?;
                let _end_to_end_seq = buf.read_ub2()?;
                let info = self.state.error_info.get_or_insert_with(ErrorInfo::default);
                info.call_status = call_status;
                Ok(false)
            }
            TNS_MSG_TYPE_PARAMETER => {
                self.parse_return_parameters(buf)?;
                Ok(false)
            }
            TNS_MSG_TYPE_BIT_VECTOR => {
                self.parse_bit_vector(buf)?;
                Ok(false)
            }
            TNS_MSG_TYPE_SERVER_SIDE_PIGGYBACK => {
                let released = self.parse_server_side_piggyback(buf)?;
                self.state.session_released |= released;
                Ok(false)
            }
            TNS_MSG_TYPE_FLUSH_OUT_BINDS => {
                self.state.flush_out_binds = true;
                Ok(false)
            }
            TNS_MSG_TYPE_LOB_DATA => {
                let data = buf.read_bytes_with_length()?.unwrap_or_default();
                match &mut self.state.lob_data {
                    Some(existing) => existing.extend_from_slice(&data),
                    None => self.state.lob_data = Some(data.to_vec()),
                }
                Ok(false)
            }
            TNS_MSG_TYPE_END_OF_RESPONSE => {
                self.state.end_of_response = true;
                Ok(true)
            }
            other => Err(Error::protocol(format!(
                "unexpected message type {} in response",
                other
            ))),
        }
    }

    fn parse_describe_info(&self, buf: &mut ReadBuffer) -> Result<Vec<ColumnMetadata>> {
        let _max_row_size = buf.read_ub4()?;
        let num_columns = buf.read_ub4()?;
        let mut columns = Vec::with_capacity(num_columns as usize);

        if num_columns > 0 {
            let _ = buf.read_u8()?; // flags
        }
        for _ in 0..num_columns {
            columns.push(self.parse_column_metadata(buf)?);
        }

        let num_bytes = buf.read_ub4()?;
        if num_bytes > 0 {
            buf.skip_raw_bytes_chunked()?;
        }
        let _ = buf.read_ub4()?; // dcbflag
        let _ = buf.read_ub4()?; // dcbmdbz
        let _ = buf.read_ub4()?; // dcbmnpr
        let _ = buf.read_ub4()?; // dcbmxpr
        let num_bytes = buf.read_ub4()?;
        if num_bytes > 0 {
            buf.skip_raw_bytes_chunked()?;
        }

        debug!("described {} columns", columns.len());
        Ok(columns)
    }

    fn parse_column_metadata(&self, buf: &mut ReadBuffer) -> Result<ColumnMetadata> {
        let oracle_type = buf.read_u8()?;
        let _flags = buf.read_u8()?;
        let precision = buf.read_u8()? as i8;
        let scale = buf.read_u8()? as i8;
        let buffer_size = buf.read_ub4()?;
        let _ = buf.read_ub4()?; // max array elements
        let _ = buf.read_ub8()?; // cont flags

        let type_oid = buf.read_bytes_with_length()?.map(|b| b.to_vec());

        let _ = buf.read_ub2()?; // version
        let _charset_id = buf.read_ub2()?;
        let csfrm = buf.read_u8()?;
        let max_size = buf.read_ub4()?;

        if self.ttc_field_version >= TNS_CCAP_FIELD_VERSION_12_2 {
            let _oaccolid = buf.read_ub4()?;
        }

        let nullable = buf.read_u8()? != 0;
        let _v7_len = buf.read_u8()?;

        let name = read_column_string(buf)?;
        let _schema = read_column_string(buf)?;
        let _type_name = read_column_string(buf)?;
        let _col_pos = buf.read_ub2()?;
        let _uds_flags = buf.read_ub4()?;

        if self.ttc_field_version >= TNS_CCAP_FIELD_VERSION_23_1 {
            let _domain_schema = read_column_string(buf)?;
            let _domain_name = read_column_string(buf)?;
        }

        if self.ttc_field_version >= TNS_CCAP_FIELD_VERSION_23_1_EXT_3 {
            let num_annotations = buf.read_ub4()?;
            if num_annotations > 0 {
                let _ = buf.read_u8()?;
                let actual_count = buf.read_ub4()?;
                let _ = buf.read_u8()?;
                for _ in 0..actual_count {
                    let _key = read_column_string(buf)?;
                    let _value = read_column_string(buf)?;
                    let _flags = buf.read_ub4()?;
                }
                let _ = buf.read_ub4()?;
            }
        }

        let (vector_dimensions, vector_format) =
            if self.ttc_field_version >= TNS_CCAP_FIELD_VERSION_23_4 {
                let dims = buf.read_ub4()?;
                let format = buf.read_u8()?;
                let _vector_flags = buf.read_u8()?;
                (dims, format)
            } else {
                (0, 0)
            };

        Ok(ColumnMetadata {
            name,
            oracle_type,
            csfrm,
            precision,
            scale,
            max_size,
            buffer_size,
            nullable,
            type_oid,
            vector_dimensions,
            vector_format,
        })
    }

    fn parse_row_header(&self, buf: &mut ReadBuffer) -> Result<()> {
        let _ = buf.read_u8()?; // flags
        let _ = buf.read_ub2()?; // num requests
        let _ = buf.read_ub4()?; // iteration number
        let _ = buf.read_ub4()?; // num iters
        let _ = buf.read_ub2()?; // buffer length

        let num_bytes = buf.read_ub4()?;
        if num_bytes > 0 {
            let _ = buf.read_u8()?; // repeated length
            buf.skip((num_bytes - 1) as usize)?;
        }

        let num_bytes = buf.read_ub4()?; // rxhrid
        if num_bytes > 0 {
            buf.skip_raw_bytes_chunked()?;
        }
        Ok(())
    }

    fn parse_row_data(&self, buf: &mut ReadBuffer) -> Result<Row> {
        let info = self
            .state
            .column_info
            .clone()
            .ok_or_else(|| Error::protocol("row data received before column metadata"))?;

        let mut values = Vec::with_capacity(self.state.columns.len());
        for (i, col) in self.state.columns.iter().enumerate() {
            let fetch_type = self.fetch_types.get(i).copied().unwrap_or_default();
            values.push(parse_column_value(buf, col, fetch_type)?);
        }
        Ok(Row::new(values, info))
    }

    fn parse_io_vector(&mut self, buf: &mut ReadBuffer) -> Result<()> {
        let _num_iters = buf.read_ub4()?;
        let num_binds = buf.read_ub2()? as usize;
        // Directions echo the request's bind metadata; the slot list from
        // the request wins when the server reports fewer entries.
        for _ in 0..num_binds {
            let _direction = buf.read_u8()?;
        }
        Ok(())
    }

    fn parse_out_bind_row(&self, buf: &mut ReadBuffer) -> Result<Vec<Vec<OracleValue>>> {
        let mut per_bind = Vec::new();
        for slot in self.bind_slots.iter().filter(|s| s.is_out) {
            let num_rows = buf.read_ub4()?;
            let mut rows = Vec::with_capacity(num_rows as usize);
            let mut meta = ColumnMetadata::new(String::new(), slot.ora_type_num);
            meta.csfrm = slot.csfrm;
            for _ in 0..num_rows {
                rows.push(parse_column_value(buf, &meta, FetchType::Default)?);
            }
            per_bind.push(rows);
        }
        Ok(per_bind)
    }

    fn parse_error_info(&self, buf: &mut ReadBuffer) -> Result<ErrorInfo> {
        let mut info = ErrorInfo {
            call_status: buf.read_ub4()?,
            ..Default::default()
        };
        let _ = buf.read_ub2()?; // end-to-end seq#
        let _ = buf.read_ub4()?; // current row number
        let _error_num_hint = buf.read_ub2()?;
        let _ = buf.read_ub2()?; // array elem error
        let _ = buf.read_ub2()?; // array elem error
        info.cursor_id = buf.read_ub2()?;
        info.error_pos = buf.read_ub2()?;
        let _ = buf.read_u8()?; // sql type
        let _ = buf.read_u8()?; // fatal flag
        let _ = buf.read_u8()?; // flags
        let _ = buf.read_u8()?; // user cursor options
        let _ = buf.read_u8()?; // UPI parameter
        let _ = buf.read_u8()?; // warning flags

        info.rowid = parse_rowid(buf)?;

        let _ = buf.read_ub4()?; // OS error
        let _ = buf.read_u8()?; // statement number
        let _ = buf.read_u8()?; // call number
        let _ = buf.read_ub2()?; // padding
        let _ = buf.read_ub4()?; // success iters

        // oerrdd (logical rowid)
        let num_bytes = buf.read_ub4()?;
        if num_bytes > 0 {
            buf.skip_raw_bytes_chunked()?;
        }

        // batch error codes
        let num_errors = buf.read_ub2()? as usize;
        let mut batch_codes = Vec::with_capacity(num_errors);
        if num_errors > 0 {
            let first_byte = buf.read_u8()?;
            for _ in 0..num_errors {
                if first_byte == TNS_LONG_LENGTH_INDICATOR {
                    let _ = buf.read_ub4()?;
                }
                batch_codes.push(buf.read_ub2()?);
            }
            if first_byte == TNS_LONG_LENGTH_INDICATOR {
                buf.skip(1)?;
            }
        }

        // batch error offsets
        let num_offsets = buf.read_ub4()? as usize;
        let mut batch_offsets = Vec::with_capacity(num_offsets);
        if num_offsets > 0 {
            let first_byte = buf.read_u8()?;
            for _ in 0..num_offsets {
                if first_byte == TNS_LONG_LENGTH_INDICATOR {
                    let _ = buf.read_ub4()?;
                }
                batch_offsets.push(buf.read_ub4()?);
            }
            if first_byte == TNS_LONG_LENGTH_INDICATOR {
                buf.skip(1)?;
            }
        }

        // batch error messages
        let num_messages = buf.read_ub2()? as usize;
        let mut batch_messages = Vec::with_capacity(num_messages);
        if num_messages > 0 {
            buf.skip(1)?; // packed size
            for _ in 0..num_messages {
                let _ = buf.read_ub2()?; // chunk length
                batch_messages.push(buf.read_str_with_length()?.unwrap_or_default());
                buf.skip(2)?; // end marker
            }
        }

        info.error_num = buf.read_ub4()?;
        info.row_count = buf.read_ub8()?;

        // 20c and up carry two extra fields, governed by the server's version.
        if self.server_ttc_field_version >= TNS_CCAP_FIELD_VERSION_20_1 {
            let _sql_type = buf.read_ub4()?;
            let _server_checksum = buf.read_ub4()?;
        }

        if info.error_num != 0 {
            info.message = buf.read_str_with_length()?;
        }

        for (i, (code, offset)) in batch_codes.iter().zip(batch_offsets.iter()).enumerate() {
            info.batch_errors.push(BatchError {
                offset: *offset,
                code: *code as u32,
                message: batch_messages.get(i).cloned().unwrap_or_default(),
            });
        }

        Ok(info)
    }

    fn parse_warning(&self, buf: &mut ReadBuffer) -> Result<Option<(u16, String)>> {
        let code = buf.read_ub2()?;
        let num_bytes = buf.read_ub2()? as usize;
        let _flags = buf.read_ub2()?;
        if code == 0 || num_bytes == 0 {
            return Ok(None);
        }
        let bytes = buf.read_bytes(num_bytes)?;
        Ok(Some((code, String::from_utf8_lossy(&bytes).to_string())))
    }

    fn parse_return_parameters(&mut self, buf: &mut ReadBuffer) -> Result<()> {
        // The out-parameter array carries per-iteration DML row counts.
        let num_params = buf.read_ub2()?;
        let mut row_counts = Vec::with_capacity(num_params as usize);
        for _ in 0..num_params {
            row_counts.push(buf.read_ub4()? as u64);
        }
        if !row_counts.is_empty() {
            self.state.dml_row_counts = row_counts;
        }

        let num_bytes = buf.read_ub2()?;
        if num_bytes > 0 {
            buf.skip(num_bytes as usize)?;
        }

        let num_pairs = buf.read_ub2()?;
        for _ in 0..num_pairs {
            let text_len = buf.read_ub2()?;
            if text_len > 0 {
                buf.skip(text_len as usize)?;
            }
            let bin_len = buf.read_ub2()?;
            if bin_len > 0 {
                buf.skip(bin_len as usize)?;
            }
            let _keyword = buf.read_ub2()?;
        }

        let num_bytes = buf.read_ub2()?;
        if num_bytes > 0 {
            buf.skip(num_bytes as usize)?;
        }
        Ok(())
    }

    fn parse_bit_vector(&self, buf: &mut ReadBuffer) -> Result<()> {
        let _num_columns_sent = buf.read_ub2()?;
        let num_bytes = self.state.columns.len().div_ceil(8);
        if num_bytes > 0 {
            buf.skip(num_bytes)?;
        }
        Ok(())
    }

    /// Returns whether the piggyback released the server session.
    fn parse_server_side_piggyback(&self, buf: &mut ReadBuffer) -> Result<bool> {
        let opcode = buf.read_u8()?;
        match opcode {
            TNS_SERVER_PIGGYBACK_SESS_RET => {
                let _sess_state = buf.read_ub4()?;
                let flags = buf.read_ub2()?;
                return Ok(flags != 0);
            }
            TNS_SERVER_PIGGYBACK_LTXID => {
                let num_bytes = buf.read_ub4()?;
                if num_bytes > 0 {
                    buf.skip_raw_bytes_chunked()?;
                }
            }
            TNS_SERVER_PIGGYBACK_AC_REPLAY_CONTEXT => {
                let _flags = buf.read_ub4()?;
                let _error_code = buf.read_ub4()?;
                let num_bytes = buf.read_ub4()?;
                if num_bytes > 0 {
                    buf.skip_raw_bytes_chunked()?;
                }
            }
            TNS_SERVER_PIGGYBACK_EXT_SYNC => {
                let num_pairs = buf.read_ub2()?;
                for _ in 0..num_pairs {
                    let key_len = buf.read_ub2()?;
                    if key_len > 0 {
                        buf.skip(key_len as usize)?;
                    }
                    let value_len = buf.read_ub4()?;
                    if value_len > 0 {
                        buf.skip_raw_bytes_chunked()?;
                    }
                }
            }
            TNS_SERVER_PIGGYBACK_SESS_SIGNATURE => {
                let num_bytes = buf.read_ub4()?;
                if num_bytes > 0 {
                    buf.skip_raw_bytes_chunked()?;
                }
            }
            other => {
                warn!("unknown server piggyback opcode {}", other);
            }
        }
        Ok(false)
    }
}

/// Decode one column value according to its metadata and fetch override.
pub fn parse_column_value(
    buf: &mut ReadBuffer,
    col: &ColumnMetadata,
    fetch_type: FetchType,
) -> Result<OracleValue> {
    match col.oracle_type as u16 {
        ORA_TYPE_NUM_CLOB | ORA_TYPE_NUM_BLOB | ORA_TYPE_NUM_BFILE => {
            let is_bfile = col.oracle_type as u16 == ORA_TYPE_NUM_BFILE;
            let is_clob = col.oracle_type as u16 == ORA_TYPE_NUM_CLOB;
            match read_lob_with_length(buf, is_bfile, is_clob)? {
                Some(lob) => Ok(OracleValue::Lob(lob)),
                None => Ok(OracleValue::Null),
            }
        }
        ORA_TYPE_NUM_JSON => match read_image_with_length(buf)? {
            Some(image) => Ok(OracleValue::Json(decode_oson(&image)?)),
            None => Ok(OracleValue::Null),
        },
        ORA_TYPE_NUM_VECTOR => match read_image_with_length(buf)? {
            Some(image) => {
                let (vector, _norm) = decode_vector(&image)?;
                Ok(OracleValue::Vector(vector))
            }
            None => Ok(OracleValue::Null),
        },
        ORA_TYPE_NUM_OBJECT => {
            let oid = col.type_oid.clone().unwrap_or_default();
            match buf.read_bytes_with_length()? {
                Some(image) => Ok(OracleValue::Object(ObjectValue {
                    type_oid: oid,
                    image: image.to_vec(),
                })),
                None => Ok(OracleValue::Null),
            }
        }
        _ => {
            let data = buf.read_bytes_with_length()?;
            match data {
                None => Ok(OracleValue::Null),
                Some(bytes) if bytes.is_empty() => Ok(OracleValue::Null),
                Some(bytes) => decode_scalar_value(&bytes, col, fetch_type),
            }
        }
    }
}

fn decode_scalar_value(
    bytes: &[u8],
    col: &ColumnMetadata,
    fetch_type: FetchType,
) -> Result<OracleValue> {
    match col.oracle_type as u16 {
        ORA_TYPE_NUM_VARCHAR | ORA_TYPE_NUM_CHAR | ORA_TYPE_NUM_LONG => match fetch_type {
            FetchType::Bytes => Ok(OracleValue::Bytes(bytes::Bytes::copy_from_slice(bytes))),
            _ => Ok(OracleValue::String(
                String::from_utf8_lossy(bytes).to_string(),
            )),
        },
        ORA_TYPE_NUM_NUMBER | ORA_TYPE_NUM_BINARY_INTEGER => {
            let text = decode_number(bytes)?;
            Ok(number_output_value(&text, col, fetch_type)?)
        }
        ORA_TYPE_NUM_BINARY_FLOAT => Ok(OracleValue::Float(decode_binary_float(bytes)?)),
        ORA_TYPE_NUM_BINARY_DOUBLE => Ok(OracleValue::Double(decode_binary_double(bytes)?)),
        ORA_TYPE_NUM_BOOLEAN => Ok(OracleValue::Bool(
            bytes.last().copied().unwrap_or_default() == 1,
        )),
        ORA_TYPE_NUM_DATE => Ok(OracleValue::Date(decode_date(bytes)?)),
        ORA_TYPE_NUM_TIMESTAMP | ORA_TYPE_NUM_TIMESTAMP_LTZ => {
            Ok(OracleValue::Timestamp(decode_timestamp(bytes)?))
        }
        ORA_TYPE_NUM_TIMESTAMP_TZ => Ok(OracleValue::TimestampTz(decode_timestamp_tz(bytes)?)),
        ORA_TYPE_NUM_INTERVAL_DS => Ok(OracleValue::IntervalDS(decode_interval_ds(bytes)?)),
        ORA_TYPE_NUM_INTERVAL_YM => Ok(OracleValue::IntervalYM(decode_interval_ym(bytes)?)),
        ORA_TYPE_NUM_RAW | ORA_TYPE_NUM_LONG_RAW => {
            Ok(OracleValue::Bytes(bytes::Bytes::copy_from_slice(bytes)))
        }
        ORA_TYPE_NUM_ROWID => {
            if bytes.len() >= 13 {
                let mut rb = ReadBuffer::from_bytes(bytes::Bytes::copy_from_slice(bytes));
                match parse_rowid(&mut rb)? {
                    Some(rowid) => Ok(OracleValue::Rowid(rowid)),
                    None => Ok(OracleValue::Null),
                }
            } else {
                Ok(OracleValue::Rowid(
                    String::from_utf8_lossy(bytes).to_string(),
                ))
            }
        }
        ORA_TYPE_NUM_UROWID => Ok(OracleValue::Rowid(
            String::from_utf8_lossy(bytes).to_string(),
        )),
        _ => Err(Error::UnsupportedType {
            type_num: col.oracle_type,
        }),
    }
}

/// Choose the output representation for a NUMBER value.
///
/// Default rule: scale 0 with precision up to 18 fetches as i64; an
/// unconstrained but integral value fetches as i64; everything else is f64.
/// Overrides pin the representation instead.
fn number_output_value(
    text: &str,
    col: &ColumnMetadata,
    fetch_type: FetchType,
) -> Result<OracleValue> {
    match fetch_type {
        FetchType::DecimalString => return Ok(OracleValue::Number(text.to_string())),
        FetchType::String => return Ok(OracleValue::String(text.to_string())),
        FetchType::Int64 => {
            return text.parse::<i64>().map(OracleValue::Integer).map_err(|_| {
                Error::type_conversion(format!("NUMBER value '{}' is not an integer", text))
            })
        }
        FetchType::Double => {
            return text.parse::<f64>().map(OracleValue::Double).map_err(|_| {
                Error::type_conversion(format!("unparseable NUMBER value '{}'", text))
            })
        }
        FetchType::Default | FetchType::Bytes => {}
    }

    if col.scale == 0 && col.precision > 0 && col.precision <= 18 {
        if let Ok(v) = text.parse::<i64>() {
            return Ok(OracleValue::Integer(v));
        }
    }
    if col.scale == 0 && col.precision == 0 {
        if let Ok(v) = text.parse::<i64>() {
            return Ok(OracleValue::Integer(v));
        }
    }
    text.parse::<f64>()
        .map(OracleValue::Double)
        .map_err(|_| Error::type_conversion(format!("unparseable NUMBER value '{}'", text)))
}

/// Read a LOB column value: prefetch length indicator, optional metadata and
/// inline data, then the locator.
pub fn read_lob_with_length(
    buf: &mut ReadBuffer,
    is_bfile: bool,
    is_clob: bool,
) -> Result<Option<LobValue>> {
    let num_bytes = buf.read_ub4()?;
    if num_bytes == 0 {
        return Ok(None);
    }

    let (size, chunk_size) = if is_bfile {
        (0u64, 0u32)
    } else {
        (buf.read_ub8()?, buf.read_ub4()?)
    };

    let has_prefetch_data = !is_bfile && num_bytes > 1;
    let prefetch_data = if has_prefetch_data {
        if is_clob {
            // Charset header ahead of the inline data.
            buf.skip(2)?;
            let _encoding = buf.read_u16_be()?;
            buf.skip(1)?;
        }
        buf.read_bytes_with_length()?
    } else {
        None
    };

    let locator_bytes = buf.read_bytes_with_length()?.unwrap_or_default();
    let locator = LobLocator::new(locator_bytes.to_vec(), size, chunk_size, !is_bfile);

    Ok(Some(match prefetch_data {
        Some(data) => LobValue::with_data(locator, data.to_vec()),
        None => LobValue::locator_only(locator),
    }))
}

/// Read a length-wrapped OSON/VECTOR image: a UB4 total length (0 for NULL)
/// followed by the chunked image bytes.
fn read_image_with_length(buf: &mut ReadBuffer) -> Result<Option<bytes::Bytes>> {
    let num_bytes = buf.read_ub4()?;
    if num_bytes == 0 {
        return Ok(None);
    }
    buf.read_bytes_with_length()
}

/// Parse a physical rowid and render it in the 18-character base-64 form.
pub fn parse_rowid(buf: &mut ReadBuffer) -> Result<Option<String>> {
    let rba = buf.read_ub4()?;
    let partition_id = buf.read_ub2()?;
    let _ = buf.read_u8()?;
    let block_num = buf.read_ub4()?;
    let slot_num = buf.read_ub2()?;

    if rba == 0 && partition_id == 0 && block_num == 0 && slot_num == 0 {
        return Ok(None);
    }
    Ok(Some(encode_rowid(rba, partition_id, block_num, slot_num)))
}

fn encode_rowid(rba: u32, partition_id: u16, block_num: u32, slot_num: u16) -> String {
    let mut out = String::with_capacity(18);
    append_base64(&mut out, rba as u64, 6);
    append_base64(&mut out, partition_id as u64, 3);
    append_base64(&mut out, block_num as u64, 6);
    append_base64(&mut out, slot_num as u64, 3);
    out
}

fn append_base64(out: &mut String, value: u64, num_chars: u32) {
    for i in (0..num_chars).rev() {
        let idx = ((value >> (i * 6)) & 0x3f) as usize;
        out.push(ROWID_ALPHABET[idx] as char);
    }
}

fn read_column_string(buf: &mut ReadBuffer) -> Result<String> {
    let indicator = buf.read_ub4()?;
    if indicator == 0 {
        return Ok(String::new());
    }
    Ok(buf.read_str_with_length()?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::buffer::WriteBuffer;
    use bytes::Bytes;

    fn meta(oracle_type: u16) -> ColumnMetadata {
        ColumnMetadata::new("C".to_string(), oracle_type as u8)
    }

    #[test]
    fn test_parse_number_column_int() {
        let mut col = meta(ORA_TYPE_NUM_NUMBER);
        col.precision = 5;
        col.scale = 0;
        // 1 with length prefix
        let mut buf = ReadBuffer::from_bytes(Bytes::from_static(&[2, 0xC1, 0x02]));
        let value = parse_column_value(&mut buf, &col, FetchType::Default).unwrap();
        assert_eq!(value, OracleValue::Integer(1));
    }

    #[test]
    fn test_parse_number_column_fractional() {
        let mut col = meta(ORA_TYPE_NUM_NUMBER);
        col.precision = 5;
        col.scale = 3;
        let mut buf = ReadBuffer::from_bytes(Bytes::from_static(&[2, 0xC0, 0x33]));
        let value = parse_column_value(&mut buf, &col, FetchType::Default).unwrap();
        assert_eq!(value, OracleValue::Double(0.5));
    }

    #[test]
    fn test_parse_number_with_decimal_override() {
        let mut col = meta(ORA_TYPE_NUM_NUMBER);
        col.precision = 5;
        col.scale = 3;
        let mut buf = ReadBuffer::from_bytes(Bytes::from_static(&[2, 0xC0, 0x33]));
        let value = parse_column_value(&mut buf, &col, FetchType::DecimalString).unwrap();
        assert_eq!(value, OracleValue::Number("0.5".to_string()));
    }

    #[test]
    fn test_parse_varchar_and_null() {
        let col = meta(ORA_TYPE_NUM_VARCHAR);
        let mut buf = ReadBuffer::from_bytes(Bytes::from_static(&[2, b'h', b'i', 0]));
        assert_eq!(
            parse_column_value(&mut buf, &col, FetchType::Default).unwrap(),
            OracleValue::String("hi".to_string())
        );
        assert_eq!(
            parse_column_value(&mut buf, &col, FetchType::Default).unwrap(),
            OracleValue::Null
        );
    }

    #[test]
    fn test_parse_json_column() {
        use crate::protocol::decode::{encode_oson, JsonValue};
        let image = encode_oson(&JsonValue::Object(vec![(
            "k".to_string(),
            JsonValue::Int(1),
        )]))
        .unwrap();

        let mut wbuf = WriteBuffer::new();
        wbuf.write_ub4(image.len() as u32);
        wbuf.write_bytes_with_length(&image);
        let mut buf = ReadBuffer::from_bytes(wbuf.freeze());

        let col = meta(ORA_TYPE_NUM_JSON);
        match parse_column_value(&mut buf, &col, FetchType::Default).unwrap() {
            OracleValue::Json(JsonValue::Object(fields)) => {
                assert_eq!(fields[0].0, "k");
            }
            other => panic!("expected JSON object, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_lob_column_with_prefetch() {
        let mut wbuf = WriteBuffer::new();
        wbuf.write_ub4(2); // present, with inline data
        wbuf.write_ub8(11); // size
        wbuf.write_ub4(8192); // chunk size
        wbuf.write_bytes_with_length(b"Hello, LOB!");
        wbuf.write_bytes_with_length(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let mut buf = ReadBuffer::from_bytes(wbuf.freeze());

        let lob = read_lob_with_length(&mut buf, false, false).unwrap().unwrap();
        assert!(lob.has_data());
        assert_eq!(lob.locator.size, 11);
        assert_eq!(lob.locator.chunk_size, 8192);
        assert_eq!(lob.as_bytes(), Some(b"Hello, LOB!".as_slice()));
    }

    #[test]
    fn test_parse_lob_null() {
        let mut buf = ReadBuffer::from_bytes(Bytes::from_static(&[0]));
        assert!(read_lob_with_length(&mut buf, false, false).unwrap().is_none());
    }

    #[test]
    fn test_parse_bfile_locator_only() {
        let mut wbuf = WriteBuffer::new();
        wbuf.write_ub4(1);
        wbuf.write_bytes_with_length(&[9, 9, 9]);
        let mut buf = ReadBuffer::from_bytes(wbuf.freeze());

        let lob = read_lob_with_length(&mut buf, true, false).unwrap().unwrap();
        assert!(!lob.locator.has_metadata);
        assert!(!lob.has_data());
    }

    #[test]
    fn test_rowid_rendering() {
        assert_eq!(encode_rowid(0, 0, 0, 1).len(), 18);
        let rendered = encode_rowid(16000, 4, 100, 1);
        assert_eq!(rendered.len(), 18);
        // Zero value renders as all 'A'.
        assert_eq!(encode_rowid(0, 0, 0, 0), "A".repeat(18));
    }

    #[test]
    fn test_out_of_packets_is_resumable() {
        // A varchar value split across two packets.
        let col = meta(ORA_TYPE_NUM_VARCHAR);
        let mut buf = ReadBuffer::new();
        buf.push_chunk(Bytes::from_static(&[5, b'a', b'b']));

        let point = buf.save();
        let err = parse_column_value(&mut buf, &col, FetchType::Default).unwrap_err();
        assert!(err.is_out_of_packets());

        buf.restore(point);
        buf.push_chunk(Bytes::from_static(&[b'c', b'd', b'e']));
        assert_eq!(
            parse_column_value(&mut buf, &col, FetchType::Default).unwrap(),
            OracleValue::String("abcde".to_string())
        );
    }
}
