//! Data types negotiation message.
//!
//! Sent after the Protocol exchange; advertises the client charsets, the
//! capability vectors, and every type/conversion pair the driver will use.

use crate::error::Result;
use crate::protocol::constants::*;
use crate::protocol::message::{bytes_with_length_wire_size, DataMessage, Message, WriteExt};

/// Type/conversion pairs advertised to the server. Each entry is the client
/// type number and the server representation it converts to.
const DATA_TYPES: &[(u16, u16)] = &[
    (ORA_TYPE_NUM_VARCHAR, ORA_TYPE_NUM_VARCHAR),
    (ORA_TYPE_NUM_NUMBER, ORA_TYPE_NUM_NUMBER),
    (ORA_TYPE_NUM_BINARY_INTEGER, ORA_TYPE_NUM_BINARY_INTEGER),
    (ORA_TYPE_NUM_LONG, ORA_TYPE_NUM_LONG),
    (ORA_TYPE_NUM_ROWID, ORA_TYPE_NUM_ROWID),
    (ORA_TYPE_NUM_DATE, ORA_TYPE_NUM_DATE),
    (ORA_TYPE_NUM_RAW, ORA_TYPE_NUM_RAW),
    (ORA_TYPE_NUM_LONG_RAW, ORA_TYPE_NUM_LONG_RAW),
    (ORA_TYPE_NUM_CHAR, ORA_TYPE_NUM_CHAR),
    (ORA_TYPE_NUM_BINARY_FLOAT, ORA_TYPE_NUM_BINARY_FLOAT),
    (ORA_TYPE_NUM_BINARY_DOUBLE, ORA_TYPE_NUM_BINARY_DOUBLE),
    (ORA_TYPE_NUM_CURSOR, ORA_TYPE_NUM_CURSOR),
    (ORA_TYPE_NUM_OBJECT, ORA_TYPE_NUM_OBJECT),
    (ORA_TYPE_NUM_CLOB, ORA_TYPE_NUM_CLOB),
    (ORA_TYPE_NUM_BLOB, ORA_TYPE_NUM_BLOB),
    (ORA_TYPE_NUM_BFILE, ORA_TYPE_NUM_BFILE),
    (ORA_TYPE_NUM_TIMESTAMP, ORA_TYPE_NUM_TIMESTAMP),
    (ORA_TYPE_NUM_TIMESTAMP_TZ, ORA_TYPE_NUM_TIMESTAMP_TZ),
    (ORA_TYPE_NUM_TIMESTAMP_LTZ, ORA_TYPE_NUM_TIMESTAMP_LTZ),
    (ORA_TYPE_NUM_INTERVAL_YM, ORA_TYPE_NUM_INTERVAL_YM),
    (ORA_TYPE_NUM_INTERVAL_DS, ORA_TYPE_NUM_INTERVAL_DS),
    (ORA_TYPE_NUM_UROWID, ORA_TYPE_NUM_UROWID),
    (ORA_TYPE_NUM_BOOLEAN, ORA_TYPE_NUM_BOOLEAN),
    (ORA_TYPE_NUM_JSON, ORA_TYPE_NUM_JSON),
    (ORA_TYPE_NUM_VECTOR, ORA_TYPE_NUM_VECTOR),
];

/// Wire size of the type/conversion array, including the terminator.
pub fn data_types_array_wire_size() -> usize {
    let mut size = 0;
    for (_, conv) in DATA_TYPES {
        size += 2 + 2;
        if *conv != 0 {
            size += 4;
        }
    }
    size + 2 // terminator
}

/// Write the type/conversion array. Entries with a non-zero conversion carry
/// a 4-byte representation field; a zero type number terminates the array.
pub fn write_data_types_array(buf: &mut Vec<u8>) {
    for (data_type, conv) in DATA_TYPES {
        buf.write_u16_be(*data_type);
        buf.write_u16_be(*conv);
        if *conv != 0 {
            buf.write_u16_be(1); // representation
            buf.write_u16_be(0);
        }
    }
    buf.write_u16_be(0);
}

/// Data types negotiation message.
pub struct DataTypesMessage<'a> {
    /// Compile-time capabilities.
    pub compile_caps: &'a [u8],
    /// Runtime capabilities.
    pub runtime_caps: &'a [u8],
}

impl Message for DataTypesMessage<'_> {
    fn wire_size(&self) -> usize {
        let mut size = 0;
        size += 1; // message type
        size += 2; // charset
        size += 2; // ncharset
        size += 1; // encoding flags
        size += bytes_with_length_wire_size(self.compile_caps.len());
        size += bytes_with_length_wire_size(self.runtime_caps.len());
        size += data_types_array_wire_size();
        size
    }

    fn write_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.write_u8(TNS_MSG_TYPE_DATA_TYPES);
        buf.write_u16_le(TNS_CHARSET_UTF8);
        buf.write_u16_le(TNS_CHARSET_UTF8);
        buf.write_u8(TNS_ENCODING_MULTI_BYTE | TNS_ENCODING_CONV_LENGTH);
        buf.write_bytes_with_length(self.compile_caps);
        buf.write_bytes_with_length(self.runtime_caps);
        write_data_types_array(buf);
        Ok(())
    }
}

impl DataMessage for DataTypesMessage<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_types_wire_size() {
        let compile_caps = vec![1u8; 53];
        let runtime_caps = vec![2u8; 11];
        let msg = DataTypesMessage {
            compile_caps: &compile_caps,
            runtime_caps: &runtime_caps,
        };
        let mut buf = Vec::with_capacity(msg.wire_size());
        msg.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), msg.wire_size());
        assert_eq!(buf[0], TNS_MSG_TYPE_DATA_TYPES);
    }

    #[test]
    fn test_array_terminated() {
        let mut buf = Vec::new();
        write_data_types_array(&mut buf);
        assert_eq!(buf.len(), data_types_array_wire_size());
        assert_eq!(&buf[buf.len() - 2..], &[0, 0]);
    }
}
