//! OSON codec for the JSON database type.
//!
//! OSON documents start with the three magic bytes, a version byte and a
//! 16-bit flags word, followed by a tree of type-tagged nodes. Scalar nodes
//! reuse the ordinary Oracle wire encodings (packed-decimal NUMBER, 7/11-byte
//! timestamps, interval images); container nodes carry a count followed by
//! their children, with object fields as length-prefixed UTF-8 keys.

use crate::error::{Error, Result};
use crate::protocol::constants::*;
use crate::protocol::decode::date::{
    decode_date, decode_interval_ds, decode_interval_ym, decode_timestamp, encode_date,
    encode_interval_ds, encode_interval_ym, encode_timestamp, IntervalDS, IntervalYM,
};
use crate::protocol::decode::number::{decode_number, encode_number};
use chrono::NaiveDateTime;

/// A decoded JSON value.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonValue {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Date(NaiveDateTime),
    Timestamp(NaiveDateTime),
    IntervalDS(IntervalDS),
    IntervalYM(IntervalYM),
    Array(Vec<JsonValue>),
    Object(Vec<(String, JsonValue)>),
}

/// Encode a JSON value into an OSON document.
pub fn encode_oson(value: &JsonValue) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(64);
    out.push(TNS_JSON_MAGIC_BYTE_1);
    out.push(TNS_JSON_MAGIC_BYTE_2);
    out.push(TNS_JSON_MAGIC_BYTE_3);
    out.push(TNS_JSON_VERSION);
    out.extend_from_slice(&0u16.to_be_bytes()); // flags
    encode_node(value, &mut out, 0)?;
    Ok(out)
}

fn encode_node(value: &JsonValue, out: &mut Vec<u8>, depth: usize) -> Result<()> {
    if depth > TNS_JSON_MAX_DEPTH {
        return Err(Error::type_conversion("JSON document nested too deeply"));
    }
    match value {
        JsonValue::Null => out.push(TNS_JSON_TYPE_NULL),
        JsonValue::Bool(true) => out.push(TNS_JSON_TYPE_TRUE),
        JsonValue::Bool(false) => out.push(TNS_JSON_TYPE_FALSE),
        JsonValue::Int(v) => {
            let encoded = encode_number(&v.to_string())?;
            out.push(TNS_JSON_TYPE_NUMBER_LENGTH_UINT8);
            out.push(encoded.len() as u8);
            out.extend_from_slice(&encoded);
        }
        JsonValue::Double(v) => {
            out.push(TNS_JSON_TYPE_BINARY_DOUBLE);
            out.extend_from_slice(&v.to_be_bytes());
        }
        JsonValue::String(s) => {
            let bytes = s.as_bytes();
            if bytes.len() <= u8::MAX as usize {
                out.push(TNS_JSON_TYPE_STRING_LENGTH_UINT8);
                out.push(bytes.len() as u8);
            } else if bytes.len() <= u16::MAX as usize {
                out.push(TNS_JSON_TYPE_STRING_LENGTH_UINT16);
                out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
            } else {
                out.push(TNS_JSON_TYPE_STRING_LENGTH_UINT32);
                out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
            }
            out.extend_from_slice(bytes);
        }
        JsonValue::Date(dt) => {
            out.push(TNS_JSON_TYPE_DATE);
            out.extend_from_slice(&encode_date(dt));
        }
        JsonValue::Timestamp(dt) => {
            out.push(TNS_JSON_TYPE_TIMESTAMP);
            out.extend_from_slice(&encode_timestamp(dt));
        }
        JsonValue::IntervalDS(iv) => {
            out.push(TNS_JSON_TYPE_INTERVAL_DS);
            out.extend_from_slice(&encode_interval_ds(iv));
        }
        JsonValue::IntervalYM(iv) => {
            out.push(TNS_JSON_TYPE_INTERVAL_YM);
            out.extend_from_slice(&encode_interval_ym(iv));
        }
        JsonValue::Array(items) => {
            out.push(TNS_JSON_TYPE_ARRAY);
            out.extend_from_slice(&(items.len() as u32).to_be_bytes());
            for item in items {
                encode_node(item, out, depth + 1)?;
            }
        }
        JsonValue::Object(fields) => {
            out.push(TNS_JSON_TYPE_OBJECT);
            out.extend_from_slice(&(fields.len() as u32).to_be_bytes());
            for (key, item) in fields {
                let key_bytes = key.as_bytes();
                if key_bytes.len() > u8::MAX as usize {
                    return Err(Error::type_conversion(format!(
                        "JSON field name too long: {} bytes",
                        key_bytes.len()
                    )));
                }
                out.push(key_bytes.len() as u8);
                out.extend_from_slice(key_bytes);
                encode_node(item, out, depth + 1)?;
            }
        }
    }
    Ok(())
}

/// Decode an OSON document.
pub fn decode_oson(data: &[u8]) -> Result<JsonValue> {
    if data.len() < 6
        || data[0] != TNS_JSON_MAGIC_BYTE_1
        || data[1] != TNS_JSON_MAGIC_BYTE_2
        || data[2] != TNS_JSON_MAGIC_BYTE_3
    {
        return Err(Error::protocol("missing OSON magic bytes"));
    }
    if data[3] != TNS_JSON_VERSION {
        return Err(Error::protocol(format!(
            "unsupported OSON version {}",
            data[3]
        )));
    }
    let mut reader = OsonReader {
        data,
        pos: 6, // magic + version + flags
    };
    let value = reader.read_node(0)?;
    Ok(value)
}

struct OsonReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl OsonReader<'_> {
    fn take(&mut self, n: usize) -> Result<&[u8]> {
        if self.pos + n > self.data.len() {
            return Err(Error::protocol("truncated OSON document"));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn take_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn take_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_node(&mut self, depth: usize) -> Result<JsonValue> {
        if depth > TNS_JSON_MAX_DEPTH {
            return Err(Error::protocol("OSON document nested too deeply"));
        }
        let node_type = self.take_u8()?;
        match node_type {
            TNS_JSON_TYPE_NULL => Ok(JsonValue::Null),
            TNS_JSON_TYPE_TRUE => Ok(JsonValue::Bool(true)),
            TNS_JSON_TYPE_FALSE => Ok(JsonValue::Bool(false)),
            TNS_JSON_TYPE_NUMBER_LENGTH_UINT8 => {
                let len = self.take_u8()? as usize;
                let bytes = self.take(len)?;
                let text = decode_number(bytes)?;
                match text.parse::<i64>() {
                    Ok(v) => Ok(JsonValue::Int(v)),
                    Err(_) => {
                        let v = text.parse::<f64>().map_err(|_| {
                            Error::protocol(format!("unparseable OSON number '{}'", text))
                        })?;
                        Ok(JsonValue::Double(v))
                    }
                }
            }
            TNS_JSON_TYPE_BINARY_DOUBLE => {
                let b = self.take(8)?;
                let mut arr = [0u8; 8];
                arr.copy_from_slice(b);
                Ok(JsonValue::Double(f64::from_be_bytes(arr)))
            }
            TNS_JSON_TYPE_STRING_LENGTH_UINT8 => {
                let len = self.take_u8()? as usize;
                self.read_string(len)
            }
            TNS_JSON_TYPE_STRING_LENGTH_UINT16 => {
                let len = self.take_u16()? as usize;
                self.read_string(len)
            }
            TNS_JSON_TYPE_STRING_LENGTH_UINT32 => {
                let len = self.take_u32()? as usize;
                self.read_string(len)
            }
            TNS_JSON_TYPE_DATE => {
                let b = self.take(7)?;
                Ok(JsonValue::Date(decode_date(b)?))
            }
            TNS_JSON_TYPE_TIMESTAMP => {
                let b = self.take(11)?;
                Ok(JsonValue::Timestamp(decode_timestamp(b)?))
            }
            TNS_JSON_TYPE_INTERVAL_DS => {
                let b = self.take(11)?;
                Ok(JsonValue::IntervalDS(decode_interval_ds(b)?))
            }
            TNS_JSON_TYPE_INTERVAL_YM => {
                let b = self.take(5)?;
                Ok(JsonValue::IntervalYM(decode_interval_ym(b)?))
            }
            TNS_JSON_TYPE_ARRAY => {
                let count = self.take_u32()? as usize;
                let mut items = Vec::with_capacity(count.min(4096));
                for _ in 0..count {
                    items.push(self.read_node(depth + 1)?);
                }
                Ok(JsonValue::Array(items))
            }
            TNS_JSON_TYPE_OBJECT => {
                let count = self.take_u32()? as usize;
                let mut fields = Vec::with_capacity(count.min(4096));
                for _ in 0..count {
                    let key_len = self.take_u8()? as usize;
                    let key = String::from_utf8_lossy(self.take(key_len)?).to_string();
                    let value = self.read_node(depth + 1)?;
                    fields.push((key, value));
                }
                Ok(JsonValue::Object(fields))
            }
            other => Err(Error::protocol(format!(
                "unknown OSON node type {:#04x}",
                other
            ))),
        }
    }

    fn read_string(&mut self, len: usize) -> Result<JsonValue> {
        let bytes = self.take(len)?;
        let s = std::str::from_utf8(bytes)
            .map_err(|_| Error::protocol("OSON string is not valid UTF-8"))?;
        Ok(JsonValue::String(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn round_trip(value: JsonValue) {
        let encoded = encode_oson(&value).unwrap();
        assert_eq!(encoded[0], TNS_JSON_MAGIC_BYTE_1);
        let decoded = decode_oson(&encoded).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_scalar_round_trips() {
        round_trip(JsonValue::Null);
        round_trip(JsonValue::Bool(true));
        round_trip(JsonValue::Bool(false));
        round_trip(JsonValue::Int(0));
        round_trip(JsonValue::Int(42));
        round_trip(JsonValue::Int(-42));
        round_trip(JsonValue::Int(i64::MAX));
        round_trip(JsonValue::Double(2.75));
        round_trip(JsonValue::String(String::new()));
        round_trip(JsonValue::String("hello".to_string()));
        round_trip(JsonValue::String("héllo wörld".to_string()));
    }

    #[test]
    fn test_long_string_round_trip() {
        round_trip(JsonValue::String("x".repeat(300)));
        round_trip(JsonValue::String("y".repeat(65 * 1024)));
    }

    #[test]
    fn test_temporal_round_trips() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        round_trip(JsonValue::Date(date));
        let ts = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_nano_opt(8, 30, 0, 250_000_000)
            .unwrap();
        round_trip(JsonValue::Timestamp(ts));
        round_trip(JsonValue::IntervalDS(IntervalDS {
            days: 2,
            hours: 1,
            minutes: 30,
            seconds: 15,
            nanoseconds: 0,
        }));
        round_trip(JsonValue::IntervalYM(IntervalYM { years: 3, months: 6 }));
    }

    #[test]
    fn test_container_round_trips() {
        round_trip(JsonValue::Array(vec![]));
        round_trip(JsonValue::Array(vec![
            JsonValue::Int(1),
            JsonValue::String("two".to_string()),
            JsonValue::Null,
        ]));
        round_trip(JsonValue::Object(vec![
            ("id".to_string(), JsonValue::Int(7)),
            (
                "name".to_string(),
                JsonValue::String("widget".to_string()),
            ),
            (
                "tags".to_string(),
                JsonValue::Array(vec![JsonValue::String("a".to_string())]),
            ),
        ]));
    }

    #[test]
    fn test_deep_nesting_round_trip() {
        let mut value = JsonValue::Int(1);
        for _ in 0..TNS_JSON_MAX_DEPTH {
            value = JsonValue::Array(vec![value]);
        }
        round_trip(value);
    }

    #[test]
    fn test_too_deep_rejected() {
        let mut value = JsonValue::Int(1);
        for _ in 0..(TNS_JSON_MAX_DEPTH + 1) {
            value = JsonValue::Array(vec![value]);
        }
        assert!(encode_oson(&value).is_err());
    }

    #[test]
    fn test_bad_magic_rejected() {
        assert!(decode_oson(&[0, 1, 2, 3, 4, 5, 6]).is_err());
    }

    #[test]
    fn test_object_field_order_preserved() {
        let value = JsonValue::Object(vec![
            ("z".to_string(), JsonValue::Int(1)),
            ("a".to_string(), JsonValue::Int(2)),
        ]);
        let encoded = encode_oson(&value).unwrap();
        match decode_oson(&encoded).unwrap() {
            JsonValue::Object(fields) => {
                assert_eq!(fields[0].0, "z");
                assert_eq!(fields[1].0, "a");
            }
            other => panic!("expected object, got {:?}", other),
        }
    }
}
