//! Per-type wire codecs.

pub mod date;
pub mod number;
pub mod oson;
pub mod vector;

pub use date::{
    decode_date, decode_interval_ds, decode_interval_ym, decode_timestamp, decode_timestamp_tz,
    encode_date, encode_interval_ds, encode_interval_ym, encode_timestamp, encode_timestamp_tz,
    IntervalDS, IntervalYM,
};
pub use number::{
    decode_binary_double, decode_binary_float, decode_number, encode_binary_double,
    encode_binary_float, encode_number,
};
pub use oson::{decode_oson, encode_oson, JsonValue};
pub use vector::{decode_vector, encode_vector, VectorValue};
