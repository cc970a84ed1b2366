//! Oracle DATE / TIMESTAMP codecs.
//!
//! DATE is 7 bytes: century+100, year-in-century+100, month, day, hour+1,
//! minute+1, second+1. TIMESTAMP appends a 4-byte big-endian nanosecond
//! field. TIMESTAMP WITH TIME ZONE appends two more bytes: tz_hour+20 and
//! tz_minute+60, or a region id when the high bit of the tz hour is set.

use crate::error::{Error, Result};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// Decode an Oracle DATE from 7 bytes.
pub fn decode_date(data: &[u8]) -> Result<NaiveDateTime> {
    if data.len() != 7 {
        return Err(Error::protocol(format!(
            "DATE value must be exactly 7 bytes, got {}",
            data.len()
        )));
    }
    decode_date_fields(data, 0)
}

fn decode_date_fields(data: &[u8], nanos: u32) -> Result<NaiveDateTime> {
    let century = (data[0] as i32) - 100;
    let year_in_century = (data[1] as i32) - 100;
    let year = century * 100 + year_in_century;

    let month = data[2];
    let day = data[3];
    let hour = data[4].wrapping_sub(1);
    let minute = data[5].wrapping_sub(1);
    let second = data[6].wrapping_sub(1);

    if !(1..=12).contains(&month) {
        return Err(Error::protocol(format!("invalid month: {}", month)));
    }
    if !(1..=31).contains(&day) {
        return Err(Error::protocol(format!("invalid day: {}", day)));
    }
    if hour > 23 || minute > 59 || second > 59 {
        return Err(Error::protocol(format!(
            "invalid time: {:02}:{:02}:{:02}",
            hour, minute, second
        )));
    }

    let date = NaiveDate::from_ymd_opt(year, month as u32, day as u32).ok_or_else(|| {
        Error::protocol(format!(
            "invalid DATE: year={}, month={}, day={}",
            year, month, day
        ))
    })?;
    let time = NaiveTime::from_hms_nano_opt(hour as u32, minute as u32, second as u32, nanos)
        .ok_or_else(|| Error::protocol("invalid TIME fields"))?;
    Ok(NaiveDateTime::new(date, time))
}

/// Encode an Oracle DATE into 7 bytes.
pub fn encode_date(value: &NaiveDateTime) -> [u8; 7] {
    let year = value.year();
    [
        (year / 100 + 100) as u8,
        (year % 100 + 100) as u8,
        value.month() as u8,
        value.day() as u8,
        (value.hour() + 1) as u8,
        (value.minute() + 1) as u8,
        (value.second() + 1) as u8,
    ]
}

/// Decode a TIMESTAMP value. Accepts the 7-byte DATE form (servers send it
/// for zero fractional seconds) or the full 11-byte form.
pub fn decode_timestamp(data: &[u8]) -> Result<NaiveDateTime> {
    match data.len() {
        7 => decode_date_fields(data, 0),
        11 => {
            let nanos = u32::from_be_bytes([data[7], data[8], data[9], data[10]]);
            decode_date_fields(data, nanos)
        }
        n => Err(Error::protocol(format!(
            "TIMESTAMP value must be 7 or 11 bytes, got {}",
            n
        ))),
    }
}

/// Encode a TIMESTAMP into 11 bytes.
pub fn encode_timestamp(value: &NaiveDateTime) -> [u8; 11] {
    let date = encode_date(value);
    let mut out = [0u8; 11];
    out[..7].copy_from_slice(&date);
    out[7..].copy_from_slice(&value.nanosecond().to_be_bytes());
    out
}

/// Decode a TIMESTAMP WITH TIME ZONE value (13 bytes).
///
/// Region-id forms (high bit of the tz hour byte set) carry no numeric
/// offset; those decode at UTC.
pub fn decode_timestamp_tz(data: &[u8]) -> Result<DateTime<FixedOffset>> {
    if data.len() != 13 {
        return Err(Error::protocol(format!(
            "TIMESTAMP WITH TZ value must be 13 bytes, got {}",
            data.len()
        )));
    }
    let nanos = u32::from_be_bytes([data[7], data[8], data[9], data[10]]);
    let dt = decode_date_fields(&data[..7], nanos)?;

    let offset_seconds = if data[11] & 0x80 != 0 {
        0
    } else {
        let tz_hour = data[11] as i32 - 20;
        let tz_minute = data[12] as i32 - 60;
        tz_hour * 3600 + tz_minute * 60
    };
    let offset = FixedOffset::east_opt(offset_seconds)
        .ok_or_else(|| Error::protocol(format!("invalid timezone offset {}", offset_seconds)))?;

    // The wire carries the value already expressed in its own zone.
    match dt.and_local_timezone(offset) {
        chrono::LocalResult::Single(value) => Ok(value),
        _ => Err(Error::protocol("ambiguous timezone conversion")),
    }
}

/// Encode a TIMESTAMP WITH TIME ZONE into 13 bytes.
pub fn encode_timestamp_tz(value: &DateTime<FixedOffset>) -> [u8; 13] {
    let naive = value.naive_local();
    let ts = encode_timestamp(&naive);
    let offset = value.offset().local_minus_utc();
    let mut out = [0u8; 13];
    out[..11].copy_from_slice(&ts);
    out[11] = (offset / 3600 + 20) as u8;
    out[12] = ((offset % 3600) / 60 + 60) as u8;
    out
}

/// INTERVAL DAY TO SECOND value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalDS {
    pub days: i32,
    pub hours: i8,
    pub minutes: i8,
    pub seconds: i8,
    pub nanoseconds: i32,
}

/// Decode an INTERVAL DAY TO SECOND value (11 bytes).
pub fn decode_interval_ds(data: &[u8]) -> Result<IntervalDS> {
    if data.len() != 11 {
        return Err(Error::protocol(format!(
            "INTERVAL DS value must be 11 bytes, got {}",
            data.len()
        )));
    }
    let days = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as i64 - 0x8000_0000;
    let nanos = u32::from_be_bytes([data[7], data[8], data[9], data[10]]) as i64 - 0x8000_0000;
    Ok(IntervalDS {
        days: days as i32,
        hours: (data[4] as i16 - 60) as i8,
        minutes: (data[5] as i16 - 60) as i8,
        seconds: (data[6] as i16 - 60) as i8,
        nanoseconds: nanos as i32,
    })
}

/// Encode an INTERVAL DAY TO SECOND value into 11 bytes.
pub fn encode_interval_ds(value: &IntervalDS) -> [u8; 11] {
    let mut out = [0u8; 11];
    out[..4].copy_from_slice(&((value.days as i64 + 0x8000_0000) as u32).to_be_bytes());
    out[4] = (value.hours as i16 + 60) as u8;
    out[5] = (value.minutes as i16 + 60) as u8;
    out[6] = (value.seconds as i16 + 60) as u8;
    out[7..].copy_from_slice(&((value.nanoseconds as i64 + 0x8000_0000) as u32).to_be_bytes());
    out
}

/// INTERVAL YEAR TO MONTH value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalYM {
    pub years: i32,
    pub months: i8,
}

/// Decode an INTERVAL YEAR TO MONTH value (5 bytes).
pub fn decode_interval_ym(data: &[u8]) -> Result<IntervalYM> {
    if data.len() != 5 {
        return Err(Error::protocol(format!(
            "INTERVAL YM value must be 5 bytes, got {}",
            data.len()
        )));
    }
    let years = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as i64 - 0x8000_0000;
    Ok(IntervalYM {
        years: years as i32,
        months: (data[4] as i16 - 60) as i8,
    })
}

/// Encode an INTERVAL YEAR TO MONTH value into 5 bytes.
pub fn encode_interval_ym(value: &IntervalYM) -> [u8; 5] {
    let mut out = [0u8; 5];
    out[..4].copy_from_slice(&((value.years as i64 + 0x8000_0000) as u32).to_be_bytes());
    out[4] = (value.months as i16 + 60) as u8;
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_date() {
        // 2024-10-21 12:36:05
        let data = [0x78, 0x7C, 0x0A, 0x15, 0x0D, 0x25, 0x06];
        let result = decode_date(&data).unwrap();
        assert_eq!(result.year(), 2024);
        assert_eq!(result.month(), 10);
        assert_eq!(result.day(), 21);
        assert_eq!(result.hour(), 12);
        assert_eq!(result.minute(), 36);
        assert_eq!(result.second(), 5);
    }

    #[test]
    fn test_date_round_trip_range() {
        let cases = [
            NaiveDate::from_ymd_opt(1, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
            NaiveDate::from_ymd_opt(1999, 6, 15).unwrap().and_hms_opt(12, 30, 45).unwrap(),
            NaiveDate::from_ymd_opt(2024, 12, 31).unwrap().and_hms_opt(23, 59, 59).unwrap(),
            NaiveDate::from_ymd_opt(9999, 12, 31).unwrap().and_hms_opt(23, 59, 59).unwrap(),
        ];
        for dt in cases {
            let encoded = encode_date(&dt);
            assert_eq!(decode_date(&encoded).unwrap(), dt);
        }
    }

    #[test]
    fn test_timestamp_round_trip() {
        let dt = NaiveDate::from_ymd_opt(2023, 3, 7)
            .unwrap()
            .and_hms_nano_opt(4, 5, 6, 123_456_789)
            .unwrap();
        let encoded = encode_timestamp(&dt);
        assert_eq!(decode_timestamp(&encoded).unwrap(), dt);
    }

    #[test]
    fn test_timestamp_seven_byte_form() {
        let data = [0x78, 0x7C, 0x01, 0x0F, 0x01, 0x01, 0x01];
        let dt = decode_timestamp(&data).unwrap();
        assert_eq!(dt.nanosecond(), 0);
        assert_eq!(dt.hour(), 0);
    }

    #[test]
    fn test_timestamp_tz_round_trip() {
        let offsets = [0, 3600, -5 * 3600, 5 * 3600 + 1800, -(9 * 3600 + 1800)];
        for secs in offsets {
            let offset = FixedOffset::east_opt(secs).unwrap();
            let dt = NaiveDate::from_ymd_opt(2020, 6, 1)
                .unwrap()
                .and_hms_nano_opt(10, 20, 30, 500)
                .unwrap()
                .and_local_timezone(offset)
                .unwrap();
            let encoded = encode_timestamp_tz(&dt);
            assert_eq!(decode_timestamp_tz(&encoded).unwrap(), dt);
        }
    }

    #[test]
    fn test_timestamp_tz_region_id_decodes_utc() {
        let mut data = encode_timestamp_tz(
            &NaiveDate::from_ymd_opt(2020, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
                .and_local_timezone(FixedOffset::east_opt(0).unwrap())
                .unwrap(),
        );
        data[11] = 0x80 | 0x01; // region id form
        data[12] = 0x02;
        let dt = decode_timestamp_tz(&data).unwrap();
        assert_eq!(dt.offset().local_minus_utc(), 0);
    }

    #[test]
    fn test_interval_ds_round_trip() {
        let cases = [
            IntervalDS { days: 0, hours: 0, minutes: 0, seconds: 0, nanoseconds: 0 },
            IntervalDS { days: 5, hours: 3, minutes: 20, seconds: 9, nanoseconds: 123_000 },
            IntervalDS { days: -5, hours: -3, minutes: -20, seconds: -9, nanoseconds: -123_000 },
        ];
        for iv in cases {
            let encoded = encode_interval_ds(&iv);
            assert_eq!(decode_interval_ds(&encoded).unwrap(), iv);
        }
    }

    #[test]
    fn test_interval_ym_round_trip() {
        for iv in [
            IntervalYM { years: 0, months: 0 },
            IntervalYM { years: 12, months: 3 },
            IntervalYM { years: -12, months: -3 },
        ] {
            let encoded = encode_interval_ym(&iv);
            assert_eq!(decode_interval_ym(&encoded).unwrap(), iv);
        }
    }

    #[test]
    fn test_decode_date_rejects_invalid() {
        assert!(decode_date(&[0x78, 0x7C, 0x0A]).is_err());
        assert!(decode_date(&[0x78, 0x7C, 0x0D, 0x0F, 0x01, 0x01, 0x01]).is_err());
        assert!(decode_date(&[0x78, 0x7C, 0x01, 0x20, 0x01, 0x01, 0x01]).is_err());
    }
}
