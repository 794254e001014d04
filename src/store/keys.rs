use crate::store::StoreError;

const SIGN_BIT: u64 = 1 << 63;

fn validate_id(booking_id: &str) -> Result<(), StoreError> {
    if booking_id.is_empty() {
        return Err(StoreError::Validation("booking id must not be empty".into()));
    }
    Ok(())
}

/// Maps a signed millisecond timestamp onto `u64` so that the zero-padded
/// decimal form sorts in the same order as the timestamp.
pub fn encode_timestamp_ms(timestamp_ms: i64) -> u64 {
    (timestamp_ms as u64) ^ SIGN_BIT
}

pub fn decode_timestamp_ms(encoded: u64) -> i64 {
    (encoded ^ SIGN_BIT) as i64
}

pub fn booking_key(booking_id: &str) -> Result<String, StoreError> {
    validate_id(booking_id)?;
    Ok(booking_id.to_string())
}

pub fn booking_date_index_key(timestamp_ms: i64, booking_id: &str) -> Result<String, StoreError> {
    validate_id(booking_id)?;
    Ok(format!(
        "{:020}:{}",
        encode_timestamp_ms(timestamp_ms),
        booking_id
    ))
}

/// Exclusive upper bound of the date index for everything strictly before `timestamp_ms`.
pub fn booking_date_index_bound(timestamp_ms: i64) -> String {
    format!("{:020}:", encode_timestamp_ms(timestamp_ms))
}

/// Splits a date index key back into `(timestamp_ms, booking_id)`.
pub fn parse_booking_date_index_key(key: &[u8]) -> Option<(i64, String)> {
    let sep = key.iter().position(|b| *b == b':')?;
    let encoded = std::str::from_utf8(&key[..sep]).ok()?.parse::<u64>().ok()?;
    let booking_id = std::str::from_utf8(&key[sep + 1..]).ok()?;
    if booking_id.is_empty() {
        return None;
    }
    Some((decode_timestamp_ms(encoded), booking_id.to_string()))
}
