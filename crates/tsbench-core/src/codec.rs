//! Conversion between harness byte values and stored values.
//!
//! Harness values are Base64-encoded (standard alphabet, padded) before they
//! enter the buffer, so every backend stores printable text and the SQL
//! backend can read columns back as strings.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;
use snafu::prelude::*;

use crate::model::Value;

/// Error decoding a stored value back into harness bytes.
#[derive(Debug, Snafu)]
#[snafu(display("Stored value is not valid Base64: {source}"))]
pub struct CodecError {
    source: base64::DecodeError,
}

/// Encode harness bytes into a stored value.
pub fn encode_value(raw: &[u8]) -> Value {
    Bytes::from(STANDARD.encode(raw))
}

/// Decode a stored value into harness bytes.
pub fn decode_value(stored: &[u8]) -> Result<Vec<u8>, CodecError> {
    STANDARD.decode(stored).context(CodecSnafu)
}
