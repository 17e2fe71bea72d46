//! Request body codec for the Control API.
//!
//! Bodies are staged in a fixed-capacity scratch buffer before parsing, so
//! the length check happens first and oversized bodies never reach the JSON
//! parser. Parsing is typed: a missing or mis-typed field is a structured
//! error, never a silently absent value.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Capacity of the request scratch buffer in bytes.
pub const SCRATCH_BUFSIZE: usize = 10240;

/// Errors that can occur during body decoding/encoding.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Body does not fit the scratch buffer (one byte is reserved for the
    /// terminator, so `len == limit` is already too long).
    #[error("content too long")]
    BodyTooLarge { len: usize, limit: usize },

    /// Body is not valid JSON or lacks a required field.
    #[error("invalid request body: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Reject a body length that does not fit a scratch buffer of `limit` bytes.
pub fn check_body_len(len: usize, limit: usize) -> Result<(), CodecError> {
    if len >= limit {
        return Err(CodecError::BodyTooLarge { len, limit });
    }
    Ok(())
}

/// Decode a request body into `T` after checking it against the scratch limit.
pub fn decode_body<T: DeserializeOwned>(body: &[u8], limit: usize) -> Result<T, CodecError> {
    check_body_len(body.len(), limit)?;
    serde_json::from_slice(body).map_err(CodecError::from)
}

/// Encode a response payload.
pub fn encode_response<T: Serialize>(payload: &T) -> Result<String, CodecError> {
    serde_json::to_string(payload).map_err(CodecError::from)
}
