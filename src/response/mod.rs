//! Streamed response types and the buffer they are staged in.

mod buffer;

pub use buffer::ResponseBuffer;

use serde::{Serialize, Serializer};

use crate::error::ResponseError;
use crate::request::{RequestId, TokenId};

/// Reason a request stopped producing output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Hit `max_new_tokens`.
    Length,
    /// The generator produced the request's end token.
    EndOfSequence,
    /// Cancelled by the caller or by shutdown.
    Cancelled,
    /// Finalized by a generation or executor error.
    Error,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Length => "length",
            Self::EndOfSequence => "end_of_sequence",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
        }
    }
}

/// One streamed chunk of a request's output.
///
/// Tokens are incremental: concatenating the payloads of a request's
/// responses in `sequence_index` order yields its full output.
///
/// Serializes flat, with `tokens`, `num_tokens` and a nullable `error`
/// message in place of `result`.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub request_id: RequestId,
    /// Caller correlation id from the request.
    pub client_id: u64,
    /// Position of this chunk in the request's stream, from 0 without gaps.
    pub sequence_index: u32,
    /// Last chunk of this sampled sequence.
    pub is_sequence_final: bool,
    /// No further output will be produced for the request.
    pub is_request_final: bool,
    pub finish_reason: Option<FinishReason>,
    /// New tokens, or the error that finalized the request.
    pub result: Result<Vec<TokenId>, ResponseError>,
}

impl Response {
    /// Newly produced tokens. Empty for error responses.
    pub fn tokens(&self) -> &[TokenId] {
        match &self.result {
            Ok(tokens) => tokens,
            Err(_) => &[],
        }
    }

    pub fn num_tokens(&self) -> usize {
        self.tokens().len()
    }

    pub fn error(&self) -> Option<&ResponseError> {
        self.result.as_ref().err()
    }

    pub fn is_error(&self) -> bool {
        self.result.is_err()
    }
}

#[derive(Serialize)]
struct ResponseRecord<'a> {
    request_id: RequestId,
    client_id: u64,
    sequence_index: u32,
    is_sequence_final: bool,
    is_request_final: bool,
    finish_reason: Option<FinishReason>,
    tokens: &'a [TokenId],
    num_tokens: usize,
    error: Option<String>,
}

impl Serialize for Response {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ResponseRecord {
            request_id: self.request_id,
            client_id: self.client_id,
            sequence_index: self.sequence_index,
            is_sequence_final: self.is_sequence_final,
            is_request_final: self.is_request_final,
            finish_reason: self.finish_reason,
            tokens: self.tokens(),
            num_tokens: self.num_tokens(),
            error: self.error().map(ToString::to_string),
        }
        .serialize(serializer)
    }
}
