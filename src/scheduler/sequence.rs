//! Per-request generation state.
//!
//! Only the scheduler holds a `SequenceState`; callers see owned [`Response`]
//! snapshots built from it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::admission::AdmissionPermit;
use super::queue::QueuedRequest;
use crate::engine::SequenceView;
use crate::error::ResponseError;
use crate::request::{Request, RequestId, TokenId};
use crate::response::{FinishReason, Response};

/// Generation state of one in-flight request.
pub struct SequenceState {
    request_id: RequestId,
    request: Request,
    generated: Vec<TokenId>,
    next_index: u32,
    is_sequence_final: bool,
    is_request_final: bool,
    finish_reason: Option<FinishReason>,
    error: Option<ResponseError>,
    cancelled: Arc<AtomicBool>,
    started_at: Instant,
    /// Released when the state is dropped, after the final response.
    _permit: AdmissionPermit,
}

impl std::fmt::Debug for SequenceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceState")
            .field("request_id", &self.request_id)
            .field("generated", &self.generated.len())
            .field("next_index", &self.next_index)
            .field("is_request_final", &self.is_request_final)
            .field("finish_reason", &self.finish_reason)
            .finish()
    }
}

impl SequenceState {
    /// Claim a queued request.
    pub fn new(queued: QueuedRequest) -> Self {
        let (request_id, request, cancelled, permit) = queued.into_parts();
        let capacity = request.params.max_new_tokens;
        Self {
            request_id,
            request,
            generated: Vec::with_capacity(capacity),
            next_index: 0,
            is_sequence_final: false,
            is_request_final: false,
            finish_reason: None,
            error: None,
            cancelled,
            started_at: Instant::now(),
            _permit: permit,
        }
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn generated(&self) -> &[TokenId] {
        &self.generated
    }

    pub fn is_request_final(&self) -> bool {
        self.is_request_final
    }

    pub fn is_sequence_final(&self) -> bool {
        self.is_sequence_final
    }

    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.finish_reason
    }

    pub fn error(&self) -> Option<&ResponseError> {
        self.error.as_ref()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Prompt plus generated tokens, the unit the batch token budget counts.
    pub fn context_len(&self) -> usize {
        self.request.tokens.len() + self.generated.len()
    }

    /// Tokens still allowed by `max_new_tokens`.
    pub fn remaining_budget(&self) -> usize {
        self.request
            .params
            .max_new_tokens
            .saturating_sub(self.generated.len())
    }

    pub fn view(&self) -> SequenceView<'_> {
        SequenceView {
            request_id: self.request_id,
            prompt: &self.request.tokens,
            generated: &self.generated,
            params: &self.request.params,
        }
    }

    /// Apply one step's tokens.
    ///
    /// Tokens past the remaining budget are discarded; the end token, if
    /// produced, terminates the request and is not emitted. Returns `None`
    /// when nothing new is emitted and the request is not final.
    pub fn advance(&mut self, produced: &[TokenId]) -> Option<Response> {
        if self.is_request_final {
            return None;
        }
        let budget = self.remaining_budget();
        let end_id = self.request.params.end_id;
        let mut emitted = Vec::new();
        let mut reason = None;
        for &token in produced {
            if emitted.len() == budget {
                break;
            }
            if Some(token) == end_id {
                reason = Some(FinishReason::EndOfSequence);
                break;
            }
            emitted.push(token);
        }
        self.generated.extend_from_slice(&emitted);
        if reason.is_none() && self.remaining_budget() == 0 {
            reason = Some(FinishReason::Length);
        }

        if let Some(reason) = reason {
            self.mark_final(reason, None);
        } else if emitted.is_empty() {
            return None;
        }
        Some(self.emit(Ok(emitted)))
    }

    /// Finalize without new tokens, e.g. on cancellation.
    pub fn finish(&mut self, reason: FinishReason) -> Option<Response> {
        if self.is_request_final {
            return None;
        }
        self.mark_final(reason, None);
        Some(self.emit(Ok(Vec::new())))
    }

    /// Finalize with an error.
    pub fn fail(&mut self, error: ResponseError) -> Option<Response> {
        if self.is_request_final {
            return None;
        }
        self.mark_final(FinishReason::Error, Some(error.clone()));
        Some(self.emit(Err(error)))
    }

    fn mark_final(&mut self, reason: FinishReason, error: Option<ResponseError>) {
        // One sampled sequence per request, so both flags close together.
        self.is_sequence_final = true;
        self.is_request_final = true;
        self.finish_reason = Some(reason);
        self.error = error;
    }

    fn emit(&mut self, result: Result<Vec<TokenId>, ResponseError>) -> Response {
        let sequence_index = self.next_index;
        self.next_index += 1;
        Response {
            request_id: self.request_id,
            client_id: self.request.client_id,
            sequence_index,
            is_sequence_final: self.is_sequence_final,
            is_request_final: self.is_request_final,
            finish_reason: self.finish_reason,
            result,
        }
    }
}
