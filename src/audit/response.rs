//! Response body decorator that finishes the audit record.
//!
//! # Modes
//!
//! The mode is decided once, from the response head:
//!
//! - **Capture** (status 200, content type containing `application/json`):
//!   data frames are buffered, joined and forwarded as a single frame once the
//!   inner body ends. The joined text becomes `responseData`.
//! - **Passthrough**: frames are forwarded as they arrive, nothing is buffered.
//!
//! A capture that would grow past its limit flushes the buffered bytes plus
//! the current frame as one frame, keeps the first `limit` bytes for the record,
//! marks it truncated and continues in passthrough.
//!
//! # Emission
//!
//! The record is emitted at end of stream, when the inner body fails, or when
//! the decorator is dropped early (client went away). Exactly one of those
//! happens. Buffers live inside the decorator and go away with it.
//!
//! End of stream is reached when the inner body says so, when the declared
//! length has been read, or at the response head for bodiless responses
//! (`HEAD`, `1xx`, `204`, `304`). The server stops polling at that point, so
//! the decorator cannot wait for a trailing `None`.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode, header};
use bytes::BytesMut;
use http_body::{Body, Frame, SizeHint};
use tracing::debug;

use super::sink::AuditSink;
use crate::metrics;
use crate::models::AuditRecord;

/// How response frames are treated.
#[derive(Debug)]
pub enum ResponseMode {
    Capture { buffer: BytesMut, limit: usize },
    Passthrough,
}

impl ResponseMode {
    /// Capture only `200` JSON responses.
    pub fn for_response(status: StatusCode, headers: &HeaderMap, limit: usize) -> Self {
        let is_json = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("application/json"));

        if status == StatusCode::OK && is_json {
            ResponseMode::Capture {
                buffer: BytesMut::new(),
                limit,
            }
        } else {
            ResponseMode::Passthrough
        }
    }

    pub fn is_capture(&self) -> bool {
        matches!(self, ResponseMode::Capture { .. })
    }
}

/// Number of body bytes the client will be sent, when known from the head.
///
/// `Some(0)` for responses that never carry a body.
pub fn expected_body_len(method: &Method, status: StatusCode, headers: &HeaderMap) -> Option<u64> {
    if method == Method::HEAD
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
    {
        return Some(0);
    }

    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Longest prefix of `bytes`, at most `limit` long, that does not split a
/// UTF-8 sequence.
fn utf8_prefix(bytes: &[u8], limit: usize) -> &[u8] {
    let kept = bytes.get(..limit).unwrap_or(bytes);
    match std::str::from_utf8(kept) {
        // error_len() is None only for a sequence cut short by the end
        Err(e) if e.error_len().is_none() => kept.get(..e.valid_up_to()).unwrap_or_default(),
        _ => kept,
    }
}

/// Owns the record until it is handed to the sink.
struct Emitter {
    record: AuditRecord,
    sink: Arc<dyn AuditSink>,
}

impl Emitter {
    fn complete(self) {
        metrics::record_audit_emitted("complete");
        self.publish();
    }

    fn fail(mut self, reason: impl Into<String>) {
        self.record.fail(reason);
        metrics::record_audit_emitted("failed");
        self.publish();
    }

    fn publish(self) {
        metrics::record_exchange_duration(
            &self.record.request_method,
            self.record.status,
            self.record.execute_time,
        );
        self.sink.emit(&self.record);
    }
}

/// A record between request ingress and the response head.
///
/// Consumed either by [`PendingRecord::into_body`] or [`PendingRecord::fail`].
/// Dropping it unconsumed (the exchange future was cancelled) emits it as failed.
pub struct PendingRecord {
    record: AuditRecord,
    sink: Arc<dyn AuditSink>,
    armed: bool,
}

impl PendingRecord {
    pub fn new(record: AuditRecord, sink: Arc<dyn AuditSink>) -> Self {
        Self {
            record,
            sink,
            armed: true,
        }
    }

    pub fn record_mut(&mut self) -> &mut AuditRecord {
        &mut self.record
    }

    fn disarm(&mut self) -> Emitter {
        self.armed = false;
        Emitter {
            record: std::mem::take(&mut self.record),
            sink: Arc::clone(&self.sink),
        }
    }

    /// Emit now with `error` set; no response body will follow.
    pub fn fail(mut self, reason: impl Into<String>) {
        self.disarm().fail(reason);
    }

    /// Hand the record to the response body that will finish it.
    pub fn into_body<B: Body>(mut self, inner: B, mode: ResponseMode) -> AuditedBody<B> {
        let Emitter { record, sink } = self.disarm();
        AuditedBody::new(inner, mode, record, sink)
    }
}

impl Drop for PendingRecord {
    fn drop(&mut self) {
        if self.armed {
            self.disarm().fail("exchange cancelled before response");
        }
    }
}

/// Body wrapper finishing one [`AuditRecord`].
pub struct AuditedBody<B> {
    inner: B,
    mode: ResponseMode,
    /// Trailers held back while the joined capture frame goes out
    pending: Option<Frame<Bytes>>,
    emitter: Option<Emitter>,
    /// Data bytes read from the inner body so far
    received: u64,
    /// Total the inner body will produce, if known
    expected: Option<u64>,
    finished: bool,
}

impl<B: Body> AuditedBody<B> {
    pub fn new(
        inner: B,
        mode: ResponseMode,
        record: AuditRecord,
        sink: Arc<dyn AuditSink>,
    ) -> Self {
        let expected = inner.size_hint().exact();
        let mut body = Self {
            inner,
            mode,
            pending: None,
            emitter: Some(Emitter { record, sink }),
            received: 0,
            expected,
            finished: false,
        };
        body.settle_if_empty();
        body
    }

    /// Use the length declared by the response head.
    pub fn expecting(mut self, expected: Option<u64>) -> Self {
        if expected.is_some() {
            self.expected = expected;
        }
        self.settle_if_empty();
        self
    }

    /// Bodiless responses complete at the head.
    fn settle_if_empty(&mut self) {
        if !self.finished && self.expected == Some(0) {
            self.drain_capture();
            self.finish();
        }
    }

    /// Whether the inner body has nothing more to give.
    fn inner_complete(&self) -> bool {
        self.inner.is_end_stream() || self.expected.is_some_and(|n| self.received >= n)
    }
}

impl<B> AuditedBody<B> {
    fn record_mut(&mut self) -> Option<&mut AuditRecord> {
        self.emitter.as_mut().map(|e| &mut e.record)
    }

    /// Leave capture mode, storing what was buffered. Returns the bytes to forward.
    fn drain_capture(&mut self) -> Option<Bytes> {
        match std::mem::replace(&mut self.mode, ResponseMode::Passthrough) {
            ResponseMode::Capture { buffer, .. } => {
                let data = buffer.freeze();
                if let Some(record) = self.record_mut() {
                    record.response_data = Some(String::from_utf8_lossy(&data).into_owned());
                }
                (!data.is_empty()).then_some(data)
            }
            ResponseMode::Passthrough => None,
        }
    }

    /// Buffer `data`, or flush everything if the limit would be exceeded.
    fn capture(&mut self, data: Bytes) -> Option<Bytes> {
        let ResponseMode::Capture { buffer, limit } = &mut self.mode else {
            return Some(data);
        };

        if buffer.len() + data.len() <= *limit {
            buffer.extend_from_slice(&data);
            return None;
        }

        let limit = *limit;
        let mut joined = std::mem::take(buffer);
        joined.extend_from_slice(&data);
        let joined = joined.freeze();
        self.mode = ResponseMode::Passthrough;

        if let Some(record) = self.record_mut() {
            let kept = utf8_prefix(&joined, limit);
            record.response_data = Some(String::from_utf8_lossy(kept).into_owned());
            record.response_truncated = true;
        }
        metrics::record_audit_truncated();
        debug!(limit, "Response capture limit reached, streaming the rest");

        Some(joined)
    }

    fn finish(&mut self) {
        self.finished = true;
        if let Some(emitter) = self.emitter.take() {
            emitter.complete();
        }
    }
}

impl<B> Body for AuditedBody<B>
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: std::fmt::Display,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;

        if let Some(frame) = this.pending.take() {
            return Poll::Ready(Some(Ok(frame)));
        }
        if this.finished {
            return Poll::Ready(None);
        }

        loop {
            match ready!(Pin::new(&mut this.inner).poll_frame(cx)) {
                Some(Ok(frame)) => match frame.into_data() {
                    Ok(data) => {
                        this.received = this.received.saturating_add(data.len() as u64);
                        let out = this.capture(data);

                        if this.inner_complete() {
                            let out = out.or_else(|| this.drain_capture());
                            this.finish();
                            return Poll::Ready(out.map(|data| Ok(Frame::data(data))));
                        }
                        if let Some(out) = out {
                            return Poll::Ready(Some(Ok(Frame::data(out))));
                        }
                    }
                    Err(trailers) => {
                        // Trailers close the data section
                        return match this.drain_capture() {
                            Some(data) => {
                                this.pending = Some(trailers);
                                Poll::Ready(Some(Ok(Frame::data(data))))
                            }
                            None => Poll::Ready(Some(Ok(trailers))),
                        };
                    }
                },
                Some(Err(e)) => {
                    this.finished = true;
                    this.mode = ResponseMode::Passthrough;
                    if let Some(emitter) = this.emitter.take() {
                        emitter.fail(format!("response body error: {e}"));
                    }
                    return Poll::Ready(Some(Err(e)));
                }
                None => {
                    let rest = this.drain_capture();
                    this.finish();
                    return Poll::Ready(rest.map(|data| Ok(Frame::data(data))));
                }
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        // Report the end only after the record went out
        self.finished && self.pending.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        if self.finished {
            return SizeHint::with_exact(0);
        }
        self.inner.size_hint()
    }
}

impl<B> Drop for AuditedBody<B> {
    fn drop(&mut self) {
        if let Some(emitter) = self.emitter.take() {
            emitter.fail("response body dropped before completion");
        }
    }
}
