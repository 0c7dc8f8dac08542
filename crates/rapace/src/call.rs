//! Call state machine (C6) shared by both call directions.
//!
//! States follow the source pack's stream lifecycle naming
//! (`Created -> Initiated -> Open -> HalfClosed{Local,Remote} -> Closed`);
//! transitions are driven by whichever side reads/writes metadata or
//! payload frames for a stream. Every client-streaming and bidirectional
//! handle (`caller.rs`) owns one `CallStateCell` for the lifetime of its
//! call, so the enum tracks a real call rather than sitting unused: it's
//! the one hard invariant this crate enforces above the transport, a local
//! send issued after `finish_sending` fails fast with `FAILED_PRECONDITION`
//! rather than reaching the transport at all (§4.6.3), distinct from the
//! transport's own `INTERNAL`-producing half-close bookkeeping (§4.4).
//! `finish_sending` itself is idempotent: repeat calls are a silent no-op.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, BoxStream};
use serde::de::DeserializeOwned;
use serde::Serialize;

use rapace_codec::Codec;
use rapace_core::{MessageKind, Status, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Created,
    Initiated,
    Open,
    HalfClosedLocal,
    HalfClosedRemote,
    Closed,
}

impl CallState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => CallState::Created,
            1 => CallState::Initiated,
            2 => CallState::Open,
            3 => CallState::HalfClosedLocal,
            4 => CallState::HalfClosedRemote,
            _ => CallState::Closed,
        }
    }
}

/// Atomic cell tracking a single call's state, shared between the task
/// driving local sends and the task draining inbound messages.
pub(crate) struct CallStateCell(AtomicU8);

impl CallStateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(CallState::Created as u8))
    }

    pub(crate) fn get(&self) -> CallState {
        CallState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: CallState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Mark the local send side finished. Idempotent (§4.6.3): returns
    /// `true` the first time the local side closes, `false` on every
    /// repeat call, and never touches the transport on a repeat.
    pub(crate) fn finish_local(&self) -> bool {
        match self.get() {
            CallState::HalfClosedLocal | CallState::Closed => false,
            CallState::HalfClosedRemote => {
                self.set(CallState::Closed);
                true
            }
            _ => {
                self.set(CallState::HalfClosedLocal);
                true
            }
        }
    }

    /// Reject a local send issued after `finish_sending` without reaching
    /// the transport.
    pub(crate) fn check_can_send(&self) -> Result<(), Status> {
        match self.get() {
            CallState::HalfClosedLocal | CallState::Closed => Err(Status::failed_precondition(
                "send attempted after finish_sending",
            )),
            _ => Ok(()),
        }
    }

    pub(crate) fn mark_remote_half_closed(&self) {
        match self.get() {
            CallState::HalfClosedLocal => self.set(CallState::Closed),
            CallState::Closed => {}
            _ => self.set(CallState::HalfClosedRemote),
        }
    }
}

/// Drain `stream_id`'s inbound payloads as a byte stream, terminating the
/// stream on end-of-stream, an error trailer, or a transport error.
///
/// Initial metadata and ok trailers are consumed silently; a non-ok trailer
/// or a transport error becomes the stream's single terminal `Err` item.
pub(crate) fn drive_inbound<T: Transport>(
    transport: Arc<T>,
    stream_id: u32,
) -> BoxStream<'static, Result<Bytes, Status>> {
    Box::pin(stream::unfold(
        Some((transport, stream_id)),
        |state| async move {
            let (transport, stream_id) = state?;
            loop {
                let msg = match transport.messages_for(stream_id).await {
                    Ok(m) => m,
                    Err(e) => return Some((Err(Status::from(e)), None)),
                };
                match msg.kind {
                    MessageKind::Metadata => {
                        if let Some(status) =
                            msg.metadata.as_ref().and_then(|m| m.trailer_status())
                        {
                            if status.is_ok() {
                                return None;
                            }
                            return Some((Err(status), None));
                        }
                        if msg.end_of_stream {
                            return None;
                        }
                        continue;
                    }
                    MessageKind::Payload => {
                        let bytes = msg.bytes.unwrap_or_default();
                        if msg.end_of_stream {
                            // `finish_sending` closes a stream with an empty
                            // EOS-only marker frame; don't surface it as a
                            // spurious empty item.
                            if bytes.is_empty() {
                                return None;
                            }
                            return Some((Ok(bytes), None));
                        }
                        return Some((Ok(bytes), Some((transport, stream_id))));
                    }
                }
            }
        },
    ))
}

/// Read exactly one successful payload off `stream_id`, treating initial
/// metadata, a second payload, or a trailer as protocol errors (callers use
/// this for the single-response half of unary/client-streaming calls).
pub(crate) async fn read_single_message<T: Transport>(
    transport: &T,
    stream_id: u32,
) -> Result<Bytes, Status> {
    let mut payload: Option<Bytes> = None;
    loop {
        let msg = transport.messages_for(stream_id).await.map_err(Status::from)?;
        match msg.kind {
            MessageKind::Metadata => {
                if let Some(status) = msg.metadata.as_ref().and_then(|m| m.trailer_status()) {
                    if status.is_ok() {
                        match payload {
                            Some(bytes) => return Ok(bytes),
                            None => {
                                return Err(Status::internal(
                                    "call completed ok without a response payload",
                                ))
                            }
                        }
                    }
                    return Err(status);
                }
                if msg.end_of_stream && payload.is_none() {
                    return Err(Status::internal("stream ended before a response arrived"));
                }
            }
            MessageKind::Payload => {
                if payload.is_some() {
                    return Err(Status::invalid_argument(
                        "unary call received more than one message",
                    ));
                }
                payload = Some(msg.bytes.unwrap_or_default());
                if msg.end_of_stream {
                    return Ok(payload.unwrap());
                }
            }
        }
    }
}

pub(crate) fn encode_val<T: Serialize, C: Codec>(val: &T) -> Result<Bytes, Status> {
    C::encode(val)
        .map(Bytes::from)
        .map_err(|e| Status::internal(e.to_string()))
}

pub(crate) fn decode_val<T: DeserializeOwned, C: Codec>(bytes: &[u8]) -> Result<T, Status> {
    C::decode::<T>(bytes).map_err(|e| Status::internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_local_is_idempotent() {
        let cell = CallStateCell::new();
        cell.set(CallState::Open);
        assert!(cell.finish_local());
        assert_eq!(cell.get(), CallState::HalfClosedLocal);
        // Repeat calls are a no-op: no error, no state change.
        assert!(!cell.finish_local());
        assert_eq!(cell.get(), CallState::HalfClosedLocal);
    }

    #[test]
    fn send_after_finish_local_is_rejected() {
        let cell = CallStateCell::new();
        cell.set(CallState::Open);
        cell.finish_local();
        let err = cell.check_can_send().unwrap_err();
        assert_eq!(err.code, rapace_core::StatusCode::FailedPrecondition);
    }

    #[test]
    fn remote_half_close_then_local_finish_closes_call() {
        let cell = CallStateCell::new();
        cell.set(CallState::Open);
        cell.mark_remote_half_closed();
        assert_eq!(cell.get(), CallState::HalfClosedRemote);
        cell.finish_local();
        assert_eq!(cell.get(), CallState::Closed);
    }
}
