//! The transport abstraction (C4): a byte-oriented, stream-multiplexed
//! channel. `Transport` is generic-friendly (native async-fn-in-trait,
//! `-> impl Future<...> + Send`) rather than `dyn`-friendly, mirroring the
//! source pack's `ServiceDispatch::dispatch` idiom: every owner in this
//! crate family is generic over one concrete transport, so there is no need
//! to pay for dynamic dispatch or an `async-trait` shim.

use std::future::Future;

use bytes::Bytes;

use crate::error::TransportError;
use crate::metadata::Metadata;

pub mod mem;

/// Which half of a `TransportMessage` is populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Metadata,
    Payload,
}

/// A single multiplexed message traveling over a transport (§3).
///
/// Exactly one of `bytes`/`metadata` is populated, matching `kind`.
/// `method_path` is only meaningful on the first outbound metadata of a
/// stream (it is where `:path` lives, surfaced here for convenience).
#[derive(Debug, Clone)]
pub struct TransportMessage {
    pub stream_id: u32,
    pub kind: MessageKind,
    pub bytes: Option<Bytes>,
    pub metadata: Option<Metadata>,
    pub end_of_stream: bool,
    pub method_path: Option<String>,
}

impl TransportMessage {
    pub fn metadata(stream_id: u32, metadata: Metadata, end_of_stream: bool) -> Self {
        let method_path = metadata.get(crate::metadata::PATH).map(str::to_owned);
        Self {
            stream_id,
            kind: MessageKind::Metadata,
            bytes: None,
            metadata: Some(metadata),
            end_of_stream,
            method_path,
        }
    }

    pub fn payload(stream_id: u32, bytes: Bytes, end_of_stream: bool) -> Self {
        Self {
            stream_id,
            kind: MessageKind::Payload,
            bytes: Some(bytes),
            metadata: None,
            end_of_stream,
            method_path: None,
        }
    }

    pub fn is_metadata(&self) -> bool {
        matches!(self.kind, MessageKind::Metadata)
    }

    pub fn is_payload(&self) -> bool {
        matches!(self.kind, MessageKind::Payload)
    }
}

/// The operations a transport implementer must provide (§4.4, §6).
///
/// Ordering and end-of-stream discipline are part of the contract: within a
/// stream, both directions preserve send order; `end_of_stream=true` is
/// observed at most once per direction per stream.
pub trait Transport: Send + Sync + 'static {
    /// Allocate a new stream ID for an outbound call. Synchronous: stream-ID
    /// allocation never suspends.
    fn create_stream(&self) -> Result<u32, TransportError>;

    /// Send initial or trailing metadata for a stream.
    fn send_metadata(
        &self,
        stream_id: u32,
        metadata: Metadata,
        end_of_stream: bool,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Send a framed payload for a stream.
    fn send_message(
        &self,
        stream_id: u32,
        bytes: Bytes,
        end_of_stream: bool,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Half-close the local send side of a stream without attaching a
    /// payload or metadata of its own.
    fn finish_sending(
        &self,
        stream_id: u32,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Pull the next inbound message across every stream, in arrival order.
    /// Intended for a single consumer: the endpoint's dispatcher loop.
    fn incoming(&self) -> impl Future<Output = Result<TransportMessage, TransportError>> + Send;

    /// Pull the next inbound message already routed to `stream_id`. Callers
    /// first see a stream's traffic via `incoming()`; once the dispatcher
    /// hands a stream off to its call task, that task drains the rest of the
    /// stream's traffic through this method.
    fn messages_for(
        &self,
        stream_id: u32,
    ) -> impl Future<Output = Result<TransportMessage, TransportError>> + Send;

    /// Release a stream ID once both directions have reached end-of-stream.
    fn release_stream_id(&self, stream_id: u32);

    /// Close the transport. Terminal: wakes all waiters with `UNAVAILABLE`.
    fn close(&self);

    fn is_closed(&self) -> bool;
}
