//! Caller-side endpoint (C7): opens calls of all four shapes against a
//! concrete transport.
//!
//! Grounded on the source pack's client builder pattern (fluent config, one
//! entry point per call shape) adapted to the four shapes this runtime
//! supports rather than the teacher's single request/response RPC.
//!
//! `client_stream`/`bidi` return a handle (§4.7) rather than taking a
//! pre-built `Stream<Request>`: the caller drives sends manually via
//! `send`/`finish_sending`, which is what makes finish_sending's idempotence
//! and the FAILED_PRECONDITION-on-late-send rule (§4.6.3) observable through
//! the public API instead of only on `CallStateCell` in isolation.

use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

use rapace_codec::Codec;
use rapace_core::{EndpointConfig, Metadata, Status, Transport};

use crate::call::{decode_val, drive_inbound, encode_val, read_single_message, CallStateCell};

/// Opens outbound calls against a transport shared with other endpoints.
pub struct CallerEndpoint<T: Transport> {
    transport: Arc<T>,
    config: EndpointConfig,
    authority: Option<String>,
}

impl<T: Transport> CallerEndpoint<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self::with_config(transport, EndpointConfig::default())
    }

    pub fn with_config(transport: Arc<T>, config: EndpointConfig) -> Self {
        Self {
            transport,
            config,
            authority: None,
        }
    }

    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = Some(authority.into());
        self
    }

    /// `Request -> Future<Response>` (§4.6.1).
    pub async fn unary<Req, Resp, C>(
        &self,
        service: &str,
        method: &str,
        request: Req,
    ) -> Result<Resp, Status>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
        C: Codec,
    {
        let stream_id = self.transport.create_stream().map_err(Status::from)?;
        let md = Metadata::for_client_request(service, method, self.authority.as_deref());
        self.transport
            .send_metadata(stream_id, md, false)
            .await
            .map_err(Status::from)?;
        let body = encode_val::<Req, C>(&request)?;
        self.transport
            .send_message(stream_id, body, true)
            .await
            .map_err(Status::from)?;

        let result = tokio::time::timeout(
            self.config.unary_timeout,
            read_single_message(self.transport.as_ref(), stream_id),
        )
        .await;

        self.transport.release_stream_id(stream_id);

        match result {
            Ok(Ok(bytes)) => decode_val::<Resp, C>(&bytes),
            Ok(Err(status)) => Err(status),
            Err(_) => Err(Status::deadline_exceeded("unary call timed out")),
        }
    }

    /// `Request -> Stream<Response>` (§4.6.2).
    pub async fn server_streaming<Req, Resp, C>(
        &self,
        service: &str,
        method: &str,
        request: Req,
    ) -> Result<BoxStream<'static, Result<Resp, Status>>, Status>
    where
        Req: Serialize,
        Resp: DeserializeOwned + Send + 'static,
        C: Codec + 'static,
    {
        let stream_id = self.transport.create_stream().map_err(Status::from)?;
        let md = Metadata::for_client_request(service, method, self.authority.as_deref());
        self.transport
            .send_metadata(stream_id, md, false)
            .await
            .map_err(Status::from)?;
        let body = encode_val::<Req, C>(&request)?;
        self.transport
            .send_message(stream_id, body, true)
            .await
            .map_err(Status::from)?;

        let inbound = drive_inbound(self.transport.clone(), stream_id);
        Ok(Box::pin(
            inbound.map(|item| item.and_then(|bytes| decode_val::<Resp, C>(&bytes))),
        ))
    }

    /// `Stream<Request> -> Future<Response>` (§4.6.3). Returns a handle: the
    /// caller drives `send`/`finish_sending` manually, then awaits the
    /// single response.
    pub async fn client_stream<Req, Resp, C>(
        &self,
        service: &str,
        method: &str,
    ) -> Result<ClientStreamHandle<T, Req, Resp, C>, Status>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
        C: Codec,
    {
        let stream_id = self.transport.create_stream().map_err(Status::from)?;
        let md = Metadata::for_client_request(service, method, self.authority.as_deref());
        self.transport
            .send_metadata(stream_id, md, false)
            .await
            .map_err(Status::from)?;

        Ok(ClientStreamHandle {
            sender: CallSender::new(self.transport.clone(), stream_id),
            transport: self.transport.clone(),
            stream_id,
            _resp: PhantomData,
        })
    }

    /// `Stream<Request> -> Stream<Response>` (§4.6.4). Returns a handle:
    /// `send`/`finish_sending` drive the outbound half, `responses` is the
    /// inbound stream, independent and usable concurrently with sending.
    pub async fn bidi<Req, Resp, C>(
        &self,
        service: &str,
        method: &str,
    ) -> Result<BidiHandle<T, Req, Resp, C>, Status>
    where
        Req: Serialize + Send + 'static,
        Resp: DeserializeOwned + Send + 'static,
        C: Codec + 'static,
    {
        let stream_id = self.transport.create_stream().map_err(Status::from)?;
        let md = Metadata::for_client_request(service, method, self.authority.as_deref());
        self.transport
            .send_metadata(stream_id, md, false)
            .await
            .map_err(Status::from)?;

        let inbound = drive_inbound(self.transport.clone(), stream_id);
        let responses =
            Box::pin(inbound.map(|item| item.and_then(|bytes| decode_val::<Resp, C>(&bytes))));

        Ok(BidiHandle {
            sender: CallSender::new(self.transport.clone(), stream_id),
            responses,
        })
    }
}

/// Shared outbound half of a client-streaming or bidirectional call: tracks
/// the call's `CallStateCell` so that `finish_sending` is idempotent and a
/// `send` issued after it fails fast with `FAILED_PRECONDITION` instead of
/// reaching the transport (§4.6.3).
struct CallSender<T: Transport, Req, C> {
    transport: Arc<T>,
    stream_id: u32,
    state: Arc<CallStateCell>,
    _req: PhantomData<fn() -> Req>,
    _codec: PhantomData<fn() -> C>,
}

impl<T: Transport, Req: Serialize, C: Codec> CallSender<T, Req, C> {
    fn new(transport: Arc<T>, stream_id: u32) -> Self {
        Self {
            transport,
            stream_id,
            state: Arc::new(CallStateCell::new()),
            _req: PhantomData,
            _codec: PhantomData,
        }
    }

    async fn send(&self, request: Req) -> Result<(), Status> {
        self.state.check_can_send()?;
        let body = encode_val::<Req, C>(&request)?;
        self.transport
            .send_message(self.stream_id, body, false)
            .await
            .map_err(Status::from)
    }

    /// Idempotent: a repeat call is a no-op that never touches the
    /// transport (§4.6.3).
    async fn finish_sending(&self) -> Result<(), Status> {
        if !self.state.finish_local() {
            return Ok(());
        }
        self.transport
            .finish_sending(self.stream_id)
            .await
            .map_err(Status::from)
    }
}

/// Handle returned by [`CallerEndpoint::client_stream`].
pub struct ClientStreamHandle<T: Transport, Req, Resp, C> {
    sender: CallSender<T, Req, C>,
    transport: Arc<T>,
    stream_id: u32,
    _resp: PhantomData<fn() -> Resp>,
}

impl<T: Transport, Req: Serialize, Resp: DeserializeOwned, C: Codec> ClientStreamHandle<T, Req, Resp, C> {
    /// Send one request message. Fails with `FAILED_PRECONDITION` if
    /// `finish_sending` has already been called.
    pub async fn send(&self, request: Req) -> Result<(), Status> {
        self.sender.send(request).await
    }

    /// Half-close the local side. Idempotent.
    pub async fn finish_sending(&self) -> Result<(), Status> {
        self.sender.finish_sending().await
    }

    /// Await the single response payload and trailer, consuming the handle.
    pub async fn await_response(self) -> Result<Resp, Status> {
        let bytes = read_single_message(self.transport.as_ref(), self.stream_id).await;
        self.transport.release_stream_id(self.stream_id);
        decode_val::<Resp, C>(&bytes?)
    }
}

/// Handle returned by [`CallerEndpoint::bidi`].
pub struct BidiHandle<T: Transport, Req, Resp, C> {
    sender: CallSender<T, Req, C>,
    /// Inbound response stream, independent of the outbound half: either
    /// side may close first (§4.6.4).
    pub responses: BoxStream<'static, Result<Resp, Status>>,
}

impl<T: Transport, Req: Serialize, Resp, C: Codec> BidiHandle<T, Req, Resp, C> {
    /// Send one request message. Fails with `FAILED_PRECONDITION` if
    /// `finish_sending` has already been called.
    pub async fn send(&self, request: Req) -> Result<(), Status> {
        self.sender.send(request).await
    }

    /// Half-close the local side. Idempotent.
    pub async fn finish_sending(&self) -> Result<(), Status> {
        self.sender.finish_sending().await
    }
}
