//! Responder-side endpoint (C7): the dispatcher loop and per-call drivers
//! that turn inbound stream traffic into handler invocations.
//!
//! Grounded on the source pack's `ServiceDispatch`/registry-lookup loop: a
//! single task owns `transport.incoming()`, resolves `(service, method)`
//! against the registry, and spawns one task per accepted call so that slow
//! handlers never stall routing of unrelated streams.

use std::sync::Arc;

use bytes::Bytes;
use futures::stream::StreamExt;

use rapace_core::{EndpointConfig, Metadata, Status, StatusCode, Transport, TransportMessage};

use crate::call::{decode_val, drive_inbound, read_single_message};
use crate::registry::{ContractRegistry, Handler, MethodKind};

/// Serves registered methods over a transport.
pub struct ResponderEndpoint<T: Transport> {
    transport: Arc<T>,
    registry: Arc<ContractRegistry>,
    config: EndpointConfig,
}

impl<T: Transport> ResponderEndpoint<T> {
    pub fn new(transport: Arc<T>, registry: ContractRegistry) -> Self {
        Self::with_config(transport, registry, EndpointConfig::default())
    }

    pub fn with_config(transport: Arc<T>, registry: ContractRegistry, config: EndpointConfig) -> Self {
        Self {
            transport,
            registry: Arc::new(registry),
            config,
        }
    }

    /// Run the dispatcher loop until the transport closes or is asked to
    /// stop. One task per accepted stream; routing never blocks on a
    /// handler.
    pub async fn serve(&self) {
        loop {
            match self.transport.incoming().await {
                Ok(msg) => self.route(msg),
                Err(e) => {
                    tracing::debug!(?e, "responder dispatcher loop exiting: transport closed");
                    break;
                }
            }
        }
    }

    /// Close the transport after waiting for in-flight calls to wind down,
    /// up to `close_grace_period`.
    pub async fn shutdown(&self) {
        tokio::time::sleep(self.config.close_grace_period).await;
        self.transport.close();
    }

    fn route(&self, msg: TransportMessage) {
        if !msg.is_metadata() {
            // Traffic for a stream already handed off to its call task; that
            // task drains it via `messages_for`, not the dispatcher.
            return;
        }

        let stream_id = msg.stream_id;
        let metadata = match &msg.metadata {
            Some(md) => md,
            None => return,
        };

        let (service, method) = match (metadata.service_name(), metadata.method_name()) {
            (Some(s), Some(m)) => (s.to_string(), m.to_string()),
            _ => {
                tracing::debug!(stream_id, "dropping stream with unparseable :path");
                return;
            }
        };

        let Some((kind, handler)) = self.registry.lookup(&service, &method) else {
            let transport = self.transport.clone();
            tokio::spawn(async move {
                let _ = transport
                    .send_metadata(
                        stream_id,
                        Metadata::for_trailer(
                            StatusCode::Unimplemented,
                            Some(&format!("no handler registered for {service}/{method}")),
                        ),
                        true,
                    )
                    .await;
                transport.release_stream_id(stream_id);
            });
            return;
        };

        let transport = self.transport.clone();
        tokio::spawn(async move {
            dispatch_call(transport, stream_id, kind, handler).await;
        });
    }
}

async fn dispatch_call<T: Transport>(
    transport: Arc<T>,
    stream_id: u32,
    kind: MethodKind,
    handler: Handler,
) {
    match (kind, handler) {
        (MethodKind::Unary, Handler::Unary(f)) => {
            let result = match read_single_message(transport.as_ref(), stream_id).await {
                Ok(req) => f(req).await,
                Err(status) => Err(status),
            };
            send_unary_result(transport.as_ref(), stream_id, result).await;
        }
        (MethodKind::ServerStreaming, Handler::ServerStreaming(f)) => {
            let outcome = match read_single_message(transport.as_ref(), stream_id).await {
                Ok(req) => f(req),
                Err(status) => Err(status),
            };
            match outcome {
                Ok(stream) => send_streaming_result(transport.as_ref(), stream_id, stream).await,
                Err(status) => send_trailer_only(transport.as_ref(), stream_id, Err(status)).await,
            }
        }
        (MethodKind::ClientStreaming, Handler::ClientStreaming(f)) => {
            let inbound = drive_inbound(transport.clone(), stream_id);
            let result = f(inbound).await;
            send_unary_result(transport.as_ref(), stream_id, result).await;
        }
        (MethodKind::Bidirectional, Handler::Bidirectional(f)) => {
            let inbound = drive_inbound(transport.clone(), stream_id);
            let outbound = f(inbound);
            send_streaming_result(transport.as_ref(), stream_id, outbound).await;
        }
        _ => unreachable!("registry guarantees kind and handler variant agree"),
    }

    transport.release_stream_id(stream_id);
}

async fn send_unary_result<T: Transport>(
    transport: &T,
    stream_id: u32,
    result: Result<Bytes, Status>,
) {
    if transport
        .send_metadata(stream_id, Metadata::for_server_initial(), false)
        .await
        .is_err()
    {
        return;
    }
    match result {
        Ok(bytes) => {
            if transport.send_message(stream_id, bytes, false).await.is_err() {
                return;
            }
            let _ = transport
                .send_metadata(stream_id, Metadata::for_trailer(StatusCode::Ok, None), true)
                .await;
        }
        Err(status) => {
            let _ = transport
                .send_metadata(
                    stream_id,
                    Metadata::for_trailer(status.code, Some(&status.message)),
                    true,
                )
                .await;
        }
    }
}

async fn send_trailer_only<T: Transport>(transport: &T, stream_id: u32, result: Result<(), Status>) {
    let status = result.err().unwrap_or_else(Status::ok);
    let _ = transport
        .send_metadata(
            stream_id,
            Metadata::for_trailer(status.code, Some(&status.message)),
            true,
        )
        .await;
}

async fn send_streaming_result<T: Transport>(
    transport: &T,
    stream_id: u32,
    mut stream: futures::stream::BoxStream<'static, Result<Bytes, Status>>,
) {
    if transport
        .send_metadata(stream_id, Metadata::for_server_initial(), false)
        .await
        .is_err()
    {
        return;
    }

    let mut terminal = Status::ok();
    while let Some(item) = stream.next().await {
        match item {
            Ok(bytes) => {
                if transport.send_message(stream_id, bytes, false).await.is_err() {
                    return;
                }
            }
            Err(status) => {
                terminal = status;
                break;
            }
        }
    }

    let _ = transport
        .send_metadata(
            stream_id,
            Metadata::for_trailer(terminal.code, Some(&terminal.message)),
            true,
        )
        .await;
}

/// Helper for handlers that need to decode a single already-read request
/// without going through a registered [`Handler`] (used by tests and by
/// demo services in `rapace-testkit`).
pub fn decode_request<Req, C>(bytes: &[u8]) -> Result<Req, Status>
where
    Req: serde::de::DeserializeOwned,
    C: rapace_codec::Codec,
{
    decode_val::<Req, C>(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapace_codec::JsonCodec;
    use rapace_core::{InProcTransport, TransportConfig};

    use crate::caller::CallerEndpoint;
    use crate::registry::ContractRegistryBuilder;

    #[tokio::test]
    async fn unknown_method_returns_unimplemented() {
        let (caller_t, responder_t) = InProcTransport::pair(TransportConfig::default());
        let registry = ContractRegistryBuilder::new().build();
        let responder = ResponderEndpoint::new(Arc::new(responder_t), registry);
        tokio::spawn(async move { responder.serve().await });

        let caller = CallerEndpoint::new(Arc::new(caller_t));
        let err = caller
            .unary::<i32, i32, JsonCodec>("Calc", "Add", 1)
            .await
            .unwrap_err();
        assert_eq!(err.code, StatusCode::Unimplemented);
    }

    #[tokio::test]
    async fn unary_handler_round_trips_through_full_stack() {
        let (caller_t, responder_t) = InProcTransport::pair(TransportConfig::default());
        let registry = ContractRegistryBuilder::new()
            .unary::<(i32, i32), i32, JsonCodec, _, _>("Calc", "Add", |(a, b)| async move {
                Ok(a + b)
            })
            .unwrap()
            .build();
        let responder = ResponderEndpoint::new(Arc::new(responder_t), registry);
        tokio::spawn(async move { responder.serve().await });

        let caller = CallerEndpoint::new(Arc::new(caller_t));
        let sum: i32 = caller
            .unary::<(i32, i32), i32, JsonCodec>("Calc", "Add", (2, 40))
            .await
            .unwrap();
        assert_eq!(sum, 42);
    }

    #[tokio::test]
    async fn server_streaming_handler_emits_several_messages() {
        let (caller_t, responder_t) = InProcTransport::pair(TransportConfig::default());
        let registry = ContractRegistryBuilder::new()
            .server_streaming::<i32, i32, JsonCodec, _, _>("Counter", "From", |start: i32| {
                let items = (start..start + 3).map(Ok);
                Ok(futures::stream::iter(items))
            })
            .unwrap()
            .build();
        let responder = ResponderEndpoint::new(Arc::new(responder_t), registry);
        tokio::spawn(async move { responder.serve().await });

        let caller = CallerEndpoint::new(Arc::new(caller_t));
        let stream = caller
            .server_streaming::<i32, i32, JsonCodec>("Counter", "From", 10)
            .await
            .unwrap();
        let values: Vec<i32> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(values, vec![10, 11, 12]);
    }

    #[tokio::test]
    async fn client_streaming_handler_aggregates() {
        let (caller_t, responder_t) = InProcTransport::pair(TransportConfig::default());
        let registry = ContractRegistryBuilder::new()
            .client_streaming::<i32, i32, JsonCodec, _, _>("Calc", "Sum", |mut reqs| async move {
                let mut total = 0;
                while let Some(item) = reqs.next().await {
                    total += item?;
                }
                Ok(total)
            })
            .unwrap()
            .build();
        let responder = ResponderEndpoint::new(Arc::new(responder_t), registry);
        tokio::spawn(async move { responder.serve().await });

        let caller = CallerEndpoint::new(Arc::new(caller_t));
        let handle = caller
            .client_stream::<i32, i32, JsonCodec>("Calc", "Sum")
            .await
            .unwrap();
        for n in [1, 2, 3, 4] {
            handle.send(n).await.unwrap();
        }
        handle.finish_sending().await.unwrap();
        let total: i32 = handle.await_response().await.unwrap();
        assert_eq!(total, 10);
    }

    #[tokio::test]
    async fn bidirectional_handler_echoes_doubled() {
        let (caller_t, responder_t) = InProcTransport::pair(TransportConfig::default());
        let registry = ContractRegistryBuilder::new()
            .bidirectional::<i32, i32, JsonCodec, _, _>("Echo", "Double", |reqs| {
                reqs.map(|item| item.map(|n| n * 2))
            })
            .unwrap()
            .build();
        let responder = ResponderEndpoint::new(Arc::new(responder_t), registry);
        tokio::spawn(async move { responder.serve().await });

        let caller = CallerEndpoint::new(Arc::new(caller_t));
        let handle = caller
            .bidi::<i32, i32, JsonCodec>("Echo", "Double")
            .await
            .unwrap();
        for n in [1, 2, 3] {
            handle.send(n).await.unwrap();
        }
        handle.finish_sending().await.unwrap();
        let values: Vec<i32> = handle.responses.map(|r| r.unwrap()).collect().await;
        assert_eq!(values, vec![2, 4, 6]);
    }
}
