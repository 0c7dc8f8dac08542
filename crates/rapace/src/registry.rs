//! Contract registry (C8): maps `(service, method) -> (kind, handler)`.
//!
//! Registration is generic over the request/response types and codec;
//! genericity is erased at registration time into a closure operating on
//! raw bytes, per the "type-erased codec objects bound at registration
//! time" design note — the dispatcher only ever sees `(service, method)`
//! strings and byte buffers. Naming and validation are grounded in the
//! source pack's `ServiceRegistryBuilder`/`RegistryError` (`MAX_*_LEN`
//! limits, duplicate-name rejection); the wire-serialized blob format that
//! file uses for out-of-process introspection is not needed here since
//! registration and dispatch happen in the same process.
//!
//! Nested sub-contracts (§4.8) are plain [`ContractRegistryBuilder`]s merged
//! in via [`ContractRegistryBuilder::sub_contract`]: each keeps its own
//! service name, and merging only adds a cross-contract duplicate check on
//! top of the one `insert` already does within a single builder.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_stream::Stream;

use rapace_codec::Codec;
use rapace_core::{Status, StatusCode};

/// Upper bound on a registered service name's length.
pub const MAX_SERVICE_NAME_LEN: usize = 256;
/// Upper bound on a registered method name's length.
pub const MAX_METHOD_NAME_LEN: usize = 128;

/// The four call shapes (§2, §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Unary,
    ServerStreaming,
    ClientStreaming,
    Bidirectional,
}

/// An already-decode-or-error'd inbound item, or an outbound item ready to
/// send: both directions flow as `Result<Bytes, Status>` once past the
/// erased boundary, so a codec failure mid-stream becomes a normal error
/// item rather than a panic or a silently-dropped message.
pub type InboundItem = Result<Bytes, Status>;
pub type OutboundItem = Result<Bytes, Status>;

pub type UnaryHandler = Arc<dyn Fn(Bytes) -> BoxFuture<'static, Result<Bytes, Status>> + Send + Sync>;
pub type ServerStreamingHandler =
    Arc<dyn Fn(Bytes) -> Result<BoxStream<'static, OutboundItem>, Status> + Send + Sync>;
pub type ClientStreamingHandler = Arc<
    dyn Fn(BoxStream<'static, InboundItem>) -> BoxFuture<'static, Result<Bytes, Status>>
        + Send
        + Sync,
>;
pub type BidirectionalHandler =
    Arc<dyn Fn(BoxStream<'static, InboundItem>) -> BoxStream<'static, OutboundItem> + Send + Sync>;

/// A type-erased, registered handler.
#[derive(Clone)]
pub enum Handler {
    Unary(UnaryHandler),
    ServerStreaming(ServerStreamingHandler),
    ClientStreaming(ClientStreamingHandler),
    Bidirectional(BidirectionalHandler),
}

#[derive(Clone)]
struct RegisteredMethod {
    kind: MethodKind,
    handler: Handler,
}

/// Errors raised while building a [`ContractRegistry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    EmptyServiceName,
    EmptyMethodName,
    ServiceNameTooLong { len: usize, max: usize },
    MethodNameTooLong { len: usize, max: usize },
    DuplicateMethod { service: String, method: String },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::EmptyServiceName => write!(f, "service name must not be empty"),
            RegistryError::EmptyMethodName => write!(f, "method name must not be empty"),
            RegistryError::ServiceNameTooLong { len, max } => {
                write!(f, "service name too long: {len} bytes exceeds limit of {max}")
            }
            RegistryError::MethodNameTooLong { len, max } => {
                write!(f, "method name too long: {len} bytes exceeds limit of {max}")
            }
            RegistryError::DuplicateMethod { service, method } => {
                write!(f, "duplicate method {service}/{method}")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

impl From<RegistryError> for Status {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::DuplicateMethod { .. } => {
                Status::new(StatusCode::AlreadyExists, err.to_string())
            }
            _ => Status::invalid_argument(err.to_string()),
        }
    }
}

/// Builds a frozen [`ContractRegistry`] one method at a time.
#[derive(Default)]
pub struct ContractRegistryBuilder {
    methods: HashMap<(String, String), RegisteredMethod>,
}

impl ContractRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unary method: `Request -> Future<Response>`.
    pub fn unary<Req, Resp, C, F, Fut>(
        self,
        service: impl Into<String>,
        method: impl Into<String>,
        handler: F,
    ) -> Result<Self, RegistryError>
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        C: Codec,
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, Status>> + Send + 'static,
    {
        let erased: UnaryHandler = Arc::new(move |bytes: Bytes| {
            match C::decode::<Req>(&bytes) {
                Ok(req) => {
                    let fut = handler(req);
                    Box::pin(async move {
                        let resp = fut.await?;
                        encode::<Resp, C>(&resp)
                    })
                }
                Err(e) => Box::pin(async move { Err(Status::internal(e.to_string())) }),
            }
        });
        self.insert(service, method, MethodKind::Unary, Handler::Unary(erased))
    }

    /// Register a server-streaming method: `Request -> Stream<Response>`.
    pub fn server_streaming<Req, Resp, C, F, S>(
        self,
        service: impl Into<String>,
        method: impl Into<String>,
        handler: F,
    ) -> Result<Self, RegistryError>
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        C: Codec,
        F: Fn(Req) -> Result<S, Status> + Send + Sync + 'static,
        S: Stream<Item = Result<Resp, Status>> + Send + 'static,
    {
        let erased: ServerStreamingHandler = Arc::new(move |bytes: Bytes| {
            let req = C::decode::<Req>(&bytes).map_err(|e| Status::internal(e.to_string()))?;
            let stream = handler(req)?;
            let mapped = stream.map(|item| match item {
                Ok(resp) => encode::<Resp, C>(&resp),
                Err(status) => Err(status),
            });
            Ok(Box::pin(mapped) as BoxStream<'static, OutboundItem>)
        });
        self.insert(
            service,
            method,
            MethodKind::ServerStreaming,
            Handler::ServerStreaming(erased),
        )
    }

    /// Register a client-streaming method: `Stream<Request> -> Future<Response>`.
    pub fn client_streaming<Req, Resp, C, F, Fut>(
        self,
        service: impl Into<String>,
        method: impl Into<String>,
        handler: F,
    ) -> Result<Self, RegistryError>
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        C: Codec,
        F: Fn(BoxStream<'static, Result<Req, Status>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, Status>> + Send + 'static,
    {
        let erased: ClientStreamingHandler = Arc::new(move |inbound| {
            let decoded = inbound.map(|item| decode::<Req, C>(item));
            let fut = handler(Box::pin(decoded));
            Box::pin(async move {
                let resp = fut.await?;
                encode::<Resp, C>(&resp)
            })
        });
        self.insert(
            service,
            method,
            MethodKind::ClientStreaming,
            Handler::ClientStreaming(erased),
        )
    }

    /// Register a bidirectional method: `Stream<Request> -> Stream<Response>`.
    pub fn bidirectional<Req, Resp, C, F, S>(
        self,
        service: impl Into<String>,
        method: impl Into<String>,
        handler: F,
    ) -> Result<Self, RegistryError>
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        C: Codec,
        F: Fn(BoxStream<'static, Result<Req, Status>>) -> S + Send + Sync + 'static,
        S: Stream<Item = Result<Resp, Status>> + Send + 'static,
    {
        let erased: BidirectionalHandler = Arc::new(move |inbound| {
            let decoded = inbound.map(|item| decode::<Req, C>(item));
            let out = handler(Box::pin(decoded));
            let mapped = out.map(|item| match item {
                Ok(resp) => encode::<Resp, C>(&resp),
                Err(status) => Err(status),
            });
            Box::pin(mapped) as BoxStream<'static, OutboundItem>
        });
        self.insert(
            service,
            method,
            MethodKind::Bidirectional,
            Handler::Bidirectional(erased),
        )
    }

    /// Merge a sub-contract's methods into this builder (§4.8). Each
    /// sub-contract registers its own methods under its own service name
    /// (there is no renaming here — `sub` is just another builder, built up
    /// the same way as the parent); this call only adds the cross-contract
    /// duplicate check: a `(service, method)` pair already present in
    /// `self`, whether registered directly or by an earlier sub-contract,
    /// fails with `DuplicateMethod` (`ALREADY_EXISTS`).
    pub fn sub_contract(mut self, sub: ContractRegistryBuilder) -> Result<Self, RegistryError> {
        for (key, registered) in sub.methods {
            if self.methods.contains_key(&key) {
                let (service, method) = key;
                return Err(RegistryError::DuplicateMethod { service, method });
            }
            self.methods.insert(key, registered);
        }
        Ok(self)
    }

    fn insert(
        mut self,
        service: impl Into<String>,
        method: impl Into<String>,
        kind: MethodKind,
        handler: Handler,
    ) -> Result<Self, RegistryError> {
        let service = service.into();
        let method = method.into();

        if service.is_empty() {
            return Err(RegistryError::EmptyServiceName);
        }
        if method.is_empty() {
            return Err(RegistryError::EmptyMethodName);
        }
        if service.len() > MAX_SERVICE_NAME_LEN {
            return Err(RegistryError::ServiceNameTooLong {
                len: service.len(),
                max: MAX_SERVICE_NAME_LEN,
            });
        }
        if method.len() > MAX_METHOD_NAME_LEN {
            return Err(RegistryError::MethodNameTooLong {
                len: method.len(),
                max: MAX_METHOD_NAME_LEN,
            });
        }

        let key = (service.clone(), method.clone());
        if self.methods.contains_key(&key) {
            return Err(RegistryError::DuplicateMethod { service, method });
        }
        self.methods.insert(key, RegisteredMethod { kind, handler });
        Ok(self)
    }

    /// Freeze the registry. No further registration is possible afterward.
    pub fn build(self) -> ContractRegistry {
        ContractRegistry {
            methods: self.methods,
        }
    }
}

fn encode<T: Serialize, C: Codec>(val: &T) -> Result<Bytes, Status> {
    C::encode(val)
        .map(Bytes::from)
        .map_err(|e| Status::internal(e.to_string()))
}

fn decode<T: DeserializeOwned, C: Codec>(item: InboundItem) -> Result<T, Status> {
    let bytes = item?;
    C::decode::<T>(&bytes).map_err(|e| Status::internal(e.to_string()))
}

/// A frozen, read-only mapping from `(service, method)` to handler.
///
/// Read lock-free after construction (§5): the dispatcher only ever reads.
pub struct ContractRegistry {
    methods: HashMap<(String, String), RegisteredMethod>,
}

impl ContractRegistry {
    pub fn lookup(&self, service: &str, method: &str) -> Option<(MethodKind, Handler)> {
        self.methods
            .get(&(service.to_string(), method.to_string()))
            .map(|m| (m.kind, m.handler.clone()))
    }

    pub fn contains(&self, service: &str, method: &str) -> bool {
        self.methods
            .contains_key(&(service.to_string(), method.to_string()))
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapace_codec::JsonCodec;

    #[tokio::test]
    async fn unary_round_trip_through_erased_handler() {
        let registry = ContractRegistryBuilder::new()
            .unary::<i32, i32, JsonCodec, _, _>("Calc", "Double", |req: i32| async move {
                Ok(req * 2)
            })
            .unwrap()
            .build();

        let (kind, handler) = registry.lookup("Calc", "Double").unwrap();
        assert_eq!(kind, MethodKind::Unary);
        let Handler::Unary(f) = handler else {
            panic!("expected unary handler");
        };
        let input = JsonCodec::encode(&21i32).unwrap();
        let output = f(Bytes::from(input)).await.unwrap();
        let decoded: i32 = JsonCodec::decode(&output).unwrap();
        assert_eq!(decoded, 42);
    }

    #[test]
    fn duplicate_registration_fails() {
        let err = ContractRegistryBuilder::new()
            .unary::<i32, i32, JsonCodec, _, _>("Calc", "Add", |_: i32| async { Ok(0) })
            .unwrap()
            .unary::<i32, i32, JsonCodec, _, _>("Calc", "Add", |_: i32| async { Ok(0) })
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateMethod {
                service: "Calc".into(),
                method: "Add".into(),
            }
        );
    }

    #[test]
    fn empty_names_rejected() {
        let err = ContractRegistryBuilder::new()
            .unary::<i32, i32, JsonCodec, _, _>("", "Add", |_: i32| async { Ok(0) })
            .unwrap_err();
        assert_eq!(err, RegistryError::EmptyServiceName);
    }

    #[test]
    fn sub_contract_methods_are_exposed_under_their_own_service_name() {
        let sub = ContractRegistryBuilder::new()
            .unary::<i32, i32, JsonCodec, _, _>("Health", "Check", |_: i32| async { Ok(1) })
            .unwrap();
        let registry = ContractRegistryBuilder::new()
            .unary::<i32, i32, JsonCodec, _, _>("Calc", "Add", |_: i32| async { Ok(0) })
            .unwrap()
            .sub_contract(sub)
            .unwrap()
            .build();

        assert!(registry.contains("Calc", "Add"));
        assert!(registry.contains("Health", "Check"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn sub_contract_duplicate_across_services_fails_already_exists() {
        let sub = ContractRegistryBuilder::new()
            .unary::<i32, i32, JsonCodec, _, _>("Calc", "Add", |_: i32| async { Ok(0) })
            .unwrap();
        let err = ContractRegistryBuilder::new()
            .unary::<i32, i32, JsonCodec, _, _>("Calc", "Add", |_: i32| async { Ok(0) })
            .unwrap()
            .sub_contract(sub)
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateMethod {
                service: "Calc".into(),
                method: "Add".into(),
            }
        );
    }

    #[test]
    fn registry_error_maps_to_already_exists_status() {
        let err = RegistryError::DuplicateMethod {
            service: "Calc".into(),
            method: "Add".into(),
        };
        let status: Status = err.into();
        assert_eq!(status.code, StatusCode::AlreadyExists);
    }
}
