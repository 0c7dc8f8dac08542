//! Caller/responder endpoints, call state machines and the contract
//! registry for the rapace RPC runtime.
//!
//! This is the facade crate: applications depend on `rapace` directly and
//! reach the lower layers (`rapace-core`'s transport/status/metadata types,
//! `rapace-codec`'s encodings, `rapace-distributor`'s fan-out primitive)
//! through its re-exports.

mod call;
mod caller;
mod registry;
mod responder;

pub use call::CallState;
pub use caller::{BidiHandle, CallerEndpoint, ClientStreamHandle};
pub use registry::{
    BidirectionalHandler, ClientStreamingHandler, ContractRegistry, ContractRegistryBuilder,
    Handler, InboundItem, MethodKind, OutboundItem, RegistryError, ServerStreamingHandler,
    UnaryHandler, MAX_METHOD_NAME_LEN, MAX_SERVICE_NAME_LEN,
};
pub use responder::{decode_request, ResponderEndpoint};

pub use rapace_codec::{Codec, Encoding, JsonCodec, PostcardCodec, RawCodec, RawCodecError, UnknownEncoding};
pub use rapace_core::{
    EndpointConfig, InProcTransport, MessageKind, Metadata, Role, Status, StatusCode, Transport,
    TransportConfig, TransportError, TransportMessage, TransportMetrics, TransportMetricsSnapshot,
};
pub use rapace_distributor::{
    Delivered, DistributorError, DistributorMetrics, DistributorMetricsSnapshot, StreamDistributor,
};
