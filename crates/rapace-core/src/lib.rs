//! Transport abstraction, metadata, status codes, configuration and metrics
//! for the rapace RPC runtime.

mod config;
mod error;
mod metadata;
mod metrics;
mod transport;

pub use config::{EndpointConfig, TransportConfig};
pub use error::{Status, StatusCode, TransportError, MAX_STATUS_MESSAGE_LEN};
pub use metadata::{
    Metadata, AUTHORITY, CONTENT_TYPE, GRPC_MESSAGE, GRPC_STATUS, METHOD, PATH, SCHEME, STATUS, TE,
};
pub use metrics::{TransportMetrics, TransportMetricsSnapshot};
pub use transport::mem::InProcTransport;
pub use transport::{MessageKind, Transport, TransportMessage};

pub use rapace_wire::Role;
