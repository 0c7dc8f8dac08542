//! Header/trailer collections (§3, §4.5 of the runtime spec).

use crate::error::StatusCode;

pub const PATH: &str = ":path";
pub const METHOD: &str = ":method";
pub const SCHEME: &str = ":scheme";
pub const AUTHORITY: &str = ":authority";
pub const STATUS: &str = ":status";
pub const CONTENT_TYPE: &str = "content-type";
pub const TE: &str = "te";
pub const GRPC_STATUS: &str = "grpc-status";
pub const GRPC_MESSAGE: &str = "grpc-message";

const GRPC_CONTENT_TYPE: &str = "application/grpc";

/// An ordered sequence of `(name, value)` string pairs.
///
/// Lookups are case-sensitive and return the first match, mirroring the
/// header semantics of the spec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata(Vec<(String, String)>);

impl Metadata {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.push((name.into(), value.into()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The `ServiceName` component of `:path`, if present and well-formed.
    pub fn service_name(&self) -> Option<&str> {
        self.get(PATH).and_then(|p| split_path(p).map(|(s, _)| s))
    }

    /// The `MethodName` component of `:path`, if present and well-formed.
    pub fn method_name(&self) -> Option<&str> {
        self.get(PATH).and_then(|p| split_path(p).map(|(_, m)| m))
    }

    /// Initial metadata a caller sends to open a call.
    pub fn for_client_request(service: &str, method: &str, authority: Option<&str>) -> Self {
        let mut md = Self::new();
        md.insert(METHOD, "POST");
        md.insert(PATH, format!("/{service}/{method}"));
        md.insert(SCHEME, "http");
        if let Some(authority) = authority {
            md.insert(AUTHORITY, authority);
        }
        md.insert(CONTENT_TYPE, GRPC_CONTENT_TYPE);
        md.insert(TE, "trailers");
        md
    }

    /// Initial metadata a responder sends back once it accepts a call.
    pub fn for_server_initial() -> Self {
        let mut md = Self::new();
        md.insert(STATUS, "200");
        md.insert(CONTENT_TYPE, GRPC_CONTENT_TYPE);
        md
    }

    /// Terminal trailer metadata. Always paired with `end_of_stream=true`.
    pub fn for_trailer(status: StatusCode, message: Option<&str>) -> Self {
        let mut md = Self::new();
        md.insert(GRPC_STATUS, status.as_u32().to_string());
        if let Some(message) = message {
            let mut message = message.to_string();
            if message.len() > crate::error::MAX_STATUS_MESSAGE_LEN {
                message.truncate(crate::error::MAX_STATUS_MESSAGE_LEN);
            }
            md.insert(GRPC_MESSAGE, message);
        }
        md
    }

    /// Parse `grpc-status`/`grpc-message` out of a trailer, if present.
    pub fn trailer_status(&self) -> Option<crate::error::Status> {
        let code = self.get(GRPC_STATUS)?.parse::<u32>().ok()?;
        let code = StatusCode::from_u32(code)?;
        let message = self.get(GRPC_MESSAGE).unwrap_or_default();
        Some(crate::error::Status::new(code, message))
    }
}

fn split_path(path: &str) -> Option<(&str, &str)> {
    let rest = path.strip_prefix('/')?;
    let (service, method) = rest.split_once('/')?;
    if service.is_empty() || method.is_empty() {
        return None;
    }
    Some((service, method))
}
