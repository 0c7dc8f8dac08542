//! Status codes and error types shared across the runtime.

use std::fmt;

/// gRPC-style status code subset used by the core (§3 of the runtime spec).
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
}

impl StatusCode {
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::Ok),
            1 => Some(Self::Cancelled),
            2 => Some(Self::Unknown),
            3 => Some(Self::InvalidArgument),
            4 => Some(Self::DeadlineExceeded),
            5 => Some(Self::NotFound),
            6 => Some(Self::AlreadyExists),
            8 => Some(Self::ResourceExhausted),
            9 => Some(Self::FailedPrecondition),
            12 => Some(Self::Unimplemented),
            13 => Some(Self::Internal),
            14 => Some(Self::Unavailable),
            _ => None,
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatusCode::Ok => "OK",
            StatusCode::Cancelled => "CANCELLED",
            StatusCode::Unknown => "UNKNOWN",
            StatusCode::InvalidArgument => "INVALID_ARGUMENT",
            StatusCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            StatusCode::NotFound => "NOT_FOUND",
            StatusCode::AlreadyExists => "ALREADY_EXISTS",
            StatusCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            StatusCode::FailedPrecondition => "FAILED_PRECONDITION",
            StatusCode::Unimplemented => "UNIMPLEMENTED",
            StatusCode::Internal => "INTERNAL",
            StatusCode::Unavailable => "UNAVAILABLE",
        };
        write!(f, "{s}")
    }
}

/// Length `grpc-message` is truncated to on the wire (§6).
pub const MAX_STATUS_MESSAGE_LEN: usize = 8 * 1024;

/// A call's terminal outcome: a status code plus a human-readable message.
///
/// Carried in trailers (`grpc-status`/`grpc-message`) and surfaced to callers
/// as a typed failure for anything other than `Ok`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub code: StatusCode,
    pub message: String,
}

impl Status {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.len() > MAX_STATUS_MESSAGE_LEN {
            message.truncate(MAX_STATUS_MESSAGE_LEN);
        }
        Self { code, message }
    }

    pub fn ok() -> Self {
        Self::new(StatusCode::Ok, "")
    }

    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Cancelled, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(StatusCode::DeadlineExceeded, message)
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Unimplemented, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(StatusCode::InvalidArgument, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Internal, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Unavailable, message)
    }

    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::new(StatusCode::ResourceExhausted, message)
    }

    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FailedPrecondition, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(StatusCode::AlreadyExists, message)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

impl std::error::Error for Status {}

/// Errors raised by a [`crate::Transport`] implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The transport has been closed, locally or by the peer going away.
    Closed,
    /// Sending would exceed the transport-wide flow-control window even
    /// after growing it to its configured maximum.
    WindowExceeded { requested: u64, available: u64 },
    /// A send was attempted for a stream ID the transport doesn't know.
    UnknownStream(u32),
    /// `create_stream` was called but the stream-ID space is exhausted.
    StreamIdsExhausted,
    /// A send was attempted on a stream that already observed a local
    /// `end_of_stream`.
    AlreadyHalfClosed(u32),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Closed => write!(f, "transport is closed"),
            TransportError::WindowExceeded {
                requested,
                available,
            } => write!(
                f,
                "flow-control window exceeded: requested {requested} bytes, {available} available"
            ),
            TransportError::UnknownStream(id) => write!(f, "unknown stream id {id}"),
            TransportError::StreamIdsExhausted => write!(f, "stream ids exhausted"),
            TransportError::AlreadyHalfClosed(id) => {
                write!(f, "stream {id} already half-closed locally")
            }
        }
    }
}

impl std::error::Error for TransportError {}

impl From<TransportError> for Status {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Closed => Status::unavailable(err.to_string()),
            TransportError::WindowExceeded { .. } => Status::resource_exhausted(err.to_string()),
            TransportError::StreamIdsExhausted => Status::resource_exhausted(err.to_string()),
            TransportError::UnknownStream(_) => Status::internal(err.to_string()),
            TransportError::AlreadyHalfClosed(_) => Status::internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_roundtrip() {
        let codes = [
            StatusCode::Ok,
            StatusCode::Cancelled,
            StatusCode::Unknown,
            StatusCode::InvalidArgument,
            StatusCode::DeadlineExceeded,
            StatusCode::NotFound,
            StatusCode::AlreadyExists,
            StatusCode::ResourceExhausted,
            StatusCode::FailedPrecondition,
            StatusCode::Unimplemented,
            StatusCode::Internal,
            StatusCode::Unavailable,
        ];
        for code in codes {
            assert_eq!(StatusCode::from_u32(code.as_u32()), Some(code));
        }
        assert_eq!(StatusCode::from_u32(999), None);
    }

    #[test]
    fn status_message_is_truncated() {
        let long = "x".repeat(MAX_STATUS_MESSAGE_LEN + 100);
        let status = Status::new(StatusCode::Internal, long);
        assert_eq!(status.message.len(), MAX_STATUS_MESSAGE_LEN);
    }

    #[test]
    fn status_display_without_message() {
        assert_eq!(Status::ok().to_string(), "OK");
    }

    #[test]
    fn status_display_with_message() {
        let status = Status::new(StatusCode::NotFound, "missing");
        assert_eq!(status.to_string(), "NOT_FOUND: missing");
    }

    #[test]
    fn transport_error_maps_to_status() {
        let status: Status = TransportError::Closed.into();
        assert_eq!(status.code, StatusCode::Unavailable);

        let status: Status = TransportError::WindowExceeded {
            requested: 10,
            available: 5,
        }
        .into();
        assert_eq!(status.code, StatusCode::ResourceExhausted);
    }
}
