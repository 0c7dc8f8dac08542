//! Stream-ID allocation, one manager per transport role.

use std::collections::HashSet;
use std::fmt;

/// The highest legal stream ID (2^31 - 1); 0 is reserved for connection
/// control and is never handed out.
pub const MAX_STREAM_ID: u32 = (1u32 << 31) - 1;

/// Which side of a transport a stream-ID manager is allocating for.
///
/// Callers allocate odd IDs (1, 3, 5, ...); responders allocate even IDs
/// (2, 4, 6, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Caller,
    Responder,
}

impl Role {
    fn start(self) -> u32 {
        match self {
            Role::Caller => 1,
            Role::Responder => 2,
        }
    }
}

/// Error raised when a stream-ID manager cannot allocate any more IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamIdsExhausted;

impl fmt::Display for StreamIdsExhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream IDs exhausted: transport has reached the 2^31-1 ceiling")
    }
}

impl std::error::Error for StreamIdsExhausted {}

/// Allocates, tracks, and releases stream IDs for one side of a transport.
///
/// Not safe to share across transports: each transport lifetime owns
/// exactly one manager per role, and `reset` is only valid once the
/// transport is closed.
pub struct StreamIdManager {
    role: Role,
    last: Option<u32>,
    active: HashSet<u32>,
}

impl StreamIdManager {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            last: None,
            active: HashSet::new(),
        }
    }

    /// Allocate the next stream ID for this role and mark it active.
    pub fn generate(&mut self) -> Result<u32, StreamIdsExhausted> {
        let next = match self.last {
            None => self.role.start(),
            Some(last) => last.checked_add(2).ok_or(StreamIdsExhausted)?,
        };
        if next > MAX_STREAM_ID {
            return Err(StreamIdsExhausted);
        }
        self.last = Some(next);
        self.active.insert(next);
        Ok(next)
    }

    /// Release a stream ID once both directions have reached end-of-stream.
    pub fn release(&mut self, id: u32) {
        self.active.remove(&id);
    }

    pub fn is_active(&self, id: u32) -> bool {
        self.active.contains(&id)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Wipe the active set and restart allocation from this role's first ID.
    ///
    /// Only safe to call once the owning transport is closed.
    pub fn reset(&mut self) {
        self.last = None;
        self.active.clear();
    }

    pub fn role(&self) -> Role {
        self.role
    }
}
