//! Wire-level primitives for the rapace RPC runtime: frame encoding and
//! stream-ID allocation. No async, no I/O — pure, synchronous building
//! blocks that `rapace-core` layers a transport on top of.

mod frame;
mod stream_id;

pub use frame::{encode_frame, FrameError, FrameParser, DEFAULT_MAX_FRAME_LEN};
pub use stream_id::{Role, StreamIdManager, StreamIdsExhausted, MAX_STREAM_ID};
