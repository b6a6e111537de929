//! Storage primitives for connection buffers.
//!
//! Nothing in here allocates. All memory is handed in by the caller, usually as a fixed array
//! per connection, and only described by cursors afterwards.
pub mod ring;

pub use self::ring::{add_modulo, BufRef, WrapBuf, WrapBufMut};
