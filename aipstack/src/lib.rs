//! A TCP protocol engine core for embedded, allocation-free network stacks.
//!
//! ## Table of contents
//!
//! This is also a recommended reading order but feel free to skip ahead, each chapter tries to be
//! somewhat self-contained.
//!
//! 1. [Highlights](#highlights)
//! 2. [Design](#design-and-relevant-core-concepts)
//! 3. [The wire module](wire/index.html)
//!    1. [Segment representations](wire/index.html#segment-representations)
//!    1. [Sequence numbers](wire/tcp/struct.SeqNumber.html)
//!    1. [Options](wire/tcp_options/index.html)
//! 4. [The tcp layer](layer/tcp/index.html)
//!    1. [Connection states](layer/tcp/enum.TcpState.html)
//!    1. [The control block](layer/tcp/struct.Connection.html)
//!    1. [Ring buffers](layer/tcp/io/index.html)
//! 5. Internals
//!    1. [Timers](timer/index.html)
//!    2. [The storage module](storage/index.html)
//!    3. [Time](time/index.html)
//!
//! ## Highlights
//!
//! * Wraparound-safe sequence number and clock arithmetic without accidental total orders
//! * Lenient option parsing that never reads beyond the options area
//! * Any number of per-connection timers on a single platform timer
//! * Zero-copy ring buffers, with a mirror region for contiguous reads across the wrap
//!
//! ## Design and relevant core concepts
//!
//! This library is the protocol core of a TCP implementation. It does not frame, route or send
//! packets itself. The embedding stack parses incoming segments with the `wire` module and drives
//! a [`Connection`] through its transitions, and it asks the connection and its buffers what to
//! send.
//!
//! Nothing within `aipstack` *ever* dynamically allocates memory (and there is no arbitrary
//! recursion). All buffers are passed in by the caller at setup, and each connection carries its
//! timers inline. The engine is single-threaded and cooperative: every operation runs to
//! completion and any timer changes it makes are applied before it returns.
//!
//! [`Connection`]: layer/tcp/struct.Connection.html
#![warn(missing_docs)]
#![warn(unreachable_pub)]

// tests should be able to use `std`
#![cfg_attr(all(
    not(feature = "std"),
    not(test)),
no_std)]

#[macro_use] mod macros;

pub mod layer;
pub mod storage;
pub mod time;
pub mod timer;
pub mod wire;
