//! The TCP protocol engine.
//!
//! Offers the connection control block and everything it is built from. The engine does not own
//! any segment or packet buffers. Segments are parsed with the `wire` module by the layer below,
//! the results are handed to a [`Connection`] which answers with state transitions and timer
//! requests.
//!
//! ## Structure
//!
//! * [`TcpState`] and its predicates decide what a connection may do in each state.
//! * The [`policy`] functions negotiate the segment size and the initial congestion window.
//! * [`Connection`] owns the state, the cursors into its buffers and a [`MultiTimer`] of
//!   [`PcbTimer`]s.
//! * [`SendRing`] and [`RecvRing`] provide the memory behind the buffer cursors.
//! * [`Config`] collects the protocol constants.
//!
//! Nothing here allocates. Buffers are handed in by the user, and the timers of a connection live
//! inline in its control block.
//!
//! ## Closing
//!
//! The closing handshake follows RFC 793 with one addition. A FIN received in `FinWait2` first
//! moves the connection to the transient `FinWait2TimeWait`. Only after the user was informed of
//! the end of the stream, signalled by [`Connection::callbacks_done`], is `TimeWait` entered and
//! its timer started. This keeps the user from observing `TimeWait` while still processing the
//! segment that caused it.
//!
//! ## Window scaling
//!
//! Scaling is used only if both SYNs carry the option, RFC 7323. An active open offers it and
//! drops it again when the SYN-ACK comes without. A passive open answers with the option only
//! if the SYN offered it. Window fields of SYN segments are never scaled.
//!
//! [`Connection`]: struct.Connection.html
//! [`Connection::callbacks_done`]: struct.Connection.html#method.callbacks_done
//! [`TcpState`]: enum.TcpState.html
//! [`policy`]: policy/index.html
//! [`MultiTimer`]: ../../timer/struct.MultiTimer.html
//! [`PcbTimer`]: enum.PcbTimer.html
//! [`SendRing`]: io/struct.SendRing.html
//! [`RecvRing`]: io/struct.RecvRing.html
//! [`Config`]: struct.Config.html
mod config;
mod connection;
pub mod io;
pub mod policy;
mod state;

pub use config::{
    Config,
    MAX_RCV_WND,
    MAX_WINDOW};

pub use connection::{
    Connection,
    PcbTimer};

pub use io::{
    BufferConnection,
    RecvRing,
    SendRing};

pub use state::{
    accepting_data_in_state,
    can_output_in_state,
    snd_open_in_state,
    state_is_active,
    state_is_synsent_synrcvd,
    TcpState};
