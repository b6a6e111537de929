//! The connection states and the questions asked about them.
//!
//! The discriminants are chosen so that most predicates below are a single mask test. Bit 2 is
//! set exactly in the states that can not produce output.
use core::fmt;

/// The state of a TCP connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TcpState {
    /// No connection, or the connection is finished.
    Closed = 0b0101,
    /// Our SYN was sent, waiting for the peer's SYN.
    SynSent = 0b1101,
    /// The peer's SYN arrived and our SYN was answered with, waiting for its ACK.
    SynRcvd = 0b1100,
    /// Data flows in both directions.
    Established = 0b0000,
    /// The peer finished sending, we still may send.
    CloseWait = 0b0001,
    /// Both sides finished, waiting for the ACK of our FIN.
    LastAck = 0b1000,
    /// We finished sending, the FIN is not yet acknowledged.
    FinWait1 = 0b0010,
    /// Our FIN was acknowledged, waiting for the peer's FIN.
    FinWait2 = 0b0100,
    /// The peer's FIN arrived in `FinWait2` and user callbacks have not yet run.
    ///
    /// Transient: the connection moves on to `TimeWait` before control returns to the event loop.
    FinWait2TimeWait = 0b1111,
    /// Both sides sent FIN simultaneously, waiting for the ACK of ours.
    Closing = 0b1011,
    /// Finished, lingering to absorb retransmissions of the peer.
    TimeWait = 0b1110,
}

const BIT0: u8 = 1 << 0;
const BIT2: u8 = 1 << 2;
const BIT3: u8 = 1 << 3;

impl TcpState {
    /// All states, for iteration.
    pub const ALL: [TcpState; 11] = [
        TcpState::Closed,
        TcpState::SynSent,
        TcpState::SynRcvd,
        TcpState::Established,
        TcpState::CloseWait,
        TcpState::LastAck,
        TcpState::FinWait1,
        TcpState::FinWait2,
        TcpState::FinWait2TimeWait,
        TcpState::Closing,
        TcpState::TimeWait,
    ];

    fn bits(self) -> u8 {
        self as u8
    }

    /// A synchronized connection that is not yet lingering.
    ///
    /// True in every state except `Closed`, `SynSent`, `SynRcvd` and `TimeWait`.
    pub fn is_active(self) -> bool {
        match self {
            TcpState::Closed | TcpState::SynSent | TcpState::SynRcvd | TcpState::TimeWait => false,
            _ => true,
        }
    }

    /// Incoming data is accepted: `Established`, `FinWait1` and `FinWait2`.
    pub fn accepting_data(self) -> bool {
        self.bits() & (BIT3 | BIT0) == 0
    }

    /// Segments may be produced: `Established`, `CloseWait`, `LastAck`, `FinWait1` and `Closing`.
    pub fn can_output(self) -> bool {
        self.bits() & BIT2 == 0
    }

    /// The user may still queue data: `Established` and `CloseWait`.
    pub fn snd_open(self) -> bool {
        self.bits() >> 1 == 0
    }

    /// The handshake is in progress: `SynSent` or `SynRcvd`.
    pub fn is_synsent_synrcvd(self) -> bool {
        self.bits() >> 1 == 0b110
    }
}

/// See [`TcpState::is_active`](enum.TcpState.html#method.is_active).
pub fn state_is_active(state: TcpState) -> bool {
    state.is_active()
}

/// See [`TcpState::accepting_data`](enum.TcpState.html#method.accepting_data).
pub fn accepting_data_in_state(state: TcpState) -> bool {
    state.accepting_data()
}

/// See [`TcpState::can_output`](enum.TcpState.html#method.can_output).
pub fn can_output_in_state(state: TcpState) -> bool {
    state.can_output()
}

/// See [`TcpState::snd_open`](enum.TcpState.html#method.snd_open).
pub fn snd_open_in_state(state: TcpState) -> bool {
    state.snd_open()
}

/// See [`TcpState::is_synsent_synrcvd`](enum.TcpState.html#method.is_synsent_synrcvd).
pub fn state_is_synsent_synrcvd(state: TcpState) -> bool {
    state.is_synsent_synrcvd()
}

impl Default for TcpState {
    fn default() -> Self {
        TcpState::Closed
    }
}

impl fmt::Display for TcpState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            TcpState::Closed => "CLOSED",
            TcpState::SynSent => "SYN_SENT",
            TcpState::SynRcvd => "SYN_RCVD",
            TcpState::Established => "ESTABLISHED",
            TcpState::CloseWait => "CLOSE_WAIT",
            TcpState::LastAck => "LAST_ACK",
            TcpState::FinWait1 => "FIN_WAIT_1",
            TcpState::FinWait2 => "FIN_WAIT_2",
            TcpState::FinWait2TimeWait => "FIN_WAIT_2_TIME_WAIT",
            TcpState::Closing => "CLOSING",
            TcpState::TimeWait => "TIME_WAIT",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use super::TcpState::*;

    fn members(pred: fn(TcpState) -> bool) -> Vec<TcpState> {
        TcpState::ALL.iter().copied().filter(|&state| pred(state)).collect()
    }

    #[test]
    fn active() {
        assert_eq!(members(state_is_active), vec![
            Established, CloseWait, LastAck, FinWait1, FinWait2, FinWait2TimeWait, Closing]);
    }

    #[test]
    fn accepting() {
        assert_eq!(members(accepting_data_in_state), vec![Established, FinWait1, FinWait2]);
    }

    #[test]
    fn output() {
        assert_eq!(members(can_output_in_state), vec![
            Established, CloseWait, LastAck, FinWait1, Closing]);
    }

    #[test]
    fn send_open() {
        assert_eq!(members(snd_open_in_state), vec![Established, CloseWait]);
    }

    #[test]
    fn handshake() {
        assert_eq!(members(state_is_synsent_synrcvd), vec![SynSent, SynRcvd]);
    }

    #[test]
    fn encodings_distinct() {
        for (idx, a) in TcpState::ALL.iter().enumerate() {
            for b in &TcpState::ALL[idx + 1..] {
                assert_ne!(*a as u8, *b as u8, "{} and {}", a, b);
            }
        }
    }
}
