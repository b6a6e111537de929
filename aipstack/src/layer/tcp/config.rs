use crate::time::Duration;

use super::policy;

/// Protocol constants and tunables of the TCP engine.
///
/// The `Default` values are the ones that the protocol engine is designed around. Individual
/// timeouts may be shortened for testing or constrained deployments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Config {
    /// The smallest MTU any link of the network is assumed to support.
    ///
    /// Determines the minimum MSS a peer may force on us.
    pub min_mtu: u16,

    /// Largest send or receive window, `0x3fff_ffff`.
    pub max_window: u32,

    /// Window update threshold used until one is configured by the receive buffer.
    pub default_wnd_ann_threshold: u32,

    /// Abort a connection stuck in `SynRcvd` after this time.
    pub syn_rcvd_timeout: Duration,

    /// Abort a connection stuck in `SynSent` after this time.
    pub syn_sent_timeout: Duration,

    /// Linger time of the `TimeWait` state.
    pub time_wait_time: Duration,

    /// Abort a connection after it was abandoned by the user for this time.
    pub abandoned_timeout: Duration,

    /// Delay between the send buffer being extended and producing segments.
    pub output_timer: Duration,

    /// Delay before retrying output when the lower layer had no buffer space.
    pub output_retry_full: Duration,

    /// Delay before retrying output after any other lower layer error.
    pub output_retry_other: Duration,

    /// Retransmission timeout before any round-trip measurement.
    pub initial_rto: Duration,

    /// Lower bound of the retransmission timeout.
    pub min_rto: Duration,

    /// Upper bound of the retransmission timeout.
    pub max_rto: Duration,

    /// Number of duplicate acknowledgements that trigger a fast retransmit.
    pub fast_rtx_dup_acks: u8,

    /// Window scale shift that we announce, and apply to outgoing window fields if the peer
    /// agrees to scaling.
    pub rcv_wnd_shift: u8,
}

/// The largest window representable with window scaling.
pub const MAX_WINDOW: u32 = 0x3fff_ffff;

/// The largest receive window.
pub const MAX_RCV_WND: u32 = MAX_WINDOW;

impl Config {
    /// The smallest MSS that a peer may force on us.
    pub fn min_allowed_mss(&self) -> u16 {
        policy::min_allowed_mss(self.min_mtu)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            min_mtu: 576,
            max_window: MAX_WINDOW,
            default_wnd_ann_threshold: 2700,
            syn_rcvd_timeout: Duration::from_secs(20),
            syn_sent_timeout: Duration::from_secs(30),
            time_wait_time: Duration::from_secs(120),
            abandoned_timeout: Duration::from_secs(30),
            output_timer: Duration::from_micros(500),
            output_retry_full: Duration::from_millis(100),
            output_retry_other: Duration::from_secs(2),
            initial_rto: Duration::from_secs(1),
            min_rto: Duration::from_millis(250),
            max_rto: Duration::from_secs(60),
            fast_rtx_dup_acks: 3,
            rcv_wnd_shift: 6,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.min_allowed_mss(), 536);
        assert!(config.rcv_wnd_shift <= 14);
        assert!(config.min_rto <= config.initial_rto && config.initial_rto <= config.max_rto);
        assert!(config.max_window < 1 << 30);
    }
}
