//! Send MSS negotiation and the initial congestion window.
use crate::wire::tcp_options::TcpOptions;

/// The MSS assumed for a peer that did not send the MSS option.
pub const DEFAULT_MSS: u16 = 536;

/// Bytes of IPv4 and TCP headers without options.
pub const IP4_TCP_HEADER_LEN: u16 = 20 + 20;

/// The smallest MSS that any peer may force on us, given the minimum MTU of the network.
pub const fn min_allowed_mss(min_mtu: u16) -> u16 {
    min_mtu.saturating_sub(IP4_TCP_HEADER_LEN)
}

/// The interface MSS corresponding to a path MTU.
pub fn calc_snd_mss_from_pmtu(pmtu: u16) -> u16 {
    pmtu.saturating_sub(IP4_TCP_HEADER_LEN)
}

/// Negotiate the MSS for sending.
///
/// The effective MSS is the smaller of what the interface allows and what the peer announced,
/// with [`DEFAULT_MSS`] standing in for a missing announcement. Returns `None` if that is below
/// `MIN_ALLOWED_MSS`, the connection should then be refused.
///
/// [`DEFAULT_MSS`]: constant.DEFAULT_MSS.html
pub fn calc_snd_mss<const MIN_ALLOWED_MSS: u16>(iface_mss: u16, opts: &TcpOptions) -> Option<u16> {
    negotiate_mss(iface_mss, opts, MIN_ALLOWED_MSS)
}

/// Negotiate the MSS for sending, with a floor only known at runtime.
///
/// See [`calc_snd_mss`](fn.calc_snd_mss.html).
pub fn negotiate_mss(iface_mss: u16, opts: &TcpOptions, min_allowed_mss: u16) -> Option<u16> {
    let peer_mss = opts.mss().unwrap_or(DEFAULT_MSS);
    let snd_mss = iface_mss.min(peer_mss);
    if snd_mss < min_allowed_mss {
        net_debug!("tcp mss {} below minimum {}", snd_mss, min_allowed_mss);
        return None;
    }
    Some(snd_mss)
}

/// The initial congestion window for a send MSS, RFC 5681 section 3.1.
pub fn calc_initial_cwnd(snd_mss: u32) -> u32 {
    let segments = if snd_mss > 2190 {
        2
    } else if snd_mss > 1095 {
        3
    } else {
        4
    };
    snd_mss.saturating_mul(segments)
}
