//! The per-connection control block.
//!
//! A [`Connection`] holds everything the engine knows about one connection: its state, the
//! negotiated segment size and congestion window, the buffer cursors and the timers. Segment
//! processing drives it through the handshake and closing transitions, the event loop through
//! [`handle_timer`].
//!
//! Calling a transition in a state where it is not defined is a contract violation of the
//! caller. These are checked with debug assertions and otherwise leave the connection unchanged.
//!
//! [`Connection`]: struct.Connection.html
//! [`handle_timer`]: struct.Connection.html#method.handle_timer
use core::convert::TryFrom;

use crate::storage::BufRef;
use crate::time::{Duration, Instant};
use crate::timer::{MultiTimer, Timer, TimerId};
use crate::wire::tcp_options::TcpOptions;

use super::config::Config;
use super::io::BufferConnection;
use super::policy;
use super::state::TcpState;

/// The timers of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PcbTimer {
    /// Ends a connection: handshake timeout, abandoned connection, or end of `TimeWait`.
    Abort,
    /// Produce segments soon.
    Output,
    /// Retransmit the SYN or unacknowledged data.
    Retransmit,
}

impl TimerId for PcbTimer {
    type Times = [Instant; 3];
    const ALL: &'static [Self] = &[PcbTimer::Abort, PcbTimer::Output, PcbTimer::Retransmit];

    fn index(self) -> usize {
        self as usize
    }
}

/// Duplicate acknowledgements counted beyond the fast retransmit threshold.
const MAX_ADDITIONAL_DUP_ACKS: u8 = 32;

/// The largest window scale shift, RFC 7323 section 2.3.
const MAX_WND_SHIFT: u8 = 14;

/// The slow start threshold after a loss, RFC 5681 equation 4.
fn loss_ssthresh(snd_mss: u16, inflight: usize) -> u32 {
    let flight = u32::try_from(inflight).unwrap_or(u32::max_value());
    (flight / 2).max(2 * u32::from(snd_mss))
}

/// A TCP connection control block.
pub struct Connection<T: Timer> {
    config: Config,
    state: TcpState,
    snd_mss: u16,
    cwnd: u32,
    ssthresh: u32,
    rto: Duration,
    /// Duplicate acknowledgements in a row, fast recovery while at the threshold or above.
    num_dupack: u8,
    /// Shift applied to window fields from the peer.
    snd_wnd_shift: u8,
    /// Shift applied to the window fields we send.
    rcv_wnd_shift: u8,
    /// Whether our SYN or SYN-ACK carries the window scale option.
    wnd_scale: bool,
    /// The output timer is waiting to retry after a failed send.
    output_retry: bool,
    /// Queued send data, the first `snd_inflight` bytes of it were sent.
    snd_buf: BufRef,
    snd_inflight: usize,
    /// Free receive space.
    rcv_buf: BufRef,
    /// Receive window as last announced to the peer.
    rcv_announced: usize,
    rcv_ann_thres: u32,
    end_received: bool,
    timers: MultiTimer<PcbTimer, T>,
}

impl<T: Timer> Connection<T> {
    /// A closed connection without buffers.
    pub fn new(timer: T, config: Config) -> Self {
        Connection {
            config,
            state: TcpState::Closed,
            snd_mss: 0,
            cwnd: 0,
            ssthresh: config.max_window,
            rto: config.initial_rto,
            num_dupack: 0,
            snd_wnd_shift: 0,
            rcv_wnd_shift: 0,
            wnd_scale: false,
            output_retry: false,
            snd_buf: BufRef::EMPTY,
            snd_inflight: 0,
            rcv_buf: BufRef::EMPTY,
            rcv_announced: 0,
            rcv_ann_thres: config.default_wnd_ann_threshold,
            end_received: false,
            timers: MultiTimer::new(timer),
        }
    }

    /// The current state.
    pub fn state(&self) -> TcpState {
        self.state
    }

    /// The configuration the connection was created with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The negotiated send MSS, or the interface MSS while in `SynSent`.
    pub fn snd_mss(&self) -> u16 {
        self.snd_mss
    }

    /// The congestion window in bytes.
    pub fn cwnd(&self) -> u32 {
        self.cwnd
    }

    /// The slow start threshold in bytes.
    pub fn ssthresh(&self) -> u32 {
        self.ssthresh
    }

    /// The current retransmission timeout.
    pub fn rto(&self) -> Duration {
        self.rto
    }

    /// Bytes sent but not yet acknowledged.
    pub fn snd_inflight(&self) -> usize {
        self.snd_inflight
    }

    /// Whether the peer's FIN was received.
    pub fn end_received(&self) -> bool {
        self.end_received
    }

    /// By how much the receive window must grow before it is announced.
    pub fn window_update_threshold(&self) -> u32 {
        self.rcv_ann_thres
    }

    /// The window scale shift of the peer, zero without scaling.
    pub fn snd_wnd_shift(&self) -> u8 {
        self.snd_wnd_shift
    }

    /// Our window scale shift, zero without scaling.
    pub fn rcv_wnd_shift(&self) -> u8 {
        self.rcv_wnd_shift
    }

    /// The logical timers of the connection.
    pub fn timers(&self) -> &MultiTimer<PcbTimer, T> {
        &self.timers
    }

    /// Mutable access to the timers, mostly to reach the physical timer.
    pub fn timers_mut(&mut self) -> &mut MultiTimer<PcbTimer, T> {
        &mut self.timers
    }

    fn set_state(&mut self, state: TcpState) {
        net_trace!("tcp state {} -> {}", self.state, state);
        self.state = state;
    }

    /// The retransmission timeout without backoff.
    fn base_rto(&self) -> Duration {
        self.config.initial_rto
            .max(self.config.min_rto)
            .min(self.config.max_rto)
    }

    fn reset_send_state(&mut self) {
        self.rto = self.base_rto();
        self.num_dupack = 0;
        self.output_retry = false;
    }

    /// Open actively: our SYN is about to be sent.
    pub fn connect(&mut self, iface_mss: u16) {
        debug_assert_eq!(self.state, TcpState::Closed);
        if self.state != TcpState::Closed {
            return;
        }

        self.snd_mss = iface_mss;
        self.reset_send_state();
        // Offer scaling, it is dropped again if the peer does not agree.
        self.snd_wnd_shift = 0;
        self.rcv_wnd_shift = self.config.rcv_wnd_shift.min(MAX_WND_SHIFT);
        self.wnd_scale = true;
        self.set_state(TcpState::SynSent);

        let mut timers = self.timers.update();
        timers.set_after(PcbTimer::Abort, self.config.syn_sent_timeout);
        timers.set_after(PcbTimer::Retransmit, self.rto);
    }

    /// Open passively: a SYN with `opts` arrived and our SYN-ACK is about to be sent.
    ///
    /// Window scaling is used only if the SYN offered it. Returns `false` if the peer's MSS is
    /// unacceptable, the connection then stays closed.
    pub fn syn_received(&mut self, opts: &TcpOptions, iface_mss: u16) -> bool {
        debug_assert_eq!(self.state, TcpState::Closed);
        if self.state != TcpState::Closed {
            return false;
        }

        let snd_mss = match policy::negotiate_mss(iface_mss, opts, self.config.min_allowed_mss()) {
            Some(mss) => mss,
            None => return false,
        };

        self.snd_mss = snd_mss;
        self.reset_send_state();
        match opts.wnd_scale() {
            Some(shift) => {
                self.snd_wnd_shift = shift.min(MAX_WND_SHIFT);
                self.rcv_wnd_shift = self.config.rcv_wnd_shift.min(MAX_WND_SHIFT);
                self.wnd_scale = true;
            },
            None => {
                self.snd_wnd_shift = 0;
                self.rcv_wnd_shift = 0;
                self.wnd_scale = false;
            },
        }
        self.set_state(TcpState::SynRcvd);

        let mut timers = self.timers.update();
        timers.set_after(PcbTimer::Abort, self.config.syn_rcvd_timeout);
        timers.set_after(PcbTimer::Retransmit, self.rto);
        true
    }

    /// The options to send with our SYN or SYN-ACK.
    ///
    /// The MSS is the interface MSS in `SynSent` and the negotiated one in `SynRcvd`. The window
    /// scale option is included when we offer scaling or the peer's SYN offered it.
    pub fn syn_options(&self) -> TcpOptions {
        debug_assert!(self.state.is_synsent_synrcvd());
        let opts = TcpOptions::with_mss(self.snd_mss);
        if self.wnd_scale {
            opts.and_wnd_scale(self.rcv_wnd_shift)
        } else {
            opts
        }
    }

    /// The handshake completed.
    ///
    /// In `SynSent` the peer's options arrive with the SYN-ACK and are negotiated here, in
    /// `SynRcvd` they were already negotiated from the SYN and `peer_opts` and `iface_mss` are
    /// not used. Returns `false` and aborts the connection if the peer's MSS is unacceptable.
    pub fn syn_acked(&mut self, peer_opts: &TcpOptions, iface_mss: u16) -> bool {
        debug_assert!(self.state.is_synsent_synrcvd());
        if !self.state.is_synsent_synrcvd() {
            return false;
        }

        if self.state == TcpState::SynSent {
            let floor = self.config.min_allowed_mss();
            self.snd_mss = match policy::negotiate_mss(iface_mss, peer_opts, floor) {
                Some(mss) => mss,
                None => {
                    self.abort();
                    return false;
                },
            };

            match peer_opts.wnd_scale() {
                Some(shift) => self.snd_wnd_shift = shift.min(MAX_WND_SHIFT),
                // Scaling needs both sides, we must not scale either.
                None => self.rcv_wnd_shift = 0,
            }
        }

        self.cwnd = policy::calc_initial_cwnd(u32::from(self.snd_mss));
        self.ssthresh = self.config.max_window;
        self.set_state(TcpState::Established);

        let mut timers = self.timers.update();
        timers.unset(PcbTimer::Abort);
        timers.unset(PcbTimer::Retransmit);
        true
    }

    /// The user finished sending, a FIN is to be queued after the send data.
    pub fn close_sending(&mut self) {
        let next = match self.state {
            TcpState::Established => TcpState::FinWait1,
            TcpState::CloseWait => TcpState::LastAck,
            other => {
                debug_assert!(false, "close_sending in {}", other);
                return;
            },
        };

        self.set_state(next);
        self.timers.update().set_after(PcbTimer::Output, self.config.output_timer);
    }

    /// The peer's FIN arrived.
    pub fn fin_received(&mut self) {
        let next = match self.state {
            TcpState::Established => TcpState::CloseWait,
            TcpState::FinWait1 => TcpState::Closing,
            TcpState::FinWait2 => TcpState::FinWait2TimeWait,
            other => {
                debug_assert!(false, "fin_received in {}", other);
                return;
            },
        };

        self.end_received = true;
        self.set_state(next);
    }

    /// User callbacks for the current segment have run.
    ///
    /// Completes the transient `FinWait2TimeWait`, otherwise does nothing.
    pub fn callbacks_done(&mut self) {
        if self.state == TcpState::FinWait2TimeWait {
            self.enter_time_wait();
        }
    }

    /// Our FIN was acknowledged.
    pub fn fin_acked(&mut self) {
        match self.state {
            TcpState::FinWait1 => {
                self.set_state(TcpState::FinWait2);
                let mut timers = self.timers.update();
                timers.unset(PcbTimer::Output);
                timers.unset(PcbTimer::Retransmit);
            },
            TcpState::Closing => self.enter_time_wait(),
            TcpState::LastAck => self.abort(),
            other => debug_assert!(false, "fin_acked in {}", other),
        }
    }

    fn enter_time_wait(&mut self) {
        self.set_state(TcpState::TimeWait);
        self.snd_inflight = 0;

        let mut timers = self.timers.update();
        timers.unset(PcbTimer::Output);
        timers.unset(PcbTimer::Retransmit);
        timers.set_after(PcbTimer::Abort, self.config.time_wait_time);
    }

    /// The user gave up on the connection, it is closed once the abandon timeout passes.
    pub fn abandon(&mut self) {
        if self.state != TcpState::Closed && !self.timers.is_set(PcbTimer::Abort) {
            self.timers.update().set_after(PcbTimer::Abort, self.config.abandoned_timeout);
        }
    }

    /// Close the connection immediately and stop all timers.
    pub fn abort(&mut self) {
        if self.state != TcpState::Closed {
            self.set_state(TcpState::Closed);
        }
        self.snd_inflight = 0;
        self.num_dupack = 0;
        self.output_retry = false;
        self.timers.unset_all();
    }

    /// The send buffer grew, schedule output if any can be produced.
    ///
    /// A pending retry after a failed send is cut short.
    pub fn snd_buf_extended(&mut self) {
        if self.state.can_output() && (self.output_retry || !self.timers.is_set(PcbTimer::Output)) {
            self.output_retry = false;
            self.timers.update().set_after(PcbTimer::Output, self.config.output_timer);
        }
    }

    /// Producing a segment failed in a lower layer, retry output later.
    ///
    /// `buffer_full` selects the short delay for a lack of buffer space over the long one for
    /// any other error.
    pub fn output_failed(&mut self, buffer_full: bool) {
        let after = if buffer_full {
            self.config.output_retry_full
        } else {
            self.config.output_retry_other
        };
        net_debug!("tcp output failed, retry in {:?}", after);
        self.output_retry = true;
        self.timers.update().set_after(PcbTimer::Output, after);
    }

    /// `amount` bytes of data were received into the free receive space.
    pub fn data_received(&mut self, amount: usize) {
        debug_assert!(self.state.accepting_data());
        if !self.state.accepting_data() {
            return;
        }

        self.rcv_buf.consume(amount);
        self.rcv_announced = self.rcv_announced.saturating_sub(amount);
    }

    /// `amount` more bytes of the send buffer were put on the wire.
    pub fn data_sent(&mut self, amount: usize) {
        assert!(self.snd_inflight + amount <= self.snd_buf.len, "sending unqueued data");
        self.snd_inflight += amount;
        if amount > 0 && !self.timers.is_set(PcbTimer::Retransmit) {
            self.timers.update().set_after(PcbTimer::Retransmit, self.rto);
        }
    }

    /// The peer acknowledged `amount` bytes of sent data.
    ///
    /// New data being acknowledged ends fast recovery and any retransmission backoff.
    pub fn data_acked(&mut self, amount: usize) {
        assert!(amount <= self.snd_inflight, "acknowledging unsent data");
        self.snd_buf.consume(amount);
        self.snd_inflight -= amount;

        if amount > 0 {
            if self.num_dupack > 0 && self.num_dupack >= self.config.fast_rtx_dup_acks {
                // Deflate the window inflated by the duplicates, RFC 5681 section 3.2.
                let mss = u32::from(self.snd_mss);
                let flight = u32::try_from(self.snd_inflight).unwrap_or(u32::max_value());
                self.cwnd = self.ssthresh.min(flight.max(mss).saturating_add(mss));
            }
            self.num_dupack = 0;
            self.rto = self.base_rto();
        }

        let mut timers = self.timers.update();
        if self.snd_inflight == 0 {
            timers.unset(PcbTimer::Retransmit);
        } else if amount > 0 {
            timers.set_after(PcbTimer::Retransmit, self.rto);
        }
    }

    /// A duplicate acknowledgement arrived.
    ///
    /// Returns `true` if it was the one reaching the fast retransmit threshold, the first
    /// unacknowledged segment is then to be sent again. Further duplicates inflate the
    /// congestion window by one segment each, RFC 5681 section 3.2.
    pub fn dup_ack_received(&mut self) -> bool {
        if !self.state.can_output() || self.snd_inflight == 0 {
            return false;
        }

        let threshold = self.config.fast_rtx_dup_acks;
        if self.num_dupack >= threshold.saturating_add(MAX_ADDITIONAL_DUP_ACKS) {
            return false;
        }

        self.num_dupack += 1;
        let mss = u32::from(self.snd_mss);
        let fast_rtx = self.num_dupack == threshold;
        if fast_rtx {
            net_debug!("tcp fast retransmit, {} in flight", self.snd_inflight);
            self.ssthresh = loss_ssthresh(self.snd_mss, self.snd_inflight);
            self.cwnd = self.ssthresh.saturating_add(3 * mss);
        } else if self.num_dupack > threshold {
            self.cwnd = self.cwnd.saturating_add(mss);
        } else {
            return false;
        }

        // The window may have grown.
        self.timers.update().set_after(PcbTimer::Output, self.config.output_timer);
        fast_rtx
    }

    /// The peer's window in bytes from the window field of a segment.
    ///
    /// Window fields of SYN segments are never scaled, the shift is only known after them.
    pub fn decode_window(&self, window_field: u16) -> u32 {
        u32::from(window_field) << self.snd_wnd_shift
    }

    /// Whether the receive window grew enough since the last announcement.
    pub fn window_update_due(&self) -> bool {
        let grown = self.rcv_buf.len.saturating_sub(self.rcv_announced);
        grown >= usize::try_from(self.rcv_ann_thres).unwrap_or(usize::max_value())
    }

    /// The window field for an outgoing segment, recording it as announced.
    ///
    /// The window is scaled with our shift except on SYN segments, and rounded down to what the
    /// field can express.
    pub fn announce_window(&mut self) -> u16 {
        let shift = if self.state.is_synsent_synrcvd() { 0 } else { self.rcv_wnd_shift };
        let free = u32::try_from(self.rcv_buf.len).unwrap_or(u32::max_value());
        let max_field = u32::from(u16::max_value()) << shift;
        let field = free.min(self.config.max_window).min(max_field) >> shift;

        self.rcv_announced = usize::try_from(field << shift).unwrap_or(usize::max_value());
        u16::try_from(field).unwrap_or(u16::max_value())
    }

    /// Dispatch an expiry of the physical timer.
    ///
    /// Returns the logical timer that expired, for the caller to act on: produce output for
    /// `Output`, resend the SYN or the in-flight data for `Retransmit`. An `Abort` has already
    /// closed the connection. Returns `None` if no logical timer was due.
    pub fn handle_timer(&mut self) -> Option<PcbTimer> {
        let mut expired = self.timers.handle_expired()?;
        let id = expired.id();

        match id {
            PcbTimer::Abort => {
                drop(expired);
                net_debug!("tcp abort timer in {}", self.state);
                self.abort();
            },
            PcbTimer::Output => self.output_retry = false,
            PcbTimer::Retransmit => {
                let syn_sent_rcvd = self.state.is_synsent_synrcvd();
                if !syn_sent_rcvd && self.snd_inflight == 0 {
                    // Nothing outstanding anymore.
                    return Some(id);
                }

                self.rto = self.rto
                    .checked_mul(2)
                    .unwrap_or(self.config.max_rto)
                    .min(self.config.max_rto);
                expired.set_after(PcbTimer::Retransmit, self.rto);

                if !syn_sent_rcvd {
                    // RFC 5681, section 3.1: loss window and go back to the first unacked byte.
                    self.ssthresh = loss_ssthresh(self.snd_mss, self.snd_inflight);
                    self.cwnd = u32::from(self.snd_mss);
                    self.snd_inflight = 0;
                    self.num_dupack = 0;
                }
            },
        }

        Some(id)
    }
}

impl<T: Timer> BufferConnection for Connection<T> {
    fn send_buf(&self) -> BufRef {
        self.snd_buf
    }

    fn set_send_buf(&mut self, buf: BufRef) {
        buf.assert_valid();
        self.snd_buf = buf;
        self.snd_inflight = 0;
    }

    fn extend_send_buf(&mut self, amount: usize) {
        self.snd_buf.extend(amount);
        if amount > 0 {
            self.snd_buf_extended();
        }
    }

    fn recv_buf(&self) -> BufRef {
        self.rcv_buf
    }

    fn set_recv_buf(&mut self, buf: BufRef) {
        buf.assert_valid();
        self.rcv_buf = buf;
        // The next segment announces the new buffer anyway.
        self.rcv_announced = buf.len;
    }

    fn extend_recv_buf(&mut self, amount: usize) {
        self.rcv_buf.extend(amount);
        if self.state.can_output() && self.window_update_due() {
            net_trace!("tcp window update due, {} free", self.rcv_buf.len);
            self.timers.update().set_after(PcbTimer::Output, self.config.output_timer);
        }
    }

    fn set_window_update_threshold(&mut self, threshold: u32) {
        self.rcv_ann_thres = threshold;
    }
}
