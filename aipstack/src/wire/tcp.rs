use core::{fmt, ops};
use bitflags::bitflags;
use byteorder::{ByteOrder, NetworkEndian};

use super::{Error, Result};
use super::tcp_options::{self, TcpOptions};

/// A TCP sequence number.
///
/// A sequence number is a monotonically advancing integer modulo 2<sup>32</sup>. There is no
/// total order on such numbers, so this type does not implement `PartialOrd`. All comparisons
/// are made relative to an explicit reference point that the caller knows to be at or before
/// every compared value, see [`lte`] and [`lt`].
///
/// [`lte`]: #method.lte
/// [`lt`]: #method.lt
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Hash)]
pub struct SeqNumber(pub u32);

/// Add two sequence values, wrapping around.
pub fn seq_add(a: u32, b: u32) -> u32 {
    a.wrapping_add(b)
}

/// The distance from `b` forward to `a`, wrapping around.
pub fn seq_diff(a: u32, b: u32) -> u32 {
    a.wrapping_sub(b)
}

/// `a <= b` when both are viewed as offsets from `reference`.
pub fn seq_lte(a: u32, b: u32, reference: u32) -> bool {
    seq_diff(a, reference) <= seq_diff(b, reference)
}

/// `a < b` when both are viewed as offsets from `reference`.
pub fn seq_lt(a: u32, b: u32, reference: u32) -> bool {
    seq_diff(a, reference) < seq_diff(b, reference)
}

impl SeqNumber {
    /// The value with the most significant bit set.
    pub const MSB: u32 = 1 << 31;

    /// Advance by some amount of sequence space.
    pub fn add(self, amount: u32) -> SeqNumber {
        SeqNumber(seq_add(self.0, amount))
    }

    /// The amount of sequence space from `other` forward to `self`.
    pub fn diff(self, other: SeqNumber) -> u32 {
        seq_diff(self.0, other.0)
    }

    /// Less-or-equal relative to a reference point.
    pub fn lte(self, other: SeqNumber, reference: SeqNumber) -> bool {
        seq_lte(self.0, other.0, reference.0)
    }

    /// Strictly-less relative to a reference point.
    pub fn lt(self, other: SeqNumber, reference: SeqNumber) -> bool {
        seq_lt(self.0, other.0, reference.0)
    }

    /// Add an amount to a window-like value, saturating at `u32::MAX` instead of wrapping.
    ///
    /// Used for quantities that live in the sequence domain but are not positions, such as
    /// window sizes and congestion windows.
    pub fn add_sat(value: u32, amount: u32) -> u32 {
        value.saturating_add(amount)
    }

    /// Whether `self` is before `other` within half of the sequence space.
    ///
    /// This is the comparison without reference point: `other` is taken to be later if it lies
    /// within the 2<sup>31</sup> numbers following `self`.
    pub fn lt_msb(self, other: SeqNumber) -> bool {
        self.diff(other) >= Self::MSB
    }

    /// Whether `self` lies in the half-open interval `(start, start + length]`.
    pub fn in_open_closed_interval(self, start: SeqNumber, length: u32) -> bool {
        self.0.wrapping_add(!start.0) < length
    }
}

impl fmt::Display for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ops::Add<u32> for SeqNumber {
    type Output = SeqNumber;

    fn add(self, rhs: u32) -> SeqNumber {
        SeqNumber::add(self, rhs)
    }
}

impl ops::AddAssign<u32> for SeqNumber {
    fn add_assign(&mut self, rhs: u32) {
        *self = *self + rhs;
    }
}

bitflags! {
    /// The control flags of a TCP segment.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct TcpFlags: u16 {
        const FIN = 0x001;
        const SYN = 0x002;
        const RST = 0x004;
        const PSH = 0x008;
        const ACK = 0x010;
        const URG = 0x020;
        const ECE = 0x040;
        const CWR = 0x080;
        const NS  = 0x100;
    }
}

impl TcpFlags {
    /// The flags which occupy sequence space.
    pub const SEQ_FLAGS: TcpFlags = TcpFlags::SYN.union(TcpFlags::FIN);

    /// The length of a segment in sequence space.
    ///
    /// A SYN or a FIN each count as one. A segment carrying both is not sent by us and counts
    /// as one as well.
    pub fn seq_len(self, data_len: usize) -> usize {
        data_len + usize::from(self.intersects(Self::SEQ_FLAGS))
    }
}

impl fmt::Display for TcpFlags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.contains(TcpFlags::SYN) { write!(f, " syn")? }
        if self.contains(TcpFlags::FIN) { write!(f, " fin")? }
        if self.contains(TcpFlags::RST) { write!(f, " rst")? }
        if self.contains(TcpFlags::PSH) { write!(f, " psh")? }
        if self.contains(TcpFlags::ACK) { write!(f, " ack")? }
        if self.contains(TcpFlags::URG) { write!(f, " urg")? }
        Ok(())
    }
}

byte_wrapper! {
    /// A byte sequence representing a TCP segment, header first.
    #[derive(Debug, PartialEq, Eq)]
    pub struct tcp([u8]);
}

mod field {
    #![allow(non_snake_case)]

    pub(crate) type Field = ::core::ops::Range<usize>;

    pub(crate) const SRC_PORT: Field = 0..2;
    pub(crate) const DST_PORT: Field = 2..4;
    pub(crate) const SEQ_NUM:  Field = 4..8;
    pub(crate) const ACK_NUM:  Field = 8..12;
    pub(crate) const FLAGS:    Field = 12..14;
    pub(crate) const WIN_SIZE: Field = 14..16;
    pub(crate) const CHECKSUM: Field = 16..18;
    pub(crate) const URGENT:   Field = 18..20;

    pub(crate) fn OPTIONS(header_len: usize) -> Field {
        URGENT.end..header_len
    }
}

/// The length of the TCP header without options.
pub const HEADER_LEN: usize = field::URGENT.end;

/// The length of the largest TCP header, data offset of 15 words.
pub const MAX_HEADER_LEN: usize = 60;

impl tcp {
    /// Imbue a raw octet buffer with TCP segment structure.
    pub fn new_unchecked(data: &[u8]) -> &Self {
        Self::__from_macro_new_unchecked(data)
    }

    /// Imbue a mutable octet buffer with TCP segment structure.
    pub fn new_unchecked_mut(data: &mut [u8]) -> &mut Self {
        Self::__from_macro_new_unchecked_mut(data)
    }

    /// Shorthand for a combination of `new_unchecked` and `check_len`.
    pub fn new_checked(data: &[u8]) -> Result<&Self> {
        Self::new_unchecked(data).check_len()?;
        Ok(Self::new_unchecked(data))
    }

    /// Unwrap the segment as a raw byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Ensure that no accessor method will panic if called.
    ///
    /// Returns `Err(Error::Truncated)` if the buffer is too short for the fixed header or for
    /// the length indicated by the data offset. Returns `Err(Error::Malformed)` if the data
    /// offset is smaller than the fixed header.
    ///
    /// The result of this check is invalidated by calling `set_header_len`.
    pub fn check_len(&self) -> Result<()> {
        let len = self.0.len();
        if len < HEADER_LEN {
            return Err(Error::Truncated);
        }

        let header_len = self.header_len();
        if header_len < HEADER_LEN {
            Err(Error::Malformed)
        } else if len < header_len {
            Err(Error::Truncated)
        } else {
            Ok(())
        }
    }

    /// Return the source port field.
    pub fn src_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::SRC_PORT])
    }

    /// Return the destination port field.
    pub fn dst_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::DST_PORT])
    }

    /// Return the sequence number field.
    pub fn seq_number(&self) -> SeqNumber {
        SeqNumber(NetworkEndian::read_u32(&self.0[field::SEQ_NUM]))
    }

    /// Return the acknowledgement number field.
    pub fn ack_number(&self) -> SeqNumber {
        SeqNumber(NetworkEndian::read_u32(&self.0[field::ACK_NUM]))
    }

    /// Read all flags at once.
    pub fn flags(&self) -> TcpFlags {
        let raw = NetworkEndian::read_u16(&self.0[field::FLAGS]);
        TcpFlags::from_bits_truncate(raw & 0x1ff)
    }

    /// Return the header length, in octets.
    pub fn header_len(&self) -> usize {
        let raw = NetworkEndian::read_u16(&self.0[field::FLAGS]);
        usize::from(raw >> 12) * 4
    }

    /// Return the window size field.
    pub fn window_len(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::WIN_SIZE])
    }

    /// Return the checksum field.
    pub fn checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::CHECKSUM])
    }

    /// Return the urgent pointer field.
    pub fn urgent_at(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::URGENT])
    }

    /// Return the options area.
    pub fn options(&self) -> &[u8] {
        &self.0[field::OPTIONS(self.header_len())]
    }

    /// Return the options area followed by the payload.
    pub fn options_and_payload(&self) -> &[u8] {
        &self.0[field::URGENT.end..]
    }

    /// Return the payload.
    pub fn payload_slice(&self) -> &[u8] {
        &self.0[self.header_len()..]
    }

    /// Set the source port field.
    pub fn set_src_port(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::SRC_PORT], value)
    }

    /// Set the destination port field.
    pub fn set_dst_port(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::DST_PORT], value)
    }

    /// Set the sequence number field.
    pub fn set_seq_number(&mut self, value: SeqNumber) {
        NetworkEndian::write_u32(&mut self.0[field::SEQ_NUM], value.0)
    }

    /// Set the acknowledgement number field.
    pub fn set_ack_number(&mut self, value: SeqNumber) {
        NetworkEndian::write_u32(&mut self.0[field::ACK_NUM], value.0)
    }

    /// Set the flags, keeping the data offset.
    pub fn set_flags(&mut self, flags: TcpFlags) {
        let raw = NetworkEndian::read_u16(&self.0[field::FLAGS]) & !0xfff;
        NetworkEndian::write_u16(&mut self.0[field::FLAGS], raw | (flags.bits() & 0x1ff))
    }

    /// Set the header length, in octets.
    pub fn set_header_len(&mut self, value: usize) {
        debug_assert!(value % 4 == 0 && value <= MAX_HEADER_LEN);
        let raw = NetworkEndian::read_u16(&self.0[field::FLAGS]);
        let raw = (raw & !0xf000) | ((value as u16) / 4) << 12;
        NetworkEndian::write_u16(&mut self.0[field::FLAGS], raw)
    }

    /// Set the window size field.
    pub fn set_window_len(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::WIN_SIZE], value)
    }

    /// Set the checksum field.
    pub fn set_checksum(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::CHECKSUM], value)
    }

    /// Set the urgent pointer field.
    pub fn set_urgent_at(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::URGENT], value)
    }

    /// Return a mutable slice of the options area.
    pub fn options_mut(&mut self) -> &mut [u8] {
        let header_len = self.header_len();
        &mut self.0[field::OPTIONS(header_len)]
    }

    /// Return a mutable slice of the payload.
    pub fn payload_mut_slice(&mut self) -> &mut [u8] {
        let header_len = self.header_len();
        &mut self.0[header_len..]
    }
}

impl AsRef<[u8]> for tcp {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// The header data of a segment, as seen by one connection.
///
/// Used both for received and for sent segments. Ports are named from the perspective of the
/// local end, so parsing swaps source and destination compared to the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TcpSegMeta {
    /// Port of this end.
    pub local_port: u16,
    /// Port of the peer.
    pub remote_port: u16,
    /// First sequence number occupied by the segment.
    pub seq_num: SeqNumber,
    /// Acknowledged sequence number, meaningful with the `ACK` flag.
    pub ack_num: SeqNumber,
    /// Raw window field, not yet scaled.
    pub window_size: u16,
    /// Control flags.
    pub flags: TcpFlags,
    /// Options that were received or are to be sent.
    ///
    /// Always `Some` after parsing. On transmit paths `None` means no options are written.
    pub opts: Option<TcpOptions>,
}

impl TcpSegMeta {
    /// Parse a received segment, returning its metadata and payload.
    pub fn parse(data: &[u8]) -> Result<(TcpSegMeta, &[u8])> {
        let segment = tcp::new_checked(data)?;
        let opts_len = segment.header_len() - HEADER_LEN;
        // At most 40 bytes, checked by the data offset field width.
        let (opts, payload) = tcp_options::parse_options(
            segment.options_and_payload(),
            opts_len as u8);

        let meta = TcpSegMeta {
            local_port: segment.dst_port(),
            remote_port: segment.src_port(),
            seq_num: segment.seq_number(),
            ack_num: segment.ack_number(),
            window_size: segment.window_len(),
            flags: segment.flags(),
            opts: Some(opts),
        };

        net_trace!("tcp rx {}", meta);
        Ok((meta, payload))
    }

    /// The length of the header that `emit` writes.
    pub fn header_len(&self) -> usize {
        let opts_len = self.opts
            .as_ref()
            .map(tcp_options::calc_options_len)
            .unwrap_or(0);
        HEADER_LEN + usize::from(opts_len)
    }

    /// The length of the segment in sequence space, given its payload length.
    pub fn seq_len(&self, data_len: usize) -> usize {
        self.flags.seq_len(data_len)
    }

    /// Write the header into the start of `buffer` and return the payload area.
    ///
    /// The checksum field is zeroed, it covers a pseudo header only known to the IP layer.
    ///
    /// Returns `Err(Error::Truncated)` if the buffer can not hold the header.
    pub fn emit<'a>(&self, buffer: &'a mut [u8]) -> Result<&'a mut [u8]> {
        let header_len = self.header_len();
        if buffer.len() < header_len {
            return Err(Error::Truncated);
        }

        let segment = tcp::new_unchecked_mut(buffer);
        segment.set_src_port(self.local_port);
        segment.set_dst_port(self.remote_port);
        segment.set_seq_number(self.seq_num);
        segment.set_ack_number(self.ack_num);
        segment.set_header_len(header_len);
        segment.set_flags(self.flags);
        segment.set_window_len(self.window_size);
        segment.set_checksum(0);
        segment.set_urgent_at(0);

        if let Some(opts) = &self.opts {
            let rest = tcp_options::write_options(opts, segment.options_mut());
            debug_assert!(rest.is_empty());
        }

        Ok(&mut buffer[header_len..])
    }
}

impl fmt::Display for TcpSegMeta {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TCP local={} remote={}{}", self.local_port, self.remote_port, self.flags)?;
        write!(f, " seq={}", self.seq_num)?;
        if self.flags.contains(TcpFlags::ACK) {
            write!(f, " ack={}", self.ack_num)?;
        }
        write!(f, " win={}", self.window_size)?;
        if let Some(opts) = &self.opts {
            if let Some(mss) = opts.mss() {
                write!(f, " mss={}", mss)?;
            }
            if let Some(wnd_scale) = opts.wnd_scale() {
                write!(f, " ws={}", wnd_scale)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    static SYN_BYTES: [u8; 32] =
        [0xbf, 0x00, 0x00, 0x50,
         0x01, 0x23, 0x45, 0x67,
         0x00, 0x00, 0x00, 0x00,
         0x70, 0x02, 0x01, 0x23,
         0x00, 0x00, 0x00, 0x00,
         0x02, 0x04, 0x05, 0xb4,
         0x01, 0x03, 0x03, 0x06,
         0xaa, 0x00, 0x00, 0xff];

    static PAYLOAD_BYTES: [u8; 4] =
        [0xaa, 0x00, 0x00, 0xff];

    fn syn_meta() -> TcpSegMeta {
        TcpSegMeta {
            local_port: 80,
            remote_port: 48896,
            seq_num: SeqNumber(0x01234567),
            ack_num: SeqNumber(0),
            window_size: 0x0123,
            flags: TcpFlags::SYN,
            opts: Some(TcpOptions::with_mss(1460).and_wnd_scale(6)),
        }
    }

    #[test]
    fn test_deconstruct() {
        let segment = tcp::new_checked(&SYN_BYTES[..]).unwrap();
        assert_eq!(segment.src_port(), 48896);
        assert_eq!(segment.dst_port(), 80);
        assert_eq!(segment.seq_number(), SeqNumber(0x01234567));
        assert_eq!(segment.header_len(), 28);
        assert_eq!(segment.flags(), TcpFlags::SYN);
        assert_eq!(segment.window_len(), 0x0123);
        assert_eq!(segment.options(), &SYN_BYTES[20..28]);
        assert_eq!(segment.payload_slice(), &PAYLOAD_BYTES[..]);
    }

    #[test]
    fn test_parse() {
        let (meta, payload) = TcpSegMeta::parse(&SYN_BYTES).unwrap();
        assert_eq!(meta, syn_meta());
        assert_eq!(payload, &PAYLOAD_BYTES[..]);
        assert_eq!(meta.seq_len(payload.len()), 5);
    }

    #[test]
    fn test_emit() {
        // The sender's view of the same segment.
        let meta = TcpSegMeta {
            local_port: 48896,
            remote_port: 80,
            ..syn_meta()
        };
        assert_eq!(meta.header_len(), 28);
        let mut bytes = [0xa5; 32];
        let payload = meta.emit(&mut bytes).unwrap();
        payload.copy_from_slice(&PAYLOAD_BYTES);
        assert_eq!(&bytes[..], &SYN_BYTES[..]);
    }

    #[test]
    fn emit_then_parse_swaps_ports() {
        let sent = TcpSegMeta {
            local_port: 48896,
            remote_port: 80,
            ..syn_meta()
        };
        let mut bytes = [0; 28];
        sent.emit(&mut bytes).unwrap();
        let (received, payload) = TcpSegMeta::parse(&bytes).unwrap();
        assert_eq!(received, syn_meta());
        assert!(payload.is_empty());
    }

    #[test]
    fn test_emit_too_small() {
        let mut bytes = [0; 24];
        assert_eq!(syn_meta().emit(&mut bytes).err(), Some(Error::Truncated));
    }

    #[test]
    fn test_truncated() {
        assert_eq!(tcp::new_checked(&SYN_BYTES[..19]).err(), Some(Error::Truncated));
        // Data offset says 28 bytes.
        assert_eq!(tcp::new_checked(&SYN_BYTES[..24]).err(), Some(Error::Truncated));
    }

    #[test]
    fn test_impossible_len() {
        let mut bytes = [0; 20];
        tcp::new_unchecked_mut(&mut bytes).set_header_len(16);
        assert_eq!(tcp::new_checked(&bytes).err(), Some(Error::Malformed));
    }

    #[test]
    fn flags_seq_len() {
        assert_eq!(TcpFlags::ACK.seq_len(10), 10);
        assert_eq!(TcpFlags::SYN.seq_len(0), 1);
        assert_eq!((TcpFlags::FIN | TcpFlags::ACK).seq_len(3), 4);
        assert_eq!((TcpFlags::SYN | TcpFlags::FIN).seq_len(0), 1);
    }

    #[test]
    fn seq_wraps_around() {
        let late = SeqNumber(u32::max_value() - 2);
        let early = late + 5;
        assert_eq!(early, SeqNumber(2));
        assert_eq!(early.diff(late), 5);
        assert!(late.lt(early, late));
        assert!(!early.lt(late, late));
        assert!(late.lt_msb(early));
        assert!(!early.lt_msb(late));
    }

    #[test]
    fn seq_interval() {
        let start = SeqNumber(u32::max_value());
        assert!(!start.in_open_closed_interval(start, 10));
        assert!(SeqNumber(0).in_open_closed_interval(start, 10));
        assert!(SeqNumber(9).in_open_closed_interval(start, 10));
        assert!(!SeqNumber(10).in_open_closed_interval(start, 10));
    }

    #[test]
    fn seq_add_saturates() {
        assert_eq!(SeqNumber::add_sat(u32::max_value() - 1, 5), u32::max_value());
        assert_eq!(SeqNumber::add_sat(1, 5), 6);
    }

    proptest! {
        #[test]
        fn lte_is_not_reversed_lt(a: u32, b: u32, reference: u32) {
            prop_assert_eq!(seq_lte(a, b, reference), !seq_lt(b, a, reference));
        }

        #[test]
        fn diff_to_self_is_zero(a: u32) {
            prop_assert_eq!(seq_diff(a, a), 0);
        }

        #[test]
        fn add_diff_inverts(a: u32, b: u32) {
            prop_assert_eq!(seq_add(a, seq_diff(b, a)), b);
            prop_assert_eq!(SeqNumber(a).add(SeqNumber(b).diff(SeqNumber(a))), SeqNumber(b));
        }

        #[test]
        fn order_survives_shift(a: u32, b: u32, reference: u32, shift: u32) {
            // Moving everything around the circle by the same amount keeps the order.
            prop_assert_eq!(
                seq_lt(a, b, reference),
                seq_lt(seq_add(a, shift), seq_add(b, shift), seq_add(reference, shift)));
        }
    }
}
