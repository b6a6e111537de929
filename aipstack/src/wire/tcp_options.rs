//! The TCP options codec.
//!
//! Only the two options relevant for connection setup are understood: the maximum segment size
//! and the window scale. Everything else in the options area is skipped. Parsing never fails,
//! a peer sending garbage merely ends up with fewer negotiated features.
use bitflags::bitflags;
use byteorder::{ByteOrder, NetworkEndian};

enum_with_unknown! {
    /// The kind byte of a TCP option.
    pub doc enum OptionKind(u8) {
        /// End of the option list.
        End = 0,
        /// Padding, a single byte without length field.
        Nop = 1,
        /// Maximum segment size, 2 bytes of data.
        Mss = 2,
        /// Window scale shift count, 1 byte of data.
        WindowScale = 3,
    }
}

bitflags! {
    /// Flags for the options that were found in (or should be written to) a segment.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct OptionFlags: u8 {
        /// The `mss` field is valid.
        const MSS       = 1 << 0;
        /// The `wnd_scale` field is valid.
        const WND_SCALE = 1 << 1;
    }
}

/// The options of a segment that we care about.
///
/// A field is only meaningful if its flag is set. Parsing clears all flags first and sets a flag
/// only when the corresponding option was present and well-formed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TcpOptions {
    /// Which of the fields below are present.
    pub flags: OptionFlags,
    /// The window scale shift count.
    pub wnd_scale: u8,
    /// The maximum segment size.
    pub mss: u16,
}

mod field {
    pub(crate) const LEN_MSS: u8 = 4;
    pub(crate) const LEN_WND_SCALE: u8 = 3;
}

/// Bytes needed to write the MSS option.
pub const OPT_WRITE_LEN_MSS: u8 = 4;

/// Bytes needed to write the window scale option, including one leading NOP.
pub const OPT_WRITE_LEN_WND_SCALE: u8 = 4;

/// The most bytes that `write_options` will ever produce.
pub const MAX_OPTIONS_WRITE_LEN: u8 = OPT_WRITE_LEN_MSS + OPT_WRITE_LEN_WND_SCALE;

impl TcpOptions {
    /// Options with the MSS flag set.
    pub fn with_mss(mss: u16) -> Self {
        TcpOptions {
            flags: OptionFlags::MSS,
            mss,
            ..TcpOptions::default()
        }
    }

    /// Add a window scale option.
    pub fn and_wnd_scale(mut self, wnd_scale: u8) -> Self {
        self.flags |= OptionFlags::WND_SCALE;
        self.wnd_scale = wnd_scale;
        self
    }

    /// The maximum segment size, if the option was present.
    pub fn mss(&self) -> Option<u16> {
        if self.flags.contains(OptionFlags::MSS) {
            Some(self.mss)
        } else {
            None
        }
    }

    /// The window scale shift count, if the option was present.
    pub fn wnd_scale(&self) -> Option<u8> {
        if self.flags.contains(OptionFlags::WND_SCALE) {
            Some(self.wnd_scale)
        } else {
            None
        }
    }
}

/// Parse the options area at the start of `buf`.
///
/// The first `opts_len` bytes of `buf` are the options area, the remainder is the segment
/// payload which is returned alongside the recognized options. The parser never looks beyond
/// `opts_len`. When an option length is inconsistent (shorter than its own header, or longer
/// than what remains) the rest of the area is skipped without trying to resynchronize on a
/// following byte.
pub fn parse_options(buf: &[u8], opts_len: u8) -> (TcpOptions, &[u8]) {
    let opts_len = usize::from(opts_len);
    debug_assert!(opts_len <= buf.len(), "options area exceeds the segment");

    // Temporarily restrict the view to the options area.
    let (mut area, data) = buf.split_at(opts_len.min(buf.len()));
    let mut opts = TcpOptions::default();

    while let Some((&kind, rest)) = area.split_first() {
        area = rest;

        let kind = OptionKind::from(kind);
        match kind {
            OptionKind::End => break,
            OptionKind::Nop => continue,
            _ => (),
        }

        let length = match area.split_first() {
            Some((&length, rest)) => {
                area = rest;
                length
            },
            None => {
                net_trace!("tcp option {:?} without length", kind);
                break;
            },
        };

        if length < 2 {
            net_trace!("tcp option {:?} with bad length {}", kind, length);
            break;
        }

        let data_len = usize::from(length - 2);
        if area.len() < data_len {
            net_trace!("tcp option {:?} truncated", kind);
            break;
        }

        let (value, rest) = area.split_at(data_len);
        area = rest;

        match (kind, length) {
            (OptionKind::Mss, field::LEN_MSS) => {
                opts.flags |= OptionFlags::MSS;
                opts.mss = NetworkEndian::read_u16(value);
            },
            (OptionKind::WindowScale, field::LEN_WND_SCALE) => {
                opts.flags |= OptionFlags::WND_SCALE;
                opts.wnd_scale = value[0];
            },
            // Unknown, or a known kind with the wrong length. Its data is already skipped.
            _ => (),
        }
    }

    (opts, data)
}

/// The number of bytes `write_options` will produce for these options.
///
/// Always a multiple of 4 so that the header needs no further padding for these options.
pub fn calc_options_len(opts: &TcpOptions) -> u8 {
    let mut len = 0;
    if opts.flags.contains(OptionFlags::MSS) {
        len += OPT_WRITE_LEN_MSS;
    }
    if opts.flags.contains(OptionFlags::WND_SCALE) {
        len += OPT_WRITE_LEN_WND_SCALE;
    }
    debug_assert!(len <= MAX_OPTIONS_WRITE_LEN);
    debug_assert_eq!(len % 4, 0);
    len
}

/// Write the flagged options into `out` and return the remaining buffer.
///
/// The MSS option comes first, then the window scale preceded by a NOP for alignment.
///
/// # Panics
/// This function panics if `out` is shorter than `calc_options_len(opts)`.
pub fn write_options<'a>(opts: &TcpOptions, mut out: &'a mut [u8]) -> &'a mut [u8] {
    if opts.flags.contains(OptionFlags::MSS) {
        let tmp = out;
        let (option, rest) = tmp.split_at_mut(usize::from(OPT_WRITE_LEN_MSS));
        option[0] = OptionKind::Mss.into();
        option[1] = field::LEN_MSS;
        NetworkEndian::write_u16(&mut option[2..4], opts.mss);
        out = rest;
    }

    if opts.flags.contains(OptionFlags::WND_SCALE) {
        let tmp = out;
        let (option, rest) = tmp.split_at_mut(usize::from(OPT_WRITE_LEN_WND_SCALE));
        option[0] = OptionKind::Nop.into();
        option[1] = OptionKind::WindowScale.into();
        option[2] = field::LEN_WND_SCALE;
        option[3] = opts.wnd_scale;
        out = rest;
    }

    out
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    static SYN_OPTIONS: [u8; 12] =
        [0x02, 0x04, 0x05, 0xb4,
         0x01, 0x03, 0x03, 0x06,
         0xde, 0xad, 0xbe, 0xef];

    #[test]
    fn parse_mss_and_window_scale() {
        let (opts, data) = parse_options(&SYN_OPTIONS, 8);
        assert_eq!(opts.mss(), Some(1460));
        assert_eq!(opts.wnd_scale(), Some(6));
        assert_eq!(data, &[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn end_stops_parsing() {
        let bytes = [0x00, 0x02, 0x04, 0x05, 0xb4, 0xff];
        let (opts, data) = parse_options(&bytes, 5);
        assert_eq!(opts, TcpOptions::default());
        assert_eq!(data, &[0xff]);
    }

    #[test]
    fn nop_padding_is_skipped() {
        let bytes = [0x01, 0x01, 0x01, 0x03, 0x03, 0x0e, 0x01, 0x00];
        let (opts, data) = parse_options(&bytes, 8);
        assert_eq!(opts.flags, OptionFlags::WND_SCALE);
        assert_eq!(opts.wnd_scale, 14);
        assert!(data.is_empty());
    }

    #[test]
    fn unknown_option_is_skipped() {
        // SACK permitted, then MSS.
        let bytes = [0x04, 0x02, 0x02, 0x04, 0x02, 0x18];
        let (opts, _) = parse_options(&bytes, 6);
        assert_eq!(opts.mss(), Some(536));
        assert_eq!(opts.wnd_scale(), None);
    }

    #[test]
    fn wrong_length_is_skipped() {
        // MSS with three data bytes, then a valid window scale.
        let bytes = [0x02, 0x05, 0x05, 0xb4, 0x00, 0x03, 0x03, 0x02];
        let (opts, data) = parse_options(&bytes, 8);
        assert_eq!(opts.mss(), None);
        assert_eq!(opts.wnd_scale(), Some(2));
        assert!(data.is_empty());
    }

    #[test]
    fn truncated_option_is_dropped() {
        // Window scale fine, MSS claims 4 bytes but only 3 remain in the options area.
        let bytes = [0x03, 0x03, 0x07, 0x02, 0x04, 0x05, 0xaa];
        let (opts, data) = parse_options(&bytes, 6);
        assert_eq!(opts.wnd_scale(), Some(7));
        assert_eq!(opts.mss(), None);
        assert_eq!(data, &[0xaa]);
    }

    #[test]
    fn bad_length_does_not_resynchronize() {
        // Length 1 is invalid, the MSS that follows must not be found.
        let bytes = [0x08, 0x01, 0x02, 0x04, 0x05, 0xb4, 0x00, 0x00];
        let (opts, data) = parse_options(&bytes, 8);
        assert_eq!(opts, TcpOptions::default());
        assert!(data.is_empty());
    }

    #[test]
    fn kind_without_length() {
        let bytes = [0x01, 0x02];
        let (opts, data) = parse_options(&bytes, 2);
        assert_eq!(opts.flags, OptionFlags::empty());
        assert!(data.is_empty());
    }

    #[test]
    fn options_len() {
        assert_eq!(calc_options_len(&TcpOptions::default()), 0);
        assert_eq!(calc_options_len(&TcpOptions::with_mss(1460)), 4);
        assert_eq!(calc_options_len(&TcpOptions::default().and_wnd_scale(6)), 4);
        assert_eq!(calc_options_len(&TcpOptions::with_mss(1460).and_wnd_scale(6)), 8);
    }

    #[test]
    fn write_syn_options() {
        let opts = TcpOptions::with_mss(1460).and_wnd_scale(6);
        let mut buffer = [0xa5; 10];
        let rest = write_options(&opts, &mut buffer);
        assert_eq!(rest.len(), 2);
        assert_eq!(&buffer[..8], &SYN_OPTIONS[..8]);
        assert_eq!(&buffer[8..], &[0xa5, 0xa5]);
    }

    #[test]
    fn kind_conversion() {
        assert_eq!(OptionKind::from(2), OptionKind::Mss);
        assert_eq!(OptionKind::from(8), OptionKind::Unknown(8));
        assert_eq!(u8::from(OptionKind::WindowScale), 3);
    }

    fn arb_options() -> impl Strategy<Value = TcpOptions> {
        (any::<Option<u16>>(), any::<Option<u8>>()).prop_map(|(mss, wnd_scale)| {
            let mut opts = TcpOptions::default();
            if let Some(mss) = mss {
                opts = TcpOptions::with_mss(mss);
            }
            if let Some(wnd_scale) = wnd_scale {
                opts = opts.and_wnd_scale(wnd_scale);
            }
            opts
        })
    }

    proptest! {
        #[test]
        fn written_options_parse_back(
            opts in arb_options(),
            payload in proptest::collection::vec(any::<u8>(), 0..32),
        ) {
            let len = calc_options_len(&opts);
            let mut segment = vec![0; usize::from(len) + payload.len()];
            let rest = write_options(&opts, &mut segment);
            prop_assert_eq!(rest.len(), payload.len());
            rest.copy_from_slice(&payload);

            let (parsed, data) = parse_options(&segment, len);
            prop_assert_eq!(parsed.flags, opts.flags);
            prop_assert_eq!(parsed.mss(), opts.mss());
            prop_assert_eq!(parsed.wnd_scale(), opts.wnd_scale());
            prop_assert_eq!(data, &payload[..]);
        }

        #[test]
        fn arbitrary_bytes_never_overrun(
            bytes in proptest::collection::vec(any::<u8>(), 0..48),
            cut in 0usize..48,
        ) {
            let opts_len = cut.min(bytes.len()).min(40) as u8;
            let (_, data) = parse_options(&bytes, opts_len);
            prop_assert_eq!(data, &bytes[usize::from(opts_len)..]);
        }
    }
}
