//! Decodes the TCP options of a SYN and shows what a connection would answer with.
//!
//! # Usage
//!
//! Pass the bytes of the options area in hexadecimal, for example those of a SYN captured with
//! `tcpdump -x`. Anything after the given options length is treated as payload.
//!
//!   > $ cargo run --example tcp_opts -- 02 04 05 b4 01 03 03 07
//!
//! The interface MSS and the minimum MTU that bound the negotiation can be changed:
//!
//!   > $ cargo run --example tcp_opts -- --iface-mss 1200 --min-mtu 1280 02 04 05 b4
use std::io::{stdout, Write};
use std::num::ParseIntError;
use structopt::StructOpt;

use aipstack::layer::tcp::{self, policy};
use aipstack::time::Instant;
use aipstack::timer::Manual;
use aipstack::wire::tcp_options;

fn main() {
    let Config {
        iface_mss,
        min_mtu,
        options_len,
        bytes,
    } = Config::from_args();

    let options_len = options_len.unwrap_or(bytes.len()).min(bytes.len()).min(40);

    let out = stdout();
    let mut out = out.lock();

    // Fits in a u8, bounded by the maximum options length above.
    let (opts, payload) = tcp_options::parse_options(&bytes, options_len as u8);
    writeln!(out, "options: {:?}", opts).unwrap();
    writeln!(out, "payload: {} bytes", payload.len()).unwrap();

    let config = tcp::Config {
        min_mtu,
        ..tcp::Config::default()
    };

    // Answer the options as if they came with a SYN.
    let mut con = tcp::Connection::new(Manual::new(Instant::ZERO), config);
    if !con.syn_received(&opts, iface_mss) {
        writeln!(out, "rejected: mss below {}", config.min_allowed_mss()).unwrap();
        return;
    }

    let cwnd = policy::calc_initial_cwnd(u32::from(con.snd_mss()));
    writeln!(out, "send mss: {}", con.snd_mss()).unwrap();
    writeln!(out, "initial cwnd: {}", cwnd).unwrap();
    writeln!(out, "window shifts: send {} receive {}", con.snd_wnd_shift(), con.rcv_wnd_shift()).unwrap();

    let reply = con.syn_options();
    let mut encoded = [0; tcp_options::MAX_OPTIONS_WRITE_LEN as usize];
    let len = usize::from(tcp_options::calc_options_len(&reply));
    tcp_options::write_options(&reply, &mut encoded[..len]);
    write!(out, "our syn-ack options:").unwrap();
    for byte in &encoded[..len] {
        write!(out, " {:02x}", byte).unwrap();
    }
    writeln!(out).unwrap();
}

fn parse_hex(src: &str) -> Result<u8, ParseIntError> {
    u8::from_str_radix(src.trim_start_matches("0x"), 16)
}

#[derive(StructOpt)]
struct Config {
    /// The largest segment the local interface can carry.
    #[structopt(long, default_value = "1460")]
    iface_mss: u16,
    /// The smallest MTU assumed for the network.
    #[structopt(long, default_value = "576")]
    min_mtu: u16,
    /// Length of the options area, the default is all given bytes.
    #[structopt(long)]
    options_len: Option<usize>,
    /// Bytes of the options area, in hex.
    #[structopt(parse(try_from_str = parse_hex))]
    bytes: Vec<u8>,
}
