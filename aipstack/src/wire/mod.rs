/*! Low-level segment access and construction.

# Segment representations

The `wire` module deals with the segment *representation*. It provides two levels of
functionality.

 * First, it provides functions to extract fields from sequences of octets, and to insert fields
   into sequences of octets. This happens in the lowercase structure [`tcp`].
 * Second, it provides a compact, high-level representation of header data that can be created from
   parsing and emitted into a sequence of octets. This is [`TcpSegMeta`] together with the
   negotiated [`TcpOptions`].

[`tcp`]: tcp/struct.tcp.html
[`TcpSegMeta`]: tcp/struct.TcpSegMeta.html
[`TcpOptions`]: tcp_options/struct.TcpOptions.html

The `tcp` wrapper guarantees that, if `tcp::check_len()` returned `Ok(())`, then no field accessor
or setter method will panic. The guarantee only holds while the data offset is not mutated.

`TcpSegMeta::parse()` never panics. `TcpSegMeta::emit()` never panics and reports a buffer shorter
than `TcpSegMeta::header_len()` as an error.

Options are handled leniently: anything malformed or unknown inside the options area is skipped
and never fails the parse of the segment as a whole.

Sequence numbers live on a circle. [`SeqNumber`] therefore has no ordering of its own, every
comparison names the reference point it is relative to.

[`SeqNumber`]: tcp/struct.SeqNumber.html

# Examples

To emit a SYN header into an octet buffer, and then parse it back:

```rust
use aipstack::wire::tcp::{SeqNumber, TcpFlags, TcpSegMeta};
use aipstack::wire::tcp_options::TcpOptions;

let meta = TcpSegMeta {
    local_port: 49152,
    remote_port: 80,
    seq_num: SeqNumber(1000),
    ack_num: SeqNumber(0),
    window_size: 4096,
    flags: TcpFlags::SYN,
    opts: Some(TcpOptions::with_mss(1460)),
};

let mut buffer = vec![0; meta.header_len()];
meta.emit(&mut buffer).expect("buffer fits the header");

let (parsed, payload) = TcpSegMeta::parse(&buffer).expect("valid segment");
assert!(payload.is_empty());
// Parsing sees the segment from the receiving end.
assert_eq!(parsed.local_port, 80);
assert_eq!(parsed.remote_port, 49152);
assert_eq!(parsed.opts.and_then(|opts| opts.mss()), Some(1460));
```
*/
mod error;
pub mod tcp;
pub mod tcp_options;

pub use self::error::{
    Error,
    Result};

pub use self::tcp::{
    tcp as tcp_segment,
    SeqNumber,
    TcpFlags,
    TcpSegMeta};

pub use self::tcp_options::TcpOptions;
