//! Ring buffers as the byte streams of a connection.
//!
//! The connection itself only tracks two cursors: the queued send data and the free receive
//! space, see [`BufferConnection`]. The adapters here own the memory those cursors point into and
//! translate between the cursors and plain byte slices for the user of the connection.
//!
//! The receive ring may carry a *mirror*: a few bytes past the end of the ring that repeat its
//! first bytes. A reader can then always get up to the mirror size of received data as one
//! contiguous slice, even when the data wraps around the end of the ring.
//!
//! [`BufferConnection`]: trait.BufferConnection.html
use core::borrow::BorrowMut;
use core::convert::TryFrom;

use crate::storage::{add_modulo, BufRef, WrapBuf, WrapBufMut};

use super::config::MAX_RCV_WND;

/// The buffer cursors of a connection.
///
/// The send buffer holds the data queued for sending, from the oldest unacknowledged byte on.
/// The receive buffer is the *free* space into which the next received bytes go. Both refer to
/// rings with eager consumption: an offset is never equal to the capacity.
pub trait BufferConnection {
    /// The queued send data.
    fn send_buf(&self) -> BufRef;

    /// Replace the send buffer.
    fn set_send_buf(&mut self, buf: BufRef);

    /// Append `amount` bytes, already in the ring, to the queued send data.
    fn extend_send_buf(&mut self, amount: usize);

    /// The free receive space.
    fn recv_buf(&self) -> BufRef;

    /// Replace the receive buffer.
    fn set_recv_buf(&mut self, buf: BufRef);

    /// Return `amount` bytes of consumed data as free receive space.
    fn extend_recv_buf(&mut self, amount: usize);

    /// Set by how much the receive window must grow before it is announced.
    fn set_window_update_threshold(&mut self, threshold: u32);
}

/// A send buffer backed by a ring.
pub struct SendRing<B> {
    buffer: B,
}

/// A receive buffer backed by a ring, with an optional mirror region.
pub struct RecvRing<B> {
    /// The ring followed by the mirror.
    buffer: B,
    mirror_size: usize,
}

impl<B: BorrowMut<[u8]>> SendRing<B> {
    /// Use all of `buffer` as the ring.
    ///
    /// # Panics
    /// This function panics if the buffer is empty.
    pub fn new(buffer: B) -> Self {
        assert!(!buffer.borrow().is_empty(), "send ring needs memory");
        SendRing { buffer }
    }

    /// Size of the ring.
    pub fn capacity(&self) -> usize {
        self.buffer.borrow().len()
    }

    /// The underlying buffer.
    pub fn get_ref(&self) -> &B {
        &self.buffer
    }

    /// Unwrap the underlying buffer.
    pub fn into_inner(self) -> B {
        self.buffer
    }

    /// Make the ring the (empty) send buffer of the connection.
    pub fn setup<C: BufferConnection>(&mut self, con: &mut C) {
        con.set_send_buf(BufRef::new(self.capacity(), 0, 0));
    }

    fn send_buf<C: BufferConnection>(&self, con: &C) -> BufRef {
        let snd_buf = con.send_buf();
        debug_assert_eq!(snd_buf.capacity, self.capacity());
        assert!(snd_buf.len <= self.capacity());
        assert!(snd_buf.offset < self.capacity());
        snd_buf
    }

    /// Space for more data.
    pub fn free_len<C: BufferConnection>(&self, con: &C) -> usize {
        self.capacity() - self.send_buf(con).len
    }

    /// The free space, starting where the next byte of data goes.
    ///
    /// Bytes written here are queued for sending by `provide_data`.
    pub fn write_ptr<C: BufferConnection>(&mut self, con: &C) -> WrapBufMut<'_> {
        let snd_buf = self.send_buf(con);
        let free = self.capacity() - snd_buf.len;
        WrapBufMut::new(self.buffer.borrow_mut(), snd_buf.end(), free)
    }

    /// Queue `amount` bytes that were written through `write_ptr`.
    pub fn provide_data<C: BufferConnection>(&mut self, con: &mut C, amount: usize) {
        assert!(amount <= self.free_len(&*con), "providing more than the free space");
        con.extend_send_buf(amount);
    }

    /// Copy `data` into the ring and queue it.
    pub fn write_data<C: BufferConnection>(&mut self, con: &mut C, data: &[u8]) {
        assert!(data.len() <= self.free_len(&*con), "writing more than the free space");
        self.write_ptr(&*con).copy_in(data);
        con.extend_send_buf(data.len());
    }

    /// The queued data, for producing segments.
    pub fn queued<C: BufferConnection>(&self, con: &C) -> WrapBuf<'_> {
        self.send_buf(con).view(self.buffer.borrow())
    }
}

impl<B: BorrowMut<[u8]>> RecvRing<B> {
    /// Use `buffer` as a ring followed by `mirror_size` bytes of mirror.
    ///
    /// A `mirror_size` of zero disables mirroring.
    ///
    /// # Panics
    /// This function panics if the mirror would not be smaller than the ring.
    pub fn new(buffer: B, mirror_size: usize) -> Self {
        let len = buffer.borrow().len();
        assert!(mirror_size <= len, "mirror larger than the buffer");
        assert!(mirror_size < len - mirror_size, "mirror must be smaller than the ring");
        RecvRing { buffer, mirror_size }
    }

    /// Size of the ring, without the mirror.
    pub fn capacity(&self) -> usize {
        self.buffer.borrow().len() - self.mirror_size
    }

    /// Size of the mirror region.
    pub fn mirror_size(&self) -> usize {
        self.mirror_size
    }

    /// The underlying buffer.
    pub fn get_ref(&self) -> &B {
        &self.buffer
    }

    /// Unwrap the underlying buffer.
    pub fn into_inner(self) -> B {
        self.buffer
    }

    /// Make the ring the receive buffer of the connection.
    ///
    /// The window update threshold becomes a `wnd_upd_div`-th of the window. `initial_rx_data`
    /// is placed at the start of the ring as if it had been received already, mirror included.
    ///
    /// The free space of a previous receive buffer must fit into the new ring after the initial
    /// data, so the window already announced to the peer is never shrunk. Its contents are not
    /// kept, use [`setup_replacing`](#method.setup_replacing) for that.
    pub fn setup<C: BufferConnection>(&mut self, con: &mut C, wnd_upd_div: u32, initial_rx_data: &[u8]) {
        self.setup_with(con, wnd_upd_div, initial_rx_data, None)
    }

    /// Make the ring the receive buffer of the connection in place of `old_ring`.
    ///
    /// Like [`setup`](#method.setup), but the free space of the previous receive buffer is
    /// copied after the initial data. Data received out of sequence into it is kept this way.
    /// `old_ring` is the ring the current receive buffer of the connection refers to, without a
    /// mirror.
    ///
    /// # Panics
    /// This function panics if `old_ring` does not have the capacity of the receive buffer.
    pub fn setup_replacing<C: BufferConnection>(
        &mut self,
        con: &mut C,
        wnd_upd_div: u32,
        initial_rx_data: &[u8],
        old_ring: &[u8],
    ) {
        self.setup_with(con, wnd_upd_div, initial_rx_data, Some(old_ring))
    }

    fn setup_with<C: BufferConnection>(
        &mut self,
        con: &mut C,
        wnd_upd_div: u32,
        initial_rx_data: &[u8],
        old_ring: Option<&[u8]>,
    ) {
        let capacity = self.capacity();
        let initial = initial_rx_data.len();
        let old_buf = con.recv_buf();
        assert!(wnd_upd_div >= 2);
        assert!(initial <= capacity, "initial data exceeds the ring");
        assert!(old_buf.len <= capacity - initial, "announced window does not fit");

        let max_rx_window = u32::try_from(capacity).unwrap_or(u32::max_value()).min(MAX_RCV_WND);
        let threshold = (max_rx_window / wnd_upd_div).max(1);
        con.set_window_update_threshold(threshold);

        let buffer = self.buffer.borrow_mut();
        buffer[..initial].copy_from_slice(initial_rx_data);
        let mirrored = initial.min(self.mirror_size);
        buffer.copy_within(..mirrored, capacity);

        match old_ring {
            Some(old_ring) if old_buf.len > 0 => {
                assert_eq!(old_ring.len(), old_buf.capacity, "not the ring of the receive buffer");
                // Still free space in the new ring, the mirror follows once it is received.
                old_buf.view(old_ring).copy_out(&mut buffer[initial..initial + old_buf.len]);
            },
            _ => (),
        }

        let offset = add_modulo(0, initial, capacity);
        con.set_recv_buf(BufRef::new(capacity, offset, capacity - initial));
    }

    fn recv_buf<C: BufferConnection>(&self, con: &C) -> BufRef {
        let rcv_buf = con.recv_buf();
        debug_assert_eq!(rcv_buf.capacity, self.capacity());
        assert!(rcv_buf.len <= self.capacity());
        assert!(rcv_buf.offset < self.capacity());
        rcv_buf
    }

    /// Received data not yet consumed.
    pub fn used_len<C: BufferConnection>(&self, con: &C) -> usize {
        self.capacity() - self.recv_buf(con).len
    }

    /// The received data, oldest byte first.
    pub fn read_ptr<C: BufferConnection>(&self, con: &C) -> WrapBuf<'_> {
        let rcv_buf = self.recv_buf(con);
        let capacity = self.capacity();
        WrapBuf::new(&self.buffer.borrow()[..capacity], rcv_buf.end(), capacity - rcv_buf.len)
    }

    /// Release `amount` bytes of received data that were read through `read_ptr`.
    pub fn consume_data<C: BufferConnection>(&mut self, con: &mut C, amount: usize) {
        assert!(amount <= self.used_len(&*con), "consuming more than was received");
        con.extend_recv_buf(amount);
    }

    /// Copy received data into `out` and release it.
    pub fn read_data<C: BufferConnection>(&mut self, con: &mut C, out: &mut [u8]) {
        assert!(out.len() <= self.used_len(&*con), "reading more than was received");
        self.read_ptr(&*con).copy_out(out);
        con.extend_recv_buf(out.len());
    }

    /// The free space into which the network path writes received bytes.
    ///
    /// After writing, the connection consumes the free space and `update_mirror_after_data_received`
    /// must be called with the same amount.
    pub fn recv_region_mut<C: BufferConnection>(&mut self, con: &C) -> WrapBufMut<'_> {
        let rcv_buf = self.recv_buf(con);
        let capacity = self.capacity();
        rcv_buf.view_mut(&mut self.buffer.borrow_mut()[..capacity])
    }

    /// Copy newly received bytes that landed at the start of the ring into the mirror.
    ///
    /// `amount` is the number of bytes just received, the connection's receive buffer must
    /// already have been advanced past them.
    pub fn update_mirror_after_data_received<C: BufferConnection>(&mut self, con: &C, amount: usize) {
        let mirror_size = self.mirror_size;
        if amount == 0 || mirror_size == 0 {
            return;
        }

        let capacity = self.capacity();
        let rcv_buf = con.recv_buf();
        assert!(rcv_buf.len + amount <= capacity);
        assert!(rcv_buf.offset < capacity);

        // Where the new data starts.
        let data_offset = add_modulo(rcv_buf.offset, capacity - amount, capacity);
        let buffer = self.buffer.borrow_mut();

        if data_offset < mirror_size {
            let len = amount.min(mirror_size - data_offset);
            buffer.copy_within(data_offset..data_offset + len, capacity + data_offset);
        }

        if amount > capacity - data_offset {
            let len = (amount - (capacity - data_offset)).min(mirror_size);
            buffer.copy_within(..len, capacity);
        }
    }

    /// Up to `len` bytes of received data as one slice, continuing into the mirror.
    ///
    /// # Panics
    /// This function panics if `len` exceeds the received data or reaches beyond the mirror.
    pub fn mirrored_read<C: BufferConnection>(&self, con: &C, len: usize) -> &[u8] {
        let read_offset = self.recv_buf(con).end();
        assert!(len <= self.used_len(con), "reading more than was received");
        assert!(read_offset + len <= self.capacity() + self.mirror_size, "read beyond the mirror");
        &self.buffer.borrow()[read_offset..read_offset + len]
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    /// Bare cursors, as a connection keeps them.
    #[derive(Default)]
    struct Cursors {
        snd: BufRef,
        rcv: BufRef,
        threshold: u32,
    }

    impl BufferConnection for Cursors {
        fn send_buf(&self) -> BufRef { self.snd }
        fn set_send_buf(&mut self, buf: BufRef) { self.snd = buf }
        fn extend_send_buf(&mut self, amount: usize) { self.snd.extend(amount) }
        fn recv_buf(&self) -> BufRef { self.rcv }
        fn set_recv_buf(&mut self, buf: BufRef) { self.rcv = buf }
        fn extend_recv_buf(&mut self, amount: usize) { self.rcv.extend(amount) }
        fn set_window_update_threshold(&mut self, threshold: u32) { self.threshold = threshold }
    }

    #[test]
    fn send_wraps_around() {
        let mut con = Cursors::default();
        let mut ring = SendRing::new([0u8; 3]);
        ring.setup(&mut con);
        assert_eq!(ring.free_len(&con), 3);

        ring.write_data(&mut con, b"ab");
        assert_eq!(ring.free_len(&con), 1);
        // Acknowledged by the peer.
        con.snd.consume(2);
        assert_eq!(ring.free_len(&con), 3);

        ring.write_data(&mut con, b"cde");
        assert_eq!(ring.free_len(&con), 0);
        assert_eq!(ring.queued(&con).as_slices(), (&b"c"[..], &b"de"[..]));

        con.snd.consume(3);
        ring.write_data(&mut con, b"f");
        assert_eq!(ring.queued(&con).as_slices(), (&b"f"[..], &b""[..]));
        assert_eq!(ring.get_ref(), b"def");
    }

    #[test]
    fn send_provide_in_place() {
        let mut con = Cursors::default();
        let mut ring = SendRing::new([0u8; 4]);
        ring.setup(&mut con);

        let mut free = ring.write_ptr(&con);
        assert_eq!(free.len(), 4);
        free.copy_in(b"xy");
        ring.provide_data(&mut con, 2);
        assert_eq!(con.snd, BufRef::new(4, 0, 2));

        let mut out = [0; 2];
        ring.queued(&con).copy_out(&mut out);
        assert_eq!(&out, b"xy");
    }

    #[test]
    #[should_panic]
    fn send_overfull() {
        let mut con = Cursors::default();
        let mut ring = SendRing::new([0u8; 2]);
        ring.setup(&mut con);
        ring.write_data(&mut con, b"abc");
    }

    #[test]
    fn recv_setup() {
        let mut con = Cursors::default();
        let mut ring = RecvRing::new([0u8; 10], 0);
        ring.setup(&mut con, 2, b"hey");
        assert_eq!(con.threshold, 5);
        assert_eq!(con.rcv, BufRef::new(10, 3, 7));
        assert_eq!(ring.used_len(&con), 3);
        assert_eq!(ring.read_ptr(&con).as_slices(), (&b"hey"[..], &b""[..]));

        let mut con = Cursors::default();
        let mut ring = RecvRing::new([0u8; 3], 0);
        ring.setup(&mut con, 4, b"");
        // Never zero.
        assert_eq!(con.threshold, 1);
    }

    #[test]
    fn recv_full_initial() {
        let mut con = Cursors::default();
        let mut ring = RecvRing::new([0u8; 4], 0);
        ring.setup(&mut con, 2, b"full");
        assert_eq!(con.rcv, BufRef::new(4, 0, 0));
        assert_eq!(ring.used_len(&con), 4);
    }

    /// Write through the free region and advance the cursors like the network path does.
    fn receive<B: BorrowMut<[u8]>>(ring: &mut RecvRing<B>, con: &mut Cursors, data: &[u8]) {
        ring.recv_region_mut(con).copy_in(data);
        con.rcv.consume(data.len());
        ring.update_mirror_after_data_received(con, data.len());
    }

    #[test]
    fn recv_mirror() {
        let mut con = Cursors::default();
        let mut ring = RecvRing::new([0u8; 6], 2);
        assert_eq!(ring.capacity(), 4);
        ring.setup(&mut con, 2, b"");

        receive(&mut ring, &mut con, b"abc");
        assert_eq!(&ring.get_ref()[4..], b"ab");
        assert_eq!(ring.mirrored_read(&con, 3), b"abc");

        let mut out = [0; 2];
        ring.read_data(&mut con, &mut out);
        assert_eq!(&out, b"ab");
        assert_eq!(ring.used_len(&con), 1);

        // Wraps: lands at 3, 0 and 1.
        receive(&mut ring, &mut con, b"def");
        assert_eq!(ring.get_ref(), b"efcdef");
        assert_eq!(ring.used_len(&con), 4);
        assert_eq!(ring.read_ptr(&con).as_slices(), (&b"cd"[..], &b"ef"[..]));
        assert_eq!(ring.mirrored_read(&con, 4), b"cdef");

        ring.consume_data(&mut con, 4);
        assert_eq!(ring.used_len(&con), 0);
    }

    #[test]
    fn recv_initial_is_mirrored() {
        let mut con = Cursors::default();
        let mut ring = RecvRing::new([0u8; 6], 2);
        ring.setup(&mut con, 2, b"xyz");
        assert_eq!(ring.get_ref(), b"xyz\0xy");
    }

    #[test]
    #[should_panic]
    fn recv_mirror_too_large() {
        RecvRing::new([0u8; 6], 3);
    }

    #[test]
    fn recv_replace_keeps_free_contents() {
        let mut con = Cursors::default();
        let mut old = RecvRing::new([0u8; 8], 0);
        old.setup(&mut con, 2, b"");
        receive(&mut old, &mut con, b"ab");
        old.consume_data(&mut con, 2);
        // Out of sequence data, wrapping around in the free space.
        old.recv_region_mut(&con).copy_in(b"cdefghij");
        assert_eq!(old.get_ref(), b"ijcdefgh");

        let mut ring = RecvRing::new([0u8; 16], 0);
        ring.setup_replacing(&mut con, 2, b"12", old.get_ref());
        assert_eq!(con.rcv, BufRef::new(16, 2, 14));
        assert_eq!(ring.used_len(&con), 2);

        // The data before the gap arrives, the rest is already in place.
        con.rcv.consume(8);
        let mut out = [0; 10];
        ring.read_data(&mut con, &mut out);
        assert_eq!(&out, b"12cdefghij");
    }

    #[test]
    #[should_panic]
    fn recv_replace_wrong_ring() {
        let mut con = Cursors::default();
        let mut old = RecvRing::new([0u8; 8], 0);
        old.setup(&mut con, 2, b"");
        let mut ring = RecvRing::new([0u8; 16], 0);
        ring.setup_replacing(&mut con, 2, b"", &[0; 4]);
    }

    proptest! {
        #[test]
        fn send_cursors_stay_inside(
            capacity in 6usize..24,
            start in 0usize..24,
            data in proptest::collection::vec(any::<u8>(), 6),
        ) {
            let start = start % capacity;
            let mut con = Cursors::default();
            let mut ring = SendRing::new(vec![0u8; capacity]);
            con.set_send_buf(BufRef::new(capacity, start, 0));
            prop_assert_eq!(ring.write_ptr(&con).len(), capacity);

            let first = vec![0xeeu8; capacity - 3];
            ring.write_data(&mut con, &first);
            prop_assert_eq!(ring.free_len(&con), 3);
            prop_assert_eq!(ring.write_ptr(&con).len(), 3);
            con.snd.consume(capacity - 3);

            ring.write_data(&mut con, &data);
            prop_assert_eq!(ring.free_len(&con), capacity - 6);
            prop_assert_eq!(ring.write_ptr(&con).len(), capacity - 6);
            prop_assert!(con.snd.offset < capacity);

            let mut out = [0; 6];
            ring.queued(&con).copy_out(&mut out);
            prop_assert_eq!(&out[..], &data[..]);
        }

        #[test]
        fn recv_mirror_any_offset(
            capacity in 4usize..24,
            mirror in 0usize..12,
            start in 0usize..24,
            data in proptest::collection::vec(any::<u8>(), 0..24),
        ) {
            let mirror = mirror % ((capacity + 1) / 2);
            let start = start % capacity;
            let data = &data[..data.len().min(capacity)];

            let mut con = Cursors::default();
            let mut ring = RecvRing::new(vec![0u8; capacity + mirror], mirror);
            ring.setup(&mut con, 2, b"");
            // Move the cursors to `start`.
            receive(&mut ring, &mut con, &vec![0u8; start]);
            ring.consume_data(&mut con, start);

            receive(&mut ring, &mut con, data);
            prop_assert_eq!(ring.used_len(&con), data.len());
            prop_assert_eq!(ring.recv_region_mut(&con).len(), capacity - data.len());

            let mut out = vec![0; data.len()];
            ring.read_ptr(&con).copy_out(&mut out);
            prop_assert_eq!(&out[..], data);

            let contiguous = data.len().min(mirror);
            prop_assert_eq!(ring.mirrored_read(&con, contiguous), &data[..contiguous]);
        }
    }
}
