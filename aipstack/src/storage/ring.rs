//! Cursors and views into circular byte buffers.
//!
//! A ring is a single fixed-capacity slice. A [`BufRef`] selects a window of it that starts at
//! some offset and may wrap past the end back to the start. [`WrapBuf`] and [`WrapBufMut`] are
//! the borrowed views of such a window as two plain slices.
//!
//! [`BufRef`]: struct.BufRef.html
//! [`WrapBuf`]: struct.WrapBuf.html
//! [`WrapBufMut`]: struct.WrapBufMut.html
use core::fmt;

/// Add `count` to an index into a ring of size `modulo`.
///
/// Requires `start < modulo` (or both zero) and `count <= modulo`.
pub fn add_modulo(start: usize, count: usize, modulo: usize) -> usize {
    debug_assert!(count <= modulo);
    let x = start + count;
    if x >= modulo {
        x - modulo
    } else {
        x
    }
}

/// A window into a ring buffer.
///
/// Only the position is described, the memory itself is owned elsewhere. With eager consumption
/// the offset is always strictly less than the capacity, a window that would start at the very
/// end starts at zero instead.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BufRef {
    /// The size of the underlying ring.
    pub capacity: usize,
    /// Index of the first byte of the window.
    pub offset: usize,
    /// Number of bytes in the window.
    pub len: usize,
}

impl BufRef {
    /// A window that does not refer to any memory.
    pub const EMPTY: BufRef = BufRef { capacity: 0, offset: 0, len: 0 };

    /// Describe a window.
    ///
    /// # Panics
    /// This function panics if `offset` or `len` are out of bounds for the capacity.
    pub fn new(capacity: usize, offset: usize, len: usize) -> Self {
        let buf = BufRef { capacity, offset, len };
        buf.assert_valid();
        buf
    }

    /// Check that the window is within its ring.
    pub fn assert_valid(&self) {
        assert!(self.len <= self.capacity, "window longer than ring");
        assert!(self.offset < self.capacity || self.capacity == 0, "offset beyond ring");
    }

    /// Index just past the last byte of the window.
    pub fn end(&self) -> usize {
        add_modulo(self.offset, self.len, self.capacity)
    }

    /// Bytes in the ring that are not part of the window.
    pub fn remaining(&self) -> usize {
        self.capacity - self.len
    }

    /// Drop `amount` bytes from the front of the window.
    pub fn consume(&mut self, amount: usize) {
        assert!(amount <= self.len, "consuming more than the window holds");
        self.offset = add_modulo(self.offset, amount, self.capacity);
        self.len -= amount;
    }

    /// Grow the window by `amount` bytes at its end.
    pub fn extend(&mut self, amount: usize) {
        assert!(amount <= self.remaining(), "extending beyond the ring");
        self.len += amount;
    }

    /// Borrow the window out of the ring memory.
    pub fn view<'a>(&self, ring: &'a [u8]) -> WrapBuf<'a> {
        WrapBuf::new(ring, self.offset, self.len)
    }

    /// Mutably borrow the window out of the ring memory.
    pub fn view_mut<'a>(&self, ring: &'a mut [u8]) -> WrapBufMut<'a> {
        WrapBufMut::new(ring, self.offset, self.len)
    }
}

impl fmt::Display for BufRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}+{}/{}]", self.offset, self.len, self.capacity)
    }
}

/// A possibly wrapping window into a ring, as two slices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WrapBuf<'a> {
    first: &'a [u8],
    wrapped: &'a [u8],
}

/// A possibly wrapping mutable window into a ring, as two slices.
#[derive(Debug, PartialEq, Eq)]
pub struct WrapBufMut<'a> {
    first: &'a mut [u8],
    wrapped: &'a mut [u8],
}

/// Split a window at `start` of length `len` into the lengths before and after the wrap.
fn split_lengths(capacity: usize, start: usize, len: usize) -> (usize, usize) {
    assert!(len <= capacity);
    assert!(start < capacity || len == 0);
    let first = len.min(capacity - start.min(capacity));
    (first, len - first)
}

impl<'a> WrapBuf<'a> {
    /// View `len` bytes of `ring` from `start` on, continuing at index zero at the end.
    ///
    /// # Panics
    /// This function panics if the window does not fit the ring.
    pub fn new(ring: &'a [u8], start: usize, len: usize) -> Self {
        let (first_len, wrapped_len) = split_lengths(ring.len(), start, len);
        let (head, tail) = ring.split_at(start.min(ring.len()));
        WrapBuf {
            first: &tail[..first_len],
            wrapped: &head[..wrapped_len],
        }
    }

    /// The total number of bytes in the window.
    pub fn len(&self) -> usize {
        self.first.len() + self.wrapped.len()
    }

    /// Check if the window is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The part before the wrap and the part after it.
    pub fn as_slices(&self) -> (&'a [u8], &'a [u8]) {
        (self.first, self.wrapped)
    }

    /// Fill `out` from the start of the window.
    ///
    /// # Panics
    /// This function panics if `out` is longer than the window.
    pub fn copy_out(&self, out: &mut [u8]) {
        assert!(out.len() <= self.len(), "reading beyond the window");
        let split = out.len().min(self.first.len());
        let (out_first, out_wrapped) = out.split_at_mut(split);
        out_first.copy_from_slice(&self.first[..split]);
        out_wrapped.copy_from_slice(&self.wrapped[..out_wrapped.len()]);
    }
}

impl<'a> WrapBufMut<'a> {
    /// View `len` bytes of `ring` from `start` on, continuing at index zero at the end.
    ///
    /// # Panics
    /// This function panics if the window does not fit the ring.
    pub fn new(ring: &'a mut [u8], start: usize, len: usize) -> Self {
        let (first_len, wrapped_len) = split_lengths(ring.len(), start, len);
        let split = start.min(ring.len());
        let (head, tail) = ring.split_at_mut(split);
        WrapBufMut {
            first: &mut tail[..first_len],
            wrapped: &mut head[..wrapped_len],
        }
    }

    /// The total number of bytes in the window.
    pub fn len(&self) -> usize {
        self.first.len() + self.wrapped.len()
    }

    /// Check if the window is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The part before the wrap and the part after it.
    pub fn as_mut_slices(&mut self) -> (&mut [u8], &mut [u8]) {
        (&mut *self.first, &mut *self.wrapped)
    }

    /// Consume the view into its two parts.
    pub fn into_slices(self) -> (&'a mut [u8], &'a mut [u8]) {
        (self.first, self.wrapped)
    }

    /// Write `data` to the start of the window.
    ///
    /// # Panics
    /// This function panics if `data` is longer than the window.
    pub fn copy_in(&mut self, data: &[u8]) {
        assert!(data.len() <= self.len(), "writing beyond the window");
        let split = data.len().min(self.first.len());
        let (data_first, data_wrapped) = data.split_at(split);
        self.first[..split].copy_from_slice(data_first);
        self.wrapped[..data_wrapped.len()].copy_from_slice(data_wrapped);
    }

    /// Fill `out` from the start of the window.
    pub fn copy_out(&self, out: &mut [u8]) {
        WrapBuf { first: &*self.first, wrapped: &*self.wrapped }.copy_out(out)
    }
}
