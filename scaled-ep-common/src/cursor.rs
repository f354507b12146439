//! Bounds-checked cursor over a frame.
//!
//! The cursor owns the frame for the duration of one packet. Headers are
//! reserved with [`Cursor::take`], which proves the whole header lies inside
//! the frame before handing out a [`HeaderRef`]. Only the cursor mints
//! header references, and the frame is never resized, so a reference stays
//! valid for as long as the cursor lives.

use core::marker::PhantomData;
use core::mem;

use crate::error::{Fault, Stage};
use crate::headers::Header;

/// Validated location of a header inside the frame.
pub struct HeaderRef<T> {
    offset: usize,
    _marker: PhantomData<T>,
}

impl<T> HeaderRef<T> {
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl<T> Clone for HeaderRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for HeaderRef<T> {}

impl<T> core::fmt::Debug for HeaderRef<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "HeaderRef({})", self.offset)
    }
}

/// Read position over a mutable frame with a fixed end.
pub struct Cursor<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// End boundary of the frame.
    pub fn end(&self) -> usize {
        self.buf.len()
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Reserves a `T` at the current position and moves past it.
    ///
    /// Fails with [`Fault::MalformedPacket`] for `stage` when
    /// `position + size_of::<T>()` would exceed the end of the frame.
    #[inline]
    pub fn take<T: Header>(&mut self, stage: Stage) -> Result<HeaderRef<T>, Fault> {
        let start = self.pos;
        self.skip(T::LEN, stage)?;
        Ok(HeaderRef {
            offset: start,
            _marker: PhantomData,
        })
    }

    /// Moves past `len` bytes whose contents are not needed.
    #[inline]
    pub fn skip(&mut self, len: usize, stage: Stage) -> Result<(), Fault> {
        let end = self
            .pos
            .checked_add(len)
            .ok_or(Fault::MalformedPacket(stage))?;

        if end > self.buf.len() {
            return Err(Fault::MalformedPacket(stage));
        }

        self.pos = end;
        Ok(())
    }

    #[inline]
    pub fn get<T: Header>(&self, hdr: HeaderRef<T>) -> &T {
        let bytes = &self.buf[hdr.offset..hdr.offset + mem::size_of::<T>()];
        // SAFETY: the range is in bounds and `T: Header` has alignment 1 and
        // no invalid bit patterns.
        unsafe { &*(bytes.as_ptr() as *const T) }
    }

    #[inline]
    pub fn get_mut<T: Header>(&mut self, hdr: HeaderRef<T>) -> &mut T {
        let bytes = &mut self.buf[hdr.offset..hdr.offset + mem::size_of::<T>()];
        // SAFETY: see `get`.
        unsafe { &mut *(bytes.as_mut_ptr() as *mut T) }
    }

    /// The whole frame, including bytes already consumed.
    pub fn frame(&self) -> &[u8] {
        &self.buf[..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::{EthHdr, UdpHdr};

    #[test]
    fn take_advances_by_header_size() {
        let mut buf = [0u8; 64];
        let mut cur = Cursor::new(&mut buf);

        let eth = cur.take::<EthHdr>(Stage::OuterEth).unwrap();
        assert_eq!(eth.offset(), 0);
        assert_eq!(cur.position(), 14);

        let udp = cur.take::<UdpHdr>(Stage::OuterUdp).unwrap();
        assert_eq!(udp.offset(), 14);
        assert_eq!(cur.remaining(), 64 - 22);
    }

    #[test]
    fn take_rejects_header_crossing_end() {
        let mut buf = [0u8; 13];
        let mut cur = Cursor::new(&mut buf);

        assert_eq!(
            cur.take::<EthHdr>(Stage::OuterEth).unwrap_err(),
            Fault::MalformedPacket(Stage::OuterEth)
        );
        // A failed take does not move the cursor.
        assert_eq!(cur.position(), 0);
    }

    #[test]
    fn exact_fit_is_accepted() {
        let mut buf = [0u8; 14];
        let mut cur = Cursor::new(&mut buf);
        assert!(cur.take::<EthHdr>(Stage::OuterEth).is_ok());
        assert_eq!(cur.remaining(), 0);
    }

    #[test]
    fn skip_overflow_is_malformed() {
        let mut buf = [0u8; 8];
        let mut cur = Cursor::new(&mut buf);
        cur.skip(4, Stage::Geneve).unwrap();
        assert_eq!(
            cur.skip(usize::MAX, Stage::Geneve),
            Err(Fault::MalformedPacket(Stage::Geneve))
        );
    }

    #[test]
    fn get_mut_writes_through() {
        let mut buf = [0u8; 14];
        let mut cur = Cursor::new(&mut buf);
        let eth = cur.take::<EthHdr>(Stage::OuterEth).unwrap();
        cur.get_mut(eth).h_proto = 0x0800u16.to_be();
        assert_eq!(cur.get(eth).ether_type(), 0x0800);
        assert_eq!(&cur.frame()[12..14], &[0x08, 0x00]);
    }
}
