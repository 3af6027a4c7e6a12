//! Fixed capacity byte buffer with a fill cursor.
//!
//! A single buffer is carried through an update attempt: it holds the
//! outgoing request, then the incoming header block, then the body bytes
//! waiting to be programmed. The cursor (`len`) marks how much of it is
//! meaningful; everything past it is scratch space for the next read.

/// Attempted to store more bytes than the buffer can hold.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Overflow;

pub struct Buffer<const N: usize> {
    bytes: [u8; N],
    head: usize,
}

impl<const N: usize> Default for Buffer<N> {
    fn default() -> Self { Self::new() }
}

impl<const N: usize> Buffer<N> {
    pub const fn new() -> Self { Self { bytes: [0u8; N], head: 0 } }
    pub const fn capacity(&self) -> usize { N }
    pub fn len(&self) -> usize { self.head }
    pub fn is_empty(&self) -> bool { self.head == 0 }
    pub fn is_full(&self) -> bool { self.head == N }

    /// Forgets the contents. The bytes are zeroed so stale header text
    /// can never be mistaken for fresh data.
    pub fn clear(&mut self) {
        self.bytes.iter_mut().for_each(|b| *b = 0);
        self.head = 0;
    }

    pub fn push(&mut self, byte: u8) -> Result<(), Overflow> {
        let slot = self.bytes.get_mut(self.head).ok_or(Overflow)?;
        *slot = byte;
        self.head += 1;
        Ok(())
    }

    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> Result<(), Overflow> {
        let end = self.head.checked_add(bytes.len()).filter(|end| *end <= N).ok_or(Overflow)?;
        self.bytes[self.head..end].copy_from_slice(bytes);
        self.head = end;
        Ok(())
    }

    pub fn as_slice(&self) -> &[u8] { &self.bytes[..self.head] }

    pub fn ends_with(&self, pattern: &[u8]) -> bool { self.as_slice().ends_with(pattern) }

    /// Unfilled tail of the buffer, to be read into directly.
    pub fn spare_mut(&mut self) -> &mut [u8] { &mut self.bytes[self.head..] }

    /// Marks `count` bytes of the spare tail as filled.
    pub fn advance(&mut self, count: usize) -> Result<(), Overflow> {
        self.head = self.head.checked_add(count).filter(|end| *end <= N).ok_or(Overflow)?;
        Ok(())
    }

    /// Filled region, mutable so a consumer can compact leftovers in place.
    pub fn filled_mut(&mut self) -> &mut [u8] { &mut self.bytes[..self.head] }

    /// Shrinks the filled region to its first `len` bytes.
    pub fn truncate(&mut self, len: usize) { self.head = self.head.min(len); }
}

impl<const N: usize> ufmt::uWrite for Buffer<N> {
    type Error = Overflow;
    fn write_str(&mut self, s: &str) -> Result<(), Self::Error> {
        self.extend_from_slice(s.as_bytes())
    }
}
