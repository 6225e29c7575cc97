/// A cursor over a little-endian byte stream.
#[derive(Clone, Debug)]
pub(crate) struct Decoder<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Decoder<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    /// Returns the number of bytes consumed so far.
    pub(crate) fn position(&self) -> usize {
        self.position
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.position == self.bytes.len()
    }

    /// Reads a single byte, or returns `None` if the stream is exhausted.
    pub(crate) fn read_byte(&mut self) -> Option<u8> {
        let byte = *self.bytes.get(self.position)?;
        self.position += 1;
        Some(byte)
    }

    /// Reads `N` bytes, or returns `None` if fewer than `N` bytes remain.
    pub(crate) fn read_bytes<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes = self
            .bytes
            .get(self.position..)
            .and_then(|bytes| bytes.get(..N))?;
        self.position += N;
        bytes.try_into().ok()
    }

    pub(crate) fn read_i32(&mut self) -> Option<i32> {
        self.read_bytes().map(i32::from_le_bytes)
    }
}
