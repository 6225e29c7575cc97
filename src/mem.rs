use {
    crate::{error::Error, module::Header},
    std::ops::Range,
};

/// The sandboxed data segment of a [`Vm`](crate::Vm).
///
/// The addressable part of a data segment is a power of two in size. Every address is masked with
/// [`DataSegment::mask`] before use, so that a module can never reach outside its own data
/// segment. The buffer carries 4 extra bytes past the end of the addressable part, so that a
/// 4-byte access at the highest masked address stays within bounds.
#[derive(Clone, Debug)]
pub struct DataSegment {
    bytes: Vec<u8>,
    mask: u32,
}

impl DataSegment {
    /// Creates a new, zero-initialized [`DataSegment`] with the given power-of-two size.
    ///
    /// # Panics
    ///
    /// If `size` is not a power of two.
    pub fn new(size: u32) -> Self {
        assert!(size.is_power_of_two(), "data segment size must be a power of two");
        Self {
            bytes: vec![0; size as usize + 4],
            mask: size - 1,
        }
    }

    /// Creates a [`DataSegment`] for the module image with the given [`Header`], and copies the
    /// initialized data and literal sections into it.
    pub(crate) fn with_image(size: u32, header: &Header, image: &[u8]) -> Self {
        let mut segment = Self::new(size);
        let data = &image[header.data_range()];
        segment.bytes[..data.len()].copy_from_slice(data);
        segment
    }

    /// Returns the address mask of this [`DataSegment`].
    pub fn mask(&self) -> u32 {
        self.mask
    }

    /// Returns the size of the addressable part of this [`DataSegment`] in bytes.
    pub fn size(&self) -> u32 {
        self.mask.wrapping_add(1)
    }

    /// Returns all bytes of this [`DataSegment`], including the 4 trailing guard bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Translates a VM address to an offset into [`DataSegment::bytes`].
    ///
    /// This never fails: addresses outside the data segment wrap around.
    #[inline]
    pub fn translate(&self, addr: u32) -> usize {
        (addr & self.mask) as usize
    }

    /// Returns the bytes from the translated address to the end of this [`DataSegment`].
    ///
    /// This is the equivalent of a host pointer into the data segment.
    pub fn bytes_from(&self, addr: u32) -> &[u8] {
        &self.bytes[self.translate(addr)..]
    }

    pub fn bytes_from_mut(&mut self, addr: u32) -> &mut [u8] {
        let offset = self.translate(addr);
        &mut self.bytes[offset..]
    }

    /// Checks that both ends of the range `addr..addr + len` lie within this [`DataSegment`].
    ///
    /// The end is computed with wrapping arithmetic. Use [`DataSegment::slice`] to also reject
    /// ranges that wrap around the address space.
    ///
    /// # Errors
    ///
    /// If the range does not lie within this [`DataSegment`].
    pub fn validate_range(&self, addr: u32, len: u32) -> Result<(), Error> {
        let end = addr.wrapping_add(len);
        if addr & self.mask != addr || end & self.mask != end {
            return Err(Error::DataOutOfRange);
        }
        Ok(())
    }

    /// Returns the byte range for `addr..addr + len`, after validating it.
    ///
    /// Unlike [`DataSegment::validate_range`], this also rejects ranges that wrap around the
    /// address space.
    fn range(&self, addr: u32, len: u32) -> Result<Range<usize>, Error> {
        self.validate_range(addr, len)?;
        if addr.checked_add(len).is_none() {
            return Err(Error::DataOutOfRange);
        }
        let start = addr as usize;
        Ok(start..start + len as usize)
    }

    /// Returns the bytes in the range `addr..addr + len`.
    ///
    /// # Errors
    ///
    /// If the range does not lie within this [`DataSegment`].
    pub fn slice(&self, addr: u32, len: u32) -> Result<&[u8], Error> {
        let range = self.range(addr, len)?;
        Ok(&self.bytes[range])
    }

    /// Returns the bytes in the range `addr..addr + len` as a mutable slice.
    ///
    /// # Errors
    ///
    /// If the range does not lie within this [`DataSegment`].
    pub fn slice_mut(&mut self, addr: u32, len: u32) -> Result<&mut [u8], Error> {
        let range = self.range(addr, len)?;
        Ok(&mut self.bytes[range])
    }

    /// Sets the bytes in the range `addr..addr + len` to `val`.
    ///
    /// # Errors
    ///
    /// If the range does not lie within this [`DataSegment`].
    pub fn fill(&mut self, addr: u32, val: u8, len: u32) -> Result<(), Error> {
        self.slice_mut(addr, len)?.fill(val);
        Ok(())
    }

    /// Copies `len` bytes from `src` to `dst`. The ranges may overlap.
    ///
    /// # Errors
    ///
    /// If either range does not lie within this [`DataSegment`].
    pub fn copy_within(&mut self, dst: u32, src: u32, len: u32) -> Result<(), Error> {
        let src = self.range(src, len)?;
        let dst = self.range(dst, len)?;
        self.bytes.copy_within(src, dst.start);
        Ok(())
    }

    /// Copies `len` bytes from `src` to `dst` for the `BLOCK_COPY` instruction.
    ///
    /// # Errors
    ///
    /// If either range does not lie within this [`DataSegment`].
    pub(crate) fn block_copy(&mut self, dst: u32, src: u32, len: u32) -> Result<(), Error> {
        self.copy_within(dst, src, len)
            .map_err(|_| Error::BlockCopyOutOfRange)
    }

    /// Reads a NUL-terminated string starting at the translated address.
    ///
    /// The string ends at the first NUL byte, or at the end of this [`DataSegment`].
    pub fn read_c_str(&self, addr: u32) -> &[u8] {
        let bytes = &self.bytes[self.translate(addr)..self.size() as usize];
        let len = bytes.iter().position(|&byte| byte == 0).unwrap_or(bytes.len());
        &bytes[..len]
    }

    #[inline]
    pub fn read_u8(&self, addr: u32) -> u8 {
        self.bytes[self.translate(addr)]
    }

    #[inline]
    pub fn read_u16(&self, addr: u32) -> u16 {
        u16::from_le_bytes(self.read_array(addr))
    }

    #[inline]
    pub fn read_i32(&self, addr: u32) -> i32 {
        i32::from_le_bytes(self.read_array(addr))
    }

    #[inline]
    pub fn read_f32(&self, addr: u32) -> f32 {
        f32::from_bits(self.read_i32(addr) as u32)
    }

    #[inline]
    pub fn write_u8(&mut self, addr: u32, val: u8) {
        let offset = self.translate(addr);
        self.bytes[offset] = val;
    }

    #[inline]
    pub fn write_u16(&mut self, addr: u32, val: u16) {
        self.write_array(addr, val.to_le_bytes());
    }

    #[inline]
    pub fn write_i32(&mut self, addr: u32, val: i32) {
        self.write_array(addr, val.to_le_bytes());
    }

    #[inline]
    pub fn write_f32(&mut self, addr: u32, val: f32) {
        self.write_i32(addr, val.to_bits() as i32);
    }

    #[inline]
    fn read_array<const N: usize>(&self, addr: u32) -> [u8; N] {
        let offset = self.translate(addr);
        let mut array = [0; N];
        array.copy_from_slice(&self.bytes[offset..offset + N]);
        array
    }

    #[inline]
    fn write_array<const N: usize>(&mut self, addr: u32, array: [u8; N]) {
        let offset = self.translate(addr);
        self.bytes[offset..offset + N].copy_from_slice(&array);
    }

    /// Releases the memory held by this [`DataSegment`], leaving a single addressable byte.
    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }
}

impl Default for DataSegment {
    fn default() -> Self {
        Self::new(1)
    }
}
