use {
    crate::{config::Config, decode::Decoder, error::Error},
    std::ops::Range,
};

/// The magic number at the start of every module image.
pub const MAGIC: i32 = 0x12721444;

/// The header of a module image.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Header {
    pub magic: i32,
    pub instruction_count: i32,
    pub code_offset: i32,
    pub code_length: i32,
    pub data_offset: i32,
    pub data_length: i32,
    pub lit_length: i32,
    pub bss_length: i32,
}

impl Header {
    /// The size of an encoded [`Header`] in bytes.
    pub const SIZE: usize = 32;

    /// Decodes and validates the [`Header`] of the given module image.
    ///
    /// # Errors
    ///
    /// If the image is too small or too large, the magic number does not match, or any of the
    /// sections described by the header do not lie within the image.
    pub fn decode(image: &[u8], config: &Config) -> Result<Self, Error> {
        if image.len() <= Self::SIZE || image.len() > config.max_image_size {
            tracing::warn!(len = image.len(), "module image has invalid size");
            return Err(Error::FailedToLoadBytecode);
        }
        let mut decoder = Decoder::new(image);
        let mut fields = [0; Self::SIZE / 4];
        for field in &mut fields {
            *field = decoder.read_i32().ok_or(Error::FailedToLoadBytecode)?;
        }
        let [magic, instruction_count, code_offset, code_length, data_offset, data_length, lit_length, bss_length] =
            fields;
        let header = Self {
            magic,
            instruction_count,
            code_offset,
            code_length,
            data_offset,
            data_length,
            lit_length,
            bss_length,
        };
        if header.magic != MAGIC {
            tracing::warn!(
                "invalid magic number: read {:#x}, expected {:#x}",
                header.magic,
                MAGIC
            );
            return Err(Error::FailedToLoadBytecode);
        }
        if !header.is_valid(image.len(), config) {
            tracing::warn!(?header, "module image has bad header");
            return Err(Error::FailedToLoadBytecode);
        }
        Ok(header)
    }

    /// Returns `true` if the sections described by this [`Header`] fit in an image of the given
    /// length.
    fn is_valid(&self, image_len: usize, config: &Config) -> bool {
        let image_len = image_len as i64;
        self.bss_length >= 0
            && self.data_length >= 0
            && self.lit_length >= 0
            && self.code_length > 0
            && self.code_offset >= 0
            && self.data_offset >= 0
            && self.instruction_count > 0
            && self.instruction_count <= self.code_length
            && self.bss_length as u32 <= config.max_bss_length
            && i64::from(self.code_offset) + i64::from(self.code_length) <= image_len
            && i64::from(self.data_offset) + i64::from(self.data_length) + i64::from(self.lit_length)
                <= image_len
    }

    /// Returns the byte range of the code section within the image.
    pub fn code_range(&self) -> Range<usize> {
        let start = self.code_offset as usize;
        start..start + self.code_length as usize
    }

    /// Returns the byte range of the combined data and literal sections within the image.
    pub fn data_range(&self) -> Range<usize> {
        let start = self.data_offset as usize;
        start..start + self.data_length as usize + self.lit_length as usize
    }
}

/// The layout of a data segment, derived from a [`Header`] and a [`Config`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) struct Layout {
    /// The power-of-two size of the addressable data segment.
    pub(crate) size: u32,
    /// The address at which dynamic allocation starts.
    pub(crate) heap_start: u32,
    /// The address at which dynamic allocation ends. Never above `stack_bottom`.
    pub(crate) heap_end: u32,
    /// The lowest address the program stack may grow down to.
    pub(crate) stack_bottom: u32,
}

impl Layout {
    pub(crate) fn new(header: &Header, config: &Config) -> Result<Self, Error> {
        let data_size = u64::from(header.data_length as u32)
            + u64::from(header.lit_length as u32)
            + u64::from(header.bss_length as u32);
        let heap_start = data_size + 16;
        let required = data_size + u64::from(config.heap_reserve);
        let size = required.max(1).next_power_of_two();
        if size > 1 << 31 {
            tracing::warn!(size, "data segment too large");
            return Err(Error::MallocFailed);
        }
        let stack_bottom = size.saturating_sub(u64::from(config.stack_size));
        Ok(Self {
            size: size as u32,
            heap_start: heap_start as u32,
            heap_end: (heap_start + u64::from(config.heap_reserve)).min(stack_bottom) as u32,
            stack_bottom: stack_bottom as u32,
        })
    }
}
