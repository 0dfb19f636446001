//! CRC-16-CCITT as generated by the WD279x data separator.
//!
//! Polynomial 0x1021, bits processed most-significant-first, no input or
//! output reflection. The controller presets the accumulator to 0xFFFF at
//! the start of each checksummed span (from the address mark onward) and
//! appends the raw 16-bit remainder big-endian — no final inversion.
//! Re-summing a span together with its two appended CRC bytes therefore
//! yields zero, which is the controller's own check.

/// CRC-16 lookup table for polynomial 0x1021, MSB-first.
const CRC16_TABLE: [u16; 256] = {
    let mut table = [0u16; 256];
    let mut i = 0usize;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut j = 0;
        while j < 8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// Running CRC accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crc16(u16);

impl Crc16 {
    /// Preset value used at the start of every on-disk checksummed span.
    pub const PRESET: Self = Self(0xFFFF);

    #[must_use]
    pub const fn new(init: u16) -> Self {
        Self(init)
    }

    #[must_use]
    pub const fn value(self) -> u16 {
        self.0
    }

    /// Fold one byte into the accumulator.
    #[must_use]
    pub fn update(self, byte: u8) -> Self {
        let idx = ((self.0 >> 8) ^ u16::from(byte)) & 0xFF;
        Self((self.0 << 8) ^ CRC16_TABLE[idx as usize])
    }

    /// Fold a byte sequence into the accumulator.
    #[must_use]
    pub fn update_block(self, bytes: &[u8]) -> Self {
        bytes.iter().fold(self, |crc, &b| crc.update(b))
    }
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::PRESET
    }
}

/// One-shot CRC over `bytes` starting from `init`.
#[must_use]
pub fn ccitt(init: u16, bytes: &[u8]) -> u16 {
    Crc16::new(init).update_block(bytes).value()
}
