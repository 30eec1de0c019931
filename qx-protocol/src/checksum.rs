//! Frame integrity checks
//!
//! Every frame carries an 8-bit additive checksum. Frames sent with the
//! CRC32 option additionally carry a CRC-32/ISO-HDLC trailer computed over
//! the frame up to (not including) the trailer itself.

use crc::{Crc, CRC_32_ISO_HDLC};

/// Register value a fresh CRC32 computation starts from
pub const CRC32_INITIAL: u32 = 0xFFFF_FFFF;

/// XOR applied to the register to produce the transmitted CRC
pub const CRC32_XOR_OUT: u32 = 0xFFFF_FFFF;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Add one byte to a running 8-bit checksum
#[inline]
pub fn accumulate8(acc: u8, byte: u8) -> u8 {
    acc.wrapping_add(byte)
}

/// 8-bit additive checksum of a byte slice
pub fn checksum8(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, &byte| accumulate8(acc, byte))
}

/// CRC32 implementation used for frame trailers
///
/// The software implementation is the default; targets with a CRC
/// peripheral substitute their own.
///
/// `accumulate` works on the raw (reflected, not yet inverted) register, so
/// a block may be fed in any number of chunks by passing each result back
/// in as the next `initial`. [`Crc32::compute`] applies the output XOR.
pub trait Crc32 {
    /// Advance the CRC register `initial` over `data`
    fn accumulate(&mut self, initial: u32, data: &[u8]) -> u32;

    /// Finished CRC32 of `data`, as carried in a frame trailer
    fn compute(&mut self, data: &[u8]) -> u32 {
        crc32_finalize(self.accumulate(CRC32_INITIAL, data))
    }
}

/// Turn a CRC register into the transmitted value
#[inline]
pub fn crc32_finalize(register: u32) -> u32 {
    register ^ CRC32_XOR_OUT
}

/// Table-driven software CRC32
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareCrc32;

impl Crc32 for SoftwareCrc32 {
    fn accumulate(&mut self, initial: u32, data: &[u8]) -> u32 {
        // The digest reflects its seed and inverts on finalize; undo both so
        // the register passes through unchanged.
        let mut digest = CRC32.digest_with_initial(initial.reverse_bits());
        digest.update(data);
        crc32_finalize(digest.finalize())
    }
}
