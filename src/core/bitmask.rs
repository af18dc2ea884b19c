use crate::types::{CropError, CropResult, PixelValue};
use ndarray::{Array2, ArrayView2};
use num_traits::{PrimInt, Unsigned};

/// Width of the integer a quality pixel is decoded into
pub const QUALITY_WORD_BITS: u32 = u32::BITS;

/// True when bit `bit` of `value` is 0.
///
/// Bits beyond the width of `T` are treated as clear, so the shift never
/// overflows.
pub fn is_flag_clear<T: PrimInt + Unsigned>(value: T, bit: u32) -> bool {
    if bit >= T::zero().count_zeros() {
        return true;
    }
    (value >> bit as usize) & T::one() == T::zero()
}

/// Decodes packed per-pixel quality flags.
///
/// A pixel is clean when every configured flag bit is clear.
#[derive(Debug, Clone, PartialEq)]
pub struct BitmaskDecoder {
    flag_bits: Vec<u32>,
}

impl BitmaskDecoder {
    /// Create a decoder for the given bit positions
    pub fn new(flag_bits: &[u32]) -> CropResult<Self> {
        if let Some(&bit) = flag_bits.iter().find(|&&bit| bit >= QUALITY_WORD_BITS) {
            return Err(CropError::InvalidBitPosition {
                bit,
                width: QUALITY_WORD_BITS,
            });
        }
        Ok(Self {
            flag_bits: flag_bits.to_vec(),
        })
    }

    /// Combined mask with all configured flags set
    pub fn combined_mask(&self) -> u32 {
        self.flag_bits.iter().fold(0u32, |acc, &bit| acc | (1 << bit))
    }

    /// Decode a quality pixel stored as a float raster value.
    ///
    /// Only finite, non-negative integral values can be packed bitfields.
    /// `u32::MAX as f32` rounds up to 2^32, which no `u32` holds.
    pub fn quality_word(value: PixelValue) -> Option<u32> {
        if !value.is_finite() || value < 0.0 || value.fract() != 0.0 || value >= u32::MAX as f32 {
            return None;
        }
        Some(value as u32)
    }

    /// Per-pixel clean flag for a whole quality band (undecodable pixels are not clean)
    pub fn clean_mask(&self, quality: &ArrayView2<'_, PixelValue>) -> Array2<bool> {
        let flags = self.combined_mask();
        quality.mapv(|value| {
            Self::quality_word(value)
                .map(|word| word & flags == 0)
                .unwrap_or(false)
        })
    }
}
