use std::io::{Read, Write};

use crate::error::{Result, ScdError};

/// Prediction scheme for the MSB part of each pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum Algorithm {
    /// Every pixel is coded against one modal value for the whole image.
    #[default]
    Mode,
    /// Every pixel is coded against the previous pixel.
    Difference,
}

impl Algorithm {
    /// Stable id stored in the third control byte of the stream.
    pub fn id(self) -> u8 {
        match self {
            Algorithm::Mode => 0,
            Algorithm::Difference => 1,
        }
    }

    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            0 => Ok(Algorithm::Mode),
            1 => Ok(Algorithm::Difference),
            other => Err(ScdError::format(format!("unknown algorithm id {other}"))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Mode => "mode",
            Algorithm::Difference => "difference",
        }
    }
}

/// Per-image parameters, written at the head of the stream and read back
/// verbatim by the decoder. `lsb_count + msb_count() == 16` always.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecParameters {
    pub lsb_count: u8,
    /// Initial base value (the mode at MSB granularity, or 0 for `Difference`).
    pub base_value: u16,
    pub algorithm: Algorithm,
    pub format_version: u8,
}

impl CodecParameters {
    #[inline]
    pub fn msb_count(&self) -> u8 {
        16 - self.lsb_count
    }
}

/// What a codec reports back about one compressed or decompressed image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageStats {
    pub params: CodecParameters,
    pub pixels: u64,
    /// Pixels whose MSB delta fell outside the comma-code table.
    pub outliers: u64,
    /// Control bytes plus packed words.
    pub stream_bytes: u64,
}

/// Pixel compression abstraction used by the container layer.
///
/// A codec plans parameters for a whole image before anything is written,
/// so the container can fall back to verbatim storage without rewinding.
pub trait Codec: Send + Sync {
    /// Human-readable codec name for CLI display.
    fn name(&self) -> &'static str;

    /// Choose parameters for `pixels`.
    ///
    /// Returns [`ScdError::NegativeCompression`] when the estimate says the
    /// image would not shrink; the caller then stores it verbatim.
    fn plan(&self, pixels: &[u16]) -> Result<CodecParameters>;

    /// Encode the whole image with `params`, terminated by the end sentinel.
    fn encode(
        &self,
        pixels: &[u16],
        params: &CodecParameters,
        out: &mut dyn Write,
    ) -> Result<ImageStats>;

    /// Decode one stream up to its end sentinel, appending pixels to `out`.
    /// Parameters are taken from the stream itself.
    fn decode(&self, input: &mut dyn Read, out: &mut Vec<u16>) -> Result<ImageStats>;
}
