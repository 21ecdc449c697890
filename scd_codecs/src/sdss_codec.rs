use std::io::{Read, Write};

use log::debug;
use scd_core::format::{BLOCK_PIXELS, FORMAT_VERSION};
use scd_core::{Algorithm, Codec, CodecParameters, ImageStats, Result, ScdError};

use crate::decode::decode_pixels;
use crate::encode::encode_pixels;
use crate::estimate::estimate;

/// Knobs for [`SdssCodec`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodecConfig {
    pub algorithm: Algorithm,
    /// Fixed LSB count; `None` runs the histogram search.
    pub force_bits: Option<u8>,
}

/// Adaptive LSB-split comma-code codec.
///
/// Parameters are estimated from the first [`BLOCK_PIXELS`] pixels and used
/// for the whole image. Images whose estimate does not beat raw 16-bit
/// storage are refused at planning time.
#[derive(Debug, Clone, Default)]
pub struct SdssCodec {
    pub config: CodecConfig,
}

impl SdssCodec {
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }
}

impl Codec for SdssCodec {
    fn name(&self) -> &'static str {
        self.config.algorithm.name()
    }

    fn plan(&self, pixels: &[u16]) -> Result<CodecParameters> {
        let block = &pixels[..pixels.len().min(BLOCK_PIXELS)];
        let est = estimate(block, self.config.force_bits);
        debug!(
            "estimate: {} pixels, lsb={} mode={} ~{:.0} elements after {} iterations",
            est.pixels,
            est.lsb_count,
            est.mode,
            est.estimated_elements(),
            est.iterations
        );
        if !est.is_useful() {
            let raw = est.pixels * 2;
            return Err(ScdError::NegativeCompression {
                raw,
                compressed: est.estimated_bits.div_ceil(8),
            });
        }

        Ok(CodecParameters {
            lsb_count: est.lsb_count,
            base_value: match self.config.algorithm {
                Algorithm::Mode => est.mode,
                Algorithm::Difference => 0,
            },
            algorithm: self.config.algorithm,
            format_version: FORMAT_VERSION,
        })
    }

    fn encode(
        &self,
        pixels: &[u16],
        params: &CodecParameters,
        out: &mut dyn Write,
    ) -> Result<ImageStats> {
        encode_pixels(pixels, params, out)
    }

    fn decode(&self, input: &mut dyn Read, out: &mut Vec<u16>) -> Result<ImageStats> {
        decode_pixels(input, out)
    }
}
