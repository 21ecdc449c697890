pub mod bits;
pub mod comma;
pub mod decode;
pub mod encode;
pub mod estimate;
mod sdss_codec;

pub use decode::{decode_pixels, Decoder};
pub use encode::{encode_pixels, Encoder};
pub use estimate::{estimate, Estimate, Histogram};
pub use sdss_codec::{CodecConfig, SdssCodec};

use scd_core::{Algorithm, Codec, Result, ScdError};

/// Resolve an algorithm from its command-line name.
pub fn algorithm_by_name(name: &str) -> Result<Algorithm> {
    match name {
        "mode" | "m" => Ok(Algorithm::Mode),
        "difference" | "diff" | "d" => Ok(Algorithm::Difference),
        other => Err(ScdError::format(format!(
            "unknown algorithm '{other}'. Valid options: mode, difference"
        ))),
    }
}

/// Build the codec for a compression run.
///
/// `force_bits` above 16 is rejected here rather than silently clamped.
pub fn codec_by_name(name: &str, force_bits: Option<u8>) -> Result<Box<dyn Codec>> {
    if let Some(bits) = force_bits.filter(|&b| b > 16) {
        return Err(ScdError::format(format!(
            "cannot force {bits} low bits; pixels are 16 bits wide"
        )));
    }
    Ok(Box::new(SdssCodec::new(CodecConfig {
        algorithm: algorithm_by_name(name)?,
        force_bits,
    })))
}
