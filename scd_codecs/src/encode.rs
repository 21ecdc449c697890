use std::io::Write;

use scd_core::format::{CONTROL_BYTES, FORMAT_VERSION};
use scd_core::{Algorithm, CodecParameters, ImageStats, Result, ScdError};

use crate::bits::BitWriter;
use crate::comma::{code_len, wrapped_delta, EOF_LEN, OUTLIE_LEN};

/// Pixel-at-a-time encoder for one image.
///
/// Stream layout: version byte, lsb count byte, algorithm byte, then the
/// initial base as `msb_count` raw bits, then per pixel `lsb_count` raw bits
/// and a comma code (plus `msb_count` raw bits after an outlier escape), then
/// `lsb_count` zero bits and the end sentinel.
pub struct Encoder<W: Write> {
    bits: BitWriter<W>,
    params: CodecParameters,
    lsb: u32,
    msb: u32,
    /// MSB value the next pixel is predicted from.
    base: u32,
    pixels: u64,
    outliers: u64,
}

impl<W: Write> Encoder<W> {
    pub fn new(mut out: W, params: CodecParameters) -> Result<Self> {
        if params.format_version != FORMAT_VERSION {
            return Err(ScdError::format(format!(
                "cannot write format version {}",
                params.format_version
            )));
        }
        if params.lsb_count > 16 {
            return Err(ScdError::format(format!(
                "lsb count {} exceeds 16",
                params.lsb_count
            )));
        }
        let params = CodecParameters {
            base_value: match params.algorithm {
                Algorithm::Mode => params.base_value,
                Algorithm::Difference => 0,
            },
            ..params
        };
        let lsb = params.lsb_count as u32;
        let msb = params.msb_count() as u32;
        if msb < 16 && params.base_value as u32 >= 1 << msb {
            return Err(ScdError::format(format!(
                "base value {} does not fit in {msb} bits",
                params.base_value
            )));
        }

        out.write_all(&[
            params.format_version,
            params.lsb_count,
            params.algorithm.id(),
        ])?;
        let mut bits = BitWriter::new(out);
        bits.put_bits(params.base_value as u32, msb)?;

        Ok(Self {
            bits,
            params,
            lsb,
            msb,
            base: params.base_value as u32,
            pixels: 0,
            outliers: 0,
        })
    }

    #[inline]
    pub fn push(&mut self, pixel: u16) -> Result<()> {
        let pixel = pixel as u32;
        self.bits.put_bits(pixel, self.lsb)?;

        let msb_value = pixel >> self.lsb;
        let delta = wrapped_delta(msb_value, self.base);
        match code_len(delta) {
            Some(len) => self.bits.put_comma(len)?,
            None => {
                self.bits.put_comma(OUTLIE_LEN)?;
                self.bits.put_bits(msb_value, self.msb)?;
                self.outliers += 1;
            }
        }

        if self.params.algorithm == Algorithm::Difference {
            self.base = msb_value;
        }
        self.pixels += 1;
        Ok(())
    }

    pub fn push_all(&mut self, pixels: &[u16]) -> Result<()> {
        pixels.iter().try_for_each(|&p| self.push(p))
    }

    /// Write the end sentinel, flush the last word, and report.
    pub fn finish(mut self) -> Result<(W, ImageStats)> {
        self.bits.put_bits(0, self.lsb)?;
        self.bits.put_comma(EOF_LEN)?;
        self.bits.flush()?;
        let stats = ImageStats {
            params: self.params,
            pixels: self.pixels,
            outliers: self.outliers,
            stream_bytes: CONTROL_BYTES as u64 + self.bits.words_written() * 4,
        };
        Ok((self.bits.into_inner(), stats))
    }
}

/// Encode a whole image into `out`.
pub fn encode_pixels<W: Write>(
    pixels: &[u16],
    params: &CodecParameters,
    out: W,
) -> Result<ImageStats> {
    let mut encoder = Encoder::new(out, *params)?;
    encoder.push_all(pixels)?;
    let (_, stats) = encoder.finish()?;
    Ok(stats)
}
