use std::io::Read;

use scd_core::format::{CONTROL_BYTES, FORMAT_VERSION};
use scd_core::{Algorithm, CodecParameters, ImageStats, Result, ScdError};

use crate::bits::BitReader;
use crate::comma::{apply_delta, symbol, Symbol};

/// Pixel-at-a-time decoder for one compressed stream.
pub struct Decoder<R: Read> {
    bits: BitReader<R>,
    params: CodecParameters,
    lsb: u32,
    msb: u32,
    base: u32,
    pixels: u64,
    outliers: u64,
    done: bool,
}

impl<R: Read> Decoder<R> {
    /// Read the control bytes and initial base value.
    pub fn new(mut input: R) -> Result<Self> {
        let mut control = [0u8; CONTROL_BYTES];
        input.read_exact(&mut control)?;
        let [version, lsb_count, algorithm] = control;

        if version != FORMAT_VERSION {
            return Err(ScdError::format(format!(
                "unsupported compressed stream version {version} (expected {FORMAT_VERSION})"
            )));
        }
        if lsb_count > 16 {
            return Err(ScdError::format(format!("lsb count {lsb_count} exceeds 16")));
        }
        let algorithm = Algorithm::from_id(algorithm)?;

        let lsb = lsb_count as u32;
        let msb = 16 - lsb;
        let mut bits = BitReader::new(input);
        let base = bits.get_bits(msb)?;

        Ok(Self {
            bits,
            params: CodecParameters {
                lsb_count,
                base_value: base as u16,
                algorithm,
                format_version: version,
            },
            lsb,
            msb,
            base,
            pixels: 0,
            outliers: 0,
            done: false,
        })
    }

    pub fn params(&self) -> &CodecParameters {
        &self.params
    }

    /// Next pixel, or `None` once the end sentinel has been read.
    pub fn next_pixel(&mut self) -> Result<Option<u16>> {
        if self.done {
            return Ok(None);
        }
        let low = self.bits.get_bits(self.lsb)?;
        let len = self.bits.get_comma()?;

        let msb_value = match symbol(len) {
            Some(Symbol::Delta(delta)) => apply_delta(self.base, delta, self.msb),
            Some(Symbol::Outlier) => {
                self.outliers += 1;
                self.bits.get_bits(self.msb)?
            }
            Some(Symbol::End) => {
                self.done = true;
                return Ok(None);
            }
            None => {
                return Err(ScdError::format(format!("invalid comma code length {len}")));
            }
        };

        if self.params.algorithm == Algorithm::Difference {
            self.base = msb_value;
        }
        self.pixels += 1;
        Ok(Some(((msb_value << self.lsb) | low) as u16))
    }

    /// Counters so far; `stream_bytes` covers the words consumed.
    pub fn stats(&self) -> ImageStats {
        ImageStats {
            params: self.params,
            pixels: self.pixels,
            outliers: self.outliers,
            stream_bytes: CONTROL_BYTES as u64 + self.bits.words_read() * 4,
        }
    }
}

/// Decode one stream up to its end sentinel, appending pixels to `out`.
pub fn decode_pixels<R: Read>(input: R, out: &mut Vec<u16>) -> Result<ImageStats> {
    let mut decoder = Decoder::new(input)?;
    while let Some(pixel) = decoder.next_pixel()? {
        out.push(pixel);
    }
    Ok(decoder.stats())
}
