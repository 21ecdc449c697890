use std::io::{Read, Write};
use std::sync::Arc;

use log::{debug, info};
use xxhash_rust::xxh3::xxh3_64;

use crate::codec::Codec;
use crate::error::{Result, ScdError};
use crate::format::{element_count, padding_for, COMPRESSED_MARKER};
use crate::hdu::HduReader;
use crate::summary::{HduSummary, Summary};

/// Container-level decompression options.
#[derive(Debug, Clone, Default)]
pub struct DecompressConfig {
    /// Emit only this HDU (0 = primary) instead of the whole container.
    pub hdu: Option<usize>,
}

/// Sequential reader for SDSS compressed containers.
///
/// # Read sequence
/// 1. Read header records up to END.
/// 2. If the header carries the marker card, rebuild the original header from
///    its Z-renamed geometry cards and run the codec over the data section.
/// 3. Otherwise copy the HDU through unchanged.
///
/// Compressed lengths are only known from each header, so reaching HDU N
/// means walking the N before it ([`skip_to`]).
///
/// [`skip_to`]: Reader::skip_to
pub struct Reader<R> {
    hdus: HduReader<R>,
    codec: Arc<dyn Codec>,
    markers_seen: usize,
}

impl<R: Read> Reader<R> {
    pub fn new(input: R, codec: Arc<dyn Codec>) -> Self {
        Self {
            hdus: HduReader::new(input),
            codec,
            markers_seen: 0,
        }
    }

    /// Number of marked (compressed) HDUs read or skipped so far.
    pub fn markers_seen(&self) -> usize {
        self.markers_seen
    }

    /// Skip HDUs until the next one read is `index`.
    pub fn skip_to(&mut self, index: usize) -> Result<()> {
        while self.hdus.position() < index {
            match self.hdus.skip_hdu()? {
                Some(header) => {
                    if header.is_compressed() {
                        self.markers_seen += 1;
                    }
                }
                None => {
                    return Err(ScdError::format(format!(
                        "cannot select hdu {index}: container holds only {} HDUs",
                        self.hdus.position()
                    )))
                }
            }
        }
        Ok(())
    }

    /// Restore the next HDU into `out`. Returns `None` at end of stream.
    pub fn read_hdu<W: Write + ?Sized>(&mut self, out: &mut W) -> Result<Option<HduSummary>> {
        let Some(hdu) = self.hdus.next_hdu()? else {
            return Ok(None);
        };

        if !hdu.header.is_compressed() {
            out.write_all(&hdu.header_bytes)?;
            out.write_all(&hdu.data)?;
            debug!("hdu {}: not compressed, copied verbatim", hdu.index);
            return Ok(Some(HduSummary {
                index: hdu.index,
                bitpix: hdu.header.bitpix()?,
                axes: hdu.header.axes()?,
                raw_bytes: hdu.stored_len(),
                stored_bytes: hdu.stored_len(),
                stats: None,
                checksum: xxh3_64(hdu.data_section()),
            }));
        }
        self.markers_seen += 1;

        let original = hdu.header.to_original()?;
        let bitpix = original.bitpix()?;
        if bitpix != 16 {
            return Err(ScdError::format(format!(
                "hdu {}: compressed HDU declares ZBITPIX {bitpix}",
                hdu.index
            )));
        }
        let axes = original.axes()?;
        if axes.len() != 2 {
            return Err(ScdError::format(format!(
                "hdu {}: compressed HDU declares ZNAXIS {}",
                hdu.index,
                axes.len()
            )));
        }
        let expected = element_count(&axes)?;

        // every pixel costs at least one bit
        let mut pixels = Vec::with_capacity(expected.min(hdu.data_len.saturating_mul(8)) as usize);
        let mut stream = hdu.data_section();
        let stats = self.codec.decode(&mut stream, &mut pixels)?;
        if pixels.len() as u64 != expected {
            return Err(ScdError::format(format!(
                "hdu {}: decoded {} pixels but header declares {expected}",
                hdu.index,
                pixels.len()
            )));
        }

        let data: Vec<u8> = pixels.iter().flat_map(|p| p.to_be_bytes()).collect();
        let header_bytes = original.to_bytes();
        let padding = padding_for(data.len() as u64);
        out.write_all(&header_bytes)?;
        out.write_all(&data)?;
        out.write_all(&vec![0u8; padding])?;

        debug!(
            "hdu {}: {} x {} restored, lsb={} algorithm={}",
            hdu.index,
            axes[0],
            axes[1],
            stats.params.lsb_count,
            stats.params.algorithm.name()
        );
        Ok(Some(HduSummary {
            index: hdu.index,
            bitpix,
            axes,
            raw_bytes: (header_bytes.len() + data.len() + padding) as u64,
            stored_bytes: hdu.stored_len(),
            stats: Some(stats),
            checksum: xxh3_64(&data),
        }))
    }
}

/// Decompress a container (or one selected HDU of it) from `input` into `output`.
///
/// Fails with [`ScdError::Format`] when none of the HDUs read carries the
/// compression marker.
pub fn decompress<R: Read, W: Write>(
    input: R,
    mut output: W,
    codec: Arc<dyn Codec>,
    config: &DecompressConfig,
) -> Result<Summary> {
    let mut reader = Reader::new(input, codec);
    let mut hdus = Vec::new();

    match config.hdu {
        Some(index) => {
            reader.skip_to(index)?;
            match reader.read_hdu(&mut output)? {
                Some(summary) => hdus.push(summary),
                None => {
                    return Err(ScdError::format(format!(
                        "cannot select hdu {index}: container holds only {index} HDUs"
                    )))
                }
            }
        }
        None => {
            while let Some(summary) = reader.read_hdu(&mut output)? {
                hdus.push(summary);
            }
        }
    }

    if reader.markers_seen() == 0 {
        return Err(ScdError::format(format!(
            "no HISTORY {COMPRESSED_MARKER} card found; input is not compressed"
        )));
    }
    output.flush()?;

    let summary = Summary { hdus };
    info!(
        "decompressed {} hdus: {} -> {} bytes",
        summary.hdus.len(),
        summary.stored_bytes(),
        summary.raw_bytes()
    );
    Ok(summary)
}
