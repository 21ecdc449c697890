use std::io::{self, Read, Seek, SeekFrom, Write};

use log::{debug, info, warn};
use xxhash_rust::xxh3::xxh3_64;

use crate::codec::{Codec, CodecParameters, ImageStats};
use crate::error::{Result, ScdError};
use crate::format::{element_count, padding_for, Card, NAXIS1_CARD_OFFSET};
use crate::hdu::{HduReader, RawHdu};
use crate::summary::{HduSummary, Summary};

/// Container-level compression options.
#[derive(Debug, Clone, Default)]
pub struct CompressConfig {
    /// Accept inputs with no 16-bit image HDU, and 16-bit HDUs that are not
    /// two-dimensional, by storing them verbatim instead of failing.
    pub force: bool,
}

/// Streaming writer for SDSS compressed containers.
///
/// # Write contract
/// Call [`write_hdu`] once per HDU, in order, then [`finish`].
///
/// # Layout written per pixel-coded HDU
/// ```text
/// [HEADER: BITPIX=8, NAXIS=1, NAXIS1=0 placeholder, marker, original cards with geometry Z-renamed]
/// [DATA: version, lsb count, algorithm, packed 32-bit words, zero pad to 2880]
/// ← seek back to header start + 240, overwrite NAXIS1 with the real length
/// ```
/// Every other HDU is copied record for record.
///
/// [`write_hdu`]: Writer::write_hdu
/// [`finish`]: Writer::finish
pub struct Writer<W: Write + Seek> {
    out: W,
    codec: Box<dyn Codec>,
    config: CompressConfig,
    hdus: Vec<HduSummary>,
}

impl<W: Write + Seek> Writer<W> {
    pub fn new(out: W, codec: Box<dyn Codec>, config: CompressConfig) -> Self {
        Self {
            out,
            codec,
            config,
            hdus: Vec::new(),
        }
    }

    /// Compress one HDU if it is a 16-bit image, else copy it verbatim.
    pub fn write_hdu(&mut self, hdu: &RawHdu) -> Result<()> {
        let bitpix = hdu.header.bitpix()?;
        let axes = hdu.header.axes()?;

        if bitpix != 16 {
            debug!("hdu {}: BITPIX {bitpix}, copied verbatim", hdu.index);
            return self.write_verbatim(hdu, bitpix, axes);
        }
        match axes.len() {
            0 => return self.write_verbatim(hdu, bitpix, axes),
            2 => {}
            n if self.config.force => {
                warn!("hdu {}: NAXIS {n}, copied verbatim", hdu.index);
                return self.write_verbatim(hdu, bitpix, axes);
            }
            n => {
                return Err(ScdError::format(format!(
                    "hdu {}: NAXIS = {n}, only 2-dimensional images are compressed",
                    hdu.index
                )))
            }
        }

        let image_bytes = element_count(&axes)?
            .checked_mul(2)
            .ok_or_else(|| ScdError::format(format!("hdu {}: image size overflows", hdu.index)))?;
        if image_bytes == 0 || hdu.data_len != image_bytes {
            debug!(
                "hdu {}: data length {} is not a plain image, copied verbatim",
                hdu.index, hdu.data_len
            );
            return self.write_verbatim(hdu, bitpix, axes);
        }
        if !hdu.header.can_compress() {
            warn!(
                "hdu {}: header already uses compression keywords, copied verbatim",
                hdu.index
            );
            return self.write_verbatim(hdu, bitpix, axes);
        }

        let pixels: Vec<u16> = hdu
            .data_section()
            .chunks_exact(2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .collect();

        match self.codec.plan(&pixels) {
            Ok(params) => self.write_compressed(hdu, &pixels, &params, axes),
            Err(ScdError::NegativeCompression { raw, compressed }) => {
                info!(
                    "hdu {}: estimate {compressed} >= {raw} bytes, stored verbatim",
                    hdu.index
                );
                self.write_verbatim(hdu, bitpix, axes)
            }
            Err(e) => Err(e),
        }
    }

    fn write_verbatim(&mut self, hdu: &RawHdu, bitpix: i64, axes: Vec<u64>) -> Result<()> {
        self.out.write_all(&hdu.header_bytes)?;
        self.out.write_all(&hdu.data)?;
        self.hdus.push(HduSummary {
            index: hdu.index,
            bitpix,
            axes,
            raw_bytes: hdu.stored_len(),
            stored_bytes: hdu.stored_len(),
            stats: None,
            checksum: xxh3_64(hdu.data_section()),
        });
        Ok(())
    }

    fn write_compressed(
        &mut self,
        hdu: &RawHdu,
        pixels: &[u16],
        params: &CodecParameters,
        axes: Vec<u64>,
    ) -> Result<()> {
        let header_start = self.out.stream_position()?;
        let header_bytes = hdu.header.to_compressed()?.to_bytes();
        self.out.write_all(&header_bytes)?;

        let mut counter = CountingWriter::new(&mut self.out);
        let stats: ImageStats = self.codec.encode(pixels, params, &mut counter)?;
        let stream_bytes = counter.count;
        let padding = padding_for(stream_bytes);
        self.out.write_all(&vec![0u8; padding])?;

        // ── Patch NAXIS1 now that the compressed length is known ───────────
        let end = self.out.stream_position()?;
        self.out
            .seek(SeekFrom::Start(header_start + NAXIS1_CARD_OFFSET))?;
        self.out
            .write_all(Card::integer("NAXIS1", stream_bytes as i64).as_bytes())?;
        self.out.seek(SeekFrom::Start(end))?;

        if stream_bytes >= hdu.data_len {
            warn!(
                "hdu {}: compressed stream is {stream_bytes} bytes for {} raw bytes",
                hdu.index, hdu.data_len
            );
        }
        debug!(
            "hdu {}: lsb={} base={} algorithm={} outliers={} -> {stream_bytes} bytes",
            hdu.index,
            params.lsb_count,
            params.base_value,
            params.algorithm.name(),
            stats.outliers
        );

        self.hdus.push(HduSummary {
            index: hdu.index,
            bitpix: 16,
            axes,
            raw_bytes: hdu.stored_len(),
            stored_bytes: header_bytes.len() as u64 + stream_bytes + padding as u64,
            stats: Some(ImageStats {
                stream_bytes,
                ..stats
            }),
            checksum: xxh3_64(hdu.data_section()),
        });
        Ok(())
    }

    /// Flush the output and return per-HDU results.
    pub fn finish(mut self) -> Result<Summary> {
        self.out.flush()?;
        Ok(Summary { hdus: self.hdus })
    }
}

/// Compress a whole container from `input` into `output`.
///
/// Fails with [`ScdError::UnsupportedBitDepth`] when no HDU is a 16-bit
/// image (unless `config.force`), and with [`ScdError::NegativeCompression`]
/// when the output is not smaller than the input. Either way the caller
/// should discard `output` and keep the original.
pub fn compress<R: Read, W: Write + Seek>(
    input: R,
    output: W,
    codec: Box<dyn Codec>,
    config: &CompressConfig,
) -> Result<Summary> {
    let mut reader = HduReader::new(input);
    let mut writer = Writer::new(output, codec, config.clone());
    let mut first_bitpix = None;

    while let Some(hdu) = reader.next_hdu()? {
        first_bitpix.get_or_insert(hdu.header.bitpix()?);
        writer.write_hdu(&hdu)?;
    }
    let summary = writer.finish()?;

    let Some(first_bitpix) = first_bitpix else {
        return Err(ScdError::format("input contains no HDU"));
    };
    let has_image = summary
        .hdus
        .iter()
        .any(|h| h.bitpix == 16 && h.axes.len() == 2);
    if !has_image && !config.force {
        return Err(ScdError::UnsupportedBitDepth(first_bitpix));
    }

    let raw = reader.bytes_read();
    let compressed = summary.stored_bytes();
    if compressed >= raw {
        return Err(ScdError::NegativeCompression { raw, compressed });
    }
    info!(
        "compressed {} hdus ({} pixel-coded): {raw} -> {compressed} bytes",
        summary.hdus.len(),
        summary.compressed_hdus()
    );
    Ok(summary)
}

/// Counts bytes passed through to the inner writer.
struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
