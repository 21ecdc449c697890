/// Integration tests: whole FITS containers through compress and decompress.
///
/// Containers are assembled in memory with zero data padding, which is
/// exactly what decompression writes back, so every round trip can be
/// checked byte for byte. Most headers come from `Card::integer`; the
/// `written` helper takes card text as another FITS writer would lay it out.
use std::io::Cursor;
use std::sync::Arc;

use scd_codecs::{CodecConfig, SdssCodec};
use scd_core::format::{padded_len, NAXIS1_CARD_OFFSET, RECORD_SIZE};
use scd_core::{
    compress, decompress, Algorithm, Card, CompressConfig, DecompressConfig, HduReader, Header,
    OutputGuard, ScdError, Summary,
};

/// Deterministic LCG values.
fn pseudo_random_u16(len: usize, seed: u64) -> Vec<u16> {
    let mut rng = seed;
    (0..len)
        .map(|_| {
            rng = rng
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (rng >> 48) as u16
        })
        .collect()
}

/// Flat sky with a little bell-shaped noise: compresses well.
fn sky_pixels(len: usize, seed: u64) -> Vec<u16> {
    pseudo_random_u16(len * 4, seed)
        .chunks_exact(4)
        .map(|c| 1000 + c.iter().map(|v| v % 16).sum::<u16>())
        .collect()
}

// ── helpers ───────────────────────────────────────────────────────────────

fn be_bytes(pixels: &[u16]) -> Vec<u8> {
    pixels.iter().flat_map(|p| p.to_be_bytes()).collect()
}

fn first_card(index: usize) -> Card {
    if index == 0 {
        Card::new(&format!("{:<8}= {:>20}", "SIMPLE", "T"))
    } else {
        Card::new("XTENSION= 'IMAGE   '")
    }
}

/// Builds containers HDU by HDU and remembers where each one starts.
#[derive(Default)]
struct Container {
    bytes: Vec<u8>,
    offsets: Vec<usize>,
}

impl Container {
    fn hdu(mut self, bitpix: i64, axes: &[u64], data: &[u8]) -> Self {
        let index = self.offsets.len();
        let mut cards = vec![
            first_card(index),
            Card::integer("BITPIX", bitpix),
            Card::integer("NAXIS", axes.len() as i64),
        ];
        for (i, len) in axes.iter().enumerate() {
            cards.push(Card::integer(&format!("NAXIS{}", i + 1), *len as i64));
        }
        if index > 0 {
            cards.push(Card::integer("PCOUNT", 0));
            cards.push(Card::integer("GCOUNT", 1));
        }
        cards.push(Card::new("OBSERVER= 'nobody  '           / who took it"));
        cards.push(Card::history(&format!("test hdu {index}")));

        self.offsets.push(self.bytes.len());
        self.bytes.extend_from_slice(&Header::new(cards).to_bytes());
        self.bytes.extend_from_slice(data);
        self.bytes.resize(padded_len(self.bytes.len() as u64) as usize, 0);
        self
    }

    /// HDU whose header cards are given as literal card text.
    fn written(mut self, cards: &[&str], data: &[u8]) -> Self {
        let cards = cards.iter().map(|text| Card::new(text)).collect();
        self.offsets.push(self.bytes.len());
        self.bytes.extend_from_slice(&Header::new(cards).to_bytes());
        self.bytes.extend_from_slice(data);
        self.bytes.resize(padded_len(self.bytes.len() as u64) as usize, 0);
        self
    }

    fn image(self, width: u64, height: u64, pixels: &[u16]) -> Self {
        assert_eq!(pixels.len() as u64, width * height);
        self.hdu(16, &[width, height], &be_bytes(pixels))
    }

    /// Bytes of HDU `index` exactly as built.
    fn hdu_bytes(&self, index: usize) -> &[u8] {
        let end = self.offsets.get(index + 1).copied().unwrap_or(self.bytes.len());
        &self.bytes[self.offsets[index]..end]
    }
}

fn codec(algorithm: Algorithm, force_bits: Option<u8>) -> Box<SdssCodec> {
    Box::new(SdssCodec::new(CodecConfig {
        algorithm,
        force_bits,
    }))
}

fn compress_with(input: &[u8], codec: Box<SdssCodec>, force: bool) -> scd_core::Result<(Vec<u8>, Summary)> {
    let mut out = Cursor::new(Vec::new());
    let summary = compress(input, &mut out, codec, &CompressConfig { force })?;
    Ok((out.into_inner(), summary))
}

fn compress_bytes(input: &[u8]) -> (Vec<u8>, Summary) {
    compress_with(input, codec(Algorithm::Mode, None), false).unwrap()
}

fn decompress_bytes(input: &[u8], hdu: Option<usize>) -> scd_core::Result<(Vec<u8>, Summary)> {
    let mut out = Vec::new();
    let summary = decompress(
        input,
        &mut out,
        Arc::new(SdssCodec::default()),
        &DecompressConfig { hdu },
    )?;
    Ok((out, summary))
}

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("scd_test_{}_{}.fits", std::process::id(), name))
}

// ── tests ──────────────────────────────────────────────────────────────────

#[test]
fn test_roundtrip_primary_image() {
    let pixels = sky_pixels(64 * 50, 1);
    let input = Container::default().image(64, 50, &pixels);

    let (packed, summary) = compress_bytes(&input.bytes);
    assert!(packed.len() < input.bytes.len());
    assert_eq!(packed.len() % RECORD_SIZE, 0);
    assert_eq!(summary.compressed_hdus(), 1);

    let (restored, _) = decompress_bytes(&packed, None).unwrap();
    assert_eq!(restored, input.bytes, "round trip should be byte-exact");
}

#[test]
fn test_roundtrip_difference_and_forced_bits() {
    let pixels = sky_pixels(120 * 80, 2);
    let input = Container::default().image(120, 80, &pixels);

    for (algorithm, bits) in [
        (Algorithm::Difference, None),
        (Algorithm::Mode, Some(3)),
        (Algorithm::Difference, Some(5)),
    ] {
        let (packed, summary) = compress_with(&input.bytes, codec(algorithm, bits), false).unwrap();
        let stats = summary.hdus[0].stats.unwrap();
        assert_eq!(stats.params.algorithm, algorithm);
        if let Some(bits) = bits {
            assert_eq!(stats.params.lsb_count, bits);
        }

        let (restored, back) = decompress_bytes(&packed, None).unwrap();
        assert_eq!(restored, input.bytes, "{algorithm:?} {bits:?}");
        assert_eq!(back.hdus[0].stats.unwrap().params, stats.params);
    }
}

#[test]
fn test_compressed_hdu_layout() {
    let pixels = sky_pixels(90 * 70, 3);
    let input = Container::default().image(90, 70, &pixels);
    let (packed, summary) = compress_bytes(&input.bytes);
    let stats = summary.hdus[0].stats.unwrap();

    let mut reader = HduReader::new(packed.as_slice());
    let hdu = reader.next_hdu().unwrap().unwrap();
    assert!(reader.next_hdu().unwrap().is_none());

    let header = &hdu.header;
    assert!(header.is_compressed());
    assert_eq!(header.int("BITPIX"), Some(8));
    assert_eq!(header.int("NAXIS"), Some(1));
    assert_eq!(header.int("ZBITPIX"), Some(16));
    assert_eq!(header.int("ZNAXIS"), Some(2));
    assert_eq!(header.int("ZNAXIS1"), Some(90));
    assert_eq!(header.int("ZNAXIS2"), Some(70));
    assert!(header.get("OBSERVER").is_some());

    // NAXIS1 patched in place with the stream length
    let at = NAXIS1_CARD_OFFSET as usize;
    assert_eq!(
        &hdu.header_bytes[at..at + 80],
        Card::integer("NAXIS1", stats.stream_bytes as i64).as_bytes()
    );
    assert_eq!(hdu.data_len, stats.stream_bytes);
    assert_eq!(hdu.data.len() as u64, padded_len(stats.stream_bytes));
    assert!(hdu.data[stats.stream_bytes as usize..].iter().all(|&b| b == 0));

    // control bytes, then 32-bit words
    assert_eq!(&hdu.data[..3], &[1, stats.params.lsb_count, 0]);
    assert_eq!((stats.stream_bytes - 3) % 4, 0);
}

#[test]
fn test_multi_hdu_mixed_container() {
    let noise = pseudo_random_u16(64 * 128, 4);
    let mask: Vec<u8> = (0..1000u32).map(|i| (i % 7 == 0) as u8).collect();
    let input = Container::default()
        .hdu(8, &[], &[])
        .image(100, 40, &sky_pixels(4000, 5))
        .hdu(8, &[1000], &mask)
        .image(64, 128, &noise);

    let (packed, summary) = compress_bytes(&input.bytes);
    assert_eq!(summary.hdus.len(), 4);
    assert_eq!(summary.compressed_hdus(), 1);
    assert!(summary.hdus[1].is_compressed());
    // full-range noise does not shrink and stays verbatim
    assert!(!summary.hdus[3].is_compressed());
    assert_eq!(summary.hdus[3].bitpix, 16);
    assert_eq!(summary.hdus[3].stored_bytes, summary.hdus[3].raw_bytes);

    let (restored, back) = decompress_bytes(&packed, None).unwrap();
    assert_eq!(restored, input.bytes);

    let before: Vec<u64> = summary.hdus.iter().map(|h| h.checksum).collect();
    let after: Vec<u64> = back.hdus.iter().map(|h| h.checksum).collect();
    assert_eq!(before, after);
}

#[test]
fn test_single_hdu_selection() {
    let input = Container::default()
        .hdu(8, &[], &[])
        .image(100, 40, &sky_pixels(4000, 6))
        .hdu(8, &[500], &[7u8; 500]);
    let (packed, _) = compress_bytes(&input.bytes);

    let (restored, summary) = decompress_bytes(&packed, Some(1)).unwrap();
    assert_eq!(summary.hdus.len(), 1);
    assert_eq!(restored, input.hdu_bytes(1));

    // verbatim HDU after a compressed one
    let (restored, _) = decompress_bytes(&packed, Some(2)).unwrap();
    assert_eq!(restored, input.hdu_bytes(2));

    let err = decompress_bytes(&packed, Some(9)).unwrap_err();
    assert!(matches!(err, ScdError::Format(_)));
}

#[test]
fn test_incompressible_image_is_refused() {
    let noise = pseudo_random_u16(128 * 128, 7);
    let input = Container::default().image(128, 128, &noise);

    let err = compress_with(&input.bytes, codec(Algorithm::Mode, None), false).unwrap_err();
    match err {
        ScdError::NegativeCompression { raw, compressed } => {
            assert_eq!(raw, input.bytes.len() as u64);
            assert_eq!(compressed, raw);
        }
        other => panic!("expected NegativeCompression, got {other:?}"),
    }
}

#[test]
fn test_unsupported_bit_depth() {
    let input = Container::default().hdu(8, &[2880], &[0u8; 2880]);
    let err = compress_with(&input.bytes, codec(Algorithm::Mode, None), false).unwrap_err();
    assert!(matches!(err, ScdError::UnsupportedBitDepth(8)));

    // forced through, nothing shrinks
    let err = compress_with(&input.bytes, codec(Algorithm::Mode, None), true).unwrap_err();
    assert!(matches!(err, ScdError::NegativeCompression { .. }));
}

#[test]
fn test_cube_needs_force() {
    let cube: Vec<u16> = sky_pixels(10 * 10 * 4, 8);
    let input = Container::default()
        .image(100, 40, &sky_pixels(4000, 9))
        .hdu(16, &[10, 10, 4], &be_bytes(&cube));

    let err = compress_with(&input.bytes, codec(Algorithm::Mode, None), false).unwrap_err();
    assert!(matches!(err, ScdError::Format(_)));

    let (packed, summary) = compress_with(&input.bytes, codec(Algorithm::Mode, None), true).unwrap();
    assert!(summary.hdus[0].is_compressed());
    assert!(!summary.hdus[1].is_compressed());
    let (restored, _) = decompress_bytes(&packed, None).unwrap();
    assert_eq!(restored, input.bytes);
}

#[test]
fn test_uncompressed_input_rejected_by_decompress() {
    let input = Container::default().image(64, 50, &sky_pixels(3200, 10));
    let err = decompress_bytes(&input.bytes, None).unwrap_err();
    assert!(matches!(err, ScdError::Format(_)));
}

#[test]
fn test_truncated_container() {
    let input = Container::default()
        .hdu(8, &[], &[])
        .image(100, 40, &sky_pixels(4000, 11));
    let (packed, _) = compress_bytes(&input.bytes);

    for cut in [RECORD_SIZE, 100] {
        let short = &packed[..packed.len() - cut];
        let err = decompress_bytes(short, None).unwrap_err();
        assert!(matches!(err, ScdError::UnexpectedEof), "cut {cut}: {err:?}");
    }
}

#[test]
fn test_empty_input() {
    let err = compress_with(&[], codec(Algorithm::Mode, None), false).unwrap_err();
    assert!(matches!(err, ScdError::Format(_)));
}

#[test]
fn test_output_guard_cleans_up_failed_compression() {
    let path = temp_path("guarded");
    let noise = pseudo_random_u16(128 * 128, 12);
    let input = Container::default().image(128, 128, &noise);

    let result = {
        let guard = OutputGuard::new(&path);
        let mut file = std::fs::File::create(guard.path()).unwrap();
        let result = compress(
            input.bytes.as_slice(),
            &mut file,
            codec(Algorithm::Mode, None),
            &CompressConfig::default(),
        );
        if result.is_ok() {
            guard.keep();
        }
        result
    };
    assert!(matches!(result, Err(ScdError::NegativeCompression { .. })));
    assert!(!path.exists(), "partial output should be removed");
}

#[test]
fn test_commented_structural_cards_round_trip() {
    let primary = be_bytes(&sky_pixels(64 * 50, 13));
    let extension = be_bytes(&sky_pixels(40 * 30, 14));
    let input = Container::default()
        .written(
            &[
                "SIMPLE  =                    T / file does conform to FITS standard",
                "BITPIX  =                   16 / number of bits per data pixel",
                "NAXIS   = 2 / number of data axes",
                "NAXIS1  =                   64 / length of data axis 1",
                "DATE    = '2001-09-04T06:23:11' / file creation date",
                "NAXIS2  =      50              / length of data axis 2",
                "EXTEND  =                    T / FITS dataset may contain extensions",
                "COMMENT   raw frame from camera column 3",
            ],
            &primary,
        )
        .written(
            &[
                "XTENSION= 'IMAGE   '           / IMAGE extension",
                "BITPIX  = 16",
                "NAXIS   =                    2 / number of data axes",
                "NAXIS1  =                   40",
                "NAXIS2  =                   30",
                "EXTNAME = 'BIAS    '           / overscan region",
                "GCOUNT  =                    1 / one data group",
                "PCOUNT  =                    0 / number of group parameters",
                "HISTORY overscan trimmed",
            ],
            &extension,
        );

    let (packed, summary) = compress_bytes(&input.bytes);
    assert_eq!(summary.compressed_hdus(), 2);
    assert_eq!(summary.hdus[0].axes, vec![64, 50]);
    assert_eq!(summary.hdus[1].axes, vec![40, 30]);

    // the compressed extension keeps PCOUNT/GCOUNT right after NAXIS1
    let hdus: Vec<_> = HduReader::new(packed.as_slice())
        .collect::<scd_core::Result<_>>()
        .unwrap();
    assert_eq!(hdus[1].header.cards()[4].keyword(), "PCOUNT");
    assert_eq!(hdus[1].header.cards()[5].keyword(), "GCOUNT");
    assert_eq!(hdus[0].header.int("ZNAXIS2"), Some(50));

    let (restored, _) = decompress_bytes(&packed, None).unwrap();
    let first_diff = restored.iter().zip(&input.bytes).position(|(a, b)| a != b);
    assert_eq!(first_diff, None);
    assert_eq!(restored, input.bytes);

    let (restored, _) = decompress_bytes(&packed, Some(1)).unwrap();
    assert_eq!(restored, input.hdu_bytes(1));
}

#[test]
fn test_header_with_compression_keywords_stored_verbatim() {
    let input = Container::default()
        .image(100, 40, &sky_pixels(4000, 15))
        .written(
            &[
                "XTENSION= 'IMAGE   '",
                "BITPIX  =                   16",
                "NAXIS   =                    2",
                "NAXIS1  =                   20",
                "NAXIS2  =                   20",
                "PCOUNT  =                    0",
                "GCOUNT  =                    1",
                "ZBITPIX =                   16 / left by another tool",
            ],
            &be_bytes(&sky_pixels(400, 16)),
        );

    let (packed, summary) = compress_bytes(&input.bytes);
    assert!(summary.hdus[0].is_compressed());
    assert!(!summary.hdus[1].is_compressed());
    let (restored, _) = decompress_bytes(&packed, None).unwrap();
    assert_eq!(restored, input.bytes);
}

#[test]
fn test_overflowing_axes_are_rejected() {
    let input = Container::default().written(
        &[
            "SIMPLE  =                    T",
            "BITPIX  =                   16",
            "NAXIS   =                    2",
            "NAXIS1  =  9223372036854775807",
            "NAXIS2  =  9223372036854775807",
        ],
        &[],
    );
    let err = compress_with(&input.bytes, codec(Algorithm::Mode, None), false).unwrap_err();
    assert!(matches!(err, ScdError::Format(_)), "{err:?}");
    let err = decompress_bytes(&input.bytes, None).unwrap_err();
    assert!(matches!(err, ScdError::Format(_)), "{err:?}");
}
