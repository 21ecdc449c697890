//! SDSS compression demo
//!
//! Builds a synthetic survey frame (sky background, read noise, a field of
//! stars with saturated cores) inside a multi-HDU FITS container, then
//! compresses it with both prediction algorithms and a sweep of forced LSB
//! counts, checking every round trip byte for byte.

use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{ensure, Result};

use scd_codecs::{estimate, CodecConfig, SdssCodec};
use scd_core::format::{padding_for, BLOCK_PIXELS};
use scd_core::{
    compress, decompress, Algorithm, Card, CompressConfig, DecompressConfig, Header, ScdError,
    Summary,
};

// ── constants ──────────────────────────────────────────────────────────────

const WIDTH: usize = 2048;
const HEIGHT: usize = 1489;
const SKY_LEVEL: f64 = 1100.0;
const STAR_COUNT: usize = 400;
const SATURATION: u16 = 65535;

// ── data generator ──────────────────────────────────────────────────────────

/// Deterministic LCG so every run produces the same frame.
struct Lcg(u64);

impl Lcg {
    fn next_u32(&mut self) -> u32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) as u32
    }

    fn unit(&mut self) -> f64 {
        self.next_u32() as f64 / (1u64 << 31) as f64
    }

    /// Roughly normal, from a sum of twelve uniforms.
    fn gaussian(&mut self) -> f64 {
        (0..12).map(|_| self.unit()).sum::<f64>() - 6.0
    }
}

/// Sky plus Poisson-like noise plus Gaussian stars, clipped at saturation.
fn generate_sky(width: usize, height: usize, seed: u64) -> Vec<u16> {
    let mut rng = Lcg(seed);
    let mut flux = vec![0f64; width * height];

    for (i, px) in flux.iter_mut().enumerate() {
        // gentle vignetting across the frame
        let x = (i % width) as f64 / width as f64 - 0.5;
        let y = (i / width) as f64 / height as f64 - 0.5;
        *px = SKY_LEVEL * (1.0 - 0.08 * (x * x + y * y));
    }

    for _ in 0..STAR_COUNT {
        let cx = rng.unit() * width as f64;
        let cy = rng.unit() * height as f64;
        // heavy tail of bright stars
        let peak = 200.0 * (1.0 / rng.unit().max(1e-3)).powf(1.3);
        let sigma = 1.2 + rng.unit() * 1.5;
        let r = (sigma * 5.0).ceil() as isize;
        for dy in -r..=r {
            for dx in -r..=r {
                let x = cx as isize + dx;
                let y = cy as isize + dy;
                if x < 0 || y < 0 || x >= width as isize || y >= height as isize {
                    continue;
                }
                let d2 = ((x as f64 - cx).powi(2) + (y as f64 - cy).powi(2)) / (2.0 * sigma * sigma);
                flux[y as usize * width + x as usize] += peak * (-d2).exp();
            }
        }
    }

    flux.iter()
        .map(|&f| {
            let noisy = f + f.sqrt() * rng.gaussian() + 3.0 * rng.gaussian();
            noisy.round().clamp(0.0, SATURATION as f64) as u16
        })
        .collect()
}

// ── FITS assembly ───────────────────────────────────────────────────────────

fn logical(keyword: &str, value: bool) -> Card {
    Card::new(&format!("{keyword:<8}= {:>20}", if value { "T" } else { "F" }))
}

fn string(keyword: &str, value: &str) -> Card {
    Card::new(&format!("{keyword:<8}= '{value:<8}'"))
}

fn push_hdu(out: &mut Vec<u8>, cards: Vec<Card>, data: &[u8]) {
    out.extend_from_slice(&Header::new(cards).to_bytes());
    out.extend_from_slice(data);
    out.resize(out.len() + padding_for(data.len() as u64), 0);
}

/// Primary header only, the 16-bit frame as an IMAGE extension, and a small
/// 8-bit mask extension that must pass through untouched.
fn build_container(pixels: &[u16], width: usize, height: usize) -> Vec<u8> {
    let mut out = Vec::new();
    push_hdu(
        &mut out,
        vec![
            logical("SIMPLE", true),
            Card::integer("BITPIX", 8),
            Card::integer("NAXIS", 0),
            logical("EXTEND", true),
            string("ORIGIN", "scd-demo"),
        ],
        &[],
    );

    let data: Vec<u8> = pixels.iter().flat_map(|p| p.to_be_bytes()).collect();
    push_hdu(
        &mut out,
        vec![
            string("XTENSION", "IMAGE"),
            Card::integer("BITPIX", 16),
            Card::integer("NAXIS", 2),
            Card::integer("NAXIS1", width as i64),
            Card::integer("NAXIS2", height as i64),
            Card::integer("PCOUNT", 0),
            Card::integer("GCOUNT", 1),
            string("FILTER", "r"),
            Card::integer("EXPTIME", 54),
            Card::history("synthetic frame"),
        ],
        &data,
    );

    let mask: Vec<u8> = pixels.iter().step_by(64).map(|&p| (p == SATURATION) as u8).collect();
    push_hdu(
        &mut out,
        vec![
            string("XTENSION", "IMAGE"),
            Card::integer("BITPIX", 8),
            Card::integer("NAXIS", 1),
            Card::integer("NAXIS1", mask.len() as i64),
            Card::integer("PCOUNT", 0),
            Card::integer("GCOUNT", 1),
        ],
        &mask,
    );
    out
}

// ── timing ──────────────────────────────────────────────────────────────────

fn human_bytes(n: u64) -> String {
    const U: &[&str] = &["B", "KB", "MB", "GB"];
    let mut v = n as f64;
    let mut u = 0;
    while v >= 1024.0 && u < U.len() - 1 { v /= 1024.0; u += 1; }
    if u == 0 { format!("{n} B") } else { format!("{v:.2} {}", U[u]) }
}

fn fmt_duration(d: Duration) -> String {
    let ms = d.as_secs_f64() * 1000.0;
    if ms < 1.0 {
        format!("{:.1} µs", ms * 1000.0)
    } else if ms < 1000.0 {
        format!("{ms:.1} ms")
    } else {
        format!("{:.2} s", d.as_secs_f64())
    }
}

fn throughput(bytes: u64, d: Duration) -> String {
    format!("{}/s", human_bytes((bytes as f64 / d.as_secs_f64().max(1e-9)) as u64))
}

// ── round trip ──────────────────────────────────────────────────────────────

struct Trial {
    compressed: Vec<u8>,
    summary: Summary,
    encode: Duration,
    decode: Duration,
}

fn round_trip(input: &[u8], config: CodecConfig) -> Result<Trial> {
    let t0 = Instant::now();
    let mut packed = Cursor::new(Vec::new());
    let summary = compress(
        input,
        &mut packed,
        Box::new(SdssCodec::new(config)),
        &CompressConfig::default(),
    )?;
    let encode = t0.elapsed();

    let compressed = packed.into_inner();
    let t1 = Instant::now();
    let mut restored = Vec::with_capacity(input.len());
    decompress(
        compressed.as_slice(),
        &mut restored,
        Arc::new(SdssCodec::default()),
        &DecompressConfig::default(),
    )?;
    let decode = t1.elapsed();

    ensure!(restored == input, "round trip with {config:?} is not byte exact");
    Ok(Trial {
        compressed,
        summary,
        encode,
        decode,
    })
}

// ── demo runner ─────────────────────────────────────────────────────────────

fn run() -> Result<()> {
    println!();
    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║        SCD · lossless 16-bit FITS compression  ·  Demo          ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    // ── Phase 0: Data Generation ─────────────────────────────────────────────
    section("0 · DATA GENERATION");
    let t0 = Instant::now();
    let pixels = generate_sky(WIDTH, HEIGHT, 0x5D55);
    let input = build_container(&pixels, WIDTH, HEIGHT);
    let saturated = pixels.iter().filter(|&&p| p == SATURATION).count();
    println!("  frame           : {WIDTH} x {HEIGHT} pixels, 16-bit");
    println!("  stars           : {STAR_COUNT} ({saturated} saturated pixels)");
    println!("  container       : 3 HDUs, {}", human_bytes(input.len() as u64));
    println!("  generated in    : {}", fmt_duration(t0.elapsed()));

    let est = estimate(&pixels[..BLOCK_PIXELS], None);
    println!(
        "  estimate        : lsb={} mode={} ~{:.2} bits/pixel",
        est.lsb_count,
        est.mode,
        est.estimated_bits as f64 / est.pixels as f64
    );
    println!();

    // ── Phase 1: Compression ─────────────────────────────────────────────────
    section("1 · COMPRESSION");
    println!(
        "  {:<22} {:>12}  {:>8}  {:>10}  {:>14}  {:>14}",
        "Setting", "Compressed", "Ratio", "Outliers", "Encode", "Decode"
    );
    println!("  {}", "─".repeat(88));

    let mut settings = vec![
        ("mode (searched)", CodecConfig { algorithm: Algorithm::Mode, force_bits: None }),
        ("difference (searched)", CodecConfig { algorithm: Algorithm::Difference, force_bits: None }),
    ];
    for bits in [0u8, 2, 4, 6, 8] {
        settings.push(("", CodecConfig { algorithm: Algorithm::Mode, force_bits: Some(bits) }));
    }

    let raw = input.len() as u64;
    for (label, config) in settings {
        let label = match config.force_bits {
            Some(bits) => format!("mode, {bits} lsb forced"),
            None => label.to_string(),
        };
        match round_trip(&input, config) {
            Ok(trial) => {
                let outliers: u64 = trial
                    .summary
                    .hdus
                    .iter()
                    .filter_map(|h| h.stats.map(|s| s.outliers))
                    .sum();
                println!(
                    "  {:<22} {:>12}  {:>7.2}x  {:>10}  {:>14}  {:>14}",
                    label,
                    human_bytes(trial.compressed.len() as u64),
                    raw as f64 / trial.compressed.len() as f64,
                    format_number(outliers),
                    throughput(raw, trial.encode),
                    throughput(raw, trial.decode),
                );
            }
            Err(e) => match e.downcast_ref::<ScdError>() {
                Some(ScdError::NegativeCompression { .. }) => {
                    println!("  {label:<22} {:>12}", "not smaller, kept raw");
                }
                _ => return Err(e),
            },
        }
    }
    println!();

    // ── Phase 2: Incompressible input ────────────────────────────────────────
    section("2 · INCOMPRESSIBLE INPUT");
    let mut rng = Lcg(99);
    let noise: Vec<u16> = (0..256 * 256).map(|_| rng.next_u32() as u16).collect();
    let noisy = build_container(&noise, 256, 256);
    match round_trip(&noisy, CodecConfig::default()) {
        Err(e) if matches!(e.downcast_ref::<ScdError>(), Some(ScdError::NegativeCompression { .. })) => {
            println!("  full-range noise : refused ({e})");
        }
        Err(e) => return Err(e),
        Ok(_) => println!("  full-range noise : unexpectedly compressed"),
    }
    println!();
    Ok(())
}

// ── small helpers ──────────────────────────────────────────────────────────

fn section(title: &str) {
    println!("━━━ {title} {}", "━".repeat(70usize.saturating_sub(title.len() + 5)));
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut out = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 { out.push(','); }
        out.push(c);
    }
    out.chars().rev().collect()
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    if let Err(e) = run() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
