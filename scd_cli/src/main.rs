use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{ArgAction, Parser, Subcommand};
use log::{debug, LevelFilter};

use scd_codecs::{codec_by_name, SdssCodec};
use scd_core::{
    compress, decompress, Codec, CompressConfig, DecompressConfig, HduReader, HduSummary,
    OutputGuard, Reader, ScdError, Summary, Writer,
};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "scd",
    about = "Lossless compression of 16-bit FITS images with an adaptive LSB-split comma code",
    version
)]
struct Cli {
    /// More output (-v sizes, -vv per-HDU decisions, -vvv everything)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress the 16-bit image HDUs of a FITS file
    Compress {
        /// Source FITS file ("-" reads stdin)
        input: PathBuf,
        /// Destination file (default: <input>.scd)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Write the compressed file to stdout
        #[arg(short = 'c', long)]
        stdout: bool,
        /// Force this many low bits to be sent raw (0–16) instead of searching
        #[arg(short, long)]
        bits: Option<u8>,
        /// Prediction algorithm: mode | difference
        #[arg(short, long, default_value = "mode")]
        algorithm: String,
        /// Overwrite existing output and accept files with no 16-bit image
        #[arg(short, long)]
        force: bool,
        /// Delete the input once the compressed output is on disk
        #[arg(long)]
        replace: bool,
    },
    /// Restore a compressed FITS file
    Decompress {
        /// Compressed file ("-" reads stdin)
        input: PathBuf,
        /// Destination file (default: input without .scd, or with .fits added)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Write the restored file to stdout
        #[arg(short = 'c', long)]
        stdout: bool,
        /// Restore only this HDU (0 = primary)
        #[arg(long)]
        hdu: Option<usize>,
        /// Overwrite existing output
        #[arg(short, long)]
        force: bool,
    },
    /// Print per-HDU compression details of a compressed file
    Inspect {
        /// Compressed file
        file: PathBuf,
    },
    /// Compress and decompress in memory and compare per-HDU checksums
    Verify {
        /// Source FITS file
        file: PathBuf,
    },
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .parse_default_env()
        .init();
}

fn is_stdio(path: &Path) -> bool {
    path.to_str() == Some("-")
}

fn open_input(path: &Path) -> anyhow::Result<Box<dyn Read>> {
    if is_stdio(path) {
        return Ok(Box::new(io::stdin().lock()));
    }
    let file = File::open(path).with_context(|| format!("opening input file {:?}", path))?;
    Ok(Box::new(BufReader::new(file)))
}

fn create_output(path: &Path, force: bool) -> anyhow::Result<(OutputGuard, BufWriter<File>)> {
    if path.exists() && !force {
        bail!("{:?} already exists; use --force to overwrite", path);
    }
    let file = File::create(path).with_context(|| format!("creating output file {:?}", path))?;
    Ok((OutputGuard::new(path), BufWriter::new(file)))
}

fn default_compressed_path(input: &Path) -> anyhow::Result<PathBuf> {
    if is_stdio(input) {
        bail!("reading stdin needs --output or --stdout");
    }
    let mut name = input.as_os_str().to_owned();
    name.push(".scd");
    Ok(PathBuf::from(name))
}

fn default_restored_path(input: &Path) -> anyhow::Result<PathBuf> {
    if is_stdio(input) {
        bail!("reading stdin needs --output or --stdout");
    }
    if input.extension().is_some_and(|ext| ext == "scd") {
        return Ok(input.with_extension(""));
    }
    let mut name = input.as_os_str().to_owned();
    name.push(".fits");
    Ok(PathBuf::from(name))
}

fn print_totals(summary: &Summary, elapsed: f64) {
    let raw = summary.raw_bytes();
    eprintln!("  hdus        : {}", summary.hdus.len());
    eprintln!("  pixel-coded : {}", summary.compressed_hdus());
    eprintln!("  raw size    : {}", human_bytes(raw));
    eprintln!("  compressed  : {}", human_bytes(summary.stored_bytes()));
    eprintln!("  ratio       : {:.2}x", summary.ratio());
    eprintln!(
        "  throughput  : {}/s",
        human_bytes((raw as f64 / elapsed.max(1e-9)) as u64)
    );
    eprintln!("  elapsed     : {:.3}s", elapsed);
}

fn geometry(hdu: &HduSummary) -> String {
    if hdu.axes.is_empty() {
        return "-".to_string();
    }
    hdu.axes
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join("x")
}

// ── Subcommand implementations ─────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
fn run_compress(
    input: PathBuf,
    output: Option<PathBuf>,
    to_stdout: bool,
    bits: Option<u8>,
    algorithm: &str,
    force: bool,
    replace: bool,
    verbose: u8,
) -> anyhow::Result<()> {
    let codec = codec_by_name(algorithm, bits)?;
    let config = CompressConfig { force };
    let src = open_input(&input)?;
    let t0 = Instant::now();

    let summary = if to_stdout {
        // NAXIS1 is patched by seeking, so assemble the stream in memory.
        let mut buf = Cursor::new(Vec::new());
        let summary = compress(src, &mut buf, codec, &config)?;
        let mut stdout = io::stdout().lock();
        stdout.write_all(buf.get_ref())?;
        stdout.flush()?;
        summary
    } else {
        let path = match output {
            Some(path) => path,
            None => default_compressed_path(&input)?,
        };
        let (guard, mut dst) = create_output(&path, force)?;
        let summary = compress(src, &mut dst, codec, &config)
            .with_context(|| format!("compressing {:?}", input))?;
        dst.flush()?;
        dst.get_ref().sync_all()?;
        let path = guard.keep();
        debug!("wrote {:?}", path);

        if replace && !is_stdio(&input) {
            fs::remove_file(&input).with_context(|| format!("removing input {:?}", input))?;
            debug!("removed {:?}", input);
        }
        summary
    };

    if verbose > 0 {
        eprintln!("  algorithm   : {}", algorithm);
        print_totals(&summary, t0.elapsed().as_secs_f64());
    }
    Ok(())
}

fn run_decompress(
    input: PathBuf,
    output: Option<PathBuf>,
    to_stdout: bool,
    hdu: Option<usize>,
    force: bool,
    verbose: u8,
) -> anyhow::Result<()> {
    let codec: Arc<dyn Codec> = Arc::new(SdssCodec::default());
    let config = DecompressConfig { hdu };
    let src = open_input(&input)?;
    let t0 = Instant::now();

    let summary = if to_stdout {
        let stdout = io::stdout().lock();
        decompress(src, BufWriter::new(stdout), codec, &config)?
    } else {
        let path = match output {
            Some(path) => path,
            None => default_restored_path(&input)?,
        };
        let (guard, mut dst) = create_output(&path, force)?;
        let summary = decompress(src, &mut dst, codec, &config)
            .with_context(|| format!("decompressing {:?}", input))?;
        dst.flush()?;
        guard.keep();
        summary
    };

    if verbose > 0 {
        print_totals(&summary, t0.elapsed().as_secs_f64());
    }
    Ok(())
}

fn run_inspect(file: PathBuf) -> anyhow::Result<()> {
    let src = open_input(&file)?;
    let mut reader = Reader::new(src, Arc::new(SdssCodec::default()));
    let mut hdus = Vec::new();
    while let Some(hdu) = reader.read_hdu(&mut io::sink())? {
        hdus.push(hdu);
    }
    let summary = Summary { hdus };

    println!("=== SDSS compressed file: {:?} ===", file);
    println!();
    println!(
        "  {:>4}  {:>6}  {:>12}  {:>10}  {:>4}  {:>10}  {:>6}  {:>8}  {:>8}",
        "hdu", "bitpix", "geometry", "status", "lsb", "algorithm", "mode", "outliers", "ratio"
    );
    println!("  {}", "-".repeat(86));
    for hdu in &summary.hdus {
        match &hdu.stats {
            Some(stats) => println!(
                "  {:>4}  {:>6}  {:>12}  {:>10}  {:>4}  {:>10}  {:>6}  {:>8}  {:>7.2}x",
                hdu.index,
                hdu.bitpix,
                geometry(hdu),
                "compressed",
                stats.params.lsb_count,
                stats.params.algorithm.name(),
                stats.params.base_value,
                stats.outliers,
                hdu.ratio()
            ),
            None => println!(
                "  {:>4}  {:>6}  {:>12}  {:>10}  {:>4}  {:>10}  {:>6}  {:>8}  {:>7.2}x",
                hdu.index,
                hdu.bitpix,
                geometry(hdu),
                "verbatim",
                "-",
                "-",
                "-",
                "-",
                1.0
            ),
        }
    }
    println!();
    println!("  marked hdus    : {}", reader.markers_seen());
    println!("  stored size    : {}", human_bytes(summary.stored_bytes()));
    println!("  restored size  : {}", human_bytes(summary.raw_bytes()));
    println!("  ratio          : {:.2}x", summary.ratio());
    Ok(())
}

/// Pixel-code every HDU that qualifies and decode the result again.
///
/// Runs the writer directly so the whole-file refusals of `compress` (no
/// 16-bit image, output not smaller) do not stop the check. `restored` is
/// `None` when no HDU was pixel-coded and there is nothing to decode.
fn verify_bytes(original: &[u8]) -> anyhow::Result<(Summary, Option<Summary>)> {
    let mut packed = Cursor::new(Vec::new());
    let mut hdus = HduReader::new(original);
    let mut writer = Writer::new(
        &mut packed,
        Box::new(SdssCodec::default()),
        CompressConfig { force: true },
    );
    while let Some(hdu) = hdus.next_hdu()? {
        writer.write_hdu(&hdu)?;
    }
    let compressed = writer.finish()?;
    if compressed.hdus.is_empty() {
        bail!("input contains no HDU");
    }
    if compressed.compressed_hdus() == 0 {
        return Ok((compressed, None));
    }

    let restored = decompress(
        packed.get_ref().as_slice(),
        io::sink(),
        Arc::new(SdssCodec::default()),
        &DecompressConfig::default(),
    )?;
    Ok((compressed, Some(restored)))
}

fn run_verify(file: PathBuf, verbose: u8) -> anyhow::Result<()> {
    let mut original = Vec::new();
    open_input(&file)?.read_to_end(&mut original)?;

    let t0 = Instant::now();
    let (compressed, restored) = verify_bytes(&original)?;
    let Some(restored) = restored else {
        println!("{:?}: no HDU is pixel-coded, every HDU would be stored verbatim", file);
        return Ok(());
    };

    if compressed.hdus.len() != restored.hdus.len() {
        bail!(
            "hdu count mismatch: {} compressed, {} restored",
            compressed.hdus.len(),
            restored.hdus.len()
        );
    }
    let mut mismatches = 0;
    for (before, after) in compressed.hdus.iter().zip(&restored.hdus) {
        let ok = before.checksum == after.checksum;
        if !ok {
            mismatches += 1;
        }
        println!(
            "  hdu {:>3}  {:>12}  {:016x}  {}",
            before.index,
            geometry(before),
            before.checksum,
            if ok { "ok" } else { "MISMATCH" }
        );
    }
    if mismatches > 0 {
        bail!("{mismatches} HDU(s) did not survive the round trip");
    }
    if compressed.stored_bytes() >= compressed.raw_bytes() {
        println!("  note: output is not smaller, compress would keep the original");
    }
    if verbose > 0 {
        print_totals(&compressed, t0.elapsed().as_secs_f64());
    }
    println!("verified {:?}", file);
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn run(cli: Cli) -> anyhow::Result<()> {
    let verbose = cli.verbose;
    match cli.command {
        Commands::Compress {
            input,
            output,
            stdout,
            bits,
            algorithm,
            force,
            replace,
        } => run_compress(
            input, output, stdout, bits, &algorithm, force, replace, verbose,
        ),
        Commands::Decompress {
            input,
            output,
            stdout,
            hdu,
            force,
        } => run_decompress(input, output, stdout, hdu, force, verbose),
        Commands::Inspect { file } => run_inspect(file),
        Commands::Verify { file } => run_verify(file, verbose),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("scd: {e:#}");
            match e.downcast_ref::<ScdError>() {
                Some(ScdError::NegativeCompression { .. }) => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scd_core::{Card, Header, RECORD_SIZE};

    fn image_file(pixels: &[u16], width: i64) -> Vec<u8> {
        let mut file = Header::new(vec![
            Card::new("SIMPLE  =                    T"),
            Card::integer("BITPIX", 16),
            Card::integer("NAXIS", 2),
            Card::integer("NAXIS1", width),
            Card::integer("NAXIS2", pixels.len() as i64 / width),
        ])
        .to_bytes();
        file.extend(pixels.iter().flat_map(|p| p.to_be_bytes()));
        file.resize(file.len().div_ceil(RECORD_SIZE) * RECORD_SIZE, 0);
        file
    }

    fn noise(n: usize) -> Vec<u16> {
        let mut rng = 17u64;
        (0..n)
            .map(|_| {
                rng = rng
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                (rng >> 48) as u16
            })
            .collect()
    }

    #[test]
    fn verify_round_trips_a_compressible_image() {
        let pixels: Vec<u16> = noise(64 * 40).iter().map(|v| 900 + v % 8).collect();
        let (compressed, restored) = verify_bytes(&image_file(&pixels, 64)).unwrap();
        let restored = restored.unwrap();
        assert_eq!(compressed.compressed_hdus(), 1);
        assert_eq!(compressed.hdus[0].checksum, restored.hdus[0].checksum);
    }

    #[test]
    fn verify_accepts_incompressible_input() {
        let file = image_file(&noise(64 * 64), 64);
        // plain compression refuses this file
        let err = compress(
            file.as_slice(),
            Cursor::new(Vec::new()),
            Box::new(SdssCodec::default()),
            &CompressConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ScdError::NegativeCompression { .. }));

        let (compressed, restored) = verify_bytes(&file).unwrap();
        assert_eq!(compressed.hdus.len(), 1);
        assert!(restored.is_none());
    }

    #[test]
    fn verify_rejects_empty_input() {
        assert!(verify_bytes(&[]).is_err());
    }
}
