//! jpxdecode CLI - decode constrained JPEG 2000 codestreams.
//!
//! Accepts the raw codestreams embedded in PDF `/JPXDecode` streams.

use clap::{Parser, Subcommand, ValueEnum};
use jpx_decode::{DecodeOptions, J2kError};
use std::fs;
use std::path::PathBuf;

/// Decoder for single-tile, single-layer JPEG 2000 codestreams
#[derive(Parser)]
#[command(name = "jpxdecode")]
#[command(version)]
#[command(about = "Decode constrained JPEG 2000 codestreams to raw pixels", long_about = None)]
#[command(after_help = "EXAMPLES:
    jpxdecode decode -i image.j2k -o pixels.raw
    jpxdecode decode -i image.j2k -o image.ppm -f ppm --width 64 --height 64
    jpxdecode info -i image.j2k

Set RUST_LOG=debug (or pass -v) to trace marker and packet parsing.")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a codestream to raw pixels or a PGM/PPM image
    #[command(visible_alias = "d")]
    Decode {
        /// Input codestream path
        #[arg(short, long, help = "Path to the input codestream")]
        input: PathBuf,

        /// Output file path for decoded pixels
        #[arg(short, long, help = "Path for the output file")]
        output: PathBuf,

        /// Output format: raw (binary pixels) or ppm (Portable PixMap)
        #[arg(short, long, default_value = "raw", value_enum)]
        format: OutputFormat,

        /// Expected width, as declared by the enclosing PDF image dictionary
        #[arg(long)]
        width: Option<u32>,

        /// Expected height, as declared by the enclosing PDF image dictionary
        #[arg(long)]
        height: Option<u32>,
    },

    /// Display main header parameters
    #[command(visible_alias = "i")]
    Info {
        /// Input codestream path
        #[arg(short, long, help = "Path to the codestream to inspect")]
        input: PathBuf,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Raw binary pixel data
    Raw,
    /// Portable PixMap (PPM/PGM) format
    Ppm,
}

fn main() {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if cli.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    let result = match cli.command {
        Commands::Decode {
            input,
            output,
            format,
            width,
            height,
        } => decode_image(&input, &output, &format, width, height),
        Commands::Info { input } => show_info(&input),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn decode_image(
    input: &PathBuf,
    output: &PathBuf,
    format: &OutputFormat,
    width: Option<u32>,
    height: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = fs::read(input)?;

    let options = match (width, height) {
        (Some(w), Some(h)) => DecodeOptions::new(w, h),
        _ => {
            let header = jpx_decode::read_header(&data)?;
            DecodeOptions::new(
                width.unwrap_or(header.width),
                height.unwrap_or(header.height),
            )
        }
    };
    let image = jpx_decode::decode(&data, options)?;

    match format {
        OutputFormat::Raw => {
            fs::write(output, &image.data)?;
        }
        OutputFormat::Ppm => {
            write_ppm(output, &image.data, image.width, image.height, image.components)?;
        }
    }

    println!(
        "✓ Decoded {}x{} image ({} components) to {:?}",
        image.width, image.height, image.components, output
    );
    Ok(())
}

fn show_info(input: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let data = fs::read(input)?;

    println!("File: {:?}", input);
    println!("Size: {} bytes", data.len());
    println!();

    let parsed = jpx_decode::read_header(&data);
    println!("Format: {}", format_label(parsed.as_ref().err()));
    let header = parsed?;

    println!("  Dimensions: {}x{}", header.width, header.height);
    println!("  Components: {}", header.components);
    println!(
        "  Bit depth:  {} bits ({})",
        header.bit_depth,
        if header.is_signed { "signed" } else { "unsigned" }
    );
    println!("  Guard bits: {}", header.guard_bits);
    println!(
        "  Code-block: {}x{}",
        header.codeblock_width(),
        header.codeblock_height()
    );
    println!("  Block style: 0x{:02X}", header.cod.codeblock_style.0);
    println!(
        "  Markers:    SOP {}, EPH {}",
        if header.cod.uses_sop() { "yes" } else { "no" },
        if header.cod.uses_eph() { "yes" } else { "no" }
    );
    println!("  Quantization style: {}", header.qcd.quant_style);

    Ok(())
}

fn format_label(error: Option<&J2kError>) -> &'static str {
    match error {
        None => "JPEG 2000 Codestream",
        Some(e) if e.is_unsupported() => "JPEG 2000 Codestream (outside the supported profile)",
        Some(_) => "Malformed JPEG 2000 Codestream",
    }
}

fn write_ppm(
    path: &PathBuf,
    pixels: &[u8],
    width: u32,
    height: u32,
    components: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    use std::io::Write;
    let mut file = fs::File::create(path)?;

    if components == 1 {
        writeln!(file, "P5")?;
    } else {
        writeln!(file, "P6")?;
    }
    writeln!(file, "{} {}", width, height)?;
    writeln!(file, "255")?;
    file.write_all(pixels)?;

    Ok(())
}
