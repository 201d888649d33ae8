use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::PathBuf;
use thumber::thumbnail::{Limits, DEFAULT_MAX_DIMENSION, DEFAULT_MAX_PIXELS, DEFAULT_QUALITY};
use thumber::{load, Container, DecodeMode, HeaderEntry, ThumbnailConfig, ThumbnailFormat, Thumber};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "thumber", about = "Pack image thumbnails into a single indexed blob")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate thumbnails of an image and write them as one container
    Store {
        input:  PathBuf,
        output: PathBuf,
        /// Bounding box WxH; repeat for several (default 128x128, 64x64, 32x32)
        #[arg(long = "size", value_parser = parse_size)]
        sizes: Vec<(u32, u32)>,
        /// Output format: jpg, gif, png; repeat for several (default all three)
        #[arg(long = "format", value_parser = parse_format)]
        formats: Vec<ThumbnailFormat>,
        /// JPEG quality 1-100
        #[arg(short, long, default_value_t = DEFAULT_QUALITY)]
        quality: u8,
        #[arg(long, default_value_t = DEFAULT_MAX_DIMENSION)]
        max_dimension: u32,
        #[arg(long, default_value_t = DEFAULT_MAX_PIXELS)]
        max_pixels: u64,
        /// Extra header metadata KEY=VALUE; VALUE is parsed as JSON when it can be
        #[arg(long = "meta", value_parser = parse_meta)]
        meta: Vec<(String, Value)>,
    },
    /// Extract one thumbnail from a container
    Load {
        input:  PathBuf,
        /// Segment key, e.g. 128x128xjpg
        key:    String,
        output: PathBuf,
        /// Read a legacy (untagged, header-relative) container
        #[arg(long)]
        legacy: bool,
        /// Scalar key of a legacy container; repeat for several
        #[arg(long = "reserved", requires = "legacy")]
        reserved: Vec<String>,
    },
    /// Show container layout and entries
    Info {
        input: PathBuf,
        #[arg(long)]
        legacy: bool,
        #[arg(long = "reserved", requires = "legacy")]
        reserved: Vec<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            println!("{}", Cli::command().render_help());
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    init_tracing();

    match cli.command {

        // ── Store ────────────────────────────────────────────────────────────
        Commands::Store { input, output, sizes, formats, quality, max_dimension, max_pixels, meta } => {
            let defaults = ThumbnailConfig::default();
            let config = ThumbnailConfig {
                sizes:   if sizes.is_empty() { defaults.sizes } else { sizes },
                formats: if formats.is_empty() { defaults.formats } else { formats },
                quality,
                limits:  Limits { max_dimension, max_pixels },
            };
            let extra: Map<String, Value> = meta.into_iter().collect();
            let extra = (!extra.is_empty()).then_some(&extra);

            let size = Thumber::new(config).store(&input, &output, extra)?;
            println!("Created: {} ({} B)", output.display(), size);
        }

        // ── Load ─────────────────────────────────────────────────────────────
        Commands::Load { input, key, output, legacy, reserved } => {
            let size = load(&input, &key, &output, &decode_mode(legacy, reserved))?;
            println!("Wrote {} ({} B)", output.display(), size);
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input, legacy, reserved } => {
            let blob = std::fs::read(&input)?;
            let container = Container::parse(&blob, &decode_mode(legacy, reserved))?;

            println!("── thumber container ────────────────────────────────────");
            println!("  Path           {}", input.display());
            println!("  Version        {:?}", container.version());
            println!("  Header length  {} B", container.header_len());
            println!("  Total size     {} B", blob.len());
            println!("  Entries        {}", container.header().len());
            for (key, entry) in container.header().iter() {
                match entry {
                    HeaderEntry::Segment(_) => {
                        let range = container.range(key)?;
                        let bytes = container.segment(key)?;
                        println!("    {:<20} {:>10} B  {:>16}  {}",
                            key, bytes.len(), range.to_string(),
                            hex::encode(&blake3::hash(bytes).as_bytes()[..6]));
                    }
                    HeaderEntry::Scalar(value) => {
                        println!("    {:<20} {}", key, value);
                    }
                }
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env("THUMBER_LOG").unwrap_or_else(|_| EnvFilter::new("thumber=warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn decode_mode(legacy: bool, reserved: Vec<String>) -> DecodeMode {
    if legacy {
        DecodeMode::legacy(reserved)
    } else {
        DecodeMode::Canonical
    }
}

fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH, got '{s}'"))?;
    let w = w.parse().map_err(|e| format!("bad width '{w}': {e}"))?;
    let h = h.parse().map_err(|e| format!("bad height '{h}': {e}"))?;
    Ok((w, h))
}

fn parse_format(s: &str) -> Result<ThumbnailFormat, String> {
    ThumbnailFormat::from_name(s).ok_or_else(|| format!("unknown format '{s}' (jpg, gif, png)"))
}

fn parse_meta(s: &str) -> Result<(String, Value), String> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()));
    Ok((key.to_owned(), value))
}
