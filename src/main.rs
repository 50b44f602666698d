//! crnbatch - batch PNG to CRN/DDS texture converter

use anyhow::Result;
use clap::{ArgAction, Parser};
use crnbatch::crunch::CrunchEncoder;
use crnbatch::overrides::ResizeMode;
use crnbatch::pipeline::Pipeline;
use crnbatch::request::{ConversionRequest, ConvertOptions, OutputFormat, TargetSpec, DEFAULT_QUALITY};
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "crnbatch")]
#[command(version)]
#[command(about = "Convert PNGs to crunched CRN/DDS textures, updating spritesheet JSON")]
struct Cli {
    /// Glob path, directory, or path to a .txt list of glob paths to .pngs to process
    #[arg(short, long, required = true, num_args = 1..)]
    files: Vec<String>,

    /// Quality of crunch output, 0-1
    #[arg(short, long, default_value_t = DEFAULT_QUALITY)]
    quality: f64,

    /// Convert input pngs to premultiplied alpha first
    #[arg(long, visible_alias = "pm", default_value_t = true, action = ArgAction::Set)]
    premultiplied: bool,

    /// Output texture format
    #[arg(long, value_enum, default_value_t = OutputFormat::Crn)]
    format: OutputFormat,

    /// Delete the input pngs after they are converted
    #[arg(short, long)]
    delete_input: bool,

    /// How to fix images that aren't a multiple of 4 (or under 64px): 'scale'
    /// lets crunch scale up, 'border' adds transparency to the right and
    /// bottom. Without it, invalid images are skipped.
    #[arg(short, long, value_enum)]
    resize: Option<ResizeMode>,

    /// Path to the crunch binary (defaults to the bundled one for this OS)
    #[arg(long, env = "CRUNCH_PATH")]
    crunch: Option<PathBuf>,

    /// Exit with an error if any image failed to convert
    #[arg(long)]
    fail_on_error: bool,

    /// Enable verbose logging (use RUST_LOG=debug for more detail)
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(if cli.verbose { "crnbatch=debug".parse()? } else { "crnbatch=warn".parse()? }),
        )
        .init();

    let options = ConvertOptions {
        quality: cli.quality,
        premultiply: cli.premultiplied,
        format: cli.format,
        delete_source: cli.delete_input,
        resize: cli.resize.unwrap_or_default(),
    };
    let request = ConversionRequest::new(TargetSpec::from_args(cli.files), options)?;

    let encoder = match cli.crunch {
        Some(path) => CrunchEncoder::with_binary(path),
        None => CrunchEncoder::locate(),
    };

    // Progress bar only when per-image logging is off
    let show_progress = !cli.verbose && std::io::stderr().is_terminal();
    let pipeline = Pipeline::new(encoder).with_progress(show_progress);

    let stats = pipeline.run(&request)?;

    println!("\n=== Conversion Summary ===");
    println!("Images:       {}", stats.images_total);
    println!("Converted:    {}", stats.images_converted);
    println!("Failed:       {}", stats.images_failed);
    println!("Spritesheets: {} updated", stats.spritesheets_patched);
    if request.options.delete_source {
        println!("Deleted:      {} source images", stats.sources_deleted);
    }

    if stats.has_failures() {
        println!("\nFailed images:");
        for failure in &stats.failures {
            println!("  {}: {}", crnbatch::paths::display_relative(&failure.path), failure.error);
        }
        if cli.fail_on_error {
            anyhow::bail!("{} images failed to convert", stats.images_failed);
        }
    }

    Ok(())
}
