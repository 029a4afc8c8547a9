//! voxatlas command-line interface.
//!
//! Inspects image manifests, fits atlas layouts, reports per-channel
//! statistics and fuses channels into an RGBA volume.
#![allow(clippy::uninlined_format_args, clippy::too_many_lines)]

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use thiserror::Error;

use voxatlas_core::{AtlasLayout, AutoContrastConfig, LutStrategy};
use voxatlas_io::{
    load_channels, DataFileWriter, ImageManifest, LoadSource, LoaderConfig, SampleFormat,
};
use voxatlas_volume::{FusionMode, ViewSettings, Volume};

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    VoxatlasIo(#[from] voxatlas_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] voxatlas_core::Error),

    #[error("Settings error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Usage(String),
}

/// Fusion mode selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Component-wise maximum
    Max,
    /// Mean over enabled channels
    Avg,
}

impl From<Mode> for FusionMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Max => FusionMode::Max,
            Mode::Avg => FusionMode::Average,
        }
    }
}

/// Raw volume file for one channel, given as `INDEX=PATH`.
#[derive(Debug, Clone)]
struct RawArg {
    channel: usize,
    path: PathBuf,
}

fn parse_raw_arg(value: &str) -> std::result::Result<RawArg, String> {
    let (index, path) = value
        .split_once('=')
        .ok_or_else(|| format!("expected INDEX=PATH, got '{value}'"))?;
    let channel = index
        .parse()
        .map_err(|_| format!("invalid channel index '{index}'"))?;
    Ok(RawArg {
        channel,
        path: PathBuf::from(path),
    })
}

/// Multichannel volume data tools.
#[derive(Parser)]
#[command(name = "voxatlas")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about an image manifest
    Info {
        /// Manifest JSON file
        manifest: PathBuf,
    },

    /// Fit an atlas grid for a volume
    Layout {
        /// Tile (slice) width in pixels
        tile_width: usize,

        /// Tile (slice) height in pixels
        tile_height: usize,

        /// Number of z-slices
        tiles: usize,
    },

    /// Load an image and report per-channel statistics
    Stats {
        /// Manifest JSON file
        manifest: PathBuf,

        /// Raw volume for a channel, as INDEX=PATH (repeatable)
        #[arg(long, value_parser = parse_raw_arg)]
        raw: Vec<RawArg>,

        /// Raw volumes hold little-endian 16-bit samples
        #[arg(long = "u16")]
        sixteen_bit: bool,

        /// Write one histogram CSV per channel into this directory
        #[arg(long)]
        histograms: Option<PathBuf>,
    },

    /// Load an image, fuse its channels and write the result
    Fuse {
        /// Manifest JSON file
        manifest: PathBuf,

        /// Output file for raw RGBA voxels
        #[arg(short, long)]
        output: PathBuf,

        /// Raw volume for a channel, as INDEX=PATH (repeatable)
        #[arg(long, value_parser = parse_raw_arg)]
        raw: Vec<RawArg>,

        /// Raw volumes hold little-endian 16-bit samples
        #[arg(long = "u16")]
        sixteen_bit: bool,

        /// View settings JSON file
        #[arg(short, long)]
        settings: Option<PathBuf>,

        /// Fusion mode (overrides settings)
        #[arg(short, long, value_enum)]
        mode: Option<Mode>,

        /// Mask channel, by name or index (overrides settings)
        #[arg(long)]
        mask: Option<String>,

        /// Mask blend factor in [0, 1]
        #[arg(long, default_value = "1.0")]
        mask_alpha: f32,

        /// Write per-channel LUTs as CSV
        #[arg(long)]
        luts: Option<PathBuf>,

        /// Maximum concurrent loader threads (0 = one per file)
        #[arg(long, default_value = "0")]
        workers: usize,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

/// LUT applied to every channel when settings do not choose one.
fn default_lut() -> LutStrategy {
    LutStrategy::Percentiles { lo: 0.5, hi: 0.998 }
}

fn raw_sources(raw: &[RawArg], sixteen_bit: bool) -> Vec<LoadSource> {
    let format = if sixteen_bit {
        SampleFormat::U16
    } else {
        SampleFormat::U8
    };
    raw.iter()
        .map(|arg| LoadSource::Volume {
            path: arg.path.clone(),
            channel: arg.channel,
            format,
        })
        .collect()
}

/// Reads a manifest and loads all its channels.
fn load_volume(
    manifest_path: &Path,
    raw: &[RawArg],
    sixteen_bit: bool,
    workers: usize,
) -> Result<Volume> {
    let manifest = ImageManifest::read(manifest_path)?;
    let base_dir = manifest_path.parent().unwrap_or_else(|| Path::new("."));

    let mut sources = manifest.atlas_sources(base_dir);
    sources.extend(raw_sources(raw, sixteen_bit));
    if sources.is_empty() {
        return Err(CliError::Usage(format!(
            "{} lists no atlas images and no --raw volumes were given",
            manifest_path.display()
        )));
    }

    let mut volume = Volume::new(manifest.info)?;
    let start = Instant::now();
    let report = load_channels(
        &volume,
        sources,
        LoaderConfig::default().with_max_workers(workers),
    )
    .wait(&mut volume);
    info!(
        "loaded {} channels in {:.2}s",
        report.applied,
        start.elapsed().as_secs_f64()
    );
    if report.failed > 0 {
        warn!("{} channels failed to load", report.failed);
    }
    Ok(volume)
}

fn resolve_channel(volume: &Volume, spec: &str) -> Result<usize> {
    if let Some(index) = volume.channel_index(spec) {
        return Ok(index);
    }
    spec.parse::<usize>()
        .ok()
        .filter(|&i| i < volume.num_channels())
        .ok_or_else(|| CliError::Usage(format!("no channel named or numbered '{spec}'")))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Info { manifest } => {
            let parsed = ImageManifest::read(&manifest)?;
            let info = &parsed.info;
            let layout = info.layout();
            let [px, py, pz] = info.pixel_size();

            println!("File: {}", manifest.display());
            if !info.name.is_empty() {
                println!("Name: {}", info.name);
            }
            println!("Original size: {} x {}", info.width, info.height);
            println!(
                "Volume: {} x {} x {} voxels",
                info.tile_width, info.tile_height, info.tiles
            );
            println!(
                "Atlas: {} x {} ({} rows x {} cols{})",
                info.atlas_width,
                info.atlas_height,
                info.rows,
                info.cols,
                if layout.is_partial() { ", partial" } else { "" }
            );
            println!("Pixel size: {} x {} x {}", px, py, pz);
            println!("Channels: {}", info.channels);
            for (i, name) in info.channel_names.iter().enumerate() {
                let color = info
                    .channel_colors
                    .as_ref()
                    .and_then(|c| c.get(i).copied())
                    .unwrap_or_else(|| voxatlas_core::default_channel_color(i));
                println!("  [{}] {:<20} color {:?}", i, name, color);
            }
            for image in &parsed.images {
                println!("Image: {} -> channels {:?}", image.name, image.channels);
            }
        }

        Commands::Layout {
            tile_width,
            tile_height,
            tiles,
        } => {
            let layout = AtlasLayout::fit(tile_width, tile_height, tiles)?;
            println!("{}", serde_json::to_string_pretty(&layout)?);
        }

        Commands::Stats {
            manifest,
            raw,
            sixteen_bit,
            histograms,
        } => {
            let mut volume = load_volume(&manifest, &raw, sixteen_bit, 0)?;
            if let Some(dir) = &histograms {
                std::fs::create_dir_all(dir)?;
            }

            let strategies = [
                LutStrategy::Auto,
                LutStrategy::Auto2 {
                    config: AutoContrastConfig::default(),
                },
                default_lut(),
                LutStrategy::BestFit,
            ];

            println!(
                "{:<4} {:<20} {:>5} {:>5} {:>12} | LUT bounds: {}",
                "#",
                "Channel",
                "Min",
                "Max",
                "Foreground",
                strategies
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" / ")
            );
            println!("{:-<100}", "");

            let names: Vec<String> = volume.channel_names().map(str::to_string).collect();
            for (index, name) in names.iter().enumerate() {
                if !volume.is_channel_loaded(index)? {
                    println!("{:<4} {:<20} (not loaded)", index, name);
                    continue;
                }
                let histogram = volume.histogram(index)?.clone();
                let bounds: Vec<String> = strategies
                    .iter()
                    .map(|s| {
                        let (lo, hi) = histogram.generate(s).bounds();
                        format!("{lo}-{hi}")
                    })
                    .collect();
                println!(
                    "{:<4} {:<20} {:>5} {:>5} {:>12} | {}",
                    index,
                    name,
                    histogram.data_min(),
                    histogram.data_max(),
                    histogram.non_background_count(),
                    bounds.join(" / ")
                );

                if let Some(dir) = &histograms {
                    let path = dir.join(format!("{index}_{name}.csv"));
                    DataFileWriter::create(&path)?.write_histogram_csv(&histogram)?;
                }
            }
        }

        Commands::Fuse {
            manifest,
            output,
            raw,
            sixteen_bit,
            settings,
            mode,
            mask,
            mask_alpha,
            luts,
            workers,
        } => {
            let start = Instant::now();
            let mut volume = load_volume(&manifest, &raw, sixteen_bit, workers)?;

            let mut view = match &settings {
                Some(path) => serde_json::from_reader(std::io::BufReader::new(
                    std::fs::File::open(path)?,
                ))?,
                None => ViewSettings::new(),
            };
            if view.default_lut.is_none() {
                view.default_lut = Some(default_lut());
            }
            if let Some(mode) = mode {
                view.fusion_mode = Some(mode.into());
            }
            if let Some(mask) = &mask {
                view.mask_channel = Some(resolve_channel(&volume, mask)?);
                view.mask_alpha = Some(mask_alpha);
            }
            volume.apply_settings(&view)?;

            let fused = volume.fuse()?;
            DataFileWriter::create(&output)?.write_fused_rgba(fused)?;
            let dims = fused.dims();
            let contributing = fused.contributing_channels();

            if let Some(path) = &luts {
                let names: Vec<&str> = volume.channel_names().collect();
                DataFileWriter::create(path)?.write_luts_csv(&names, &volume.channel_luts())?;
            }

            println!(
                "Fused {} of {} channels into {} ({} x {} x {} RGBA) in {:.2}s",
                contributing,
                volume.num_channels(),
                output.display(),
                dims.x,
                dims.y,
                dims.z,
                start.elapsed().as_secs_f64()
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_raw_arg() {
        let arg = parse_raw_arg("2=/tmp/ch2.raw").unwrap();
        assert_eq!(arg.channel, 2);
        assert_eq!(arg.path, PathBuf::from("/tmp/ch2.raw"));
        assert!(parse_raw_arg("nope").is_err());
        assert!(parse_raw_arg("x=a").is_err());
    }

    #[test]
    fn test_cli_parses_fuse() {
        let cli = Cli::try_parse_from([
            "voxatlas", "fuse", "cell.json", "-o", "out.rgba", "--mode", "avg", "--mask",
            "SEG_Memb", "--raw", "1=a.raw",
        ])
        .unwrap();
        match cli.command {
            Commands::Fuse {
                mode, mask, raw, ..
            } => {
                assert!(matches!(mode, Some(Mode::Avg)));
                assert_eq!(mask.as_deref(), Some("SEG_Memb"));
                assert_eq!(raw.len(), 1);
            }
            _ => panic!("expected fuse"),
        }
    }
}
