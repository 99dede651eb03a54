use crate::projection::Projection;
use crate::render::{parse_hex_color, OutputFormat};
use anyhow::{anyhow, ensure, Context, Result};
use clap::{Parser, ValueEnum};
use plotters::style::RGBColor;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_FEATURES_FILE: &str = "feature_sets/us_states.geo.json";
pub const DEFAULT_OUTPUT_FILE: &str = "heatmap.png";
pub const DEFAULT_NAME_PROPERTY: &str = "name";
pub const DEFAULT_HUE: f64 = 0.6;
pub const DEFAULT_WIDTH: u32 = 1000;
pub const DEFAULT_HEIGHT: u32 = 500;
// Largest accepted image side in pixels
pub const MAX_DIMENSION: u32 = 16_384;
pub const DEFAULT_BACKGROUND: &str = "#ffffff";
pub const DEFAULT_OUTLINE: &str = "#808080";

/// How a coordinate is laid out at the end of the key path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum LocationFormat {
    /// `[lat, lon]`, as in Gnip Activity Streams `geo.coordinates`
    LatLonArray,
    /// `[lon, lat]`, as in Twitter API `coordinates.coordinates`
    #[default]
    LonLatArray,
    /// `{"lat": .., "lon": ..}`
    LatLonDict,
}

/// Locate geotagged tweets in GeoJSON features and render a density heatmap.
///
/// A CSV summary of the tally is written to stdout.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Files containing tweets, one JSON encoded tweet per line ("-" reads stdin)
    #[arg(required = true, value_name = "DATA_FILE")]
    pub data_files: Vec<PathBuf>,

    /// Key path to the location coordinates within a tweet
    /// ("coordinates coordinates" for Twitter API tweets, "geo coordinates" for Gnip)
    #[arg(short, long, num_args = 1.., value_name = "KEY")]
    pub key_path: Option<Vec<String>>,

    /// Format of the coordinates within a tweet
    #[arg(short, long, value_enum)]
    pub location_format: Option<LocationFormat>,

    /// Map projection to use. Only these named projections are built in:
    /// albersUsa, aea, merc, eqc, sinu
    #[arg(short, long, value_enum)]
    pub projection: Option<Projection>,

    /// GeoJSON FeatureCollection containing the features to locate tweets in
    #[arg(short, long, value_name = "FILE")]
    pub features_file: Option<PathBuf>,

    /// Feature property holding the display name used in the report
    #[arg(short, long, value_name = "PROPERTY")]
    pub name_property: Option<String>,

    /// Hue of the heatmap fill, between 0 and 1
    #[arg(long, value_parser = parse_hue)]
    pub hue: Option<f64>,

    /// Path to write the heatmap image to; the format follows the extension
    #[arg(short, long, value_name = "FILE")]
    pub output_file: Option<PathBuf>,

    /// Image width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Image height in pixels
    #[arg(long)]
    pub height: Option<u32>,

    /// Optional TOML file supplying defaults for any of the options above
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,
}

fn parse_hue(s: &str) -> Result<f64, String> {
    let hue: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if (0.0..=1.0).contains(&hue) {
        Ok(hue)
    } else {
        Err(format!("hue must be between 0 and 1, got {hue}"))
    }
}

/// Contents of the optional TOML config file. Every key may be omitted.
#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub input: FileInputConfig,
    pub render: FileRenderConfig,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct FileInputConfig {
    pub key_path: Option<Vec<String>>,
    pub location_format: Option<LocationFormat>,
    pub features_file: Option<PathBuf>,
    pub name_property: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct FileRenderConfig {
    pub projection: Option<Projection>,
    pub hue: Option<f64>,
    pub output_file: Option<PathBuf>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub background: Option<String>, // Hex code
    pub outline: Option<String>,    // Hex code
}

impl FileConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: FileConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML configuration: {:?}", path))?;
        Ok(config)
    }
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    pub render: RenderConfig,
}

#[derive(Debug, Clone)]
pub struct InputConfig {
    pub data_files: Vec<PathBuf>,
    pub key_path: Vec<String>,
    pub location_format: LocationFormat,
    pub features_file: PathBuf,
    pub name_property: String,
}

#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub projection: Projection,
    pub hue: f64,
    pub output_file: PathBuf,
    pub output_format: OutputFormat,
    pub width: u32,
    pub height: u32,
    pub background: RGBColor,
    pub outline: RGBColor,
}

impl AppConfig {
    /// Merge command line arguments over the config file (if any) over built-in defaults.
    pub fn from_args(args: &Args) -> Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::load_from_file(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(args, file)
    }

    pub fn resolve(args: &Args, file: FileConfig) -> Result<Self> {
        let FileConfig { input, render } = file;

        let key_path = args
            .key_path
            .clone()
            .or(input.key_path)
            .unwrap_or_else(|| vec!["coordinates".to_string(), "coordinates".to_string()]);
        ensure!(!key_path.is_empty(), "Key path must contain at least one key");

        let hue = args.hue.or(render.hue).unwrap_or(DEFAULT_HUE);
        ensure!((0.0..=1.0).contains(&hue), "Hue must be between 0 and 1, got {}", hue);

        let width = args.width.or(render.width).unwrap_or(DEFAULT_WIDTH);
        let height = args.height.or(render.height).unwrap_or(DEFAULT_HEIGHT);
        ensure!(width > 0 && height > 0, "Image dimensions must be non-zero, got {}x{}", width, height);
        ensure!(
            width <= MAX_DIMENSION && height <= MAX_DIMENSION,
            "Image dimensions must be at most {}x{}, got {}x{}",
            MAX_DIMENSION,
            MAX_DIMENSION,
            width,
            height
        );

        let output_file = args
            .output_file
            .clone()
            .or(render.output_file)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_FILE));
        let output_format = OutputFormat::from_path(&output_file)?;

        let background = render.background.as_deref().unwrap_or(DEFAULT_BACKGROUND);
        let background = parse_hex_color(background)
            .map_err(|e| anyhow!("Invalid background color: {}", e))?;
        let outline = render.outline.as_deref().unwrap_or(DEFAULT_OUTLINE);
        let outline = parse_hex_color(outline)
            .map_err(|e| anyhow!("Invalid outline color: {}", e))?;

        Ok(AppConfig {
            input: InputConfig {
                data_files: args.data_files.clone(),
                key_path,
                location_format: args
                    .location_format
                    .or(input.location_format)
                    .unwrap_or_default(),
                features_file: args
                    .features_file
                    .clone()
                    .or(input.features_file)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_FEATURES_FILE)),
                name_property: args
                    .name_property
                    .clone()
                    .or(input.name_property)
                    .unwrap_or_else(|| DEFAULT_NAME_PROPERTY.to_string()),
            },
            render: RenderConfig {
                projection: args.projection.or(render.projection).unwrap_or_default(),
                hue,
                output_file,
                output_format,
                width,
                height,
                background,
                outline,
            },
        })
    }
}
