use crate::config::RenderConfig;
use crate::projection::Projection;
use crate::tally::Tally;
use crate::types::Region;
use anyhow::{anyhow, Context, Result};
use geo::{Area, Polygon};
use image::{DynamicImage, ImageFormat, RgbImage};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::HSLColor;
use std::path::Path;
use tracing::info;

// Share of each image dimension left empty around the map
const PADDING: f64 = 0.05;

const RASTER_FORMATS: [ImageFormat; 5] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Bmp,
    ImageFormat::Gif,
    ImageFormat::Tiff,
];

/// Image encoding chosen from the output file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Svg,
    Raster(ImageFormat),
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|s| s.to_lowercase())
            .ok_or_else(|| anyhow!("Output file {:?} has no extension to pick an image format from", path))?;

        if extension == "svg" {
            return Ok(OutputFormat::Svg);
        }
        ImageFormat::from_extension(&extension)
            .filter(|f| RASTER_FORMATS.contains(f))
            .map(OutputFormat::Raster)
            .ok_or_else(|| {
                anyhow!(
                    "Unsupported output format: {} (use svg, png, jpg, bmp, gif or tiff)",
                    extension
                )
            })
    }
}

pub fn parse_hex_color(hex: &str) -> Result<RGBColor, String> {
    let digits = hex.trim_start_matches('#');
    if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("expected #rrggbb, got {:?}", hex));
    }
    let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).map_err(|e| e.to_string());
    Ok(RGBColor(channel(0)?, channel(2)?, channel(4)?))
}

/// Fill for a feature: white at zero, the fully saturated hue at `max_count`.
pub fn fill_color(count: u64, max_count: u64, hue: f64) -> RGBColor {
    let c = if max_count == 0 {
        0.0
    } else {
        (count as f64 / max_count as f64).clamp(0.0, 1.0)
    };
    let lightness = 0.5 + (1.0 - c) / 2.0;
    let (r, g, b) = HSLColor(hue, 1.0, lightness).to_backend_color().rgb;
    RGBColor(r, g, b)
}

type Ring = Vec<(f64, f64)>;

struct ProjectedPolygon {
    exterior: Ring,
    interiors: Vec<Ring>,
}

struct ProjectedRegion {
    fill: RGBColor,
    polygons: Vec<ProjectedPolygon>,
}

/// Maps projected meters onto pixels, keeping the aspect ratio.
#[derive(Debug, Clone, Copy)]
struct Frame {
    scale: f64,
    center: (f64, f64),
    size: (u32, u32),
}

impl Frame {
    fn fit(bounds: Option<(f64, f64, f64, f64)>, size: (u32, u32)) -> Self {
        let Some((min_x, min_y, max_x, max_y)) = bounds else {
            return Frame { scale: 1.0, center: (0.0, 0.0), size };
        };
        let usable_w = size.0 as f64 * (1.0 - 2.0 * PADDING);
        let usable_h = size.1 as f64 * (1.0 - 2.0 * PADDING);
        let span_x = max_x - min_x;
        let span_y = max_y - min_y;
        let scale = match (span_x > 0.0, span_y > 0.0) {
            (true, true) => (usable_w / span_x).min(usable_h / span_y),
            (true, false) => usable_w / span_x,
            (false, true) => usable_h / span_y,
            (false, false) => 1.0,
        };
        Frame {
            scale,
            center: ((min_x + max_x) / 2.0, (min_y + max_y) / 2.0),
            size,
        }
    }

    fn to_pixel(&self, (x, y): (f64, f64)) -> (i32, i32) {
        let px = self.size.0 as f64 / 2.0 + (x - self.center.0) * self.scale;
        let py = self.size.1 as f64 / 2.0 - (y - self.center.1) * self.scale;
        (px.round() as i32, py.round() as i32)
    }

    fn ring(&self, ring: &Ring) -> Vec<(i32, i32)> {
        ring.iter().map(|&p| self.to_pixel(p)).collect()
    }
}

fn project_ring(projection: Projection, ring: &geo::LineString<f64>) -> Ring {
    ring.coords().map(|c| projection.project(c.x, c.y)).collect()
}

fn exterior_area(polygon: &Polygon<f64>) -> f64 {
    Polygon::new(polygon.exterior().clone(), vec![]).unsigned_area()
}

/// Project every drawable feature and order them largest first, so features
/// sitting inside another feature's hole are painted after it.
fn project_regions(
    regions: &[Region],
    tally: &Tally,
    config: &RenderConfig,
) -> (Vec<ProjectedRegion>, Option<(f64, f64, f64, f64)>) {
    let max_count = tally.max_count();
    let mut ordered: Vec<(&Region, f64)> = regions
        .iter()
        .filter(|r| !r.is_empty())
        .map(|r| (r, r.geometry.iter().map(exterior_area).sum::<f64>()))
        .collect();
    ordered.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.index.cmp(&b.0.index)));

    let mut bounds: Option<(f64, f64, f64, f64)> = None;
    let mut extend = |(x, y): (f64, f64)| {
        if !x.is_finite() || !y.is_finite() {
            return;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((a, b, c, d)) => (a.min(x), b.min(y), c.max(x), d.max(y)),
        });
    };

    let projected = ordered
        .into_iter()
        .map(|(region, _)| {
            let polygons = region
                .geometry
                .iter()
                .map(|polygon| {
                    let exterior = project_ring(config.projection, polygon.exterior());
                    exterior.iter().copied().for_each(&mut extend);
                    ProjectedPolygon {
                        exterior,
                        interiors: polygon
                            .interiors()
                            .iter()
                            .map(|ring| project_ring(config.projection, ring))
                            .collect(),
                    }
                })
                .collect();
            ProjectedRegion {
                fill: fill_color(tally.counts[region.index], max_count, config.hue),
                polygons,
            }
        })
        .collect();

    (projected, bounds)
}

fn draw_error<E: std::fmt::Debug>(e: E) -> anyhow::Error {
    anyhow!("Failed to draw heatmap: {:?}", e)
}

fn draw<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    regions: &[ProjectedRegion],
    frame: &Frame,
    config: &RenderConfig,
) -> Result<()> {
    root.fill(&config.background).map_err(draw_error)?;

    // 1. Fills, with holes cut back out to the background
    for region in regions {
        for polygon in &region.polygons {
            root.draw(&plotters::element::Polygon::new(frame.ring(&polygon.exterior), region.fill.filled()))
                .map_err(draw_error)?;
            for hole in &polygon.interiors {
                root.draw(&plotters::element::Polygon::new(frame.ring(hole), config.background.filled()))
                    .map_err(draw_error)?;
            }
        }
    }

    // 2. Outlines on top
    let stroke = config.outline.stroke_width(1);
    for region in regions {
        for polygon in &region.polygons {
            root.draw(&PathElement::new(frame.ring(&polygon.exterior), stroke))
                .map_err(draw_error)?;
            for hole in &polygon.interiors {
                root.draw(&PathElement::new(frame.ring(hole), stroke)).map_err(draw_error)?;
            }
        }
    }

    root.present().map_err(draw_error)?;
    Ok(())
}

/// Draw every feature colored by its tally and write the image to `config.output_file`.
pub fn render_heatmap(config: &RenderConfig, regions: &[Region], tally: &Tally) -> Result<()> {
    let (projected, bounds) = project_regions(regions, tally, config);
    let size = (config.width, config.height);
    let frame = Frame::fit(bounds, size);
    info!(
        "Rendering {} features with the {:?} projection to {:?}",
        projected.len(),
        config.projection,
        config.output_file
    );

    match config.output_format {
        OutputFormat::Svg => {
            let root = SVGBackend::new(&config.output_file, size).into_drawing_area();
            draw(&root, &projected, &frame, config)?;
        }
        OutputFormat::Raster(format) => {
            let mut buf = vec![0u8; config.width as usize * config.height as usize * 3];
            {
                let root = BitMapBackend::with_buffer(&mut buf, size).into_drawing_area();
                draw(&root, &projected, &frame, config)?;
            }
            let rgb = RgbImage::from_raw(config.width, config.height, buf)
                .ok_or_else(|| anyhow!("Rendered buffer does not match image size"))?;
            let image = match format {
                // The GIF encoder wants RGBA input
                ImageFormat::Gif => DynamicImage::ImageRgba8(DynamicImage::ImageRgb8(rgb).into_rgba8()),
                _ => DynamicImage::ImageRgb8(rgb),
            };
            image
                .save_with_format(&config.output_file, format)
                .with_context(|| format!("Failed to save heatmap: {:?}", config.output_file))?;
        }
    }

    info!("Heatmap written to {:?}", config.output_file);
    Ok(())
}
