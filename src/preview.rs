//! False-color previews and charts.

use std::{fs::File, io::BufWriter, path::Path};

use itertools::iproduct;
use ndarray::{Array2, Array3};
use plotters::{
    prelude::{BitMapBackend, ChartBuilder, IntoDrawingArea, Rectangle},
    style::{Color, RGBColor, WHITE},
};
use serde_derive::*;

use crate::{
    error::{Error, Result},
    fluorescence::Histogram,
    raster::write_replacing,
};

/// Raw-count window used for thermal previews comparable across
/// captures.
pub const THERMAL_RAW_WINDOW: (f64, f64) = (13000., 18000.);

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Palette {
    Jet,
    Viridis,
}

impl Default for Palette {
    fn default() -> Self {
        Palette::Viridis
    }
}

const VIRIDIS: [[u8; 3]; 11] = [
    [0x44, 0x01, 0x54],
    [0x48, 0x24, 0x75],
    [0x41, 0x44, 0x87],
    [0x35, 0x5f, 0x8d],
    [0x2a, 0x78, 0x8e],
    [0x21, 0x91, 0x8c],
    [0x22, 0xa8, 0x84],
    [0x44, 0xbf, 0x70],
    [0x7a, 0xd1, 0x51],
    [0xbd, 0xdf, 0x26],
    [0xfd, 0xe7, 0x25],
];

impl Palette {
    /// Color of `t` in `[0, 1]`; values outside are clamped.
    pub fn color(self, t: f64) -> [u8; 3] {
        let t = if t.is_finite() { t.max(0.).min(1.) } else { 0. };
        match self {
            Palette::Jet => {
                let ch = |v: f64| (v.max(0.).min(1.) * 255.).round() as u8;
                [
                    ch(1.5 - (4. * t - 3.).abs()),
                    ch(1.5 - (4. * t - 2.).abs()),
                    ch(1.5 - (4. * t - 1.).abs()),
                ]
            }
            Palette::Viridis => {
                let pos = t * (VIRIDIS.len() - 1) as f64;
                let idx = (pos.floor() as usize).min(VIRIDIS.len() - 2);
                let frac = pos - idx as f64;
                let (lo, hi) = (VIRIDIS[idx], VIRIDIS[idx + 1]);
                let mut out = [0u8; 3];
                for c in 0..3 {
                    out[c] = (lo[c] as f64 + (hi[c] as f64 - lo[c] as f64) * frac).round() as u8;
                }
                out
            }
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(default)]
pub struct PreviewConfig {
    pub palette: Palette,
    /// Fixed normalization window; the grid's own range otherwise.
    pub window: Option<(f64, f64)>,
}

impl PreviewConfig {
    fn range(&self, grid: &Array2<f64>) -> (f64, f64) {
        if let Some(window) = self.window {
            return window;
        }
        grid.iter()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            })
    }

    /// Map `grid` to `[0, 1]`. A flat grid maps to zero.
    pub fn normalize(&self, grid: &Array2<f64>) -> Array2<f64> {
        let (lo, hi) = self.range(grid);
        let span = hi - lo;
        if !(span > 0.) {
            return Array2::zeros(grid.dim());
        }
        grid.mapv(|v| ((v - lo) / span).max(0.).min(1.))
    }

    /// `(rows, cols, 3)` RGB rendering of `grid`.
    pub fn colorize(&self, grid: &Array2<f64>) -> Array3<u8> {
        let norm = self.normalize(grid);
        let (ht, wid) = norm.dim();
        let mut out = Array3::zeros((ht, wid, 3));
        for (row, col) in iproduct!(0..ht, 0..wid) {
            let rgb = self.palette.color(norm[(row, col)]);
            for c in 0..3 {
                out[(row, col, c)] = rgb[c];
            }
        }
        out
    }
}

fn png_writer(
    path: &Path,
    wid: usize,
    ht: usize,
    color: png::ColorType,
) -> Result<png::Writer<BufWriter<File>>> {
    let file = BufWriter::new(File::create(path)?);
    let mut encoder = png::Encoder::new(file, wid as u32, ht as u32);
    encoder.set_color(color);
    encoder.set_depth(png::BitDepth::Eight);
    encoder
        .write_header()
        .map_err(|e| Error::raster_write(path, e))
}

fn write_png(path: &Path, (ht, wid): (usize, usize), color: png::ColorType, data: &[u8]) -> Result<()> {
    write_replacing(path, |scratch| {
        let mut writer = png_writer(scratch, wid, ht, color)?;
        writer
            .write_image_data(data)
            .map_err(|e| Error::raster_write(path, e))
    })
}

/// Write a false-color PNG of `grid`.
pub fn create_image(grid: &Array2<f64>, config: &PreviewConfig, path: &Path) -> Result<()> {
    let rgb = config.colorize(grid);
    let (ht, wid, _) = rgb.dim();
    write_png(
        path,
        (ht, wid),
        png::ColorType::RGB,
        &rgb.iter().copied().collect::<Vec<_>>(),
    )
}

pub fn write_grayscale_png(frame: &Array2<u8>, path: &Path) -> Result<()> {
    write_png(
        path,
        frame.dim(),
        png::ColorType::Grayscale,
        &frame.iter().copied().collect::<Vec<_>>(),
    )
}

const CHART_SIZE: (u32, u32) = (640, 480);
const BAR_FRACTION: f64 = 0.7;
const BAR_COLOR: RGBColor = RGBColor(0x21, 0x91, 0x8c);

type ChartResult = std::result::Result<(), Box<dyn std::error::Error>>;

fn draw_histogram(hist: &Histogram, path: &Path) -> ChartResult {
    let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let (lo, hi) = match (hist.edges.first(), hist.edges.last()) {
        (Some(&lo), Some(&hi)) if hi > lo => (lo, hi),
        _ => (0., 1.),
    };
    let peak = hist.counts.iter().copied().max().unwrap_or(0).max(1);

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(lo..hi, 0u64..peak + peak / 10 + 1)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc("Fv/Fm")
        .y_desc("count")
        .x_label_formatter(&|v| format!("{:.2}", v))
        .draw()?;

    let bars = hist
        .edges
        .windows(2)
        .zip(&hist.counts)
        .filter(|(_, &count)| count > 0)
        .map(|(w, &count)| {
            let center = (w[0] + w[1]) / 2.;
            let half = (w[1] - w[0]) * BAR_FRACTION / 2.;
            Rectangle::new([(center - half, 0), (center + half, count)], BAR_COLOR.filled())
        });
    chart.draw_series(bars)?;

    root.present()?;
    Ok(())
}

/// Bar chart of an Fv/Fm histogram, one bar per bin covering 70%
/// of its width.
pub fn render_histogram(hist: &Histogram, path: &Path) -> Result<()> {
    write_replacing(path, |scratch| {
        draw_histogram(hist, scratch).map_err(|e| Error::raster_write(path, e))
    })
}
