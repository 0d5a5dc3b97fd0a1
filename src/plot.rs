//! pLDDT scatter plots and PAE heatmaps rendered with plotters' SVG backend.
//!
//! SVG output keeps the crate free of system font dependencies.

use camino::Utf8PathBuf;
use plotters::coord::Shift;
use plotters::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AlphaPickleError;
use crate::export::write_atomic;
use crate::matrix::Matrix;
use crate::record::{Artifact, MetadataRecord};

pub const DEFAULT_PLOT_SIZE: f64 = 12.0;
pub const DEFAULT_LABEL_INCREMENT: usize = 100;
const PIXELS_PER_INCH: f64 = 100.0;
const MAX_HEATMAP_CELLS: usize = 256;
const FONT: &str = "sans-serif";

const PLDDT_COLORS: [(u8, u8, u8); 5] = [
    (255, 0, 0),
    (255, 165, 0),
    (255, 255, 0),
    (100, 149, 237),
    (0, 0, 255),
];
const VIRIDIS: [(u8, u8, u8); 5] = [
    (68, 1, 84),
    (59, 82, 139),
    (33, 145, 140),
    (94, 201, 98),
    (253, 231, 37),
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlotOptions {
    /// Figure width in inches.
    pub size_inches: f64,
    /// Spacing of residue-axis labels.
    pub label_increment: usize,
}

impl Default for PlotOptions {
    fn default() -> Self {
        Self {
            size_inches: DEFAULT_PLOT_SIZE,
            label_increment: DEFAULT_LABEL_INCREMENT,
        }
    }
}

impl PlotOptions {
    pub fn validate(&self) -> Result<(), String> {
        if !self.size_inches.is_finite() || self.size_inches <= 0.0 {
            return Err(format!("plot size must be positive, got {}", self.size_inches));
        }
        if self.label_increment == 0 {
            return Err("axis label increment must be at least 1".to_string());
        }
        Ok(())
    }

    fn pixels(&self) -> u32 {
        (self.size_inches * PIXELS_PER_INCH).round().max(1.0) as u32
    }

    fn ticks(&self, residues: usize) -> Vec<i32> {
        (0..residues)
            .step_by(self.label_increment.max(1))
            .map(|tick| tick as i32)
            .collect()
    }
}

pub fn write_plddt_plot(
    record: &MetadataRecord,
    options: &PlotOptions,
) -> Result<Utf8PathBuf, AlphaPickleError> {
    let plddt = record.residue_confidence().ok_or_else(|| {
        AlphaPickleError::Plot(format!("{} has no pLDDT values", record.output_basename()))
    })?;
    let svg = render_plddt_svg(plddt, options)?;
    let path = record.artifact_path(Artifact::PlddtPlot);
    write_atomic(&path, |out| {
        out.write_all(svg.as_bytes())
            .map_err(|err| AlphaPickleError::Plot(err.to_string()))
    })?;
    debug!(path = %path, residues = plddt.len(), "rendered pLDDT plot");
    Ok(path)
}

pub fn write_pae_plot(
    record: &MetadataRecord,
    options: &PlotOptions,
) -> Result<Utf8PathBuf, AlphaPickleError> {
    let pae = record.pairwise_error().ok_or_else(|| {
        AlphaPickleError::Plot(format!("{} has no PAE matrix", record.output_basename()))
    })?;
    let svg = render_pae_svg(pae, options)?;
    let path = record.artifact_path(Artifact::PaePlot);
    write_atomic(&path, |out| {
        out.write_all(svg.as_bytes())
            .map_err(|err| AlphaPickleError::Plot(err.to_string()))
    })?;
    debug!(path = %path, residues = pae.rows(), "rendered PAE plot");
    Ok(path)
}

pub fn render_plddt_svg(plddt: &[f64], options: &PlotOptions) -> Result<String, AlphaPickleError> {
    let width = options.pixels();
    let mut svg = String::new();
    {
        let root =
            SVGBackend::with_string(&mut svg, (width, (width / 2).max(1))).into_drawing_area();
        draw_plddt(&root, plddt, options).map_err(plot_error)?;
        root.present().map_err(plot_error)?;
    }
    Ok(svg)
}

pub fn render_pae_svg(pae: &Matrix, options: &PlotOptions) -> Result<String, AlphaPickleError> {
    let size = options.pixels();
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (size, size)).into_drawing_area();
        draw_pae(&root, pae, options).map_err(plot_error)?;
        root.present().map_err(plot_error)?;
    }
    Ok(svg)
}

fn draw_plddt<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    plddt: &[f64],
    options: &PlotOptions,
) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    root.fill(&WHITE)?;
    if plddt.is_empty() {
        return draw_placeholder(root, "No pLDDT values");
    }

    let (width, _) = root.dim_in_pixel();
    let (plot_area, scale_area) = root.split_horizontally(width * 7 / 8);
    let residues = plddt.len() as i32;
    let (low, high) = plddt
        .iter()
        .fold((0.0f64, 100.0f64), |(low, high), value| (low.min(*value), high.max(*value)));

    let mut chart = ChartBuilder::on(&plot_area)
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(
            (-1..residues + 1).with_key_points(options.ticks(plddt.len())),
            low..high,
        )?;
    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("Residue index")
        .y_desc("Predicted LDDT")
        .axis_desc_style((FONT, 16))
        .draw()?;
    chart.draw_series(plddt.iter().enumerate().map(|(index, value)| {
        Circle::new(
            (index as i32, *value),
            2,
            ramp(&PLDDT_COLORS, *value / 100.0).filled(),
        )
    }))?;

    draw_color_scale(&scale_area, &PLDDT_COLORS, 0.0, 100.0, "Predicted LDDT")
}

fn draw_pae<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    pae: &Matrix,
    options: &PlotOptions,
) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    root.fill(&WHITE)?;
    let Some((low, high)) = pae.min_max() else {
        return draw_placeholder(root, "No PAE values");
    };

    let (width, _) = root.dim_in_pixel();
    let (plot_area, scale_area) = root.split_horizontally(width * 7 / 8);
    let residues = pae.rows() as i32;
    // Row 0 is drawn at the top: y coordinates run from `residues` down to 0.
    let y_ticks = options
        .ticks(pae.rows())
        .into_iter()
        .map(|tick| residues - tick)
        .collect::<Vec<_>>();

    let mut chart = ChartBuilder::on(&plot_area)
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(
            (0..residues).with_key_points(options.ticks(pae.cols())),
            (0..residues).with_key_points(y_ticks),
        )?;
    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("Residue index")
        .y_desc("Residue index")
        .y_label_formatter(&|y| (residues - *y).to_string())
        .axis_desc_style((FONT, 16))
        .draw()?;

    let cells = block_average(pae, MAX_HEATMAP_CELLS);
    let span = high - low;
    chart.draw_series(cells.into_iter().map(|cell| {
        let t = if span > 0.0 { (cell.value - low) / span } else { 0.0 };
        Rectangle::new(
            [
                (cell.col_start as i32, residues - cell.row_start as i32),
                (cell.col_end as i32, residues - cell.row_end as i32),
            ],
            ramp(&VIRIDIS, t).filled(),
        )
    }))?;

    draw_color_scale(&scale_area, &VIRIDIS, low, high, "Predicted error (Å)")
}

fn draw_color_scale<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    colors: &[(u8, u8, u8)],
    low: f64,
    high: f64,
    label: &str,
) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    let high = if high > low { high } else { low + 1.0 };
    let mut chart = ChartBuilder::on(area)
        .margin_top(60)
        .margin_bottom(80)
        .margin_right(10)
        .y_label_area_size(50)
        .build_cartesian_2d(0.0f64..1.0f64, low..high)?;
    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(0)
        .y_desc(label)
        .axis_desc_style((FONT, 14))
        .draw()?;

    let steps = 100;
    let step = (high - low) / steps as f64;
    chart.draw_series((0..steps).map(|index| {
        let from = low + step * index as f64;
        Rectangle::new(
            [(0.0, from), (1.0, from + step)],
            ramp(colors, (index as f64 + 0.5) / steps as f64).filled(),
        )
    }))?;
    Ok(())
}

fn draw_placeholder<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    message: &str,
) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    let (width, height) = root.dim_in_pixel();
    root.draw(&Text::new(
        message.to_string(),
        (width as i32 / 2, height as i32 / 2),
        (FONT, 20).into_font().color(&BLACK),
    ))
}

/// Linear interpolation between evenly spaced anchor colours; `t` is clipped to `[0, 1]`.
fn ramp(colors: &[(u8, u8, u8)], t: f64) -> RGBColor {
    let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
    let segments = colors.len().saturating_sub(1).max(1);
    let position = t * segments as f64;
    let index = (position.floor() as usize).min(segments - 1);
    let local = position - index as f64;
    let (from, to) = (colors[index], colors[(index + 1).min(colors.len() - 1)]);
    let mix = |a: u8, b: u8| (f64::from(a) + (f64::from(b) - f64::from(a)) * local).round() as u8;
    RGBColor(mix(from.0, to.0), mix(from.1, to.1), mix(from.2, to.2))
}

#[derive(Debug, Clone, PartialEq)]
struct HeatmapCell {
    row_start: usize,
    row_end: usize,
    col_start: usize,
    col_end: usize,
    value: f64,
}

/// Averages square blocks so neither axis has more than `max_cells` cells.
fn block_average(matrix: &Matrix, max_cells: usize) -> Vec<HeatmapCell> {
    let longest = matrix.rows().max(matrix.cols());
    let block = longest.div_ceil(max_cells.max(1)).max(1);
    let mut cells = Vec::new();
    for row_start in (0..matrix.rows()).step_by(block) {
        let row_end = (row_start + block).min(matrix.rows());
        for col_start in (0..matrix.cols()).step_by(block) {
            let col_end = (col_start + block).min(matrix.cols());
            let mut sum = 0.0;
            for row in row_start..row_end {
                sum += matrix.row(row)[col_start..col_end].iter().sum::<f64>();
            }
            let count = (row_end - row_start) * (col_end - col_start);
            cells.push(HeatmapCell {
                row_start,
                row_end,
                col_start,
                col_end,
                value: sum / count as f64,
            });
        }
    }
    cells
}

fn plot_error<E: std::error::Error + Send + Sync>(
    err: DrawingAreaErrorKind<E>,
) -> AlphaPickleError {
    AlphaPickleError::Plot(err.to_string())
}
