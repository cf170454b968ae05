use std::io::Cursor;
use std::ops::Range;

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use plotters::prelude::*;

use crate::analysis::error::{Result, StabilityError};
use crate::analysis::trace::TraceRecord;

#[derive(Clone, Debug)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    pub background: RGBColor,
    pub palette: Vec<RGBColor>,
    pub log_x: bool,
    pub log_y: bool,
}

impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            width: 900,
            height: 400,
            background: RGBColor(10, 10, 10),
            palette: vec![BLUE, RED, GREEN, CYAN, MAGENTA, YELLOW, WHITE],
            log_x: false,
            log_y: false,
        }
    }
}

impl PlotStyle {
    /// Allan traces are read on log-log axes.
    pub fn log_log() -> Self {
        Self {
            log_x: true,
            log_y: true,
            ..Self::default()
        }
    }
}

/// Maps a value onto the plotted axis; `None` when it cannot sit on a log axis.
fn axis(value: f64, log: bool) -> Option<f64> {
    match (log, value.is_finite()) {
        (_, false) => None,
        (true, _) if value <= 0.0 => None,
        (true, _) => Some(value.log10()),
        (false, _) => Some(value),
    }
}

/// Padded bounds of `values`; a flat set gets a unit-wide window.
fn bounds(values: impl Iterator<Item = f64>) -> Option<Range<f64>> {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !lo.is_finite() || !hi.is_finite() {
        return None;
    }
    if (hi - lo).abs() < f64::EPSILON {
        return Some(lo - 0.5..hi + 0.5);
    }
    let pad = (hi - lo) * 0.05;
    Some(lo - pad..hi + pad)
}

struct Projected {
    points: Vec<(f64, f64)>,
    bars: Vec<(f64, f64, f64, f64)>, // x, low, y, high
}

fn project(record: &TraceRecord, style: &PlotStyle) -> Projected {
    let mut out = Projected {
        points: Vec::with_capacity(record.len()),
        bars: Vec::new(),
    };
    let errors = record.y_error.iter().copied().chain(std::iter::repeat(0.0));
    for ((&x, &y), err) in record.x_values.iter().zip(&record.y_values).zip(errors) {
        let (Some(px), Some(py)) = (axis(x, style.log_x), axis(y, style.log_y)) else {
            continue;
        };
        out.points.push((px, py));
        if err > 0.0 {
            let low = axis(y - err, style.log_y).unwrap_or(py);
            let high = axis(y + err, style.log_y).unwrap_or(py);
            out.bars.push((px, low, py, high));
        }
    }
    out
}

/// Renders trace records as one PNG, each record in the next palette colour.
pub fn render_trace_png(records: &[TraceRecord], style: PlotStyle) -> Result<Vec<u8>> {
    let projected: Vec<Projected> = records.iter().map(|r| project(r, &style)).collect();
    let x_range = bounds(projected.iter().flat_map(|p| p.points.iter().map(|q| q.0)));
    let y_range = bounds(projected.iter().flat_map(|p| {
        p.points
            .iter()
            .map(|q| q.1)
            .chain(p.bars.iter().flat_map(|b| [b.1, b.3]))
    }));
    let (Some(x_range), Some(y_range)) = (x_range, y_range) else {
        return Err(StabilityError::Plot("no plottable points".into()));
    };
    if style.palette.is_empty() {
        return Err(StabilityError::Plot("palette is empty".into()));
    }

    let mut buffer = vec![0u8; (style.width * style.height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .build_cartesian_2d(x_range, y_range)?;
        chart
            .configure_mesh()
            .light_line_style(WHITE.mix(0.1))
            .bold_line_style(WHITE.mix(0.2))
            .draw()?;
        for (idx, trace) in projected.iter().enumerate() {
            let color = style.palette[idx % style.palette.len()];
            chart.draw_series(LineSeries::new(trace.points.iter().copied(), &color))?;
            chart.draw_series(
                trace
                    .bars
                    .iter()
                    .map(|&(x, low, y, high)| ErrorBar::new_vertical(x, low, y, high, color, 6)),
            )?;
        }
        root.present()?;
    }
    encode_png(&buffer, style.width, style.height)
}

fn encode_png(buffer: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let image = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, buffer.to_vec())
        .ok_or_else(|| StabilityError::Plot("failed to allocate image buffer".into()))?;
    let mut output = Vec::new();
    let dynamic = DynamicImage::ImageRgb8(image);
    dynamic.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}
