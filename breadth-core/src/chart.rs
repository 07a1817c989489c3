//! PNG chart of the breadth history.
//!
//! Both ratios are drawn against date on a fixed 0–100% axis:
//! `pct_declining` as a blue line with circle markers, `pct_volume_declining`
//! as an orange line with square markers, and the capitulation threshold as a
//! dashed red line. Dates where both ratios reach the threshold get a pale red
//! band. Titles, tick labels and the legend are drawn with the 8x8 bitmap
//! glyphs from `font8x8`, so no font file is needed at runtime.

use crate::breadth::{BreadthRecord, DEFAULT_THRESHOLD};
use crate::error::BreadthError;
use crate::store::BreadthSeries;
use chrono::NaiveDate;
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{ImageFormat, Rgb, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};

pub mod colors {
    use image::Rgb;

    pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
    pub const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
    pub const GRID: Rgb<u8> = Rgb([220, 220, 220]);
    pub const BLUE: Rgb<u8> = Rgb([31, 119, 180]);
    pub const ORANGE: Rgb<u8> = Rgb([255, 127, 14]);
    pub const RED: Rgb<u8> = Rgb([214, 39, 40]);
    pub const BAND: Rgb<u8> = Rgb([255, 228, 228]);
    pub const TEXT: Rgb<u8> = Rgb([34, 34, 34]);
}

/// Size and threshold of the rendered chart.
#[derive(Debug, Clone)]
pub struct ChartStyle {
    pub width: u32,
    pub height: u32,
    pub threshold: f64,
}

impl Default for ChartStyle {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 600,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

const MARGIN_LEFT: u32 = 76;
const MARGIN_RIGHT: u32 = 30;
const MARGIN_TOP: u32 = 64;
const MARGIN_BOTTOM: u32 = 112;
const MARKER_RADIUS: i32 = 4;

const TITLE: &str = "S&P 500 Market Breadth";
const X_TITLE: &str = "Date";
const Y_TITLE: &str = "Percentage (%)";
/// Glyph cell size in pixels at scale 1.
const GLYPH: u32 = 8;
/// Minimum horizontal gap between two date labels.
const DATE_LABEL_SPACING: u32 = GLYPH + 4;

/// Pixel geometry of the plot area.
#[derive(Debug, Clone, Copy)]
struct Layout {
    left: u32,
    right: u32,
    top: u32,
    bottom: u32,
    first: NaiveDate,
    span_days: i64,
}

impl Layout {
    fn new(style: &ChartStyle, first: NaiveDate, last: NaiveDate) -> Self {
        Self {
            left: MARGIN_LEFT,
            right: style.width.saturating_sub(MARGIN_RIGHT).max(MARGIN_LEFT + 1),
            top: MARGIN_TOP,
            bottom: style.height.saturating_sub(MARGIN_BOTTOM).max(MARGIN_TOP + 1),
            first,
            span_days: (last - first).num_days(),
        }
    }

    fn y_of(&self, pct: f64) -> u32 {
        let h = f64::from(self.bottom - self.top);
        let v = pct.clamp(0.0, 100.0);
        self.top + ((100.0 - v) / 100.0 * h).round() as u32
    }

    /// Dates are placed proportionally in calendar time; a single date is centred.
    fn x_of(&self, date: NaiveDate) -> u32 {
        let w = f64::from(self.right - self.left);
        if self.span_days <= 0 {
            return self.left + (w / 2.0).round() as u32;
        }
        let offset = (date - self.first).num_days() as f64 / self.span_days as f64;
        self.left + (offset * w).round() as u32
    }
}

/// Renders a [`BreadthSeries`] to a PNG at a fixed path.
#[derive(Debug, Clone)]
pub struct ChartRenderer {
    path: PathBuf,
    style: ChartStyle,
}

impl ChartRenderer {
    pub fn new(path: impl Into<PathBuf>, style: ChartStyle) -> Self {
        Self {
            path: path.into(),
            style,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Draw the chart in memory.
    pub fn render(&self, series: &BreadthSeries) -> Result<RgbImage, BreadthError> {
        let (Some(first), Some(last)) = (series.first(), series.last()) else {
            return Err(BreadthError::Render("breadth series is empty, nothing to plot".into()));
        };
        if self.style.width <= MARGIN_LEFT + MARGIN_RIGHT
            || self.style.height <= MARGIN_TOP + MARGIN_BOTTOM
        {
            return Err(BreadthError::Render(format!(
                "chart size {}x{} leaves no plot area",
                self.style.width, self.style.height
            )));
        }

        let layout = Layout::new(&self.style, first.date, last.date);
        let mut img = RgbImage::from_pixel(self.style.width, self.style.height, colors::WHITE);
        let records: Vec<&BreadthRecord> = series.records().collect();

        self.draw_capitulation_bands(&mut img, &layout, &records);
        draw_grid(&mut img, &layout);
        draw_date_ticks(&mut img, &layout, &records);

        let threshold_y = layout.y_of(self.style.threshold);
        draw_dashed_hline(&mut img, threshold_y, layout.left, layout.right, colors::RED);

        let declining: Vec<(u32, u32)> = records
            .iter()
            .map(|r| (layout.x_of(r.date), layout.y_of(r.pct_declining)))
            .collect();
        let volume: Vec<(u32, u32)> = records
            .iter()
            .map(|r| (layout.x_of(r.date), layout.y_of(r.pct_volume_declining)))
            .collect();

        draw_polyline(&mut img, &declining, colors::BLUE);
        for &(x, y) in &declining {
            draw_circle(&mut img, x, y, MARKER_RADIUS, colors::BLUE);
        }
        draw_polyline(&mut img, &volume, colors::ORANGE);
        for &(x, y) in &volume {
            draw_square(&mut img, x, y, MARKER_RADIUS, colors::ORANGE);
        }

        draw_frame(&mut img, &layout);
        draw_axis_labels(&mut img, &layout);
        draw_title(&mut img);
        draw_legend(&mut img, &layout, self.style.threshold);
        Ok(img)
    }

    /// Render and write the PNG, replacing any previous chart.
    pub fn render_to_file(&self, series: &BreadthSeries) -> Result<(), BreadthError> {
        let img = self.render(series)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                BreadthError::Render(format!("failed to create {}: {e}", parent.display()))
            })?;
        }

        let mut tmp_name = self.path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        let result = img
            .save_with_format(&tmp_path, ImageFormat::Png)
            .map_err(|e| BreadthError::Render(format!("write {}: {e}", tmp_path.display())))
            .and_then(|()| {
                fs::rename(&tmp_path, &self.path).map_err(|e| {
                    BreadthError::Render(format!("replace {}: {e}", self.path.display()))
                })
            });
        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        result?;

        tracing::info!(path = %self.path.display(), points = series.len(), "chart written");
        Ok(())
    }

    fn draw_capitulation_bands(&self, img: &mut RgbImage, layout: &Layout, records: &[&BreadthRecord]) {
        let plot_w = layout.right - layout.left;
        let half = (plot_w / (2 * records.len() as u32).max(1)).clamp(2, 12);
        for r in records.iter().filter(|r| r.is_capitulation(self.style.threshold)) {
            let x = layout.x_of(r.date);
            let x0 = x.saturating_sub(half).max(layout.left);
            let x1 = (x + half).min(layout.right);
            fill_rect(img, x0, layout.top, x1 - x0, layout.bottom - layout.top, colors::BAND);
        }
    }
}

fn draw_grid(img: &mut RgbImage, layout: &Layout) {
    for pct in (0..=100).step_by(20) {
        let y = layout.y_of(f64::from(pct));
        draw_hline(img, y, layout.left, layout.right, colors::GRID);
        // y-axis tick
        draw_hline(img, y, layout.left.saturating_sub(6), layout.left, colors::BLACK);
    }
}

/// Tick under each plotted date (thinned to at most 60), each labelled with
/// its ISO date reading upwards, skipping labels that would overlap.
fn draw_date_ticks(img: &mut RgbImage, layout: &Layout, records: &[&BreadthRecord]) {
    const MAX_TICKS: usize = 60;
    let step = records.len().div_ceil(MAX_TICKS).max(1);
    let mut last_label: Option<u32> = None;
    for r in records.iter().step_by(step) {
        let x = layout.x_of(r.date);
        draw_vline(img, x, layout.bottom, layout.bottom + 6, colors::BLACK);

        if last_label.is_some_and(|prev| x < prev + DATE_LABEL_SPACING) {
            continue;
        }
        let label = r.date.format("%Y-%m-%d").to_string();
        let top = layout.bottom + 10;
        draw_text_up(
            img,
            x.saturating_sub(GLYPH / 2),
            top + text_width(&label, 1) - 1,
            &label,
            colors::TEXT,
        );
        last_label = Some(x);
    }
}

fn draw_frame(img: &mut RgbImage, layout: &Layout) {
    draw_hline(img, layout.top, layout.left, layout.right, colors::BLACK);
    draw_hline(img, layout.bottom, layout.left, layout.right, colors::BLACK);
    draw_vline(img, layout.left, layout.top, layout.bottom, colors::BLACK);
    draw_vline(img, layout.right, layout.top, layout.bottom, colors::BLACK);
}

/// Percent labels on the y ticks, plus both axis titles.
fn draw_axis_labels(img: &mut RgbImage, layout: &Layout) {
    for pct in (0..=100).step_by(20) {
        let label = format!("{pct}%");
        let x = layout.left.saturating_sub(10 + text_width(&label, 1));
        let y = layout.y_of(f64::from(pct)).saturating_sub(GLYPH / 2);
        draw_text(img, x, y, &label, 1, colors::TEXT);
    }

    let mid_y = layout.top + (layout.bottom - layout.top) / 2;
    draw_text_up(img, 6, mid_y + text_width(Y_TITLE, 1) / 2, Y_TITLE, colors::TEXT);

    let mid_x = layout.left + (layout.right - layout.left) / 2;
    let x = mid_x.saturating_sub(text_width(X_TITLE, 1) / 2);
    draw_text(img, x, layout.bottom + 96, X_TITLE, 1, colors::TEXT);
}

fn draw_title(img: &mut RgbImage) {
    let x = (img.width() / 2).saturating_sub(text_width(TITLE, 2) / 2);
    draw_text(img, x, 10, TITLE, 2, colors::TEXT);
}

/// Legend row below the title: swatch then label for each series and the threshold.
fn draw_legend(img: &mut RgbImage, layout: &Layout, threshold: f64) {
    let text_y = 40;
    let y = text_y + GLYPH / 2;
    let mut x = layout.left;

    let threshold_label = format!("{} Threshold", format_pct(threshold));
    let entries = [
        (colors::BLUE, Some(false), "% Declining"),
        (colors::ORANGE, Some(true), "% Volume Declining"),
        (colors::RED, None, threshold_label.as_str()),
    ];
    for (color, marker, label) in entries {
        match marker {
            Some(square) => {
                draw_thick_line(img, x, y, x + 30, y, color);
                if square {
                    draw_square(img, x + 15, y, MARKER_RADIUS, color);
                } else {
                    draw_circle(img, x + 15, y, MARKER_RADIUS, color);
                }
            }
            None => draw_dashed_hline(img, y, x, x + 30, color),
        }
        draw_text(img, x + 38, text_y, label, 1, colors::TEXT);
        x += 38 + text_width(label, 1) + 24;
    }
}

/// `80.0` as `80%`, `82.5` as `82.5%`.
fn format_pct(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}%")
    } else {
        format!("{value}%")
    }
}

// ── Text ────────────────────────────────────────────────────────────

fn glyph(c: char) -> [u8; 8] {
    BASIC_FONTS
        .get(c)
        .or_else(|| BASIC_FONTS.get('?'))
        .unwrap_or([0; 8])
}

fn text_width(text: &str, scale: u32) -> u32 {
    text.chars().count() as u32 * GLYPH * scale
}

/// Horizontal text with its top-left corner at `(x, y)`.
///
/// Glyph rows are bytes with bit 0 as the leftmost pixel.
fn draw_text(img: &mut RgbImage, x: u32, y: u32, text: &str, scale: u32, color: Rgb<u8>) {
    let scale = i64::from(scale.max(1));
    for (i, c) in text.chars().enumerate() {
        let origin_x = i64::from(x) + i as i64 * i64::from(GLYPH) * scale;
        for (row, bits) in glyph(c).iter().enumerate() {
            for col in 0..8i64 {
                if bits & (1 << col) == 0 {
                    continue;
                }
                let px = origin_x + col * scale;
                let py = i64::from(y) + row as i64 * scale;
                for dy in 0..scale {
                    for dx in 0..scale {
                        put(img, px + dx, py + dy, color);
                    }
                }
            }
        }
    }
}

/// Text turned a quarter counter-clockwise, read bottom to top.
///
/// `(x, y)` is the bottom-left corner of the first character.
fn draw_text_up(img: &mut RgbImage, x: u32, y: u32, text: &str, color: Rgb<u8>) {
    for (i, c) in text.chars().enumerate() {
        for (row, bits) in glyph(c).iter().enumerate() {
            for col in 0..8i64 {
                if bits & (1 << col) != 0 {
                    let along = i as i64 * i64::from(GLYPH) + col;
                    put(img, i64::from(x) + row as i64, i64::from(y) - along, color);
                }
            }
        }
    }
}

// ── Pixel helpers ───────────────────────────────────────────────────

fn put(img: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}

fn fill_rect(img: &mut RgbImage, x: u32, y: u32, width: u32, height: u32, color: Rgb<u8>) {
    for dy in 0..height {
        for dx in 0..width {
            put(img, i64::from(x + dx), i64::from(y + dy), color);
        }
    }
}

fn draw_hline(img: &mut RgbImage, y: u32, x1: u32, x2: u32, color: Rgb<u8>) {
    let (start, end) = if x1 < x2 { (x1, x2) } else { (x2, x1) };
    for x in start..=end {
        put(img, i64::from(x), i64::from(y), color);
    }
}

fn draw_vline(img: &mut RgbImage, x: u32, y1: u32, y2: u32, color: Rgb<u8>) {
    let (start, end) = if y1 < y2 { (y1, y2) } else { (y2, y1) };
    for y in start..=end {
        put(img, i64::from(x), i64::from(y), color);
    }
}

/// Two pixels thick, 8 on / 6 off, starting solid at `x1`.
fn draw_dashed_hline(img: &mut RgbImage, y: u32, x1: u32, x2: u32, color: Rgb<u8>) {
    for x in x1..=x2 {
        if (x - x1) % 14 < 8 {
            put(img, i64::from(x), i64::from(y), color);
            put(img, i64::from(x), i64::from(y) + 1, color);
        }
    }
}

/// Bresenham line.
fn draw_line(img: &mut RgbImage, x1: u32, y1: u32, x2: u32, y2: u32, color: Rgb<u8>) {
    let (x1, y1, x2, y2) = (i64::from(x1), i64::from(y1), i64::from(x2), i64::from(y2));
    let dx = (x2 - x1).abs();
    let dy = (y2 - y1).abs();
    let sx = if x1 < x2 { 1 } else { -1 };
    let sy = if y1 < y2 { 1 } else { -1 };
    let mut err = dx - dy;
    let (mut x, mut y) = (x1, y1);

    loop {
        put(img, x, y, color);
        if x == x2 && y == y2 {
            break;
        }
        let e2 = 2 * err;
        if e2 > -dy {
            err -= dy;
            x += sx;
        }
        if e2 < dx {
            err += dx;
            y += sy;
        }
    }
}

fn draw_thick_line(img: &mut RgbImage, x1: u32, y1: u32, x2: u32, y2: u32, color: Rgb<u8>) {
    draw_line(img, x1, y1, x2, y2, color);
    draw_line(img, x1, y1 + 1, x2, y2 + 1, color);
}

fn draw_polyline(img: &mut RgbImage, points: &[(u32, u32)], color: Rgb<u8>) {
    for pair in points.windows(2) {
        let ((x1, y1), (x2, y2)) = (pair[0], pair[1]);
        draw_thick_line(img, x1, y1, x2, y2, color);
    }
}

fn draw_circle(img: &mut RgbImage, cx: u32, cy: u32, r: i32, color: Rgb<u8>) {
    let r = i64::from(r);
    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy <= r * r {
                put(img, i64::from(cx) + dx, i64::from(cy) + dy, color);
            }
        }
    }
}

fn draw_square(img: &mut RgbImage, cx: u32, cy: u32, r: i32, color: Rgb<u8>) {
    let r = i64::from(r);
    for dy in -r..=r {
        for dx in -r..=r {
            put(img, i64::from(cx) + dx, i64::from(cy) + dy, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn rec(date: &str, a: f64, b: f64) -> BreadthRecord {
        BreadthRecord {
            date: d(date),
            pct_declining: a,
            pct_volume_declining: b,
        }
    }

    fn renderer(path: impl Into<PathBuf>) -> ChartRenderer {
        ChartRenderer::new(path, ChartStyle::default())
    }

    #[test]
    fn empty_series_is_render_error() {
        let err = renderer("unused.png").render(&BreadthSeries::new()).unwrap_err();
        assert!(matches!(err, BreadthError::Render(_)));
    }

    #[test]
    fn image_has_configured_size() {
        let series: BreadthSeries = [rec("2025-04-03", 20.0, 30.0)].into_iter().collect();
        let style = ChartStyle {
            width: 640,
            height: 320,
            ..ChartStyle::default()
        };
        let img = ChartRenderer::new("unused.png", style).render(&series).unwrap();
        assert_eq!(img.dimensions(), (640, 320));
    }

    #[test]
    fn threshold_line_is_drawn_in_red() {
        let series: BreadthSeries = [rec("2025-04-03", 20.0, 30.0), rec("2025-04-04", 25.0, 35.0)]
            .into_iter()
            .collect();
        let img = renderer("unused.png").render(&series).unwrap();
        let layout = Layout::new(&ChartStyle::default(), d("2025-04-03"), d("2025-04-04"));
        let y = layout.y_of(80.0);
        assert_eq!(*img.get_pixel(layout.left + 2, y), colors::RED);
        // gap in the dash pattern
        assert_ne!(*img.get_pixel(layout.left + 10, y), colors::RED);
    }

    #[test]
    fn markers_sit_on_their_values() {
        let series: BreadthSeries = [rec("2025-04-03", 20.0, 60.0), rec("2025-04-07", 40.0, 70.0)]
            .into_iter()
            .collect();
        let img = renderer("unused.png").render(&series).unwrap();
        let layout = Layout::new(&ChartStyle::default(), d("2025-04-03"), d("2025-04-07"));

        let x_last = layout.x_of(d("2025-04-07"));
        assert_eq!(x_last, layout.right);
        assert_eq!(*img.get_pixel(x_last - 1, layout.y_of(40.0)), colors::BLUE);
        assert_eq!(*img.get_pixel(x_last - 1, layout.y_of(70.0)), colors::ORANGE);
    }

    #[test]
    fn capitulation_day_gets_a_band() {
        let series: BreadthSeries = [rec("2025-04-03", 20.0, 20.0), rec("2025-04-04", 95.0, 90.0)]
            .into_iter()
            .collect();
        let img = renderer("unused.png").render(&series).unwrap();
        let layout = Layout::new(&ChartStyle::default(), d("2025-04-03"), d("2025-04-04"));
        let x = layout.x_of(d("2025-04-04")) - 5;
        assert_eq!(*img.get_pixel(x, layout.y_of(50.0)), colors::BAND);
    }

    #[test]
    fn single_point_is_centred() {
        let layout = Layout::new(&ChartStyle::default(), d("2025-04-03"), d("2025-04-03"));
        let mid = layout.left + (layout.right - layout.left) / 2;
        assert!(layout.x_of(d("2025-04-03")).abs_diff(mid) <= 1);
    }

    fn text_pixels(img: &RgbImage, x0: u32, y0: u32, x1: u32, y1: u32) -> usize {
        (y0..y1)
            .flat_map(|y| (x0..x1).map(move |x| (x, y)))
            .filter(|&(x, y)| *img.get_pixel(x, y) == colors::TEXT)
            .count()
    }

    #[test]
    fn glyphs_follow_the_bitmap_font() {
        let mut img = RgbImage::from_pixel(8, 8, colors::WHITE);
        draw_text(&mut img, 0, 0, "1", 1, colors::TEXT);
        let bits = BASIC_FONTS.get('1').unwrap();
        for (row, byte) in bits.iter().enumerate() {
            for col in 0..8u32 {
                let lit = byte & (1 << col) != 0;
                assert_eq!(*img.get_pixel(col, row as u32) == colors::TEXT, lit);
            }
        }
    }

    #[test]
    fn upright_text_turns_counter_clockwise() {
        let mut flat = RgbImage::from_pixel(16, 8, colors::WHITE);
        let mut turned = RgbImage::from_pixel(8, 16, colors::WHITE);
        draw_text(&mut flat, 0, 0, "7%", 1, colors::TEXT);
        draw_text_up(&mut turned, 0, 15, "7%", colors::TEXT);
        for y in 0..8 {
            for x in 0..16 {
                assert_eq!(flat.get_pixel(x, y), turned.get_pixel(y, 15 - x));
            }
        }
    }

    #[test]
    fn axes_title_and_legend_are_labelled() {
        let series: BreadthSeries = [rec("2025-04-03", 20.0, 30.0), rec("2025-04-07", 85.0, 90.0)]
            .into_iter()
            .collect();
        let img = renderer("unused.png").render(&series).unwrap();
        let layout = Layout::new(&ChartStyle::default(), d("2025-04-03"), d("2025-04-07"));

        // "100%" and "0%" left of the axis
        let y100 = layout.y_of(100.0);
        assert!(text_pixels(&img, 20, y100 - 4, layout.left - 8, y100 + 4) > 0);
        let y0 = layout.y_of(0.0);
        assert!(text_pixels(&img, 20, y0 - 4, layout.left - 8, y0 + 4) > 0);
        // "20%" label sits on its own gridline, not between
        let y50 = layout.y_of(50.0);
        assert_eq!(text_pixels(&img, 20, y50 - 3, layout.left - 8, y50 + 3), 0);

        // rotated ISO date under the first and last ticks
        for date in [d("2025-04-03"), d("2025-04-07")] {
            let x = layout.x_of(date);
            let labelled = text_pixels(&img, x - 4, layout.bottom + 10, x + 4, layout.bottom + 90);
            assert!(labelled > 20, "no date label at {date}");
        }

        // title, legend row and axis titles
        assert!(text_pixels(&img, 0, 8, 1200, 28) > 50);
        assert!(text_pixels(&img, layout.left, 38, 1200, 50) > 50);
        assert!(text_pixels(&img, 0, layout.top, 16, layout.bottom) > 20);
        assert!(text_pixels(&img, layout.left, layout.bottom + 94, layout.right, 600) > 0);
    }

    #[test]
    fn crowded_dates_skip_overlapping_labels() {
        let series: BreadthSeries = (0..300)
            .map(|i| BreadthRecord {
                date: d("2024-01-01") + chrono::Duration::days(i),
                pct_declining: 50.0,
                pct_volume_declining: 50.0,
            })
            .collect();
        let style = ChartStyle {
            width: 400,
            ..ChartStyle::default()
        };
        let img = ChartRenderer::new("unused.png", style.clone()).render(&series).unwrap();
        let layout = Layout::new(&style, d("2024-01-01"), d("2024-10-26"));

        // columns holding label pixels never form runs wider than one glyph
        let lit: Vec<bool> = (layout.left - 4..layout.right + 4)
            .map(|x| text_pixels(&img, x, layout.bottom + 10, x + 1, layout.bottom + 90) > 0)
            .collect();
        let mut run = 0;
        for on in lit {
            run = if on { run + 1 } else { 0 };
            assert!(run <= GLYPH as usize);
        }
    }

    #[test]
    fn threshold_label_formats_whole_and_fractional_values() {
        assert_eq!(format_pct(80.0), "80%");
        assert_eq!(format_pct(82.5), "82.5%");
    }

    #[test]
    fn writes_png_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("charts/market_trend.png");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"stale").unwrap();

        let series: BreadthSeries = [rec("2025-04-03", 20.0, 30.0)].into_iter().collect();
        renderer(&path).render_to_file(&series).unwrap();

        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
        let decoded = image::open(&path).unwrap();
        assert_eq!(decoded.width(), 1200);
    }

    #[test]
    fn unwritable_target_is_render_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"a file, not a directory").unwrap();

        let series: BreadthSeries = [rec("2025-04-03", 20.0, 30.0)].into_iter().collect();
        let err = renderer(blocker.join("chart.png")).render_to_file(&series).unwrap_err();
        assert!(matches!(err, BreadthError::Render(_)));
    }
}
