//! Rasterizer Module
//!
//! The pagination engine works on bitmaps, not on markup. A [`Rasterizer`]
//! turns a region of the report (a run of sections) into one tall RGB bitmap
//! and reports where each section starts.
//!
//! [`TableRasterizer`] is the headless implementation: it draws the form as
//! bordered tables straight into an `image` buffer and renders text with
//! `rusttype` when a TrueType font is configured.

use crate::report::Section;
use anyhow::{Context, Result, anyhow};
use image::{Rgb, RgbImage};
use log::{debug, warn};
use rusttype::{Font, Scale, point};
use std::fs;
use std::path::Path;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BORDER: Rgb<u8> = Rgb([0, 0, 0]);
const TITLE_FILL: Rgb<u8> = Rgb([220, 220, 220]);
const EMPHASIS_FILL: Rgb<u8> = Rgb([242, 242, 242]);
const TEXT: Rgb<u8> = Rgb([20, 20, 20]);

/// The part of the report to rasterize.
pub struct RegionDescriptor<'a> {
    pub sections: Vec<&'a Section>,
    pub width_px: u32,
}

/// Top offset of a section inside a rasterized region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionOffset {
    pub id: &'static str,
    pub top: u32,
}

/// A rasterized region plus its logical section boundaries.
pub struct RasterizedRegion {
    pub bitmap: RgbImage,
    pub section_offsets: Vec<SectionOffset>,
}

impl RasterizedRegion {
    pub fn offset_of(&self, id: &str) -> Option<u32> {
        self.section_offsets
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.top)
    }
}

/// Capability that renders a region of the report to a bitmap.
pub trait Rasterizer {
    fn render(&self, region: &RegionDescriptor<'_>) -> Result<RasterizedRegion>;
}

/// Pixel metrics of the table layout.
#[derive(Debug, Clone)]
pub struct TableStyle {
    pub font_px: f32,
    pub line_height_px: u32,
    pub cell_padding_px: u32,
    pub section_gap_px: u32,
    /// Fraction of the width taken by the index column.
    pub index_column: f32,
    /// Fraction of the width taken by the label column.
    pub label_column: f32,
}

impl Default for TableStyle {
    fn default() -> Self {
        Self {
            font_px: 15.0,
            line_height_px: 20,
            cell_padding_px: 6,
            section_gap_px: 14,
            index_column: 0.07,
            label_column: 0.43,
        }
    }
}

/// Draws sections as bordered three-column tables.
pub struct TableRasterizer {
    font: Option<Font<'static>>,
    style: TableStyle,
}

struct CellLayout {
    index: Vec<String>,
    label: Vec<String>,
    value: Vec<String>,
    height: u32,
    emphasis: bool,
}

impl TableRasterizer {
    /// Grid-only rasterizer; text is not drawn.
    pub fn without_font() -> Self {
        Self {
            font: None,
            style: TableStyle::default(),
        }
    }

    pub fn with_font_file(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read font file {:?}", path))?;
        let font = Font::try_from_vec(bytes)
            .ok_or_else(|| anyhow!("Unsupported or corrupt font file {:?}", path))?;
        Ok(Self {
            font: Some(font),
            style: TableStyle::default(),
        })
    }

    /// Uses `path` when given; falls back to a grid-only rasterizer otherwise.
    pub fn from_optional_font(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::with_font_file(path),
            None => {
                warn!("No font configured; report pages will contain table borders only.");
                Ok(Self::without_font())
            }
        }
    }

    pub fn with_style(mut self, style: TableStyle) -> Self {
        self.style = style;
        self
    }

    fn text_width(&self, text: &str) -> f32 {
        match &self.font {
            Some(font) => {
                let scale = Scale::uniform(self.style.font_px);
                text.chars()
                    .map(|c| font.glyph(c).scaled(scale).h_metrics().advance_width)
                    .sum()
            }
            // Without metrics, assume an average glyph of half an em.
            None => text.chars().count() as f32 * self.style.font_px * 0.5,
        }
    }

    /// Greedy word wrap to `width` pixels. Always yields at least one line.
    fn wrap(&self, text: &str, width: u32) -> Vec<String> {
        let mut lines = Vec::new();
        let mut current = String::new();
        for word in text.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{current} {word}")
            };
            if !current.is_empty() && self.text_width(&candidate) > width as f32 {
                lines.push(std::mem::replace(&mut current, word.to_string()));
            } else {
                current = candidate;
            }
        }
        if !current.is_empty() || lines.is_empty() {
            lines.push(current);
        }
        lines
    }

    fn columns(&self, width: u32) -> (u32, u32) {
        let index_end = (width as f32 * self.style.index_column) as u32;
        let label_end = index_end + (width as f32 * self.style.label_column) as u32;
        (index_end, label_end)
    }

    fn layout_rows(&self, section: &Section, width: u32) -> Vec<CellLayout> {
        let (index_end, label_end) = self.columns(width);
        let pad = self.style.cell_padding_px;
        let inner = |w: u32| w.saturating_sub(2 * pad).max(1);

        section
            .rows
            .iter()
            .map(|row| {
                let index = self.wrap(row.index.as_deref().unwrap_or(""), inner(index_end));
                let label = self.wrap(&row.label, inner(label_end - index_end));
                let value = self.wrap(&row.value, inner(width - label_end));
                let lines = index.len().max(label.len()).max(value.len()) as u32;
                CellLayout {
                    height: lines * self.style.line_height_px + 2 * pad,
                    index,
                    label,
                    value,
                    emphasis: row.emphasis,
                }
            })
            .collect()
    }

    fn draw_text(&self, canvas: &mut RgbImage, text: &str, x: u32, top: u32) {
        let Some(font) = &self.font else {
            return;
        };
        let scale = Scale::uniform(self.style.font_px);
        let ascent = font.v_metrics(scale).ascent;
        let (width, height) = canvas.dimensions();

        for glyph in font.layout(text, scale, point(x as f32, top as f32 + ascent)) {
            let Some(bb) = glyph.pixel_bounding_box() else {
                continue;
            };
            glyph.draw(|gx, gy, coverage| {
                let px = gx as i32 + bb.min.x;
                let py = gy as i32 + bb.min.y;
                if px < 0 || py < 0 || px as u32 >= width || py as u32 >= height {
                    return;
                }
                let pixel = canvas.get_pixel_mut(px as u32, py as u32);
                for (channel, ink) in pixel.0.iter_mut().zip(TEXT.0) {
                    *channel = (*channel as f32 * (1.0 - coverage) + ink as f32 * coverage) as u8;
                }
            });
        }
    }

    fn draw_lines(&self, canvas: &mut RgbImage, lines: &[String], x: u32, top: u32) {
        for (i, line) in lines.iter().enumerate() {
            let y = top + self.style.cell_padding_px + i as u32 * self.style.line_height_px;
            self.draw_text(canvas, line, x + self.style.cell_padding_px, y);
        }
    }
}

fn fill_rect(canvas: &mut RgbImage, x0: u32, y0: u32, x1: u32, y1: u32, color: Rgb<u8>) {
    let (width, height) = canvas.dimensions();
    for y in y0..y1.min(height) {
        for x in x0..x1.min(width) {
            canvas.put_pixel(x, y, color);
        }
    }
}

fn hline(canvas: &mut RgbImage, y: u32) {
    let width = canvas.width();
    fill_rect(canvas, 0, y, width, y + 1, BORDER);
}

fn vline(canvas: &mut RgbImage, x: u32, y0: u32, y1: u32) {
    fill_rect(canvas, x, y0, x + 1, y1, BORDER);
}

impl Rasterizer for TableRasterizer {
    fn render(&self, region: &RegionDescriptor<'_>) -> Result<RasterizedRegion> {
        let width = region.width_px;
        if width < 100 {
            return Err(anyhow!("Raster width of {}px is too narrow for the report table", width));
        }

        let title_height = self.style.line_height_px + 2 * self.style.cell_padding_px;
        let layouts: Vec<(&Section, Vec<CellLayout>)> = region
            .sections
            .iter()
            .map(|section| (*section, self.layout_rows(section, width)))
            .collect();

        let total_height: u32 = layouts
            .iter()
            .map(|(_, rows)| {
                title_height + rows.iter().map(|r| r.height).sum::<u32>() + self.style.section_gap_px
            })
            .sum::<u32>()
            .max(1);

        let mut canvas = RgbImage::from_pixel(width, total_height, WHITE);
        let (index_end, label_end) = self.columns(width);
        let mut offsets = Vec::with_capacity(layouts.len());
        let mut y = 0u32;

        for (section, rows) in &layouts {
            offsets.push(SectionOffset { id: section.id, top: y });
            let table_top = y;

            fill_rect(&mut canvas, 0, y, width, y + title_height, TITLE_FILL);
            hline(&mut canvas, y);
            self.draw_text(
                &mut canvas,
                &section.title,
                self.style.cell_padding_px,
                y + self.style.cell_padding_px,
            );
            y += title_height;

            for row in rows {
                hline(&mut canvas, y);
                if row.emphasis {
                    fill_rect(&mut canvas, index_end + 1, y + 1, width - 1, y + row.height, EMPHASIS_FILL);
                }
                vline(&mut canvas, index_end, y, y + row.height);
                vline(&mut canvas, label_end, y, y + row.height);
                self.draw_lines(&mut canvas, &row.index, 0, y);
                self.draw_lines(&mut canvas, &row.label, index_end, y);
                self.draw_lines(&mut canvas, &row.value, label_end, y);
                y += row.height;
            }

            hline(&mut canvas, y.min(total_height - 1));
            vline(&mut canvas, 0, table_top, y);
            vline(&mut canvas, width - 1, table_top, y);
            y += self.style.section_gap_px;
        }

        debug!(
            "Rasterized {} sections into a {}x{} bitmap.",
            layouts.len(),
            width,
            total_height
        );
        Ok(RasterizedRegion {
            bitmap: canvas,
            section_offsets: offsets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_resolver::resolve;
    use crate::report::render;
    use serde_json::json;

    fn is_black_row(bitmap: &RgbImage, y: u32) -> bool {
        (0..bitmap.width()).all(|x| *bitmap.get_pixel(x, y) == BORDER)
    }

    #[test]
    fn offsets_follow_section_order() {
        let report = render(&resolve(&json!({})));
        let region = RegionDescriptor {
            sections: report.flow_sections().collect(),
            width_px: 800,
        };
        let raster = TableRasterizer::without_font().render(&region).unwrap();

        let ids: Vec<&str> = raster.section_offsets.iter().map(|s| s.id).collect();
        assert_eq!(ids, ["general", "property", "apartment", "locality", "valuationDetails", "marketValue"]);
        assert_eq!(raster.section_offsets[0].top, 0);
        assert!(raster.section_offsets.windows(2).all(|w| w[0].top < w[1].top));
        assert!(raster.offset_of("valuationDetails").unwrap() < raster.bitmap.height());
    }

    #[test]
    fn every_section_starts_with_a_border_row() {
        let report = render(&resolve(&json!({})));
        let region = RegionDescriptor {
            sections: report.flow_sections().collect(),
            width_px: 640,
        };
        let raster = TableRasterizer::without_font().render(&region).unwrap();
        for offset in &raster.section_offsets {
            assert!(is_black_row(&raster.bitmap, offset.top), "{}", offset.id);
        }
    }

    #[test]
    fn long_values_wrap_onto_more_lines() {
        let rasterizer = TableRasterizer::without_font();
        assert_eq!(rasterizer.wrap("", 100), vec![String::new()]);
        assert_eq!(rasterizer.wrap("short", 400).len(), 1);
        let long = "word ".repeat(60);
        assert!(rasterizer.wrap(&long, 200).len() > 5);
    }

    #[test]
    fn narrow_regions_are_rejected() {
        let report = render(&resolve(&json!({})));
        let region = RegionDescriptor {
            sections: report.flow_sections().collect(),
            width_px: 40,
        };
        assert!(TableRasterizer::without_font().render(&region).is_err());
    }

    #[test]
    fn missing_font_file_is_an_error() {
        let result = TableRasterizer::with_font_file(Path::new("/nonexistent/font.ttf"));
        assert!(result.is_err());
    }
}
