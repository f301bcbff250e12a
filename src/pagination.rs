//! Pagination Engine Module
//!
//! Slices the tall bitmap of the flowing report region into page-sized pieces.
//!
//! Page breaks are chosen by a single top-to-bottom scan:
//! - a named forced-break section always starts at the top of a page, so the
//!   page before it is cut short the first time the scan reaches it;
//! - otherwise the naive cutoff is moved up to the nearest table border row
//!   found in the last stretch of the page, so table rows are not split;
//! - a leftover smaller than the minimal visible height produces no page.
//!
//! Border rows are detected from pixels: a row counts as a border when enough
//! of its pixels are dark. This is a heuristic; when pixels cannot be read
//! the naive cutoff is used instead.

use crate::raster::RasterizedRegion;
use image::{GenericImageView, Rgb, RgbImage, imageops};
use log::{debug, info};

/// Tunables of the pagination scan, in pixels of the flow bitmap.
#[derive(Debug, Clone)]
pub struct PaginationConfig {
    /// Content height of one page.
    pub page_content_height_px: u32,
    /// How far above the naive cutoff to look for a border row.
    pub border_window_px: u32,
    /// Luma below which a pixel counts as dark.
    pub dark_threshold: u8,
    /// Share of dark pixels that makes a row a border.
    pub border_density: f32,
    /// Leftover content below this height is not worth a page.
    pub min_visible_px: u32,
    /// Band at the top and bottom of inner pages where borders are emphasized.
    pub emphasis_band_px: u32,
    /// A physical page holding at most this much content is reused for the
    /// next full-page region instead of opening a new page.
    pub min_content_px: u32,
}

impl PaginationConfig {
    pub fn for_page_height(page_content_height_px: u32) -> Self {
        Self {
            page_content_height_px,
            border_window_px: (page_content_height_px / 6).max(1),
            ..Self::default()
        }
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_content_height_px: 1100,
            border_window_px: 180,
            dark_threshold: 100,
            border_density: 0.6,
            min_visible_px: 10,
            emphasis_band_px: 4,
            min_content_px: 40,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOrigin {
    /// A slice of the continuously flowing region.
    Flow,
    /// A discretely declared region rendered as a page of its own.
    FullPage,
}

/// One page-sized bitmap.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub bitmap: RgbImage,
    pub height_px: u32,
    pub origin: PageOrigin,
}

impl RenderedPage {
    pub fn full_page(bitmap: RgbImage) -> Self {
        Self {
            height_px: bitmap.height(),
            bitmap,
            origin: PageOrigin::FullPage,
        }
    }
}

/// A vertical span `[start, end)` of the flow bitmap placed on one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSpan {
    pub start: u32,
    pub end: u32,
}

impl PageSpan {
    pub fn height(&self) -> u32 {
        self.end - self.start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Scanning,
    ForcedBreakPending { section_top: u32 },
    Done,
}

pub struct PaginationEngine {
    config: PaginationConfig,
}

impl PaginationEngine {
    pub fn new(config: PaginationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PaginationConfig {
        &self.config
    }

    /// Slices the flow region into pages, honoring the forced-break sections.
    pub fn paginate(&self, region: &RasterizedRegion, forced_sections: &[&str]) -> Vec<RenderedPage> {
        let forced_offsets: Vec<u32> = region
            .section_offsets
            .iter()
            .filter(|s| forced_sections.contains(&s.id))
            .map(|s| s.top)
            .collect();

        let spans = self.page_spans(&region.bitmap, &forced_offsets);
        let last = spans.len().saturating_sub(1);
        let width = region.bitmap.width();

        let pages: Vec<RenderedPage> = spans
            .iter()
            .enumerate()
            .map(|(i, span)| {
                let mut bitmap = imageops::crop_imm(&region.bitmap, 0, span.start, width, span.height()).to_image();
                if i > 0 && i < last {
                    self.emphasize_borders(&mut bitmap);
                }
                RenderedPage {
                    bitmap,
                    height_px: span.height(),
                    origin: PageOrigin::Flow,
                }
            })
            .collect();

        info!(
            "Paginated a {}px flow region into {} pages.",
            region.bitmap.height(),
            pages.len()
        );
        pages
    }

    /// Decides the page spans of `bitmap`.
    ///
    /// `forced_offsets` are the top rows of sections that must start a page.
    /// The strip left above a forced section gets no page of its own when it
    /// is shorter than `min_visible_px`, or blank and no taller than
    /// `min_content_px`.
    pub fn page_spans(&self, bitmap: &RgbImage, forced_offsets: &[u32]) -> Vec<PageSpan> {
        let total = bitmap.height();
        let page_height = self.config.page_content_height_px.max(1);

        let mut forced: Vec<u32> = forced_offsets.to_vec();
        forced.sort_unstable();
        forced.dedup();
        let mut triggered = vec![false; forced.len()];

        let mut spans = Vec::new();
        let mut offset = 0u32;
        let mut state = ScanState::Scanning;

        loop {
            match state {
                ScanState::Scanning => {
                    if total.saturating_sub(offset) < self.config.min_visible_px {
                        state = ScanState::Done;
                        continue;
                    }
                    let naive = offset.saturating_add(page_height).min(total);

                    // A forced section already at the page top needs no break.
                    for (i, top) in forced.iter().enumerate() {
                        if *top == offset {
                            triggered[i] = true;
                        }
                    }

                    let pending = forced
                        .iter()
                        .enumerate()
                        .find(|(i, top)| !triggered[*i] && **top > offset && **top < naive)
                        .map(|(i, top)| (i, *top));

                    if let Some((i, section_top)) = pending {
                        triggered[i] = true;
                        if !self.is_negligible_strip(bitmap, offset, section_top) {
                            spans.push(PageSpan { start: offset, end: section_top });
                        }
                        state = ScanState::ForcedBreakPending { section_top };
                        continue;
                    }

                    let cut = if naive >= total {
                        total
                    } else {
                        self.row_safe_cut(bitmap, offset, naive)
                    };
                    spans.push(PageSpan { start: offset, end: cut });
                    offset = cut;
                }
                ScanState::ForcedBreakPending { section_top } => {
                    debug!("Forced page break before the section at {}px.", section_top);
                    offset = section_top;
                    state = ScanState::Scanning;
                }
                ScanState::Done => break,
            }
        }

        spans
    }

    fn is_negligible_strip(&self, bitmap: &RgbImage, start: u32, end: u32) -> bool {
        let height = end - start;
        if height < self.config.min_visible_px {
            return true;
        }
        height <= self.config.min_content_px && !has_dark_pixel(bitmap, start, end, self.config.dark_threshold)
    }

    /// The break offset for a page spanning `[offset, naive)`, moved up to the
    /// nearest border row when one lies within the search window.
    fn row_safe_cut(&self, bitmap: &RgbImage, offset: u32, naive: u32) -> u32 {
        let window_start = naive
            .saturating_sub(self.config.border_window_px)
            .max(offset + 1);
        match find_border_row(bitmap, window_start, naive, self.config.dark_threshold, self.config.border_density) {
            // Keep the border line at the bottom of the current page.
            Some(row) => row + 1,
            None => naive,
        }
    }

    /// Paints border rows near the top and bottom edges of a page black.
    pub fn emphasize_borders(&self, page: &mut RgbImage) {
        let height = page.height();
        let band = self.config.emphasis_band_px.min(height);
        let rows = (0..band).chain(height.saturating_sub(band)..height);
        for y in rows {
            if is_border_row(page, y, self.config.dark_threshold, self.config.border_density) == Some(true) {
                for x in 0..page.width() {
                    page.put_pixel(x, y, Rgb([0, 0, 0]));
                }
            }
        }
    }
}

fn luma(pixel: &Rgb<u8>) -> u32 {
    let [r, g, b] = pixel.0;
    (299 * r as u32 + 587 * g as u32 + 114 * b as u32) / 1000
}

/// Whether row `y` is a border row; `None` when the row cannot be read.
pub fn is_border_row(bitmap: &RgbImage, y: u32, dark_threshold: u8, density: f32) -> Option<bool> {
    let width = bitmap.width();
    if width == 0 {
        return None;
    }
    let mut dark = 0u32;
    for x in 0..width {
        let pixel = bitmap.get_pixel_checked(x, y)?;
        if luma(pixel) < dark_threshold as u32 {
            dark += 1;
        }
    }
    Some(dark as f32 >= width as f32 * density)
}

/// Whether any pixel in rows `[from, to)` is dark. Unreadable rows count as dark.
fn has_dark_pixel(bitmap: &RgbImage, from: u32, to: u32, dark_threshold: u8) -> bool {
    (from..to).any(|y| {
        (0..bitmap.width()).any(|x| match bitmap.get_pixel_checked(x, y) {
            Some(pixel) => luma(pixel) < dark_threshold as u32,
            None => true,
        })
    })
}

/// The lowest border row in `[from, to)`, scanning upwards from `to`.
///
/// Returns `None` when no border row exists in the window or when pixels
/// cannot be read; callers fall back to their naive cutoff.
pub fn find_border_row(bitmap: &RgbImage, from: u32, to: u32, dark_threshold: u8, density: f32) -> Option<u32> {
    if !bitmap.in_bounds(0, to.saturating_sub(1)) {
        debug!("Border scan window ends below the bitmap; using the naive cutoff.");
        return None;
    }
    for y in (from..to).rev() {
        match is_border_row(bitmap, y, dark_threshold, density) {
            Some(true) => return Some(y),
            Some(false) => continue,
            None => {
                debug!("Could not read pixel row {}; using the naive cutoff.", y);
                return None;
            }
        }
    }
    None
}

/// Pages as they will be printed; a physical page may carry several pieces.
#[derive(Debug, Clone, Default)]
pub struct PhysicalPage {
    pub pieces: Vec<RenderedPage>,
}

impl PhysicalPage {
    pub fn content_px(&self) -> u32 {
        self.pieces.iter().map(|p| p.height_px).sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PagePlan {
    pub pages: Vec<PhysicalPage>,
}

impl PagePlan {
    /// One physical page per flow page.
    pub fn from_flow(pages: Vec<RenderedPage>) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|page| PhysicalPage { pieces: vec![page] })
                .collect(),
        }
    }

    /// Appends a discrete full-page region. The current page is reused when
    /// it carries no more than `min_content_px` of content.
    pub fn append_full_page(&mut self, page: RenderedPage, min_content_px: u32) {
        match self.pages.last_mut() {
            Some(current) if current.content_px() <= min_content_px => current.pieces.push(page),
            _ => self.pages.push(PhysicalPage { pieces: vec![page] }),
        }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
