//! Document Builder Module
//!
//! Assembles the paginated report bitmaps and the gallery images into the
//! final PDF: fixed margins, a header and a page number on every page, grid
//! and single-image gallery pages at the end.

use crate::image_loader::LoadedImage;
use crate::pagination::{PageOrigin, PagePlan, PhysicalPage};
use crate::report::GalleryLayout;
use anyhow::{Context, Result};
use image::{ImageOutputFormat, RgbImage};
use log::info;
use pdf_writer::{Content, Filter, Finish, Name, Pdf, Rect, Ref, Str};
use std::fs;
use std::io::Cursor;
use std::path::PathBuf;

// Standard PDF page sizes in points (1/72 inch).
const A4_WIDTH_PT: f32 = 595.0;
const A4_HEIGHT_PT: f32 = 842.0;

const FONT_NAME: Name<'static> = Name(b"Helvetica");
const HEADER_FONT_SIZE: f32 = 9.0;
const GALLERY_TITLE_SIZE: f32 = 11.0;

const GRID_COLUMNS: usize = 2;
const GRID_ROWS: usize = 3;
const GRID_GAP_PT: f32 = 10.0;

pub fn mm_to_pt(mm: f32) -> f32 {
    mm * 72.0 / 25.4
}

/// Physical page size and margins.
#[derive(Debug, Clone)]
pub struct PageGeometry {
    pub width_pt: f32,
    pub height_pt: f32,
    /// Top and bottom margin of flow pages, reserved for header and footer.
    pub flow_vertical_margin_pt: f32,
    pub side_margin_pt: f32,
    /// Margin on every side of discrete full pages.
    pub full_page_margin_pt: f32,
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self {
            width_pt: A4_WIDTH_PT,
            height_pt: A4_HEIGHT_PT,
            flow_vertical_margin_pt: mm_to_pt(20.0),
            side_margin_pt: mm_to_pt(12.0),
            full_page_margin_pt: mm_to_pt(12.0),
        }
    }
}

impl PageGeometry {
    pub fn flow_content_width_pt(&self) -> f32 {
        self.width_pt - 2.0 * self.side_margin_pt
    }

    pub fn flow_content_height_pt(&self) -> f32 {
        self.height_pt - 2.0 * self.flow_vertical_margin_pt
    }

    /// Height in bitmap pixels that fills one flow page, for a bitmap
    /// `bitmap_width_px` wide stretched across the content width.
    pub fn flow_content_height_px(&self, bitmap_width_px: u32) -> u32 {
        let px_per_pt = bitmap_width_px as f32 / self.flow_content_width_pt();
        (self.flow_content_height_pt() * px_per_pt).floor() as u32
    }
}

/// A gallery page: one or up to six images.
#[derive(Debug, Clone)]
pub struct GalleryPage {
    pub title: String,
    pub layout: GalleryLayout,
    pub images: Vec<RgbImage>,
}

#[derive(Debug, Clone)]
pub enum AssembledPage {
    Report(PhysicalPage),
    Gallery(GalleryPage),
}

/// Everything the writer needs to produce the document.
#[derive(Debug, Clone)]
pub struct AssemblyPlan {
    pub title: String,
    pub subtitle: String,
    pub geometry: PageGeometry,
    pub pages: Vec<AssembledPage>,
}

impl AssemblyPlan {
    pub fn embedded_gallery_images(&self) -> usize {
        self.pages
            .iter()
            .map(|page| match page {
                AssembledPage::Gallery(gallery) => gallery.images.len(),
                AssembledPage::Report(_) => 0,
            })
            .sum()
    }
}

/// Capability that writes an assembled plan out as a document.
pub trait DocumentWriter {
    fn compose(&self, plan: &AssemblyPlan) -> Result<Vec<u8>>;
}

/// Builds the assembly plan from report pages and loaded gallery images.
pub struct DocumentAssembler {
    geometry: PageGeometry,
}

impl DocumentAssembler {
    pub fn new(geometry: PageGeometry) -> Self {
        Self { geometry }
    }

    pub fn geometry(&self) -> &PageGeometry {
        &self.geometry
    }

    pub fn plan(
        &self,
        title: &str,
        subtitle: &str,
        report: PagePlan,
        galleries: Vec<(String, GalleryLayout, Vec<LoadedImage>)>,
    ) -> AssemblyPlan {
        let mut pages: Vec<AssembledPage> = report.pages.into_iter().map(AssembledPage::Report).collect();

        for (gallery_title, layout, images) in galleries {
            let per_page = match layout {
                GalleryLayout::Grid => GRID_COLUMNS * GRID_ROWS,
                GalleryLayout::Single => 1,
            };
            let images: Vec<RgbImage> = images.into_iter().map(|loaded| loaded.image).collect();
            for chunk in images.chunks(per_page) {
                pages.push(AssembledPage::Gallery(GalleryPage {
                    title: gallery_title.clone(),
                    layout,
                    images: chunk.to_vec(),
                }));
            }
        }

        AssemblyPlan {
            title: title.to_string(),
            subtitle: subtitle.to_string(),
            geometry: self.geometry.clone(),
            pages,
        }
    }
}

/// The produced document.
#[derive(Debug, Clone)]
pub struct DocumentArtifact {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub page_count: usize,
    pub embedded_images: usize,
}

/// How the artifact reaches the user.
#[derive(Debug, Clone)]
pub enum Delivery {
    /// Save under `dir` with the generated file name.
    Download { dir: PathBuf },
    /// Write to the temp directory and hand back the path to open.
    Preview,
}

/// `valuation_<client>_<timestamp>.pdf`, with the client label reduced to
/// file-name-safe characters.
pub fn artifact_file_name(client_label: &str, timestamp_ms: i64) -> String {
    let safe: String = client_label
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    let safe = if safe.trim_matches('_').is_empty() { "report" } else { safe.as_str() };
    format!("valuation_{}_{}.pdf", safe, timestamp_ms)
}

/// Writes the artifact according to `delivery` and returns where it went.
pub fn deliver(artifact: &DocumentArtifact, delivery: &Delivery) -> Result<PathBuf> {
    let dir = match delivery {
        Delivery::Download { dir } => dir.clone(),
        Delivery::Preview => std::env::temp_dir(),
    };
    fs::create_dir_all(&dir).context("Failed to create PDF output directory")?;
    let path = dir.join(&artifact.file_name);
    info!("Writing PDF to {:?}", path);
    fs::write(&path, &artifact.bytes).context("Failed to write PDF file")?;
    Ok(path)
}

/// Writes PDFs with `pdf-writer`, embedding every bitmap as a JPEG.
pub struct PdfDocumentWriter {
    pub jpeg_quality: u8,
}

impl Default for PdfDocumentWriter {
    fn default() -> Self {
        Self { jpeg_quality: 85 }
    }
}

struct RefAlloc(i32);

impl RefAlloc {
    fn bump(&mut self) -> Ref {
        self.0 += 1;
        Ref::new(self.0)
    }
}

/// An image drawn at `rect` = (x, y, width, height) in PDF coordinates.
struct Placement<'a> {
    image: &'a RgbImage,
    rect: (f32, f32, f32, f32),
}

/// Scales `(w, h)` to fit inside `(max_w, max_h)`, keeping the aspect ratio.
fn fit(w: u32, h: u32, max_w: f32, max_h: f32) -> (f32, f32) {
    if w == 0 || h == 0 || max_w <= 0.0 || max_h <= 0.0 {
        return (0.0, 0.0);
    }
    let scale = (max_w / w as f32).min(max_h / h as f32);
    (w as f32 * scale, h as f32 * scale)
}

impl PdfDocumentWriter {
    fn report_placements<'a>(&self, page: &'a PhysicalPage, g: &PageGeometry) -> Vec<Placement<'a>> {
        let mut placements = Vec::new();
        // Distance from the top edge of the page.
        let mut cursor = g.flow_vertical_margin_pt;

        for (i, piece) in page.pieces.iter().enumerate() {
            let (x, w, h) = match piece.origin {
                PageOrigin::Flow => {
                    let w = g.flow_content_width_pt();
                    let h = piece.height_px as f32 * w / piece.bitmap.width().max(1) as f32;
                    (g.side_margin_pt, w, h)
                }
                PageOrigin::FullPage => {
                    if i == 0 {
                        cursor = g.full_page_margin_pt;
                    }
                    let max_w = g.width_pt - 2.0 * g.full_page_margin_pt;
                    let max_h = g.height_pt - cursor - g.full_page_margin_pt;
                    let (w, h) = fit(piece.bitmap.width(), piece.bitmap.height(), max_w, max_h);
                    ((g.width_pt - w) / 2.0, w, h)
                }
            };
            if w > 0.0 && h > 0.0 {
                placements.push(Placement {
                    image: &piece.bitmap,
                    rect: (x, g.height_pt - cursor - h, w, h),
                });
            }
            cursor += h;
        }
        placements
    }

    fn gallery_placements<'a>(&self, page: &'a GalleryPage, g: &PageGeometry) -> Vec<Placement<'a>> {
        let top = g.flow_vertical_margin_pt + GALLERY_TITLE_SIZE * 2.0;
        let area_w = g.flow_content_width_pt();
        let area_h = g.height_pt - top - g.flow_vertical_margin_pt;

        match page.layout {
            GalleryLayout::Grid => {
                let cell_w = (area_w - GRID_GAP_PT * (GRID_COLUMNS - 1) as f32) / GRID_COLUMNS as f32;
                let cell_h = (area_h - GRID_GAP_PT * (GRID_ROWS - 1) as f32) / GRID_ROWS as f32;
                page.images
                    .iter()
                    .take(GRID_COLUMNS * GRID_ROWS)
                    .enumerate()
                    .map(|(i, image)| {
                        let (col, row) = (i % GRID_COLUMNS, i / GRID_COLUMNS);
                        let (w, h) = fit(image.width(), image.height(), cell_w, cell_h);
                        let cell_x = g.side_margin_pt + col as f32 * (cell_w + GRID_GAP_PT);
                        let cell_top = top + row as f32 * (cell_h + GRID_GAP_PT);
                        Placement {
                            image,
                            rect: (
                                cell_x + (cell_w - w) / 2.0,
                                g.height_pt - cell_top - (cell_h + h) / 2.0,
                                w,
                                h,
                            ),
                        }
                    })
                    .collect()
            }
            GalleryLayout::Single => page
                .images
                .iter()
                .take(1)
                .map(|image| {
                    let (w, h) = fit(image.width(), image.height(), area_w, area_h);
                    Placement {
                        image,
                        rect: ((g.width_pt - w) / 2.0, g.height_pt - top - h, w, h),
                    }
                })
                .collect(),
        }
    }

    fn encode_jpeg(&self, image: &RgbImage) -> Result<Vec<u8>> {
        let mut encoded_bytes = Vec::new();
        let mut cursor = Cursor::new(&mut encoded_bytes);
        image
            .write_to(&mut cursor, ImageOutputFormat::Jpeg(self.jpeg_quality))
            .context("Failed to encode page image as JPEG")?;
        Ok(encoded_bytes)
    }

    /// Writes one physical page with its images, header and footer.
    #[allow(clippy::too_many_arguments)]
    fn build_single_page(
        &self,
        pdf: &mut Pdf,
        refs: &mut RefAlloc,
        page_ref: Ref,
        page_tree_ref: Ref,
        font_ref: Ref,
        plan: &AssemblyPlan,
        placements: &[Placement<'_>],
        caption: Option<&str>,
        page_number: usize,
        page_count: usize,
    ) -> Result<()> {
        let g = &plan.geometry;
        let content_ref = refs.bump();
        let images: Vec<(Ref, String)> = placements
            .iter()
            .map(|_| {
                let image_ref = refs.bump();
                (image_ref, format!("Im{}", image_ref.get()))
            })
            .collect();

        // 1. Write the page object dictionary
        let mut page = pdf.page(page_ref);
        page.media_box(Rect::new(0.0, 0.0, g.width_pt, g.height_pt));
        page.parent(page_tree_ref);
        page.contents(content_ref);
        let mut resources = page.resources();
        resources.fonts().pair(FONT_NAME, font_ref);
        let mut x_objects = resources.x_objects();
        for (image_ref, name) in &images {
            x_objects.pair(Name(name.as_bytes()), *image_ref);
        }
        x_objects.finish();
        resources.finish();
        page.finish();

        // 2. Draw images, then the header and footer text
        let mut content = Content::new();
        for (placement, (_, name)) in placements.iter().zip(&images) {
            let (x, y, w, h) = placement.rect;
            content.save_state();
            content.transform([w, 0.0, 0.0, h, x, y]);
            content.x_object(Name(name.as_bytes()));
            content.restore_state();
        }

        let header_y = g.height_pt - g.flow_vertical_margin_pt / 2.0;
        let footer = format!("Page {} of {}", page_number, page_count);
        let mut labels = vec![
            (HEADER_FONT_SIZE, g.side_margin_pt, header_y, plan.title.clone()),
            (
                HEADER_FONT_SIZE,
                g.width_pt - g.side_margin_pt - text_width(&plan.subtitle, HEADER_FONT_SIZE),
                header_y,
                plan.subtitle.clone(),
            ),
            (
                HEADER_FONT_SIZE,
                (g.width_pt - text_width(&footer, HEADER_FONT_SIZE)) / 2.0,
                g.flow_vertical_margin_pt / 2.0,
                footer,
            ),
        ];
        if let Some(caption) = caption {
            labels.push((
                GALLERY_TITLE_SIZE,
                g.side_margin_pt,
                g.height_pt - g.flow_vertical_margin_pt - GALLERY_TITLE_SIZE,
                caption.to_string(),
            ));
        }

        content.begin_text();
        for (size, x, y, text) in &labels {
            content.set_font(FONT_NAME, *size);
            content.set_text_matrix([1.0, 0.0, 0.0, 1.0, *x, *y]);
            content.show(Str(&pdf_text(text)));
        }
        content.end_text();
        pdf.stream(content_ref, &content.finish());

        // 3. Write the image XObjects with JPEG compression
        for (placement, (image_ref, _)) in placements.iter().zip(&images) {
            let encoded_bytes = self.encode_jpeg(placement.image)?;
            let mut image_xobject = pdf.image_xobject(*image_ref, &encoded_bytes);
            image_xobject.filter(Filter::DctDecode);
            image_xobject.width(placement.image.width() as i32);
            image_xobject.height(placement.image.height() as i32);
            image_xobject.color_space().device_rgb();
            image_xobject.bits_per_component(8);
            image_xobject.finish();
        }

        Ok(())
    }
}

impl DocumentWriter for PdfDocumentWriter {
    fn compose(&self, plan: &AssemblyPlan) -> Result<Vec<u8>> {
        let mut pdf = Pdf::new();
        let mut refs = RefAlloc(0);

        // Define top-level document objects
        let catalog_ref = refs.bump();
        let page_tree_ref = refs.bump();
        let font_ref = refs.bump();
        pdf.catalog(catalog_ref).pages(page_tree_ref);
        pdf.type1_font(font_ref).base_font(FONT_NAME);

        // Pre-allocate all page Refs
        let page_refs: Vec<Ref> = plan.pages.iter().map(|_| refs.bump()).collect();
        let page_count = plan.pages.len();

        for (i, page) in plan.pages.iter().enumerate() {
            let (placements, caption) = match page {
                AssembledPage::Report(physical) => (self.report_placements(physical, &plan.geometry), None),
                AssembledPage::Gallery(gallery) => (
                    self.gallery_placements(gallery, &plan.geometry),
                    Some(gallery.title.as_str()),
                ),
            };
            self.build_single_page(
                &mut pdf,
                &mut refs,
                page_refs[i],
                page_tree_ref,
                font_ref,
                plan,
                &placements,
                caption,
                i + 1,
                page_count,
            )?;
        }

        // Write the page tree
        pdf.pages(page_tree_ref)
            .kids(page_refs)
            .count(page_count as i32);

        Ok(pdf.finish())
    }
}

// Helvetica averages about half an em per glyph; close enough for placing
// short labels.
fn text_width(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * 0.5
}

/// Text for the standard Type1 font, which only covers ASCII reliably.
fn pdf_text(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c as u8 } else { b'?' })
        .collect()
}
