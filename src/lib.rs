//! ValuationReport - Core Library
//!
//! Turns a loosely structured valuation record into a paginated report:
//! fields are resolved to canonical names, rendered into sections, rasterized,
//! cut into pages at table borders and assembled into a PDF together with the
//! photo galleries.

use anyhow::{Context, Result};
use chrono::Utc;
use log::{info, warn};
use rayon::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub mod document_builder;
pub mod field_resolver;
pub mod formatter;
pub mod gateway;
pub mod image_loader;
pub mod pagination;
pub mod raster;
pub mod record;
pub mod report;

use document_builder::{
    DocumentArtifact, DocumentAssembler, DocumentWriter, Delivery, PageGeometry, PdfDocumentWriter,
    artifact_file_name,
};
use gateway::{Actor, HttpRecordGateway, RecordGateway};
use image_loader::{HttpImageSource, ImageSource};
use pagination::{PagePlan, PaginationConfig, PaginationEngine, RenderedPage};
use raster::{RegionDescriptor, Rasterizer, TableRasterizer};
use report::{FORCED_BREAK_SECTIONS, ReportDocument};

pub const DEFAULT_RASTER_WIDTH_PX: u32 = 1000;
pub const DEFAULT_IMAGE_TIMEOUT: Duration = Duration::from_secs(15);

/// Where the valuation record comes from.
#[derive(Debug, Clone)]
pub enum RecordInput {
    /// A JSON file holding the raw record.
    File(PathBuf),
    /// A record fetched from the records service.
    Remote { id: String, actor: Actor },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Pdf,
    Html,
    Img,
}

/// Application configuration structure.
#[derive(Debug, Clone)]
pub struct Config {
    pub input: RecordInput,
    pub output_dir: PathBuf,
    pub output_format: OutputFormat,
    /// Write the PDF to the temp directory instead of `output_dir`.
    pub preview: bool,
    pub font_path: Option<PathBuf>,
    pub image_timeout: Duration,
    pub api_base_url: String,
    pub raster_width_px: u32,
    pub geometry: PageGeometry,
    /// Also write `index.json` summarizing the report.
    pub generate_index: bool,
}

/// Rasterize, paginate and assemble a rendered report.
pub struct Pipeline {
    rasterizer: Box<dyn Rasterizer>,
    images: Arc<dyn ImageSource>,
    writer: Box<dyn DocumentWriter>,
    geometry: PageGeometry,
    raster_width_px: u32,
    image_timeout: Duration,
}

impl Pipeline {
    pub fn new(
        rasterizer: Box<dyn Rasterizer>,
        images: Arc<dyn ImageSource>,
        writer: Box<dyn DocumentWriter>,
    ) -> Self {
        Self {
            rasterizer,
            images,
            writer,
            geometry: PageGeometry::default(),
            raster_width_px: DEFAULT_RASTER_WIDTH_PX,
            image_timeout: DEFAULT_IMAGE_TIMEOUT,
        }
    }

    pub fn with_geometry(mut self, geometry: PageGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn with_raster_width(mut self, width_px: u32) -> Self {
        self.raster_width_px = width_px;
        self
    }

    pub fn with_image_timeout(mut self, timeout: Duration) -> Self {
        self.image_timeout = timeout;
        self
    }

    fn engine(&self) -> PaginationEngine {
        let page_height_px = self.geometry.flow_content_height_px(self.raster_width_px);
        PaginationEngine::new(PaginationConfig::for_page_height(page_height_px))
    }

    /// Lays the report sections out on physical pages.
    pub fn paginate(&self, report: &ReportDocument) -> Result<PagePlan> {
        let engine = self.engine();

        let flow: Vec<_> = report.flow_sections().collect();
        let mut plan = if flow.is_empty() {
            PagePlan::default()
        } else {
            let region = self
                .rasterizer
                .render(&RegionDescriptor {
                    sections: flow,
                    width_px: self.raster_width_px,
                })
                .context("Failed to rasterize report sections")?;
            info!(
                "Rasterized flow region: {}x{} px",
                region.bitmap.width(),
                region.bitmap.height()
            );
            PagePlan::from_flow(engine.paginate(&region, &FORCED_BREAK_SECTIONS))
        };

        for section in report.full_page_sections() {
            let region = self
                .rasterizer
                .render(&RegionDescriptor {
                    sections: vec![section],
                    width_px: self.raster_width_px,
                })
                .with_context(|| format!("Failed to rasterize section '{}'", section.id))?;
            plan.append_full_page(RenderedPage::full_page(region.bitmap), engine.config().min_content_px);
        }

        info!("Report laid out on {} pages.", plan.len());
        Ok(plan)
    }

    /// Produces the final document: report pages followed by the galleries.
    pub fn generate(&self, report: &ReportDocument) -> Result<DocumentArtifact> {
        let plan = self.paginate(report)?;

        let galleries = report
            .galleries
            .iter()
            .map(|gallery| {
                let loaded = image_loader::load_images(&gallery.urls, Arc::clone(&self.images), self.image_timeout);
                if loaded.len() < gallery.urls.len() {
                    warn!(
                        "{}: {} of {} images could not be loaded.",
                        gallery.title,
                        gallery.urls.len() - loaded.len(),
                        gallery.urls.len()
                    );
                }
                (gallery.title.clone(), gallery.layout, loaded)
            })
            .collect();

        let assembler = DocumentAssembler::new(self.geometry.clone());
        let assembly = assembler.plan(&report.title, &report.client_label, plan, galleries);
        let bytes = self
            .writer
            .compose(&assembly)
            .context("Failed to compose document")?;

        Ok(DocumentArtifact {
            bytes,
            file_name: artifact_file_name(&report.client_label, Utc::now().timestamp_millis()),
            page_count: assembly.pages.len(),
            embedded_images: assembly.embedded_gallery_images(),
        })
    }
}

/// Reads the raw record from a file or the records service.
pub fn load_record(config: &Config) -> Result<Value> {
    match &config.input {
        RecordInput::File(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read record file {:?}", path))?;
            serde_json::from_str(&text).with_context(|| format!("Record file {:?} is not valid JSON", path))
        }
        RecordInput::Remote { id, actor } => {
            info!("Fetching record {} from {}", id, config.api_base_url);
            HttpRecordGateway::new(&config.api_base_url)
                .get_by_id(id, actor)
                .with_context(|| format!("Failed to fetch record {}", id))
        }
    }
}

/// The main function that orchestrates report generation.
pub fn run(config: Config) -> Result<()> {
    info!("Initializing report generation with config: {:?}", config);

    // 1. Load and normalize the record
    let raw = load_record(&config)?;
    let canonical = field_resolver::resolve(&raw);
    let report = report::render(&canonical);
    info!(
        "Rendered {} sections and {} gallery images for {}",
        report.sections.len(),
        report.image_count(),
        report.client_label
    );

    if !config.output_dir.exists() {
        fs::create_dir_all(&config.output_dir).context("Failed to create output directory")?;
    }

    let rasterizer = TableRasterizer::from_optional_font(config.font_path.as_deref())?;
    let pipeline = Pipeline::new(
        Box::new(rasterizer),
        Arc::new(HttpImageSource::new(config.image_timeout)),
        Box::new(PdfDocumentWriter::default()),
    )
    .with_geometry(config.geometry.clone())
    .with_raster_width(config.raster_width_px)
    .with_image_timeout(config.image_timeout);

    // 2. Produce the requested output
    let page_count = match config.output_format {
        OutputFormat::Pdf => {
            let artifact = pipeline.generate(&report)?;
            let delivery = if config.preview {
                Delivery::Preview
            } else {
                Delivery::Download {
                    dir: config.output_dir.clone(),
                }
            };
            let path = document_builder::deliver(&artifact, &delivery)?;
            info!(
                "Successfully created PDF with {} pages and {} images: {:?}",
                artifact.page_count, artifact.embedded_images, path
            );
            Some(artifact.page_count)
        }
        OutputFormat::Html => {
            let file_name = artifact_file_name(&report.client_label, Utc::now().timestamp_millis())
                .replace(".pdf", ".html");
            let path = config.output_dir.join(file_name);
            fs::write(&path, report.to_html()).context("Failed to write HTML file")?;
            info!("Successfully created HTML preview: {:?}", path);
            None
        }
        OutputFormat::Img => {
            let plan = pipeline.paginate(&report)?;
            let pages_dir = config.output_dir.join("pages");
            fs::create_dir_all(&pages_dir).context("Failed to create pages directory")?;
            // Pages are independent; save them concurrently.
            plan.pages
                .par_iter()
                .enumerate()
                .try_for_each(|(i, page)| -> Result<()> {
                    for (j, piece) in page.pieces.iter().enumerate() {
                        let path = pages_dir.join(format!("page_{:03}_{:02}.png", i + 1, j + 1));
                        piece
                            .bitmap
                            .save(&path)
                            .with_context(|| format!("Failed to save page to {:?}", path))?;
                    }
                    Ok(())
                })?;
            info!("Successfully saved {} pages to {:?}", plan.len(), pages_dir);
            Some(plan.len())
        }
    };

    // 3. Optional JSON index
    if config.generate_index {
        let mut index = report.index(Utc::now());
        index.page_count = page_count;
        let path = config.output_dir.join("index.json");
        let json = serde_json::to_string_pretty(&index).context("Failed to serialize report index")?;
        fs::write(&path, json).context("Failed to write index file")?;
        info!("Wrote report index to {:?}", path);
    }

    Ok(())
}
