use anyhow::{Result, anyhow};
use image::{ImageOutputFormat, Rgb, RgbImage};
use lopdf::{Document, Object};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fs;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use valuationreport::document_builder::{PageGeometry, PdfDocumentWriter};
use valuationreport::image_loader::ImageSource;
use valuationreport::pagination::PageOrigin;
use valuationreport::raster::TableRasterizer;
use valuationreport::{Config, OutputFormat, Pipeline, RecordInput, field_resolver, report, run};

struct MemorySource {
    images: HashMap<String, Vec<u8>>,
}

impl ImageSource for MemorySource {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.images
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("404 for {}", url))
    }
}

fn png(seed: u8) -> Vec<u8> {
    let image = RgbImage::from_pixel(40, 30, Rgb([seed, 100, 200]));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
        .unwrap();
    bytes
}

fn sample_record() -> Value {
    json!({
        "_id": "VAL-2291",
        "ownerDetails": {"clientName": "Asha Kulkarni", "ownerName": "Asha Kulkarni"},
        "bankDetails": {"bankName": "State Bank", "branchName": "Kothrud"},
        "locationDetails": {
            "postalAddress": {"fullAddress": "Flat 12, Shanti Heights, Kothrud, Pune"},
            "city": "Pune",
            "pinCode": 411038
        },
        "valuationDetails": {
            "dateOfValuation": "2024-03-05",
            "fairMarketValue": "1500000",
            "realizableValue": 1350000
        },
        "formData": {"remarks": "Property is well maintained."}
    })
}

fn pipeline(images: HashMap<String, Vec<u8>>) -> Pipeline {
    Pipeline::new(
        Box::new(TableRasterizer::without_font()),
        Arc::new(MemorySource { images }),
        Box::new(PdfDocumentWriter::default()),
    )
    .with_raster_width(600)
    .with_image_timeout(Duration::from_secs(5))
}

fn image_xobjects(doc: &Document) -> usize {
    doc.objects
        .values()
        .filter(|object| match object {
            Object::Stream(stream) => {
                matches!(stream.dict.get(b"Subtype"), Ok(Object::Name(name)) if name.as_slice() == b"Image")
            }
            _ => false,
        })
        .count()
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("valuationreport-{}-{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir
}

#[test]
fn report_pages_precede_gallery_pages_and_bad_images_are_left_out() {
    let mut raw = sample_record();
    let mut images = HashMap::new();
    let mut property = Vec::new();
    for i in 0..7u8 {
        let url = format!("https://cdn.example/p{i}.png");
        images.insert(url.clone(), png(i));
        property.push(if i % 2 == 0 { json!(url) } else { json!({"url": url}) });
    }
    property.push(json!("ftp://cdn.example/rejected.png"));
    property.push(json!("https://cdn.example/missing.png"));
    images.insert("https://cdn.example/kitchen.png".to_string(), png(50));
    images.insert("https://cdn.example/map.png".to_string(), png(60));
    raw["imageDetails"] = json!({
        "propertyImages": property,
        "areaImages": {"kitchen": ["https://cdn.example/kitchen.png"]},
        "locationImages": [{"secure_url": "https://cdn.example/map.png"}],
    });

    let report = report::render(&field_resolver::resolve(&raw));
    let pipeline = pipeline(images);
    let plan = pipeline.paginate(&report).unwrap();
    let report_pieces: usize = plan.pages.iter().map(|p| p.pieces.len()).sum();

    let artifact = pipeline.generate(&report).unwrap();
    // Seven property photos need two grid pages; kitchen and map get one each.
    assert_eq!(artifact.page_count, plan.len() + 4);
    assert_eq!(artifact.embedded_images, 9);
    assert!(artifact.file_name.starts_with("valuation_Asha_Kulkarni_"));
    assert!(artifact.file_name.ends_with(".pdf"));

    let doc = Document::load_mem(&artifact.bytes).unwrap();
    assert_eq!(doc.get_pages().len(), artifact.page_count);
    assert_eq!(image_xobjects(&doc), report_pieces + 9);
}

#[test]
fn full_page_sections_close_the_report() {
    let report = report::render(&field_resolver::resolve(&sample_record()));
    let plan = pipeline(HashMap::new()).paginate(&report).unwrap();

    let origins: Vec<PageOrigin> = plan
        .pages
        .iter()
        .flat_map(|p| p.pieces.iter().map(|piece| piece.origin))
        .collect();
    let (flow, full) = origins.split_at(origins.len() - 2);
    assert!(!flow.is_empty());
    assert!(flow.iter().all(|o| *o == PageOrigin::Flow));
    assert!(full.iter().all(|o| *o == PageOrigin::FullPage));

    // The declaration fills its page, so the remarks start a fresh one.
    let last = plan.pages.last().unwrap();
    assert_eq!(last.pieces.len(), 1);
    assert_eq!(last.pieces[0].origin, PageOrigin::FullPage);
}

#[test]
fn empty_record_still_produces_a_document() {
    let report = report::render(&field_resolver::resolve(&json!({})));
    let artifact = pipeline(HashMap::new()).generate(&report).unwrap();

    assert!(artifact.page_count > 0);
    assert_eq!(artifact.embedded_images, 0);
    assert!(artifact.file_name.starts_with("valuation_report_"));
    let doc = Document::load_mem(&artifact.bytes).unwrap();
    assert_eq!(doc.get_pages().len(), artifact.page_count);
}

fn file_config(record: &PathBuf, output_dir: &PathBuf, format: OutputFormat) -> Config {
    Config {
        input: RecordInput::File(record.clone()),
        output_dir: output_dir.clone(),
        output_format: format,
        preview: false,
        font_path: None,
        image_timeout: Duration::from_secs(1),
        api_base_url: "http://127.0.0.1:9".to_string(),
        raster_width_px: 600,
        geometry: PageGeometry::default(),
        generate_index: false,
    }
}

#[test]
fn run_writes_each_output_format() {
    let dir = scratch_dir("run");
    fs::create_dir_all(&dir).unwrap();
    let record = dir.join("record.json");
    fs::write(&record, sample_record().to_string()).unwrap();

    let html_dir = dir.join("html");
    run(file_config(&record, &html_dir, OutputFormat::Html)).unwrap();
    let html: Vec<_> = fs::read_dir(&html_dir).unwrap().collect();
    assert_eq!(html.len(), 1);
    let markup = fs::read_to_string(html[0].as_ref().unwrap().path()).unwrap();
    assert!(markup.contains("Asha Kulkarni"));

    let img_dir = dir.join("img");
    let mut config = file_config(&record, &img_dir, OutputFormat::Img);
    config.generate_index = true;
    run(config).unwrap();
    let pages = fs::read_dir(img_dir.join("pages")).unwrap().count();
    assert!(pages >= 3);
    let index: Value = serde_json::from_str(&fs::read_to_string(img_dir.join("index.json")).unwrap()).unwrap();
    assert_eq!(index["clientLabel"], "Asha Kulkarni");
    assert!(index["pageCount"].as_u64().unwrap() >= 3);

    let pdf_dir = dir.join("pdf");
    run(file_config(&record, &pdf_dir, OutputFormat::Pdf)).unwrap();
    let pdf = fs::read_dir(&pdf_dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .find(|path| path.extension().is_some_and(|ext| ext == "pdf"))
        .unwrap();
    assert!(Document::load(&pdf).is_ok());

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn unreadable_record_file_is_an_error() {
    let dir = scratch_dir("bad-record");
    fs::create_dir_all(&dir).unwrap();
    let record = dir.join("record.json");
    fs::write(&record, "{ not json").unwrap();

    let err = run(file_config(&record, &dir.join("out"), OutputFormat::Pdf)).unwrap_err();
    assert!(format!("{:#}", err).contains("not valid JSON"));

    fs::remove_dir_all(&dir).unwrap();
}
