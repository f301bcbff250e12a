//! ValuationReport - Main Application Entrypoint
//!
//! Parses command-line arguments, initializes logging and dispatches the
//! report generation.

use clap::{ArgGroup, Parser};
use log::{error, info};
use std::path::PathBuf;
use std::time::Duration;
use valuationreport::document_builder::PageGeometry;
use valuationreport::gateway::Actor;
use valuationreport::{Config, DEFAULT_RASTER_WIDTH_PX, OutputFormat, RecordInput, run};

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

/// Generates property valuation reports (PDF, HTML or page images) from valuation records.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(group(ArgGroup::new("source").required(true).args(["input", "record_id"])))]
struct Args {
    /// Path to a JSON file holding the valuation record
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Id of a record to fetch from the records service
    #[arg(long)]
    record_id: Option<String>,

    /// Directory to save the output files
    #[arg(short, long, default_value = "output")]
    output: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Pdf)]
    format: Format,

    /// Write the PDF to the temp directory for previewing instead of the output directory
    #[arg(long)]
    preview: bool,

    /// TrueType font used to draw the report text
    #[arg(long, env = "VALUATION_FONT")]
    font: Option<PathBuf>,

    /// Base URL of the records service
    #[arg(long, env = "VALUATION_API_URL", default_value = "http://localhost:5000/api")]
    api_url: String,

    /// Username sent with record requests
    #[arg(long, default_value = "cli")]
    username: String,

    /// Role sent with record requests
    #[arg(long, default_value = "user")]
    role: String,

    /// Client id sent with record requests
    #[arg(long)]
    client_id: Option<String>,

    /// Seconds to wait for each gallery image
    #[arg(long, default_value_t = 15)]
    image_timeout: u64,

    /// Width in pixels of the rasterized report
    #[arg(long, default_value_t = DEFAULT_RASTER_WIDTH_PX)]
    width: u32,

    /// Generate an optional JSON index file with metadata
    #[arg(long)]
    index: bool,

    /// Logging verbosity level
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum Format {
    Pdf,
    Html,
    Img,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum LogLevel {
    Error,
    Info,
    Debug,
}

fn main() {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    let args = Args::parse();

    // 1. Initialize Logger
    let log_level = match args.log_level {
        LogLevel::Error => "error",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    info!("Starting ValuationReport...");

    // 2. Validate input
    let input = match (args.input, args.record_id) {
        (Some(path), _) => {
            if !path.exists() {
                error!("Input file does not exist: {:?}", path);
                std::process::exit(1);
            }
            RecordInput::File(path)
        }
        (None, Some(id)) => RecordInput::Remote {
            id,
            actor: Actor {
                username: args.username,
                role: args.role,
                client_id: args.client_id,
            },
        },
        (None, None) => {
            error!("Either --input or --record-id is required");
            std::process::exit(1);
        }
    };

    // 3. Create a configuration object from arguments
    let config = Config {
        input,
        output_dir: args.output,
        output_format: match args.format {
            Format::Pdf => OutputFormat::Pdf,
            Format::Html => OutputFormat::Html,
            Format::Img => OutputFormat::Img,
        },
        preview: args.preview,
        font_path: args.font,
        image_timeout: Duration::from_secs(args.image_timeout),
        api_base_url: args.api_url,
        raster_width_px: args.width,
        geometry: PageGeometry::default(),
        generate_index: args.index,
    };

    // 4. Run the main application logic
    if let Err(e) = run(config) {
        error!("Application failed: {:#}", e);
        std::process::exit(2);
    }

    info!("Report generation completed successfully.");
}
