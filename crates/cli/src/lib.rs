use anyhow::{Context, Result};
use apostila_core::search::{normalize_term, run_search};
use apostila_core::{
    HttpBackend, SearchOutcome, ViewerBackend, ViewerCommand, ViewerConfig, ViewerController,
    ViewerError,
};
use apostila_render::{DocumentOpener, DocumentSource, PageRenderer, PdfiumOpener};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode, WriteLogger};
use std::ffi::OsString;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tokio::task::LocalSet;

pub mod host;

pub use host::ConsoleHost;

#[derive(Debug, Parser)]
#[command(name = "apostila")]
#[command(about = "Apostila page viewer")]
pub struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Write logs to this file instead of stderr.
    #[arg(long, global = true, value_name = "FILE")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable PDF metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Open a document and drive the viewer through a command script.
    Read(ReadArgs),
    /// Search the active document on the backend.
    Search {
        #[arg(value_name = "TERM")]
        term: String,
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Args)]
struct ReadArgs {
    /// Local PDF; without it the active document is loaded from the backend.
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,
    /// Commands to run after the first page, e.g. "next key:ArrowRight zoom-in goto:12".
    #[arg(long, default_value = "")]
    script: String,
    /// Viewer width in pixels.
    #[arg(long)]
    width: Option<f64>,
    /// Initial zoom factor.
    #[arg(long)]
    zoom: Option<f64>,
    /// Directory presented pages are written to as PNG.
    #[arg(long, value_name = "DIR")]
    out: Option<PathBuf>,
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: u32,
    first_page_size_pt: Option<PageSizeOutput>,
}

#[derive(Debug, Serialize)]
struct PageSizeOutput {
    width: f32,
    height: f32,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_logging(cli.verbose, cli.log_file.as_deref())?;

    match cli.command {
        Commands::Info { file } => run_info(&file),
        Commands::Read(args) => run_read(args),
        Commands::Search { term, config } => run_search_command(&term, config.as_deref()),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_logging(verbose: u8, log_file: Option<&Path>) -> Result<()> {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create log file {}", path.display()))?;
            WriteLogger::init(level, Config::default(), file)?;
        }
        None => TermLogger::init(
            level,
            Config::default(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        )?,
    }
    Ok(())
}

fn run_info(file: &Path) -> Result<()> {
    ensure_pdf_exists(file)?;

    let opener = PdfiumOpener::new().context("failed to load PDFium")?;
    let document = opener
        .open(DocumentSource::Path(file.to_path_buf()))
        .context("failed to open PDF")?;

    let page_count = document.page_count();
    let first_page_size_pt = if page_count > 0 {
        let (width, height) = document.page_size_pt(1)?;
        Some(PageSizeOutput { width, height })
    } else {
        None
    };

    let payload = InfoOutput {
        path: file.display().to_string(),
        page_count,
        first_page_size_pt,
    };
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

/// Split a command script into viewer commands
pub fn parse_script(script: &str) -> Result<Vec<ViewerCommand>> {
    script
        .split_whitespace()
        .map(|token| token.parse().with_context(|| format!("invalid script token {token:?}")))
        .collect()
}

fn load_config(path: Option<&Path>) -> Result<ViewerConfig> {
    ViewerConfig::load(path).context("failed to load configuration")
}

fn backend_for(config: &ViewerConfig) -> HttpBackend {
    HttpBackend::new(config.endpoints.clone(), config.csrf_token.clone())
}

fn local_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

fn run_read(args: ReadArgs) -> Result<()> {
    let script = parse_script(&args.script)?;
    let mut config = load_config(args.config.as_deref())?;
    if let Some(width) = args.width {
        anyhow::ensure!(
            width.is_finite() && width > 0.0,
            "viewer width must be a positive number of pixels, got {width}"
        );
        config.layout.viewer_width = width;
    }
    if let Some(file) = &args.file {
        ensure_pdf_exists(file)?;
    }
    if let Some(dir) = &args.out {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let opener = PdfiumOpener::new().context("failed to load PDFium")?;
    let backend = backend_for(&config);
    let host = ConsoleHost::new(args.out.clone());
    let runtime = local_runtime()?;

    LocalSet::new().block_on(&runtime, async move {
        let viewer = ViewerController::new(config, backend, host);
        match &args.file {
            Some(file) => {
                let document = opener
                    .open(DocumentSource::Path(file.clone()))
                    .context("failed to open PDF")?;
                viewer.open_document(document).await?;
            }
            None => {
                viewer.load_document(&opener).await?;
            }
        }
        viewer.settle().await;

        if let Some(zoom) = args.zoom {
            viewer.set_zoom(zoom);
            viewer.settle().await;
        }

        for command in script {
            match viewer.dispatch(command).await {
                Ok(_) | Err(ViewerError::InvalidPageInput(_)) => {}
                Err(e) => return Err(e.into()),
            }
            viewer.settle().await;
        }

        // Save the last page now instead of waiting out the quiet period.
        viewer.progress().cancel_pending();
        viewer.progress().persist(viewer.page(), false).await;

        let host = viewer.host();
        log::info!(
            "presented {} page(s), wrote {} file(s)",
            host.presented_count(),
            host.written().len()
        );
        Ok::<_, anyhow::Error>(())
    })
}

fn run_search_command(term: &str, config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let backend = backend_for(&config);
    if !backend.has_search_endpoint() {
        anyhow::bail!("no search endpoint configured");
    }
    let Some(term) = normalize_term(term) else {
        anyhow::bail!("search term is empty");
    };

    let outcome = local_runtime()?.block_on(run_search(&backend, term));
    if let Some(status) = outcome.status() {
        println!("{status}");
    }
    for hit in outcome.hits() {
        println!("  p. {}: {}", hit.page, hit.excerpt);
    }
    match outcome {
        SearchOutcome::Failed => anyhow::bail!("search failed"),
        _ => Ok(()),
    }
}

fn ensure_pdf_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}
