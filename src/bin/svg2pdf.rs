//! svg2pdf CLI: convert one SVG file into a watermarked PDF.
//!
//! Usage: svg2pdf [OPTIONS] <INPUT>
//! Run `svg2pdf --help` for full documentation.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_svg2pdf::{
    AttachmentStore, ConversionObserver, Converter, Dispatcher, DocumentId, DocumentRepository,
    DocumentService, DocumentView, FsAttachmentStore, MemoryDocumentRepository,
    PipelineConfigBuilder, Status, Upload,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

/// Spinner that narrates each lifecycle step.
struct CliObserver {
    bar: ProgressBar,
    started: Instant,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("svg2pdf");
        bar.set_message("queued…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            started: Instant::now(),
        })
    }

    fn elapsed(&self) -> String {
        dim(&format!("{:.1}s", self.started.elapsed().as_secs_f64()))
    }
}

impl ConversionObserver for CliObserver {
    fn on_transition(&self, _id: DocumentId, from: Status, to: Status) {
        self.bar
            .println(format!("  {} {} → {}  {}", cyan("•"), from, bold(to.as_str()), self.elapsed()));
        let msg = match to {
            Status::Validating => "validating SVG…",
            Status::Processing => "printing PDF…",
            _ => "finishing…",
        };
        self.bar.set_message(msg);
    }

    fn on_validated(&self, _id: DocumentId, repaired: bool) {
        if repaired {
            self.bar
                .println(format!("  {} SVG was repaired by the AI oracle", cyan("⚠")));
        }
    }

    fn on_rendered(&self, _id: DocumentId, pdf_len: usize) {
        self.bar.println(format!(
            "  {} PDF rendered  {}",
            green("✓"),
            dim(&format!("{pdf_len} bytes"))
        ));
    }

    fn on_finished(&self, _id: DocumentId, status: Status, error: Option<&str>) {
        self.bar.finish_and_clear();
        match error {
            None => eprintln!("{} {}  {}", green("✔"), bold(status.as_str()), self.elapsed()),
            Some(e) => {
                // Keep very long engine output on one terminal line.
                let msg = if e.chars().count() > 100 {
                    format!("{}\u{2026}", e.chars().take(99).collect::<String>())
                } else {
                    e.to_string()
                };
                eprintln!("{} {}  {}", red("✘"), bold(status.as_str()), red(&msg));
            }
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert with the default "Endurance" watermark
  svg2pdf logo.svg -o logo.pdf

  # Let an LLM check (and fix) the SVG first
  svg2pdf --ai-repair broken.svg -o fixed.pdf

  # Custom watermark text, remote print service
  svg2pdf --watermark CONFIDENTIAL --remote-chrome http://localhost:3000 plan.svg

  # Machine-readable result
  svg2pdf --json chart.svg

ENVIRONMENT VARIABLES:
  CHROME_PATH              Chrome/Chromium binary for local printing
  REMOTE_CHROME_URL        Remote print service (POST {url}/pdf); wins over CHROME_PATH
  OPENROUTER_API_KEY       Key for the AI repair oracle
  OPENROUTER_MODEL         Oracle model (default: anthropic/claude-3.5-sonnet)
  OPENROUTER_ENDPOINT      Oracle chat-completions URL
  SVG2PDF_REPAIR_PROVIDER  Use an edgequake-llm provider instead of OpenRouter
"#;

/// Convert SVG files into watermarked PDF documents.
#[derive(Parser, Debug)]
#[command(
    name = "svg2pdf",
    version,
    about = "Convert SVG files into watermarked PDF documents",
    long_about = "Validate an SVG (strictly, or through an LLM that can repair it), lay it out on \
an A4 page under a tiled translucent watermark and print it to PDF with headless Chrome or a \
remote print service.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// SVG file to convert.
    input: PathBuf,

    /// Copy the generated PDF to this path.
    #[arg(short, long, env = "SVG2PDF_OUTPUT")]
    output: Option<PathBuf>,

    /// Validate through the AI repair oracle instead of the strict parser.
    #[arg(long, env = "SVG2PDF_AI_REPAIR")]
    ai_repair: bool,

    /// Watermark text.
    #[arg(long, env = "SVG2PDF_WATERMARK")]
    watermark: Option<String>,

    /// Chrome/Chromium binary (overrides CHROME_PATH).
    #[arg(long, conflicts_with = "remote_chrome")]
    chrome: Option<PathBuf>,

    /// Remote print service base URL (overrides REMOTE_CHROME_URL).
    #[arg(long)]
    remote_chrome: Option<String>,

    /// Keep uploads and generated PDFs in this directory.
    #[arg(long, env = "SVG2PDF_STORAGE")]
    storage: Option<PathBuf>,

    /// Hard limit on one print job, in seconds.
    #[arg(long, env = "SVG2PDF_ENGINE_TIMEOUT", default_value_t = 30)]
    engine_timeout: u64,

    /// Print the resulting document as JSON.
    #[arg(long)]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SVG2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SVG2PDF_QUIET", conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let mut builder = PipelineConfigBuilder::from_env().engine_timeout_secs(cli.engine_timeout);
    if let Some(ref url) = cli.remote_chrome {
        builder = builder.remote_engine(url.clone());
    } else if let Some(ref path) = cli.chrome {
        builder = builder.local_engine(Some(path.clone()));
    }
    if let Some(ref text) = cli.watermark {
        builder = builder.watermark_text(text.clone());
    }
    let config = builder.build().context("Invalid configuration")?;

    // ── Storage ──────────────────────────────────────────────────────────
    // Without --storage, blobs live in a temp dir removed on exit, so the
    // PDF is always copied out before returning.
    let (root, scratch) = match cli.storage.clone() {
        Some(dir) => (dir, None),
        None => {
            let tmp = tempfile::tempdir().context("Failed to create scratch directory")?;
            (tmp.path().to_path_buf(), Some(tmp))
        }
    };
    let store = Arc::new(
        FsAttachmentStore::open(&root)
            .await
            .with_context(|| format!("Failed to open storage at {}", root.display()))?,
    );
    let repository = Arc::new(MemoryDocumentRepository::new());

    // ── Wire the pipeline ────────────────────────────────────────────────
    let mut converter = Converter::from_config(&config, store.clone(), repository.clone())
        .context("Failed to set up the rendering engine")?;
    if show_progress {
        converter = converter.with_observer(CliObserver::new());
    }
    let dispatcher = Dispatcher::start(Arc::new(converter), config.concurrency);
    let service = DocumentService::new(
        store.clone(),
        repository.clone(),
        Arc::new(dispatcher.handle()),
    );

    let bytes = tokio::fs::read(&cli.input)
        .await
        .with_context(|| format!("Failed to read {}", cli.input.display()))?;
    let filename = cli
        .input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned());

    let accepted = service
        .create(Upload {
            filename,
            bytes: Some(bytes),
            use_ai_repair: cli.ai_repair,
        })
        .await
        .context("Upload rejected")?;

    // The service holds a queue handle; shutdown only drains once it is gone.
    drop(service);
    dispatcher.shutdown().await;

    let document = repository
        .find(accepted.id)
        .await
        .context("Failed to load document")?;
    let mut view = DocumentView::from_document(&document, store.as_ref());

    let destination = match (&cli.output, document.generated_filename()) {
        (Some(path), _) => Some(path.clone()),
        (None, Some(name)) if scratch.is_some() => Some(scratch_destination(&cli.input, name)),
        _ => None,
    };
    let mut written = None;
    if let (Some(path), Some(generated)) = (&destination, document.generated()) {
        let pdf = store
            .read(generated)
            .await
            .context("Failed to read generated PDF")?;
        tokio::fs::write(path, &pdf)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        if scratch.is_some() {
            view.pdf_file_url = Some(file_url(path));
        }
        written = Some((path.clone(), pdf.len()));
    }

    // ── Output ───────────────────────────────────────────────────────────
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&view).context("Failed to serialise document")?
        );
    } else if !cli.quiet {
        println!("Document:     {}", view.id);
        println!("File:         {}", view.original_file_name);
        println!("Status:       {}", view.status);
        if let Some(ref url) = view.pdf_file_url {
            println!("PDF:          {}", url);
        }
        for issue in &view.issues_found {
            println!("Issue:        {}", issue);
        }
        for warning in &view.warnings {
            println!("Warning:      {}", warning);
        }
    }

    if view.status != Status::Completed {
        anyhow::bail!("Conversion ended in status '{}'", view.status);
    }

    if let Some((path, len)) = written {
        if !cli.quiet && !cli.json {
            eprintln!(
                "{}  {} bytes  →  {}",
                green("✔"),
                len,
                bold(&path.display().to_string()),
            );
        }
    }

    Ok(())
}

/// Where the PDF goes when neither `--output` nor `--storage` is given:
/// beside the input, under its generated name.
fn scratch_destination(input: &Path, generated_filename: &str) -> PathBuf {
    input
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(generated_filename)
}

fn file_url(path: &Path) -> String {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    format!("file://{}", absolute.display())
}
