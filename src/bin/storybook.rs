//! CLI binary for edgequake-storybook.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `StorybookConfig` and writes the assembled storybook.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_storybook::progress::ProgressCallback;
use edgequake_storybook::{
    export_to_file, outline, Assembler, EventKind, JsonAssembler, MarkdownAssembler, ProgressEvent,
    ProgressObserver, Storybook, StorybookConfig,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

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

// ── Progress observers ───────────────────────────────────────────────────────

/// Terminal progress bar driven by the pipeline's percentage events.
struct CliProgressBar {
    bar: ProgressBar,
}

impl CliProgressBar {
    fn new() -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}%  ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        let bar = ProgressBar::new(100);
        bar.set_style(style);
        bar.set_prefix("Storybook");
        bar.set_message("Reading PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl ProgressObserver for CliProgressBar {
    fn on_event(&self, event: &ProgressEvent) {
        match event.kind {
            EventKind::Progress => {
                if let Some(p) = event.progress {
                    self.bar.set_position(u64::from(p));
                }
                if let Some(ref msg) = event.message {
                    self.bar.set_message(msg.clone());
                }
            }
            EventKind::Complete => {
                self.bar.finish_and_clear();
            }
            EventKind::Error => {
                self.bar.abandon_with_message(red(event.message.as_deref().unwrap_or("failed")));
            }
        }
    }
}

/// Prints every event as one JSON line on stdout.
struct JsonLinesObserver;

impl ProgressObserver for JsonLinesObserver {
    fn on_event(&self, event: &ProgressEvent) {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        let _ = writeln!(handle, "{}", event.to_json());
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Storybook as Markdown on stdout
  storybook novel.pdf

  # Write to a file with a custom title
  storybook novel.pdf -o novel.md --title "The Brave Fox"

  # Skip images during ingestion; illustrate only when exporting
  storybook --defer-illustrations novel.pdf -o novel.md

  # Preview the chapter split without calling any model
  storybook --outline novel.pdf

  # Stream progress events as JSON lines
  storybook --events novel.pdf -o novel.md

  # Convert from URL
  storybook https://example.com/novel.pdf -o novel.md

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key (required for images)
  EDGEQUAKE_LLM_PROVIDER  Override text provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override text model ID
  PDFIUM_DYNAMIC_LIB_PATH Directory containing libpdfium
"#;

/// Turn PDF novels into illustrated children's storybooks.
#[derive(Parser, Debug)]
#[command(
    name = "storybook",
    version,
    about = "Turn PDF novels into illustrated children's storybooks",
    long_about = "Split a PDF (local file or URL) into chapters, retell each one for young \
readers with a text LLM, illustrate it with an image model, and assemble the result as \
Markdown with embedded images.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Write the storybook to this file instead of stdout.
    #[arg(short, long, env = "STORYBOOK_OUTPUT")]
    output: Option<PathBuf>,

    /// Storybook title (default: file name without `.pdf`).
    #[arg(long, env = "STORYBOOK_TITLE")]
    title: Option<String>,

    /// Skip images during ingestion; illustrate when exporting.
    #[arg(long, env = "STORYBOOK_DEFER_ILLUSTRATIONS")]
    defer_illustrations: bool,

    /// Leave images out of the output entirely.
    #[arg(long, env = "STORYBOOK_NO_IMAGES")]
    no_images: bool,

    /// Print progress events as JSON lines on stdout.
    #[arg(long)]
    events: bool,

    /// Print the chapter split only; no model calls.
    #[arg(long)]
    outline: bool,

    /// Output the Document as JSON instead of Markdown.
    #[arg(long, env = "STORYBOOK_JSON")]
    json: bool,

    /// Text LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Text LLM model ID.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Gemini image model ID.
    #[arg(long, env = "STORYBOOK_IMAGE_MODEL")]
    image_model: Option<String>,

    /// Maximum number of chapters.
    #[arg(long, env = "STORYBOOK_MAX_CHAPTERS", default_value_t = 10)]
    max_chapters: usize,

    /// Concurrent text-generation calls.
    #[arg(long, env = "STORYBOOK_TEXT_SLOTS", default_value_t = 2)]
    text_slots: usize,

    /// Concurrent image-generation calls.
    #[arg(long, env = "STORYBOOK_IMAGE_SLOTS", default_value_t = 1)]
    image_slots: usize,

    /// Attempts per remote call (first try included).
    #[arg(long, env = "STORYBOOK_MAX_ATTEMPTS", default_value_t = 5)]
    max_attempts: u32,

    /// Base retry delay in milliseconds (doubles per attempt).
    #[arg(long, env = "STORYBOOK_RETRY_BASE_MS", default_value_t = 3000)]
    retry_base_ms: u64,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "STORYBOOK_PASSWORD")]
    password: Option<String>,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "STORYBOOK_API_TIMEOUT", default_value_t = 90)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "STORYBOOK_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Disable progress bar.
    #[arg(long, env = "STORYBOOK_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "STORYBOOK_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "STORYBOOK_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless --verbose is given.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.events && !cli.outline;
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
    let progress: Option<ProgressCallback> = if cli.events {
        Some(Arc::new(JsonLinesObserver))
    } else if show_progress {
        Some(CliProgressBar::new() as Arc<dyn ProgressObserver>)
    } else {
        None
    };
    let config = build_config(&cli, progress)?;

    // ── Outline mode ─────────────────────────────────────────────────────
    if cli.outline {
        let stubs = outline(&cli.input, &config)
            .await
            .context("Failed to outline document")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&stubs).context("Failed to serialise outline")?
            );
        } else {
            for stub in &stubs {
                println!(
                    "{:>3}. {:<40} {}",
                    stub.number,
                    stub.title_hint,
                    dim(&format!("{} chars", stub.text.chars().count()))
                );
            }
        }
        return Ok(());
    }

    // ── Run ingestion ────────────────────────────────────────────────────
    let storybook = Storybook::new(config).context("Failed to set up storybook")?;
    let document = storybook
        .ingest_input(&cli.input, cli.title.as_deref())
        .await
        .context("Ingestion failed")?;

    let document = if cli.no_images {
        document
    } else {
        storybook.prepare_export(&document).await
    };

    let assembler: Box<dyn Assembler> = if cli.json {
        Box::new(JsonAssembler)
    } else {
        Box::new(MarkdownAssembler {
            embed_images: !cli.no_images,
        })
    };

    if let Some(ref output_path) = cli.output {
        export_to_file(&document, assembler.as_ref(), output_path)
            .await
            .context("Export failed")?;
    } else if !cli.events {
        let bytes = assembler.render(&document).context("Assembly failed")?;
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(&bytes)
            .context("Failed to write to stdout")?;
        if !bytes.ends_with(b"\n") {
            handle.write_all(b"\n").ok();
        }
    }

    // ── Summary ──────────────────────────────────────────────────────────
    if !cli.quiet && !cli.events {
        let total = document.chapters.len();
        let failed = document.failed_count();
        let illustrated = document.chapters.iter().filter(|c| c.image.is_some()).count();
        let cache = storybook.cache_stats();
        eprintln!(
            "{}  {}/{} chapters  {} illustrated{}",
            if failed == 0 { green("✔") } else { cyan("⚠") },
            bold(&(total - failed).to_string()),
            total,
            illustrated,
            cli.output
                .as_ref()
                .map(|p| format!("  →  {}", bold(&p.display().to_string())))
                .unwrap_or_default(),
        );
        if failed > 0 {
            eprintln!("   {} chapters kept placeholder text", red(&failed.to_string()));
        }
        eprintln!(
            "   {}",
            dim(&format!(
                "image cache: {} generated, {} reused",
                cache.misses,
                cache.hits + cache.coalesced
            ))
        );
    }

    Ok(())
}

/// Map CLI args to `StorybookConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<StorybookConfig> {
    let mut builder = StorybookConfig::builder()
        .max_chapters(cli.max_chapters)
        .text_slots(cli.text_slots)
        .image_slots(cli.image_slots)
        .max_attempts(cli.max_attempts)
        .retry_base_delay_ms(cli.retry_base_ms)
        .illustrate_on_ingest(!cli.defer_illustrations && !cli.no_images)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref image_model) = cli.image_model {
        builder = builder.image_model(image_model);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
