//! CLI binary for edgequake-convert.
//!
//! A thin shim over the library crate: maps flags to `EngineConfig`, copies
//! the named files into intake, runs one batch and prints the outcome.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_convert::{
    BatchProgressCallback, BatchResult, BatchSubmission, Domain, Engine, EngineConfig,
    FormatRequest, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

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

// ── CLI progress callback using indicatif ────────────────────────────────────

struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:32.green/238}] {pos}/{len} files  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        self.bar.set_length(total_files as u64);
    }

    fn on_file_start(&self, _index: usize, _total: usize, original_name: &str) {
        self.bar.set_message(original_name.to_string());
    }

    fn on_file_complete(&self, index: usize, total: usize, output: &str) {
        self.bar.println(format!(
            "  {} {:>2}/{:<2}  {}",
            green("✓"),
            index + 1,
            total,
            dim(output)
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, index: usize, total: usize, error: &str) {
        self.bar.println(format!(
            "  {} {:>2}/{:<2}  {}",
            red("✗"),
            index + 1,
            total,
            red(error)
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, _total: usize, _success_count: usize) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One format for every file
  fileconv convert -f document:pdf report.docx notes.odt

  # One format per file, in order
  fileconv convert -f image:webp -f audio:mp3 photo.png talk.wav

  # Compress with a quality preset, then fetch the output and delete it
  fileconv convert -f compressor:jpg:low big.png --fetch ./out

  # Show the stages a conversion would use
  fileconv plan document report.docx jpg

  # Reclaim expired outputs and uploads
  fileconv sweep

DOMAINS:
  image, compressor, pdf, document, audio, video, archive, ebook
  Run `fileconv formats` for the outputs each one accepts.

ENVIRONMENT VARIABLES:
  FILECONV_INTAKE_DIR      Upload directory (default ./intake)
  FILECONV_CONVERTED_DIR   Output directory (default ./converted)
  FILECONV_TIMEOUT         Per-file deadline in seconds (default 120)
  FILECONV_SOFFICE         LibreOffice binary
  FILECONV_FFMPEG          ffmpeg binary
  FILECONV_EBOOK_CONVERT   calibre ebook-convert binary
  PDFIUM_LIB_PATH          Directory containing libpdfium
"#;

/// Convert files between formats through pluggable converters.
#[derive(Parser, Debug)]
#[command(
    name = "fileconv",
    version,
    about = "Batch file conversion with format routing, deadlines and cleanup",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    engine: EngineArgs,

    /// Output structured JSON instead of text.
    #[arg(long, global = true, env = "FILECONV_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "FILECONV_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "FILECONV_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "FILECONV_QUIET")]
    quiet: bool,
}

#[derive(Args, Debug)]
struct EngineArgs {
    /// Upload directory.
    #[arg(long, global = true, env = "FILECONV_INTAKE_DIR", default_value = "intake")]
    intake_dir: PathBuf,

    /// Output directory.
    #[arg(long, global = true, env = "FILECONV_CONVERTED_DIR", default_value = "converted")]
    converted_dir: PathBuf,

    /// Per-file deadline in seconds, covering every stage.
    #[arg(long, global = true, env = "FILECONV_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// Hours an unfetched output is kept before the sweep reclaims it.
    #[arg(long, global = true, env = "FILECONV_RETENTION_HOURS", default_value_t = 24)]
    retention_hours: u64,

    #[arg(long, global = true, env = "FILECONV_SOFFICE")]
    soffice: Option<PathBuf>,

    #[arg(long, global = true, env = "FILECONV_FFMPEG")]
    ffmpeg: Option<PathBuf>,

    #[arg(long, global = true, env = "FILECONV_EBOOK_CONVERT")]
    ebook_convert: Option<PathBuf>,

    #[arg(long, global = true, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert up to five files in one batch.
    Convert {
        /// Files to convert.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// DOMAIN:TARGET[:HINT]. Give once for all files, or once per file.
        #[arg(short, long = "format", required = true)]
        formats: Vec<String>,

        /// Copy outputs into this directory, then delete them from the engine.
        #[arg(long)]
        fetch: Option<PathBuf>,
    },
    /// Show the conversion plan without running it.
    Plan {
        domain: String,
        input: String,
        target: String,
    },
    /// List domains and the outputs they accept.
    Formats,
    /// Reclaim outputs and uploads older than the retention window.
    Sweep,
    /// Delete a converted output by file name.
    Delete { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    let converting = matches!(cli.command, Command::Convert { .. });
    let progress: Option<ProgressCallback> = if show_progress && converting {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let engine = Engine::new(build_config(&cli.engine, progress)?);

    match cli.command {
        Command::Convert {
            files,
            formats,
            fetch,
        } => {
            let result = convert(&engine, &files, &formats).await?;
            if let Some(dir) = fetch {
                fetch_outputs(&engine, &result, &dir).await?;
            }
            report(&result, cli.json, cli.quiet)?;
            if let Some(f) = &result.failure {
                bail!("file {} ('{}') failed: {}", f.index + 1, f.original_name, f.message);
            }
        }
        Command::Plan {
            domain,
            input,
            target,
        } => {
            let plan = engine
                .plan(&domain, &input, &target)
                .context("No conversion plan")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&plan.summary())?);
            } else {
                for (i, line) in plan.summary().iter().enumerate() {
                    println!("{}. {line}", i + 1);
                }
            }
        }
        Command::Formats => {
            if cli.json {
                let table: Vec<_> = Domain::ALL
                    .iter()
                    .map(|d| serde_json::json!({ "domain": d.as_str(), "outputs": d.outputs() }))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&table)?);
            } else {
                for d in Domain::ALL {
                    println!("{:<11} {}", bold(d.as_str()), d.outputs().join(", "));
                }
            }
        }
        Command::Sweep => {
            let reports = engine.sweep().await;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else if !cli.quiet {
                for r in reports {
                    eprintln!(
                        "{}  scanned {}  reclaimed {}  kept {}  failed {}",
                        r.directory.display(),
                        r.scanned,
                        r.reclaimed,
                        r.kept,
                        r.failed
                    );
                }
            }
        }
        Command::Delete { name } => {
            let outcome = engine.delete_output(&name).await?;
            if cli.json {
                println!("{}", serde_json::to_string(&outcome)?);
            } else if !cli.quiet {
                eprintln!("{name}: {outcome:?}");
            }
        }
    }

    Ok(())
}

/// Map CLI args to `EngineConfig`.
fn build_config(args: &EngineArgs, progress: Option<ProgressCallback>) -> Result<EngineConfig> {
    let mut builder = EngineConfig::builder()
        .intake_dir(&args.intake_dir)
        .converted_dir(&args.converted_dir)
        .job_timeout_secs(args.timeout)
        .output_retention_secs(args.retention_hours * 60 * 60);
    if let Some(p) = &args.soffice {
        builder = builder.soffice(p);
    }
    if let Some(p) = &args.ffmpeg {
        builder = builder.ffmpeg(p);
    }
    if let Some(p) = &args.ebook_convert {
        builder = builder.ebook_convert(p);
    }
    if let Some(p) = &args.pdfium_lib {
        builder = builder.pdfium_library(p);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

/// Parse `DOMAIN:TARGET[:HINT]`.
fn parse_format(s: &str) -> Result<FormatRequest> {
    let mut parts = s.splitn(3, ':');
    let (Some(domain), Some(target)) = (parts.next(), parts.next()) else {
        bail!("format '{s}' must look like DOMAIN:TARGET[:HINT]");
    };
    let format = FormatRequest::new(domain, target);
    Ok(match parts.next() {
        Some(hint) if !hint.is_empty() => format.with_sub_section(hint),
        _ => format,
    })
}

async fn convert(engine: &Engine, files: &[PathBuf], formats: &[String]) -> Result<BatchResult> {
    let mut formats = formats
        .iter()
        .map(|s| parse_format(s))
        .collect::<Result<Vec<_>>>()?;
    // A single format applies to every file; anything else goes through
    // unchanged and the engine checks the pairing.
    if formats.len() == 1 && files.len() > 1 {
        formats = vec![formats[0].clone(); files.len()];
    }

    let mut uploads = Vec::with_capacity(files.len());
    for path in files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("'{}' has no file name", path.display()))?;
        uploads.push(
            engine
                .accept_upload(path, &name)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?,
        );
    }

    engine
        .process_batch(BatchSubmission::new(uploads, formats))
        .await
        .context("Batch rejected")
}

async fn fetch_outputs(engine: &Engine, result: &BatchResult, dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    for output in result.outputs() {
        let src = engine.resolve_output(&output.file_name).await?;
        let dest = dir.join(&output.file_name);
        tokio::fs::copy(&src, &dest)
            .await
            .with_context(|| format!("Failed to copy to {}", dest.display()))?;
        engine.delete_output(&output.file_name).await?;
    }
    Ok(())
}

fn report(result: &BatchResult, json: bool, quiet: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(result).context("Failed to serialise result")?
        );
        return Ok(());
    }
    for output in result.outputs() {
        println!("{output}");
    }
    if !quiet {
        let done = result.outputs().len();
        eprintln!(
            "{}  {}/{} files  {}ms",
            if result.is_success() { green("✔") } else { red("✘") },
            bold(&done.to_string()),
            result.files.len(),
            result.duration_ms
        );
    }
    Ok(())
}
