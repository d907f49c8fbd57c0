//! # edgequake-convert
//!
//! A conversion orchestration engine: accepts batches of uploaded files,
//! each with a requested target format, and turns them into converted
//! outputs through pluggable capability adapters.
//!
//! ## Why this crate?
//!
//! No single tool converts everything. LibreOffice handles office documents,
//! ffmpeg handles media, calibre handles e-books, pdfium renders PDF pages.
//! This crate puts one request model and one lifecycle in front of all of
//! them: a format registry decides what is legal, a router builds a plan of
//! at most two adapter stages (normalizing through PDF when no direct route
//! exists), and a supervisor runs each plan under a single deadline,
//! reclaiming every intermediate file whatever happens.
//!
//! ## Lifecycle
//!
//! ```text
//! batch (≤ 5 files)
//!  │
//!  ├─ 1. Validate  counts, domains, extensions (no filesystem access)
//!  ├─ 2. Route     direct adapter, or  input → pdf → target
//!  ├─ 3. Run       stages in order, one deadline per plan
//!  ├─ 4. Commit    staged output renamed into converted/
//!  ├─ 5. Abort     first failed file stops the batch
//!  └─ 6. Reclaim   inputs and intermediates deleted (3 attempts, 1 s apart)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_convert::{BatchSubmission, Engine, EngineConfig, FormatRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::new(EngineConfig::default());
//!
//!     let upload = engine.accept_upload("report.docx", "report.docx").await?;
//!     let mut batch = BatchSubmission::default();
//!     batch.push(upload, FormatRequest::new("document", "pdf"));
//!
//!     let result = engine.process_batch(batch).await?.into_result()?;
//!     for output in result.outputs() {
//!         println!("{output}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `fileconv` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-convert = { version = "0.1", default-features = false }
//! ```
//!
//! ## Domains
//!
//! | Domain | Adapter | External tool |
//! |--------|---------|---------------|
//! | `image`, `compressor` | image | none (`image` crate) |
//! | `pdf` | pdf-render, document | pdfium, LibreOffice |
//! | `document` | document | LibreOffice (`soffice`) |
//! | `audio`, `video` | media | ffmpeg |
//! | `archive` | archive | none (`zip`, `tar`, `sevenz-rust`) |
//! | `ebook` | ebook | calibre (`ebook-convert`) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod adapters;
pub mod artifact;
pub mod batch;
pub mod cleanup;
pub mod config;
pub mod engine;
pub mod error;
pub mod formats;
pub mod output;
pub mod progress;
pub mod request;
pub mod router;
pub mod supervisor;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use adapters::{Adapter, AdapterSet, ConvertOptions};
pub use artifact::ArtifactStore;
pub use batch::BatchCoordinator;
pub use cleanup::{Cleanup, CleanupOutcome, RetryPolicy, SweepReport};
pub use config::{EngineConfig, EngineConfigBuilder, ToolPaths, MAX_BATCH_FILES};
pub use engine::Engine;
pub use error::{AdapterError, ConvertError, ErrorKind, RoutingError, ValidationError};
pub use formats::Domain;
pub use output::{BatchFailure, BatchResult, FileResult, JobResult, JobStatus, OutputRef};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use request::{BatchId, BatchSubmission, ConversionRequest, FormatRequest, JobId, UploadedFile};
pub use router::{ConversionPlan, Router, Stage};
pub use supervisor::JobSupervisor;
