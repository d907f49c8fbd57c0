//! Integration tests for the conversion engine.
//!
//! The image adapter needs no external tool, so image batches run for real.
//! Everything that would need LibreOffice, ffmpeg or calibre is exercised
//! with in-test adapters registered through `Engine::with_adapters`.

use async_trait::async_trait;
use edgequake_convert::{
    Adapter, AdapterError, AdapterSet, BatchProgressCallback, BatchSubmission, CleanupOutcome,
    ConvertError, ConvertOptions, Domain, Engine, EngineConfig, ErrorKind, FormatRequest,
    JobStatus, UploadedFile, ValidationError,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

// ── Test helpers ─────────────────────────────────────────────────────────────

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn config(&self) -> edgequake_convert::EngineConfigBuilder {
        EngineConfig::builder()
            .intake_dir(self.dir.path().join("intake"))
            .converted_dir(self.dir.path().join("converted"))
            .cleanup_retry_delay_ms(1)
    }

    fn engine(&self) -> Engine {
        Engine::new(self.config().build().unwrap())
    }

    /// A small real JPEG outside the engine's directories.
    fn jpeg(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        image::RgbImage::from_pixel(8, 8, image::Rgb([200, 30, 30]))
            .save_with_format(&path, image::ImageFormat::Jpeg)
            .unwrap();
        path
    }

    fn file(&self, name: &str, body: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn list(&self, sub: &str) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(self.dir.path().join(sub)) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

async fn upload(engine: &Engine, path: &Path) -> UploadedFile {
    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    engine.accept_upload(path, &name).await.unwrap()
}

/// Copies input to output for one (domain, from, to) triple.
struct CopyAdapter {
    domain: Domain,
    from: &'static str,
    to: &'static str,
    seen: Arc<Mutex<Vec<PathBuf>>>,
}

impl CopyAdapter {
    fn new(domain: Domain, from: &'static str, to: &'static str) -> Self {
        Self {
            domain,
            from,
            to,
            seen: Arc::default(),
        }
    }
}

#[async_trait]
impl Adapter for CopyAdapter {
    fn name(&self) -> &'static str {
        "copy"
    }
    fn supports(&self, domain: Domain, from: &str, to: &str) -> bool {
        domain == self.domain && from == self.from && to == self.to
    }
    fn accepts_input(&self, extension: &str) -> bool {
        extension == self.from
    }
    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        _: &ConvertOptions,
    ) -> Result<(), AdapterError> {
        tokio::fs::copy(input, output)
            .await
            .map_err(|source| AdapterError::Io {
                path: output.to_path_buf(),
                source,
            })?;
        self.seen.lock().unwrap().push(output.to_path_buf());
        Ok(())
    }
}

/// Writes a partial output and waits for cancellation.
struct StallingAdapter;

#[async_trait]
impl Adapter for StallingAdapter {
    fn name(&self) -> &'static str {
        "stall"
    }
    fn supports(&self, domain: Domain, from: &str, to: &str) -> bool {
        domain == Domain::Video && from == "mp4" && to == "webm"
    }
    fn accepts_input(&self, extension: &str) -> bool {
        extension == "mp4"
    }
    async fn convert(
        &self,
        _: &Path,
        output: &Path,
        options: &ConvertOptions,
    ) -> Result<(), AdapterError> {
        tokio::fs::write(output, b"partial").await.unwrap();
        options.cancel.cancelled().await;
        Err(AdapterError::Cancelled { adapter: "stall" })
    }
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl BatchProgressCallback for Recorder {
    fn on_batch_start(&self, total_files: usize) {
        self.events.lock().unwrap().push(format!("start {total_files}"));
    }
    fn on_file_start(&self, index: usize, _: usize, name: &str) {
        self.events.lock().unwrap().push(format!("file {index} {name}"));
    }
    fn on_file_complete(&self, index: usize, _: usize, _: &str) {
        self.events.lock().unwrap().push(format!("done {index}"));
    }
    fn on_file_error(&self, index: usize, _: usize, _: &str) {
        self.events.lock().unwrap().push(format!("error {index}"));
    }
    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("end {success_count}/{total_files}"));
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn image_batch_produces_one_output_and_reclaims_input() {
    let ws = Workspace::new();
    let engine = ws.engine();
    let file = upload(&engine, &ws.jpeg("a.jpg")).await;
    assert_eq!(ws.list("intake").len(), 1);

    let result = engine
        .process_batch(BatchSubmission::new(
            vec![file],
            vec![FormatRequest::new("image", "png")],
        ))
        .await
        .unwrap();

    assert!(result.is_success(), "{result:?}");
    let outputs = result.outputs();
    assert_eq!(outputs.len(), 1);
    let name = &outputs[0].file_name;
    assert!(name.starts_with("a-") && name.ends_with(".png"), "{name}");
    assert_eq!(outputs[0].to_string(), format!("image/{name}"));

    assert_eq!(ws.list("converted"), vec![name.clone()]);
    assert!(ws.list("intake").is_empty());

    let path = engine.resolve_output(name).await.unwrap();
    let decoded = image::open(path).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (8, 8));
}

#[tokio::test]
async fn chained_plan_leaves_no_intermediate() {
    let ws = Workspace::new();
    let first = CopyAdapter::new(Domain::Document, "docx", "pdf");
    let seen = first.seen.clone();
    let adapters = AdapterSet::empty()
        .with(first)
        .with(CopyAdapter::new(Domain::Document, "pdf", "jpg"));
    let engine = Engine::with_adapters(ws.config().build().unwrap(), adapters);

    let file = upload(&engine, &ws.file("report.docx", b"docx bytes")).await;
    let result = engine
        .process_batch(BatchSubmission::new(
            vec![file],
            vec![FormatRequest::new("document", "jpg")],
        ))
        .await
        .unwrap();

    assert!(result.is_success(), "{result:?}");
    assert_eq!(result.files[0].result.stages, 2);
    let intermediate = seen.lock().unwrap()[0].clone();
    assert!(!intermediate.exists(), "{} left behind", intermediate.display());
    assert!(ws.list("intake").is_empty());
    let converted = ws.list("converted");
    assert_eq!(converted.len(), 1);
    assert!(converted[0].starts_with("report-") && converted[0].ends_with(".jpg"));
}

#[tokio::test]
async fn deadline_cancels_stalled_job() {
    let ws = Workspace::new();
    let config = ws.config().job_timeout_secs(1).kill_grace_ms(500).build().unwrap();
    let engine = Engine::with_adapters(config, AdapterSet::empty().with(StallingAdapter));

    let file = upload(&engine, &ws.file("clip.mp4", b"not really video")).await;
    let started = std::time::Instant::now();
    let result = engine
        .process_batch(BatchSubmission::new(
            vec![file],
            vec![FormatRequest::new("video", "webm")],
        ))
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    let job = &result.files[0].result;
    assert_eq!(job.status, JobStatus::Timeout);
    let failure = result.failure.expect("batch should fail");
    assert_eq!(failure.kind, ErrorKind::Timeout);
    assert_eq!(failure.domain, Domain::Video);
    assert!(failure.message.contains("stage 1/1"), "{}", failure.message);
    assert!(ws.list("converted").is_empty());
    assert!(ws.list("intake").is_empty());
}

#[tokio::test]
async fn count_mismatch_rejects_before_any_work() {
    let ws = Workspace::new();
    let engine = ws.engine();
    let mut files = Vec::new();
    for name in ["a.jpg", "b.jpg", "c.jpg"] {
        files.push(upload(&engine, &ws.jpeg(name)).await);
    }

    let err = engine
        .process_batch(BatchSubmission::new(
            files,
            vec![
                FormatRequest::new("image", "png"),
                FormatRequest::new("image", "png"),
            ],
        ))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ConvertError::Validation(ValidationError::CountMismatch { files: 3, formats: 2 })
    ));
    // Rejected batches do not own their uploads; the sweep collects them.
    assert_eq!(ws.list("intake").len(), 3);
    assert!(ws.list("converted").is_empty());
}

#[tokio::test]
async fn failure_aborts_rest_of_batch_but_keeps_earlier_outputs() {
    let ws = Workspace::new();
    let recorder = Arc::new(Recorder::default());
    let config = ws.config().progress_callback(recorder.clone()).build().unwrap();
    let engine = Engine::new(config);

    let good = upload(&engine, &ws.jpeg("good.jpg")).await;
    let bad = upload(&engine, &ws.file("bad.jpg", b"definitely not a jpeg")).await;
    let never = upload(&engine, &ws.jpeg("never.jpg")).await;

    let result = engine
        .process_batch(BatchSubmission::new(
            vec![good, bad, never],
            vec![FormatRequest::new("image", "webp"); 3],
        ))
        .await
        .unwrap();

    assert!(!result.is_success());
    assert_eq!(result.files.len(), 2);
    let failure = result.failure.as_ref().unwrap();
    assert_eq!(failure.index, 1);
    assert_eq!(failure.original_name, "bad.jpg");
    assert_eq!(failure.kind, ErrorKind::Adapter);

    let converted = ws.list("converted");
    assert_eq!(converted.len(), 1);
    assert!(converted[0].starts_with("good-"));
    assert!(ws.list("intake").is_empty(), "all inputs reclaimed");

    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "start 3",
            "file 0 good.jpg",
            "done 0",
            "file 1 bad.jpg",
            "error 1",
            "end 1/3",
        ]
    );

    let err = result.into_result().unwrap_err();
    assert!(err.to_string().contains("bad.jpg"));
}

#[tokio::test]
async fn concurrent_batches_with_same_names_do_not_collide() {
    let ws = Workspace::new();
    let engine = ws.engine();
    let source = ws.jpeg("same.jpg");

    let mut handles = Vec::new();
    for _ in 0..4 {
        let file = upload(&engine, &source).await;
        handles.push(engine.spawn_batch(BatchSubmission::new(
            vec![file],
            vec![FormatRequest::new("compressor", "jpg").with_sub_section("low")],
        )));
    }

    let mut names = Vec::new();
    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        assert!(result.is_success(), "{result:?}");
        names.push(result.outputs()[0].file_name.clone());
    }
    names.sort();
    names.dedup();
    assert_eq!(names.len(), 4);
    assert_eq!(ws.list("converted").len(), 4);
    assert!(ws.list("intake").is_empty());
}

#[tokio::test]
async fn delete_output_is_idempotent() {
    let ws = Workspace::new();
    let engine = ws.engine();
    let file = upload(&engine, &ws.jpeg("x.jpg")).await;
    let result = engine
        .process_batch(BatchSubmission::new(
            vec![file],
            vec![FormatRequest::new("image", "bmp")],
        ))
        .await
        .unwrap();
    let name = result.outputs()[0].file_name.clone();

    assert_ok!(engine.resolve_output(&name).await);
    assert_eq!(assert_ok!(engine.delete_output(&name).await), CleanupOutcome::Removed);
    assert_eq!(assert_ok!(engine.delete_output(&name).await), CleanupOutcome::AlreadyGone);
    assert!(matches!(
        assert_err!(engine.resolve_output(&name).await),
        ConvertError::OutputNotFound(_)
    ));
    assert!(matches!(
        assert_err!(engine.delete_output("../intake/x.jpg").await),
        ConvertError::InvalidOutputName(_)
    ));
}

#[tokio::test]
async fn sweep_reclaims_only_expired_entries() {
    let ws = Workspace::new();
    let engine = Engine::new(ws.config().output_retention_secs(3600).build().unwrap());
    engine.store().ensure_dirs().await.unwrap();

    let converted = ws.dir.path().join("converted");
    let stale = converted.join("old-output.png");
    let fresh = converted.join("new-output.png");
    std::fs::write(&stale, b"old").unwrap();
    std::fs::write(&fresh, b"new").unwrap();
    std::fs::File::options()
        .write(true)
        .open(&stale)
        .unwrap()
        .set_modified(SystemTime::now() - Duration::from_secs(2 * 3600))
        .unwrap();

    let reports = engine.sweep().await;
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].reclaimed, 1);
    assert_eq!(reports[0].kept, 1);
    assert_eq!(ws.list("converted"), vec!["new-output.png".to_string()]);
}

#[test]
fn plan_only_needs_names() {
    let ws = Workspace::new();
    let engine = ws.engine();
    let plan = engine.plan("pdf", "slides.pptx", "png").unwrap();
    assert_eq!(plan.len(), 2);
    assert_eq!(plan.target_extension(), "png");
    assert!(!ws.dir.path().join("intake").exists());
}
