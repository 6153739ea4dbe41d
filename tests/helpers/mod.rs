//! Test doubles and a throwaway HTTP server for exercising the pipeline
//! without Postgres, R2 or the generation API.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

use photo_styler::{
    app_state::AppState,
    models::job::{JobStatus, NewJob, StyleJob},
    services::{
        fetcher::MediaFetcher,
        generation::{GenerationError, GenerationResult, ImageGenerator, InlineImage},
        job_store::{JobStore, StoreError},
        ledger::{CreditLedger, LedgerError},
        pipeline::StylePipeline,
        processor::{JobProcessor, ProcessorSettings},
        storage::{ObjectStore, ResultPublisher, StorageError},
    },
};

/// Smallest payload `image::guess_format` recognises as PNG.
pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

/// JPEG SOI marker followed by filler.
pub const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F'];

// ---------------------------------------------------------------------------
// Job store + ledger sharing one lock, so settlement is atomic
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Tables {
    jobs: Vec<StyleJob>,
    credits: HashMap<String, i32>,
    claimed_at: HashMap<Uuid, DateTime<Utc>>,
    enqueued: i64,
}

#[derive(Default)]
pub struct MemoryBackend {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_credits(&self, user_id: &str, credits: i32) {
        self.tables
            .lock()
            .unwrap()
            .credits
            .insert(user_id.to_string(), credits);
    }

    pub fn credits(&self, user_id: &str) -> Option<i32> {
        self.tables.lock().unwrap().credits.get(user_id).copied()
    }

    pub fn job(&self, job_id: Uuid) -> StyleJob {
        self.tables
            .lock()
            .unwrap()
            .jobs
            .iter()
            .find(|j| j.id == job_id)
            .cloned()
            .expect("job exists")
    }

    pub fn jobs(&self) -> Vec<StyleJob> {
        self.tables.lock().unwrap().jobs.clone()
    }

    /// Make every store call fail as if the database were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for MemoryBackend {
    async fn enqueue(&self, job: NewJob) -> Result<StyleJob, StoreError> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        // Distinct, increasing timestamps regardless of clock resolution
        tables.enqueued += 1;
        let created_at = Utc::now() + ChronoDuration::milliseconds(tables.enqueued);
        let job = job.into_pending(Uuid::new_v4(), created_at);
        tables.jobs.push(job.clone());
        Ok(job)
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<StyleJob>, StoreError> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables.jobs.iter().find(|j| j.id == job_id).cloned())
    }

    async fn pending_jobs(&self, limit: usize) -> Result<Vec<StyleJob>, StoreError> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        let mut pending: Vec<_> = tables
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|j| j.created_at);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn mark_processing(&self, job_id: Uuid) -> Result<bool, StoreError> {
        self.check()?;
        let mut guard = self.tables.lock().unwrap();
        let tables = &mut *guard;
        match tables
            .jobs
            .iter_mut()
            .find(|j| j.id == job_id && j.status == JobStatus::Pending)
        {
            Some(job) => {
                job.status = JobStatus::Processing;
                tables.claimed_at.insert(job_id, Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_completed(
        &self,
        job_id: Uuid,
        user_id: &str,
        result_image_url: &str,
    ) -> Result<i32, StoreError> {
        self.check()?;
        let mut guard = self.tables.lock().unwrap();
        let tables = &mut *guard;

        let balance = tables.credits.get_mut(user_id).filter(|c| **c >= 1);
        let Some(balance) = balance else {
            return Err(StoreError::InsufficientCredit(user_id.to_string()));
        };

        let Some(job) = tables
            .jobs
            .iter_mut()
            .find(|j| j.id == job_id && j.status == JobStatus::Processing)
        else {
            return Err(StoreError::NotClaimed(job_id));
        };

        *balance -= 1;
        job.status = JobStatus::Completed;
        job.result_image_url = Some(result_image_url.to_string());
        job.completed_at = Some(Utc::now());
        Ok(*balance)
    }

    async fn mark_failed(&self, job_id: Uuid, error_message: &str) -> Result<(), StoreError> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        if let Some(job) = tables
            .jobs
            .iter_mut()
            .find(|j| j.id == job_id && !j.status.is_terminal())
        {
            job.status = JobStatus::Failed;
            job.error_message = Some(error_message.to_string());
        }
        Ok(())
    }

    async fn fail_stale(
        &self,
        claimed_before: DateTime<Utc>,
        error_message: &str,
    ) -> Result<Vec<Uuid>, StoreError> {
        self.check()?;
        let mut guard = self.tables.lock().unwrap();
        let tables = &mut *guard;
        let mut failed = Vec::new();
        for job in tables
            .jobs
            .iter_mut()
            .filter(|j| j.status == JobStatus::Processing)
        {
            let claimed = tables.claimed_at.get(&job.id).copied().unwrap_or(job.created_at);
            if claimed < claimed_before {
                job.status = JobStatus::Failed;
                job.error_message = Some(error_message.to_string());
                failed.push(job.id);
            }
        }
        Ok(failed)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check()
    }
}

#[async_trait]
impl CreditLedger for MemoryBackend {
    async fn balance(&self, user_id: &str) -> Result<i32, LedgerError> {
        self.credits(user_id)
            .ok_or_else(|| LedgerError::ProfileNotFound(user_id.to_string()))
    }

    async fn decrement(&self, user_id: &str) -> Result<i32, LedgerError> {
        let mut tables = self.tables.lock().unwrap();
        match tables.credits.get_mut(user_id) {
            None => Err(LedgerError::ProfileNotFound(user_id.to_string())),
            Some(c) if *c < 1 => Err(LedgerError::InsufficientCredit(user_id.to_string())),
            Some(c) => {
                *c -= 1;
                Ok(*c)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Object storage
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
    uploads: AtomicUsize,
    reject_prefix: Mutex<Option<String>>,
}

impl MemoryObjectStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reject uploads whose key starts with `prefix`.
    pub fn reject(&self, prefix: &str) {
        *self.reject_prefix.lock().unwrap() = Some(prefix.to_string());
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn object(&self, key: &str) -> Option<(Vec<u8>, String)> {
        self.objects.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError> {
        if let Some(prefix) = self.reject_prefix.lock().unwrap().as_deref() {
            if key.starts_with(prefix) {
                return Err(StorageError::PublishFailed {
                    key: key.to_string(),
                    reason: "bucket rejected upload".into(),
                });
            }
        }
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (data.to_vec(), content_type.to_string()));
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://cdn.test/{key}")
    }
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

/// Replays queued results, then falls back to returning a PNG.
#[derive(Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<GenerationResult>>,
    calls: Mutex<Vec<(String, usize)>>,
}

impl ScriptedGenerator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, result: GenerationResult) {
        self.script.lock().unwrap().push_back(result);
    }

    /// `(prompt, image count)` per call, in order.
    pub fn calls(&self) -> Vec<(String, usize)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        prompt: &str,
        images: &[InlineImage],
    ) -> Result<GenerationResult, GenerationError> {
        if !(1..=2).contains(&images.len()) {
            return Err(GenerationError::InvalidImageCount(images.len()));
        }
        self.calls
            .lock()
            .unwrap()
            .push((prompt.to_string(), images.len()));
        tokio::task::yield_now().await;

        Ok(self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(GenerationResult::Image {
                bytes: PNG_BYTES.to_vec(),
                mime_type: "image/png".into(),
            }))
    }
}

// ---------------------------------------------------------------------------
// Local HTTP server standing in for image hosting and the generation API
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct FakeGemini {
    pub status: Arc<Mutex<Option<StatusCode>>>,
    pub body: Arc<Mutex<serde_json::Value>>,
    pub last_request: Arc<Mutex<Option<serde_json::Value>>>,
}

impl FakeGemini {
    pub fn respond(&self, status: StatusCode, body: serde_json::Value) {
        *self.status.lock().unwrap() = Some(status);
        *self.body.lock().unwrap() = body;
    }
}

async fn photo() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "image/jpeg")], JPEG_BYTES)
}

/// 64 KiB JPEG with a `Content-Length` header.
async fn large_photo() -> impl IntoResponse {
    let mut bytes = JPEG_BYTES.to_vec();
    bytes.resize(64 * 1024, 0);
    ([(header::CONTENT_TYPE, "image/jpeg")], bytes)
}

/// 64 KiB JPEG sent chunked, so no length is announced.
async fn streamed_photo() -> impl IntoResponse {
    let chunks = (0..64).map(|_| Ok::<_, std::io::Error>(vec![0u8; 1024]));
    (
        [(header::CONTENT_TYPE, "image/jpeg")],
        Body::from_stream(futures::stream::iter(chunks)),
    )
}

async fn html_page() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        "<html><body>Access denied</body></html>",
    )
}

async fn generate_content(
    State(fake): State<FakeGemini>,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    *fake.last_request.lock().unwrap() = Some(body);
    let status = fake.status.lock().unwrap().unwrap_or(StatusCode::OK);
    let body = fake.body.lock().unwrap().clone();
    (status, Json(body))
}

/// Serves `/photo.jpg`, `/large.jpg`, `/stream.jpg`, `/missing.jpg` (404)
/// and `/page.html` (HTML), and answers `POST /models/...` like the
/// generation API.
pub async fn spawn_test_server(fake: FakeGemini) -> String {
    let app = Router::new()
        .route("/photo.jpg", get(photo))
        .route("/large.jpg", get(large_photo))
        .route("/stream.jpg", get(streamed_photo))
        .route("/missing.jpg", get(|| async { StatusCode::NOT_FOUND }))
        .route("/page.html", get(html_page))
        .route("/models/{*rest}", post(generate_content))
        .with_state(fake);

    serve(app).await
}

/// Bind an ephemeral port and serve `app` in the background.
pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });
    format!("http://{addr}")
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

pub struct Harness {
    pub backend: Arc<MemoryBackend>,
    pub objects: Arc<MemoryObjectStore>,
    pub generator: Arc<ScriptedGenerator>,
    pub pipeline: Arc<StylePipeline>,
    pub processor: Arc<JobProcessor>,
    pub base_url: String,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_settings(ProcessorSettings {
            batch_size: 5,
            inter_job_delay: Duration::ZERO,
            poll_interval: Duration::from_millis(50),
            ..ProcessorSettings::default()
        })
        .await
    }

    pub async fn with_settings(settings: ProcessorSettings) -> Self {
        let base_url = spawn_test_server(FakeGemini::default()).await;
        let backend = MemoryBackend::new();
        let objects = MemoryObjectStore::new();
        let generator = ScriptedGenerator::new();

        let pipeline = Arc::new(StylePipeline::new(
            backend.clone(),
            generator.clone(),
            MediaFetcher::new(Duration::from_secs(5)).expect("fetcher"),
            ResultPublisher::new(objects.clone()),
        ));
        let processor = Arc::new(JobProcessor::new(
            backend.clone(),
            Arc::clone(&pipeline),
            settings,
        ));

        Self {
            backend,
            objects,
            generator,
            pipeline,
            processor,
            base_url,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn enqueue(&self, user_id: &str, path: &str) -> StyleJob {
        self.enqueue_job(user_id, &self.url(path), None).await
    }

    pub async fn enqueue_job(
        &self,
        user_id: &str,
        input_url: &str,
        input2_url: Option<&str>,
    ) -> StyleJob {
        self.backend
            .enqueue(NewJob {
                user_id: user_id.to_string(),
                style_id: "anime".into(),
                style_name: "Anime".into(),
                prompt: "anime style, cel shaded".into(),
                input_image_url: input_url.to_string(),
                input_image2_url: input2_url.map(str::to_string),
            })
            .await
            .expect("enqueue")
    }

    pub fn app_state(&self, wake: Arc<Notify>) -> AppState {
        AppState::new(
            self.backend.clone(),
            Arc::clone(&self.pipeline),
            Arc::clone(&self.processor),
            wake,
        )
    }
}

/// Status/result/error consistency that must hold after every pass.
pub fn assert_job_invariants(jobs: &[StyleJob]) {
    for job in jobs {
        assert_eq!(
            job.status == JobStatus::Completed,
            job.result_image_url.is_some(),
            "result url iff completed for {job:?}"
        );
        assert_eq!(
            job.status == JobStatus::Failed,
            job.error_message.is_some(),
            "error message iff failed for {job:?}"
        );
    }
}
