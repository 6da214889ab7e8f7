//! In-process harness: memory store and queue, local artifact storage and
//! scripted AI backends.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;
use uuid::Uuid;

use media_content_jobs::app_state::AppState;
use media_content_jobs::auth::issue_token;
use media_content_jobs::models::job::{
    ClientId, InputDescriptor, Job, JobOptions, MediaKind, UserId,
};
use media_content_jobs::pipeline::{Pipeline, PipelineConfig, RunOutcome};
use media_content_jobs::routes::build_router;
use media_content_jobs::services::access::{
    AccessGate, CreditLedger, StaticClientDirectory, UnmeteredCredits,
};
use media_content_jobs::services::ai::{
    BackendError, ContentGenerator, Prompt, Segment, Transcriber, Transcript, VisionAnalyzer,
};
use media_content_jobs::services::ffmpeg::{AudioExtractor, ExtractError};
use media_content_jobs::services::queue::{MemoryTaskQueue, TaskQueue};
use media_content_jobs::services::storage::{ArtifactStore, LocalArtifactStore};
use media_content_jobs::store::{JobRepository, JobStore, MemoryJobRepository};

use crate::fixtures::GENERATED_RESPONSE;

pub const SECRET: &str = "test-secret";
pub const ALICE: UserId = 1;
pub const BOB: UserId = 2;
pub const ALICE_CLIENT: ClientId = 7;
pub const BOB_CLIENT: ClientId = 8;
pub const MAX_UPLOAD_BYTES: usize = 1024 * 1024;

// ---------------------------------------------------------------------------
// Scripted backends
// ---------------------------------------------------------------------------

/// Returns scripted results in order, then a default transcript.
#[derive(Default)]
pub struct ScriptedTranscriber {
    script: Mutex<VecDeque<Result<Transcript, BackendError>>>,
    calls: AtomicUsize,
    languages: Mutex<Vec<Option<String>>>,
}

impl ScriptedTranscriber {
    pub fn push(&self, result: Result<Transcript, BackendError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn languages(&self) -> Vec<Option<String>> {
        self.languages.lock().unwrap().clone()
    }
}

pub fn sample_transcript() -> Transcript {
    Transcript {
        text: "Today we cook pasta.".to_string(),
        segments: vec![Segment {
            start: 0.0,
            end: 4.2,
            text: "Today we cook pasta.".to_string(),
        }],
        language: Some("en".to_string()),
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(
        &self,
        _audio: &[u8],
        language: Option<&str>,
    ) -> Result<Transcript, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.languages
            .lock()
            .unwrap()
            .push(language.map(str::to_string));
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(sample_transcript()))
    }
}

#[derive(Default)]
pub struct FakeVision {
    calls: AtomicUsize,
}

impl FakeVision {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionAnalyzer for FakeVision {
    async fn describe(&self, _image: &[u8]) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("A plate of spaghetti on a wooden table".to_string())
    }
}

/// Returns scripted responses in order, then [`GENERATED_RESPONSE`].
#[derive(Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<String, BackendError>>>,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedGenerator {
    pub fn push(&self, result: Result<String, BackendError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &Prompt) -> Result<String, BackendError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(GENERATED_RESPONSE.to_string()))
    }
}

#[derive(Default)]
pub struct FakeExtractor {
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl FakeExtractor {
    pub fn fail_next(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioExtractor for FakeExtractor {
    async fn extract_audio(&self, _video: &[u8], _extension: &str) -> Result<Vec<u8>, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.swap(false, Ordering::SeqCst) {
            return Err(ExtractError::Failed {
                status: "exit status: 1".to_string(),
                stderr: "moov atom not found".to_string(),
            });
        }
        Ok(b"ID3\x03\x00extracted-audio".to_vec())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub repo: MemoryJobRepository,
    pub store: Arc<JobStore>,
    pub queue: MemoryTaskQueue,
    pub artifacts: Arc<LocalArtifactStore>,
    pub credits: Arc<dyn CreditLedger>,
    pub transcriber: Arc<ScriptedTranscriber>,
    pub vision: Arc<FakeVision>,
    pub generator: Arc<ScriptedGenerator>,
    pub extractor: Arc<FakeExtractor>,
    pub pipeline: Arc<Pipeline>,
    root: PathBuf,
}

fn clients() -> StaticClientDirectory {
    StaticClientDirectory::new()
        .with_client(ALICE_CLIENT, ALICE)
        .with_client(BOB_CLIENT, BOB)
}

impl Harness {
    pub fn new() -> Self {
        Self::with_credits(Arc::new(UnmeteredCredits))
    }

    pub fn with_credits(credits: Arc<dyn CreditLedger>) -> Self {
        let repo = MemoryJobRepository::new();
        Self::with_repository(repo.clone(), Arc::new(repo), credits)
    }

    /// Build around a custom repository; `repo` is kept for inspection.
    pub fn with_repository(
        repo: MemoryJobRepository,
        backend: Arc<dyn JobRepository>,
        credits: Arc<dyn CreditLedger>,
    ) -> Self {
        let root = std::env::temp_dir().join(format!("media-jobs-test-{}", Uuid::new_v4()));
        let store = Arc::new(JobStore::new(backend, Arc::new(clients())));
        let artifacts = Arc::new(LocalArtifactStore::new(&root));
        let transcriber = Arc::new(ScriptedTranscriber::default());
        let vision = Arc::new(FakeVision::default());
        let generator = Arc::new(ScriptedGenerator::default());
        let extractor = Arc::new(FakeExtractor::default());

        let pipeline = Arc::new(Pipeline::new(
            store.clone(),
            artifacts.clone(),
            extractor.clone(),
            transcriber.clone(),
            vision.clone(),
            generator.clone(),
            PipelineConfig {
                retry_backoff: Duration::ZERO,
            },
        ));

        Self {
            repo,
            store,
            queue: MemoryTaskQueue::new(),
            artifacts,
            credits,
            transcriber,
            vision,
            generator,
            extractor,
            pipeline,
            root,
        }
    }

    /// A pipeline sharing this harness's store and storage but using a
    /// different transcriber.
    pub fn pipeline_with_transcriber(&self, transcriber: Arc<dyn Transcriber>) -> Pipeline {
        Pipeline::new(
            self.store.clone(),
            self.artifacts.clone(),
            self.extractor.clone(),
            transcriber,
            self.vision.clone(),
            self.generator.clone(),
            PipelineConfig {
                retry_backoff: Duration::ZERO,
            },
        )
    }

    pub fn router(&self) -> Router {
        self.router_with_queue(Arc::new(self.queue.clone()))
    }

    pub fn router_with_queue(&self, queue: Arc<dyn TaskQueue>) -> Router {
        let state = AppState::new(
            self.store.clone(),
            AccessGate::new(Arc::new(clients()), self.credits.clone()),
            queue,
            self.artifacts.clone(),
            SECRET,
        );
        build_router(state, MAX_UPLOAD_BYTES)
    }

    /// Store `data` and create a pending job for it, bypassing HTTP.
    pub async fn seed_job(
        &self,
        owner: UserId,
        filename: &str,
        kind: MediaKind,
        data: &[u8],
        options: JobOptions,
    ) -> Job {
        let key = format!("uploads/{owner}/{}-{filename}", Uuid::new_v4());
        self.artifacts
            .put(&key, data, "application/octet-stream")
            .await
            .unwrap();
        self.store
            .create(
                owner,
                None,
                InputDescriptor {
                    artifact_key: key,
                    media_kind: kind,
                    original_filename: filename.to_string(),
                    content_type: None,
                },
                options,
            )
            .await
            .unwrap()
    }

    pub async fn run(&self, job_id: Uuid) -> RunOutcome {
        self.pipeline.run(job_id).await.unwrap()
    }

    /// Drain the dispatch queue through the pipeline, as a worker would.
    pub async fn drain_queue(&self) -> usize {
        let mut handled = 0;
        while media_content_jobs::services::worker_pool::process_next(&self.pipeline, &self.queue)
            .await
            .unwrap()
        {
            handled += 1;
        }
        handled
    }

    pub async fn queue_depth(&self) -> u64 {
        self.queue.depth().await.unwrap()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

pub fn token(user: UserId) -> String {
    issue_token(user, SECRET, chrono::Duration::minutes(10)).unwrap()
}

const BOUNDARY: &str = "----media-jobs-test-boundary";

pub struct FilePart<'a> {
    pub filename: &'a str,
    pub content_type: &'a str,
    pub data: &'a [u8],
}

pub fn multipart_body(fields: &[(&str, &str)], file: Option<FilePart<'_>>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n").as_bytes(),
        );
    }
    if let Some(file) = file {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                file.filename, file.content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(file.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn upload_request(
    bearer: Option<&str>,
    fields: &[(&str, &str)],
    file: Option<FilePart<'_>>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/transcribe/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(Body::from(multipart_body(fields, file)))
        .unwrap()
}

pub fn get_request(uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

/// Send a request through the router and decode the JSON body.
pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

/// Send a request and return the undecoded body.
pub async fn send_raw(app: Router, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, bytes)
}
