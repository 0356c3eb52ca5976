#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use shelfmark::application::books::PublishFailurePolicy;
use shelfmark::application::catalog::{Catalog, CatalogDeps, CatalogSettings};
use shelfmark::application::ports::{MessagePublisher, PublishError, TelemetrySink};
use shelfmark::application::repos::{BooksRepo, RepoError};
use shelfmark::domain::books::Book;
use shelfmark::cache::{CacheConfig, CacheError, CacheStore, MemoryCacheStore, ResilientCache};
use shelfmark::infra::http::HttpState;
use shelfmark::infra::memory::InMemoryRepositories;
use shelfmark::infra::security::{BcryptPasswordHasher, JwtTokenIssuer};
use shelfmark::infra::storage::FsBlobStorage;
use shelfmark::util::clock::{Clock, SystemClock};
use tempfile::TempDir;
use uuid::Uuid;

pub const TOKEN_SECRET: &str = "integration-secret-with-enough-length";
pub const MAX_COVER_BYTES: u64 = 1024;

/// Cache backend that records every call before delegating to memory.
pub struct RecordingStore {
    inner: MemoryCacheStore,
    calls: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl RecordingStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: MemoryCacheStore::new(&CacheConfig::default(), clock),
            calls: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls").clone()
    }

    pub fn calls_of(&self, kind: &str) -> Vec<String> {
        let prefix = format!("{kind} ");
        self.calls()
            .into_iter()
            .filter_map(|call| call.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().expect("calls").clear();
    }

    fn record(&self, kind: &str, key: &str) -> Result<(), CacheError> {
        self.calls.lock().expect("calls").push(format!("{kind} {key}"));
        if self.failing.load(Ordering::SeqCst) {
            Err(CacheError::Unavailable("backend offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CacheStore for RecordingStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.record("get", key)?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        self.record("set", key)?;
        self.inner.set(key, value, ttl).await
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.record("remove", key)?;
        self.inner.remove(key).await
    }
}

/// Book repository that counts reads before delegating.
pub struct CountingBooks {
    inner: Arc<InMemoryRepositories>,
    lists: AtomicUsize,
    lookups: AtomicUsize,
}

impl CountingBooks {
    pub fn new(inner: Arc<InMemoryRepositories>) -> Self {
        Self {
            inner,
            lists: AtomicUsize::new(0),
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn lists(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BooksRepo for CountingBooks {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Book>, RepoError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        BooksRepo::find_by_id(self.inner.as_ref(), id).await
    }

    async fn list(&self) -> Result<Vec<Book>, RepoError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        self.inner.list().await
    }

    async fn add(&self, book: &Book) -> Result<(), RepoError> {
        BooksRepo::add(self.inner.as_ref(), book).await
    }

    async fn update(&self, book: &Book) -> Result<(), RepoError> {
        self.inner.update(book).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, RepoError> {
        self.inner.delete(id).await
    }
}

/// Publisher that keeps what it was asked to send.
#[derive(Default)]
pub struct RecordingPublisher {
    sent: Mutex<Vec<(String, Value)>>,
    failing: AtomicBool,
}

impl RecordingPublisher {
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn topics(&self) -> Vec<String> {
        self.sent
            .lock()
            .expect("sent")
            .iter()
            .map(|(topic, _)| topic.clone())
            .collect()
    }

    pub fn sent(&self) -> Vec<(String, Value)> {
        self.sent.lock().expect("sent").clone()
    }
}

#[async_trait]
impl MessagePublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, payload: &Value) -> Result<(), PublishError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PublishError::Transport("connection refused".to_string()));
        }
        self.sent
            .lock()
            .expect("sent")
            .push((topic.to_string(), payload.clone()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingTelemetry {
    events: Mutex<Vec<String>>,
    metrics: Mutex<Vec<(String, f64)>>,
    exceptions: Mutex<usize>,
}

impl RecordingTelemetry {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().expect("events").clone()
    }

    pub fn metrics(&self) -> Vec<(String, f64)> {
        self.metrics.lock().expect("metrics").clone()
    }

    pub fn exceptions(&self) -> usize {
        *self.exceptions.lock().expect("exceptions")
    }
}

impl TelemetrySink for RecordingTelemetry {
    fn track_event(&self, name: &str, _properties: &[(&str, String)]) {
        self.events.lock().expect("events").push(name.to_string());
    }

    fn track_metric(&self, name: &str, value: f64) {
        self.metrics
            .lock()
            .expect("metrics")
            .push((name.to_string(), value));
    }

    fn track_exception(
        &self,
        _error: &(dyn std::error::Error + 'static),
        _properties: &[(&str, String)],
    ) {
        *self.exceptions.lock().expect("exceptions") += 1;
    }
}

pub struct Harness {
    pub catalog: Arc<Catalog>,
    pub repos: Arc<InMemoryRepositories>,
    pub books: Arc<CountingBooks>,
    pub store: Arc<RecordingStore>,
    pub publisher: Arc<RecordingPublisher>,
    pub telemetry: Arc<RecordingTelemetry>,
    pub tokens: Arc<JwtTokenIssuer>,
    pub blobs: Arc<FsBlobStorage>,
    pub covers: TempDir,
}

impl Harness {
    pub fn new(policy: PublishFailurePolicy) -> Self {
        Self::with_clock(policy, Arc::new(SystemClock))
    }

    pub fn with_clock(policy: PublishFailurePolicy, clock: Arc<dyn Clock>) -> Self {
        let repos = Arc::new(InMemoryRepositories::new());
        let books = Arc::new(CountingBooks::new(repos.clone()));
        let store = Arc::new(RecordingStore::new(clock.clone()));
        let publisher = Arc::new(RecordingPublisher::default());
        let telemetry = Arc::new(RecordingTelemetry::default());
        let tokens = Arc::new(JwtTokenIssuer::new(
            TOKEN_SECRET,
            "shelfmark",
            Duration::from_secs(3600),
            clock.clone(),
        ));
        let covers = tempfile::tempdir().expect("covers dir");
        let blobs = Arc::new(
            FsBlobStorage::new(covers.path().to_path_buf(), "/covers").expect("blob storage"),
        );

        let deps = CatalogDeps {
            books: books.clone(),
            users: repos.clone(),
            cache: ResilientCache::new(store.clone()),
            publisher: publisher.clone(),
            telemetry: telemetry.clone(),
            blobs: blobs.clone(),
            hasher: Arc::new(BcryptPasswordHasher::new(4)),
            tokens: tokens.clone(),
            clock,
        };
        let settings = CatalogSettings {
            on_publish_failure: policy,
            max_cover_bytes: MAX_COVER_BYTES,
            ..CatalogSettings::default()
        };

        Self {
            catalog: Arc::new(Catalog::new(deps, settings)),
            repos,
            books,
            store,
            publisher,
            telemetry,
            tokens,
            blobs,
            covers,
        }
    }

    pub fn http_state(&self) -> HttpState {
        HttpState {
            catalog: self.catalog.clone(),
            tokens: self.tokens.clone(),
            blobs: self.blobs.clone(),
            db: None,
            max_cover_bytes: MAX_COVER_BYTES,
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new(PublishFailurePolicy::Fail)
    }
}
