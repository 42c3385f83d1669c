//! In-memory pipeline collaborators for integration tests
//!
//! Each fake records what it was asked to do so tests can assert on calls,
//! attempt timing and failure handling without S3 or PostgreSQL.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use fieldsnap_common::types::{Category, SiteKey};
use fieldsnap_uploads::{
    compression::{CompressedFile, Compressor},
    config::PipelineConfig,
    metadata::MetadataRecorder,
    storage::ObjectStore,
    BatchRegistry, PipelineStages,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub const CDN: &str = "https://cdn.test";

fn name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Paths under a fake photo directory; nothing is read from disk
pub fn photos(names: &[&str]) -> Vec<PathBuf> {
    names.iter().map(|n| PathBuf::from("/photos").join(n)).collect()
}

#[derive(Default)]
pub struct FakeCompressor {
    fail_on: HashSet<String>,
    panic_on: HashSet<String>,
    delay: Duration,
    calls: Mutex<Vec<String>>,
}

impl FakeCompressor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, file_name: &str) -> Self {
        self.fail_on.insert(file_name.to_string());
        self
    }

    pub fn panicking_on(mut self, file_name: &str) -> Self {
        self.panic_on.insert(file_name.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// File names in the order compression started
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Compressor for FakeCompressor {
    async fn compress(&self, source: &Path) -> Result<CompressedFile> {
        let name = name_of(source);
        self.calls.lock().push(name.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.panic_on.contains(&name) {
            panic!("decoder crashed on {}", name);
        }
        if self.fail_on.contains(&name) {
            anyhow::bail!("unsupported image format: {}", name);
        }

        Ok(CompressedFile {
            bytes: format!("compressed:{}", name).into_bytes(),
            content_type: "image/jpeg".to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Attempt {
    pub key: String,
    pub at: Instant,
    pub succeeded: bool,
}

/// Object store whose failures are planned per file name
#[derive(Default)]
pub struct FakeObjectStore {
    /// file name -> number of attempts that fail before one succeeds
    plans: HashMap<String, u32>,
    delay: Duration,
    attempts: Mutex<Vec<Attempt>>,
    stored: Mutex<HashMap<String, (Vec<u8>, String)>>,
}

impl FakeObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_times(mut self, file_name: &str, failures: u32) -> Self {
        self.plans.insert(file_name.to_string(), failures);
        self
    }

    pub fn always_failing(self, file_name: &str) -> Self {
        self.failing_times(file_name, u32::MAX)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn attempts_for(&self, file_name: &str) -> Vec<Attempt> {
        let suffix = format!("-{}", file_name);
        self.attempts
            .lock()
            .iter()
            .filter(|a| a.key.ends_with(&suffix))
            .cloned()
            .collect()
    }

    pub fn stored_keys(&self) -> HashSet<String> {
        self.stored.lock().keys().cloned().collect()
    }

    pub fn content_type_of(&self, key: &str) -> Option<String> {
        self.stored.lock().get(key).map(|(_, ct)| ct.clone())
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let planned_failures = self
            .plans
            .iter()
            .find(|(name, _)| key.ends_with(&format!("-{}", name)))
            .map(|(_, n)| *n)
            .unwrap_or(0);

        let previous = self
            .attempts
            .lock()
            .iter()
            .filter(|a| a.key == key)
            .count() as u32;
        let succeeded = previous >= planned_failures;

        self.attempts.lock().push(Attempt {
            key: key.to_string(),
            at: Instant::now(),
            succeeded,
        });

        if !succeeded {
            anyhow::bail!("connection reset by peer (attempt {})", previous + 1);
        }

        self.stored
            .lock()
            .insert(key.to_string(), (data, content_type.to_string()));
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", CDN, key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Row {
    pub site_key: String,
    pub url: String,
    pub category: String,
}

#[derive(Default)]
pub struct FakeRecorder {
    fail: AtomicBool,
    rows: Mutex<Vec<Row>>,
}

impl FakeRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let recorder = Self::default();
        recorder.fail.store(true, Ordering::SeqCst);
        recorder
    }

    pub fn rows(&self) -> Vec<Row> {
        self.rows.lock().clone()
    }
}

#[async_trait]
impl MetadataRecorder for FakeRecorder {
    async fn insert(&self, site_key: &SiteKey, url: &str, category: &Category) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("duplicate key value violates unique constraint");
        }
        self.rows.lock().push(Row {
            site_key: site_key.to_string(),
            url: url.to_string(),
            category: category.to_string(),
        });
        Ok(())
    }
}

/// Fakes wired into a registry, kept around for assertions
pub struct Harness {
    pub registry: BatchRegistry,
    pub compressor: Arc<FakeCompressor>,
    pub store: Arc<FakeObjectStore>,
    pub recorder: Arc<FakeRecorder>,
}

impl Harness {
    pub fn new(compressor: FakeCompressor, store: FakeObjectStore, recorder: FakeRecorder) -> Self {
        Self::with_config(compressor, store, recorder, PipelineConfig::default())
    }

    pub fn with_config(
        compressor: FakeCompressor,
        store: FakeObjectStore,
        recorder: FakeRecorder,
        config: PipelineConfig,
    ) -> Self {
        let compressor = Arc::new(compressor);
        let store = Arc::new(store);
        let recorder = Arc::new(recorder);

        let stages = PipelineStages {
            compressor: compressor.clone(),
            store: store.clone(),
            recorder: recorder.clone(),
        };
        let registry =
            BatchRegistry::new(stages, config).expect("registry should build inside a runtime");

        Self {
            registry,
            compressor,
            store,
            recorder,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(FakeCompressor::new(), FakeObjectStore::new(), FakeRecorder::new())
    }
}
