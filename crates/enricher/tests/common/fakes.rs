//! Deterministic stand-ins for the external services.
//!
//! Products are identified by their `name` attribute, since the generation
//! traits only see attributes.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use enricher::catalog::{attribute, Attributes};
use enricher::error::StorageError;
use enricher::generation::{
    DescriptionGenerator, GeneratedImage, GenerationError, ImageGenerator,
};
use enricher::storage::ArtifactStore;

/// Points after which a crash can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashPoint {
    AfterImage,
    AfterDescription,
    AfterStore,
}

pub const ALL_CRASH_POINTS: [CrashPoint; 3] = [
    CrashPoint::AfterImage,
    CrashPoint::AfterDescription,
    CrashPoint::AfterStore,
];

/// Panics once, the first time the armed step succeeds for the armed product.
#[derive(Default)]
pub struct CrashSwitch {
    armed: Mutex<Option<(CrashPoint, String)>>,
}

impl CrashSwitch {
    pub fn arm(&self, point: CrashPoint, name: &str) {
        *self.armed.lock().unwrap() = Some((point, name.to_string()));
    }

    pub fn is_armed(&self) -> bool {
        self.armed.lock().unwrap().is_some()
    }

    fn check(&self, point: CrashPoint, name: &str) {
        let fire = {
            let mut armed = self.armed.lock().unwrap();
            match armed.as_ref() {
                Some((p, n)) if *p == point && n == name => {
                    *armed = None;
                    true
                }
                _ => false,
            }
        };
        if fire {
            panic!("injected crash {:?} for {}", point, name);
        }
    }
}

pub fn product_name(attributes: &Attributes) -> String {
    attribute(attributes, "name").unwrap_or("unnamed").to_string()
}

/// Failure script shared by the fake services.
#[derive(Default)]
pub struct Script {
    fail_first: HashMap<String, u32>,
    fail_always: HashSet<String>,
}

impl Script {
    pub fn fail_first(mut self, name: &str, times: u32) -> Self {
        self.fail_first.insert(name.to_string(), times);
        self
    }

    pub fn fail_always(mut self, name: &str) -> Self {
        self.fail_always.insert(name.to_string());
        self
    }

    /// `call` is the 1-based call number for this product.
    fn fails(&self, name: &str, call: u32) -> bool {
        self.fail_always.contains(name)
            || self.fail_first.get(name).is_some_and(|n| call <= *n)
    }
}

#[derive(Default)]
struct CallLog {
    per_product: Mutex<HashMap<String, u32>>,
    total: AtomicUsize,
}

impl CallLog {
    fn record(&self, name: &str) -> u32 {
        self.total.fetch_add(1, Ordering::SeqCst);
        let mut calls = self.per_product.lock().unwrap();
        let count = calls.entry(name.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    fn calls_for(&self, name: &str) -> u32 {
        self.per_product.lock().unwrap().get(name).copied().unwrap_or(0)
    }
}

pub struct FakeImages {
    script: Script,
    log: CallLog,
    crash: Arc<CrashSwitch>,
}

impl FakeImages {
    pub fn new(script: Script, crash: Arc<CrashSwitch>) -> Self {
        Self {
            script,
            log: CallLog::default(),
            crash,
        }
    }

    pub fn calls_for(&self, name: &str) -> u32 {
        self.log.calls_for(name)
    }

    pub fn total_calls(&self) -> usize {
        self.log.total.load(Ordering::SeqCst)
    }
}

impl ImageGenerator for FakeImages {
    fn generate_image(&self, attributes: &Attributes) -> Result<GeneratedImage, GenerationError> {
        let name = product_name(attributes);
        let call = self.log.record(&name);
        if self.script.fails(&name, call) {
            return Err(GenerationError::Status {
                service: "image generation",
                status: 503,
                body: format!("unavailable for {} (call {})", name, call),
            });
        }
        self.crash.check(CrashPoint::AfterImage, &name);
        Ok(GeneratedImage::png(format!("png:{}", name).into_bytes()))
    }
}

pub struct FakeDescriptions {
    script: Script,
    log: CallLog,
    crash: Arc<CrashSwitch>,
}

impl FakeDescriptions {
    pub fn new(script: Script, crash: Arc<CrashSwitch>) -> Self {
        Self {
            script,
            log: CallLog::default(),
            crash,
        }
    }

    pub fn calls_for(&self, name: &str) -> u32 {
        self.log.calls_for(name)
    }

    pub fn total_calls(&self) -> usize {
        self.log.total.load(Ordering::SeqCst)
    }
}

impl DescriptionGenerator for FakeDescriptions {
    fn generate_description(
        &self,
        attributes: &Attributes,
        image: &GeneratedImage,
    ) -> Result<String, GenerationError> {
        let name = product_name(attributes);
        let call = self.log.record(&name);
        if self.script.fails(&name, call) {
            return Err(GenerationError::RateLimited {
                service: "description generation",
            });
        }
        self.crash.check(CrashPoint::AfterDescription, &name);
        Ok(format!("{} ({} byte image)", name, image.bytes.len()))
    }
}

/// In-memory artifact store. Keys under `fail_prefix` are rejected.
pub struct MemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    puts: AtomicUsize,
    fail_prefix: Option<String>,
    crash: Arc<CrashSwitch>,
}

impl MemoryStore {
    pub fn new(crash: Arc<CrashSwitch>) -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            puts: AtomicUsize::new(0),
            fail_prefix: None,
            crash,
        }
    }

    pub fn failing_under(mut self, prefix: &str) -> Self {
        self.fail_prefix = Some(prefix.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

impl ArtifactStore for MemoryStore {
    fn put(&self, key: &str, bytes: &[u8], _content_type: &str) -> Result<String, StorageError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self
            .fail_prefix
            .as_deref()
            .is_some_and(|prefix| key.starts_with(prefix))
        {
            return Err(StorageError::UploadRejected {
                key: key.to_string(),
                status: 403,
                body: "forbidden".to_string(),
            });
        }
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), bytes.to_vec());

        if let Some(name) = key
            .strip_prefix("images/")
            .and_then(|file| file.split('.').next())
        {
            self.crash.check(CrashPoint::AfterStore, name);
        }
        Ok(format!("mem://{}", key))
    }
}
