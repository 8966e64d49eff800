//! In-process stand-ins for the external services, used by unit tests.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Map};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use knowledge_center_core::search::SearchParams;
use knowledge_center_core::store::memory::InMemoryStore;

use crate::parser::{ParsedDocument, ParsedElement};
use crate::services::AppServices;
use crate::traits::{AnswerGenerator, DocumentParser, Embedder, ObjectStore};

/// Parsed element with `source`/`page` metadata and a unit vector.
pub fn element(id: &str, text: &str) -> ParsedElement {
    let mut metadata = Map::new();
    metadata.insert("source".to_string(), json!("a.pdf"));
    metadata.insert("page".to_string(), json!(1));
    ParsedElement {
        element_id: id.to_string(),
        element_type: "text".to_string(),
        text: text.to_string(),
        metadata,
        vector: vec![1.0, 0.0],
    }
}

#[derive(Default)]
pub struct MemoryObjects {
    objects: Mutex<HashMap<String, (String, Bytes)>>,
    fail: bool,
}

impl MemoryObjects {
    pub fn failing() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            fail: true,
        }
    }

    pub fn bytes_of(&self, key: &str) -> Option<Bytes> {
        let objects = self.objects.lock().ok()?;
        objects.get(key).map(|(_, data)| data.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().map(|o| o.is_empty()).unwrap_or(true)
    }

    pub fn content_type_of(&self, key: &str) -> Option<String> {
        let objects = self.objects.lock().ok()?;
        objects.get(key).map(|(ct, _)| ct.clone())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjects {
    async fn put(&self, key: &str, content_type: &str, data: Bytes) -> Result<String> {
        if self.fail {
            bail!("S3 PutObject failed (HTTP 503) for key '{}'", key);
        }
        let mut objects = self.objects.lock().map_err(|_| anyhow!("poisoned"))?;
        objects.insert(key.to_string(), (content_type.to_string(), data));
        Ok(format!("memory://bpt-docs/{}", key))
    }
}

pub struct StubParser {
    elements: Mutex<Vec<ParsedElement>>,
    fail: AtomicBool,
}

impl StubParser {
    pub fn with(elements: Vec<ParsedElement>) -> Self {
        Self {
            elements: Mutex::new(elements),
            fail: AtomicBool::new(false),
        }
    }

    pub fn failing() -> Self {
        let parser = Self::with(Vec::new());
        parser.set_failing(true);
        parser
    }

    pub fn set(&self, elements: Vec<ParsedElement>) {
        *self.elements.lock().unwrap() = elements;
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentParser for StubParser {
    async fn parse(&self, filename: &str, content_type: &str, _data: Bytes) -> Result<ParsedDocument> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("parser service error (500): boom");
        }
        let data = self.elements.lock().map_err(|_| anyhow!("poisoned"))?.clone();
        Ok(ParsedDocument {
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            element_count: data.len() as u64,
            data,
        })
    }
}

pub struct StubEmbedder {
    pub fail: bool,
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        if self.fail {
            bail!("embedding service unreachable");
        }
        Ok(vec![1.0, 0.0])
    }
}

#[derive(Debug, Clone)]
pub enum GeneratorMode {
    Unavailable,
    Answer(String),
    Fail,
}

pub struct StubGenerator {
    mode: GeneratorMode,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
}

impl StubGenerator {
    pub fn new(mode: GeneratorMode) -> Self {
        Self {
            mode,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnswerGenerator for StubGenerator {
    async fn generate(&self, prompt: &str) -> Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().map_err(|_| anyhow!("poisoned"))? = Some(prompt.to_string());
        match &self.mode {
            GeneratorMode::Unavailable => Ok(None),
            GeneratorMode::Answer(text) => Ok(Some(text.clone())),
            GeneratorMode::Fail => bail!("generation service error 503"),
        }
    }
}

/// [`AppServices`] wired to stubs, with typed handles kept for assertions.
pub struct Harness {
    pub services: AppServices,
    pub store: Arc<InMemoryStore>,
    pub objects: Arc<MemoryObjects>,
    pub parser: Arc<StubParser>,
    pub generator: Arc<StubGenerator>,
}

impl Harness {
    pub fn new(parser: StubParser) -> Self {
        Self::build(parser, MemoryObjects::default(), GeneratorMode::Unavailable, false)
    }

    pub fn with_objects(objects: MemoryObjects, parser: StubParser) -> Self {
        Self::build(parser, objects, GeneratorMode::Unavailable, false)
    }

    pub fn with_generator(mode: GeneratorMode) -> Self {
        Self::build(StubParser::with(Vec::new()), MemoryObjects::default(), mode, false)
    }

    pub fn with_failing_embedder() -> Self {
        Self::build(
            StubParser::with(Vec::new()),
            MemoryObjects::default(),
            GeneratorMode::Unavailable,
            true,
        )
    }

    fn build(parser: StubParser, objects: MemoryObjects, mode: GeneratorMode, embedder_fails: bool) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let objects = Arc::new(objects);
        let parser = Arc::new(parser);
        let generator = Arc::new(StubGenerator::new(mode));
        let services = AppServices {
            store: store.clone(),
            objects: objects.clone(),
            parser: parser.clone(),
            embedder: Arc::new(StubEmbedder { fail: embedder_fails }),
            generator: generator.clone(),
            search: SearchParams::default(),
            doc_type: "knowledge-base.bpt-docs".to_string(),
        };
        Self {
            services,
            store,
            objects,
            parser,
            generator,
        }
    }
}

