//! Test doubles and corpus builders shared by the test modules.

use crate::embeddings::EmbeddingProvider;
use crate::generate::AnswerGenerator;
use crate::history::HistoryStore;
use crate::index::FlatL2Index;
use crate::model::ModelHandle;
use crate::pipeline::Orchestrator;
use crate::quota::QuotaGate;
use crate::retrieval::RetrievalService;
use crate::rewrite::QueryRewriter;
use crate::store::{CorpusIndex, VectorStore};
use crate::types::{Corpus, CorpusMetadata, IndexedDocument, Locator, SearchResult};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tadabbur_core::{AppError, AppResult};
use tadabbur_llm::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk};
use tadabbur_prompt::{load_prompt, ANSWER_GROUNDED, QUERY_REWRITE};

#[derive(Debug, Clone)]
enum Script {
    Answer(String),
    Fail,
    Chunks { chunks: Vec<String>, fail_after: bool },
    Endless,
}

/// LLM that plays back a fixed script and records every request.
#[derive(Debug)]
pub struct ScriptedLlm {
    script: Script,
    rewrite: Option<String>,
    requests: Mutex<Vec<LlmRequest>>,
    produced: Arc<AtomicUsize>,
}

impl ScriptedLlm {
    fn with_script(script: Script) -> Self {
        Self {
            script,
            rewrite: None,
            requests: Mutex::new(Vec::new()),
            produced: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Completes and streams `answer`.
    pub fn answering(answer: &str) -> Self {
        Self::with_script(Script::Answer(answer.to_string()))
    }

    /// Every call fails.
    pub fn failing() -> Self {
        Self::with_script(Script::Fail)
    }

    /// Streams the given chunks in order.
    pub fn streaming(chunks: Vec<&str>) -> Self {
        Self::with_script(Script::Chunks {
            chunks: chunks.into_iter().map(String::from).collect(),
            fail_after: false,
        })
    }

    /// Streams chunks until the consumer stops pulling.
    pub fn endless() -> Self {
        Self::with_script(Script::Endless)
    }

    /// After the scripted chunks, the stream yields an error.
    pub fn then_fail(mut self) -> Self {
        if let Script::Chunks { fail_after, .. } = &mut self.script {
            *fail_after = true;
        }
        self
    }

    /// Reply used for rewrite requests instead of the main script.
    pub fn rewriting_to(mut self, rewrite: &str) -> Self {
        self.rewrite = Some(rewrite.to_string());
        self
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Option<LlmRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    /// Chunks handed out so far by streaming calls.
    pub fn produced(&self) -> usize {
        self.produced.load(Ordering::SeqCst)
    }

    fn response(content: String) -> LlmResponse {
        LlmResponse {
            content,
            model: "test-model".to_string(),
            usage: Default::default(),
            finish_reason: None,
        }
    }
}

fn is_rewrite(request: &LlmRequest) -> bool {
    request.prompt.starts_with("Q: ")
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.requests.lock().unwrap().push(request.clone());

        if is_rewrite(request) {
            if let Some(rewrite) = &self.rewrite {
                return Ok(Self::response(rewrite.clone()));
            }
        }

        match &self.script {
            Script::Answer(answer) => Ok(Self::response(answer.clone())),
            Script::Chunks { chunks, .. } => Ok(Self::response(chunks.concat())),
            Script::Fail | Script::Endless => Err(AppError::Llm("scripted failure".to_string())),
        }
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        self.requests.lock().unwrap().push(request.clone());
        let produced = Arc::clone(&self.produced);

        match &self.script {
            Script::Fail => Err(AppError::Llm("scripted failure".to_string())),
            Script::Answer(answer) => {
                produced.fetch_add(1, Ordering::SeqCst);
                Ok(futures::stream::iter(vec![Ok(LlmStreamChunk::text(answer.clone()))]).boxed())
            }
            Script::Chunks { chunks, fail_after } => {
                let mut items: Vec<AppResult<LlmStreamChunk>> =
                    chunks.iter().map(|c| Ok(LlmStreamChunk::text(c.clone()))).collect();
                if *fail_after {
                    items.push(Err(AppError::Llm("stream interrupted".to_string())));
                }
                produced.fetch_add(chunks.len(), Ordering::SeqCst);
                Ok(futures::stream::iter(items).boxed())
            }
            Script::Endless => Ok(futures::stream::unfold(produced, |produced| async move {
                tokio::time::sleep(Duration::from_millis(2)).await;
                produced.fetch_add(1, Ordering::SeqCst);
                Some((Ok(LlmStreamChunk::text("mot ")), produced))
            })
            .boxed()),
        }
    }
}

/// Embedder that returns one fixed vector and records what it was given.
#[derive(Debug)]
pub struct FixedEmbedder {
    vector: Vec<f32>,
    inputs: Mutex<Vec<String>>,
}

impl FixedEmbedder {
    pub fn new(vector: Vec<f32>) -> Self {
        Self {
            vector,
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    fn provider_name(&self) -> &str {
        "fixed"
    }

    fn model_name(&self) -> &str {
        "fixed"
    }

    fn dimensions(&self) -> usize {
        self.vector.len()
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        self.inputs.lock().unwrap().extend(texts.iter().cloned());
        Ok(texts.iter().map(|_| self.vector.clone()).collect())
    }
}

/// Quota gate that panics, to exercise stream supervision.
#[derive(Debug)]
pub struct PanickingQuota;

#[async_trait]
impl QuotaGate for PanickingQuota {
    async fn can_proceed(&self, _user: &str) -> AppResult<bool> {
        panic!("quota backend exploded");
    }

    async fn commit(&self, _user: &str) -> AppResult<u32> {
        Ok(0)
    }

    fn reset_time(&self) -> String {
        String::new()
    }
}

pub fn verse(sourate: u32, ayah: u32, text_fr: &str, embedding: Vec<f32>) -> IndexedDocument {
    IndexedDocument {
        id: format!("v_{}_{}", sourate, ayah),
        reference: format!("Sourate {} (Al-Baqara), Verset {}", sourate, ayah),
        text_ar: "وَاسْتَعِينُوا بِالصَّبْرِ وَالصَّلَاةِ".to_string(),
        text_fr: text_fr.to_string(),
        normalized_fr: crate::normalize::normalize_text(text_fr),
        normalized_ar: "واستعينوا بالصبر والصلاه".to_string(),
        embedding,
        metadata: CorpusMetadata::Verse {
            sourate,
            ayah,
            sourate_name: "Al-Baqara".to_string(),
        },
        source_type: None,
    }
}

pub fn hadith(number: u64, text_fr: &str, embedding: Vec<f32>) -> IndexedDocument {
    IndexedDocument {
        id: format!("h_bukhari_1_{}", number),
        reference: format!("Sahih al-Bukhari, Hadith {}", number),
        text_ar: "إِنَّمَا الأَعْمَالُ بِالنِّيَّاتِ".to_string(),
        text_fr: text_fr.to_string(),
        normalized_fr: crate::normalize::normalize_text(text_fr),
        normalized_ar: "انما الاعمال بالنيات".to_string(),
        embedding,
        metadata: CorpusMetadata::Hadith {
            collection: "bukhari".to_string(),
            book_number: Locator::Number(1),
            hadith_number: Locator::Number(number),
            grade: "Sahih".to_string(),
        },
        source_type: None,
    }
}

/// A loaded corpus built in memory, stamped like a real load.
pub fn corpus(corpus: Corpus, mut documents: Vec<IndexedDocument>) -> CorpusIndex {
    if documents.is_empty() {
        return CorpusIndex::absent(corpus);
    }
    for doc in &mut documents {
        doc.source_type = Some(corpus);
    }
    let vectors: Vec<Vec<f32>> = documents.iter().map(|d| d.embedding.clone()).collect();
    CorpusIndex {
        corpus,
        index: Some(FlatL2Index::build(&vectors).unwrap()),
        documents,
    }
}

/// Two verses and one hadith, at distances 0.0, 1.0 and 4.0 from the origin.
pub fn sample_store() -> VectorStore {
    VectorStore::preloaded(
        corpus(
            Corpus::Quran,
            vec![
                verse(2, 153, "Cherchez secours dans l'endurance et la prière.", vec![0.0, 0.0, 0.0]),
                verse(2, 155, "Annonce la bonne nouvelle aux endurants.", vec![2.0, 0.0, 0.0]),
            ],
        ),
        corpus(
            Corpus::Hadith,
            vec![hadith(1, "Les actions ne valent que par les intentions.", vec![0.0, 1.0, 0.0])],
        ),
    )
}

/// Results as a search from the origin over [`sample_store`] returns them.
pub fn sample_results() -> Vec<SearchResult> {
    let quran = corpus(
        Corpus::Quran,
        vec![
            verse(2, 153, "Cherchez secours dans l'endurance et la prière.", vec![0.0, 0.0, 0.0]),
            verse(2, 155, "Annonce la bonne nouvelle aux endurants.", vec![2.0, 0.0, 0.0]),
        ],
    );
    let hadith = corpus(
        Corpus::Hadith,
        vec![hadith(1, "Les actions ne valent que par les intentions.", vec![0.0, 1.0, 0.0])],
    );

    vec![
        SearchResult::from_document(&quran.documents[0], Corpus::Quran, 0.0),
        SearchResult::from_document(&hadith.documents[0], Corpus::Hadith, 1.0),
        SearchResult::from_document(&quran.documents[1], Corpus::Quran, 4.0),
    ]
}

/// Everything a pipeline test needs to inspect afterwards.
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub embedder: Arc<FixedEmbedder>,
    pub llm: Option<Arc<ScriptedLlm>>,
}

pub fn harness(
    llm: Option<ScriptedLlm>,
    store: VectorStore,
    quota: Arc<dyn QuotaGate>,
    history: Arc<dyn HistoryStore>,
) -> Harness {
    harness_with_query(llm, store, quota, history, vec![0.0, 0.0, 0.0])
}

/// Like [`harness`], with every query embedded as `query_vector`.
pub fn harness_with_query(
    llm: Option<ScriptedLlm>,
    store: VectorStore,
    quota: Arc<dyn QuotaGate>,
    history: Arc<dyn HistoryStore>,
    query_vector: Vec<f32>,
) -> Harness {
    let embedder = Arc::new(FixedEmbedder::new(query_vector));
    let llm = llm.map(Arc::new);
    let model = llm
        .clone()
        .map(|l| ModelHandle::new(l as Arc<dyn LlmClient>, "test-model"));

    let orchestrator = Orchestrator::new(
        Arc::new(RetrievalService::new(
            Arc::new(store),
            Arc::clone(&embedder) as Arc<dyn EmbeddingProvider>,
        )),
        Arc::new(QueryRewriter::new(
            model.clone(),
            load_prompt(None, QUERY_REWRITE).unwrap(),
        )),
        Arc::new(AnswerGenerator::new(
            model,
            load_prompt(None, ANSWER_GROUNDED).unwrap(),
        )),
        quota,
        history,
    );

    Harness {
        orchestrator,
        embedder,
        llm,
    }
}
