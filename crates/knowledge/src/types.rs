//! Core types for the corpus pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use tadabbur_core::{AppError, AppResult};

/// The two indexed corpora.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Corpus {
    #[serde(rename = "Coran")]
    Quran,
    #[serde(rename = "Hadith")]
    Hadith,
}

impl Corpus {
    /// Search order when both corpora are queried.
    pub const ALL: [Corpus; 2] = [Corpus::Quran, Corpus::Hadith];

    /// Tag stamped on documents and shown to users.
    pub fn tag(&self) -> &'static str {
        match self {
            Corpus::Quran => "Coran",
            Corpus::Hadith => "Hadith",
        }
    }

    /// Name used in filters and file names.
    pub fn name(&self) -> &'static str {
        match self {
            Corpus::Quran => "quran",
            Corpus::Hadith => "hadith",
        }
    }
}

impl fmt::Display for Corpus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which corpora a search covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFilter {
    Quran,
    Hadith,
    #[default]
    Both,
}

impl SourceFilter {
    /// Parse a filter name, case-insensitively.
    pub fn parse(s: &str) -> AppResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "quran" | "coran" => Ok(Self::Quran),
            "hadith" => Ok(Self::Hadith),
            "both" | "" => Ok(Self::Both),
            other => Err(AppError::Validation(format!(
                "Unknown source filter '{}'. Expected quran, hadith or both",
                other
            ))),
        }
    }

    /// Selected corpora in search order.
    pub fn corpora(&self) -> &'static [Corpus] {
        match self {
            Self::Quran => &[Corpus::Quran],
            Self::Hadith => &[Corpus::Hadith],
            Self::Both => &Corpus::ALL,
        }
    }
}

/// A book or hadith number as written by the source collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Locator {
    Number(u64),
    Text(String),
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Number(n) => write!(f, "{}", n),
            Locator::Text(s) => f.write_str(s),
        }
    }
}

/// Corpus-specific locator fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CorpusMetadata {
    Verse {
        sourate: u32,
        ayah: u32,
        sourate_name: String,
    },
    Hadith {
        collection: String,
        book_number: Locator,
        hadith_number: Locator,
        #[serde(default)]
        grade: String,
    },
    /// Any other shape, kept verbatim.
    Other(serde_json::Value),
}

impl Default for CorpusMetadata {
    fn default() -> Self {
        CorpusMetadata::Other(serde_json::Value::Object(Default::default()))
    }
}

/// One verse or hadith as stored in a corpus data file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub id: String,
    pub reference: String,
    /// Source-language (Arabic) text
    pub text_ar: String,
    /// French translation
    pub text_fr: String,
    #[serde(default)]
    pub normalized_fr: String,
    #[serde(default)]
    pub normalized_ar: String,
    #[serde(default)]
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: CorpusMetadata,
    /// Stamped at load time; whatever the file says is overwritten.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<Corpus>,
}

/// A retrieval hit: the document without its embedding, plus a distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub reference: String,
    pub text_ar: String,
    pub text_fr: String,
    pub normalized_fr: String,
    pub normalized_ar: String,
    pub metadata: CorpusMetadata,
    pub source_type: Corpus,
    /// Squared L2 distance; lower is closer.
    pub score: f32,
}

impl SearchResult {
    /// Copy a document into a result. The document itself is left untouched.
    pub fn from_document(doc: &IndexedDocument, corpus: Corpus, score: f32) -> Self {
        Self {
            id: doc.id.clone(),
            reference: doc.reference.clone(),
            text_ar: doc.text_ar.clone(),
            text_fr: doc.text_fr.clone(),
            normalized_fr: doc.normalized_fr.clone(),
            normalized_ar: doc.normalized_ar.clone(),
            metadata: doc.metadata.clone(),
            source_type: doc.source_type.unwrap_or(corpus),
            score,
        }
    }
}

/// Default number of sources returned to the caller.
pub const DEFAULT_SOURCE_LIMIT: usize = 5;

fn default_limit() -> usize {
    DEFAULT_SOURCE_LIMIT
}

/// Parameters of a plain search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(alias = "q")]
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub source: SourceFilter,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: DEFAULT_SOURCE_LIMIT,
            source: SourceFilter::Both,
        }
    }
}

/// Parameters of a question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    #[serde(alias = "q")]
    pub question: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub source: SourceFilter,
}

impl AskRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            limit: DEFAULT_SOURCE_LIMIT,
            source: SourceFilter::Both,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_source(mut self, source: SourceFilter) -> Self {
        self.source = source;
        self
    }
}

/// Result of a batch question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskResponse {
    pub question: String,
    pub answer: String,
    pub sources: Vec<SearchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests_today: Option<u32>,
}

/// One answered question, as kept in the chat history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub user: String,
    pub query: String,
    pub response: String,
    pub sources: Vec<SearchResult>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_corpus_serializes_as_tag() {
        assert_eq!(serde_json::to_value(Corpus::Quran).unwrap(), json!("Coran"));
        assert_eq!(serde_json::to_value(Corpus::Hadith).unwrap(), json!("Hadith"));
    }

    #[test]
    fn test_source_filter_parse() {
        assert_eq!(SourceFilter::parse("Quran").unwrap(), SourceFilter::Quran);
        assert_eq!(SourceFilter::parse("HADITH").unwrap(), SourceFilter::Hadith);
        assert_eq!(SourceFilter::parse("both").unwrap(), SourceFilter::Both);
        assert!(SourceFilter::parse("tafsir").is_err());
    }

    #[test]
    fn test_filter_order() {
        assert_eq!(SourceFilter::Both.corpora(), &[Corpus::Quran, Corpus::Hadith]);
        assert_eq!(SourceFilter::Quran.corpora(), &[Corpus::Quran]);
        assert_eq!(SourceFilter::Hadith.corpora(), &[Corpus::Hadith]);
    }

    #[test]
    fn test_document_metadata_shapes() {
        let verse: IndexedDocument = serde_json::from_value(json!({
            "id": "v_2_153",
            "reference": "Sourate 2 (Al-Baqara), Verset 153",
            "text_ar": "يَا أَيُّهَا الَّذِينَ آمَنُوا",
            "text_fr": "Ô les croyants !",
            "normalized_fr": "o les croyants !",
            "normalized_ar": "يا ايها الذين امنوا",
            "embedding": [0.1, 0.2],
            "metadata": { "sourate": 2, "ayah": 153, "sourate_name": "Al-Baqara" }
        }))
        .unwrap();
        assert!(matches!(verse.metadata, CorpusMetadata::Verse { ayah: 153, .. }));
        assert!(verse.source_type.is_none());

        let hadith: IndexedDocument = serde_json::from_value(json!({
            "id": "h_bukhari_1_1",
            "reference": "bukhari, Livre 1, Hadith 1 (Sahih)",
            "text_ar": "إنما الأعمال بالنيات",
            "text_fr": "Les actes ne valent que par les intentions",
            "metadata": { "collection": "bukhari", "book_number": "1", "hadith_number": 1, "grade": "Sahih" }
        }))
        .unwrap();
        match hadith.metadata {
            CorpusMetadata::Hadith { book_number, hadith_number, .. } => {
                assert_eq!(book_number.to_string(), "1");
                assert_eq!(hadith_number, Locator::Number(1));
            }
            other => panic!("unexpected metadata: {:?}", other),
        }

        let other: IndexedDocument = serde_json::from_value(json!({
            "id": "x", "reference": "x", "text_ar": "", "text_fr": "",
            "metadata": { "page": 4 }
        }))
        .unwrap();
        assert_eq!(other.metadata, CorpusMetadata::Other(json!({ "page": 4 })));
    }

    #[test]
    fn test_search_result_has_no_embedding() {
        let doc = IndexedDocument {
            id: "v_1_1".to_string(),
            reference: "Sourate 1".to_string(),
            text_ar: "بسم الله".to_string(),
            text_fr: "Au nom d'Allah".to_string(),
            normalized_fr: String::new(),
            normalized_ar: String::new(),
            embedding: vec![1.0, 2.0],
            metadata: CorpusMetadata::default(),
            source_type: Some(Corpus::Quran),
        };

        let value = serde_json::to_value(SearchResult::from_document(&doc, Corpus::Quran, 0.5)).unwrap();
        assert!(value.get("embedding").is_none());
        assert_eq!(value["source_type"], "Coran");
        assert_eq!(value["score"], 0.5);
        assert_eq!(doc.embedding, vec![1.0, 2.0]);
    }

    #[test]
    fn test_ask_request_accepts_q_alias() {
        let req: AskRequest = serde_json::from_value(json!({ "q": "patience", "source": "quran" })).unwrap();
        assert_eq!(req.question, "patience");
        assert_eq!(req.limit, DEFAULT_SOURCE_LIMIT);
        assert_eq!(req.source, SourceFilter::Quran);
    }
}
