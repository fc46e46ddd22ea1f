//! Per-corpus index lifecycle and the shared vector store.
//!
//! Each corpus is a data file (JSON array of [`IndexedDocument`]) plus a
//! persisted [`FlatL2Index`] built from the documents' embeddings. Row `i`
//! of the index always corresponds to document `i`.

use crate::index::{FlatL2Index, Neighbor};
use crate::types::{Corpus, IndexedDocument};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tadabbur_core::{AppError, AppResult};
use tokio::sync::OnceCell;

/// A loaded corpus. Immutable once built.
#[derive(Debug, Clone)]
pub struct CorpusIndex {
    pub corpus: Corpus,
    pub index: Option<FlatL2Index>,
    pub documents: Vec<IndexedDocument>,
}

impl CorpusIndex {
    /// A corpus with no data.
    pub fn absent(corpus: Corpus) -> Self {
        Self {
            corpus,
            index: None,
            documents: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Where a corpus lives on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct CorpusPaths {
    pub index: PathBuf,
    pub data: PathBuf,
}

/// Load a corpus, building and persisting its index when needed.
///
/// - A missing data file yields an absent corpus, even if an index exists.
/// - An unreadable index, or one whose row count disagrees with the
///   documents, is rebuilt.
/// - Failing to persist a freshly built index only logs a warning.
pub fn initialize(corpus: Corpus, index_path: &Path, data_path: &Path) -> AppResult<CorpusIndex> {
    if !data_path.exists() {
        tracing::warn!(corpus = %corpus, "Data not found at {:?}", data_path);
        return Ok(CorpusIndex::absent(corpus));
    }

    let mut documents = load_documents(data_path)?;
    for doc in &mut documents {
        doc.source_type = Some(corpus);
    }

    if documents.is_empty() {
        tracing::warn!(corpus = %corpus, "Data file {:?} is empty, cannot build index", data_path);
        return Ok(CorpusIndex::absent(corpus));
    }

    let persisted = if index_path.exists() {
        tracing::info!(corpus = %corpus, "Loading index from {:?}", index_path);
        match FlatL2Index::read_from(index_path) {
            Ok(index) if index.len() == documents.len() => Some(index),
            Ok(index) => {
                tracing::warn!(
                    corpus = %corpus,
                    "Index has {} rows but data has {} documents, rebuilding",
                    index.len(),
                    documents.len()
                );
                None
            }
            Err(e) => {
                tracing::warn!(corpus = %corpus, "Unreadable index {:?}, rebuilding: {}", index_path, e);
                None
            }
        }
    } else {
        None
    };

    let index = match persisted {
        Some(index) => index,
        None => {
            tracing::info!(corpus = %corpus, "Building index from {:?}", data_path);
            let vectors: Vec<Vec<f32>> = documents.iter().map(|d| d.embedding.clone()).collect();
            let index = FlatL2Index::build(&vectors)?;

            match index.write_to(index_path) {
                Ok(()) => tracing::info!(corpus = %corpus, "Index saved to {:?}", index_path),
                Err(e) => tracing::warn!(
                    corpus = %corpus,
                    "Failed to persist index to {:?}: {}",
                    index_path,
                    e
                ),
            }
            index
        }
    };

    tracing::info!(
        corpus = %corpus,
        documents = documents.len(),
        dimension = index.dimension(),
        "Corpus ready"
    );

    Ok(CorpusIndex {
        corpus,
        index: Some(index),
        documents,
    })
}

fn load_documents(data_path: &Path) -> AppResult<Vec<IndexedDocument>> {
    let contents = std::fs::read_to_string(data_path)?;
    serde_json::from_str(&contents).map_err(|e| {
        AppError::Retrieval(format!("Failed to parse corpus data {:?}: {}", data_path, e))
    })
}

/// Nearest documents of one corpus; empty when the corpus is absent.
pub fn knn_search<'a>(
    corpus_index: &'a CorpusIndex,
    query: &[f32],
    k: usize,
) -> AppResult<Vec<(Neighbor, &'a IndexedDocument)>> {
    let Some(index) = corpus_index.index.as_ref() else {
        return Ok(Vec::new());
    };

    Ok(index
        .search(query, k)?
        .into_iter()
        .filter_map(|n| corpus_index.documents.get(n.position).map(|doc| (n, doc)))
        .collect())
}

/// Document counts after warm-up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StoreStats {
    pub quran: usize,
    pub hadith: usize,
}

/// Lazily initialized indices for both corpora.
///
/// Initialization happens at most once per corpus, on a blocking thread.
/// Concurrent first callers wait for the same load.
#[derive(Debug)]
pub struct VectorStore {
    quran_paths: CorpusPaths,
    hadith_paths: CorpusPaths,
    quran: OnceCell<Arc<CorpusIndex>>,
    hadith: OnceCell<Arc<CorpusIndex>>,
}

impl VectorStore {
    pub fn new(quran_paths: CorpusPaths, hadith_paths: CorpusPaths) -> Self {
        Self {
            quran_paths,
            hadith_paths,
            quran: OnceCell::new(),
            hadith: OnceCell::new(),
        }
    }

    /// A store whose corpora are already loaded.
    pub fn preloaded(quran: CorpusIndex, hadith: CorpusIndex) -> Self {
        let empty = CorpusPaths {
            index: PathBuf::new(),
            data: PathBuf::new(),
        };
        Self {
            quran_paths: empty.clone(),
            hadith_paths: empty,
            quran: OnceCell::new_with(Some(Arc::new(quran))),
            hadith: OnceCell::new_with(Some(Arc::new(hadith))),
        }
    }

    fn slot(&self, corpus: Corpus) -> (&OnceCell<Arc<CorpusIndex>>, &CorpusPaths) {
        match corpus {
            Corpus::Quran => (&self.quran, &self.quran_paths),
            Corpus::Hadith => (&self.hadith, &self.hadith_paths),
        }
    }

    /// The loaded corpus, initializing it on first use.
    pub async fn corpus(&self, corpus: Corpus) -> AppResult<Arc<CorpusIndex>> {
        let (cell, paths) = self.slot(corpus);

        let loaded = cell
            .get_or_try_init(|| async {
                let paths = paths.clone();
                let task = tokio::task::spawn_blocking(move || {
                    initialize(corpus, &paths.index, &paths.data)
                });

                match task.await {
                    Ok(result) => result.map(Arc::new),
                    Err(e) => Err(AppError::Retrieval(format!(
                        "Index initialization task failed: {}",
                        e
                    ))),
                }
            })
            .await?;

        Ok(Arc::clone(loaded))
    }

    /// Load both corpora now and report their sizes.
    pub async fn warm_up(&self) -> AppResult<StoreStats> {
        let (quran, hadith) = tokio::try_join!(
            self.corpus(Corpus::Quran),
            self.corpus(Corpus::Hadith)
        )?;

        Ok(StoreStats {
            quran: quran.len(),
            hadith: hadith.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CorpusMetadata;
    use tempfile::TempDir;

    fn doc(id: &str, embedding: Vec<f32>) -> IndexedDocument {
        IndexedDocument {
            id: id.to_string(),
            reference: format!("ref {}", id),
            text_ar: "نص".to_string(),
            text_fr: "texte".to_string(),
            normalized_fr: "texte".to_string(),
            normalized_ar: "نص".to_string(),
            embedding,
            metadata: CorpusMetadata::default(),
            source_type: None,
        }
    }

    fn write_data(path: &Path, docs: &[IndexedDocument]) {
        std::fs::write(path, serde_json::to_string(docs).unwrap()).unwrap();
    }

    #[test]
    fn test_missing_data_is_absent_even_with_index() {
        let temp = TempDir::new().unwrap();
        let index_path = temp.path().join("q.index");
        FlatL2Index::build(&[vec![1.0]]).unwrap().write_to(&index_path).unwrap();

        let loaded = initialize(Corpus::Quran, &index_path, &temp.path().join("none.json")).unwrap();
        assert!(loaded.index.is_none());
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_builds_persists_and_stamps() {
        let temp = TempDir::new().unwrap();
        let index_path = temp.path().join("h.index");
        let data_path = temp.path().join("h.json");
        write_data(&data_path, &[doc("h1", vec![0.0, 1.0]), doc("h2", vec![1.0, 0.0])]);

        let loaded = initialize(Corpus::Hadith, &index_path, &data_path).unwrap();
        assert!(index_path.exists());
        assert_eq!(loaded.len(), 2);
        assert!(loaded
            .documents
            .iter()
            .all(|d| d.source_type == Some(Corpus::Hadith)));

        let hits = knn_search(&loaded, &[1.0, 0.0], 1).unwrap();
        assert_eq!(hits[0].1.id, "h2");
    }

    #[test]
    fn test_mismatched_index_is_rebuilt() {
        let temp = TempDir::new().unwrap();
        let index_path = temp.path().join("q.index");
        let data_path = temp.path().join("q.json");

        FlatL2Index::build(&[vec![5.0, 5.0]]).unwrap().write_to(&index_path).unwrap();
        write_data(&data_path, &[doc("a", vec![0.0, 0.0]), doc("b", vec![1.0, 1.0])]);

        let loaded = initialize(Corpus::Quran, &index_path, &data_path).unwrap();
        assert_eq!(loaded.index.as_ref().map(FlatL2Index::len), Some(2));
        assert_eq!(FlatL2Index::read_from(&index_path).unwrap().len(), 2);
    }

    #[test]
    fn test_corrupt_index_is_rebuilt() {
        let temp = TempDir::new().unwrap();
        let index_path = temp.path().join("q.index");
        let data_path = temp.path().join("q.json");

        std::fs::write(&index_path, b"garbage").unwrap();
        write_data(&data_path, &[doc("a", vec![0.5, 0.5])]);

        let loaded = initialize(Corpus::Quran, &index_path, &data_path).unwrap();
        assert_eq!(loaded.index.as_ref().map(FlatL2Index::len), Some(1));
        assert_eq!(knn_search(&loaded, &[0.5, 0.5], 1).unwrap()[0].1.id, "a");
        assert_eq!(FlatL2Index::read_from(&index_path).unwrap().len(), 1);
    }

    #[test]
    fn test_empty_data_is_absent() {
        let temp = TempDir::new().unwrap();
        let data_path = temp.path().join("q.json");
        write_data(&data_path, &[]);

        let loaded = initialize(Corpus::Quran, &temp.path().join("q.index"), &data_path).unwrap();
        assert!(loaded.index.is_none());
    }

    #[test]
    fn test_absent_corpus_search_is_empty() {
        let absent = CorpusIndex::absent(Corpus::Quran);
        assert!(knn_search(&absent, &[1.0], 5).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_initializes_once() {
        let temp = TempDir::new().unwrap();
        let data_path = temp.path().join("q.json");
        write_data(&data_path, &[doc("a", vec![0.0, 0.0])]);

        let store = Arc::new(VectorStore::new(
            CorpusPaths {
                index: temp.path().join("q.index"),
                data: data_path,
            },
            CorpusPaths {
                index: temp.path().join("h.index"),
                data: temp.path().join("missing.json"),
            },
        ));

        let (a, b) = tokio::join!(store.corpus(Corpus::Quran), store.corpus(Corpus::Quran));
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));

        let stats = store.warm_up().await.unwrap();
        assert_eq!(stats, StoreStats { quran: 1, hadith: 0 });
    }
}
