//! Mock embedding provider using character trigrams.

use crate::embeddings::provider::EmbeddingProvider;
use std::collections::{HashMap, HashSet};
use tadabbur_core::AppResult;

/// French function words and role markers, ignored when hashing.
const STOP_WORDS: &[&str] = &[
    "le", "la", "les", "un", "une", "des", "du", "de", "et", "ou", "en", "au", "aux", "que",
    "qui", "sur", "dans", "par", "pour", "est", "ce", "ces", "se", "sa", "son", "ses", "il",
    "elle", "ils", "query:", "passage:",
];

/// Deterministic, offline provider for tests and development.
///
/// Words and their character trigrams are hashed into buckets, then the
/// vector is scaled to unit length. Texts sharing words land close
/// together, which is enough to exercise ranking without a model.
#[derive(Debug)]
pub struct MockProvider {
    dimensions: usize,
}

impl MockProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn bucket(&self, bytes: &[u8], seed: u64) -> usize {
        let hash = bytes
            .iter()
            .fold(0u64, |acc, b| acc.wrapping_mul(seed).wrapping_add(u64::from(*b)));
        (hash % self.dimensions as u64) as usize
    }

    fn generate(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimensions];
        if self.dimensions == 0 {
            return embedding;
        }

        let stop_words: HashSet<&str> = STOP_WORDS.iter().copied().collect();
        let lower = text.to_lowercase();

        let mut word_freq: HashMap<&str, u32> = HashMap::new();
        for word in lower
            .split_whitespace()
            .filter(|w| !stop_words.contains(w) && w.chars().count() > 1)
        {
            *word_freq.entry(word).or_insert(0) += 1;
        }

        for (word, freq) in &word_freq {
            let chars: Vec<char> = word.chars().collect();
            for window in chars.windows(3) {
                let trigram: String = window.iter().collect();
                let idx = self.bucket(trigram.as_bytes(), 37);
                embedding[idx] += (*freq as f32).sqrt();
            }

            let idx = self.bucket(word.as_bytes(), 31);
            embedding[idx] += *freq as f32;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut embedding {
                *v /= norm;
            }
        }

        embedding
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for MockProvider {
    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model_name(&self) -> &str {
        "trigram-v1"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.generate(text)).collect())
    }
}
