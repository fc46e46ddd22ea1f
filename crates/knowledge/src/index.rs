//! Exact flat L2 vector index.
//!
//! Vectors are kept in one row-major `f32` matrix and searched by brute
//! force. Distances are squared Euclidean, so lower means closer.
//!
//! On-disk layout (little-endian):
//!
//! ```text
//! magic  "TDBFLAT1"   8 bytes
//! dim    u32
//! count  u64
//! data   count * dim * f32
//! ```

use std::io::{Read, Write};
use std::path::Path;
use tadabbur_core::{AppError, AppResult};

const MAGIC: &[u8; 8] = b"TDBFLAT1";

/// One search hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Squared L2 distance to the query
    pub distance: f32,
    /// Row of the vector in insertion order
    pub position: usize,
}

/// Brute-force index over equally sized vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatL2Index {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatL2Index {
    /// Build an index from rows that must all have the same width.
    pub fn build(vectors: &[Vec<f32>]) -> AppResult<Self> {
        let dimension = vectors.first().map(Vec::len).unwrap_or(0);

        if dimension == 0 && !vectors.is_empty() {
            return Err(AppError::Retrieval(
                "Cannot index zero-length embeddings".to_string(),
            ));
        }

        let mut data = Vec::with_capacity(vectors.len() * dimension);
        for (row, vector) in vectors.iter().enumerate() {
            if vector.len() != dimension {
                return Err(AppError::Retrieval(format!(
                    "Embedding {} has dimension {}, expected {}",
                    row,
                    vector.len(),
                    dimension
                )));
            }
            data.extend_from_slice(vector);
        }

        Ok(Self { dimension, data })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `k` nearest rows, closest first.
    ///
    /// Equal distances keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> AppResult<Vec<Neighbor>> {
        if query.len() != self.dimension {
            return Err(AppError::Retrieval(format!(
                "Query has dimension {}, index expects {}",
                query.len(),
                self.dimension
            )));
        }

        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut neighbors: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, row)| Neighbor {
                distance: squared_l2(query, row),
                position,
            })
            .collect();

        // Stable sort keeps earlier rows ahead on ties
        neighbors.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        neighbors.truncate(k);

        Ok(neighbors)
    }

    /// Persist the index to `path`, creating parent directories.
    pub fn write_to(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut bytes = Vec::with_capacity(20 + self.data.len() * 4);
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.len() as u64).to_le_bytes());
        for &value in &self.data {
            bytes.extend_from_slice(&value.to_le_bytes());
        }

        let mut file = std::fs::File::create(path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;

        tracing::debug!("Wrote {} vectors to {:?}", self.len(), path);
        Ok(())
    }

    /// Load an index written by [`FlatL2Index::write_to`].
    pub fn read_from(path: &Path) -> AppResult<Self> {
        let mut file = std::fs::File::open(path)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        if bytes.len() < 20 || &bytes[..8] != MAGIC {
            return Err(AppError::Retrieval(format!(
                "Not a flat index file: {:?}",
                path
            )));
        }

        let dimension = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&bytes[12..20]);
        let count = u64::from_le_bytes(count_bytes) as usize;

        let body = &bytes[20..];
        let expected = count
            .checked_mul(dimension)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| AppError::Retrieval(format!("Corrupt index header in {:?}", path)))?;

        if body.len() != expected {
            return Err(AppError::Retrieval(format!(
                "Index file {:?} is truncated: {} bytes of vectors, expected {}",
                path,
                body.len(),
                expected
            )));
        }

        let data = body
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        Ok(Self { dimension, data })
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
