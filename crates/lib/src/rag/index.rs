//! # Flat Inner-Product Index
//!
//! An exact nearest-neighbor index over L2-normalized vectors. Inner product on
//! normalized vectors equals cosine similarity, so scores fall in `[-1.0, 1.0]`.
//!
//! ## Persistence format
//!
//! ```text
//! magic      4 bytes   b"NLIX"
//! dimension  u32 LE
//! count      u32 LE
//! vectors    count * dimension * f32 LE
//! ```

use crate::errors::IndexError;

const MAGIC: &[u8; 4] = b"NLIX";
const HEADER_LEN: usize = 12;

/// Scales a vector to unit length in place. A zero vector is left unchanged.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlatIpIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIpIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

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

    /// Normalizes and appends a vector.
    pub fn add(&mut self, mut vector: Vec<f32>) -> Result<(), IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        normalize(&mut vector);
        self.data.extend_from_slice(&vector);
        Ok(())
    }

    /// Returns up to `k` `(position, score)` pairs, highest score first.
    ///
    /// `k` is clamped to the number of stored vectors.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        let k = k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut query = query.to_vec();
        normalize(&mut query);

        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(i, v)| (i, dot(v, &query)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.len() as u32).to_le_bytes());
        for &v in &self.data {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IndexError> {
        if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
            return Err(IndexError::Corrupt("index file has no valid header".into()));
        }
        let dimension = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
        let count = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;

        let expected = dimension
            .checked_mul(count)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| {
                IndexError::Corrupt(format!("index header size {count} x {dimension} overflows"))
            })?;
        let body = &bytes[HEADER_LEN..];
        if body.len() != expected {
            return Err(IndexError::Corrupt(format!(
                "index file holds {} bytes of vectors, header says {count} x {dimension}",
                body.len()
            )));
        }

        let data = body
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Ok(Self { dimension, data })
    }
}
