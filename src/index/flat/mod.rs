#[cfg(test)]
mod tests;

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlatIndexError {
    #[error("Vector {position} has dimension {actual}, index dimension is {expected}")]
    DimensionMismatch {
        position: usize,
        expected: usize,
        actual: usize,
    },
    #[error("Index data length {len} is not a multiple of dimension {dimension}")]
    Truncated { len: usize, dimension: usize },
}

/// One neighbor returned by a search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Row of the vector in the index, which is also the chunk id
    pub position: usize,
    /// Squared Euclidean distance to the query
    pub distance: f32,
}

/// Exhaustive squared-L2 nearest-neighbor index.
///
/// Vectors are stored row-major in a single buffer. Searches scan every row,
/// so results are exact and repeatable.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FlatL2Index {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatL2Index {
    /// Build an index from equally sized vectors; the dimension is taken from the first one
    #[inline]
    pub fn from_vectors(vectors: &[Vec<f32>]) -> Result<Self, FlatIndexError> {
        let dimension = vectors.first().map_or(0, Vec::len);
        let mut index = Self {
            dimension,
            data: Vec::with_capacity(dimension * vectors.len()),
        };

        for (position, vector) in vectors.iter().enumerate() {
            if vector.len() != dimension {
                return Err(FlatIndexError::DimensionMismatch {
                    position,
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            index.data.extend_from_slice(vector);
        }

        Ok(index)
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check that the buffer holds whole rows, used after deserializing
    #[inline]
    pub fn validate(&self) -> Result<(), FlatIndexError> {
        let whole_rows = if self.dimension == 0 {
            self.data.is_empty()
        } else {
            self.data.len() % self.dimension == 0
        };

        if whole_rows {
            Ok(())
        } else {
            Err(FlatIndexError::Truncated {
                len: self.data.len(),
                dimension: self.dimension,
            })
        }
    }

    /// Iterate over stored vectors in position order
    #[inline]
    pub fn vectors(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dimension.max(1))
    }

    /// Return up to `k` nearest rows sorted by ascending distance.
    ///
    /// Ties are broken by position so identical queries always produce the
    /// same order.
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, FlatIndexError> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        if query.len() != self.dimension {
            return Err(FlatIndexError::DimensionMismatch {
                position: 0,
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut neighbors: Vec<Neighbor> = self
            .vectors()
            .enumerate()
            .map(|(position, vector)| Neighbor {
                position,
                distance: squared_l2(vector, query),
            })
            .collect();

        if k < neighbors.len() {
            neighbors.select_nth_unstable_by(k, compare_neighbors);
            neighbors.truncate(k);
        }
        neighbors.sort_by(compare_neighbors);

        Ok(neighbors)
    }
}

fn compare_neighbors(a: &Neighbor, b: &Neighbor) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then(a.position.cmp(&b.position))
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
