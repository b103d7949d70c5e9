//! Lookalike retrieval by cosine similarity over scaled feature vectors

use crate::config::SimilarityConfig;
use crate::error::SegmentError;
use crate::features::{FeatureColumns, FeatureMatrix};
use crate::scaling::FeatureScaler;
use ndarray::{Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Magnitudes below this are treated as zero vectors
const COSINE_EPSILON: f64 = 1e-12;

/// One ranked lookalike
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Neighbor {
    pub customer_id: String,
    pub score: f64,
}

/// Ranked lookalikes of one query customer, most similar first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityResult {
    pub query_id: String,
    pub neighbors: Vec<Neighbor>,
}

/// All-pairs similarity over a feature matrix, addressable by customer id
#[derive(Debug, Clone)]
pub struct SimilarityIndex {
    config: SimilarityConfig,
    customer_ids: Vec<String>,
    index: HashMap<String, usize>,
    matrix: Array2<f64>,
    excluded: Vec<String>,
}

impl SimilarityIndex {
    /// Scale the full feature set and compute the similarity matrix once
    pub fn build(features: &FeatureMatrix, config: &SimilarityConfig) -> crate::Result<Self> {
        config.validate()?;

        let dense = features.to_dense(FeatureColumns::Full, config.missing_age)?;
        let (_, scaled) = FeatureScaler::fit_transform(config.normalization, &dense.values.view());

        log::debug!(
            "Computing {}x{} similarity matrix over {} features ({:?} normalization)",
            dense.customer_ids.len(),
            dense.customer_ids.len(),
            dense.column_names.len(),
            config.normalization
        );
        let matrix = cosine_similarity_matrix(&scaled.view())?;

        let index = dense
            .customer_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();

        Ok(Self {
            config: config.clone(),
            customer_ids: dense.customer_ids,
            index,
            matrix,
            excluded: dense.excluded,
        })
    }

    pub fn len(&self) -> usize {
        self.customer_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.customer_ids.is_empty()
    }

    pub fn customer_ids(&self) -> &[String] {
        &self.customer_ids
    }

    /// Customers left out of the index for a null age
    pub fn excluded(&self) -> &[String] {
        &self.excluded
    }

    pub fn config(&self) -> &SimilarityConfig {
        &self.config
    }

    /// Similarity between two indexed customers
    pub fn similarity(&self, a: &str, b: &str) -> crate::Result<f64> {
        let i = self.position(a)?;
        let j = self.position(b)?;
        Ok(self.matrix[[i, j]])
    }

    /// Top `k` lookalikes of `customer_id`, descending by score with ties
    /// broken by customer id ascending. The query itself is never returned.
    pub fn top_k(&self, customer_id: &str, k: usize) -> crate::Result<SimilarityResult> {
        let i = self.position(customer_id)?;
        let row = self.matrix.row(i);

        let mut neighbors: Vec<Neighbor> = self
            .customer_ids
            .iter()
            .zip(row.iter())
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, (id, &score))| Neighbor {
                customer_id: id.clone(),
                score,
            })
            .collect();

        neighbors.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.customer_id.cmp(&b.customer_id))
        });
        neighbors.truncate(k);

        Ok(SimilarityResult {
            query_id: customer_id.to_string(),
            neighbors,
        })
    }

    /// Top-K lookalikes using the configured K
    pub fn lookalikes(&self, customer_id: &str) -> crate::Result<SimilarityResult> {
        self.top_k(customer_id, self.config.top_k)
    }

    /// Lookalikes for each id in `customer_ids`, keyed by query id
    pub fn lookalikes_for<I, S>(
        &self,
        customer_ids: I,
    ) -> crate::Result<BTreeMap<String, SimilarityResult>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        customer_ids
            .into_iter()
            .map(|id| {
                let result = self.lookalikes(id.as_ref())?;
                Ok((result.query_id.clone(), result))
            })
            .collect()
    }

    /// Lookalikes for every indexed customer
    pub fn top_k_for_all(&self) -> crate::Result<BTreeMap<String, SimilarityResult>> {
        self.lookalikes_for(&self.customer_ids)
    }

    fn position(&self, customer_id: &str) -> crate::Result<usize> {
        if let Some(&i) = self.index.get(customer_id) {
            return Ok(i);
        }
        if self.excluded.iter().any(|id| id == customer_id) {
            return Err(SegmentError::MissingFeature {
                feature: "age",
                customer_id: customer_id.to_string(),
            });
        }
        Err(SegmentError::UnknownCustomer(customer_id.to_string()))
    }
}

/// Cosine similarity of two vectors; 0 if either has zero magnitude
pub fn cosine_similarity(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    let norm_a = a.dot(a).sqrt();
    let norm_b = b.dot(b).sqrt();
    if norm_a < COSINE_EPSILON || norm_b < COSINE_EPSILON {
        return 0.0;
    }
    (a.dot(b) / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Dense `n x n` cosine similarity matrix of the rows of `data`.
///
/// Rows are computed in parallel; each output row is written by one task.
pub fn cosine_similarity_matrix(data: &ArrayView2<f64>) -> crate::Result<Array2<f64>> {
    let n = data.nrows();

    let mut values = vec![0.0f64; n * n];
    values
        .par_chunks_mut(n.max(1))
        .enumerate()
        .for_each(|(i, out)| {
            let row_i = data.row(i);
            for (value, row_j) in out.iter_mut().zip(data.outer_iter()) {
                *value = cosine_similarity(&row_i, &row_j);
            }
        });

    Ok(Array2::from_shape_vec((n, n), values)?)
}
