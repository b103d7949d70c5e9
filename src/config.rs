use crate::error::SegmentError;
use crate::scaling::Normalization;
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

/// What a stage does with a customer whose age is null
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingAgePolicy {
    /// Leave the customer out of the stage and report it
    Exclude,
    /// Fail with `SegmentError::MissingFeature`
    Reject,
    /// Replace the null with the mean age of the other customers
    ImputeMean,
}

/// Configuration for the clustering engine
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Number of clusters
    pub k: usize,

    /// Maximum number of assign/update iterations
    pub max_iters: usize,

    /// Random seed for centroid initialization
    pub seed: u64,

    /// Handling of customers without an age
    pub missing_age: MissingAgePolicy,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            k: 4,
            max_iters: 300,
            seed: 42,
            missing_age: MissingAgePolicy::Exclude,
        }
    }
}

impl ClusterConfig {
    /// Create a new configuration with the specified number of clusters
    pub fn new(k: usize) -> Self {
        Self {
            k,
            ..Default::default()
        }
    }

    pub fn with_max_iters(mut self, max_iters: usize) -> Self {
        self.max_iters = max_iters;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_missing_age(mut self, policy: MissingAgePolicy) -> Self {
        self.missing_age = policy;
        self
    }

    pub fn validate(&self) -> Result<(), SegmentError> {
        if self.k < 2 {
            return Err(SegmentError::InvalidConfig(format!(
                "number of clusters must be at least 2, got {}",
                self.k
            )));
        }
        if self.max_iters == 0 {
            return Err(SegmentError::InvalidConfig(
                "max_iters must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the similarity engine
#[derive(Debug, Clone)]
pub struct SimilarityConfig {
    /// Number of lookalikes returned per query
    pub top_k: usize,

    /// Column scaling applied before cosine similarity
    pub normalization: Normalization,

    /// Handling of customers without an age
    pub missing_age: MissingAgePolicy,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            normalization: Normalization::ZScore,
            missing_age: MissingAgePolicy::Reject,
        }
    }
}

impl SimilarityConfig {
    pub fn new(top_k: usize) -> Self {
        Self {
            top_k,
            ..Default::default()
        }
    }

    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }

    pub fn with_missing_age(mut self, policy: MissingAgePolicy) -> Self {
        self.missing_age = policy;
        self
    }

    pub fn validate(&self) -> Result<(), SegmentError> {
        if self.top_k == 0 {
            return Err(SegmentError::InvalidConfig(
                "top_k must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings for turning raw relations into joined records
#[derive(Debug, Clone)]
pub struct LoadConfig {
    /// The "now" that customer ages are computed against
    pub reference_date: NaiveDate,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            reference_date: Local::now().date_naive(),
        }
    }
}

impl LoadConfig {
    pub fn with_reference_date(mut self, reference_date: NaiveDate) -> Self {
        self.reference_date = reference_date;
        self
    }
}
