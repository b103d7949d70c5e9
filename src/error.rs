use polars::prelude::PolarsError;
use thiserror::Error;

/// Error types for the feature, similarity and clustering pipeline
#[derive(Error, Debug)]
pub enum SegmentError {
    /// A required column or key is absent, duplicated or holds an invalid value
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    /// No transaction survived the join
    #[error("Empty dataset: {0}")]
    EmptyDataset(String),

    /// Fewer records than a parameter requires (e.g. customers < n_clusters)
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Similarity query for a customer that is not in the feature matrix
    #[error("Unknown customer: {0}")]
    UnknownCustomer(String),

    /// A required feature is null for a customer entering a stage that needs it
    #[error("Missing feature '{feature}' for customer {customer_id}")]
    MissingFeature {
        feature: &'static str,
        customer_id: String,
    },

    /// A configuration parameter is out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
