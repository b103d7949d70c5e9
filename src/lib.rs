//! CohortForge: customer feature engineering, K-Means segmentation and
//! lookalike retrieval over customer, product and transaction tables.
//!
//! The pipeline runs strictly forward: the three relations are loaded and
//! inner-joined ([`data`]), aggregated into one feature vector per customer
//! ([`features`]), and the resulting matrix feeds both the clustering engine
//! ([`model`]) and the similarity engine ([`similarity`]).

pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod features;
pub mod model;
pub mod scaling;
pub mod similarity;

// Re-export public items for easier access
pub use cli::Args;
pub use config::{ClusterConfig, LoadConfig, MissingAgePolicy, SimilarityConfig};
pub use data::{join_records, Dataset, JoinedRecord};
pub use error::SegmentError;
pub use features::{CustomerFeatureVector, FeatureColumns, FeatureMatrix};
pub use model::{fit_kmeans, ClusterAssignment, KMeansModel};
pub use scaling::{FeatureScaler, Normalization};
pub use similarity::{Neighbor, SimilarityIndex, SimilarityResult};

/// Common result type used throughout the library
pub type Result<T> = std::result::Result<T, SegmentError>;
