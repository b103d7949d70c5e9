//! Command-line interface definitions and argument parsing

use crate::config::{ClusterConfig, LoadConfig, MissingAgePolicy, SimilarityConfig};
use crate::scaling::Normalization;
use chrono::NaiveDate;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Customer segmentation and lookalike retrieval from transaction data
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Segment customers with K-Means on age and total spending
    Cluster(ClusterArgs),
    /// Find the most similar customers for each customer
    Lookalike(LookalikeArgs),
}

/// Input relations shared by every subcommand
#[derive(ClapArgs, Debug, Clone)]
pub struct InputArgs {
    /// Path to the customers CSV file
    #[arg(long, default_value = "Customers.csv")]
    pub customers: PathBuf,

    /// Path to the products CSV file
    #[arg(long, default_value = "Products.csv")]
    pub products: PathBuf,

    /// Path to the transactions CSV file
    #[arg(long, default_value = "Transactions.csv")]
    pub transactions: PathBuf,

    /// Reference date for customer ages (YYYY-MM-DD, default: today)
    #[arg(long, value_parser = parse_reference_date)]
    pub as_of: Option<NaiveDate>,
}

impl InputArgs {
    pub fn load_config(&self) -> LoadConfig {
        match self.as_of {
            Some(date) => LoadConfig::default().with_reference_date(date),
            None => LoadConfig::default(),
        }
    }
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ClusterArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Number of clusters for K-Means
    #[arg(short = 'k', long, default_value = "4")]
    pub clusters: usize,

    /// Maximum iterations for K-Means algorithm
    #[arg(long, default_value = "300")]
    pub max_iters: usize,

    /// Random seed for centroid initialization
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Handling of customers without a usable signup date
    #[arg(long, value_enum, default_value_t = MissingAgeArg::Exclude)]
    pub missing_age: MissingAgeArg,

    /// Output path for the clustered customers table
    #[arg(short, long, default_value = "Clustered_Customers.csv")]
    pub output: PathBuf,

    /// Prediction mode: provide age and total spending as a comma-separated string
    /// Example: --predict "3,2500.0"
    #[arg(short, long)]
    pub predict: Option<String>,
}

impl ClusterArgs {
    pub fn cluster_config(&self) -> ClusterConfig {
        ClusterConfig::new(self.clusters)
            .with_max_iters(self.max_iters)
            .with_seed(self.seed)
            .with_missing_age(self.missing_age.into())
    }

    /// Parse the predict string
    /// Expected format: "age,total_spending"
    pub fn parse_predict_values(&self) -> crate::Result<Option<(f64, f64)>> {
        let Some(ref predict_str) = self.predict else {
            return Ok(None);
        };

        let parts: Vec<&str> = predict_str.split(',').collect();
        if parts.len() != 2 {
            return Err(crate::SegmentError::InvalidConfig(
                "Predict values must be in format 'age,total_spending'".to_string(),
            ));
        }

        let age: f64 = parts[0].trim().parse().map_err(|_| {
            crate::SegmentError::InvalidConfig(format!("Invalid age value: {}", parts[0]))
        })?;
        let spending: f64 = parts[1].trim().parse().map_err(|_| {
            crate::SegmentError::InvalidConfig(format!(
                "Invalid total spending value: {}",
                parts[1]
            ))
        })?;

        Ok(Some((age, spending)))
    }
}

#[derive(ClapArgs, Debug, Clone)]
pub struct LookalikeArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Number of lookalikes per customer
    #[arg(short = 'k', long, default_value = "3")]
    pub top_k: usize,

    /// Column scaling applied before cosine similarity
    #[arg(long, value_enum, default_value_t = NormalizationArg::ZScore)]
    pub normalization: NormalizationArg,

    /// Handling of customers without a usable signup date
    #[arg(long, value_enum, default_value_t = MissingAgeArg::Reject)]
    pub missing_age: MissingAgeArg,

    /// Only report the first N customers (by id); 0 reports all
    #[arg(long, default_value = "20")]
    pub lookalike_limit: usize,

    /// Query a single customer instead of the first N
    #[arg(long)]
    pub customer: Option<String>,

    /// Output path for the lookalike table
    #[arg(short, long, default_value = "Lookalike.csv")]
    pub output: PathBuf,

    /// Also write the keyed lookalike map as JSON
    #[arg(long)]
    pub json: Option<PathBuf>,
}

impl LookalikeArgs {
    pub fn similarity_config(&self) -> SimilarityConfig {
        SimilarityConfig::new(self.top_k)
            .with_normalization(self.normalization.into())
            .with_missing_age(self.missing_age.into())
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingAgeArg {
    Exclude,
    Reject,
    ImputeMean,
}

impl From<MissingAgeArg> for MissingAgePolicy {
    fn from(arg: MissingAgeArg) -> Self {
        match arg {
            MissingAgeArg::Exclude => MissingAgePolicy::Exclude,
            MissingAgeArg::Reject => MissingAgePolicy::Reject,
            MissingAgeArg::ImputeMean => MissingAgePolicy::ImputeMean,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizationArg {
    None,
    ZScore,
    MinMax,
}

impl From<NormalizationArg> for Normalization {
    fn from(arg: NormalizationArg) -> Self {
        match arg {
            NormalizationArg::None => Normalization::None,
            NormalizationArg::ZScore => Normalization::ZScore,
            NormalizationArg::MinMax => Normalization::MinMax,
        }
    }
}

fn parse_reference_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| format!("expected YYYY-MM-DD, got '{value}': {e}"))
}
