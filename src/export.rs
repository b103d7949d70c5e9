//! Output tables for the clustering and lookalike paths

use crate::model::KMeansModel;
use crate::similarity::SimilarityResult;
use polars::prelude::*;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// One row per clustered customer: `CustomerID, Age, TotalSpending, Cluster`.
///
/// `Age` is the value the model clustered on, so a customer whose age was
/// imputed carries the imputed mean.
pub fn cluster_table(model: &KMeansModel) -> crate::Result<DataFrame> {
    let ages: Vec<f64> = model.raw_features.column(0).to_vec();
    let spending: Vec<f64> = model.raw_features.column(1).to_vec();
    let clusters: Vec<u32> = model.labels.iter().map(|&label| label as u32).collect();

    let df = DataFrame::new(vec![
        Series::new("CustomerID", model.customer_ids.clone()),
        Series::new("Age", ages),
        Series::new("TotalSpending", spending),
        Series::new("Cluster", clusters),
    ])?;

    Ok(df)
}

/// Long-format lookalike table: `CustomerID, Rank, LookalikeID, Score`
pub fn lookalike_table(results: &BTreeMap<String, SimilarityResult>) -> crate::Result<DataFrame> {
    let mut ids = Vec::new();
    let mut ranks = Vec::new();
    let mut lookalike_ids = Vec::new();
    let mut scores = Vec::new();

    for (customer_id, result) in results {
        for (rank, neighbor) in result.neighbors.iter().enumerate() {
            ids.push(customer_id.clone());
            ranks.push(rank as u32 + 1);
            lookalike_ids.push(neighbor.customer_id.clone());
            scores.push(neighbor.score);
        }
    }

    let df = DataFrame::new(vec![
        Series::new("CustomerID", ids),
        Series::new("Rank", ranks),
        Series::new("LookalikeID", lookalike_ids),
        Series::new("Score", scores),
    ])?;

    Ok(df)
}

pub fn write_csv(df: &mut DataFrame, path: impl AsRef<Path>) -> crate::Result<()> {
    let path = path.as_ref();
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    log::info!("Wrote {} rows to {}", df.height(), path.display());
    Ok(())
}

/// Write the keyed lookalike map as a JSON object
/// `{ "<CustomerID>": [{"customer_id": ..., "score": ...}, ...] }`
pub fn write_lookalike_json(
    results: &BTreeMap<String, SimilarityResult>,
    path: impl AsRef<Path>,
) -> crate::Result<()> {
    let path = path.as_ref();
    let keyed: BTreeMap<&str, _> = results
        .iter()
        .map(|(id, result)| (id.as_str(), &result.neighbors))
        .collect();

    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, &keyed)?;
    log::info!("Wrote lookalikes for {} customers to {}", keyed.len(), path.display());
    Ok(())
}
