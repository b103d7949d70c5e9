//! CohortForge: customer segmentation and lookalike retrieval CLI
//!
//! This is the main entrypoint that orchestrates data loading, feature
//! building, clustering or similarity search, and writing the output tables.

use anyhow::{Context, Result};
use clap::Parser;
use cohortforge::cli::{ClusterArgs, Command, InputArgs, LookalikeArgs};
use cohortforge::{export, fit_kmeans, Args, Dataset, FeatureMatrix, SimilarityIndex};
use std::time::Instant;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match &args.command {
        Command::Cluster(cluster) => run_clustering(cluster),
        Command::Lookalike(lookalike) => run_lookalike(lookalike),
    }
}

fn build_features(input: &InputArgs) -> Result<FeatureMatrix> {
    let config = input.load_config();
    log::info!("Reference date for customer ages: {}", config.reference_date);

    let dataset = Dataset::load(&input.customers, &input.products, &input.transactions, &config)
        .with_context(|| {
            format!(
                "loading {}, {}, {}",
                input.customers.display(),
                input.products.display(),
                input.transactions.display()
            )
        })?;

    let joined = dataset.join()?;
    let features = FeatureMatrix::build(&joined)?;
    Ok(features)
}

/// Run the full clustering pipeline
fn run_clustering(args: &ClusterArgs) -> Result<()> {
    let predict = args.parse_predict_values()?;
    let start_time = Instant::now();

    let features = build_features(&args.input)?;
    let model = fit_kmeans(&features, &args.cluster_config())?;

    println!("=== Cluster Statistics ===");
    let total = model.customer_ids.len();
    for (i, size) in model.cluster_sizes().into_iter().enumerate() {
        let percentage = (size as f64 / total as f64) * 100.0;
        println!("Cluster {}: {} customers ({:.1}%)", i, size, percentage);
    }
    if !model.assignment.excluded.is_empty() {
        println!(
            "Excluded (no age): {} customers",
            model.assignment.excluded.len()
        );
    }
    println!("\nDB Index: {:.4}", model.davies_bouldin());
    println!("Within-cluster sum of squares: {:.4}", model.inertia);

    let mut table = export::cluster_table(&model)?;
    export::write_csv(&mut table, &args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;

    if let Some((age, spending)) = predict {
        let cluster = model.predict(age, spending);
        println!(
            "\nPredicted cluster for age={}, total spending={:.2}: {}",
            age, spending, cluster
        );
    }

    log::info!(
        "Clustering pipeline finished in {:.2}s",
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Run the lookalike pipeline
fn run_lookalike(args: &LookalikeArgs) -> Result<()> {
    let start_time = Instant::now();

    let features = build_features(&args.input)?;
    let index = SimilarityIndex::build(&features, &args.similarity_config())?;

    let results = match &args.customer {
        Some(customer) => index.lookalikes_for([customer])?,
        None => {
            let limit = if args.lookalike_limit == 0 {
                index.len()
            } else {
                args.lookalike_limit
            };
            index.lookalikes_for(index.customer_ids().iter().take(limit))?
        }
    };

    for (customer_id, result) in &results {
        println!("Top similar customers for {}:", customer_id);
        for neighbor in &result.neighbors {
            println!("  {}  {:.4}", neighbor.customer_id, neighbor.score);
        }
    }

    let mut table = export::lookalike_table(&results)?;
    export::write_csv(&mut table, &args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;

    if let Some(json_path) = &args.json {
        export::write_lookalike_json(&results, json_path)
            .with_context(|| format!("writing {}", json_path.display()))?;
    }

    log::info!(
        "Lookalike pipeline finished in {:.2}s",
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}
