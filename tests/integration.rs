//! Integration tests for CohortForge

use approx::assert_relative_eq;
use chrono::NaiveDate;
use cohortforge::{
    export, fit_kmeans, ClusterConfig, Dataset, FeatureMatrix, LoadConfig, SegmentError,
    SimilarityConfig, SimilarityIndex,
};
use std::io::Write;
use tempfile::NamedTempFile;

struct Fixture {
    customers: NamedTempFile,
    products: NamedTempFile,
    transactions: NamedTempFile,
}

fn write_lines(lines: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    file
}

/// Create the three CSV relations with sample data
fn create_fixture() -> Fixture {
    let customers = write_lines(&[
        "CustomerID,CustomerName,Region,SignupDate",
        "C0001,Lawrence Carroll,South America,2022-07-10",
        "C0002,Elizabeth Lutz,Asia,2022-02-13",
        "C0003,Michael Rivera,South America,2024-03-07",
        "C0004,Kathleen Rodriguez,South America,2022-10-09",
        "C0005,Laura Weber,Asia,2022-08-15",
        "C0006,Brittany Palmer,South America,2024-01-07",
        "C0007,Paul Graves,Asia,2022-06-18",
        "C0008,David Li,North America,2024-01-13",
    ]);

    let products = write_lines(&[
        "ProductID,ProductName,Category,Price",
        "P001,ActiveWear Biography,Books,169.3",
        "P002,ActiveWear Smartwatch,Electronics,346.3",
        "P003,ComfortLiving Biography,Books,44.12",
        "P004,BookWorld Rug,Home Decor,95.69",
        "P005,TechPro T-Shirt,Clothing,429.31",
    ]);

    let transactions = write_lines(&[
        "TransactionID,CustomerID,ProductID,TransactionDate,Quantity,TotalValue,Price",
        "T00001,C0001,P001,2024-08-25 12:38:23,1,169.3,169.3",
        "T00002,C0001,P003,2024-05-27 22:23:54,2,88.24,44.12",
        "T00003,C0002,P002,2024-04-25 07:38:55,3,1038.9,346.3",
        "T00004,C0002,P002,2024-03-26 22:55:37,1,346.3,346.3",
        "T00005,C0003,P004,2024-03-21 15:10:10,4,382.76,95.69",
        "T00006,C0004,P005,2024-12-21 15:10:10,2,858.62,429.31",
        "T00007,C0004,P005,2024-07-21 15:10:10,1,429.31,429.31",
        "T00008,C0005,P001,2024-02-10 11:00:00,1,169.3,169.3",
        "T00009,C0006,P004,2024-09-09 09:09:09,2,191.38,95.69",
        "T00010,C0007,P002,2024-06-01 10:00:00,2,692.6,346.3",
        "T00011,C0008,P003,2024-11-11 11:11:11,1,44.12,44.12",
        "T00012,C0099,P001,2024-11-12 11:11:11,1,169.3,169.3",
        "T00013,C0008,P999,2024-11-13 11:11:11,1,10.0,10.0",
    ]);

    Fixture {
        customers,
        products,
        transactions,
    }
}

fn reference_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 27).unwrap()
}

fn load_features(fixture: &Fixture) -> FeatureMatrix {
    let dataset = Dataset::load(
        fixture.customers.path(),
        fixture.products.path(),
        fixture.transactions.path(),
        &LoadConfig::default().with_reference_date(reference_date()),
    )
    .unwrap();

    let joined = dataset.join().unwrap();
    FeatureMatrix::build(&joined).unwrap()
}

#[test]
fn test_join_and_features() {
    let fixture = create_fixture();
    let features = load_features(&fixture);

    // Transactions with an unknown customer or product are dropped
    assert_eq!(features.len(), 8);
    assert!(!features.contains("C0099"));
    assert_eq!(
        features.categories(),
        &["Books", "Clothing", "Electronics", "Home Decor"]
    );

    let c1 = features.get("C0001").unwrap();
    assert_eq!(c1.age, Some(2));
    assert_relative_eq!(c1.total_spending, 257.54, epsilon = 1e-9);
    assert_eq!(c1.purchase_frequency, 2);
    assert_relative_eq!(c1.avg_transaction_value.unwrap(), 128.77, epsilon = 1e-9);
    assert_eq!(c1.category_counts, vec![2, 0, 0, 0]);

    // C0008 keeps only its valid transaction
    let c8 = features.get("C0008").unwrap();
    assert_eq!(c8.purchase_frequency, 1);
    assert_relative_eq!(c8.total_spending, 44.12, epsilon = 1e-9);
}

#[test]
fn test_end_to_end_clustering() {
    let fixture = create_fixture();
    let features = load_features(&fixture);

    let model = fit_kmeans(&features, &ClusterConfig::default()).unwrap();

    assert_eq!(model.n_clusters, 4);
    assert_eq!(model.assignment.labels.len(), 8);
    assert!(model.assignment.labels.values().all(|&l| l < 4));
    assert_eq!(model.cluster_sizes().iter().sum::<usize>(), 8);
    assert!(model.davies_bouldin().is_finite());
    assert!(model.davies_bouldin() >= 0.0);

    let rerun = fit_kmeans(&features, &ClusterConfig::default()).unwrap();
    assert_eq!(model.assignment, rerun.assignment);

    let mut table = export::cluster_table(&model).unwrap();
    let output = NamedTempFile::new().unwrap();
    export::write_csv(&mut table, output.path()).unwrap();

    let written = std::fs::read_to_string(output.path()).unwrap();
    let mut lines = written.lines();
    assert_eq!(lines.next(), Some("CustomerID,Age,TotalSpending,Cluster"));
    assert_eq!(lines.count(), 8);
}

#[test]
fn test_end_to_end_lookalike() {
    let fixture = create_fixture();
    let features = load_features(&fixture);

    let index = SimilarityIndex::build(&features, &SimilarityConfig::default()).unwrap();
    let all = index.top_k_for_all().unwrap();

    assert_eq!(all.len(), 8);
    for (customer_id, result) in &all {
        assert!(result.neighbors.len() <= 3);
        assert!(result.neighbors.iter().all(|n| &n.customer_id != customer_id));
        assert!(result
            .neighbors
            .windows(2)
            .all(|w| w[0].score >= w[1].score));
    }

    // Both electronics buyers of similar age end up closest to each other
    assert_eq!(all["C0002"].neighbors[0].customer_id, "C0007");

    assert!(matches!(
        index.lookalikes("C0099"),
        Err(SegmentError::UnknownCustomer(_))
    ));
}

#[test]
fn test_empty_join() {
    let customers = write_lines(&["CustomerID,SignupDate", "C1,2020-01-10"]);
    let products = write_lines(&["ProductID,ProductName,Category,Price", "P1,Lamp,Home Decor,10"]);
    let transactions = write_lines(&[
        "TransactionID,CustomerID,ProductID,Quantity,TotalValue,TransactionDate",
        "T1,C2,P1,1,10.0,2024-01-01",
    ]);

    let dataset = Dataset::load(
        customers.path(),
        products.path(),
        transactions.path(),
        &LoadConfig::default(),
    )
    .unwrap();
    let joined = dataset.join().unwrap();

    assert!(joined.is_empty());
    assert!(matches!(
        FeatureMatrix::build(&joined),
        Err(SegmentError::EmptyDataset(_))
    ));
}

#[test]
fn test_missing_column() {
    let customers = write_lines(&["CustomerID,Region", "C1,Asia"]);
    let products = write_lines(&["ProductID,ProductName,Category,Price", "P1,Lamp,Home Decor,10"]);
    let transactions = write_lines(&[
        "TransactionID,CustomerID,ProductID,Quantity,TotalValue,TransactionDate",
        "T1,C1,P1,1,10.0,2024-01-01",
    ]);

    let result = Dataset::load(
        customers.path(),
        products.path(),
        transactions.path(),
        &LoadConfig::default(),
    );
    assert!(matches!(result, Err(SegmentError::DataIntegrity(_))));
}

#[test]
fn test_insufficient_customers_for_clusters() {
    let customers = write_lines(&["CustomerID,SignupDate", "C1,2020-01-10", "C2,2021-05-01"]);
    let products = write_lines(&["ProductID,ProductName,Category,Price", "P1,Lamp,Home Decor,10"]);
    let transactions = write_lines(&[
        "TransactionID,CustomerID,ProductID,Quantity,TotalValue,TransactionDate",
        "T1,C1,P1,2,20.0,2024-01-01",
        "T2,C2,P1,1,10.0,2024-01-02",
    ]);

    let dataset = Dataset::load(
        customers.path(),
        products.path(),
        transactions.path(),
        &LoadConfig::default(),
    )
    .unwrap();
    let features = FeatureMatrix::build(&dataset.join().unwrap()).unwrap();

    assert!(matches!(
        fit_kmeans(&features, &ClusterConfig::new(4)),
        Err(SegmentError::InsufficientData(_))
    ));
}
