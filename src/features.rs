//! Per-customer feature vectors aggregated from joined transactions

use crate::config::MissingAgePolicy;
use crate::data::JoinedRecord;
use crate::error::SegmentError;
use ndarray::Array2;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Fixed-schema behavioral summary of one customer
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerFeatureVector {
    pub customer_id: String,
    pub age: Option<i32>,
    pub total_spending: f64,
    /// `None` when the customer has no transactions
    pub avg_transaction_value: Option<f64>,
    pub purchase_frequency: usize,
    /// Purchase counts aligned with `FeatureMatrix::categories`
    pub category_counts: Vec<u32>,
}

/// Column subsets the matrix can be projected to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureColumns {
    /// age, total_spending, avg_transaction_value, purchase_frequency, one
    /// column per category
    Full,
    /// age, total_spending
    AgeSpending,
}

/// Dense projection of the feature matrix
#[derive(Debug, Clone)]
pub struct DenseFeatures {
    /// Customer ids in row order
    pub customer_ids: Vec<String>,
    pub column_names: Vec<String>,
    pub values: Array2<f64>,
    /// Customers left out under `MissingAgePolicy::Exclude`
    pub excluded: Vec<String>,
}

/// One feature vector per customer with at least one joined transaction
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    categories: Vec<String>,
    rows: Vec<CustomerFeatureVector>,
    index: HashMap<String, usize>,
}

#[derive(Default)]
struct Accumulator {
    age: Option<i32>,
    total_spending: f64,
    purchase_frequency: usize,
    category_counts: Vec<u32>,
}

impl FeatureMatrix {
    /// Aggregate joined records in a single pass.
    ///
    /// Rows are ordered by customer id; categories are the sorted set of
    /// distinct categories in `records`.
    pub fn build(records: &[JoinedRecord]) -> crate::Result<Self> {
        if records.is_empty() {
            return Err(SegmentError::EmptyDataset(
                "no transaction references an existing customer and product".to_string(),
            ));
        }

        let categories: Vec<String> = records
            .iter()
            .map(|r| r.category.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect();
        let category_index: HashMap<&str, usize> = categories
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect();

        let mut accumulators: BTreeMap<&str, Accumulator> = BTreeMap::new();
        for record in records {
            let acc = accumulators
                .entry(record.customer_id.as_str())
                .or_insert_with(|| Accumulator {
                    age: record.age,
                    category_counts: vec![0; categories.len()],
                    ..Default::default()
                });

            acc.total_spending += record.total_value;
            acc.purchase_frequency += 1;
            acc.category_counts[category_index[record.category.as_str()]] += 1;
        }

        let rows: Vec<CustomerFeatureVector> = accumulators
            .into_iter()
            .map(|(customer_id, acc)| CustomerFeatureVector {
                customer_id: customer_id.to_string(),
                age: acc.age,
                total_spending: acc.total_spending,
                avg_transaction_value: (acc.purchase_frequency > 0)
                    .then(|| acc.total_spending / acc.purchase_frequency as f64),
                purchase_frequency: acc.purchase_frequency,
                category_counts: acc.category_counts,
            })
            .collect();

        let index = rows
            .iter()
            .enumerate()
            .map(|(i, row)| (row.customer_id.clone(), i))
            .collect();

        log::info!(
            "Built features for {} customers over {} categories",
            rows.len(),
            categories.len()
        );

        Ok(Self {
            categories,
            rows,
            index,
        })
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn rows(&self) -> &[CustomerFeatureVector] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, customer_id: &str) -> Option<&CustomerFeatureVector> {
        self.index.get(customer_id).map(|&i| &self.rows[i])
    }

    pub fn contains(&self, customer_id: &str) -> bool {
        self.index.contains_key(customer_id)
    }

    pub fn column_names(&self, columns: FeatureColumns) -> Vec<String> {
        let mut names = vec!["Age".to_string(), "TotalSpending".to_string()];
        if columns == FeatureColumns::Full {
            names.push("AvgTransactionValue".to_string());
            names.push("PurchaseFrequency".to_string());
            names.extend(self.categories.iter().cloned());
        }
        names
    }

    /// Project the matrix to dense numeric rows.
    ///
    /// Null ages are handled per `policy`: excluded rows are listed in
    /// `DenseFeatures::excluded`, rejected rows fail with
    /// `SegmentError::MissingFeature`, imputed rows take the mean of the known
    /// ages.
    pub fn to_dense(
        &self,
        columns: FeatureColumns,
        policy: MissingAgePolicy,
    ) -> crate::Result<DenseFeatures> {
        let known: Vec<f64> = self
            .rows
            .iter()
            .filter_map(|r| r.age.map(f64::from))
            .collect();
        let mean_age = if known.is_empty() {
            None
        } else {
            Some(known.iter().sum::<f64>() / known.len() as f64)
        };

        let column_names = self.column_names(columns);
        let width = column_names.len();

        let mut customer_ids = Vec::with_capacity(self.rows.len());
        let mut excluded = Vec::new();
        let mut values = Vec::with_capacity(self.rows.len() * width);

        for row in &self.rows {
            let age = match (row.age, policy, mean_age) {
                (Some(age), _, _) => f64::from(age),
                (None, MissingAgePolicy::Exclude, _) => {
                    excluded.push(row.customer_id.clone());
                    continue;
                }
                (None, MissingAgePolicy::ImputeMean, Some(mean)) => mean,
                (None, _, _) => {
                    return Err(SegmentError::MissingFeature {
                        feature: "age",
                        customer_id: row.customer_id.clone(),
                    })
                }
            };

            values.push(age);
            values.push(row.total_spending);
            if columns == FeatureColumns::Full {
                values.push(row.avg_transaction_value.unwrap_or(0.0));
                values.push(row.purchase_frequency as f64);
                values.extend(row.category_counts.iter().map(|&c| f64::from(c)));
            }
            customer_ids.push(row.customer_id.clone());
        }

        if !excluded.is_empty() {
            log::warn!(
                "Excluded {} customers with a null age from the feature matrix",
                excluded.len()
            );
        }

        let values = Array2::from_shape_vec((customer_ids.len(), width), values)?;

        Ok(DenseFeatures {
            customer_ids,
            column_names,
            values,
            excluded,
        })
    }
}
