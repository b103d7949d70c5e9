//! Loading of the customer, product and transaction relations and their join

use crate::config::LoadConfig;
use crate::error::SegmentError;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use std::collections::HashMap;
use std::path::Path;

/// A customer row with its derived age
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerRecord {
    pub customer_id: String,
    pub signup_date: Option<NaiveDate>,
    pub region: Option<String>,
    /// Whole years between signup and the reference date; `None` if the
    /// signup date is missing or unparsable
    pub age: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductRecord {
    pub product_id: String,
    pub name: String,
    pub category: String,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub transaction_id: String,
    pub customer_id: String,
    pub product_id: String,
    pub quantity: u32,
    pub total_value: f64,
    pub timestamp: Option<NaiveDateTime>,
}

/// A retained transaction carrying its customer's and product's attributes
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRecord {
    pub transaction_id: String,
    pub customer_id: String,
    pub product_id: String,
    pub quantity: u32,
    pub total_value: f64,
    pub timestamp: Option<NaiveDateTime>,
    pub age: Option<i32>,
    pub region: Option<String>,
    pub category: String,
}

/// The three source relations after typed conversion
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub customers: Vec<CustomerRecord>,
    pub products: Vec<ProductRecord>,
    pub transactions: Vec<TransactionRecord>,
}

impl Dataset {
    /// Read the three CSV files and convert them to typed records
    pub fn load(
        customers_path: impl AsRef<Path>,
        products_path: impl AsRef<Path>,
        transactions_path: impl AsRef<Path>,
        config: &LoadConfig,
    ) -> crate::Result<Self> {
        let customers = read_csv(customers_path)?;
        let products = read_csv(products_path)?;
        let transactions = read_csv(transactions_path)?;

        Self::from_frames(&customers, &products, &transactions, config)
    }

    pub fn from_frames(
        customers: &DataFrame,
        products: &DataFrame,
        transactions: &DataFrame,
        config: &LoadConfig,
    ) -> crate::Result<Self> {
        let dataset = Self {
            customers: customers_from_frame(customers, config.reference_date)?,
            products: products_from_frame(products)?,
            transactions: transactions_from_frame(transactions)?,
        };

        log::info!(
            "Loaded {} customers, {} products, {} transactions",
            dataset.customers.len(),
            dataset.products.len(),
            dataset.transactions.len()
        );

        Ok(dataset)
    }

    /// Inner-join transactions with their customer and product
    pub fn join(&self) -> crate::Result<Vec<JoinedRecord>> {
        join_records(&self.customers, &self.products, &self.transactions)
    }
}

/// Read a CSV file with a header row into a `DataFrame`
pub fn read_csv(path: impl AsRef<Path>) -> crate::Result<DataFrame> {
    let path = path.as_ref();
    log::debug!("Reading {}", path.display());

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(10_000))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    Ok(df)
}

/// Convert a customers frame. Requires `CustomerID` and `SignupDate`;
/// `Region` is optional.
pub fn customers_from_frame(
    df: &DataFrame,
    reference_date: NaiveDate,
) -> crate::Result<Vec<CustomerRecord>> {
    let ids = string_values(required_column(df, "Customers", "CustomerID")?)?;
    let signups = string_values(required_column(df, "Customers", "SignupDate")?)?;
    let regions = match df.column("Region") {
        Ok(series) => string_values(series)?,
        Err(_) => vec![None; df.height()],
    };

    let mut customers = Vec::with_capacity(df.height());
    let mut unparsable = 0usize;

    for ((id, signup), region) in ids.into_iter().zip(signups).zip(regions) {
        let Some(customer_id) = id else {
            continue;
        };

        let signup_date = signup.as_deref().and_then(parse_date);
        if signup.is_some() && signup_date.is_none() {
            unparsable += 1;
        }

        customers.push(CustomerRecord {
            customer_id,
            age: signup_date.map(|date| compute_age(date, reference_date)),
            signup_date,
            region,
        });
    }

    if unparsable > 0 {
        log::warn!("{unparsable} customers have an unparsable SignupDate; their age is null");
    }

    Ok(customers)
}

/// Convert a products frame. Requires `ProductID`, `ProductName`,
/// `Category` and `Price`.
pub fn products_from_frame(df: &DataFrame) -> crate::Result<Vec<ProductRecord>> {
    let ids = string_values(required_column(df, "Products", "ProductID")?)?;
    let names = string_values(required_column(df, "Products", "ProductName")?)?;
    let categories = string_values(required_column(df, "Products", "Category")?)?;
    let prices = f64_values(required_column(df, "Products", "Price")?)?;

    let mut products = Vec::with_capacity(df.height());

    for (((id, name), category), price) in ids.into_iter().zip(names).zip(categories).zip(prices) {
        let Some(product_id) = id else {
            continue;
        };

        let category = category.ok_or_else(|| {
            SegmentError::DataIntegrity(format!("product {product_id} has no Category"))
        })?;
        let price = non_negative(price, "Price", &product_id)?;

        products.push(ProductRecord {
            product_id,
            name: name.unwrap_or_default(),
            category,
            price,
        });
    }

    Ok(products)
}

/// Convert a transactions frame. Requires `TransactionID`, `CustomerID`,
/// `ProductID`, `Quantity`, `TotalValue` and `TransactionDate`.
pub fn transactions_from_frame(df: &DataFrame) -> crate::Result<Vec<TransactionRecord>> {
    let ids = string_values(required_column(df, "Transactions", "TransactionID")?)?;
    let customer_ids = string_values(required_column(df, "Transactions", "CustomerID")?)?;
    let product_ids = string_values(required_column(df, "Transactions", "ProductID")?)?;
    let quantities = f64_values(required_column(df, "Transactions", "Quantity")?)?;
    let totals = f64_values(required_column(df, "Transactions", "TotalValue")?)?;
    let dates = string_values(required_column(df, "Transactions", "TransactionDate")?)?;

    let mut transactions = Vec::with_capacity(df.height());

    let rows = ids
        .into_iter()
        .zip(customer_ids)
        .zip(product_ids)
        .zip(quantities)
        .zip(totals)
        .zip(dates);

    for (((((id, customer_id), product_id), quantity), total), date) in rows {
        let Some(transaction_id) = id else {
            continue;
        };

        let quantity = non_negative(quantity, "Quantity", &transaction_id)?;
        if quantity.fract() != 0.0 || quantity > f64::from(u32::MAX) {
            return Err(SegmentError::DataIntegrity(format!(
                "transaction {transaction_id} has a non-integer Quantity {quantity}"
            )));
        }
        let total_value = non_negative(total, "TotalValue", &transaction_id)?;

        // A null foreign key can never match, so the row only survives
        // conversion to be dropped by the inner join.
        transactions.push(TransactionRecord {
            customer_id: customer_id.unwrap_or_default(),
            product_id: product_id.unwrap_or_default(),
            quantity: quantity as u32,
            total_value,
            timestamp: date.as_deref().and_then(parse_timestamp),
            transaction_id,
        });
    }

    Ok(transactions)
}

/// Inner join: only transactions whose customer and product both exist are
/// retained, in their original order.
pub fn join_records(
    customers: &[CustomerRecord],
    products: &[ProductRecord],
    transactions: &[TransactionRecord],
) -> crate::Result<Vec<JoinedRecord>> {
    let mut customer_index: HashMap<&str, &CustomerRecord> =
        HashMap::with_capacity(customers.len());
    for customer in customers {
        if customer_index
            .insert(customer.customer_id.as_str(), customer)
            .is_some()
        {
            return Err(SegmentError::DataIntegrity(format!(
                "duplicate CustomerID {}",
                customer.customer_id
            )));
        }
    }

    let mut product_index: HashMap<&str, &ProductRecord> = HashMap::with_capacity(products.len());
    for product in products {
        if product_index
            .insert(product.product_id.as_str(), product)
            .is_some()
        {
            return Err(SegmentError::DataIntegrity(format!(
                "duplicate ProductID {}",
                product.product_id
            )));
        }
    }

    let mut joined = Vec::with_capacity(transactions.len());
    let mut missing_customer = 0usize;
    let mut missing_product = 0usize;

    for tx in transactions {
        let Some(customer) = customer_index.get(tx.customer_id.as_str()) else {
            missing_customer += 1;
            continue;
        };
        let Some(product) = product_index.get(tx.product_id.as_str()) else {
            missing_product += 1;
            continue;
        };

        joined.push(JoinedRecord {
            transaction_id: tx.transaction_id.clone(),
            customer_id: tx.customer_id.clone(),
            product_id: tx.product_id.clone(),
            quantity: tx.quantity,
            total_value: tx.total_value,
            timestamp: tx.timestamp,
            age: customer.age,
            region: customer.region.clone(),
            category: product.category.clone(),
        });
    }

    if missing_customer + missing_product > 0 {
        log::warn!(
            "Dropped {} transactions in join ({} unknown customer, {} unknown product)",
            missing_customer + missing_product,
            missing_customer,
            missing_product
        );
    }
    log::info!("Joined {} of {} transactions", joined.len(), transactions.len());

    Ok(joined)
}

/// Exact elapsed whole years from `signup` to `reference`
pub fn compute_age(signup: NaiveDate, reference: NaiveDate) -> i32 {
    let mut age = reference.year() - signup.year();
    if (reference.month(), reference.day()) < (signup.month(), signup.day()) {
        age -= 1;
    }
    age
}

/// Parse a calendar date, accepting a trailing time component
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp(value).map(|ts| ts.date()))
}

pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(ts) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(ts);
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Some(ts);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.naive_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

fn required_column<'a>(df: &'a DataFrame, relation: &str, name: &str) -> crate::Result<&'a Series> {
    df.column(name).map_err(|_| {
        SegmentError::DataIntegrity(format!(
            "{relation} relation is missing required column '{name}'"
        ))
    })
}

/// Column values as trimmed strings; empty strings become `None`
fn string_values(series: &Series) -> crate::Result<Vec<Option<String>>> {
    let cast = series.cast(&DataType::String)?;
    let values = cast
        .str()?
        .into_iter()
        .map(|value| {
            value
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        })
        .collect();
    Ok(values)
}

fn f64_values(series: &Series) -> crate::Result<Vec<Option<f64>>> {
    let cast = series.cast(&DataType::Float64)?;
    let values = cast.f64()?.into_iter().collect();
    Ok(values)
}

fn non_negative(value: Option<f64>, column: &str, row_id: &str) -> crate::Result<f64> {
    match value {
        Some(v) if v.is_finite() && v >= 0.0 => Ok(v),
        Some(v) => Err(SegmentError::DataIntegrity(format!(
            "{row_id} has an invalid {column} {v}"
        ))),
        None => Err(SegmentError::DataIntegrity(format!(
            "{row_id} has no {column}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn customers_df() -> DataFrame {
        df!(
            "CustomerID" => &["C1", "C2", "C3"],
            "SignupDate" => &[Some("2020-01-10"), Some("not a date"), None],
            "Region" => &["Europe", "Asia", "Europe"]
        )
        .unwrap()
    }

    fn products_df() -> DataFrame {
        df!(
            "ProductID" => &["P1", "P2"],
            "ProductName" => &["Desk Lamp", "Novel"],
            "Category" => &["Home Decor", "Books"],
            "Price" => &[10.0, 25.5]
        )
        .unwrap()
    }

    fn transactions_df() -> DataFrame {
        df!(
            "TransactionID" => &["T1", "T2", "T3", "T4"],
            "CustomerID" => &["C1", "C1", "C9", "C2"],
            "ProductID" => &["P1", "P1", "P1", "P7"],
            "Quantity" => &[2i64, 1, 3, 1],
            "TotalValue" => &[20.0, 10.0, 30.0, 5.0],
            "TransactionDate" => &[
                "2024-01-01 10:00:00",
                "2024-01-02 11:30:00",
                "2024-01-03 09:15:00",
                "2024-01-04 08:00:00"
            ]
        )
        .unwrap()
    }

    #[test]
    fn test_compute_age_before_anniversary() {
        assert_eq!(compute_age(date(2020, 1, 10), date(2024, 1, 5)), 3);
        assert_eq!(compute_age(date(2020, 1, 10), date(2024, 1, 10)), 4);
        assert_eq!(compute_age(date(2020, 12, 31), date(2024, 6, 1)), 3);
    }

    #[test]
    fn test_parse_formats() {
        assert_eq!(parse_date("2022-07-10"), Some(date(2022, 7, 10)));
        assert_eq!(parse_date("2022-07-10 12:38:23"), Some(date(2022, 7, 10)));
        assert_eq!(parse_date("2022-07-10T12:38:23"), Some(date(2022, 7, 10)));
        assert!(parse_timestamp("2024-08-25T12:38:23Z").is_some());
        assert!(parse_date("10/07/2022").is_none());
    }

    #[test]
    fn test_customers_age_null_when_unparsable() {
        let customers = customers_from_frame(&customers_df(), date(2024, 1, 5)).unwrap();

        assert_eq!(customers.len(), 3);
        assert_eq!(customers[0].age, Some(3));
        assert_eq!(customers[1].age, None);
        assert_eq!(customers[2].age, None);
        assert_eq!(customers[0].region.as_deref(), Some("Europe"));
    }

    #[test]
    fn test_region_is_optional() {
        let df = df!(
            "CustomerID" => &["C1"],
            "SignupDate" => &["2020-01-10"]
        )
        .unwrap();

        let customers = customers_from_frame(&df, date(2024, 1, 5)).unwrap();
        assert_eq!(customers[0].region, None);
    }

    #[test]
    fn test_numeric_ids_are_read_as_strings() {
        let df = df!(
            "CustomerID" => &[101i64, 102],
            "SignupDate" => &["2020-01-10", "2021-03-01"]
        )
        .unwrap();

        let customers = customers_from_frame(&df, date(2024, 1, 5)).unwrap();
        assert_eq!(customers[0].customer_id, "101");
    }

    #[test]
    fn test_missing_key_column() {
        let df = df!(
            "TransactionID" => &["T1"],
            "ProductID" => &["P1"],
            "Quantity" => &[1i64],
            "TotalValue" => &[10.0],
            "TransactionDate" => &["2024-01-01"]
        )
        .unwrap();

        let result = transactions_from_frame(&df);
        match result {
            Err(SegmentError::DataIntegrity(msg)) => assert!(msg.contains("CustomerID")),
            other => panic!("expected DataIntegrity, got {other:?}"),
        }
    }

    #[test]
    fn test_negative_total_value_rejected() {
        let df = df!(
            "TransactionID" => &["T1"],
            "CustomerID" => &["C1"],
            "ProductID" => &["P1"],
            "Quantity" => &[1i64],
            "TotalValue" => &[-10.0],
            "TransactionDate" => &["2024-01-01"]
        )
        .unwrap();

        assert!(matches!(
            transactions_from_frame(&df),
            Err(SegmentError::DataIntegrity(_))
        ));
    }

    #[test]
    fn test_inner_join_drops_unmatched() {
        let dataset = Dataset::from_frames(
            &customers_df(),
            &products_df(),
            &transactions_df(),
            &LoadConfig::default().with_reference_date(date(2024, 1, 5)),
        )
        .unwrap();

        let joined = dataset.join().unwrap();

        // T3 references an unknown customer, T4 an unknown product
        assert_eq!(joined.len(), 2);
        assert!(joined.iter().all(|r| r.customer_id == "C1"));
        assert_eq!(joined[0].category, "Home Decor");
        assert_eq!(joined[0].age, Some(3));
        assert_eq!(joined[1].transaction_id, "T2");
    }

    #[test]
    fn test_duplicate_customer_id() {
        let customers = vec![
            CustomerRecord {
                customer_id: "C1".to_string(),
                signup_date: None,
                region: None,
                age: None,
            };
            2
        ];

        let result = join_records(&customers, &[], &[]);
        assert!(matches!(result, Err(SegmentError::DataIntegrity(_))));
    }

    #[test]
    fn test_load_from_csv_files() {
        let mut customers = NamedTempFile::new().unwrap();
        writeln!(customers, "CustomerID,CustomerName,Region,SignupDate").unwrap();
        writeln!(customers, "C0001,Lawrence Carroll,South America,2022-07-10").unwrap();

        let mut products = NamedTempFile::new().unwrap();
        writeln!(products, "ProductID,ProductName,Category,Price").unwrap();
        writeln!(products, "P001,ActiveWear Biography,Books,169.3").unwrap();

        let mut transactions = NamedTempFile::new().unwrap();
        writeln!(
            transactions,
            "TransactionID,CustomerID,ProductID,TransactionDate,Quantity,TotalValue,Price"
        )
        .unwrap();
        writeln!(transactions, "T00001,C0001,P001,2024-08-25 12:38:23,1,169.3,169.3").unwrap();

        let dataset = Dataset::load(
            customers.path(),
            products.path(),
            transactions.path(),
            &LoadConfig::default().with_reference_date(date(2024, 7, 1)),
        )
        .unwrap();

        assert_eq!(dataset.customers[0].age, Some(1));
        assert_eq!(dataset.products[0].category, "Books");
        assert_eq!(dataset.transactions[0].quantity, 1);
        assert!(dataset.transactions[0].timestamp.is_some());
    }
}
