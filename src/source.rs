//! Read-only providers of customers and their calls.

use crate::model::{Call, Customer, CustomerNo, Dataset};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Failures surfaced by a [`RecordSource`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// The backing store could not be reached or read.
    #[error("record source unavailable: {0}")]
    Unavailable(String),

    /// A child lookup returned a call owned by a different customer.
    #[error("call {call_no} belongs to customer {actual}, not {expected}")]
    ForeignCall {
        call_no: i64,
        expected: CustomerNo,
        actual: CustomerNo,
    },
}

/// Supplies customers and, per customer, their calls.
///
/// Both enumerations must be returned in a stable source order; the report
/// engine reproduces that order verbatim.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// All customers, in source order.
    async fn customers(&self) -> Result<Vec<Customer>, SourceError>;

    /// Calls for one customer, in source order. Unknown customers yield an
    /// empty list.
    async fn calls_for_customer(&self, customer_no: CustomerNo) -> Result<Vec<Call>, SourceError>;

    /// Cheap availability probe used by readiness checks.
    async fn ping(&self) -> Result<(), SourceError> {
        Ok(())
    }

    /// Short label for logs and health output.
    fn name(&self) -> &'static str;
}

/// A record source backed by a validated in-memory [`Dataset`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordSource {
    customers: Vec<Customer>,
    calls_by_customer: HashMap<CustomerNo, Vec<Call>>,
}

impl InMemoryRecordSource {
    /// Indexes a dataset by customer. The dataset must already be valid.
    pub fn new(dataset: Dataset) -> Self {
        let Dataset { customers, calls } = dataset;
        let mut calls_by_customer: HashMap<CustomerNo, Vec<Call>> = HashMap::new();
        for call in calls {
            calls_by_customer
                .entry(call.customer_no)
                .or_default()
                .push(call);
        }
        Self {
            customers,
            calls_by_customer,
        }
    }

    /// Loads and validates a YAML or JSON snapshot file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let dataset = load_dataset(path)?;
        dataset
            .validate()
            .with_context(|| format!("invalid record snapshot {:?}", path))?;
        Ok(Self::new(dataset))
    }

    pub fn customer_count(&self) -> usize {
        self.customers.len()
    }

    pub fn call_count(&self) -> usize {
        self.calls_by_customer.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl RecordSource for InMemoryRecordSource {
    async fn customers(&self) -> Result<Vec<Customer>, SourceError> {
        Ok(self.customers.clone())
    }

    async fn calls_for_customer(&self, customer_no: CustomerNo) -> Result<Vec<Call>, SourceError> {
        Ok(self
            .calls_by_customer
            .get(&customer_no)
            .cloned()
            .unwrap_or_default())
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}

/// Reads a snapshot file, choosing the parser from the file extension.
pub fn load_dataset(path: &Path) -> Result<Dataset> {
    if !path.exists() {
        anyhow::bail!("record snapshot {:?} does not exist", path);
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read record snapshot {:?}", path))?;
    let ext = path
        .extension()
        .and_then(|os| os.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let dataset = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse YAML snapshot {:?}", path))?,
        "json" => serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse JSON snapshot {:?}", path))?,
        other => anyhow::bail!("unsupported snapshot extension: {other}"),
    };
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CallNo;
    use chrono::{NaiveDate, NaiveTime};
    use std::io::Write;

    fn call(call_no: i64, customer_no: i64) -> Call {
        Call {
            call_no: CallNo::new(call_no),
            customer_no: CustomerNo::new(customer_no),
            date_of_call: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            time_of_call: NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
            subject: format!("call {call_no}"),
        }
    }

    #[tokio::test]
    async fn keeps_source_order_per_customer() {
        let source = InMemoryRecordSource::new(Dataset::new(
            vec![
                Customer::new(CustomerNo::new(2), "Bob"),
                Customer::new(CustomerNo::new(1), "Alice"),
            ],
            vec![call(30, 1), call(5, 2), call(20, 1)],
        ));

        let customers = source.customers().await.unwrap();
        let order: Vec<i64> = customers.iter().map(|c| c.customer_no.get()).collect();
        assert_eq!(order, vec![2, 1]);

        let calls = source.calls_for_customer(CustomerNo::new(1)).await.unwrap();
        let call_order: Vec<i64> = calls.iter().map(|c| c.call_no.get()).collect();
        assert_eq!(call_order, vec![30, 20]);
        assert_eq!(source.call_count(), 3);
    }

    #[tokio::test]
    async fn unknown_customer_has_no_calls() {
        let source = InMemoryRecordSource::default();
        let calls = source.calls_for_customer(CustomerNo::new(42)).await.unwrap();
        assert!(calls.is_empty());
    }

    #[test]
    fn from_path_rejects_invalid_snapshot() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"customers":[],"calls":[{{"call_no":1,"customer_no":9,"date_of_call":"2024-01-01","time_of_call":"10:00:00","subject":"x"}}]}}"#
        )
        .unwrap();

        let err = InMemoryRecordSource::from_path(file.path()).unwrap_err();
        assert!(err.to_string().contains("invalid record snapshot"));
    }

    #[test]
    fn load_dataset_rejects_unknown_extension() {
        let file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        let err = load_dataset(file.path()).unwrap_err();
        assert!(err.to_string().contains("unsupported snapshot extension"));
    }
}
