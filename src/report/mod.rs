//! Customer call report: aggregation, layout, and workbook assembly.
//!
//! The pipeline is:
//!
//! 1. read customers and their calls from a [`RecordSource`]
//! 2. [`aggregate`](aggregate::aggregate) them into ordered groups
//! 3. lay each group out with a [`BlockWriter`](layout::BlockWriter) and a
//!    forward-only [`SheetCursor`](cursor::SheetCursor)
//! 4. serialize the resulting [`XlsxDocument`](xlsx::XlsxDocument)
//!
//! Generation is all-or-nothing: callers either receive a complete document
//! or an error, never partial bytes.

pub mod aggregate;
pub mod cursor;
pub mod layout;
pub mod xlsx;

use crate::model::{Call, CustomerNo};
use crate::source::{RecordSource, SourceError};
use aggregate::{ReportGroup, aggregate};
use layout::{LayoutViolation, write_groups};
use std::collections::HashMap;
use std::time::Instant;
use thiserror::Error;
use tracing::Instrument;
use xlsx::XlsxDocument;

/// File name offered to the client for the generated workbook.
pub const REPORT_FILE_NAME: &str = "CustomerCallsReport.xlsx";

/// Media type of the generated workbook.
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Reasons report generation can fail.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    SourceUnavailable(#[from] SourceError),

    #[error("failed to serialize workbook: {0}")]
    Serialization(String),

    #[error("report layout defect: {0}")]
    Layout(#[from] LayoutViolation),
}

impl ReportError {
    /// Stable category used in logs, metrics, and error responses.
    pub fn category(&self) -> &'static str {
        match self {
            ReportError::SourceUnavailable(_) => "source_unavailable",
            ReportError::Serialization(_) => "serialization_failure",
            ReportError::Layout(_) => "layout_violation",
        }
    }
}

/// A finished report ready to hand to the client.
#[derive(Debug, Clone)]
pub struct ReportDocument {
    pub bytes: Vec<u8>,
    pub file_name: &'static str,
    pub content_type: &'static str,
    pub summary: ReportSummary,
}

/// Counts describing a generated report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReportSummary {
    pub customers: usize,
    pub calls: usize,
    pub rows: u32,
    pub cells: usize,
}

/// Builds the customer call report from `source`.
///
/// Every customer and call is read before layout starts, so the document
/// reflects one consistent read of the source.
pub async fn generate_report(source: &dyn RecordSource) -> Result<ReportDocument, ReportError> {
    let span = tracing::info_span!("generate_report", source = source.name());
    async move {
        let start = Instant::now();
        let groups = load_groups(source).await?;
        let document = render_workbook(&groups)?;
        tracing::info!(
            customers = document.summary.customers,
            calls = document.summary.calls,
            rows = document.summary.rows,
            bytes = document.bytes.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "report generated"
        );
        Ok(document)
    }
    .instrument(span)
    .await
}

/// Reads customers and calls from `source` and groups them.
pub async fn load_groups(source: &dyn RecordSource) -> Result<Vec<ReportGroup>, ReportError> {
    let customers = source.customers().await?;
    let mut calls: HashMap<CustomerNo, Vec<Call>> = HashMap::with_capacity(customers.len());
    for customer in &customers {
        if calls.contains_key(&customer.customer_no) {
            continue;
        }
        let customer_calls = source.calls_for_customer(customer.customer_no).await?;
        calls.insert(customer.customer_no, customer_calls);
    }
    tracing::debug!(customers = customers.len(), "record source read complete");

    let groups = aggregate(customers, |customer_no| {
        Ok(calls.get(&customer_no).cloned().unwrap_or_default())
    })?;
    Ok(groups)
}

/// Lays out `groups` into a fresh workbook and serializes it.
pub fn render_workbook(groups: &[ReportGroup]) -> Result<ReportDocument, ReportError> {
    let mut document = XlsxDocument::new()?;
    let cursor = write_groups(groups, &mut document).inspect_err(|violation| {
        tracing::error!(%violation, "report layout defect, aborting generation");
    })?;
    let cells = document.cell_count();
    let bytes = document.serialize()?;

    Ok(ReportDocument {
        bytes,
        file_name: REPORT_FILE_NAME,
        content_type: XLSX_CONTENT_TYPE,
        summary: ReportSummary {
            customers: groups.len(),
            calls: groups.iter().map(|group| group.calls.len()).sum(),
            rows: cursor.current() - 1,
            cells,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CallNo, Customer, Dataset};
    use crate::source::InMemoryRecordSource;
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveTime};

    struct DownSource;

    #[async_trait]
    impl RecordSource for DownSource {
        async fn customers(&self) -> Result<Vec<Customer>, SourceError> {
            Err(SourceError::Unavailable("database offline".to_string()))
        }

        async fn calls_for_customer(&self, _: CustomerNo) -> Result<Vec<Call>, SourceError> {
            Ok(Vec::new())
        }

        fn name(&self) -> &'static str {
            "down"
        }
    }

    #[tokio::test]
    async fn source_failure_yields_no_document() {
        let err = generate_report(&DownSource).await.unwrap_err();
        assert_eq!(err.category(), "source_unavailable");
        assert!(matches!(
            err,
            ReportError::SourceUnavailable(SourceError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn summary_counts_customers_calls_and_rows() {
        let source = InMemoryRecordSource::new(Dataset::new(
            vec![
                Customer::new(CustomerNo::new(1), "Alice"),
                Customer::new(CustomerNo::new(2), "Bob"),
            ],
            vec![Call {
                call_no: CallNo::new(10),
                customer_no: CustomerNo::new(1),
                date_of_call: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
                time_of_call: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                subject: "Billing".to_string(),
            }],
        ));

        let document = generate_report(&source).await.unwrap();
        assert_eq!(document.file_name, "CustomerCallsReport.xlsx");
        assert_eq!(document.content_type, XLSX_CONTENT_TYPE);
        assert_eq!(
            document.summary,
            ReportSummary {
                customers: 2,
                calls: 1,
                rows: 9,
                cells: 17,
            }
        );
    }

    #[test]
    fn empty_report_is_still_a_workbook() {
        let document = render_workbook(&[]).unwrap();
        assert!(document.bytes.starts_with(b"PK"));
        assert_eq!(document.summary.rows, 0);
    }
}
