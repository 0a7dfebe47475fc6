use crate::model::{Call, Customer, CustomerNo};
use crate::source::SourceError;
use serde::Serialize;

/// One customer and its calls: the unit of layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportGroup {
    pub customer: Customer,
    pub calls: Vec<Call>,
}

impl ReportGroup {
    /// Rows this group occupies once laid out: customer row, blank, call
    /// header, one row per call, trailing blank.
    pub fn row_span(&self) -> u32 {
        rows_for_calls(self.calls.len())
    }
}

/// Saturates at `u32::MAX`; such a span is rejected later by the cursor.
pub(crate) fn rows_for_calls(calls: usize) -> u32 {
    u32::try_from(calls).map_or(u32::MAX, |k| k.saturating_add(4))
}

/// Pairs each customer with its calls, preserving order on both axes.
///
/// `child_lookup` is called once per customer. The first lookup failure
/// aborts aggregation and is returned unchanged.
pub fn aggregate<F>(
    customers: Vec<Customer>,
    mut child_lookup: F,
) -> Result<Vec<ReportGroup>, SourceError>
where
    F: FnMut(CustomerNo) -> Result<Vec<Call>, SourceError>,
{
    let mut groups = Vec::with_capacity(customers.len());
    for customer in customers {
        let calls = child_lookup(customer.customer_no)?;
        if let Some(stray) = calls
            .iter()
            .find(|call| call.customer_no != customer.customer_no)
        {
            return Err(SourceError::ForeignCall {
                call_no: stray.call_no.get(),
                expected: customer.customer_no,
                actual: stray.customer_no,
            });
        }
        groups.push(ReportGroup { customer, calls });
    }
    Ok(groups)
}
