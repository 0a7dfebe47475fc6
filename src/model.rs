//! Customer and call records as supplied by the record source.
//!
//! Identifiers use the NewType pattern so a call number can never be passed
//! where a customer number is expected.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Maximum length of a customer's name.
pub const MAX_NAME_LEN: usize = 100;
/// Maximum length of a customer's surname.
pub const MAX_SURNAME_LEN: usize = 100;
/// Maximum length of a customer's address line.
pub const MAX_ADDRESS_LEN: usize = 25;
/// Maximum length of a call subject.
pub const MAX_SUBJECT_LEN: usize = 500;

/// Primary key of a customer in the source system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerNo(i64);

impl CustomerNo {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for CustomerNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Primary key of a call in the source system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallNo(i64);

impl CallNo {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for CallNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A customer record. Only `customer_no` and `name` are rendered in reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_no: CustomerNo,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
}

impl Customer {
    /// Builds a customer carrying only the fields the report needs.
    pub fn new(customer_no: CustomerNo, name: impl Into<String>) -> Self {
        Self {
            customer_no,
            name: name.into(),
            surname: None,
            address: None,
            post_code: None,
            country: None,
            date_of_birth: None,
        }
    }
}

/// A call logged against exactly one customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub call_no: CallNo,
    pub customer_no: CustomerNo,
    pub date_of_call: NaiveDate,
    pub time_of_call: NaiveTime,
    pub subject: String,
}

/// Errors raised while validating a record snapshot.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DatasetError {
    #[error("customer {customer_no}: field '{field}' cannot be empty")]
    EmptyField {
        customer_no: CustomerNo,
        field: &'static str,
    },

    #[error("{owner}: field '{field}' is {actual} characters, maximum is {max}")]
    TooLong {
        owner: String,
        field: &'static str,
        max: usize,
        actual: usize,
    },

    #[error("customer number {0} appears more than once")]
    DuplicateCustomer(CustomerNo),

    #[error("call number {0} appears more than once")]
    DuplicateCall(CallNo),

    #[error("call {call_no} references unknown customer {customer_no}")]
    UnknownCustomer {
        call_no: CallNo,
        customer_no: CustomerNo,
    },
}

/// A point-in-time snapshot of every customer and call.
///
/// Order within each list is significant: reports enumerate customers, and
/// each customer's calls, in the order they appear here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub customers: Vec<Customer>,
    #[serde(default)]
    pub calls: Vec<Call>,
}

impl Dataset {
    pub fn new(customers: Vec<Customer>, calls: Vec<Call>) -> Self {
        Self { customers, calls }
    }

    /// Checks field bounds and referential integrity.
    pub fn validate(&self) -> Result<(), DatasetError> {
        let mut customer_nos = HashSet::with_capacity(self.customers.len());
        for customer in &self.customers {
            if customer.name.trim().is_empty() {
                return Err(DatasetError::EmptyField {
                    customer_no: customer.customer_no,
                    field: "name",
                });
            }
            let owner = || format!("customer {}", customer.customer_no);
            check_len(&customer.name, "name", MAX_NAME_LEN, owner)?;
            if let Some(surname) = customer.surname.as_deref() {
                check_len(surname, "surname", MAX_SURNAME_LEN, owner)?;
            }
            if let Some(address) = customer.address.as_deref() {
                check_len(address, "address", MAX_ADDRESS_LEN, owner)?;
            }
            if !customer_nos.insert(customer.customer_no) {
                return Err(DatasetError::DuplicateCustomer(customer.customer_no));
            }
        }

        let mut call_nos = HashSet::with_capacity(self.calls.len());
        for call in &self.calls {
            check_len(&call.subject, "subject", MAX_SUBJECT_LEN, || {
                format!("call {}", call.call_no)
            })?;
            if !customer_nos.contains(&call.customer_no) {
                return Err(DatasetError::UnknownCustomer {
                    call_no: call.call_no,
                    customer_no: call.customer_no,
                });
            }
            if !call_nos.insert(call.call_no) {
                return Err(DatasetError::DuplicateCall(call.call_no));
            }
        }

        Ok(())
    }
}

fn check_len(
    value: &str,
    field: &'static str,
    max: usize,
    owner: impl FnOnce() -> String,
) -> Result<(), DatasetError> {
    let actual = value.chars().count();
    if actual > max {
        return Err(DatasetError::TooLong {
            owner: owner(),
            field,
            max,
            actual,
        });
    }
    Ok(())
}
