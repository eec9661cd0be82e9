//! Outcome classification
//!
//! Maps the HTTP status, the expected status set and any ASCOM error the
//! device reported to one of the four outcome categories. Classification is
//! pure: identical inputs always produce identical outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Category of a test observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Outcome {
    Ok,
    Information,
    Issue,
    Error,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Ok => write!(f, "OK"),
            Outcome::Information => write!(f, "INFO"),
            Outcome::Issue => write!(f, "ISSUE"),
            Outcome::Error => write!(f, "ERROR"),
        }
    }
}

/// ASCOM error numbers reported in the `ErrorNumber` field
pub mod ascom_error {
    pub const OK: i32 = 0;
    pub const NOT_IMPLEMENTED: i32 = 0x400;
    pub const INVALID_VALUE: i32 = 0x401;
    pub const VALUE_NOT_SET: i32 = 0x402;
    pub const NOT_CONNECTED: i32 = 0x407;
    pub const INVALID_WHILE_PARKED: i32 = 0x408;
    pub const INVALID_WHILE_SLAVED: i32 = 0x409;
    pub const INVALID_OPERATION: i32 = 0x40B;
    pub const ACTION_NOT_IMPLEMENTED: i32 = 0x40C;
    pub const OPERATION_CANCELLED: i32 = 0x40E;

    /// Human readable name of an ASCOM error number
    pub fn name(number: i32) -> &'static str {
        match number {
            OK => "OK",
            NOT_IMPLEMENTED => "NotImplemented",
            INVALID_VALUE => "InvalidValue",
            VALUE_NOT_SET => "ValueNotSet",
            NOT_CONNECTED => "NotConnected",
            INVALID_WHILE_PARKED => "InvalidWhileParked",
            INVALID_WHILE_SLAVED => "InvalidWhileSlaved",
            INVALID_OPERATION => "InvalidOperation",
            ACTION_NOT_IMPLEMENTED => "ActionNotImplemented",
            OPERATION_CANCELLED => "OperationCancelled",
            0x500..=0xFFF => "DriverSpecific",
            _ => "Unknown",
        }
    }
}

/// The set of HTTP status codes a transaction may return
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExpectedStatus(Vec<u16>);

impl ExpectedStatus {
    /// No status check: any status is accepted and reported as information
    pub fn any() -> Self {
        Self(Vec::new())
    }

    pub fn only(status: u16) -> Self {
        Self(vec![status])
    }

    pub fn one_of(statuses: &[u16]) -> Self {
        let mut codes = statuses.to_vec();
        codes.sort_unstable();
        codes.dedup();
        Self(codes)
    }

    pub fn is_any(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, status: u16) -> bool {
        self.0.contains(&status)
    }

    /// Exactly one acceptable status, and it is `status`
    pub fn is_only(&self, status: u16) -> bool {
        self.0 == [status]
    }

    pub fn codes(&self) -> &[u16] {
        &self.0
    }
}

impl fmt::Display for ExpectedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("any");
        }
        let codes: Vec<String> = self.0.iter().map(u16::to_string).collect();
        f.write_str(&codes.join(" or "))
    }
}

/// Everything the classifier needs about one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifyInput<'a> {
    pub expected: &'a ExpectedStatus,
    pub actual: u16,
    pub error_number: i32,
    pub error_message: &'a str,
    /// An InvalidValue error inside HTTP 200 counts as a correct rejection
    pub accept_invalid_value: bool,
    pub badly_cased_transaction_id: bool,
    pub negative_id_test: bool,
}

/// Session-wide classification policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifyPolicy {
    pub strict: bool,
    pub suppress_not_implemented: bool,
}

/// A classified observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub outcome: Outcome,
    pub message: String,
}

impl Classification {
    fn new(outcome: Outcome, message: impl Into<String>) -> Self {
        Self {
            outcome,
            message: message.into(),
        }
    }
}

/// Classify one transaction
pub fn classify(input: &ClassifyInput<'_>, policy: ClassifyPolicy) -> Classification {
    let error_detail = || {
        format!(
            "{} ({:#X}) {}",
            ascom_error::name(input.error_number),
            input.error_number,
            input.error_message
        )
        .trim_end()
        .to_string()
    };

    if input.expected.is_any() {
        return Classification::new(
            Outcome::Information,
            format!("Received HTTP status {}", input.actual),
        );
    }

    if input.expected.contains(input.actual) {
        if input.error_number == ascom_error::OK {
            let mut message = format!("Received expected HTTP status {}", input.actual);
            if input.negative_id_test && input.actual == 200 {
                message.push_str(" (negative value accepted)");
            }
            if input.badly_cased_transaction_id {
                message.push_str(" (mis-cased ClientTransactionID ignored)");
            }
            return Classification::new(Outcome::Ok, message);
        }
        if input.error_number == ascom_error::NOT_IMPLEMENTED && policy.suppress_not_implemented
        {
            return Classification::new(
                Outcome::Ok,
                format!(
                    "Received expected HTTP status {}, member is not implemented",
                    input.actual
                ),
            );
        }
        return Classification::new(
            Outcome::Information,
            format!(
                "Received expected HTTP status {} with device error {}",
                input.actual,
                error_detail()
            ),
        );
    }

    if input.actual == 200
        && input.accept_invalid_value
        && input.error_number == ascom_error::INVALID_VALUE
    {
        return Classification::new(
            Outcome::Ok,
            format!(
                "Device rejected the value with an InvalidValue error instead of HTTP {}",
                input.expected
            ),
        );
    }

    if !policy.strict
        && input.error_number == ascom_error::NOT_IMPLEMENTED
        && input.expected.is_only(400)
    {
        return Classification::new(
            Outcome::Ok,
            "Member is not implemented, HTTP 400 check not applicable",
        );
    }

    let mut message = format!(
        "Expected HTTP status {} but received {}",
        input.expected, input.actual
    );
    if input.error_number != ascom_error::OK {
        message.push_str(&format!(" with device error {}", error_detail()));
    }
    Classification::new(Outcome::Issue, message)
}
