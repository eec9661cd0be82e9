//! Response validation
//!
//! Checks a successful (HTTP 200) response body against the Alpaca response
//! contract: envelope fields present with exact casing, the client's
//! transaction number round-tripped, a server transaction number issued,
//! a `Value` field for GET requests, and the extra structure some members
//! require. Binary ImageBytes frames get the equivalent checks from their
//! header.

use base64::Engine as _;
use serde_json::{Map, Value};

use crate::casing::{lookup, Field, Lookup};
use crate::classifier::Outcome;
use crate::imagebytes::{self, METADATA_VERSION};
use crate::io::HttpMethod;

/// Extra structural checks required by particular members
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdditionalCheck {
    #[default]
    None,
    /// Every `Value` element carries `Minimum` and `Maximum`
    AxisRates,
    /// Every `Value` element carries `Name` and `Value`
    DeviceState,
    /// The root object carries `Type` and `Rank`
    ImageArray,
}

/// The ClientTransactionID the response must echo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedTransactionId {
    /// The parameter was spelled correctly; unparsable values are expected back as 0
    Exact(u32),
    /// The parameter name was mis-cased so the server should have ignored it
    Miscased { sent: u32 },
    /// No ClientTransactionID parameter was sent
    NotSent,
}

impl ExpectedTransactionId {
    /// Expected value for a correctly or incorrectly cased parameter value
    pub fn from_sent(name_correct: bool, value: &str) -> Self {
        let parsed = value.trim().parse::<u32>().unwrap_or(0);
        if name_correct {
            ExpectedTransactionId::Exact(parsed)
        } else {
            ExpectedTransactionId::Miscased { sent: parsed }
        }
    }
}

/// Inputs that steer validation of one response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationContext {
    pub method: HttpMethod,
    pub transaction_id: ExpectedTransactionId,
    pub check: AdditionalCheck,
    /// The response carried the Base64 hand-off header
    pub base64_handoff: bool,
    /// An unparsable body is tolerated because a malformed ID was sent on purpose
    pub tolerate_parse_failure: bool,
    pub strict: bool,
}

/// Envelope fields extracted from a response
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Envelope {
    pub client_transaction_id: u32,
    pub server_transaction_id: u32,
    pub error_number: i32,
    pub error_message: String,
}

/// Findings and extracted data for one response
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidationReport {
    pub findings: Vec<(Outcome, String)>,
    pub envelope: Envelope,
    /// The `Value` field, when present
    pub value: Option<Value>,
    /// The root JSON object, for Base64 hand-off metadata
    pub root: Option<Map<String, Value>>,
    pub parsed: bool,
}

impl ValidationReport {
    fn push(&mut self, outcome: Outcome, message: impl Into<String>) {
        self.findings.push((outcome, message.into()));
    }

    pub fn has_issues(&self) -> bool {
        self.findings.iter().any(|(o, _)| *o >= Outcome::Issue)
    }
}

/// Validate a JSON response body
pub fn validate_json(body: &str, ctx: &ValidationContext) -> ValidationReport {
    let mut report = ValidationReport::default();

    let root = match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            report.push(
                Outcome::Issue,
                format!("Response is not a JSON object: {}", truncate(&other.to_string())),
            );
            return report;
        }
        Err(e) => {
            let outcome = if ctx.tolerate_parse_failure && !ctx.strict {
                Outcome::Information
            } else {
                Outcome::Issue
            };
            report.push(
                outcome,
                format!("Unable to parse response as JSON: {} ({})", e, truncate(body)),
            );
            return report;
        }
    };
    report.parsed = true;

    check_envelope_casing(&root, &mut report);

    let client_id = read_u32(&root, Field::ClientTransactionId, &mut report);
    let server_id = read_u32(&root, Field::ServerTransactionId, &mut report);
    report.envelope.error_number = lookup(&root, Field::ErrorNumber)
        .value()
        .and_then(Value::as_i64)
        .and_then(|n| i32::try_from(n).ok())
        .unwrap_or(0);
    report.envelope.error_message = lookup(&root, Field::ErrorMessage)
        .value()
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    check_round_trip(client_id.unwrap_or(0), ctx, &mut report);
    check_server_transaction_id(server_id, &mut report);

    if ctx.method == HttpMethod::Get {
        if ctx.base64_handoff {
            for field in Field::BASE64_HANDOFF {
                require_field(&root, field, "Base64 hand-off response", &mut report);
            }
        } else {
            check_value_field(&root, ctx, &mut report);
        }
    }

    if report.envelope.error_number == 0 {
        match ctx.check {
            AdditionalCheck::None => {}
            AdditionalCheck::AxisRates => {
                check_elements(&report.value.clone(), &[Field::Minimum, Field::Maximum], "AxisRate", &mut report)
            }
            AdditionalCheck::DeviceState => {
                check_elements(&report.value.clone(), &[Field::Name, Field::Value], "DeviceState", &mut report)
            }
            AdditionalCheck::ImageArray => {
                for field in [Field::Type, Field::Rank] {
                    require_field(&root, field, "ImageArray response", &mut report);
                }
            }
        }
    }

    report.root = Some(root);
    report
}

/// Validate an ImageBytes response body
pub fn validate_image_bytes(bytes: &[u8], ctx: &ValidationContext) -> ValidationReport {
    let mut report = ValidationReport::default();

    let frame = match imagebytes::decode(bytes) {
        Ok(frame) => frame,
        Err(e) => {
            let outcome = if ctx.tolerate_parse_failure && !ctx.strict {
                Outcome::Information
            } else {
                Outcome::Issue
            };
            report.push(outcome, format!("Unable to decode ImageBytes response: {}", e));
            return report;
        }
    };
    report.parsed = true;

    if frame.header.metadata_version != METADATA_VERSION {
        report.push(
            Outcome::Issue,
            format!(
                "ImageBytes metadata version is {}, expected {}; decoded as version {}",
                frame.header.metadata_version, METADATA_VERSION, METADATA_VERSION
            ),
        );
    }

    report.envelope = Envelope {
        client_transaction_id: frame.header.client_transaction_id,
        server_transaction_id: frame.header.server_transaction_id,
        error_number: frame.header.error_number,
        error_message: frame.error_message.clone().unwrap_or_default(),
    };
    check_round_trip(frame.header.client_transaction_id, ctx, &mut report);
    check_server_transaction_id(Some(frame.header.server_transaction_id), &mut report);

    if frame.header.error_number == 0 && frame.header.rank != 2 && frame.header.rank != 3 {
        report.push(
            Outcome::Issue,
            format!("ImageBytes rank is {}, expected 2 or 3", frame.header.rank),
        );
    }
    report
}

/// Bytes per element for an ImageArrayElementTypes value
pub fn element_size(element_type: i64) -> Option<usize> {
    match element_type {
        1 | 8 => Some(2),
        2 | 4 | 9 => Some(4),
        3 | 5 | 7 => Some(8),
        6 => Some(1),
        _ => None,
    }
}

/// Check a Base64 image payload against the metadata of the hand-off response
pub fn validate_base64_image(payload: &str, metadata: &Map<String, Value>) -> Vec<(Outcome, String)> {
    let number = |field: Field| lookup(metadata, field).value().and_then(Value::as_i64);

    let decoded = match base64::engine::general_purpose::STANDARD.decode(payload.trim()) {
        Ok(bytes) => bytes,
        Err(e) => return vec![(Outcome::Issue, format!("Base64 image payload does not decode: {}", e))],
    };

    let Some(size) = number(Field::Type).and_then(element_size) else {
        return vec![(
            Outcome::Issue,
            format!("Base64 hand-off Type {:?} is not a known element type", number(Field::Type)),
        )];
    };
    let expected = match payload_size(&number, size) {
        Ok(expected) => expected,
        Err(message) => return vec![(Outcome::Issue, message)],
    };

    if decoded.len() == expected {
        vec![(
            Outcome::Ok,
            format!("Base64 image payload length {} matches the hand-off metadata", expected),
        )]
    } else {
        vec![(
            Outcome::Issue,
            format!(
                "Base64 image payload is {} bytes, hand-off metadata describes {} bytes",
                decoded.len(),
                expected
            ),
        )]
    }
}

/// Byte length described by the hand-off metadata
fn payload_size(number: &dyn Fn(Field) -> Option<i64>, element_size: usize) -> Result<usize, String> {
    let dimension = |field: Field| -> Result<usize, String> {
        let length = number(field)
            .ok_or_else(|| format!("Base64 hand-off {} is missing or not an integer", field))?;
        usize::try_from(length)
            .map_err(|_| format!("Base64 hand-off {} is negative: {}", field, length))
    };

    let rank = number(Field::Rank)
        .ok_or_else(|| format!("Base64 hand-off {} is missing or not an integer", Field::Rank))?;
    let mut dimensions = vec![Field::Dimension0Length, Field::Dimension1Length];
    match rank {
        2 => {}
        3 => dimensions.push(Field::Dimension2Length),
        other => return Err(format!("Base64 hand-off Rank is {}, expected 2 or 3", other)),
    }

    let mut total = element_size;
    for field in dimensions {
        total = total
            .checked_mul(dimension(field)?)
            .ok_or_else(|| "Base64 hand-off dimensions describe an image too large to address".to_string())?;
    }
    Ok(total)
}

fn check_envelope_casing(root: &Map<String, Value>, report: &mut ValidationReport) {
    for field in Field::ENVELOPE {
        match lookup(root, field) {
            Lookup::Exact(_) => {}
            Lookup::Miscased { actual, .. } => report.push(
                Outcome::Issue,
                format!("Response field {} is incorrectly cased, expected {}", actual, field),
            ),
            Lookup::Missing => {
                // Missing transaction IDs surface through the round-trip checks
                if matches!(field, Field::ErrorNumber | Field::ErrorMessage) {
                    report.push(
                        Outcome::Issue,
                        format!("Response does not contain the {} field", field),
                    );
                }
            }
        }
    }
}

fn read_u32(root: &Map<String, Value>, field: Field, report: &mut ValidationReport) -> Option<u32> {
    let value = lookup(root, field).value()?;
    match value.as_u64().and_then(|n| u32::try_from(n).ok()) {
        Some(n) => Some(n),
        None => {
            report.push(
                Outcome::Issue,
                format!("{} is not an unsigned 32-bit integer: {}", field, value),
            );
            None
        }
    }
}

fn check_round_trip(returned: u32, ctx: &ValidationContext, report: &mut ValidationReport) {
    report.envelope.client_transaction_id = returned;
    match ctx.transaction_id {
        ExpectedTransactionId::NotSent => {}
        ExpectedTransactionId::Exact(expected) => {
            if returned == expected {
                report.push(
                    Outcome::Ok,
                    format!("ClientTransactionID was round-tripped correctly: {}", returned),
                );
            } else {
                report.push(
                    Outcome::Issue,
                    format!(
                        "ClientTransactionID was not round-tripped: expected {}, received {}",
                        expected, returned
                    ),
                );
            }
        }
        ExpectedTransactionId::Miscased { sent } => {
            if returned == 0 {
                report.push(
                    Outcome::Ok,
                    "Mis-cased ClientTransactionID was ignored and 0 returned",
                );
            } else if returned == sent && !ctx.strict {
                report.push(
                    Outcome::Information,
                    format!(
                        "Mis-cased ClientTransactionID was echoed back ({}), expected 0",
                        returned
                    ),
                );
            } else {
                report.push(
                    Outcome::Issue,
                    format!(
                        "Mis-cased ClientTransactionID should have been ignored: expected 0, received {}",
                        returned
                    ),
                );
            }
        }
    }
}

fn check_server_transaction_id(server_id: Option<u32>, report: &mut ValidationReport) {
    report.envelope.server_transaction_id = server_id.unwrap_or(0);
    match server_id {
        Some(id) if id >= 1 => report.push(
            Outcome::Ok,
            format!("ServerTransactionID is at least 1: {}", id),
        ),
        Some(id) => report.push(
            Outcome::Issue,
            format!("ServerTransactionID should be at least 1, received {}", id),
        ),
        None => report.push(
            Outcome::Issue,
            "Response does not contain a ServerTransactionID",
        ),
    }
}

fn check_value_field(root: &Map<String, Value>, ctx: &ValidationContext, report: &mut ValidationReport) {
    match lookup(root, Field::Value) {
        Lookup::Exact(value) => report.value = Some(value.clone()),
        Lookup::Miscased { actual, value } => {
            report.push(
                Outcome::Issue,
                format!("Response field {} is incorrectly cased, expected {}", actual, Field::Value),
            );
            report.value = Some(value.clone());
        }
        Lookup::Missing => {
            if ctx.strict || report.envelope.error_number == 0 {
                report.push(
                    Outcome::Issue,
                    format!("Response does not contain the {} field", Field::Value),
                );
            }
        }
    }
}

fn require_field(root: &Map<String, Value>, field: Field, what: &str, report: &mut ValidationReport) {
    match lookup(root, field) {
        Lookup::Exact(_) => {}
        Lookup::Miscased { actual, .. } => report.push(
            Outcome::Issue,
            format!("{} field {} is incorrectly cased, expected {}", what, actual, field),
        ),
        Lookup::Missing => report.push(
            Outcome::Issue,
            format!("{} does not contain the {} field", what, field),
        ),
    }
}

fn check_elements(value: &Option<Value>, fields: &[Field], what: &str, report: &mut ValidationReport) {
    let Some(value) = value else {
        return;
    };
    let Some(elements) = value.as_array() else {
        report.push(
            Outcome::Issue,
            format!("{} Value is not an array: {}", what, truncate(&value.to_string())),
        );
        return;
    };
    for (index, element) in elements.iter().enumerate() {
        let Some(object) = element.as_object() else {
            report.push(
                Outcome::Issue,
                format!("{} element {} is not an object", what, index),
            );
            continue;
        };
        for field in fields {
            require_field(object, *field, &format!("{} element {}", what, index), report);
        }
    }
}

fn truncate(text: &str) -> String {
    const LIMIT: usize = 200;
    if text.chars().count() > LIMIT {
        format!("{}...", text.chars().take(LIMIT).collect::<String>())
    } else {
        text.to_string()
    }
}
