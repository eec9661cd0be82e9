//! Protocol case generation
//!
//! Expands one member into the fixed, ordered list of requests that exercise the
//! server's handling of parameter casing, extraneous parameters, malformed
//! values and malformed envelope values.

use crate::casing::{invert_case, Field};
use crate::classifier::ExpectedStatus;
use crate::device::DeviceType;
use crate::executor::RequestTarget;
use crate::io::HttpMethod;
use crate::members::MemberTest;
use crate::parameter::Parameter;
use crate::validator::ExpectedTransactionId;

/// Name and value of the extraneous parameter servers must ignore
pub const EXTRA_PARAMETER: (&str, &str) = ("ConformExtraParameter", "ConformValue");

/// Value sent to typed parameters that cannot be parsed
pub const NONSENSE_VALUE: &str = "ConformNonsense";

/// Envelope values sent with every request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeValues {
    pub client_id: u32,
    pub client_transaction_id: u32,
}

/// Which kind of request a case represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseKind {
    Correct,
    ExtraParameter,
    InvertedParameter,
    LowerCaseClientId,
    LowerCaseClientTransactionId,
    BadValue,
    BadEnvelope,
    WrongVerb,
    BadUri,
}

/// One request to send together with the expectations for its response
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolCase {
    pub description: String,
    pub kind: CaseKind,
    pub target: RequestTarget,
    pub method: HttpMethod,
    pub params: Vec<Parameter>,
    pub expected: ExpectedStatus,
    pub transaction_id: ExpectedTransactionId,
    /// An InvalidValue error inside HTTP 200 counts as a correct rejection
    pub accept_invalid_value: bool,
    pub tolerate_parse_failure: bool,
    pub negative_id_test: bool,
    pub badly_cased_transaction_id: bool,
    /// Re-read the getter afterwards and compare with the written value
    pub readback: bool,
    /// A transport-level rejection counts as success
    pub bad_uri: bool,
}

impl ProtocolCase {
    fn new(kind: CaseKind, description: String, member: &MemberTest, params: Vec<Parameter>) -> Self {
        let transaction_id = transaction_id_of(&params);
        Self {
            description,
            kind,
            target: RequestTarget::Member(member.path()),
            method: member.method,
            params,
            expected: ExpectedStatus::only(200),
            transaction_id,
            accept_invalid_value: false,
            tolerate_parse_failure: false,
            negative_id_test: false,
            badly_cased_transaction_id: false,
            readback: false,
            bad_uri: false,
        }
    }

    /// Whether this case should change device state if the server accepts it
    pub fn is_well_formed(&self) -> bool {
        matches!(
            self.kind,
            CaseKind::Correct
                | CaseKind::ExtraParameter
                | CaseKind::LowerCaseClientId
                | CaseKind::LowerCaseClientTransactionId
        )
    }
}

/// The transaction ID a response must echo, derived from the parameters actually sent
fn transaction_id_of(params: &[Parameter]) -> ExpectedTransactionId {
    let wire = Field::ClientTransactionId.wire_name();
    if let Some(p) = params.iter().find(|p| p.name() == wire) {
        return ExpectedTransactionId::from_sent(true, p.value());
    }
    match params.iter().find(|p| p.name().eq_ignore_ascii_case(wire)) {
        Some(p) => ExpectedTransactionId::from_sent(false, p.value()),
        None => ExpectedTransactionId::NotSent,
    }
}

fn envelope_params(envelope: EnvelopeValues) -> Vec<Parameter> {
    vec![
        Parameter::new(Field::ClientId.wire_name(), envelope.client_id.to_string()),
        Parameter::new(
            Field::ClientTransactionId.wire_name(),
            envelope.client_transaction_id.to_string(),
        ),
    ]
}

/// Replace the parameter called `name` with `replacement`
fn replace(params: &[Parameter], name: &str, replacement: Parameter) -> Vec<Parameter> {
    params
        .iter()
        .map(|p| {
            if p.name() == name {
                replacement.clone()
            } else {
                p.clone()
            }
        })
        .collect()
}

/// Build every protocol case for `member`.
///
/// `values` holds the resolved member parameters in declaration order.
/// `other_verb_exists` suppresses the wrong-verb case when the member is
/// also reachable with the other verb.
pub fn generate_cases(
    member: &MemberTest,
    values: &[Parameter],
    envelope: EnvelopeValues,
    strict: bool,
    other_verb_exists: bool,
) -> Vec<ProtocolCase> {
    let mut base: Vec<Parameter> = values.to_vec();
    base.extend(envelope_params(envelope));
    let mut cases = Vec::new();

    // Correct casing
    cases.push(ProtocolCase::new(
        CaseKind::Correct,
        "correctly cased parameters".to_string(),
        member,
        base.clone(),
    ));

    // Extraneous parameter
    let mut extra = base.clone();
    extra.push(Parameter::new(EXTRA_PARAMETER.0, EXTRA_PARAMETER.1));
    cases.push(ProtocolCase::new(
        CaseKind::ExtraParameter,
        format!("extraneous parameter {}", EXTRA_PARAMETER.0),
        member,
        extra,
    ));

    // Member parameter names case-inverted, one at a time
    for value in values {
        let inverted = invert_case(value.name());
        let mut case = ProtocolCase::new(
            CaseKind::InvertedParameter,
            format!("parameter name {} sent as {}", value.name(), inverted),
            member,
            replace(&base, value.name(), value.renamed(inverted.clone())),
        );
        if member.method != HttpMethod::Get {
            // Form parameter names are case-sensitive, so the parameter is missing
            case.expected = ExpectedStatus::only(400);
            case.accept_invalid_value = !strict;
        }
        cases.push(case);
    }

    // Envelope parameter names lower-cased
    let client_id = Field::ClientId.wire_name();
    let lower_id = client_id.to_lowercase();
    let mut case = ProtocolCase::new(
        CaseKind::LowerCaseClientId,
        format!("envelope parameter {} sent as {}", client_id, lower_id),
        member,
        replace(
            &base,
            client_id,
            Parameter::new(lower_id.clone(), envelope.client_id.to_string()),
        ),
    );
    case.readback = member.is_setter();
    cases.push(case);

    let transaction = Field::ClientTransactionId.wire_name();
    let lower_transaction = transaction.to_lowercase();
    let mut case = ProtocolCase::new(
        CaseKind::LowerCaseClientTransactionId,
        format!("envelope parameter {} sent as {}", transaction, lower_transaction),
        member,
        replace(
            &base,
            transaction,
            Parameter::new(
                lower_transaction.clone(),
                envelope.client_transaction_id.to_string(),
            ),
        ),
    );
    case.badly_cased_transaction_id = true;
    cases.push(case);

    // Malformed member parameter values
    for (value, spec) in values.iter().zip(&member.params) {
        if !spec.kind.is_typed() {
            continue;
        }
        for bad in ["", NONSENSE_VALUE] {
            let mut case = ProtocolCase::new(
                CaseKind::BadValue,
                format!("parameter {} with value {:?}", value.name(), bad),
                member,
                replace(&base, value.name(), value.with_value(bad)),
            );
            case.expected = ExpectedStatus::only(400);
            case.accept_invalid_value = !strict;
            cases.push(case);
        }
    }

    // Malformed envelope values
    let negative_id = format!("-{}", envelope.client_id);
    let negative_transaction = format!("-{}", envelope.client_transaction_id);
    let battery: [(&str, String, bool); 8] = [
        (client_id, String::new(), false),
        (client_id, " ".to_string(), false),
        (client_id, negative_id, true),
        (client_id, "ConformBadClientID".to_string(), false),
        (transaction, String::new(), false),
        (transaction, " ".to_string(), false),
        (transaction, negative_transaction, true),
        (transaction, "ConformBadTransactionID".to_string(), false),
    ];
    for (name, bad, negative) in battery {
        let mut case = ProtocolCase::new(
            CaseKind::BadEnvelope,
            format!("envelope parameter {} with value {:?}", name, bad),
            member,
            replace(&base, name, Parameter::new(name, bad)),
        );
        case.negative_id_test = negative;
        case.tolerate_parse_failure = name == transaction;
        if strict {
            case.expected = ExpectedStatus::only(400);
        } else {
            case.expected = ExpectedStatus::one_of(&[200, 400]);
            case.accept_invalid_value = true;
        }
        cases.push(case);
    }

    // Wrong HTTP verb
    if !other_verb_exists {
        let wrong = match member.method {
            HttpMethod::Get => HttpMethod::Put,
            _ => HttpMethod::Get,
        };
        let mut case = ProtocolCase::new(
            CaseKind::WrongVerb,
            format!("{} instead of {}", wrong, member.method),
            member,
            envelope_params(envelope),
        );
        case.method = wrong;
        case.expected = ExpectedStatus::one_of(&[400, 404, 405]);
        cases.push(case);
    }

    cases
}

/// Malformed URLs sent before any member is exercised
pub fn bad_uri_cases(
    device_type: DeviceType,
    device_number: u32,
    envelope: EnvelopeValues,
) -> Vec<ProtocolCase> {
    let kind = device_type.path();
    let bad_uri_case = |description: &str, path: String, bad_uri: bool| {
        let params = envelope_params(envelope);
        ProtocolCase {
            description: description.to_string(),
            kind: CaseKind::BadUri,
            target: RequestTarget::Raw(path),
            method: HttpMethod::Get,
            transaction_id: transaction_id_of(&params),
            params,
            expected: ExpectedStatus::one_of(&[400, 404]),
            accept_invalid_value: false,
            tolerate_parse_failure: false,
            negative_id_test: false,
            badly_cased_transaction_id: false,
            readback: false,
            bad_uri,
        }
    };

    vec![
        bad_uri_case(
            "bad base URI element",
            format!("/apx/v1/{}/{}/description", kind, device_number),
            true,
        ),
        bad_uri_case(
            "bad API version",
            format!("/api/v0/{}/{}/description", kind, device_number),
            false,
        ),
        bad_uri_case(
            "unknown device type",
            format!("/api/v1/conformunknowndevice/{}/description", device_number),
            false,
        ),
        bad_uri_case(
            "non-numeric device number",
            format!("/api/v1/{}/conformnumber/description", kind),
            false,
        ),
        bad_uri_case(
            "out of range device number",
            format!("/api/v1/{}/99999/description", kind),
            false,
        ),
        bad_uri_case(
            "unknown member",
            format!("/api/v1/{}/{}/conformunknownmember", kind, device_number),
            false,
        ),
        bad_uri_case(
            "upper case member name",
            format!("/api/v1/{}/{}/DESCRIPTION", kind, device_number),
            false,
        ),
    ]
}
