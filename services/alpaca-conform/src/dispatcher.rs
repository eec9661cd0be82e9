//! Device-type dispatcher
//!
//! Drives one run through its phases: connect, try malformed URLs, run
//! every common member and every member of the configured device kind
//! through the generate, send, validate and classify pipeline, then always
//! disconnect before summarizing.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;

use crate::casing::Field;
use crate::classifier::{classify, ClassifyInput, Outcome};
use crate::config::ImageTransfer;
use crate::executor::{Executor, RequestTarget, ResponseBody, TransactionError, TransactionResult};
use crate::generator::{bad_uri_cases, generate_cases, CaseKind, EnvelopeValues, ProtocolCase};
use crate::imagebytes::IMAGE_BYTES_MIME;
use crate::io::HttpMethod;
use crate::members::{common_members, device_members, has_other_verb, MemberTest, ValueSource};
use crate::parameter::Parameter;
use crate::report::Summary;
use crate::session::Session;
use crate::validator::{
    validate_base64_image, validate_image_bytes, validate_json, AdditionalCheck,
    ExpectedTransactionId, ValidationContext, ValidationReport,
};
use crate::wait::{wait_while, WaitOutcome};

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Connecting,
    CommonMemberTests,
    DeviceSpecificMemberTests,
    Disconnecting,
    Summarizing,
    Done,
}

/// What one case produced, for the follow-up steps that depend on it
#[derive(Debug, Clone, Default)]
struct CaseOutcome {
    status: Option<u16>,
    error_number: i32,
    root: Option<serde_json::Map<String, Value>>,
    base64_handoff: bool,
}

impl CaseOutcome {
    /// HTTP 200 without a device error
    fn succeeded(&self) -> bool {
        self.status == Some(200) && self.error_number == 0
    }
}

/// A supporting request after its envelope was checked
struct CheckedResponse {
    status: u16,
    report: Option<ValidationReport>,
}

/// Runs the full protocol test against one device
pub struct Dispatcher {
    session: Arc<Session>,
    executor: Executor,
    phase: watch::Sender<Phase>,
}

impl Dispatcher {
    pub fn new(session: Arc<Session>, executor: Executor) -> Self {
        let (phase, _) = watch::channel(Phase::Idle);
        Self {
            session,
            executor,
            phase,
        }
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Observe phase transitions
    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    fn set_phase(&self, phase: Phase) {
        tracing::info!("Phase: {:?}", phase);
        self.phase.send_replace(phase);
    }

    /// Run every phase and return the summary
    pub async fn run(&self) -> Summary {
        self.set_phase(Phase::Connecting);
        let connected = self.connect().await;

        if connected && !self.session.is_cancelled() {
            self.set_phase(Phase::CommonMemberTests);
            if self.session.config().tests.bad_uris {
                self.run_bad_uris().await;
            }
            self.run_members(&common_members()).await;
        }

        if connected && !self.session.is_cancelled() {
            self.set_phase(Phase::DeviceSpecificMemberTests);
            let kind = self.session.config().device.device_type;
            self.run_members(&device_members(kind)).await;
        }

        self.set_phase(Phase::Disconnecting);
        self.disconnect().await;

        self.set_phase(Phase::Summarizing);
        let summary = Summary::from_session(&self.session, self.session.is_cancelled());

        self.set_phase(Phase::Done);
        summary
    }

    fn envelope_params(envelope: EnvelopeValues) -> [Parameter; 2] {
        [
            Parameter::new(Field::ClientId.wire_name(), envelope.client_id.to_string()),
            Parameter::new(
                Field::ClientTransactionId.wire_name(),
                envelope.client_transaction_id.to_string(),
            ),
        ]
    }

    async fn set_connected(&self, connected: bool, always_send: bool) -> bool {
        let envelope = self.session.next_envelope();
        let value = if connected { "True" } else { "False" };
        let mut params = vec![Parameter::new("Connected", value)];
        params.extend(Self::envelope_params(envelope));
        let action = if connected { "connect to" } else { "disconnect from" };
        let label = format!("PUT Connected={}", value);

        let result = self
            .checked_send(
                "Connected",
                &label,
                &RequestTarget::Member("connected".to_string()),
                HttpMethod::Put,
                &params,
                envelope,
                always_send,
            )
            .await;

        let failure = match result {
            Ok(checked) => match checked.report {
                Some(report) if report.parsed && report.envelope.error_number == 0 => {
                    tracing::info!("Connected set to {}", connected);
                    return true;
                }
                Some(report) if report.parsed => format!(
                    "error {:#X} {}",
                    report.envelope.error_number, report.envelope.error_message
                ),
                Some(_) => "unreadable response".to_string(),
                None => format!("HTTP {}", checked.status),
            },
            Err(e) => e.to_string(),
        };
        self.session.record(
            "Connected",
            Outcome::Error,
            format!("Unable to {} the device: {}", action, failure),
        );
        false
    }

    async fn connect(&self) -> bool {
        self.set_connected(true, false).await
    }

    /// Sent even when the run was cancelled so the device is left disconnected
    async fn disconnect(&self) -> bool {
        self.set_connected(false, true).await
    }

    async fn run_bad_uris(&self) {
        let device = &self.session.config().device;
        let envelope = self.session.next_envelope();
        for case in bad_uri_cases(device.device_type, device.device_number, envelope) {
            if self.session.is_cancelled() {
                break;
            }
            self.run_case("BadURI", None, &case).await;
        }
    }

    async fn run_members(&self, members: &[MemberTest]) {
        for member in members {
            if self.session.is_cancelled() {
                return;
            }
            if !self.session.config().tests.member_enabled(member) {
                self.session.record(
                    member.name,
                    Outcome::Information,
                    format!("{} test omitted by configuration", member.method),
                );
                continue;
            }
            self.test_member(member, has_other_verb(members, member)).await;
        }
    }

    async fn test_member(&self, member: &MemberTest, other_verb_exists: bool) {
        tracing::debug!("Testing {} {}", member.method, member.name);
        let envelope = self.session.next_envelope();
        let values = self.resolve_params(member, envelope).await;
        let strict = self.session.config().protocol.strict_mode;
        let cases = generate_cases(member, &values, envelope, strict, other_verb_exists);

        let _headers = member.image.then(|| self.image_headers()).flatten();

        for case in &cases {
            if self.session.is_cancelled() {
                return;
            }
            let outcome = self.run_case(member.name, Some(member), case).await;

            if case.kind == CaseKind::Correct && outcome.base64_handoff {
                if let Some(root) = &outcome.root {
                    self.check_base64_payload(member, envelope, root).await;
                }
            }
            if case.readback && outcome.status == Some(200) {
                if let Some(written) = values.first() {
                    self.check_readback(member, case, written, envelope).await;
                }
            }
            if member.method != HttpMethod::Get && outcome.succeeded() {
                self.settle(member, envelope).await;
            }
        }
    }

    fn image_headers(&self) -> Option<crate::executor::HeaderScope> {
        match self.session.config().protocol.image_transfer {
            ImageTransfer::Json => None,
            ImageTransfer::ImageBytes => Some(self.executor.scoped_headers(vec![(
                "Accept".to_string(),
                IMAGE_BYTES_MIME.to_string(),
            )])),
            ImageTransfer::Base64Handoff => Some(self.executor.scoped_headers(vec![(
                crate::executor::BASE64_HANDOFF_HEADER.to_string(),
                "true".to_string(),
            )])),
        }
    }

    /// Resolve member parameter values, reading current device values where declared
    async fn resolve_params(&self, member: &MemberTest, envelope: EnvelopeValues) -> Vec<Parameter> {
        let mut values = Vec::with_capacity(member.params.len());
        for spec in &member.params {
            let value = match &spec.source {
                ValueSource::Fixed(value) => value.to_string(),
                ValueSource::Current { fallback } => {
                    let path = member.path();
                    let label = format!("GET {} before testing", path);
                    self.read_value(member.name, &label, &path, &[], envelope)
                        .await
                        .map(|v| parameter_text(&v))
                        .unwrap_or_else(|| fallback.to_string())
                }
                ValueSource::Read {
                    member: source,
                    query,
                    fallback,
                } => {
                    let label = format!("GET {} before testing", source);
                    self.read_value(member.name, &label, source, query, envelope)
                        .await
                        .map(|v| parameter_text(&v))
                        .unwrap_or_else(|| fallback.to_string())
                }
            };
            values.push(Parameter::new(spec.name, value));
        }
        values
    }

    /// Send a supporting request and check its envelope like any protocol case.
    ///
    /// Findings are recorded against `owner`; the report is present for an
    /// HTTP 200 that is not an HTML error page.
    #[allow(clippy::too_many_arguments)]
    async fn checked_send(
        &self,
        owner: &str,
        label: &str,
        target: &RequestTarget,
        method: HttpMethod,
        params: &[Parameter],
        envelope: EnvelopeValues,
        always_send: bool,
    ) -> Result<CheckedResponse, TransactionError> {
        let tr = self.executor.send(target, method, params, always_send).await?;
        if tr.status != 200 || tr.is_error_page() {
            return Ok(CheckedResponse {
                status: tr.status,
                report: None,
            });
        }

        let context = ValidationContext {
            method,
            transaction_id: ExpectedTransactionId::Exact(envelope.client_transaction_id),
            check: AdditionalCheck::None,
            base64_handoff: false,
            tolerate_parse_failure: false,
            strict: self.session.config().protocol.strict_mode,
        };
        let report = validated(&tr, &context);
        for (outcome, message) in &report.findings {
            self.session.record_with_context(
                owner,
                *outcome,
                format!("{}: {}", label, message),
                Some(label),
            );
        }
        Ok(CheckedResponse {
            status: tr.status,
            report: Some(report),
        })
    }

    /// GET a member and return its `Value` when the read succeeds without a device error
    async fn read_value(
        &self,
        owner: &str,
        label: &str,
        path: &str,
        query: &[(&str, &str)],
        envelope: EnvelopeValues,
    ) -> Option<Value> {
        let mut params: Vec<Parameter> = query.iter().map(|(n, v)| Parameter::new(*n, *v)).collect();
        params.extend(Self::envelope_params(envelope));

        let checked = self
            .checked_send(
                owner,
                label,
                &RequestTarget::Member(path.to_string()),
                HttpMethod::Get,
                &params,
                envelope,
                false,
            )
            .await
            .ok()?;
        let report = checked.report?;
        if !report.parsed || report.envelope.error_number != 0 {
            return None;
        }
        report.value
    }

    /// Send one case, validate and classify the response, and record every finding
    async fn run_case(
        &self,
        member_name: &str,
        member: Option<&MemberTest>,
        case: &ProtocolCase,
    ) -> CaseOutcome {
        let label = format!("{} {}", case.method, case.description);
        let record = |outcome: Outcome, message: String| {
            self.session
                .record_with_context(member_name, outcome, message, Some(label.as_str()));
        };

        let result = self
            .executor
            .send(&case.target, case.method, &case.params, false)
            .await;

        let tr = match result {
            Ok(tr) => tr,
            Err(TransactionError::Cancelled) => {
                record(Outcome::Error, format!("{}: request cancelled", label));
                return CaseOutcome::default();
            }
            Err(e) if case.bad_uri => {
                record(
                    Outcome::Ok,
                    format!("{}: host rejected the bad URI ({})", label, e),
                );
                return CaseOutcome::default();
            }
            Err(e) => {
                record(Outcome::Error, format!("{}: {}", label, e));
                return CaseOutcome::default();
            }
        };

        if case.bad_uri {
            if tr.status == 200 {
                record(
                    Outcome::Issue,
                    format!("{}: bad URI was accepted with HTTP 200", label),
                );
            } else {
                record(
                    Outcome::Ok,
                    format!("{}: host rejected the bad URI with HTTP {}", label, tr.status),
                );
            }
            return CaseOutcome {
                status: Some(tr.status),
                ..Default::default()
            };
        }

        let mut outcome = CaseOutcome {
            status: Some(tr.status),
            base64_handoff: tr.is_base64_handoff(),
            ..Default::default()
        };
        let mut error_message = String::new();

        if tr.status == 200 {
            if tr.is_error_page() {
                record(
                    Outcome::Issue,
                    format!("{}: HTTP 200 returned an HTML error page", label),
                );
                return outcome;
            }
            let context = ValidationContext {
                method: case.method,
                transaction_id: case.transaction_id,
                check: member.map(|m| m.check).unwrap_or_default(),
                base64_handoff: outcome.base64_handoff,
                tolerate_parse_failure: case.tolerate_parse_failure,
                strict: self.session.config().protocol.strict_mode,
            };
            let report = validated(&tr, &context);
            for (finding, message) in &report.findings {
                record(*finding, format!("{}: {}", label, message));
            }
            outcome.error_number = report.envelope.error_number;
            outcome.root = report.root;
            error_message = report.envelope.error_message;
        }

        let classification = classify(
            &ClassifyInput {
                expected: &case.expected,
                actual: tr.status,
                error_number: outcome.error_number,
                error_message: &error_message,
                accept_invalid_value: case.accept_invalid_value,
                badly_cased_transaction_id: case.badly_cased_transaction_id,
                negative_id_test: case.negative_id_test,
            },
            self.session.policy(),
        );
        let mut message = format!("{}: {}", label, classification.message);
        if classification.outcome == Outcome::Issue && tr.status != 200 {
            if let ResponseBody::Text(text) = &tr.body {
                let text = text.trim();
                if !text.is_empty() {
                    message.push_str(&format!(" ({})", text.chars().take(120).collect::<String>()));
                }
            }
        }
        record(classification.outcome, message);
        outcome
    }

    /// After the ClientID casing case, the getter must still return the written value
    async fn check_readback(
        &self,
        member: &MemberTest,
        case: &ProtocolCase,
        written: &Parameter,
        envelope: EnvelopeValues,
    ) {
        let label = format!("{} {}", case.method, case.description);
        let read_label = format!("{} readback", label);
        match self
            .read_value(member.name, &read_label, &member.path(), &[], envelope)
            .await
        {
            Some(value) if same_value(written.value(), &value) => self.session.record(
                member.name,
                Outcome::Ok,
                format!("{}: read back {} unchanged", label, value),
            ),
            Some(value) => self.session.record(
                member.name,
                Outcome::Issue,
                format!(
                    "{}: wrote {} but read back {}",
                    label,
                    written.value(),
                    value
                ),
            ),
            None => self.session.record(
                member.name,
                Outcome::Information,
                format!("{}: unable to read the value back", label),
            ),
        }
    }

    /// Fetch the Base64 payload announced by a hand-off response.
    ///
    /// The payload is bare Base64 text without an envelope, so only ClientID
    /// is sent and there is no transaction ID to round-trip.
    async fn check_base64_payload(
        &self,
        member: &MemberTest,
        envelope: EnvelopeValues,
        metadata: &serde_json::Map<String, Value>,
    ) {
        let target = RequestTarget::Member(format!("{}base64", member.path()));
        let params = [Parameter::new(
            Field::ClientId.wire_name(),
            envelope.client_id.to_string(),
        )];
        match self
            .executor
            .send(&target, HttpMethod::Get, &params, false)
            .await
        {
            Ok(tr) if tr.status == 200 => {
                let payload = match &tr.body {
                    ResponseBody::Json(text) | ResponseBody::Text(text) => text.clone(),
                    ResponseBody::ImageBytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
                };
                for (outcome, message) in validate_base64_image(&payload, metadata) {
                    self.session.record(member.name, outcome, message);
                }
            }
            Ok(tr) => self.session.record(
                member.name,
                Outcome::Issue,
                format!("Base64 image payload request returned HTTP {}", tr.status),
            ),
            Err(e) => self.session.record(
                member.name,
                Outcome::Error,
                format!("Base64 image payload request failed: {}", e),
            ),
        }
    }

    /// Poll the member's completion predicate until the device settles
    async fn settle(&self, member: &MemberTest, envelope: EnvelopeValues) {
        let Some(check) = member.settle else {
            return;
        };
        let protocol = &self.session.config().protocol;
        let description = format!("{} ({} polling {})", member.name, member.method, check.member());
        let label = format!("GET {} while settling", check.member());
        let label = label.as_str();

        let result = wait_while(
            self.session.cancel_token(),
            protocol.poll_interval,
            protocol.settle_timeout,
            &description,
            move || async move {
                self.read_value(member.name, label, check.member(), &[], envelope)
                    .await
                    .is_some_and(|value| check.is_busy(&value))
            },
        )
        .await;

        match result {
            Ok(WaitOutcome::Settled) => tracing::debug!("{} settled", description),
            Ok(WaitOutcome::Cancelled) => {}
            Err(e) => self.session.record(member.name, Outcome::Error, e.to_string()),
        }
    }
}

fn validated(tr: &TransactionResult, context: &ValidationContext) -> ValidationReport {
    match &tr.body {
        ResponseBody::Json(text) | ResponseBody::Text(text) => validate_json(text, context),
        ResponseBody::ImageBytes(bytes) => validate_image_bytes(bytes, context),
    }
}

/// Render a JSON value the way it is sent back as a parameter
fn parameter_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Compare a written parameter with the value read back
fn same_value(written: &str, read: &Value) -> bool {
    match read {
        Value::Bool(b) => written
            .trim()
            .to_ascii_lowercase()
            .parse::<bool>()
            .is_ok_and(|w| w == *b),
        Value::Number(n) => match (written.trim().parse::<f64>(), n.as_f64()) {
            (Ok(w), Some(r)) => (w - r).abs() <= f64::EPSILON * w.abs().max(1.0),
            _ => false,
        },
        Value::String(s) => s == written,
        other => other.to_string() == written,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parameter_text_unquotes_strings() {
        assert_eq!(parameter_text(&json!("Filter 1")), "Filter 1");
        assert_eq!(parameter_text(&json!(true)), "true");
        assert_eq!(parameter_text(&json!(12.5)), "12.5");
    }

    #[test]
    fn readback_comparison() {
        assert!(same_value("True", &json!(true)));
        assert!(same_value("false", &json!(false)));
        assert!(!same_value("true", &json!(false)));
        assert!(same_value("12.5", &json!(12.5)));
        assert!(same_value("3", &json!(3)));
        assert!(!same_value("3", &json!(4)));
        assert!(same_value("abc", &json!("abc")));
    }

    #[test]
    fn case_outcome_success_needs_clean_200() {
        let mut outcome = CaseOutcome {
            status: Some(200),
            ..Default::default()
        };
        assert!(outcome.succeeded());
        outcome.error_number = 0x400;
        assert!(!outcome.succeeded());
        outcome = CaseOutcome {
            status: Some(400),
            ..Default::default()
        };
        assert!(!outcome.succeeded());
    }
}
