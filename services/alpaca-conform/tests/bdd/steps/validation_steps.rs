//! BDD step definitions for response validation

use alpaca_conform::classifier::Outcome;
use alpaca_conform::io::HttpMethod;
use alpaca_conform::validator::{
    validate_json, AdditionalCheck, ExpectedTransactionId, ValidationContext,
};
use cucumber::gherkin::Step;
use cucumber::{given, then, when};

use crate::world::ConformWorld;

fn parse_check(name: &str) -> AdditionalCheck {
    match name {
        "none" => AdditionalCheck::None,
        "AxisRates" => AdditionalCheck::AxisRates,
        "DeviceState" => AdditionalCheck::DeviceState,
        "ImageArray" => AdditionalCheck::ImageArray,
        other => panic!("Unknown check: {}", other),
    }
}

#[given("the response body")]
fn response_body(world: &mut ConformWorld, step: &Step) {
    world.body = step.docstring.clone().expect("docstring").trim().to_string();
}

#[when(expr = "the GET response is validated with the {word} check expecting transaction ID {int}")]
fn validate(world: &mut ConformWorld, check: String, transaction_id: u32) {
    let context = ValidationContext {
        method: HttpMethod::Get,
        transaction_id: ExpectedTransactionId::Exact(transaction_id),
        check: parse_check(&check),
        base64_handoff: false,
        tolerate_parse_failure: false,
        strict: world.strict,
    };
    world.report = Some(validate_json(&world.body, &context));
}

#[then(expr = "there is an issue {string}")]
fn has_issue(world: &mut ConformWorld, message: String) {
    let report = world.report.as_ref().expect("validated");
    assert!(
        report
            .findings
            .iter()
            .any(|(o, m)| *o == Outcome::Issue && *m == message),
        "{:?}",
        report.findings
    );
}

#[then(expr = "there are {int} issues")]
fn issue_count(world: &mut ConformWorld, count: usize) {
    let report = world.report.as_ref().expect("validated");
    let issues = report
        .findings
        .iter()
        .filter(|(o, _)| *o == Outcome::Issue)
        .count();
    assert_eq!(issues, count, "{:?}", report.findings);
}

#[then(expr = "there are {int} OK findings")]
fn ok_count(world: &mut ConformWorld, count: usize) {
    let report = world.report.as_ref().expect("validated");
    let oks = report
        .findings
        .iter()
        .filter(|(o, _)| *o == Outcome::Ok)
        .count();
    assert_eq!(oks, count, "{:?}", report.findings);
}
