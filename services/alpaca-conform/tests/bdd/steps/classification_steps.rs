//! BDD step definitions for outcome classification

use alpaca_conform::classifier::{classify, ClassifyInput, ClassifyPolicy, ExpectedStatus};
use cucumber::{given, then, when};

use crate::world::ConformWorld;

fn parse_expected(text: &str) -> ExpectedStatus {
    if text == "any" {
        return ExpectedStatus::any();
    }
    let codes: Vec<u16> = text
        .split(" or ")
        .map(|code| code.trim().parse().expect("status code"))
        .collect();
    ExpectedStatus::one_of(&codes)
}

#[given("the session is in tolerant mode")]
fn tolerant_mode(world: &mut ConformWorld) {
    world.strict = false;
    world.suppress_not_implemented = true;
}

#[given("the session is in strict mode")]
fn strict_mode(world: &mut ConformWorld) {
    world.strict = true;
    world.suppress_not_implemented = false;
}

#[given(expr = "the expected status is {string}")]
fn expected_status(world: &mut ConformWorld, expected: String) {
    world.expected = Some(parse_expected(&expected));
}

#[given("an InvalidValue error counts as a rejection")]
fn accept_invalid_value(world: &mut ConformWorld) {
    world.accept_invalid_value = true;
}

#[given("the request carries a negative transaction ID")]
fn negative_id(world: &mut ConformWorld) {
    world.negative_id_test = true;
}

#[when(expr = "the device answers HTTP {int} with error number {int}")]
fn device_answers(world: &mut ConformWorld, status: u16, error_number: i32) {
    let expected = world.expected.clone().expect("expected status set");
    let input = ClassifyInput {
        expected: &expected,
        actual: status,
        error_number,
        error_message: "device message",
        accept_invalid_value: world.accept_invalid_value,
        badly_cased_transaction_id: false,
        negative_id_test: world.negative_id_test,
    };
    let policy = ClassifyPolicy {
        strict: world.strict,
        suppress_not_implemented: world.suppress_not_implemented,
    };
    world.classification = Some(classify(&input, policy));
}

#[then(expr = "the outcome is {string}")]
fn outcome_is(world: &mut ConformWorld, outcome: String) {
    let classification = world.classification.as_ref().expect("classified");
    assert_eq!(classification.outcome.to_string(), outcome);
}

#[then(expr = "the classification message mentions {string}")]
fn message_mentions(world: &mut ConformWorld, text: String) {
    let classification = world.classification.as_ref().expect("classified");
    assert!(
        classification.message.contains(&text),
        "{:?} does not contain {:?}",
        classification.message,
        text
    );
}
