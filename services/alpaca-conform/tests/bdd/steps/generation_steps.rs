//! BDD step definitions for protocol case generation

use std::str::FromStr;

use alpaca_conform::classifier::ExpectedStatus;
use alpaca_conform::device::DeviceType;
use alpaca_conform::generator::{generate_cases, CaseKind, EnvelopeValues};
use alpaca_conform::members::{common_members, device_members, has_other_verb, ValueSource};
use alpaca_conform::parameter::Parameter;
use cucumber::{given, then, when};

use crate::world::ConformWorld;

const ENVELOPE: EnvelopeValues = EnvelopeValues {
    client_id: 123456,
    client_transaction_id: 67890,
};

fn parse_expected(text: &str) -> ExpectedStatus {
    let codes: Vec<u16> = text
        .split(" or ")
        .map(|code| code.trim().parse().expect("status code"))
        .collect();
    ExpectedStatus::one_of(&codes)
}

#[given(expr = "the {word} {word} member of a {word}")]
fn member_of(world: &mut ConformWorld, verb: String, name: String, device: String) {
    let kind = DeviceType::from_str(&device).expect("device type");
    let mut members = common_members();
    members.extend(device_members(kind));

    let member = members
        .iter()
        .find(|m| m.name == name && m.method.as_str() == verb)
        .unwrap_or_else(|| panic!("no {} {} member on {}", verb, name, device))
        .clone();

    world.values = member
        .params
        .iter()
        .map(|spec| {
            let value = match &spec.source {
                ValueSource::Fixed(value) => *value,
                ValueSource::Current { fallback } | ValueSource::Read { fallback, .. } => *fallback,
            };
            Parameter::new(spec.name, value)
        })
        .collect();
    world.other_verb_exists = has_other_verb(&members, &member);
    world.cases.clear();
    world.member = Some(member);
}

#[when(expr = "the protocol cases are generated in {word} mode")]
fn generate(world: &mut ConformWorld, mode: String) {
    let member = world.member.as_ref().expect("member chosen");
    let strict = match mode.as_str() {
        "strict" => true,
        "tolerant" => false,
        other => panic!("unknown mode {}", other),
    };
    world.cases = generate_cases(
        member,
        &world.values,
        ENVELOPE,
        strict,
        world.other_verb_exists,
    );
}

#[then(expr = "the first case sends {string}")]
fn first_case_sends(world: &mut ConformWorld, query: String) {
    let sent: Vec<String> = world.cases[0].params.iter().map(|p| p.to_string()).collect();
    assert_eq!(sent.join("&"), query);
}

#[then(expr = "the case {string} expects {string}")]
fn case_expects(world: &mut ConformWorld, description: String, expected: String) {
    let case = world
        .cases
        .iter()
        .find(|c| c.description == description)
        .unwrap_or_else(|| panic!("no case {:?}", description));
    assert_eq!(case.expected, parse_expected(&expected));
}

#[then(expr = "there are {int} malformed envelope cases expecting {string}")]
fn envelope_cases(world: &mut ConformWorld, count: usize, expected: String) {
    let battery: Vec<_> = world
        .cases
        .iter()
        .filter(|c| c.kind == CaseKind::BadEnvelope)
        .collect();
    assert_eq!(battery.len(), count);
    let expected = parse_expected(&expected);
    assert!(battery.iter().all(|c| c.expected == expected));
}

#[then(expr = "there are {int} malformed value cases")]
fn value_cases(world: &mut ConformWorld, count: usize) {
    let bad = world
        .cases
        .iter()
        .filter(|c| c.kind == CaseKind::BadValue)
        .count();
    assert_eq!(bad, count);
}

#[then(expr = "the last case is sent with {word} expecting {string}")]
fn last_case(world: &mut ConformWorld, verb: String, expected: String) {
    let last = world.cases.last().expect("cases generated");
    assert_eq!(last.kind, CaseKind::WrongVerb);
    assert_eq!(last.method.as_str(), verb);
    assert_eq!(last.expected, parse_expected(&expected));
}

#[then("no wrong verb case is generated")]
fn no_wrong_verb(world: &mut ConformWorld) {
    assert!(world.cases.iter().all(|c| c.kind != CaseKind::WrongVerb));
}
