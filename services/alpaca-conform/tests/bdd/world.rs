//! BDD test world for alpaca-conform

use alpaca_conform::classifier::{Classification, ExpectedStatus};
use alpaca_conform::generator::ProtocolCase;
use alpaca_conform::members::MemberTest;
use alpaca_conform::parameter::Parameter;
use alpaca_conform::validator::ValidationReport;
use cucumber::World;

#[derive(Debug, Default, World)]
pub struct ConformWorld {
    // Classification
    pub strict: bool,
    pub suppress_not_implemented: bool,
    pub expected: Option<ExpectedStatus>,
    pub accept_invalid_value: bool,
    pub negative_id_test: bool,
    pub classification: Option<Classification>,

    // Case generation
    pub member: Option<MemberTest>,
    pub values: Vec<Parameter>,
    pub other_verb_exists: bool,
    pub cases: Vec<ProtocolCase>,

    // Response validation
    pub body: String,
    pub report: Option<ValidationReport>,
}
