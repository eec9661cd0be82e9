//! BDD step definitions for alpaca-conform

pub mod classification_steps;
pub mod generation_steps;
pub mod validation_steps;
