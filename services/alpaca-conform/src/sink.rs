//! Logger sink for classified findings

use crate::classifier::Outcome;

/// Receives every finding as it is recorded; delivery may be buffered
pub trait ConformLogger: Send + Sync {
    fn log(&self, member: &str, outcome: Outcome, message: &str, context: Option<&str>);
}

/// Forwards findings to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl ConformLogger for TracingLogger {
    fn log(&self, member: &str, outcome: Outcome, message: &str, context: Option<&str>) {
        let context = context.unwrap_or_default();
        match outcome {
            Outcome::Ok | Outcome::Information => {
                tracing::info!(member, %outcome, context, "{}", message)
            }
            Outcome::Issue => tracing::warn!(member, %outcome, context, "{}", message),
            Outcome::Error => tracing::error!(member, %outcome, context, "{}", message),
        }
    }
}
