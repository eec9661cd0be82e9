//! Run-wide result store
//!
//! A [`Session`] owns the configuration snapshot, the cancellation token and
//! the append-only finding lists for one run. It is passed explicitly to the
//! components that need it, so concurrent runs never share state.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::classifier::{ClassifyPolicy, Outcome};
use crate::config::Config;
use crate::generator::EnvelopeValues;
use crate::sink::ConformLogger;

/// One recorded observation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub member: String,
    pub message: String,
}

#[derive(Debug, Default, Clone)]
struct Findings {
    errors: Vec<Finding>,
    issues: Vec<Finding>,
    information: Vec<Finding>,
    ok: usize,
}

/// State shared by every component during one run
pub struct Session {
    config: Arc<Config>,
    cancel: CancellationToken,
    logger: Arc<dyn ConformLogger>,
    findings: RwLock<Findings>,
    transaction_counter: AtomicU32,
    started: DateTime<Utc>,
}

impl Session {
    pub fn new(config: Config, cancel: CancellationToken, logger: Arc<dyn ConformLogger>) -> Self {
        let first = config.protocol.client_transaction_id;
        Self {
            config: Arc::new(config),
            cancel,
            logger,
            findings: RwLock::new(Findings::default()),
            transaction_counter: AtomicU32::new(first),
            started: Utc::now(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn started(&self) -> DateTime<Utc> {
        self.started
    }

    pub fn policy(&self) -> ClassifyPolicy {
        ClassifyPolicy {
            strict: self.config.protocol.strict_mode,
            suppress_not_implemented: self.config.protocol.suppress_not_implemented,
        }
    }

    /// Envelope values for the next member; each member gets a fresh transaction ID
    pub fn next_envelope(&self) -> EnvelopeValues {
        EnvelopeValues {
            client_id: self.config.protocol.client_id,
            client_transaction_id: self.transaction_counter.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Log a finding and append it to its list
    pub fn record(&self, member: &str, outcome: Outcome, message: impl Into<String>) {
        self.record_with_context(member, outcome, message, None);
    }

    pub fn record_with_context(
        &self,
        member: &str,
        outcome: Outcome,
        message: impl Into<String>,
        context: Option<&str>,
    ) {
        let message = message.into();
        self.logger.log(member, outcome, &message, context);

        let finding = Finding {
            member: member.to_string(),
            message,
        };
        let mut findings = self.findings.write().unwrap_or_else(|e| e.into_inner());
        match outcome {
            Outcome::Ok => findings.ok += 1,
            Outcome::Information => findings.information.push(finding),
            Outcome::Issue => findings.issues.push(finding),
            Outcome::Error => findings.errors.push(finding),
        }
    }

    pub fn errors(&self) -> Vec<Finding> {
        self.read().errors.clone()
    }

    pub fn issues(&self) -> Vec<Finding> {
        self.read().issues.clone()
    }

    pub fn information(&self) -> Vec<Finding> {
        self.read().information.clone()
    }

    pub fn ok_count(&self) -> usize {
        self.read().ok
    }

    /// `errors + issues`; zero means the device conforms
    pub fn return_code(&self) -> i32 {
        let findings = self.read();
        i32::try_from(findings.errors.len() + findings.issues.len()).unwrap_or(i32::MAX)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Findings> {
        self.findings.read().unwrap_or_else(|e| e.into_inner())
    }
}
