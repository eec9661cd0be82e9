//! Run summary and report output

use std::fmt::Write as _;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::device::DeviceType;
use crate::session::{Finding, Session};

/// Return code used when an unexpected failure aborted the whole run
pub const ABORT_RETURN_CODE: i32 = -99999;

/// Overall result of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Conformant,
    NonConformant,
    Interrupted,
}

/// Serializable summary handed to the report writer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub device_type: DeviceType,
    pub device_number: u32,
    pub base_url: String,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub ok_count: usize,
    pub error_count: usize,
    pub issue_count: usize,
    pub information_count: usize,
    pub errors: Vec<Finding>,
    pub issues: Vec<Finding>,
    pub information: Vec<Finding>,
    pub verdict: Verdict,
    pub return_code: i32,
}

impl Summary {
    /// Snapshot the session's findings
    pub fn from_session(session: &Session, interrupted: bool) -> Self {
        let device = &session.config().device;
        let errors = session.errors();
        let issues = session.issues();
        let information = session.information();
        let return_code = session.return_code();

        let verdict = if interrupted {
            Verdict::Interrupted
        } else if return_code == 0 {
            Verdict::Conformant
        } else {
            Verdict::NonConformant
        };

        Self {
            device_type: device.device_type,
            device_number: device.device_number,
            base_url: device.base_url(),
            started: session.started(),
            finished: Utc::now(),
            ok_count: session.ok_count(),
            error_count: errors.len(),
            issue_count: issues.len(),
            information_count: information.len(),
            errors,
            issues,
            information,
            verdict,
            return_code,
        }
    }

    /// One-line verdict
    pub fn verdict_line(&self) -> String {
        match self.verdict {
            Verdict::Interrupted => format!(
                "Testing of {} {} was interrupted before completion",
                self.device_type, self.device_number
            ),
            Verdict::Conformant => format!(
                "No errors, issues or warnings: {} {} conforms to the Alpaca protocol",
                self.device_type, self.device_number
            ),
            Verdict::NonConformant => format!(
                "Found {} errors and {} issues: {} {} does not conform to the Alpaca protocol",
                self.error_count, self.issue_count, self.device_type, self.device_number
            ),
        }
    }

    /// Text block with the Errors, Issues and Information sections and the verdict
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (title, findings) in [
            ("Errors", &self.errors),
            ("Issues", &self.issues),
            ("Information", &self.information),
        ] {
            let _ = writeln!(out, "{} ({})", title, findings.len());
            for finding in findings {
                let _ = writeln!(out, "  {}: {}", finding.member, finding.message);
            }
            let _ = writeln!(out);
        }
        let _ = writeln!(out, "{}", self.verdict_line());
        out
    }
}

/// Print the summary block to stdout
pub fn print_summary(summary: &Summary) {
    println!("{}", summary.render());
}

/// Write the summary as pretty JSON
pub fn write_report(summary: &Summary, path: &Path) -> crate::Result<()> {
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, json).map_err(|e| {
        crate::ConformError::Config(format!("Failed to write report file {:?}: {}", path, e))
    })?;
    tracing::info!("Report written to {:?}", path);
    Ok(())
}
