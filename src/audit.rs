//! Audit trail appended by every state-changing operation.
//!
//! Appends are best-effort from the caller's point of view: they can never
//! fail an operation that already committed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::store::Tables;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Success,
    Failure,
}

/// One audit row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub action: String,
    pub category: String,
    pub severity: Severity,
    pub status: AuditStatus,
    pub details: serde_json::Value,
    pub at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(action: &str, category: &str) -> Self {
        Self {
            action: action.to_string(),
            category: category.to_string(),
            severity: Severity::Info,
            status: AuditStatus::Success,
            details: serde_json::Value::Null,
            at: Utc::now(),
        }
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn status(mut self, status: AuditStatus) -> Self {
        self.status = status;
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

impl Tables {
    /// Append an audit row. Infallible; also traced for operators.
    pub fn audit(&mut self, entry: AuditEntry) {
        debug!(
            action = %entry.action,
            category = %entry.category,
            severity = ?entry.severity,
            "audit"
        );
        self.audit_log.push(entry);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn builder_defaults_to_info_success() {
        let entry = AuditEntry::new("loan_disbursed", "loans");
        assert_eq!(entry.severity, Severity::Info);
        assert_eq!(entry.status, AuditStatus::Success);
        assert!(entry.details.is_null());
    }

    #[test]
    fn append_records_entry() {
        let mut tables = Tables::default();
        tables.audit(
            AuditEntry::new("cash_session_closed", "cash")
                .severity(Severity::Warning)
                .details(json!({"difference": -100.0})),
        );
        assert_eq!(tables.audit_log.len(), 1);
        assert_eq!(tables.audit_log[0].severity, Severity::Warning);
    }
}
