//! Status conditions reported after a pass.
//!
//! Transient "still running" results show up as in-progress conditions, not
//! failures.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ReconcileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reason {
    Creating,
    Failed,
    Deleting,
    Deleted,
    DeletionFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub condition_type: String,
    pub status: ConditionStatus,
    pub reason: Option<Reason>,
    pub severity: Option<Severity>,
    pub message: Option<String>,
    pub last_transition_time: DateTime<Utc>,
}

/// Conditions keyed by type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditions {
    items: BTreeMap<String, Condition>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, condition_type: &str) -> Option<&Condition> {
        self.items.get(condition_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.items.values()
    }

    pub fn is_true(&self, condition_type: &str) -> bool {
        self.get(condition_type)
            .is_some_and(|c| c.status == ConditionStatus::True)
    }

    pub fn mark_true(&mut self, condition_type: &str) {
        self.set(condition_type, ConditionStatus::True, None, None, None);
    }

    pub fn mark_false(
        &mut self,
        condition_type: &str,
        reason: Reason,
        severity: Severity,
        message: String,
    ) {
        self.set(
            condition_type,
            ConditionStatus::False,
            Some(reason),
            Some(severity),
            Some(message),
        );
    }

    fn set(
        &mut self,
        condition_type: &str,
        status: ConditionStatus,
        reason: Option<Reason>,
        severity: Option<Severity>,
        message: Option<String>,
    ) {
        // Transition time only moves when the status flips.
        let last_transition_time = match self.items.get(condition_type) {
            Some(prev) if prev.status == status => prev.last_transition_time,
            _ => Utc::now(),
        };
        self.items.insert(
            condition_type.to_string(),
            Condition {
                condition_type: condition_type.to_string(),
                status,
                reason,
                severity,
                message,
                last_transition_time,
            },
        );
    }

    /// Record the result of a create-or-update pass for `service`.
    pub fn update_put_status(
        &mut self,
        condition_type: &str,
        service: &str,
        err: Option<&ReconcileError>,
    ) {
        match err {
            None => self.mark_true(condition_type),
            Some(e) if e.is_operation_not_done() => self.mark_false(
                condition_type,
                Reason::Creating,
                Severity::Info,
                format!("{} creating or updating", service),
            ),
            Some(e) => self.mark_false(
                condition_type,
                Reason::Failed,
                Severity::Error,
                format!("{} failed to create or update. err: {}", service, e),
            ),
        }
    }

    /// Record the result of a delete pass for `service`.
    pub fn update_delete_status(
        &mut self,
        condition_type: &str,
        service: &str,
        err: Option<&ReconcileError>,
    ) {
        match err {
            None => self.mark_false(
                condition_type,
                Reason::Deleted,
                Severity::Info,
                format!("{} successfully deleted", service),
            ),
            Some(e) if e.is_operation_not_done() => self.mark_false(
                condition_type,
                Reason::Deleting,
                Severity::Info,
                format!("{} deleting", service),
            ),
            Some(e) => self.mark_false(
                condition_type,
                Reason::DeletionFailed,
                Severity::Error,
                format!("{} failed to delete. err: {}", service, e),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{OperationNotDone, ProviderError};
    use crate::future::{OperationKind, ResumeRecord};
    use std::time::Duration;

    fn not_done(kind: OperationKind) -> ReconcileError {
        ReconcileError::transient(
            OperationNotDone {
                record: ResumeRecord::new(kind, "disks", "disk-1", "rg", "tok"),
            },
            Duration::from_secs(15),
        )
    }

    #[test]
    fn put_status_transitions() {
        let mut conditions = Conditions::new();

        conditions.update_put_status("DisksReady", "disks", Some(&not_done(OperationKind::Create)));
        let c = conditions.get("DisksReady").unwrap();
        assert_eq!(c.status, ConditionStatus::False);
        assert_eq!(c.reason, Some(Reason::Creating));
        assert_eq!(c.severity, Some(Severity::Info));
        assert_eq!(c.message.as_deref(), Some("disks creating or updating"));

        let failed = ReconcileError::terminal(ProviderError::Other("quota exceeded".into()));
        conditions.update_put_status("DisksReady", "disks", Some(&failed));
        let c = conditions.get("DisksReady").unwrap();
        assert_eq!(c.reason, Some(Reason::Failed));
        assert_eq!(c.severity, Some(Severity::Error));
        assert_eq!(
            c.message.as_deref(),
            Some("disks failed to create or update. err: quota exceeded")
        );

        conditions.update_put_status("DisksReady", "disks", None);
        assert!(conditions.is_true("DisksReady"));
    }

    #[test]
    fn delete_status_transitions() {
        let mut conditions = Conditions::new();

        conditions.update_delete_status("DisksReady", "disks", Some(&not_done(OperationKind::Delete)));
        assert_eq!(
            conditions.get("DisksReady").unwrap().reason,
            Some(Reason::Deleting)
        );

        conditions.update_delete_status("DisksReady", "disks", None);
        let c = conditions.get("DisksReady").unwrap();
        assert_eq!(c.reason, Some(Reason::Deleted));
        assert_eq!(c.message.as_deref(), Some("disks successfully deleted"));

        let failed = ReconcileError::terminal(ProviderError::Other("locked".into()));
        conditions.update_delete_status("DisksReady", "disks", Some(&failed));
        assert_eq!(
            conditions.get("DisksReady").unwrap().reason,
            Some(Reason::DeletionFailed)
        );
    }

    #[test]
    fn transition_time_kept_while_status_unchanged() {
        let mut conditions = Conditions::new();
        conditions.update_put_status("DisksReady", "disks", Some(&not_done(OperationKind::Create)));
        let first = conditions.get("DisksReady").unwrap().last_transition_time;

        let failed = ReconcileError::terminal(ProviderError::Other("boom".into()));
        conditions.update_put_status("DisksReady", "disks", Some(&failed));
        assert_eq!(
            conditions.get("DisksReady").unwrap().last_transition_time,
            first
        );
    }
}
