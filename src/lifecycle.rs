// Enrollment state machine: statuses, instructor actions and the transition table.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    Pending,
    Approved,
    Rejected,
    Blocked,
}

impl EnrollmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EnrollmentStatus::Pending => "pending",
            EnrollmentStatus::Approved => "approved",
            EnrollmentStatus::Rejected => "rejected",
            EnrollmentStatus::Blocked => "blocked",
        }
    }

    /// Where `action` takes an enrollment in this status, if anywhere.
    pub fn apply(self, action: Action) -> Option<Outcome> {
        use EnrollmentStatus::*;
        match (self, action) {
            (Pending, Action::Approve) => Some(Outcome::Status(Approved)),
            (Pending, Action::Reject) => Some(Outcome::Status(Rejected)),
            (Approved, Action::Block) => Some(Outcome::Status(Blocked)),
            (Blocked, Action::Unblock) => Some(Outcome::Status(Approved)),
            (Approved, Action::Remove) => Some(Outcome::Deleted),
            _ => None,
        }
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Approve,
    Reject,
    Block,
    Unblock,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Status(EnrollmentStatus),
    Deleted,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Approve,
        Action::Reject,
        Action::Block,
        Action::Unblock,
        Action::Remove,
    ];

    /// The only status this action may be applied to.
    pub fn source(self) -> EnrollmentStatus {
        match self {
            Action::Approve | Action::Reject => EnrollmentStatus::Pending,
            Action::Block | Action::Remove => EnrollmentStatus::Approved,
            Action::Unblock => EnrollmentStatus::Blocked,
        }
    }

    /// True when the transition adds a seat to the course's approved count.
    pub fn takes_seat(self) -> bool {
        matches!(self, Action::Approve | Action::Unblock)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Approve => "approve",
            Action::Reject => "reject",
            Action::Block => "block",
            Action::Unblock => "unblock",
            Action::Remove => "remove",
        }
    }

    /// Title, message and kind of the notification sent to the student.
    pub fn notice(self, course_title: &str) -> (&'static str, String, &'static str) {
        match self {
            Action::Approve => (
                "Enrollment Approved",
                format!(
                    "Great news! Your enrollment in \"{course_title}\" has been approved. You now have full access to the course."
                ),
                "success",
            ),
            Action::Reject => (
                "Enrollment Not Approved",
                format!(
                    "Your enrollment request for \"{course_title}\" was not approved. Please contact the instructor for more information."
                ),
                "warning",
            ),
            Action::Block => (
                "Course Access Blocked",
                format!("Your access to \"{course_title}\" has been blocked by the instructor."),
                "warning",
            ),
            Action::Unblock => (
                "Course Access Restored",
                format!("Your access to \"{course_title}\" has been restored by the instructor."),
                "success",
            ),
            Action::Remove => (
                "Removed From Course",
                format!("You have been removed from \"{course_title}\" by the instructor."),
                "warning",
            ),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
