use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, NoneAsEmptyString};
use uuid::Uuid;

pub use crate::lifecycle::EnrollmentStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Student,
    Instructor,
    Admin,
}

/// Admin review of an instructor account. Students and admins are always
/// `approved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum InstructorStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
    pub role: Role,
    pub is_active: bool,
    pub instructor_status: InstructorStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Course {
    pub id: Uuid,
    pub course_code: String,
    pub title: String,
    pub description: Option<String>,
    pub instructor_id: Uuid,
    pub max_students: i64,
    #[serde(skip_serializing, default)]
    pub enrollment_key_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Enrollment {
    pub id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub status: EnrollmentStatus,
    pub enrolled_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    /// Automatically computed; never holds the instructor's override.
    pub progress_percentage: f64,
    pub manual_progress_override: Option<f64>,
}

impl Enrollment {
    pub fn display_progress(&self) -> f64 {
        self.manual_progress_override.unwrap_or(self.progress_percentage)
    }
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Quiz {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub kind: String,
    pub related_id: Option<Uuid>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

// Joined rows for listings.

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct EnrollmentView {
    pub id: Uuid,
    pub student_id: Uuid,
    pub student_name: String,
    pub course_id: Uuid,
    pub course_code: String,
    pub course_title: String,
    pub status: EnrollmentStatus,
    pub enrolled_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub progress_percentage: f64,
    pub manual_progress_override: Option<f64>,
    pub display_progress: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrollmentStats {
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub blocked: usize,
}

impl EnrollmentStats {
    pub fn tally(rows: &[EnrollmentView]) -> Self {
        let mut stats = EnrollmentStats { total: rows.len(), ..Default::default() };
        for row in rows {
            match row.status {
                EnrollmentStatus::Pending => stats.pending += 1,
                EnrollmentStatus::Approved => stats.approved += 1,
                EnrollmentStatus::Rejected => stats.rejected += 1,
                EnrollmentStatus::Blocked => stats.blocked += 1,
            }
        }
        stats
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct InstructorEnrollments {
    pub enrollments: Vec<EnrollmentView>,
    pub stats: EnrollmentStats,
}

// --- requests ---

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateUserReq {
    pub username: String,
    pub full_name: String,
    pub role: Role,
}

/// Self-service sign-up of a gateway identity as a student or instructor.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RegisterReq {
    pub username: String,
    pub full_name: String,
    pub role: Role,
}

#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateCourseReq {
    pub course_code: String,
    pub title: String,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub description: Option<String>,
    pub max_students: Option<i64>,
    pub enrollment_key: String,
}

#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UpdateCourseReq {
    pub title: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub description: Option<String>,
    pub max_students: Option<i64>,
    /// Blank keeps the current key.
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub enrollment_key: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EnrollReq {
    pub course_code: String,
    pub enrollment_key: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateQuizReq {
    pub title: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SetActiveReq {
    pub is_active: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct SubmitQuizReq {
    pub content: Option<String>,
}

/// Progress form value: a number, a numeric string, or blank/null to clear.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ProgressReq {
    #[serde(default)]
    pub progress: serde_json::Value,
}
