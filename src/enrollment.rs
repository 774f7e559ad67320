//! Enrollment requests and the instructor-driven status transitions.
//!
//! Each operation validates against rows read from the pool, then performs a
//! single guarded write plus its notification row in one transaction. A
//! guarded write that touches nothing means another writer got there first;
//! the row is then re-read inside the transaction to report why.

use chrono::Utc;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::auth::Actor;
use crate::error::{EnrollmentError, Result};
use crate::lifecycle::{Action, Outcome};
use crate::models::{Enrollment, EnrollmentStats, EnrollmentView, InstructorEnrollments, Role};
use crate::notify::notification;
use crate::service::{conflict_as, Service};
use crate::store;

impl Service {
    /// Student asks to join the course identified by `course_code`.
    pub async fn request_enrollment(&self, actor: &Actor, course_code: &str, key: &str) -> Result<Enrollment> {
        if !actor.is(Role::Student) {
            return Err(EnrollmentError::AccessDenied);
        }
        let code = course_code.trim().to_uppercase();
        let key = key.trim();
        if code.is_empty() || key.is_empty() {
            return Err(EnrollmentError::invalid("Course code and enrollment key are required."));
        }

        let course = store::find_course_by_code(&self.db, &code)
            .await?
            .filter(|c| c.is_active)
            .ok_or(EnrollmentError::NotFound)?;

        if !self.keys.verify(&course.enrollment_key_hash, key) {
            return Err(EnrollmentError::InvalidKey);
        }
        if store::find_enrollment(&self.db, actor.id, course.id).await?.is_some() {
            return Err(EnrollmentError::AlreadyRequested);
        }

        let mut tx = self.db.begin().await?;
        let inserted = store::insert_enrollment(&mut *tx, actor.id, course.id, Utc::now())
            .await
            .map_err(|e| conflict_as(e, EnrollmentError::AlreadyRequested))?;
        let Some(enrollment) = inserted else {
            return Err(request_refused(&mut tx, course.id).await);
        };

        let notice = notification(
            course.instructor_id,
            "New Enrollment Request",
            format!(
                "{} has requested enrollment in \"{}\" ({}). Please review and approve.",
                actor.full_name, course.title, course.course_code
            ),
            "info",
            Some(course.id),
        );
        store::insert_notification(&mut *tx, &notice).await?;
        tx.commit().await?;

        tracing::info!(enrollment_id=%enrollment.id, student_id=%actor.id, course=%course.course_code, "enrollment requested");
        self.notifier.push(&notice).await;
        Ok(enrollment)
    }

    pub async fn approve(&self, actor: &Actor, enrollment_id: Uuid) -> Result<Enrollment> {
        self.transition_status(actor, enrollment_id, Action::Approve).await
    }

    pub async fn reject(&self, actor: &Actor, enrollment_id: Uuid) -> Result<Enrollment> {
        self.transition_status(actor, enrollment_id, Action::Reject).await
    }

    pub async fn block(&self, actor: &Actor, enrollment_id: Uuid) -> Result<Enrollment> {
        self.transition_status(actor, enrollment_id, Action::Block).await
    }

    pub async fn unblock(&self, actor: &Actor, enrollment_id: Uuid) -> Result<Enrollment> {
        self.transition_status(actor, enrollment_id, Action::Unblock).await
    }

    /// Hard-deletes an approved enrollment.
    pub async fn remove(&self, actor: &Actor, enrollment_id: Uuid) -> Result<()> {
        match self.transition(actor, enrollment_id, Action::Remove).await? {
            None => Ok(()),
            Some(_) => Err(EnrollmentError::AlreadyProcessed),
        }
    }

    async fn transition_status(&self, actor: &Actor, enrollment_id: Uuid, action: Action) -> Result<Enrollment> {
        self.transition(actor, enrollment_id, action)
            .await?
            .ok_or(EnrollmentError::NotFound)
    }

    /// Applies `action`; returns the updated row, or `None` once deleted.
    pub async fn transition(&self, actor: &Actor, enrollment_id: Uuid, action: Action) -> Result<Option<Enrollment>> {
        let enrollment = store::find_enrollment_by_id(&self.db, enrollment_id)
            .await?
            .ok_or(EnrollmentError::NotFound)?;
        let course = store::find_course(&self.db, enrollment.course_id)
            .await?
            .ok_or(EnrollmentError::NotFound)?;
        if !actor.manages(&course) {
            tracing::warn!(actor=%actor.id, course=%course.course_code, %action, "unauthorized enrollment transition");
            return Err(EnrollmentError::AccessDenied);
        }
        let outcome = enrollment
            .status
            .apply(action)
            .ok_or(EnrollmentError::AlreadyProcessed)?;
        if action.takes_seat() && store::count_approved(&self.db, course.id).await? >= course.max_students {
            return Err(EnrollmentError::CourseFull);
        }

        let mut tx = self.db.begin().await?;
        let touched = match outcome {
            Outcome::Status(to) => {
                let approved_at = (action == Action::Approve).then(Utc::now);
                store::update_status(&mut *tx, enrollment_id, action.source(), to, approved_at, action.takes_seat())
                    .await?
            }
            Outcome::Deleted => store::delete_enrollment(&mut *tx, enrollment_id, action.source()).await?,
        };
        if touched == 0 {
            return Err(lost_race(&mut tx, enrollment_id, action).await);
        }

        let (title, message, kind) = action.notice(&course.title);
        let notice = notification(enrollment.student_id, title, message, kind, Some(course.id));
        store::insert_notification(&mut *tx, &notice).await?;

        let updated = match outcome {
            Outcome::Status(_) => store::find_enrollment_by_id(&mut *tx, enrollment_id).await?,
            Outcome::Deleted => None,
        };
        tx.commit().await?;

        tracing::info!(
            %enrollment_id,
            %action,
            actor=%actor.id,
            from=%enrollment.status,
            to=%updated.as_ref().map(|e| e.status.as_str()).unwrap_or("deleted"),
            "enrollment transition"
        );
        self.notifier.push(&notice).await;
        Ok(updated)
    }

    pub async fn my_enrollments(&self, actor: &Actor) -> Result<Vec<EnrollmentView>> {
        Ok(store::enrollments_for_student(&self.db, actor.id).await?)
    }

    /// Enrollments across the actor's courses (every course for admins).
    pub async fn instructor_enrollments(&self, actor: &Actor) -> Result<InstructorEnrollments> {
        let scope = match actor.role {
            Role::Admin => None,
            Role::Instructor => Some(actor.id),
            Role::Student => return Err(EnrollmentError::AccessDenied),
        };
        let enrollments = store::enrollments_for_instructor(&self.db, scope).await?;
        let stats = EnrollmentStats::tally(&enrollments);
        Ok(InstructorEnrollments { enrollments, stats })
    }
}

/// Explains why the guarded enrollment insert added no row.
async fn request_refused(conn: &mut SqliteConnection, course_id: Uuid) -> EnrollmentError {
    match store::find_course(&mut *conn, course_id).await {
        Ok(Some(course)) if course.is_active => EnrollmentError::CourseFull,
        Ok(_) => EnrollmentError::NotFound,
        Err(e) => EnrollmentError::Storage(e),
    }
}

/// Explains why a guarded write matched no row.
async fn lost_race(conn: &mut SqliteConnection, enrollment_id: Uuid, action: Action) -> EnrollmentError {
    match store::find_enrollment_by_id(&mut *conn, enrollment_id).await {
        Ok(None) => EnrollmentError::NotFound,
        Ok(Some(e)) if e.status != action.source() => EnrollmentError::AlreadyProcessed,
        Ok(Some(_)) => EnrollmentError::CourseFull,
        Err(e) => EnrollmentError::Storage(e),
    }
}
