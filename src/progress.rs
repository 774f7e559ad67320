//! Course completion: the automatic quiz-based percentage and the
//! instructor's manual override.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::auth::Actor;
use crate::error::{EnrollmentError, Result};
use crate::lifecycle::EnrollmentStatus;
use crate::models::{Course, Enrollment, EnrollmentView, Role};
use crate::notify::notification;
use crate::service::Service;
use crate::store;

/// `100 * submitted / total`, or 0 for a course without quizzes.
pub fn automatic(total: i64, submitted: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    100.0 * submitted as f64 / total as f64
}

/// Interprets a progress form value.
///
/// `Ok(None)` means "clear the override" (null or blank). Numbers and numeric
/// strings must lie in [0, 100].
pub fn parse_input(raw: &serde_json::Value) -> Result<Option<f64>> {
    let value = match raw {
        serde_json::Value::Null => return Ok(None),
        serde_json::Value::String(s) if s.trim().is_empty() => return Ok(None),
        serde_json::Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| EnrollmentError::invalid("Invalid progress value"))?,
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| EnrollmentError::invalid("Invalid progress value"))?,
        _ => return Err(EnrollmentError::invalid("Invalid progress value")),
    };
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(EnrollmentError::invalid("Progress must be between 0 and 100"));
    }
    Ok(Some(value))
}

/// Recomputes and stores the automatic progress for one enrollment.
///
/// The stored value is refreshed even while an override is active.
pub(crate) async fn recompute(conn: &mut SqliteConnection, student_id: Uuid, course_id: Uuid) -> sqlx::Result<f64> {
    let total = store::count_quizzes(&mut *conn, course_id).await?;
    let submitted = if total == 0 {
        0
    } else {
        store::count_submitted(&mut *conn, student_id, course_id).await?
    };
    let value = automatic(total, submitted);
    store::set_progress(&mut *conn, student_id, course_id, value).await?;
    Ok(value)
}

/// Recomputes every enrollment of a course; used when its quiz set changes.
pub(crate) async fn recompute_course(conn: &mut SqliteConnection, course_id: Uuid) -> sqlx::Result<()> {
    let students: Vec<Uuid> = sqlx::query_scalar("SELECT student_id FROM enrollments WHERE course_id = ?")
        .bind(course_id)
        .fetch_all(&mut *conn)
        .await?;
    for student_id in students {
        recompute(&mut *conn, student_id, course_id).await?;
    }
    Ok(())
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub student_id: Uuid,
    pub progress_percentage: f64,
    pub manual_progress_override: Option<f64>,
    pub display_progress: f64,
}

impl From<&Enrollment> for ProgressUpdate {
    fn from(e: &Enrollment) -> Self {
        ProgressUpdate {
            student_id: e.student_id,
            progress_percentage: e.progress_percentage,
            manual_progress_override: e.manual_progress_override,
            display_progress: e.display_progress(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BulkProgress {
    pub progress: f64,
    pub students: usize,
}

impl Service {
    async fn managed_course(&self, actor: &Actor, course_id: Uuid) -> Result<Course> {
        let course = store::find_course(&self.db, course_id)
            .await?
            .ok_or(EnrollmentError::NotFound)?;
        if !actor.manages(&course) {
            return Err(EnrollmentError::AccessDenied);
        }
        Ok(course)
    }

    /// Sets (or with a blank value, clears) one student's override.
    pub async fn set_progress(
        &self,
        actor: &Actor,
        course_id: Uuid,
        student_id: Uuid,
        raw: &serde_json::Value,
    ) -> Result<ProgressUpdate> {
        let course = self.managed_course(actor, course_id).await?;
        let enrollment = store::find_enrollment(&self.db, student_id, course_id)
            .await?
            .ok_or(EnrollmentError::NotFound)?;
        let value = parse_input(raw)?;

        let mut tx = self.db.begin().await?;
        store::set_override(&mut *tx, enrollment.id, value).await?;
        let message = match value {
            Some(v) => format!("Your instructor has updated your progress in \"{}\" to {v:.0}%", course.title),
            None => {
                let automatic = recompute(&mut tx, student_id, course_id).await?;
                format!(
                    "Your progress in \"{}\" has been reset to automatic tracking ({automatic:.0}%)",
                    course.title
                )
            }
        };
        let notice = notification(student_id, "Progress Updated", message, "info", Some(course.id));
        store::insert_notification(&mut *tx, &notice).await?;
        let updated = store::find_enrollment_by_id(&mut *tx, enrollment.id)
            .await?
            .ok_or(EnrollmentError::NotFound)?;
        tx.commit().await?;

        tracing::info!(%course_id, %student_id, override_value=?value, "progress override changed");
        self.notifier.push(&notice).await;
        Ok(ProgressUpdate::from(&updated))
    }

    pub async fn clear_progress(&self, actor: &Actor, course_id: Uuid, student_id: Uuid) -> Result<ProgressUpdate> {
        self.set_progress(actor, course_id, student_id, &serde_json::Value::Null).await
    }

    /// Applies the same override to every approved student of a course.
    pub async fn set_progress_bulk(&self, actor: &Actor, course_id: Uuid, raw: &serde_json::Value) -> Result<BulkProgress> {
        let course = self.managed_course(actor, course_id).await?;
        let value = parse_input(raw)?.ok_or_else(|| EnrollmentError::invalid("Please enter a progress value"))?;

        let mut tx = self.db.begin().await?;
        let students = store::set_override_for_approved(&mut *tx, course_id, value).await?;
        let mut notices = Vec::with_capacity(students.len());
        for student_id in &students {
            let notice = notification(
                *student_id,
                "Progress Updated",
                format!("Your instructor has updated your progress in \"{}\" to {value:.0}%", course.title),
                "info",
                Some(course.id),
            );
            store::insert_notification(&mut *tx, &notice).await?;
            notices.push(notice);
        }
        tx.commit().await?;

        tracing::info!(%course_id, students = students.len(), progress = value, "bulk progress override");
        self.notifier.push_all(&notices).await;
        Ok(BulkProgress { progress: value, students: students.len() })
    }

    /// Approved and blocked students of a course with their progress.
    pub async fn course_students(&self, actor: &Actor, course_id: Uuid) -> Result<Vec<EnrollmentView>> {
        self.managed_course(actor, course_id).await?;
        Ok(store::course_students(&self.db, course_id).await?)
    }

    /// Records (or replaces) a quiz submission and returns the display progress.
    pub async fn submit_quiz(&self, actor: &Actor, quiz_id: Uuid, content: Option<&str>) -> Result<f64> {
        if !actor.is(Role::Student) {
            return Err(EnrollmentError::AccessDenied);
        }
        let quiz = store::find_quiz(&self.db, quiz_id)
            .await?
            .filter(|q| q.is_active)
            .ok_or(EnrollmentError::NotFound)?;
        let enrollment = store::find_enrollment(&self.db, actor.id, quiz.course_id).await?;
        if !matches!(&enrollment, Some(e) if e.status == EnrollmentStatus::Approved) {
            return Err(EnrollmentError::AccessDenied);
        }

        let mut tx = self.db.begin().await?;
        store::upsert_submission(&mut *tx, quiz.id, actor.id, content, Utc::now()).await?;
        let automatic = recompute(&mut tx, actor.id, quiz.course_id).await?;
        let current = store::find_enrollment(&mut *tx, actor.id, quiz.course_id)
            .await?
            .ok_or(EnrollmentError::NotFound)?;
        tx.commit().await?;

        tracing::info!(%quiz_id, student_id=%actor.id, progress = automatic, "quiz submitted");
        Ok(current.display_progress())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testing;
    use serde_json::json;

    #[test]
    fn automatic_is_a_plain_ratio() {
        assert_eq!(automatic(0, 0), 0.0);
        assert_eq!(automatic(4, 2), 50.0);
        assert_eq!(automatic(3, 3), 100.0);
        assert!((automatic(3, 1) - 33.333_333).abs() < 1e-5);
    }

    #[test]
    fn input_parsing() {
        assert_eq!(parse_input(&json!(null)).unwrap(), None);
        assert_eq!(parse_input(&json!("  ")).unwrap(), None);
        assert_eq!(parse_input(&json!("90")).unwrap(), Some(90.0));
        assert_eq!(parse_input(&json!(12.5)).unwrap(), Some(12.5));
        assert_eq!(parse_input(&json!(0)).unwrap(), Some(0.0));
        assert_eq!(parse_input(&json!(100)).unwrap(), Some(100.0));
        for bad in [json!("ninety"), json!(-1), json!(100.5), json!("NaN"), json!(true), json!([1])] {
            assert!(matches!(parse_input(&bad), Err(EnrollmentError::InvalidArgument(_))), "{bad}");
        }
    }

    #[tokio::test]
    async fn override_scenario() {
        let svc = testing::service().await;
        let instructor = testing::user(&svc, Role::Instructor, "instructor").await;
        let course = testing::course(&svc, &instructor, "CS101", 10).await;
        let mut quizzes = Vec::new();
        for i in 0..4 {
            quizzes.push(testing::quiz(&svc, &instructor, &course, &format!("Quiz {i}")).await);
        }
        let student = testing::approved_student(&svc, &instructor, &course, "alice").await;

        svc.submit_quiz(&student, quizzes[0].id, Some("a")).await.unwrap();
        let shown = svc.submit_quiz(&student, quizzes[1].id, None).await.unwrap();
        assert_eq!(shown, 50.0);

        let update = svc.set_progress(&instructor, course.id, student.id, &json!("90")).await.unwrap();
        assert_eq!(update.display_progress, 90.0);
        assert_eq!(update.progress_percentage, 50.0);

        let shown = svc.submit_quiz(&student, quizzes[2].id, None).await.unwrap();
        assert_eq!(shown, 90.0);
        let e = store::find_enrollment(&svc.db, student.id, course.id).await.unwrap().unwrap();
        assert_eq!(e.progress_percentage, 75.0);
        assert_eq!(e.manual_progress_override, Some(90.0));

        let cleared = svc.clear_progress(&instructor, course.id, student.id).await.unwrap();
        assert_eq!(cleared.manual_progress_override, None);
        assert_eq!(cleared.display_progress, 75.0);

        let inbox = testing::notifications_for(&svc, student.id).await;
        assert!(inbox[0].message.contains("automatic tracking (75%)"), "{}", inbox[0].message);
    }

    #[tokio::test]
    async fn resubmission_counts_once() {
        let svc = testing::service().await;
        let instructor = testing::user(&svc, Role::Instructor, "instructor").await;
        let course = testing::course(&svc, &instructor, "CS101", 10).await;
        let q1 = testing::quiz(&svc, &instructor, &course, "one").await;
        testing::quiz(&svc, &instructor, &course, "two").await;
        let student = testing::approved_student(&svc, &instructor, &course, "alice").await;

        assert_eq!(svc.submit_quiz(&student, q1.id, Some("first")).await.unwrap(), 50.0);
        assert_eq!(svc.submit_quiz(&student, q1.id, Some("second")).await.unwrap(), 50.0);
    }

    #[tokio::test]
    async fn recompute_is_idempotent() {
        let svc = testing::service().await;
        let instructor = testing::user(&svc, Role::Instructor, "instructor").await;
        let course = testing::course(&svc, &instructor, "CS101", 10).await;
        let q = testing::quiz(&svc, &instructor, &course, "one").await;
        testing::quiz(&svc, &instructor, &course, "two").await;
        testing::quiz(&svc, &instructor, &course, "three").await;
        let student = testing::approved_student(&svc, &instructor, &course, "alice").await;
        svc.submit_quiz(&student, q.id, None).await.unwrap();

        let mut conn = svc.db.acquire().await.unwrap();
        let first = recompute(&mut conn, student.id, course.id).await.unwrap();
        let stored = store::find_enrollment(&mut *conn, student.id, course.id).await.unwrap().unwrap();
        let second = recompute(&mut conn, student.id, course.id).await.unwrap();
        let again = store::find_enrollment(&mut *conn, student.id, course.id).await.unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(stored.progress_percentage, again.progress_percentage);
        assert!((first - 100.0 / 3.0).abs() < 1e-9, "stored unrounded: {first}");
    }

    #[tokio::test]
    async fn course_without_quizzes_is_zero() {
        let svc = testing::service().await;
        let instructor = testing::user(&svc, Role::Instructor, "instructor").await;
        let course = testing::course(&svc, &instructor, "CS101", 10).await;
        let student = testing::approved_student(&svc, &instructor, &course, "alice").await;

        let mut conn = svc.db.acquire().await.unwrap();
        assert_eq!(recompute(&mut conn, student.id, course.id).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn quiz_set_changes_refresh_progress() {
        let svc = testing::service().await;
        let instructor = testing::user(&svc, Role::Instructor, "instructor").await;
        let course = testing::course(&svc, &instructor, "CS101", 10).await;
        let q1 = testing::quiz(&svc, &instructor, &course, "one").await;
        let student = testing::approved_student(&svc, &instructor, &course, "alice").await;
        assert_eq!(svc.submit_quiz(&student, q1.id, None).await.unwrap(), 100.0);

        let q2 = testing::quiz(&svc, &instructor, &course, "two").await;
        let e = store::find_enrollment(&svc.db, student.id, course.id).await.unwrap().unwrap();
        assert_eq!(e.progress_percentage, 50.0);

        svc.set_quiz_active(&instructor, q2.id, false).await.unwrap();
        let e = store::find_enrollment(&svc.db, student.id, course.id).await.unwrap().unwrap();
        assert_eq!(e.progress_percentage, 100.0);

        let err = svc.submit_quiz(&student, q2.id, None).await.unwrap_err();
        assert!(matches!(err, EnrollmentError::NotFound));
    }

    #[tokio::test]
    async fn invalid_override_changes_nothing() {
        let svc = testing::service().await;
        let instructor = testing::user(&svc, Role::Instructor, "instructor").await;
        let course = testing::course(&svc, &instructor, "CS101", 10).await;
        let student = testing::approved_student(&svc, &instructor, &course, "alice").await;
        let before = store::find_enrollment(&svc.db, student.id, course.id).await.unwrap();
        let inbox_before = testing::notifications_for(&svc, student.id).await.len();

        for bad in [json!("abc"), json!(101), json!(-0.5)] {
            let err = svc.set_progress(&instructor, course.id, student.id, &bad).await.unwrap_err();
            assert!(matches!(err, EnrollmentError::InvalidArgument(_)));
        }
        let err = svc.set_progress_bulk(&instructor, course.id, &json!("")).await.unwrap_err();
        assert!(matches!(err, EnrollmentError::InvalidArgument(_)));

        assert_eq!(store::find_enrollment(&svc.db, student.id, course.id).await.unwrap(), before);
        assert_eq!(testing::notifications_for(&svc, student.id).await.len(), inbox_before);
    }

    #[tokio::test]
    async fn setting_is_idempotent_but_always_notifies() {
        let svc = testing::service().await;
        let instructor = testing::user(&svc, Role::Instructor, "instructor").await;
        let course = testing::course(&svc, &instructor, "CS101", 10).await;
        let student = testing::approved_student(&svc, &instructor, &course, "alice").await;
        let inbox_before = testing::notifications_for(&svc, student.id).await.len();

        let first = svc.set_progress(&instructor, course.id, student.id, &json!(40)).await.unwrap();
        let second = svc.set_progress(&instructor, course.id, student.id, &json!(40)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(testing::notifications_for(&svc, student.id).await.len(), inbox_before + 2);
    }

    #[tokio::test]
    async fn bulk_override_targets_approved_students() {
        let svc = testing::service().await;
        let instructor = testing::user(&svc, Role::Instructor, "instructor").await;
        let course = testing::course(&svc, &instructor, "CS101", 10).await;
        let a = testing::approved_student(&svc, &instructor, &course, "a").await;
        let b = testing::approved_student(&svc, &instructor, &course, "b").await;
        let pending = testing::user(&svc, Role::Student, "p").await;
        svc.request_enrollment(&pending, "CS101", testing::KEY).await.unwrap();

        let res = svc.set_progress_bulk(&instructor, course.id, &json!("80")).await.unwrap();
        assert_eq!(res, BulkProgress { progress: 80.0, students: 2 });

        for s in [&a, &b] {
            let e = store::find_enrollment(&svc.db, s.id, course.id).await.unwrap().unwrap();
            assert_eq!(e.display_progress(), 80.0);
            assert_eq!(e.progress_percentage, 0.0);
        }
        let p = store::find_enrollment(&svc.db, pending.id, course.id).await.unwrap().unwrap();
        assert_eq!(p.manual_progress_override, None);

        let students = svc.course_students(&instructor, course.id).await.unwrap();
        assert_eq!(students.len(), 2);
        assert!(students.iter().all(|s| s.display_progress == 80.0));
    }

    #[tokio::test]
    async fn progress_is_owner_only() {
        let svc = testing::service().await;
        let instructor = testing::user(&svc, Role::Instructor, "instructor").await;
        let other = testing::user(&svc, Role::Instructor, "other").await;
        let course = testing::course(&svc, &instructor, "CS101", 10).await;
        let student = testing::approved_student(&svc, &instructor, &course, "alice").await;

        let err = svc.set_progress(&other, course.id, student.id, &json!(10)).await.unwrap_err();
        assert!(matches!(err, EnrollmentError::AccessDenied));
        let err = svc.set_progress_bulk(&other, course.id, &json!(10)).await.unwrap_err();
        assert!(matches!(err, EnrollmentError::AccessDenied));
        let err = svc.course_students(&student, course.id).await.unwrap_err();
        assert!(matches!(err, EnrollmentError::AccessDenied));
    }

    #[tokio::test]
    async fn only_approved_students_submit() {
        let svc = testing::service().await;
        let instructor = testing::user(&svc, Role::Instructor, "instructor").await;
        let course = testing::course(&svc, &instructor, "CS101", 10).await;
        let q = testing::quiz(&svc, &instructor, &course, "one").await;
        let student = testing::approved_student(&svc, &instructor, &course, "alice").await;
        let outsider = testing::user(&svc, Role::Student, "bob").await;

        let err = svc.submit_quiz(&outsider, q.id, None).await.unwrap_err();
        assert!(matches!(err, EnrollmentError::AccessDenied));

        let e = store::find_enrollment(&svc.db, student.id, course.id).await.unwrap().unwrap();
        svc.block(&instructor, e.id).await.unwrap();
        let err = svc.submit_quiz(&student, q.id, None).await.unwrap_err();
        assert!(matches!(err, EnrollmentError::AccessDenied));
    }
}
