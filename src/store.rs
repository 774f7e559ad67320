//! SQL access for users, courses, enrollments, quizzes and notifications.
//!
//! Every function takes any SQLite executor, so the caller decides whether it
//! runs on the pool or inside an open transaction. Writes that guard an
//! invariant (status compare-and-set, course capacity) do so in the statement
//! itself and report how many rows they touched.

use chrono::{DateTime, Utc};
use sqlx::{query, query_as, query_scalar, Executor, Sqlite};
use uuid::Uuid;

use crate::lifecycle::EnrollmentStatus;
use crate::models::{Course, Enrollment, EnrollmentView, InstructorStatus, Notification, Quiz, User};

// --- users ---

pub async fn insert_user<'e, E>(ex: E, user: &User) -> sqlx::Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    query(
        r#"
        INSERT INTO users (id, username, full_name, role, is_active, instructor_status, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user.id)
    .bind(&user.username)
    .bind(&user.full_name)
    .bind(user.role)
    .bind(user.is_active)
    .bind(user.instructor_status)
    .bind(user.created_at)
    .execute(ex)
    .await?;
    Ok(())
}

pub async fn find_user<'e, E>(ex: E, id: Uuid) -> sqlx::Result<Option<User>>
where
    E: Executor<'e, Database = Sqlite>,
{
    query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(ex)
        .await
}

pub async fn find_user_by_username<'e, E>(ex: E, username: &str) -> sqlx::Result<Option<User>>
where
    E: Executor<'e, Database = Sqlite>,
{
    query_as::<_, User>("SELECT * FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(ex)
        .await
}

pub async fn delete_user<'e, E>(ex: E, id: Uuid) -> sqlx::Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let res = query("DELETE FROM users WHERE id = ?").bind(id).execute(ex).await?;
    Ok(res.rows_affected())
}

pub async fn set_user_active<'e, E>(ex: E, id: Uuid, active: bool) -> sqlx::Result<Option<User>>
where
    E: Executor<'e, Database = Sqlite>,
{
    query_as::<_, User>("UPDATE users SET is_active = ? WHERE id = ? RETURNING *")
        .bind(active)
        .bind(id)
        .fetch_optional(ex)
        .await
}

/// Settles a pending instructor account; `None` if there is no such pending
/// instructor.
pub async fn review_instructor<'e, E>(ex: E, id: Uuid, to: InstructorStatus) -> sqlx::Result<Option<User>>
where
    E: Executor<'e, Database = Sqlite>,
{
    query_as::<_, User>(
        r#"
        UPDATE users SET instructor_status = ?
        WHERE id = ? AND role = 'instructor' AND instructor_status = 'pending'
        RETURNING *
        "#,
    )
    .bind(to)
    .bind(id)
    .fetch_optional(ex)
    .await
}

// --- courses ---

pub async fn insert_course<'e, E>(ex: E, course: &Course) -> sqlx::Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    query(
        r#"
        INSERT INTO courses (id, course_code, title, description, instructor_id,
                             max_students, enrollment_key_hash, is_active, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(course.id)
    .bind(&course.course_code)
    .bind(&course.title)
    .bind(&course.description)
    .bind(course.instructor_id)
    .bind(course.max_students)
    .bind(&course.enrollment_key_hash)
    .bind(course.is_active)
    .bind(course.created_at)
    .execute(ex)
    .await?;
    Ok(())
}

/// Columns to change on a course; `None` keeps the stored value.
#[derive(Debug, Default)]
pub struct CourseChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub max_students: Option<i64>,
    pub enrollment_key_hash: Option<String>,
    pub is_active: Option<bool>,
}

/// Writes only the supplied columns, so concurrent updates of different
/// fields never undo each other.
pub async fn update_course<'e, E>(ex: E, id: Uuid, changes: &CourseChanges) -> sqlx::Result<Option<Course>>
where
    E: Executor<'e, Database = Sqlite>,
{
    query_as::<_, Course>(
        r#"
        UPDATE courses
        SET title = COALESCE(?, title),
            description = COALESCE(?, description),
            max_students = COALESCE(?, max_students),
            enrollment_key_hash = COALESCE(?, enrollment_key_hash),
            is_active = COALESCE(?, is_active)
        WHERE id = ?
        RETURNING *
        "#,
    )
    .bind(&changes.title)
    .bind(&changes.description)
    .bind(changes.max_students)
    .bind(&changes.enrollment_key_hash)
    .bind(changes.is_active)
    .bind(id)
    .fetch_optional(ex)
    .await
}

pub async fn find_course<'e, E>(ex: E, id: Uuid) -> sqlx::Result<Option<Course>>
where
    E: Executor<'e, Database = Sqlite>,
{
    query_as::<_, Course>("SELECT * FROM courses WHERE id = ?")
        .bind(id)
        .fetch_optional(ex)
        .await
}

pub async fn find_course_by_code<'e, E>(ex: E, code: &str) -> sqlx::Result<Option<Course>>
where
    E: Executor<'e, Database = Sqlite>,
{
    query_as::<_, Course>("SELECT * FROM courses WHERE course_code = ?")
        .bind(code)
        .fetch_optional(ex)
        .await
}

pub async fn delete_course<'e, E>(ex: E, id: Uuid) -> sqlx::Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let res = query("DELETE FROM courses WHERE id = ?").bind(id).execute(ex).await?;
    Ok(res.rows_affected())
}

// --- enrollments ---

pub async fn find_enrollment<'e, E>(
    ex: E,
    student_id: Uuid,
    course_id: Uuid,
) -> sqlx::Result<Option<Enrollment>>
where
    E: Executor<'e, Database = Sqlite>,
{
    query_as::<_, Enrollment>("SELECT * FROM enrollments WHERE student_id = ? AND course_id = ?")
        .bind(student_id)
        .bind(course_id)
        .fetch_optional(ex)
        .await
}

pub async fn find_enrollment_by_id<'e, E>(ex: E, id: Uuid) -> sqlx::Result<Option<Enrollment>>
where
    E: Executor<'e, Database = Sqlite>,
{
    query_as::<_, Enrollment>("SELECT * FROM enrollments WHERE id = ?")
        .bind(id)
        .fetch_optional(ex)
        .await
}

/// Creates a `pending` enrollment unless the course is gone, inactive or has
/// all approved seats taken, in which case nothing is inserted and `None` is
/// returned.
///
/// A second row for the same (student, course) fails with a unique violation.
pub async fn insert_enrollment<'e, E>(
    ex: E,
    student_id: Uuid,
    course_id: Uuid,
    now: DateTime<Utc>,
) -> sqlx::Result<Option<Enrollment>>
where
    E: Executor<'e, Database = Sqlite>,
{
    query_as::<_, Enrollment>(
        r#"
        INSERT INTO enrollments (id, student_id, course_id, status, enrolled_at, progress_percentage)
        SELECT ?, ?, c.id, 'pending', ?, 0
        FROM courses c
        WHERE c.id = ? AND c.is_active = 1
          AND (SELECT COUNT(*) FROM enrollments e
               WHERE e.course_id = c.id AND e.status = 'approved') < c.max_students
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(student_id)
    .bind(now)
    .bind(course_id)
    .fetch_optional(ex)
    .await
}

/// Moves an enrollment from `from` to `to` if it is still in `from`.
///
/// `approved_at` is only written when given. With `within_capacity` the update
/// also requires a free approved seat in the enrollment's course.
pub async fn update_status<'e, E>(
    ex: E,
    id: Uuid,
    from: EnrollmentStatus,
    to: EnrollmentStatus,
    approved_at: Option<DateTime<Utc>>,
    within_capacity: bool,
) -> sqlx::Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = if within_capacity {
        r#"
        UPDATE enrollments
        SET status = ?, approved_at = COALESCE(?, approved_at)
        WHERE id = ? AND status = ?
          AND (SELECT COUNT(*) FROM enrollments e
               WHERE e.course_id = enrollments.course_id AND e.status = 'approved')
              < (SELECT c.max_students FROM courses c WHERE c.id = enrollments.course_id)
        "#
    } else {
        r#"
        UPDATE enrollments
        SET status = ?, approved_at = COALESCE(?, approved_at)
        WHERE id = ? AND status = ?
        "#
    };
    let res = query(sql)
        .bind(to)
        .bind(approved_at)
        .bind(id)
        .bind(from)
        .execute(ex)
        .await?;
    Ok(res.rows_affected())
}

/// Hard delete, only while the enrollment is still in `expected`.
pub async fn delete_enrollment<'e, E>(ex: E, id: Uuid, expected: EnrollmentStatus) -> sqlx::Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let res = query("DELETE FROM enrollments WHERE id = ? AND status = ?")
        .bind(id)
        .bind(expected)
        .execute(ex)
        .await?;
    Ok(res.rows_affected())
}

pub async fn count_approved<'e, E>(ex: E, course_id: Uuid) -> sqlx::Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    query_scalar("SELECT COUNT(*) FROM enrollments WHERE course_id = ? AND status = 'approved'")
        .bind(course_id)
        .fetch_one(ex)
        .await
}

pub async fn set_progress<'e, E>(ex: E, student_id: Uuid, course_id: Uuid, value: f64) -> sqlx::Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let res = query("UPDATE enrollments SET progress_percentage = ? WHERE student_id = ? AND course_id = ?")
        .bind(value)
        .bind(student_id)
        .bind(course_id)
        .execute(ex)
        .await?;
    Ok(res.rows_affected())
}

pub async fn set_override<'e, E>(ex: E, enrollment_id: Uuid, value: Option<f64>) -> sqlx::Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let res = query("UPDATE enrollments SET manual_progress_override = ? WHERE id = ?")
        .bind(value)
        .bind(enrollment_id)
        .execute(ex)
        .await?;
    Ok(res.rows_affected())
}

/// Sets the override on every approved enrollment of a course and returns
/// the affected students.
pub async fn set_override_for_approved<'e, E>(ex: E, course_id: Uuid, value: f64) -> sqlx::Result<Vec<Uuid>>
where
    E: Executor<'e, Database = Sqlite>,
{
    query_scalar(
        r#"
        UPDATE enrollments SET manual_progress_override = ?
        WHERE course_id = ? AND status = 'approved'
        RETURNING student_id
        "#,
    )
    .bind(value)
    .bind(course_id)
    .fetch_all(ex)
    .await
}

const VIEW_SELECT: &str = r#"
    SELECT e.id, e.student_id, u.full_name AS student_name,
           e.course_id, c.course_code, c.title AS course_title,
           e.status, e.enrolled_at, e.approved_at,
           e.progress_percentage, e.manual_progress_override,
           COALESCE(e.manual_progress_override, e.progress_percentage) AS display_progress
    FROM enrollments e
    JOIN courses c ON c.id = e.course_id
    JOIN users u ON u.id = e.student_id
"#;

pub async fn enrollments_for_student<'e, E>(ex: E, student_id: Uuid) -> sqlx::Result<Vec<EnrollmentView>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        r#"{VIEW_SELECT}
        WHERE e.student_id = ?
        ORDER BY CASE e.status
                     WHEN 'pending' THEN 1
                     WHEN 'approved' THEN 2
                     WHEN 'blocked' THEN 3
                     ELSE 4
                 END,
                 e.enrolled_at DESC"#
    );
    query_as::<_, EnrollmentView>(&sql).bind(student_id).fetch_all(ex).await
}

/// Enrollments across an instructor's courses; `None` lists every course.
pub async fn enrollments_for_instructor<'e, E>(
    ex: E,
    instructor_id: Option<Uuid>,
) -> sqlx::Result<Vec<EnrollmentView>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        r#"{VIEW_SELECT}
        WHERE (? IS NULL OR c.instructor_id = ?)
        ORDER BY CASE e.status WHEN 'pending' THEN 1 ELSE 2 END, e.enrolled_at DESC"#
    );
    query_as::<_, EnrollmentView>(&sql)
        .bind(instructor_id)
        .bind(instructor_id)
        .fetch_all(ex)
        .await
}

pub async fn course_students<'e, E>(ex: E, course_id: Uuid) -> sqlx::Result<Vec<EnrollmentView>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        r#"{VIEW_SELECT}
        WHERE e.course_id = ? AND e.status IN ('approved', 'blocked')
        ORDER BY u.full_name"#
    );
    query_as::<_, EnrollmentView>(&sql).bind(course_id).fetch_all(ex).await
}

// --- quizzes ---

pub async fn insert_quiz<'e, E>(ex: E, quiz: &Quiz) -> sqlx::Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    query("INSERT INTO quizzes (id, course_id, title, is_active, created_at) VALUES (?, ?, ?, ?, ?)")
        .bind(quiz.id)
        .bind(quiz.course_id)
        .bind(&quiz.title)
        .bind(quiz.is_active)
        .bind(quiz.created_at)
        .execute(ex)
        .await?;
    Ok(())
}

pub async fn find_quiz<'e, E>(ex: E, id: Uuid) -> sqlx::Result<Option<Quiz>>
where
    E: Executor<'e, Database = Sqlite>,
{
    query_as::<_, Quiz>("SELECT * FROM quizzes WHERE id = ?")
        .bind(id)
        .fetch_optional(ex)
        .await
}

pub async fn set_quiz_active<'e, E>(ex: E, id: Uuid, active: bool) -> sqlx::Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let res = query("UPDATE quizzes SET is_active = ? WHERE id = ?")
        .bind(active)
        .bind(id)
        .execute(ex)
        .await?;
    Ok(res.rows_affected())
}

pub async fn count_quizzes<'e, E>(ex: E, course_id: Uuid) -> sqlx::Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    query_scalar("SELECT COUNT(*) FROM quizzes WHERE course_id = ? AND is_active = 1")
        .bind(course_id)
        .fetch_one(ex)
        .await
}

/// Distinct active quizzes of the course the student has a submission for.
pub async fn count_submitted<'e, E>(ex: E, student_id: Uuid, course_id: Uuid) -> sqlx::Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    query_scalar(
        r#"
        SELECT COUNT(DISTINCT q.id)
        FROM quizzes q
        JOIN quiz_submissions s ON s.quiz_id = q.id
        WHERE q.course_id = ? AND q.is_active = 1 AND s.student_id = ?
        "#,
    )
    .bind(course_id)
    .bind(student_id)
    .fetch_one(ex)
    .await
}

/// One submission per (quiz, student); resubmitting replaces it.
pub async fn upsert_submission<'e, E>(
    ex: E,
    quiz_id: Uuid,
    student_id: Uuid,
    content: Option<&str>,
    now: DateTime<Utc>,
) -> sqlx::Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    query(
        r#"
        INSERT INTO quiz_submissions (id, quiz_id, student_id, content, submitted_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT (quiz_id, student_id)
        DO UPDATE SET content = excluded.content, submitted_at = excluded.submitted_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(quiz_id)
    .bind(student_id)
    .bind(content)
    .bind(now)
    .execute(ex)
    .await?;
    Ok(())
}

// --- notifications ---

pub async fn insert_notification<'e, E>(ex: E, n: &Notification) -> sqlx::Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    query(
        r#"
        INSERT INTO notifications (id, user_id, title, message, kind, related_id, is_read, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(n.id)
    .bind(n.user_id)
    .bind(&n.title)
    .bind(&n.message)
    .bind(&n.kind)
    .bind(n.related_id)
    .bind(n.is_read)
    .bind(n.created_at)
    .execute(ex)
    .await?;
    Ok(())
}

pub async fn list_notifications<'e, E>(ex: E, user_id: Uuid) -> sqlx::Result<Vec<Notification>>
where
    E: Executor<'e, Database = Sqlite>,
{
    query_as::<_, Notification>(
        "SELECT * FROM notifications WHERE user_id = ? ORDER BY created_at DESC, rowid DESC",
    )
    .bind(user_id)
    .fetch_all(ex)
    .await
}

pub async fn unread_count<'e, E>(ex: E, user_id: Uuid) -> sqlx::Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = 0")
        .bind(user_id)
        .fetch_one(ex)
        .await
}

pub async fn mark_read<'e, E>(ex: E, id: Uuid, user_id: Uuid) -> sqlx::Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let res = query("UPDATE notifications SET is_read = 1 WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(user_id)
        .execute(ex)
        .await?;
    Ok(res.rows_affected())
}
