//! Course, quiz, user and notification management around the enrollment core.

use chrono::Utc;
use uuid::Uuid;

use crate::auth::Actor;
use crate::error::{EnrollmentError, Result};
use crate::models::{
    Course, CreateCourseReq, CreateUserReq, InstructorStatus, Notification, Quiz, RegisterReq, Role, UpdateCourseReq,
    User,
};
use crate::notify::notification;
use crate::progress::recompute_course;
use crate::service::{conflict_as, Service};
use crate::store::{self, CourseChanges};

const DEFAULT_MAX_STUDENTS: i64 = 50;

impl Service {
    fn check_key(&self, key: &str) -> Result<()> {
        if key.chars().count() < self.min_key_len {
            return Err(EnrollmentError::invalid(format!(
                "Enrollment key must be at least {} characters long.",
                self.min_key_len
            )));
        }
        Ok(())
    }

    pub async fn create_course(&self, actor: &Actor, req: CreateCourseReq) -> Result<Course> {
        if !actor.can_teach() {
            return Err(EnrollmentError::AccessDenied);
        }
        let code = req.course_code.trim().to_uppercase();
        let title = req.title.trim();
        let key = req.enrollment_key.trim();
        if code.is_empty() {
            return Err(EnrollmentError::invalid("Course Code is required."));
        }
        if title.is_empty() {
            return Err(EnrollmentError::invalid("Course Title is required."));
        }
        let max_students = req.max_students.unwrap_or(DEFAULT_MAX_STUDENTS);
        if max_students < 1 {
            return Err(EnrollmentError::invalid("Maximum students must be at least 1."));
        }
        self.check_key(key)?;

        let course = Course {
            id: Uuid::new_v4(),
            course_code: code,
            title: title.to_string(),
            description: req.description.map(|d| d.trim().to_string()).filter(|d| !d.is_empty()),
            instructor_id: actor.id,
            max_students,
            enrollment_key_hash: self.keys.hash(key)?,
            is_active: true,
            created_at: Utc::now(),
        };
        store::insert_course(&self.db, &course).await.map_err(|e| {
            conflict_as(e, EnrollmentError::invalid("Course code already exists. Please choose a different one."))
        })?;

        tracing::info!(course_id=%course.id, code=%course.course_code, instructor=%actor.id, "course created");
        Ok(course)
    }

    pub async fn update_course(&self, actor: &Actor, course_id: Uuid, req: UpdateCourseReq) -> Result<Course> {
        let course = store::find_course(&self.db, course_id)
            .await?
            .ok_or(EnrollmentError::NotFound)?;
        if !actor.manages(&course) {
            return Err(EnrollmentError::AccessDenied);
        }

        let mut changes = CourseChanges {
            description: req.description.map(|d| d.trim().to_string()).filter(|d| !d.is_empty()),
            is_active: req.is_active,
            ..Default::default()
        };
        if let Some(title) = req.title {
            let title = title.trim();
            if title.is_empty() {
                return Err(EnrollmentError::invalid("Course Title is required."));
            }
            changes.title = Some(title.to_string());
        }
        if let Some(max) = req.max_students {
            if max < 1 {
                return Err(EnrollmentError::invalid("Maximum students must be at least 1."));
            }
            changes.max_students = Some(max);
        }
        if let Some(key) = req.enrollment_key {
            let key = key.trim();
            self.check_key(key)?;
            changes.enrollment_key_hash = Some(self.keys.hash(key)?);
        }

        let updated = store::update_course(&self.db, course_id, &changes)
            .await?
            .ok_or(EnrollmentError::NotFound)?;
        tracing::info!(%course_id, actor=%actor.id, "course updated");
        Ok(updated)
    }

    /// Deletes a course; enrollments, quizzes and submissions go with it.
    pub async fn delete_course(&self, actor: &Actor, course_id: Uuid) -> Result<()> {
        let course = store::find_course(&self.db, course_id)
            .await?
            .ok_or(EnrollmentError::NotFound)?;
        if !actor.manages(&course) {
            return Err(EnrollmentError::AccessDenied);
        }
        if store::delete_course(&self.db, course_id).await? == 0 {
            return Err(EnrollmentError::NotFound);
        }
        tracing::info!(%course_id, code=%course.course_code, actor=%actor.id, "course deleted");
        Ok(())
    }

    pub async fn create_quiz(&self, actor: &Actor, course_id: Uuid, title: &str) -> Result<Quiz> {
        let course = store::find_course(&self.db, course_id)
            .await?
            .ok_or(EnrollmentError::NotFound)?;
        if !actor.manages(&course) {
            return Err(EnrollmentError::AccessDenied);
        }
        let title = title.trim();
        if title.is_empty() {
            return Err(EnrollmentError::invalid("Quiz title is required."));
        }
        let quiz = Quiz {
            id: Uuid::new_v4(),
            course_id,
            title: title.to_string(),
            is_active: true,
            created_at: Utc::now(),
        };

        let mut tx = self.db.begin().await?;
        store::insert_quiz(&mut *tx, &quiz).await?;
        recompute_course(&mut tx, course_id).await?;
        tx.commit().await?;
        Ok(quiz)
    }

    pub async fn set_quiz_active(&self, actor: &Actor, quiz_id: Uuid, active: bool) -> Result<Quiz> {
        let mut quiz = store::find_quiz(&self.db, quiz_id)
            .await?
            .ok_or(EnrollmentError::NotFound)?;
        let course = store::find_course(&self.db, quiz.course_id)
            .await?
            .ok_or(EnrollmentError::NotFound)?;
        if !actor.manages(&course) {
            return Err(EnrollmentError::AccessDenied);
        }

        let mut tx = self.db.begin().await?;
        store::set_quiz_active(&mut *tx, quiz_id, active).await?;
        recompute_course(&mut tx, quiz.course_id).await?;
        tx.commit().await?;
        quiz.is_active = active;
        Ok(quiz)
    }

    pub async fn create_user(&self, actor: &Actor, req: CreateUserReq) -> Result<User> {
        if !actor.is(Role::Admin) {
            return Err(EnrollmentError::AccessDenied);
        }
        // accounts created by an admin need no further review
        let user = self
            .insert_account(&req.username, &req.full_name, req.role, InstructorStatus::Approved)
            .await?;
        tracing::info!(user_id=%user.id, role=?user.role, actor=%actor.id, "user created");
        Ok(user)
    }

    /// Self-service sign-up. Instructors start out pending admin review.
    pub async fn register(&self, req: RegisterReq) -> Result<User> {
        let status = match req.role {
            Role::Student => InstructorStatus::Approved,
            Role::Instructor => InstructorStatus::Pending,
            Role::Admin => return Err(EnrollmentError::invalid("Administrators cannot self-register.")),
        };
        let user = self.insert_account(&req.username, &req.full_name, req.role, status).await?;
        tracing::info!(user_id=%user.id, role=?user.role, status=?user.instructor_status, "user registered");
        Ok(user)
    }

    async fn insert_account(&self, username: &str, full_name: &str, role: Role, status: InstructorStatus) -> Result<User> {
        let username = username.trim();
        let full_name = full_name.trim();
        if username.is_empty() || full_name.is_empty() {
            return Err(EnrollmentError::invalid("Username and full name are required."));
        }
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            full_name: full_name.to_string(),
            role,
            is_active: true,
            instructor_status: status,
            created_at: Utc::now(),
        };
        store::insert_user(&self.db, &user)
            .await
            .map_err(|e| conflict_as(e, EnrollmentError::invalid("Username already exists.")))?;
        Ok(user)
    }

    /// Blocks (`false`) or unblocks a user; blocked users fail authentication.
    pub async fn set_user_active(&self, actor: &Actor, user_id: Uuid, active: bool) -> Result<User> {
        if !actor.is(Role::Admin) {
            return Err(EnrollmentError::AccessDenied);
        }
        if actor.id == user_id && !active {
            return Err(EnrollmentError::invalid("Administrators cannot block themselves."));
        }
        let user = store::set_user_active(&self.db, user_id, active)
            .await?
            .ok_or(EnrollmentError::NotFound)?;
        tracing::info!(%user_id, active, actor=%actor.id, "user access changed");
        Ok(user)
    }

    pub async fn approve_instructor(&self, actor: &Actor, user_id: Uuid) -> Result<User> {
        self.review_instructor(actor, user_id, InstructorStatus::Approved).await
    }

    pub async fn reject_instructor(&self, actor: &Actor, user_id: Uuid) -> Result<User> {
        self.review_instructor(actor, user_id, InstructorStatus::Rejected).await
    }

    async fn review_instructor(&self, actor: &Actor, user_id: Uuid, to: InstructorStatus) -> Result<User> {
        if !actor.is(Role::Admin) {
            return Err(EnrollmentError::AccessDenied);
        }
        let mut tx = self.db.begin().await?;
        let Some(user) = store::review_instructor(&mut *tx, user_id, to).await? else {
            return Err(match store::find_user(&mut *tx, user_id).await? {
                Some(u) if u.role == Role::Instructor => EnrollmentError::AlreadyProcessed,
                _ => EnrollmentError::NotFound,
            });
        };
        let notice = match to {
            InstructorStatus::Approved => notification(
                user_id,
                "Instructor Account Approved",
                "Congratulations! Your instructor account has been approved. You can now create courses and access all instructor features.",
                "success",
                None,
            ),
            _ => notification(
                user_id,
                "Instructor Application Rejected",
                "We regret to inform you that your instructor application has been rejected. Please contact the administrator for more information.",
                "error",
                None,
            ),
        };
        store::insert_notification(&mut *tx, &notice).await?;
        tx.commit().await?;

        tracing::info!(%user_id, status=?to, actor=%actor.id, "instructor reviewed");
        self.notifier.push(&notice).await;
        Ok(user)
    }

    /// Hard delete; everything the user owns cascades.
    pub async fn delete_user(&self, actor: &Actor, user_id: Uuid) -> Result<()> {
        if !actor.is(Role::Admin) {
            return Err(EnrollmentError::AccessDenied);
        }
        if actor.id == user_id {
            return Err(EnrollmentError::invalid("Administrators cannot delete themselves."));
        }
        if store::delete_user(&self.db, user_id).await? == 0 {
            return Err(EnrollmentError::NotFound);
        }
        tracing::info!(%user_id, actor=%actor.id, "user deleted");
        Ok(())
    }

    /// Makes sure an active admin called `username` exists.
    pub async fn ensure_admin(&self, username: &str) -> Result<User> {
        if let Some(user) = store::find_user_by_username(&self.db, username).await? {
            if user.role != Role::Admin || !user.is_active {
                return Err(EnrollmentError::invalid(format!(
                    "{username} exists but is not an active administrator"
                )));
            }
            return Ok(user);
        }
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            full_name: username.to_string(),
            role: Role::Admin,
            is_active: true,
            instructor_status: InstructorStatus::Approved,
            created_at: Utc::now(),
        };
        store::insert_user(&self.db, &user).await?;
        Ok(user)
    }

    pub async fn notifications(&self, actor: &Actor) -> Result<(Vec<Notification>, i64)> {
        let list = store::list_notifications(&self.db, actor.id).await?;
        let unread = store::unread_count(&self.db, actor.id).await?;
        Ok((list, unread))
    }

    pub async fn mark_read(&self, actor: &Actor, notification_id: Uuid) -> Result<()> {
        if store::mark_read(&self.db, notification_id, actor.id).await? == 0 {
            return Err(EnrollmentError::NotFound);
        }
        Ok(())
    }
}
