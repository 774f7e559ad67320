use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::Actor;
use crate::error::EnrollmentError;
use crate::lifecycle::Action;
use crate::models::*;
use crate::progress::{BulkProgress, ProgressUpdate};
use crate::service::Service;

type ApiResult<T> = Result<Json<T>, EnrollmentError>;

pub fn router(svc: Service) -> Router {
    Router::new()
        // users
        .route("/api/register", post(register))
        .route("/api/users", post(create_user))
        .route("/api/users/:user_id", delete(delete_user))
        .route("/api/users/:user_id/active", post(set_user_active))
        .route("/api/instructors/:user_id/:decision", post(review_instructor))
        // courses + quizzes
        .route("/api/courses", post(create_course))
        .route("/api/courses/:course_id", delete(delete_course).patch(update_course))
        .route("/api/courses/:course_id/students", get(course_students))
        .route("/api/courses/:course_id/quizzes", post(create_quiz))
        .route("/api/quizzes/:quiz_id/active", post(set_quiz_active))
        .route("/api/quizzes/:quiz_id/submissions", post(submit_quiz))
        // enrollment lifecycle
        .route("/api/enrollments", post(request_enrollment).get(my_enrollments))
        .route("/api/instructor/enrollments", get(instructor_enrollments))
        .route("/api/enrollments/:enrollment_id/:action", post(transition))
        .route("/api/enrollments/:enrollment_id", delete(remove_enrollment))
        // progress overrides
        .route("/api/courses/:course_id/progress", post(set_progress_bulk))
        .route("/api/courses/:course_id/students/:student_id/progress", post(set_progress))
        // notifications
        .route("/api/notifications", get(notifications))
        .route("/api/notifications/:notification_id/read", post(mark_read))
        .with_state(svc)
}

async fn create_user(
    State(svc): State<Service>,
    actor: Actor,
    Json(req): Json<CreateUserReq>,
) -> Result<(StatusCode, Json<User>), EnrollmentError> {
    let user = svc.create_user(&actor, req).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn register(
    State(svc): State<Service>,
    Json(req): Json<RegisterReq>,
) -> Result<(StatusCode, Json<User>), EnrollmentError> {
    let user = svc.register(req).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn set_user_active(
    State(svc): State<Service>,
    actor: Actor,
    Path(user_id): Path<Uuid>,
    Json(req): Json<SetActiveReq>,
) -> ApiResult<User> {
    Ok(Json(svc.set_user_active(&actor, user_id, req.is_active).await?))
}

async fn review_instructor(
    State(svc): State<Service>,
    actor: Actor,
    Path((user_id, decision)): Path<(Uuid, String)>,
) -> ApiResult<User> {
    let user = match decision.as_str() {
        "approve" => svc.approve_instructor(&actor, user_id).await?,
        "reject" => svc.reject_instructor(&actor, user_id).await?,
        _ => return Err(EnrollmentError::NotFound),
    };
    Ok(Json(user))
}

async fn delete_user(State(svc): State<Service>, actor: Actor, Path(user_id): Path<Uuid>) -> ApiResult<Value> {
    svc.delete_user(&actor, user_id).await?;
    Ok(ok())
}

async fn create_course(
    State(svc): State<Service>,
    actor: Actor,
    Json(req): Json<CreateCourseReq>,
) -> Result<(StatusCode, Json<Course>), EnrollmentError> {
    let course = svc.create_course(&actor, req).await?;
    Ok((StatusCode::CREATED, Json(course)))
}

async fn update_course(
    State(svc): State<Service>,
    actor: Actor,
    Path(course_id): Path<Uuid>,
    Json(req): Json<UpdateCourseReq>,
) -> ApiResult<Course> {
    Ok(Json(svc.update_course(&actor, course_id, req).await?))
}

async fn delete_course(State(svc): State<Service>, actor: Actor, Path(course_id): Path<Uuid>) -> ApiResult<Value> {
    svc.delete_course(&actor, course_id).await?;
    Ok(ok())
}

async fn course_students(
    State(svc): State<Service>,
    actor: Actor,
    Path(course_id): Path<Uuid>,
) -> ApiResult<Vec<EnrollmentView>> {
    Ok(Json(svc.course_students(&actor, course_id).await?))
}

async fn create_quiz(
    State(svc): State<Service>,
    actor: Actor,
    Path(course_id): Path<Uuid>,
    Json(req): Json<CreateQuizReq>,
) -> Result<(StatusCode, Json<Quiz>), EnrollmentError> {
    let quiz = svc.create_quiz(&actor, course_id, &req.title).await?;
    Ok((StatusCode::CREATED, Json(quiz)))
}

async fn set_quiz_active(
    State(svc): State<Service>,
    actor: Actor,
    Path(quiz_id): Path<Uuid>,
    Json(req): Json<SetActiveReq>,
) -> ApiResult<Quiz> {
    Ok(Json(svc.set_quiz_active(&actor, quiz_id, req.is_active).await?))
}

async fn submit_quiz(
    State(svc): State<Service>,
    actor: Actor,
    Path(quiz_id): Path<Uuid>,
    Json(req): Json<SubmitQuizReq>,
) -> ApiResult<Value> {
    let progress = svc.submit_quiz(&actor, quiz_id, req.content.as_deref()).await?;
    Ok(Json(json!({ "success": true, "progress": progress })))
}

async fn request_enrollment(
    State(svc): State<Service>,
    actor: Actor,
    Json(req): Json<EnrollReq>,
) -> Result<(StatusCode, Json<Enrollment>), EnrollmentError> {
    let enrollment = svc
        .request_enrollment(&actor, &req.course_code, &req.enrollment_key)
        .await?;
    Ok((StatusCode::CREATED, Json(enrollment)))
}

async fn my_enrollments(State(svc): State<Service>, actor: Actor) -> ApiResult<Vec<EnrollmentView>> {
    Ok(Json(svc.my_enrollments(&actor).await?))
}

async fn instructor_enrollments(State(svc): State<Service>, actor: Actor) -> ApiResult<InstructorEnrollments> {
    Ok(Json(svc.instructor_enrollments(&actor).await?))
}

async fn transition(
    State(svc): State<Service>,
    actor: Actor,
    Path((enrollment_id, action)): Path<(Uuid, String)>,
) -> ApiResult<Enrollment> {
    let action = Action::ALL
        .into_iter()
        .find(|a| a.as_str() == action)
        .ok_or(EnrollmentError::NotFound)?;
    let enrollment = match action {
        Action::Approve => svc.approve(&actor, enrollment_id).await?,
        Action::Reject => svc.reject(&actor, enrollment_id).await?,
        Action::Block => svc.block(&actor, enrollment_id).await?,
        Action::Unblock => svc.unblock(&actor, enrollment_id).await?,
        // removal is DELETE /api/enrollments/:enrollment_id
        Action::Remove => return Err(EnrollmentError::NotFound),
    };
    Ok(Json(enrollment))
}

async fn remove_enrollment(
    State(svc): State<Service>,
    actor: Actor,
    Path(enrollment_id): Path<Uuid>,
) -> ApiResult<Value> {
    svc.remove(&actor, enrollment_id).await?;
    Ok(ok())
}

async fn set_progress(
    State(svc): State<Service>,
    actor: Actor,
    Path((course_id, student_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<ProgressReq>,
) -> ApiResult<ProgressUpdate> {
    let update = if req.progress.is_null() {
        svc.clear_progress(&actor, course_id, student_id).await?
    } else {
        svc.set_progress(&actor, course_id, student_id, &req.progress).await?
    };
    Ok(Json(update))
}

async fn set_progress_bulk(
    State(svc): State<Service>,
    actor: Actor,
    Path(course_id): Path<Uuid>,
    Json(req): Json<ProgressReq>,
) -> ApiResult<BulkProgress> {
    Ok(Json(svc.set_progress_bulk(&actor, course_id, &req.progress).await?))
}

async fn notifications(State(svc): State<Service>, actor: Actor) -> ApiResult<Value> {
    let (list, unread) = svc.notifications(&actor).await?;
    Ok(Json(json!({ "notifications": list, "unread": unread })))
}

async fn mark_read(
    State(svc): State<Service>,
    actor: Actor,
    Path(notification_id): Path<Uuid>,
) -> ApiResult<Value> {
    svc.mark_read(&actor, notification_id).await?;
    Ok(ok())
}

// --- helpers ---
fn ok() -> Json<Value> {
    Json(json!({ "success": true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::USER_HEADER;
    use crate::service::testing::{self, KEY};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    async fn call(app: &Router, method: &str, uri: &str, user: Option<Uuid>, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(id) = user {
            req = req.header(USER_HEADER, id.to_string());
        }
        let req = match body {
            Some(b) => req
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, json)
    }

    #[tokio::test]
    async fn requires_a_known_user() {
        let svc = testing::service().await;
        let app = router(svc);
        let (status, _) = call(&app, "GET", "/api/enrollments", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call(&app, "GET", "/api/enrollments", Some(Uuid::new_v4()), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn blocked_user_is_turned_away() {
        let svc = testing::service().await;
        let admin = testing::user(&svc, Role::Admin, "root").await;
        let student = testing::user(&svc, Role::Student, "alice").await;
        let app = router(svc);

        let (status, _) = call(&app, "GET", "/api/enrollments", Some(student.id), None).await;
        assert_eq!(status, StatusCode::OK);

        let uri = format!("/api/users/{}/active", student.id);
        let (status, body) = call(&app, "POST", &uri, Some(admin.id), Some(json!({ "is_active": false }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_active"], false);

        let (status, body) = call(&app, "GET", "/api/enrollments", Some(student.id), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "unauthenticated");

        let (status, _) = call(&app, "POST", &uri, Some(admin.id), Some(json!({ "is_active": true }))).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&app, "GET", "/api/enrollments", Some(student.id), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn instructor_signup_needs_admin_approval() {
        let svc = testing::service().await;
        let admin = testing::user(&svc, Role::Admin, "root").await;
        let app = router(svc);

        let (status, user) = call(
            &app,
            "POST",
            "/api/register",
            None,
            Some(json!({ "username": "pat", "full_name": "Pat Doe", "role": "instructor" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(user["instructor_status"], "pending");
        let id: Uuid = user["id"].as_str().unwrap().parse().unwrap();

        let course = json!({ "course_code": "ML1", "title": "ML", "enrollment_key": KEY });
        let (status, _) = call(&app, "POST", "/api/courses", Some(id), Some(course.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call(&app, "POST", &format!("/api/instructors/{id}/approve"), Some(admin.id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["instructor_status"], "approved");

        let (status, _) = call(&app, "POST", "/api/courses", Some(id), Some(course)).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn enrollment_flow_over_http() {
        let svc = testing::service().await;
        let instructor = testing::user(&svc, Role::Instructor, "instructor").await;
        let intruder = testing::user(&svc, Role::Instructor, "intruder").await;
        let student = testing::user(&svc, Role::Student, "alice").await;
        let app = router(svc);

        let (status, course) = call(
            &app,
            "POST",
            "/api/courses",
            Some(instructor.id),
            Some(json!({ "course_code": "web1", "title": "Web", "max_students": 1, "enrollment_key": KEY })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(course["course_code"], "WEB1");
        assert!(course.get("enrollment_key_hash").is_none());

        let (status, body) = call(
            &app,
            "POST",
            "/api/enrollments",
            Some(student.id),
            Some(json!({ "course_code": "WEB1", "enrollment_key": "wrong-key" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "invalid_key");

        let (status, enrollment) = call(
            &app,
            "POST",
            "/api/enrollments",
            Some(student.id),
            Some(json!({ "course_code": "WEB1", "enrollment_key": KEY })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(enrollment["status"], "pending");
        let id = enrollment["id"].as_str().unwrap().to_string();

        let (status, body) =
            call(&app, "POST", &format!("/api/enrollments/{id}/approve"), Some(intruder.id), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "access_denied");

        let (status, body) =
            call(&app, "POST", &format!("/api/enrollments/{id}/approve"), Some(instructor.id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "approved");
        assert!(body["approved_at"].is_string());

        let (status, body) =
            call(&app, "POST", &format!("/api/enrollments/{id}/reject"), Some(instructor.id), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "already_processed");

        let (status, _) =
            call(&app, "POST", &format!("/api/enrollments/{id}/promote"), Some(instructor.id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, mine) = call(&app, "GET", "/api/enrollments", Some(student.id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(mine[0]["course_code"], "WEB1");

        let (status, inbox) = call(&app, "GET", "/api/notifications", Some(student.id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(inbox["unread"], 1);

        let (status, _) = call(&app, "DELETE", &format!("/api/enrollments/{id}"), Some(instructor.id), None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, mine) = call(&app, "GET", "/api/enrollments", Some(student.id), None).await;
        assert_eq!(mine, json!([]));
    }

    #[tokio::test]
    async fn progress_over_http() {
        let svc = testing::service().await;
        let instructor = testing::user(&svc, Role::Instructor, "instructor").await;
        let course = testing::course(&svc, &instructor, "CS101", 10).await;
        let student = testing::approved_student(&svc, &instructor, &course, "alice").await;
        let app = router(svc);

        let (status, quiz) = call(
            &app,
            "POST",
            &format!("/api/courses/{}/quizzes", course.id),
            Some(instructor.id),
            Some(json!({ "title": "Week 1" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let quiz_id = quiz["id"].as_str().unwrap().to_string();

        let (status, body) = call(
            &app,
            "POST",
            &format!("/api/quizzes/{quiz_id}/submissions"),
            Some(student.id),
            Some(json!({ "content": "answers" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["progress"], 100.0);

        let uri = format!("/api/courses/{}/students/{}/progress", course.id, student.id);
        let (status, body) = call(&app, "POST", &uri, Some(instructor.id), Some(json!({ "progress": "not a number" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_argument");

        let (status, body) = call(&app, "POST", &uri, Some(instructor.id), Some(json!({ "progress": 30 }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["display_progress"], 30.0);
        assert_eq!(body["progress_percentage"], 100.0);

        let (status, body) = call(&app, "POST", &uri, Some(instructor.id), Some(json!({ "progress": "" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["manual_progress_override"], Value::Null);
        assert_eq!(body["display_progress"], 100.0);

        let (status, body) = call(
            &app,
            "POST",
            &format!("/api/courses/{}/progress", course.id),
            Some(instructor.id),
            Some(json!({ "progress": 55 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["students"], 1);

        let (status, students) =
            call(&app, "GET", &format!("/api/courses/{}/students", course.id), Some(instructor.id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(students[0]["display_progress"], 55.0);
    }
}
