use axum::extract::FromRequestParts;
use http::request::Parts;
use uuid::Uuid;

use crate::error::EnrollmentError;
use crate::models::{Course, InstructorStatus, Role, User};
use crate::service::Service;
use crate::store;

/// Header carrying the id of the user authenticated by the upstream gateway.
pub const USER_HEADER: &str = "x-user-id";

/// The user on whose behalf an operation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
    pub full_name: String,
    pub instructor_status: InstructorStatus,
}

impl Actor {
    pub fn is(&self, role: Role) -> bool {
        self.role == role
    }

    /// Admins, and instructors whose account an admin has approved.
    pub fn can_teach(&self) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Instructor => self.instructor_status == InstructorStatus::Approved,
            Role::Student => false,
        }
    }

    /// Owning instructor or any admin.
    pub fn manages(&self, course: &Course) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Instructor => self.can_teach() && course.instructor_id == self.id,
            Role::Student => false,
        }
    }
}

impl From<User> for Actor {
    fn from(user: User) -> Self {
        Actor {
            id: user.id,
            role: user.role,
            full_name: user.full_name,
            instructor_status: user.instructor_status,
        }
    }
}

#[axum::async_trait]
impl FromRequestParts<Service> for Actor {
    type Rejection = EnrollmentError;

    async fn from_request_parts(parts: &mut Parts, svc: &Service) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .ok_or(EnrollmentError::Unauthenticated)?;

        match store::find_user(&svc.db, id).await? {
            Some(user) if user.is_active => Ok(user.into()),
            _ => Err(EnrollmentError::Unauthenticated),
        }
    }
}
