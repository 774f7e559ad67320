use crate::db::Db;
use crate::error::EnrollmentError;
use crate::notify::Notifier;
use crate::secret::KeyHasher;

/// Everything an operation needs, constructed once in `main` and shared as
/// router state.
#[derive(Clone)]
pub struct Service {
    pub db: Db,
    pub notifier: Notifier,
    pub keys: KeyHasher,
    pub min_key_len: usize,
}

impl Service {
    pub fn new(db: Db, notifier: Notifier, keys: KeyHasher, min_key_len: usize) -> Self {
        Service { db, notifier, keys, min_key_len }
    }
}

pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Maps a unique-constraint failure to `on_conflict`, anything else to storage.
pub(crate) fn conflict_as(e: sqlx::Error, on_conflict: EnrollmentError) -> EnrollmentError {
    if is_unique_violation(&e) {
        on_conflict
    } else {
        EnrollmentError::Storage(e)
    }
}
