use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl SessionStatus {
    /// Legal lifecycle edges. Completed and cancelled are terminal.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Completed) | (Pending, Cancelled)
                | (Confirmed, Completed) | (Confirmed, Cancelled)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: String,
    pub course_id: String,
    pub tutor_id: String,
    pub student_id: String,
    pub subject_id: String,
    pub availability_slot_id: String,
    pub start_time: String,
    pub duration: i64,
    pub status: SessionStatus,
    pub contact_email: String,
    pub contact_phone: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// The booking confirmation step. `date` is the concrete calendar day the
/// student picked (`YYYY-MM-DD`); the slot supplies the wall-clock time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBookingRequest {
    pub course_id: String,
    pub student_id: String,
    pub date: String,
    pub slot_id: String,
    pub contact_email: String,
    pub contact_phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSessionStatusRequest {
    pub status: SessionStatus,
}
