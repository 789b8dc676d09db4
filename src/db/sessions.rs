use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::{Session, SessionStatus};

pub struct NewSession {
    pub course_id: String,
    pub tutor_id: String,
    pub student_id: String,
    pub subject_id: String,
    pub availability_slot_id: String,
    pub start_time: String,
    pub duration: i64,
    pub contact_email: String,
    pub contact_phone: Option<String>,
}

pub async fn insert_session(db: &SqlitePool, new: NewSession) -> Result<Session, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    let status = SessionStatus::Confirmed;

    sqlx::query(
        r#"
        INSERT INTO sessions
            (id, course_id, tutor_id, student_id, subject_id, availability_slot_id,
            start_time, duration, status, contact_email, contact_phone, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&new.course_id)
    .bind(&new.tutor_id)
    .bind(&new.student_id)
    .bind(&new.subject_id)
    .bind(&new.availability_slot_id)
    .bind(&new.start_time)
    .bind(new.duration)
    .bind(status)
    .bind(&new.contact_email)
    .bind(&new.contact_phone)
    .bind(&now)
    .bind(&now)
    .execute(db)
    .await?;

    Ok(Session {
        id,
        course_id: new.course_id,
        tutor_id: new.tutor_id,
        student_id: new.student_id,
        subject_id: new.subject_id,
        availability_slot_id: new.availability_slot_id,
        start_time: new.start_time,
        duration: new.duration,
        status,
        contact_email: new.contact_email,
        contact_phone: new.contact_phone,
        created_at: now.clone(),
        updated_at: now,
    })
}

const SESSION_COLUMNS: &str = "id, course_id, tutor_id, student_id, subject_id, availability_slot_id, start_time, duration, status, contact_email, contact_phone, created_at, updated_at";

pub async fn find_session_by_id(db: &SqlitePool, id: &str) -> Result<Option<Session>, sqlx::Error> {
    sqlx::query_as::<_, Session>(&format!(
        "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(db)
    .await
}

pub async fn fetch_sessions_for_student(
    db: &SqlitePool,
    student_id: &str,
) -> Result<Vec<Session>, sqlx::Error> {
    sqlx::query_as::<_, Session>(&format!(
        "SELECT {SESSION_COLUMNS} FROM sessions WHERE student_id = ? ORDER BY start_time DESC"
    ))
    .bind(student_id)
    .fetch_all(db)
    .await
}

pub async fn fetch_sessions_for_tutor(
    db: &SqlitePool,
    tutor_id: &str,
) -> Result<Vec<Session>, sqlx::Error> {
    sqlx::query_as::<_, Session>(&format!(
        "SELECT {SESSION_COLUMNS} FROM sessions WHERE tutor_id = ? ORDER BY start_time DESC"
    ))
    .bind(tutor_id)
    .fetch_all(db)
    .await
}

pub async fn update_session_status(
    db: &SqlitePool,
    id: &str,
    status: SessionStatus,
) -> Result<Option<Session>, sqlx::Error> {
    let now = Utc::now().to_rfc3339();
    let updated = sqlx::query("UPDATE sessions SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status)
        .bind(&now)
        .bind(id)
        .execute(db)
        .await?
        .rows_affected();

    if updated == 0 {
        return Ok(None);
    }
    find_session_by_id(db, id).await
}

/// A slot occurrence is taken when a live (pending or confirmed) session
/// already sits on the same slot at the same instant.
pub async fn slot_occurrence_taken(
    db: &SqlitePool,
    availability_slot_id: &str,
    start_time: &str,
) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM sessions
        WHERE availability_slot_id = ? AND start_time = ? AND status IN ('pending', 'confirmed')
        "#,
    )
    .bind(availability_slot_id)
    .bind(start_time)
    .fetch_one(db)
    .await?;

    Ok(count > 0)
}
