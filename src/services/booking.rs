use std::sync::Arc;

use chrono::{Datelike, Local, NaiveDate};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::db::{chat, courses, profiles, sessions};
use crate::email::EmailClient;
use crate::error::AppError;
use crate::models::{Conversation, Course, CourseAvailability, NewBookingRequest, Session};
use crate::realtime::ChannelHub;
use crate::scheduling;
use crate::services::notifications::NotificationService;

/// The result of a confirmed booking. The conversation is best-effort and
/// may be absent; `warnings` carries non-blocking email failures.
#[derive(Debug, Serialize)]
pub struct BookingOutcome {
    pub session: Session,
    pub conversation: Option<Conversation>,
    pub warnings: Vec<String>,
}

/// Turns a course's recurring weekly availability plus a chosen calendar
/// date into a confirmed session, its chat conversation and two outbound
/// emails. Only the session insert is load-bearing; everything after it is
/// tolerated to fail.
pub struct BookingService {
    db: SqlitePool,
    email: Arc<dyn EmailClient>,
    hub: ChannelHub,
}

impl BookingService {
    pub fn new(db: SqlitePool, email: Arc<dyn EmailClient>, hub: ChannelHub) -> Self {
        Self { db, email, hub }
    }

    /// Selectable dates for a course: the next occurrences of each available
    /// weekday, minus any date the tutor has blacked out.
    pub async fn booking_dates(&self, course_id: &str) -> Result<Vec<String>, AppError> {
        let course = courses::find_course_by_id(&self.db, course_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let slots = courses::fetch_availability(&self.db, course_id).await?;
        let blackouts = profiles::fetch_unavailable_dates(&self.db, &course.tutor_id).await?;

        let today = Local::now().date_naive();
        let dates = scheduling::project_dates(&slots, today, scheduling::OCCURRENCES_PER_WEEKDAY);

        Ok(dates
            .into_iter()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .filter(|d| !blackouts.contains(d))
            .collect())
    }

    /// The bookable time slots on a concrete date, sorted by start time.
    pub async fn slots_for_date(
        &self,
        course_id: &str,
        date: &str,
    ) -> Result<Vec<CourseAvailability>, AppError> {
        courses::find_course_by_id(&self.db, course_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let date = parse_date(date)?;
        let slots = courses::fetch_availability(&self.db, course_id).await?;
        Ok(scheduling::slots_for_date(&slots, date))
    }

    pub async fn create_booking(&self, req: NewBookingRequest) -> Result<BookingOutcome, AppError> {
        validate_required(&req)?;

        let course = courses::find_course_by_id(&self.db, &req.course_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let slot = courses::find_slot_by_id(&self.db, &req.slot_id)
            .await?
            .ok_or_else(|| AppError::BadRequest("Unknown availability slot".to_string()))?;
        if slot.course_id != course.id {
            return Err(AppError::BadRequest(
                "Slot does not belong to this course".to_string(),
            ));
        }

        // A tutor never books their own course.
        if req.student_id == course.tutor_id {
            return Err(AppError::Forbidden(
                "Tutors cannot book their own course".to_string(),
            ));
        }

        let date = parse_date(&req.date)?;
        let slot_weekday = scheduling::parse_weekday(&slot.day_of_week)
            .ok_or_else(|| AppError::BadRequest("Slot has an invalid day of week".to_string()))?;
        if date.weekday() != slot_weekday {
            return Err(AppError::BadRequest(format!(
                "{} is not a {}",
                req.date, slot.day_of_week
            )));
        }

        let blackouts = profiles::fetch_unavailable_dates(&self.db, &course.tutor_id).await?;
        if blackouts.contains(&req.date) {
            return Err(AppError::Conflict(format!(
                "Tutor is unavailable on {}",
                req.date
            )));
        }

        let start_time = scheduling::combine(date, &slot.start_time)
            .ok_or_else(|| AppError::BadRequest("Slot has an invalid start time".to_string()))?;

        if sessions::slot_occurrence_taken(&self.db, &slot.id, &start_time).await? {
            return Err(AppError::Conflict(
                "This time slot is already booked".to_string(),
            ));
        }

        // The check above races against concurrent bookings; the unique
        // index over live sessions is the arbiter, surfaced as a Conflict.
        let session = match sessions::insert_session(
            &self.db,
            sessions::NewSession {
                course_id: course.id.clone(),
                tutor_id: course.tutor_id.clone(),
                student_id: req.student_id.clone(),
                subject_id: course.subject_id.clone(),
                availability_slot_id: slot.id.clone(),
                start_time,
                duration: scheduling::slot_duration_hours(&slot.start_time, &slot.end_time),
                contact_email: req.contact_email.clone(),
                contact_phone: req.contact_phone.clone(),
            },
        )
        .await
        {
            Ok(session) => session,
            Err(e) if is_unique_violation(&e) => {
                return Err(AppError::Conflict(
                    "This time slot is already booked".to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        };
        info!("session {} booked for course {}", session.id, course.id);

        // Chat channel creation never rolls back a booked session.
        let conversation = match chat::insert_conversation(&self.db, &session).await {
            Ok(c) => Some(c),
            Err(e) => {
                warn!("conversation creation failed for session {}: {}", session.id, e);
                None
            }
        };

        let warnings = self.send_booking_emails(&course, &session).await;
        self.notify_tutor(&course, &session).await;

        Ok(BookingOutcome {
            session,
            conversation,
            warnings,
        })
    }

    /// One email to each side; outcomes are independent and non-blocking.
    async fn send_booking_emails(&self, course: &Course, session: &Session) -> Vec<String> {
        let mut warnings = Vec::new();

        let (subject, html) = student_email(course, session);
        if let Err(e) = self.email.send(&session.contact_email, &subject, &html).await {
            warn!("booking email to student failed: {}", e);
            warnings.push("Confirmation email could not be sent".to_string());
        }

        match profiles::find_profile_by_id(&self.db, &course.tutor_id).await {
            Ok(Some(tutor)) => {
                let (subject, html) = tutor_email(course, session, &tutor.full_name);
                if let Err(e) = self.email.send(&tutor.email, &subject, &html).await {
                    warn!("booking email to tutor failed: {}", e);
                    warnings.push("Tutor notification email could not be sent".to_string());
                }
            }
            Ok(None) => {
                warn!("tutor profile {} missing, skipping email", course.tutor_id);
                warnings.push("Tutor notification email could not be sent".to_string());
            }
            Err(e) => {
                warn!("failed to load tutor {}: {}", course.tutor_id, e);
                warnings.push("Tutor notification email could not be sent".to_string());
            }
        }

        warnings
    }

    async fn notify_tutor(&self, course: &Course, session: &Session) {
        let service =
            NotificationService::new(self.db.clone(), self.email.clone(), self.hub.clone());
        let metadata = serde_json::json!({
            "session_id": session.id,
            "course_id": course.id,
        });
        if let Err(e) = service
            .create(
                &course.tutor_id,
                "booking",
                &format!("New booking for {} on {}", course.title, session.start_time),
                Some(metadata),
            )
            .await
        {
            warn!("booking notification for tutor {} failed: {}", course.tutor_id, e);
        }
    }
}

/// Missing fields are listed verbatim so the client can show which inputs
/// are absent.
fn validate_required(req: &NewBookingRequest) -> Result<(), AppError> {
    let mut missing = Vec::new();
    if req.course_id.trim().is_empty() {
        missing.push("course_id");
    }
    if req.student_id.trim().is_empty() {
        missing.push("student_id");
    }
    if req.date.trim().is_empty() {
        missing.push("date");
    }
    if req.slot_id.trim().is_empty() {
        missing.push("slot_id");
    }
    if req.contact_email.trim().is_empty() {
        missing.push("contact_email");
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "Missing required booking fields: {}",
            missing.join(", ")
        )))
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn parse_date(s: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(format!("Invalid date: {}", s)))
}

fn student_email(course: &Course, session: &Session) -> (String, String) {
    (
        format!("Booking confirmed: {}", course.title),
        format!(
            "<p>Your session for <strong>{}</strong> is confirmed.</p>\
             <p>Start: {}<br>Duration: {} hour(s)</p>",
            course.title, session.start_time, session.duration
        ),
    )
}

fn tutor_email(course: &Course, session: &Session, tutor_name: &str) -> (String, String) {
    (
        format!("New booking: {}", course.title),
        format!(
            "<p>Hi {},</p><p>A student booked <strong>{}</strong>.</p>\
             <p>Start: {}<br>Duration: {} hour(s)</p>",
            tutor_name, course.title, session.start_time, session.duration
        ),
    )
}
