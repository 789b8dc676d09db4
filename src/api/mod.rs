use axum::Json;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::{patch, post};
use axum::{Router, extract::State, http::StatusCode, routing::get};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::db::{chat as chat_repo, courses, notifications, profiles, sessions};
use crate::error::AppError;
use crate::models::*;
use crate::realtime::ChannelHub;
use crate::services::{BookingOutcome, BookingService, ChatService, NotificationService};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/profiles", post(create_profile))
        .route("/profiles/{id}", get(get_profile).patch(update_profile))
        .route("/profiles/{id}/images", post(add_profile_image))
        .route("/profiles/{id}/avatar", get(get_avatar))
        .route("/subjects", get(list_subjects))
        .route("/tutors/{id}/subjects", get(list_tutor_subjects).put(set_tutor_subjects))
        .route(
            "/tutors/{id}/unavailable-dates",
            get(list_unavailable_dates).put(set_unavailable_dates),
        )
        .route("/courses", get(list_courses).post(create_course))
        .route("/courses/{id}", get(get_course).patch(update_course).delete(delete_course))
        .route("/courses/{id}/availability", get(list_availability))
        .route("/courses/{id}/booking-dates", get(booking_dates))
        .route("/courses/{id}/slots", get(slots_for_date))
        .route("/bookings", post(create_booking))
        .route("/sessions", get(list_sessions))
        .route("/sessions/{id}/status", patch(update_session_status))
        .route("/conversations", get(list_conversations))
        .route("/conversations/{id}/messages", get(list_messages).post(send_message))
        .route("/conversations/{id}/read", post(mark_conversation_read))
        .route("/notifications", get(list_notifications).post(create_notification))
        .route("/notifications/unread-count", get(unread_count))
        .route("/notifications/{id}/read", patch(mark_notification_read))
        .route("/realtime/{topic}", get(realtime))
        .with_state(state)
}

/// The deployment's auth layer fronts this service and forwards the
/// authenticated subject id in `x-user-id`.
fn acting_user(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::BadRequest("x-user-id header is required".to_string()))
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    sqlx::query("select 1").execute(&state.db).await?;
    Ok(StatusCode::OK)
}

async fn create_profile(
    State(state): State<AppState>,
    Json(req): Json<NewProfileRequest>,
) -> Result<Json<Profile>, AppError> {
    if req.id.trim().is_empty() || req.full_name.trim().is_empty() || req.email.trim().is_empty() {
        return Err(AppError::BadRequest(
            "id, full_name and email are required".to_string(),
        ));
    }
    if profiles::find_profile_by_id(&state.db, &req.id).await?.is_some() {
        return Err(AppError::Conflict("Profile already exists".to_string()));
    }
    let profile = profiles::insert_profile(&state.db, req).await?;
    Ok(Json(profile))
}

async fn get_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Profile>, AppError> {
    let profile = profiles::find_profile_by_id(&state.db, &id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(profile))
}

async fn update_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<Profile>, AppError> {
    let actor = acting_user(&headers)?;
    if actor != id {
        return Err(AppError::Forbidden("Profiles are self-service only".to_string()));
    }
    let profile = profiles::update_profile(&state.db, &id, req)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(profile))
}

async fn add_profile_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<NewProfileImageRequest>,
) -> Result<Json<ProfileImage>, AppError> {
    let actor = acting_user(&headers)?;
    if actor != id {
        return Err(AppError::Forbidden("Avatars are self-service only".to_string()));
    }
    if req.image_path.trim().is_empty() {
        return Err(AppError::BadRequest("image_path is required".to_string()));
    }
    let image = profiles::insert_profile_image(&state.db, &id, &req.image_path).await?;
    Ok(Json(image))
}

async fn get_avatar(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProfileImage>, AppError> {
    let image = profiles::latest_profile_image(&state.db, &id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(image))
}

async fn list_subjects(State(state): State<AppState>) -> Result<Json<Vec<Subject>>, AppError> {
    Ok(Json(profiles::fetch_subjects(&state.db).await?))
}

async fn list_tutor_subjects(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Subject>>, AppError> {
    Ok(Json(profiles::fetch_tutor_subjects(&state.db, &id).await?))
}

#[derive(Deserialize)]
struct SubjectSelection {
    subject_ids: Vec<String>,
}

async fn set_tutor_subjects(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<SubjectSelection>,
) -> Result<Json<Vec<Subject>>, AppError> {
    let actor = acting_user(&headers)?;
    if actor != id {
        return Err(AppError::Forbidden("Subject selection is self-service only".to_string()));
    }
    profiles::replace_tutor_subjects(&state.db, &id, &req.subject_ids).await?;
    Ok(Json(profiles::fetch_tutor_subjects(&state.db, &id).await?))
}

async fn list_unavailable_dates(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<String>>, AppError> {
    Ok(Json(profiles::fetch_unavailable_dates(&state.db, &id).await?))
}

#[derive(Deserialize)]
struct UnavailableDates {
    dates: Vec<String>,
}

async fn set_unavailable_dates(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<UnavailableDates>,
) -> Result<Json<Vec<String>>, AppError> {
    let actor = acting_user(&headers)?;
    if actor != id {
        return Err(AppError::Forbidden("Blackout dates are self-service only".to_string()));
    }
    for date in &req.dates {
        if chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
            return Err(AppError::BadRequest(format!("Invalid date: {}", date)));
        }
    }
    profiles::replace_unavailable_dates(&state.db, &id, &req.dates).await?;
    Ok(Json(profiles::fetch_unavailable_dates(&state.db, &id).await?))
}

#[derive(Deserialize)]
struct CourseQueryParams {
    tutor_id: Option<String>,
}

async fn list_courses(
    State(state): State<AppState>,
    Query(params): Query<CourseQueryParams>,
) -> Result<Json<Vec<Course>>, AppError> {
    let courses = courses::fetch_courses(&state.db, params.tutor_id.as_deref()).await?;
    Ok(Json(courses))
}

async fn create_course(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<NewCourseRequest>,
) -> Result<Json<Course>, AppError> {
    let actor = acting_user(&headers)?;
    let profile = profiles::find_profile_by_id(&state.db, &actor)
        .await?
        .ok_or(AppError::NotFound)?;
    if profile.role != Role::Tutor {
        return Err(AppError::Forbidden("Only tutors can create courses".to_string()));
    }
    validate_slots(&req.availability)?;
    let course = courses::insert_course(&state.db, &actor, req).await?;
    Ok(Json(course))
}

async fn get_course(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Course>, AppError> {
    let course = courses::find_course_by_id(&state.db, &id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(course))
}

async fn update_course(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<UpdateCourseRequest>,
) -> Result<Json<Course>, AppError> {
    let actor = acting_user(&headers)?;
    let course = courses::find_course_by_id(&state.db, &id)
        .await?
        .ok_or(AppError::NotFound)?;
    if course.tutor_id != actor {
        return Err(AppError::Forbidden("Only the owning tutor can edit a course".to_string()));
    }
    validate_slots(&req.availability)?;
    let updated = courses::update_course(&state.db, &id, req)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(updated))
}

async fn delete_course(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let actor = acting_user(&headers)?;
    let course = courses::find_course_by_id(&state.db, &id)
        .await?
        .ok_or(AppError::NotFound)?;
    if course.tutor_id != actor {
        return Err(AppError::Forbidden("Only the owning tutor can delete a course".to_string()));
    }
    if courses::delete_course(&state.db, &id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound)
    }
}

fn validate_slots(slots: &[AvailabilitySlotRequest]) -> Result<(), AppError> {
    for slot in slots {
        if crate::scheduling::parse_weekday(&slot.day_of_week).is_none() {
            return Err(AppError::BadRequest(format!(
                "Invalid day of week: {}",
                slot.day_of_week
            )));
        }
        let (start, end) = (
            crate::scheduling::parse_wall_clock(&slot.start_time),
            crate::scheduling::parse_wall_clock(&slot.end_time),
        );
        match (start, end) {
            (Some(s), Some(e)) if s < e => {}
            _ => {
                return Err(AppError::BadRequest(format!(
                    "Invalid slot times: {} - {}",
                    slot.start_time, slot.end_time
                )));
            }
        }
    }
    Ok(())
}

async fn list_availability(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<CourseAvailability>>, AppError> {
    courses::find_course_by_id(&state.db, &id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(courses::fetch_availability(&state.db, &id).await?))
}

async fn booking_dates(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<String>>, AppError> {
    let service = BookingService::new(state.db.clone(), state.email.clone(), state.hub.clone());
    Ok(Json(service.booking_dates(&id).await?))
}

#[derive(Deserialize)]
struct SlotQueryParams {
    date: String,
}

async fn slots_for_date(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<SlotQueryParams>,
) -> Result<Json<Vec<CourseAvailability>>, AppError> {
    let service = BookingService::new(state.db.clone(), state.email.clone(), state.hub.clone());
    Ok(Json(service.slots_for_date(&id, &params.date).await?))
}

async fn create_booking(
    State(state): State<AppState>,
    Json(req): Json<NewBookingRequest>,
) -> Result<Json<BookingOutcome>, AppError> {
    let service = BookingService::new(state.db.clone(), state.email.clone(), state.hub.clone());
    let outcome = service.create_booking(req).await?;
    Ok(Json(outcome))
}

#[derive(Deserialize)]
struct SessionQueryParams {
    student_id: Option<String>,
    tutor_id: Option<String>,
}

async fn list_sessions(
    State(state): State<AppState>,
    Query(params): Query<SessionQueryParams>,
) -> Result<Json<Vec<Session>>, AppError> {
    let sessions = match (params.student_id.as_deref(), params.tutor_id.as_deref()) {
        (Some(student), None) => sessions::fetch_sessions_for_student(&state.db, student).await?,
        (None, Some(tutor)) => sessions::fetch_sessions_for_tutor(&state.db, tutor).await?,
        _ => {
            return Err(AppError::BadRequest(
                "Exactly one of student_id or tutor_id is required".to_string(),
            ));
        }
    };
    Ok(Json(sessions))
}

async fn update_session_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<UpdateSessionStatusRequest>,
) -> Result<Json<Session>, AppError> {
    let actor = acting_user(&headers)?;
    let session = sessions::find_session_by_id(&state.db, &id)
        .await?
        .ok_or(AppError::NotFound)?;
    if session.tutor_id != actor {
        return Err(AppError::Forbidden(
            "Only the session's tutor can change its status".to_string(),
        ));
    }
    if !session.status.can_transition_to(req.status) {
        return Err(AppError::Conflict(format!(
            "Cannot transition a {:?} session to {:?}",
            session.status, req.status
        )));
    }
    let updated = sessions::update_session_status(&state.db, &id, req.status)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(updated))
}

#[derive(Deserialize)]
struct ConversationQueryParams {
    user_id: String,
}

async fn list_conversations(
    State(state): State<AppState>,
    Query(params): Query<ConversationQueryParams>,
) -> Result<Json<Vec<Conversation>>, AppError> {
    Ok(Json(
        chat_repo::fetch_conversations_for_user(&state.db, &params.user_id).await?,
    ))
}

async fn list_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<MessageWithSender>>, AppError> {
    let viewer = acting_user(&headers)?;
    let service = ChatService::new(state.db.clone(), state.email.clone(), state.hub.clone());
    Ok(Json(service.messages(&id, &viewer).await?))
}

async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<NewMessageRequest>,
) -> Result<Json<Message>, AppError> {
    let sender = acting_user(&headers)?;
    let service = ChatService::new(state.db.clone(), state.email.clone(), state.hub.clone());
    Ok(Json(service.send_message(&id, &sender, req).await?))
}

async fn mark_conversation_read(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let viewer = acting_user(&headers)?;
    let service = ChatService::new(state.db.clone(), state.email.clone(), state.hub.clone());
    let flipped = service.mark_read(&id, &viewer).await?;
    Ok(Json(serde_json::json!({"marked_read": flipped})))
}

#[derive(Deserialize)]
struct NotificationQueryParams {
    recipient_id: String,
}

async fn list_notifications(
    State(state): State<AppState>,
    Query(params): Query<NotificationQueryParams>,
) -> Result<Json<Vec<Notification>>, AppError> {
    Ok(Json(
        notifications::fetch_notifications(&state.db, &params.recipient_id).await?,
    ))
}

async fn unread_count(
    State(state): State<AppState>,
    Query(params): Query<NotificationQueryParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let count = notifications::unread_count(&state.db, &params.recipient_id).await?;
    Ok(Json(serde_json::json!({"unread": count})))
}

async fn create_notification(
    State(state): State<AppState>,
    Json(req): Json<NewNotificationRequest>,
) -> Result<Json<Notification>, AppError> {
    if req.recipient_id.trim().is_empty() || req.kind.trim().is_empty() {
        return Err(AppError::BadRequest(
            "recipient_id and type are required".to_string(),
        ));
    }
    let service =
        NotificationService::new(state.db.clone(), state.email.clone(), state.hub.clone());
    let notification = service
        .create(&req.recipient_id, &req.kind, &req.message, req.metadata)
        .await?;
    Ok(Json(notification))
}

async fn mark_notification_read(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Notification>, AppError> {
    let service =
        NotificationService::new(state.db.clone(), state.email.clone(), state.hub.clone());
    Ok(Json(service.mark_read(&id).await?))
}

async fn realtime(
    ws: WebSocketUpgrade,
    Path(topic): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| stream_events(socket, state.hub, topic))
}

/// Server-to-client event stream for one topic; ends when the socket closes
/// or the subscriber lags behind the channel capacity.
async fn stream_events(mut socket: WebSocket, hub: ChannelHub, topic: String) {
    let mut rx = hub.subscribe(&topic);
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => {
                    let Ok(text) = serde_json::to_string(&event) else { continue };
                    if socket.send(WsMessage::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!("subscriber on {} lagged by {}, disconnecting", topic, n);
                    break;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                // Client frames are ignored; the feed is one-way.
                Some(Ok(_)) => {}
                _ => break,
            },
        }
    }
}
