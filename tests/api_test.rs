use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use tower::ServiceExt;

use tutorrito_backend::api::router;
use tutorrito_backend::db::{profiles, sessions};
use tutorrito_backend::email::NoopEmailClient;
use tutorrito_backend::models::{NewProfileRequest, Role, SessionStatus};
use tutorrito_backend::realtime::ChannelHub;
use tutorrito_backend::state::AppState;

async fn test_app() -> (SqlitePool, Router) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create test db");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let state = AppState {
        db: pool.clone(),
        email: Arc::new(NoopEmailClient),
        hub: ChannelHub::new(),
    };
    (pool, router(state))
}

async fn seed_profile(pool: &SqlitePool, id: &str, role: Role) {
    profiles::insert_profile(
        pool,
        NewProfileRequest {
            id: id.to_string(),
            full_name: "Dana Torres".to_string(),
            role,
            email: format!("{}@example.com", id),
            bio: None,
            education: None,
            hourly_rate: None,
        },
    )
    .await
    .expect("Failed to insert profile");
}

fn json_request(method: &str, uri: &str, user: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    builder.body(Body::from(body.to_string())).expect("request")
}

#[tokio::test]
async fn health_returns_ok() {
    let (_pool, app) = test_app().await;
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn duplicate_profile_is_a_conflict() {
    let (_pool, app) = test_app().await;

    let body = serde_json::json!({
        "id": "u1",
        "full_name": "Sam Lee",
        "role": "student",
        "email": "sam@example.com"
    });

    let first = app
        .clone()
        .oneshot(json_request("POST", "/profiles", None, body.clone()))
        .await
        .expect("response");
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .oneshot(json_request("POST", "/profiles", None, body))
        .await
        .expect("response");
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn course_creation_requires_a_tutor() {
    let (pool, app) = test_app().await;
    seed_profile(&pool, "sam", Role::Student).await;
    let subject = profiles::fetch_subjects(&pool).await.expect("subjects")[0].id.clone();

    let body = serde_json::json!({
        "subject_id": subject,
        "title": "Algebra",
        "price": 25.0,
        "availability": [
            {"day_of_week": "Monday", "start_time": "09:00:00", "end_time": "10:00:00"}
        ]
    });

    let response = app
        .clone()
        .oneshot(json_request("POST", "/courses", Some("sam"), body.clone()))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let missing_header = app
        .oneshot(json_request("POST", "/courses", None, body))
        .await
        .expect("response");
    assert_eq!(missing_header.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn completed_sessions_cannot_be_reopened() {
    let (pool, app) = test_app().await;
    seed_profile(&pool, "dana", Role::Tutor).await;
    seed_profile(&pool, "sam", Role::Student).await;

    let subject = profiles::fetch_subjects(&pool).await.expect("subjects")[0].id.clone();
    let course = tutorrito_backend::db::courses::insert_course(
        &pool,
        "dana",
        tutorrito_backend::models::NewCourseRequest {
            subject_id: subject.clone(),
            title: "Algebra".to_string(),
            description: None,
            price: 25.0,
            cover_image_url: None,
            availability: vec![],
        },
    )
    .await
    .expect("course");
    let session = sessions::insert_session(
        &pool,
        sessions::NewSession {
            course_id: course.id.clone(),
            tutor_id: "dana".to_string(),
            student_id: "sam".to_string(),
            subject_id: subject,
            availability_slot_id: "slot-1".to_string(),
            start_time: "2025-03-04T09:00:00".to_string(),
            duration: 1,
            contact_email: "sam@example.com".to_string(),
            contact_phone: None,
        },
    )
    .await
    .expect("session");

    // Students cannot drive the lifecycle at all.
    let forbidden = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            &format!("/sessions/{}/status", session.id),
            Some("sam"),
            serde_json::json!({"status": "completed"}),
        ))
        .await
        .expect("response");
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let completed = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            &format!("/sessions/{}/status", session.id),
            Some("dana"),
            serde_json::json!({"status": "completed"}),
        ))
        .await
        .expect("response");
    assert_eq!(completed.status(), StatusCode::OK);

    let body = completed.into_body().collect().await.expect("body").to_bytes();
    let parsed: tutorrito_backend::models::Session =
        serde_json::from_slice(&body).expect("session json");
    assert_eq!(parsed.status, SessionStatus::Completed);

    // completed -> pending is not a reachable transition.
    let reopened = app
        .oneshot(json_request(
            "PATCH",
            &format!("/sessions/{}/status", session.id),
            Some("dana"),
            serde_json::json!({"status": "pending"}),
        ))
        .await
        .expect("response");
    assert_eq!(reopened.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn booking_dates_endpoint_projects_slots() {
    let (pool, app) = test_app().await;
    seed_profile(&pool, "dana", Role::Tutor).await;
    let subject = profiles::fetch_subjects(&pool).await.expect("subjects")[0].id.clone();

    let course = tutorrito_backend::db::courses::insert_course(
        &pool,
        "dana",
        tutorrito_backend::models::NewCourseRequest {
            subject_id: subject,
            title: "Algebra".to_string(),
            description: None,
            price: 25.0,
            cover_image_url: None,
            availability: vec![
                tutorrito_backend::models::AvailabilitySlotRequest {
                    day_of_week: "Monday".to_string(),
                    start_time: "09:00:00".to_string(),
                    end_time: "10:00:00".to_string(),
                },
                tutorrito_backend::models::AvailabilitySlotRequest {
                    day_of_week: "Wednesday".to_string(),
                    start_time: "14:00:00".to_string(),
                    end_time: "15:00:00".to_string(),
                },
            ],
        },
    )
    .await
    .expect("course");

    let response = app
        .oneshot(
            Request::get(format!("/courses/{}/booking-dates", course.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.expect("body").to_bytes();
    let dates: Vec<String> = serde_json::from_slice(&body).expect("dates json");
    assert_eq!(dates.len(), 8);
    assert!(dates.windows(2).all(|w| w[0] < w[1]));
}
