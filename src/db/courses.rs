use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::{
    AvailabilitySlotRequest, Course, CourseAvailability, NewCourseRequest, UpdateCourseRequest,
};

pub async fn fetch_courses(
    db: &SqlitePool,
    tutor_id: Option<&str>,
) -> Result<Vec<Course>, sqlx::Error> {
    match tutor_id {
        Some(tutor) => {
            sqlx::query_as::<_, Course>(
                "SELECT id, tutor_id, subject_id, title, description, price, cover_image_url, created_at, updated_at FROM courses WHERE tutor_id = ? ORDER BY updated_at DESC"
            )
            .bind(tutor)
            .fetch_all(db)
            .await
        }
        None => {
            sqlx::query_as::<_, Course>(
                "SELECT id, tutor_id, subject_id, title, description, price, cover_image_url, created_at, updated_at FROM courses ORDER BY updated_at DESC"
            )
            .fetch_all(db)
            .await
        }
    }
}

pub async fn find_course_by_id(db: &SqlitePool, id: &str) -> Result<Option<Course>, sqlx::Error> {
    sqlx::query_as::<_, Course>(
        "SELECT id, tutor_id, subject_id, title, description, price, cover_image_url, created_at, updated_at FROM courses WHERE id = ?"
    )
    .bind(id)
    .fetch_optional(db)
    .await
}

pub async fn insert_course(
    db: &SqlitePool,
    tutor_id: &str,
    req: NewCourseRequest,
) -> Result<Course, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    let mut tx = db.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO courses
            (id, tutor_id, subject_id, title, description, price, cover_image_url, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(tutor_id)
    .bind(&req.subject_id)
    .bind(&req.title)
    .bind(&req.description)
    .bind(req.price)
    .bind(&req.cover_image_url)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    insert_availability(&mut tx, &id, &req.availability).await?;

    tx.commit().await?;

    Ok(Course {
        id,
        tutor_id: tutor_id.to_string(),
        subject_id: req.subject_id,
        title: req.title,
        description: req.description,
        price: req.price,
        cover_image_url: req.cover_image_url,
        created_at: now.clone(),
        updated_at: now,
    })
}

/// A course save replaces the availability set wholesale; the stored set is
/// always the one from the latest save.
pub async fn update_course(
    db: &SqlitePool,
    id: &str,
    req: UpdateCourseRequest,
) -> Result<Option<Course>, sqlx::Error> {
    let mut current = match find_course_by_id(db, id).await? {
        Some(c) => c,
        None => return Ok(None),
    };

    if let Some(subject_id) = req.subject_id {
        current.subject_id = subject_id;
    }
    if let Some(title) = req.title {
        current.title = title;
    }
    if let Some(description) = req.description {
        current.description = Some(description);
    }
    if let Some(price) = req.price {
        current.price = price;
    }
    if let Some(cover_image_url) = req.cover_image_url {
        current.cover_image_url = Some(cover_image_url);
    }
    current.updated_at = Utc::now().to_rfc3339();

    let mut tx = db.begin().await?;

    sqlx::query(
        r#"
        UPDATE courses
        SET subject_id = ?, title = ?, description = ?, price = ?, cover_image_url = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&current.subject_id)
    .bind(&current.title)
    .bind(&current.description)
    .bind(current.price)
    .bind(&current.cover_image_url)
    .bind(&current.updated_at)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM course_availability WHERE course_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    insert_availability(&mut tx, id, &req.availability).await?;

    tx.commit().await?;

    Ok(Some(current))
}

pub async fn delete_course(db: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
    let mut tx = db.begin().await?;

    sqlx::query("DELETE FROM course_availability WHERE course_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let deleted = sqlx::query("DELETE FROM courses WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;

    Ok(deleted > 0)
}

pub async fn fetch_availability(
    db: &SqlitePool,
    course_id: &str,
) -> Result<Vec<CourseAvailability>, sqlx::Error> {
    sqlx::query_as::<_, CourseAvailability>(
        "SELECT id, course_id, day_of_week, start_time, end_time FROM course_availability WHERE course_id = ? ORDER BY day_of_week, start_time"
    )
    .bind(course_id)
    .fetch_all(db)
    .await
}

pub async fn find_slot_by_id(
    db: &SqlitePool,
    slot_id: &str,
) -> Result<Option<CourseAvailability>, sqlx::Error> {
    sqlx::query_as::<_, CourseAvailability>(
        "SELECT id, course_id, day_of_week, start_time, end_time FROM course_availability WHERE id = ?"
    )
    .bind(slot_id)
    .fetch_optional(db)
    .await
}

async fn insert_availability(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    course_id: &str,
    slots: &[AvailabilitySlotRequest],
) -> Result<(), sqlx::Error> {
    for slot in slots {
        sqlx::query(
            "INSERT INTO course_availability (id, course_id, day_of_week, start_time, end_time) VALUES (?, ?, ?, ?, ?)"
        )
        .bind(Uuid::new_v4().to_string())
        .bind(course_id)
        .bind(&slot.day_of_week)
        .bind(&slot.start_time)
        .bind(&slot.end_time)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}
