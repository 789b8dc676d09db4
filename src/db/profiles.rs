use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::{NewProfileRequest, Profile, ProfileImage, Subject, UpdateProfileRequest};

pub async fn insert_profile(
    db: &SqlitePool,
    req: NewProfileRequest,
) -> Result<Profile, sqlx::Error> {
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO profiles
            (id, full_name, role, email, bio, education, hourly_rate, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&req.id)
    .bind(&req.full_name)
    .bind(req.role)
    .bind(&req.email)
    .bind(&req.bio)
    .bind(&req.education)
    .bind(req.hourly_rate)
    .bind(&now)
    .bind(&now)
    .execute(db)
    .await?;

    Ok(Profile {
        id: req.id,
        full_name: req.full_name,
        role: req.role,
        email: req.email,
        bio: req.bio,
        education: req.education,
        hourly_rate: req.hourly_rate,
        created_at: now.clone(),
        updated_at: now,
    })
}

pub async fn find_profile_by_id(
    db: &SqlitePool,
    id: &str,
) -> Result<Option<Profile>, sqlx::Error> {
    sqlx::query_as::<_, Profile>(
        "SELECT id, full_name, role, email, bio, education, hourly_rate, created_at, updated_at FROM profiles WHERE id = ?"
    )
    .bind(id)
    .fetch_optional(db)
    .await
}

pub async fn update_profile(
    db: &SqlitePool,
    id: &str,
    req: UpdateProfileRequest,
) -> Result<Option<Profile>, sqlx::Error> {
    let mut current = match find_profile_by_id(db, id).await? {
        Some(p) => p,
        None => return Ok(None),
    };

    if let Some(full_name) = req.full_name {
        current.full_name = full_name;
    }
    if let Some(bio) = req.bio {
        current.bio = Some(bio);
    }
    if let Some(education) = req.education {
        current.education = Some(education);
    }
    if let Some(hourly_rate) = req.hourly_rate {
        current.hourly_rate = Some(hourly_rate);
    }
    current.updated_at = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        UPDATE profiles
        SET full_name = ?, bio = ?, education = ?, hourly_rate = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&current.full_name)
    .bind(&current.bio)
    .bind(&current.education)
    .bind(current.hourly_rate)
    .bind(&current.updated_at)
    .bind(id)
    .execute(db)
    .await?;

    Ok(Some(current))
}

/// Avatar uploads are append-only; the newest row wins and older rows are
/// kept untouched.
pub async fn insert_profile_image(
    db: &SqlitePool,
    user_id: &str,
    image_path: &str,
) -> Result<ProfileImage, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query("INSERT INTO profile_images (id, user_id, image_path, created_at) VALUES (?, ?, ?, ?)")
        .bind(&id)
        .bind(user_id)
        .bind(image_path)
        .bind(&now)
        .execute(db)
        .await?;

    Ok(ProfileImage {
        id,
        user_id: user_id.to_string(),
        image_path: image_path.to_string(),
        created_at: now,
    })
}

pub async fn latest_profile_image(
    db: &SqlitePool,
    user_id: &str,
) -> Result<Option<ProfileImage>, sqlx::Error> {
    sqlx::query_as::<_, ProfileImage>(
        r#"
        SELECT id, user_id, image_path, created_at
        FROM profile_images
        WHERE user_id = ?
        ORDER BY created_at DESC, id DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .fetch_optional(db)
    .await
}

pub async fn fetch_subjects(db: &SqlitePool) -> Result<Vec<Subject>, sqlx::Error> {
    sqlx::query_as::<_, Subject>("SELECT id, name FROM subjects ORDER BY name ASC")
        .fetch_all(db)
        .await
}

pub async fn fetch_tutor_subjects(
    db: &SqlitePool,
    tutor_id: &str,
) -> Result<Vec<Subject>, sqlx::Error> {
    sqlx::query_as::<_, Subject>(
        r#"
        SELECT s.id, s.name
        FROM subjects s
        JOIN tutor_subjects ts ON ts.subject_id = s.id
        WHERE ts.tutor_id = ?
        ORDER BY s.name ASC
        "#,
    )
    .bind(tutor_id)
    .fetch_all(db)
    .await
}

pub async fn replace_tutor_subjects(
    db: &SqlitePool,
    tutor_id: &str,
    subject_ids: &[String],
) -> Result<(), sqlx::Error> {
    let mut tx = db.begin().await?;

    sqlx::query("DELETE FROM tutor_subjects WHERE tutor_id = ?")
        .bind(tutor_id)
        .execute(&mut *tx)
        .await?;

    for subject_id in subject_ids {
        sqlx::query("INSERT INTO tutor_subjects (tutor_id, subject_id) VALUES (?, ?)")
            .bind(tutor_id)
            .bind(subject_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await
}

pub async fn fetch_unavailable_dates(
    db: &SqlitePool,
    tutor_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT date FROM tutor_unavailable_dates WHERE tutor_id = ? ORDER BY date ASC",
    )
    .bind(tutor_id)
    .fetch_all(db)
    .await
}

pub async fn replace_unavailable_dates(
    db: &SqlitePool,
    tutor_id: &str,
    dates: &[String],
) -> Result<(), sqlx::Error> {
    let mut tx = db.begin().await?;

    sqlx::query("DELETE FROM tutor_unavailable_dates WHERE tutor_id = ?")
        .bind(tutor_id)
        .execute(&mut *tx)
        .await?;

    for date in dates {
        sqlx::query("INSERT INTO tutor_unavailable_dates (tutor_id, date) VALUES (?, ?)")
            .bind(tutor_id)
            .bind(date)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test db");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations");

        pool
    }

    fn profile_req(id: &str, role: Role) -> NewProfileRequest {
        NewProfileRequest {
            id: id.to_string(),
            full_name: "Dana Torres".to_string(),
            role,
            email: format!("{}@example.com", id),
            bio: None,
            education: None,
            hourly_rate: None,
        }
    }

    #[tokio::test]
    async fn insert_and_update_profile() {
        let pool = setup_test_db().await;

        let profile = insert_profile(&pool, profile_req("tutor-1", Role::Tutor))
            .await
            .expect("Failed to insert profile");
        assert_eq!(profile.role, Role::Tutor);

        let updated = update_profile(
            &pool,
            "tutor-1",
            UpdateProfileRequest {
                full_name: None,
                bio: Some("10 years of teaching".to_string()),
                education: None,
                hourly_rate: Some(35.0),
            },
        )
        .await
        .expect("Failed to update profile")
        .expect("Profile not found");

        assert_eq!(updated.full_name, "Dana Torres");
        assert_eq!(updated.bio.as_deref(), Some("10 years of teaching"));
        assert_eq!(updated.hourly_rate, Some(35.0));
    }

    #[tokio::test]
    async fn latest_avatar_wins_and_history_is_kept() {
        let pool = setup_test_db().await;
        insert_profile(&pool, profile_req("u1", Role::Student))
            .await
            .expect("Failed to insert profile");

        insert_profile_image(&pool, "u1", "avatars/u1/first.png")
            .await
            .expect("Failed to insert image");
        insert_profile_image(&pool, "u1", "avatars/u1/second.png")
            .await
            .expect("Failed to insert image");

        let latest = latest_profile_image(&pool, "u1")
            .await
            .expect("Failed to fetch latest image")
            .expect("No image");
        assert_eq!(latest.image_path, "avatars/u1/second.png");

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM profile_images WHERE user_id = ?")
            .bind("u1")
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn tutor_subjects_are_replaced_wholesale() {
        let pool = setup_test_db().await;
        insert_profile(&pool, profile_req("tutor-1", Role::Tutor))
            .await
            .expect("Failed to insert profile");

        let subjects = fetch_subjects(&pool).await.expect("Failed to fetch subjects");
        assert!(subjects.len() >= 2);

        let first = vec![subjects[0].id.clone(), subjects[1].id.clone()];
        replace_tutor_subjects(&pool, "tutor-1", &first)
            .await
            .expect("Failed to replace subjects");
        assert_eq!(fetch_tutor_subjects(&pool, "tutor-1").await.unwrap().len(), 2);

        let second = vec![subjects[0].id.clone()];
        replace_tutor_subjects(&pool, "tutor-1", &second)
            .await
            .expect("Failed to replace subjects");
        assert_eq!(fetch_tutor_subjects(&pool, "tutor-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unavailable_dates_are_replaced_wholesale() {
        let pool = setup_test_db().await;
        insert_profile(&pool, profile_req("tutor-1", Role::Tutor))
            .await
            .expect("Failed to insert profile");

        replace_unavailable_dates(
            &pool,
            "tutor-1",
            &["2025-02-03".to_string(), "2025-02-10".to_string()],
        )
        .await
        .expect("Failed to replace dates");

        let dates = fetch_unavailable_dates(&pool, "tutor-1")
            .await
            .expect("Failed to fetch dates");
        assert_eq!(dates, vec!["2025-02-03", "2025-02-10"]);

        replace_unavailable_dates(&pool, "tutor-1", &[])
            .await
            .expect("Failed to clear dates");
        assert!(fetch_unavailable_dates(&pool, "tutor-1").await.unwrap().is_empty());
    }
}
