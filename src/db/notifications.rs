use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::Notification;

pub async fn insert_notification(
    db: &SqlitePool,
    recipient_id: &str,
    kind: &str,
    message: &str,
    metadata: Option<&str>,
) -> Result<Notification, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO notifications (id, recipient_id, type, message, metadata, is_read, read_at, created_at)
        VALUES (?, ?, ?, ?, ?, 0, NULL, ?)
        "#,
    )
    .bind(&id)
    .bind(recipient_id)
    .bind(kind)
    .bind(message)
    .bind(metadata)
    .bind(&now)
    .execute(db)
    .await?;

    Ok(Notification {
        id,
        recipient_id: recipient_id.to_string(),
        kind: kind.to_string(),
        message: message.to_string(),
        metadata: metadata.map(str::to_string),
        is_read: false,
        read_at: None,
        created_at: now,
    })
}

pub async fn fetch_notifications(
    db: &SqlitePool,
    recipient_id: &str,
) -> Result<Vec<Notification>, sqlx::Error> {
    sqlx::query_as::<_, Notification>(
        r#"
        SELECT id, recipient_id, type, message, metadata, is_read, read_at, created_at
        FROM notifications
        WHERE recipient_id = ?
        ORDER BY created_at DESC
        "#,
    )
    .bind(recipient_id)
    .fetch_all(db)
    .await
}

pub async fn unread_count(db: &SqlitePool, recipient_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE recipient_id = ? AND is_read = 0")
        .bind(recipient_id)
        .fetch_one(db)
        .await
}

pub async fn find_notification_by_id(
    db: &SqlitePool,
    id: &str,
) -> Result<Option<Notification>, sqlx::Error> {
    sqlx::query_as::<_, Notification>(
        "SELECT id, recipient_id, type, message, metadata, is_read, read_at, created_at FROM notifications WHERE id = ?"
    )
    .bind(id)
    .fetch_optional(db)
    .await
}

/// Stamps `read_at` on the first flip only. Returns the row plus whether
/// this call changed it.
pub async fn mark_notification_read(
    db: &SqlitePool,
    id: &str,
) -> Result<Option<(Notification, bool)>, sqlx::Error> {
    let current = match find_notification_by_id(db, id).await? {
        Some(n) => n,
        None => return Ok(None),
    };

    if current.is_read {
        return Ok(Some((current, false)));
    }

    let read_at = Utc::now().to_rfc3339();
    sqlx::query("UPDATE notifications SET is_read = 1, read_at = ? WHERE id = ?")
        .bind(&read_at)
        .bind(id)
        .execute(db)
        .await?;

    let mut updated = current;
    updated.is_read = true;
    updated.read_at = Some(read_at);
    Ok(Some((updated, true)))
}
