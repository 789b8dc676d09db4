use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::{Conversation, Message, MessageWithSender, Session};

pub async fn insert_conversation(
    db: &SqlitePool,
    session: &Session,
) -> Result<Conversation, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO conversations (id, session_id, student_id, tutor_id, created_at) VALUES (?, ?, ?, ?, ?)"
    )
    .bind(&id)
    .bind(&session.id)
    .bind(&session.student_id)
    .bind(&session.tutor_id)
    .bind(&now)
    .execute(db)
    .await?;

    Ok(Conversation {
        id,
        session_id: session.id.clone(),
        student_id: session.student_id.clone(),
        tutor_id: session.tutor_id.clone(),
        created_at: now,
    })
}

pub async fn find_conversation_by_id(
    db: &SqlitePool,
    id: &str,
) -> Result<Option<Conversation>, sqlx::Error> {
    sqlx::query_as::<_, Conversation>(
        "SELECT id, session_id, student_id, tutor_id, created_at FROM conversations WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(db)
    .await
}

pub async fn fetch_conversations_for_user(
    db: &SqlitePool,
    user_id: &str,
) -> Result<Vec<Conversation>, sqlx::Error> {
    sqlx::query_as::<_, Conversation>(
        r#"
        SELECT id, session_id, student_id, tutor_id, created_at
        FROM conversations
        WHERE student_id = ? OR tutor_id = ?
        ORDER BY created_at DESC
        "#,
    )
    .bind(user_id)
    .bind(user_id)
    .fetch_all(db)
    .await
}

pub async fn insert_message(
    db: &SqlitePool,
    conversation_id: &str,
    sender_id: &str,
    content: Option<&str>,
    file_url: Option<&str>,
) -> Result<Message, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO messages (id, conversation_id, sender_id, content, file_url, is_read, created_at)
        VALUES (?, ?, ?, ?, ?, 0, ?)
        "#,
    )
    .bind(&id)
    .bind(conversation_id)
    .bind(sender_id)
    .bind(content)
    .bind(file_url)
    .bind(&now)
    .execute(db)
    .await?;

    Ok(Message {
        id,
        conversation_id: conversation_id.to_string(),
        sender_id: sender_id.to_string(),
        content: content.map(str::to_string),
        file_url: file_url.map(str::to_string),
        is_read: false,
        created_at: now,
    })
}

/// Messages in insertion order with sender name and current avatar resolved
/// in the same query.
pub async fn fetch_messages_with_senders(
    db: &SqlitePool,
    conversation_id: &str,
) -> Result<Vec<MessageWithSender>, sqlx::Error> {
    sqlx::query_as::<_, MessageWithSender>(
        r#"
        SELECT
            m.id, m.conversation_id, m.sender_id, m.content, m.file_url, m.is_read, m.created_at,
            p.full_name AS sender_name,
            (SELECT pi.image_path FROM profile_images pi
             WHERE pi.user_id = m.sender_id
             ORDER BY pi.created_at DESC, pi.id DESC
             LIMIT 1) AS sender_avatar
        FROM messages m
        JOIN profiles p ON p.id = m.sender_id
        WHERE m.conversation_id = ?
        ORDER BY m.created_at ASC, m.id ASC
        "#,
    )
    .bind(conversation_id)
    .fetch_all(db)
    .await
}

/// Flips every unread message not authored by the viewer and returns the ids
/// of the rows that actually changed. Re-running is a no-op.
pub async fn mark_messages_read(
    db: &SqlitePool,
    conversation_id: &str,
    viewer_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        r#"
        UPDATE messages
        SET is_read = 1
        WHERE conversation_id = ? AND sender_id != ? AND is_read = 0
        RETURNING id
        "#,
    )
    .bind(conversation_id)
    .bind(viewer_id)
    .fetch_all(db)
    .await
}
