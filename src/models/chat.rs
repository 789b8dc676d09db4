use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Conversation {
    pub id: String,
    pub session_id: String,
    pub student_id: String,
    pub tutor_id: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: Option<String>,
    pub file_url: Option<String>,
    pub is_read: bool,
    pub created_at: String,
}

/// A message joined with its sender's display data; `sender_avatar` is the
/// sender's most recent profile image path, if any.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MessageWithSender {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: Option<String>,
    pub file_url: Option<String>,
    pub is_read: bool,
    pub created_at: String,
    pub sender_name: String,
    pub sender_avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessageRequest {
    pub content: Option<String>,
    pub file_url: Option<String>,
}
