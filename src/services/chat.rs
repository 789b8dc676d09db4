use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::warn;

use crate::db::chat as chat_repo;
use crate::db::profiles;
use crate::email::EmailClient;
use crate::error::AppError;
use crate::models::{Conversation, Message, MessageWithSender, NewMessageRequest};
use crate::realtime::{ChannelHub, EventKind, conversation_topic};
use crate::services::notifications::NotificationService;

pub struct ChatService {
    db: SqlitePool,
    email: Arc<dyn EmailClient>,
    hub: ChannelHub,
}

impl ChatService {
    pub fn new(db: SqlitePool, email: Arc<dyn EmailClient>, hub: ChannelHub) -> Self {
        Self { db, email, hub }
    }

    /// Loads a conversation for a viewer: the full ordered message list with
    /// sender data, flipping any unread message from the other participant to
    /// read on the way. The flips are patched into the already-fetched list
    /// and published as update events.
    pub async fn messages(
        &self,
        conversation_id: &str,
        viewer_id: &str,
    ) -> Result<Vec<MessageWithSender>, AppError> {
        let conversation = self.participant_conversation(conversation_id, viewer_id).await?;

        let fetched =
            chat_repo::fetch_messages_with_senders(&self.db, &conversation.id).await?;
        let flipped = chat_repo::mark_messages_read(&self.db, &conversation.id, viewer_id).await?;

        let updates: Vec<MessageWithSender> = fetched
            .iter()
            .filter(|m| flipped.contains(&m.id))
            .map(|m| {
                let mut patched = m.clone();
                patched.is_read = true;
                patched
            })
            .collect();

        let topic = conversation_topic(&conversation.id);
        for update in &updates {
            self.hub.publish(
                &topic,
                EventKind::Update,
                serde_json::to_value(update).unwrap_or_default(),
            );
        }

        Ok(reconcile(fetched, updates))
    }

    /// Inserts a message carrying a text body, a file URL or both, pushes it
    /// onto the conversation topic and best-effort notifies the other
    /// participant.
    pub async fn send_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        req: NewMessageRequest,
    ) -> Result<Message, AppError> {
        let content = req.content.filter(|c| !c.trim().is_empty());
        let file_url = req.file_url.filter(|u| !u.trim().is_empty());
        if content.is_none() && file_url.is_none() {
            return Err(AppError::BadRequest(
                "A message needs a text body or an attachment".to_string(),
            ));
        }

        let conversation = self.participant_conversation(conversation_id, sender_id).await?;

        let message = chat_repo::insert_message(
            &self.db,
            &conversation.id,
            sender_id,
            content.as_deref(),
            file_url.as_deref(),
        )
        .await?;

        self.hub.publish(
            &conversation_topic(&conversation.id),
            EventKind::Insert,
            serde_json::to_value(&message).unwrap_or_default(),
        );

        let recipient = other_participant(&conversation, sender_id);
        let sender_name = match profiles::find_profile_by_id(&self.db, sender_id).await {
            Ok(Some(p)) => p.full_name,
            _ => "A participant".to_string(),
        };
        let service =
            NotificationService::new(self.db.clone(), self.email.clone(), self.hub.clone());
        if let Err(e) = service
            .create(
                &recipient,
                "message",
                &format!("New message from {}", sender_name),
                Some(serde_json::json!({"conversation_id": conversation.id})),
            )
            .await
        {
            warn!("message notification for {} failed: {}", recipient, e);
        }

        Ok(message)
    }

    /// Explicit read marking; returns how many messages actually flipped.
    /// Re-running against an already-read conversation flips nothing and
    /// publishes nothing.
    pub async fn mark_read(
        &self,
        conversation_id: &str,
        viewer_id: &str,
    ) -> Result<usize, AppError> {
        let conversation = self.participant_conversation(conversation_id, viewer_id).await?;
        let flipped = chat_repo::mark_messages_read(&self.db, &conversation.id, viewer_id).await?;

        let topic = conversation_topic(&conversation.id);
        for id in &flipped {
            self.hub.publish(
                &topic,
                EventKind::Update,
                serde_json::json!({"id": id, "is_read": true}),
            );
        }

        Ok(flipped.len())
    }

    async fn participant_conversation(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<Conversation, AppError> {
        let conversation = chat_repo::find_conversation_by_id(&self.db, conversation_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if conversation.student_id != user_id && conversation.tutor_id != user_id {
            return Err(AppError::Forbidden(
                "Not a participant of this conversation".to_string(),
            ));
        }
        Ok(conversation)
    }
}

fn other_participant(conversation: &Conversation, user_id: &str) -> String {
    if conversation.student_id == user_id {
        conversation.tutor_id.clone()
    } else {
        conversation.student_id.clone()
    }
}

/// Merges incoming message states into a base list, keyed by message id with
/// last-writer-wins per id. Unknown ids are appended; the result keeps
/// creation-time order with the id as tie-breaker.
pub fn reconcile(
    base: Vec<MessageWithSender>,
    incoming: Vec<MessageWithSender>,
) -> Vec<MessageWithSender> {
    let mut merged = base;
    for update in incoming {
        match merged.iter_mut().find(|m| m.id == update.id) {
            Some(existing) => *existing = update,
            None => merged.push(update),
        }
    }
    merged.sort_by(|a, b| (a.created_at.as_str(), a.id.as_str()).cmp(&(b.created_at.as_str(), b.id.as_str())));
    merged
}
