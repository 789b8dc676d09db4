use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::warn;

use crate::db::{notifications, profiles};
use crate::email::EmailClient;
use crate::error::AppError;
use crate::models::Notification;
use crate::realtime::{ChannelHub, EventKind, notification_topic};

/// Creates notification rows on behalf of other users, pushes them onto the
/// recipient's realtime topic and best-effort emails the recipient.
pub struct NotificationService {
    db: SqlitePool,
    email: Arc<dyn EmailClient>,
    hub: ChannelHub,
}

impl NotificationService {
    pub fn new(db: SqlitePool, email: Arc<dyn EmailClient>, hub: ChannelHub) -> Self {
        Self { db, email, hub }
    }

    pub async fn create(
        &self,
        recipient_id: &str,
        kind: &str,
        message: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<Notification, AppError> {
        let metadata_text = metadata.map(|m| m.to_string());
        let notification = notifications::insert_notification(
            &self.db,
            recipient_id,
            kind,
            message,
            metadata_text.as_deref(),
        )
        .await?;

        self.hub.publish(
            &notification_topic(recipient_id),
            EventKind::Insert,
            serde_json::to_value(&notification).unwrap_or_default(),
        );

        // The email leg never fails the notification itself.
        match profiles::find_profile_by_id(&self.db, recipient_id).await {
            Ok(Some(profile)) => {
                let subject = format!("Tutorrito: {}", kind);
                let html = format!("<p>Hi {},</p><p>{}</p>", profile.full_name, message);
                if let Err(e) = self.email.send(&profile.email, &subject, &html).await {
                    warn!("notification email to {} failed: {}", recipient_id, e);
                }
            }
            Ok(None) => warn!("notification recipient {} has no profile", recipient_id),
            Err(e) => warn!("failed to load recipient {}: {}", recipient_id, e),
        }

        Ok(notification)
    }

    pub async fn mark_read(&self, id: &str) -> Result<Notification, AppError> {
        let (notification, flipped) = notifications::mark_notification_read(&self.db, id)
            .await?
            .ok_or(AppError::NotFound)?;

        if flipped {
            self.hub.publish(
                &notification_topic(&notification.recipient_id),
                EventKind::Update,
                serde_json::to_value(&notification).unwrap_or_default(),
            );
        }

        Ok(notification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::NoopEmailClient;
    use crate::models::{NewProfileRequest, Role};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup() -> (SqlitePool, NotificationService) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test db");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations");

        crate::db::profiles::insert_profile(
            &pool,
            NewProfileRequest {
                id: "u1".to_string(),
                full_name: "Sam Lee".to_string(),
                role: Role::Student,
                email: "sam@example.com".to_string(),
                bio: None,
                education: None,
                hourly_rate: None,
            },
        )
        .await
        .expect("Failed to insert profile");

        let service =
            NotificationService::new(pool.clone(), Arc::new(NoopEmailClient), ChannelHub::new());
        (pool, service)
    }

    #[tokio::test]
    async fn create_inserts_row_and_mark_read_stamps_once() {
        let (pool, service) = setup().await;

        let created = service
            .create("u1", "message", "You have a new message", None)
            .await
            .expect("Failed to create notification");
        assert!(!created.is_read);
        assert!(created.read_at.is_none());

        let read = service.mark_read(&created.id).await.expect("Failed to mark read");
        assert!(read.is_read);
        let first_read_at = read.read_at.clone().expect("read_at");

        // Idempotent: a second mark keeps the original timestamp.
        let again = service.mark_read(&created.id).await.expect("Failed to re-mark");
        assert_eq!(again.read_at.as_deref(), Some(first_read_at.as_str()));

        assert_eq!(notifications::unread_count(&pool, "u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn create_publishes_on_recipient_topic() {
        let (_pool, service) = setup().await;
        let mut rx = service.hub.subscribe(&notification_topic("u1"));

        service
            .create("u1", "booking", "New booking", Some(serde_json::json!({"session_id": "s1"})))
            .await
            .expect("Failed to create notification");

        let event = rx.recv().await.expect("event");
        assert_eq!(event.kind, EventKind::Insert);
        assert_eq!(event.payload["type"], "booking");
    }
}
