use std::sync::Arc;

use sqlx::SqlitePool;

use crate::email::EmailClient;
use crate::realtime::ChannelHub;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub email: Arc<dyn EmailClient>,
    pub hub: ChannelHub,
}
