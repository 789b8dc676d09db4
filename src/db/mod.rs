pub mod chat;
pub mod courses;
pub mod notifications;
pub mod profiles;
pub mod sessions;
