pub mod booking;
pub mod chat;
pub mod notifications;

pub use booking::{BookingOutcome, BookingService};
pub use chat::ChatService;
pub use notifications::NotificationService;
