pub mod chat;
pub mod course;
pub mod notification;
pub mod profile;
pub mod session;

pub use chat::{Conversation, Message, MessageWithSender, NewMessageRequest};
pub use course::{
    AvailabilitySlotRequest, Course, CourseAvailability, NewCourseRequest, Subject,
    UpdateCourseRequest,
};
pub use notification::{NewNotificationRequest, Notification};
pub use profile::{NewProfileImageRequest, NewProfileRequest, Profile, ProfileImage, Role, UpdateProfileRequest};
pub use session::{NewBookingRequest, Session, SessionStatus, UpdateSessionStatusRequest};
