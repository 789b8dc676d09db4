use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subject {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Course {
    pub id: String,
    pub tutor_id: String,
    pub subject_id: String,
    pub title: String,
    pub description: Option<String>,
    pub price: f64,
    pub cover_image_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// One recurring weekly slot, e.g. Monday 09:00:00-10:00:00.
/// Times are wall-clock `HH:MM:SS`, day names are full English names.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CourseAvailability {
    pub id: String,
    pub course_id: String,
    pub day_of_week: String,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilitySlotRequest {
    pub day_of_week: String,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCourseRequest {
    pub subject_id: String,
    pub title: String,
    pub description: Option<String>,
    pub price: f64,
    pub cover_image_url: Option<String>,
    #[serde(default)]
    pub availability: Vec<AvailabilitySlotRequest>,
}

/// A course save always carries the complete availability set; the stored
/// set is replaced wholesale, never partially migrated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateCourseRequest {
    pub subject_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub cover_image_url: Option<String>,
    pub availability: Vec<AvailabilitySlotRequest>,
}
