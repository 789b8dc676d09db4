pub mod api;
pub mod db;
pub mod email;
pub mod error;
pub mod models;
pub mod realtime;
pub mod scheduling;
pub mod services;
pub mod state;
