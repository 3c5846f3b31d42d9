pub mod admin;
pub mod courses;
pub mod graders;
pub mod health;
pub mod notifications;
pub mod submissions;
