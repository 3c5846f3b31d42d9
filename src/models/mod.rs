pub mod course;
pub mod grader;
pub mod job;
pub mod rubric;
pub mod submission;
