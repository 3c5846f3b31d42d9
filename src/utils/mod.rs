pub mod json_recovery;
