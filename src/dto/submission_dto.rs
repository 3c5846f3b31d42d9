use serde::Deserialize;
use validator::Validate;

/// Teacher override for a single graded question. Replaces the awarded
/// marks in place; the submission's aggregate totals are not recomputed.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct OverrideGradePayload {
    pub marks_awarded: f64,
    #[validate(length(max = 2000))]
    pub override_reason: Option<String>,
}
