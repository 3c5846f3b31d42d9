//! The pipeline must be fully exercisable without model credentials: OCR
//! degrades to local text segmentation, rubric extraction to a
//! deterministic stub, and grading to the keyword heuristic. This test
//! walks a submission through those offline paths end to end.

use grading_backend::models::rubric::Rubric;
use grading_backend::services::gemini_service::GeminiClient;
use grading_backend::services::grading_job::{progress_percentage, resolve_answer};
use grading_backend::services::grading_service::offline_grade;
use grading_backend::services::ocr_service::extract_answers_from_text;
use grading_backend::services::rubric_service::RubricService;
use rust_decimal::Decimal;
use uuid::Uuid;

fn offline_client() -> GeminiClient {
    GeminiClient::new(
        None,
        reqwest::Client::new(),
        "gemini-pro".into(),
        "text-embedding-004".into(),
    )
}

fn rubric_row(question_number: &str, keywords: &[&str], max_marks: i64, order_index: i32) -> Rubric {
    Rubric {
        id: Uuid::new_v4(),
        grader_id: Uuid::new_v4(),
        question_number: question_number.to_string(),
        question_text: Some(format!("Question {}", question_number)),
        expected_answer: "expected".to_string(),
        keywords: Some(serde_json::json!(keywords)),
        max_marks: Decimal::from(max_marks),
        order_index,
        created_at: None,
    }
}

#[tokio::test]
async fn offline_rubric_extraction_produces_a_usable_stub() {
    let service = RubricService::new(offline_client());
    let drafts = service
        .extract_rubric(
            "Question 1: differentiate 2x^2 [5 marks]",
            "Answer: 4x. Award full marks for the derivative.",
        )
        .await
        .expect("offline extraction cannot fail");

    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].question_number, "1");
    assert_eq!(drafts[0].max_marks, 5.0);
    assert!(drafts[0]
        .question_text
        .as_deref()
        .unwrap()
        .starts_with("Question 1"));
}

#[test]
fn segmented_answers_feed_the_grader_in_rubric_order() {
    let transcript = "Q1: the derivative is 4x Q2: I do not know";
    let answers = extract_answers_from_text(transcript);

    let rubric = vec![
        rubric_row("1", &["derivative"], 5, 0),
        rubric_row("2", &["osmosis"], 3, 1),
        rubric_row("3", &["equilibrium"], 2, 2),
    ];

    let mut total = 0.0;
    let mut max = 0.0;
    let mut progress = Vec::new();
    for (idx, item) in rubric.iter().enumerate() {
        let answer = resolve_answer(&answers, &item.question_number, Some(transcript));
        let grade = offline_grade(item, answer);
        total += grade.marks_awarded;
        max += item.max_marks_f64();
        progress.push(progress_percentage(idx + 1, rubric.len()));
    }

    // Q1 matches its keyword; Q2 and Q3 fall through to non-empty answers
    // (the segmented text and the raw transcript), which the lenient
    // offline rule still rewards.
    assert_eq!(total, 10.0);
    assert_eq!(max, 10.0);
    assert_eq!(progress, vec![33.0, 67.0, 100.0]);
}

#[test]
fn empty_submission_grades_every_item_to_zero() {
    let answers = extract_answers_from_text("");
    assert!(answers.is_empty());

    let rubric = vec![
        rubric_row("1", &["derivative"], 5, 0),
        rubric_row("2", &[], 3, 1),
    ];

    let mut rows = 0;
    let mut total = 0.0;
    for item in &rubric {
        let answer = resolve_answer(&answers, &item.question_number, None);
        assert_eq!(answer, "");
        let grade = offline_grade(item, answer);
        total += grade.marks_awarded;
        rows += 1;
    }

    // Every rubric item still produces a grade, all at zero marks.
    assert_eq!(rows, 2);
    assert_eq!(total, 0.0);
}
