pub mod embed_service;
pub mod embedding_job;
pub mod file_search_service;
pub mod gemini_service;
pub mod grading_job;
pub mod grading_service;
pub mod notification_service;
pub mod ocr_service;
pub mod pdf_service;
pub mod queue_service;
pub mod rag_service;
pub mod rubric_service;
pub mod storage_service;
