pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use crate::services::{
    embed_service::EmbedService, file_search_service::FileSearchService,
    gemini_service::GeminiClient, grading_service::GradingService,
    notification_service::NotificationService, ocr_service::OcrService,
    queue_service::QueueService, rag_service::RagService, rubric_service::RubricService,
    storage_service::StorageService,
};
use reqwest::Client;
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub storage_service: StorageService,
    pub ocr_service: OcrService,
    pub rubric_service: RubricService,
    pub embed_service: EmbedService,
    pub file_search_service: FileSearchService,
    pub rag_service: RagService,
    pub grading_service: GradingService,
    pub queue_service: QueueService,
    pub notification_service: NotificationService,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        let config = crate::config::get_config();
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .unwrap();

        let gemini = GeminiClient::new(
            config.gemini_api_key.clone(),
            http_client,
            config.gemini_model.clone(),
            config.embedding_model.clone(),
        );

        let storage_service = StorageService::new(config.uploads_dir.clone());
        let ocr_service = OcrService::new(gemini.clone());
        let rubric_service = RubricService::new(gemini.clone());
        let embed_service = EmbedService::new(gemini.clone());
        let file_search_service = FileSearchService::new(
            pool.clone(),
            gemini.clone(),
            config.file_search_enabled,
            config.file_search_model.clone(),
            config.file_search_store_prefix.clone(),
            config.file_search_poll_ms,
            config.file_search_max_wait_ms,
        );
        let rag_service = RagService::new(
            pool.clone(),
            embed_service.clone(),
            file_search_service.clone(),
        );
        let grading_service = GradingService::new(gemini, rag_service.clone());
        let queue_service = QueueService::new(
            pool.clone(),
            config.queue_max_attempts,
            config.queue_backoff_base_ms,
        );
        let notification_service = NotificationService::new(pool.clone());

        Self {
            pool,
            storage_service,
            ocr_service,
            rubric_service,
            embed_service,
            file_search_service,
            rag_service,
            grading_service,
            queue_service,
            notification_service,
        }
    }
}
