use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post, put},
    Router,
};
use grading_backend::{
    config::{get_config, init_config},
    database::pool::create_pool,
    routes, AppState,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    init_config()?;
    let config = get_config();

    let pool = create_pool().await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let app_state = AppState::new(pool);

    for worker in 0..config.queue_workers {
        let state = app_state.clone();
        tokio::spawn(async move {
            loop {
                match state.queue_service.run_once(&state).await {
                    Ok(true) => {}
                    Ok(false) => {
                        tokio::time::sleep(Duration::from_millis(750)).await;
                    }
                    Err(e) => {
                        tracing::error!(worker, error = ?e, "queue worker error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });
    }

    let api = Router::new()
        .route(
            "/api/courses",
            get(routes::courses::list_courses).post(routes::courses::create_course),
        )
        .route(
            "/api/courses/:id/files",
            get(routes::courses::list_course_files),
        )
        .route("/api/graders", post(routes::graders::create_grader))
        .route("/api/graders/:id", get(routes::graders::get_grader))
        .route(
            "/api/graders/:id/rubric",
            put(routes::graders::replace_rubric),
        )
        .route(
            "/api/graders/:id/submissions",
            get(routes::submissions::list_submissions)
                .post(routes::submissions::upload_submissions),
        )
        .route(
            "/api/graders/:id/grade-all",
            post(routes::submissions::grade_all),
        )
        .route(
            "/api/submissions/:id",
            get(routes::submissions::get_submission),
        )
        .route(
            "/api/submission-grades/:id",
            patch(routes::submissions::override_grade),
        )
        .route(
            "/api/notifications",
            get(routes::notifications::poll_notifications),
        )
        .route(
            "/api/admin/dead-letters",
            get(routes::admin::list_dead_letters),
        )
        .layer(axum::middleware::from_fn(
            grading_backend::middleware::auth::require_bearer_auth,
        ));

    info!("Serving uploads from: {}", config.uploads_dir);

    let app = Router::new()
        .route("/health", get(routes::health::health))
        .merge(api)
        .nest_service(
            "/uploads",
            tower_http::services::ServeDir::new(&config.uploads_dir),
        )
        .with_state(app_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(50 * 1024 * 1024));

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
