use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use litreview::auth::JwtSecret;
use litreview::config::AppConfig;
use litreview::openapi::ApiDoc;
use litreview::repo::Repo;
use litreview::{config, AppState};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env automatically only in debug builds to reduce manual setup overhead.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping litreview server");

    let cfg = AppConfig::from_env().context("invalid configuration")?;
    let repo = build_repo(&cfg).await?;

    let openapi = ApiDoc::openapi();
    let state = web::Data::new(AppState { repo });
    let secret = web::Data::new(JwtSecret(cfg.jwt_secret.clone()));
    let frontend_url = cfg.frontend_url.clone();

    let server = HttpServer::new(move || {
        let mut cors = Cors::default()
            .allowed_origin("http://localhost:5173")
            .allowed_origin("http://127.0.0.1:5173")
            .allow_any_header()
            .allowed_methods(["GET", "POST", "PATCH", "DELETE", "OPTIONS"])
            .max_age(3600);
        if let Some(front) = frontend_url.as_deref() {
            cors = cors.allowed_origin(front);
        }

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(cors)
            .app_data(state.clone())
            .app_data(secret.clone())
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind(cfg.bind.as_str())
    .with_context(|| format!("failed to bind {}", cfg.bind))?;

    info!(bind = %cfg.bind, "listening");

    server.run().await?;
    Ok(())
}

#[cfg(feature = "postgres-store")]
async fn build_repo(cfg: &AppConfig) -> anyhow::Result<Arc<dyn Repo>> {
    use litreview::repo::pg::PgRepo;
    use sqlx::postgres::PgPoolOptions;

    let db_url = cfg.database_url.as_deref().context("DATABASE_URL must be set for postgres-store")?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("failed to connect to Postgres")?;
    let repo = PgRepo::new(pool);
    repo.migrate().await.context("failed to run migrations")?;
    info!("Using Postgres repository backend");
    Ok(Arc::new(repo))
}

#[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
async fn build_repo(cfg: &AppConfig) -> anyhow::Result<Arc<dyn Repo>> {
    use litreview::repo::inmem::InMemRepo;

    let path = cfg.snapshot_path();
    info!(snapshot = %path.display(), "Using in-memory repository backend");
    let repo = InMemRepo::with_snapshot(path).context("failed to load snapshot")?;
    Ok(Arc::new(repo))
}
