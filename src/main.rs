use std::{process, sync::Arc, time::Duration};

use shelfmark::{
    application::{
        catalog::{Catalog, CatalogDeps, CatalogSettings},
        error::AppError,
        ports::{BlobStorage, MessagePublisher, TokenIssuer},
        repos::{BooksRepo, UsersRepo},
    },
    cache::{self, CacheConfig, ResilientCache},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState},
        memory::InMemoryRepositories,
        messaging::{LogPublisher, WebhookPublisher},
        security::{BcryptPasswordHasher, JwtTokenIssuer},
        storage::FsBlobStorage,
        telemetry::{self, MetricsTelemetry},
    },
    util::clock::{Clock, SystemClock},
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let database_url = settings
        .database
        .url
        .as_deref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))?;
    let pool =
        PostgresRepositories::connect(database_url, settings.database.max_connections.get())
            .await
            .map_err(InfraError::from)?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(InfraError::from)?;
    info!("migrations applied");
    Ok(())
}

struct Repositories {
    books: Arc<dyn BooksRepo>,
    users: Arc<dyn UsersRepo>,
    postgres: Option<PostgresRepositories>,
}

async fn init_repositories(settings: &config::Settings) -> Result<Repositories, AppError> {
    let Some(database_url) = settings.database.url.as_deref() else {
        warn!("no database configured; catalog data is kept in memory");
        let memory = Arc::new(InMemoryRepositories::new());
        return Ok(Repositories {
            books: memory.clone(),
            users: memory,
            postgres: None,
        });
    };

    let pool =
        PostgresRepositories::connect(database_url, settings.database.max_connections.get())
            .await
            .map_err(InfraError::from)?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(InfraError::from)?;

    let postgres = PostgresRepositories::new(pool);
    let shared = Arc::new(postgres.clone());
    Ok(Repositories {
        books: shared.clone(),
        users: shared,
        postgres: Some(postgres),
    })
}

fn init_publisher(settings: &config::MessagingSettings) -> Result<Arc<dyn MessagePublisher>, AppError> {
    match settings.webhook_url.as_deref() {
        Some(url) => {
            let publisher = WebhookPublisher::new(url, settings.timeout).map_err(|err| {
                InfraError::configuration(format!("webhook publisher: {err}"))
            })?;
            info!(url, "publishing change notifications to webhook");
            Ok(Arc::new(publisher))
        }
        None => {
            info!("no webhook configured; change notifications are logged only");
            Ok(Arc::new(LogPublisher))
        }
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let repositories = init_repositories(&settings).await?;

    let cache_config = CacheConfig::from(&settings.cache);
    let store = cache::connect(&cache_config, clock.clone())
        .await
        .map_err(InfraError::from)?;
    let cache = ResilientCache::new(store);

    let blobs: Arc<dyn BlobStorage> = Arc::new(
        FsBlobStorage::new(
            settings.storage.covers_directory.clone(),
            settings.storage.public_base_url.clone(),
        )
        .map_err(InfraError::from)?,
    );

    if settings.auth.ephemeral_secret {
        warn!("auth.token_secret is not set; issued tokens will not survive a restart");
    }
    let tokens: Arc<dyn TokenIssuer> = Arc::new(JwtTokenIssuer::new(
        &settings.auth.token_secret,
        settings.auth.issuer.clone(),
        settings.auth.token_lifetime,
        clock.clone(),
    ));

    let deps = CatalogDeps {
        books: repositories.books,
        users: repositories.users,
        cache,
        publisher: init_publisher(&settings.messaging)?,
        telemetry: Arc::new(MetricsTelemetry),
        blobs: blobs.clone(),
        hasher: Arc::new(BcryptPasswordHasher::new(settings.auth.password_hash_cost)),
        tokens: tokens.clone(),
        clock,
    };
    let catalog_settings = CatalogSettings {
        slow_operation_threshold: settings.pipeline.slow_operation_threshold,
        default_cache_ttl: cache_config.default_ttl(),
        on_publish_failure: settings.messaging.on_publish_failure,
        max_cover_bytes: settings.storage.max_cover_bytes.get(),
    };

    let state = HttpState {
        catalog: Arc::new(Catalog::new(deps, catalog_settings)),
        tokens,
        blobs,
        db: repositories.postgres,
        max_cover_bytes: settings.storage.max_cover_bytes.get(),
    };

    serve_http(&settings, state).await
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(InfraError::from)?;
    info!(addr = %settings.server.addr, "listening");

    let grace = settings.server.graceful_shutdown;
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal(grace))
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    info!("server stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM, then arms a hard deadline for in-flight requests.
async fn shutdown_signal(grace: Duration) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!(grace_secs = grace.as_secs(), "shutdown requested; draining connections");
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        warn!("graceful shutdown deadline elapsed; exiting");
        process::exit(0);
    });
}
