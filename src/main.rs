use std::{process, sync::Arc};

use review_service::{
    application::{
        error::AppError,
        ids::IdGenerator,
        listing::{ListingConfig, ReviewListingService},
        moderation::ModerationService,
        repos::{PageCache, ReviewSearch, ReviewsRepo, ReviewsWriteRepo},
        reviews::ReviewService,
    },
    config::{self, CacheBackend},
    infra::{
        cache::{MemoryPageCache, RedisPageCache},
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState},
        search::ElasticReviewSearch,
        snowflake::SnowflakeGenerator,
        telemetry,
    },
};
use tokio::sync::watch;
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

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let state = build_http_state(repositories, &settings).await?;
    serve_http(&settings, state).await
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    init_repositories(&settings).await?;
    info!("database migrations applied");
    Ok(())
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(
        database_url,
        settings.database.max_connections.get(),
        settings.database.acquire_timeout,
    )
    .await
    .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

async fn build_page_cache(settings: &config::Settings) -> Result<Arc<dyn PageCache>, AppError> {
    match settings.listing.cache_backend {
        CacheBackend::Redis => {
            let cache = RedisPageCache::connect(&settings.redis.url, settings.redis.timeout)
                .await
                .map_err(AppError::from)?;
            info!(url = %settings.redis.url, "listing cache backed by redis");
            Ok(Arc::new(cache))
        }
        CacheBackend::Memory => {
            let cache = MemoryPageCache::new(settings.listing.memory_entries);
            info!(
                capacity = cache.capacity(),
                "listing cache held in process memory"
            );
            Ok(Arc::new(cache))
        }
    }
}

async fn build_http_state(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<HttpState, AppError> {
    let reader: Arc<dyn ReviewsRepo> = repositories.clone();
    let writer: Arc<dyn ReviewsWriteRepo> = repositories.clone();
    let ids: Arc<dyn IdGenerator> = Arc::new(SnowflakeGenerator::new(settings.ids.node_id));
    let paging = ListingConfig::from(&settings.listing);

    let search: Arc<dyn ReviewSearch> = Arc::new(
        ElasticReviewSearch::new(
            &settings.search.url,
            &settings.search.index,
            settings.search.timeout,
        )
        .map_err(AppError::from)?,
    );
    let cache = build_page_cache(settings).await?;

    Ok(HttpState {
        reviews: Arc::new(ReviewService::new(
            reader.clone(),
            writer.clone(),
            ids.clone(),
            paging.clone(),
        )),
        moderation: Arc::new(ModerationService::new(reader, writer, ids)),
        listing: Arc::new(ReviewListingService::new(cache, search, paging)),
        db: Some(repositories),
    })
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "review service listening");

    let (stopping_tx, mut stopping_rx) = watch::channel(false);
    let server = async move {
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                let _ = stopping_tx.send(true);
            })
            .await
    };

    // In-flight requests get `graceful_shutdown` to drain once a signal arrives.
    let grace = settings.server.graceful_shutdown;
    let drain_deadline = async move {
        if stopping_rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
            info!("review service stopped");
        }
        () = drain_deadline => {
            warn!(grace_seconds = grace.as_secs(), "graceful shutdown timed out; dropping open connections");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
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
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!("shutdown signal received");
}
