use std::{process, sync::Arc, time::Duration};

use lettura::{
    application::{
        api_keys::ApiKeyService,
        error::AppError,
        repos::{ApiKeysRepo, CacheRepo, UsageRepo},
        scrape::{ScrapeService, ScrapeServiceConfig},
    },
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiRateLimiter, AppState},
        reader::ReaderClient,
        telemetry,
    },
};
use metrics::counter;
use tokio::{net::TcpListener, sync::Notify};
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
        config::Command::SeedKey(args) => run_seed_key(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let state = build_app_state(repositories.clone(), &settings)?;

    let sweeper_handle = spawn_cache_sweeper(repositories, &settings.cache);

    let result = serve_http(&settings, state).await;

    sweeper_handle.abort();
    let _ = sweeper_handle.await;

    result
}

async fn run_seed_key(
    settings: config::Settings,
    args: config::SeedKeyArgs,
) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let api_keys_repo: Arc<dyn ApiKeysRepo> = repositories;
    let service = ApiKeyService::new(api_keys_repo);

    let issued = service
        .issue(args.name, args.rate_limit)
        .await
        .map_err(|err| AppError::unexpected(format!("failed to create API key: {err}")))?;

    println!("Created API key `{}` ({})", issued.record.name, issued.record.id);
    println!();
    println!("  {}", issued.token);
    println!();
    println!("The key is stored as entered above and will not be shown again.");
    println!("Example request:");
    println!();
    println!("  curl -X POST http://{}/v1/scrape \\", settings.server.addr);
    println!("    -H 'Content-Type: application/json' \\");
    println!("    -H 'X-API-Key: {}' \\", issued.token);
    println!("    -d '{{\"url\": \"https://example.com\"}}'");

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

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_app_state(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<AppState, AppError> {
    let api_keys_repo: Arc<dyn ApiKeysRepo> = repositories.clone();
    let cache_repo: Arc<dyn CacheRepo> = repositories.clone();
    let usage_repo: Arc<dyn UsageRepo> = repositories;

    let delegate = Arc::new(ReaderClient::new(&settings.reader).map_err(AppError::from)?);

    let scrape = Arc::new(ScrapeService::new(
        cache_repo,
        usage_repo,
        delegate,
        ScrapeServiceConfig {
            cache_ttl: settings.cache.ttl,
            default_timeout: settings.reader.default_timeout,
        },
    ));

    let rate_limiter = Arc::new(ApiRateLimiter::new(
        settings.rate_limit.window,
        settings.rate_limit.default_rpm.get(),
    ));

    Ok(AppState {
        api_keys: Arc::new(ApiKeyService::new(api_keys_repo)),
        scrape,
        rate_limiter,
    })
}

fn spawn_cache_sweeper(
    repositories: Arc<PostgresRepositories>,
    cache: &config::CacheSettings,
) -> tokio::task::JoinHandle<()> {
    let ttl = cache.ttl;
    let mut interval = tokio::time::interval(cache.sweep_interval);

    tokio::spawn(async move {
        interval.tick().await; // Skip the first immediate tick
        loop {
            interval.tick().await;
            let cache_repo: &dyn CacheRepo = repositories.as_ref();
            match cache_repo.purge_expired(ttl).await {
                Ok(0) => {}
                Ok(purged) => {
                    counter!("lettura_cache_purged_total").increment(purged);
                    info!(
                        target = "lettura::cache",
                        purged = purged,
                        "purged expired cache entries"
                    );
                }
                Err(err) => {
                    warn!(
                        target = "lettura::cache",
                        error = %err,
                        "cache sweep failed"
                    );
                }
            }
        }
    })
}

async fn serve_http(settings: &config::Settings, state: AppState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "lettura::http",
        addr = %settings.server.addr,
        "gateway listening"
    );

    let shutdown = Arc::new(Notify::new());
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!(target = "lettura", "shutdown signal received, draining connections");
        trigger.notify_waiters();
    });

    let drain_limit = settings.server.graceful_shutdown;
    let server_shutdown = shutdown.clone();
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move { server_shutdown.notified().await });

    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))
        }
        () = drain_deadline(shutdown, drain_limit) => {
            Err(AppError::unexpected("graceful shutdown timed out"))
        }
    }
}

async fn drain_deadline(shutdown: Arc<Notify>, limit: Duration) {
    shutdown.notified().await;
    tokio::time::sleep(limit).await;
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(err) => {
            warn!(target = "lettura", error = %err, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
