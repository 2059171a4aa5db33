use std::{future::IntoFuture, process, sync::Arc, time::Duration};

use itsm::{
    application::{
        auth::{AuthService, TokenKeys},
        catalog::CatalogService,
        error::AppError,
        events::EventPublisher,
        repos::{ServicesRepo, UsersRepo},
        users::UserService,
    },
    cache::{self, CacheConfig, CacheHelper},
    config::{self, LoadError},
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState},
        memory::InMemoryRepositories,
        telemetry,
    },
    messaging::{AmqpBroker, MessageRelay, QueueName, RelayOptions},
    notifications::{NotificationWorker, SlackClient},
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
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(args) => run_serve(settings, args.in_memory).await,
        config::Command::Worker(args) => run_worker(settings, args.queue).await,
    }
}

fn build_relay(settings: &config::Settings) -> Arc<MessageRelay> {
    let broker = AmqpBroker::new(settings.messaging.url.as_str())
        .with_prefetch(settings.messaging.prefetch);
    let options = RelayOptions {
        failure_policy: settings.messaging.failure_policy,
        consumer_tag: settings.messaging.consumer_tag.clone(),
    };
    Arc::new(MessageRelay::new(Arc::new(broker), options))
}

async fn run_serve(settings: config::Settings, in_memory: bool) -> Result<(), AppError> {
    let secret = settings
        .auth
        .secret_key
        .clone()
        .ok_or_else(|| LoadError::invalid("auth.secret_key", "required to sign tokens"))?;

    let (users_repo, services_repo, postgres) = init_repositories(&settings, in_memory).await?;

    let store = cache::build_store(&CacheConfig::from(&settings.cache))?;
    let helper = CacheHelper::with_default_ttl(store.clone(), settings.cache.default_ttl);

    let relay = build_relay(&settings);
    // Publishing connects on demand, so an unreachable broker is not fatal here.
    if let Err(err) = relay.connect().await {
        warn!(target = "itsm::serve", error = %err, "message broker unavailable at startup");
    }
    let events = EventPublisher::new(relay.clone());

    let metrics = match telemetry::install_prometheus() {
        Ok(handle) => Some(handle),
        Err(err) => {
            warn!(target = "itsm::serve", error = %err, "metrics endpoint disabled");
            None
        }
    };

    let state = HttpState {
        users: Arc::new(UserService::new(
            users_repo.clone(),
            helper.clone(),
            events.clone(),
            settings.auth.bcrypt_cost,
        )),
        catalog: Arc::new(CatalogService::new(services_repo, helper, events)),
        auth: Arc::new(AuthService::new(
            users_repo,
            TokenKeys::from_secret(secret.as_bytes(), settings.auth.token_ttl),
        )),
        cache: store,
        metrics,
    };
    let router = http::build_router(state, &settings.cors.allowed_origins);

    let result = serve_http(&settings, router).await;

    relay.close().await;
    if let Some(repositories) = postgres {
        repositories.close().await;
    }
    info!(target = "itsm::serve", "server stopped");
    result
}

type Repositories = (
    Arc<dyn UsersRepo>,
    Arc<dyn ServicesRepo>,
    Option<Arc<PostgresRepositories>>,
);

async fn init_repositories(
    settings: &config::Settings,
    in_memory: bool,
) -> Result<Repositories, AppError> {
    if in_memory {
        warn!(target = "itsm::serve", "using in-memory repositories; data is lost on exit");
        let repositories = Arc::new(InMemoryRepositories::new());
        let users: Arc<dyn UsersRepo> = repositories.clone();
        let services: Arc<dyn ServicesRepo> = repositories;
        return Ok((users, services, None));
    }

    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| LoadError::invalid("database.url", "database url is not configured"))?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| InfraError::migration(err.to_string()))?;

    let repositories = Arc::new(PostgresRepositories::new(pool));
    let users: Arc<dyn UsersRepo> = repositories.clone();
    let services: Arc<dyn ServicesRepo> = repositories.clone();
    Ok((users, services, Some(repositories)))
}

async fn serve_http(settings: &config::Settings, router: axum::Router) -> Result<(), AppError> {
    let addr = settings.server.addr;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| InfraError::Bind { addr, source })?;
    info!(target = "itsm::serve", %addr, "listening");

    let (stopping_tx, stopping_rx) = watch::channel(false);
    let server = axum::serve(listener, router.into_make_service()).with_graceful_shutdown(
        async move {
            shutdown_signal().await;
            let _ = stopping_tx.send(true);
        },
    );

    tokio::select! {
        result = server.into_future() => result.map_err(InfraError::Serve)?,
        () = drain_deadline(stopping_rx, settings.server.graceful_shutdown) => {
            warn!(target = "itsm::serve", "graceful shutdown timed out; dropping open connections");
        }
    }
    Ok(())
}

/// Resolves `grace` after shutdown began; never resolves before that.
async fn drain_deadline(mut stopping: watch::Receiver<bool>, grace: Duration) {
    if stopping.wait_for(|stopping| *stopping).await.is_err() {
        std::future::pending::<()>().await;
    }
    tokio::time::sleep(grace).await;
}

async fn run_worker(settings: config::Settings, queue: QueueName) -> Result<(), AppError> {
    let slack = Arc::new(SlackClient::new(&settings.slack)?);
    if !slack.is_configured() {
        warn!(target = "itsm::worker", "slack bot token missing; notifications will be skipped");
    }
    let worker = NotificationWorker::new(slack);

    let relay = build_relay(&settings);
    relay.connect().await?;
    info!(
        target = "itsm::worker",
        queue = %queue,
        failure_policy = %relay.failure_policy(),
        "worker started"
    );

    let result = relay
        .consume_messages(queue, &worker, shutdown_signal())
        .await;
    relay.close().await;
    info!(target = "itsm::worker", "worker stopped");
    result.map_err(AppError::from)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
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
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
