use std::{net::SocketAddr, process, sync::Arc};

use axum::Router;
use taskflow::{
    application::{error::AppError, tasks::TaskService, users::UserService},
    cache::{CacheBackend, CacheConfig, CacheKey, MemoryCacheBackend, ReadThroughCache},
    config,
    events::{
        Broadcaster, BusConnector, BusSubscriber, EventPublisher, MemoryBus, NotificationListener,
    },
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, NotificationsState, TasksState, UsersState},
        redis::{RedisCacheBackend, RedisConnector, RedisSubscriber},
        telemetry,
    },
};
use tokio::{sync::watch, try_join};
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
        config::Command::Serve(_) => run_services(&settings, Services::ALL).await,
        config::Command::Tasks(_) => run_services(&settings, Services::TASKS).await,
        config::Command::Users(_) => run_services(&settings, Services::USERS).await,
        config::Command::Notifications(_) => {
            run_services(&settings, Services::NOTIFICATIONS).await
        }
        config::Command::Migrate(_) => run_migrate(&settings).await,
    }
}

#[derive(Debug, Clone, Copy)]
struct Services {
    tasks: bool,
    users: bool,
    notifications: bool,
}

impl Services {
    const ALL: Self = Self {
        tasks: true,
        users: true,
        notifications: true,
    };
    const TASKS: Self = Self {
        tasks: true,
        users: false,
        notifications: false,
    };
    const USERS: Self = Self {
        tasks: false,
        users: true,
        notifications: false,
    };
    const NOTIFICATIONS: Self = Self {
        tasks: false,
        users: false,
        notifications: true,
    };

    fn needs_database(self) -> bool {
        self.tasks || self.users
    }
}

/// Process-owned cache and message bus handles.
struct Backends {
    cache_backend: Option<Arc<dyn CacheBackend>>,
    connector: Arc<dyn BusConnector>,
    subscriber: Arc<dyn BusSubscriber>,
}

impl Backends {
    fn cache(&self) -> ReadThroughCache {
        match self.cache_backend.as_ref() {
            Some(backend) => ReadThroughCache::new(Arc::clone(backend)),
            None => ReadThroughCache::disabled(),
        }
    }
}

fn init_backends(
    settings: &config::Settings,
    cache_config: &CacheConfig,
) -> Result<Backends, AppError> {
    let cache_backend: Option<Arc<dyn CacheBackend>> = match settings.cache.url.as_deref() {
        _ if !cache_config.enabled => {
            info!(target = "taskflow::bootstrap", "read-through cache disabled");
            None
        }
        Some(url) => Some(Arc::new(RedisCacheBackend::open(url)?)),
        None => {
            info!(
                target = "taskflow::bootstrap",
                "no cache url configured; using in-process cache"
            );
            Some(Arc::new(MemoryCacheBackend::new()))
        }
    };

    let (connector, subscriber): (Arc<dyn BusConnector>, Arc<dyn BusSubscriber>) =
        match settings.pubsub.url.as_deref() {
            Some(url) => (
                Arc::new(RedisConnector::open(url)?),
                Arc::new(RedisSubscriber::open(url)?),
            ),
            None => {
                info!(
                    target = "taskflow::bootstrap",
                    "no pub/sub url configured; events stay in this process"
                );
                let bus = MemoryBus::new();
                (Arc::new(bus.clone()), Arc::new(bus))
            }
        };

    Ok(Backends {
        cache_backend,
        connector,
        subscriber,
    })
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

async fn run_migrate(settings: &config::Settings) -> Result<(), AppError> {
    init_repositories(settings).await?;
    info!(target = "taskflow::migrate", "migrations applied");
    Ok(())
}

async fn run_services(settings: &config::Settings, services: Services) -> Result<(), AppError> {
    let cache_config = CacheConfig::from(&settings.cache);
    let backends = init_backends(settings, &cache_config)?;
    let repositories = if services.needs_database() {
        Some(init_repositories(settings).await?)
    } else {
        None
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(forward_ctrl_c(shutdown_tx));

    let tasks_router = match repositories.as_ref().filter(|_| services.tasks) {
        Some(repositories) => {
            let publisher = Arc::new(EventPublisher::new(Arc::clone(&backends.connector)));
            let tasks = TaskService::new(
                repositories.clone(),
                repositories.clone(),
                backends.cache(),
                publisher,
                settings.pubsub.channel.clone(),
                cache_config.ttl_for(CacheKey::AllTasks),
            );
            Some(http::build_tasks_router(TasksState {
                tasks,
                database: Some(PostgresRepositories::clone(repositories)),
            }))
        }
        None => None,
    };

    let users_router = match repositories.as_ref().filter(|_| services.users) {
        Some(repositories) => {
            let users = UserService::new(
                repositories.clone(),
                backends.cache(),
                cache_config.ttl_for(CacheKey::AllUsers),
            );
            Some(http::build_users_router(UsersState {
                users,
                database: Some(PostgresRepositories::clone(repositories)),
            }))
        }
        None => None,
    };

    let (notifications_router, listener_handle) = if services.notifications {
        let broadcaster = Broadcaster::new(settings.notifications.broadcast_capacity.get());
        let listener = Arc::new(NotificationListener::new(
            Arc::clone(&backends.subscriber),
            broadcaster.clone(),
            settings.pubsub.channel.clone(),
            settings.notifications.reconnect_delay,
        ));
        let handle = tokio::spawn(Arc::clone(&listener).run(shutdown_rx.clone()));
        let router = http::build_notifications_router(NotificationsState {
            broadcaster,
            listener,
        });
        (Some(router), Some(handle))
    } else {
        (None, None)
    };

    try_join!(
        serve("tasks", settings.server.tasks_addr, tasks_router, shutdown_rx.clone()),
        serve("users", settings.server.users_addr, users_router, shutdown_rx.clone()),
        serve(
            "notifications",
            settings.server.notifications_addr,
            notifications_router,
            shutdown_rx.clone(),
        ),
    )?;

    if let Some(handle) = listener_handle
        && let Err(err) = handle.await
    {
        warn!(target = "taskflow::bootstrap", error = %err, "notification listener panicked");
    }

    info!(target = "taskflow::bootstrap", "shutdown complete");
    Ok(())
}

async fn serve(
    name: &'static str,
    addr: SocketAddr,
    router: Option<Router>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), AppError> {
    let Some(router) = router else {
        return Ok(());
    };

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(InfraError::from)?;
    info!(target = "taskflow::bootstrap", service = name, %addr, "listening");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
        .map_err(|err| AppError::unexpected(format!("{name} server error: {err}")))
}

async fn forward_ctrl_c(shutdown: watch::Sender<bool>) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!(target = "taskflow::bootstrap", "shutdown requested");
            let _ = shutdown.send(true);
        }
        Err(err) => {
            warn!(
                target = "taskflow::bootstrap",
                error = %err,
                "failed to listen for ctrl-c; graceful shutdown unavailable"
            );
            // Keep the sender alive so receivers do not observe a closed channel.
            std::future::pending::<()>().await;
            drop(shutdown);
        }
    }
}
