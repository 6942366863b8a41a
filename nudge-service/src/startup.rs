//! Application startup and lifecycle management.

use crate::config::{NudgeConfig, RateLimitBackend};
use crate::handlers;
use crate::services::{
    EmailProvider, HttpIdentityProvider, IdentityProvider, InvoiceLocks, MockEmailProvider,
    MongoStore, NoopIdentityProvider, NudgeStore, ReminderDispatcher, ReminderScheduler,
    SchedulerPolicy, SendService, SmtpProvider,
};
use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics_middleware, rate_limit_middleware, request_id_middleware,
    security_headers_middleware, GovernorRateLimitStore, RateLimitState, RateLimitStore,
    RedisRateLimitStore, REQUEST_ID_HEADER,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

const RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn NudgeStore>,
    pub sends: Arc<SendService>,
    pub scheduler: Arc<ReminderScheduler>,
    pub locks: InvoiceLocks,
    pub cron_secret: String,
}

impl AppState {
    /// Wires the send paths and the batch scheduler around one store, one
    /// provider and one lock table.
    pub fn new(
        store: Arc<dyn NudgeStore>,
        email: Arc<dyn EmailProvider>,
        identity: Arc<dyn IdentityProvider>,
        cron_secret: impl Into<String>,
        from_name: impl Into<String>,
        policy: SchedulerPolicy,
    ) -> Self {
        let locks = InvoiceLocks::new();
        let dispatcher = Arc::new(ReminderDispatcher::new(
            store.clone(),
            email,
            identity,
            from_name,
        ));
        let sends = Arc::new(SendService::new(
            store.clone(),
            dispatcher.clone(),
            locks.clone(),
        ));
        let scheduler = Arc::new(ReminderScheduler::new(
            store.clone(),
            dispatcher,
            locks.clone(),
            policy,
        ));

        Self {
            store,
            sends,
            scheduler,
            locks,
            cron_secret: cron_secret.into(),
        }
    }
}

/// Full HTTP surface. User routes are rate limited per `X-User-ID` and
/// route; probes and the cron trigger are not.
pub fn build_router(state: AppState, rate_limit: RateLimitState) -> Router {
    let user_routes = Router::new()
        .route(
            "/api/clients",
            post(handlers::clients::create_client).get(handlers::clients::list_clients),
        )
        .route("/api/clients/:id", get(handlers::clients::get_client))
        .route(
            "/api/workspace",
            get(handlers::workspace::get_workspace).put(handlers::workspace::update_workspace),
        )
        .route(
            "/api/invoices",
            post(handlers::invoices::create_invoice).get(handlers::invoices::list_invoices),
        )
        .route(
            "/api/invoices/:id",
            get(handlers::invoices::get_invoice).patch(handlers::invoices::update_invoice),
        )
        .route(
            "/api/invoices/:id/duplicate",
            post(handlers::invoices::duplicate_invoice),
        )
        .route("/api/invoices/:id/mark-paid", post(handlers::invoices::mark_paid))
        .route("/api/invoices/:id/send", post(handlers::invoices::send_invoice))
        .route(
            "/api/invoices/:id/send-next-reminder",
            post(handlers::invoices::send_next_reminder),
        )
        .route("/api/invoices/:id/resend", post(handlers::invoices::resend))
        .route("/api/invoices/:id/apply-flow", post(handlers::invoices::apply_flow))
        .route(
            "/api/invoices/:id/templates/:template_id",
            put(handlers::templates::update_template),
        )
        .route(
            "/api/invoices/:id/templates/:template_id/revert",
            post(handlers::templates::revert_template),
        )
        .route(
            "/api/invoices/:id/templates/:template_id/preview",
            get(handlers::templates::preview_template),
        )
        .route(
            "/api/flows",
            post(handlers::flows::create_flow).get(handlers::flows::list_flows),
        )
        .route("/api/flows/:id", axum::routing::delete(handlers::flows::delete_flow))
        .route_layer(from_fn_with_state(rate_limit, rate_limit_middleware));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route("/api/schedules", get(handlers::schedules::list_schedules))
        .route("/api/cron/reminders", get(handlers::cron::run_reminders))
        .merge(user_routes)
        .with_state(state)
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    // Path only: the cron trigger carries its secret in the query.
                    path = %request.uri().path(),
                    user_id = tracing::field::Empty,
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: NudgeConfig) -> Result<Self, AppError> {
        let store = MongoStore::connect(&config.mongodb.uri, &config.mongodb.database)
            .await
            .map_err(|e| {
                tracing::error!("Failed to connect to MongoDB: {}", e);
                e
            })?;

        store.initialize_indexes().await.map_err(|e| {
            tracing::error!("Failed to initialize database indexes: {}", e);
            e
        })?;

        let email_provider: Arc<dyn EmailProvider> = if config.smtp.enabled {
            match SmtpProvider::new(config.smtp.clone()) {
                Ok(provider) => {
                    tracing::info!("SMTP email provider initialized");
                    Arc::new(provider)
                }
                Err(e) => {
                    tracing::warn!("Failed to initialize SMTP provider: {}. Using mock.", e);
                    Arc::new(MockEmailProvider::new())
                }
            }
        } else {
            tracing::info!("SMTP provider disabled, using mock email provider");
            Arc::new(MockEmailProvider::new())
        };

        let identity: Arc<dyn IdentityProvider> =
            match HttpIdentityProvider::from_config(&config.identity) {
                Ok(Some(provider)) => {
                    tracing::info!("Identity provider configured for reply-to lookups");
                    Arc::new(provider)
                }
                Ok(None) => {
                    tracing::info!("No identity provider configured, emails go out without reply-to");
                    Arc::new(NoopIdentityProvider)
                }
                Err(e) => {
                    return Err(AppError::ConfigError(anyhow::anyhow!(
                        "Failed to build identity client: {}",
                        e
                    )))
                }
            };

        let rate_store: Arc<dyn RateLimitStore> = match config.rate_limit.backend {
            RateLimitBackend::Memory => Arc::new(GovernorRateLimitStore::new(
                config.rate_limit.per_minute,
                RATE_LIMIT_WINDOW_SECS,
            )),
            RateLimitBackend::Redis => {
                let url = config.rate_limit.redis_url.as_deref().ok_or_else(|| {
                    AppError::ConfigError(anyhow::anyhow!("REDIS_URL is not set"))
                })?;
                Arc::new(
                    RedisRateLimitStore::connect(
                        url,
                        config.rate_limit.per_minute,
                        RATE_LIMIT_WINDOW_SECS,
                    )
                    .await?,
                )
            }
        };

        if config.cron.secret.is_empty() {
            tracing::warn!("CRON_SECRET is empty, the reminder batch endpoint will reject every call");
        }

        let state = AppState::new(
            Arc::new(store),
            email_provider,
            identity,
            config.cron.secret.clone(),
            config.from_name.clone(),
            SchedulerPolicy::from(config.reminders),
        );
        let router = build_router(state, RateLimitState { store: rate_store });

        // port 0 = random port for testing
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Nudge service listening on port {}", port);

        Ok(Self {
            port,
            listener,
            router,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serve until `shutdown` resolves.
    pub async fn run_until_stopped<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| {
                tracing::error!("HTTP server error: {}", e);
                std::io::Error::other(format!("HTTP server error: {}", e))
            })
    }
}
