//! `MerchantPlus` API server.
//!
//! Main entry point: wires configuration, the database, the event bus and its
//! sinks, the webhook workers, the closing scheduler, and the HTTP router.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono_tz::Tz;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use merchant_api::{AppState, create_router};
use merchant_core::tenant::TenantDirectory;
use merchant_db::{
    AuditRepository, ClosingRepository, LedgerRepository, TenantRepository, WebhookRepository,
    connect_with_pool,
};
use merchant_engine::{
    CachedTenantDirectory, ClosingAggregator, EventBus, EventPublisher, LedgerEngine, LiveGateway,
    ReqwestTransport, TenantContextResolver, WebhookDispatcher, WebhookEndpoints, WebhookFanout,
};
use merchant_shared::{AppConfig, JwtConfig, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(config.log.json);

    let db = connect_with_pool(
        &config.database.url,
        config.database.max_connections,
        config.database.min_connections,
    )
    .await
    .context("Failed to connect to database")?;
    info!("Connected to database");

    let jwt_service = JwtService::new(JwtConfig {
        secret: config.jwt.secret.clone(),
        access_token_expires_secs: i64::try_from(config.jwt.access_token_expiry_secs)
            .context("jwt.access_token_expiry_secs is too large")?,
    });

    // Storage ports
    let ledger_store = Arc::new(LedgerRepository::new(db.clone()));
    let webhook_store = Arc::new(WebhookRepository::new(db.clone()));
    let closing_store = Arc::new(ClosingRepository::new(db.clone()));
    let audit_log = Arc::new(AuditRepository::new(db.clone()));
    let directory: Arc<dyn TenantDirectory> = Arc::new(CachedTenantDirectory::new(
        Arc::new(TenantRepository::new(db)),
        Duration::from_secs(config.tenant.cache_ttl_secs),
    ));

    // Event bus and its sinks
    let bus = Arc::new(EventBus::new(config.bus.clone()));
    let live = LiveGateway::new(config.live.session_buffer);
    let fanout = Arc::new(WebhookFanout::new(webhook_store.clone()));
    bus.register(fanout.clone());
    bus.register(live.clone());
    info!(sinks = bus.sink_count(), "Event bus ready");

    let ledger = Arc::new(LedgerEngine::new(ledger_store.clone(), bus.clone()));
    let timezone: Tz = config
        .closing
        .timezone
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid closing.timezone: {e}"))?;
    let closings = Arc::new(ClosingAggregator::new(
        closing_store,
        ledger_store,
        directory.clone(),
        timezone,
    ));

    // Background workers
    let cancel = CancellationToken::new();
    let tracker = TaskTracker::new();
    let transport = ReqwestTransport::new(
        Duration::from_secs(config.webhook.request_timeout_secs),
        &config.webhook.user_agent,
    )
    .context("Failed to build webhook HTTP client")?;
    let dispatcher = Arc::new(WebhookDispatcher::new(
        webhook_store.clone(),
        Arc::new(transport),
        &config.webhook,
    ));
    dispatcher.spawn_workers(config.webhook.workers, &cancel, &tracker);
    tracker.spawn(fanout.run(
        Duration::from_secs(config.webhook.outbox_sweep_secs.max(1)),
        u32::try_from(config.webhook.batch_size).unwrap_or(u32::MAX),
        cancel.clone(),
    ));

    if config.closing.enabled {
        tracker.spawn(Arc::clone(&closings).run(
            Duration::from_secs(config.closing.interval_secs.max(1)),
            cancel.clone(),
        ));
    } else {
        info!("Closing scheduler disabled");
    }

    let state = AppState {
        jwt_service: Arc::new(jwt_service),
        tenants: Arc::new(TenantContextResolver::new(directory)),
        ledger,
        closings,
        webhooks: WebhookEndpoints::new(webhook_store.clone()),
        publisher: EventPublisher::new(bus.clone(), webhook_store.clone()),
        audit: audit_log,
        live,
    };
    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    info!("Draining background work");
    cancel.cancel();
    tracker.close();
    tracker.wait().await;
    bus.shutdown().await;
    info!("Shutdown complete");

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "merchant=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Resolves on Ctrl-C or SIGTERM and cancels the workers.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for SIGTERM"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutdown signal received");
    cancel.cancel();
}
