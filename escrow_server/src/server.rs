use std::{future::Future, path::Path, pin::Pin, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use escrow_engine::{
    events::{EventHandlers, EventHooks, EventProducers, OrderEscalatedEvent, StatusChangedEvent},
    ConfigApi,
    DisputeApi,
    OrderFlowApi,
    ReconcileOptions,
    ReconciliationApi,
    SettlementApi,
    SqliteDatabase,
    StoreApi,
};
use log::*;

use crate::{
    config::ServerConfig,
    errors::ServerError,
    reconciliation_worker::start_reconciliation_worker,
    routes::{
        configure_extractors,
        health,
        AddClaimRoute,
        AssignEscrowAddressRoute,
        CreateOrderRoute,
        DeleteOrderRoute,
        DisputeDetailsRoute,
        ListDisputesRoute,
        ListOrdersRoute,
        OpenDisputeRoute,
        OrderEventsRoute,
        OrderStatusRoute,
        RecordChainRoute,
        RecordDepositRoute,
        RecordShippingRoute,
        ResolveDisputeRoute,
        SetVendorTierRoute,
        SettleOrderRoute,
        StartReviewRoute,
        StoreDepositsRoute,
    },
};

const EVENT_BUFFER_SIZE: usize = 64;

type HookFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    ensure_database_directory(&config.database_url)?;
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    if config.run_migrations {
        db.migrate().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    }
    let config_api = ConfigApi::new(db.clone());
    config_api.seed_defaults().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;

    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, logging_hooks());
    let producers = handlers.producers();
    handlers.start_handlers();

    let options = ReconcileOptions {
        batch_size: config.reconcile_batch_size,
        row_timeout: to_std(config.reconcile_row_timeout, "ESC_RECONCILE_ROW_TIMEOUT")?,
    };
    let interval = to_std(config.reconcile_interval, "ESC_RECONCILE_INTERVAL")?;
    let reconciler = ReconciliationApi::new(db.clone(), config_api.clone(), producers.clone(), options);
    let _worker = start_reconciliation_worker(reconciler, interval);

    let srv = create_server_instance(config, db, config_api, producers)?;
    srv.await.map_err(|e| ServerError::BackendError(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    config_api: ConfigApi<SqliteDatabase>,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let srv = HttpServer::new(move || {
        let orders_api = OrderFlowApi::new(db.clone(), config_api.clone(), producers.clone());
        let disputes_api = DisputeApi::new(db.clone(), producers.clone());
        let settlement_api = SettlementApi::new(db.clone(), config_api.clone(), producers.clone());
        let store_api = StoreApi::new(db.clone());
        let api_scope = web::scope("/api")
            .service(CreateOrderRoute::<SqliteDatabase>::new())
            .service(ListOrdersRoute::<SqliteDatabase>::new())
            .service(OrderStatusRoute::<SqliteDatabase>::new())
            .service(OrderEventsRoute::<SqliteDatabase>::new())
            .service(AssignEscrowAddressRoute::<SqliteDatabase>::new())
            .service(RecordDepositRoute::<SqliteDatabase>::new())
            .service(RecordShippingRoute::<SqliteDatabase>::new())
            .service(RecordChainRoute::<SqliteDatabase>::new())
            .service(OpenDisputeRoute::<SqliteDatabase>::new())
            .service(SettleOrderRoute::<SqliteDatabase>::new())
            .service(DeleteOrderRoute::<SqliteDatabase>::new())
            .service(ListDisputesRoute::<SqliteDatabase>::new())
            .service(DisputeDetailsRoute::<SqliteDatabase>::new())
            .service(AddClaimRoute::<SqliteDatabase>::new())
            .service(StartReviewRoute::<SqliteDatabase>::new())
            .service(ResolveDisputeRoute::<SqliteDatabase>::new())
            .service(StoreDepositsRoute::<SqliteDatabase>::new())
            .service(SetVendorTierRoute::<SqliteDatabase>::new());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("escrow::access_log"))
            .configure(configure_extractors)
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(disputes_api))
            .app_data(web::Data::new(settlement_api))
            .app_data(web::Data::new(store_api))
            .service(health)
            .service(api_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

/// Hooks that record notable engine events in the log. Webhook delivery would be registered here as well.
fn logging_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks
        .on_status_changed(|ev: StatusChangedEvent| {
            Box::pin(async move {
                info!("📬️ Order {} is now {} (event #{})", ev.event.transaction_id, ev.event.status, ev.event.id);
            }) as HookFuture
        })
        .on_order_escalated(|ev: OrderEscalatedEvent| {
            Box::pin(async move {
                warn!(
                    "📬️ Order {} has been stuck since {} and needs manual attention",
                    ev.transaction_id, ev.stuck_since
                );
            }) as HookFuture
        });
    hooks
}

fn to_std(duration: chrono::Duration, name: &str) -> Result<Duration, ServerError> {
    duration.to_std().map_err(|e| ServerError::ConfigurationError(format!("{name} is out of range. {e}")))
}

/// SQLite creates the database file on demand but not its parent directory.
fn ensure_database_directory(url: &str) -> Result<(), ServerError> {
    let Some(path) = url.strip_prefix("sqlite://").or_else(|| url.strip_prefix("sqlite:")) else {
        return Ok(());
    };
    let path = path.split('?').next().unwrap_or_default();
    if path.is_empty() || path == ":memory:" {
        return Ok(());
    }
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        debug!("🗃️ Ensuring database directory {} exists", parent.display());
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}
