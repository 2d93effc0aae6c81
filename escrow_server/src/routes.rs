//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. Every engine call is async, so handlers simply `.await` them.
//!
//! Every route is generic over the storage backend, so the endpoint tests can swap in a mock.
use actix_web::{get, web, web::ServiceConfig, HttpResponse, Responder};
use chrono::Utc;
use escrow_engine::{
    db_types::{DisputeId, StoreId, TransactionId},
    escrow_api::{dispute_api::MAX_DISPUTE_LISTING, order_flow_api::MAX_STATUS_LISTING},
    DisputeApi,
    EscrowBackend,
    OrderFlowApi,
    SettlementApi,
    StoreApi,
};
use log::*;

use crate::{
    data_objects::{
        ChainUpdate,
        ClaimRequest,
        DepositRequest,
        DisputeListingQuery,
        EscrowAddressRequest,
        JsonResponse,
        NewOrderRequest,
        OpenDisputeRequest,
        OrderListingQuery,
        ResolveRequest,
        ReviewRequest,
        ShippingUpdate,
        StoreDeposits,
        TierRequest,
    },
    errors::ServerError,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

/// Makes extractor failures (a malformed body, path segment or query string) answer with the same JSON error body as
/// every other failed request.
pub fn configure_extractors(cfg: &mut ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| ServerError::InvalidRequestBody(err.to_string()).into()),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|err, _req| ServerError::InvalidRequestPath(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| ServerError::InvalidRequestPath(err.to_string()).into()),
    );
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(create_order => Post "/orders" impl EscrowBackend);
/// Creates a new order. The response carries the order, its funding record (with the escrow address still pending)
/// and the initial `pending` payment event.
pub async fn create_order<B: EscrowBackend>(
    body: web::Json<NewOrderRequest>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order = body.into_inner().into_new_order(Utc::now());
    debug!("💻️ POST new order for package {} from store {}", order.package_id, order.store_id);
    let created = api.create_order(order).await?;
    Ok(HttpResponse::Created().json(created))
}

route!(list_orders => Get "/orders" impl EscrowBackend);
/// The cumulative status of up to `limit` orders, ordered by id. Pass the last id of a page as `after` to fetch the
/// next one.
pub async fn list_orders<B: EscrowBackend>(
    query: web::Query<OrderListingQuery>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let OrderListingQuery { after, limit } = query.into_inner();
    let limit = limit.unwrap_or(MAX_STATUS_LISTING);
    debug!("💻️ GET order statuses after {after:?}, limit {limit}");
    let reports = api.list_statuses(after, limit).await?;
    Ok(HttpResponse::Ok().json(reports))
}

route!(order_status => Get "/orders/{id}/status" impl EscrowBackend);
/// The order's cumulative status, projected from its event log at the time of the request.
pub async fn order_status<B: EscrowBackend>(
    path: web::Path<TransactionId>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    debug!("💻️ GET status for order {id}");
    let report = api.get_cumulative_status(&id).await?;
    Ok(HttpResponse::Ok().json(report))
}

route!(order_events => Get "/orders/{id}/events" impl EscrowBackend);
pub async fn order_events<B: EscrowBackend>(
    path: web::Path<TransactionId>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    debug!("💻️ GET events for order {id}");
    let events = api.events_for_order(&id).await?;
    Ok(HttpResponse::Ok().json(events))
}

route!(assign_escrow_address => Post "/orders/{id}/escrow_address" impl EscrowBackend);
/// Records the escrow address for an order. Repeating the same address is harmless; a different address is a
/// conflict.
pub async fn assign_escrow_address<B: EscrowBackend>(
    path: web::Path<TransactionId>,
    body: web::Json<EscrowAddressRequest>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    debug!("💻️ POST escrow address for order {id}");
    let evm = api.assign_escrow_address(&id, &body.address).await?;
    Ok(HttpResponse::Ok().json(evm))
}

route!(record_deposit => Post "/orders/{id}/deposits" impl EscrowBackend);
/// Records an observed deposit. A write that the order's state no longer allows is reported in the body with
/// `"outcome": "ignored"` and still returns 200.
pub async fn record_deposit<B: EscrowBackend>(
    path: web::Path<TransactionId>,
    body: web::Json<DepositRequest>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    let DepositRequest { amount, source } = body.into_inner();
    debug!("💻️ POST deposit of {amount} for order {id} from {source}");
    let outcome = api.record_deposit_observed(&id, amount, &source).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

route!(record_shipping => Post "/orders/{id}/shipping" impl EscrowBackend);
pub async fn record_shipping<B: EscrowBackend>(
    path: web::Path<TransactionId>,
    body: web::Json<ShippingUpdate>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    let ShippingUpdate { status, source } = body.into_inner();
    debug!("💻️ POST shipping update [{status}] for order {id}");
    let outcome = api.record_shipping_update(&id, status, &source).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

route!(record_chain => Post "/orders/{id}/chain" impl EscrowBackend);
pub async fn record_chain<B: EscrowBackend>(
    path: web::Path<TransactionId>,
    body: web::Json<ChainUpdate>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    let ChainUpdate { status, source } = body.into_inner();
    debug!("💻️ POST chain status [{status}] for order {id}");
    let outcome = api.record_chain_confirmation(&id, status, &source).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

route!(settle_order => Post "/orders/{id}/settle" impl EscrowBackend);
/// Settles a completed, refunded or resolved order. Settling twice returns the original settlement.
pub async fn settle_order<B: EscrowBackend>(
    path: web::Path<TransactionId>,
    api: web::Data<SettlementApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    debug!("💻️ POST settle order {id}");
    let settlement = api.settle(&id).await?;
    Ok(HttpResponse::Ok().json(settlement))
}

route!(delete_order => Delete "/orders/{id}" impl EscrowBackend);
pub async fn delete_order<B: EscrowBackend>(
    path: web::Path<TransactionId>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    debug!("💻️ DELETE order {id}");
    api.soft_delete_order(&id).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!("Order {id} deleted"))))
}

//----------------------------------------------   Disputes  ----------------------------------------------------
route!(open_dispute => Post "/orders/{id}/disputes" impl EscrowBackend);
pub async fn open_dispute<B: EscrowBackend>(
    path: web::Path<TransactionId>,
    body: web::Json<OpenDisputeRequest>,
    api: web::Data<DisputeApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    let OpenDisputeRequest { filed_by, reason } = body.into_inner();
    debug!("💻️ POST dispute on order {id} by {filed_by}");
    let dispute = api.open_dispute(&id, &filed_by, &reason).await?;
    Ok(HttpResponse::Created().json(dispute))
}

route!(list_disputes => Get "/disputes" impl EscrowBackend);
/// The most recently opened disputes, newest first.
pub async fn list_disputes<B: EscrowBackend>(
    query: web::Query<DisputeListingQuery>,
    api: web::Data<DisputeApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let limit = query.limit.unwrap_or(MAX_DISPUTE_LISTING);
    debug!("💻️ GET disputes, limit {limit}");
    let disputes = api.list_disputes(limit).await?;
    Ok(HttpResponse::Ok().json(disputes))
}

route!(dispute_details => Get "/disputes/{id}" impl EscrowBackend);
pub async fn dispute_details<B: EscrowBackend>(
    path: web::Path<DisputeId>,
    api: web::Data<DisputeApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    debug!("💻️ GET dispute {id}");
    let details = api.fetch_dispute(&id).await?;
    Ok(HttpResponse::Ok().json(details))
}

route!(add_claim => Post "/disputes/{id}/claims" impl EscrowBackend);
pub async fn add_claim<B: EscrowBackend>(
    path: web::Path<DisputeId>,
    body: web::Json<ClaimRequest>,
    api: web::Data<DisputeApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    let ClaimRequest { author, role, body } = body.into_inner();
    debug!("💻️ POST claim on dispute {id} by {role} {author}");
    let claim = api.add_claim(&id, &author, role, &body).await?;
    Ok(HttpResponse::Created().json(claim))
}

route!(start_review => Post "/disputes/{id}/review" impl EscrowBackend);
pub async fn start_review<B: EscrowBackend>(
    path: web::Path<DisputeId>,
    body: web::Json<ReviewRequest>,
    api: web::Data<DisputeApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    debug!("💻️ POST review of dispute {id} by {}", body.resolver);
    let dispute = api.start_review(&id, &body.resolver).await?;
    Ok(HttpResponse::Ok().json(dispute))
}

route!(resolve_dispute => Post "/disputes/{id}/resolve" impl EscrowBackend);
/// Resolves the dispute and writes the order's terminal payment event. Resolving twice is a conflict.
pub async fn resolve_dispute<B: EscrowBackend>(
    path: web::Path<DisputeId>,
    body: web::Json<ResolveRequest>,
    api: web::Data<DisputeApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    let ResolveRequest { resolver, refund_ratio } = body.into_inner();
    debug!("💻️ POST resolve dispute {id} by {resolver} with refund ratio {refund_ratio}");
    let resolved = api.resolve(&id, &resolver, refund_ratio).await?;
    Ok(HttpResponse::Ok().json(resolved))
}

//----------------------------------------------   Stores  ----------------------------------------------------
route!(store_deposits => Get "/stores/{id}/deposits" impl EscrowBackend);
pub async fn store_deposits<B: EscrowBackend>(
    path: web::Path<StoreId>,
    api: web::Data<StoreApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let store_id = path.into_inner();
    debug!("💻️ GET deposits for store {store_id}");
    let tier = api.vendor_tier(&store_id).await?;
    let deposits = api.deposits_for_store(&store_id).await?;
    let history = api.deposit_history_for_store(&store_id).await?;
    Ok(HttpResponse::Ok().json(StoreDeposits { store_id, tier, deposits, history }))
}

route!(set_vendor_tier => Put "/stores/{id}/tier" impl EscrowBackend);
pub async fn set_vendor_tier<B: EscrowBackend>(
    path: web::Path<StoreId>,
    body: web::Json<TierRequest>,
    api: web::Data<StoreApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let store_id = path.into_inner();
    debug!("💻️ PUT tier {} for store {store_id}", body.tier);
    api.set_vendor_tier(&store_id, body.tier).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!("Store {store_id} is now on the {} tier", body.tier))))
}
