//! Bookstore order service binary: HTTP surface over the lifecycle engine.
//! Routing and auth are thin shims; every lifecycle call receives an already
//! authenticated `user_id` and the admin routes trust the gateway's
//! `is_admin` decision.

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bookstore_orders::engine::requests::{
    CancelRequest, CouponRequest, PlaceOrderRequest, ReturnRequest, UpdateStatusRequest,
    VerifyReturnRequest,
};
use bookstore_orders::{
    DomainError, EventPublisher, Order, OrderEngine, PgStore, Settings, WalletView,
};

#[derive(Clone)]
struct AppState {
    engine: Arc<OrderEngine>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env();
    let store = PgStore::connect(&settings.database_url).await?;
    store.migrate().await?;
    let nats = match &settings.nats_url {
        Some(url) => async_nats::connect(url).await.ok(),
        None => None,
    };
    let port = settings.port;
    let engine = Arc::new(OrderEngine::new(
        Arc::new(store),
        settings,
        EventPublisher::new(nats),
    ));
    let state = AppState { engine };

    let app = Router::new()
        .route("/health", get(|| async {
            Json(serde_json::json!({"status": "healthy", "service": "bookstore-orders"}))
        }))
        .route("/api/v1/orders", get(list_orders).post(place_order))
        .route("/api/v1/orders/:id", get(get_order))
        .route("/api/v1/orders/:id/cancel", post(cancel_order))
        .route("/api/v1/orders/:id/payment", post(confirm_payment))
        .route("/api/v1/orders/:id/coupon", post(apply_coupon).delete(remove_coupon))
        .route("/api/v1/orders/:id/items/:product_id/cancel", post(cancel_item))
        .route("/api/v1/orders/:id/items/:product_id/return", post(request_return))
        .route("/api/v1/wallet/:user_id", get(wallet_balance))
        .route("/api/v1/admin/orders/:id", delete(soft_delete_order))
        .route("/api/v1/admin/orders/:id/status", patch(update_status))
        .route("/api/v1/admin/orders/:id/items/:product_id/deliver", post(mark_delivered))
        .route("/api/v1/admin/orders/:id/items/:product_id/verify-return", post(verify_return))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
        .with_state(state);

    tracing::info!("bookstore-orders listening on 0.0.0.0:{}", port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?, app).await?;
    Ok(())
}

type ApiResult<T> = std::result::Result<T, (StatusCode, String)>;

/// Domain errors map to status codes; internal detail stays in the logs.
fn reject(e: DomainError) -> (StatusCode, String) {
    let code = match &e {
        DomainError::Validation(_) => StatusCode::BAD_REQUEST,
        DomainError::NotFound(_) => StatusCode::NOT_FOUND,
        DomainError::PreconditionFailed(_)
        | DomainError::InsufficientStock { .. }
        | DomainError::InsufficientBalance => StatusCode::CONFLICT,
        DomainError::LimitExceeded(_) => StatusCode::UNPROCESSABLE_ENTITY,
        DomainError::TransactionConflict => StatusCode::SERVICE_UNAVAILABLE,
        DomainError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if code == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %e, "request failed");
        (code, "internal error".to_string())
    } else {
        (code, e.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct UserParam {
    user_id: String,
}

async fn place_order(State(s): State<AppState>, Json(req): Json<PlaceOrderRequest>) -> ApiResult<(StatusCode, Json<Order>)> {
    let order = s.engine.place_order(req).await.map_err(reject)?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn get_order(State(s): State<AppState>, Path(id): Path<String>, Query(p): Query<UserParam>) -> ApiResult<Json<Order>> {
    s.engine.order(&p.user_id, &id).await.map(Json).map_err(reject)
}

async fn list_orders(State(s): State<AppState>, Query(p): Query<UserParam>) -> ApiResult<Json<Vec<Order>>> {
    s.engine.orders_for_user(&p.user_id).await.map(Json).map_err(reject)
}

async fn cancel_order(State(s): State<AppState>, Path(id): Path<String>, Json(r): Json<CancelRequest>) -> ApiResult<StatusCode> {
    s.engine.cancel_order(&r.user_id, &id, &r.reason).await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn cancel_item(State(s): State<AppState>, Path((id, product_id)): Path<(String, String)>, Json(r): Json<CancelRequest>) -> ApiResult<StatusCode> {
    s.engine.cancel_order_item(&r.user_id, &id, &product_id, &r.reason).await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn request_return(State(s): State<AppState>, Path((id, product_id)): Path<(String, String)>, Json(r): Json<ReturnRequest>) -> ApiResult<StatusCode> {
    s.engine.request_return(&r.user_id, &id, &product_id, &r.reason).await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn confirm_payment(State(s): State<AppState>, Path(id): Path<String>, Json(r): Json<UserParam>) -> ApiResult<StatusCode> {
    s.engine.confirm_payment(&r.user_id, &id).await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn apply_coupon(State(s): State<AppState>, Path(id): Path<String>, Json(r): Json<CouponRequest>) -> ApiResult<Json<Order>> {
    s.engine.apply_coupon(&r.user_id, &id, &r.code).await.map(Json).map_err(reject)
}

async fn remove_coupon(State(s): State<AppState>, Path(id): Path<String>, Query(p): Query<UserParam>) -> ApiResult<Json<Order>> {
    s.engine.remove_coupon(&p.user_id, &id).await.map(Json).map_err(reject)
}

async fn wallet_balance(State(s): State<AppState>, Path(user_id): Path<String>) -> ApiResult<Json<WalletView>> {
    s.engine.wallet_balance(&user_id).await.map(Json).map_err(reject)
}

async fn mark_delivered(State(s): State<AppState>, Path((id, product_id)): Path<(String, String)>) -> ApiResult<StatusCode> {
    s.engine.mark_item_delivered(&id, &product_id).await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn verify_return(State(s): State<AppState>, Path((id, product_id)): Path<(String, String)>, Json(r): Json<VerifyReturnRequest>) -> ApiResult<StatusCode> {
    s.engine.verify_return(&id, &product_id, r.approved).await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_status(State(s): State<AppState>, Path(id): Path<String>, Json(r): Json<UpdateStatusRequest>) -> ApiResult<StatusCode> {
    s.engine.update_order_status(&id, r.status).await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn soft_delete_order(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<StatusCode> {
    s.engine.soft_delete_order(&id).await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}
