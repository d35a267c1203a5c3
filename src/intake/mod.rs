//! HTTP surface of the service
//!
//! `POST /drugs_process/` validates an order, hands it to the dispatcher, and
//! answers 202 without waiting for any calculation. The remaining routes are
//! read-only views: per-order status, process metrics, and liveness.

use crate::dispatch::{DispatchError, TaskDispatcher};
use crate::observability::{health_route, metrics};
use crate::protocol::messages::{Acknowledgement, ErrorResponse, Order, OrderId};
use crate::protocol::validate_order;
use std::convert::Infallible;
use tracing::{info, warn, Instrument};
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

/// Largest accepted order body
pub const MAX_BODY_BYTES: u64 = 1024 * 1024;

/// All service routes, with unmatched requests mapped to JSON errors
pub fn routes(
    dispatcher: TaskDispatcher,
    service_name: impl Into<String>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    submit_route(dispatcher.clone())
        .or(status_route(dispatcher))
        .or(metrics_route())
        .or(health_route(service_name))
        .recover(handle_rejection)
}

/// POST /drugs_process/
pub fn submit_route(
    dispatcher: TaskDispatcher,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path("drugs_process")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::bytes())
        .and(with_dispatcher(dispatcher))
        .and_then(|body: Bytes, dispatcher: TaskDispatcher| async move {
            let span = crate::intake_span!(body_bytes = body.len());
            Ok::<_, Infallible>(submit_order(body, dispatcher).instrument(span).await)
        })
}

/// GET /orders/{order_id}
pub fn status_route(
    dispatcher: TaskDispatcher,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path!("orders" / OrderId)
        .and(warp::get())
        .and(with_dispatcher(dispatcher))
        .and_then(|order_id: OrderId, dispatcher: TaskDispatcher| async move {
            let reply = match dispatcher.status_store().get(order_id).await {
                Some(record) => warp::reply::json(&record).into_response(),
                None => error_reply(
                    StatusCode::NOT_FOUND,
                    "Order not found",
                    format!("No status recorded for order {order_id}"),
                ),
            };
            Ok::<_, Infallible>(reply)
        })
}

/// GET /metrics
pub fn metrics_route() -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path("metrics")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| warp::reply::json(&metrics().get_metrics()).into_response())
}

fn with_dispatcher(
    dispatcher: TaskDispatcher,
) -> impl Filter<Extract = (TaskDispatcher,), Error = Infallible> + Clone {
    warp::any().map(move || dispatcher.clone())
}

async fn submit_order(body: Bytes, dispatcher: TaskDispatcher) -> Response {
    metrics().order_received();

    let order: Order = match serde_json::from_slice(&body) {
        Ok(order) => order,
        Err(e) => {
            warn!(error = %e, "Malformed order body");
            metrics().order_rejected();
            return error_reply(
                StatusCode::BAD_REQUEST,
                "Invalid request format",
                e.to_string(),
            );
        }
    };

    if let Err(e) = validate_order(&order) {
        warn!(order_id = order.order_id, error = %e, "Order failed validation");
        metrics().order_rejected();
        return error_reply(StatusCode::BAD_REQUEST, "Invalid order", e.to_string());
    }

    let ack = Acknowledgement::accepted(&order);

    match dispatcher.submit(order).await {
        Ok(ticket) => {
            info!(
                order_id = ticket.order_id,
                task_id = %ticket.task_id,
                drugs_count = ack.drugs_count,
                "Order accepted"
            );
            warp::reply::with_status(warp::reply::json(&ack), StatusCode::ACCEPTED)
                .into_response()
        }
        Err(e @ DispatchError::DuplicateOrder(_)) => {
            error_reply(StatusCode::CONFLICT, "Order already in progress", e.to_string())
        }
        Err(e @ DispatchError::AtCapacity { .. }) => error_reply(
            StatusCode::SERVICE_UNAVAILABLE,
            "Service busy",
            e.to_string(),
        ),
        Err(e) => error_reply(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Dispatch failed",
            e.to_string(),
        ),
    }
}

fn error_reply(status: StatusCode, error: &str, details: impl Into<String>) -> Response {
    warp::reply::with_status(
        warp::reply::json(&ErrorResponse::new(error, details)),
        status,
    )
    .into_response()
}

async fn handle_rejection(rejection: Rejection) -> Result<Response, Infallible> {
    let (status, error) = if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found")
    } else if rejection
        .find::<warp::reject::MethodNotAllowed>()
        .is_some()
    {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    } else if rejection
        .find::<warp::reject::PayloadTooLarge>()
        .is_some()
    {
        (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
    } else if rejection
        .find::<warp::reject::LengthRequired>()
        .is_some()
    {
        (StatusCode::LENGTH_REQUIRED, "Content length required")
    } else {
        warn!(rejection = ?rejection, "Unhandled rejection");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
    };

    Ok(error_reply(status, error, format!("{rejection:?}")))
}
