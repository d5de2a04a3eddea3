use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use super::handlers::SOURCE_TYPE_HEADER;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Log every request with its source type and client address, and tag the
/// response with a request id.
pub async fn log_request(
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let source_type = request
        .headers()
        .get(SOURCE_TYPE_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    let ip = connect_info
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_default();

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        uri = %request.uri()
    );

    async move {
        info!(source_type = %source_type, ip = %ip, "received request");
        let mut response = next.run(request).await;
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        response
    }
    .instrument(span)
    .await
}
