use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::debug;

use crate::application::{AppError, TransactionOutcome, TransactionRequest};
use crate::domain::{AccountId, Money};

use super::ApiState;

/// Header carrying the transaction source (game, server or payment).
pub const SOURCE_TYPE_HEADER: &str = "Source-Type";

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<Money>,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    #[serde(rename = "userId")]
    pub user_id: AccountId,
    pub balance: Money,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub env: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// An error rendered as `{"error": ...}` with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::InvalidRequest(msg)
            | AppError::InvalidAmount(msg)
            | AppError::InvalidState(msg) => ApiError::bad_request(msg),
            AppError::AccountNotFound(_) => ApiError::new(StatusCode::NOT_FOUND, "user not found"),
            AppError::InsufficientBalance { .. } => ApiError::bad_request("insufficient balance"),
            AppError::DeadlineExceeded(_) => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "transaction timed out, retry the request",
            ),
            // Logged by the service with full context.
            AppError::Persistence(_) => {
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
            }
        }
    }
}

/// Parse the `{userId}` path segment as a positive account id.
pub fn parse_user_id(raw: &str) -> Result<AccountId, ApiError> {
    raw.parse::<AccountId>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::bad_request("invalid user id"))
}

/// Read the `Source-Type` header. Absent or empty is "required"; anything
/// that is not a known source, including non-ASCII bytes, is "invalid".
pub fn source_type_header(headers: &HeaderMap) -> Result<&str, ApiError> {
    let value = headers
        .get(SOURCE_TYPE_HEADER)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::bad_request("Source-Type header is required"))?;
    value
        .to_str()
        .ok()
        .filter(|raw| crate::domain::SourceType::from_str(raw).is_some())
        .ok_or_else(|| ApiError::bad_request("invalid Source-Type"))
}

/// GET /health
pub async fn health_check(State(state): State<ApiState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        env: state.env.clone(),
    })
}

/// POST /user/:user_id/transaction
pub async fn create_transaction(
    State(state): State<ApiState>,
    Path(raw_user_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<TransactionResponse>, ApiError> {
    let user_id = parse_user_id(&raw_user_id)?;

    let source_type = source_type_header(&headers)?;

    let request: TransactionRequest = serde_json::from_slice(&body).map_err(|err| {
        debug!(error = %err, "rejecting transaction body");
        ApiError::bad_request("invalid JSON")
    })?;

    let outcome = state
        .service
        .process_transaction(user_id, &request, source_type)
        .await?;

    let response = match outcome {
        TransactionOutcome::Applied { balance } => TransactionResponse {
            message: "transaction processed successfully",
            balance: Some(balance),
        },
        TransactionOutcome::AlreadyApplied => TransactionResponse {
            message: "transaction already processed",
            balance: None,
        },
    };
    Ok(Json(response))
}

/// GET /user/:user_id/balance
pub async fn get_user_balance(
    State(state): State<ApiState>,
    Path(raw_user_id): Path<String>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let user_id = parse_user_id(&raw_user_id)?;
    let view = state.service.query_balance(user_id).await?;

    Ok(Json(BalanceResponse {
        user_id: view.account_id,
        balance: view.balance,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_id() {
        assert_eq!(parse_user_id("1").unwrap(), 1);
        assert_eq!(parse_user_id("9223372036854775807").unwrap(), i64::MAX);
        for raw in ["0", "-1", "abc", "", "1.5", "9223372036854775808"] {
            assert!(parse_user_id(raw).is_err(), "{:?} should be rejected", raw);
        }
    }

    #[test]
    fn test_source_type_header() {
        use axum::http::HeaderValue;

        let with = |value: HeaderValue| {
            let mut headers = HeaderMap::new();
            headers.insert("source-type", value);
            headers
        };
        let message = |headers: &HeaderMap| source_type_header(headers).unwrap_err().message;

        let headers = with(HeaderValue::from_static("payment"));
        assert_eq!(source_type_header(&headers).unwrap(), "payment");

        assert_eq!(message(&HeaderMap::new()), "Source-Type header is required");
        assert_eq!(
            message(&with(HeaderValue::from_static(""))),
            "Source-Type header is required"
        );
        assert_eq!(
            message(&with(HeaderValue::from_static("casino"))),
            "invalid Source-Type"
        );
        let non_ascii = HeaderValue::from_bytes(b"g\xe9me").unwrap();
        assert_eq!(message(&with(non_ascii)), "invalid Source-Type");
    }

    #[test]
    fn test_error_status_codes() {
        let status = |err: AppError| ApiError::from(err).status;
        assert_eq!(status(AppError::AccountNotFound(4)), StatusCode::NOT_FOUND);
        assert_eq!(
            status(AppError::InsufficientBalance {
                account_id: 1,
                balance: Money::ZERO,
                required: Money::from_cents(1),
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(AppError::InvalidAmount("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(AppError::Persistence(anyhow::anyhow!("locked"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status(AppError::DeadlineExceeded(std::time::Duration::from_secs(1))),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
