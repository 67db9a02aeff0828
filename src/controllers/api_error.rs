use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::TradingError;

/// JSON error body for every handler: `{"success": false, "error": code, "detail": message}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub detail: String,
}

impl ApiError {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "bad_request",
            detail: detail.into(),
        }
    }
}

pub fn status_from_error(err: &TradingError) -> StatusCode {
    match err {
        TradingError::InsufficientFunds { .. }
        | TradingError::InsufficientHoldings { .. }
        | TradingError::NoSuchHolding { .. }
        | TradingError::MalformedCondition { .. }
        | TradingError::InvalidOrder(_) => StatusCode::BAD_REQUEST,
        TradingError::NoSuchPortfolio(_)
        | TradingError::NoSuchRule(_) => StatusCode::NOT_FOUND,
        TradingError::ConcurrentModification(_) | TradingError::RuleNotActive(_) => {
            StatusCode::CONFLICT
        }
        TradingError::PriceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        TradingError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        TradingError::StorageUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<TradingError> for ApiError {
    fn from(err: TradingError) -> Self {
        let status = status_from_error(&err);
        if status.is_server_error() {
            tracing::error!(code = err.code(), error = %err, "request failed");
        }
        Self {
            status,
            code: err.code(),
            detail: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({
                "success": false,
                "error": self.code,
                "detail": self.detail,
            })),
        )
            .into_response()
    }
}
