use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use super::{
    api_error::ApiError,
    views::{RuleView, TransactionView},
};
use crate::{
    models::Side,
    services::{
        price_oracle::{last_price_within, normalize_symbol, PriceQuote},
        trading_service::{self, OrderOutcome, OrderRequest},
    },
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct TradeBody {
    pub user_id: String,
    pub symbol: String,
    #[serde(rename = "type")]
    pub side: String,
    pub quantity: i64,
    // a limit price turns the order into a rule
    #[serde(default)]
    pub price: Option<Decimal>,
}

// POST /api/trading/paper/trade
pub async fn post_trade(
    State(state): State<AppState>,
    Json(body): Json<TradeBody>,
) -> Result<Response, ApiError> {
    let side: Side = body.side.parse().map_err(ApiError::bad_request)?;

    let outcome = trading_service::place_order(
        &state,
        OrderRequest {
            user_id: body.user_id,
            symbol: body.symbol,
            side,
            quantity: body.quantity,
            limit_price: body.price,
        },
    )
    .await?;

    let res = match outcome {
        OrderOutcome::Executed(txn) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": format!("{} order executed for {} at {}", txn.side, txn.symbol, txn.price),
                "transaction": TransactionView::from(&txn),
            })),
        ),
        OrderOutcome::RulePlaced(rule) => (
            StatusCode::CREATED,
            Json(json!({
                "success": true,
                "message": format!(
                    "{} limit order placed for {} at {}",
                    rule.action, rule.symbol, rule.condition.threshold
                ),
                "rule": RuleView::from(&rule),
            })),
        ),
    };

    Ok(res.into_response())
}

// GET /api/trading/price/:symbol
pub async fn get_price(State(state): State<AppState>, Path(symbol): Path<String>) -> Response {
    let sym = normalize_symbol(&symbol);

    match last_price_within(state.oracle.as_ref(), &sym, state.settings.price_timeout).await {
        PriceQuote::Available(price) => {
            (StatusCode::OK, Json(json!({ "symbol": sym, "price": price }))).into_response()
        }
        PriceQuote::Unavailable { reason } => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "success": false,
                "error": "price_unavailable",
                "symbol": sym,
                "detail": reason,
            })),
        )
            .into_response(),
    }
}
