use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use mongodb::bson::oid::ObjectId;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{api_error::ApiError, views::RuleView};
use crate::{models::Side, AppState};

#[derive(Debug, Deserialize)]
pub struct RuleBody {
    pub user_id: String,
    pub symbol: String,
    // e.g. "price < 150"
    pub condition: String,
    pub action: String,
    pub quantity: i64,
}

// POST /api/trading/auto-trade/rules
pub async fn post_rule(
    State(state): State<AppState>,
    Json(body): Json<RuleBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let action: Side = body.action.parse().map_err(ApiError::bad_request)?;

    let rule = state
        .rules
        .add_rule(&body.user_id, &body.symbol, body.condition, action, body.quantity)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "id": rule.id.to_hex(),
            "rule": RuleView::from(&rule),
        })),
    ))
}

// GET /api/trading/auto-trade/rules/:user_id
pub async fn get_rules(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<RuleView>>, ApiError> {
    let rules = state.rules.list_for_user(user_id.trim()).await?;
    Ok(Json(rules.iter().map(RuleView::from).collect()))
}

// DELETE /api/trading/auto-trade/rules/:rule_id
pub async fn delete_rule(
    State(state): State<AppState>,
    Path(rule_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = ObjectId::parse_str(rule_id.trim())
        .map_err(|_| ApiError::bad_request(format!("invalid rule id '{rule_id}'")))?;

    state.rules.delete(id).await?;

    Ok(Json(json!({ "success": true })))
}
