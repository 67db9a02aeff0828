use axum::{
    extract::{Path, State},
    Json,
};

use super::api_error::ApiError;
use crate::{
    services::portfolio_service::{self, HistoryEntry, PortfolioSnapshot},
    AppState,
};

// GET /api/trading/paper/portfolio/:user_id
pub async fn get_portfolio(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<PortfolioSnapshot>, ApiError> {
    let snapshot = portfolio_service::snapshot(&state, user_id.trim()).await?;
    Ok(Json(snapshot))
}

// GET /api/trading/paper/history/:user_id
pub async fn get_history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let entries = portfolio_service::history(&state, user_id.trim()).await?;
    Ok(Json(entries))
}
