use axum::{Router, routing::get};

use crate::{AppState, controllers::portfolio_controller};

pub fn add_routes(router: Router<AppState>) -> Router<AppState> {
    router
        .route("/paper/portfolio/:user_id", get(portfolio_controller::get_portfolio))
        .route("/paper/history/:user_id", get(portfolio_controller::get_history))
}
