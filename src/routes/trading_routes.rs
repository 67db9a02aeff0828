use axum::{Router, routing::{get, post}};

use crate::{AppState, controllers::trading_controller};

pub fn add_routes(router: Router<AppState>) -> Router<AppState> {
    router
        .route("/paper/trade", post(trading_controller::post_trade))
        .route("/price/:symbol", get(trading_controller::get_price))
}
