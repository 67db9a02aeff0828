use axum::Router;
use tower_http::trace::TraceLayer;

use crate::{AppState, controllers::home_controller};

pub mod home_routes;
pub mod trading_routes;
pub mod portfolio_routes;
pub mod rules_routes;
pub mod realtime_routes;

pub fn app(state: AppState) -> Router {
    let api = Router::<AppState>::new();
    let api = trading_routes::add_routes(api);
    let api = portfolio_routes::add_routes(api);
    let api = rules_routes::add_routes(api);

    let router = Router::<AppState>::new();
    let router = home_routes::add_routes(router);
    let router = realtime_routes::add_routes(router);

    router
        .nest("/api/trading", api)
        .fallback(home_controller::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
