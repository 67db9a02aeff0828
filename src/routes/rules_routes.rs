use axum::{Router, routing::{get, post}};

use crate::{AppState, controllers::rules_controller};

pub fn add_routes(router: Router<AppState>) -> Router<AppState> {
    router
        .route("/auto-trade/rules", post(rules_controller::post_rule))
        // GET takes a user id, DELETE a rule id
        .route(
            "/auto-trade/rules/:id",
            get(rules_controller::get_rules).delete(rules_controller::delete_rule),
        )
}
