pub mod api_error;
pub mod views;

pub mod home_controller;
pub mod trading_controller;
pub mod portfolio_controller;
pub mod rules_controller;
pub mod realtime_controller;
