pub mod health;
pub mod shipments;
pub mod ws;

use axum::{
    routing::{get, post},
    Router,
};

pub use crate::AppState;

/// Routes mounted under `/api/v1`.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/shipments", post(shipments::create_shipment))
        .route("/shipments/:order_id", get(shipments::get_shipment))
        .route("/shipments/:order_id/ship", post(shipments::ship_shipment))
        .route("/shipments/:order_id/ws", get(ws::order_socket))
        .route("/tracking/ws", get(ws::global_socket))
}
