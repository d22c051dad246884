//! Fee route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::fee::*;
use crate::state::AppState;

pub fn fee_routes() -> Router<AppState> {
    Router::new()
        .route("/api/fees", post(create_fee).get(list_fees))
        .route("/api/fees/:id/pay", post(pay_fee))
}
