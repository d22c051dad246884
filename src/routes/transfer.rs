//! Transfer route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::transfer::*;
use crate::state::AppState;

pub fn transfer_routes() -> Router<AppState> {
    Router::new()
        .route("/api/transfers", post(create_transfer).get(list_transfers))
        .route("/api/transfers/simulate", post(simulate_transfer))
        .route("/api/transfers/:id", get(get_transfer))
        .route("/api/transfers/:id/events", get(list_transfer_events))
        .route("/api/transfers/:id/codes", post(submit_code))
        .route("/api/transfers/:id/codes/reissue", post(reissue_codes))
        .route("/api/transfers/:id/pause", post(pause_transfer))
        .route("/api/transfers/:id/approve", post(approve_transfer))
        .route("/api/transfers/:id/suspend", post(suspend_transfer))
        .route("/api/transfers/:id/reinstate", post(reinstate_transfer))
        .route("/api/transfers/:id/reject", post(reject_transfer))
}
