//! Loan route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::loan::*;
use crate::state::AppState;

pub fn loan_routes() -> Router<AppState> {
    Router::new()
        .route("/api/loans", post(create_loan).get(list_loans))
        .route("/api/loans/:id", get(get_loan).delete(delete_loan))
        .route("/api/loans/:id/approve", post(approve_loan))
        .route("/api/loans/:id/reject", post(reject_loan))
        .route("/api/loans/:id/contract", post(generate_contract))
        .route("/api/loans/:id/confirm-contract", post(confirm_contract))
        .route("/api/loans/:id/release", post(release_funds))
}
