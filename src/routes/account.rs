//! External account route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::account::*;
use crate::state::AppState;

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/api/accounts", post(create_account).get(list_accounts))
        .route("/api/accounts/:id", get(get_account))
}
