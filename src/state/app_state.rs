//! Shared application state for handlers

use axum::extract::FromRef;
use std::sync::Arc;

use crate::accounts::AccountService;
use crate::events::EventLog;
use crate::fees::FeeService;
use crate::loan::LoanService;
use crate::notify::Notifier;
use crate::transfer::TransferService;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub loan_service: Arc<LoanService>,
    pub transfer_service: Arc<TransferService>,
    pub fee_service: Arc<FeeService>,
    pub account_service: Arc<AccountService>,
    pub event_log: EventLog,
    pub notifier: Notifier,
}

impl FromRef<AppState> for Arc<LoanService> {
    fn from_ref(state: &AppState) -> Self {
        state.loan_service.clone()
    }
}

impl FromRef<AppState> for Arc<TransferService> {
    fn from_ref(state: &AppState) -> Self {
        state.transfer_service.clone()
    }
}

impl FromRef<AppState> for Arc<FeeService> {
    fn from_ref(state: &AppState) -> Self {
        state.fee_service.clone()
    }
}

impl FromRef<AppState> for Arc<AccountService> {
    fn from_ref(state: &AppState) -> Self {
        state.account_service.clone()
    }
}

impl FromRef<AppState> for EventLog {
    fn from_ref(state: &AppState) -> Self {
        state.event_log.clone()
    }
}

impl FromRef<AppState> for Notifier {
    fn from_ref(state: &AppState) -> Self {
        state.notifier.clone()
    }
}
