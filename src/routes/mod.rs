//! Route definitions for the Credlane API

mod account;
mod fee;
mod loan;
mod transfer;

pub use account::account_routes;
pub use fee::fee_routes;
pub use loan::loan_routes;
pub use transfer::transfer_routes;
