pub mod account;
pub mod fee;
pub mod loan;
pub mod transfer;
