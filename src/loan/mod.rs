//! Loan lifecycle and the funds-availability gate

mod model;
mod service;

pub use model::{
    ContractStatus, CreateLoanRequest, DeleteLoanRequest, FundsAvailability, ListLoansQuery, Loan,
    LoanStatus,
};
pub use service::{LoanError, LoanService};
