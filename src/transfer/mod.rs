//! Transfer state machine and disbursement planning

mod model;
pub mod planner;
mod service;

pub use model::{
    CreateTransferRequest, ListTransfersQuery, PauseTransferRequest, ReissueCodesRequest,
    RejectTransferRequest, SimulateTransferRequest, SubmitCodeRequest, Transfer, TransferStatus,
};
pub use service::{TransferError, TransferService};
