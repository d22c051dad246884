//! Validation code issuance and consumption

mod model;
mod service;

pub use model::{CodeError, CodeTarget, CodeType, DeliveryMethod, ValidationCode};
pub use service::{CodeService, NewCode};
