pub mod client;
#[cfg(test)]
pub mod fake;

pub use client::{HttpPaymentClientFactory, PaymentClientFactory, PaymentInstructionClient};
