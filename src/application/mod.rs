//! Application layer orchestrating a payment attempt.
//!
//! `Checkout` is the entry point. It drives bill creation, QR issue,
//! settlement polling and the expiry countdown on top of the `BankApi`
//! port, and reports progress through a broadcast stream of events.

pub mod bills;
pub mod checkout;
pub mod expiry;
pub mod poller;
pub mod qr;
pub mod task;
pub mod token;
