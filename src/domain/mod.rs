//! Domain types for the checkout flow and the port to the remote bank.

pub mod bill;
pub mod credential;
pub mod identifiers;
pub mod ports;
pub mod qr;
pub mod session;
