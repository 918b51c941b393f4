//! Adapters implementing the `BankApi` port.

pub mod http;
pub mod in_memory;
