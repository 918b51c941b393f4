#![allow(dead_code)]

use billpay::application::checkout::{Checkout, CheckoutEvent};
use billpay::config::{CheckoutConfig, ItemConfig};
use billpay::domain::bill::BillStatus;
use billpay::domain::credential::ServiceIdentity;
use billpay::infrastructure::in_memory::{BankCall, InMemoryBank};
use std::sync::Arc;
use tokio::sync::broadcast;

pub fn identity() -> ServiceIdentity {
    ServiceIdentity {
        username: "svc".to_string(),
        password: "pw".to_string(),
    }
}

pub fn item(name: &str, amount: u64) -> ItemConfig {
    ItemConfig {
        name: name.to_string(),
        amount,
        remark: String::new(),
        billing_month: 11,
        billing_year: 2025,
    }
}

pub fn checkout(bank: &InMemoryBank, config: &CheckoutConfig) -> Checkout {
    Checkout::new(Arc::new(bank.clone()), identity(), config).unwrap()
}

/// Everything published so far, without waiting.
pub fn drain(events: &mut broadcast::Receiver<CheckoutEvent>) -> Vec<CheckoutEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

pub async fn status_updates(bank: &InMemoryBank) -> Vec<(String, BillStatus)> {
    bank.calls()
        .await
        .into_iter()
        .filter_map(|call| match call {
            BankCall::UpdateBillStatus { bill_code, status } => Some((bill_code, status)),
            _ => None,
        })
        .collect()
}

pub async fn settlement_queries(bank: &InMemoryBank) -> Vec<(String, String)> {
    bank.calls()
        .await
        .into_iter()
        .filter_map(|call| match call {
            BankCall::QuerySettlement { customer_id, token } => Some((customer_id, token)),
            _ => None,
        })
        .collect()
}

pub async fn detail_names(bank: &InMemoryBank) -> Vec<String> {
    bank.calls()
        .await
        .into_iter()
        .filter_map(|call| match call {
            BankCall::CreateBillDetail { item_name, .. } => Some(item_name),
            _ => None,
        })
        .collect()
}
