mod common;

use billpay::application::checkout::{Checkout, CheckoutEvent};
use billpay::config::CheckoutConfig;
use billpay::domain::bill::BillStatus;
use billpay::domain::session::CheckoutPhase;
use billpay::error::CheckoutError;
use billpay::infrastructure::in_memory::{BankCall, BankOp, InMemoryBank};
use common::{checkout, detail_names, drain, identity, item, settlement_queries};
use std::sync::Arc;
use std::time::Duration;

fn two_items() -> CheckoutConfig {
    let mut config = CheckoutConfig::default();
    config.items = vec![item("Shoes", 2_090_000), item("Socks", 50_000)];
    config
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_pay_creates_one_bill() {
    let bank = InMemoryBank::new();
    bank.delay(BankOp::BillGroup, Duration::from_millis(500)).await;
    let checkout = checkout(&bank, &CheckoutConfig::default());

    let (first, second) = tokio::join!(checkout.pay_with_qr(), checkout.pay_with_qr());

    assert!(first.is_ok());
    assert!(matches!(second, Err(CheckoutError::Busy)));
    assert_eq!(bank.count(BankOp::BillGroup).await, 1);
    assert_eq!(bank.count(BankOp::BillDetail).await, 1);
    assert_eq!(bank.count(BankOp::Qr).await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_creating_flag_is_visible_while_in_flight() {
    let bank = InMemoryBank::new();
    bank.delay(BankOp::BillDetail, Duration::from_secs(1)).await;
    let checkout = checkout(&bank, &CheckoutConfig::default());

    let paying = checkout.clone();
    let handle = tokio::spawn(async move { paying.pay_with_qr().await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let snapshot = checkout.snapshot();
    assert!(snapshot.creating);
    assert_eq!(snapshot.phase, CheckoutPhase::Creating);

    handle.await.unwrap().unwrap();
    let snapshot = checkout.snapshot();
    assert!(!snapshot.creating);
    assert!(!snapshot.qr_loading);
}

#[tokio::test(start_paused = true)]
async fn test_pay_creates_group_then_details_then_qr_then_polls() {
    let bank = InMemoryBank::new();
    let checkout = checkout(&bank, &two_items());
    let mut events = checkout.subscribe();

    checkout.open_payment_modal();
    checkout.pay_with_qr().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let snapshot = checkout.snapshot();
    let code = snapshot.bill.code.clone();
    let payer = snapshot.bill.payer_id.clone();
    let calls = bank.calls().await;

    assert_eq!(
        calls[1],
        BankCall::CreateBillGroup {
            code: code.clone(),
            payer_id: payer.clone(),
            stamped: true,
        }
    );
    assert_eq!(
        calls[2..4],
        [
            BankCall::CreateBillDetail {
                group_bill: 101,
                code: code.clone(),
                item_name: "Shoes".to_string(),
            },
            BankCall::CreateBillDetail {
                group_bill: 101,
                code: code.clone(),
                item_name: "Socks".to_string(),
            },
        ]
    );
    assert_eq!(
        calls[4],
        BankCall::RequestQr {
            code: payer.clone(),
            amount: 2_090_000,
        }
    );
    assert_eq!(settlement_queries(&bank).await[0].0, payer);

    assert_eq!(snapshot.phase, CheckoutPhase::Polling);
    assert!(snapshot.polling);
    assert!(snapshot.qr.is_some());
    let created = snapshot.created.unwrap();
    assert_eq!(created.id, 101);
    assert_eq!(created.details.len(), 2);
    assert_eq!(snapshot.bill.status, BillStatus::Draft);

    let seen = drain(&mut events);
    assert_eq!(
        seen,
        [
            CheckoutEvent::ModalOpened,
            CheckoutEvent::BillCreated {
                bill_id: 101,
                bill_code: code,
            },
            CheckoutEvent::QrIssued { payer_id: payer },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_partial_detail_failure_resumes_missing_items() {
    let bank = InMemoryBank::new();
    bank.fail_call(BankOp::BillDetail, 2).await;
    let mut config = CheckoutConfig::default();
    config.items = vec![item("A", 100), item("B", 200), item("C", 300)];
    let checkout = checkout(&bank, &config);
    let mut events = checkout.subscribe();

    assert!(matches!(
        checkout.pay_with_qr().await,
        Err(CheckoutError::Transport(_))
    ));
    let snapshot = checkout.snapshot();
    assert_eq!(snapshot.created.as_ref().unwrap().details.len(), 1);
    assert!(!snapshot.creating);
    assert!(snapshot.qr.is_none());
    assert!(!snapshot.polling);
    assert!(matches!(
        drain(&mut events).as_slice(),
        [CheckoutEvent::CreateFailed { .. }]
    ));

    checkout.pay_with_qr().await.unwrap();
    assert_eq!(bank.count(BankOp::BillGroup).await, 1);
    assert_eq!(detail_names(&bank).await, ["A", "B", "B", "C"]);
    assert_eq!(checkout.snapshot().created.unwrap().details.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_server_code_replaces_local_code() {
    let bank = InMemoryBank::new();
    bank.correct_code("BG999999").await;
    let checkout = checkout(&bank, &CheckoutConfig::default());

    checkout.pay_with_qr().await.unwrap();
    assert_eq!(checkout.snapshot().bill.code, "BG999999");
    assert!(bank.calls().await.iter().any(|call| matches!(
        call,
        BankCall::CreateBillDetail { code, .. } if code == "BG999999"
    )));

    checkout.cancel_payment().await.unwrap();
    assert_eq!(
        common::status_updates(&bank).await,
        [("BG999999".to_string(), BillStatus::Cancelled)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_group_reply_without_id_fails_creation() {
    let bank = InMemoryBank::new();
    bank.omit_group_id(true).await;
    let checkout = checkout(&bank, &CheckoutConfig::default());

    assert!(matches!(
        checkout.pay_with_qr().await,
        Err(CheckoutError::BillCreate(_))
    ));
    let snapshot = checkout.snapshot();
    assert!(snapshot.created.is_none());
    assert_eq!(snapshot.phase, CheckoutPhase::Open);
    assert_eq!(bank.count(BankOp::BillDetail).await, 0);
    assert_eq!(bank.count(BankOp::Qr).await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_credential_is_refreshed_once() {
    let bank = InMemoryBank::new();
    bank.reject_unauthorized(BankOp::BillGroup, 1).await;
    let checkout = checkout(&bank, &CheckoutConfig::default());

    checkout.pay_with_qr().await.unwrap();
    assert_eq!(bank.count(BankOp::Token).await, 2);
    assert_eq!(bank.count(BankOp::BillGroup).await, 2);
    assert!(checkout.snapshot().created.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_credential_outage_blocks_creation() {
    let bank = InMemoryBank::new();
    bank.fail_next(BankOp::Token, 1).await;
    let checkout = checkout(&bank, &CheckoutConfig::default());

    assert!(matches!(
        checkout.pay_with_qr().await,
        Err(CheckoutError::Auth(_))
    ));
    assert_eq!(bank.count(BankOp::BillGroup).await, 0);
    assert!(!checkout.snapshot().creating);
}

#[tokio::test(start_paused = true)]
async fn test_close_and_reopen_keeps_created_bill() {
    let bank = InMemoryBank::new();
    let checkout = checkout(&bank, &CheckoutConfig::default());

    checkout.open_payment_modal();
    checkout.pay_with_qr().await.unwrap();
    let code = checkout.snapshot().bill.code;

    checkout.close_payment_modal();
    let closed = checkout.snapshot();
    assert_eq!(closed.phase, CheckoutPhase::Closed);
    assert!(!closed.polling);
    assert!(closed.qr.is_none());
    assert!(closed.created.is_some());

    checkout.open_payment_modal();
    checkout.pay_with_qr().await.unwrap();
    assert_eq!(checkout.snapshot().bill.code, code);
    assert_eq!(bank.count(BankOp::BillGroup).await, 1);
    assert_eq!(bank.count(BankOp::Qr).await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_start_payment_discards_previous_attempt() {
    let bank = InMemoryBank::new();
    let checkout = checkout(&bank, &CheckoutConfig::default());

    checkout.pay_with_qr().await.unwrap();
    let first = checkout.snapshot();

    checkout.start_payment_with_qr().await.unwrap();
    let second = checkout.snapshot();

    assert_eq!(second.session_id, first.session_id.next());
    assert_ne!(second.bill.code, first.bill.code);
    assert_ne!(second.bill.payer_id, first.bill.payer_id);
    assert!(second.modal_open);
    assert_eq!(bank.count(BankOp::BillGroup).await, 2);
}

#[tokio::test]
async fn test_zero_poll_interval_is_a_config_error() {
    let bank = InMemoryBank::new();
    let mut config = CheckoutConfig::default();
    config.flow.poll_interval_ms = 0;

    let built = Checkout::new(Arc::new(bank.clone()), identity(), &config);
    assert!(matches!(built, Err(CheckoutError::Config(_))));
    assert!(bank.calls().await.is_empty());
}
