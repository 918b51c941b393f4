use crate::domain::bill::{Bill, BillStatus};
use crate::domain::credential::{Credential, ServiceIdentity};
use crate::domain::ports::{
    BankApi, BillGroupReceipt, DetailReceipt, DetailSubmission, QrReply, QrRequest,
    SettlementReply,
};
use crate::error::{CheckoutError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// A 1x1 PNG, handed out as the QR image.
pub const SANDBOX_QR_PNG: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BankOp {
    Token,
    BillGroup,
    BillDetail,
    Qr,
    Settlement,
    StatusUpdate,
}

impl BankOp {
    fn simulated_failure(self) -> CheckoutError {
        match self {
            BankOp::Token => CheckoutError::Auth("simulated credential outage".to_string()),
            _ => CheckoutError::Transport(format!("simulated {:?} outage", self)),
        }
    }
}

/// One request as the bank saw it.
#[derive(Debug, Clone, PartialEq)]
pub enum BankCall {
    ObtainToken {
        username: String,
    },
    CreateBillGroup {
        code: String,
        payer_id: String,
        stamped: bool,
    },
    CreateBillDetail {
        group_bill: u64,
        code: String,
        item_name: String,
    },
    RequestQr {
        code: String,
        amount: u64,
    },
    QuerySettlement {
        customer_id: String,
        token: String,
    },
    UpdateBillStatus {
        bill_code: String,
        status: BillStatus,
    },
}

impl BankCall {
    pub fn op(&self) -> BankOp {
        match self {
            BankCall::ObtainToken { .. } => BankOp::Token,
            BankCall::CreateBillGroup { .. } => BankOp::BillGroup,
            BankCall::CreateBillDetail { .. } => BankOp::BillDetail,
            BankCall::RequestQr { .. } => BankOp::Qr,
            BankCall::QuerySettlement { .. } => BankOp::Settlement,
            BankCall::UpdateBillStatus { .. } => BankOp::StatusUpdate,
        }
    }
}

#[derive(Debug)]
struct Script {
    settled_code: String,
    settle_after: Option<usize>,
    unauthorized: HashMap<BankOp, usize>,
    failures: HashMap<BankOp, usize>,
    failing_calls: HashSet<(BankOp, usize)>,
    delays: HashMap<BankOp, Duration>,
    empty_qr: bool,
    omit_group_id: bool,
    corrected_code: Option<String>,
    counts: HashMap<BankOp, usize>,
    next_id: u64,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            settled_code: "012".to_string(),
            settle_after: None,
            unauthorized: HashMap::new(),
            failures: HashMap::new(),
            failing_calls: HashSet::new(),
            delays: HashMap::new(),
            empty_qr: false,
            omit_group_id: false,
            corrected_code: None,
            counts: HashMap::new(),
            next_id: 100,
        }
    }
}

fn take_one(budget: &mut HashMap<BankOp, usize>, op: BankOp) -> bool {
    match budget.get_mut(&op) {
        Some(left) if *left > 0 => {
            *left -= 1;
            true
        }
        _ => false,
    }
}

/// A scriptable bank that keeps everything in memory and records every call.
///
/// Used by the test suite and by the CLI sandbox. Behaviour is adjusted
/// through the async setters, which may be called at any point.
#[derive(Default, Clone)]
pub struct InMemoryBank {
    script: Arc<RwLock<Script>>,
    calls: Arc<RwLock<Vec<BankCall>>>,
}

impl InMemoryBank {
    /// Creates a bank that accepts everything and never settles.
    pub fn new() -> Self {
        Self::default()
    }

    /// A bank that settles on the second settlement query.
    pub async fn sandbox() -> Self {
        let bank = Self::new();
        bank.settle_after(2).await;
        bank
    }

    /// The `nth` settlement query (1-based) and every later one report settlement.
    pub async fn settle_after(&self, nth: usize) {
        self.script.write().await.settle_after = Some(nth);
    }

    pub async fn settle_now(&self) {
        let mut script = self.script.write().await;
        let asked = script.counts.get(&BankOp::Settlement).copied().unwrap_or(0);
        script.settle_after = Some(asked + 1);
    }

    /// The next `times` calls of `op` answer 401.
    pub async fn reject_unauthorized(&self, op: BankOp, times: usize) {
        *self.script.write().await.unauthorized.entry(op).or_default() += times;
    }

    /// The next `times` calls of `op` fail.
    pub async fn fail_next(&self, op: BankOp, times: usize) {
        *self.script.write().await.failures.entry(op).or_default() += times;
    }

    /// The `nth` call (1-based, counted over the bank's lifetime) of `op` fails.
    pub async fn fail_call(&self, op: BankOp, nth: usize) {
        self.script.write().await.failing_calls.insert((op, nth));
    }

    /// Every call of `op` waits `delay` before answering.
    pub async fn delay(&self, op: BankOp, delay: Duration) {
        self.script.write().await.delays.insert(op, delay);
    }

    pub async fn answer_empty_qr(&self, empty: bool) {
        self.script.write().await.empty_qr = empty;
    }

    pub async fn omit_group_id(&self, omit: bool) {
        self.script.write().await.omit_group_id = omit;
    }

    /// Replies to bill group creation with this code instead of the submitted one.
    pub async fn correct_code(&self, code: impl Into<String>) {
        self.script.write().await.corrected_code = Some(code.into());
    }

    pub async fn calls(&self) -> Vec<BankCall> {
        self.calls.read().await.clone()
    }

    pub async fn count(&self, op: BankOp) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|call| call.op() == op)
            .count()
    }

    async fn record(&self, call: BankCall) -> Result<usize> {
        let op = call.op();
        self.calls.write().await.push(call);

        let delay = self.script.read().await.delays.get(&op).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut script = self.script.write().await;
        let count = script.counts.entry(op).or_default();
        *count += 1;
        let nth = *count;

        if take_one(&mut script.unauthorized, op) {
            return Err(match op {
                BankOp::Token => CheckoutError::Auth("service account rejected".to_string()),
                _ => CheckoutError::Unauthorized,
            });
        }
        if take_one(&mut script.failures, op) || script.failing_calls.contains(&(op, nth)) {
            return Err(op.simulated_failure());
        }
        Ok(nth)
    }

    async fn next_id(&self) -> u64 {
        let mut script = self.script.write().await;
        script.next_id += 1;
        script.next_id
    }
}

#[async_trait]
impl BankApi for InMemoryBank {
    async fn obtain_token(&self, identity: &ServiceIdentity) -> Result<Credential> {
        let nth = self
            .record(BankCall::ObtainToken {
                username: identity.username.clone(),
            })
            .await?;
        Ok(Credential::new(format!("token-{}", nth)))
    }

    async fn create_bill_group(
        &self,
        _credential: &Credential,
        bill: &Bill,
    ) -> Result<BillGroupReceipt> {
        self.record(BankCall::CreateBillGroup {
            code: bill.code.clone(),
            payer_id: bill.payer_id.clone(),
            stamped: bill.created_at.is_some(),
        })
        .await?;

        let (omit_id, corrected) = {
            let script = self.script.read().await;
            (script.omit_group_id, script.corrected_code.clone())
        };
        if omit_id {
            return Ok(BillGroupReceipt {
                id: None,
                code: None,
            });
        }
        Ok(BillGroupReceipt {
            id: Some(self.next_id().await),
            code: Some(corrected.unwrap_or_else(|| bill.code.clone())),
        })
    }

    async fn create_bill_detail(
        &self,
        _credential: &Credential,
        submission: &DetailSubmission,
    ) -> Result<DetailReceipt> {
        self.record(BankCall::CreateBillDetail {
            group_bill: submission.group_bill,
            code: submission.code.clone(),
            item_name: submission.detail.name.clone(),
        })
        .await?;
        Ok(DetailReceipt {
            id: Some(self.next_id().await),
        })
    }

    async fn request_qr(&self, _credential: &Credential, request: &QrRequest) -> Result<QrReply> {
        self.record(BankCall::RequestQr {
            code: request.payload.code.clone(),
            amount: request.payload.amount,
        })
        .await?;
        if self.script.read().await.empty_qr {
            return Ok(QrReply { image: None });
        }
        Ok(QrReply {
            image: Some(SANDBOX_QR_PNG.to_string()),
        })
    }

    async fn query_settlement(
        &self,
        credential: &Credential,
        customer_id: &str,
    ) -> Result<SettlementReply> {
        let nth = self
            .record(BankCall::QuerySettlement {
                customer_id: customer_id.to_string(),
                token: credential.secret().to_string(),
            })
            .await?;

        let script = self.script.read().await;
        let settled = script.settle_after.is_some_and(|after| nth >= after);
        Ok(SettlementReply {
            result_code: Some(if settled {
                script.settled_code.clone()
            } else {
                "000".to_string()
            }),
        })
    }

    async fn update_bill_status(
        &self,
        _credential: &Credential,
        bill_code: &str,
        status: BillStatus,
    ) -> Result<()> {
        self.record(BankCall::UpdateBillStatus {
            bill_code: bill_code.to_string(),
            status,
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> ServiceIdentity {
        ServiceIdentity {
            username: "svc".to_string(),
            password: "secret".to_string(),
        }
    }

    #[tokio::test]
    async fn test_tokens_are_numbered() {
        let bank = InMemoryBank::new();
        let first = bank.obtain_token(&identity()).await.unwrap();
        let second = bank.obtain_token(&identity()).await.unwrap();
        assert_eq!(first.secret(), "token-1");
        assert_eq!(second.secret(), "token-2");
        assert_eq!(bank.count(BankOp::Token).await, 2);
    }

    #[tokio::test]
    async fn test_settle_after() {
        let bank = InMemoryBank::new();
        bank.settle_after(2).await;
        let credential = Credential::new("t");

        let first = bank.query_settlement(&credential, "BDT1").await.unwrap();
        let second = bank.query_settlement(&credential, "BDT1").await.unwrap();
        assert_eq!(first.result_code.as_deref(), Some("000"));
        assert_eq!(second.result_code.as_deref(), Some("012"));
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let bank = InMemoryBank::new();
        let credential = Credential::new("t");
        bank.reject_unauthorized(BankOp::Settlement, 1).await;
        bank.fail_call(BankOp::StatusUpdate, 2).await;

        assert!(matches!(
            bank.query_settlement(&credential, "BDT1").await,
            Err(CheckoutError::Unauthorized)
        ));
        assert!(bank.query_settlement(&credential, "BDT1").await.is_ok());

        assert!(bank
            .update_bill_status(&credential, "BG1", BillStatus::Cancelled)
            .await
            .is_ok());
        assert!(matches!(
            bank.update_bill_status(&credential, "BG1", BillStatus::Cancelled)
                .await,
            Err(CheckoutError::Transport(_))
        ));
        assert_eq!(bank.calls().await.len(), 4);
    }

    #[tokio::test]
    async fn test_token_outage_is_auth_error() {
        let bank = InMemoryBank::new();
        bank.fail_next(BankOp::Token, 1).await;
        assert!(matches!(
            bank.obtain_token(&identity()).await,
            Err(CheckoutError::Auth(_))
        ));
    }
}
