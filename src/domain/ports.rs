use super::bill::{Bill, BillDetail, BillStatus};
use super::credential::{Credential, ServiceIdentity};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Reply to a bill group submission. Both fields may be missing on a
/// malformed reply; callers decide what that means.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BillGroupReceipt {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub code: Option<String>,
}

/// A line item tagged with the parent bill it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailSubmission {
    #[serde(flatten)]
    pub detail: BillDetail,
    pub group_bill: u64,
    pub code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DetailReceipt {
    #[serde(default)]
    pub id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QrRequest {
    pub service_code: String,
    pub payload: QrPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QrPayload {
    #[serde(rename = "serviceId")]
    pub service_id: String,
    /// The payer id; settlement is later queried by the same value.
    pub code: String,
    pub name: String,
    pub amount: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct QrReply {
    #[serde(rename = "vietQRImage", default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SettlementReply {
    #[serde(default)]
    pub result_code: Option<String>,
}

/// The remote banking API the checkout flow runs against.
///
/// Every method except `obtain_token` is authenticated. Implementations
/// report a 401 as `CheckoutError::Unauthorized` so callers can drop the
/// cached credential.
#[async_trait]
pub trait BankApi: Send + Sync {
    async fn obtain_token(&self, identity: &ServiceIdentity) -> Result<Credential>;
    async fn create_bill_group(&self, credential: &Credential, bill: &Bill)
    -> Result<BillGroupReceipt>;
    async fn create_bill_detail(
        &self,
        credential: &Credential,
        submission: &DetailSubmission,
    ) -> Result<DetailReceipt>;
    async fn request_qr(&self, credential: &Credential, request: &QrRequest) -> Result<QrReply>;
    async fn query_settlement(
        &self,
        credential: &Credential,
        customer_id: &str,
    ) -> Result<SettlementReply>;
    async fn update_bill_status(
        &self,
        credential: &Credential,
        bill_code: &str,
        status: BillStatus,
    ) -> Result<()>;
}

pub type BankApiRef = Arc<dyn BankApi>;
