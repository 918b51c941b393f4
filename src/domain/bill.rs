use crate::error::CheckoutError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status shared by a bill group and its line items.
///
/// The remote API speaks integer codes. Only the codes this client acts on
/// have named variants; anything else round-trips through `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum BillStatus {
    #[default]
    Draft,
    Cancelled,
    Settled,
    Other(u8),
}

impl BillStatus {
    pub fn code(self) -> u8 {
        match self {
            BillStatus::Draft => 1,
            BillStatus::Cancelled => 2,
            BillStatus::Settled => 7,
            BillStatus::Other(code) => code,
        }
    }
}

impl From<u8> for BillStatus {
    fn from(code: u8) -> Self {
        match code {
            1 => BillStatus::Draft,
            2 => BillStatus::Cancelled,
            7 => BillStatus::Settled,
            other => BillStatus::Other(other),
        }
    }
}

impl From<BillStatus> for u8 {
    fn from(status: BillStatus) -> Self {
        status.code()
    }
}

/// A positive amount in whole currency units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct Amount(u64);

impl Amount {
    pub fn new(value: u64) -> Result<Self, CheckoutError> {
        if value > 0 {
            Ok(Self(value))
        } else {
            Err(CheckoutError::Validation(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl TryFrom<u64> for Amount {
    type Error = CheckoutError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for u64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// The parent billing record identifying payer and merchant context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    /// Local correlation code (`BG` + 6 digits) until the server corrects it.
    pub code: String,
    #[serde(rename = "end_user_id")]
    pub payer_id: String,
    #[serde(rename = "end_user_name")]
    pub payer_name: String,
    #[serde(rename = "end_user_addr")]
    pub payer_address: String,
    pub merchant: u32,
    pub customer: u32,
    pub service_package: u32,
    #[serde(rename = "type")]
    pub bill_type: u32,
    pub status: BillStatus,
    /// Stamped right before submission.
    #[serde(rename = "create_time", skip_serializing_if = "Option::is_none", default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A single line item under a bill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillDetail {
    #[serde(rename = "item_name")]
    pub name: String,
    pub amount: Amount,
    pub remark: String,
    pub billing_month: u8,
    pub billing_year: u16,
    pub status: BillStatus,
}

/// A line item the server has accepted, tagged with its parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedDetail {
    pub id: u64,
    pub group_bill: u64,
    pub code: String,
    #[serde(flatten)]
    pub detail: BillDetail,
}

/// A bill that exists remotely, plus the line items created under it so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedBill {
    pub id: u64,
    pub code: String,
    pub details: Vec<CreatedDetail>,
}

impl CreatedBill {
    pub fn new(id: u64, code: impl Into<String>) -> Self {
        Self {
            id,
            code: code.into(),
            details: Vec::new(),
        }
    }

    /// True once every requested line item has a server id.
    pub fn is_complete(&self, requested: usize) -> bool {
        self.details.len() >= requested
    }

    pub fn set_status(&mut self, status: BillStatus) {
        for created in &mut self.details {
            created.detail.status = status;
        }
    }
}

impl Bill {
    /// Sets the status of the bill and every given detail.
    pub fn set_status(&mut self, details: &mut [BillDetail], status: BillStatus) {
        self.status = status;
        for detail in details {
            detail.status = status;
        }
    }
}
