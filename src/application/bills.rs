use super::token::TokenProvider;
use crate::domain::bill::{Bill, BillDetail, BillStatus, CreatedBill, CreatedDetail};
use crate::domain::ports::{BankApiRef, DetailSubmission};
use crate::error::{CheckoutError, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info};

/// Creates bills and their line items remotely, and updates bill status.
///
/// Nothing here is idempotent: every successful call creates a remote
/// record. Callers guard against re-invocation.
pub struct BillRepository {
    api: BankApiRef,
    tokens: Arc<TokenProvider>,
}

impl BillRepository {
    pub fn new(api: BankApiRef, tokens: Arc<TokenProvider>) -> Self {
        Self { api, tokens }
    }

    /// Creates the bill group (unless `record` already holds it), then every
    /// line item not yet in `record`, strictly in input order.
    ///
    /// Progress is written to `record` as it happens. A failure part-way
    /// leaves the group and the details created so far recorded; nothing is
    /// rolled back, and calling again picks up at the first missing detail.
    pub async fn create_bill(
        &self,
        draft: &Bill,
        details: &[BillDetail],
        record: &mut Option<CreatedBill>,
    ) -> Result<()> {
        let created = match record.take() {
            Some(created) => created,
            None => self.create_group(draft).await?,
        };
        let created = record.insert(created);

        for (index, detail) in details.iter().enumerate().skip(created.details.len()) {
            let submission = DetailSubmission {
                detail: detail.clone(),
                group_bill: created.id,
                code: created.code.clone(),
            };
            let receipt = self
                .tokens
                .authorized(|credential| {
                    let api = self.api.clone();
                    let submission = submission.clone();
                    async move { api.create_bill_detail(&credential, &submission).await }
                })
                .await
                .inspect_err(|e| error!(bill_id = created.id, index, error = %e, "line item creation failed"))?;

            let id = receipt.id.ok_or_else(|| {
                CheckoutError::BillCreate(format!("line item {} reply lacked an id", index))
            })?;
            created.details.push(CreatedDetail {
                id,
                group_bill: submission.group_bill,
                code: submission.code,
                detail: submission.detail,
            });
        }

        info!(
            bill_id = created.id,
            code = %created.code,
            details = created.details.len(),
            "bill created"
        );
        Ok(())
    }

    async fn create_group(&self, draft: &Bill) -> Result<CreatedBill> {
        let mut stamped = draft.clone();
        stamped.created_at = Some(Utc::now());

        let receipt = self
            .tokens
            .authorized(|credential| {
                let api = self.api.clone();
                let stamped = stamped.clone();
                async move { api.create_bill_group(&credential, &stamped).await }
            })
            .await
            .map_err(|e| match e {
                CheckoutError::Auth(_) | CheckoutError::BillCreate(_) => e,
                other => CheckoutError::BillCreate(other.to_string()),
            })?;

        let id = receipt
            .id
            .ok_or_else(|| CheckoutError::BillCreate("reply lacked a bill id".to_string()))?;
        let code = receipt
            .code
            .filter(|code| !code.is_empty())
            .unwrap_or_else(|| draft.code.clone());
        Ok(CreatedBill::new(id, code))
    }

    /// Tells the server the bill with `bill_code` moved to `status`.
    pub async fn update_status(&self, bill_code: &str, status: BillStatus) -> Result<()> {
        self.tokens
            .authorized(|credential| {
                let api = self.api.clone();
                async move { api.update_bill_status(&credential, bill_code, status).await }
            })
            .await
            .map_err(|e| match e {
                CheckoutError::Auth(_) => e,
                other => CheckoutError::StatusUpdate(other.to_string()),
            })
    }
}
