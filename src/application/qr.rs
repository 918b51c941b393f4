use super::token::TokenProvider;
use crate::config::QrConfig;
use crate::domain::bill::{Amount, CreatedBill};
use crate::domain::ports::{BankApiRef, QrPayload, QrRequest};
use crate::domain::qr::QrImage;
use crate::error::{CheckoutError, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// Requests a scannable VietQR code for a bill that already exists remotely.
pub struct QrIssuer {
    api: BankApiRef,
    tokens: Arc<TokenProvider>,
    settings: QrConfig,
}

impl QrIssuer {
    pub fn new(api: BankApiRef, tokens: Arc<TokenProvider>, settings: QrConfig) -> Self {
        Self {
            api,
            tokens,
            settings,
        }
    }

    /// Taking a `CreatedBill` means a QR is never requested for a bill the
    /// server has not assigned an id to. An empty reply is
    /// `QrUnavailable`, which callers may retry.
    pub async fn issue_qr(
        &self,
        bill: &CreatedBill,
        payer_id: &str,
        primary_amount: Amount,
    ) -> Result<QrImage> {
        let request = QrRequest {
            service_code: self.settings.service_code.clone(),
            payload: QrPayload {
                service_id: self.settings.service_id.clone(),
                code: payer_id.to_string(),
                name: self.settings.merchant_name.clone(),
                amount: primary_amount.value(),
            },
        };

        let reply = self
            .tokens
            .authorized(|credential| {
                let api = self.api.clone();
                let request = request.clone();
                async move { api.request_qr(&credential, &request).await }
            })
            .await?;

        match reply.image.map(QrImage::from_base64) {
            Some(Ok(image)) => {
                info!(bill_id = bill.id, payer_id, "QR issued");
                Ok(image)
            }
            Some(Err(e)) => Err(e),
            None => {
                warn!(bill_id = bill.id, payer_id, "QR provider answered without an image");
                Err(CheckoutError::QrUnavailable)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::credential::ServiceIdentity;
    use crate::infrastructure::in_memory::{BankCall, InMemoryBank, SANDBOX_QR_PNG};

    fn issuer(bank: &InMemoryBank) -> QrIssuer {
        let api: BankApiRef = Arc::new(bank.clone());
        let tokens = Arc::new(TokenProvider::new(
            api.clone(),
            ServiceIdentity {
                username: "svc".to_string(),
                password: "pw".to_string(),
            },
        ));
        QrIssuer::new(api, tokens, QrConfig::default())
    }

    #[tokio::test]
    async fn test_issue_qr_uses_payer_and_primary_amount() {
        let bank = InMemoryBank::new();
        let qr = issuer(&bank)
            .issue_qr(
                &CreatedBill::new(7, "BG123456"),
                "BDT654321",
                Amount::new(2_090_000).unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(qr.base64(), SANDBOX_QR_PNG);
        assert!(bank.calls().await.contains(&BankCall::RequestQr {
            code: "BDT654321".to_string(),
            amount: 2_090_000,
        }));
    }

    #[tokio::test]
    async fn test_empty_reply_is_unavailable_and_retryable() {
        let bank = InMemoryBank::new();
        bank.answer_empty_qr(true).await;
        let issuer = issuer(&bank);
        let bill = CreatedBill::new(7, "BG123456");
        let amount = Amount::new(10).unwrap();

        assert!(matches!(
            issuer.issue_qr(&bill, "BDT1", amount).await,
            Err(CheckoutError::QrUnavailable)
        ));

        bank.answer_empty_qr(false).await;
        assert!(issuer.issue_qr(&bill, "BDT1", amount).await.is_ok());
    }
}
