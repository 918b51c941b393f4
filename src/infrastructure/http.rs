use crate::config::ApiConfig;
use crate::domain::bill::{Bill, BillStatus};
use crate::domain::credential::{Credential, ServiceIdentity};
use crate::domain::ports::{
    BankApi, BillGroupReceipt, DetailReceipt, DetailSubmission, QrReply, QrRequest,
    SettlementReply,
};
use crate::error::{CheckoutError, Result};
use async_trait::async_trait;
use reqwest::{Client as HttpClient, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Deserialize)]
struct TokenReply {
    #[serde(default)]
    access: Option<String>,
}

#[derive(Deserialize)]
struct ErrorReply {
    detail: String,
}

#[derive(Serialize)]
struct SettlementQuery<'a> {
    customer_id: &'a str,
}

#[derive(Serialize)]
struct StatusUpdate<'a> {
    bill_group_code: &'a str,
    status_id: u8,
}

/// `BankApi` over the bank's JSON/HTTPS endpoints.
pub struct HttpBank {
    http_client: HttpClient,
    config: ApiConfig,
}

impl HttpBank {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| CheckoutError::Config(format!("HTTP client: {}", e)))?;
        Ok(Self {
            http_client,
            config,
        })
    }

    async fn send<B>(&self, path: &str, credential: Option<&Credential>, body: &B) -> Result<Response>
    where
        B: Serialize + ?Sized,
    {
        let url = self.config.url(path);
        debug!(%url, "POST");
        let mut request = self.http_client.post(&url).json(body);
        if let Some(credential) = credential {
            request = request.bearer_auth(credential.secret());
        }
        let response = request
            .send()
            .await
            .map_err(|e| CheckoutError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(CheckoutError::Unauthorized);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let reason = serde_json::from_str::<ErrorReply>(&text)
                .map(|reply| reply.detail)
                .unwrap_or(text);
            return Err(CheckoutError::Transport(format!("HTTP {}: {}", status, reason)));
        }
        Ok(response)
    }

    async fn post<B, R>(&self, path: &str, credential: Option<&Credential>, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.send(path, credential, body)
            .await?
            .json::<R>()
            .await
            .map_err(|e| CheckoutError::Transport(format!("malformed reply: {}", e)))
    }
}

#[async_trait]
impl BankApi for HttpBank {
    async fn obtain_token(&self, identity: &ServiceIdentity) -> Result<Credential> {
        let reply: TokenReply = self
            .post(&self.config.endpoints.token, None, identity)
            .await
            .map_err(|e| match e {
                CheckoutError::Unauthorized => {
                    CheckoutError::Auth("service account rejected".to_string())
                }
                other => CheckoutError::Auth(other.to_string()),
            })?;
        reply
            .access
            .filter(|token| !token.is_empty())
            .map(Credential::new)
            .ok_or_else(|| CheckoutError::Auth("reply carried no access token".to_string()))
    }

    async fn create_bill_group(&self, credential: &Credential, bill: &Bill) -> Result<BillGroupReceipt> {
        self.post(&self.config.endpoints.bill_group, Some(credential), bill)
            .await
    }

    async fn create_bill_detail(
        &self,
        credential: &Credential,
        submission: &DetailSubmission,
    ) -> Result<DetailReceipt> {
        self.post(&self.config.endpoints.bill_detail, Some(credential), submission)
            .await
    }

    async fn request_qr(&self, credential: &Credential, request: &QrRequest) -> Result<QrReply> {
        self.post(&self.config.endpoints.qr, Some(credential), request)
            .await
    }

    async fn query_settlement(
        &self,
        credential: &Credential,
        customer_id: &str,
    ) -> Result<SettlementReply> {
        self.post(
            &self.config.endpoints.settlement,
            Some(credential),
            &SettlementQuery { customer_id },
        )
        .await
    }

    async fn update_bill_status(
        &self,
        credential: &Credential,
        bill_code: &str,
        status: BillStatus,
    ) -> Result<()> {
        self.send(
            &self.config.endpoints.bill_status,
            Some(credential),
            &StatusUpdate {
                bill_group_code: bill_code,
                status_id: status.code(),
            },
        )
        .await?;
        Ok(())
    }
}
