//! Configuration loading for the checkout client.

use crate::domain::bill::{Amount, Bill, BillDetail, BillStatus};
use crate::domain::credential::ServiceIdentity;
use crate::error::{CheckoutError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const USERNAME_ENV: &str = "BILLPAY_USERNAME";
pub const PASSWORD_ENV: &str = "BILLPAY_PASSWORD";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub qr: QrConfig,
    #[serde(default)]
    pub flow: FlowConfig,
    #[serde(default)]
    pub bill: BillConfig,
    #[serde(default = "default_items")]
    pub items: Vec<ItemConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Service-account name; `BILLPAY_USERNAME` overrides it.
    #[serde(default)]
    pub username: String,
    /// Service-account password; `BILLPAY_PASSWORD` overrides it.
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub endpoints: EndpointConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default = "default_token_path")]
    pub token: String,
    #[serde(default = "default_bill_group_path")]
    pub bill_group: String,
    #[serde(default = "default_bill_detail_path")]
    pub bill_detail: String,
    #[serde(default = "default_qr_path")]
    pub qr: String,
    #[serde(default = "default_settlement_path")]
    pub settlement: String,
    #[serde(default = "default_status_path")]
    pub bill_status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrConfig {
    #[serde(default = "default_service_code")]
    pub service_code: String,
    #[serde(default = "default_service_id")]
    pub service_id: String,
    #[serde(default = "default_merchant_name")]
    pub merchant_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    #[serde(default = "default_countdown_secs")]
    pub countdown_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Settlement result code reported by the status query.
    #[serde(default = "default_settled_code")]
    pub settled_code: String,
    #[serde(default = "default_true")]
    pub enable_countdown: bool,
    #[serde(default = "default_true")]
    pub enable_cancellation: bool,
}

/// Payer and merchant context copied into every fresh bill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillConfig {
    #[serde(default = "default_payer_name")]
    pub payer_name: String,
    #[serde(default = "default_payer_address")]
    pub payer_address: String,
    #[serde(default = "default_three")]
    pub merchant: u32,
    #[serde(default = "default_three")]
    pub customer: u32,
    #[serde(default = "default_one")]
    pub service_package: u32,
    #[serde(default = "default_bill_type")]
    pub bill_type: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemConfig {
    pub name: String,
    pub amount: u64,
    #[serde(default)]
    pub remark: String,
    pub billing_month: u8,
    pub billing_year: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_base_url() -> String {
    "https://bankapi.bigdatatech.vn".into()
}
fn default_timeout_secs() -> u64 {
    15
}
fn default_token_path() -> String {
    "/api/token".into()
}
fn default_bill_group_path() -> String {
    "/data/BillGroup/".into()
}
fn default_bill_detail_path() -> String {
    "/data/BillDetail/".into()
}
fn default_qr_path() -> String {
    "/bidv/".into()
}
fn default_settlement_path() -> String {
    "/bidv-bigdata/getbill".into()
}
fn default_status_path() -> String {
    "/api/update-bill-status".into()
}
fn default_service_code() -> String {
    "genvietqrcode".into()
}
fn default_service_id() -> String {
    "BDT001".into()
}
fn default_merchant_name() -> String {
    "Bigdata".into()
}
fn default_countdown_secs() -> u64 {
    900
}
fn default_poll_interval_ms() -> u64 {
    3000
}
fn default_settled_code() -> String {
    "012".into()
}
fn default_true() -> bool {
    true
}
fn default_payer_name() -> String {
    "MPhuong".into()
}
fn default_payer_address() -> String {
    "Hà Nội, Việt Nam".into()
}
fn default_three() -> u32 {
    3
}
fn default_one() -> u32 {
    1
}
fn default_bill_type() -> u32 {
    2
}
fn default_log_level() -> String {
    "info".into()
}
fn default_items() -> Vec<ItemConfig> {
    vec![ItemConfig {
        name: "Giày New Balance 530 Natural Indigo (GS)".into(),
        amount: 2_090_000,
        remark: "Thanh toán đơn hàng test".into(),
        billing_month: 11,
        billing_year: 2025,
    }]
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            qr: QrConfig::default(),
            flow: FlowConfig::default(),
            bill: BillConfig::default(),
            items: default_items(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            username: String::new(),
            password: String::new(),
            endpoints: EndpointConfig::default(),
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            token: default_token_path(),
            bill_group: default_bill_group_path(),
            bill_detail: default_bill_detail_path(),
            qr: default_qr_path(),
            settlement: default_settlement_path(),
            bill_status: default_status_path(),
        }
    }
}

impl Default for QrConfig {
    fn default() -> Self {
        Self {
            service_code: default_service_code(),
            service_id: default_service_id(),
            merchant_name: default_merchant_name(),
        }
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            countdown_secs: default_countdown_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            settled_code: default_settled_code(),
            enable_countdown: true,
            enable_cancellation: true,
        }
    }
}

impl Default for BillConfig {
    fn default() -> Self {
        Self {
            payer_name: default_payer_name(),
            payer_address: default_payer_address(),
            merchant: default_three(),
            customer: default_three(),
            service_package: default_one(),
            bill_type: default_bill_type(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ApiConfig {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The service-account identity. Fails if either half is missing.
    pub fn identity(&self) -> Result<ServiceIdentity> {
        if self.username.is_empty() || self.password.is_empty() {
            return Err(CheckoutError::Config(format!(
                "service account credentials missing; set api.username/api.password or {}/{}",
                USERNAME_ENV, PASSWORD_ENV
            )));
        }
        Ok(ServiceIdentity {
            username: self.username.clone(),
            password: self.password.clone(),
        })
    }
}

impl FlowConfig {
    pub fn countdown(&self) -> Duration {
        Duration::from_secs(self.countdown_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Rejects settings the timers cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(CheckoutError::Config(
                "flow.poll_interval_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl CheckoutConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&contents).map_err(|e| CheckoutError::Config(e.to_string()))?;
        config.flow.validate()?;
        Ok(config)
    }

    /// Save the current config to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| CheckoutError::Config(e.to_string()))?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Applies `BILLPAY_USERNAME` / `BILLPAY_PASSWORD` when set.
    pub fn apply_env(&mut self) {
        if let Ok(username) = std::env::var(USERNAME_ENV) {
            self.api.username = username;
        }
        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            self.api.password = password;
        }
    }

    /// The draft bill every attempt starts from. Identifiers are filled in
    /// per attempt.
    pub fn bill_template(&self) -> Bill {
        Bill {
            code: String::new(),
            payer_id: String::new(),
            payer_name: self.bill.payer_name.clone(),
            payer_address: self.bill.payer_address.clone(),
            merchant: self.bill.merchant,
            customer: self.bill.customer,
            service_package: self.bill.service_package,
            bill_type: self.bill.bill_type,
            status: BillStatus::Draft,
            created_at: None,
        }
    }

    pub fn line_items(&self) -> Result<Vec<BillDetail>> {
        if self.items.is_empty() {
            return Err(CheckoutError::Config("at least one item is required".into()));
        }
        self.items
            .iter()
            .map(|item| {
                Ok(BillDetail {
                    name: item.name.clone(),
                    amount: Amount::new(item.amount)?,
                    remark: item.remark.clone(),
                    billing_month: item.billing_month,
                    billing_year: item.billing_year,
                    status: BillStatus::Draft,
                })
            })
            .collect()
    }
}
