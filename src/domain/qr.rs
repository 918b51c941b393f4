use crate::error::{CheckoutError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// A VietQR payment code as returned by the provider (base64 PNG).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrImage {
    base64: String,
}

impl QrImage {
    /// Rejects an empty payload; the provider sometimes answers without one.
    pub fn from_base64(payload: impl Into<String>) -> Result<Self> {
        let base64 = payload.into();
        if base64.trim().is_empty() {
            return Err(CheckoutError::QrUnavailable);
        }
        Ok(Self { base64 })
    }

    pub fn base64(&self) -> &str {
        &self.base64
    }

    pub fn data_uri(&self) -> String {
        format!("data:image/png;base64,{}", self.base64)
    }

    pub fn png_bytes(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(self.base64.trim())
            .map_err(|e| CheckoutError::Validation(format!("QR image is not valid base64: {}", e)))
    }
}
