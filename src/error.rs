use thiserror::Error;

#[derive(Error, Debug)]
pub enum CheckoutError {
    #[error("Authentication error: {0}")]
    Auth(String),
    #[error("Bill creation error: {0}")]
    BillCreate(String),
    #[error("QR provider returned no image data")]
    QrUnavailable,
    #[error("Request rejected as unauthorized")]
    Unauthorized,
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Bill status update error: {0}")]
    StatusUpdate(String),
    #[error("Another checkout operation is already in progress")]
    Busy,
    #[error("Payment session was replaced while the operation was in flight")]
    SessionSuperseded,
    #[error("Payment cancellation is disabled")]
    CancellationDisabled,
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CheckoutError {
    /// True for a 401 from an authenticated call.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, CheckoutError::Unauthorized)
    }
}

pub type Result<T> = std::result::Result<T, CheckoutError>;
