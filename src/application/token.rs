use crate::domain::credential::{Credential, ServiceIdentity};
use crate::domain::ports::BankApiRef;
use crate::error::{CheckoutError, Result};
use std::future::Future;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Obtains and caches the bearer credential for the remote API.
///
/// One credential is shared by every component. It is fetched lazily and
/// dropped whenever a downstream call answers 401.
pub struct TokenProvider {
    api: BankApiRef,
    identity: ServiceIdentity,
    cached: RwLock<Option<Credential>>,
}

impl TokenProvider {
    pub fn new(api: BankApiRef, identity: ServiceIdentity) -> Self {
        Self {
            api,
            identity,
            cached: RwLock::new(None),
        }
    }

    /// Returns the cached credential, fetching one if none is held.
    pub async fn get_token(&self) -> Result<Credential> {
        if let Some(credential) = self.cached.read().await.clone() {
            return Ok(credential);
        }
        self.refresh().await
    }

    /// Fetches a new credential and replaces the cached one.
    pub async fn refresh(&self) -> Result<Credential> {
        match self.api.obtain_token(&self.identity).await {
            Ok(credential) => {
                info!(username = %self.identity.username, "obtained API credential");
                *self.cached.write().await = Some(credential.clone());
                Ok(credential)
            }
            Err(e) => {
                *self.cached.write().await = None;
                Err(match e {
                    CheckoutError::Auth(reason) => CheckoutError::Auth(reason),
                    other => CheckoutError::Auth(other.to_string()),
                })
            }
        }
    }

    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }

    pub async fn cached(&self) -> Option<Credential> {
        self.cached.read().await.clone()
    }

    /// Runs an authenticated call. On a 401 the credential is dropped and the
    /// call is retried exactly once with a fresh one.
    pub async fn authorized<T, F, Fut>(&self, mut call: F) -> Result<T>
    where
        F: FnMut(Credential) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let credential = self.get_token().await?;
        match call(credential).await {
            Err(CheckoutError::Unauthorized) => {
                warn!("credential rejected; refreshing and retrying once");
                self.invalidate().await;
                let credential = self.refresh().await?;
                call(credential).await
            }
            other => other,
        }
    }
}
