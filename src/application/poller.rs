use super::task::TaskSlot;
use super::token::TokenProvider;
use crate::domain::ports::BankApiRef;
use crate::error::{CheckoutError, Result};
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Pending,
    Settled,
}

/// What ended a poll loop on its own.
#[derive(Debug)]
pub enum PollSignal {
    Settled,
    /// No credential could be obtained; the loop stopped.
    CredentialUnavailable(CheckoutError),
}

/// Repeatedly queries settlement for one payer until paid or stopped.
///
/// At most one loop runs at a time. Ticks are sequential: a slow reply
/// delays the next tick instead of overlapping it.
pub struct StatusPoller {
    api: BankApiRef,
    tokens: Arc<TokenProvider>,
    period: Duration,
    settled_code: String,
    slot: TaskSlot,
}

impl StatusPoller {
    pub fn new(
        api: BankApiRef,
        tokens: Arc<TokenProvider>,
        period: Duration,
        settled_code: impl Into<String>,
    ) -> Self {
        Self {
            api,
            tokens,
            period,
            settled_code: settled_code.into(),
            slot: TaskSlot::new("status-poller"),
        }
    }

    /// One settlement query. A 401 drops the cached credential so the next
    /// check fetches a fresh one; it is not retried here.
    pub async fn check(&self, payer_id: &str) -> Result<PollOutcome> {
        let credential = self.tokens.get_token().await?;
        match self.api.query_settlement(&credential, payer_id).await {
            Ok(reply) if reply.result_code.as_deref() == Some(self.settled_code.as_str()) => {
                Ok(PollOutcome::Settled)
            }
            Ok(_) => Ok(PollOutcome::Pending),
            Err(e) if e.is_unauthorized() => {
                warn!(payer_id, "settlement query unauthorized; dropping credential");
                self.tokens.invalidate().await;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Cancels any running loop, checks immediately, then checks once per
    /// period. `on_signal` runs once when the loop ends by itself.
    pub fn start<F, Fut>(self: &Arc<Self>, payer_id: String, on_signal: F)
    where
        F: FnOnce(PollSignal) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if payer_id.is_empty() {
            return;
        }
        self.slot.stop();

        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.period;
        info!(%payer_id, ?period, "polling started");
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(poller) = weak.upgrade() else {
                    break;
                };
                debug!(%payer_id, "checking settlement");
                let checked = poller.check(&payer_id).await;
                drop(poller);

                match checked {
                    Ok(PollOutcome::Settled) => {
                        info!(%payer_id, "settlement confirmed");
                        on_signal(PollSignal::Settled).await;
                        break;
                    }
                    Ok(PollOutcome::Pending) => {}
                    Err(e @ CheckoutError::Auth(_)) => {
                        error!(%payer_id, error = %e, "no credential; polling stopped");
                        on_signal(PollSignal::CredentialUnavailable(e)).await;
                        break;
                    }
                    Err(e) if e.is_unauthorized() => {}
                    Err(e) => warn!(%payer_id, error = %e, "settlement check failed"),
                }
            }
        });
        self.slot.replace(handle);
    }

    /// Idempotent.
    pub fn stop(&self) -> bool {
        let stopped = self.slot.stop();
        if stopped {
            info!("polling stopped");
        }
        stopped
    }

    pub fn is_polling(&self) -> bool {
        self.slot.is_active()
    }
}
