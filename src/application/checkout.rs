use super::bills::BillRepository;
use super::expiry::ExpiryTimer;
use super::poller::{PollOutcome, PollSignal, StatusPoller};
use super::qr::QrIssuer;
use super::token::TokenProvider;
use crate::config::{CheckoutConfig, FlowConfig};
use crate::domain::bill::{Bill, BillDetail, BillStatus, CreatedBill};
use crate::domain::credential::ServiceIdentity;
use crate::domain::ports::BankApiRef;
use crate::domain::qr::QrImage;
use crate::domain::session::{CheckoutPhase, PaymentSession, SessionId, SessionOutcome};
use crate::error::{CheckoutError, Result};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const EVENT_CAPACITY: usize = 64;

/// Notifications for whoever presents the checkout.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutEvent {
    ModalOpened,
    ModalClosed,
    BillCreated {
        bill_id: u64,
        bill_code: String,
    },
    CreateFailed {
        reason: String,
    },
    QrIssued {
        payer_id: String,
    },
    QrUnavailable,
    /// Payment confirmed; the caller should move to its success view.
    Settled {
        bill_code: String,
        payer_id: String,
    },
    /// The countdown ran out. The session was reset whether or not the
    /// remote cancellation went through.
    Expired {
        bill_code: String,
        remote_cancelled: bool,
        error: Option<String>,
    },
    Cancelled {
        bill_code: String,
    },
    CancelFailed {
        reason: String,
    },
    AuthFailed {
        reason: String,
    },
}

/// Read-only view of the checkout state.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutSnapshot {
    pub phase: CheckoutPhase,
    pub session_id: SessionId,
    pub bill: Bill,
    pub details: Vec<BillDetail>,
    pub created: Option<CreatedBill>,
    pub qr: Option<QrImage>,
    pub creating: bool,
    pub qr_loading: bool,
    pub cancelling: bool,
    pub modal_open: bool,
    pub polling: bool,
    pub countdown: Duration,
    pub last_outcome: Option<SessionOutcome>,
}

struct CheckoutState {
    phase: CheckoutPhase,
    session: PaymentSession,
    creating: bool,
    qr_loading: bool,
    cancelling: bool,
    modal_open: bool,
    last_outcome: Option<SessionOutcome>,
}

impl CheckoutState {
    fn busy(&self) -> bool {
        self.creating || self.qr_loading || self.cancelling
    }

    fn conclude(&mut self, outcome: SessionOutcome) {
        self.phase = outcome.phase();
        self.modal_open = false;
        self.last_outcome = Some(outcome);
    }
}

#[derive(Clone, Copy)]
enum Flag {
    Creating,
    QrLoading,
    Cancelling,
}

impl Flag {
    fn clear(self, state: &mut CheckoutState) {
        match self {
            Flag::Creating => state.creating = false,
            Flag::QrLoading => state.qr_loading = false,
            Flag::Cancelling => state.cancelling = false,
        }
    }
}

fn lock(state: &Mutex<CheckoutState>) -> MutexGuard<'_, CheckoutState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Clears an in-flight flag when the operation ends, including when its
/// future is dropped mid-await.
struct InFlight<'a> {
    state: &'a Mutex<CheckoutState>,
    flag: Flag,
    armed: bool,
}

impl<'a> InFlight<'a> {
    fn new(state: &'a Mutex<CheckoutState>, flag: Flag) -> Self {
        Self {
            state,
            flag,
            armed: true,
        }
    }

    /// Clears the flag on a state the caller already holds locked.
    fn release(mut self, locked: &mut CheckoutState) {
        self.flag.clear(locked);
        self.armed = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.flag.clear(&mut lock(self.state));
        }
    }
}

struct Inner {
    tokens: Arc<TokenProvider>,
    bills: BillRepository,
    qr: QrIssuer,
    poller: Arc<StatusPoller>,
    expiry: ExpiryTimer,
    flow: FlowConfig,
    template: Bill,
    items: Vec<BillDetail>,
    state: Mutex<CheckoutState>,
    events: broadcast::Sender<CheckoutEvent>,
}

/// The checkout state machine.
///
/// `Checkout` coordinates bill creation, QR issue, settlement polling and
/// the expiry countdown for one payment attempt at a time. Handles are
/// cheap to clone and share the same state; dropping the last one stops
/// any running poll loop or countdown.
#[derive(Clone)]
pub struct Checkout {
    inner: Arc<Inner>,
}

impl Checkout {
    /// Creates a new `Checkout` in the `Closed` phase with a fresh draft.
    ///
    /// # Arguments
    ///
    /// * `api` - The remote bank.
    /// * `identity` - The service account exchanged for credentials.
    /// * `config` - Flow options, QR settings, the bill template and line items.
    pub fn new(api: BankApiRef, identity: ServiceIdentity, config: &CheckoutConfig) -> Result<Self> {
        config.flow.validate()?;
        let items = config.line_items()?;
        let template = config.bill_template();
        let tokens = Arc::new(TokenProvider::new(api.clone(), identity));
        let poller = Arc::new(StatusPoller::new(
            api.clone(),
            tokens.clone(),
            config.flow.poll_interval(),
            config.flow.settled_code.clone(),
        ));
        let session = PaymentSession::begin(SessionId::first(), &template, &items);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            inner: Arc::new(Inner {
                bills: BillRepository::new(api.clone(), tokens.clone()),
                qr: QrIssuer::new(api, tokens.clone(), config.qr.clone()),
                tokens,
                poller,
                expiry: ExpiryTimer::new(config.flow.countdown()),
                flow: config.flow.clone(),
                template,
                items,
                state: Mutex::new(CheckoutState {
                    phase: CheckoutPhase::Closed,
                    session,
                    creating: false,
                    qr_loading: false,
                    cancelling: false,
                    modal_open: false,
                    last_outcome: None,
                }),
                events,
            }),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CheckoutEvent> {
        self.inner.events.subscribe()
    }

    pub fn tokens(&self) -> &TokenProvider {
        &self.inner.tokens
    }

    pub fn snapshot(&self) -> CheckoutSnapshot {
        let state = lock(&self.inner.state);
        CheckoutSnapshot {
            phase: state.phase,
            session_id: state.session.id(),
            bill: state.session.bill.clone(),
            details: state.session.details.clone(),
            created: state.session.created.clone(),
            qr: state.session.qr.clone(),
            creating: state.creating,
            qr_loading: state.qr_loading,
            cancelling: state.cancelling,
            modal_open: state.modal_open,
            polling: self.inner.poller.is_polling(),
            countdown: self.inner.expiry.remaining(),
            last_outcome: state.last_outcome,
        }
    }

    /// Shows the payment presentation over the current draft.
    ///
    /// A session that already reached a terminal outcome is replaced by a
    /// fresh one first.
    pub fn open_payment_modal(&self) {
        {
            let mut state = lock(&self.inner.state);
            if state.session.is_resolved() {
                state.session.discard(&self.inner.template, &self.inner.items);
            } else {
                state.session.reset_to_draft();
            }
            state.modal_open = true;
            state.phase = CheckoutPhase::Open;
        }
        self.inner.expiry.reset();
        self.emit(CheckoutEvent::ModalOpened);
    }

    /// Hides the presentation and stops polling and the countdown. A bill
    /// already created is kept, so paying again resumes it.
    pub fn close_payment_modal(&self) {
        self.inner.poller.stop();
        self.inner.expiry.stop();
        {
            let mut state = lock(&self.inner.state);
            state.modal_open = false;
            state.session.qr = None;
            state.phase = CheckoutPhase::Closed;
        }
        self.emit(CheckoutEvent::ModalClosed);
    }

    /// Creates the bill if needed, requests a QR and starts polling. Starts
    /// the countdown too when it is enabled.
    ///
    /// Fails with `Busy` while another creation, QR request or cancellation
    /// is in flight. Any failure leaves the session as it was for inspection.
    pub async fn pay_with_qr(&self) -> Result<()> {
        self.pay(self.inner.flow.enable_countdown).await
    }

    /// Discards the current attempt, starts a fresh one and pays it. The
    /// countdown starts only after the presentation is shown.
    pub async fn start_payment_with_qr(&self) -> Result<()> {
        {
            let mut state = lock(&self.inner.state);
            if state.busy() {
                return Err(CheckoutError::Busy);
            }
            self.inner.poller.stop();
            self.inner.expiry.stop();
            state.session.discard(&self.inner.template, &self.inner.items);
            state.phase = CheckoutPhase::Open;
            state.modal_open = false;
            info!(session = %state.session.id(), code = %state.session.bill.code, "fresh payment attempt");
        }
        self.inner.expiry.reset();

        self.pay(false).await?;

        let session_id = {
            let mut state = lock(&self.inner.state);
            state.modal_open = true;
            state.session.id()
        };
        self.emit(CheckoutEvent::ModalOpened);
        if self.inner.flow.enable_countdown {
            self.start_countdown(session_id);
        }
        Ok(())
    }

    async fn pay(&self, start_countdown: bool) -> Result<()> {
        let inner = &self.inner;
        let (session_id, needs_creation, bill, details, mut record) = {
            let mut state = lock(&inner.state);
            if state.busy() {
                return Err(CheckoutError::Busy);
            }
            if state.session.is_resolved() {
                state.session.discard(&inner.template, &inner.items);
            }
            let needs_creation = !state.session.is_bill_created();
            if needs_creation {
                state.creating = true;
                state.phase = CheckoutPhase::Creating;
            } else {
                state.qr_loading = true;
                state.phase = CheckoutPhase::AwaitingQr;
            }
            (
                state.session.id(),
                needs_creation,
                state.session.bill.clone(),
                state.session.details.clone(),
                state.session.created.clone(),
            )
        };

        let qr_loading = if needs_creation {
            let creating = InFlight::new(&inner.state, Flag::Creating);
            let result = inner.bills.create_bill(&bill, &details, &mut record).await;

            let mut state = lock(&inner.state);
            creating.release(&mut state);
            if state.session.id() != session_id {
                warn!(session = %session_id, "bill created for a superseded session");
                return Err(CheckoutError::SessionSuperseded);
            }
            state.session.record_created(record.clone());
            if let Err(e) = result {
                state.phase = CheckoutPhase::Open;
                drop(state);
                error!(session = %session_id, error = %e, "bill creation failed");
                self.emit(CheckoutEvent::CreateFailed {
                    reason: e.to_string(),
                });
                return Err(e);
            }
            state.qr_loading = true;
            state.phase = CheckoutPhase::AwaitingQr;
            drop(state);

            if let Some(created) = &record {
                self.emit(CheckoutEvent::BillCreated {
                    bill_id: created.id,
                    bill_code: created.code.clone(),
                });
            }
            InFlight::new(&inner.state, Flag::QrLoading)
        } else {
            InFlight::new(&inner.state, Flag::QrLoading)
        };

        let created = record.ok_or_else(|| {
            CheckoutError::BillCreate("no remote bill for this session".to_string())
        });
        let amount = details
            .first()
            .map(|detail| detail.amount)
            .ok_or_else(|| CheckoutError::Validation("bill has no line items".to_string()));
        let payer_id = bill.payer_id;
        let issued = match (created, amount) {
            (Ok(created), Ok(amount)) => inner.qr.issue_qr(&created, &payer_id, amount).await,
            (Err(e), _) | (_, Err(e)) => Err(e),
        };

        {
            let mut state = lock(&inner.state);
            qr_loading.release(&mut state);
            if state.session.id() != session_id {
                return Err(CheckoutError::SessionSuperseded);
            }
            match issued {
                Ok(image) => {
                    state.session.qr = Some(image);
                    state.phase = CheckoutPhase::Polling;
                }
                Err(e) => {
                    state.phase = CheckoutPhase::Open;
                    drop(state);
                    if matches!(e, CheckoutError::QrUnavailable) {
                        self.emit(CheckoutEvent::QrUnavailable);
                    } else {
                        error!(session = %session_id, error = %e, "QR request failed");
                    }
                    return Err(e);
                }
            }
        }

        self.start_polling(session_id, payer_id.clone());
        self.emit(CheckoutEvent::QrIssued { payer_id });
        if start_countdown {
            self.start_countdown(session_id);
        }
        Ok(())
    }

    /// Stops polling and the countdown and cancels the bill remotely.
    ///
    /// On success the session is torn down and a fresh one takes its place.
    /// On failure the session is left intact so the caller can retry.
    /// A session that already settled is left untouched and nothing is sent.
    pub async fn cancel_payment(&self) -> Result<()> {
        let inner = &self.inner;
        if !inner.flow.enable_cancellation {
            return Err(CheckoutError::CancellationDisabled);
        }
        let (session_id, bill_code, exists_remotely) = {
            let mut state = lock(&inner.state);
            if state.busy() {
                return Err(CheckoutError::Busy);
            }
            if let Some(outcome) = state.session.outcome() {
                debug!(
                    session = %state.session.id(),
                    ?outcome,
                    "session already resolved; nothing to cancel"
                );
                return Ok(());
            }
            state.cancelling = true;
            (
                state.session.id(),
                state.session.bill_code().to_string(),
                state.session.created.is_some(),
            )
        };
        let cancelling = InFlight::new(&inner.state, Flag::Cancelling);

        inner.poller.stop();
        inner.expiry.stop();

        // A bill never created remotely only needs the local draft dropped.
        let result = if exists_remotely {
            inner.bills.update_status(&bill_code, BillStatus::Cancelled).await
        } else {
            Ok(())
        };

        let mut state = lock(&inner.state);
        cancelling.release(&mut state);
        match result {
            Ok(()) => {
                if state.session.id() == session_id {
                    state.session.resolve(SessionOutcome::Cancelled);
                    state.session.discard(&inner.template, &inner.items);
                }
                state.conclude(SessionOutcome::Cancelled);
                drop(state);
                info!(session = %session_id, code = %bill_code, "payment cancelled");
                self.emit(CheckoutEvent::Cancelled { bill_code });
                Ok(())
            }
            Err(e) => {
                drop(state);
                error!(session = %session_id, code = %bill_code, error = %e, "cancellation failed");
                self.emit(CheckoutEvent::CancelFailed {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// One settlement check for the current payer, outside the poll loop.
    pub async fn check_status(&self) -> Result<PollOutcome> {
        let (session_id, payer_id) = {
            let state = lock(&self.inner.state);
            (state.session.id(), state.session.payer_id().to_string())
        };
        let outcome = self.inner.poller.check(&payer_id).await?;
        if outcome == PollOutcome::Settled {
            self.settle(session_id);
        }
        Ok(outcome)
    }

    /// Stops any running poll loop and countdown.
    pub fn shutdown(&self) {
        self.inner.poller.stop();
        self.inner.expiry.stop();
    }

    fn start_polling(&self, session_id: SessionId, payer_id: String) {
        let weak = Arc::downgrade(&self.inner);
        self.inner.poller.start(payer_id, move |signal| async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let checkout = Checkout { inner };
            match signal {
                PollSignal::Settled => checkout.settle(session_id),
                PollSignal::CredentialUnavailable(e) => checkout.credential_lost(session_id, e),
            }
        });
    }

    fn start_countdown(&self, session_id: SessionId) {
        let weak = Arc::downgrade(&self.inner);
        self.inner.expiry.start(move || async move {
            if let Some(inner) = weak.upgrade() {
                Checkout { inner }.expire(session_id).await;
            }
        });
    }

    fn settle(&self, session_id: SessionId) {
        let (bill_code, payer_id) = {
            let mut state = lock(&self.inner.state);
            if state.session.id() != session_id {
                debug!(session = %session_id, "discarding settlement for a superseded session");
                return;
            }
            if !state.session.resolve(SessionOutcome::Settled) {
                return;
            }
            state.conclude(SessionOutcome::Settled);
            (
                state.session.bill_code().to_string(),
                state.session.payer_id().to_string(),
            )
        };
        self.inner.poller.stop();
        self.inner.expiry.stop();
        info!(session = %session_id, code = %bill_code, "payment settled");
        self.emit(CheckoutEvent::Settled {
            bill_code,
            payer_id,
        });
    }

    fn credential_lost(&self, session_id: SessionId, error: CheckoutError) {
        if lock(&self.inner.state).session.id() != session_id {
            return;
        }
        self.emit(CheckoutEvent::AuthFailed {
            reason: error.to_string(),
        });
    }

    async fn expire(&self, session_id: SessionId) {
        let inner = &self.inner;
        let bill_code = {
            let state = lock(&inner.state);
            if state.session.id() != session_id || state.session.is_resolved() {
                debug!(session = %session_id, "ignoring expiry for a superseded session");
                return;
            }
            state.session.bill_code().to_string()
        };

        inner.poller.stop();
        let result = inner.bills.update_status(&bill_code, BillStatus::Cancelled).await;

        {
            let mut state = lock(&inner.state);
            if state.session.id() == session_id {
                state.session.resolve(SessionOutcome::Expired);
                state.session.discard(&inner.template, &inner.items);
                state.conclude(SessionOutcome::Expired);
            }
        }

        let error = match result {
            Ok(()) => {
                warn!(session = %session_id, code = %bill_code, "payment expired; bill cancelled");
                None
            }
            Err(e) => {
                error!(session = %session_id, code = %bill_code, error = %e, "payment expired but cancellation failed");
                Some(e.to_string())
            }
        };
        self.emit(CheckoutEvent::Expired {
            bill_code,
            remote_cancelled: error.is_none(),
            error,
        });
    }

    fn emit(&self, event: CheckoutEvent) {
        debug!(?event, "checkout event");
        let _ = self.inner.events.send(event);
    }
}
