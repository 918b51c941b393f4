use super::bill::{Bill, BillDetail, BillStatus, CreatedBill};
use super::identifiers::Identifiers;
use super::qr::QrImage;
use serde::Serialize;
use std::fmt;

/// Tags every poll tick and countdown with the attempt it belongs to, so a
/// reply that lands after a fresh attempt began can be recognised as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SessionId(u64);

impl SessionId {
    pub fn first() -> Self {
        Self(1)
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutPhase {
    Closed,
    Open,
    Creating,
    AwaitingQr,
    Polling,
    Settled,
    Expired,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Settled,
    Expired,
    Cancelled,
}

impl SessionOutcome {
    pub fn phase(self) -> CheckoutPhase {
        match self {
            SessionOutcome::Settled => CheckoutPhase::Settled,
            SessionOutcome::Expired => CheckoutPhase::Expired,
            SessionOutcome::Cancelled => CheckoutPhase::Cancelled,
        }
    }
}

/// Everything belonging to one payment attempt: the draft bill and its
/// line items, whatever has been created remotely, and the QR payload.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentSession {
    id: SessionId,
    pub bill: Bill,
    pub details: Vec<BillDetail>,
    pub created: Option<CreatedBill>,
    pub qr: Option<QrImage>,
    outcome: Option<SessionOutcome>,
}

impl PaymentSession {
    /// Starts an attempt from the template with fresh identifiers and every
    /// status back at `Draft`.
    pub fn begin(id: SessionId, template: &Bill, items: &[BillDetail]) -> Self {
        let ids = Identifiers::generate();
        let mut bill = template.clone();
        bill.code = ids.bill_code;
        bill.payer_id = ids.payer_id;
        bill.created_at = None;

        let mut details = items.to_vec();
        bill.set_status(&mut details, BillStatus::Draft);

        Self {
            id,
            bill,
            details,
            created: None,
            qr: None,
            outcome: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn outcome(&self) -> Option<SessionOutcome> {
        self.outcome
    }

    pub fn is_resolved(&self) -> bool {
        self.outcome.is_some()
    }

    /// The bill and every requested line item exist remotely.
    pub fn is_bill_created(&self) -> bool {
        self.created
            .as_ref()
            .is_some_and(|created| created.is_complete(self.details.len()))
    }

    /// Server-assigned code once the bill exists, else the local one.
    pub fn bill_code(&self) -> &str {
        match &self.created {
            Some(created) if !created.code.is_empty() => &created.code,
            _ => &self.bill.code,
        }
    }

    pub fn payer_id(&self) -> &str {
        &self.bill.payer_id
    }

    /// Records the remote bill and adopts its code as authoritative.
    pub fn record_created(&mut self, created: Option<CreatedBill>) {
        if let Some(bill) = &created
            && !bill.code.is_empty()
        {
            self.bill.code = bill.code.clone();
        }
        self.created = created;
    }

    /// Puts the local statuses back to `Draft` and drops the QR payload.
    pub fn reset_to_draft(&mut self) {
        self.set_status(BillStatus::Draft);
        self.qr = None;
    }

    /// Terminal transition. Returns false if the session was already
    /// resolved, leaving it untouched.
    pub fn resolve(&mut self, outcome: SessionOutcome) -> bool {
        if self.outcome.is_some() {
            return false;
        }
        match outcome {
            SessionOutcome::Settled => self.set_status(BillStatus::Settled),
            SessionOutcome::Expired | SessionOutcome::Cancelled => {
                self.set_status(BillStatus::Cancelled)
            }
        }
        self.qr = None;
        self.outcome = Some(outcome);
        true
    }

    /// Ends this attempt and replaces it with a fresh one.
    pub fn discard(&mut self, template: &Bill, items: &[BillDetail]) {
        *self = Self::begin(self.id.next(), template, items);
    }

    fn set_status(&mut self, status: BillStatus) {
        self.bill.set_status(&mut self.details, status);
        if let Some(created) = &mut self.created {
            created.set_status(status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bill::{Amount, CreatedDetail};

    fn template() -> Bill {
        Bill {
            code: String::new(),
            payer_id: String::new(),
            payer_name: "Payer".to_string(),
            payer_address: "Hanoi".to_string(),
            merchant: 3,
            customer: 3,
            service_package: 1,
            bill_type: 2,
            status: BillStatus::Settled,
            created_at: None,
        }
    }

    fn items() -> Vec<BillDetail> {
        vec![BillDetail {
            name: "Item".to_string(),
            amount: Amount::new(100).unwrap(),
            remark: String::new(),
            billing_month: 1,
            billing_year: 2026,
            status: BillStatus::Settled,
        }]
    }

    fn created_for(session: &PaymentSession, code: &str) -> CreatedBill {
        let mut created = CreatedBill::new(10, code);
        created.details.push(CreatedDetail {
            id: 11,
            group_bill: 10,
            code: code.to_string(),
            detail: session.details[0].clone(),
        });
        created
    }

    #[test]
    fn test_begin_generates_identifiers_and_drafts() {
        let session = PaymentSession::begin(SessionId::first(), &template(), &items());
        assert!(session.bill.code.starts_with("BG"));
        assert!(session.bill.payer_id.starts_with("BDT"));
        assert_eq!(session.bill.status, BillStatus::Draft);
        assert_eq!(session.details[0].status, BillStatus::Draft);
        assert!(!session.is_bill_created());
    }

    #[test]
    fn test_server_code_wins() {
        let mut session = PaymentSession::begin(SessionId::first(), &template(), &items());
        let created = created_for(&session, "BG999999");
        session.record_created(Some(created));

        assert_eq!(session.bill.code, "BG999999");
        assert_eq!(session.bill_code(), "BG999999");
        assert!(session.is_bill_created());
    }

    #[test]
    fn test_partial_creation_is_not_complete() {
        let mut session = PaymentSession::begin(SessionId::first(), &template(), &items());
        session.record_created(Some(CreatedBill::new(10, "")));

        assert!(!session.is_bill_created());
        assert_eq!(session.bill_code(), session.bill.code);
    }

    #[test]
    fn test_resolve_settled_marks_everything_once() {
        let mut session = PaymentSession::begin(SessionId::first(), &template(), &items());
        let created = created_for(&session, "BG123123");
        session.record_created(Some(created));
        session.qr = Some(QrImage::from_base64("AAAA").unwrap());

        assert!(session.resolve(SessionOutcome::Settled));
        assert_eq!(session.bill.status, BillStatus::Settled);
        assert!(session.details.iter().all(|d| d.status == BillStatus::Settled));
        let created = session.created.as_ref().unwrap();
        assert!(created.details.iter().all(|d| d.detail.status == BillStatus::Settled));
        assert!(session.qr.is_none());

        assert!(!session.resolve(SessionOutcome::Expired));
        assert_eq!(session.outcome(), Some(SessionOutcome::Settled));
    }

    #[test]
    fn test_discard_starts_a_new_attempt() {
        let mut session = PaymentSession::begin(SessionId::first(), &template(), &items());
        session.record_created(Some(CreatedBill::new(10, "BG555555")));
        session.resolve(SessionOutcome::Cancelled);
        let first_id = session.id();

        session.discard(&template(), &items());
        assert_eq!(session.id(), first_id.next());
        assert_ne!(session.bill.code, "BG555555");
        assert!(session.payer_id().starts_with("BDT"));
        assert!(session.created.is_none());
        assert!(session.outcome().is_none());
        assert_eq!(session.bill.status, BillStatus::Draft);
    }
}
