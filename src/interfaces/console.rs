use crate::application::checkout::{CheckoutEvent, CheckoutSnapshot};
use std::io::{self, Write};

/// Writes checkout progress as one line per event.
pub struct EventPrinter<W: Write> {
    writer: W,
}

impl<W: Write> EventPrinter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn print_event(&mut self, event: &CheckoutEvent) -> io::Result<()> {
        match event {
            CheckoutEvent::ModalOpened => writeln!(self.writer, "payment opened"),
            CheckoutEvent::ModalClosed => writeln!(self.writer, "payment closed"),
            CheckoutEvent::BillCreated { bill_id, bill_code } => {
                writeln!(self.writer, "bill created: {} (id {})", bill_code, bill_id)
            }
            CheckoutEvent::CreateFailed { reason } => {
                writeln!(self.writer, "bill creation failed: {}", reason)
            }
            CheckoutEvent::QrIssued { payer_id } => {
                writeln!(self.writer, "scan the QR code to pay (payer {})", payer_id)
            }
            CheckoutEvent::QrUnavailable => {
                writeln!(self.writer, "QR code unavailable, try again")
            }
            CheckoutEvent::Settled {
                bill_code,
                payer_id,
            } => writeln!(self.writer, "payment settled: {} (payer {})", bill_code, payer_id),
            CheckoutEvent::Expired {
                bill_code,
                remote_cancelled: true,
                ..
            } => writeln!(self.writer, "payment expired: {} cancelled", bill_code),
            CheckoutEvent::Expired {
                bill_code, error, ..
            } => writeln!(
                self.writer,
                "payment expired: {} could not be cancelled ({})",
                bill_code,
                error.as_deref().unwrap_or("unknown error")
            ),
            CheckoutEvent::Cancelled { bill_code } => {
                writeln!(self.writer, "payment cancelled: {}", bill_code)
            }
            CheckoutEvent::CancelFailed { reason } => {
                writeln!(self.writer, "cancellation failed: {}", reason)
            }
            CheckoutEvent::AuthFailed { reason } => {
                writeln!(self.writer, "authentication failed: {}", reason)
            }
        }
    }

    /// Bill summary shown alongside the QR code.
    pub fn print_summary(&mut self, snapshot: &CheckoutSnapshot) -> io::Result<()> {
        writeln!(self.writer, "bill:      {}", snapshot.bill.code)?;
        writeln!(self.writer, "payer:     {} ({})", snapshot.bill.payer_name, snapshot.bill.payer_id)?;
        for detail in &snapshot.details {
            writeln!(
                self.writer,
                "item:      {} {:02}/{} {}",
                detail.name,
                detail.billing_month,
                detail.billing_year,
                detail.amount.value()
            )?;
        }
        writeln!(self.writer, "expires in {}s", snapshot.countdown.as_secs())?;
        self.writer.flush()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
