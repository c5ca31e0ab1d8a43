//! Payment Reconciler
//!
//! Consumes gateway callbacks and moves a PENDING invoice (and its booking)
//! to a terminal pair:
//!
//! ```text
//! PENDING/BOOKED --"00"--> PAID/BOOKED
//! PENDING/BOOKED --other-> CANCELED/CANCELED
//! ```
//!
//! Forged, unknown or inconsistent callbacks are rejected without writes.
//! A callback for an invoice that already left PENDING is a replay: it
//! returns the committed result and changes nothing (first writer wins).

use std::sync::Arc;

use tracing::{error, info, warn};

use super::types::{Booking, BookingId, BookingStatus, Invoice, InvoiceStatus};
use crate::clock::Clock;
use crate::money::Money;
use crate::notification::{Notification, NotificationQueue};
use crate::payment::{GatewayCallback, PaymentGateway, RESPONSE_SUCCESS};
use crate::store::{BookingStore, BookingTx, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    InvalidSignature,
    UnknownReference,
    AmountMismatch,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::InvalidSignature => "INVALID_SIGNATURE",
            RejectReason::UnknownReference => "UNKNOWN_REFERENCE",
            RejectReason::AmountMismatch => "AMOUNT_MISMATCH",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Invoice PAID, booking stays BOOKED
    Paid {
        invoice_code: String,
        booking_id: BookingId,
        replayed: bool,
    },
    /// Gateway declined; invoice and booking CANCELED
    Declined {
        invoice_code: String,
        booking_id: BookingId,
        response_code: String,
        replayed: bool,
    },
    /// Nothing was written
    Rejected {
        reason: RejectReason,
        reference: Option<String>,
        response_code: Option<String>,
    },
}

impl ReconcileOutcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, ReconcileOutcome::Rejected { .. })
    }

    pub fn replayed(&self) -> bool {
        match self {
            ReconcileOutcome::Paid { replayed, .. } | ReconcileOutcome::Declined { replayed, .. } => {
                *replayed
            }
            ReconcileOutcome::Rejected { .. } => false,
        }
    }

    /// Gateway reference the callback was about
    pub fn reference(&self) -> Option<&str> {
        match self {
            ReconcileOutcome::Paid { invoice_code, .. }
            | ReconcileOutcome::Declined { invoice_code, .. } => Some(invoice_code),
            ReconcileOutcome::Rejected { reference, .. } => reference.as_deref(),
        }
    }

    fn rejected(reason: RejectReason, callback: &GatewayCallback) -> Self {
        ReconcileOutcome::Rejected {
            reason,
            reference: callback.txn_ref().map(str::to_string),
            response_code: callback.response_code().map(str::to_string),
        }
    }

    /// Outcome recorded on an invoice that is already terminal
    fn from_settled(invoice: &Invoice, replayed: bool) -> Result<Self, StoreError> {
        match invoice.status {
            InvoiceStatus::Paid => Ok(ReconcileOutcome::Paid {
                invoice_code: invoice.invoice_code.clone(),
                booking_id: invoice.booking_id,
                replayed,
            }),
            InvoiceStatus::Canceled => Ok(ReconcileOutcome::Declined {
                invoice_code: invoice.invoice_code.clone(),
                booking_id: invoice.booking_id,
                response_code: invoice.gateway_response_code.clone().ok_or_else(|| {
                    StoreError::Corrupt(format!(
                        "canceled invoice {} has no gateway response code",
                        invoice.invoice_code
                    ))
                })?,
                replayed,
            }),
            InvoiceStatus::Pending => Err(StoreError::Corrupt(format!(
                "invoice {} still PENDING after settle",
                invoice.invoice_code
            ))),
        }
    }
}

/// What one unit of work decided
struct Decision {
    outcome: ReconcileOutcome,
    /// The unit changed state and must commit
    wrote: bool,
    confirmation: Option<Notification>,
}

impl Decision {
    fn read_only(outcome: ReconcileOutcome) -> Self {
        Self {
            outcome,
            wrote: false,
            confirmation: None,
        }
    }
}

pub struct PaymentReconciler {
    store: Arc<dyn BookingStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn NotificationQueue>,
    clock: Arc<dyn Clock>,
}

impl PaymentReconciler {
    pub fn new(
        store: Arc<dyn BookingStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn NotificationQueue>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            clock,
        }
    }

    /// Apply one gateway callback. Only storage failures are errors; every
    /// callback-level problem is a `Rejected` outcome.
    pub async fn reconcile(&self, callback: &GatewayCallback) -> Result<ReconcileOutcome, StoreError> {
        let verification = self.gateway.verify_callback(callback);
        let (true, Some(reference), Some(response_code), Some(amount)) = (
            verification.valid,
            verification.reference,
            verification.response_code,
            verification.amount,
        ) else {
            warn!(reference = ?callback.txn_ref(), "Callback signature rejected");
            return Ok(ReconcileOutcome::rejected(
                RejectReason::InvalidSignature,
                callback,
            ));
        };

        let mut tx = self.store.begin().await?;
        let decided = self
            .decide(tx.as_mut(), callback, &reference, &response_code, amount)
            .await;

        let decision = match decided {
            Ok(decision) => decision,
            Err(e) => {
                error!(invoice_code = %reference, error = %e, "Reconciliation aborted");
                if let Err(rb) = tx.rollback().await {
                    error!(error = %rb, "Rollback failed");
                }
                return Err(e);
            }
        };

        if decision.wrote {
            tx.commit().await?;
        } else {
            tx.rollback().await?;
        }

        match &decision.outcome {
            ReconcileOutcome::Rejected { reason, .. } => {
                warn!(invoice_code = %reference, reason = reason.as_str(), "Callback rejected");
            }
            outcome => {
                info!(
                    invoice_code = %reference,
                    response_code = %response_code,
                    replayed = outcome.replayed(),
                    paid = matches!(outcome, ReconcileOutcome::Paid { .. }),
                    "Callback reconciled"
                );
            }
        }

        if let Some(notification) = decision.confirmation
            && let Err(e) = self.notifier.enqueue(notification).await
        {
            warn!(invoice_code = %reference, error = %e, "Confirmation enqueue failed");
        }

        Ok(decision.outcome)
    }

    async fn decide(
        &self,
        tx: &mut dyn BookingTx,
        callback: &GatewayCallback,
        reference: &str,
        response_code: &str,
        amount: Money,
    ) -> Result<Decision, StoreError> {
        let Some((invoice, booking)) = tx.lock_invoice(reference).await? else {
            return Ok(Decision::read_only(ReconcileOutcome::rejected(
                RejectReason::UnknownReference,
                callback,
            )));
        };

        if amount != invoice.total_amount {
            warn!(
                invoice_code = %reference,
                expected = %invoice.total_amount,
                received = %amount,
                "Callback amount mismatch"
            );
            return Ok(Decision::read_only(ReconcileOutcome::rejected(
                RejectReason::AmountMismatch,
                callback,
            )));
        }

        if invoice.status != InvoiceStatus::Pending {
            return ReconcileOutcome::from_settled(&invoice, true).map(Decision::read_only);
        }

        let now = self.clock.now();
        let paid = response_code == RESPONSE_SUCCESS;
        let (invoice_status, booking_status, paid_date) = if paid {
            (InvoiceStatus::Paid, BookingStatus::Booked, Some(now))
        } else {
            (InvoiceStatus::Canceled, BookingStatus::Canceled, None)
        };

        let won = tx
            .settle(
                invoice.id,
                booking.id,
                invoice_status,
                booking_status,
                paid_date,
                response_code,
            )
            .await?;
        if !won {
            // Another unit settled it first
            let (current, _) = tx.lock_invoice(reference).await?.ok_or_else(|| {
                StoreError::Corrupt(format!("invoice {} vanished during settle", reference))
            })?;
            return ReconcileOutcome::from_settled(&current, true).map(Decision::read_only);
        }

        let settled = Invoice {
            status: invoice_status,
            paid_date,
            gateway_response_code: Some(response_code.to_string()),
            ..invoice
        };
        let confirmation = if paid {
            self.confirmation(tx, &settled, &booking).await
        } else {
            None
        };

        Ok(Decision {
            outcome: ReconcileOutcome::from_settled(&settled, false)?,
            wrote: true,
            confirmation,
        })
    }

    /// Confirmation job for a freshly paid invoice; failures only log
    async fn confirmation(
        &self,
        tx: &mut dyn BookingTx,
        invoice: &Invoice,
        booking: &Booking,
    ) -> Option<Notification> {
        let rooms = match tx.booking_rooms(booking.id).await {
            Ok(rooms) => rooms,
            Err(e) => {
                warn!(booking_id = %booking.id, error = %e, "Room snapshot read failed");
                return None;
            }
        };
        match Notification::booking_confirmation(invoice, booking, &rooms) {
            Ok(n) => Some(n),
            Err(e) => {
                warn!(booking_id = %booking.id, error = %e, "Confirmation build failed");
                None
            }
        }
    }
}
