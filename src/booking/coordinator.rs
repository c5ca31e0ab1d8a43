//! Booking Transaction Coordinator
//!
//! Validates a booking request, prices it from the catalog, and commits the
//! booking, invoice and join rows in one unit of work. The payment redirect
//! is requested only after commit, so a gateway failure never undoes a booking.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use super::availability::AvailabilityChecker;
use super::error::{BookingError, ValidationReason};
use super::pricing::{PriceQuote, PricingCalculator};
use super::types::{
    BookingOutcome, BookingReceipt, BookingRoom, BookingServiceLine, CreateBookingRequest,
    InvoiceStatus, NewBooking, NewInvoice, Room, ServiceItem, ServiceSelection, StayInterval,
    invoice_code, payment_description,
};
use crate::clock::Clock;
use crate::payment::{PaymentGateway, RedirectRequest, normalize_client_ip};
use crate::store::{BookingStore, BookingTx};

/// Occupant counts and quantities are stored as INTEGER columns
const MAX_STORED_COUNT: u32 = i32::MAX as u32;

pub struct BookingCoordinator {
    store: Arc<dyn BookingStore>,
    gateway: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
}

impl BookingCoordinator {
    pub fn new(
        store: Arc<dyn BookingStore>,
        gateway: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            gateway,
            clock,
        }
    }

    /// Create a booking with its invoice and return a payment redirect.
    ///
    /// Validation, not-found and conflict errors are raised before anything
    /// is written. Once the transaction commits, the result is always `Ok`:
    /// a redirect failure comes back as `BookingOutcome::PaymentLinkFailed`.
    pub async fn create_booking(
        &self,
        req: CreateBookingRequest,
    ) -> Result<BookingOutcome, BookingError> {
        let now = self.clock.now();
        let interval = validate_request(&req, now)?;

        // Catalog reads happen outside the unit of work
        let rooms = self.resolve_rooms(&req).await?;
        let services = self.resolve_services(&req.services).await?;
        let quote = PricingCalculator::quote(&rooms, interval.nights(), &services)?;

        let receipt = self.persist(&req, interval, &quote, now).await?;
        info!(
            booking_id = %receipt.booking_id,
            invoice_code = %receipt.invoice_code,
            user_id = %req.user_id,
            total = %receipt.total_amount,
            rooms = rooms.len(),
            services = services.len(),
            "Booking committed"
        );

        let redirect = RedirectRequest {
            client_ip: normalize_client_ip(Some(&req.client_ip)),
            amount: receipt.total_amount,
            description: payment_description(&receipt.invoice_code),
            reference: receipt.invoice_code.clone(),
            locale: req.locale.clone(),
            created_at: now,
        };
        match self.gateway.build_redirect_url(&redirect).await {
            Ok(payment_url) => Ok(BookingOutcome::Created {
                receipt,
                payment_url,
            }),
            Err(e) => {
                warn!(
                    booking_id = %receipt.booking_id,
                    invoice_code = %receipt.invoice_code,
                    error = %e,
                    "Payment link failed after commit"
                );
                Ok(BookingOutcome::PaymentLinkFailed {
                    receipt,
                    error: e.to_string(),
                })
            }
        }
    }

    /// Fresh redirect URL for an invoice that is still PENDING
    pub async fn retry_payment_url(
        &self,
        invoice_code: &str,
        client_ip: &str,
        locale: &str,
    ) -> Result<String, BookingError> {
        let invoice = self
            .store
            .find_invoice(invoice_code)
            .await?
            .ok_or_else(|| BookingError::InvoiceNotFound(invoice_code.to_string()))?;

        if invoice.status != InvoiceStatus::Pending {
            debug!(invoice_code, status = %invoice.status, "Retry on settled invoice");
            return Err(BookingError::InvoiceNotPending(invoice_code.to_string()));
        }

        let redirect = RedirectRequest {
            client_ip: normalize_client_ip(Some(client_ip)),
            amount: invoice.total_amount,
            description: payment_description(&invoice.invoice_code),
            reference: invoice.invoice_code.clone(),
            locale: locale.to_string(),
            created_at: self.clock.now(),
        };
        let url = self.gateway.build_redirect_url(&redirect).await?;
        info!(invoice_code, "Payment link regenerated");
        Ok(url)
    }

    /// Catalog rooms in request order; every id must exist
    async fn resolve_rooms(&self, req: &CreateBookingRequest) -> Result<Vec<Room>, BookingError> {
        let found: HashMap<_, _> = self
            .store
            .find_rooms(&req.room_ids)
            .await?
            .into_iter()
            .map(|r| (r.id, r))
            .collect();

        let missing: Vec<_> = req
            .room_ids
            .iter()
            .filter(|id| !found.contains_key(id))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(BookingError::RoomNotFound(missing));
        }

        Ok(req
            .room_ids
            .iter()
            .filter_map(|id| found.get(id).cloned())
            .collect())
    }

    /// Catalog services paired with their requested quantities
    async fn resolve_services(
        &self,
        selections: &[ServiceSelection],
    ) -> Result<Vec<(ServiceItem, u32)>, BookingError> {
        if selections.is_empty() {
            return Ok(Vec::new());
        }

        let mut ids: Vec<_> = selections.iter().map(|s| s.service_id).collect();
        ids.sort();
        ids.dedup();

        let found: HashMap<_, _> = self
            .store
            .find_services(&ids)
            .await?
            .into_iter()
            .map(|s| (s.id, s))
            .collect();

        let missing: Vec<_> = ids
            .into_iter()
            .filter(|id| !found.contains_key(id))
            .collect();
        if !missing.is_empty() {
            return Err(BookingError::ServiceNotFound(missing));
        }

        Ok(selections
            .iter()
            .filter_map(|s| found.get(&s.service_id).map(|item| (item.clone(), s.quantity)))
            .collect())
    }

    /// Run the write phase in one unit; roll back on any failure
    async fn persist(
        &self,
        req: &CreateBookingRequest,
        interval: StayInterval,
        quote: &PriceQuote,
        now: DateTime<Utc>,
    ) -> Result<BookingReceipt, BookingError> {
        let mut tx = self.store.begin().await?;

        let written = write_booking(tx.as_mut(), req, interval, quote, now).await;
        match written {
            Ok(receipt) => {
                tx.commit().await.map_err(|e| {
                    error!(user_id = %req.user_id, error = %e, "Booking commit failed");
                    BookingError::Transaction(e)
                })?;
                Ok(receipt)
            }
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    error!(error = %rb, "Rollback failed");
                }
                if e.is_conflict() {
                    info!(user_id = %req.user_id, reason = e.reason_code(), "Booking rejected");
                } else {
                    error!(user_id = %req.user_id, error = %e, "Booking transaction aborted");
                }
                Err(e)
            }
        }
    }
}

/// Request checks that need no storage, in reporting order
fn validate_request(
    req: &CreateBookingRequest,
    now: DateTime<Utc>,
) -> Result<StayInterval, BookingError> {
    if req.start <= now {
        return Err(BookingError::Validation(ValidationReason::StartTimePast));
    }
    let interval = StayInterval::new(req.start, req.end)?;

    if req.room_ids.is_empty() {
        return Err(BookingError::Validation(ValidationReason::RoomRequired));
    }
    let mut seen = HashSet::with_capacity(req.room_ids.len());
    if !req.room_ids.iter().all(|id| seen.insert(*id)) {
        return Err(BookingError::Validation(ValidationReason::DuplicateRoom));
    }

    let occupants = req.occupants;
    if occupants.adults == 0
        || occupants.adults > MAX_STORED_COUNT
        || occupants.children > MAX_STORED_COUNT
    {
        return Err(BookingError::Validation(ValidationReason::InvalidOccupancy));
    }
    if req
        .services
        .iter()
        .any(|s| s.quantity == 0 || s.quantity > MAX_STORED_COUNT)
    {
        return Err(BookingError::Validation(ValidationReason::InvalidQuantity));
    }

    Ok(interval)
}

async fn write_booking(
    tx: &mut dyn BookingTx,
    req: &CreateBookingRequest,
    interval: StayInterval,
    quote: &PriceQuote,
    now: DateTime<Utc>,
) -> Result<BookingReceipt, BookingError> {
    tx.lock_rooms(&req.room_ids).await?;
    if let Some(room_id) = AvailabilityChecker::first_conflict(tx, &req.room_ids, &interval).await? {
        return Err(BookingError::RoomUnavailable(room_id));
    }

    let booking = tx
        .insert_booking(&NewBooking {
            user_id: req.user_id,
            interval,
            occupants: req.occupants,
            created_at: now,
        })
        .await?;

    let code = invoice_code(booking.created_at, booking.id);
    let invoice = tx
        .insert_invoice(&NewInvoice {
            invoice_code: code,
            booking_id: booking.id,
            total_amount: quote.total,
            payment_method: req.payment_method,
            issued_date: now,
        })
        .await?;

    let room_rows: Vec<_> = quote
        .rooms
        .iter()
        .map(|charge| BookingRoom {
            booking_id: booking.id,
            room_id: charge.room_id,
            price_at_booking: charge.unit_price,
        })
        .collect();
    tx.insert_booking_rooms(&room_rows).await?;

    if !quote.services.is_empty() {
        let service_rows: Vec<_> = quote
            .services
            .iter()
            .map(|charge| BookingServiceLine {
                booking_id: booking.id,
                service_id: charge.service_id,
                quantity: charge.quantity,
                price_at_booking: charge.unit_price,
            })
            .collect();
        tx.insert_booking_services(&service_rows).await?;
    }

    debug!(
        booking_id = %booking.id,
        invoice_id = %invoice.id,
        nights = quote.nights,
        "Booking rows staged"
    );

    Ok(BookingReceipt {
        booking_id: booking.id,
        invoice_id: invoice.id,
        invoice_code: invoice.invoice_code,
        total_amount: invoice.total_amount,
    })
}
