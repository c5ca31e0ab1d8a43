use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{BookingStore, BookingTx, StoreError};
use crate::booking::types::{
    Booking, BookingId, BookingRoom, BookingServiceLine, BookingStatus, Invoice, InvoiceId,
    InvoiceStatus, NewBooking, NewInvoice, Room, RoomId, ServiceId, ServiceItem, StayInterval,
};
use crate::money::Money;

#[derive(Debug, Clone, Default)]
struct Tables {
    rooms: HashMap<RoomId, Room>,
    services: HashMap<ServiceId, ServiceItem>,
    bookings: BTreeMap<BookingId, Booking>,
    invoices: BTreeMap<InvoiceId, Invoice>,
    booking_rooms: Vec<BookingRoom>,
    booking_services: Vec<BookingServiceLine>,
    next_booking_id: i64,
    next_invoice_id: i64,
    settled_transitions: u64,
}

/// Row counts across the four booking tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RowCounts {
    pub bookings: usize,
    pub invoices: usize,
    pub booking_rooms: usize,
    pub booking_services: usize,
}

/// A thread-safe in-memory store.
///
/// One `tokio::sync::Mutex` guards every table. A unit of work owns the
/// guard plus a staged copy of the tables, so units run one at a time and a
/// commit publishes all staged rows at once.
#[derive(Default, Clone)]
pub struct InMemoryBookingStore {
    tables: Arc<Mutex<Tables>>,
    fail_next_commit: Arc<AtomicBool>,
    fail_next_service_insert: Arc<AtomicBool>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_room(&self, id: i64, price: i64) {
        let mut tables = self.tables.lock().await;
        tables.rooms.insert(
            RoomId(id),
            Room {
                id: RoomId(id),
                price: Money::from_minor(price),
            },
        );
    }

    pub async fn add_service(&self, id: i64, price: i64) {
        let mut tables = self.tables.lock().await;
        tables.services.insert(
            ServiceId(id),
            ServiceItem {
                id: ServiceId(id),
                price: Money::from_minor(price),
            },
        );
    }

    /// The next commit fails and its unit is discarded
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// The next `insert_booking_services` call fails mid-unit
    pub fn fail_next_service_insert(&self) {
        self.fail_next_service_insert.store(true, Ordering::SeqCst);
    }

    pub async fn counts(&self) -> RowCounts {
        let tables = self.tables.lock().await;
        RowCounts {
            bookings: tables.bookings.len(),
            invoices: tables.invoices.len(),
            booking_rooms: tables.booking_rooms.len(),
            booking_services: tables.booking_services.len(),
        }
    }

    /// Committed invoice/booking status transitions
    pub async fn settled_transitions(&self) -> u64 {
        self.tables.lock().await.settled_transitions
    }

    pub async fn booking(&self, id: BookingId) -> Option<Booking> {
        self.tables.lock().await.bookings.get(&id).cloned()
    }

    pub async fn invoice_for_booking(&self, id: BookingId) -> Option<Invoice> {
        let tables = self.tables.lock().await;
        tables
            .invoices
            .values()
            .find(|inv| inv.booking_id == id)
            .cloned()
    }

    pub async fn rooms_of(&self, id: BookingId) -> Vec<BookingRoom> {
        let tables = self.tables.lock().await;
        tables
            .booking_rooms
            .iter()
            .filter(|r| r.booking_id == id)
            .cloned()
            .collect()
    }

    pub async fn services_of(&self, id: BookingId) -> Vec<BookingServiceLine> {
        let tables = self.tables.lock().await;
        tables
            .booking_services
            .iter()
            .filter(|s| s.booking_id == id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn begin(&self) -> Result<Box<dyn BookingTx>, StoreError> {
        let guard = self.tables.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(InMemoryTx {
            guard,
            staged,
            fail_next_commit: self.fail_next_commit.clone(),
            fail_next_service_insert: self.fail_next_service_insert.clone(),
        }))
    }

    async fn find_rooms(&self, ids: &[RoomId]) -> Result<Vec<Room>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.rooms.get(id).cloned())
            .collect())
    }

    async fn find_services(&self, ids: &[ServiceId]) -> Result<Vec<ServiceItem>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.services.get(id).cloned())
            .collect())
    }

    async fn find_invoice(&self, invoice_code: &str) -> Result<Option<Invoice>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .invoices
            .values()
            .find(|inv| inv.invoice_code == invoice_code)
            .cloned())
    }
}

/// Unit of work over the in-memory tables
pub struct InMemoryTx {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
    fail_next_commit: Arc<AtomicBool>,
    fail_next_service_insert: Arc<AtomicBool>,
}

#[async_trait]
impl BookingTx for InMemoryTx {
    async fn lock_rooms(&mut self, _room_ids: &[RoomId]) -> Result<(), StoreError> {
        // The unit already holds the store-wide lock
        Ok(())
    }

    async fn count_overlapping(
        &mut self,
        room_id: RoomId,
        interval: &StayInterval,
    ) -> Result<u64, StoreError> {
        let staged = &self.staged;
        let count = staged
            .booking_rooms
            .iter()
            .filter(|br| br.room_id == room_id)
            .filter_map(|br| staged.bookings.get(&br.booking_id))
            .filter(|b| b.status.is_active() && b.interval.overlaps(interval))
            .count();
        Ok(count as u64)
    }

    async fn insert_booking(&mut self, booking: &NewBooking) -> Result<Booking, StoreError> {
        self.staged.next_booking_id += 1;
        let row = Booking {
            id: BookingId(self.staged.next_booking_id),
            user_id: booking.user_id,
            interval: booking.interval,
            occupants: booking.occupants,
            status: BookingStatus::Booked,
            created_at: booking.created_at,
        };
        self.staged.bookings.insert(row.id, row.clone());
        Ok(row)
    }

    async fn insert_invoice(&mut self, invoice: &NewInvoice) -> Result<Invoice, StoreError> {
        if !self.staged.bookings.contains_key(&invoice.booking_id) {
            return Err(StoreError::Constraint(format!(
                "invoice references unknown booking {}",
                invoice.booking_id
            )));
        }
        for existing in self.staged.invoices.values() {
            if existing.invoice_code == invoice.invoice_code {
                return Err(StoreError::Constraint(format!(
                    "duplicate invoice_code {}",
                    invoice.invoice_code
                )));
            }
            if existing.booking_id == invoice.booking_id {
                return Err(StoreError::Constraint(format!(
                    "booking {} already has an invoice",
                    invoice.booking_id
                )));
            }
        }

        self.staged.next_invoice_id += 1;
        let row = Invoice {
            id: InvoiceId(self.staged.next_invoice_id),
            invoice_code: invoice.invoice_code.clone(),
            booking_id: invoice.booking_id,
            total_amount: invoice.total_amount,
            payment_method: invoice.payment_method,
            status: InvoiceStatus::Pending,
            issued_date: invoice.issued_date,
            paid_date: None,
            gateway_response_code: None,
        };
        self.staged.invoices.insert(row.id, row.clone());
        Ok(row)
    }

    async fn insert_booking_rooms(&mut self, rows: &[BookingRoom]) -> Result<(), StoreError> {
        self.staged.booking_rooms.extend_from_slice(rows);
        Ok(())
    }

    async fn insert_booking_services(
        &mut self,
        rows: &[BookingServiceLine],
    ) -> Result<(), StoreError> {
        if self.fail_next_service_insert.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "injected booking_services failure".into(),
            ));
        }
        self.staged.booking_services.extend_from_slice(rows);
        Ok(())
    }

    async fn lock_invoice(
        &mut self,
        invoice_code: &str,
    ) -> Result<Option<(Invoice, Booking)>, StoreError> {
        let Some(invoice) = self
            .staged
            .invoices
            .values()
            .find(|inv| inv.invoice_code == invoice_code)
            .cloned()
        else {
            return Ok(None);
        };
        let booking = self
            .staged
            .bookings
            .get(&invoice.booking_id)
            .cloned()
            .ok_or_else(|| {
                StoreError::Corrupt(format!(
                    "invoice {} references missing booking {}",
                    invoice.invoice_code, invoice.booking_id
                ))
            })?;
        Ok(Some((invoice, booking)))
    }

    async fn booking_rooms(
        &mut self,
        booking_id: BookingId,
    ) -> Result<Vec<BookingRoom>, StoreError> {
        Ok(self
            .staged
            .booking_rooms
            .iter()
            .filter(|r| r.booking_id == booking_id)
            .cloned()
            .collect())
    }

    async fn settle(
        &mut self,
        invoice_id: InvoiceId,
        booking_id: BookingId,
        invoice_status: InvoiceStatus,
        booking_status: BookingStatus,
        paid_date: Option<DateTime<Utc>>,
        response_code: &str,
    ) -> Result<bool, StoreError> {
        let pending = self
            .staged
            .invoices
            .get(&invoice_id)
            .is_some_and(|inv| inv.status == InvoiceStatus::Pending);
        if !pending {
            return Ok(false);
        }
        let booking_ok = self
            .staged
            .bookings
            .get(&booking_id)
            .is_some_and(|b| b.status.can_transition_to(booking_status));
        if !booking_ok {
            return Err(StoreError::Corrupt(format!(
                "pending invoice {} with booking {} not in BOOKED",
                invoice_id, booking_id
            )));
        }

        if let Some(invoice) = self.staged.invoices.get_mut(&invoice_id) {
            invoice.status = invoice_status;
            invoice.paid_date = paid_date;
            invoice.gateway_response_code = Some(response_code.to_string());
        }
        if let Some(booking) = self.staged.bookings.get_mut(&booking_id) {
            booking.status = booking_status;
        }
        self.staged.settled_transitions += 1;
        Ok(true)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let InMemoryTx {
            mut guard,
            staged,
            fail_next_commit,
            ..
        } = *self;
        if fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected commit failure".into()));
        }
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
