//! Storage Ports
//!
//! `BookingStore` hands out units of work (`BookingTx`). Every read and write
//! that must be atomic with respect to concurrent bookings or callbacks goes
//! through one unit; dropping a unit without `commit` discards its writes.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::booking::types::{
    Booking, BookingId, BookingRoom, BookingServiceLine, BookingStatus, Invoice, InvoiceId,
    InvoiceStatus, NewBooking, NewInvoice, Room, RoomId, ServiceId, ServiceItem, StayInterval,
};

pub use memory::InMemoryBookingStore;
pub use postgres::PgBookingStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Constraint violated: {0}")]
    Constraint(String),
}

/// Entry point: catalog reads and unit-of-work creation
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn BookingTx>, StoreError>;

    /// Batched catalog lookup; unknown ids are simply absent
    async fn find_rooms(&self, ids: &[RoomId]) -> Result<Vec<Room>, StoreError>;

    async fn find_services(&self, ids: &[ServiceId]) -> Result<Vec<ServiceItem>, StoreError>;

    /// Non-locking invoice read by code
    async fn find_invoice(&self, invoice_code: &str) -> Result<Option<Invoice>, StoreError>;
}

/// One atomic unit of work
#[async_trait]
pub trait BookingTx: Send {
    /// Serialize against other units touching the same rooms until commit/rollback
    async fn lock_rooms(&mut self, room_ids: &[RoomId]) -> Result<(), StoreError>;

    /// Active (non-canceled) bookings of `room_id` overlapping `interval`
    async fn count_overlapping(
        &mut self,
        room_id: RoomId,
        interval: &StayInterval,
    ) -> Result<u64, StoreError>;

    async fn insert_booking(&mut self, booking: &NewBooking) -> Result<Booking, StoreError>;

    async fn insert_invoice(&mut self, invoice: &NewInvoice) -> Result<Invoice, StoreError>;

    async fn insert_booking_rooms(&mut self, rows: &[BookingRoom]) -> Result<(), StoreError>;

    async fn insert_booking_services(
        &mut self,
        rows: &[BookingServiceLine],
    ) -> Result<(), StoreError>;

    /// Invoice and its booking, locked for the rest of the unit
    async fn lock_invoice(
        &mut self,
        invoice_code: &str,
    ) -> Result<Option<(Invoice, Booking)>, StoreError>;

    async fn booking_rooms(&mut self, booking_id: BookingId)
    -> Result<Vec<BookingRoom>, StoreError>;

    /// Move a PENDING invoice and its booking to their new statuses together,
    /// recording the gateway response code that decided it.
    /// Returns false (and writes nothing) when the invoice is no longer PENDING.
    async fn settle(
        &mut self,
        invoice_id: InvoiceId,
        booking_id: BookingId,
        invoice_status: InvoiceStatus,
        booking_status: BookingStatus,
        paid_date: Option<DateTime<Utc>>,
        response_code: &str,
    ) -> Result<bool, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
