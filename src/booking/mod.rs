//! Booking Transactions and Payment Reconciliation
//!
//! Two operations share the booking and invoice rows:
//!
//! - [`BookingCoordinator::create_booking`] checks availability, prices the
//!   request and commits Booking + Invoice + BookingRoom + BookingService
//!   rows atomically, then asks the gateway for a redirect URL.
//! - [`PaymentReconciler::reconcile`] verifies a gateway callback and moves
//!   the invoice/booking pair to its terminal state.
//!
//! # Invariants
//!
//! 1. **No double booking**: a room is never held by two active bookings
//!    with overlapping `[start, end)` intervals
//! 2. **Fixed total**: `total = Σ(room × nights) + Σ(service × quantity)`,
//!    computed once at creation
//! 3. **Paired transitions**: invoice and booking status change together,
//!    PENDING→PAID|CANCELED and BOOKED→CANCELED|COMPLETED only
//! 4. **One invoice per booking**

pub mod availability;
pub mod coordinator;
pub mod error;
pub mod pricing;
pub mod reconciler;
pub mod types;

mod integration_tests;

pub use availability::AvailabilityChecker;
pub use coordinator::BookingCoordinator;
pub use error::{BookingError, ValidationReason};
pub use pricing::{PriceQuote, PricingCalculator, PricingError};
pub use reconciler::{PaymentReconciler, ReconcileOutcome, RejectReason};
pub use types::{
    Booking, BookingId, BookingOutcome, BookingReceipt, BookingRoom, BookingServiceLine,
    BookingStatus, CreateBookingDto, CreateBookingRequest, Invoice, InvoiceId, InvoiceStatus,
    Occupants, PaymentMethod, Room, RoomId, ServiceId, ServiceItem, ServiceSelection,
    StayInterval, UserId,
};
