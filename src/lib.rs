//! Booking Core - Room Booking Transactions and Payment Reconciliation
//!
//! Reserves rooms and services for a time window, commits the booking and
//! its invoice atomically, and reconciles VNPay-style payment callbacks
//! against pending invoices.
//!
//! # Modules
//!
//! - [`booking`] - Coordinator, reconciler, availability and pricing
//! - [`payment`] - Gateway adapter: redirect URLs and callback signatures
//! - [`store`] - Unit-of-work storage ports (in-memory and PostgreSQL)
//! - [`notification`] - Outbound notification queue
//! - [`response`] - `{status, message, data}` envelope for transports
//! - [`money`] - Integer minor-unit amounts
//! - [`config`] / [`logging`] / [`db`] - Ambient plumbing

pub mod booking;
pub mod clock;
pub mod config;
pub mod db;
pub mod logging;
pub mod money;
pub mod notification;
pub mod payment;
pub mod response;
pub mod store;

// Convenient re-exports at crate root
pub use booking::{
    BookingCoordinator, BookingError, BookingOutcome, BookingReceipt, CreateBookingRequest,
    PaymentReconciler, ReconcileOutcome, RejectReason,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{AppConfig, ConfigError};
pub use money::Money;
pub use notification::{
    ChannelNotificationQueue, Notification, NotificationQueue, NullNotificationQueue,
};
pub use payment::{GatewayCallback, PaymentGateway, VnpayGateway};
pub use response::{ApiResponse, ResponseStatus};
pub use store::{BookingStore, BookingTx, InMemoryBookingStore, PgBookingStore, StoreError};
