//! Booking Core Types
//!
//! Rows touched by the booking transaction and the payment reconciler,
//! plus the request/receipt types of the coordinator.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::error::{BookingError, ValidationReason};
use crate::money::Money;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

id_type!(
    /// Primary key of `bookings`
    BookingId
);
id_type!(
    /// Primary key of `invoices` (distinct from the human-readable code)
    InvoiceId
);
id_type!(RoomId);
id_type!(ServiceId);
id_type!(
    /// Owning user, authenticated by the caller
    UserId
);

/// Booking lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Booked,
    Canceled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Booked => "BOOKED",
            BookingStatus::Canceled => "CANCELED",
            BookingStatus::Completed => "COMPLETED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Canceled | BookingStatus::Completed)
    }

    /// Bookings in this state occupy their rooms
    pub fn is_active(&self) -> bool {
        !matches!(self, BookingStatus::Canceled)
    }

    /// BOOKED -> CANCELED | COMPLETED. Staying BOOKED is allowed (paid invoice).
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        match (self, next) {
            (BookingStatus::Booked, BookingStatus::Booked) => true,
            (BookingStatus::Booked, BookingStatus::Canceled) => true,
            (BookingStatus::Booked, BookingStatus::Completed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BOOKED" => Ok(BookingStatus::Booked),
            "CANCELED" => Ok(BookingStatus::Canceled),
            "COMPLETED" => Ok(BookingStatus::Completed),
            other => Err(format!("unknown booking status: {}", other)),
        }
    }
}

/// Invoice payment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Pending,
    Paid,
    Canceled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "PENDING",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Canceled => "CANCELED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, InvoiceStatus::Pending)
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(InvoiceStatus::Pending),
            "PAID" => Ok(InvoiceStatus::Paid),
            "CANCELED" => Ok(InvoiceStatus::Canceled),
            other => Err(format!("unknown invoice status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Card,
    BankTransfer,
    Cash,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "CARD",
            PaymentMethod::BankTransfer => "BANK_TRANSFER",
            PaymentMethod::Cash => "CASH",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CARD" => Ok(PaymentMethod::Card),
            "BANK_TRANSFER" => Ok(PaymentMethod::BankTransfer),
            "CASH" => Ok(PaymentMethod::Cash),
            other => Err(format!("unknown payment method: {}", other)),
        }
    }
}

/// Half-open stay interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StayInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl StayInterval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, BookingError> {
        if end <= start {
            return Err(BookingError::Validation(ValidationReason::InvalidInterval));
        }
        Ok(Self { start, end })
    }

    /// `s1 < e2 && s2 < e1`; touching boundaries do not overlap.
    #[inline]
    pub fn overlaps(&self, other: &StayInterval) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Billable nights: the stay length rounded up to whole days.
    pub fn nights(&self) -> i64 {
        let secs = (self.end - self.start).num_seconds();
        let day = Duration::days(1).num_seconds();
        (secs + day - 1).div_euclid(day)
    }
}

impl fmt::Display for StayInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Occupants {
    pub adults: u32,
    pub children: u32,
}

/// One ancillary service line of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSelection {
    pub service_id: ServiceId,
    pub quantity: u32,
}

impl ServiceSelection {
    pub fn new(service_id: ServiceId, quantity: u32) -> Self {
        Self {
            service_id,
            quantity,
        }
    }

    /// Zip the positional wire form (`serviceIds[i]` with `quantities[i]`).
    pub fn pair(ids: &[i64], quantities: &[u32]) -> Result<Vec<Self>, BookingError> {
        if ids.len() != quantities.len() {
            return Err(BookingError::Validation(
                ValidationReason::ServiceQuantityMismatch,
            ));
        }
        Ok(ids
            .iter()
            .zip(quantities)
            .map(|(id, qty)| ServiceSelection::new(ServiceId(*id), *qty))
            .collect())
    }
}

/// Catalog room (read-only)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub price: Money,
}

/// Catalog service (read-only)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceItem {
    pub id: ServiceId,
    pub price: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub user_id: UserId,
    pub interval: StayInterval,
    pub occupants: Occupants,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRoom {
    pub booking_id: BookingId,
    pub room_id: RoomId,
    pub price_at_booking: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingServiceLine {
    pub booking_id: BookingId,
    pub service_id: ServiceId,
    pub quantity: u32,
    pub price_at_booking: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub invoice_code: String,
    pub booking_id: BookingId,
    pub total_amount: Money,
    pub payment_method: PaymentMethod,
    pub status: InvoiceStatus,
    pub issued_date: DateTime<Utc>,
    pub paid_date: Option<DateTime<Utc>>,
    /// Gateway response code that settled the invoice; None while PENDING
    pub gateway_response_code: Option<String>,
}

/// Booking row before insert
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub user_id: UserId,
    pub interval: StayInterval,
    pub occupants: Occupants,
    pub created_at: DateTime<Utc>,
}

/// Invoice row before insert
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub invoice_code: String,
    pub booking_id: BookingId,
    pub total_amount: Money,
    pub payment_method: PaymentMethod,
    pub issued_date: DateTime<Utc>,
}

/// `INV-{created_at_millis}-{booking_id}`. Booking ids are unique, so the
/// code is unique without a separate sequence.
pub fn invoice_code(created_at: DateTime<Utc>, booking_id: BookingId) -> String {
    format!("INV-{}-{}", created_at.timestamp_millis(), booking_id)
}

/// Human description sent to the gateway as order info
pub fn payment_description(invoice_code: &str) -> String {
    format!("Payment-for-invoice-{}", invoice_code)
}

/// Booking creation request, after transport decoding
#[derive(Debug, Clone)]
pub struct CreateBookingRequest {
    pub room_ids: Vec<RoomId>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub occupants: Occupants,
    pub services: Vec<ServiceSelection>,
    pub payment_method: PaymentMethod,
    pub user_id: UserId,
    pub client_ip: String,
    pub locale: String,
}

/// Positional wire form of a booking request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingDto {
    pub room_ids: Vec<i64>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub num_adults: u32,
    #[serde(default)]
    pub num_children: u32,
    #[serde(default)]
    pub service_ids: Vec<i64>,
    #[serde(default)]
    pub quantities: Vec<u32>,
    pub payment_method: PaymentMethod,
}

impl CreateBookingDto {
    pub fn into_request(
        self,
        user_id: UserId,
        client_ip: impl Into<String>,
        locale: impl Into<String>,
    ) -> Result<CreateBookingRequest, BookingError> {
        let services = ServiceSelection::pair(&self.service_ids, &self.quantities)?;
        Ok(CreateBookingRequest {
            room_ids: self.room_ids.into_iter().map(RoomId).collect(),
            start: self.start_time,
            end: self.end_time,
            occupants: Occupants {
                adults: self.num_adults,
                children: self.num_children,
            },
            services,
            payment_method: self.payment_method,
            user_id,
            client_ip: client_ip.into(),
            locale: locale.into(),
        })
    }
}

/// Rows committed by one successful booking transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingReceipt {
    pub booking_id: BookingId,
    pub invoice_id: InvoiceId,
    pub invoice_code: String,
    pub total_amount: Money,
}

/// Result of `BookingCoordinator::create_booking` once the transaction committed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingOutcome {
    Created {
        receipt: BookingReceipt,
        payment_url: String,
    },
    /// Booking and invoice are persisted but no redirect URL could be built.
    /// Retry with `retry_payment_url`, not by booking again.
    PaymentLinkFailed {
        receipt: BookingReceipt,
        error: String,
    },
}

impl BookingOutcome {
    pub fn receipt(&self) -> &BookingReceipt {
        match self {
            BookingOutcome::Created { receipt, .. } => receipt,
            BookingOutcome::PaymentLinkFailed { receipt, .. } => receipt,
        }
    }

    pub fn payment_url(&self) -> Option<&str> {
        match self {
            BookingOutcome::Created { payment_url, .. } => Some(payment_url),
            BookingOutcome::PaymentLinkFailed { .. } => None,
        }
    }
}
