use thiserror::Error;

use super::pricing::PricingError;
use super::types::{RoomId, ServiceId};
use crate::store::StoreError;

/// Request shape problems, detected before any storage access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationReason {
    StartTimePast,
    InvalidInterval,
    RoomRequired,
    DuplicateRoom,
    InvalidOccupancy,
    ServiceQuantityMismatch,
    InvalidQuantity,
}

impl ValidationReason {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationReason::StartTimePast => "START_TIME_PAST",
            ValidationReason::InvalidInterval => "INVALID_INTERVAL",
            ValidationReason::RoomRequired => "ROOM_REQUIRED",
            ValidationReason::DuplicateRoom => "DUPLICATE_ROOM",
            ValidationReason::InvalidOccupancy => "INVALID_OCCUPANCY",
            ValidationReason::ServiceQuantityMismatch => "SERVICE_QUANTITY_MISMATCH",
            ValidationReason::InvalidQuantity => "INVALID_QUANTITY",
        }
    }
}

impl std::fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("Validation failed: {0}")]
    Validation(ValidationReason),

    #[error("Rooms not found: {0:?}")]
    RoomNotFound(Vec<RoomId>),

    #[error("Services not found: {0:?}")]
    ServiceNotFound(Vec<ServiceId>),

    #[error("Room {0} is not available for the requested interval")]
    RoomUnavailable(RoomId),

    #[error("Pricing error: {0}")]
    Pricing(#[from] PricingError),

    #[error("Invoice not found: {0}")]
    InvoiceNotFound(String),

    #[error("Invoice {0} is no longer pending")]
    InvoiceNotPending(String),

    #[error("Payment gateway error: {0}")]
    Payment(#[from] crate::payment::PaymentError),

    #[error("Transaction failed: {0}")]
    Transaction(#[from] StoreError),
}

impl BookingError {
    /// Machine-readable reason code for callers
    pub fn reason_code(&self) -> &'static str {
        match self {
            BookingError::Validation(reason) => reason.code(),
            BookingError::RoomNotFound(_) => "ROOM_NOT_FOUND",
            BookingError::ServiceNotFound(_) => "SERVICE_NOT_FOUND",
            BookingError::RoomUnavailable(_) => "ROOM_NOT_AVAILABLE",
            BookingError::Pricing(_) => "INVALID_PRICE",
            BookingError::InvoiceNotFound(_) => "INVOICE_NOT_FOUND",
            BookingError::InvoiceNotPending(_) => "INVOICE_NOT_PENDING",
            BookingError::Payment(_) => "PAYMENT_LINK_FAILED",
            BookingError::Transaction(_) => "TRANSACTION_FAILED",
        }
    }

    /// Message key resolved by the i18n collaborator
    pub fn message_key(&self) -> &'static str {
        match self {
            BookingError::Validation(ValidationReason::StartTimePast) => "booking.START_TIME_PAST",
            BookingError::Validation(ValidationReason::RoomRequired) => "booking.ROOM_REQUIRED",
            BookingError::Validation(_) => "booking.INVALID_REQUEST",
            BookingError::RoomNotFound(_) => "booking.ROOM_NOT_FOUND",
            BookingError::ServiceNotFound(_) => "booking.SERVICE_NOT_FOUND",
            BookingError::RoomUnavailable(_) => "booking.ROOM_NOT_AVAILABLE",
            BookingError::Pricing(_) => "booking.INVALID_REQUEST",
            BookingError::InvoiceNotFound(_) | BookingError::InvoiceNotPending(_) => {
                "booking.INVALID_REQUEST"
            }
            BookingError::Payment(_) => "booking.PAYMENT_LINK_FAILED",
            BookingError::Transaction(_) => "booking.INTERNAL_ERROR",
        }
    }

    /// Infrastructure failures; everything else is the caller's fault
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            BookingError::Transaction(_) | BookingError::Payment(_)
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, BookingError::RoomUnavailable(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            BookingError::RoomNotFound(_)
                | BookingError::ServiceNotFound(_)
                | BookingError::InvoiceNotFound(_)
        )
    }
}
