//! Response envelope handed to the transport layer.
//!
//! `message` is an i18n key (`booking.*`); translating it is left to the caller.

use serde::Serialize;

use crate::booking::error::BookingError;
use crate::booking::reconciler::ReconcileOutcome;
use crate::booking::types::{BookingId, BookingOutcome, InvoiceId};
use crate::money::Money;
use crate::payment::RESPONSE_SUCCESS;
use crate::store::StoreError;

pub const MSG_SUCCESS: &str = "booking.SUCCESS";
pub const MSG_FAILED: &str = "booking.FAILED";
pub const MSG_INVALID_SIGNATURE: &str = "booking.INVALID_SIGNATURE";
pub const MSG_INTERNAL_ERROR: &str = "booking.INTERNAL_ERROR";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    /// Legitimate negative result (declined payment, rejected request)
    Failed,
    /// Server-side or integrity failure
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub status: ResponseStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn failed(message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            status: ResponseStatus::Failed,
            message: message.into(),
            data,
        }
    }

    pub fn error(message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: message.into(),
            data,
        }
    }

    /// HTTP-style callers answer these with a 5xx status
    pub fn is_server_error(&self) -> bool {
        self.status == ResponseStatus::Error
    }
}

/// Booking creation payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingData {
    pub booking_id: BookingId,
    pub invoice_id: InvoiceId,
    pub invoice_code: String,
    pub total_amount: Money,
    pub payment_url: Option<String>,
}

/// Machine-readable reason of a rejected booking
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorData {
    pub reason: &'static str,
}

/// Echo of the callback being answered
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackData {
    pub txn_ref: Option<String>,
    pub response_code: Option<String>,
}

impl From<&BookingOutcome> for ApiResponse<BookingData> {
    fn from(outcome: &BookingOutcome) -> Self {
        let receipt = outcome.receipt();
        let data = BookingData {
            booking_id: receipt.booking_id,
            invoice_id: receipt.invoice_id,
            invoice_code: receipt.invoice_code.clone(),
            total_amount: receipt.total_amount,
            payment_url: outcome.payment_url().map(str::to_string),
        };
        match outcome {
            BookingOutcome::Created { .. } => ApiResponse::success(MSG_SUCCESS, data),
            // Booking exists; only the link needs a retry
            BookingOutcome::PaymentLinkFailed { .. } => {
                ApiResponse::failed("booking.PAYMENT_LINK_FAILED", Some(data))
            }
        }
    }
}

impl From<&BookingError> for ApiResponse<ErrorData> {
    fn from(err: &BookingError) -> Self {
        let data = Some(ErrorData {
            reason: err.reason_code(),
        });
        if err.is_internal() {
            ApiResponse::error(err.message_key(), data)
        } else {
            ApiResponse::failed(err.message_key(), data)
        }
    }
}

impl From<&ReconcileOutcome> for ApiResponse<CallbackData> {
    fn from(outcome: &ReconcileOutcome) -> Self {
        match outcome {
            ReconcileOutcome::Paid { invoice_code, .. } => ApiResponse::success(
                MSG_SUCCESS,
                CallbackData {
                    txn_ref: Some(invoice_code.clone()),
                    response_code: Some(RESPONSE_SUCCESS.to_string()),
                },
            ),
            ReconcileOutcome::Declined {
                invoice_code,
                response_code,
                ..
            } => ApiResponse::failed(
                MSG_FAILED,
                Some(CallbackData {
                    txn_ref: Some(invoice_code.clone()),
                    response_code: Some(response_code.clone()),
                }),
            ),
            // Every reject reads the same to the caller
            ReconcileOutcome::Rejected {
                reference,
                response_code,
                ..
            } => ApiResponse::error(
                MSG_INVALID_SIGNATURE,
                Some(CallbackData {
                    txn_ref: reference.clone(),
                    response_code: response_code.clone(),
                }),
            ),
        }
    }
}

/// Reconciliation aborted on storage; the gateway should retry the callback
impl From<&StoreError> for ApiResponse<CallbackData> {
    fn from(_: &StoreError) -> Self {
        ApiResponse::error(MSG_INTERNAL_ERROR, None)
    }
}
