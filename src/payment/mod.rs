//! Payment gateway integration: signing, redirect URLs and callback verification.

pub mod callback;
pub mod gateway;
pub mod signing;

use thiserror::Error;

use crate::money::Money;

pub use callback::{CallbackVerification, GatewayCallback, RESPONSE_SUCCESS};
pub use gateway::{
    PaymentGateway, RedirectRequest, VnpayGateway, gateway_locale, normalize_client_ip,
};

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Amount must be positive: {0}")]
    InvalidAmount(Money),

    #[error("Payment reference is empty")]
    MissingReference,

    #[error("Invalid gateway URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Gateway configuration error: {0}")]
    Config(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Gateway unavailable: {0}")]
    Unavailable(String),
}
