//! VNPay-style Payment Gateway Adapter
//!
//! Builds signed redirect URLs and verifies signed callbacks. Stateless
//! apart from its merchant configuration; never touches bookings or invoices.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv6Addr};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use tracing::{debug, warn};
use url::Url;

use super::PaymentError;
use super::callback::{self, CallbackVerification, GatewayCallback};
use super::signing::{self, SECURE_HASH_FIELD};
use crate::config::PaymentConfig;
use crate::money::Money;

/// Everything needed to build one redirect URL
#[derive(Debug, Clone)]
pub struct RedirectRequest {
    pub client_ip: String,
    pub amount: Money,
    pub description: String,
    /// Invoice code, echoed back as `vnp_TxnRef`
    pub reference: String,
    pub locale: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn build_redirect_url(&self, req: &RedirectRequest) -> Result<String, PaymentError>;

    fn verify_callback(&self, callback: &GatewayCallback) -> CallbackVerification;
}

pub struct VnpayGateway {
    config: PaymentConfig,
    pay_url: Url,
    offset: FixedOffset,
}

impl VnpayGateway {
    pub fn new(config: PaymentConfig) -> Result<Self, PaymentError> {
        let pay_url = Url::parse(&config.pay_url)?;
        let offset = config
            .utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                PaymentError::Config(format!(
                    "utc_offset_hours out of range: {}",
                    config.utc_offset_hours
                ))
            })?;
        if config.hash_secret.is_empty() {
            return Err(PaymentError::Config("hash_secret is empty".into()));
        }
        Ok(Self {
            config,
            pay_url,
            offset,
        })
    }

    /// Parameters of a redirect, before signing
    fn redirect_params(&self, req: &RedirectRequest) -> BTreeMap<String, String> {
        let create_date = req
            .created_at
            .with_timezone(&self.offset)
            .format("%Y%m%d%H%M%S")
            .to_string();

        let mut params = BTreeMap::new();
        params.insert("vnp_Version".to_string(), self.config.version.clone());
        params.insert("vnp_Command".to_string(), self.config.command.clone());
        params.insert("vnp_TmnCode".to_string(), self.config.tmn_code.clone());
        params.insert(
            "vnp_Locale".to_string(),
            gateway_locale(&req.locale).to_string(),
        );
        params.insert("vnp_CurrCode".to_string(), self.config.currency.clone());
        params.insert(callback::TXN_REF.to_string(), req.reference.clone());
        params.insert(callback::ORDER_INFO.to_string(), req.description.clone());
        params.insert("vnp_OrderType".to_string(), self.config.order_type.clone());
        params.insert(callback::AMOUNT.to_string(), req.amount.to_string());
        params.insert("vnp_ReturnUrl".to_string(), self.config.return_url.clone());
        params.insert("vnp_IpAddr".to_string(), req.client_ip.clone());
        params.insert("vnp_CreateDate".to_string(), create_date);
        params
    }
}

#[async_trait]
impl PaymentGateway for VnpayGateway {
    async fn build_redirect_url(&self, req: &RedirectRequest) -> Result<String, PaymentError> {
        if req.amount <= Money::ZERO {
            return Err(PaymentError::InvalidAmount(req.amount));
        }
        if req.reference.is_empty() {
            return Err(PaymentError::MissingReference);
        }

        let params = self.redirect_params(req);
        let query = signing::canonical_query(&params);
        let hash = signing::sign(self.config.hash_secret.as_bytes(), &query)
            .map_err(|e| PaymentError::Signing(e.to_string()))?;

        let mut url = self.pay_url.clone();
        url.set_query(Some(&format!("{}&{}={}", query, SECURE_HASH_FIELD, hash)));

        debug!(reference = %req.reference, amount = %req.amount, "Payment redirect built");
        Ok(url.into())
    }

    fn verify_callback(&self, cb: &GatewayCallback) -> CallbackVerification {
        if !cb.has_required_fields() {
            warn!(reference = ?cb.txn_ref(), "Callback missing required fields");
            return CallbackVerification::invalid(cb);
        }
        if cb.get(callback::TMN_CODE) != Some(self.config.tmn_code.as_str()) {
            warn!(reference = ?cb.txn_ref(), "Callback terminal code mismatch");
            return CallbackVerification::invalid(cb);
        }
        let Some(amount) = cb.amount() else {
            warn!(reference = ?cb.txn_ref(), "Callback amount unparseable");
            return CallbackVerification::invalid(cb);
        };
        let provided = cb.secure_hash().unwrap_or_default();
        if !signing::verify(self.config.hash_secret.as_bytes(), cb.params(), provided) {
            return CallbackVerification::invalid(cb);
        }

        CallbackVerification {
            valid: true,
            reference: cb.txn_ref().map(str::to_string),
            response_code: cb.response_code().map(str::to_string),
            amount: Some(amount),
        }
    }
}

/// Gateway locale for a UI language tag
pub fn gateway_locale(lang: &str) -> &'static str {
    let lang = lang.trim().to_ascii_lowercase();
    if lang == "vi" || lang == "vn" || lang.starts_with("vi-") {
        "vn"
    } else {
        "en"
    }
}

/// IPv4 form of the client address as the gateway expects it.
/// Loopback `::1` and IPv4-mapped IPv6 collapse to IPv4; missing input
/// falls back to `127.0.0.1`.
pub fn normalize_client_ip(raw: Option<&str>) -> String {
    const FALLBACK: &str = "127.0.0.1";

    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return FALLBACK.to_string();
    };

    match raw.parse::<IpAddr>() {
        Ok(IpAddr::V6(v6)) if v6 == Ipv6Addr::LOCALHOST => FALLBACK.to_string(),
        Ok(IpAddr::V6(v6)) => match v6.to_ipv4_mapped() {
            Some(v4) => v4.to_string(),
            None => v6.to_string(),
        },
        Ok(IpAddr::V4(v4)) => v4.to_string(),
        Err(_) => raw.to_string(),
    }
}
